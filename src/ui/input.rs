//! Keyboard input handling for the TUI.
//!
//! This module translates keyboard events into application state
//! changes. Remote auth calls are awaited inline here, so a pending
//! call finishes folding back into the flow before the next event is
//! handled.

use anyhow::Result;
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};

use crate::app::{
    can_add_email_char, can_add_name_char, can_add_password_char, App, LoginField, RegisterField,
    ResetFocus,
};
use crate::gate::View;
use crate::reset::ResetStep;

/// Handle keyboard input. Returns true if the app should quit.
pub async fn handle_input(app: &mut App, key: KeyEvent) -> Result<bool> {
    match app.view {
        View::Login => handle_login_input(app, key).await,
        View::Register => handle_register_input(app, key).await,
        View::ResetPassword => handle_reset_input(app, key).await,
        View::Dashboard => Ok(handle_dashboard_input(app, key)),
    }
}

async fn handle_login_input(app: &mut App, key: KeyEvent) -> Result<bool> {
    if key.modifiers.contains(KeyModifiers::CONTROL) {
        match key.code {
            KeyCode::Char('r') => app.navigate(View::Register),
            KeyCode::Char('o') => app.navigate(View::ResetPassword),
            _ => {}
        }
        return Ok(false);
    }

    match key.code {
        KeyCode::Esc => {
            // Quit from the sign-in screen
            return Ok(true);
        }
        KeyCode::Down | KeyCode::Tab => {
            app.login_focus = app.login_focus.next();
        }
        KeyCode::Up | KeyCode::BackTab => {
            app.login_focus = app.login_focus.prev();
        }
        KeyCode::Enter => match app.login_focus {
            LoginField::Email => {
                app.login_focus = LoginField::Password;
            }
            LoginField::Password => {
                app.login_focus = LoginField::Button;
            }
            LoginField::Button => {
                app.attempt_login().await;
            }
        },
        KeyCode::Backspace => match app.login_focus {
            LoginField::Email => {
                app.login_email.pop();
            }
            LoginField::Password => {
                app.login_password.pop();
            }
            LoginField::Button => {}
        },
        KeyCode::Char(c) => match app.login_focus {
            LoginField::Email => {
                if can_add_email_char(app.login_email.len(), c) {
                    app.login_email.push(c);
                }
            }
            LoginField::Password => {
                if can_add_password_char(app.login_password.len(), c) {
                    app.login_password.push(c);
                }
            }
            LoginField::Button => {}
        },
        _ => {}
    }
    Ok(false)
}

async fn handle_register_input(app: &mut App, key: KeyEvent) -> Result<bool> {
    if key.modifiers.contains(KeyModifiers::CONTROL) {
        return Ok(false);
    }

    match key.code {
        KeyCode::Esc => {
            app.navigate(View::Login);
        }
        KeyCode::Down | KeyCode::Tab => {
            app.register_focus = app.register_focus.next();
        }
        KeyCode::Up | KeyCode::BackTab => {
            app.register_focus = app.register_focus.prev();
        }
        KeyCode::Enter => match app.register_focus {
            RegisterField::Button => {
                app.attempt_register().await;
            }
            other => {
                app.register_focus = other.next();
            }
        },
        KeyCode::Backspace => match app.register_focus {
            RegisterField::Name => {
                app.register_name.pop();
            }
            RegisterField::Email => {
                app.register_email.pop();
            }
            RegisterField::Password => {
                app.register_password.pop();
            }
            RegisterField::ConfirmPassword => {
                app.register_confirm.pop();
            }
            RegisterField::Button => {}
        },
        KeyCode::Char(c) => match app.register_focus {
            RegisterField::Name => {
                if can_add_name_char(app.register_name.len(), c) {
                    app.register_name.push(c);
                }
            }
            RegisterField::Email => {
                if can_add_email_char(app.register_email.len(), c) {
                    app.register_email.push(c);
                }
            }
            RegisterField::Password => {
                if can_add_password_char(app.register_password.len(), c) {
                    app.register_password.push(c);
                }
            }
            RegisterField::ConfirmPassword => {
                if can_add_password_char(app.register_confirm.len(), c) {
                    app.register_confirm.push(c);
                }
            }
            RegisterField::Button => {}
        },
        _ => {}
    }
    Ok(false)
}

async fn handle_reset_input(app: &mut App, key: KeyEvent) -> Result<bool> {
    if key.modifiers.contains(KeyModifiers::CONTROL) {
        return Ok(false);
    }

    if key.code == KeyCode::Esc {
        // Abandoning the view discards the challenge and its countdown.
        app.navigate(View::Login);
        return Ok(false);
    }

    match app.reset_step() {
        None => {}
        Some(ResetStep::Idle) => handle_reset_request_input(app, key).await,
        Some(ResetStep::AwaitingOtp) => handle_reset_redeem_input(app, key).await,
        Some(ResetStep::Expired) => {
            if matches!(key.code, KeyCode::Enter | KeyCode::Char('r')) {
                app.restart_reset();
            }
        }
    }
    Ok(false)
}

async fn handle_reset_request_input(app: &mut App, key: KeyEvent) {
    match key.code {
        KeyCode::Down | KeyCode::Tab | KeyCode::Up | KeyCode::BackTab => {
            app.reset_focus = match app.reset_focus {
                ResetFocus::Email => ResetFocus::RequestButton,
                _ => ResetFocus::Email,
            };
        }
        KeyCode::Enter => match app.reset_focus {
            ResetFocus::RequestButton => {
                app.request_reset_otp().await;
            }
            _ => {
                app.reset_focus = ResetFocus::RequestButton;
            }
        },
        KeyCode::Backspace => {
            if app.reset_focus == ResetFocus::Email {
                app.reset_email.pop();
            }
        }
        KeyCode::Char(c) => {
            if app.reset_focus == ResetFocus::Email && can_add_email_char(app.reset_email.len(), c)
            {
                app.reset_email.push(c);
            }
        }
        _ => {}
    }
}

fn next_redeem_focus(focus: ResetFocus) -> ResetFocus {
    match focus {
        ResetFocus::Otp => ResetFocus::NewPassword,
        ResetFocus::NewPassword => ResetFocus::ConfirmPassword,
        ResetFocus::ConfirmPassword => ResetFocus::SubmitButton,
        _ => ResetFocus::Otp,
    }
}

fn prev_redeem_focus(focus: ResetFocus) -> ResetFocus {
    match focus {
        ResetFocus::Otp => ResetFocus::SubmitButton,
        ResetFocus::NewPassword => ResetFocus::Otp,
        ResetFocus::ConfirmPassword => ResetFocus::NewPassword,
        _ => ResetFocus::ConfirmPassword,
    }
}

async fn handle_reset_redeem_input(app: &mut App, key: KeyEvent) {
    match key.code {
        KeyCode::Down | KeyCode::Tab => {
            app.reset_focus = next_redeem_focus(app.reset_focus);
        }
        KeyCode::Up | KeyCode::BackTab => {
            app.reset_focus = prev_redeem_focus(app.reset_focus);
        }
        KeyCode::Enter => match app.reset_focus {
            ResetFocus::SubmitButton => {
                app.submit_reset().await;
            }
            other => {
                app.reset_focus = next_redeem_focus(other);
            }
        },
        KeyCode::Backspace => match app.reset_focus {
            ResetFocus::Otp => {
                if let Some(flow) = app.reset.as_mut() {
                    flow.otp.backspace();
                }
            }
            ResetFocus::NewPassword => {
                app.reset_new_password.pop();
            }
            ResetFocus::ConfirmPassword => {
                app.reset_confirm.pop();
            }
            _ => {}
        },
        KeyCode::Char(c) => match app.reset_focus {
            ResetFocus::Otp => {
                // The slot model accepts digits only and advances itself.
                if let Some(flow) = app.reset.as_mut() {
                    flow.otp.enter(c);
                }
            }
            ResetFocus::NewPassword => {
                if can_add_password_char(app.reset_new_password.len(), c) {
                    app.reset_new_password.push(c);
                }
            }
            ResetFocus::ConfirmPassword => {
                if can_add_password_char(app.reset_confirm.len(), c) {
                    app.reset_confirm.push(c);
                }
            }
            _ => {}
        },
        _ => {}
    }
}

fn handle_dashboard_input(app: &mut App, key: KeyEvent) -> bool {
    match key.code {
        KeyCode::Char('q') => {
            return true;
        }
        KeyCode::Char('r') => {
            app.refresh_users();
        }
        KeyCode::Char('l') => {
            app.logout();
        }
        KeyCode::Down | KeyCode::Char('j') => {
            if app.users_selection + 1 < app.users.len() {
                app.users_selection += 1;
            }
        }
        KeyCode::Up | KeyCode::Char('k') => {
            app.users_selection = app.users_selection.saturating_sub(1);
        }
        KeyCode::Home | KeyCode::Char('g') => {
            app.users_selection = 0;
        }
        KeyCode::End | KeyCode::Char('G') => {
            app.users_selection = app.users.len().saturating_sub(1);
        }
        _ => {}
    }
    false
}
