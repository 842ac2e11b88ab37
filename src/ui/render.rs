use chrono::Utc;
use ratatui::{
    layout::{Constraint, Direction, Layout, Rect},
    text::{Line, Span},
    widgets::{Block, Borders, Clear, Paragraph},
    Frame,
};

use crate::app::{App, LoginField, RegisterField, ResetFocus};
use crate::gate::View;
use crate::reset::{ResetFlow, ResetStep, OTP_SLOTS};
use crate::utils::{format_countdown, truncate_string};
use crate::validate::{Field, FieldErrors};

use super::styles;

/// Interior width of form value boxes.
const FIELD_WIDTH: usize = 24;

/// Width of the centered form dialogs.
const DIALOG_WIDTH: u16 = 54;

pub fn render(frame: &mut Frame, app: &App) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(2), // Title bar
            Constraint::Min(10),   // Main content
            Constraint::Length(2), // Status bar
        ])
        .split(frame.area());

    render_title_bar(frame, app, chunks[0]);

    match app.view {
        View::Login => render_login(frame, app, chunks[1]),
        View::Register => render_register(frame, app, chunks[1]),
        View::ResetPassword => render_reset(frame, app, chunks[1]),
        View::Dashboard => render_dashboard(frame, app, chunks[1]),
    }

    render_status_bar(frame, app, chunks[2]);
}

fn render_title_bar(frame: &mut Frame, app: &App, area: Rect) {
    let title = "  stockdeck";
    let view_title = app.view.title();

    let title_line = Line::from(vec![
        Span::styled(title, styles::title_style()),
        Span::raw(" ".repeat(
            area.width
                .saturating_sub(title.len() as u16 + view_title.len() as u16 + 2) as usize,
        )),
        Span::styled(view_title, styles::muted_style()),
    ]);

    let block = Block::default()
        .borders(Borders::BOTTOM)
        .border_style(styles::muted_style());

    frame.render_widget(Paragraph::new(title_line).block(block), area);
}

/// A labeled, bracketed input line.
fn field_line(label: &str, value: &str, focused: bool, masked: bool) -> Line<'static> {
    let shown = if masked {
        "*".repeat(value.chars().count().min(FIELD_WIDTH))
    } else {
        truncate_string(value, FIELD_WIDTH)
    };
    let style = if focused {
        styles::selected_style()
    } else {
        styles::list_item_style()
    };
    let cursor = if focused { "▌" } else { "" };
    Line::from(vec![
        Span::raw("  "),
        Span::styled(format!("{:<18}", label), styles::muted_style()),
        Span::styled("[", styles::muted_style()),
        Span::styled(format!("{:<width$}{}", shown, cursor, width = FIELD_WIDTH), style),
        Span::styled("]", styles::muted_style()),
    ])
}

fn button_line(label: &str, focused: bool) -> Line<'static> {
    let style = if focused {
        styles::selected_style()
    } else {
        styles::list_item_style()
    };
    let text = if focused {
        format!(" ▶ {} ◀ ", label)
    } else {
        format!("   {}   ", label)
    };
    Line::from(vec![
        Span::raw("                ["),
        Span::styled(text, style),
        Span::raw("]"),
    ])
}

fn push_error_line(lines: &mut Vec<Line<'static>>, errors: &FieldErrors, field: Field) {
    if let Some(msg) = errors.get(field) {
        lines.push(Line::from(Span::styled(
            format!("    {}", msg),
            styles::error_style(),
        )));
    }
}

/// Render a centered bordered dialog sized to its contents.
fn render_dialog(frame: &mut Frame, area: Rect, lines: Vec<Line<'static>>) {
    let height = lines.len() as u16 + 2;
    let dialog = centered_rect_fixed(DIALOG_WIDTH, height, area);

    frame.render_widget(Clear, dialog);

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(styles::border_style(true));

    frame.render_widget(Paragraph::new(lines).block(block), dialog);
}

fn render_login(frame: &mut Frame, app: &App, area: Rect) {
    let mut lines = vec![
        Line::from(Span::styled(
            "              ░ Stock Image ░",
            styles::title_style(),
        )),
        Line::from(Span::styled(
            "       Login to access stock images.",
            styles::muted_style(),
        )),
        Line::from(""),
    ];

    lines.push(field_line(
        "Email:",
        &app.login_email,
        app.login_focus == LoginField::Email,
        false,
    ));
    push_error_line(&mut lines, &app.login_errors, Field::Email);

    lines.push(field_line(
        "Password:",
        &app.login_password,
        app.login_focus == LoginField::Password,
        true,
    ));
    push_error_line(&mut lines, &app.login_errors, Field::Password);

    lines.push(Line::from(""));
    lines.push(button_line("Login", app.login_focus == LoginField::Button));
    lines.push(Line::from(""));
    lines.push(Line::from(vec![
        Span::styled("  Ctrl+R", styles::help_key_style()),
        Span::styled(" register   ", styles::muted_style()),
        Span::styled("Ctrl+O", styles::help_key_style()),
        Span::styled(" forgot password", styles::muted_style()),
    ]));

    render_dialog(frame, area, lines);
}

fn render_register(frame: &mut Frame, app: &App, area: Rect) {
    let mut lines = vec![
        Line::from(Span::styled(
            "              ░ Stock Image ░",
            styles::title_style(),
        )),
        Line::from(Span::styled(
            "       Register now for stock images.",
            styles::muted_style(),
        )),
        Line::from(""),
    ];

    lines.push(field_line(
        "Name:",
        &app.register_name,
        app.register_focus == RegisterField::Name,
        false,
    ));
    push_error_line(&mut lines, &app.register_errors, Field::Name);

    lines.push(field_line(
        "Email:",
        &app.register_email,
        app.register_focus == RegisterField::Email,
        false,
    ));
    push_error_line(&mut lines, &app.register_errors, Field::Email);

    lines.push(field_line(
        "Password:",
        &app.register_password,
        app.register_focus == RegisterField::Password,
        true,
    ));
    push_error_line(&mut lines, &app.register_errors, Field::Password);

    lines.push(field_line(
        "Confirm password:",
        &app.register_confirm,
        app.register_focus == RegisterField::ConfirmPassword,
        true,
    ));
    push_error_line(&mut lines, &app.register_errors, Field::ConfirmPassword);

    lines.push(Line::from(""));
    lines.push(button_line(
        "Register",
        app.register_focus == RegisterField::Button,
    ));
    lines.push(Line::from(""));
    lines.push(Line::from(vec![
        Span::styled("  Esc", styles::help_key_style()),
        Span::styled(" back to sign in", styles::muted_style()),
    ]));

    render_dialog(frame, area, lines);
}

fn render_reset(frame: &mut Frame, app: &App, area: Rect) {
    let Some(flow) = &app.reset else { return };

    let mut lines = vec![
        Line::from(Span::styled(
            "              ░ Stock Image ░",
            styles::title_style(),
        )),
        Line::from(Span::styled(
            "          Reset Your Password",
            styles::muted_style(),
        )),
        Line::from(""),
    ];

    match flow.step() {
        ResetStep::Idle => {
            lines.push(field_line(
                "Email:",
                &app.reset_email,
                app.reset_focus == ResetFocus::Email,
                false,
            ));
            push_error_line(&mut lines, flow.errors(), Field::Email);

            lines.push(Line::from(""));
            lines.push(button_line(
                "Request OTP",
                app.reset_focus == ResetFocus::RequestButton,
            ));
        }
        ResetStep::AwaitingOtp => {
            lines.push(Line::from(Span::styled(
                format!("    Passcode sent to {}", flow.email()),
                styles::muted_style(),
            )));
            lines.push(Line::from(""));
            lines.push(otp_line(flow, app.reset_focus == ResetFocus::Otp));
            push_error_line(&mut lines, flow.errors(), Field::Otp);

            let remaining = flow.remaining_secs(Utc::now());
            lines.push(Line::from(Span::styled(
                format!("    Time remaining: {}", format_countdown(remaining)),
                styles::error_style(),
            )));
            lines.push(Line::from(""));

            lines.push(field_line(
                "New password:",
                &app.reset_new_password,
                app.reset_focus == ResetFocus::NewPassword,
                true,
            ));
            push_error_line(&mut lines, flow.errors(), Field::NewPassword);

            lines.push(field_line(
                "Confirm password:",
                &app.reset_confirm,
                app.reset_focus == ResetFocus::ConfirmPassword,
                true,
            ));
            push_error_line(&mut lines, flow.errors(), Field::ConfirmPassword);

            lines.push(Line::from(""));
            lines.push(button_line(
                "Reset Password",
                app.reset_focus == ResetFocus::SubmitButton,
            ));
        }
        ResetStep::Expired => {
            lines.push(Line::from(Span::styled(
                "    OTP has expired. Please request a new one.",
                styles::error_style(),
            )));
            lines.push(Line::from(""));
            lines.push(button_line("Request new OTP", true));
        }
    }

    lines.push(Line::from(""));
    lines.push(Line::from(vec![
        Span::styled("  Esc", styles::help_key_style()),
        Span::styled(" back to sign in", styles::muted_style()),
    ]));

    render_dialog(frame, area, lines);
}

/// The four passcode slots; the focused slot carries the highlight.
fn otp_line(flow: &ResetFlow, focused: bool) -> Line<'static> {
    let mut spans = vec![
        Span::raw("  "),
        Span::styled(format!("{:<18}", "OTP:"), styles::muted_style()),
    ];
    for i in 0..OTP_SLOTS {
        let digit = flow.otp.slot(i).unwrap_or(' ');
        let style = if focused && flow.otp.focus() == i {
            styles::selected_style()
        } else {
            styles::list_item_style()
        };
        spans.push(Span::styled(format!("[{}]", digit), style));
        if i + 1 < OTP_SLOTS {
            spans.push(Span::raw(" "));
        }
    }
    Line::from(spans)
}

fn render_dashboard(frame: &mut Frame, app: &App, area: Rect) {
    let mut lines: Vec<Line> = Vec::new();

    if let Some(user) = app.session.user() {
        lines.push(Line::from(vec![
            Span::styled("  Signed in as ", styles::muted_style()),
            Span::styled(user.display_name().to_string(), styles::highlight_style()),
            Span::styled(format!("  <{}>", user.email), styles::muted_style()),
        ]));
    }
    lines.push(Line::from(""));

    lines.push(Line::from(Span::styled(
        format!("  Contributors ({})", app.users.len()),
        styles::title_style(),
    )));
    lines.push(Line::from(""));

    // Simple window around the selection; header and borders take 6 rows.
    let visible = area.height.saturating_sub(6).max(1) as usize;
    let offset = app.users_selection.saturating_sub(visible.saturating_sub(1));

    for (i, user) in app.users.iter().enumerate().skip(offset).take(visible) {
        let style = if i == app.users_selection {
            styles::selected_style()
        } else {
            styles::list_item_style()
        };
        lines.push(Line::from(Span::styled(
            format!(
                "  {:<28} {}",
                truncate_string(user.display_name(), 26),
                truncate_string(&user.email, 32)
            ),
            style,
        )));
    }

    if app.users.is_empty() {
        lines.push(Line::from(Span::styled(
            "  No contributors loaded yet.",
            styles::muted_style(),
        )));
    }

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(styles::border_style(false));

    frame.render_widget(Paragraph::new(lines).block(block), area);
}

fn render_status_bar(frame: &mut Frame, app: &App, area: Rect) {
    let hints = match app.view {
        View::Login => "Tab next · Enter select · Ctrl+R register · Ctrl+O reset · Esc quit",
        View::Register => "Tab next · Enter select · Esc back",
        View::ResetPassword => "Tab next · Enter select · Esc back",
        View::Dashboard => "j/k scroll · r refresh · l logout · q quit",
    };

    let left = match app.status_message {
        Some(ref msg) => msg.as_str(),
        None => hints,
    };

    let right = match app.view {
        View::Dashboard => match app.roster_age {
            Some(ref age) => format!("roster {} ", age),
            None => String::new(),
        },
        _ => String::new(),
    };

    let padding = area
        .width
        .saturating_sub(left.chars().count() as u16 + right.chars().count() as u16 + 2)
        as usize;

    let line = Line::from(vec![
        Span::raw(" "),
        Span::raw(left.to_string()),
        Span::raw(" ".repeat(padding)),
        Span::styled(right, styles::muted_style()),
    ]);

    frame.render_widget(Paragraph::new(line).style(styles::status_bar_style()), area);
}

/// Create a centered rectangle with fixed dimensions
fn centered_rect_fixed(width: u16, height: u16, r: Rect) -> Rect {
    let x = r.x + (r.width.saturating_sub(width)) / 2;
    let y = r.y + (r.height.saturating_sub(height)) / 2;
    Rect::new(x, y, width.min(r.width), height.min(r.height))
}
