//! Application state management for stockdeck.
//!
//! This module contains the core `App` struct that owns the session,
//! the API client, the password-reset flow and its countdown timer, all
//! form state, and the background event channel. Every state mutation
//! happens on the main event loop: remote auth calls are awaited inline
//! by the input handler, and background results arrive as `AppEvent`s
//! drained between frames.

use std::env;
use std::io::{self, Write};

use anyhow::Result;
use chrono::Utc;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::api::ApiClient;
use crate::auth::{CredentialStore, SessionStore};
use crate::cache::CacheManager;
use crate::config::Config;
use crate::gate::{self, View};
use crate::models::User;
use crate::reset::{CountdownTimer, ResetFlow, ResetStep};
use crate::validate::{self, Field, FieldErrors};

// ============================================================================
// Constants
// ============================================================================

/// Buffer size for the background event channel.
/// Roster results plus one countdown pulse per second fit with headroom.
const CHANNEL_BUFFER_SIZE: usize = 32;

/// Maximum length for email inputs.
const MAX_EMAIL_LENGTH: usize = 64;

/// Maximum length for password inputs.
/// 128 chars accommodates password managers and passphrases.
const MAX_PASSWORD_LENGTH: usize = 128;

/// Maximum length for the name input.
const MAX_NAME_LENGTH: usize = 50;

// ============================================================================
// Form focus types
// ============================================================================

/// Login form focus state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginField {
    Email,
    Password,
    Button,
}

impl LoginField {
    pub fn next(&self) -> Self {
        match self {
            LoginField::Email => LoginField::Password,
            LoginField::Password => LoginField::Button,
            LoginField::Button => LoginField::Email,
        }
    }

    pub fn prev(&self) -> Self {
        match self {
            LoginField::Email => LoginField::Button,
            LoginField::Password => LoginField::Email,
            LoginField::Button => LoginField::Password,
        }
    }
}

/// Register form focus state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegisterField {
    Name,
    Email,
    Password,
    ConfirmPassword,
    Button,
}

impl RegisterField {
    pub fn next(&self) -> Self {
        match self {
            RegisterField::Name => RegisterField::Email,
            RegisterField::Email => RegisterField::Password,
            RegisterField::Password => RegisterField::ConfirmPassword,
            RegisterField::ConfirmPassword => RegisterField::Button,
            RegisterField::Button => RegisterField::Name,
        }
    }

    pub fn prev(&self) -> Self {
        match self {
            RegisterField::Name => RegisterField::Button,
            RegisterField::Email => RegisterField::Name,
            RegisterField::Password => RegisterField::Email,
            RegisterField::ConfirmPassword => RegisterField::Password,
            RegisterField::Button => RegisterField::ConfirmPassword,
        }
    }
}

/// Reset view focus state. The first two are the request phase, the
/// rest the redeem phase; cycling is handled per phase by the input
/// layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResetFocus {
    Email,
    RequestButton,
    Otp,
    NewPassword,
    ConfirmPassword,
    SubmitButton,
}

// ============================================================================
// Background events
// ============================================================================

/// Events delivered to the main loop from background tasks.
pub enum AppEvent {
    /// Contributor roster fetched successfully
    Users(Vec<User>),
    /// A roster fetch failed
    UsersFailed(String),
    /// One-second countdown pulse for the reset challenge
    ResetTick,
}

// ============================================================================
// Main Application Struct
// ============================================================================

/// Main application state container
pub struct App {
    // Core services
    pub config: Config,
    pub session: SessionStore,
    pub api: ApiClient,
    pub cache: CacheManager,

    // Navigation
    pub view: View,

    // Login form state
    pub login_email: String,
    pub login_password: String,
    pub login_focus: LoginField,
    pub login_errors: FieldErrors,

    // Register form state
    pub register_name: String,
    pub register_email: String,
    pub register_password: String,
    pub register_confirm: String,
    pub register_focus: RegisterField,
    pub register_errors: FieldErrors,

    // Password reset state; the flow exists only while the view does
    pub reset: Option<ResetFlow>,
    pub reset_email: String,
    pub reset_new_password: String,
    pub reset_confirm: String,
    pub reset_focus: ResetFocus,
    reset_timer: Option<CountdownTimer>,

    // Dashboard state
    pub users: Vec<User>,
    pub users_selection: usize,
    pub roster_age: Option<String>,

    // Status message shown in the status bar
    pub status_message: Option<String>,

    // Background event channel
    events_tx: mpsc::Sender<AppEvent>,
    events_rx: mpsc::Receiver<AppEvent>,
}

impl App {
    /// Create a new application instance, restoring any persisted session
    pub fn new() -> Result<Self> {
        let config = match Config::load() {
            Ok(c) => c,
            Err(e) => {
                warn!(error = %e, "Failed to load config, using defaults");
                Config::default()
            }
        };

        let mut session = SessionStore::new(Config::state_dir()?);
        let restored = session.bootstrap();
        debug!(restored, "Session bootstrap complete");

        let mut api = ApiClient::new(config.base_url.clone())?;
        if let Some(token) = session.token() {
            api.set_token(token.to_string());
        }

        let cache = CacheManager::new(Config::cache_dir()?)?;

        let (events_tx, events_rx) = mpsc::channel(CHANNEL_BUFFER_SIZE);

        // Prefill the login form from env, config, and the keychain.
        let login_email = env::var("STOCKDECK_EMAIL")
            .ok()
            .or_else(|| config.last_email.clone())
            .unwrap_or_default();
        let login_password = env::var("STOCKDECK_PASSWORD")
            .ok()
            .or_else(|| {
                if login_email.is_empty() {
                    None
                } else {
                    CredentialStore::get_password(&login_email).ok()
                }
            })
            .unwrap_or_default();
        let login_focus = if login_email.is_empty() {
            LoginField::Email
        } else {
            LoginField::Password
        };

        let view = gate::fallback(session.is_authenticated());

        Ok(Self {
            config,
            session,
            api,
            cache,

            view,

            login_email,
            login_password,
            login_focus,
            login_errors: FieldErrors::new(),

            register_name: String::new(),
            register_email: String::new(),
            register_password: String::new(),
            register_confirm: String::new(),
            register_focus: RegisterField::Name,
            register_errors: FieldErrors::new(),

            reset: None,
            reset_email: String::new(),
            reset_new_password: String::new(),
            reset_confirm: String::new(),
            reset_focus: ResetFocus::Email,
            reset_timer: None,

            users: Vec::new(),
            users_selection: 0,
            roster_age: None,

            status_message: None,

            events_tx,
            events_rx,
        })
    }

    /// Run view-entry effects for the startup view.
    pub fn on_start(&mut self) {
        self.enter_view(self.view);
    }

    // =========================================================================
    // Navigation
    // =========================================================================

    /// Navigate through the gate; a redirect lands on the decided view.
    pub fn navigate(&mut self, target: View) {
        let decided = gate::resolve(target, self.session.is_authenticated());
        if decided != self.view {
            self.leave_view(self.view);
            self.view = decided;
            self.enter_view(decided);
        }
    }

    fn enter_view(&mut self, view: View) {
        match view {
            View::ResetPassword => {
                self.reset = Some(ResetFlow::new());
                self.reset_email.clear();
                self.reset_new_password.clear();
                self.reset_confirm.clear();
                self.reset_focus = ResetFocus::Email;
            }
            View::Dashboard => {
                self.load_users_from_cache();
                self.refresh_users();
            }
            View::Login | View::Register => {}
        }
    }

    fn leave_view(&mut self, view: View) {
        if view == View::ResetPassword {
            // Discarding the flow must also stop its countdown.
            self.disarm_reset_timer();
            self.reset = None;
            self.reset_new_password.clear();
            self.reset_confirm.clear();
        }
    }

    // =========================================================================
    // Authentication
    // =========================================================================

    /// Attempt login with the credentials from the login form
    pub async fn attempt_login(&mut self) {
        let email = self.login_email.trim().to_string();
        let password = self.login_password.clone();

        self.login_errors = validate::validate_login(&email, &password);
        if !self.login_errors.is_empty() {
            return;
        }

        match self.api.login(&email, &password).await {
            Ok(payload) => {
                let (token, user) = payload.into_parts();

                if let Err(e) = CredentialStore::store(&email, &password) {
                    warn!(error = %e, "Failed to store credentials");
                }

                self.config.last_email = Some(email);
                if let Err(e) = self.config.save() {
                    warn!(error = %e, "Failed to save config");
                }

                self.api.set_token(token.clone());
                self.session.set_credentials(token, user);

                self.login_password.clear();
                self.login_errors.clear();
                info!("Login successful");
                self.navigate(View::Dashboard);
            }
            Err(e) => {
                error!(error = %e, "Login failed");
                self.login_errors.set(Field::Email, login_error_message(&e));
            }
        }
    }

    /// Attempt registration with the register form state
    pub async fn attempt_register(&mut self) {
        let name = self.register_name.trim().to_string();
        let email = self.register_email.trim().to_string();
        let password = self.register_password.clone();
        let confirm = self.register_confirm.clone();

        self.register_errors = validate::validate_register(&name, &email, &password, &confirm);
        if !self.register_errors.is_empty() {
            return;
        }

        match self.api.register(&name, &email, &password).await {
            Ok(payload) => {
                let (token, user) = payload.into_parts();

                if let Err(e) = CredentialStore::store(&email, &password) {
                    warn!(error = %e, "Failed to store credentials");
                }

                self.config.last_email = Some(email);
                if let Err(e) = self.config.save() {
                    warn!(error = %e, "Failed to save config");
                }

                self.api.set_token(token.clone());
                self.session.set_credentials(token, user);

                self.register_password.clear();
                self.register_confirm.clear();
                info!("Registration successful");
                self.navigate(View::Dashboard);
            }
            Err(e) => {
                error!(error = %e, "Registration failed");
                self.register_errors
                    .set(Field::Email, "Registration failed. Please try again.");
            }
        }
    }

    /// Sign out: clear the session wholesale and return to the login view
    pub fn logout(&mut self) {
        self.session.clear();
        self.api.clear_token();
        self.users.clear();
        self.users_selection = 0;
        self.roster_age = None;
        info!("Logged out");
        self.navigate(View::Login);
    }

    /// Interactive login for the `--login` CLI path
    pub async fn login_interactive(&mut self) -> Result<()> {
        println!("\n=== stockdeck login ===\n");

        let email = if let Some(ref last) = self.config.last_email {
            print!("Email [{}]: ", last);
            io::stdout().flush()?;

            let mut input = String::new();
            io::stdin().read_line(&mut input)?;
            let input = input.trim();

            if input.is_empty() {
                last.clone()
            } else {
                input.to_string()
            }
        } else {
            Self::prompt_email()?
        };

        let password = if CredentialStore::has_credentials(&email) {
            print!("Use stored password? [Y/n]: ");
            io::stdout().flush()?;

            let mut input = String::new();
            io::stdin().read_line(&mut input)?;

            if input.trim().to_lowercase() != "n" {
                CredentialStore::get_password(&email)?
            } else {
                Self::prompt_password()?
            }
        } else {
            Self::prompt_password()?
        };

        println!("\nSigning in...");

        let payload = self.api.login(&email, &password).await?;
        let (token, user) = payload.into_parts();

        CredentialStore::store(&email, &password)?;

        self.config.last_email = Some(email);
        self.config.save()?;

        self.api.set_token(token.clone());
        self.session.set_credentials(token, user);

        println!("Login successful!\n");
        Ok(())
    }

    fn prompt_email() -> Result<String> {
        print!("Email: ");
        io::stdout().flush()?;

        let mut email = String::new();
        io::stdin().read_line(&mut email)?;
        Ok(email.trim().to_string())
    }

    fn prompt_password() -> Result<String> {
        let password = rpassword::prompt_password("Password: ")?;
        Ok(password)
    }

    // =========================================================================
    // Password reset
    // =========================================================================

    /// Phase one of the reset flow: request a passcode for the entered
    /// address. Validation failures never reach the network.
    pub async fn request_reset_otp(&mut self) {
        let email = match self.reset.as_mut() {
            Some(flow) => flow.begin_request(&self.reset_email),
            None => return,
        };
        let Some(email) = email else { return };

        let ok = match self.api.request_reset(&email).await {
            Ok(()) => true,
            Err(e) => {
                warn!(error = %e, "OTP request failed");
                false
            }
        };

        if let Some(flow) = self.reset.as_mut() {
            flow.apply_request_outcome(ok, Utc::now());
        }
        if self.reset_step() == Some(ResetStep::AwaitingOtp) {
            self.reset_focus = ResetFocus::Otp;
            self.arm_reset_timer();
        }
    }

    /// Phase two: redeem the passcode for a new password.
    pub async fn submit_reset(&mut self) {
        let request = match self.reset.as_mut() {
            Some(flow) => {
                flow.begin_submit(&self.reset_new_password, &self.reset_confirm, Utc::now())
            }
            None => return,
        };
        // An expiry discovered here ends the countdown as well.
        if self.reset_step() != Some(ResetStep::AwaitingOtp) {
            self.disarm_reset_timer();
        }
        let Some(request) = request else { return };

        let ok = match self
            .api
            .reset_password(&request.email, &request.otp, &request.new_password)
            .await
        {
            Ok(()) => true,
            Err(e) => {
                warn!(error = %e, "Password reset failed");
                false
            }
        };

        if let Some(flow) = self.reset.as_mut() {
            flow.apply_submit_outcome(ok);
        }
        if ok {
            self.disarm_reset_timer();
            self.status_message =
                Some("Password updated. Sign in with your new password.".to_string());
            self.navigate(View::Login);
        }
    }

    /// Restart an expired challenge from the request phase.
    pub fn restart_reset(&mut self) {
        let Some(flow) = self.reset.as_mut() else { return };
        if flow.step() != ResetStep::Expired {
            return;
        }
        flow.restart();
        self.reset_new_password.clear();
        self.reset_confirm.clear();
        self.reset_focus = ResetFocus::Email;
    }

    pub fn reset_step(&self) -> Option<ResetStep> {
        self.reset.as_ref().map(|f| f.step())
    }

    fn arm_reset_timer(&mut self) {
        self.disarm_reset_timer();
        let tx = self.events_tx.clone();
        self.reset_timer = Some(CountdownTimer::arm(tx, || AppEvent::ResetTick));
    }

    fn disarm_reset_timer(&mut self) {
        if let Some(timer) = self.reset_timer.take() {
            timer.disarm();
        }
    }

    fn on_reset_tick(&mut self) {
        let Some(flow) = self.reset.as_mut() else {
            self.disarm_reset_timer();
            return;
        };
        flow.tick(Utc::now());
        if flow.step() != ResetStep::AwaitingOtp {
            self.disarm_reset_timer();
        }
    }

    // =========================================================================
    // Roster
    // =========================================================================

    fn load_users_from_cache(&mut self) {
        if let Ok(Some(cached)) = self.cache.load_users() {
            self.roster_age = Some(if cached.is_stale() {
                format!("{} (stale)", cached.age_display())
            } else {
                cached.age_display()
            });
            self.users = cached.data;
        }
    }

    /// Spawn a background roster fetch; the result arrives as an event.
    pub fn refresh_users(&mut self) {
        let api = self.api.clone();
        let tx = self.events_tx.clone();

        tokio::spawn(async move {
            match api.fetch_users().await {
                Ok(users) => {
                    let _ = tx.send(AppEvent::Users(users)).await;
                }
                Err(e) => {
                    let _ = tx.send(AppEvent::UsersFailed(e.to_string())).await;
                }
            }
        });

        self.status_message = Some("Refreshing roster...".to_string());
    }

    // =========================================================================
    // Background events
    // =========================================================================

    /// Drain and apply pending background events. Called between frames.
    pub fn process_events(&mut self) {
        let mut events = Vec::new();
        while let Ok(event) = self.events_rx.try_recv() {
            events.push(event);
        }
        for event in events {
            self.apply_event(event);
        }
    }

    fn apply_event(&mut self, event: AppEvent) {
        match event {
            AppEvent::Users(users) => {
                if let Err(e) = self.cache.save_users(&users) {
                    warn!(error = %e, "Failed to cache roster");
                }
                self.users = users;
                if self.users_selection >= self.users.len() {
                    self.users_selection = 0;
                }
                self.roster_age = Some("just now".to_string());
                self.status_message = None;
            }
            AppEvent::UsersFailed(msg) => {
                error!(error = %msg, "Roster refresh failed");
                self.status_message =
                    Some("Could not refresh roster. Showing cached data.".to_string());
            }
            AppEvent::ResetTick => self.on_reset_tick(),
        }
    }
}

// ============================================================================
// Input helpers
// ============================================================================

/// Whether another character may be appended to an email input
pub fn can_add_email_char(len: usize, c: char) -> bool {
    len < MAX_EMAIL_LENGTH && !c.is_control() && !c.is_whitespace()
}

/// Whether another character may be appended to a password input
pub fn can_add_password_char(len: usize, c: char) -> bool {
    len < MAX_PASSWORD_LENGTH && !c.is_control()
}

/// Whether another character may be appended to the name input
pub fn can_add_name_char(len: usize, c: char) -> bool {
    len < MAX_NAME_LENGTH && !c.is_control()
}

/// Map a login failure to the message shown on the form.
fn login_error_message(e: &anyhow::Error) -> String {
    let text = e.to_string().to_lowercase();
    if text.contains("unauthorized") || text.contains("rejected") || text.contains("401") {
        "Invalid email or password".to_string()
    } else if text.contains("network") || text.contains("connect") {
        "Unable to connect to server. Check your internet connection.".to_string()
    } else if text.contains("timeout") {
        "Connection timed out. Please try again.".to_string()
    } else {
        format!("Login failed: {}", e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::ApiError;

    #[test]
    fn test_login_error_message() {
        let unauthorized: anyhow::Error = ApiError::Unauthorized.into();
        assert_eq!(login_error_message(&unauthorized), "Invalid email or password");

        let rejected: anyhow::Error = ApiError::Rejected("bad credentials".to_string()).into();
        assert_eq!(login_error_message(&rejected), "Invalid email or password");

        let other = anyhow::anyhow!("something odd");
        assert!(login_error_message(&other).starts_with("Login failed:"));
    }

    #[test]
    fn test_can_add_chars() {
        assert!(can_add_email_char(0, 'a'));
        assert!(!can_add_email_char(0, ' '));
        assert!(!can_add_email_char(MAX_EMAIL_LENGTH, 'a'));

        assert!(can_add_password_char(0, ' '));
        assert!(!can_add_password_char(0, '\u{8}'));
        assert!(!can_add_password_char(MAX_PASSWORD_LENGTH, 'a'));

        assert!(can_add_name_char(0, ' '));
        assert!(!can_add_name_char(MAX_NAME_LENGTH, 'x'));
    }

    #[test]
    fn test_focus_cycles() {
        let mut focus = LoginField::Email;
        for _ in 0..3 {
            focus = focus.next();
        }
        assert_eq!(focus, LoginField::Email);
        assert_eq!(LoginField::Email.prev(), LoginField::Button);

        let mut reg = RegisterField::Name;
        for _ in 0..5 {
            reg = reg.next();
        }
        assert_eq!(reg, RegisterField::Name);
        assert_eq!(RegisterField::Name.prev(), RegisterField::Button);
    }
}
