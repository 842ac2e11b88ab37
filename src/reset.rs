//! Password-reset challenge state machine.
//!
//! A reset has two phases: request a passcode for an email address,
//! then redeem the passcode together with a new password before it
//! expires. `ResetFlow` owns every piece of challenge state and only
//! moves through the transitions below.
//!
//! Remote calls are split into a `begin_*` step that validates and
//! yields the payload to send, and an `apply_*_outcome` step that folds
//! the result back in. The caller dispatches the call in between, so no
//! challenge state mutates while a call is in flight, and the flow
//! stays testable without a network or a clock.

use chrono::{DateTime, Duration, Utc};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::validate::{self, Field, FieldErrors};

/// Passcode lifetime in seconds (10 minutes).
pub const OTP_TTL_SECS: i64 = 600;

/// Number of passcode entry slots.
pub const OTP_SLOTS: usize = 4;

/// Server rejections are not distinguished from bad input; each phase
/// collapses them into one message.
const REQUEST_FAILED_MSG: &str = "Failed to send OTP. Please try again.";
const RESET_FAILED_MSG: &str = "Failed to reset password. Please try again.";
const EXPIRED_MSG: &str = "OTP has expired. Please request a new one.";

// ============================================================================
// Passcode entry
// ============================================================================

/// Four-slot passcode entry model.
///
/// Only single ASCII digits are accepted. Focus advances on an accepted
/// digit and retreats when backspacing on an already-empty slot; the
/// rendering layer just reads `focus()` and `slot()`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OtpInput {
    slots: [Option<char>; OTP_SLOTS],
    focus: usize,
}

impl OtpInput {
    pub fn new() -> Self {
        Self::default()
    }

    /// Accept a digit into the focused slot. Non-digits are rejected and
    /// the focus does not move.
    pub fn enter(&mut self, c: char) {
        if !c.is_ascii_digit() {
            return;
        }
        self.slots[self.focus] = Some(c);
        if self.focus + 1 < OTP_SLOTS {
            self.focus += 1;
        }
    }

    /// Clear the focused slot, or move focus back when it is already empty.
    pub fn backspace(&mut self) {
        if self.slots[self.focus].is_some() {
            self.slots[self.focus] = None;
        } else if self.focus > 0 {
            self.focus -= 1;
        }
    }

    pub fn focus(&self) -> usize {
        self.focus
    }

    pub fn slot(&self, index: usize) -> Option<char> {
        self.slots.get(index).copied().flatten()
    }

    /// The digits entered so far, in slot order.
    pub fn value(&self) -> String {
        self.slots.iter().flatten().collect()
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }
}

// ============================================================================
// Challenge state machine
// ============================================================================

/// Where the challenge currently stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResetStep {
    /// Requesting a passcode for an email address
    Idle,
    /// Passcode sent; waiting for the user to redeem it
    AwaitingOtp,
    /// The passcode timed out; only a restart leaves this step
    Expired,
}

/// Everything the redeem call needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResetRequest {
    pub email: String,
    pub otp: String,
    pub new_password: String,
}

/// One in-progress password-reset attempt.
///
/// Created when the reset view is entered and discarded when it is
/// left; never persisted. The passcode and its expiry are only
/// meaningful while the step is `AwaitingOtp`.
#[derive(Debug)]
pub struct ResetFlow {
    email: String,
    step: ResetStep,
    pub otp: OtpInput,
    expires_at: Option<DateTime<Utc>>,
    errors: FieldErrors,
}

impl Default for ResetFlow {
    fn default() -> Self {
        Self::new()
    }
}

impl ResetFlow {
    pub fn new() -> Self {
        Self {
            email: String::new(),
            step: ResetStep::Idle,
            otp: OtpInput::new(),
            expires_at: None,
            errors: FieldErrors::new(),
        }
    }

    pub fn step(&self) -> ResetStep {
        self.step
    }

    pub fn email(&self) -> &str {
        &self.email
    }

    pub fn errors(&self) -> &FieldErrors {
        &self.errors
    }

    /// Seconds left before the passcode expires, clamped at zero.
    pub fn remaining_secs(&self, now: DateTime<Utc>) -> i64 {
        match self.expires_at {
            Some(at) => (at - now).num_seconds().max(0),
            None => 0,
        }
    }

    /// Phase one: validate the address and yield it for dispatch.
    /// On a validation failure the flow stays in `Idle` with the email
    /// error set and nothing is sent.
    pub fn begin_request(&mut self, email: &str) -> Option<String> {
        if self.step != ResetStep::Idle {
            return None;
        }
        let email = email.trim();
        let errors = validate::validate_reset_request(email);
        if !errors.is_empty() {
            self.errors = errors;
            return None;
        }
        self.email = email.to_string();
        Some(self.email.clone())
    }

    /// Fold the request-reset result back in. Success opens the redeem
    /// phase with a fresh passcode window and a clean slate; failure
    /// stays in `Idle` with a generic email error.
    pub fn apply_request_outcome(&mut self, ok: bool, now: DateTime<Utc>) {
        if self.step != ResetStep::Idle {
            return;
        }
        if ok {
            self.step = ResetStep::AwaitingOtp;
            self.expires_at = Some(now + Duration::seconds(OTP_TTL_SECS));
            self.otp.clear();
            self.errors.clear();
        } else {
            self.errors.clear();
            self.errors.set(Field::Email, REQUEST_FAILED_MSG);
        }
    }

    /// Periodic countdown update; the only transition not driven by the
    /// user. Once the window reaches zero the challenge expires.
    pub fn tick(&mut self, now: DateTime<Utc>) {
        if self.step == ResetStep::AwaitingOtp && self.remaining_secs(now) == 0 {
            self.step = ResetStep::Expired;
        }
    }

    /// Phase two: validate the redeem form and yield the request to
    /// dispatch. Only meaningful in `AwaitingOtp`. An expired window
    /// fails here without touching the network; field failures keep the
    /// timer running.
    pub fn begin_submit(
        &mut self,
        new_password: &str,
        confirm_password: &str,
        now: DateTime<Utc>,
    ) -> Option<ResetRequest> {
        if self.step != ResetStep::AwaitingOtp {
            return None;
        }
        if self.remaining_secs(now) == 0 {
            self.step = ResetStep::Expired;
            self.errors.clear();
            self.errors.set(Field::Otp, EXPIRED_MSG);
            return None;
        }
        let errors =
            validate::validate_reset_submit(&self.otp.value(), new_password, confirm_password);
        if !errors.is_empty() {
            self.errors = errors;
            return None;
        }
        self.errors.clear();
        Some(ResetRequest {
            email: self.email.clone(),
            otp: self.otp.value(),
            new_password: new_password.to_string(),
        })
    }

    /// Fold the reset-password result back in. Success ends the
    /// challenge and returns to `Idle` (the caller navigates away);
    /// failure keeps the redeem phase open with a generic error and the
    /// timer untouched.
    pub fn apply_submit_outcome(&mut self, ok: bool) {
        if self.step != ResetStep::AwaitingOtp {
            return;
        }
        if ok {
            self.step = ResetStep::Idle;
            self.otp.clear();
            self.expires_at = None;
            self.errors.clear();
        } else {
            self.errors.set(Field::NewPassword, RESET_FAILED_MSG);
        }
    }

    /// Throw away an expired challenge and return to the request phase.
    /// From any other step this is a no-op: an active challenge is never
    /// reset from here.
    pub fn restart(&mut self) {
        if self.step != ResetStep::Expired {
            return;
        }
        self.step = ResetStep::Idle;
        self.otp.clear();
        self.expires_at = None;
        self.errors.clear();
    }
}

// ============================================================================
// Countdown task
// ============================================================================

/// Cancellable once-per-second pulse for an active challenge.
///
/// Armed when the flow enters `AwaitingOtp`; every pulse lands on the
/// app event channel so the countdown advances on the main loop. Must
/// be disarmed on leaving `AwaitingOtp`, and aborts itself when dropped
/// so a discarded flow can never be ticked afterwards.
pub struct CountdownTimer {
    handle: JoinHandle<()>,
}

impl CountdownTimer {
    /// Spawn the tick task; `event` builds the message placed on the
    /// channel each second. The task exits on its own when the receiving
    /// side goes away.
    pub fn arm<T, F>(tx: mpsc::Sender<T>, event: F) -> Self
    where
        T: Send + 'static,
        F: Fn() -> T + Send + 'static,
    {
        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(std::time::Duration::from_secs(1));
            // The first interval tick completes immediately; consume it
            // so pulses start one second after arming.
            interval.tick().await;
            loop {
                interval.tick().await;
                if tx.send(event()).await.is_err() {
                    break;
                }
            }
        });
        Self { handle }
    }

    /// Stop ticking. Idempotent; dropping the timer has the same effect.
    pub fn disarm(&self) {
        self.handle.abort();
    }
}

impl Drop for CountdownTimer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn start_of_challenge() -> DateTime<Utc> {
        "2024-06-01T12:00:00Z".parse().unwrap()
    }

    /// Drive a flow into AwaitingOtp at `now`.
    fn awaiting_flow(now: DateTime<Utc>) -> ResetFlow {
        let mut flow = ResetFlow::new();
        assert_eq!(flow.begin_request("a@b.com"), Some("a@b.com".to_string()));
        flow.apply_request_outcome(true, now);
        assert_eq!(flow.step(), ResetStep::AwaitingOtp);
        flow
    }

    fn enter_otp(flow: &mut ResetFlow, digits: &str) {
        for c in digits.chars() {
            flow.otp.enter(c);
        }
    }

    // ----- OtpInput -----

    #[test]
    fn test_otp_input_advances_on_digit() {
        let mut otp = OtpInput::new();
        otp.enter('1');
        assert_eq!(otp.focus(), 1);
        otp.enter('2');
        otp.enter('3');
        otp.enter('4');
        // Focus stays on the last slot
        assert_eq!(otp.focus(), 3);
        assert_eq!(otp.value(), "1234");
    }

    #[test]
    fn test_otp_input_rejects_non_digits() {
        let mut otp = OtpInput::new();
        otp.enter('x');
        otp.enter(' ');
        assert_eq!(otp.focus(), 0);
        assert_eq!(otp.value(), "");
    }

    #[test]
    fn test_otp_backspace_clears_then_retreats() {
        let mut otp = OtpInput::new();
        otp.enter('1');
        otp.enter('2');
        // Focus is on the empty third slot: first backspace retreats
        otp.backspace();
        assert_eq!(otp.focus(), 1);
        // Slot is filled: backspace clears without moving
        otp.backspace();
        assert_eq!(otp.focus(), 1);
        assert_eq!(otp.value(), "1");
        // Empty again: retreat to the first slot
        otp.backspace();
        assert_eq!(otp.focus(), 0);
    }

    #[test]
    fn test_otp_overwrite_last_slot() {
        let mut otp = OtpInput::new();
        for c in "1234".chars() {
            otp.enter(c);
        }
        otp.enter('9');
        assert_eq!(otp.value(), "1239");
    }

    // ----- Request phase -----

    #[test]
    fn test_bad_email_never_dispatches() {
        let mut flow = ResetFlow::new();
        assert_eq!(flow.begin_request("bad-email"), None);
        assert_eq!(flow.step(), ResetStep::Idle);
        assert_eq!(flow.errors().get(Field::Email), Some("Invalid email address"));
    }

    #[test]
    fn test_request_failure_stays_idle_with_generic_error() {
        let mut flow = ResetFlow::new();
        assert!(flow.begin_request("a@b.com").is_some());
        flow.apply_request_outcome(false, start_of_challenge());
        assert_eq!(flow.step(), ResetStep::Idle);
        assert_eq!(
            flow.errors().get(Field::Email),
            Some("Failed to send OTP. Please try again.")
        );
    }

    #[test]
    fn test_request_success_opens_window_and_clears_errors() {
        let now = start_of_challenge();
        let mut flow = ResetFlow::new();
        assert_eq!(flow.begin_request("bad"), None);
        assert!(!flow.errors().is_empty());

        assert!(flow.begin_request("a@b.com").is_some());
        flow.apply_request_outcome(true, now);
        assert_eq!(flow.step(), ResetStep::AwaitingOtp);
        assert_eq!(flow.remaining_secs(now), OTP_TTL_SECS);
        assert!(flow.errors().is_empty());
    }

    // ----- Countdown -----

    #[test]
    fn test_expires_after_600_ticks() {
        let start = start_of_challenge();
        let mut flow = awaiting_flow(start);

        for i in 1..=600 {
            flow.tick(start + Duration::seconds(i));
        }
        assert_eq!(flow.step(), ResetStep::Expired);

        // A submit at the expiry instant goes nowhere: the step has
        // already left AwaitingOtp, so there is nothing to dispatch.
        enter_otp(&mut flow, "1234");
        let request = flow.begin_submit("abcdefgh", "abcdefgh", start + Duration::seconds(600));
        assert_eq!(request, None);
        assert_eq!(flow.step(), ResetStep::Expired);
    }

    #[test]
    fn test_not_expired_one_tick_early() {
        let start = start_of_challenge();
        let mut flow = awaiting_flow(start);
        for i in 1..600 {
            flow.tick(start + Duration::seconds(i));
        }
        assert_eq!(flow.step(), ResetStep::AwaitingOtp);
        assert_eq!(flow.remaining_secs(start + Duration::seconds(599)), 1);
    }

    #[test]
    fn test_submit_at_zero_expires_without_dispatch() {
        let start = start_of_challenge();
        let mut flow = awaiting_flow(start);
        enter_otp(&mut flow, "1234");

        // No tick has been processed, but the window is gone.
        let request = flow.begin_submit("abcdefgh", "abcdefgh", start + Duration::seconds(600));
        assert_eq!(request, None);
        assert_eq!(flow.step(), ResetStep::Expired);
        assert_eq!(
            flow.errors().get(Field::Otp),
            Some("OTP has expired. Please request a new one.")
        );
    }

    // ----- Redeem phase -----

    #[test]
    fn test_mismatched_confirmation_never_dispatches() {
        let start = start_of_challenge();
        let mut flow = awaiting_flow(start);
        enter_otp(&mut flow, "1234");

        for offset in [1, 300, 599] {
            let now = start + Duration::seconds(offset);
            let request = flow.begin_submit("abcdefgh", "abcdefghX", now);
            assert_eq!(request, None);
            assert_eq!(flow.step(), ResetStep::AwaitingOtp);
            assert_eq!(
                flow.errors().get(Field::ConfirmPassword),
                Some("Passwords do not match")
            );
            // The window is untouched
            assert_eq!(flow.remaining_secs(now), OTP_TTL_SECS - offset);
        }
    }

    #[test]
    fn test_partial_otp_is_rejected_locally() {
        let start = start_of_challenge();
        let mut flow = awaiting_flow(start);
        enter_otp(&mut flow, "12");

        let request = flow.begin_submit("abcdefgh", "abcdefgh", start + Duration::seconds(5));
        assert_eq!(request, None);
        assert_eq!(flow.errors().get(Field::Otp), Some("OTP must be 4 digits"));
        assert_eq!(flow.step(), ResetStep::AwaitingOtp);
    }

    #[test]
    fn test_happy_path() {
        let start = start_of_challenge();
        let mut flow = ResetFlow::new();

        assert_eq!(flow.begin_request("a@b.com"), Some("a@b.com".to_string()));
        flow.apply_request_outcome(true, start);
        assert_eq!(flow.step(), ResetStep::AwaitingOtp);
        assert_eq!(flow.remaining_secs(start), 600);

        enter_otp(&mut flow, "1234");
        let request = flow
            .begin_submit("abcdefgh", "abcdefgh", start + Duration::seconds(30))
            .expect("submit should dispatch");
        assert_eq!(
            request,
            ResetRequest {
                email: "a@b.com".to_string(),
                otp: "1234".to_string(),
                new_password: "abcdefgh".to_string(),
            }
        );

        flow.apply_submit_outcome(true);
        assert_eq!(flow.step(), ResetStep::Idle);
        assert!(flow.errors().is_empty());
    }

    #[test]
    fn test_remote_rejection_keeps_window_running() {
        let start = start_of_challenge();
        let mut flow = awaiting_flow(start);
        enter_otp(&mut flow, "1234");

        let now = start + Duration::seconds(100);
        assert!(flow.begin_submit("abcdefgh", "abcdefgh", now).is_some());
        flow.apply_submit_outcome(false);

        assert_eq!(flow.step(), ResetStep::AwaitingOtp);
        assert_eq!(
            flow.errors().get(Field::NewPassword),
            Some("Failed to reset password. Please try again.")
        );
        // Timer is not reset by a failed attempt
        assert_eq!(flow.remaining_secs(now), OTP_TTL_SECS - 100);
    }

    // ----- Restart -----

    #[test]
    fn test_restart_from_expired() {
        let start = start_of_challenge();
        let mut flow = awaiting_flow(start);
        flow.tick(start + Duration::seconds(600));
        assert_eq!(flow.step(), ResetStep::Expired);

        flow.restart();
        assert_eq!(flow.step(), ResetStep::Idle);
        assert!(flow.errors().is_empty());
        assert_eq!(flow.otp.value(), "");
        assert_eq!(flow.remaining_secs(start), 0);
    }

    #[test]
    fn test_restart_elsewhere_is_a_noop() {
        let start = start_of_challenge();

        let mut idle = ResetFlow::new();
        idle.restart();
        assert_eq!(idle.step(), ResetStep::Idle);

        let mut active = awaiting_flow(start);
        enter_otp(&mut active, "12");
        active.restart();
        // The active challenge is untouched
        assert_eq!(active.step(), ResetStep::AwaitingOtp);
        assert_eq!(active.otp.value(), "12");
        assert_eq!(active.remaining_secs(start), OTP_TTL_SECS);
    }

    // ----- Countdown task -----

    #[tokio::test(start_paused = true)]
    async fn test_countdown_timer_ticks_until_disarmed() {
        let (tx, mut rx) = mpsc::channel::<()>(8);
        let timer = CountdownTimer::arm(tx, || ());

        assert!(rx.recv().await.is_some());
        assert!(rx.recv().await.is_some());

        timer.disarm();
        // The task owned the only sender, so the channel drains to None.
        assert!(rx.recv().await.is_none());
    }
}
