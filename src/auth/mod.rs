//! Authentication state for the client.
//!
//! This module provides:
//! - `SessionStore`: the persisted token + identity pair with a derived
//!   authenticated flag
//! - `CredentialStore`: secure OS-level password storage via keyring,
//!   used to prefill the sign-in form
//!
//! The session survives restarts through two durable entries written
//! together or not at all.

pub mod credentials;
pub mod session;

pub use credentials::CredentialStore;
pub use session::SessionStore;
