//! REST API client module for the Stock Image service.
//!
//! This module provides the `ApiClient` for the account endpoints
//! (register, login, password reset) and the contributor roster.
//!
//! The API uses JSON bodies and bearer token authentication; once a
//! session token exists it is attached to every request.

pub mod client;
pub mod error;

pub use client::ApiClient;
pub use error::ApiError;
