//! Typed client for a running Hospital Management API, plus the session file
//! the smoke runner keeps between runs.

pub mod client;
pub mod session;

pub use client::{ApiClient, ClientError, Envelope};
pub use session::{SessionContext, SessionUser};
