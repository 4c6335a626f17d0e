use crate::http::FetchError;
use thiserror::Error;

/// Errors surfaced by the chat engine.
///
/// Startup failures (`UnrecognizedSource`, `Credential`, and a failed prime
/// fetch) abort [`Session::start`](super::Session::start). In steady state
/// only `TokenExpired` ends a session; every other failure is reported as the
/// degraded flag and retried on the next tick.
#[derive(Debug, Error)]
pub enum ChatError {
    /// The chat URL is not a recognized tag stream address
    #[error("Unrecognized chat source: {0}")]
    UnrecognizedSource(String),
    /// Client credentials could not be extracted or exchanged for a token
    #[error("Credential error: {0}")]
    Credential(String),
    /// A fetch or parse failure within one poll cycle
    #[error("Fetch failed: {0}")]
    TransientFetch(#[from] FetchError),
    /// The remote side stopped accepting the session's bearer token
    #[error("Access token expired or revoked")]
    TokenExpired,
}
