//! Turns any request failure into the single message the user sees.

use std::error::Error;

use tracing::warn;

use crate::SolveError;

pub const CONNECTIVITY_MESSAGE: &str =
    "Could not reach the solver service. Check your connection and try again.";

pub const TEXT_FALLBACK: &str = "Solve failed.";
pub const IMAGE_FALLBACK: &str = "Image solve failed.";

/// Picks the service's own message, then a connectivity hint, then `fallback`.
///
/// The raw error is logged, never returned.
pub fn error_message(err: &(dyn Error + 'static), fallback: &str) -> String {
    warn!(error = %err, "solve request failed");

    let mut connectivity = false;
    let mut current: Option<&(dyn Error + 'static)> = Some(err);
    while let Some(e) = current {
        if let Some(solve) = e.downcast_ref::<SolveError>() {
            if let Some(message) = solve.service_message() {
                return message.to_string();
            }
            if matches!(solve, SolveError::Transport(_)) {
                connectivity = true;
            }
        }
        if let Some(http) = e.downcast_ref::<reqwest::Error>() {
            if http.is_connect() || http.is_timeout() || http.is_request() {
                connectivity = true;
            }
        }
        if e.downcast_ref::<std::io::Error>().is_some_and(|io| {
            matches!(
                io.kind(),
                std::io::ErrorKind::ConnectionRefused
                    | std::io::ErrorKind::ConnectionReset
                    | std::io::ErrorKind::ConnectionAborted
                    | std::io::ErrorKind::TimedOut
                    | std::io::ErrorKind::NotConnected
            )
        }) {
            connectivity = true;
        }
        current = e.source();
    }

    if connectivity {
        CONNECTIVITY_MESSAGE.to_string()
    } else {
        fallback.to_string()
    }
}
