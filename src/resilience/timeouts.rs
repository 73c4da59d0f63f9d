//! Deadline enforcement.
//!
//! # Responsibilities
//! - Bound a whole dispatched call with one deadline
//! - Read the caller's `grpc-timeout` so an RPC caller can shorten it
//!
//! # Design Decisions
//! - Uses Tokio's timeout facilities; expiry drops the inner future, which
//!   cancels any outbound call it owns
//! - Expiry is its own error variant so callers see 504 / DEADLINE_EXCEEDED

use std::future::Future;
use std::time::Duration;

use crate::error::{GatewayError, GatewayResult};

/// Run `call` under `deadline`.
pub async fn with_deadline<T, F>(deadline: Duration, call: F) -> GatewayResult<T>
where
    F: Future<Output = GatewayResult<T>>,
{
    match tokio::time::timeout(deadline, call).await {
        Ok(result) => result,
        Err(_) => {
            tracing::warn!(deadline = ?deadline, "Call deadline exceeded");
            Err(GatewayError::DeadlineExceeded { after: deadline })
        }
    }
}

/// Parse a `grpc-timeout` header value: up to eight digits and a unit.
pub fn parse_grpc_timeout(raw: &str) -> Option<Duration> {
    let raw = raw.trim();
    if raw.len() < 2 || raw.len() > 9 {
        return None;
    }
    let (digits, unit) = raw.split_at(raw.len() - 1);
    if !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let value: u64 = digits.parse().ok()?;

    match unit {
        "H" => Some(Duration::from_secs(value.checked_mul(3600)?)),
        "M" => Some(Duration::from_secs(value.checked_mul(60)?)),
        "S" => Some(Duration::from_secs(value)),
        "m" => Some(Duration::from_millis(value)),
        "u" => Some(Duration::from_micros(value)),
        "n" => Some(Duration::from_nanos(value)),
        _ => None,
    }
}
