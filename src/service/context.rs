//! Per-call cancellation and deadline checks.

use std::time::{Duration, Instant};

use tonic::metadata::MetadataMap;
use tonic::Status;

const GRPC_TIMEOUT_HEADER: &str = "grpc-timeout";

/// Deadline of one RPC, taken from the caller's `grpc-timeout` header.
#[derive(Debug, Clone, Copy, Default)]
pub struct CallContext {
    deadline: Option<Instant>,
}

impl CallContext {
    pub fn from_metadata(metadata: &MetadataMap) -> Self {
        let timeout = metadata
            .get(GRPC_TIMEOUT_HEADER)
            .and_then(|value| value.to_str().ok())
            .and_then(parse_grpc_timeout);

        Self {
            deadline: timeout.and_then(|t| Instant::now().checked_add(t)),
        }
    }

    pub fn with_deadline(deadline: Instant) -> Self {
        Self {
            deadline: Some(deadline),
        }
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Fails with `Cancelled` when the caller went away, or
    /// `DeadlineExceeded` once the deadline has passed.
    pub fn check(&self, cancelled: bool) -> Result<(), Status> {
        if cancelled {
            let status = Status::cancelled("request is canceled");
            tracing::warn!(%status, "aborting call");
            return Err(status);
        }
        if self.deadline.is_some_and(|deadline| Instant::now() >= deadline) {
            let status = Status::deadline_exceeded("deadline is exceeded");
            tracing::warn!(%status, "aborting call");
            return Err(status);
        }
        Ok(())
    }
}

/// Parses a `grpc-timeout` value: at most 8 digits followed by one of
/// `H M S m u n`.
pub fn parse_grpc_timeout(value: &str) -> Option<Duration> {
    if value.len() < 2 || value.len() > 9 {
        return None;
    }
    let (digits, unit) = value.split_at(value.len() - 1);
    if !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let amount: u64 = digits.parse().ok()?;

    match unit {
        "H" => Some(Duration::from_secs(amount * 60 * 60)),
        "M" => Some(Duration::from_secs(amount * 60)),
        "S" => Some(Duration::from_secs(amount)),
        "m" => Some(Duration::from_millis(amount)),
        "u" => Some(Duration::from_micros(amount)),
        "n" => Some(Duration::from_nanos(amount)),
        _ => None,
    }
}
