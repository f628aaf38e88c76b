//! Admission outcomes and error taxonomy.

use std::any::Any;
use std::convert::Infallible;
use std::time::Duration;
use thiserror::Error;

/// Why a gate refused admission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum Refusal {
    /// A cancel signal fired while waiting (or had already fired).
    #[error("cancelled while waiting for admission")]
    Cancelled,
    /// The hesitation window elapsed without a free slot.
    #[error("timed out waiting for admission")]
    TimedOut,
}

impl Refusal {
    /// Label used in logs and metrics.
    pub fn as_str(&self) -> &'static str {
        match self {
            Refusal::Cancelled => "cancelled",
            Refusal::TimedOut => "timed_out",
        }
    }
}

/// Result of an inbound call presented to the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome<T> {
    /// The call was admitted and produced a value.
    Admitted(T),
    /// The service is stopping, or the caller cancelled.
    Unavailable,
    /// No slot became free within the hesitation window.
    Busy,
}

impl<T> Outcome<T> {
    /// Map a refusal onto the caller-facing outcome.
    pub fn from_refusal(refusal: Refusal) -> Self {
        match refusal {
            Refusal::Cancelled => Outcome::Unavailable,
            Refusal::TimedOut => Outcome::Busy,
        }
    }

    pub fn is_admitted(&self) -> bool {
        matches!(self, Outcome::Admitted(_))
    }

    pub fn into_admitted(self) -> Option<T> {
        match self {
            Outcome::Admitted(value) => Some(value),
            _ => None,
        }
    }
}

/// A panic inside an admitted unit of work, caught at the facade boundary.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unit of work panicked: {message}")]
pub struct ExecutionFault {
    message: String,
}

impl ExecutionFault {
    /// Build a fault from a panic payload.
    pub fn from_panic(payload: Box<dyn Any + Send>) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&'static str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "unknown panic".to_string()
        };
        Self { message }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

/// Errors from an outbound call or a pooled session.
///
/// `E` is the error type of the underlying resource pool.
#[derive(Debug, Error)]
pub enum AdmissionError<E = Infallible>
where
    E: std::error::Error + 'static,
{
    /// The gate refused admission.
    #[error("admission refused: {0}")]
    Refused(#[from] Refusal),
    /// The pool failed to lend a resource. No gate slot is held.
    #[error("resource borrow failed: {0}")]
    Borrow(#[source] E),
    /// The admitted work panicked.
    #[error(transparent)]
    Fault(#[from] ExecutionFault),
}

impl<E: std::error::Error + 'static> AdmissionError<E> {
    pub fn refusal(&self) -> Option<Refusal> {
        match self {
            AdmissionError::Refused(r) => Some(*r),
            _ => None,
        }
    }
}

/// Errors from waiting on a drain.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DrainError {
    #[error("drain timed out after {waited:?} with {remaining} in flight")]
    Timeout { waited: Duration, remaining: usize },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn refusals_map_to_distinct_outcomes() {
        assert_eq!(Outcome::<()>::from_refusal(Refusal::Cancelled), Outcome::Unavailable);
        assert_eq!(Outcome::<()>::from_refusal(Refusal::TimedOut), Outcome::Busy);
    }

    #[test]
    fn fault_keeps_panic_message() {
        let payload = std::panic::catch_unwind(|| panic!("boom {}", 7)).unwrap_err();
        assert_eq!(ExecutionFault::from_panic(payload).message(), "boom 7");

        let payload = std::panic::catch_unwind(|| std::panic::panic_any(42u8)).unwrap_err();
        assert_eq!(ExecutionFault::from_panic(payload).message(), "unknown panic");
    }
}
