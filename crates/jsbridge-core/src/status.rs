//! Status codes returned by every native engine call.
//!
//! The engine signals failure through a closed enumeration rather than
//! exceptions; values must stay pinned to the C ABI's numbering.

use std::fmt;

/// Result code of a native engine call.
///
/// Mirrors the engine's C status enumeration. Values received from the
/// engine that fall outside the known range are folded into
/// [`Status::GenericFailure`] by [`Status::from_raw`].
#[repr(i32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Status {
    Ok = 0,
    InvalidArg = 1,
    ObjectExpected = 2,
    StringExpected = 3,
    NameExpected = 4,
    FunctionExpected = 5,
    NumberExpected = 6,
    BooleanExpected = 7,
    ArrayExpected = 8,
    GenericFailure = 9,
    PendingException = 10,
    Cancelled = 11,
    EscapeCalledTwice = 12,
    HandleScopeMismatch = 13,
    CallbackScopeMismatch = 14,
    QueueFull = 15,
    Closing = 16,
    BigintExpected = 17,
    DateExpected = 18,
    ArraybufferExpected = 19,
    DetachableArraybufferExpected = 20,
    WouldDeadlock = 21,
    NoExternalBuffersAllowed = 22,
    CannotRunJs = 23,
}

impl Status {
    /// Convert a raw C ABI value into a `Status`.
    pub fn from_raw(raw: i32) -> Self {
        match raw {
            0 => Status::Ok,
            1 => Status::InvalidArg,
            2 => Status::ObjectExpected,
            3 => Status::StringExpected,
            4 => Status::NameExpected,
            5 => Status::FunctionExpected,
            6 => Status::NumberExpected,
            7 => Status::BooleanExpected,
            8 => Status::ArrayExpected,
            9 => Status::GenericFailure,
            10 => Status::PendingException,
            11 => Status::Cancelled,
            12 => Status::EscapeCalledTwice,
            13 => Status::HandleScopeMismatch,
            14 => Status::CallbackScopeMismatch,
            15 => Status::QueueFull,
            16 => Status::Closing,
            17 => Status::BigintExpected,
            18 => Status::DateExpected,
            19 => Status::ArraybufferExpected,
            20 => Status::DetachableArraybufferExpected,
            21 => Status::WouldDeadlock,
            22 => Status::NoExternalBuffersAllowed,
            23 => Status::CannotRunJs,
            _ => Status::GenericFailure,
        }
    }

    pub fn is_ok(self) -> bool {
        self == Status::Ok
    }

    /// Human-readable description of the status.
    pub fn message(self) -> &'static str {
        match self {
            Status::Ok => "ok",
            Status::InvalidArg => "invalid argument",
            Status::ObjectExpected => "an object was expected",
            Status::StringExpected => "a string was expected",
            Status::NameExpected => "a string or symbol was expected",
            Status::FunctionExpected => "a function was expected",
            Status::NumberExpected => "a number was expected",
            Status::BooleanExpected => "a boolean was expected",
            Status::ArrayExpected => "an array was expected",
            Status::GenericFailure => "unknown failure",
            Status::PendingException => "an exception is pending",
            Status::Cancelled => "the async work item was cancelled",
            Status::EscapeCalledTwice => "escape was already called on this scope",
            Status::HandleScopeMismatch => "handle scope mismatch",
            Status::CallbackScopeMismatch => "callback scope mismatch",
            Status::QueueFull => "thread-safe function queue is full",
            Status::Closing => "thread-safe function is closing",
            Status::BigintExpected => "a bigint was expected",
            Status::DateExpected => "a date was expected",
            Status::ArraybufferExpected => "an arraybuffer was expected",
            Status::DetachableArraybufferExpected => "a detachable arraybuffer was expected",
            Status::WouldDeadlock => "the operation would deadlock",
            Status::NoExternalBuffersAllowed => "external buffers are not allowed",
            Status::CannotRunJs => "cannot run JavaScript",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.message(), *self as i32)
    }
}

/// Snapshot of the engine's "last error" state, captured right after a
/// non-ok status is observed.
#[derive(Debug, Clone)]
pub struct ExtendedErrorInfo {
    /// UTF-8 rendering of the engine's error message.
    pub message: String,
    /// Engine-specific secondary error code.
    pub engine_error_code: u32,
    /// The status the engine recorded for the failed call.
    pub status: Status,
}

impl ExtendedErrorInfo {
    /// Fallback info when the engine cannot be queried (for example when
    /// the failure happened before an environment existed).
    pub fn from_status(status: Status) -> Self {
        Self {
            message: status.message().to_string(),
            engine_error_code: 0,
            status,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_raw_round_trips_known_values() {
        for raw in 0..=23 {
            let status = Status::from_raw(raw);
            assert_eq!(status as i32, raw);
        }
    }

    #[test]
    fn from_raw_folds_unknown_values() {
        assert_eq!(Status::from_raw(-1), Status::GenericFailure);
        assert_eq!(Status::from_raw(999), Status::GenericFailure);
    }

    #[test]
    fn every_status_has_a_message() {
        for raw in 0..=23 {
            assert!(!Status::from_raw(raw).message().is_empty());
        }
    }

    #[test]
    fn only_ok_is_ok() {
        assert!(Status::Ok.is_ok());
        assert!(!Status::GenericFailure.is_ok());
        assert!(!Status::PendingException.is_ok());
    }
}
