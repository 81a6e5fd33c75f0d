use std::fmt;
use std::io;

use tasksync_frame::{DecodeError, EncodeError};

pub const SUCCESS: i32 = 0;
pub const FAILURE: i32 = 1;
pub const DATA_INVALID: i32 = 60;
pub const USAGE: i32 = 64;
pub const INTERNAL: i32 = 125;

pub type CliResult<T> = Result<T, CliError>;

#[derive(Debug)]
pub struct CliError {
    pub code: i32,
    pub message: String,
}

impl CliError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn usage(message: impl Into<String>) -> Self {
        Self::new(USAGE, message)
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for CliError {}

pub fn io_error(context: &str, err: io::Error) -> CliError {
    let code = match err.kind() {
        io::ErrorKind::NotFound | io::ErrorKind::PermissionDenied => FAILURE,
        _ => INTERNAL,
    };
    CliError::new(code, format!("{context}: {err}"))
}

pub fn decode_error(context: &str, err: DecodeError) -> CliError {
    CliError::new(DATA_INVALID, format!("{context}: {err}"))
}

pub fn encode_error(context: &str, err: EncodeError) -> CliError {
    let code = match err {
        EncodeError::SizeOverflow { .. } | EncodeError::PinNameTooLong { .. } => DATA_INVALID,
        EncodeError::InvalidSentinel { .. }
        | EncodeError::Unregistered { .. }
        | EncodeError::ShapeMismatch { .. } => USAGE,
    };
    CliError::new(code, format!("{context}: {err}"))
}

#[cfg(test)]
mod tests {
    use tasksync_frame::Magic;

    use super::*;

    #[test]
    fn encode_errors_map_to_stable_codes() {
        let overflow = EncodeError::SizeOverflow {
            magic: Magic::InformationalMsg,
            state: 0,
            size: 70,
            max: 64,
        };
        assert_eq!(encode_error("encode", overflow).code, DATA_INVALID);
        assert_eq!(
            encode_error("encode", EncodeError::InvalidSentinel { state: 0 }).code,
            USAGE
        );
    }

    #[test]
    fn io_not_found_is_failure() {
        let err = io_error("read trace", io::Error::from(io::ErrorKind::NotFound));
        assert_eq!(err.code, FAILURE);
        assert!(err.message.starts_with("read trace: "));
    }
}
