//! # Voltage SMS Error Handling
//!
//! This module provides error handling for the Voltage SMS library, covering the
//! serial channel, caller-supplied data validation, the AT send dialog and explicit
//! modem rejections.
//!
//! ## Error Categories
//!
//! ### Channel Errors
//! - **I/O Errors**: Serial read/write failures
//! - **Connection Errors**: The serial port could not be opened
//! - **Not Open / Closed**: The channel was closed locally or the peer hung up
//!
//! ### Validation Errors
//! - **Validation**: Empty or oversized message, empty or malformed destination.
//!   Always raised before a single byte is written to the modem.
//!
//! ### Protocol Errors
//! - **Prompt Timeout**: No `>` prompt within the attempt budget
//! - **Confirm Timeout**: No `OK` / `+CMGS:` within the attempt budget
//! - **Modem Rejected**: The modem answered with an `ERROR` line
//!
//! A line that does not match an expected pattern is *not* an error: the
//! classifier returns `ClassifiedLine::Plain` and the header parser returns `None`.
//!
//! ## Usage Examples
//!
//! ```rust
//! use voltage_sms::{SmsError, SmsResult};
//!
//! fn report(result: SmsResult<()>) -> i32 {
//!     match result {
//!         Ok(()) => 0,
//!         Err(SmsError::PromptTimeout { attempts }) => {
//!             eprintln!("modem never asked for the body ({} reads)", attempts);
//!             5
//!         }
//!         Err(SmsError::ModemRejected { reason }) => {
//!             eprintln!("modem rejected the command: {}", reason);
//!             5
//!         }
//!         Err(error) => error.exit_code(),
//!     }
//! }
//! ```

use thiserror::Error;

/// Result type alias for SMS operations
pub type SmsResult<T> = Result<T, SmsError>;

/// Exit code for a successful run
pub const EXIT_OK: i32 = 0;
/// Exit code for failures that fit no other category
pub const EXIT_FAILURE: i32 = 1;
/// Exit code when no modem could be located
pub const EXIT_MODEM_NOT_FOUND: i32 = 2;
/// Exit code when the serial port could not be opened
pub const EXIT_PORT_OPEN_FAILED: i32 = 3;
/// Exit code for rejected caller input
pub const EXIT_VALIDATION: i32 = 4;
/// Exit code for prompt/confirm timeouts and explicit modem errors
pub const EXIT_PROTOCOL: i32 = 5;

/// SMS error types
///
/// Each variant carries enough context for an operator to tell "modem unreachable"
/// apart from "modem rejected the command".
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SmsError {
    /// I/O errors on the underlying serial device
    ///
    /// Fatal to the current operation; the channel should be closed and reopened.
    #[error("I/O error: {message}")]
    Io { message: String },

    /// The serial port could not be opened
    ///
    /// # Examples
    /// - Port does not exist
    /// - Port already held by another process
    /// - Access denied
    #[error("Connection error: {message}")]
    Connection { message: String },

    /// Operation attempted on a channel that is not open
    #[error("Serial channel is not open")]
    NotOpen,

    /// The peer closed the byte stream (end of file)
    #[error("Serial channel closed by peer")]
    ChannelClosed,

    /// Caller-supplied data violates a precondition
    ///
    /// # Examples
    /// - Empty message
    /// - Message longer than 1600 characters
    /// - Empty destination address
    #[error("Validation error: {reason}")]
    Validation { reason: String },

    /// The modem never emitted the `>` data prompt
    #[error("No '>' prompt from modem after {attempts} reads")]
    PromptTimeout { attempts: u32 },

    /// The modem never confirmed the submitted message
    #[error("No send confirmation from modem after {attempts} reads")]
    ConfirmTimeout { attempts: u32 },

    /// The modem explicitly reported an error line
    ///
    /// `reason` holds the full line, e.g. `+CMS ERROR: 304`.
    #[error("Modem rejected command: {reason}")]
    ModemRejected { reason: String },

    /// No serial device matched the modem signature
    #[error("Modem not found")]
    DeviceNotFound,

    /// Configuration errors
    ///
    /// # Examples
    /// - Non-numeric `BAUD` environment variable
    /// - Zero read timeout
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    /// Record serialization errors
    #[error("Serialization error: {message}")]
    Serialization { message: String },
}

impl SmsError {
    /// Create a new I/O error
    ///
    /// # Arguments
    ///
    /// * `message` - Descriptive error message
    pub fn io<S: Into<String>>(message: S) -> Self {
        Self::Io { message: message.into() }
    }

    /// Create a new connection error
    ///
    /// # Arguments
    ///
    /// * `message` - Descriptive error message
    pub fn connection<S: Into<String>>(message: S) -> Self {
        Self::Connection { message: message.into() }
    }

    /// Create a new validation error
    ///
    /// # Arguments
    ///
    /// * `reason` - Which precondition was violated
    pub fn validation<S: Into<String>>(reason: S) -> Self {
        Self::Validation { reason: reason.into() }
    }

    /// Create a modem rejection error from the offending line
    pub fn modem_rejected<S: Into<String>>(reason: S) -> Self {
        Self::ModemRejected { reason: reason.into() }
    }

    /// Create a configuration error
    pub fn configuration<S: Into<String>>(message: S) -> Self {
        Self::Configuration { message: message.into() }
    }

    /// Create a serialization error
    pub fn serialization<S: Into<String>>(message: S) -> Self {
        Self::Serialization { message: message.into() }
    }

    /// Check if the error is recoverable (can retry)
    ///
    /// Protocol timeouts and explicit modem errors are recoverable by retrying the
    /// whole send. Channel errors need the channel to be reopened first, and
    /// validation errors will fail again with the same input.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use voltage_sms::SmsError;
    ///
    /// assert!(SmsError::PromptTimeout { attempts: 10 }.is_recoverable());
    /// assert!(!SmsError::validation("Message cannot be empty").is_recoverable());
    /// ```
    pub fn is_recoverable(&self) -> bool {
        matches!(self,
            Self::PromptTimeout { .. } |
            Self::ConfirmTimeout { .. } |
            Self::ModemRejected { .. }
        )
    }

    /// Check if the error comes from the serial channel itself
    pub fn is_channel_error(&self) -> bool {
        matches!(self,
            Self::Io { .. } |
            Self::Connection { .. } |
            Self::NotOpen |
            Self::ChannelClosed
        )
    }

    /// Check if the error is an AT dialog failure
    pub fn is_protocol_error(&self) -> bool {
        matches!(self,
            Self::PromptTimeout { .. } |
            Self::ConfirmTimeout { .. } |
            Self::ModemRejected { .. }
        )
    }

    /// Process exit code for command line front-ends
    ///
    /// # Examples
    ///
    /// ```rust
    /// use voltage_sms::SmsError;
    ///
    /// assert_eq!(SmsError::DeviceNotFound.exit_code(), 2);
    /// assert_eq!(SmsError::connection("busy").exit_code(), 3);
    /// ```
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::DeviceNotFound => EXIT_MODEM_NOT_FOUND,
            Self::Connection { .. } => EXIT_PORT_OPEN_FAILED,
            Self::Validation { .. } => EXIT_VALIDATION,
            e if e.is_protocol_error() => EXIT_PROTOCOL,
            _ => EXIT_FAILURE,
        }
    }
}

impl From<std::io::Error> for SmsError {
    fn from(err: std::io::Error) -> Self {
        Self::io(err.to_string())
    }
}

/// Open failures from the serial layer are reported as connection errors
impl From<tokio_serial::Error> for SmsError {
    fn from(err: tokio_serial::Error) -> Self {
        Self::connection(err.to_string())
    }
}

impl From<serde_json::Error> for SmsError {
    fn from(err: serde_json::Error) -> Self {
        Self::serialization(format!("JSON error: {}", err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_classification() {
        let err = SmsError::ConfirmTimeout { attempts: 20 };
        assert!(err.is_recoverable());
        assert!(err.is_protocol_error());
        assert!(!err.is_channel_error());

        let err = SmsError::io("broken pipe");
        assert!(!err.is_recoverable());
        assert!(err.is_channel_error());
    }

    #[test]
    fn test_exit_codes_are_distinct() {
        let codes = [
            SmsError::DeviceNotFound.exit_code(),
            SmsError::connection("no such file").exit_code(),
            SmsError::validation("empty").exit_code(),
            SmsError::modem_rejected("+CMS ERROR: 500").exit_code(),
        ];
        assert_eq!(codes, [2, 3, 4, 5]);
        assert_eq!(SmsError::PromptTimeout { attempts: 10 }.exit_code(), EXIT_PROTOCOL);
        assert_eq!(SmsError::NotOpen.exit_code(), EXIT_FAILURE);
    }

    #[test]
    fn test_error_display() {
        let err = SmsError::modem_rejected("+CMS ERROR: 304");
        let msg = format!("{}", err);
        assert!(msg.contains("rejected"));
        assert!(msg.contains("+CMS ERROR: 304"));
    }
}
