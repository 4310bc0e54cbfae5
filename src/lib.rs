//! # Voltage SMS - Async SMS over AT-Command Cellular Modems
//!
//! **Author:** Evan Liu <evan.liu@voltageenergy.com>
//! **Version:** 0.1.0
//! **License:** MIT
//!
//! Sends and receives SMS through a SIMCom-style cellular modem attached over a
//! serial port, using the text-mode Hayes AT command set.
//!
//! ## Features
//!
//! - **Bounded Send Dialog**: every wait has a fixed timeout and attempt budget, so a
//!   send always returns within `ProtocolTimings::worst_case_send()`
//! - **Push Receive**: `+CMT` headers are paired with their body line into messages
//! - **Anchored Classification**: body text containing `OK` or `ERROR` is never
//!   mistaken for a result code
//! - **Shared Sessions**: one send and one receive loop can share a modem safely
//! - **JSON Lines Records**: append-only message log for downstream tools
//!
//! ## AT Dialogs
//!
//! | Operation | Commands |
//! |-----------|----------|
//! | SMS push init | `AT`, `AT+CMEE=2`, `AT+CMGF=1`, `AT+CSCS="GSM"`, `AT+CNMI=2,2,0,0,0` |
//! | Call reporting init | `AT`, `AT+CMEE=2`, `AT+CLIP=1`, `AT+CRC=1` |
//! | Send | `AT+CMGF=1`, `AT+CSCS="GSM"`, `AT+CMGS="<number>"`, `>` body Ctrl-Z |
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use voltage_sms::{EncodingMode, ModemConfig, ModemSession, SmsResult};
//!
//! #[tokio::main]
//! async fn main() -> SmsResult<()> {
//!     // PORT, BAUD and READ_TIMEOUT_MS override the defaults
//!     let config = ModemConfig::from_env()?;
//!     let session = ModemSession::open(&config).await?;
//!
//!     let outcome = session.send_sms("+15551234567", "Hello from Rust", EncodingMode::Auto).await?;
//!     outcome.into_result()?;
//!
//!     session.close().await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────┐    ┌─────────────────┐
//! │   Send Dialog   │    │  Receive Loop   │
//! │    (client)     │    │   (receiver)    │
//! └─────────────────┘    └─────────────────┘
//!          │                       │
//! ┌─────────────────────────────────────────┐
//! │   Modem Session (channel lock, backlog) │
//! └─────────────────────────────────────────┘
//!          │                       │
//! ┌─────────────────┐    ┌─────────────────┐
//! │   Classifier    │    │   CMT Parser    │
//! │   (protocol)    │    │    (parser)     │
//! └─────────────────┘    └─────────────────┘
//!          │                       │
//! ┌─────────────────────────────────────────┐
//! │      Line Transport (serial, async)     │
//! └─────────────────────────────────────────┘
//! ```

/// Core error types and result handling
///
/// Author: Evan Liu <evan.liu@voltageenergy.com>
pub mod error;

/// AT command vocabulary and response classification
///
/// Author: Evan Liu <evan.liu@voltageenergy.com>
pub mod protocol;

/// Parsers for unsolicited result lines
pub mod parser;

/// Line-oriented serial transport
///
/// Author: Evan Liu <evan.liu@voltageenergy.com>
pub mod transport;

/// Outgoing message encoding
pub mod encoding;

/// Send dialog and modem initialisation
///
/// Author: Evan Liu <evan.liu@voltageenergy.com>
pub mod client;

/// Incoming SMS and call loops
pub mod receiver;

/// Shared modem sessions
///
/// Author: Evan Liu <evan.liu@voltageenergy.com>
pub mod session;

/// Serial, timing and environment configuration
pub mod config;

/// Modem port discovery
pub mod discovery;

/// JSON Lines message records
pub mod records;

/// Utility functions and performance monitoring
///
/// Author: Evan Liu <evan.liu@voltageenergy.com>
pub mod utils;

/// Logging system for the library
///
/// Author: Evan Liu <evan.liu@voltageenergy.com>
pub mod logging;

// Re-export main types for convenience
pub use error::{SmsError, SmsResult};
pub use protocol::{classify, AtCommand, ClassifiedLine, UnsolicitedTag};
pub use parser::{parse_cmt_header, CallerId, CmtHeader};
pub use transport::{LineTransport, SerialTransport, StreamTransport, TransportStats};
pub use encoding::{encode, preview, EncodedPayload, EncodingMode};
pub use client::{SendOutcome, SendState, SmsSender};
pub use receiver::{CallEvent, IncomingMessage, MessageAssembler};
pub use session::{ModemChannel, ModemSession};
pub use config::{ModemConfig, PortSelection, ProtocolTimings};
pub use discovery::{find_modem_port, select_port, PortDescriptor};
pub use records::{JsonlWriter, MessageRecord};
pub use utils::{PerformanceMetrics, OperationTimer};
pub use logging::{LogLevel, LogCallback, CallbackLogger, LoggingMode};

/// Default serial line speed
pub const DEFAULT_BAUD_RATE: u32 = config::DEFAULT_BAUD_RATE;

/// Maximum message length in characters
pub const MAX_MESSAGE_CHARS: usize = encoding::MAX_MESSAGE_CHARS;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Get library information
pub fn info() -> String {
    format!("Voltage SMS v{} - AT-command SMS library by Evan Liu", VERSION)
}
