/// Modem and protocol configuration
///
/// Every delay and attempt budget the AT dialogs use lives in `ProtocolTimings`,
/// so the worst-case duration of a send is computable up front.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{SmsError, SmsResult};

/// Default serial line speed
pub const DEFAULT_BAUD_RATE: u32 = 115200;

/// Default per-read timeout
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(1);

/// Serialize `Duration` as integer milliseconds
mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

/// Which serial port to use
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PortSelection {
    /// Scan for the modem's AT port
    #[default]
    Auto,
    /// Use this device path or name
    Named(String),
}

impl FromStr for PortSelection {
    type Err = SmsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err(SmsError::configuration("Port cannot be empty"));
        }
        if s.eq_ignore_ascii_case("auto") {
            Ok(PortSelection::Auto)
        } else {
            Ok(PortSelection::Named(s.to_string()))
        }
    }
}

impl fmt::Display for PortSelection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PortSelection::Auto => f.write_str("auto"),
            PortSelection::Named(name) => f.write_str(name),
        }
    }
}

/// Delays and attempt budgets for the AT dialogs
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProtocolTimings {
    /// Pause after `AT+CMGF=1`
    #[serde(with = "duration_ms")]
    pub text_mode_settle: Duration,
    /// Discard window after the text-mode pause
    #[serde(with = "duration_ms")]
    pub text_mode_drain: Duration,
    /// Pause after `AT+CSCS`
    #[serde(with = "duration_ms")]
    pub charset_settle: Duration,
    /// Discard window after the charset pause
    #[serde(with = "duration_ms")]
    pub charset_drain: Duration,
    /// Pause after `AT+CMGS` before looking for the prompt
    #[serde(with = "duration_ms")]
    pub submit_settle: Duration,
    /// Reads allowed while waiting for `>`
    pub prompt_attempts: u32,
    /// Pause after writing the body, before reading the confirmation
    #[serde(with = "duration_ms")]
    pub body_settle: Duration,
    /// Reads allowed while waiting for the confirmation
    pub confirm_attempts: u32,
    /// Pause after an empty read while waiting for the confirmation
    #[serde(with = "duration_ms")]
    pub confirm_idle_pause: Duration,
    /// Upper bound for a single line read
    #[serde(with = "duration_ms")]
    pub line_timeout: Duration,
    /// Discard window after each SMS initialisation command
    #[serde(with = "duration_ms")]
    pub init_drain: Duration,
    /// Discard window after each call-reporting initialisation command
    #[serde(with = "duration_ms")]
    pub call_init_drain: Duration,
    /// Pause after opening the port
    #[serde(with = "duration_ms")]
    pub open_settle: Duration,
}

impl Default for ProtocolTimings {
    fn default() -> Self {
        Self {
            text_mode_settle: Duration::from_millis(500),
            text_mode_drain: Duration::from_millis(300),
            charset_settle: Duration::from_millis(300),
            charset_drain: Duration::from_millis(300),
            submit_settle: Duration::from_millis(500),
            prompt_attempts: 10,
            body_settle: Duration::from_secs(1),
            confirm_attempts: 20,
            confirm_idle_pause: Duration::from_millis(100),
            line_timeout: DEFAULT_READ_TIMEOUT,
            init_drain: Duration::from_millis(600),
            call_init_drain: Duration::from_millis(500),
            open_settle: Duration::from_millis(200),
        }
    }
}

impl ProtocolTimings {
    /// Reference attempt budgets with every fixed pause removed
    ///
    /// Intended for simulators and scripted transports that answer instantly.
    pub fn without_delays(line_timeout: Duration) -> Self {
        Self {
            text_mode_settle: Duration::ZERO,
            text_mode_drain: Duration::ZERO,
            charset_settle: Duration::ZERO,
            charset_drain: Duration::ZERO,
            submit_settle: Duration::ZERO,
            body_settle: Duration::ZERO,
            confirm_idle_pause: Duration::ZERO,
            line_timeout,
            init_drain: Duration::ZERO,
            call_init_drain: Duration::ZERO,
            open_settle: Duration::ZERO,
            ..Self::default()
        }
    }

    /// Upper bound on the duration of one send, excluding write time
    ///
    /// # Examples
    ///
    /// ```rust
    /// use voltage_sms::config::ProtocolTimings;
    /// use std::time::Duration;
    ///
    /// // 0.5 + 0.3 + 0.3 + 0.3 + 0.5 + 10 * 1.0 + 1.0 + 20 * (1.0 + 0.1)
    /// assert_eq!(ProtocolTimings::default().worst_case_send(), Duration::from_millis(34_900));
    /// ```
    pub fn worst_case_send(&self) -> Duration {
        self.text_mode_settle
            + self.text_mode_drain
            + self.charset_settle
            + self.charset_drain
            + self.submit_settle
            + self.line_timeout * self.prompt_attempts
            + self.body_settle
            + (self.line_timeout + self.confirm_idle_pause) * self.confirm_attempts
    }
}

/// Serial and protocol configuration for one modem
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModemConfig {
    pub port: PortSelection,
    pub baud_rate: u32,
    #[serde(with = "duration_ms")]
    pub read_timeout: Duration,
    /// Log every line to and from the modem
    pub line_logging: bool,
    pub timings: ProtocolTimings,
}

impl Default for ModemConfig {
    fn default() -> Self {
        Self {
            port: PortSelection::Auto,
            baud_rate: DEFAULT_BAUD_RATE,
            read_timeout: DEFAULT_READ_TIMEOUT,
            line_logging: false,
            timings: ProtocolTimings::default(),
        }
    }
}

impl ModemConfig {
    /// Configuration for a named port with defaults elsewhere
    pub fn for_port(port: &str) -> Self {
        Self {
            port: PortSelection::Named(port.to_string()),
            ..Self::default()
        }
    }

    /// Defaults overridden by `PORT`, `BAUD` and `READ_TIMEOUT_MS`
    pub fn from_env() -> SmsResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Defaults overridden through an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> SmsResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(port) = lookup("PORT") {
            config.port = port.parse()?;
        }
        if let Some(baud) = lookup("BAUD") {
            config.baud_rate = baud.trim().parse().map_err(|_| {
                SmsError::configuration(format!("Invalid BAUD value: {}", baud))
            })?;
        }
        if let Some(timeout_ms) = lookup("READ_TIMEOUT_MS") {
            let ms: u64 = timeout_ms.trim().parse().map_err(|_| {
                SmsError::configuration(format!("Invalid READ_TIMEOUT_MS value: {}", timeout_ms))
            })?;
            config.read_timeout = Duration::from_millis(ms);
            config.timings.line_timeout = config.read_timeout;
        }

        config.validate()?;
        Ok(config)
    }

    /// Check value ranges
    pub fn validate(&self) -> SmsResult<()> {
        if self.baud_rate == 0 {
            return Err(SmsError::configuration("Baud rate must be positive"));
        }
        if self.read_timeout.is_zero() {
            return Err(SmsError::configuration("Read timeout must be positive"));
        }
        if self.timings.line_timeout.is_zero() {
            return Err(SmsError::configuration("Line timeout must be positive"));
        }
        Ok(())
    }
}
