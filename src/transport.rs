//! # Line Transport Layer
//!
//! This module provides the line-oriented channel the AT protocol runs on. The modem
//! speaks CR/LF terminated text lines, except for the `>` data prompt which arrives
//! without any terminator.
//!
//! ## Transports
//!
//! ### `StreamTransport<S>`
//! - Works over any async byte stream (`AsyncRead + AsyncWrite`)
//! - Used directly with `tokio::io::duplex` in tests and simulators
//!
//! ### `SerialTransport`
//! - `StreamTransport` over a `tokio_serial::SerialStream`
//! - Opened with `SerialTransport::open(port, baud, read_timeout)`
//!
//! ## Reading Lines
//!
//! `read_line` waits at most `max_wait` for a line. A timeout is not an error: the
//! call returns an empty string and keeps any unterminated bytes for the next read.
//! Bytes that are not valid UTF-8 are replaced with U+FFFD instead of failing the read.
//!
//! ```rust,no_run
//! use voltage_sms::transport::{LineTransport, SerialTransport};
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut transport = SerialTransport::open("/dev/ttyUSB2", 115200, Duration::from_secs(1)).await?;
//!
//!     transport.write_command("AT").await?;
//!     let line = transport.read_line(Duration::from_secs(1)).await?;
//!     println!("Modem said: {:?}", line);
//!
//!     transport.close().await?;
//!     Ok(())
//! }
//! ```

use std::time::Duration;
use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::time::{timeout, Instant};
use tokio_serial::SerialStream;
use tracing::info;

use crate::error::{SmsError, SmsResult};

/// Command terminator expected by the modem
pub const COMMAND_TERMINATOR: u8 = b'\r';

/// Upper bound for a single buffered line; longer runs are flushed as a line
const MAX_LINE_LENGTH: usize = 4096;

/// Size of a single read from the underlying stream
const READ_CHUNK_SIZE: usize = 256;

/// Default settle time after opening a serial port
pub const DEFAULT_OPEN_SETTLE: Duration = Duration::from_millis(200);

/// Format raw bytes as hex string for payload logging
fn format_hex_packet(data: &[u8]) -> String {
    data.iter()
        .map(|b| format!("{:02X}", b))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Log a line with direction
fn log_line(direction: &str, port: &str, line: &str) {
    info!("[AT {}] {} {}", port, direction, line);
}

/// Decode a received byte run, replacing invalid sequences and stripping CR/LF
fn decode_line(raw: &[u8]) -> String {
    String::from_utf8_lossy(raw)
        .trim_end_matches(&['\r', '\n'][..])
        .to_string()
}

/// The modem sends `"> "` with no line terminator
fn is_bare_prompt(pending: &[u8]) -> bool {
    pending.trim_ascii() == b">"
}

/// Line-oriented channel abstraction for AT communication
///
/// All implementations must be `Send + Sync` so a session can be shared between
/// tasks behind a lock.
#[async_trait]
pub trait LineTransport: Send + Sync {
    /// Write a command followed by a single carriage return
    ///
    /// Surrounding whitespace in `command` is stripped first.
    ///
    /// # Errors
    ///
    /// - `SmsError::NotOpen` - the channel is closed
    /// - `SmsError::Io` - the write failed
    async fn write_command(&mut self, command: &str) -> SmsResult<()>;

    /// Write raw bytes exactly as given
    async fn write_raw(&mut self, data: &[u8]) -> SmsResult<()>;

    /// Read one terminator-delimited line, waiting at most `max_wait`
    ///
    /// Returns an empty string when no complete line arrived in time.
    ///
    /// # Errors
    ///
    /// - `SmsError::NotOpen` - the channel is closed
    /// - `SmsError::ChannelClosed` - the peer closed the stream
    /// - `SmsError::Io` - the read failed
    async fn read_line(&mut self, max_wait: Duration) -> SmsResult<String>;

    /// Check whether the channel is open
    fn is_open(&self) -> bool;

    /// Close the channel. Safe to call repeatedly.
    async fn close(&mut self) -> SmsResult<()>;

    /// Get communication statistics
    fn get_stats(&self) -> TransportStats;
}

/// Transport layer statistics
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransportStats {
    pub commands_sent: u64,
    pub lines_received: u64,
    pub read_timeouts: u64,
    pub errors: u64,
    pub bytes_sent: u64,
    pub bytes_received: u64,
}

/// Line transport over any async byte stream
pub struct StreamTransport<S> {
    stream: Option<S>,
    /// Port name/path, used in logs
    port_name: String,
    /// Bytes received but not yet returned as a line
    pending: Vec<u8>,
    /// Timeout for a single write
    write_timeout: Duration,
    stats: TransportStats,
    /// Log every line in and out
    line_logging: bool,
}

/// Line transport over a serial port
pub type SerialTransport = StreamTransport<SerialStream>;

impl<S> StreamTransport<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + Sync,
{
    /// Wrap an already connected stream
    pub fn new(port_name: &str, stream: S) -> Self {
        Self {
            stream: Some(stream),
            port_name: port_name.to_string(),
            pending: Vec::new(),
            write_timeout: Duration::from_secs(1),
            stats: TransportStats::default(),
            line_logging: false,
        }
    }

    /// Enable or disable line logging
    pub fn set_line_logging(&mut self, enabled: bool) {
        self.line_logging = enabled;
    }

    /// Set the timeout applied to each write
    pub fn set_write_timeout(&mut self, write_timeout: Duration) {
        self.write_timeout = write_timeout;
    }

    /// Port name/path this transport was opened on
    pub fn port_name(&self) -> &str {
        &self.port_name
    }

    /// Pop a complete line off the pending buffer
    fn take_line(&mut self) -> Option<String> {
        if let Some(pos) = self.pending.iter().position(|&b| b == b'\n') {
            let raw: Vec<u8> = self.pending.drain(..=pos).collect();
            return Some(decode_line(&raw));
        }
        if is_bare_prompt(&self.pending) || self.pending.len() >= MAX_LINE_LENGTH {
            let raw = std::mem::take(&mut self.pending);
            return Some(decode_line(&raw));
        }
        None
    }

    fn finish_line(&mut self, line: String) -> String {
        self.stats.lines_received += 1;
        if self.line_logging && !line.is_empty() {
            log_line("<-", &self.port_name, &line);
        }
        line
    }

    async fn write_bytes(&mut self, data: &[u8]) -> SmsResult<()> {
        let stream = self.stream.as_mut().ok_or(SmsError::NotOpen)?;

        match timeout(self.write_timeout, stream.write_all(data)).await {
            Ok(Ok(())) => {
                // Flush to ensure data is sent
                let _ = timeout(self.write_timeout, stream.flush()).await;
            }
            Ok(Err(e)) => {
                self.stats.errors += 1;
                return Err(SmsError::io(format!("Serial write error: {}", e)));
            }
            Err(_) => {
                self.stats.errors += 1;
                return Err(SmsError::io(format!(
                    "Serial write timed out after {}ms",
                    self.write_timeout.as_millis()
                )));
            }
        }

        self.stats.bytes_sent += data.len() as u64;
        Ok(())
    }
}

impl StreamTransport<SerialStream> {
    /// Open a serial port and wait for it to settle
    ///
    /// # Arguments
    ///
    /// * `port` - Device path or name (e.g. `/dev/ttyUSB2`, `COM10`)
    /// * `baud_rate` - Line speed, usually 115200
    /// * `read_timeout` - Per-read timeout handed to the serial driver
    pub async fn open(port: &str, baud_rate: u32, read_timeout: Duration) -> SmsResult<Self> {
        Self::open_with_settle(port, baud_rate, read_timeout, DEFAULT_OPEN_SETTLE).await
    }

    /// Open a serial port with an explicit settle delay
    pub async fn open_with_settle(
        port: &str,
        baud_rate: u32,
        read_timeout: Duration,
        settle: Duration,
    ) -> SmsResult<Self> {
        let builder = tokio_serial::new(port, baud_rate)
            .data_bits(tokio_serial::DataBits::Eight)
            .stop_bits(tokio_serial::StopBits::One)
            .parity(tokio_serial::Parity::None)
            .timeout(read_timeout);

        let stream = SerialStream::open(&builder)
            .map_err(|e| SmsError::connection(format!("Failed to open serial port {}: {}", port, e)))?;

        tokio::time::sleep(settle).await;

        let mut transport = Self::new(port, stream);
        transport.write_timeout = read_timeout;
        Ok(transport)
    }
}

#[async_trait]
impl<S> LineTransport for StreamTransport<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + Sync,
{
    async fn write_command(&mut self, command: &str) -> SmsResult<()> {
        let command = command.trim();
        let mut frame = Vec::with_capacity(command.len() + 1);
        frame.extend_from_slice(command.as_bytes());
        frame.push(COMMAND_TERMINATOR);

        if self.line_logging {
            log_line("->", &self.port_name, command);
        }

        self.write_bytes(&frame).await?;
        self.stats.commands_sent += 1;
        Ok(())
    }

    async fn write_raw(&mut self, data: &[u8]) -> SmsResult<()> {
        if self.line_logging {
            log_line("->", &self.port_name, &format_hex_packet(data));
        }
        self.write_bytes(data).await
    }

    async fn read_line(&mut self, max_wait: Duration) -> SmsResult<String> {
        if self.stream.is_none() {
            return Err(SmsError::NotOpen);
        }

        let deadline = Instant::now() + max_wait;
        let mut buffer = [0u8; READ_CHUNK_SIZE];

        loop {
            if let Some(line) = self.take_line() {
                return Ok(self.finish_line(line));
            }

            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                break;
            }

            let stream = self.stream.as_mut().ok_or(SmsError::NotOpen)?;
            match timeout(remaining, stream.read(&mut buffer)).await {
                Ok(Ok(0)) => {
                    if self.pending.is_empty() {
                        return Err(SmsError::ChannelClosed);
                    }
                    // Hand back the unterminated tail; the next read reports the close
                    let raw = std::mem::take(&mut self.pending);
                    let line = decode_line(&raw);
                    return Ok(self.finish_line(line));
                }
                Ok(Ok(n)) => {
                    self.pending.extend_from_slice(&buffer[..n]);
                    self.stats.bytes_received += n as u64;
                }
                Ok(Err(e)) => {
                    self.stats.errors += 1;
                    return Err(SmsError::io(format!("Serial read error: {}", e)));
                }
                Err(_) => break,
            }
        }

        // Partial bytes stay buffered until their terminator arrives
        self.stats.read_timeouts += 1;
        Ok(String::new())
    }

    fn is_open(&self) -> bool {
        self.stream.is_some()
    }

    async fn close(&mut self) -> SmsResult<()> {
        if let Some(mut stream) = self.stream.take() {
            let _ = stream.shutdown().await;
        }
        self.pending.clear();
        Ok(())
    }

    fn get_stats(&self) -> TransportStats {
        self.stats.clone()
    }
}
