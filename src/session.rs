//! # Modem Session
//!
//! A `ModemSession` owns one line channel for its lifetime and serialises access to
//! it. Cloning a session is cheap; all clones share the same channel.
//!
//! ## Locking
//!
//! - A send holds the channel lock for the whole dialog
//! - The receive and call loops take the lock around each single line read
//!
//! So a send's `OK` can never be read by the receive loop. `+CMT` lines the send
//! dialog reads are parked in the channel's backlog and handed to the receive loop
//! on its next read. The channel also carries the receive loop's half-assembled
//! message, so a send that starts between a header and its body parks the body too.
//!
//! ```rust,no_run
//! use voltage_sms::{EncodingMode, ModemConfig, ModemSession};
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let session = ModemSession::open(&ModemConfig::for_port("/dev/ttyUSB2")).await?;
//!     session.initialize_sms_push().await?;
//!
//!     let (tx, mut rx) = tokio::sync::mpsc::channel(16);
//!     let cancel = CancellationToken::new();
//!     let receiver = {
//!         let session = session.clone();
//!         let cancel = cancel.clone();
//!         tokio::spawn(async move { session.receive(&cancel, tx).await })
//!     };
//!
//!     let outcome = session.send_sms("+15551234567", "Hello", EncodingMode::Auto).await?;
//!     println!("Send outcome: {}", outcome);
//!
//!     if let Some(message) = rx.recv().await {
//!         println!("{}: {}", message.sender, message.text);
//!     }
//!
//!     cancel.cancel();
//!     receiver.await??;
//!     session.close().await?;
//!     Ok(())
//! }
//! ```

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use log::{debug, info};
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;

use crate::client::{self, SendOutcome, SmsSender};
use crate::config::{ModemConfig, PortSelection, ProtocolTimings};
use crate::discovery::find_modem_port;
use crate::encoding::EncodingMode;
use crate::error::SmsResult;
use crate::logging::CallbackLogger;
use crate::parser::parse_cmt_header;
use crate::receiver::{self, CallEvent, IncomingMessage, MessageAssembler};
use crate::transport::{LineTransport, SerialTransport, TransportStats};
use crate::utils::{OperationTimer, PerformanceMetrics};

/// A transport plus lines read out of turn
pub struct ModemChannel<T> {
    transport: T,
    backlog: VecDeque<String>,
    assembler: MessageAssembler,
}

impl<T: LineTransport> ModemChannel<T> {
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            backlog: VecDeque::new(),
            assembler: MessageAssembler::new(),
        }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    /// Queue lines for the next readers, ahead of the transport
    pub fn defer<I: IntoIterator<Item = String>>(&mut self, lines: I) {
        self.backlog.extend(lines);
    }

    /// Lines waiting in the backlog
    pub fn backlog_len(&self) -> usize {
        self.backlog.len()
    }

    /// Pairs `+CMT` headers and bodies for the receive loop
    pub fn assembler(&self) -> &MessageAssembler {
        &self.assembler
    }

    pub fn assembler_mut(&mut self) -> &mut MessageAssembler {
        &mut self.assembler
    }

    /// The next non-empty line off the wire is the body of an SMS already seen
    ///
    /// True when the assembler holds a header, or the backlog ends with one, whose
    /// body has not been read yet.
    pub fn awaits_sms_body(&self) -> bool {
        let mut pending = self.assembler.pending_header().is_some();
        for line in self.backlog.iter().filter(|line| !line.trim().is_empty()) {
            pending = !pending && parse_cmt_header(line).is_some();
        }
        pending
    }

    /// Next backlog line, or a line from the transport
    pub async fn next_line(&mut self, max_wait: Duration) -> SmsResult<String> {
        if let Some(line) = self.backlog.pop_front() {
            return Ok(line);
        }
        self.transport.read_line(max_wait).await
    }

    pub fn into_inner(self) -> T {
        self.transport
    }
}

/// Shared, serialised access to one modem
pub struct ModemSession<T: LineTransport> {
    channel: Arc<Mutex<ModemChannel<T>>>,
    timings: Arc<ProtocolTimings>,
    logger: Option<CallbackLogger>,
    metrics: Arc<Mutex<PerformanceMetrics>>,
}

impl<T: LineTransport> Clone for ModemSession<T> {
    fn clone(&self) -> Self {
        Self {
            channel: self.channel.clone(),
            timings: self.timings.clone(),
            logger: self.logger.clone(),
            metrics: self.metrics.clone(),
        }
    }
}

impl ModemSession<SerialTransport> {
    /// Resolve the port and open it
    ///
    /// # Errors
    ///
    /// - `SmsError::DeviceNotFound` - `port` is `auto` and no modem was found
    /// - `SmsError::Connection` - the port could not be opened
    pub async fn open(config: &ModemConfig) -> SmsResult<Self> {
        config.validate()?;

        let port = match &config.port {
            PortSelection::Named(name) => {
                info!("Using specified port: {}", name);
                name.clone()
            }
            PortSelection::Auto => {
                info!("Auto-detecting modem port...");
                find_modem_port()?
            }
        };

        let mut transport = SerialTransport::open_with_settle(
            &port,
            config.baud_rate,
            config.read_timeout,
            config.timings.open_settle,
        )
        .await?;
        transport.set_line_logging(config.line_logging);

        info!("Opened {} at {} baud", port, config.baud_rate);
        Ok(Self::new(transport, config.timings.clone()))
    }
}

impl<T: LineTransport> ModemSession<T> {
    /// Wrap an already open transport
    pub fn new(transport: T, timings: ProtocolTimings) -> Self {
        Self {
            channel: Arc::new(Mutex::new(ModemChannel::new(transport))),
            timings: Arc::new(timings),
            logger: None,
            metrics: Arc::new(Mutex::new(PerformanceMetrics::new())),
        }
    }

    /// Attach a traffic logger for send dialogs and the receive and call loops
    pub fn with_logger(mut self, logger: CallbackLogger) -> Self {
        self.logger = Some(logger);
        self
    }

    pub fn timings(&self) -> &ProtocolTimings {
        &self.timings
    }

    /// The shared channel, for callers that need their own dialog
    pub fn channel(&self) -> Arc<Mutex<ModemChannel<T>>> {
        self.channel.clone()
    }

    /// Send one SMS, holding the channel for the whole dialog
    ///
    /// A concurrent receive loop waits until the dialog finishes.
    pub async fn send_sms(
        &self,
        destination: &str,
        message: &str,
        mode: EncodingMode,
    ) -> SmsResult<SendOutcome> {
        let mut guard = self.channel.lock().await;
        let channel = &mut *guard;
        let timer = OperationTimer::start("send_sms");

        let body_due = channel.awaits_sms_body();
        if body_due {
            debug!("Send starts between an SMS header and its body");
        }
        let mut sender = SmsSender::new(&mut channel.transport, &self.timings).awaiting_sms_body(body_due);
        if let Some(logger) = &self.logger {
            sender = sender.with_logger(logger);
        }
        let result = sender.send(destination, message, mode).await;
        let deferred = sender.take_deferred();

        if !deferred.is_empty() {
            debug!("Parking {} line(s) read during send", deferred.len());
            channel.defer(deferred);
        }
        drop(guard);

        let success = matches!(result, Ok(SendOutcome::Sent));
        let duration = timer.stop_and_log(success);
        let mut metrics = self.metrics.lock().await;
        if success {
            metrics.record_success(duration);
        } else {
            metrics.record_failure(duration);
        }

        result
    }

    /// Receive SMS until `cancel` fires or the channel closes
    pub async fn receive(
        &self,
        cancel: &CancellationToken,
        messages: mpsc::Sender<IncomingMessage>,
    ) -> SmsResult<u64> {
        receiver::receive_messages(
            &*self.channel,
            self.timings.line_timeout,
            self.logger.as_ref(),
            cancel,
            messages,
        )
        .await
    }

    /// Report incoming calls until `cancel` fires or the channel closes
    pub async fn listen_calls(
        &self,
        cancel: &CancellationToken,
        events: mpsc::Sender<CallEvent>,
    ) -> SmsResult<u64> {
        receiver::listen_calls(&*self.channel, self.timings.line_timeout, self.logger.as_ref(), cancel, events)
            .await
    }

    /// Put the modem into SMS push mode
    pub async fn initialize_sms_push(&self) -> SmsResult<()> {
        let mut guard = self.channel.lock().await;
        client::initialize_sms_push(guard.transport_mut(), &self.timings).await
    }

    /// Enable ring and caller id reporting
    pub async fn initialize_call_reporting(&self) -> SmsResult<()> {
        let mut guard = self.channel.lock().await;
        client::initialize_call_reporting(guard.transport_mut(), &self.timings).await
    }

    pub async fn is_open(&self) -> bool {
        self.channel.lock().await.transport().is_open()
    }

    /// Close the channel; later operations fail with `SmsError::NotOpen`
    pub async fn close(&self) -> SmsResult<()> {
        let mut guard = self.channel.lock().await;
        guard.backlog.clear();
        guard.assembler.reset();
        guard.transport_mut().close().await
    }

    pub async fn get_stats(&self) -> TransportStats {
        self.channel.lock().await.transport().get_stats()
    }

    /// Timing of completed send dialogs
    pub async fn get_metrics(&self) -> PerformanceMetrics {
        self.metrics.lock().await.clone()
    }
}
