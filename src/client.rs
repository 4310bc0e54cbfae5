/// SMS submission and modem initialisation dialogs
///
/// The send dialog is a small state machine:
///
/// ```text
/// Idle -> ModeSet -> CharsetSet -> Submitting -> AwaitPrompt -> WritingBody -> AwaitConfirm -> Sent
///                                                      |                            |
///                                                      +--------> Failed <----------+
/// ```
///
/// Every wait is a fixed per-line timeout times a fixed attempt count, so a send
/// returns within `ProtocolTimings::worst_case_send()` even if the modem stays silent.

use std::fmt;
use std::time::Duration;

use log::{debug, info, warn};
use tokio::time::{sleep, Instant};

use crate::config::ProtocolTimings;
use crate::encoding::{encode, EncodingMode};
use crate::error::{SmsError, SmsResult};
use crate::logging::{CallbackLogger, LogLevel};
use crate::protocol::{classify, AtCommand, CharacterSet, ClassifiedLine, UnsolicitedTag};
use crate::transport::LineTransport;
use crate::utils::validation::validate_destination;

/// Commands that put the modem into SMS push mode
pub const SMS_PUSH_INIT: [AtCommand; 5] = [
    AtCommand::Attention,
    AtCommand::VerboseErrors,
    AtCommand::TextMode,
    AtCommand::CharacterSet(CharacterSet::Gsm),
    AtCommand::PushNewMessages,
];

/// Commands that enable ring and caller id reporting
pub const CALL_REPORTING_INIT: [AtCommand; 4] = [
    AtCommand::Attention,
    AtCommand::VerboseErrors,
    AtCommand::CallerIdPresentation,
    AtCommand::ExtendedRingIndication,
];

/// Steps of the send dialog
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendState {
    Idle,
    ModeSet,
    CharsetSet,
    Submitting,
    AwaitPrompt,
    WritingBody,
    AwaitConfirm,
    Sent,
    Failed,
}

impl fmt::Display for SendState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Result of one send dialog
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendOutcome {
    /// The modem confirmed the submission
    Sent,
    /// No `>` prompt within the attempt budget
    PromptTimeout { attempts: u32 },
    /// No confirmation within the attempt budget
    ConfirmTimeout { attempts: u32 },
    /// The modem answered with an error line
    ModemError { text: String },
}

impl SendOutcome {
    pub fn is_sent(&self) -> bool {
        matches!(self, SendOutcome::Sent)
    }

    /// Turn a failed outcome into the matching `SmsError`
    ///
    /// # Examples
    ///
    /// ```rust
    /// use voltage_sms::{SendOutcome, SmsError};
    ///
    /// assert!(SendOutcome::Sent.into_result().is_ok());
    /// assert_eq!(
    ///     SendOutcome::ModemError { text: "+CMS ERROR: 304".into() }.into_result(),
    ///     Err(SmsError::ModemRejected { reason: "+CMS ERROR: 304".into() })
    /// );
    /// ```
    pub fn into_result(self) -> SmsResult<()> {
        match self {
            SendOutcome::Sent => Ok(()),
            SendOutcome::PromptTimeout { attempts } => Err(SmsError::PromptTimeout { attempts }),
            SendOutcome::ConfirmTimeout { attempts } => Err(SmsError::ConfirmTimeout { attempts }),
            SendOutcome::ModemError { text } => Err(SmsError::modem_rejected(text)),
        }
    }
}

impl fmt::Display for SendOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SendOutcome::Sent => write!(f, "sent"),
            SendOutcome::PromptTimeout { attempts } => write!(f, "no prompt after {} reads", attempts),
            SendOutcome::ConfirmTimeout { attempts } => write!(f, "no confirmation after {} reads", attempts),
            SendOutcome::ModemError { text } => write!(f, "modem error: {}", text),
        }
    }
}

/// Runs one send dialog over a borrowed transport
///
/// The caller must hold exclusive access to the transport for the whole dialog;
/// `ModemSession` does this with its channel lock.
pub struct SmsSender<'a, T: LineTransport + ?Sized> {
    transport: &'a mut T,
    timings: &'a ProtocolTimings,
    logger: Option<&'a CallbackLogger>,
    state: SendState,
    /// Unsolicited SMS lines read during the dialog, in arrival order
    deferred: Vec<String>,
    awaiting_body: bool,
}

impl<'a, T: LineTransport + ?Sized> SmsSender<'a, T> {
    pub fn new(transport: &'a mut T, timings: &'a ProtocolTimings) -> Self {
        Self {
            transport,
            timings,
            logger: None,
            state: SendState::Idle,
            deferred: Vec::new(),
            awaiting_body: false,
        }
    }

    /// Attach a traffic logger
    pub fn with_logger(mut self, logger: &'a CallbackLogger) -> Self {
        self.logger = Some(logger);
        self
    }

    /// A `+CMT` header was read before the dialog started and its body is still due
    ///
    /// The next non-empty line is then kept as message text instead of being matched
    /// against result codes.
    pub fn awaiting_sms_body(mut self, pending: bool) -> Self {
        self.awaiting_body = pending;
        self
    }

    /// Current dialog state
    pub fn state(&self) -> SendState {
        self.state
    }

    /// Take the `+CMT` headers and bodies that arrived while the dialog ran
    ///
    /// Feed these to the receive side before reading the channel again.
    pub fn take_deferred(&mut self) -> Vec<String> {
        self.awaiting_body = false;
        std::mem::take(&mut self.deferred)
    }

    /// Classify a line, parking incoming SMS lines for the receive side
    fn classify_or_defer(&mut self, line: &str) -> ClassifiedLine {
        if self.awaiting_body && !line.trim().is_empty() {
            // Message text, even if it reads like a result code
            debug!("Holding incoming SMS body seen mid-send");
            self.deferred.push(line.to_string());
            self.awaiting_body = false;
            return ClassifiedLine::Plain { text: line.trim().to_string() };
        }

        let classified = classify(line);
        if let ClassifiedLine::Unsolicited { tag: UnsolicitedTag::Cmt, .. } = &classified {
            debug!("Holding incoming SMS header seen mid-send: {}", line);
            self.deferred.push(line.to_string());
            self.awaiting_body = true;
        }
        classified
    }

    fn transition(&mut self, next: SendState) {
        debug!("SMS send: {} -> {}", self.state, next);
        self.state = next;
    }

    fn fail(&mut self, outcome: SendOutcome) -> SmsResult<SendOutcome> {
        warn!("SMS send failed in state {}: {}", self.state, outcome);
        self.transition(SendState::Failed);
        Ok(outcome)
    }

    async fn command(&mut self, command: &AtCommand) -> SmsResult<()> {
        let text = command.to_command_string();
        if let Some(logger) = self.logger {
            logger.log_command(&text);
        }
        self.transport.write_command(&text).await
    }

    async fn read_classified(&mut self, max_wait: Duration) -> SmsResult<(String, ClassifiedLine)> {
        let line = self.transport.read_line(max_wait).await?;
        let classified = self.classify_or_defer(&line);
        if let Some(logger) = self.logger {
            if !line.is_empty() {
                logger.log_line(&line, &classified);
            }
        }
        Ok((line, classified))
    }

    /// Read and discard responses for `window`, keeping incoming SMS lines
    async fn drain(&mut self, window: Duration) -> SmsResult<()> {
        let line_timeout = self.timings.line_timeout;
        let deadline = Instant::now() + window;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Ok(());
            }
            let (line, _) = self.read_classified(remaining.min(line_timeout)).await?;
            if !line.is_empty() {
                debug!("Drained: {}", line);
            }
        }
    }

    /// Send one message
    ///
    /// Input is validated and encoded before anything is written to the modem.
    ///
    /// # Returns
    ///
    /// * `Ok(outcome)` - the dialog ran to completion; check `outcome` for success
    /// * `Err(error)` - validation failed or the channel failed mid-dialog
    pub async fn send(
        &mut self,
        destination: &str,
        message: &str,
        mode: EncodingMode,
    ) -> SmsResult<SendOutcome> {
        validate_destination(destination)?;
        let payload = encode(message, mode)?;

        if !self.transport.is_open() {
            return Err(SmsError::NotOpen);
        }

        match self.run(destination, &payload.bytes).await {
            Ok(outcome) => Ok(outcome),
            Err(error) => {
                warn!("SMS send aborted in state {}: {}", self.state, error);
                self.transition(SendState::Failed);
                Err(error)
            }
        }
    }

    async fn run(&mut self, destination: &str, payload: &[u8]) -> SmsResult<SendOutcome> {
        let timings = self.timings;

        self.transition(SendState::ModeSet);
        self.command(&AtCommand::TextMode).await?;
        sleep(timings.text_mode_settle).await;
        self.drain(timings.text_mode_drain).await?;

        self.transition(SendState::CharsetSet);
        self.command(&AtCommand::CharacterSet(CharacterSet::Gsm)).await?;
        sleep(timings.charset_settle).await;
        self.drain(timings.charset_drain).await?;

        self.transition(SendState::Submitting);
        self.command(&AtCommand::SubmitMessage { destination: destination.to_string() }).await?;
        sleep(self.timings.submit_settle).await;

        self.transition(SendState::AwaitPrompt);
        let attempts = self.timings.prompt_attempts;
        let mut prompted = false;
        for _ in 0..attempts {
            match self.read_classified(timings.line_timeout).await? {
                (_, ClassifiedLine::Prompt) => {
                    prompted = true;
                    break;
                }
                (_, ClassifiedLine::Error { reason }) => {
                    return self.fail(SendOutcome::ModemError { text: reason });
                }
                _ => {}
            }
        }
        if !prompted {
            return self.fail(SendOutcome::PromptTimeout { attempts });
        }

        self.transition(SendState::WritingBody);
        if let Some(logger) = self.logger {
            logger.log_payload(LogLevel::Debug, "Message", payload);
        }
        self.transport.write_raw(payload).await?;
        sleep(self.timings.body_settle).await;

        self.transition(SendState::AwaitConfirm);
        let attempts = self.timings.confirm_attempts;
        let mut message_reference = None;
        for _ in 0..attempts {
            let (line, classified) = self.read_classified(timings.line_timeout).await?;
            if line.is_empty() {
                sleep(self.timings.confirm_idle_pause).await;
                continue;
            }
            match classified {
                ClassifiedLine::Unsolicited { tag: UnsolicitedTag::Cmgs, body } => {
                    message_reference = Some(body);
                }
                ClassifiedLine::Ok => {
                    match &message_reference {
                        Some(reference) => info!("SMS to {} accepted, reference {}", destination, reference),
                        None => info!("SMS to {} accepted", destination),
                    }
                    self.transition(SendState::Sent);
                    return Ok(SendOutcome::Sent);
                }
                ClassifiedLine::Error { reason } => {
                    return self.fail(SendOutcome::ModemError { text: reason });
                }
                _ => {}
            }
        }

        if let Some(reference) = message_reference {
            warn!("Saw +CMGS: {} but no final OK", reference);
        }
        self.fail(SendOutcome::ConfirmTimeout { attempts })
    }
}

/// Read and discard lines for `window`
///
/// Each read waits at most `line_timeout` and never past the end of the window.
pub async fn drain<T: LineTransport + ?Sized>(
    transport: &mut T,
    window: Duration,
    line_timeout: Duration,
) -> SmsResult<()> {
    let deadline = Instant::now() + window;
    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return Ok(());
        }
        let line = transport.read_line(remaining.min(line_timeout)).await?;
        if !line.is_empty() {
            debug!("Drained: {}", line);
        }
    }
}

/// Write each command and drain its responses
///
/// Responses are not checked; some firmware echoes nothing at all.
pub async fn run_init_sequence<T: LineTransport + ?Sized>(
    transport: &mut T,
    commands: &[AtCommand],
    drain_window: Duration,
    line_timeout: Duration,
) -> SmsResult<()> {
    for command in commands {
        transport.write_command(&command.to_command_string()).await?;
        drain(transport, drain_window, line_timeout).await?;
    }
    Ok(())
}

/// Configure the modem to push incoming messages as `+CMT` lines
pub async fn initialize_sms_push<T: LineTransport + ?Sized>(
    transport: &mut T,
    timings: &ProtocolTimings,
) -> SmsResult<()> {
    run_init_sequence(transport, &SMS_PUSH_INIT, timings.init_drain, timings.line_timeout).await?;
    info!("Modem initialized for SMS push (+CMT)");
    Ok(())
}

/// Configure the modem to report `RING` and `+CLIP` lines
pub async fn initialize_call_reporting<T: LineTransport + ?Sized>(
    transport: &mut T,
    timings: &ProtocolTimings,
) -> SmsResult<()> {
    run_init_sequence(transport, &CALL_REPORTING_INIT, timings.call_init_drain, timings.line_timeout).await?;
    info!("Modem initialized for call reporting (+CLIP)");
    Ok(())
}
