//! Integration Tests for Voltage SMS Library
//!
//! These tests drive the send dialog, the receive loop and shared sessions against a
//! scripted modem, without serial hardware.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::time::{sleep, timeout, Instant};
use tokio_util::sync::CancellationToken;
use voltage_sms::*;

const HEADER: &str = r#"+CMT: "+4915140142720","","25/10/18,14:25:44+08""#;
const LINE_TIMEOUT: Duration = Duration::from_millis(10);

/// One scripted answer from the modem
#[derive(Debug, Clone)]
enum Reply {
    Line(&'static str),
    /// A read that times out with nothing
    Silence,
    /// The modem closes the stream
    Eof,
}

/// Scripted modem for testing without serial hardware
///
/// Reads pop from a shared inbox; an empty inbox behaves like a silent modem.
/// Replies queued with `on_submit` and `on_body` are released when the matching
/// write happens.
struct MockModem {
    inbox: Arc<Mutex<VecDeque<Reply>>>,
    writes: Arc<Mutex<Vec<String>>>,
    on_submit: Vec<Reply>,
    on_body: Vec<Reply>,
    reads: u64,
    open: bool,
}

impl MockModem {
    fn new() -> Self {
        Self {
            inbox: Arc::new(Mutex::new(VecDeque::new())),
            writes: Arc::new(Mutex::new(Vec::new())),
            on_submit: Vec::new(),
            on_body: Vec::new(),
            reads: 0,
            open: true,
        }
    }

    fn with_inbox(self, replies: &[Reply]) -> Self {
        self.inbox.lock().unwrap().extend(replies.iter().cloned());
        self
    }

    fn on_submit(mut self, replies: &[Reply]) -> Self {
        self.on_submit = replies.to_vec();
        self
    }

    fn on_body(mut self, replies: &[Reply]) -> Self {
        self.on_body = replies.to_vec();
        self
    }

    fn writes(&self) -> Arc<Mutex<Vec<String>>> {
        self.writes.clone()
    }

    fn release(&self, replies: &[Reply]) {
        self.inbox.lock().unwrap().extend(replies.iter().cloned());
    }
}

#[async_trait]
impl LineTransport for MockModem {
    async fn write_command(&mut self, command: &str) -> SmsResult<()> {
        if !self.open {
            return Err(SmsError::NotOpen);
        }
        self.writes.lock().unwrap().push(command.trim().to_string());
        if command.starts_with("AT+CMGS=") {
            self.release(&self.on_submit.clone());
        }
        Ok(())
    }

    async fn write_raw(&mut self, data: &[u8]) -> SmsResult<()> {
        if !self.open {
            return Err(SmsError::NotOpen);
        }
        self.writes.lock().unwrap().push(String::from_utf8_lossy(data).into_owned());
        if data.last() == Some(&26) {
            self.release(&self.on_body.clone());
        }
        Ok(())
    }

    async fn read_line(&mut self, max_wait: Duration) -> SmsResult<String> {
        if !self.open {
            return Err(SmsError::NotOpen);
        }
        self.reads += 1;
        let next = self.inbox.lock().unwrap().pop_front();
        match next {
            Some(Reply::Line(line)) => Ok(line.to_string()),
            Some(Reply::Eof) => Err(SmsError::ChannelClosed),
            Some(Reply::Silence) | None => {
                sleep(max_wait).await;
                Ok(String::new())
            }
        }
    }

    fn is_open(&self) -> bool {
        self.open
    }

    async fn close(&mut self) -> SmsResult<()> {
        self.open = false;
        Ok(())
    }

    fn get_stats(&self) -> TransportStats {
        TransportStats {
            lines_received: self.reads,
            ..TransportStats::default()
        }
    }
}

fn timings() -> ProtocolTimings {
    ProtocolTimings::without_delays(LINE_TIMEOUT)
}

async fn send(modem: &mut MockModem, message: &str, mode: EncodingMode) -> SmsResult<SendOutcome> {
    let timings = timings();
    SmsSender::new(modem, &timings).send("+15551234567", message, mode).await
}

/// Prompt on the third read, then +CMGS and OK
#[tokio::test]
async fn test_send_prompt_on_third_read() {
    let mut modem = MockModem::new()
        .on_submit(&[Reply::Silence, Reply::Line("AT+CMGS=\"+15551234567\""), Reply::Line("> ")])
        .on_body(&[Reply::Line(""), Reply::Line("+CMGS: 12"), Reply::Line(""), Reply::Line("OK")]);
    let writes = modem.writes();

    let outcome = send(&mut modem, "Hello", EncodingMode::Auto).await.unwrap();

    assert_eq!(outcome, SendOutcome::Sent);
    assert_eq!(
        writes.lock().unwrap().as_slice(),
        ["AT+CMGF=1", "AT+CSCS=\"GSM\"", "AT+CMGS=\"+15551234567\"", "Hello\u{1a}"]
    );
}

/// A silent modem exhausts the prompt budget and the body is never written
#[tokio::test]
async fn test_send_without_prompt_times_out() {
    let mut modem = MockModem::new();
    let writes = modem.writes();

    let outcome = send(&mut modem, "Hello", EncodingMode::Auto).await.unwrap();

    assert_eq!(outcome, SendOutcome::PromptTimeout { attempts: 10 });
    assert_eq!(modem.get_stats().lines_received, 10);
    assert_eq!(writes.lock().unwrap().len(), 3);
    assert_eq!(outcome.into_result().unwrap_err().exit_code(), error::EXIT_PROTOCOL);
}

/// An error after the body is reported with its text
#[tokio::test]
async fn test_send_modem_error_after_prompt() {
    let mut modem = MockModem::new()
        .on_submit(&[Reply::Line("> ")])
        .on_body(&[Reply::Line("+CMS ERROR: 304")]);

    let outcome = send(&mut modem, "Hello", EncodingMode::Auto).await.unwrap();

    assert_eq!(outcome, SendOutcome::ModemError { text: "+CMS ERROR: 304".to_string() });
}

/// An error instead of the prompt stops the dialog before the body
#[tokio::test]
async fn test_send_modem_error_instead_of_prompt() {
    let mut modem = MockModem::new().on_submit(&[Reply::Line("ERROR")]);
    let writes = modem.writes();

    let outcome = send(&mut modem, "Hello", EncodingMode::Auto).await.unwrap();

    assert_eq!(outcome, SendOutcome::ModemError { text: "ERROR".to_string() });
    assert!(!writes.lock().unwrap().iter().any(|w| w.ends_with('\u{1a}')));
}

/// Prompt and body, then silence
#[tokio::test]
async fn test_send_confirm_timeout() {
    let mut modem = MockModem::new()
        .on_submit(&[Reply::Line("> ")])
        .on_body(&[Reply::Line("+CMGS: 3")]);

    let outcome = send(&mut modem, "Hello", EncodingMode::Auto).await.unwrap();

    assert_eq!(outcome, SendOutcome::ConfirmTimeout { attempts: 20 });
}

/// Body text that contains result-code words is not a confirmation
#[tokio::test]
async fn test_send_ignores_result_words_inside_text() {
    let mut modem = MockModem::new()
        .on_submit(&[Reply::Line("> ")])
        .on_body(&[Reply::Line("Is this OK? No ERROR"), Reply::Line("OK")]);

    let outcome = send(&mut modem, "Is this OK? No ERROR", EncodingMode::Auto).await.unwrap();

    assert_eq!(outcome, SendOutcome::Sent);
}

/// Invalid input never reaches the modem
#[tokio::test]
async fn test_validation_happens_before_any_write() {
    let mut modem = MockModem::new();
    let writes = modem.writes();
    let timings = timings();

    for (destination, message) in [
        ("+15551234567", ""),
        ("", "Hello"),
        ("555-1234", "Hello"),
        ("+15551234567", &*"x".repeat(MAX_MESSAGE_CHARS + 1)),
    ] {
        let result = SmsSender::new(&mut modem, &timings)
            .send(destination, message, EncodingMode::Auto)
            .await;
        let err = result.unwrap_err();
        assert!(matches!(err, SmsError::Validation { .. }), "{:?}", err);
        assert_eq!(err.exit_code(), error::EXIT_VALIDATION);
    }
    assert!(writes.lock().unwrap().is_empty());
}

/// Unicode requests are sent as substituted native text
#[tokio::test]
async fn test_unicode_request_degrades_on_the_wire() {
    let mut modem = MockModem::new()
        .on_submit(&[Reply::Line("> ")])
        .on_body(&[Reply::Line("OK")]);
    let writes = modem.writes();

    let outcome = send(&mut modem, "Grüße café", EncodingMode::Unicode).await.unwrap();

    assert_eq!(outcome, SendOutcome::Sent);
    assert_eq!(writes.lock().unwrap().last().unwrap(), "Gru?e cafe\u{1a}");
}

/// A silent modem cannot hold a send past its computed bound
#[tokio::test]
async fn test_send_returns_within_worst_case() {
    let mut modem = MockModem::new()
        .on_submit(&[Reply::Line("> ")]);
    let timings = timings();

    let started = Instant::now();
    let outcome = SmsSender::new(&mut modem, &timings)
        .send("+15551234567", "Hello", EncodingMode::Auto)
        .await
        .unwrap();

    assert_eq!(outcome, SendOutcome::ConfirmTimeout { attempts: 20 });
    assert!(started.elapsed() < timings.worst_case_send() + Duration::from_millis(500));
}

/// Header and body produce exactly one message
#[tokio::test]
async fn test_receive_header_and_body() {
    let modem = MockModem::new().with_inbox(&[
        Reply::Line("RING"),
        Reply::Line(HEADER),
        Reply::Silence,
        Reply::Line(""),
        Reply::Line("Hallo Welt"),
        Reply::Line("OK"),
        Reply::Eof,
    ]);
    let session = ModemSession::new(modem, timings());
    let (tx, mut rx) = mpsc::channel(8);

    let delivered = session.receive(&CancellationToken::new(), tx).await.unwrap();

    assert_eq!(delivered, 1);
    let message = rx.recv().await.unwrap();
    assert_eq!(
        message,
        IncomingMessage {
            sender: "+4915140142720".to_string(),
            timestamp: "25/10/18,14:25:44+08".to_string(),
            text: "Hallo Welt".to_string(),
            raw_header: HEADER.to_string(),
        }
    );
    assert!(rx.recv().await.is_none());
}

/// A header followed by end of stream yields nothing
#[tokio::test]
async fn test_receive_header_then_eof() {
    let modem = MockModem::new().with_inbox(&[Reply::Line(HEADER), Reply::Line("   "), Reply::Eof]);
    let session = ModemSession::new(modem, timings());
    let (tx, mut rx) = mpsc::channel(8);

    let delivered = session.receive(&CancellationToken::new(), tx).await.unwrap();

    assert_eq!(delivered, 0);
    assert!(rx.recv().await.is_none());
}

/// A send and the receive loop share one modem without stealing each other's lines
#[tokio::test]
async fn test_send_and_receive_interleave() {
    let modem = MockModem::new()
        .on_submit(&[
            Reply::Line(r#"+CMT: "+4930123456","","25/10/18,14:26:01+08""#),
            Reply::Line("arrived during send"),
            Reply::Line("> "),
        ])
        .on_body(&[Reply::Line("+CMGS: 9"), Reply::Line("OK")]);
    let inbox = modem.inbox.clone();
    let session = ModemSession::new(modem, timings());

    let cancel = CancellationToken::new();
    let (tx, mut rx) = mpsc::channel(8);
    let receiver = {
        let session = session.clone();
        let cancel = cancel.clone();
        tokio::spawn(async move { session.receive(&cancel, tx).await })
    };

    inbox.lock().unwrap().extend([Reply::Line(HEADER), Reply::Line("before send")]);
    let first = timeout(Duration::from_secs(2), rx.recv()).await.unwrap().unwrap();
    assert_eq!(first.text, "before send");

    let outcome = session
        .send_sms("+15551234567", "Hello", EncodingMode::Auto)
        .await
        .unwrap();
    assert_eq!(outcome, SendOutcome::Sent);

    let second = timeout(Duration::from_secs(2), rx.recv()).await.unwrap().unwrap();
    assert_eq!(second.sender, "+4930123456");
    assert_eq!(second.text, "arrived during send");

    cancel.cancel();
    assert_eq!(receiver.await.unwrap(), Ok(2));

    let metrics = session.get_metrics().await;
    assert_eq!(metrics.successful_requests, 1);
}

/// An incoming SMS body reading "OK" is message text, not the send's confirmation
#[tokio::test]
async fn test_sms_body_during_confirm_is_not_a_result_code() {
    let mut modem = MockModem::new()
        .on_submit(&[Reply::Line("> ")])
        .on_body(&[Reply::Line(HEADER), Reply::Line("OK"), Reply::Line("+CMS ERROR: 500")]);
    let timings = timings();

    let mut sender = SmsSender::new(&mut modem, &timings);
    let outcome = sender.send("+15551234567", "Hello", EncodingMode::Auto).await.unwrap();

    assert_eq!(outcome, SendOutcome::ModemError { text: "+CMS ERROR: 500".to_string() });
    assert_eq!(sender.take_deferred(), [HEADER, "OK"]);
}

/// An SMS pushed while the send drains mode and charset replies is kept
#[tokio::test]
async fn test_sms_during_drain_window_is_kept() {
    let mut modem = MockModem::new()
        .with_inbox(&[Reply::Line(HEADER), Reply::Line("arrived in drain"), Reply::Line("OK")])
        .on_submit(&[Reply::Line("> ")])
        .on_body(&[Reply::Line("OK")]);
    let timings = ProtocolTimings {
        text_mode_drain: Duration::from_millis(50),
        ..timings()
    };

    let mut sender = SmsSender::new(&mut modem, &timings);
    let outcome = sender.send("+15551234567", "Hello", EncodingMode::Auto).await.unwrap();

    assert_eq!(outcome, SendOutcome::Sent);
    assert_eq!(sender.take_deferred(), [HEADER, "arrived in drain"]);
}

/// A send that starts between a header and its body parks the body for the receive loop
#[tokio::test]
async fn test_send_between_header_and_body() {
    let modem = MockModem::new()
        .on_submit(&[Reply::Line("body of first"), Reply::Line("> ")])
        .on_body(&[Reply::Line("OK")]);
    let inbox = modem.inbox.clone();
    let session = ModemSession::new(modem, timings());

    let cancel = CancellationToken::new();
    let (tx, mut rx) = mpsc::channel(8);
    let receiver = {
        let session = session.clone();
        let cancel = cancel.clone();
        tokio::spawn(async move { session.receive(&cancel, tx).await })
    };

    inbox.lock().unwrap().push_back(Reply::Line(HEADER));
    let channel = session.channel();
    timeout(Duration::from_secs(2), async {
        while channel.lock().await.assembler().pending_header().is_none() {
            sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap();

    let outcome = session
        .send_sms("+15551234567", "Hello", EncodingMode::Auto)
        .await
        .unwrap();
    assert_eq!(outcome, SendOutcome::Sent);

    inbox.lock().unwrap().extend([
        Reply::Line(r#"+CMT: "+4930123456","","25/10/18,14:26:01+08""#),
        Reply::Line("second body"),
    ]);

    let first = timeout(Duration::from_secs(2), rx.recv()).await.unwrap().unwrap();
    assert_eq!(first.sender, "+4915140142720");
    assert_eq!(first.text, "body of first");

    let second = timeout(Duration::from_secs(2), rx.recv()).await.unwrap().unwrap();
    assert_eq!(second.sender, "+4930123456");
    assert_eq!(second.text, "second body");

    cancel.cancel();
    assert_eq!(receiver.await.unwrap(), Ok(2));
}

/// Both initialisation sequences go out in order
#[tokio::test]
async fn test_initialization_sequences() {
    let modem = MockModem::new().with_inbox(&[Reply::Line("OK")]);
    let writes = modem.writes();
    let session = ModemSession::new(modem, timings());

    session.initialize_sms_push().await.unwrap();
    session.initialize_call_reporting().await.unwrap();

    assert_eq!(
        writes.lock().unwrap().as_slice(),
        [
            "AT", "AT+CMEE=2", "AT+CMGF=1", "AT+CSCS=\"GSM\"", "AT+CNMI=2,2,0,0,0",
            "AT", "AT+CMEE=2", "AT+CLIP=1", "AT+CRC=1",
        ]
    );

    session.close().await.unwrap();
    assert!(!session.is_open().await);
}
