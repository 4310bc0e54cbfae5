/// Incoming SMS and call indication loops
///
/// The modem pushes an incoming SMS as two lines: a `+CMT:` header and, possibly
/// after a blank separator, one line of body text. `MessageAssembler` pairs them.
/// A header is never turned into a message on its own: if the channel closes or the
/// loop is cancelled while a header is pending, the header is dropped.
///
/// Both loops take the channel lock once per line, so a send can run between reads.
/// The receive loop keeps its assembler on the channel for the same reason.

use std::time::Duration;

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;

use crate::error::{SmsError, SmsResult};
use crate::logging::CallbackLogger;
use crate::parser::{parse_clip, parse_cmt_header, CallerId, CmtHeader};
use crate::protocol::{classify, ClassifiedLine, UnsolicitedTag};
use crate::session::ModemChannel;
use crate::transport::LineTransport;

/// One received SMS
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IncomingMessage {
    pub sender: String,
    /// Service centre timestamp, verbatim from the header
    pub timestamp: String,
    pub text: String,
    /// The `+CMT:` line this message was built from
    pub raw_header: String,
}

/// Call indication reported by the modem
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CallEvent {
    /// `RING`
    Ring,
    /// `+CLIP: "<number>",<type>`
    CallerId(CallerId),
}

/// Pairs `+CMT` headers with the body line that follows them
#[derive(Debug, Default)]
pub struct MessageAssembler {
    pending: Option<CmtHeader>,
}

impl MessageAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Header waiting for its body, if any
    pub fn pending_header(&self) -> Option<&CmtHeader> {
        self.pending.as_ref()
    }

    /// Feed one line; returns a message when a header and its body have been seen
    ///
    /// Blank lines are skipped without touching the pending header. Lines that are
    /// not a header while none is pending are ignored.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use voltage_sms::receiver::MessageAssembler;
    ///
    /// let mut assembler = MessageAssembler::new();
    /// assert!(assembler.push_line(r#"+CMT: "+4915140142720","","25/10/18,14:25:44+08""#).is_none());
    /// assert!(assembler.push_line("").is_none());
    ///
    /// let message = assembler.push_line("Hallo Welt").unwrap();
    /// assert_eq!(message.sender, "+4915140142720");
    /// assert_eq!(message.text, "Hallo Welt");
    /// assert!(assembler.pending_header().is_none());
    /// ```
    pub fn push_line(&mut self, line: &str) -> Option<IncomingMessage> {
        let body = line.trim();
        if body.is_empty() {
            return None;
        }

        match self.pending.take() {
            None => {
                self.pending = parse_cmt_header(line);
                if let Some(header) = &self.pending {
                    debug!("SMS header from {} @ {}", header.sender, header.timestamp);
                }
                None
            }
            Some(header) => Some(IncomingMessage {
                sender: header.sender,
                timestamp: header.timestamp,
                text: body.to_string(),
                raw_header: header.raw_line,
            }),
        }
    }

    /// Drop any pending header
    pub fn reset(&mut self) {
        if let Some(header) = self.pending.take() {
            info!("Discarding SMS header without body: {}", header.raw_line);
        }
    }
}

/// Read lines until `handle` turns one into an item
///
/// Blank lines are skipped. Returns `None` when `cancel` fires or the peer closes the
/// channel. The lock is held for one read and its handling, then released.
async fn next_item<T, R, F>(
    channel: &Mutex<ModemChannel<T>>,
    line_timeout: Duration,
    logger: Option<&CallbackLogger>,
    cancel: &CancellationToken,
    mut handle: F,
) -> SmsResult<Option<R>>
where
    T: LineTransport,
    F: FnMut(&mut ModemChannel<T>, &str) -> Option<R>,
{
    loop {
        if cancel.is_cancelled() {
            return Ok(None);
        }

        let mut guard = tokio::select! {
            _ = cancel.cancelled() => return Ok(None),
            guard = channel.lock() => guard,
        };

        let line = match guard.next_line(line_timeout).await {
            Ok(line) => line,
            Err(SmsError::ChannelClosed) => {
                info!("Modem channel closed by peer");
                return Ok(None);
            }
            Err(e) => return Err(e),
        };
        if line.trim().is_empty() {
            continue;
        }

        if let Some(logger) = logger {
            logger.log_line(&line, &classify(&line));
        }
        if let Some(item) = handle(&mut *guard, &line) {
            return Ok(Some(item));
        }
    }
}

fn call_event(line: &str) -> Option<CallEvent> {
    match classify(line) {
        ClassifiedLine::Unsolicited { tag: UnsolicitedTag::Ring, .. } => Some(CallEvent::Ring),
        ClassifiedLine::Unsolicited { tag: UnsolicitedTag::Clip, .. } => {
            let caller = parse_clip(line);
            if caller.is_none() {
                debug!("Unparsed caller id line: {}", line);
            }
            caller.map(CallEvent::CallerId)
        }
        _ => None,
    }
}

/// Receive SMS until cancelled or the channel closes
///
/// Headers and bodies are paired by the channel's `MessageAssembler`, so a send
/// running between a header and its body does not split the message. Each message
/// is sent on `messages`. The loop also ends, without error, when the receiving
/// half of `messages` is dropped.
///
/// # Returns
///
/// Number of messages delivered.
pub async fn receive_messages<T: LineTransport>(
    channel: &Mutex<ModemChannel<T>>,
    line_timeout: Duration,
    logger: Option<&CallbackLogger>,
    cancel: &CancellationToken,
    messages: mpsc::Sender<IncomingMessage>,
) -> SmsResult<u64> {
    let mut delivered = 0u64;

    info!("Listening for incoming SMS");
    loop {
        let next = next_item(channel, line_timeout, logger, cancel, |modem, line| {
            modem.assembler_mut().push_line(line)
        })
        .await;
        let message = match next {
            Ok(Some(message)) => message,
            Ok(None) => break,
            Err(e) => {
                channel.lock().await.assembler_mut().reset();
                return Err(e);
            }
        };

        info!("SMS from {} @ {}: {}", message.sender, message.timestamp, message.text);
        if messages.send(message).await.is_err() {
            warn!("Message consumer went away; stopping receive loop");
            break;
        }
        delivered += 1;
    }

    channel.lock().await.assembler_mut().reset();
    info!("Receive loop stopped after {} message(s)", delivered);
    Ok(delivered)
}

/// Report `RING` and `+CLIP` indications until cancelled or the channel closes
pub async fn listen_calls<T: LineTransport>(
    channel: &Mutex<ModemChannel<T>>,
    line_timeout: Duration,
    logger: Option<&CallbackLogger>,
    cancel: &CancellationToken,
    events: mpsc::Sender<CallEvent>,
) -> SmsResult<u64> {
    let mut reported = 0u64;

    info!("Listening for incoming calls");
    while let Some(event) = next_item(channel, line_timeout, logger, cancel, |_, line| call_event(line)).await? {
        match &event {
            CallEvent::Ring => info!("Incoming call"),
            CallEvent::CallerId(caller) if caller.number.is_empty() => info!("Caller id withheld"),
            CallEvent::CallerId(caller) => info!("Caller id: {}", caller.number),
        }
        if events.send(event).await.is_err() {
            break;
        }
        reported += 1;
    }

    Ok(reported)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tokio::io::{duplex, AsyncWriteExt};
    use crate::logging::{LogCallback, LogLevel, LoggingMode};
    use crate::transport::StreamTransport;

    const HEADER: &str = r#"+CMT: "+4915140142720","","25/10/18,14:25:44+08""#;

    #[test]
    fn test_assembler_pairs_header_and_body() {
        let mut assembler = MessageAssembler::new();

        assert!(assembler.push_line("RING").is_none());
        assert!(assembler.push_line("OK").is_none());
        assert!(assembler.pending_header().is_none());

        assert!(assembler.push_line(HEADER).is_none());
        assert!(assembler.push_line("   ").is_none());
        assert!(assembler.pending_header().is_some());

        let message = assembler.push_line("  Hallo  ").unwrap();
        assert_eq!(
            message,
            IncomingMessage {
                sender: "+4915140142720".to_string(),
                timestamp: "25/10/18,14:25:44+08".to_string(),
                text: "Hallo".to_string(),
                raw_header: HEADER.to_string(),
            }
        );
        assert!(assembler.pending_header().is_none());
    }

    #[test]
    fn test_body_that_looks_like_a_header_is_still_the_body() {
        let mut assembler = MessageAssembler::new();
        assembler.push_line(HEADER);

        let message = assembler.push_line(HEADER).unwrap();
        assert_eq!(message.text, HEADER);
        assert!(assembler.pending_header().is_none());
    }

    #[tokio::test]
    async fn test_receive_until_peer_closes() {
        let (local, mut modem) = duplex(1024);
        let channel = Arc::new(Mutex::new(ModemChannel::new(StreamTransport::new("duplex", local))));
        let (tx, mut rx) = mpsc::channel(8);
        let cancel = CancellationToken::new();

        let feed = format!("\r\n{}\r\n\r\nfirst\r\nnoise\r\n{}\r\nsecond\r\n{}\r\n", HEADER, HEADER, HEADER);
        modem.write_all(feed.as_bytes()).await.unwrap();
        drop(modem);

        let delivered = receive_messages(&*channel, Duration::from_millis(50), None, &cancel, tx)
            .await
            .unwrap();
        assert_eq!(delivered, 2);
        assert_eq!(rx.recv().await.unwrap().text, "first");
        assert_eq!(rx.recv().await.unwrap().text, "second");
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_cancel_stops_receive_loop() {
        let (local, _modem) = duplex(1024);
        let channel = Arc::new(Mutex::new(ModemChannel::new(StreamTransport::new("duplex", local))));
        let (tx, _rx) = mpsc::channel(8);
        let cancel = CancellationToken::new();

        let task = {
            let channel = channel.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move {
                receive_messages(&*channel, Duration::from_millis(20), None, &cancel, tx).await
            })
        };

        tokio::time::sleep(Duration::from_millis(60)).await;
        cancel.cancel();
        assert_eq!(task.await.unwrap(), Ok(0));
    }

    #[tokio::test]
    async fn test_listen_calls() {
        let (local, mut modem) = duplex(1024);
        let channel = Mutex::new(ModemChannel::new(StreamTransport::new("duplex", local)));
        let (tx, mut rx) = mpsc::channel(8);
        let cancel = CancellationToken::new();

        let seen = Arc::new(std::sync::Mutex::new(Vec::new()));
        let logger = {
            let seen = seen.clone();
            let callback: LogCallback = Box::new(move |_level, message| {
                seen.lock().unwrap().push(message.to_string());
            });
            CallbackLogger::with_mode(Some(callback), LogLevel::Debug, LoggingMode::Raw)
        };

        modem
            .write_all(b"RING\r\n\r\n+CLIP: \"+15551234567\",145,\"\",0,\"\",0\r\nRINGING\r\n+CLIP: \"\",128\r\n")
            .await
            .unwrap();
        drop(modem);

        let reported = listen_calls(&channel, Duration::from_millis(50), Some(&logger), &cancel, tx)
            .await
            .unwrap();
        assert_eq!(reported, 3);
        assert_eq!(rx.recv().await.unwrap(), CallEvent::Ring);
        assert_eq!(
            rx.recv().await.unwrap(),
            CallEvent::CallerId(CallerId { number: "+15551234567".to_string(), number_type: Some(145) })
        );
        assert!(matches!(rx.recv().await.unwrap(), CallEvent::CallerId(c) if c.number.is_empty()));

        // Every non-blank line is reported, including ones that are not call events
        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 4);
        assert_eq!(seen[0], "AT <- RING");
        assert_eq!(seen[2], "AT <- RINGING");
    }

    #[tokio::test]
    async fn test_header_pending_on_channel_survives_a_send() {
        let (local, mut modem) = duplex(1024);
        let channel = Mutex::new(ModemChannel::new(StreamTransport::new("duplex", local)));
        let (tx, mut rx) = mpsc::channel(8);
        let cancel = CancellationToken::new();

        // A send took the body off the wire and parked it
        channel.lock().await.assembler_mut().push_line(HEADER);
        channel.lock().await.defer(vec!["parked body".to_string()]);

        let second = r#"+CMT: "+4930123456","","25/10/18,14:26:01+08""#;
        modem.write_all(format!("{}\r\nsecond body\r\n", second).as_bytes()).await.unwrap();
        drop(modem);

        let delivered = receive_messages(&channel, Duration::from_millis(50), None, &cancel, tx)
            .await
            .unwrap();
        assert_eq!(delivered, 2);

        let first = rx.recv().await.unwrap();
        assert_eq!((first.sender.as_str(), first.text.as_str()), ("+4915140142720", "parked body"));
        let next = rx.recv().await.unwrap();
        assert_eq!((next.sender.as_str(), next.text.as_str()), ("+4930123456", "second body"));
        assert!(channel.lock().await.assembler().pending_header().is_none());
    }
}
