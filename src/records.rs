/// Message records for append-only JSON Lines logs
///
/// One JSON object per line. Received and sent messages share a file and are told
/// apart by the `direction` field:
///
/// ```text
/// {"direction":"received","sender":"+4915140142720","timestamp":"25/10/18,14:25:44+08","text":"Hallo","raw_header":"+CMT: ..."}
/// {"direction":"sent","recipient":"+15551234567","timestamp":"2025-10-18T14:30:02.118+02:00","text":"Hi","ascii_only":true}
/// ```

use std::path::{Path, PathBuf};

use chrono::{DateTime, Local, SecondsFormat};
use log::debug;
use serde::{Deserialize, Serialize};
use tokio::fs::{self, File, OpenOptions};
use tokio::io::AsyncWriteExt;

use crate::error::SmsResult;
use crate::receiver::IncomingMessage;

/// One logged message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "direction", rename_all = "lowercase")]
pub enum MessageRecord {
    Received {
        sender: String,
        /// Modem timestamp, verbatim
        timestamp: String,
        text: String,
        raw_header: String,
    },
    Sent {
        recipient: String,
        /// Local time of the confirmed submission, RFC 3339
        timestamp: String,
        text: String,
        /// The text went out without substitution
        ascii_only: bool,
    },
}

impl MessageRecord {
    /// Record for a confirmed outgoing message, stamped with the current local time
    pub fn sent(recipient: &str, text: &str) -> Self {
        Self::sent_at(recipient, text, Local::now())
    }

    pub fn sent_at(recipient: &str, text: &str, at: DateTime<Local>) -> Self {
        MessageRecord::Sent {
            recipient: recipient.to_string(),
            timestamp: at.to_rfc3339_opts(SecondsFormat::Millis, false),
            text: text.to_string(),
            ascii_only: text.is_ascii(),
        }
    }

    /// The other party's number
    pub fn peer(&self) -> &str {
        match self {
            MessageRecord::Received { sender, .. } => sender,
            MessageRecord::Sent { recipient, .. } => recipient,
        }
    }

    pub fn to_json_line(&self) -> SmsResult<String> {
        Ok(serde_json::to_string(self)?)
    }
}

impl From<IncomingMessage> for MessageRecord {
    fn from(message: IncomingMessage) -> Self {
        MessageRecord::Received {
            sender: message.sender,
            timestamp: message.timestamp,
            text: message.text,
            raw_header: message.raw_header,
        }
    }
}

/// Appends records to a JSON Lines file
///
/// Each record is flushed as soon as it is written.
pub struct JsonlWriter {
    path: PathBuf,
    file: File,
    written: u64,
}

impl JsonlWriter {
    /// Open `path` for appending, creating it and its parent directories
    pub async fn open<P: AsRef<Path>>(path: P) -> SmsResult<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).await?;
            }
        }

        let file = OpenOptions::new().create(true).append(true).open(&path).await?;
        debug!("Appending message records to {}", path.display());
        Ok(Self { path, file, written: 0 })
    }

    pub async fn append(&mut self, record: &MessageRecord) -> SmsResult<()> {
        let mut line = record.to_json_line()?;
        line.push('\n');
        self.file.write_all(line.as_bytes()).await?;
        self.file.flush().await?;
        self.written += 1;
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Records appended through this writer
    pub fn written(&self) -> u64 {
        self.written
    }
}
