/// AT protocol definitions and response classification
///
/// This module contains the AT command vocabulary used for SMS operation and the
/// classifier that turns a received line into a `ClassifiedLine`.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Data-entry prompt sent by the modem after `AT+CMGS`
pub const PROMPT: &str = ">";

/// Final result code for success
pub const OK: &str = "OK";

/// Final result code for a generic failure
pub const ERROR: &str = "ERROR";

/// Vendor error prefix for message service failures
pub const CMS_ERROR_PREFIX: &str = "+CMS ERROR";

/// Vendor error prefix for equipment failures
pub const CME_ERROR_PREFIX: &str = "+CME ERROR";

/// Ctrl-Z, ends data-entry mode
pub const CTRL_Z: u8 = 26;

/// Character sets selectable with `AT+CSCS`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CharacterSet {
    /// Modem default alphabet
    Gsm,
    /// 16-bit wide characters, hex encoded. Not used for transmission yet.
    Ucs2,
}

impl CharacterSet {
    /// Name as used inside the `AT+CSCS` command
    pub fn as_str(self) -> &'static str {
        match self {
            CharacterSet::Gsm => "GSM",
            CharacterSet::Ucs2 => "UCS2",
        }
    }
}

/// AT commands used by this library
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AtCommand {
    /// `AT`, attention / liveness check
    Attention,
    /// `AT+CMEE=2`, verbose error reports
    VerboseErrors,
    /// `AT+CMGF=1`, SMS text mode
    TextMode,
    /// `AT+CSCS="<charset>"`
    CharacterSet(CharacterSet),
    /// `AT+CNMI=2,2,0,0,0`, push new messages straight to the host as `+CMT`
    PushNewMessages,
    /// `AT+CMGS="<destination>"`, start submitting a message
    SubmitMessage { destination: String },
    /// `AT+CLIP=1`, caller id presentation
    CallerIdPresentation,
    /// `AT+CRC=1`, extended ring indications
    ExtendedRingIndication,
}

impl AtCommand {
    /// Render the command line without terminator
    pub fn to_command_string(&self) -> String {
        match self {
            AtCommand::Attention => "AT".to_string(),
            AtCommand::VerboseErrors => "AT+CMEE=2".to_string(),
            AtCommand::TextMode => "AT+CMGF=1".to_string(),
            AtCommand::CharacterSet(charset) => format!("AT+CSCS=\"{}\"", charset.as_str()),
            AtCommand::PushNewMessages => "AT+CNMI=2,2,0,0,0".to_string(),
            AtCommand::SubmitMessage { destination } => format!("AT+CMGS=\"{}\"", destination),
            AtCommand::CallerIdPresentation => "AT+CLIP=1".to_string(),
            AtCommand::ExtendedRingIndication => "AT+CRC=1".to_string(),
        }
    }
}

impl fmt::Display for AtCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_command_string())
    }
}

/// Known unsolicited result code prefixes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UnsolicitedTag {
    /// `+CMT:`, incoming SMS header
    Cmt,
    /// `+CMGS:`, message reference after a successful submit
    Cmgs,
    /// `RING`, incoming call
    Ring,
    /// `+CLIP:`, caller id
    Clip,
}

impl UnsolicitedTag {
    /// All tags, in matching order
    pub const ALL: [UnsolicitedTag; 4] = [
        UnsolicitedTag::Cmt,
        UnsolicitedTag::Cmgs,
        UnsolicitedTag::Ring,
        UnsolicitedTag::Clip,
    ];

    /// Literal line prefix
    pub fn prefix(self) -> &'static str {
        match self {
            UnsolicitedTag::Cmt => "+CMT:",
            UnsolicitedTag::Cmgs => "+CMGS:",
            UnsolicitedTag::Ring => "RING",
            UnsolicitedTag::Clip => "+CLIP:",
        }
    }
}

impl fmt::Display for UnsolicitedTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.prefix())
    }
}

/// A received line, classified
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClassifiedLine {
    /// The `>` data prompt
    Prompt,
    /// Final `OK`
    Ok,
    /// `ERROR`, `+CMS ERROR: ...` or `+CME ERROR: ...`; `reason` is the full line
    Error { reason: String },
    /// Unsolicited result code; `body` is the text after the prefix, trimmed
    Unsolicited { tag: UnsolicitedTag, body: String },
    /// Anything else, including empty lines and message bodies
    Plain { text: String },
}

impl ClassifiedLine {
    /// Check if this is a final result code (`OK` or an error)
    pub fn is_final(&self) -> bool {
        matches!(self, ClassifiedLine::Ok | ClassifiedLine::Error { .. })
    }
}

impl fmt::Display for ClassifiedLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClassifiedLine::Prompt => write!(f, "Prompt"),
            ClassifiedLine::Ok => write!(f, "Ok"),
            ClassifiedLine::Error { reason } => write!(f, "Error({})", reason),
            ClassifiedLine::Unsolicited { tag, body } => write!(f, "Unsolicited({} {})", tag, body),
            ClassifiedLine::Plain { text } => write!(f, "Plain({})", text),
        }
    }
}

/// Classify one received line
///
/// Matching is anchored against the fixed result-code vocabulary; body text that merely
/// contains `OK` or `ERROR` stays `Plain`. Surrounding whitespace is ignored for matching,
/// so the modem's `"> "` prompt is recognised.
///
/// # Examples
///
/// ```rust
/// use voltage_sms::protocol::{classify, ClassifiedLine, UnsolicitedTag};
///
/// assert_eq!(classify("OK"), ClassifiedLine::Ok);
/// assert_eq!(classify("> "), ClassifiedLine::Prompt);
/// assert!(matches!(classify("+CMS ERROR: 500"), ClassifiedLine::Error { .. }));
/// assert!(matches!(
///     classify("+CMGS: 42"),
///     ClassifiedLine::Unsolicited { tag: UnsolicitedTag::Cmgs, .. }
/// ));
/// ```
pub fn classify(line: &str) -> ClassifiedLine {
    let trimmed = line.trim();

    if trimmed == PROMPT {
        return ClassifiedLine::Prompt;
    }
    if trimmed == OK {
        return ClassifiedLine::Ok;
    }
    if trimmed == ERROR
        || trimmed.starts_with(CMS_ERROR_PREFIX)
        || trimmed.starts_with(CME_ERROR_PREFIX)
    {
        return ClassifiedLine::Error { reason: trimmed.to_string() };
    }

    for tag in UnsolicitedTag::ALL {
        if let Some(rest) = trimmed.strip_prefix(tag.prefix()) {
            // RING must be the whole token, not a prefix of a word
            if tag == UnsolicitedTag::Ring && !rest.is_empty() && !rest.starts_with(char::is_whitespace) {
                continue;
            }
            return ClassifiedLine::Unsolicited { tag, body: rest.trim().to_string() };
        }
    }

    ClassifiedLine::Plain { text: line.to_string() }
}
