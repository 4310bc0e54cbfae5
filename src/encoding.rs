//! # Outgoing Message Encoding
//!
//! Turns a message into the exact bytes written after the `>` prompt.
//!
//! Only the modem's native single-byte text path is implemented. Text that the
//! native repertoire (7-bit ASCII) cannot carry goes through a lossy fallback:
//!
//! 1. Unicode canonical decomposition (NFD)
//! 2. Combining marks are dropped, so `é` becomes `e`
//! 3. Whatever is still outside the repertoire becomes `?`
//!
//! `EncodingMode::Unicode` is accepted but is **not** transmitted as UCS2. It takes the
//! same lossy path, and `EncodedPayload::degraded` is set so callers can tell the
//! operator that the wide encoding was not honoured.

use std::fmt;
use std::str::FromStr;

use log::warn;
use serde::{Deserialize, Serialize};
use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

use crate::error::{SmsError, SmsResult};
use crate::protocol::CTRL_Z;

/// Maximum message length in characters
pub const MAX_MESSAGE_CHARS: usize = 1600;

/// Substitute for characters the native repertoire cannot carry
pub const SUBSTITUTE: char = '?';

/// Requested character set for an outgoing message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EncodingMode {
    /// Native when possible, lossy fallback otherwise
    #[default]
    Auto,
    /// Native single-byte text
    Native,
    /// Wide characters; currently degrades to the native fallback
    Unicode,
}

impl FromStr for EncodingMode {
    type Err = SmsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "auto" => Ok(EncodingMode::Auto),
            "native" | "gsm" => Ok(EncodingMode::Native),
            "unicode" | "ucs2" => Ok(EncodingMode::Unicode),
            other => Err(SmsError::validation(format!("Unknown encoding mode: {}", other))),
        }
    }
}

impl fmt::Display for EncodingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EncodingMode::Auto => "auto",
            EncodingMode::Native => "native",
            EncodingMode::Unicode => "unicode",
        };
        f.write_str(name)
    }
}

/// Bytes ready to be written after the prompt
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedPayload {
    /// Message bytes followed by the Ctrl-Z terminator
    pub bytes: Vec<u8>,
    /// Some characters were stripped or substituted
    pub lossy: bool,
    /// A wide encoding was requested but native text is sent
    pub degraded: bool,
}

impl EncodedPayload {
    /// Payload without the terminator
    pub fn text_bytes(&self) -> &[u8] {
        self.bytes.strip_suffix(&[CTRL_Z]).unwrap_or(&self.bytes[..])
    }
}

fn is_native(c: char) -> bool {
    c.is_ascii()
}

/// Check that a message can be submitted at all
pub fn validate_message(message: &str) -> SmsResult<()> {
    if message.is_empty() {
        return Err(SmsError::validation("Message cannot be empty"));
    }
    let length = message.chars().count();
    if length > MAX_MESSAGE_CHARS {
        return Err(SmsError::validation(format!(
            "Message too long ({} characters, max {})",
            length, MAX_MESSAGE_CHARS
        )));
    }
    Ok(())
}

/// Render text in the native repertoire, stripping accents and substituting the rest
///
/// Returns the rendered text and whether anything was lost.
///
/// # Examples
///
/// ```rust
/// use voltage_sms::encoding::preview;
///
/// assert_eq!(preview("Hello"), ("Hello".to_string(), false));
/// assert_eq!(preview("café"), ("cafe".to_string(), true));
/// assert_eq!(preview("ok 🎉"), ("ok ?".to_string(), true));
/// ```
pub fn preview(message: &str) -> (String, bool) {
    if message.chars().all(is_native) {
        return (message.to_string(), false);
    }

    let rendered = message
        .nfd()
        .filter(|&c| is_native(c) || !is_combining_mark(c))
        .map(|c| if is_native(c) { c } else { SUBSTITUTE })
        .collect();
    (rendered, true)
}

/// Encode a message for transmission in data-entry mode
///
/// # Errors
///
/// `SmsError::Validation` for an empty message or one longer than
/// `MAX_MESSAGE_CHARS` characters.
pub fn encode(message: &str, mode: EncodingMode) -> SmsResult<EncodedPayload> {
    validate_message(message)?;

    let degraded = mode == EncodingMode::Unicode;
    if degraded {
        warn!("UCS2 transmission is not supported; sending native text with substitution");
    }

    let (text, lossy) = preview(message);
    if lossy {
        warn!("Message contains characters outside the native character set; they will be stripped or replaced");
    }

    let mut bytes = Vec::with_capacity(text.len() + 1);
    bytes.extend_from_slice(text.as_bytes());
    bytes.push(CTRL_Z);

    Ok(EncodedPayload { bytes, lossy, degraded })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_native_message_is_verbatim() {
        let payload = encode("Hello, world! 123", EncodingMode::Auto).unwrap();
        assert_eq!(payload.bytes, b"Hello, world! 123\x1a".to_vec());
        assert_eq!(payload.text_bytes(), b"Hello, world! 123");
        assert!(!payload.lossy);
        assert!(!payload.degraded);
    }

    #[test]
    fn test_accents_are_stripped() {
        let payload = encode("café", EncodingMode::Auto).unwrap();
        assert_eq!(payload.bytes, b"cafe\x1a".to_vec());
        assert!(payload.lossy);

        let payload = encode("Ærøskøbing naïve façade", EncodingMode::Native).unwrap();
        assert_eq!(payload.text_bytes(), b"?r?sk?bing naive facade");
    }

    #[test]
    fn test_encoding_is_deterministic() {
        let first = encode("Größe über café", EncodingMode::Auto).unwrap();
        let _ = encode("something else entirely", EncodingMode::Auto).unwrap();
        let second = encode("Größe über café", EncodingMode::Auto).unwrap();
        assert_eq!(first, second);
        assert_eq!(first.text_bytes(), b"Gro?e uber cafe");
    }

    #[test]
    fn test_unicode_mode_degrades() {
        let payload = encode("hi 🎉", EncodingMode::Unicode).unwrap();
        assert_eq!(payload.text_bytes(), b"hi ?");
        assert!(payload.degraded);
        assert!(payload.lossy);
    }

    #[test]
    fn test_length_boundaries() {
        assert!(matches!(encode("", EncodingMode::Auto), Err(SmsError::Validation { .. })));

        let exact = "a".repeat(MAX_MESSAGE_CHARS);
        assert_eq!(encode(&exact, EncodingMode::Auto).unwrap().bytes.len(), MAX_MESSAGE_CHARS + 1);

        let over = "a".repeat(MAX_MESSAGE_CHARS + 1);
        assert!(matches!(encode(&over, EncodingMode::Auto), Err(SmsError::Validation { .. })));

        // Counted in characters, not bytes
        let wide = "é".repeat(MAX_MESSAGE_CHARS);
        assert!(encode(&wide, EncodingMode::Auto).is_ok());
    }

    #[test]
    fn test_text_bytes_without_terminator() {
        let empty = EncodedPayload { bytes: Vec::new(), lossy: false, degraded: false };
        assert!(empty.text_bytes().is_empty());

        let bare = EncodedPayload { bytes: b"Hi".to_vec(), lossy: false, degraded: false };
        assert_eq!(bare.text_bytes(), b"Hi");
    }

    #[test]
    fn test_mode_parsing() {
        assert_eq!("auto".parse::<EncodingMode>().unwrap(), EncodingMode::Auto);
        assert_eq!("GSM".parse::<EncodingMode>().unwrap(), EncodingMode::Native);
        assert_eq!("ucs2".parse::<EncodingMode>().unwrap(), EncodingMode::Unicode);
        assert!("utf-16".parse::<EncodingMode>().is_err());
        assert_eq!(EncodingMode::Unicode.to_string(), "unicode");
    }
}
