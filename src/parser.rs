/// Parsers for unsolicited modem lines
///
/// These are narrow pattern matches, not a general AT response grammar. Anything that
/// deviates from the expected shape yields `None`, never a partially filled value.

use serde::{Deserialize, Serialize};

use crate::protocol::UnsolicitedTag;

/// Header of a pushed incoming SMS
///
/// Wire form: `+CMT: "<number>","<alpha>","<timestamp>"`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CmtHeader {
    /// Originating address, never empty
    pub sender: String,
    /// Alphanumeric phonebook tag, usually empty
    pub alpha_tag: String,
    /// Service centre timestamp in modem format, e.g. `25/10/18,14:25:44+08`
    pub timestamp: String,
    /// The header line as received, whitespace trimmed
    pub raw_line: String,
}

/// Caller id reported with an incoming call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallerId {
    /// Calling number, empty when withheld
    pub number: String,
    /// Type of address octet (129 national, 145 international)
    pub number_type: Option<u8>,
}

/// Split `"a" , "b","c"` into its quoted fields
///
/// Fields may not contain quotes. Whitespace around commas is allowed.
fn quoted_fields(input: &str) -> Option<Vec<&str>> {
    let mut fields = Vec::new();
    let mut rest = input.trim_start();

    loop {
        rest = rest.strip_prefix('"')?;
        let end = rest.find('"')?;
        fields.push(&rest[..end]);

        rest = rest[end + 1..].trim_start();
        if rest.is_empty() {
            return Some(fields);
        }
        rest = rest.strip_prefix(',')?.trim_start();
    }
}

/// Parse an incoming-SMS header line
///
/// # Examples
///
/// ```rust
/// use voltage_sms::parser::parse_cmt_header;
///
/// let header = parse_cmt_header(r#"+CMT: "+4915140142720","","25/10/18,14:25:44+08""#).unwrap();
/// assert_eq!(header.sender, "+4915140142720");
/// assert_eq!(header.timestamp, "25/10/18,14:25:44+08");
///
/// assert!(parse_cmt_header("+CMT: \"+49151\",\"\"").is_none());
/// ```
pub fn parse_cmt_header(line: &str) -> Option<CmtHeader> {
    let trimmed = line.trim();
    let rest = trimmed.strip_prefix(UnsolicitedTag::Cmt.prefix())?;

    let fields = quoted_fields(rest)?;
    let [sender, alpha_tag, timestamp] = fields.as_slice() else {
        return None;
    };
    if sender.is_empty() {
        return None;
    }

    Some(CmtHeader {
        sender: sender.to_string(),
        alpha_tag: alpha_tag.to_string(),
        timestamp: timestamp.to_string(),
        raw_line: trimmed.to_string(),
    })
}

/// Parse a caller id line: `+CLIP: "<number>",<type>[,...]`
pub fn parse_clip(line: &str) -> Option<CallerId> {
    let rest = line.trim().strip_prefix(UnsolicitedTag::Clip.prefix())?.trim_start();

    let rest = rest.strip_prefix('"')?;
    let end = rest.find('"')?;
    let number = rest[..end].to_string();

    let tail = rest[end + 1..].trim_start();
    let number_type = match tail.strip_prefix(',') {
        Some(fields) => {
            let field = fields.split(',').next().unwrap_or("").trim();
            if field.is_empty() {
                None
            } else {
                Some(field.parse::<u8>().ok()?)
            }
        }
        None if tail.is_empty() => None,
        None => return None,
    };

    Some(CallerId { number, number_type })
}
