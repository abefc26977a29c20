//! Frame codec
//!
//! Request grammar:
//!
//! ```text
//! request  = "#" opcode "[" [ arg { "," arg } ] "]" ":" suffix "\r"
//! opcode   = ALPHA | DIGIT | "?"
//! suffix   = "xxxx"                      ; placeholder mode
//!          | HEX HEX HEX HEX             ; crc8 mode: request id, then CRC-8
//! ```
//!
//! Reply grammar:
//!
//! ```text
//! reply    = "#" [ opcode ] "[" status { "," value } "]" [ ":" HEX HEX HEX HEX ]
//! log      = "#!" text
//! value    = number | string
//! ```
//!
//! Lines that do not start with `#` are noise from partial reads and are
//! ignored by the session.

use crc::{Crc, CRC_8_SMBUS};
use romiserial_core::ProtocolError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// First character of every frame
pub const START_MARKER: char = '#';
/// Second character of a firmware log line
pub const LOG_MARKER: char = '!';
/// Request terminator
pub const TERMINATOR: char = '\r';
/// Fixed suffix written in placeholder mode
pub const PLACEHOLDER_CHECKSUM: &str = "xxxx";
/// Longest command body (opcode plus argument list) the firmware accepts
pub const MAX_BODY_LENGTH: usize = 58;

const CRC8: Crc<u8> = Crc::<u8>::new(&CRC_8_SMBUS);

/// How the fixed-width suffix of a request is filled in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChecksumMode {
    /// Fixed `xxxx` placeholder, as existing firmware expects
    #[default]
    Placeholder,
    /// Request id and CRC-8 of the frame, both as two hex digits
    Crc8,
}

impl fmt::Display for ChecksumMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Placeholder => write!(f, "placeholder"),
            Self::Crc8 => write!(f, "crc8"),
        }
    }
}

/// A protocol command: one-character opcode plus integer arguments
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    opcode: char,
    args: Vec<i64>,
}

impl Command {
    /// Create a command, validating the opcode and encoded length
    pub fn new(opcode: char, args: Vec<i64>) -> Result<Self, ProtocolError> {
        let command = Self { opcode, args };
        command.validate()?;
        Ok(command)
    }

    /// Create a command without arguments
    pub fn query(opcode: char) -> Result<Self, ProtocolError> {
        Self::new(opcode, Vec::new())
    }

    /// The command mnemonic
    pub fn opcode(&self) -> char {
        self.opcode
    }

    /// The command arguments, in order
    pub fn args(&self) -> &[i64] {
        &self.args
    }

    /// The command body: opcode followed by the bracketed argument list
    pub fn body(&self) -> String {
        let args: Vec<String> = self.args.iter().map(|a| a.to_string()).collect();
        format!("{}[{}]", self.opcode, args.join(","))
    }

    fn validate(&self) -> Result<(), ProtocolError> {
        if !is_valid_opcode(self.opcode) {
            return Err(ProtocolError::InvalidCommand {
                reason: format!("invalid opcode '{}'", self.opcode.escape_default()),
            });
        }
        let length = self.body().len();
        if length > MAX_BODY_LENGTH {
            return Err(ProtocolError::InvalidCommand {
                reason: format!(
                    "command is {} characters long, the maximum is {}",
                    length, MAX_BODY_LENGTH
                ),
            });
        }
        Ok(())
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.body())
    }
}

/// Check if a character may be used as an opcode
pub fn is_valid_opcode(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '?'
}

/// One element of a reply array after the status code
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ReplyValue {
    /// Numeric value
    Number(f64),
    /// Text value, typically an error message or a state letter
    Text(String),
}

impl ReplyValue {
    /// The value as a number, if it is one
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            Self::Text(_) => None,
        }
    }

    /// The value as text, if it is text
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Number(_) => None,
            Self::Text(s) => Some(s),
        }
    }
}

/// A decoded reply frame
#[derive(Debug, Clone, PartialEq)]
pub struct Reply {
    status: i32,
    values: Vec<ReplyValue>,
    id: Option<u8>,
    crc: Option<u8>,
}

impl Reply {
    /// Create a reply from a status and values
    pub fn new(status: i32, values: Vec<ReplyValue>) -> Self {
        Self {
            status,
            values,
            id: None,
            crc: None,
        }
    }

    /// Signed status code: 0 success, negative transient, positive fatal
    pub fn status(&self) -> i32 {
        self.status
    }

    /// The values following the status code
    pub fn values(&self) -> &[ReplyValue] {
        &self.values
    }

    /// Number of values following the status code
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether the reply carries nothing but the status code
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Request id echoed in the reply metadata, if any
    pub fn id(&self) -> Option<u8> {
        self.id
    }

    /// CRC carried in the reply metadata, if any
    pub fn crc(&self) -> Option<u8> {
        self.crc
    }

    /// Value at `index` (0 is the first value after the status)
    pub fn get(&self, index: usize) -> Option<&ReplyValue> {
        self.values.get(index)
    }

    /// Numeric value at `index`
    pub fn number(&self, index: usize) -> Result<f64, ProtocolError> {
        self.get(index)
            .and_then(ReplyValue::as_f64)
            .ok_or_else(|| self.missing(index, "a number"))
    }

    /// Integral value at `index`
    pub fn integer(&self, index: usize) -> Result<i64, ProtocolError> {
        let value = self.number(index)?;
        // i64::MAX as f64 rounds up to 2^63, which is already out of range
        if !value.is_finite()
            || value.fract() != 0.0
            || value < i64::MIN as f64
            || value >= i64::MAX as f64
        {
            return Err(self.missing(index, "an integer"));
        }
        Ok(value as i64)
    }

    /// Text value at `index`
    pub fn text(&self, index: usize) -> Result<&str, ProtocolError> {
        self.get(index)
            .and_then(ReplyValue::as_str)
            .ok_or_else(|| self.missing(index, "a string"))
    }

    /// First text value, used by firmware for error messages
    pub fn message(&self) -> Option<&str> {
        self.values.iter().find_map(ReplyValue::as_str)
    }

    fn missing(&self, index: usize, expected: &str) -> ProtocolError {
        ProtocolError::MalformedReply {
            line: self.to_string(),
            reason: format!("expected {} at position {}", expected, index + 1),
        }
    }
}

impl fmt::Display for Reply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}", self.status)?;
        for value in &self.values {
            match value {
                ReplyValue::Number(n) => write!(f, ",{}", n)?,
                ReplyValue::Text(s) => write!(f, ",{:?}", s)?,
            }
        }
        write!(f, "]")
    }
}

/// What kind of line was read from the stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineKind<'a> {
    /// Not a frame; discarded
    Noise,
    /// Firmware log output, with the text after `#!`
    Log(&'a str),
    /// A candidate reply frame
    Frame,
}

/// Sort an incoming line into noise, log output, or a reply frame
pub fn classify_line(line: &str) -> LineKind<'_> {
    match line.strip_prefix(START_MARKER) {
        None => LineKind::Noise,
        Some(rest) => match rest.strip_prefix(LOG_MARKER) {
            Some(text) => LineKind::Log(text),
            None => LineKind::Frame,
        },
    }
}

/// Why a reply frame failed to decode
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// The frame opened its value list but never closed it
    Truncated,
    /// The frame is complete but not a valid reply
    Malformed(String),
}

impl DecodeError {
    /// Convert into the public protocol error for `line`
    pub fn into_protocol_error(self, line: &str) -> ProtocolError {
        let reason = match self {
            Self::Truncated => "truncated frame".to_string(),
            Self::Malformed(reason) => reason,
        };
        ProtocolError::MalformedReply {
            line: line.to_string(),
            reason,
        }
    }
}

/// Encode a command with the placeholder suffix
pub fn encode(command: &Command) -> String {
    format!(
        "{}{}:{}{}",
        START_MARKER,
        command.body(),
        PLACEHOLDER_CHECKSUM,
        TERMINATOR
    )
}

/// Decode a reply line into its status and values
///
/// The value list is the text between the first `[` and the first `]`
/// after it, parsed as a JSON array of numbers and strings.
pub fn decode(line: &str) -> Result<Reply, DecodeError> {
    let line = line.trim_end_matches(['\r', '\n']);
    if !line.starts_with(START_MARKER) {
        return Err(DecodeError::Malformed("missing start marker".to_string()));
    }
    let open = line
        .find('[')
        .ok_or_else(|| DecodeError::Malformed("missing '['".to_string()))?;
    let close = line[open..]
        .find(']')
        .map(|offset| open + offset)
        .ok_or(DecodeError::Truncated)?;

    let elements: Vec<serde_json::Value> = serde_json::from_str(&line[open..=close])
        .map_err(|e| DecodeError::Malformed(format!("invalid value list: {}", e)))?;

    let mut elements = elements.into_iter();
    let status = match elements.next() {
        Some(serde_json::Value::Number(n)) => parse_status(&n)?,
        Some(_) => return Err(DecodeError::Malformed("status is not a number".to_string())),
        None => return Err(DecodeError::Malformed("empty value list".to_string())),
    };

    let values = elements
        .map(|element| match element {
            serde_json::Value::Number(n) => n
                .as_f64()
                .map(ReplyValue::Number)
                .ok_or_else(|| DecodeError::Malformed(format!("number out of range: {}", n))),
            serde_json::Value::String(s) => Ok(ReplyValue::Text(s)),
            other => Err(DecodeError::Malformed(format!(
                "unsupported value: {}",
                other
            ))),
        })
        .collect::<Result<Vec<_>, _>>()?;

    let (id, crc) = parse_metadata(&line[close + 1..])?;

    Ok(Reply {
        status,
        values,
        id,
        crc,
    })
}

/// Parse a request frame back into its command
pub fn parse_request(frame: &str) -> Result<Command, ProtocolError> {
    let malformed = |reason: &str| ProtocolError::MalformedReply {
        line: frame.to_string(),
        reason: reason.to_string(),
    };
    let frame = frame.trim_end_matches(TERMINATOR);
    let rest = frame
        .strip_prefix(START_MARKER)
        .ok_or_else(|| malformed("missing start marker"))?;
    let (body, _suffix) = rest
        .rsplit_once(':')
        .ok_or_else(|| malformed("missing suffix"))?;
    let mut chars = body.chars();
    let opcode = chars.next().ok_or_else(|| malformed("missing opcode"))?;
    let list = chars.as_str();
    let inner = list
        .strip_prefix('[')
        .and_then(|l| l.strip_suffix(']'))
        .ok_or_else(|| malformed("missing argument brackets"))?;
    let args = if inner.is_empty() {
        Vec::new()
    } else {
        inner
            .split(',')
            .map(|a| a.trim().parse::<i64>())
            .collect::<Result<Vec<_>, _>>()
            .map_err(|_| malformed("invalid argument"))?
    };
    Command::new(opcode, args)
}

fn parse_status(n: &serde_json::Number) -> Result<i32, DecodeError> {
    let invalid = || DecodeError::Malformed(format!("invalid status code: {}", n));
    if let Some(i) = n.as_i64() {
        return i32::try_from(i).map_err(|_| invalid());
    }
    match n.as_f64() {
        Some(f) if f.fract() == 0.0 && f >= i32::MIN as f64 && f <= i32::MAX as f64 => {
            Ok(f as i32)
        }
        _ => Err(invalid()),
    }
}

fn parse_metadata(tail: &str) -> Result<(Option<u8>, Option<u8>), DecodeError> {
    let tail = tail.trim();
    let Some(meta) = tail.strip_prefix(':') else {
        return Ok((None, None));
    };
    if meta.len() != 4 || !meta.chars().all(|c| c.is_ascii_hexdigit()) {
        // Placeholder or unknown suffix: nothing to check
        return Ok((None, None));
    }
    let id = u8::from_str_radix(&meta[0..2], 16)
        .map_err(|e| DecodeError::Malformed(format!("invalid id: {}", e)))?;
    let crc = u8::from_str_radix(&meta[2..4], 16)
        .map_err(|e| DecodeError::Malformed(format!("invalid crc: {}", e)))?;
    Ok((Some(id), Some(crc)))
}

/// CRC-8 of a frame prefix
pub fn crc8(data: &[u8]) -> u8 {
    CRC8.checksum(data)
}

/// Stateful encoder that numbers requests in CRC-8 mode
#[derive(Debug, Clone)]
pub struct FrameCodec {
    mode: ChecksumMode,
    id: u8,
}

impl FrameCodec {
    /// Create a codec for the given checksum mode
    pub fn new(mode: ChecksumMode) -> Self {
        // The first request goes out with id 0
        Self { mode, id: 255 }
    }

    /// The checksum mode in use
    pub fn mode(&self) -> ChecksumMode {
        self.mode
    }

    /// Id of the most recently encoded request
    pub fn last_id(&self) -> u8 {
        self.id
    }

    /// Encode a command into a request frame
    pub fn encode(&mut self, command: &Command) -> String {
        match self.mode {
            ChecksumMode::Placeholder => encode(command),
            ChecksumMode::Crc8 => {
                self.id = self.id.wrapping_add(1);
                let mut frame = format!("{}{}:{:02x}", START_MARKER, command.body(), self.id);
                let code = crc8(frame.as_bytes());
                frame.push_str(&format!("{:02x}{}", code, TERMINATOR));
                frame
            }
        }
    }

    /// Decode a reply line
    pub fn decode(&self, line: &str) -> Result<Reply, DecodeError> {
        decode(line)
    }

    /// Check the CRC carried by a reply against the line it came from
    ///
    /// Replies without metadata, and every reply in placeholder mode,
    /// pass the check.
    pub fn verify(&self, line: &str, reply: &Reply) -> bool {
        if self.mode != ChecksumMode::Crc8 {
            return true;
        }
        let Some(expected) = reply.crc() else {
            return true;
        };
        let line = line.trim_end_matches(['\r', '\n']).trim_end();
        match line.len().checked_sub(2) {
            Some(end) => crc8(line[..end].as_bytes()) == expected,
            None => false,
        }
    }

    /// Whether a reply answers the most recent request
    ///
    /// Error replies are accepted regardless of id because the firmware may
    /// reject a request before it has parsed the id.
    pub fn matches_request(&self, reply: &Reply) -> bool {
        match (self.mode, reply.id()) {
            (ChecksumMode::Crc8, Some(id)) => id == self.id || reply.status() != 0,
            _ => true,
        }
    }
}

impl Default for FrameCodec {
    fn default() -> Self {
        Self::new(ChecksumMode::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_placeholder() {
        let command = Command::new('E', vec![1]).unwrap();
        assert_eq!(encode(&command), "#E[1]:xxxx\r");

        let command = Command::new('V', vec![-300, 150]).unwrap();
        assert_eq!(encode(&command), "#V[-300,150]:xxxx\r");

        let command = Command::query('e').unwrap();
        assert_eq!(encode(&command), "#e[]:xxxx\r");
    }

    #[test]
    fn test_invalid_commands() {
        assert!(matches!(
            Command::query('#'),
            Err(ProtocolError::InvalidCommand { .. })
        ));
        assert!(Command::query('?').is_ok());
        let too_long = vec![1_000_000_000i64; 10];
        assert!(matches!(
            Command::new('C', too_long),
            Err(ProtocolError::InvalidCommand { .. })
        ));
    }

    #[test]
    fn test_decode_success() {
        let reply = decode("#[0,120,135]").unwrap();
        assert_eq!(reply.status(), 0);
        assert_eq!(reply.integer(0).unwrap(), 120);
        assert_eq!(reply.integer(1).unwrap(), 135);
        assert_eq!(reply.len(), 2);
        assert_eq!(reply.id(), None);
    }

    #[test]
    fn test_decode_with_opcode_and_message() {
        let reply = decode("#V[3,\"bad argument\"]\r\n").unwrap();
        assert_eq!(reply.status(), 3);
        assert_eq!(reply.message(), Some("bad argument"));
        assert!(reply.number(0).is_err());
    }

    #[test]
    fn test_decode_errors() {
        assert_eq!(decode("#[0,1"), Err(DecodeError::Truncated));
        assert!(matches!(decode("#ok"), Err(DecodeError::Malformed(_))));
        assert!(matches!(decode("#[]"), Err(DecodeError::Malformed(_))));
        assert!(matches!(decode("#[\"x\"]"), Err(DecodeError::Malformed(_))));
        assert!(matches!(decode("#[0,{}]"), Err(DecodeError::Malformed(_))));
        assert!(matches!(decode("#[0,true]"), Err(DecodeError::Malformed(_))));
        assert!(matches!(decode("#[0.5]"), Err(DecodeError::Malformed(_))));
        assert!(matches!(decode("#[0,,1]"), Err(DecodeError::Malformed(_))));
    }

    #[test]
    fn test_decode_float_status() {
        let reply = decode("#[-1.0]").unwrap();
        assert_eq!(reply.status(), -1);
    }

    #[test]
    fn test_integer_out_of_range() {
        let reply = decode("#[0,1e20,-1e20,9007199254740992]").unwrap();
        assert!(reply.integer(0).is_err());
        assert!(reply.integer(1).is_err());
        assert_eq!(reply.integer(2).unwrap(), 9_007_199_254_740_992);
        // Still readable as a float
        assert_eq!(reply.number(0).unwrap(), 1e20);
    }

    #[test]
    fn test_classify_line() {
        assert_eq!(classify_line("#!motors ready"), LineKind::Log("motors ready"));
        assert_eq!(classify_line("#[0]"), LineKind::Frame);
        assert_eq!(classify_line("garbage"), LineKind::Noise);
        assert_eq!(classify_line(""), LineKind::Noise);
    }

    #[test]
    fn test_crc8_codec_numbers_requests() {
        let mut codec = FrameCodec::new(ChecksumMode::Crc8);
        let command = Command::new('E', vec![1]).unwrap();

        let first = codec.encode(&command);
        assert!(first.starts_with("#E[1]:00"));
        assert!(first.ends_with('\r'));
        assert_eq!(first.len(), "#E[1]:0000\r".len());
        let crc = crc8(b"#E[1]:00");
        assert_eq!(&first[8..10], format!("{:02x}", crc));

        let second = codec.encode(&command);
        assert!(second.starts_with("#E[1]:01"));
        assert_eq!(codec.last_id(), 1);
    }

    #[test]
    fn test_crc8_verify_and_match() {
        let mut codec = FrameCodec::new(ChecksumMode::Crc8);
        codec.encode(&Command::query('e').unwrap());

        let prefix = "#e[0,1,2]:00";
        let line = format!("{}{:02x}", prefix, crc8(prefix.as_bytes()));
        let reply = decode(&line).unwrap();
        assert_eq!(reply.id(), Some(0));
        assert!(codec.verify(&line, &reply));
        assert!(codec.matches_request(&reply));

        let corrupted = format!("{}{:02x}", prefix, crc8(prefix.as_bytes()).wrapping_add(1));
        let reply = decode(&corrupted).unwrap();
        assert!(!codec.verify(&corrupted, &reply));

        let stale = decode("#e[0]:0700").unwrap();
        assert!(!codec.matches_request(&stale));
        let error = decode("#e[2]:0700").unwrap();
        assert!(codec.matches_request(&error));
    }

    #[test]
    fn test_parse_request() {
        let command = parse_request("#M[1000,10,-20,0]:xxxx\r").unwrap();
        assert_eq!(command.opcode(), 'M');
        assert_eq!(command.args(), &[1000, 10, -20, 0]);

        let command = parse_request("#H[]:xxxx\r").unwrap();
        assert!(command.args().is_empty());
    }
}
