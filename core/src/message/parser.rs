// Inbound parsing: status lines, headers, daemon responses
//
// Responses arrive cleartext. Parsing stops at the blank line that
// terminates the header block, so trailing binary payloads never reach
// the UTF-8 decode.

use thiserror::Error;

use super::types::{headers, Header};

/// Malformed daemon traffic. Logged by callers; never crashes the client.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("empty message")]
    Empty,

    #[error("malformed status line: {0}")]
    MalformedStatusLine(String),

    #[error("message header block is not valid UTF-8")]
    Encoding,

    #[error("unknown response type: {0}")]
    UnknownResponseType(String),
}

/// Status-line fields plus the header list of one message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedMessage {
    /// Message type token (`REGISTER`, `NOTIFY`, `-OK`, ...).
    pub message_type: String,
    /// Encryption token (`NONE` or an algorithm id).
    pub encryption: String,
    /// IV in hex, present when the encryption token carries one.
    pub iv_hex: Option<String>,
    pub key_hash_algorithm: Option<String>,
    pub key_hex: Option<String>,
    pub salt_hex: Option<String>,
    pub headers: Vec<Header>,
}

impl ParsedMessage {
    /// Value of the first header with the given name.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|h| h.name.eq_ignore_ascii_case(name))
            .map(|h| h.value.as_str())
    }
}

/// Parse the status line and header block of a message.
pub fn parse_message(bytes: &[u8]) -> Result<ParsedMessage, ProtocolError> {
    // everything after the first blank line is binary payload
    let header_region = match bytes.windows(4).position(|w| w == b"\r\n\r\n") {
        Some(pos) => &bytes[..pos],
        None => bytes,
    };
    let text = std::str::from_utf8(header_region).map_err(|_| ProtocolError::Encoding)?;

    let mut lines = text.split("\r\n");
    let status = lines.next().filter(|l| !l.is_empty()).ok_or(ProtocolError::Empty)?;

    let mut fields = status.split(' ').filter(|f| !f.is_empty());
    let protocol = fields
        .next()
        .ok_or_else(|| ProtocolError::MalformedStatusLine(status.to_string()))?;
    if !protocol.starts_with("GNTP/") {
        return Err(ProtocolError::MalformedStatusLine(status.to_string()));
    }
    let message_type = fields
        .next()
        .ok_or_else(|| ProtocolError::MalformedStatusLine(status.to_string()))?
        .to_string();
    let encryption_field = fields
        .next()
        .ok_or_else(|| ProtocolError::MalformedStatusLine(status.to_string()))?;

    let (encryption, iv_hex) = match encryption_field.split_once(':') {
        Some((token, iv)) => (token.to_string(), Some(iv.to_string())),
        None => (encryption_field.to_string(), None),
    };

    let (key_hash_algorithm, key_hex, salt_hex) = match fields.next() {
        Some(key_field) => {
            let (algorithm, material) = key_field
                .split_once(':')
                .ok_or_else(|| ProtocolError::MalformedStatusLine(status.to_string()))?;
            let (key, salt) = match material.split_once('.') {
                Some((key, salt)) => (key.to_string(), Some(salt.to_string())),
                None => (material.to_string(), None),
            };
            (Some(algorithm.to_string()), Some(key), salt)
        }
        None => (None, None, None),
    };

    let mut parsed_headers = Vec::new();
    for line in lines {
        if line.is_empty() {
            break;
        }
        // tolerate junk lines rather than dropping the whole message
        if let Some((name, value)) = line.split_once(':') {
            parsed_headers.push(Header::new(name.trim(), value.trim_start()));
        }
    }

    Ok(ParsedMessage {
        message_type,
        encryption,
        iv_hex,
        key_hash_algorithm,
        key_hex,
        salt_hex,
        headers: parsed_headers,
    })
}

/// Daemon response classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseKind {
    Ok,
    Error,
    Callback,
}

/// Outcome reported by a click/close callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallbackResult {
    Clicked,
    Closed,
    TimedOut,
}

impl CallbackResult {
    fn from_token(token: &str) -> Option<Self> {
        match token.to_ascii_uppercase().as_str() {
            "CLICKED" | "CLICK" => Some(CallbackResult::Clicked),
            "CLOSED" | "CLOSE" => Some(CallbackResult::Closed),
            "TIMEDOUT" | "TIMEOUT" => Some(CallbackResult::TimedOut),
            _ => None,
        }
    }
}

/// One parsed inbound daemon event, correlated by the internal id the
/// client stamped on the originating request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DaemonResponse {
    pub kind: ResponseKind,
    /// `Response-Action` header: which request this answers.
    pub action: Option<String>,
    pub internal_id: Option<u64>,
    pub callback_result: Option<CallbackResult>,
    pub error_code: Option<u16>,
    pub error_description: Option<String>,
    pub headers: Vec<Header>,
}

/// Parse a raw inbound message as a daemon response.
pub fn parse_response(bytes: &[u8]) -> Result<DaemonResponse, ProtocolError> {
    let message = parse_message(bytes)?;

    let kind = match message.message_type.trim_start_matches('-') {
        "OK" => ResponseKind::Ok,
        "ERROR" => ResponseKind::Error,
        "CALLBACK" => ResponseKind::Callback,
        _ => return Err(ProtocolError::UnknownResponseType(message.message_type)),
    };

    let action = message.header(headers::RESPONSE_ACTION).map(str::to_string);
    let internal_id = message
        .header(headers::NOTIFICATION_INTERNAL_ID)
        .and_then(|v| v.parse().ok());
    let callback_result = message
        .header(headers::NOTIFICATION_CALLBACK_RESULT)
        .and_then(CallbackResult::from_token);
    let error_code = message
        .header(headers::ERROR_CODE)
        .and_then(|v| v.parse().ok());
    let error_description = message
        .header(headers::ERROR_DESCRIPTION)
        .map(str::to_string);

    Ok(DaemonResponse {
        kind,
        action,
        internal_id,
        callback_result,
        error_code,
        error_description,
        headers: message.headers,
    })
}
