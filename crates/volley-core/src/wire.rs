//! Request/response wire grammar
//!
//! Every request is one text line:
//!
//! ```text
//! <connection>-<8-digit zero-padded sequence id>:<payload>
//! ```
//!
//! The connection name namespaces the sequence ids, so ids only need to be
//! unique per connection. A response is expected to echo the same shape;
//! correlation reads the id between the first `-` and the first `:` and
//! ignores everything else. Newline framing is the session's job, not this
//! module's.

use crate::error::{Result, VolleyError};

/// Zero-padded width of the sequence id field.
pub const SEQ_ID_WIDTH: usize = 8;

/// Separates the connection name from the sequence id.
pub const ID_DELIMITER: char = '-';

/// Separates the id header from the payload.
pub const PAYLOAD_DELIMITER: char = ':';

/// Correlation-relevant head of a response frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ResponseHead {
    /// Sequence id parsed from between the first `-` and the first `:`.
    pub seq: u64,
}

/// Encode one request line (without the trailing newline).
pub fn encode_request(connection: &str, seq: u64, payload: &str) -> String {
    format!(
        "{connection}{ID_DELIMITER}{seq:0width$}{PAYLOAD_DELIMITER}{payload}",
        width = SEQ_ID_WIDTH
    )
}

/// Parse the correlation head out of a decoded response line.
///
/// Fails with [`VolleyError::MalformedResponse`] if either delimiter is
/// missing or the id between them is not a non-negative integer.
pub fn parse_response(line: &str) -> Result<ResponseHead> {
    let dash = line
        .find(ID_DELIMITER)
        .ok_or_else(|| VolleyError::MalformedResponse(line.to_string()))?;
    let colon = line
        .find(PAYLOAD_DELIMITER)
        .ok_or_else(|| VolleyError::MalformedResponse(line.to_string()))?;

    let id = line
        .get(dash + ID_DELIMITER.len_utf8()..colon)
        .ok_or_else(|| VolleyError::MalformedResponse(line.to_string()))?;

    let seq = id
        .parse::<u64>()
        .map_err(|_| VolleyError::MalformedResponse(line.to_string()))?;

    Ok(ResponseHead { seq })
}

/// Decode raw frame bytes as text and parse the correlation head.
///
/// A frame that is not valid UTF-8 is the "unexpected message shape" fault.
pub fn parse_response_bytes(frame: &[u8]) -> Result<ResponseHead> {
    let line = std::str::from_utf8(frame).map_err(|_| VolleyError::UnexpectedPayload)?;
    parse_response(line)
}
