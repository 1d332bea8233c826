//! Native messaging wire format.
//!
//! Each frame is a 4-byte little-endian length followed by that many bytes of
//! UTF-8 JSON. Requests carry an `id`, an `action` tag and an optional `data`
//! payload; every response echoes the request id:
//!
//! ```json
//! {"id": 7, "action": "TabFocused", "data": {"url": "https://a.com/x", "tab_id": 3}}
//! {"id": 7, "success": true, "data": null, "error": null}
//! ```

use std::io;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Largest frame the host accepts from the browser.
pub const MAX_MESSAGE_SIZE: usize = 1024 * 1024;

/// Payload of the tab event actions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TabActionData {
    pub url: String,
    pub tab_id: u32,
}

/// A browser request, keyed by its `action` tag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", content = "data")]
pub enum Action {
    TabFocused(TabActionData),
    TabUnfocused(TabActionData),
    TabClosed(TabActionData),
    Start { session_name: String },
    Stop,
    GetData,
    GetActive,
    Ping,
    GetSessions,
    DeleteSession { session_name: String },
}

/// A decoded request frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub id: u32,
    pub action: Action,
}

/// A request frame that could not be decoded.
///
/// `id` is recovered from the frame when possible so the error reply can be
/// matched to its request; it is 0 otherwise.
#[derive(Debug)]
pub struct BadRequest {
    pub id: u32,
    pub error: serde_json::Error,
}

impl Request {
    /// Decodes a frame body.
    pub fn parse(body: &[u8]) -> Result<Self, BadRequest> {
        let value: Value = serde_json::from_slice(body).map_err(|error| BadRequest { id: 0, error })?;
        let id = value
            .get("id")
            .and_then(Value::as_u64)
            .and_then(|id| u32::try_from(id).ok());

        let action = serde_json::from_value::<Action>(value).map_err(|error| BadRequest {
            id: id.unwrap_or(0),
            error,
        })?;
        let Some(id) = id else {
            return Err(BadRequest {
                id: 0,
                error: serde::de::Error::missing_field("id"),
            });
        };
        Ok(Self { id, action })
    }
}

/// Reply to one request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    pub id: u32,
    pub success: bool,
    pub data: Option<Value>,
    pub error: Option<String>,
}

impl Response {
    pub fn ok(id: u32, data: Option<Value>) -> Self {
        Self {
            id,
            success: true,
            data,
            error: None,
        }
    }

    pub fn err(id: u32, error: impl ToString) -> Self {
        Self {
            id,
            success: false,
            data: None,
            error: Some(error.to_string()),
        }
    }
}

/// Reads one frame body.
///
/// Returns `Ok(None)` when the stream ends cleanly before a header. A zero or
/// oversized length is reported as [`io::ErrorKind::InvalidData`].
pub async fn read_frame<R>(reader: &mut R) -> io::Result<Option<Vec<u8>>>
where
    R: AsyncRead + Unpin,
{
    let mut header = [0u8; 4];
    match reader.read_exact(&mut header).await {
        Ok(_) => {}
        Err(err) if err.kind() == io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(err) => return Err(err),
    }

    let len = u32::from_le_bytes(header) as usize;
    if len == 0 {
        return Err(io::Error::new(io::ErrorKind::InvalidData, "empty message"));
    }
    if len > MAX_MESSAGE_SIZE {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("message too large: {len} bytes"),
        ));
    }

    let mut body = vec![0u8; len];
    reader.read_exact(&mut body).await?;
    Ok(Some(body))
}

/// Writes `message` as one frame and flushes.
pub async fn write_frame<W, T>(writer: &mut W, message: &T) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
    T: Serialize + ?Sized,
{
    let body = serde_json::to_vec(message)?;
    let len = u32::try_from(body.len())
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "message too large"))?;
    writer.write_all(&len.to_le_bytes()).await?;
    writer.write_all(&body).await?;
    writer.flush().await
}
