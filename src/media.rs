//! Outbound content loading
//!
//! Turns whatever a handler wants to send (raw bytes, a `data:` URL, a local
//! path or an http(s) URL) into bytes ready for the transport.

use std::path::Path;

use base64::Engine as _;

use crate::transport::{MediaKind, OutgoingMedia};
use crate::{Error, Result};

/// Media larger than this is always sent as a document
pub const MAX_INLINE_MEDIA_BYTES: usize = 64 * 1024 * 1024;

/// MIME type used for outgoing audio
const VOICE_NOTE_MIME: &str = "audio/ogg; codecs=opus";

/// Content to load
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AnyContent {
    Bytes(Vec<u8>),
    /// Data URL, local path or http(s) URL
    Text(String),
}

impl From<Vec<u8>> for AnyContent {
    fn from(bytes: Vec<u8>) -> Self {
        Self::Bytes(bytes)
    }
}

impl From<&str> for AnyContent {
    fn from(text: &str) -> Self {
        Self::Text(text.to_string())
    }
}

impl From<String> for AnyContent {
    fn from(text: String) -> Self {
        Self::Text(text)
    }
}

/// Load `content` into memory
///
/// An unreachable URL or a string that is neither a data URL, an existing
/// file nor an http(s) URL yields empty bytes.
///
/// # Errors
///
/// Returns error if a data URL is malformed or an existing file cannot be read
pub async fn download_file(content: AnyContent) -> Result<Vec<u8>> {
    let text = match content {
        AnyContent::Bytes(bytes) => return Ok(bytes),
        AnyContent::Text(text) => text,
    };

    if text.starts_with("data:") {
        return decode_data_url(&text);
    }

    if tokio::fs::try_exists(&text).await.unwrap_or(false) {
        return Ok(tokio::fs::read(Path::new(&text)).await?);
    }

    if text.starts_with("http://") || text.starts_with("https://") {
        return match fetch(&text).await {
            Ok(bytes) => Ok(bytes),
            Err(e) => {
                tracing::warn!(url = %text, error = %e, "download failed, sending empty content");
                Ok(Vec::new())
            }
        };
    }

    tracing::debug!("content is not a url or an existing file");
    Ok(Vec::new())
}

async fn fetch(url: &str) -> Result<Vec<u8>> {
    let response = reqwest::get(url).await?.error_for_status()?;
    Ok(response.bytes().await?.to_vec())
}

/// Decode a `data:[<mediatype>][;base64],<payload>` URL
///
/// # Errors
///
/// Returns error if the URL has no payload separator or invalid base64
pub fn decode_data_url(url: &str) -> Result<Vec<u8>> {
    let rest = url
        .strip_prefix("data:")
        .ok_or_else(|| Error::Media("not a data url".to_string()))?;
    let (meta, payload) = rest
        .split_once(',')
        .ok_or_else(|| Error::Media("data url has no payload".to_string()))?;

    if meta.ends_with(";base64") {
        base64::engine::general_purpose::STANDARD
            .decode(payload.trim())
            .map_err(|e| Error::Media(format!("invalid base64 in data url: {e}")))
    } else {
        Ok(payload.as_bytes().to_vec())
    }
}

/// Load `content` and describe it as an outgoing attachment
///
/// `mime_type` decides the media class. Oversized media falls back to a
/// document and audio is sent as an opus voice note.
///
/// # Errors
///
/// Returns error if the content cannot be loaded
pub async fn outgoing_media(
    content: AnyContent,
    mime_type: &str,
    file_name: Option<String>,
) -> Result<OutgoingMedia> {
    let data = download_file(content).await?;

    let mut kind = MediaKind::from_mime(mime_type);
    if data.len() > MAX_INLINE_MEDIA_BYTES {
        kind = MediaKind::Document;
    }

    let mime_type = if kind == MediaKind::Audio {
        VOICE_NOTE_MIME.to_string()
    } else {
        mime_type.to_string()
    };

    Ok(OutgoingMedia {
        kind,
        data,
        mime_type,
        file_name,
    })
}
