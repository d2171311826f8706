// Station information from ICY response headers

use airwave_core::{AudioError, Codec, Result};
use airwave_transport_http::Headers;

/// Descriptive station information, fixed once the stream is open
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RadioInfo {
    pub name: Option<String>,
    pub genre: Option<String>,
    pub description: Option<String>,
    pub url: Option<String>,
    /// Advertised bitrate in kb/s, 0 when absent
    pub bitrate: u32,
    pub is_public: bool,
    pub is_private: bool,
    /// Audio bytes between two metadata blocks, 0 when metadata is off
    pub metaint: usize,
    pub content_type: String,
}

impl RadioInfo {
    /// Build station information from the stream's response headers
    ///
    /// Fails with `UnsupportedFormat` when the content type is missing or is
    /// neither MPEG audio nor AAC.
    pub fn from_headers(headers: &Headers) -> Result<Self> {
        let content_type = headers
            .get("content-type")
            .ok_or_else(|| AudioError::UnsupportedFormat("Missing content type".to_string()))?;

        let info = Self {
            name: text(headers, "icy-name"),
            genre: text(headers, "icy-genre"),
            description: text(headers, "icy-description"),
            url: text(headers, "icy-url"),
            bitrate: headers.get_int("icy-br").unwrap_or(0),
            is_public: headers.get_int::<u32>("icy-pub").unwrap_or(0) != 0,
            is_private: headers.get_int::<u32>("icy-private").unwrap_or(0) != 0,
            metaint: headers.get_int("icy-metaint").unwrap_or(0),
            content_type: content_type.to_string(),
        };

        if info.codec().is_none() {
            return Err(AudioError::UnsupportedFormat(format!(
                "Unsupported content type: {}",
                content_type
            )));
        }

        Ok(info)
    }

    /// Codec implied by the content type
    pub fn codec(&self) -> Option<Codec> {
        Codec::from_content_type(&self.content_type)
    }
}

fn text(headers: &Headers, name: &str) -> Option<String> {
    headers
        .get(name)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}
