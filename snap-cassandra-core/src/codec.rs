//! Decoding of metric batches received from the host

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing::trace;

use crate::error::{PublishError, PublishResult};
use crate::metric::Metric;

/// Content type name for JSON encoded batches
pub const JSON_CONTENT_TYPE: &str = "snap.json";

/// Encodings a batch can arrive in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ContentType {
    /// JSON array of metric records
    Json,
}

impl ContentType {
    /// Every content type the publisher accepts
    pub const ACCEPTED: [ContentType; 1] = [ContentType::Json];

    pub fn as_str(self) -> &'static str {
        match self {
            ContentType::Json => JSON_CONTENT_TYPE,
        }
    }

    /// Decode a payload into metric records
    pub fn decode(self, payload: &[u8]) -> PublishResult<Vec<Metric>> {
        match self {
            ContentType::Json => {
                let metrics: Vec<Metric> = serde_json::from_slice(payload)
                    .map_err(|e| PublishError::decode(format!("invalid {} payload: {}", self, e)))?;
                trace!("Decoded {} metrics from {} bytes", metrics.len(), payload.len());
                Ok(metrics)
            }
        }
    }
}

impl fmt::Display for ContentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ContentType {
    type Err = PublishError;

    fn from_str(s: &str) -> PublishResult<Self> {
        ContentType::ACCEPTED
            .into_iter()
            .find(|ct| ct.as_str() == s)
            .ok_or_else(|| PublishError::UnknownContentType(s.to_string()))
    }
}

/// Resolve `content_type` and decode `payload` with it
pub fn decode_batch(content_type: &str, payload: &[u8]) -> PublishResult<Vec<Metric>> {
    content_type.parse::<ContentType>()?.decode(payload)
}
