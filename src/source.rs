use crate::records::{AgentRecord, DecodeSummary, RecordEnvelope};
use std::path::PathBuf;
use std::str::FromStr;
use thiserror::Error;
use tracing::info;

#[derive(Error, Debug)]
pub enum SourceError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("record endpoint answered {status}")]
    Status { status: u16 },
    #[error("could not read '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("record table is not valid JSON: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("record table unavailable: {0}")]
    Unavailable(String),
}

/// Where the pre-processed record table lives.
#[derive(Debug, Clone, PartialEq)]
pub enum RecordLocation {
    Url(String),
    File(PathBuf),
}

impl From<&str> for RecordLocation {
    fn from(s: &str) -> Self {
        if s.starts_with("http://") || s.starts_with("https://") {
            RecordLocation::Url(s.to_string())
        } else {
            RecordLocation::File(PathBuf::from(s))
        }
    }
}

impl FromStr for RecordLocation {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(RecordLocation::from(s))
    }
}

impl std::fmt::Display for RecordLocation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RecordLocation::Url(url) => write!(f, "{}", url),
            RecordLocation::File(path) => write!(f, "{}", path.display()),
        }
    }
}

/// Decodes a `{ "data": [...] }` body into placeable records.
pub fn decode_records(body: &[u8]) -> Result<(Vec<AgentRecord>, DecodeSummary), SourceError> {
    let envelope: RecordEnvelope = serde_json::from_slice(body)?;

    if envelope.data.is_none() {
        return Err(SourceError::Unavailable(
            envelope
                .error
                .unwrap_or_else(|| "response has no data field".to_string()),
        ));
    }

    Ok(envelope.into_mappable_records())
}

pub async fn fetch_records(
    location: &RecordLocation,
) -> Result<(Vec<AgentRecord>, DecodeSummary), SourceError> {
    let body = match location {
        RecordLocation::Url(url) => {
            let client = reqwest::Client::new();
            let response = client.get(url).send().await?;

            if !response.status().is_success() {
                return Err(SourceError::Status {
                    status: response.status().as_u16(),
                });
            }

            response.bytes().await?.to_vec()
        }
        RecordLocation::File(path) => {
            tokio::fs::read(path)
                .await
                .map_err(|source| SourceError::Io {
                    path: path.clone(),
                    source,
                })?
        }
    };

    let (records, summary) = decode_records(&body)?;

    info!(
        "Loaded {} valid agent locations from {} ({} unplaceable, {} malformed)",
        summary.mappable, location, summary.unplaceable, summary.malformed
    );

    Ok((records, summary))
}
