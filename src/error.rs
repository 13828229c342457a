use std::path::PathBuf;

use thiserror::Error;

/// A request that produced no usable response body.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request to {url} timed out")]
    Timeout { url: String },

    #[error("could not connect to {url}: {source}")]
    Connect {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{url} answered with HTTP {status}")]
    Status { url: String, status: u16 },

    #[error("request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("request to {url} was cancelled")]
    Cancelled { url: String },
}

impl FetchError {
    pub fn from_reqwest(url: &str, err: reqwest::Error) -> Self {
        let url = url.to_string();
        if err.is_timeout() {
            FetchError::Timeout { url }
        } else if err.is_connect() {
            FetchError::Connect { url, source: err }
        } else if let Some(status) = err.status() {
            FetchError::Status {
                url,
                status: status.as_u16(),
            }
        } else {
            FetchError::Transport { url, source: err }
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, FetchError::Cancelled { .. })
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("unsupported URL scheme '{0}', expected http or https")]
    UnsupportedScheme(String),

    #[error("URL '{0}' has no host")]
    MissingHost(String),

    #[error("concurrency must be at least 1")]
    ZeroConcurrency,

    #[error("could not read payload file {path}: {source}")]
    PayloadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("payload file {0} contains no payloads")]
    EmptyCatalog(PathBuf),
}

#[derive(Debug, Error)]
pub enum ReportError {
    #[error("could not access report file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed report JSON: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Report(#[from] ReportError),

    #[error("failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),
}
