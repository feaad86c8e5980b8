//! # Fetcher Abstraction
//!
//! A minimal, async interface for pulling an entry artifact off the network.
//!
//! ## Philosophy
//!
//! - **Byte-Oriented**: The Fetcher knows nothing about containers or wasm.
//!   It turns a URL into an opaque buffer.
//! - **One-Shot**: No caching or retrying lives here. Deduplication of fetches is
//!   the loader's job, retries are the caller's.

use std::fmt;
use std::time::Duration;

/// Errors that occur at the network layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// The host could not be reached or the connection was dropped.
    Unreachable(String),
    /// The server answered with a non-success status.
    Status(u16),
    /// The request did not complete in time.
    Timeout,
    /// Generic I/O error or internal fetcher failure.
    Io(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unreachable(msg) => write!(f, "Unreachable: {}", msg),
            Self::Status(code) => write!(f, "HTTP status {}", code),
            Self::Timeout => write!(f, "Request timed out"),
            Self::Io(msg) => write!(f, "I/O error: {}", msg),
        }
    }
}

impl std::error::Error for Error {}

pub type Result<T> = std::result::Result<T, Error>;

/// A mechanism to retrieve the bytes behind a URL.
///
/// This trait is designed to be object-safe (`Arc<dyn Fetcher>`).
#[async_trait::async_trait]
pub trait Fetcher: Send + Sync + 'static {
    /// Fetches the resource at `url`.
    ///
    /// # invariants
    /// - Must return `Ok(bytes)` with the full body on success.
    /// - Must return `Err` for transport failures and non-success statuses.
    async fn fetch(&self, url: &str) -> Result<Vec<u8>>;
}

/// Fetches entry artifacts over HTTP(S).
#[derive(Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    /// Creates a fetcher with a 30 second timeout.
    pub fn new() -> Result<Self> {
        Self::with_timeout(Duration::from_secs(30))
    }

    pub fn with_timeout(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Io(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self { client })
    }

    /// Wraps an already configured client.
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Self::Timeout
        } else if e.is_connect() {
            Self::Unreachable(e.to_string())
        } else if let Some(status) = e.status() {
            Self::Status(status.as_u16())
        } else {
            Self::Io(e.to_string())
        }
    }
}

#[async_trait::async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>> {
        let response = self.client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(Error::Status(status.as_u16()));
        }
        let body = response.bytes().await?;
        Ok(body.to_vec())
    }
}
