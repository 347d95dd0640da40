use async_trait::async_trait;
use url::Url;

pub mod config;

pub use config::{Config, DbConfig};

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("invalid url: {0}")]
    InvalidUrl(String),
    #[error("config error: {0}")]
    Config(String),
    #[error("database unavailable: {0}")]
    Db(String),
    #[error("ssrf detected")]
    SsrfDetected,
    #[error("unsupported redirect status {0}")]
    UnsupportedRedirect(u16),
    #[error("redirect limit exceeded")]
    RedirectLimit,
    #[error("upstream status {0}")]
    UpstreamStatus(u16),
    #[error("disallowed content type: {0}")]
    DisallowedContentType(String),
    #[error("fetch failed: {0}")]
    Fetch(String),
    #[error("entry not found")]
    NotFound,
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Metadata record for one cached object, keyed by the fingerprint of
/// the raw URL. The fingerprint and URL are immutable for the lifetime
/// of the entry; only `expires_at` moves, and only forward.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    /// Lowercase hex SHA-256 of the raw URL.
    pub fingerprint: String,
    /// The URL as received, with any leading path separator stripped.
    pub raw_url: String,
    /// POSIX seconds after which the entry is stale.
    pub expires_at: i64,
}

/// Durable fingerprint → {raw URL, expiry} mapping. Each call is an
/// independent atomic unit; callers provide their own cross-call
/// ordering.
#[async_trait]
pub trait MetadataStore: Send + Sync {
    async fn exists(&self, fingerprint: &str) -> Result<bool>;
    /// `Error::NotFound` when no row exists for the fingerprint.
    async fn get_expiry(&self, fingerprint: &str) -> Result<i64>;
    /// Creates the row; fails on a duplicate fingerprint.
    async fn insert(&self, fingerprint: &str, raw_url: &str, expires_at: i64) -> Result<()>;
    async fn update_expiry(&self, fingerprint: &str, expires_at: i64) -> Result<()>;
}

/// Decides whether an outbound target may be contacted. Consulted before
/// the first request of a fetch and again for every redirect hop.
#[async_trait]
pub trait EgressPolicy: Send + Sync {
    async fn check(&self, url: &Url) -> Result<()>;
}
