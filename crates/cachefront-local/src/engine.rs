//! The cache engine: hit/miss/stale decisions over the metadata store,
//! the object store, and the safe-fetch pipeline.
//!
//! All work for one request runs under the per-fingerprint lease, so
//! writers to the object file and the metadata row are totally ordered
//! and overlapping misses collapse into a single fetch.

use crate::fetch::Fetcher;
use crate::fingerprint::{extension, fingerprint};
use crate::flight::Singleflight;
use crate::now_epoch_s;
use crate::sniff;
use crate::store::ObjectStore;
use cachefront_core::{EgressPolicy, Error, MetadataStore, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use url::Url;

/// Fixed entry lifetime: seven days.
pub const CACHE_TTL_SECS: i64 = 7 * 24 * 60 * 60;

/// A request failure, tagged with the phase it surfaced in. The display
/// strings are the client-visible failure reasons.
#[derive(thiserror::Error, Debug)]
pub enum ServeError {
    #[error("check cache failed")]
    Lookup(#[source] Error),
    #[error("check cache expire failed")]
    Expiry(#[source] Error),
    #[error("refresh cache failed")]
    Refresh(#[source] Error),
    #[error("cache file failed")]
    Fill(#[source] Error),
}

impl ServeError {
    pub fn cause(&self) -> &Error {
        match self {
            ServeError::Lookup(e)
            | ServeError::Expiry(e)
            | ServeError::Refresh(e)
            | ServeError::Fill(e) => e,
        }
    }
}

pub struct CacheEngine {
    meta: Arc<dyn MetadataStore>,
    objects: ObjectStore,
    fetcher: Fetcher,
    policy: Arc<dyn EgressPolicy>,
    flight: Singleflight,
}

impl CacheEngine {
    pub fn new(
        meta: Arc<dyn MetadataStore>,
        objects: ObjectStore,
        policy: Arc<dyn EgressPolicy>,
    ) -> Result<Self> {
        let fetcher = Fetcher::new(policy.clone())?;
        Ok(Self {
            meta,
            objects,
            fetcher,
            policy,
            flight: Singleflight::new(),
        })
    }

    /// Serve `raw_url` from cache, fetching or refreshing as needed.
    /// Returns the path of a complete, admitted object file.
    pub async fn serve(&self, raw_url: &str) -> std::result::Result<PathBuf, ServeError> {
        let fp = fingerprint(raw_url);
        let ext = extension(raw_url);
        let object = self.objects.object_path(&fp, &ext);

        let _lease = self.flight.acquire(&fp).await;

        let cached = self.meta.exists(&fp).await.map_err(ServeError::Lookup)?;
        if !cached {
            self.fill(raw_url, &fp, &object)
                .await
                .map_err(ServeError::Fill)?;
            return Ok(object);
        }

        let expires_at = self
            .meta
            .get_expiry(&fp)
            .await
            .map_err(ServeError::Expiry)?;
        if now_epoch_s() <= expires_at {
            return Ok(object);
        }

        self.refresh(raw_url, &fp, &object).await.map_err(|e| {
            tracing::warn!(url = raw_url, error = %e, "cache refresh failed");
            ServeError::Refresh(e)
        })?;
        Ok(object)
    }

    /// Miss path: validate, download, gate, publish, then record the
    /// entry. An insert failure withdraws the published object so no
    /// orphan file survives.
    async fn fill(&self, raw_url: &str, fp: &str, object: &Path) -> Result<()> {
        self.download_and_publish(raw_url, fp, object).await?;
        let expires_at = now_epoch_s() + CACHE_TTL_SECS;
        if let Err(e) = self.meta.insert(fp, raw_url, expires_at).await {
            let _ = self.objects.remove(object).await;
            return Err(e);
        }
        Ok(())
    }

    /// Refresh path: the stale object is dropped, replaced, and the
    /// expiry advanced. A fetch failure here leaves the metadata row
    /// without an object; the next request retries from scratch.
    async fn refresh(&self, raw_url: &str, fp: &str, object: &Path) -> Result<()> {
        self.objects.remove(object).await?;
        self.download_and_publish(raw_url, fp, object).await?;
        self.meta
            .update_expiry(fp, now_epoch_s() + CACHE_TTL_SECS)
            .await?;
        Ok(())
    }

    /// Pre-flight check, download to staging, admission gate, publish.
    /// The staging file never survives a failure.
    async fn download_and_publish(&self, raw_url: &str, fp: &str, object: &Path) -> Result<()> {
        let url = Url::parse(raw_url).map_err(|e| Error::InvalidUrl(e.to_string()))?;
        self.policy.check(&url).await?;

        let staging = self.objects.staging_path(fp);
        let res = self.fetch_gate_publish(raw_url, &staging, object).await;
        if res.is_err() {
            let _ = self.objects.remove(&staging).await;
        }
        res
    }

    async fn fetch_gate_publish(&self, raw_url: &str, staging: &Path, object: &Path) -> Result<()> {
        let downloaded = self.fetcher.fetch(raw_url, staging).await?;
        let head = self.objects.read_head(staging, sniff::SNIFF_LEN).await?;
        sniff::admit(&head, downloaded.content_type.as_deref())?;
        self.objects.publish(staging, object).await?;
        Ok(())
    }
}
