//! Download of a remote asset into a staging file.
//!
//! reqwest's automatic redirect following is disabled; hops are walked
//! manually so every target is re-validated against the egress policy
//! before it is contacted. Transport failures and upstream error
//! statuses remove the partial output, so a failed fetch leaves nothing
//! behind.

use cachefront_core::{EgressPolicy, Error, Result};
use futures_util::StreamExt;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use url::Url;

/// Original request plus at most nine followed hops.
const MAX_CHAIN: usize = 10;
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Transport-level outcome of a successful download. The declared
/// content type feeds the sniffing gate; it is never trusted on its own.
#[derive(Debug, Clone)]
pub struct Downloaded {
    pub content_type: Option<String>,
    pub final_url: String,
}

pub struct Fetcher {
    client: reqwest::Client,
    policy: Arc<dyn EgressPolicy>,
}

impl Fetcher {
    pub fn new(policy: Arc<dyn EgressPolicy>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("cachefront/", env!("CARGO_PKG_VERSION")))
            .redirect(reqwest::redirect::Policy::none())
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| Error::Fetch(e.to_string()))?;
        Ok(Self { client, policy })
    }

    /// GET `raw_url` and stream the body into `out`. No client request
    /// headers are forwarded and origin cache directives are ignored. On
    /// any failure the partial file is removed before the error returns.
    pub async fn fetch(&self, raw_url: &str, out: &Path) -> Result<Downloaded> {
        let res = self.fetch_inner(raw_url, out).await;
        if res.is_err() {
            let _ = tokio::fs::remove_file(out).await;
        }
        res
    }

    async fn fetch_inner(&self, raw_url: &str, out: &Path) -> Result<Downloaded> {
        let mut url = Url::parse(raw_url).map_err(|e| Error::InvalidUrl(e.to_string()))?;
        let mut chain = 1usize;
        let resp = loop {
            let resp = self
                .client
                .get(url.clone())
                .send()
                .await
                .map_err(|e| Error::Fetch(e.to_string()))?;
            if !resp.status().is_redirection() {
                break resp;
            }
            if chain >= MAX_CHAIN {
                return Err(Error::RedirectLimit);
            }
            let status = resp.status().as_u16();
            // 307/308 would replay method and body semantics this
            // pipeline does not honor.
            if status == 307 || status == 308 {
                return Err(Error::UnsupportedRedirect(status));
            }
            let location = resp
                .headers()
                .get(reqwest::header::LOCATION)
                .and_then(|v| v.to_str().ok())
                .ok_or_else(|| Error::Fetch(format!("{status} redirect without location")))?;
            let next = url
                .join(location)
                .map_err(|e| Error::InvalidUrl(e.to_string()))?;
            self.policy.check(&next).await?;
            url = next;
            chain += 1;
        };

        let status = resp.status().as_u16();
        if status >= 400 {
            return Err(Error::UpstreamStatus(status));
        }
        let content_type = resp
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_string());
        let final_url = resp.url().to_string();

        let mut file = tokio::fs::File::create(out).await?;
        let mut stream = resp.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| Error::Fetch(e.to_string()))?;
            file.write_all(&chunk).await?;
        }
        file.flush().await?;

        Ok(Downloaded {
            content_type,
            final_url,
        })
    }
}
