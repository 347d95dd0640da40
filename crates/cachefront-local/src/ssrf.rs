//! Outbound-target validation.
//!
//! Refuses URLs whose effective destination is a loopback or
//! private-range address. Literal IP hosts are judged directly; domain
//! hosts are resolved several times so round-robin answers that
//! alternate between public and private addresses are still caught. The
//! same check runs before the first request and again for every redirect
//! hop, which also covers rebinding through a fresh name mid-chain.

use async_trait::async_trait;
use cachefront_core::{EgressPolicy, Error, Result};
use std::net::IpAddr;
use std::sync::Arc;
use url::{Host, Url};

/// How many times a domain host is resolved before it is trusted.
const DNS_ATTEMPTS: usize = 3;

/// True for addresses a proxy must never be coerced into reaching:
/// IPv4 loopback and RFC 1918 ranges, IPv6 loopback, and IPv6 unique
/// local addresses. IPv4-mapped IPv6 addresses are unwrapped and judged
/// as IPv4.
pub fn is_local_ip(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => v4.is_loopback() || v4.is_private(),
        IpAddr::V6(v6) => {
            if v6.is_loopback() {
                return true;
            }
            if let Some(v4) = v6.to_ipv4_mapped() {
                return v4.is_loopback() || v4.is_private();
            }
            // RFC 4193 unique local addresses; assigned space is fd00::/8.
            v6.octets()[0] == 0xfd
        }
    }
}

/// Name resolution seam so the guard can be exercised without real DNS.
#[async_trait]
pub trait Resolve: Send + Sync {
    async fn resolve(&self, host: &str) -> std::io::Result<Vec<IpAddr>>;
}

/// System resolver backed by tokio's `lookup_host`.
#[derive(Debug, Default)]
pub struct SystemResolver;

#[async_trait]
impl Resolve for SystemResolver {
    async fn resolve(&self, host: &str) -> std::io::Result<Vec<IpAddr>> {
        let addrs = tokio::net::lookup_host((host, 0u16)).await?;
        Ok(addrs.map(|a| a.ip()).collect())
    }
}

pub struct SsrfGuard {
    resolver: Arc<dyn Resolve>,
    attempts: usize,
}

impl SsrfGuard {
    pub fn new() -> Self {
        Self::with_resolver(Arc::new(SystemResolver))
    }

    pub fn with_resolver(resolver: Arc<dyn Resolve>) -> Self {
        Self {
            resolver,
            attempts: DNS_ATTEMPTS,
        }
    }

    /// True iff the URL's host is, or resolves to, a local address.
    /// Literal IP hosts never touch DNS.
    pub async fn url_targets_local(&self, url: &Url) -> Result<bool> {
        match url.host() {
            Some(Host::Ipv4(ip)) => Ok(is_local_ip(IpAddr::V4(ip))),
            Some(Host::Ipv6(ip)) => Ok(is_local_ip(IpAddr::V6(ip))),
            Some(Host::Domain(domain)) => self.domain_targets_local(domain).await,
            None => Err(Error::InvalidUrl(format!("{url} has no host"))),
        }
    }

    async fn domain_targets_local(&self, domain: &str) -> Result<bool> {
        let mut resolved = false;
        let mut last_err: Option<Error> = None;
        // Every attempt runs even after a benign answer; a single local
        // address in any answer condemns the host.
        for _ in 0..self.attempts {
            match self.resolver.resolve(domain).await {
                Ok(addrs) if addrs.is_empty() => {
                    last_err = Some(Error::Fetch(format!(
                        "dns for {domain} returned no addresses"
                    )));
                }
                Ok(addrs) => {
                    resolved = true;
                    if addrs.into_iter().any(is_local_ip) {
                        return Ok(true);
                    }
                }
                Err(e) => {
                    last_err = Some(Error::Fetch(format!("dns for {domain} failed: {e}")));
                }
            }
        }
        if resolved {
            Ok(false)
        } else {
            Err(last_err.unwrap_or_else(|| Error::Fetch(format!("dns for {domain} failed"))))
        }
    }
}

impl Default for SsrfGuard {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EgressPolicy for SsrfGuard {
    async fn check(&self, url: &Url) -> Result<()> {
        if self.url_targets_local(url).await? {
            tracing::warn!(url = %url, "egress to local address refused");
            return Err(Error::SsrfDetected);
        }
        Ok(())
    }
}

/// Policy that admits every target. For tests and trusted private
/// deployments where loopback origins are legitimate.
#[derive(Debug, Default)]
pub struct AllowAllPolicy;

#[async_trait]
impl EgressPolicy for AllowAllPolicy {
    async fn check(&self, _url: &Url) -> Result<()> {
        Ok(())
    }
}
