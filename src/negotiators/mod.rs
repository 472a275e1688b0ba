mod http;
mod socks4;
mod socks5;

use std::{
    fmt::Display,
    net::{IpAddr, SocketAddr},
};

use anyhow::Context;
use async_trait::async_trait;
pub use http::HttpNegotiator;
pub use socks4::Socks4Negotiator;
pub use socks5::Socks5Negotiator;
use tokio::net::TcpStream;

use crate::proxy::ProxyType;

/// The origin a request is ultimately sent to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    /// Host name or IP literal, without IPv6 brackets.
    pub host: String,
    pub port: u16,
    /// Whether the origin is reached over TLS.
    pub tls: bool,
}

impl Target {
    /// Returns `host:port`, bracketing IPv6 literals.
    pub fn authority(&self) -> String {
        if self.host.contains(':') {
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }
}

impl Display for Target {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.authority())
    }
}

/// Prepares a freshly connected proxy socket so it carries traffic to `target`.
#[async_trait]
pub trait NegotiatorTrait {
    /// Returns the header lines of the proxy's reply, empty for binary protocols.
    #[allow(unused_variables)]
    async fn negotiate(
        &self,
        stream: &mut TcpStream,
        target: &Target,
    ) -> anyhow::Result<Vec<String>> {
        Ok(Vec::new())
    }

    /// Whether the request line must use the absolute URI instead of the path.
    #[allow(unused_variables)]
    fn absolute_form(&self, target: &Target) -> bool {
        false
    }
}

/// Returns the negotiator speaking the given proxy protocol.
pub fn negotiator_for(kind: ProxyType) -> Box<dyn NegotiatorTrait + Send + Sync> {
    match kind {
        ProxyType::Http => Box::new(HttpNegotiator),
        ProxyType::Socks4 => Box::new(Socks4Negotiator { remote_dns: false }),
        ProxyType::Socks4a => Box::new(Socks4Negotiator { remote_dns: true }),
        ProxyType::Socks5 => Box::new(Socks5Negotiator { remote_dns: false }),
        ProxyType::Socks5Hostname => Box::new(Socks5Negotiator { remote_dns: true }),
    }
}

/// Resolves `host` locally, used by proxy protocols that need an address.
pub(crate) async fn resolve(host: &str, port: u16) -> anyhow::Result<Vec<SocketAddr>> {
    if let Ok(ip) = host.parse::<IpAddr>() {
        return Ok(vec![SocketAddr::new(ip, port)]);
    }

    let addrs = tokio::net::lookup_host((host, port))
        .await
        .with_context(|| format!("Could not resolve host: {}", host))?
        .collect::<Vec<_>>();
    if addrs.is_empty() {
        anyhow::bail!("Could not resolve host: {}", host);
    }
    Ok(addrs)
}

/// Logs a trace message prefixed with the target.
pub(crate) fn log_trace<S>(target: &Target, msg: S)
where
    S: Display,
{
    #[cfg(feature = "log")]
    log::trace!("{}: {}", target, msg);
    #[cfg(not(feature = "log"))]
    let _ = (target, msg);
}
