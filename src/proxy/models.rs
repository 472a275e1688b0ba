use std::{fmt::Display, str::FromStr};

/// Port used when a proxy address carries none, matching libcurl.
pub const DEFAULT_PROXY_PORT: u16 = 1080;

/// Represents the tunnelling protocol spoken to a proxy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProxyType {
    /// Plain HTTP proxy, `CONNECT` for https targets.
    #[default]
    Http,
    /// SOCKS4, target resolved locally.
    Socks4,
    /// SOCKS4a, target host name resolved by the proxy.
    Socks4a,
    /// SOCKS5, target resolved locally.
    Socks5,
    /// SOCKS5 with the target host name resolved by the proxy.
    Socks5Hostname,
}

impl ProxyType {
    /// Returns `true` when the proxy resolves the target host name itself.
    pub fn remote_dns(&self) -> bool {
        matches!(self, Self::Socks4a | Self::Socks5Hostname)
    }
}

impl Display for ProxyType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Http => write!(f, "HTTP"),
            Self::Socks4 => write!(f, "SOCKS4"),
            Self::Socks4a => write!(f, "SOCKS4A"),
            Self::Socks5 => write!(f, "SOCKS5"),
            Self::Socks5Hostname => write!(f, "SOCKS5_HOSTNAME"),
        }
    }
}

impl FromStr for ProxyType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "http" => Ok(Self::Http),
            "socks4" => Ok(Self::Socks4),
            "socks4a" => Ok(Self::Socks4a),
            "socks5" => Ok(Self::Socks5),
            "socks5h" | "socks5-hostname" | "socks5_hostname" => Ok(Self::Socks5Hostname),
            other => Err(format!("unknown proxy type: {}", other)),
        }
    }
}

/// A configured proxy: the address as given by the caller plus its type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Proxy {
    address: String,
    kind: ProxyType,
}

impl Proxy {
    pub fn new<S: Into<String>>(address: S, kind: ProxyType) -> Self {
        Self {
            address: address.into(),
            kind,
        }
    }

    /// The proxy address in `host:port` form, exactly as configured.
    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn kind(&self) -> ProxyType {
        self.kind
    }

    /// Splits the address into host and port.
    ///
    /// A missing port falls back to [`DEFAULT_PROXY_PORT`]. Bracketed IPv6
    /// literals (`[::1]:8080`) are accepted.
    pub fn host_port(&self) -> anyhow::Result<(String, u16)> {
        let address = self.address.trim();
        if address.is_empty() {
            anyhow::bail!("proxy address is empty");
        }

        if let Some(rest) = address.strip_prefix('[') {
            let Some((host, tail)) = rest.split_once(']') else {
                anyhow::bail!("unterminated IPv6 literal in proxy address: {}", address);
            };
            let port = match tail.strip_prefix(':') {
                Some(port) => port.parse::<u16>()?,
                None if tail.is_empty() => DEFAULT_PROXY_PORT,
                None => anyhow::bail!("malformed proxy address: {}", address),
            };
            return Ok((host.to_owned(), port));
        }

        match address.rsplit_once(':') {
            Some((host, port)) if !host.contains(':') => {
                let port = port
                    .parse::<u16>()
                    .map_err(|e| anyhow::anyhow!("invalid proxy port {:?}: {}", port, e))?;
                Ok((host.to_owned(), port))
            }
            _ => Ok((address.to_owned(), DEFAULT_PROXY_PORT)),
        }
    }
}

impl Display for Proxy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "<Proxy {} {}>", self.kind, self.address)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_host_and_port() {
        let proxy = Proxy::new("127.0.0.1:8000", ProxyType::Http);
        assert_eq!(proxy.host_port().unwrap(), ("127.0.0.1".to_owned(), 8000));
    }

    #[test]
    fn missing_port_defaults() {
        let proxy = Proxy::new("proxy.local", ProxyType::Socks5);
        assert_eq!(
            proxy.host_port().unwrap(),
            ("proxy.local".to_owned(), DEFAULT_PROXY_PORT)
        );
    }

    #[test]
    fn bracketed_ipv6() {
        let proxy = Proxy::new("[::1]:3128", ProxyType::Http);
        assert_eq!(proxy.host_port().unwrap(), ("::1".to_owned(), 3128));
    }

    #[test]
    fn bad_port_is_rejected() {
        assert!(Proxy::new("host:99999", ProxyType::Http).host_port().is_err());
        assert!(Proxy::new("", ProxyType::Http).host_port().is_err());
    }

    #[test]
    fn proxy_type_names() {
        assert_eq!("socks5h".parse(), Ok(ProxyType::Socks5Hostname));
        assert_eq!("SOCKS4A".parse(), Ok(ProxyType::Socks4a));
        assert!("ftp".parse::<ProxyType>().is_err());
        assert!(ProxyType::Socks4a.remote_dns());
        assert!(!ProxyType::Socks5.remote_dns());
    }
}
