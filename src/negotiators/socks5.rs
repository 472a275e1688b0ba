use std::net::IpAddr;

use async_trait::async_trait;
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::TcpStream,
    time::Instant,
};

use super::{log_trace, resolve, NegotiatorTrait, Target};

/// A negotiator for SOCKS5 proxies.
pub struct Socks5Negotiator {
    /// SOCKS5-hostname: send the host name and let the proxy resolve it.
    pub remote_dns: bool,
}

impl Socks5Negotiator {
    /// Builds the CONNECT request: version, command, reserved, address, port.
    async fn connect_packet(&self, target: &Target) -> anyhow::Result<Vec<u8>> {
        let mut packet = vec![5u8, 1, 0];

        let ip = match target.host.parse::<IpAddr>() {
            Ok(ip) => Some(ip),
            Err(_) if self.remote_dns => None,
            Err(_) => Some(resolve(&target.host, target.port).await?[0].ip()),
        };

        match ip {
            Some(IpAddr::V4(v4)) => {
                packet.push(1);
                packet.extend_from_slice(&v4.octets());
            }
            Some(IpAddr::V6(v6)) => {
                packet.push(4);
                packet.extend_from_slice(&v6.octets());
            }
            None => {
                let host = target.host.as_bytes();
                let Ok(len) = u8::try_from(host.len()) else {
                    anyhow::bail!("SOCKS5 host name is too long: {}", target.host);
                };
                packet.push(3);
                packet.push(len);
                packet.extend_from_slice(host);
            }
        }
        packet.extend_from_slice(&target.port.to_be_bytes());
        Ok(packet)
    }
}

fn reply_error(code: u8) -> &'static str {
    match code {
        1 => "general SOCKS server failure",
        2 => "connection not allowed by ruleset",
        3 => "network unreachable",
        4 => "host unreachable",
        5 => "connection refused",
        6 => "TTL expired",
        7 => "command not supported",
        8 => "address type not supported",
        _ => "unknown error",
    }
}

#[async_trait]
impl NegotiatorTrait for Socks5Negotiator {
    async fn negotiate(
        &self,
        stream: &mut TcpStream,
        target: &Target,
    ) -> anyhow::Result<Vec<String>> {
        // Version, number of methods, no authentication
        let start_time = Instant::now();
        stream.write_all(&[5, 1, 0]).await?;

        let mut response_buf = [0; 2];
        stream.read_exact(&mut response_buf).await?;
        if response_buf[0] != 0x05 {
            anyhow::bail!("SOCKS5 reply has invalid version");
        }
        if response_buf[1] == 0xff {
            anyhow::bail!("SOCKS5 proxy requires authentication");
        }
        if response_buf[1] != 0x00 {
            anyhow::bail!("SOCKS5 proxy selected unsupported method {}", response_buf[1]);
        }

        let packet = self.connect_packet(target).await?;
        log_trace(target, "Sending SOCKS5 connect request");
        stream.write_all(&packet).await?;

        let mut head = [0u8; 4];
        stream.read_exact(&mut head).await?;
        if head[0] != 0x05 {
            anyhow::bail!("SOCKS5 reply has invalid version");
        }
        if head[1] != 0x00 {
            anyhow::bail!("SOCKS5 connect failed: {}", reply_error(head[1]));
        }

        // Skip the bound address and port.
        let address_len = match head[3] {
            1 => 4,
            4 => 16,
            3 => stream.read_u8().await? as usize,
            other => anyhow::bail!("SOCKS5 reply has unknown address type {}", other),
        };
        let mut bound = vec![0u8; address_len + 2];
        stream.read_exact(&mut bound).await?;

        log_trace(
            target,
            format!("SOCKS5 tunnel established in {:?}", start_time.elapsed()),
        );
        Ok(Vec::new())
    }
}
