use std::{io::Cursor, net::SocketAddr};

use byteorder::BigEndian;
use byteorder_pack::PackTo;
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::TcpStream,
};

use async_trait::async_trait;

use super::{log_trace, resolve, NegotiatorTrait, Target};

/// A negotiator for SOCKS4 and SOCKS4a proxies.
pub struct Socks4Negotiator {
    /// SOCKS4a: send the host name and let the proxy resolve it.
    pub remote_dns: bool,
}

impl Socks4Negotiator {
    /// Builds the CONNECT packet with an empty user id.
    async fn connect_packet(&self, target: &Target) -> anyhow::Result<Vec<u8>> {
        let mut cursor = Cursor::new(Vec::new());

        if self.remote_dns && target.host.parse::<std::net::IpAddr>().is_err() {
            // 0.0.0.x with x != 0 tells the proxy a host name follows the user id.
            let data = (4u8, 1u8, target.port, [0u8, 0, 0, 1], 0u8);
            data.pack_to::<BigEndian, _>(&mut cursor)?;
            let mut packet = cursor.into_inner();
            packet.extend_from_slice(target.host.as_bytes());
            packet.push(0);
            return Ok(packet);
        }

        let ip = resolve(&target.host, target.port)
            .await?
            .into_iter()
            .find_map(|addr| match addr {
                SocketAddr::V4(v4) => Some(*v4.ip()),
                SocketAddr::V6(_) => None,
            })
            .ok_or_else(|| anyhow::anyhow!("SOCKS4 requires an IPv4 address for {}", target.host))?;

        let data = (4u8, 1u8, target.port, ip.octets(), 0u8);
        data.pack_to::<BigEndian, _>(&mut cursor)?;
        Ok(cursor.into_inner())
    }
}

#[async_trait]
impl NegotiatorTrait for Socks4Negotiator {
    async fn negotiate(
        &self,
        stream: &mut TcpStream,
        target: &Target,
    ) -> anyhow::Result<Vec<String>> {
        let packet = self.connect_packet(target).await?;

        log_trace(target, "Sending SOCKS4 connect request");
        stream.write_all(&packet).await?;

        let mut response = [0u8; 8];
        stream.read_exact(&mut response).await?;
        let mut response = response.as_slice();

        if response.read_u8().await? != 0 {
            anyhow::bail!("SOCKS4 reply has invalid version");
        }

        match response.read_u8().await? {
            90 => {} // Ok
            91 => anyhow::bail!("SOCKS4 request rejected or failed"),
            92 => anyhow::bail!("SOCKS4 request rejected because SOCKS server cannot connect to identd on the client"),
            93 => anyhow::bail!("SOCKS4 request rejected because the client program and identd report different user-ids"),
            code => anyhow::bail!("SOCKS4 reply has unknown code {}", code),
        }

        log_trace(target, "SOCKS4 tunnel established");
        Ok(Vec::new())
    }
}
