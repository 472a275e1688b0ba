use async_trait::async_trait;
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::TcpStream,
    time,
};

use super::{log_trace, NegotiatorTrait, Target};
use crate::transport::head_lines;

/// Upper bound for the proxy's reply to a `CONNECT`.
const MAX_CONNECT_RESPONSE: usize = 16 * 1024;

/// A negotiator for plain HTTP proxies.
///
/// Plain `http://` targets need no handshake: the request goes straight to the
/// proxy in absolute form. `https://` targets are tunnelled with `CONNECT`.
pub struct HttpNegotiator;

impl HttpNegotiator {
    /// Generates a CONNECT request to be sent to the proxy server.
    fn generate_connect_request(&self, target: &Target) -> String {
        let authority = target.authority();
        format!(
            "CONNECT {} HTTP/1.1\r\nHost: {}\r\nProxy-Connection: Keep-Alive\r\n\r\n",
            authority, authority
        )
    }

    /// Reads the proxy's reply up to the end of its header block.
    ///
    /// Reads byte by byte so nothing past the header block is consumed.
    async fn read_connect_response(&self, stream: &mut TcpStream) -> anyhow::Result<Vec<u8>> {
        let mut buf = Vec::with_capacity(256);
        while !buf.ends_with(b"\r\n\r\n") {
            if buf.len() >= MAX_CONNECT_RESPONSE {
                anyhow::bail!("CONNECT response from proxy is too large");
            }
            let byte = stream.read_u8().await?;
            buf.push(byte);
        }
        Ok(buf)
    }
}

#[async_trait]
impl NegotiatorTrait for HttpNegotiator {
    async fn negotiate(
        &self,
        stream: &mut TcpStream,
        target: &Target,
    ) -> anyhow::Result<Vec<String>> {
        if !target.tls {
            return Ok(Vec::new());
        }

        let connect_request = self.generate_connect_request(target);
        log_trace(target, "Sending a CONNECT request to proxy");
        let start_time = time::Instant::now();
        stream.write_all(connect_request.as_bytes()).await?;

        let buf = self.read_connect_response(stream).await?;
        let mut headers = [httparse::EMPTY_HEADER; 32];
        let mut response = httparse::Response::new(&mut headers);
        response.parse(&buf)?;

        let code = response.code.unwrap_or_default();
        if !(200..300).contains(&code) {
            anyhow::bail!(
                "Received HTTP code {} from proxy after CONNECT: {}",
                code,
                response.reason.unwrap_or("Unknown reason")
            );
        }
        log_trace(
            target,
            format!("Tunnel established in {:?}", start_time.elapsed()),
        );
        Ok(head_lines(&buf))
    }

    fn absolute_form(&self, target: &Target) -> bool {
        !target.tls
    }
}
