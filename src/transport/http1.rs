use std::fmt::Display;

use anyhow::Context;
use http::response::Parts;
use http_body_util::{BodyExt, Full};
use hyper::{
    body::Bytes,
    client::conn::http1::handshake,
    ext::ReasonPhrase,
    header::{HeaderValue, ACCEPT, CONTENT_TYPE, HOST, LOCATION, USER_AGENT},
    HeaderMap, Method, Request, StatusCode,
};
use hyper_util::rt::TokioIo;
use native_tls::TlsConnector;
use tokio::{
    io::{AsyncRead, AsyncWrite},
    net::TcpStream,
    runtime::{self, Handle, Runtime},
    time,
};
use url::{Host, Url};

use super::{
    apply_header_lines,
    capture::{HeadRecorder, RecordedHeads},
    PreparedRequest, Response, Transport,
};
use crate::{
    error::{Error, Result},
    negotiators::{negotiator_for, Target},
};

const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";

/// One request/response exchange on a single connection.
struct Exchange {
    parts: Parts,
    /// Raw header lines of every head read for this exchange.
    header_lines: Vec<String>,
    payload: Bytes,
}

/// The default transport: hyper HTTP/1.1 connections over tokio sockets.
///
/// Owns a current-thread tokio runtime for its whole lifetime, so every
/// request blocks the caller. The runtime is shut down when the transport is
/// dropped.
///
/// Requests cannot be made from inside another tokio runtime; they fail with
/// [`Error::Request`] instead of blocking the runtime's thread.
pub struct HyperTransport {
    runtime: Runtime,
}

impl HyperTransport {
    pub fn new() -> Result<Self> {
        let runtime = runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(Error::Runtime)?;
        Ok(Self { runtime })
    }
}

impl std::fmt::Debug for HyperTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HyperTransport").finish_non_exhaustive()
    }
}

impl Transport for HyperTransport {
    fn execute(&mut self, request: &PreparedRequest) -> Result<Response> {
        if Handle::try_current().is_ok() {
            return Err(Error::request(anyhow::anyhow!(
                "Cannot perform a blocking request from inside an async runtime"
            )));
        }

        self.runtime.block_on(perform(request)).map_err(|err| {
            #[cfg(feature = "log")]
            log::debug!("{} {} failed: {:#}", request.method, request.url, err);
            Error::request(err)
        })
    }
}

impl Drop for HyperTransport {
    fn drop(&mut self) {
        #[cfg(feature = "log")]
        log::trace!("Releasing transport");
    }
}

/// Runs a request to completion, following redirects per the request's policy.
async fn perform(request: &PreparedRequest) -> anyhow::Result<Response> {
    let mut url =
        Url::parse(&request.url).with_context(|| format!("URL rejected: {}", request.url))?;
    let mut method = request.method.clone();
    let mut body = request.body.clone();
    let mut captured = Vec::new();
    let mut hops = 0u32;

    loop {
        let Exchange {
            parts,
            header_lines,
            payload,
        } = send_once(request, &method, &url, body.clone()).await?;
        captured.extend(header_lines);

        let Some(location) = redirect_location(request, &parts)? else {
            return Ok(Response::new(captured, payload));
        };
        let limit = request.follow_limit().unwrap_or_default();
        if hops >= limit {
            anyhow::bail!("Maximum ({}) redirects followed", limit);
        }
        hops += 1;

        let next = url
            .join(location)
            .with_context(|| format!("Invalid redirect location: {}", location))?;
        log_trace(&url, format!("Redirect {} to {}", parts.status.as_u16(), next));

        if switches_to_get(parts.status, &method) {
            method = Method::GET;
            body = None;
        }
        url = next;
    }
}

/// Returns the `Location` to follow, if the response is a redirect we follow.
fn redirect_location<'a>(
    request: &PreparedRequest,
    parts: &'a Parts,
) -> anyhow::Result<Option<&'a str>> {
    if request.follow_limit().is_none()
        || !matches!(parts.status.as_u16(), 301 | 302 | 303 | 307 | 308)
    {
        return Ok(None);
    }
    let Some(location) = parts.headers.get(LOCATION) else {
        return Ok(None);
    };
    let location = location
        .to_str()
        .map_err(|_| anyhow::anyhow!("Redirect location is not valid text: {:?}", location))?;
    Ok(Some(location))
}

/// 301 and 302 turn a POST into a GET, 303 turns everything but HEAD into a GET.
fn switches_to_get(status: StatusCode, method: &Method) -> bool {
    match status.as_u16() {
        301 | 302 => method == Method::POST,
        303 => method != Method::HEAD,
        _ => false,
    }
}

/// Rebuilds the header lines from hyper's parsed head.
///
/// Used when the raw head could not be recorded. Names come out lowercased
/// and repeated headers grouped.
fn capture_header_lines(parts: &Parts, captured: &mut Vec<String>) {
    let reason = parts
        .extensions
        .get::<ReasonPhrase>()
        .map(|reason| String::from_utf8_lossy(reason.as_bytes()).into_owned())
        .or_else(|| parts.status.canonical_reason().map(str::to_owned));

    let status_line = match reason {
        Some(reason) => format!("{:?} {} {}", parts.version, parts.status.as_u16(), reason),
        None => format!("{:?} {}", parts.version, parts.status.as_u16()),
    };
    captured.push(status_line);

    for (name, value) in parts.headers.iter() {
        let line = format!("{}: {}", name, String::from_utf8_lossy(value.as_bytes()));
        captured.push(line.trim_end_matches(['\r', '\n']).to_owned());
    }
    captured.push(String::new());
}

fn target_of(url: &Url) -> anyhow::Result<Target> {
    let tls = match url.scheme() {
        "http" => false,
        "https" => true,
        other => anyhow::bail!("Protocol \"{}\" not supported", other),
    };
    let host = match url.host() {
        Some(Host::Domain(domain)) => domain.to_owned(),
        Some(Host::Ipv4(ip)) => ip.to_string(),
        Some(Host::Ipv6(ip)) => ip.to_string(),
        None => anyhow::bail!("No host part in the URL: {}", url),
    };
    let port = url
        .port_or_known_default()
        .unwrap_or(if tls { 443 } else { 80 });
    Ok(Target { host, port, tls })
}

/// Builds the hyper request for one hop.
fn build_request(
    request: &PreparedRequest,
    method: &Method,
    url: &Url,
    target: &Target,
    absolute_form: bool,
    body: Option<Bytes>,
) -> anyhow::Result<Request<Full<Bytes>>> {
    let uri = if absolute_form {
        url.as_str().to_owned()
    } else {
        match url.query() {
            Some(query) => format!("{}?{}", url.path(), query),
            None => url.path().to_owned(),
        }
    };

    let host = match url.port() {
        Some(_) => target.authority(),
        None if target.host.contains(':') => format!("[{}]", target.host),
        None => target.host.clone(),
    };

    let mut headers = HeaderMap::new();
    headers.insert(HOST, HeaderValue::from_str(&host)?);
    if !request.user_agent.is_empty() {
        headers.insert(USER_AGENT, HeaderValue::from_str(&request.user_agent)?);
    }
    headers.insert(ACCEPT, HeaderValue::from_static("*/*"));
    if body.is_some() {
        headers.insert(CONTENT_TYPE, HeaderValue::from_static(FORM_CONTENT_TYPE));
    }
    apply_header_lines(&mut headers, &request.headers)?;

    let mut req = Request::builder()
        .method(method.clone())
        .uri(uri)
        .body(Full::new(body.unwrap_or_default()))?;
    *req.headers_mut() = headers;
    Ok(req)
}

/// Connects (through the proxy, if any), sends one request and reads the whole response.
async fn send_once(
    request: &PreparedRequest,
    method: &Method,
    url: &Url,
    body: Option<Bytes>,
) -> anyhow::Result<Exchange> {
    let target = target_of(url)?;

    let Some(proxy) = &request.proxy else {
        let stream = connect(&target.host, target.port).await?;
        return dispatch(request, method, url, &target, false, body, stream).await;
    };

    let (host, port) = proxy.host_port()?;
    let mut stream = connect(&host, port)
        .await
        .with_context(|| format!("Failed to connect to proxy {}", proxy.address()))?;

    let negotiator = negotiator_for(proxy.kind());
    let mut proxy_lines = negotiator
        .negotiate(&mut stream, &target)
        .await
        .with_context(|| format!("{} proxy negotiation failed", proxy.kind()))?;
    let absolute_form = negotiator.absolute_form(&target);

    let mut exchange = dispatch(request, method, url, &target, absolute_form, body, stream).await?;
    proxy_lines.append(&mut exchange.header_lines);
    exchange.header_lines = proxy_lines;
    Ok(exchange)
}

async fn dispatch(
    request: &PreparedRequest,
    method: &Method,
    url: &Url,
    target: &Target,
    absolute_form: bool,
    body: Option<Bytes>,
    stream: TcpStream,
) -> anyhow::Result<Exchange> {
    let req = build_request(request, method, url, target, absolute_form, body)?;
    if target.tls {
        send_with_tls(req, stream, target, request.verify_ssl).await
    } else {
        send_without_tls(req, stream, target).await
    }
}

/// Establishes a TCP connection.
async fn connect(host: &str, port: u16) -> anyhow::Result<TcpStream> {
    let start_time = time::Instant::now();
    let stream = TcpStream::connect((host, port))
        .await
        .with_context(|| format!("Failed to connect to {} port {}", host, port))?;

    #[cfg(feature = "log")]
    log::trace!("{}:{}: Connected in {:?}", host, port, start_time.elapsed());
    #[cfg(not(feature = "log"))]
    let _ = start_time;
    Ok(stream)
}

async fn send_with_tls(
    req: Request<Full<Bytes>>,
    stream: TcpStream,
    target: &Target,
    verify: bool,
) -> anyhow::Result<Exchange> {
    log_trace(target, "Starting TLS handshake");
    let start_time = time::Instant::now();

    let tls_connector = TlsConnector::builder()
        .danger_accept_invalid_certs(!verify)
        .danger_accept_invalid_hostnames(!verify)
        .build()?;
    let connector = tokio_native_tls::TlsConnector::from(tls_connector);

    let tls_stream = connector
        .connect(&target.host, stream)
        .await
        .with_context(|| format!("TLS handshake with {} failed", target))?;
    log_trace(
        target,
        format!("TLS established in {:?}", start_time.elapsed()),
    );

    send_over(req, tls_stream, target).await
}

async fn send_without_tls(
    req: Request<Full<Bytes>>,
    stream: TcpStream,
    target: &Target,
) -> anyhow::Result<Exchange> {
    send_over(req, stream, target).await
}

/// Runs the HTTP/1.1 exchange over an established stream.
async fn send_over<S>(
    req: Request<Full<Bytes>>,
    stream: S,
    target: &Target,
) -> anyhow::Result<Exchange>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let heads = RecordedHeads::default();
    let io = TokioIo::new(HeadRecorder::new(stream, heads.clone()));
    let (mut sender, conn) = handshake(io).await?;

    let addr = target.authority();
    let handler = tokio::task::spawn(async move {
        if let Err(err) = conn.await {
            #[cfg(feature = "log")]
            log::debug!("{}: Connection error: {}", addr, err);
            #[cfg(not(feature = "log"))]
            let _ = (addr, err);
        }
    });

    log_trace(target, format!("Sending {} {}", req.method(), req.uri()));
    let start_time = time::Instant::now();
    let response = sender.send_request(req).await?;
    let (parts, incoming) = response.into_parts();
    let payload = incoming.collect().await?.to_bytes();
    log_trace(
        target,
        format!(
            "Received {} ({} bytes) in {:?}",
            parts.status,
            payload.len(),
            start_time.elapsed()
        ),
    );
    handler.abort();

    let header_lines = heads.take().unwrap_or_else(|| {
        let mut lines = Vec::new();
        capture_header_lines(&parts, &mut lines);
        lines
    });
    Ok(Exchange {
        parts,
        header_lines,
        payload,
    })
}

fn log_trace<T, S>(target: &T, msg: S)
where
    T: Display,
    S: Display,
{
    #[cfg(feature = "log")]
    log::trace!("{}: {}", target, msg);
    #[cfg(not(feature = "log"))]
    let _ = (target, msg);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parts(response: hyper::Response<()>) -> Parts {
        response.into_parts().0
    }

    fn get_request(url: &str) -> PreparedRequest {
        PreparedRequest {
            method: Method::GET,
            url: url.to_owned(),
            redirect_limit: Some(3),
            proxy: None,
            user_agent: String::new(),
            headers: vec![],
            verify_ssl: true,
            body: None,
        }
    }

    #[test]
    fn fallback_lines_from_parsed_head() {
        let parts = parts(
            hyper::Response::builder()
                .status(200)
                .header("content-type", "text/html")
                .header("set-cookie", "a=1")
                .header("set-cookie", "b=2")
                .body(())
                .unwrap(),
        );

        let mut captured = Vec::new();
        capture_header_lines(&parts, &mut captured);
        assert_eq!(
            captured,
            vec![
                "HTTP/1.1 200 OK",
                "content-type: text/html",
                "set-cookie: a=1",
                "set-cookie: b=2",
                "",
            ]
        );
    }

    #[test]
    fn custom_reason_phrase_is_kept() {
        let mut parts = parts(hyper::Response::builder().status(404).body(()).unwrap());
        parts
            .extensions
            .insert(ReasonPhrase::from_static(b"Nothing Here"));

        let mut captured = Vec::new();
        capture_header_lines(&parts, &mut captured);
        assert_eq!(captured[0], "HTTP/1.1 404 Nothing Here");
    }

    #[test]
    fn redirect_location_must_be_text() {
        let request = get_request("http://example.com/");
        let parts = parts(
            hyper::Response::builder()
                .status(302)
                .header(LOCATION, HeaderValue::from_bytes(b"/caf\xe9").unwrap())
                .body(())
                .unwrap(),
        );

        let err = redirect_location(&request, &parts).unwrap_err();
        assert!(err.to_string().contains("Redirect location"), "{}", err);
    }

    #[test]
    fn redirect_location_only_when_following() {
        let found = parts(
            hyper::Response::builder()
                .status(302)
                .header(LOCATION, "/next")
                .body(())
                .unwrap(),
        );
        assert_eq!(
            redirect_location(&get_request("http://example.com/"), &found).unwrap(),
            Some("/next")
        );

        let mut request = get_request("http://example.com/");
        request.redirect_limit = None;
        assert_eq!(redirect_location(&request, &found).unwrap(), None);

        let ok = parts(hyper::Response::builder().status(200).body(()).unwrap());
        assert_eq!(
            redirect_location(&get_request("http://example.com/"), &ok).unwrap(),
            None
        );
    }

    #[test]
    fn request_inside_a_runtime_is_an_error() {
        let mut transport = HyperTransport::new().unwrap();
        let outer = runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();

        let request = get_request("http://127.0.0.1:9/");
        let result = outer.block_on(async { transport.execute(&request) });
        match result {
            Err(Error::Request(message)) => assert!(message.contains("async runtime")),
            other => panic!("expected Request error, got {:?}", other),
        }
    }

    #[test]
    fn target_defaults_ports() {
        let target = target_of(&Url::parse("https://example.com/x").unwrap()).unwrap();
        assert_eq!(target.port, 443);
        assert!(target.tls);

        let target = target_of(&Url::parse("http://[::1]:8080/").unwrap()).unwrap();
        assert_eq!(target.host, "::1");
        assert_eq!(target.authority(), "[::1]:8080");
    }

    #[test]
    fn unsupported_scheme_is_rejected() {
        assert!(target_of(&Url::parse("ftp://example.com/").unwrap()).is_err());
    }

    #[test]
    fn redirect_method_rewrite() {
        assert!(switches_to_get(StatusCode::FOUND, &Method::POST));
        assert!(!switches_to_get(StatusCode::FOUND, &Method::PUT));
        assert!(switches_to_get(StatusCode::SEE_OTHER, &Method::PUT));
        assert!(!switches_to_get(StatusCode::TEMPORARY_REDIRECT, &Method::POST));
    }

    #[test]
    fn absolute_form_request_line() {
        let request = PreparedRequest {
            method: Method::GET,
            url: "http://example.com/a?b=c".to_owned(),
            redirect_limit: None,
            proxy: None,
            user_agent: "agent".to_owned(),
            headers: vec!["Accept-Encoding: gzip,deflate".to_owned()],
            verify_ssl: true,
            body: None,
        };
        let url = Url::parse(&request.url).unwrap();
        let target = target_of(&url).unwrap();

        let req = build_request(&request, &Method::GET, &url, &target, true, None).unwrap();
        assert_eq!(req.uri(), "http://example.com/a?b=c");

        let req = build_request(&request, &Method::GET, &url, &target, false, None).unwrap();
        assert_eq!(req.uri(), "/a?b=c");
        assert_eq!(req.headers()[HOST], "example.com");
        assert_eq!(req.headers()[USER_AGENT], "agent");
        assert_eq!(req.headers()["accept-encoding"], "gzip,deflate");
    }

    #[test]
    fn form_body_sets_content_type() {
        let request = PreparedRequest {
            method: Method::POST,
            url: "http://example.com:8080/form".to_owned(),
            redirect_limit: None,
            proxy: None,
            user_agent: String::new(),
            headers: vec![],
            verify_ssl: true,
            body: Some(Bytes::from_static(b"a=1")),
        };
        let url = Url::parse(&request.url).unwrap();
        let target = target_of(&url).unwrap();

        let req =
            build_request(&request, &Method::POST, &url, &target, false, request.body.clone())
                .unwrap();
        assert_eq!(req.headers()[CONTENT_TYPE], FORM_CONTENT_TYPE);
        assert_eq!(req.headers()[HOST], "example.com:8080");
        assert!(req.headers().get(USER_AGENT).is_none());
    }
}
