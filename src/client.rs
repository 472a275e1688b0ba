use hyper::{body::Bytes, Method};
use url::form_urlencoded;

use crate::{
    agent::{AgentPreset, DESKTOP_AGENT, MOBILE_AGENT},
    error::Result,
    options::{OptionValue, RequestOption},
    proxy::{Proxy, ProxyType},
    transport::{HyperTransport, PreparedRequest, Response, Transport},
};

/// Header line appended by [`HttpRequestClient::request_compression`].
pub const COMPRESSION_HEADER: &str = "Accept-Encoding: gzip,deflate";

/// A small blocking HTTP client.
///
/// Holds the request configuration (User-Agent, extra header lines, proxy,
/// redirect policy and TLS verification) and performs `GET`/`POST` requests
/// with it, returning the captured response header lines and the raw body.
///
/// The transport is created with the client and released when it is dropped.
/// With the default transport, requests block the calling thread and must not
/// be made from async code; inside a tokio runtime they fail with
/// [`Error::Request`](crate::Error::Request).
///
/// # Examples
///
/// ```no_run
/// use simplehttp::HttpRequestClient;
///
/// let mut client = HttpRequestClient::with_options([("redirects", 5i64.into())])?;
/// client.use_mobile_agent();
/// client.add_cookie("session=abc");
///
/// let (headers, body) = client.get("http://example.com/")?.into_parts();
/// println!("{} header lines, {} bytes", headers.len(), body.len());
/// # Ok::<(), simplehttp::Error>(())
/// ```
#[derive(Debug)]
pub struct HttpRequestClient<T = HyperTransport> {
    transport: T,
    user_agent: String,
    headers: Vec<String>,
    proxy: Option<Proxy>,
    redirect_limit: Option<u32>,
    verify_ssl: bool,
}

impl HttpRequestClient<HyperTransport> {
    /// Creates a client with the default configuration.
    pub fn new() -> Result<Self> {
        Ok(Self::with_transport(HyperTransport::new()?))
    }

    /// Creates a client and applies the given options.
    ///
    /// Recognized keys are `redirects`, `proxy`, `ssl` and `useragent`; any
    /// other key fails with [`Error::UnrecognizedOption`](crate::Error::UnrecognizedOption).
    pub fn with_options<I, K>(options: I) -> Result<Self>
    where
        I: IntoIterator<Item = (K, OptionValue)>,
        K: AsRef<str>,
    {
        Self::with_options_and_transport(options, HyperTransport::new()?)
    }

    /// Creates a client from a JSON object of options.
    pub fn from_json(json: &str) -> Result<Self> {
        Self::with_options(crate::options::from_json(json)?)
    }
}

impl<T: Transport> HttpRequestClient<T> {
    /// Creates a client with the default configuration over a custom transport.
    pub fn with_transport(transport: T) -> Self {
        Self {
            transport,
            user_agent: DESKTOP_AGENT.to_owned(),
            headers: Vec::new(),
            proxy: None,
            redirect_limit: None,
            verify_ssl: true,
        }
    }

    /// Creates a client over a custom transport and applies the given options.
    pub fn with_options_and_transport<I, K>(options: I, transport: T) -> Result<Self>
    where
        I: IntoIterator<Item = (K, OptionValue)>,
        K: AsRef<str>,
    {
        let mut client = Self::with_transport(transport);
        for (key, value) in options {
            client.apply_option(key.as_ref().parse()?, value)?;
        }
        Ok(client)
    }

    fn apply_option(&mut self, option: RequestOption, value: OptionValue) -> Result<()> {
        match option {
            RequestOption::Redirects => {
                self.set_follow_redirects(value.into_redirects()?);
            }
            RequestOption::Proxy => {
                self.set_proxy(value.into_string(option)?);
            }
            RequestOption::Ssl => {
                self.set_verify_ssl(value.into_bool(option)?);
            }
            RequestOption::UserAgent => {
                self.set_user_agent(value.into_string(option)?);
            }
        }
        Ok(())
    }

    /// Switches the User-Agent to a desktop browser.
    pub fn use_desktop_agent(&mut self) -> &mut Self {
        self.set_user_agent(DESKTOP_AGENT)
    }

    /// Switches the User-Agent to a mobile browser.
    pub fn use_mobile_agent(&mut self) -> &mut Self {
        self.set_user_agent(MOBILE_AGENT)
    }

    /// Switches the User-Agent to a randomly picked browser.
    pub fn use_random_agent(&mut self) -> &mut Self {
        self.use_agent(AgentPreset::Random)
    }

    pub fn use_agent(&mut self, preset: AgentPreset) -> &mut Self {
        self.set_user_agent(preset.user_agent())
    }

    pub fn set_user_agent<S: Into<String>>(&mut self, user_agent: S) -> &mut Self {
        self.user_agent = user_agent.into();
        self
    }

    pub fn user_agent(&self) -> &str {
        &self.user_agent
    }

    /// Removes every extra request header line.
    pub fn reset_headers(&mut self) -> &mut Self {
        self.headers.clear();
        self
    }

    /// The extra request header lines, in the order they will be sent.
    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    /// Appends a raw `Name: value` header line.
    pub fn add_header<S: Into<String>>(&mut self, line: S) -> &mut Self {
        self.headers.push(line.into());
        self
    }

    /// Asks the server for a gzip or deflate encoded body.
    ///
    /// The body is returned as received; it is not decoded.
    pub fn request_compression(&mut self) -> &mut Self {
        self.add_header(COMPRESSION_HEADER)
    }

    /// Appends a `Cookie` header line carrying `cookie` verbatim.
    pub fn add_cookie(&mut self, cookie: &str) -> &mut Self {
        self.add_header(format!("Cookie: {}", cookie))
    }

    /// Appends one `Cookie` header line with the cookies joined by `;`.
    pub fn add_cookies<I, S>(&mut self, cookies: I) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let joined = cookies
            .into_iter()
            .map(|cookie| cookie.as_ref().to_owned())
            .collect::<Vec<_>>()
            .join(";");
        self.add_cookie(&joined)
    }

    /// Follows up to `num` redirects. `0` disables following.
    pub fn set_follow_redirects(&mut self, num: u32) -> &mut Self {
        self.redirect_limit = Some(num);
        self
    }

    /// The redirect limit, `None` when never set.
    pub fn follow_redirects(&self) -> Option<u32> {
        self.redirect_limit
    }

    /// Routes requests through an HTTP proxy at `address` (`host:port`).
    pub fn set_proxy<S: Into<String>>(&mut self, address: S) -> &mut Self {
        self.set_proxy_with_type(address, ProxyType::Http)
    }

    pub fn set_proxy_with_type<S: Into<String>>(&mut self, address: S, kind: ProxyType) -> &mut Self {
        self.proxy = Some(Proxy::new(address, kind));
        self
    }

    pub fn clear_proxy(&mut self) -> &mut Self {
        self.proxy = None;
        self
    }

    pub fn proxy(&self) -> Option<&Proxy> {
        self.proxy.as_ref()
    }

    /// Enables or disables TLS certificate and host name verification.
    pub fn set_verify_ssl(&mut self, verify: bool) -> &mut Self {
        self.verify_ssl = verify;
        self
    }

    pub fn verify_ssl(&self) -> bool {
        self.verify_ssl
    }

    /// Performs a `GET` request.
    pub fn get<U: AsRef<str>>(&mut self, url: U) -> Result<Response> {
        let request = self.prepare(Method::GET, url.as_ref(), None);
        self.make_request(request)
    }

    /// Performs a `POST` request with `values` as a URL-encoded form body.
    pub fn post<U, I, K, V>(&mut self, url: U, values: I) -> Result<Response>
    where
        U: AsRef<str>,
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut form = form_urlencoded::Serializer::new(String::new());
        for (name, value) in values {
            form.append_pair(name.as_ref(), value.as_ref());
        }
        let body = Bytes::from(form.finish());

        let request = self.prepare(Method::POST, url.as_ref(), Some(body));
        self.make_request(request)
    }

    /// Snapshots the current configuration into a request.
    fn prepare(&self, method: Method, url: &str, body: Option<Bytes>) -> PreparedRequest {
        PreparedRequest {
            method,
            url: url.to_owned(),
            redirect_limit: self.redirect_limit,
            proxy: self.proxy.clone(),
            user_agent: self.user_agent.clone(),
            headers: self.headers.clone(),
            verify_ssl: self.verify_ssl,
            body,
        }
    }

    fn make_request(&mut self, request: PreparedRequest) -> Result<Response> {
        #[cfg(feature = "log")]
        log::debug!("{} {}", request.method, request.url);
        self.transport.execute(&request)
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Recorder {
        requests: Vec<PreparedRequest>,
    }

    impl Transport for Recorder {
        fn execute(&mut self, request: &PreparedRequest) -> Result<Response> {
            self.requests.push(request.clone());
            Ok(Response::default())
        }
    }

    #[test]
    fn get_carries_the_configuration() {
        let mut client = HttpRequestClient::with_transport(Recorder::default());
        client
            .use_mobile_agent()
            .request_compression()
            .set_follow_redirects(2)
            .set_proxy_with_type("proxy:1080", ProxyType::Socks5)
            .set_verify_ssl(false);
        client.get("http://example.com/").unwrap();

        let request = &client.transport().requests[0];
        assert_eq!(request.method, Method::GET);
        assert_eq!(request.url, "http://example.com/");
        assert_eq!(request.user_agent, MOBILE_AGENT);
        assert_eq!(request.headers, vec![COMPRESSION_HEADER]);
        assert_eq!(request.redirect_limit, Some(2));
        assert_eq!(
            request.proxy,
            Some(Proxy::new("proxy:1080", ProxyType::Socks5))
        );
        assert!(!request.verify_ssl);
        assert!(request.body.is_none());
    }

    #[test]
    fn post_encodes_the_form() {
        let mut client = HttpRequestClient::with_transport(Recorder::default());
        client
            .post("http://example.com/", [("name", "a b"), ("q", "x&y=z")])
            .unwrap();

        let request = &client.transport().requests[0];
        assert_eq!(request.method, Method::POST);
        assert_eq!(
            request.body.as_deref(),
            Some(b"name=a+b&q=x%26y%3Dz".as_slice())
        );
    }

    #[test]
    fn configuration_is_read_per_request() {
        let mut client = HttpRequestClient::with_transport(Recorder::default());
        client.add_cookie("a=1");
        client.get("http://example.com/").unwrap();
        client.reset_headers();
        client.get("http://example.com/").unwrap();

        let requests = &client.transport().requests;
        assert_eq!(requests[0].headers, vec!["Cookie: a=1"]);
        assert!(requests[1].headers.is_empty());
    }

    #[test]
    fn later_agent_call_wins() {
        let mut client = HttpRequestClient::with_transport(Recorder::default());
        client.set_user_agent("custom").use_desktop_agent();
        assert_eq!(client.user_agent(), DESKTOP_AGENT);
        client.use_agent(AgentPreset::Mobile).set_user_agent("custom");
        assert_eq!(client.user_agent(), "custom");
    }

    #[test]
    fn wrong_option_type_is_rejected() {
        let result = HttpRequestClient::with_options_and_transport(
            [("ssl", OptionValue::from("no"))],
            Recorder::default(),
        );
        assert!(matches!(
            result,
            Err(crate::Error::InvalidOptionValue { option: "ssl", .. })
        ));
    }
}
