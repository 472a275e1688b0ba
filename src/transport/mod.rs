//! Request execution.
//!
//! [`HttpRequestClient`](crate::HttpRequestClient) turns its configuration into a
//! [`PreparedRequest`] and hands it to a [`Transport`]. The default transport is
//! [`HyperTransport`]; tests substitute their own.

mod capture;
mod http1;

use std::collections::HashSet;

pub(crate) use capture::head_lines;
pub use http1::HyperTransport;
use hyper::{
    body::Bytes,
    header::{HeaderName, HeaderValue},
    HeaderMap, Method,
};

use crate::{error::Result, proxy::Proxy};

/// Everything a transport needs to perform one request.
#[derive(Debug, Clone, PartialEq)]
pub struct PreparedRequest {
    pub method: Method,
    pub url: String,
    /// Maximum redirect hops. `None` and `Some(0)` disable following.
    pub redirect_limit: Option<u32>,
    pub proxy: Option<Proxy>,
    pub user_agent: String,
    /// Extra request header lines in `Name: value` form.
    pub headers: Vec<String>,
    pub verify_ssl: bool,
    /// `application/x-www-form-urlencoded` body, POST only.
    pub body: Option<Bytes>,
}

impl PreparedRequest {
    /// Returns the hop limit when redirects are to be followed.
    pub fn follow_limit(&self) -> Option<u32> {
        self.redirect_limit.filter(|limit| *limit > 0)
    }
}

/// Captured response header lines and the raw body.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Response {
    /// Header lines exactly as received, line terminators trimmed.
    ///
    /// Each head contributes its status line, its header lines and an empty
    /// line: a proxy's `CONNECT` reply, interim `1xx` responses and every
    /// redirect hop, in arrival order.
    pub headers: Vec<String>,
    pub body: Bytes,
}

impl Response {
    pub fn new(headers: Vec<String>, body: impl Into<Bytes>) -> Self {
        Self {
            headers,
            body: body.into(),
        }
    }

    pub fn into_parts(self) -> (Vec<String>, Bytes) {
        (self.headers, self.body)
    }
}

impl From<Response> for (Vec<String>, Bytes) {
    fn from(response: Response) -> Self {
        response.into_parts()
    }
}

/// Performs requests on behalf of a client.
///
/// Implementations block until the request completes.
pub trait Transport {
    fn execute(&mut self, request: &PreparedRequest) -> Result<Response>;
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn execute(&mut self, request: &PreparedRequest) -> Result<Response> {
        (**self).execute(request)
    }
}

/// Applies caller supplied header lines on top of `headers`.
///
/// The first line for a name replaces any default with that name, later lines
/// for the same name are appended. A line with an empty value removes the
/// header. Lines without a colon are skipped.
pub(crate) fn apply_header_lines(headers: &mut HeaderMap, lines: &[String]) -> anyhow::Result<()> {
    let mut seen = HashSet::new();

    for line in lines {
        let Some((name, value)) = line.split_once(':') else {
            #[cfg(feature = "log")]
            log::debug!("Skipping malformed header line: {:?}", line);
            continue;
        };
        let name = HeaderName::from_bytes(name.trim().as_bytes())
            .map_err(|e| anyhow::anyhow!("Invalid header name in {:?}: {}", line, e))?;
        let value = value.trim();

        if value.is_empty() {
            headers.remove(&name);
            continue;
        }

        let value = HeaderValue::from_str(value)
            .map_err(|e| anyhow::anyhow!("Invalid header value in {:?}: {}", line, e))?;
        if seen.insert(name.clone()) {
            headers.insert(name, value);
        } else {
            headers.append(name, value);
        }
    }
    Ok(())
}
