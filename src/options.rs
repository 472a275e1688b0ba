//! Construction options.
//!
//! A client can be configured from a keyed map, in code or from JSON:
//!
//! ```json
//! { "redirects": 5, "proxy": "127.0.0.1:8000", "ssl": false, "useragent": "foobar" }
//! ```
//!
//! Only the keys of [`RequestOption`] are recognized.

use std::{fmt::Display, path::Path, str::FromStr};

use serde::Deserialize;

use crate::error::{Error, Result};

/// The recognized option names.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestOption {
    /// `redirects`: maximum redirect hops, `0` disables following.
    Redirects,
    /// `proxy`: HTTP proxy address in `host:port` form.
    Proxy,
    /// `ssl`: verify TLS peers.
    Ssl,
    /// `useragent`: User-Agent string.
    UserAgent,
}

impl RequestOption {
    pub const ALL: [RequestOption; 4] = [Self::Redirects, Self::Proxy, Self::Ssl, Self::UserAgent];

    pub fn name(&self) -> &'static str {
        match self {
            Self::Redirects => "redirects",
            Self::Proxy => "proxy",
            Self::Ssl => "ssl",
            Self::UserAgent => "useragent",
        }
    }
}

impl FromStr for RequestOption {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|option| option.name() == s)
            .ok_or_else(|| Error::UnrecognizedOption(s.to_owned()))
    }
}

impl Display for RequestOption {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// A loosely typed option value.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum OptionValue {
    Bool(bool),
    Int(i64),
    Str(String),
}

impl OptionValue {
    pub(crate) fn into_redirects(self) -> Result<u32> {
        match self {
            Self::Int(n) => u32::try_from(n).map_err(|_| invalid(RequestOption::Redirects)),
            _ => Err(invalid(RequestOption::Redirects)),
        }
    }

    pub(crate) fn into_bool(self, option: RequestOption) -> Result<bool> {
        match self {
            Self::Bool(b) => Ok(b),
            _ => Err(invalid(option)),
        }
    }

    pub(crate) fn into_string(self, option: RequestOption) -> Result<String> {
        match self {
            Self::Str(s) => Ok(s),
            _ => Err(invalid(option)),
        }
    }
}

fn invalid(option: RequestOption) -> Error {
    let expected = match option {
        RequestOption::Redirects => "a non-negative integer",
        RequestOption::Ssl => "a boolean",
        RequestOption::Proxy | RequestOption::UserAgent => "a string",
    };
    Error::InvalidOptionValue {
        option: option.name(),
        expected,
    }
}

impl From<bool> for OptionValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for OptionValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<i32> for OptionValue {
    fn from(value: i32) -> Self {
        Self::Int(value.into())
    }
}

impl From<u32> for OptionValue {
    fn from(value: u32) -> Self {
        Self::Int(value.into())
    }
}

impl From<&str> for OptionValue {
    fn from(value: &str) -> Self {
        Self::Str(value.to_owned())
    }
}

impl From<String> for OptionValue {
    fn from(value: String) -> Self {
        Self::Str(value)
    }
}

/// Parses an option map from a JSON object.
///
/// Key validation happens when the options are applied to a client.
pub fn from_json(json: &str) -> Result<Vec<(String, OptionValue)>> {
    let map: serde_json::Map<String, serde_json::Value> = serde_json::from_str(json)?;
    map.into_iter()
        .map(|(key, value)| -> Result<(String, OptionValue)> {
            Ok((key, serde_json::from_value(value)?))
        })
        .collect()
}

/// Reads an option map from a JSON file.
pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Vec<(String, OptionValue)>> {
    let json = std::fs::read_to_string(path).map_err(Error::ConfigFile)?;
    from_json(&json)
}
