use std::{fmt::Display, str::FromStr};

use fake::{faker::internet::en::UserAgent, Fake};

/// Desktop browser User-Agent, the default for every new client.
pub const DESKTOP_AGENT: &str =
    "Mozilla/5.0 (Windows; U; Windows NT 5.1; en-US; rv:1.8.1.7) Gecko/20070914 Firefox/2.0.0.7";

/// Mobile browser User-Agent.
pub const MOBILE_AGENT: &str = "Mozilla/5.0 (iPhone; CPU iPhone OS 6_0 like Mac OS X) AppleWebKit/536.26 (KHTML, like Gecko) Version/6.0 Mobile/10A5376e Safari/8536.25";

/// Named User-Agent presets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AgentPreset {
    #[default]
    Desktop,
    Mobile,
    /// A browser User-Agent picked at random on every call to [`AgentPreset::user_agent`].
    Random,
}

impl AgentPreset {
    /// Returns the User-Agent string for this preset.
    pub fn user_agent(&self) -> String {
        match self {
            Self::Desktop => DESKTOP_AGENT.to_owned(),
            Self::Mobile => MOBILE_AGENT.to_owned(),
            Self::Random => UserAgent().fake::<String>(),
        }
    }
}

impl FromStr for AgentPreset {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "desktop" => Ok(Self::Desktop),
            "mobile" => Ok(Self::Mobile),
            "random" => Ok(Self::Random),
            other => Err(format!("unknown agent preset: {}", other)),
        }
    }
}

impl Display for AgentPreset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Desktop => write!(f, "desktop"),
            Self::Mobile => write!(f, "mobile"),
            Self::Random => write!(f, "random"),
        }
    }
}
