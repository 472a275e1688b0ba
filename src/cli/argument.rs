use clap::builder::styling::AnsiColor;
use clap::builder::{PossibleValue, Styles};
use clap::Parser;
use simplehttp::{AgentPreset, ProxyType};

fn get_styles() -> Styles {
    Styles::styled()
        .header(AnsiColor::Yellow.on_default())
        .usage(AnsiColor::Green.on_default())
        .literal(AnsiColor::BrightGreen.on_default())
        .placeholder(AnsiColor::Cyan.on_default())
}

/// Parses a `name=value` form field.
fn parse_field(raw: &str) -> Result<(String, String), String> {
    raw.split_once('=')
        .map(|(name, value)| (name.to_owned(), value.to_owned()))
        .ok_or_else(|| format!("expected name=value, got {:?}", raw))
}

/// Command-line interface definition for the request tool.
#[derive(Parser, Debug, Clone)]
#[command(version, about, styles = get_styles())]
pub struct Cli {
    /// URL to request.
    pub url: String,

    /// Form field to POST, as name=value. Switches the request to POST.
    #[arg(short, long = "data", value_name = "NAME=VALUE", value_parser = parse_field)]
    pub data: Vec<(String, String)>,

    /// JSON file with construction options (redirects, proxy, ssl, useragent).
    #[arg(long, value_name = "FILE")]
    pub config: Option<std::path::PathBuf>,

    /// Maximum number of redirects to follow, 0 disables following.
    #[arg(short = 'L', long)]
    pub redirects: Option<u32>,

    /// Proxy address in host:port form.
    #[arg(short = 'x', long)]
    pub proxy: Option<String>,

    /// Proxy protocol.
    #[arg(long, default_value = "http", requires("proxy"))]
    pub proxy_type: ProxyType,

    /// Skip TLS certificate and host name verification.
    #[arg(short = 'k', long)]
    pub insecure: bool,

    /// User-Agent preset.
    #[arg(
        long,
        value_parser([
            PossibleValue::new("desktop"),
            PossibleValue::new("mobile"),
            PossibleValue::new("random"),
        ]),
        conflicts_with("user_agent")
    )]
    pub agent: Option<String>,

    /// Custom User-Agent string.
    #[arg(short = 'A', long)]
    pub user_agent: Option<String>,

    /// Cookie to send, as name=value. Repeat to send several in one header.
    #[arg(short = 'b', long = "cookie")]
    pub cookies: Vec<String>,

    /// Request a gzip/deflate encoded body (returned undecoded).
    #[arg(long)]
    pub compressed: bool,

    /// Extra request header line, as "Name: value".
    #[arg(short = 'H', long = "header")]
    pub headers: Vec<String>,

    /// Print the captured response header lines before the body.
    #[arg(short, long)]
    pub include: bool,

    /// Log level for application output.
    #[arg(
        long = "log",
        default_value = "off",
        value_parser([
            PossibleValue::new("debug"),
            PossibleValue::new("info"),
            PossibleValue::new("warn"),
            PossibleValue::new("error"),
            PossibleValue::new("trace"),
            PossibleValue::new("off"),
        ])
    )]
    pub log_level: String,
}

impl Cli {
    pub fn agent_preset(&self) -> Option<AgentPreset> {
        self.agent.as_deref().and_then(|name| name.parse().ok())
    }
}
