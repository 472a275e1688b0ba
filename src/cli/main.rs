use std::io::Write;

use argument::Cli;
use clap::Parser;
#[cfg(feature = "color")]
use colored::Colorize;
#[cfg(feature = "log")]
use simplehttp::initialize_logging;
use simplehttp::{options, HttpRequestClient, OptionValue};

mod argument;

fn main() {
    if let Err(e) = run_application() {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

/// Collects the construction options: the config file first, then flags.
fn collect_options(cli: &Cli) -> anyhow::Result<Vec<(String, OptionValue)>> {
    let mut collected = match &cli.config {
        Some(path) => options::from_file(path)?,
        None => Vec::new(),
    };

    if let Some(redirects) = cli.redirects {
        collected.push(("redirects".to_owned(), redirects.into()));
    }
    if let Some(proxy) = &cli.proxy {
        collected.push(("proxy".to_owned(), proxy.as_str().into()));
    }
    if cli.insecure {
        collected.push(("ssl".to_owned(), false.into()));
    }
    if let Some(user_agent) = &cli.user_agent {
        collected.push(("useragent".to_owned(), user_agent.as_str().into()));
    }
    Ok(collected)
}

fn print_header_lines(out: &mut impl Write, headers: &[String]) -> std::io::Result<()> {
    for line in headers {
        #[cfg(feature = "color")]
        let line = match line.split_once(':') {
            Some((name, value)) if !line.starts_with("HTTP/") => {
                format!("{}:{}", name.cyan(), value)
            }
            _ => line.bold().to_string(),
        };
        writeln!(out, "{}", line)?;
    }
    Ok(())
}

fn run_application() -> anyhow::Result<()> {
    let cli = Cli::parse();

    #[cfg(feature = "log")]
    {
        let log_level = match cli.log_level.as_str() {
            "debug" => log::LevelFilter::Debug,
            "info" => log::LevelFilter::Info,
            "warn" => log::LevelFilter::Warn,
            "error" => log::LevelFilter::Error,
            "trace" => log::LevelFilter::Trace,
            _ => log::LevelFilter::Off,
        };
        initialize_logging(log_level)?;
    }

    let mut client = HttpRequestClient::with_options(collect_options(&cli)?)?;

    if let Some(proxy) = &cli.proxy {
        client.set_proxy_with_type(proxy.as_str(), cli.proxy_type);
    }
    if let Some(preset) = cli.agent_preset() {
        client.use_agent(preset);
    }
    if cli.compressed {
        client.request_compression();
    }
    if !cli.cookies.is_empty() {
        client.add_cookies(&cli.cookies);
    }
    for header in &cli.headers {
        client.add_header(header.as_str());
    }

    let response = if cli.data.is_empty() {
        client.get(&cli.url)?
    } else {
        client.post(&cli.url, cli.data.iter().map(|(k, v)| (k, v)))?
    };
    let (headers, body) = response.into_parts();

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    if cli.include {
        print_header_lines(&mut out, &headers)?;
    }
    out.write_all(&body)?;
    out.flush()?;
    Ok(())
}
