//! rawhttp: send one HTTP/1.1 request and print what came back.
//!
//! ```text
//! rawhttp GET https://example.com/ -H "Accept: */*"
//! rawhttp POST http://localhost:8080/form --data "a=1&b=2" --no-redirect
//! ```
//!
//! The status line and headers go to stderr, the body to stdout, so the body
//! can be piped.

use std::io::Write;
use std::path::PathBuf;

use clap::Parser;
use http::Method;
use tokio_util::sync::CancellationToken;

use rawhttp::config::loader::load_config;
use rawhttp::observability::logging::init_logging;
use rawhttp::{Engine, EngineConfig, HttpRequest, HttpResponse, HttpVersion, RequestBody};

#[derive(Parser)]
#[command(name = "rawhttp")]
#[command(about = "Send a raw HTTP/1.1 request and print the response", long_about = None)]
struct Cli {
    /// Request method, e.g. GET
    method: String,

    /// Absolute http:// or https:// URL
    url: String,

    /// Extra header as "Name: value" (repeatable, sent in order)
    #[arg(short = 'H', long = "header")]
    headers: Vec<String>,

    /// Request body sent as application/x-www-form-urlencoded unless a
    /// Content-Type header is given
    #[arg(short, long)]
    data: Option<String>,

    /// TOML engine configuration
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Write the absolute URI in the request line
    #[arg(long)]
    absolute_uri: bool,

    /// Do not follow redirects
    #[arg(long)]
    no_redirect: bool,

    /// Print only the status line and headers
    #[arg(long)]
    headers_only: bool,

    /// Protocol version for the request line
    #[arg(long, default_value = "1.1")]
    http_version: HttpVersion,

    /// Print the response as a JSON document
    #[arg(long)]
    json: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let config = engine_config(&cli)?;
    if let Err(e) = init_logging(&config.observability) {
        eprintln!("Logging unavailable: {}", e);
    }

    let engine = Engine::new(config)?;
    let mut request = build_request(&cli)?;

    let cancel = CancellationToken::new();
    let ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            ctrl_c.cancel();
        }
    });

    let response = engine.send(&mut request, &cancel).await?;
    tracing::info!(
        status = response.status.as_u16(),
        redirects = response.redirects,
        uri = %response.uri,
        "Response received"
    );

    if cli.json {
        print_json(response, cli.headers_only).await
    } else {
        print_raw(response, cli.headers_only).await
    }
}

/// Engine configuration from the config file, with the command line's
/// overrides applied.
fn engine_config(cli: &Cli) -> Result<EngineConfig, Box<dyn std::error::Error>> {
    let mut config = match &cli.config {
        Some(path) => load_config(path)?,
        None => EngineConfig::default(),
    };
    if cli.no_redirect {
        config.redirects.allow_auto_redirect = false;
    }
    // The body is never printed, so leave it unread on the wire.
    if cli.headers_only {
        config.response.read_content = false;
    }
    Ok(config)
}

fn build_request(cli: &Cli) -> Result<HttpRequest, Box<dyn std::error::Error>> {
    let method = Method::from_bytes(cli.method.to_uppercase().as_bytes())?;
    let uri = url::Url::parse(&cli.url)?;
    let mut request = HttpRequest::new(method, uri).with_version(cli.http_version);
    request.absolute_uri_in_first_line = cli.absolute_uri;

    for header in &cli.headers {
        let (name, value) = header
            .split_once(':')
            .ok_or_else(|| format!("header {:?} is not in \"Name: value\" form", header))?;
        request.add_header(name.trim(), value.trim());
    }

    if let Some(data) = &cli.data {
        let content_type = request
            .headers
            .get("Content-Type")
            .unwrap_or("application/x-www-form-urlencoded")
            .to_string();
        request.body = Some(RequestBody::text(data.clone(), content_type));
    }

    Ok(request)
}

async fn print_raw(response: HttpResponse, headers_only: bool) -> Result<(), Box<dyn std::error::Error>> {
    eprintln!("HTTP/{} {} {}", response.version, response.status.as_u16(), response.reason);
    for (name, value) in response.headers.iter().chain(response.content_headers.iter()) {
        eprintln!("{}: {}", name, value);
    }
    if headers_only {
        return Ok(());
    }

    let body = response.into_bytes().await?;
    let mut stdout = std::io::stdout().lock();
    stdout.write_all(&body)?;
    stdout.flush()?;
    Ok(())
}

async fn print_json(response: HttpResponse, headers_only: bool) -> Result<(), Box<dyn std::error::Error>> {
    let headers: Vec<serde_json::Value> = response
        .headers
        .iter()
        .chain(response.content_headers.iter())
        .map(|(name, value)| serde_json::json!([name, value]))
        .collect();
    let mut document = serde_json::json!({
        "version": response.version.to_string(),
        "status": response.status.as_u16(),
        "reason": response.reason.clone(),
        "uri": response.uri.as_str(),
        "method": response.method.as_str(),
        "redirects": response.redirects,
        "decompression_failed": response.decompression_failed,
        "headers": headers,
    });
    if !headers_only {
        let body = response.into_bytes().await?;
        document["body"] = serde_json::Value::String(String::from_utf8_lossy(&body).into_owned());
    }
    println!("{}", serde_json::to_string_pretty(&document)?);
    Ok(())
}
