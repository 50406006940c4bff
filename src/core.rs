//! Main execution logic of the `solid-auth` binary

use std::io::Write;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::error::ErrorKind;
use clap::Parser;
use tracing::{debug, info};

use crate::auth::ReactiveAuthorization;
use crate::cli::{build_request, Args};
use crate::cli::process::parse_dpop_key;
use crate::client::{AuthorizationClient, HttpService, ReqwestService};
use crate::config::Config;
use crate::dpop::ProofKeyPair;
use crate::logging::init_logging;
use crate::message::Response;
use crate::session::{AnonymousSession, OpenIdSession, Session};
use crate::status::ExitStatus;

/// Main entry point for the CLI.
///
/// Parses arguments, loads configuration, and sends the request through an
/// [`AuthorizationClient`]. Ctrl+C aborts the request.
pub fn run(args: Vec<String>) -> ExitStatus {
    let parsed = match Args::try_parse_from(&args) {
        Ok(parsed) => parsed,
        Err(e) => {
            let _ = e.print();
            return match e.kind() {
                ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => ExitStatus::Success,
                _ => ExitStatus::Error,
            };
        }
    };

    init_logging(parsed.verbose, parsed.log_format.unwrap_or_default());

    let config = match Config::load() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Warning: Failed to load config: {}", e);
            Config::default()
        }
    };

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("solid-auth: error: failed to start runtime: {}", e);
            return ExitStatus::Error;
        }
    };

    runtime.block_on(async {
        tokio::select! {
            result = execute(&parsed, &config) => match result {
                Ok(status) => status,
                Err(e) => {
                    eprintln!("solid-auth: error: {:#}", e);
                    ExitStatus::Error
                }
            },
            _ = tokio::signal::ctrl_c() => {
                eprintln!("\nInterrupted");
                ExitStatus::Interrupted
            }
        }
    })
}

async fn execute(args: &Args, config: &Config) -> Result<ExitStatus> {
    let transport: Arc<dyn HttpService> = Arc::new(ReqwestService::shared());
    let session = build_session(args, config, transport.clone()).await?;
    let registry = Arc::new(ReactiveAuthorization::from_config(config, transport.clone()));
    let client = AuthorizationClient::new(transport, session, registry);

    let request = build_request(args)?;
    info!(method = %request.method(), uri = %request.uri(), "Sending request");
    let response = client.send(request).await?;

    print_response(&response, args.show_headers)?;
    Ok(ExitStatus::from_http_status(response.status().as_u16()))
}

async fn build_session(args: &Args, config: &Config, transport: Arc<dyn HttpService>) -> Result<Arc<dyn Session>> {
    let token = match (&args.id_token, &args.id_token_file) {
        (Some(token), _) => Some(token.as_str().trim().to_string()),
        (None, Some(path)) => Some(
            std::fs::read_to_string(path)
                .with_context(|| format!("failed to read ID token from {}", path.display()))?
                .trim()
                .to_string(),
        ),
        (None, None) => None,
    };

    let Some(token) = token else {
        debug!("No ID token given, using an anonymous session");
        return Ok(Arc::new(AnonymousSession::with_cache(&config.cache)));
    };

    let mut verification = config.verification().context("invalid [openid] configuration")?;
    for item in &args.dpop_keys {
        let (algorithm, path) = parse_dpop_key(item)?;
        let key = ProofKeyPair::from_pem_file(algorithm, &path)
            .with_context(|| format!("failed to load DPoP key {}", path.display()))?;
        verification.proof_key_pairs.push(key);
    }

    let session = OpenIdSession::builder(verification)
        .transport(transport)
        .cache(config.cache.clone())
        .id_token(&token)
        .await
        .context("ID token rejected")?;
    info!(session = %session.id(), "Using OpenID session");
    Ok(Arc::new(session))
}

fn print_response(response: &Response, show_headers: bool) -> Result<()> {
    let stdout = std::io::stdout();
    let mut out = stdout.lock();

    writeln!(out, "HTTP {}", response.status())?;

    if show_headers {
        for (name, value) in response.headers() {
            writeln!(out, "{}: {}", name, String::from_utf8_lossy(value.as_bytes()))?;
        }

        let wac_allow = response.wac_allow();
        for (audience, modes) in wac_allow.as_map() {
            let modes: Vec<&str> = modes.iter().map(String::as_str).collect();
            writeln!(out, "# access {}: {}", audience, modes.join(" "))?;
        }

        for link in response.links() {
            let target = link
                .resolve(response.uri())
                .map(|u| u.to_string())
                .unwrap_or_else(|_| link.uri().to_string());
            let rel = link.parameter("rel").unwrap_or("-");
            writeln!(out, "# link {} {}", rel, target)?;
        }

        for challenge in response.challenges() {
            writeln!(out, "# challenge {}", challenge)?;
        }
        writeln!(out)?;
    }

    out.write_all(response.body())?;
    if !response.body().is_empty() && !response.body().ends_with(b"\n") {
        writeln!(out)?;
    }
    out.flush()?;
    Ok(())
}
