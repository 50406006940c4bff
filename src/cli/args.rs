//! CLI argument definitions using clap

use clap::{ArgAction, Parser, ValueEnum};
use std::fmt;
use std::path::PathBuf;

/// A string that redacts its value in Debug output to prevent credential leakage
#[derive(Clone, Default)]
pub struct SecretString(pub String);

impl SecretString {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Debug for SecretString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            write!(f, "SecretString(\"\")")
        } else {
            write!(f, "SecretString(\"[REDACTED]\")")
        }
    }
}

impl std::str::FromStr for SecretString {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(SecretString(s.to_string()))
    }
}

/// Send one request to a Solid server, answering authentication
/// challenges on the way.
#[derive(Parser, Debug, Clone)]
#[command(name = "solid-auth", version, about)]
pub struct Args {
    /// Optional HTTP method (default GET) followed by the URL
    #[arg(value_name = "[METHOD] URL", num_args = 1..=2, required = true)]
    pub request: Vec<String>,

    /// Request header, e.g. -H 'Accept: text/turtle'. Repeatable
    #[arg(short = 'H', long = "header", value_name = "NAME: VALUE")]
    pub headers: Vec<String>,

    /// Request body
    #[arg(short = 'd', long = "data", value_name = "BODY")]
    pub data: Option<String>,

    /// OpenID Connect ID token identifying the user
    #[arg(long = "id-token", value_name = "TOKEN", env = "SOLID_ID_TOKEN", conflicts_with = "id_token_file")]
    pub id_token: Option<SecretString>,

    /// File holding the ID token
    #[arg(long = "id-token-file", value_name = "PATH")]
    pub id_token_file: Option<PathBuf>,

    /// DPoP key as ALGORITHM=PKCS8_PEM_PATH, e.g. ES256=key.pem. Repeatable
    #[arg(long = "dpop-key", value_name = "ALG=PEM")]
    pub dpop_keys: Vec<String>,

    /// Request timeout in seconds
    #[arg(long = "timeout", value_name = "SECONDS")]
    pub timeout: Option<u64>,

    /// Print response headers, WAC-Allow and Link relations
    #[arg(long = "show-headers", action = ArgAction::SetTrue)]
    pub show_headers: bool,

    /// Verbose logging. Use -vv for trace output
    #[arg(short = 'v', long = "verbose", action = ArgAction::Count)]
    pub verbose: u8,

    /// Log output format
    #[arg(long = "log-format", value_name = "FORMAT", value_enum)]
    pub log_format: Option<LogFormat>,
}

/// Log format for structured output
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    /// Plain text output (default)
    #[default]
    Text,
    /// JSON Lines format for parsing
    Json,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_only() {
        let args = Args::try_parse_from(["solid-auth", "https://pod.example/doc"]).unwrap();
        assert_eq!(args.request, vec!["https://pod.example/doc"]);
        assert_eq!(args.verbose, 0);
        assert!(args.log_format.is_none());
    }

    #[test]
    fn test_full_invocation() {
        let args = Args::try_parse_from([
            "solid-auth",
            "PUT",
            "https://pod.example/doc",
            "-H",
            "Content-Type: text/turtle",
            "-d",
            "<#a> <#b> <#c> .",
            "--id-token",
            "eyJ.payload.sig",
            "--dpop-key",
            "ES256=key.pem",
            "-vv",
            "--log-format",
            "json",
            "--show-headers",
        ])
        .unwrap();

        assert_eq!(args.request, vec!["PUT", "https://pod.example/doc"]);
        assert_eq!(args.headers, vec!["Content-Type: text/turtle"]);
        assert_eq!(args.id_token.as_ref().unwrap().as_str(), "eyJ.payload.sig");
        assert_eq!(args.dpop_keys, vec!["ES256=key.pem"]);
        assert_eq!(args.verbose, 2);
        assert_eq!(args.log_format, Some(LogFormat::Json));
        assert!(args.show_headers);
    }

    #[test]
    fn test_token_sources_conflict() {
        let result = Args::try_parse_from([
            "solid-auth",
            "https://pod.example/doc",
            "--id-token",
            "t",
            "--id-token-file",
            "token.jwt",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn test_secret_is_redacted() {
        let secret: SecretString = "hunter2".parse().unwrap();
        assert_eq!(format!("{:?}", secret), "SecretString(\"[REDACTED]\")");
    }
}
