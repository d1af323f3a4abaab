//! Command-line definitions

use std::path::PathBuf;

use bakalari_api::{Endpoint, Method, RequestBody, RequestOptions};
use clap::{Args, Parser, Subcommand};
use serde_json::Value;

/// Bakalari school-information client
#[derive(Debug, Parser)]
#[command(name = "bakalari", version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file (default: CONFIG_PATH, then bakalari.toml)
    #[arg(short, long, global = true)]
    pub config: Option<String>,

    /// Force debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Log in and print the account identity
    Login,
    /// Print the server API version
    Version,
    /// Print the number of unread messages
    UnreadCount,
    /// Call a named endpoint or a raw path
    Request(RequestArgs),
    /// Download a message attachment
    Attachment {
        /// Attachment id
        id: String,
        /// Directory to write the file into
        #[arg(long, default_value = ".")]
        out: PathBuf,
    },
}

#[derive(Debug, Args)]
pub struct RequestArgs {
    /// Endpoint name (e.g. `marks`, `komens-unread`) or a path/URL
    #[arg(value_parser = parse_target)]
    pub target: Target,

    /// HTTP method (default: the endpoint's own, GET for paths)
    #[arg(short = 'X', long, value_parser = parse_method)]
    pub method: Option<Method>,

    /// Form body, `key=value&key2=value2`
    #[arg(short, long, value_parser = parse_form, conflicts_with = "json")]
    pub data: Option<FormData>,

    /// JSON body
    #[arg(long, value_parser = parse_json)]
    pub json: Option<Value>,

    /// Send without credentials
    #[arg(long)]
    pub unauth: bool,
}

impl RequestArgs {
    pub fn options(&self) -> RequestOptions {
        let body = match (&self.data, &self.json) {
            (Some(FormData(pairs)), _) => RequestBody::Form(pairs.clone()),
            (None, Some(value)) => RequestBody::Json(value.clone()),
            (None, None) => RequestBody::None,
        };
        RequestOptions {
            query: Vec::new(),
            body,
        }
    }
}

/// What `request` should call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    Endpoint(Endpoint),
    Path(String),
}

/// Parsed `--data` pairs, kept whole so clap treats them as one value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormData(pub Vec<(String, String)>);

fn parse_target(raw: &str) -> Result<Target, String> {
    Ok(match raw.parse::<Endpoint>() {
        Ok(endpoint) => Target::Endpoint(endpoint),
        Err(_) => Target::Path(raw.to_string()),
    })
}

fn parse_method(raw: &str) -> Result<Method, String> {
    Method::from_bytes(raw.to_ascii_uppercase().as_bytes())
        .map_err(|e| format!("invalid HTTP method {raw}: {e}"))
}

fn parse_json(raw: &str) -> Result<Value, String> {
    serde_json::from_str(raw).map_err(|e| format!("invalid JSON: {e}"))
}

/// `a=1&b=2` into pairs. Values are taken literally.
fn parse_form(raw: &str) -> Result<FormData, String> {
    raw.split('&')
        .filter(|pair| !pair.is_empty())
        .map(|pair| {
            pair.split_once('=')
                .map(|(key, value)| (key.to_string(), value.to_string()))
                .ok_or_else(|| format!("form field without '=': {pair}"))
        })
        .collect::<Result<Vec<_>, _>>()
        .map(FormData)
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    fn parse(args: &[&str]) -> Result<Cli, clap::Error> {
        Cli::try_parse_from(std::iter::once("bakalari").chain(args.iter().copied()))
    }

    #[test]
    fn command_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn global_flags_anywhere() {
        let cli = parse(&["version", "--config", "/etc/b.toml", "-v"]).unwrap();
        assert!(matches!(cli.command, Command::Version));
        assert_eq!(cli.config.as_deref(), Some("/etc/b.toml"));
        assert!(cli.verbose);
    }

    #[test]
    fn subcommands_are_kebab_case() {
        let cli = parse(&["unread-count"]).unwrap();
        assert!(matches!(cli.command, Command::UnreadCount));
        assert!(cli.config.is_none());
        assert!(!cli.verbose);
    }

    #[test]
    fn request_named_endpoint_with_form() {
        let cli = parse(&["request", "komens-unread", "-d", "from=2024-01-01&to=2024-06-30"])
            .unwrap();
        let Command::Request(args) = cli.command else {
            panic!("expected request command");
        };
        assert_eq!(args.target, Target::Endpoint(Endpoint::KomensUnread));
        assert!(args.method.is_none());
        assert!(!args.unauth);
        let RequestBody::Form(pairs) = args.options().body else {
            panic!("expected form body");
        };
        assert_eq!(pairs[0], ("from".to_string(), "2024-01-01".to_string()));
        assert_eq!(pairs[1], ("to".to_string(), "2024-06-30".to_string()));
    }

    #[test]
    fn request_raw_path_with_json_and_method() {
        let cli = parse(&[
            "request",
            "/api/3/homeworks",
            "-X",
            "post",
            "--json",
            r#"{"from":"2024-01-01"}"#,
            "--unauth",
        ])
        .unwrap();
        let Command::Request(args) = cli.command else {
            panic!("expected request command");
        };
        assert_eq!(args.target, Target::Path("/api/3/homeworks".into()));
        assert_eq!(args.method, Some(Method::POST));
        assert!(args.unauth);
        assert!(matches!(args.options().body, RequestBody::Json(ref v) if v["from"] == "2024-01-01"));
    }

    #[test]
    fn attachment_defaults_to_current_dir() {
        let cli = parse(&["attachment", "abc123"]).unwrap();
        let Command::Attachment { id, out } = cli.command else {
            panic!("expected attachment command");
        };
        assert_eq!(id, "abc123");
        assert_eq!(out, PathBuf::from("."));
    }

    #[test]
    fn invalid_arguments_are_rejected() {
        assert!(parse(&[]).is_err());
        assert!(parse(&["request"]).is_err());
        assert!(parse(&["frobnicate"]).is_err());
        assert!(parse(&["version", "--bogus"]).is_err());
        assert!(parse(&["version", "--config"]).is_err());
        assert!(parse(&["request", "marks", "-d", "novalue"]).is_err());
        assert!(parse(&["request", "marks", "--json", "{"]).is_err());
        assert!(parse(&["request", "marks", "-d", "a=1", "--json", "{}"]).is_err());
        assert!(parse(&["login", "extra"]).is_err());
    }

    #[test]
    fn form_parser_skips_empty_pairs() {
        assert_eq!(
            parse_form("a=1&&b=").unwrap(),
            FormData(vec![("a".into(), "1".into()), ("b".into(), String::new())])
        );
    }
}
