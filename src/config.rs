//! Command-line surface and the immutable `Config` it resolves to.

use std::path::PathBuf;

use clap::Parser;

use crate::error::{Error, Result};

/// Default plaintext IMAP port.
pub const DEFAULT_PORT_PLAIN: u16 = 143;
/// Default implicit-TLS IMAP port.
pub const DEFAULT_PORT_TLS: u16 = 993;
/// Default trust directory consulted when `-T` is given without `-c`/`-C`.
pub const DEFAULT_TRUST_DIR: &str = "/etc/ssl/certs";
/// Default mailbox name when `-b` is omitted.
pub const DEFAULT_MAILBOX: &str = "INBOX";

#[derive(Parser, Debug)]
#[command(
    name = "imap-fetch",
    about = "Single-shot IMAP4rev1 mail retrieval client",
    disable_help_flag = true
)]
struct Cli {
    /// IMAP server address
    server: String,

    /// Server port (default 143, or 993 with -T)
    #[arg(short = 'p')]
    port: Option<u16>,

    /// Use TLS (implicit, from the first byte)
    #[arg(short = 'T')]
    tls: bool,

    /// TLS trust anchor file (requires -T)
    #[arg(short = 'c')]
    trust_file: Option<PathBuf>,

    /// TLS trust anchor directory (requires -T; default /etc/ssl/certs)
    #[arg(short = 'C')]
    trust_dir: Option<PathBuf>,

    /// Only download messages flagged as NEW
    #[arg(short = 'n')]
    only_new: bool,

    /// Only download message headers
    #[arg(short = 'h')]
    headers_only: bool,

    /// Path to the authentication file
    #[arg(short = 'a')]
    auth_file: PathBuf,

    /// Mailbox name
    #[arg(short = 'b')]
    mailbox: Option<String>,

    /// Output directory for the local mirror
    #[arg(short = 'o')]
    output_dir: PathBuf,

    /// Print help
    #[arg(long = "help", action = clap::ArgAction::Help)]
    help: Option<bool>,
}

/// Resolved, immutable configuration for one run.
#[derive(Debug, Clone)]
pub struct Config {
    pub server: String,
    pub port: u16,
    pub use_tls: bool,
    pub trust_file: Option<PathBuf>,
    pub trust_dir: PathBuf,
    pub only_new: bool,
    pub headers_only: bool,
    pub auth_file: PathBuf,
    pub mailbox: String,
    pub output_dir: PathBuf,
}

impl Config {
    /// Parse `argv` (as given, including the program name) into a validated `Config`.
    pub fn parse_from<I, T>(args: I) -> Result<Config>
    where
        I: IntoIterator<Item = T>,
        T: Into<std::ffi::OsString> + Clone,
    {
        let cli = Cli::try_parse_from(args).map_err(|e| Error::Argument(e.to_string()))?;
        Config::from_cli(cli)
    }

    fn from_cli(cli: Cli) -> Result<Config> {
        if let Some(port) = cli.port {
            if port == 0 {
                return Err(Error::Argument(
                    "port 0 is not a valid server port".to_string(),
                ));
            }
        }

        if cli.trust_file.is_some() && !cli.tls {
            return Err(Error::Argument("-c requires -T".to_string()));
        }
        if cli.trust_dir.is_some() && !cli.tls {
            return Err(Error::Argument("-C requires -T".to_string()));
        }

        let port = cli.port.unwrap_or(if cli.tls {
            DEFAULT_PORT_TLS
        } else {
            DEFAULT_PORT_PLAIN
        });

        let trust_dir = cli
            .trust_dir
            .unwrap_or_else(|| PathBuf::from(DEFAULT_TRUST_DIR));

        Ok(Config {
            server: cli.server,
            port,
            use_tls: cli.tls,
            trust_file: cli.trust_file,
            trust_dir,
            only_new: cli.only_new,
            headers_only: cli.headers_only,
            auth_file: cli.auth_file,
            mailbox: cli.mailbox.unwrap_or_else(|| DEFAULT_MAILBOX.to_string()),
            output_dir: cli.output_dir,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(extra: &[&str]) -> Vec<String> {
        let mut v = vec![
            "imap-fetch".to_string(),
            "server_address".to_string(),
            "-a".to_string(),
            "auth_file".to_string(),
            "-o".to_string(),
            "output_dir".to_string(),
        ];
        v.extend(extra.iter().map(|s| s.to_string()));
        v
    }

    #[test]
    fn parses_mandatory_arguments() {
        let config = Config::parse_from(args(&[])).unwrap();
        assert_eq!(config.server, "server_address");
        assert_eq!(config.auth_file, PathBuf::from("auth_file"));
        assert_eq!(config.output_dir, PathBuf::from("output_dir"));
        assert_eq!(config.mailbox, "INBOX");
        assert_eq!(config.port, DEFAULT_PORT_PLAIN);
        assert!(!config.use_tls);
    }

    #[test]
    fn parses_optional_arguments() {
        let config = Config::parse_from(args(&[
            "-p", "1234", "-T", "-c", "cert_file", "-C", "cert_dir", "-n", "-h", "-b", "mailbox",
        ]))
        .unwrap();
        assert_eq!(config.port, 1234);
        assert!(config.use_tls);
        assert_eq!(config.trust_file, Some(PathBuf::from("cert_file")));
        assert_eq!(config.trust_dir, PathBuf::from("cert_dir"));
        assert!(config.only_new);
        assert!(config.headers_only);
        assert_eq!(config.mailbox, "mailbox");
    }

    #[test]
    fn errors_on_missing_mandatory_arguments() {
        let result = Config::parse_from(vec!["imap-fetch".to_string(), "server_address".to_string()]);
        assert!(result.is_err());
    }

    #[test]
    fn errors_on_out_of_range_port() {
        let result = Config::parse_from(args(&["-p", "70000"]));
        assert!(result.is_err());
    }

    #[test]
    fn errors_on_zero_port() {
        let result = Config::parse_from(args(&["-p", "0"]));
        assert!(matches!(result, Err(Error::Argument(_))));
    }

    #[test]
    fn default_port_depends_on_tls() {
        let config = Config::parse_from(args(&["-T"])).unwrap();
        assert_eq!(config.port, DEFAULT_PORT_TLS);

        let config = Config::parse_from(args(&[])).unwrap();
        assert_eq!(config.port, DEFAULT_PORT_PLAIN);
    }

    #[test]
    fn trust_file_requires_tls() {
        let result = Config::parse_from(args(&["-c", "cert_file"]));
        assert!(matches!(result, Err(Error::Argument(_))));
    }

    #[test]
    fn trust_dir_defaults_when_tls_enabled_without_explicit_dir() {
        let config = Config::parse_from(args(&["-T"])).unwrap();
        assert_eq!(config.trust_dir, PathBuf::from(DEFAULT_TRUST_DIR));
    }
}
