use clap::{Parser, Subcommand, ValueEnum};
use std::fmt::{Display, Formatter};
use std::path::PathBuf;

pub const DATABASE_DSN_ENV: &str = "BURROW_DATABASE_DSN";
pub const FILE_STORAGE_PATH_ENV: &str = "BURROW_FILE_STORAGE_PATH";
pub const CODE_LENGTH_ENV: &str = "BURROW_CODE_LENGTH";
pub const MAX_CONNECTIONS_ENV: &str = "BURROW_MAX_CONNECTIONS";
pub const LOG_FORMAT_ENV: &str = "BURROW_LOG_FORMAT";

pub const DEFAULT_CODE_LENGTH: u8 = 7;
pub const DEFAULT_MAX_CONNECTIONS: u32 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Text,
    Json,
}

impl Display for LogFormat {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            LogFormat::Text => write!(f, "text"),
            LogFormat::Json => write!(f, "json"),
        }
    }
}

#[derive(Debug, Parser)]
#[command(name = "burrow", about = "Shorten and resolve URLs")]
pub struct CLI {
    /// PostgreSQL connection string; takes precedence over file storage.
    #[arg(long, env = DATABASE_DSN_ENV)]
    pub database_dsn: Option<String>,

    /// Record log path; the counter log is written next to it.
    #[arg(long, env = FILE_STORAGE_PATH_ENV)]
    pub file_storage_path: Option<PathBuf>,

    /// 11 base58 digits cover every u64.
    #[arg(
        long,
        env = CODE_LENGTH_ENV,
        default_value_t = DEFAULT_CODE_LENGTH,
        value_parser = clap::value_parser!(u8).range(3..=11),
    )]
    pub code_length: u8,

    #[arg(long, env = MAX_CONNECTIONS_ENV, default_value_t = DEFAULT_MAX_CONNECTIONS)]
    pub max_connections: u32,

    #[arg(long, env = LOG_FORMAT_ENV, value_enum, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Shorten one URL and print its code.
    Shorten { url: String },
    /// Shorten several URLs in one unit of work.
    Batch {
        /// Fail instead of falling back to best-effort writes.
        #[arg(long)]
        require_atomic: bool,
        #[arg(required = true)]
        urls: Vec<String>,
    },
    /// Print the URL stored under a code.
    Resolve { code: String },
    /// Print the code of an already shortened URL.
    Lookup { url: String },
    /// Check that the storage backend responds.
    Ping,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_batch_with_flags() {
        let cli = CLI::try_parse_from([
            "burrow",
            "--file-storage-path",
            "/tmp/urls.jsonl",
            "--log-format",
            "json",
            "batch",
            "--require-atomic",
            "https://a.example",
            "https://b.example",
        ])
        .unwrap();

        assert_eq!(cli.log_format, LogFormat::Json);
        assert_eq!(cli.code_length, DEFAULT_CODE_LENGTH);
        assert!(matches!(
            cli.command,
            Command::Batch { require_atomic: true, ref urls } if urls.len() == 2
        ));
    }

    #[test]
    fn rejects_code_length_out_of_range() {
        assert!(CLI::try_parse_from(["burrow", "--code-length", "2", "ping"]).is_err());
        assert!(CLI::try_parse_from(["burrow", "--code-length", "12", "ping"]).is_err());
    }
}
