use chrono::NaiveDate;
use clap::Parser;
use std::env;

use crate::cli::command::Command;
use crate::source::http::DEFAULT_BASE_URL;

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Ingest a card catalog into local records and a fuzzy name index",
    long_about = "Fetches sets, cards and rulings from a Scryfall-compatible API, stores them in SQLite and builds a trigram index for fuzzy name search. Without a subcommand it runs as a daemon serving the REST API and re-ingesting periodically.",
    subcommand_required = false,
    arg_required_else_help = false
)]
pub struct Cli {
    #[arg(
        long,
        env = "CARDINDEX_DATA_DIR",
        default_value = ".cardindex/",
        value_name = "DIR",
        help = "Directory to store persistent data"
    )]
    pub data_dir: String,

    #[arg(
        long,
        env = "CARDINDEX_SOURCE_URL",
        default_value = DEFAULT_BASE_URL,
        value_name = "URL",
        help = "Base URL of the catalog API"
    )]
    pub source_url: String,

    #[arg(
        long,
        env = "CARDINDEX_USER_AGENT",
        default_value = concat!("cardindex/", env!("CARGO_PKG_VERSION")),
        value_name = "UA",
        help = "User-Agent sent to the catalog API"
    )]
    pub user_agent: String,

    #[arg(
        long,
        default_value_t = 30u64,
        value_name = "SECS",
        help = "Timeout for a single request to the catalog API"
    )]
    pub request_timeout_secs: u64,

    #[arg(
        long,
        default_value_t = false,
        help = "Reset all persisted state (delete the SQLite database) before starting"
    )]
    pub reset: bool,

    #[arg(
        long = "log-file",
        env = "CARDINDEX_LOG_FILE",
        value_name = "PATH",
        help = "Write logs to PATH (in addition to stderr)"
    )]
    pub log_file: Option<String>,

    #[arg(
        long = "api-listen",
        env = "CARDINDEX_API_LISTEN",
        value_name = "ADDR",
        default_value = "127.0.0.1:8084",
        help = "REST API listen address (host:port)"
    )]
    pub api_listen: std::net::SocketAddr,

    #[arg(
        long,
        default_value_t = 4usize,
        value_name = "N",
        help = "Maximum concurrent requests against the catalog API"
    )]
    pub permits: usize,

    #[arg(
        long,
        default_value_t = 100u64,
        value_name = "MS",
        help = "Minimum delay between two requests to the catalog API"
    )]
    pub min_interval_ms: u64,

    #[arg(
        short = 'w',
        long,
        default_value_t = 4usize,
        value_name = "N",
        help = "Number of sets processed concurrently"
    )]
    pub workers: usize,

    #[arg(
        long,
        default_value_t = false,
        help = "Hold back new sets while process memory is above --memory-threshold-mb"
    )]
    pub memory_throttling: bool,

    #[arg(
        long,
        default_value_t = 2048u64,
        value_name = "MB",
        help = "Resident memory above which dispatch pauses"
    )]
    pub memory_threshold_mb: u64,

    #[arg(long, default_value_t = false, help = "Skip the rulings dataset")]
    pub no_rulings: bool,

    #[arg(
        long,
        default_value_t = false,
        help = "Only store set records; do not fetch cards"
    )]
    pub sets_only: bool,

    #[arg(
        long,
        default_value_t = false,
        help = "Download card images and set icons into the blob store"
    )]
    pub images: bool,

    #[arg(
        long,
        value_delimiter = ',',
        default_value = "normal",
        value_name = "KINDS",
        help = "Comma separated image kinds to download (normal, large, png, art_crop, ...)"
    )]
    pub image_kinds: Vec<String>,

    #[arg(
        short = 's',
        long = "set",
        value_delimiter = ',',
        value_name = "CODES",
        help = "Only ingest these set codes (repeatable or comma separated)"
    )]
    pub sets: Vec<String>,

    #[arg(
        long,
        value_name = "YYYY-MM-DD",
        help = "Skip sets released before this date"
    )]
    pub released_after: Option<NaiveDate>,

    #[arg(
        long,
        default_value_t = 1000u64,
        value_name = "MS",
        help = "How often progress is reported and memory re-checked"
    )]
    pub refresh_cadence_ms: u64,

    #[arg(
        long,
        env = "CARDINDEX_REFRESH_INTERVAL_SECS",
        default_value_t = 86_400u64,
        value_name = "SECS",
        help = "Daemon mode: seconds between two ingestion runs"
    )]
    pub refresh_interval_secs: u64,

    #[command(subcommand)]
    pub cmd: Option<Command>,
}

pub fn parse() -> Cli {
    let dotenv_path = env::var("DOTENV_PATH").unwrap_or(".env".into());
    dotenvy::from_filename(&dotenv_path).ok();

    Cli::parse()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_parse() {
        let cli = Cli::try_parse_from(["cardindex"]).unwrap();
        assert_eq!(cli.workers, 4);
        assert_eq!(cli.image_kinds, vec!["normal"]);
        assert!(cli.sets.is_empty());
        assert!(cli.cmd.is_none());
    }

    #[test]
    fn set_codes_accept_lists_and_repeats() {
        let cli = Cli::try_parse_from([
            "cardindex",
            "--set",
            "lea,leb",
            "-s",
            "2ed",
            "--released-after",
            "1995-01-01",
            "ingest",
        ])
        .unwrap();
        assert_eq!(cli.sets, vec!["lea", "leb", "2ed"]);
        assert_eq!(cli.released_after, NaiveDate::from_ymd_opt(1995, 1, 1));
        assert!(matches!(
            cli.cmd,
            Some(Command::Ingest {
                retry_failed: false
            })
        ));

        let cli = Cli::try_parse_from(["cardindex", "ingest", "--retry-failed"]).unwrap();
        assert!(matches!(
            cli.cmd,
            Some(Command::Ingest { retry_failed: true })
        ));
    }

    #[test]
    fn search_takes_a_query() {
        let cli = Cli::try_parse_from(["cardindex", "search", "black lotus", "--limit", "3"]).unwrap();
        match cli.cmd {
            Some(Command::Search { query, limit }) => {
                assert_eq!(query, "black lotus");
                assert_eq!(limit, 3);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }
}
