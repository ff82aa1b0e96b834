use std::time::Duration;

use crate::configuration::{BulkProcessingConfiguration, Configuration};

const BYTES_PER_MB: u64 = 1024 * 1024;

pub struct Context {
    pub config: Configuration,
}

impl Context {
    pub fn from_cli(cli: &crate::cli::Cli) -> Self {
        let ingest = BulkProcessingConfiguration {
            memory_throttling: cli.memory_throttling,
            process_rulings: !cli.no_rulings,
            sets_only: cli.sets_only,
            set_codes: cli.sets.iter().map(|c| c.trim().to_lowercase()).filter(|c| !c.is_empty()).collect(),
            released_after: cli.released_after,
            refresh_cadence: Duration::from_millis(cli.refresh_cadence_ms.max(1)),
            download_images: cli.images,
            image_kinds: cli.image_kinds.clone(),
            workers: cli.workers.max(1),
        };
        let cfg = Configuration {
            data_dir: cli.data_dir.clone(),
            source_url: cli.source_url.clone(),
            user_agent: cli.user_agent.clone(),
            request_timeout: Duration::from_secs(cli.request_timeout_secs),
            api_listen: cli.api_listen,
            log_file: cli.log_file.clone(),
            reset: cli.reset,
            permits: cli.permits.max(1),
            min_interval: Duration::from_millis(cli.min_interval_ms),
            memory_threshold_bytes: cli.memory_threshold_mb.saturating_mul(BYTES_PER_MB),
            refresh_interval: Duration::from_secs(cli.refresh_interval_secs.max(1)),
            ingest,
        };
        Self { config: cfg }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    use crate::cli::Cli;

    #[test]
    fn flags_map_onto_run_configuration() {
        let cli = Cli::try_parse_from([
            "cardindex",
            "--data-dir",
            "/tmp/ci",
            "--no-rulings",
            "--images",
            "--image-kinds",
            "large,png",
            "--set",
            " LEA ,leb",
            "--memory-throttling",
            "--memory-threshold-mb",
            "3",
            "--workers",
            "0",
        ])
        .unwrap();

        let ctx = Context::from_cli(&cli);
        let ingest = &ctx.config.ingest;

        assert!(!ingest.process_rulings);
        assert!(ingest.download_images);
        assert!(ingest.memory_throttling);
        assert_eq!(ingest.image_kinds, vec!["large", "png"]);
        assert_eq!(ingest.set_codes, vec!["lea", "leb"]);
        assert_eq!(ingest.workers, 1);
        assert_eq!(ctx.config.memory_threshold_bytes, 3 * 1024 * 1024);
        assert_eq!(
            ctx.config.db_path(),
            std::path::Path::new("/tmp/ci").join("cardindex.sqlite")
        );
        assert_eq!(ctx.config.blob_dir(), std::path::Path::new("/tmp/ci").join("blobs"));
    }
}
