use crate::{
    cli::{self, Command},
    configuration::{BulkProcessingConfiguration, Configuration},
    context,
    orchestrator::BulkIngestionOrchestrator,
    processor::Collaborators,
    progress::{LogProgressSink, Progress},
    ratelimit::RateLimiter,
    report::RunReport,
    rest,
    source::{http::ScryfallSource, CatalogSource},
    storage::{self, FileBlobStore, ReportStore, StorageRead},
    throttle::MemoryThrottle,
    trigram,
};
use anyhow::{bail, Context as AnyhowContext, Result};
use std::path::Path;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Everything one ingestion run needs, shared between the one-shot command
/// and the daemon loop.
#[derive(Clone)]
pub struct Pipeline {
    storage: storage::SqliteStorage,
    blobs: FileBlobStore,
    source: Arc<dyn CatalogSource>,
    limiter: Arc<RateLimiter>,
    memory_threshold_bytes: u64,
    ingest: BulkProcessingConfiguration,
}

impl Pipeline {
    pub fn new(
        config: &Configuration,
        storage: storage::SqliteStorage,
        blobs: FileBlobStore,
        source: Arc<dyn CatalogSource>,
    ) -> Self {
        let limiter = RateLimiter::new(config.permits).with_min_interval(config.min_interval);
        Self {
            storage,
            blobs,
            source,
            limiter: Arc::new(limiter),
            memory_threshold_bytes: config.memory_threshold_bytes,
            ingest: config.ingest.clone(),
        }
    }

    /// Runs one ingestion and persists its report, including partial reports
    /// of cancelled runs.
    pub async fn run_once(&self, cancel: &CancellationToken) -> Result<RunReport> {
        self.run_with(self.ingest.clone(), cancel).await
    }

    pub async fn run_with(
        &self,
        ingest: BulkProcessingConfiguration,
        cancel: &CancellationToken,
    ) -> Result<RunReport> {
        let collaborators = Collaborators {
            source: self.source.clone(),
            catalog: Arc::new(self.storage.clone()),
            index: Arc::new(self.storage.clone()),
            blobs: Arc::new(self.blobs.clone()),
        };

        let mut orchestrator = BulkIngestionOrchestrator::new(collaborators, self.limiter.clone())
            .with_progress(Progress::new(Arc::new(LogProgressSink)));
        if ingest.memory_throttling {
            orchestrator = orchestrator.with_throttle(MemoryThrottle::new(self.memory_threshold_bytes));
        }

        let report = orchestrator
            .run(ingest, cancel)
            .await
            .context("ingestion run aborted")?;

        self.storage
            .save_report(&report)
            .context("saving run report")?;
        Ok(report)
    }
}

/// The main application state.
/// Decoupled from CLI parsing so tests can inject storage and source.
pub struct App {
    config: Configuration,
    storage: storage::SqliteStorage,
    pipeline: Pipeline,
    shutdown: CancellationToken,
}

impl App {
    /// Builds the App from CLI arguments: log file, storage and HTTP client.
    pub fn from_cli() -> Result<(App, cli::Cli)> {
        let cli = crate::cli::parse();

        crate::tracing::set_log_file(cli.log_file.as_deref().map(Path::new))
            .context("opening log file")?;

        let ctx = context::Context::from_cli(&cli);
        log_startup_info(&ctx.config);

        let storage = init_storage(&ctx.config, ctx.config.reset)?;
        let blobs = FileBlobStore::new(ctx.config.blob_dir());

        let source = ScryfallSource::new(
            &ctx.config.source_url,
            &ctx.config.user_agent,
            ctx.config.request_timeout,
        )
        .context("building catalog source client")?;

        let pipeline = Pipeline::new(&ctx.config, storage.clone(), blobs, Arc::new(source));
        Ok((App::new(ctx.config, storage, pipeline), cli))
    }

    fn new(config: Configuration, storage: storage::SqliteStorage, pipeline: Pipeline) -> Self {
        Self {
            config,
            storage,
            pipeline,
            shutdown: CancellationToken::new(),
        }
    }

    /// One ingestion, report printed as JSON on stdout. Ctrl-C cancels the
    /// run; the partial report is still saved and printed.
    ///
    /// With `retry_failed` the run is restricted to the last saved report's
    /// retry codes.
    pub async fn run_ingest(&self, retry_failed: bool) -> Result<()> {
        let ingest = if retry_failed {
            match self.retry_configuration()? {
                Some(ingest) => ingest,
                None => {
                    println!("nothing to retry");
                    return Ok(());
                }
            }
        } else {
            self.config.ingest.clone()
        };

        let token = self.shutdown.clone();
        let watcher = tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                log::info!("🧨 Ctrl-C received, cancelling run...");
                token.cancel();
            }
        });

        let result = self.pipeline.run_with(ingest, &self.shutdown).await;
        watcher.abort();

        let report = result?;
        println!("{}", serde_json::to_string_pretty(&report)?);
        Ok(())
    }

    /// `None` when the last run left nothing to retry.
    fn retry_configuration(&self) -> Result<Option<BulkProcessingConfiguration>> {
        let Some(last) = self
            .storage
            .load_last_report()
            .context("loading last run report")?
        else {
            bail!("no saved run report to retry from");
        };

        let codes = last.retry_codes();
        if codes.is_empty() {
            log::info!("✅ Run {} left no sets to retry", last.run_id);
            return Ok(None);
        }
        log::info!("🔁 Retrying {} sets from run {}: {}", codes.len(), last.run_id, codes.join(","));
        Ok(Some(self.config.ingest.retrying(codes)))
    }

    pub fn run_search(&self, query: &str, limit: usize) -> Result<()> {
        let fragments = trigram::query_fragments(query);
        if fragments.is_empty() {
            bail!("search query {:?} has no searchable characters", query);
        }

        let hits = self
            .storage
            .search(&fragments, limit.max(1))
            .context("searching name index")?;
        if hits.is_empty() {
            println!("no matches for {:?}", query);
        }
        for hit in hits {
            println!(
                "{:>3}  {}  [{}]  {}",
                hit.matched,
                hit.name,
                hit.set_code.as_deref().unwrap_or("-"),
                hit.card_id
            );
        }
        Ok(())
    }

    /// Main entry point for the Daemon.
    pub async fn run_daemon(&mut self) -> Result<()> {
        self.log_runtime_config();

        let mut rest_handle = self.spawn_rest_server();
        let mut ingest_handle = self.spawn_ingest_loop();

        self.wait_for_shutdown(&mut rest_handle, &mut ingest_handle)
            .await
    }

    fn spawn_rest_server(&self) -> JoinHandle<()> {
        let addr = self.config.api_listen;
        let store = self.storage.clone();
        let token = self.shutdown.clone();

        tokio::spawn(async move {
            if let Err(e) = rest::serve(addr, store, token).await {
                log::error!("REST server failed: {:#}", e);
            }
        })
    }

    fn spawn_ingest_loop(&self) -> JoinHandle<()> {
        let pipeline = self.pipeline.clone();
        let interval = self.config.refresh_interval;
        let token = self.shutdown.clone();

        tokio::spawn(async move {
            loop {
                match pipeline.run_once(&token).await {
                    Ok(report) => log::info!("📋 {}", report.summary()),
                    Err(e) => log::error!("Ingestion run failed: {:#}", e),
                }

                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = tokio::time::sleep(interval) => {}
                }
            }
            log::info!("👋 Ingestion loop exited");
        })
    }

    async fn wait_for_shutdown(
        &self,
        rest_task: &mut JoinHandle<()>,
        ingest_task: &mut JoinHandle<()>,
    ) -> Result<()> {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => log::info!("🧨 Ctrl-C received, shutting down..."),
            _ = &mut *rest_task => log::error!("REST task exited unexpectedly"),
            _ = &mut *ingest_task => log::error!("Ingestion task exited unexpectedly"),
        }

        self.shutdown.cancel();

        // Polling a completed JoinHandle again panics.
        if !rest_task.is_finished() {
            let _ = rest_task.await;
        }
        if !ingest_task.is_finished() {
            let _ = ingest_task.await;
        }

        log::info!("✅ Shutdown complete");
        Ok(())
    }

    fn log_runtime_config(&self) {
        log::info!("🧮 Workers: {}", self.config.ingest.workers);
        log::info!(
            "🧮 Request permits: {} (min interval {:?})",
            self.config.permits,
            self.config.min_interval
        );
        log::info!("⏱️ Refresh interval: {:?}", self.config.refresh_interval);
        if self.config.ingest.memory_throttling {
            log::info!(
                "🧠 Memory throttling above {} MiB",
                self.config.memory_threshold_bytes / (1024 * 1024)
            );
        }
        if let Some(path) = self.config.log_file.as_deref() {
            log::info!("📝 Log file: {}", path);
        }
    }
}

fn log_startup_info(config: &Configuration) {
    log::info!("🚀 Starting cardindex");
    log::info!("🔗 Catalog source: {}", config.source_url);
    log::info!("📂 Data dir: {}", config.data_dir);
}

fn init_storage(config: &Configuration, reset: bool) -> Result<storage::SqliteStorage> {
    std::fs::create_dir_all(&config.data_dir)?;

    let sqlite = storage::SqliteStorage::new(config.db_path());
    if reset {
        sqlite.reset_all().context("resetting storage")?;
    }
    sqlite.init().context("initializing storage")?;

    Ok(sqlite)
}

pub async fn run() -> Result<()> {
    let (mut app, cli) = App::from_cli()?;

    match cli.cmd {
        Some(Command::Ingest { retry_failed }) => app.run_ingest(retry_failed).await,
        Some(Command::Search { query, limit }) => app.run_search(&query, limit),
        None => app.run_daemon().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::RunState;
    use crate::testing::MemorySource;
    use std::time::Duration;

    fn test_config(dir: &Path, port: u16) -> Configuration {
        Configuration {
            data_dir: dir.to_string_lossy().into_owned(),
            source_url: "http://127.0.0.1:9/".to_string(),
            user_agent: "cardindex-test".to_string(),
            request_timeout: Duration::from_secs(1),
            api_listen: format!("127.0.0.1:{}", port).parse().unwrap(),
            log_file: None,
            reset: false,
            permits: 2,
            min_interval: Duration::ZERO,
            memory_threshold_bytes: u64::MAX,
            refresh_interval: Duration::from_secs(3600),
            ingest: BulkProcessingConfiguration {
                refresh_cadence: Duration::from_millis(10),
                ..BulkProcessingConfiguration::default()
            },
        }
    }

    fn make_app(dir: &Path, port: u16, source: MemorySource) -> App {
        let config = test_config(dir, port);
        let storage = init_storage(&config, false).unwrap();
        let blobs = FileBlobStore::new(config.blob_dir());
        let pipeline = Pipeline::new(&config, storage.clone(), blobs, Arc::new(source));
        App::new(config, storage, pipeline)
    }

    #[tokio::test]
    async fn run_once_persists_the_report() {
        let dir = tempfile::tempdir().unwrap();
        let app = make_app(dir.path(), 0, MemorySource::with_sets(&["lea", "leb"], 3));

        let report = app.pipeline.run_once(&CancellationToken::new()).await.unwrap();
        assert_eq!(report.state, RunState::Completed);
        assert_eq!(report.sets_succeeded, 2);

        let stored = app.storage.load_last_report().unwrap().unwrap();
        assert_eq!(stored.run_id, report.run_id);
        assert_eq!(app.storage.counts().unwrap().cards, 6);
    }

    #[tokio::test]
    async fn cancelled_run_still_saves_partial_report() {
        let dir = tempfile::tempdir().unwrap();
        let app = make_app(dir.path(), 0, MemorySource::with_sets(&["lea"], 2));

        let token = CancellationToken::new();
        token.cancel();
        let report = app.pipeline.run_once(&token).await.unwrap();
        assert_eq!(report.state, RunState::Cancelled);

        let stored = app.storage.load_last_report().unwrap().unwrap();
        assert!(stored.cancelled);
    }

    #[tokio::test]
    async fn fatal_manifest_error_is_returned() {
        let dir = tempfile::tempdir().unwrap();
        let mut source = MemorySource::with_sets(&["lea"], 1);
        source.manifest_status = Some(500);
        let app = make_app(dir.path(), 0, source);

        let err = app.pipeline.run_once(&CancellationToken::new()).await.unwrap_err();
        assert!(format!("{:#}", err).contains("manifest"));
        assert!(app.storage.load_last_report().unwrap().is_none());
    }

    #[tokio::test]
    async fn retry_configuration_targets_the_last_runs_failures() {
        let dir = tempfile::tempdir().unwrap();
        let mut source = MemorySource::with_sets(&["lea", "leb", "2ed"], 1);
        source.failing_sets.insert("leb".into());
        let app = make_app(dir.path(), 0, source);

        assert!(app.retry_configuration().is_err());

        app.pipeline.run_once(&CancellationToken::new()).await.unwrap();
        let retry = app.retry_configuration().unwrap().unwrap();
        assert_eq!(retry.set_codes, vec!["leb"]);
        assert_eq!(retry.workers, app.config.ingest.workers);

        let report = app
            .pipeline
            .run_with(retry, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(report.sets_selected, 1);
        assert_eq!(report.set_failures[0].set_code, "leb");
    }

    #[tokio::test]
    async fn clean_run_leaves_nothing_to_retry() {
        let dir = tempfile::tempdir().unwrap();
        let app = make_app(dir.path(), 0, MemorySource::with_sets(&["lea"], 1));

        app.pipeline.run_once(&CancellationToken::new()).await.unwrap();
        assert!(app.retry_configuration().unwrap().is_none());
    }

    #[tokio::test]
    async fn search_requires_searchable_characters() {
        let dir = tempfile::tempdir().unwrap();
        let app = make_app(dir.path(), 0, MemorySource::with_sets(&[], 0));
        assert!(app.run_search("   ", 5).is_err());
        assert!(app.run_search("lotus", 5).is_ok());
    }

    #[tokio::test]
    async fn ingest_loop_runs_immediately_and_stops_on_shutdown() {
        let dir = tempfile::tempdir().unwrap();
        let app = make_app(dir.path(), 0, MemorySource::with_sets(&["lea"], 2));

        let handle = app.spawn_ingest_loop();

        let mut stored = None;
        for _ in 0..200 {
            stored = app.storage.load_last_report().unwrap();
            if stored.is_some() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(stored.unwrap().state, RunState::Completed);

        app.shutdown.cancel();
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn wait_for_shutdown_exits_when_task_finishes() {
        let dir = tempfile::tempdir().unwrap();
        let app = make_app(dir.path(), 0, MemorySource::with_sets(&[], 0));
        let token = app.shutdown.clone();

        let mut rest_task = tokio::spawn(async {});
        let mut ingest_task = tokio::spawn(async move {
            token.cancelled().await;
        });

        let res = app.wait_for_shutdown(&mut rest_task, &mut ingest_task).await;
        assert!(res.is_ok());
        assert!(app.shutdown.is_cancelled());
    }

    #[tokio::test]
    async fn spawn_rest_server_starts_and_serves_health_check() {
        let dir = tempfile::tempdir().unwrap();
        let port = 34611;
        let app = make_app(dir.path(), port, MemorySource::with_sets(&[], 0));

        let handle = app.spawn_rest_server();

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(
            !handle.is_finished(),
            "REST server task finished unexpectedly (likely bind failed)"
        );

        let stream = tokio::net::TcpStream::connect(format!("127.0.0.1:{}", port)).await;
        assert!(stream.is_ok(), "Failed to connect to REST server");
        let mut stream = stream.unwrap();

        use tokio::io::{AsyncReadExt, AsyncWriteExt};
        stream
            .write_all(b"GET /health HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n")
            .await
            .unwrap();

        let mut buffer = Vec::new();
        stream.read_to_end(&mut buffer).await.unwrap();
        let response = String::from_utf8_lossy(&buffer);

        assert!(response.contains("200 OK"));
        assert!(response.contains("uptimeSecs"));

        app.shutdown.cancel();
        let _ = handle.await;
    }
}
