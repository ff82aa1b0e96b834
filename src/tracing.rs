use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::Path;
use std::sync::{Arc, OnceLock, RwLock, RwLockWriteGuard};

use tracing_subscriber::EnvFilter;

/// Used when `RUST_LOG` is unset. HTTP and pool internals stay quiet so the
/// ingestion lifecycle lines remain readable.
const DEFAULT_FILTER: &str = "info,hyper=warn,hyper_util=warn,reqwest=warn,rustls=warn";

type LogFile = Arc<RwLock<Option<File>>>;

/// Hands out writers that tee every line to stderr and, once one is
/// configured, to a log file.
#[derive(Clone, Default)]
struct LogSink {
    file: LogFile,
}

struct TeeWriter {
    file: LogFile,
}

fn lock(file: &LogFile) -> RwLockWriteGuard<'_, Option<File>> {
    file.write().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl<'a> tracing_subscriber::fmt::MakeWriter<'a> for LogSink {
    type Writer = TeeWriter;

    fn make_writer(&'a self) -> Self::Writer {
        TeeWriter {
            file: self.file.clone(),
        }
    }
}

impl Write for TeeWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let written = io::stderr().write(buf)?;
        if let Some(file) = lock(&self.file).as_mut() {
            // The file copy is best effort; stderr is the source of truth.
            let _ = file.write_all(&buf[..written]);
        }
        Ok(written)
    }

    fn flush(&mut self) -> io::Result<()> {
        io::stderr().flush()?;
        if let Some(file) = lock(&self.file).as_mut() {
            let _ = file.flush();
        }
        Ok(())
    }
}

static SINK: OnceLock<LogSink> = OnceLock::new();

/// Routes the `log` facade through tracing and installs the subscriber.
/// Safe to call more than once; later calls are no-ops.
pub fn init() {
    let _ = tracing_log::LogTracer::init();

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    let sink = SINK.get_or_init(LogSink::default).clone();

    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(sink)
        .try_init();
}

fn open_log_file(path: &Path) -> io::Result<File> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    OpenOptions::new().create(true).append(true).open(path)
}

/// Starts (or stops, with `None`) copying log output to a file.
pub fn set_log_file(log_file: Option<&Path>) -> io::Result<()> {
    let sink = SINK.get_or_init(LogSink::default);
    let next = log_file.map(open_log_file).transpose()?;
    *lock(&sink.file) = next;
    Ok(())
}
