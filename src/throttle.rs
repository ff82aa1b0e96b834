//! Advisory memory backpressure for the dispatch loop.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::types::Cancelled;

pub trait MemoryProbe: Send + Sync {
    /// Resident memory of this process in bytes, if it can be determined.
    fn resident_bytes(&self) -> Option<u64>;
}

/// Reads the resident set size from `/proc/self/statm`.
#[derive(Clone, Copy, Debug, Default)]
pub struct ProcStatmProbe;

const PAGE_SIZE: u64 = 4096;

impl MemoryProbe for ProcStatmProbe {
    fn resident_bytes(&self) -> Option<u64> {
        #[cfg(target_os = "linux")]
        {
            let content = std::fs::read_to_string("/proc/self/statm").ok()?;
            let pages = content.split_whitespace().nth(1)?.parse::<u64>().ok()?;
            Some(pages * PAGE_SIZE)
        }
        #[cfg(not(target_os = "linux"))]
        {
            None
        }
    }
}

#[derive(Clone)]
pub struct MemoryThrottle {
    threshold_bytes: u64,
    probe: Arc<dyn MemoryProbe>,
}

impl MemoryThrottle {
    pub fn new(threshold_bytes: u64) -> Self {
        Self::with_probe(threshold_bytes, Arc::new(ProcStatmProbe))
    }

    pub fn with_probe(threshold_bytes: u64, probe: Arc<dyn MemoryProbe>) -> Self {
        Self {
            threshold_bytes,
            probe,
        }
    }

    pub fn threshold_bytes(&self) -> u64 {
        self.threshold_bytes
    }

    /// Unknown memory usage never pauses.
    pub fn should_pause(&self) -> bool {
        self.probe
            .resident_bytes()
            .is_some_and(|used| used > self.threshold_bytes)
    }

    /// Polls every `cadence` until memory is back under the threshold.
    /// Returns whether any pause happened.
    pub async fn wait_until_clear(
        &self,
        cadence: Duration,
        cancel: &CancellationToken,
    ) -> Result<bool, Cancelled> {
        let mut paused = false;
        while self.should_pause() {
            if !paused {
                log::warn!(
                    "⏸️ Memory above {} MiB, pausing dispatch",
                    self.threshold_bytes / (1024 * 1024)
                );
                paused = true;
            }
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(Cancelled),
                _ = tokio::time::sleep(cadence) => {}
            }
        }
        if paused {
            log::info!("▶️ Memory back under threshold, resuming dispatch");
        }
        Ok(paused)
    }
}
