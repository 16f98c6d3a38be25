//! Wall-clock and peak-RSS measurement for one ingestion job

use std::time::{Duration, Instant};

#[cfg(not(target_arch = "wasm32"))]
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
#[cfg(not(target_arch = "wasm32"))]
use std::thread::{self, JoinHandle};

#[cfg(not(target_arch = "wasm32"))]
use sysinfo::{get_current_pid, Pid, ProcessRefreshKind, RefreshKind, System};

/// Figures captured for one job
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct RuntimeStats {
    pub(crate) wall_time: Duration,
    /// `None` unless sampling was requested and the platform supports it
    pub(crate) peak_rss_bytes: Option<u64>,
}

/// Job stopwatch with an optional background RSS sampler
pub(crate) struct RuntimeMeasurement {
    start: Instant,
    #[cfg(not(target_arch = "wasm32"))]
    rss: Option<RssSampler>,
}

impl RuntimeMeasurement {
    pub(crate) fn begin(sample_rss: bool) -> Self {
        #[cfg(target_arch = "wasm32")]
        let _ = sample_rss;
        Self {
            start: Instant::now(),
            #[cfg(not(target_arch = "wasm32"))]
            rss: sample_rss.then(|| RssSampler::spawn(RSS_INTERVAL)).flatten(),
        }
    }

    pub(crate) fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    pub(crate) fn finish(mut self) -> RuntimeStats {
        let wall_time = self.start.elapsed();

        #[cfg(not(target_arch = "wasm32"))]
        let peak_rss_bytes = self
            .rss
            .take()
            .and_then(RssSampler::join)
            .filter(|bytes| *bytes > 0);

        #[cfg(target_arch = "wasm32")]
        let peak_rss_bytes = None;

        RuntimeStats {
            wall_time,
            peak_rss_bytes,
        }
    }
}

#[cfg(not(target_arch = "wasm32"))]
const RSS_INTERVAL: Duration = Duration::from_millis(20);

/// Polls this process's resident set until told to stop, then returns the
/// largest value seen. Dropping it without joining detaches the thread,
/// which exits at its next wake-up because the stop channel disconnects.
#[cfg(not(target_arch = "wasm32"))]
struct RssSampler {
    stop: Sender<()>,
    handle: JoinHandle<u64>,
}

#[cfg(not(target_arch = "wasm32"))]
impl RssSampler {
    fn spawn(interval: Duration) -> Option<Self> {
        let pid = get_current_pid().ok()?;
        let (stop, stopped) = mpsc::channel::<()>();

        let handle = thread::Builder::new()
            .name("jsl-rss-sampler".to_string())
            .spawn(move || {
                let mut system = System::new_with_specifics(
                    RefreshKind::new().with_processes(ProcessRefreshKind::new()),
                );
                let mut peak = 0u64;
                loop {
                    peak = peak.max(read_rss(&mut system, pid));
                    match stopped.recv_timeout(interval) {
                        Err(RecvTimeoutError::Timeout) => continue,
                        Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                    }
                }
                // one last reading so short jobs still report something
                peak.max(read_rss(&mut system, pid))
            })
            .ok()?;

        Some(Self { stop, handle })
    }

    fn join(self) -> Option<u64> {
        let _ = self.stop.send(());
        self.handle.join().ok()
    }
}

/// Current RSS in bytes (sysinfo 0.30 reports bytes); 0 when hidden
#[cfg(not(target_arch = "wasm32"))]
fn read_rss(system: &mut System, pid: Pid) -> u64 {
    if !system.refresh_process_specifics(pid, ProcessRefreshKind::new().with_memory()) {
        return 0;
    }
    system.process(pid).map_or(0, |process| process.memory())
}
