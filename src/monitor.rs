use std::{
    io,
    sync::{
        atomic::{AtomicBool, Ordering},
        mpsc::Sender,
        Arc,
    },
    thread::{self, JoinHandle},
    time::{Duration, Instant},
};

use crate::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResourceSnapshot {
    pub cpu_percent: f64,
    pub memory_mb: f64,
}

/// Reads the current process's counters.
pub trait ProcessSampler: Send {
    /// Total user + kernel time consumed so far.
    fn cpu_time(&mut self) -> Result<Duration, String>;

    fn resident_bytes(&mut self) -> Result<u64, String>;
}

/// Process time over wall time. Not divided by core count, so a busy
/// multi-threaded process can exceed 100.
pub fn cpu_percent(cpu_delta: Duration, wall_delta: Duration) -> f64 {
    if wall_delta.is_zero() {
        return 0.0;
    }
    cpu_delta.as_secs_f64() / wall_delta.as_secs_f64() * 100.0
}

pub fn bytes_to_mb(bytes: u64) -> f64 {
    bytes as f64 / (1024.0 * 1024.0)
}

const STOP_CHECK: Duration = Duration::from_millis(50);

/// Background sampler thread. Never touches sessions or plugins; it only
/// pushes snapshots into the channel.
pub struct ResourceMonitor {
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl ResourceMonitor {
    pub fn spawn(
        mut sampler: Box<dyn ProcessSampler>,
        interval: Duration,
        tx: Sender<ResourceSnapshot>,
    ) -> io::Result<Self> {
        let stop = Arc::new(AtomicBool::new(false));
        let stop_flag = stop.clone();

        let handle = thread::Builder::new()
            .name("resource-monitor".to_string())
            .spawn(move || {
                let mut last_cpu = match sampler.cpu_time() {
                    Ok(cpu) => cpu,
                    Err(e) => {
                        warn!("[MONITOR] Initial sample failed: {e}");
                        return;
                    }
                };
                let mut last_wall = Instant::now();

                loop {
                    let wake = Instant::now() + interval;
                    while Instant::now() < wake {
                        if stop_flag.load(Ordering::Relaxed) {
                            return;
                        }
                        thread::sleep(STOP_CHECK.min(wake.saturating_duration_since(Instant::now())));
                    }
                    if stop_flag.load(Ordering::Relaxed) {
                        return;
                    }

                    let sample = sampler
                        .cpu_time()
                        .and_then(|cpu| Ok((cpu, sampler.resident_bytes()?)));
                    let (cpu, bytes) = match sample {
                        Ok(sample) => sample,
                        Err(e) => {
                            warn!("[MONITOR] Sampling failed, stopping: {e}");
                            return;
                        }
                    };

                    let now = Instant::now();
                    let snapshot = ResourceSnapshot {
                        cpu_percent: cpu_percent(cpu.saturating_sub(last_cpu), now - last_wall),
                        memory_mb: bytes_to_mb(bytes),
                    };
                    last_cpu = cpu;
                    last_wall = now;

                    if tx.send(snapshot).is_err() {
                        debug!("[MONITOR] Receiver gone; stopping");
                        return;
                    }
                }
            })?;

        Ok(Self {
            stop,
            handle: Some(handle),
        })
    }

    pub fn is_running(&self) -> bool {
        self.handle.as_ref().map(|h| !h.is_finished()).unwrap_or(false)
    }

    pub fn stop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for ResourceMonitor {
    fn drop(&mut self) {
        self.stop();
    }
}
