//! Per-CPU readers for `traffic_map`

use crate::config::HarnessConfig;
use crate::{Result, TrafficmonError};
use aya::maps::perf::{AsyncPerfEventArray, Events};
use aya::util::online_cpus;
use aya::Ebpf;
use bytes::BytesMut;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};
use trafficmon_common::{TrafficEvent, MAP_NAME};

/// Receives decoded `TrafficEvent`s from one reader task per online CPU.
///
/// Dropping the collector stops the readers.
pub struct EventCollector {
    rx: mpsc::Receiver<TrafficEvent>,
    readers: Vec<JoinHandle<()>>,
    lost: Arc<AtomicU64>,
    malformed: Arc<AtomicU64>,
}

impl EventCollector {
    pub(crate) fn spawn(bpf: &mut Ebpf, config: &HarnessConfig) -> Result<Self> {
        let available: Vec<String> = bpf.maps().map(|(name, _)| name.to_string()).collect();
        let map = bpf
            .take_map(MAP_NAME)
            .ok_or_else(|| TrafficmonError::MapNotFound {
                name: MAP_NAME.to_string(),
                available,
            })?;
        let mut perf = AsyncPerfEventArray::try_from(map)
            .map_err(|e| TrafficmonError::EbpfError(format!("{}: {}", MAP_NAME, e)))?;

        let cpus = online_cpus()
            .map_err(|(msg, err)| TrafficmonError::EbpfError(format!("{}: {}", msg, err)))?;

        let (tx, rx) = mpsc::channel(config.channel_capacity);
        let lost = Arc::new(AtomicU64::new(0));
        let malformed = Arc::new(AtomicU64::new(0));
        let mut readers = Vec::with_capacity(cpus.len());

        for cpu_id in cpus {
            let mut buf = perf.open(cpu_id, config.perf_pages).map_err(|e| {
                TrafficmonError::PerfBufferError {
                    cpu: cpu_id,
                    reason: e.to_string(),
                }
            })?;

            let tx = tx.clone();
            let lost = Arc::clone(&lost);
            let malformed = Arc::clone(&malformed);
            let buffer_count = config.buffers_per_cpu;

            readers.push(tokio::spawn(async move {
                let mut buffers = (0..buffer_count)
                    .map(|_| BytesMut::with_capacity(TrafficEvent::SIZE))
                    .collect::<Vec<_>>();

                loop {
                    let Events { read, lost: dropped } = match buf.read_events(&mut buffers).await
                    {
                        Ok(events) => events,
                        Err(e) => {
                            error!(cpu_id, error = %e, "perf buffer read failure");
                            break;
                        }
                    };

                    if dropped > 0 {
                        lost.fetch_add(dropped as u64, Ordering::Relaxed);
                        warn!(cpu_id, lost = dropped, "perf buffer lost samples");
                    }

                    for buffer in buffers.iter_mut().take(read) {
                        let decoded = TrafficEvent::from_bytes(buffer);
                        let len = buffer.len();
                        buffer.clear();

                        let Some(event) = decoded else {
                            malformed.fetch_add(1, Ordering::Relaxed);
                            warn!(
                                cpu_id,
                                len,
                                expected = TrafficEvent::SIZE,
                                "perf buffer returned undersized payload"
                            );
                            continue;
                        };

                        debug!(cpu_id, %event, "traffic event");
                        if tx.send(event).await.is_err() {
                            return;
                        }
                    }
                }
            }));
        }

        Ok(Self {
            rx,
            readers,
            lost,
            malformed,
        })
    }

    /// Next record from any CPU, or `None` if none arrives within `timeout`.
    pub async fn next_event(&mut self, timeout: Duration) -> Option<TrafficEvent> {
        tokio::time::timeout(timeout, self.rx.recv())
            .await
            .ok()
            .flatten()
    }

    /// First record within `timeout` for which `matches` returns true.
    /// Records that do not match are discarded.
    pub async fn wait_for<F>(&mut self, timeout: Duration, mut matches: F) -> Option<TrafficEvent>
    where
        F: FnMut(&TrafficEvent) -> bool,
    {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let event = tokio::time::timeout_at(deadline, self.rx.recv())
                .await
                .ok()
                .flatten()?;
            if matches(&event) {
                return Some(event);
            }
        }
    }

    /// Drain whatever has already been received without waiting.
    pub fn drain(&mut self) -> Vec<TrafficEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.rx.try_recv() {
            events.push(event);
        }
        events
    }

    /// Samples the kernel reported as lost across all CPUs.
    pub fn lost_samples(&self) -> u64 {
        self.lost.load(Ordering::Relaxed)
    }

    /// Samples too short to hold a `TrafficEvent`.
    pub fn malformed_samples(&self) -> u64 {
        self.malformed.load(Ordering::Relaxed)
    }

    pub fn reader_count(&self) -> usize {
        self.readers.len()
    }
}

impl Drop for EventCollector {
    fn drop(&mut self) {
        for reader in &self.readers {
            reader.abort();
        }
    }
}
