//! Kernel test harness for the trafficmon XDP probe
//!
//! The probe itself lives in `trafficmon-probes` and its classifier in
//! `trafficmon-common`. This crate embeds the compiled probe object and offers
//! just enough userspace to load it, attach it and read back its records in
//! integration tests.

pub mod config;
#[cfg(target_os = "linux")]
pub mod ebpf;
pub mod error;

pub use config::{HarnessConfig, XdpMode};
pub use error::{Result, TrafficmonError};
pub use trafficmon_common as common;
pub use trafficmon_common::TrafficEvent;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Install a `tracing` subscriber honouring `RUST_LOG` (default `info`).
///
/// Safe to call more than once; later calls are no-ops.
pub fn init_tracing() {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_test_writer()
        .try_init();
}
