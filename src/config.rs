//! Harness configuration
//!
//! Defaults attach to the loopback interface in auto mode. Each field can be
//! overridden from the environment:
//! - `TRAFFICMON_IFACE`: interface name
//! - `TRAFFICMON_XDP_MODE`: `auto`, `driver` or `generic`
//! - `TRAFFICMON_PERF_PAGES`: pages per CPU ring, power of two

use crate::{Result, TrafficmonError};
use std::fmt;
use std::str::FromStr;

pub const IFACE_ENV: &str = "TRAFFICMON_IFACE";
pub const XDP_MODE_ENV: &str = "TRAFFICMON_XDP_MODE";
pub const PERF_PAGES_ENV: &str = "TRAFFICMON_PERF_PAGES";

/// How the XDP program is attached to the interface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum XdpMode {
    /// Try driver mode, fall back to generic mode if the driver refuses.
    #[default]
    Auto,
    Driver,
    Generic,
}

impl XdpMode {
    pub const fn as_str(&self) -> &'static str {
        match self {
            XdpMode::Auto => "auto",
            XdpMode::Driver => "driver",
            XdpMode::Generic => "generic",
        }
    }
}

impl fmt::Display for XdpMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for XdpMode {
    type Err = TrafficmonError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "auto" => Ok(XdpMode::Auto),
            "driver" | "drv" | "native" => Ok(XdpMode::Driver),
            "generic" | "skb" => Ok(XdpMode::Generic),
            other => Err(TrafficmonError::ConfigError(format!(
                "unknown XDP mode '{}', expected auto, driver or generic",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone)]
pub struct HarnessConfig {
    /// Interface the probe is attached to.
    pub iface: String,
    pub mode: XdpMode,
    /// Pages per CPU perf ring. `None` lets aya pick its default.
    pub perf_pages: Option<usize>,
    /// Receive buffers handed to each per-CPU reader per poll.
    pub buffers_per_cpu: usize,
    /// Capacity of the channel between perf readers and the collector.
    pub channel_capacity: usize,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            iface: "lo".to_string(),
            mode: XdpMode::Auto,
            perf_pages: None,
            buffers_per_cpu: 16,
            channel_capacity: 1024,
        }
    }
}

impl HarnessConfig {
    /// Defaults overridden by `TRAFFICMON_*` environment variables.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Defaults overridden by whatever `lookup` returns for each variable.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(iface) = lookup(IFACE_ENV) {
            config.iface = iface;
        }
        if let Some(mode) = lookup(XDP_MODE_ENV) {
            config.mode = mode.parse()?;
        }
        if let Some(pages) = lookup(PERF_PAGES_ENV) {
            let pages = pages.trim().parse::<usize>().map_err(|e| {
                TrafficmonError::ConfigError(format!("{}='{}': {}", PERF_PAGES_ENV, pages, e))
            })?;
            config.perf_pages = Some(pages);
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.iface.trim().is_empty() {
            return Err(TrafficmonError::ConfigError(
                "interface name must not be empty".to_string(),
            ));
        }
        if let Some(pages) = self.perf_pages {
            if pages == 0 || !pages.is_power_of_two() {
                return Err(TrafficmonError::ConfigError(format!(
                    "perf ring size must be a power of two, got {} pages",
                    pages
                )));
            }
        }
        if self.buffers_per_cpu == 0 || self.channel_capacity == 0 {
            return Err(TrafficmonError::ConfigError(
                "buffers_per_cpu and channel_capacity must be non-zero".to_string(),
            ));
        }
        Ok(())
    }
}
