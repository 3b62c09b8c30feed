//! Probe lifecycle for integration tests: load, attach, collect, unload

use crate::config::{HarnessConfig, XdpMode};
use crate::ebpf::events::EventCollector;
use crate::{Result, TrafficmonError};
use aya::programs::{ProgramError, Xdp, XdpFlags};
use aya::Ebpf;
use std::path::Path;
use tracing::{debug, info, warn};
use trafficmon_common::PROGRAM_NAME;

/// Probe object compiled by build.rs. Empty when the eBPF build was skipped.
const PROBE_OBJECT: &[u8] = aya::include_bytes_aligned!(concat!(env!("OUT_DIR"), "/traffic_probe"));

/// XDP programs that call bpf_perf_event_output need 4.18+.
const MIN_KERNEL: (u32, u32) = (4, 18);

/// Owns the loaded probe. Dropping it detaches the program and frees the maps.
pub struct ProbeHarness {
    bpf: Ebpf,
    config: HarnessConfig,
    attached: Option<XdpMode>,
}

impl ProbeHarness {
    /// Run pre-flight checks and load the embedded probe object
    pub fn load(config: HarnessConfig) -> Result<Self> {
        config.validate()?;
        run_preflight_checks()?;
        raise_memlock_limit();

        if PROBE_OBJECT.is_empty() {
            return Err(TrafficmonError::ProgramLoadFailed(
                "probe object was not built; install bpf-linker and rebuild".to_string(),
            ));
        }

        info!("Loading traffic probe...");
        let bpf = Ebpf::load(PROBE_OBJECT)
            .map_err(|e| TrafficmonError::ProgramLoadFailed(e.to_string()))?;

        Ok(Self {
            bpf,
            config,
            attached: None,
        })
    }

    /// Load `monitor_traffic` into the kernel and attach it to the configured
    /// interface. Returns the mode the kernel accepted.
    pub fn attach(&mut self) -> Result<XdpMode> {
        let iface = self.config.iface.clone();
        info!(iface = %iface, mode = %self.config.mode, "Attaching traffic probe...");

        let program: &mut Xdp = self
            .bpf
            .program_mut(PROGRAM_NAME)
            .ok_or_else(|| {
                TrafficmonError::ProgramLoadFailed(format!(
                    "{} program not found in eBPF object",
                    PROGRAM_NAME
                ))
            })?
            .try_into()
            .map_err(|e: ProgramError| TrafficmonError::ProgramLoadFailed(e.to_string()))?;

        program
            .load()
            .map_err(|e| TrafficmonError::ProgramLoadFailed(e.to_string()))?;

        let mode = attach_xdp(program, &iface, self.config.mode)?;
        info!(iface = %iface, mode = %mode, "Traffic probe attached");

        self.attached = Some(mode);
        Ok(mode)
    }

    /// Start reading `traffic_map` on every online CPU.
    ///
    /// The map is moved out of the object, so this succeeds once per harness.
    pub fn collect(&mut self) -> Result<EventCollector> {
        EventCollector::spawn(&mut self.bpf, &self.config)
    }

    /// Mode the program is attached in, if it is attached.
    pub fn attached_mode(&self) -> Option<XdpMode> {
        self.attached
    }

    pub fn config(&self) -> &HarnessConfig {
        &self.config
    }

    /// Detach and unload the probe
    pub fn unload(self) {
        info!("Unloading traffic probe...");
        drop(self.bpf);
        info!("Probe unloaded");
    }
}

fn attach_xdp(program: &mut Xdp, iface: &str, mode: XdpMode) -> Result<XdpMode> {
    match mode {
        XdpMode::Driver => attach_with(program, iface, XdpFlags::DRV_MODE).map(|_| XdpMode::Driver),
        XdpMode::Generic => {
            attach_with(program, iface, XdpFlags::SKB_MODE).map(|_| XdpMode::Generic)
        }
        XdpMode::Auto => match attach_with(program, iface, XdpFlags::DRV_MODE) {
            Ok(()) => Ok(XdpMode::Driver),
            Err(e) => {
                warn!(iface, error = %e, "driver mode attach failed, falling back to generic mode");
                attach_with(program, iface, XdpFlags::SKB_MODE).map(|_| XdpMode::Generic)
            }
        },
    }
}

fn attach_with(program: &mut Xdp, iface: &str, flags: XdpFlags) -> Result<()> {
    program
        .attach(iface, flags)
        .map(|_link| ())
        .map_err(|e| TrafficmonError::AttachFailed {
            iface: iface.to_string(),
            reason: e.to_string(),
        })
}

/// Run pre-flight checks to validate the system can run the probe
fn run_preflight_checks() -> Result<()> {
    info!("Running pre-flight checks...");

    check_kernel_version()?;
    check_btf();
    check_capabilities();

    info!("Pre-flight checks passed");
    Ok(())
}

fn check_kernel_version() -> Result<()> {
    let release = std::fs::read_to_string("/proc/sys/kernel/osrelease")?;
    let release = release.trim();

    let (major, minor) = parse_kernel_release(release).ok_or_else(|| {
        TrafficmonError::EbpfError(format!("Could not parse kernel version: {}", release))
    })?;

    if (major, minor) < MIN_KERNEL {
        return Err(TrafficmonError::KernelVersionTooOld {
            version: release.to_string(),
            min_version: format!("{}.{}", MIN_KERNEL.0, MIN_KERNEL.1),
        });
    }

    info!("Kernel version: {} (supported)", release);
    Ok(())
}

/// Extract `(major, minor)` from a release string such as `6.8.0-45-generic`.
pub(crate) fn parse_kernel_release(release: &str) -> Option<(u32, u32)> {
    let mut parts = release.trim().split(['.', '-']);
    let major = parts.next()?.parse().ok()?;
    let minor = parts.next()?.parse().ok()?;
    Some((major, minor))
}

fn check_btf() {
    if !Path::new("/sys/kernel/btf/vmlinux").exists() {
        warn!("BTF not found at /sys/kernel/btf/vmlinux, CO-RE relocations will be unavailable");
        return;
    }

    debug!("BTF available");
}

fn check_capabilities() {
    let euid = unsafe { libc::geteuid() };

    if euid != 0 {
        warn!(
            euid,
            "Not running as root. Ensure CAP_BPF, CAP_NET_ADMIN and CAP_PERFMON are granted."
        );
    } else {
        debug!("Running with root privileges");
    }
}

/// Kernels before 5.11 charge BPF maps against RLIMIT_MEMLOCK.
fn raise_memlock_limit() {
    let rlim = libc::rlimit {
        rlim_cur: libc::RLIM_INFINITY,
        rlim_max: libc::RLIM_INFINITY,
    };
    let ret = unsafe { libc::setrlimit(libc::RLIMIT_MEMLOCK, &rlim) };
    if ret != 0 {
        debug!(ret, "remove limit on locked memory failed");
    }
}
