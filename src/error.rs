use thiserror::Error;

#[derive(Error, Debug)]
pub enum TrafficmonError {
    #[error("eBPF error: {0}")]
    EbpfError(String),

    #[error("Failed to load eBPF program: {0}")]
    ProgramLoadFailed(String),

    #[error("Failed to attach eBPF program to {iface}: {reason}")]
    AttachFailed { iface: String, reason: String },

    #[error("Map {name} not found in eBPF object. Available maps: {available:?}")]
    MapNotFound {
        name: String,
        available: Vec<String>,
    },

    #[error("Perf buffer error on CPU {cpu}: {reason}")]
    PerfBufferError { cpu: u32, reason: String },

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Kernel version {version} is too old. Minimum required: {min_version}")]
    KernelVersionTooOld {
        version: String,
        min_version: String,
    },
}

pub type Result<T> = std::result::Result<T, TrafficmonError>;
