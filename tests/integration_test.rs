use trafficmon::common::{inspect, protocol, Verdict};
use trafficmon::error::{Result, TrafficmonError};
use trafficmon::{HarnessConfig, TrafficEvent, XdpMode};

#[test]
fn test_error_types() {
    let err = TrafficmonError::AttachFailed {
        iface: "eth0".to_string(),
        reason: "Operation not supported".to_string(),
    };

    assert!(err.to_string().contains("eth0"));
    assert!(err.to_string().contains("Operation not supported"));

    let err = TrafficmonError::MapNotFound {
        name: "traffic_map".to_string(),
        available: vec!["AYA_LOGS".to_string()],
    };
    assert!(err.to_string().contains("AYA_LOGS"));
}

#[test]
fn test_io_error_converts() {
    fn read_missing() -> Result<String> {
        Ok(std::fs::read_to_string("/nonexistent/trafficmon")?)
    }

    assert!(matches!(read_missing(), Err(TrafficmonError::IoError(_))));
}

#[test]
fn test_version_const() {
    assert!(!trafficmon::VERSION.is_empty());
}

#[test]
fn test_default_config_targets_loopback() {
    let config = HarnessConfig::default();
    assert_eq!(config.iface, "lo");
    assert_eq!(config.mode, XdpMode::Auto);
    assert!(config.validate().is_ok());
}

#[test]
fn test_classifier_reexported_for_harness_users() {
    let mut pkt = vec![0u8; 64];
    pkt[14] = 0x45;
    pkt[23] = protocol::UDP;
    pkt[26..30].copy_from_slice(&[127, 0, 0, 1]);
    pkt[30..34].copy_from_slice(&[127, 0, 0, 1]);
    pkt[34..36].copy_from_slice(&5353u16.to_be_bytes());
    pkt[36..38].copy_from_slice(&53u16.to_be_bytes());

    let mut events: Vec<TrafficEvent> = Vec::new();
    assert_eq!(inspect(&pkt[..], &mut events), Verdict::Pass);

    assert_eq!(events.len(), 1);
    assert_eq!(events[0].to_string(), "127.0.0.1:5353 -> 127.0.0.1:53 bytes=64");
}
