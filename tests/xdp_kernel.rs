//! End-to-end checks that run the real XDP probe in the kernel.
//!
//! Requires root (CAP_BPF + CAP_NET_ADMIN + CAP_PERFMON) and a probe object
//! built with bpf-linker. Run via
//!     sudo -E cargo test --test xdp_kernel -- --ignored --test-threads=1
//! The probe is attached to `lo` unless TRAFFICMON_IFACE says otherwise.

#![cfg(target_os = "linux")]

use anyhow::{Context, Result};
use std::net::{TcpListener, TcpStream, UdpSocket};
use std::process::Command;
use std::time::Duration;
use trafficmon::ebpf::{EventCollector, ProbeHarness};
use trafficmon::{HarnessConfig, TrafficEvent, XdpMode};

const WAIT: Duration = Duration::from_secs(5);

/// Ethernet + IPv4 + UDP header bytes in front of a UDP payload.
const UDP_OVERHEAD: u64 = 14 + 20 + 8;

async fn start() -> Result<(ProbeHarness, EventCollector)> {
    start_with(HarnessConfig::from_env()?).await
}

async fn start_with(config: HarnessConfig) -> Result<(ProbeHarness, EventCollector)> {
    trafficmon::init_tracing();

    let mut harness = ProbeHarness::load(config).context("loading probe")?;
    let mode = harness.attach().context("attaching probe")?;
    assert_eq!(harness.attached_mode(), Some(mode));

    let collector = harness.collect().context("opening traffic_map")?;
    assert!(collector.reader_count() > 0);

    // Let the per-CPU readers register before generating traffic.
    tokio::time::sleep(Duration::from_millis(100)).await;
    Ok((harness, collector))
}

fn is_loopback(event: &TrafficEvent) -> bool {
    event.src_ip == [127, 0, 0, 1] && event.dst_ip == [127, 0, 0, 1]
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
#[ignore = "requires root and a compiled probe"]
async fn test_udp_datagram_produces_record() -> Result<()> {
    let (harness, mut collector) = start().await?;

    let receiver = UdpSocket::bind("127.0.0.1:0")?;
    let sender = UdpSocket::bind("127.0.0.1:0")?;
    let (sport, dport) = (sender.local_addr()?.port(), receiver.local_addr()?.port());
    let payload = b"trafficmon-udp";
    sender.send_to(payload, receiver.local_addr()?)?;

    let event = collector
        .wait_for(WAIT, |e| {
            is_loopback(e) && e.src_port_host() == sport && e.dst_port_host() == dport
        })
        .await
        .context("no record for the UDP datagram")?;

    let bytes = event.bytes;
    assert_eq!(bytes, UDP_OVERHEAD + payload.len() as u64);
    assert_eq!(event.src_port.to_ne_bytes(), sport.to_be_bytes());
    assert_eq!(collector.lost_samples(), 0);

    drop(collector);
    harness.unload();
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
#[ignore = "requires root and a compiled probe"]
async fn test_tcp_connect_produces_record() -> Result<()> {
    let (harness, mut collector) = start().await?;

    let listener = TcpListener::bind("127.0.0.1:0")?;
    let dport = listener.local_addr()?.port();
    let stream = TcpStream::connect(("127.0.0.1", dport))?;
    let sport = stream.local_addr()?.port();

    let event = collector
        .wait_for(WAIT, |e| {
            is_loopback(e) && e.src_port_host() == sport && e.dst_port_host() == dport
        })
        .await
        .context("no record for the TCP handshake")?;

    let bytes = event.bytes;
    assert!(bytes >= 14 + 20 + 20);

    drop(stream);
    drop(collector);
    harness.unload();
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
#[ignore = "requires root, ping and a compiled probe"]
async fn test_icmp_echo_has_zero_ports() -> Result<()> {
    let (harness, mut collector) = start().await?;

    let status = Command::new("ping")
        .args(["-c", "1", "-W", "1", "127.0.0.1"])
        .status()
        .context("running ping")?;
    assert!(status.success());

    let event = collector
        .wait_for(WAIT, |e| {
            let (sport, dport) = (e.src_port, e.dst_port);
            is_loopback(e) && sport == 0 && dport == 0
        })
        .await
        .context("no record for the ICMP echo")?;

    let bytes = event.bytes;
    assert!(bytes >= 14 + 20 + 8);
    assert_eq!(collector.malformed_samples(), 0);

    drop(collector);
    harness.unload();
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
#[ignore = "requires root and a compiled probe"]
async fn test_generic_mode_records_every_datagram() -> Result<()> {
    let config = HarnessConfig {
        mode: XdpMode::Generic,
        ..HarnessConfig::from_env()?
    };
    let (harness, mut collector) = start_with(config).await?;
    assert_eq!(harness.attached_mode(), Some(XdpMode::Generic));
    assert!(!harness.config().iface.is_empty());

    let receiver = UdpSocket::bind("127.0.0.1:0")?;
    let sender = UdpSocket::bind("127.0.0.1:0")?;
    let sport = sender.local_addr()?.port();
    for payload in [&b"one"[..], b"two", b"three"] {
        sender.send_to(payload, receiver.local_addr()?)?;
    }

    let first = collector
        .next_event(WAIT)
        .await
        .context("no record after three datagrams")?;
    tokio::time::sleep(Duration::from_millis(200)).await;

    let mut events = collector.drain();
    events.insert(0, first);
    let ours = events
        .iter()
        .filter(|e| is_loopback(e) && e.src_port_host() == sport)
        .count();
    assert_eq!(ours, 3);
    assert_eq!(collector.lost_samples(), 0);

    drop(collector);
    harness.unload();
    Ok(())
}
