//! XDP probe that summarizes every received packet on `traffic_map`
//!
//! This probe:
//! - Attaches at the XDP hook of one interface
//! - Reads the Ethernet, IPv4 and TCP/UDP/ICMP headers in place
//! - Writes one `TrafficEvent` per packet to a per-CPU perf event array
//! - Never drops, redirects or modifies a packet
//!
//! Note: This binary must be built for the bpfel-unknown-none target. The
//! root crate's build.rs handles cross-compilation via aya-build.

#![no_std]
#![no_main]

use aya_ebpf::{
    bindings::xdp_action,
    macros::{map, xdp},
    maps::PerfEventArray,
    programs::XdpContext,
};
use trafficmon_common::{inspect, EventSink, PacketBounds, TrafficEvent, Verdict};

/// Must match `trafficmon_common::MAP_NAME`.
#[map(name = "traffic_map")]
static TRAFFIC_MAP: PerfEventArray<TrafficEvent> = PerfEventArray::new(0);

/// Packet bytes `[data, data_end)` of the current XDP buffer.
struct Frame<'a>(&'a XdpContext);

// SAFETY: the kernel keeps [data, data_end) mapped for the whole invocation.
unsafe impl PacketBounds for Frame<'_> {
    #[inline(always)]
    fn start(&self) -> usize {
        self.0.data()
    }

    #[inline(always)]
    fn end(&self) -> usize {
        self.0.data_end()
    }
}

/// Emits records on the ring of the CPU that received the packet. Suppressed
/// records leave no trace.
struct TrafficMap<'a> {
    ctx: &'a XdpContext,
}

impl EventSink for TrafficMap<'_> {
    #[inline(always)]
    fn emit(&mut self, event: &TrafficEvent) {
        TRAFFIC_MAP.output(self.ctx, event, 0);
    }
}

#[xdp]
pub fn monitor_traffic(ctx: XdpContext) -> u32 {
    let frame = Frame(&ctx);
    let mut sink = TrafficMap { ctx: &ctx };

    match inspect(&frame, &mut sink) {
        Verdict::Pass => xdp_action::XDP_PASS,
    }
}

#[link_section = "license"]
#[no_mangle]
static LICENSE: [u8; 4] = *b"GPL\0";

#[cfg(not(test))]
#[panic_handler]
fn panic(_info: &core::panic::PanicInfo) -> ! {
    loop {}
}
