//! The MRI telemetry frame.
//!
//! Every switch a packet traverses appends one [`SwitchTrace`] to the extension header that
//! sits between the Ethernet header and the IPv4 header:
//!
//! ```text
//! 0       6       12       14       16       18                     18+16N
//! +-------+-------+--------+--------+--------+----------------------+-------------+
//! | dst   | src   | 0x88B5 | hops N | 0x0800 | N x 16B SwitchTrace  | IPv4 header |
//! +-------+-------+--------+--------+--------+----------------------+-------------+
//! ```
//!
//! A trace is `swid: u16 | qdepth: u32 | timestamp: u32 | timedelta: u32 | rule_id: u16`.
//! All fields are big-endian, fixed width, without delimiters.

use std::net::Ipv4Addr;

use bytes::{Buf, BufMut, Bytes, BytesMut};
use pnet::packet::{
    ethernet::{EtherType, EthernetPacket},
    ipv4::Ipv4Packet,
    Packet as _,
};
use thiserror::Error;

use crate::RuleId;

/// EtherType announcing the MRI extension header (IEEE local experimental).
pub const ETHERTYPE_MRI: u16 = 0x88B5;
/// EtherType of the encapsulated packet. Only IPv4 is carried.
pub const ETHERTYPE_IPV4: u16 = 0x0800;

/// Length of the Ethernet header preceding the extension header.
pub const ETHERNET_HEADER_LEN: usize = 14;
/// Length of the fixed part of the extension header (hop count + inner EtherType).
pub const MRI_HEADER_LEN: usize = 4;
/// Length of a single encoded [`SwitchTrace`].
pub const SWITCH_TRACE_LEN: usize = 16;
/// Length of an IPv4 header without options.
pub const IPV4_HEADER_LEN: usize = 20;

const IPV4_TTL: u8 = 64;
const IPPROTO_UDP: u8 = 17;

/// A frame could not be decoded.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum DecodeError {
    /// The frame ends before the header or a trace it announces.
    #[error("truncated frame: {needed} bytes needed, {available} available")]
    Truncated {
        /// Bytes the header announces.
        needed: usize,
        /// Bytes actually captured.
        available: usize,
    },
}

/// A frame could not be encoded.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum EncodeError {
    /// More traces than the hop count can express.
    #[error("{0} traces do not fit the 16-bit hop count")]
    TooManyHops(usize),
    /// The IPv4 total length would exceed `u16::MAX`.
    #[error("payload of {0} bytes does not fit an IPv4 packet")]
    PayloadTooLarge(usize),
}

/// One hop's telemetry sample.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SwitchTrace {
    /// Numeric id of the switch that produced the sample.
    pub switch_id: u16,
    /// Egress queue depth, in packets.
    pub queue_depth: u32,
    /// Switch-local ingress timestamp, in microseconds.
    pub timestamp: u32,
    /// Time the packet spent in the switch, in microseconds.
    pub time_delta: u32,
    /// Id of the forwarding rule the packet matched.
    pub rule_id: RuleId,
}

impl SwitchTrace {
    /// Reads a trace from `src`. The caller guarantees [`SWITCH_TRACE_LEN`] bytes remain.
    fn decode(src: &mut impl Buf) -> Self {
        Self {
            switch_id: src.get_u16(),
            queue_depth: src.get_u32(),
            timestamp: src.get_u32(),
            time_delta: src.get_u32(),
            rule_id: src.get_u16(),
        }
    }

    fn encode(&self, dst: &mut impl BufMut) {
        dst.put_u16(self.switch_id);
        dst.put_u32(self.queue_depth);
        dst.put_u32(self.timestamp);
        dst.put_u32(self.time_delta);
        dst.put_u16(self.rule_id);
    }
}

/// The telemetry content of a captured frame: the original sender and the traces collected
/// so far, in traversal order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TelemetryFrame {
    /// Source address of the encapsulated IPv4 packet.
    pub source: Ipv4Addr,
    /// One trace per traversed switch, first hop first.
    pub traces: Vec<SwitchTrace>,
}

impl TelemetryFrame {
    /// Creates a frame from `source` carrying `traces`.
    pub fn new(source: Ipv4Addr, traces: Vec<SwitchTrace>) -> Self {
        Self { source, traces }
    }

    /// Decodes a raw link-layer frame.
    ///
    /// Returns `Ok(None)` for frames that do not carry the extension header, and
    /// [`DecodeError::Truncated`] if the frame is too short for the hop count it declares.
    pub fn decode(frame: &[u8]) -> Result<Option<Self>, DecodeError> {
        let available = frame.len();

        let Some(ethernet) = EthernetPacket::new(frame) else {
            return Err(DecodeError::Truncated { needed: ETHERNET_HEADER_LEN, available });
        };

        if ethernet.get_ethertype() != EtherType(ETHERTYPE_MRI) {
            return Ok(None);
        }

        let mut cursor = ethernet.payload();
        if cursor.len() < MRI_HEADER_LEN {
            return Err(DecodeError::Truncated {
                needed: ETHERNET_HEADER_LEN + MRI_HEADER_LEN,
                available,
            });
        }

        let hops = cursor.get_u16() as usize;
        let inner = cursor.get_u16();

        let needed = ETHERNET_HEADER_LEN + MRI_HEADER_LEN + hops * SWITCH_TRACE_LEN + IPV4_HEADER_LEN;
        if available < needed {
            return Err(DecodeError::Truncated { needed, available });
        }

        if inner != ETHERTYPE_IPV4 {
            tracing::debug!(inner, "Extension header does not carry IPv4, ignoring frame");
            return Ok(None);
        }

        let traces = (0..hops).map(|_| SwitchTrace::decode(&mut cursor)).collect();

        // The length check above covers a full IPv4 header.
        let ipv4 = Ipv4Packet::new(cursor).ok_or(DecodeError::Truncated { needed, available })?;

        Ok(Some(Self { source: ipv4.get_source(), traces }))
    }

    /// Encodes the frame the way a switch would have emitted it, addressed to `destination`
    /// and carrying `payload` as the IPv4 payload.
    ///
    /// Fails if there are more than 65535 traces or the payload does not fit the IPv4 total
    /// length.
    pub fn encode(&self, destination: Ipv4Addr, payload: &[u8]) -> Result<Bytes, EncodeError> {
        let hops = u16::try_from(self.traces.len())
            .map_err(|_| EncodeError::TooManyHops(self.traces.len()))?;
        let total_len = u16::try_from(IPV4_HEADER_LEN + payload.len())
            .map_err(|_| EncodeError::PayloadTooLarge(payload.len()))?;

        let mut dst = BytesMut::with_capacity(
            ETHERNET_HEADER_LEN +
                MRI_HEADER_LEN +
                self.traces.len() * SWITCH_TRACE_LEN +
                IPV4_HEADER_LEN +
                payload.len(),
        );

        // Ethernet: broadcast destination, zero source.
        dst.put_slice(&[0xff; 6]);
        dst.put_slice(&[0x00; 6]);
        dst.put_u16(ETHERTYPE_MRI);

        dst.put_u16(hops);
        dst.put_u16(ETHERTYPE_IPV4);
        for trace in &self.traces {
            trace.encode(&mut dst);
        }

        let header = ipv4_header(self.source, destination, total_len);
        dst.put_slice(&header);
        dst.put_slice(payload);

        Ok(dst.freeze())
    }
}

/// Builds an option-less IPv4 header with a valid checksum.
fn ipv4_header(source: Ipv4Addr, destination: Ipv4Addr, total_len: u16) -> [u8; IPV4_HEADER_LEN] {
    let mut header = [0u8; IPV4_HEADER_LEN];

    let mut buf = &mut header[..];
    buf.put_u8(0x45); // version 4, IHL 5
    buf.put_u8(0);
    buf.put_u16(total_len);
    buf.put_u16(0);
    buf.put_u16(0x4000); // don't fragment
    buf.put_u8(IPV4_TTL);
    buf.put_u8(IPPROTO_UDP);
    buf.put_u16(0);
    buf.put_slice(&source.octets());
    buf.put_slice(&destination.octets());

    // The checksum is the 6th 16-bit word.
    let checksum = pnet::packet::util::checksum(&header, 5);
    header[10..12].copy_from_slice(&checksum.to_be_bytes());

    header
}
