//! ICMP echo packet construction and reply classification.
//!
//! Framing follows RFC 792 (ICMP), RFC 1191 (the next-hop MTU field of
//! Fragmentation Needed), and RFC 4443 (ICMPv6, Packet Too Big).

use crate::checksum::internet_checksum;
use pmtud_core::{PmtuError, ProbeRequest};
use pnet_packet::icmp::destination_unreachable::{self, DestinationUnreachablePacket};
use pnet_packet::icmp::echo_reply::EchoReplyPacket;
use pnet_packet::icmp::echo_request::MutableEchoRequestPacket;
use pnet_packet::icmp::{IcmpCode, IcmpPacket, IcmpTypes};
use pnet_packet::icmpv6::{Icmpv6Code, Icmpv6Packet, Icmpv6Types};
use pnet_packet::ip::IpNextHeaderProtocols;
use pnet_packet::ipv4::{Ipv4Flags, MutableIpv4Packet};
use pnet_packet::Packet;
use std::net::Ipv4Addr;

pub const IPV4_HEADER_LEN: usize = 20;
pub const IPV6_HEADER_LEN: usize = 40;
pub const ICMP_HEADER_LEN: usize = 8;

/// Deterministic filler for echo payloads.
const PAYLOAD_FILLER: u8 = 0xa5;

const PROBE_TTL: u8 = 64;

/// Builds an IPv4 ICMP Echo Request datagram of exactly `request.size`
/// bytes, IP header included, with the Don't Fragment flag set.
///
/// The source address is left unspecified; the kernel fills it when the
/// packet is sent over a header-included raw socket.
pub fn build_echo_request_v4(
    dst: Ipv4Addr,
    request: &ProbeRequest,
) -> Result<Vec<u8>, PmtuError> {
    let total_len = request.size as usize;
    if total_len < IPV4_HEADER_LEN + ICMP_HEADER_LEN {
        return Err(PmtuError::Internal(format!(
            "probe size {} below minimum v4 echo datagram",
            request.size
        )));
    }

    let mut buffer = vec![0u8; total_len];

    {
        let mut ip = MutableIpv4Packet::new(&mut buffer)
            .ok_or_else(|| PmtuError::Internal("failed to create IP packet".to_string()))?;
        ip.set_version(4);
        ip.set_header_length(5);
        ip.set_total_length(request.size);
        ip.set_identification(request.ident);
        ip.set_flags(Ipv4Flags::DontFragment);
        ip.set_ttl(PROBE_TTL);
        ip.set_next_level_protocol(IpNextHeaderProtocols::Icmp);
        ip.set_source(Ipv4Addr::UNSPECIFIED);
        ip.set_destination(dst);

        let ip_checksum = pnet_packet::ipv4::checksum(&ip.to_immutable());
        ip.set_checksum(ip_checksum);
    }

    {
        let mut icmp = MutableEchoRequestPacket::new(&mut buffer[IPV4_HEADER_LEN..])
            .ok_or_else(|| PmtuError::Internal("failed to create ICMP packet".to_string()))?;
        icmp.set_icmp_type(IcmpTypes::EchoRequest);
        icmp.set_icmp_code(IcmpCode::new(0));
        icmp.set_identifier(request.ident);
        icmp.set_sequence_number(request.seq);
    }

    for byte in &mut buffer[IPV4_HEADER_LEN + ICMP_HEADER_LEN..] {
        *byte = PAYLOAD_FILLER;
    }

    let checksum = internet_checksum(&buffer[IPV4_HEADER_LEN..]);
    buffer[IPV4_HEADER_LEN + 2..IPV4_HEADER_LEN + 4].copy_from_slice(&checksum.to_be_bytes());

    Ok(buffer)
}

/// Builds an ICMPv6 Echo Request message sized so the resulting datagram is
/// exactly `request.size` bytes once the kernel adds the IPv6 header.
///
/// The checksum is left zero: ICMPv6 checksums cover the IPv6 pseudo-header,
/// which only the kernel knows, and raw ICMPv6 sockets fill it on send.
pub fn build_echo_request_v6(request: &ProbeRequest) -> Result<Vec<u8>, PmtuError> {
    let total_len = request.size as usize;
    if total_len < IPV6_HEADER_LEN + ICMP_HEADER_LEN {
        return Err(PmtuError::Internal(format!(
            "probe size {} below minimum v6 echo datagram",
            request.size
        )));
    }

    let mut buffer = vec![0u8; total_len - IPV6_HEADER_LEN];

    {
        let mut icmp = pnet_packet::icmpv6::echo_request::MutableEchoRequestPacket::new(&mut buffer)
            .ok_or_else(|| PmtuError::Internal("failed to create ICMPv6 packet".to_string()))?;
        icmp.set_icmpv6_type(Icmpv6Types::EchoRequest);
        icmp.set_icmpv6_code(Icmpv6Code::new(0));
        icmp.set_identifier(request.ident);
        icmp.set_sequence_number(request.seq);
    }

    for byte in &mut buffer[ICMP_HEADER_LEN..] {
        *byte = PAYLOAD_FILLER;
    }

    Ok(buffer)
}

/// Classification of one inbound packet against an outstanding probe.
///
/// Identifier and sequence are those of the probe the packet answers: taken
/// from the echo header for replies, recovered from the embedded original
/// datagram for control messages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplyClass {
    EchoReply {
        ident: u16,
        seq: u16,
    },
    FragmentationNeeded {
        ident: u16,
        seq: u16,
        mtu_hint: Option<u16>,
    },
    Unreachable {
        ident: u16,
        seq: u16,
    },
    /// Not a packet this discovery cares about; keep reading.
    Unrelated,
}

/// Classifies an inbound IPv4 packet (starting at the IP header).
pub fn classify_v4(buf: &[u8]) -> ReplyClass {
    if buf.len() < IPV4_HEADER_LEN || buf[0] >> 4 != 4 {
        return ReplyClass::Unrelated;
    }
    let header_len = ((buf[0] & 0x0f) as usize) * 4;
    if header_len < IPV4_HEADER_LEN || buf.len() < header_len {
        return ReplyClass::Unrelated;
    }
    if buf[9] != IpNextHeaderProtocols::Icmp.0 {
        return ReplyClass::Unrelated;
    }

    let icmp_buf = &buf[header_len..];
    let Some(icmp) = IcmpPacket::new(icmp_buf) else {
        return ReplyClass::Unrelated;
    };

    match icmp.get_icmp_type() {
        IcmpTypes::EchoReply => {
            let Some(reply) = EchoReplyPacket::new(icmp_buf) else {
                return ReplyClass::Unrelated;
            };
            ReplyClass::EchoReply {
                ident: reply.get_identifier(),
                seq: reply.get_sequence_number(),
            }
        }
        IcmpTypes::DestinationUnreachable => {
            let Some(unreach) = DestinationUnreachablePacket::new(icmp_buf) else {
                return ReplyClass::Unrelated;
            };
            let Some((ident, seq)) = embedded_echo_v4(unreach.payload()) else {
                return ReplyClass::Unrelated;
            };
            if unreach.get_icmp_code()
                == destination_unreachable::IcmpCodes::FragmentationRequiredAndDFFlagSet
            {
                // RFC 1191: next-hop MTU in the low half of the unused
                // field; zero on middleboxes that don't fill it.
                let mtu = (unreach.get_unused() & 0xffff) as u16;
                ReplyClass::FragmentationNeeded {
                    ident,
                    seq,
                    mtu_hint: (mtu != 0).then_some(mtu),
                }
            } else {
                ReplyClass::Unreachable { ident, seq }
            }
        }
        _ => ReplyClass::Unrelated,
    }
}

/// Classifies an inbound ICMPv6 message (no IP header on raw v6 sockets).
pub fn classify_v6(buf: &[u8]) -> ReplyClass {
    let Some(icmp) = Icmpv6Packet::new(buf) else {
        return ReplyClass::Unrelated;
    };

    match icmp.get_icmpv6_type() {
        Icmpv6Types::EchoReply => {
            let Some(reply) = pnet_packet::icmpv6::echo_reply::EchoReplyPacket::new(buf) else {
                return ReplyClass::Unrelated;
            };
            ReplyClass::EchoReply {
                ident: reply.get_identifier(),
                seq: reply.get_sequence_number(),
            }
        }
        Icmpv6Types::PacketTooBig => {
            // RFC 4443: [type code checksum][MTU u32][invoking packet].
            if buf.len() < ICMP_HEADER_LEN {
                return ReplyClass::Unrelated;
            }
            let mtu = u32::from_be_bytes([buf[4], buf[5], buf[6], buf[7]]);
            let Some((ident, seq)) = embedded_echo_v6(&buf[ICMP_HEADER_LEN..]) else {
                return ReplyClass::Unrelated;
            };
            let mtu_hint = if mtu > 0 && mtu <= u32::from(u16::MAX) {
                Some(mtu as u16)
            } else {
                None
            };
            ReplyClass::FragmentationNeeded {
                ident,
                seq,
                mtu_hint,
            }
        }
        Icmpv6Types::DestinationUnreachable => {
            if buf.len() < ICMP_HEADER_LEN {
                return ReplyClass::Unrelated;
            }
            let Some((ident, seq)) = embedded_echo_v6(&buf[ICMP_HEADER_LEN..]) else {
                return ReplyClass::Unrelated;
            };
            ReplyClass::Unreachable { ident, seq }
        }
        _ => ReplyClass::Unrelated,
    }
}

/// Recovers the identifier/sequence of our echo request from the original
/// IPv4 datagram embedded in an ICMP error message.
fn embedded_echo_v4(inner: &[u8]) -> Option<(u16, u16)> {
    if inner.len() < IPV4_HEADER_LEN || inner[0] >> 4 != 4 {
        return None;
    }
    let header_len = ((inner[0] & 0x0f) as usize) * 4;
    if inner[9] != IpNextHeaderProtocols::Icmp.0 {
        return None;
    }
    let echo = inner.get(header_len..header_len + ICMP_HEADER_LEN)?;
    if echo[0] != IcmpTypes::EchoRequest.0 {
        return None;
    }
    Some((
        u16::from_be_bytes([echo[4], echo[5]]),
        u16::from_be_bytes([echo[6], echo[7]]),
    ))
}

/// Recovers the identifier/sequence of our echo request from the original
/// IPv6 datagram embedded in an ICMPv6 error message.
fn embedded_echo_v6(inner: &[u8]) -> Option<(u16, u16)> {
    if inner.len() < IPV6_HEADER_LEN + ICMP_HEADER_LEN || inner[0] >> 4 != 6 {
        return None;
    }
    if inner[6] != IpNextHeaderProtocols::Icmpv6.0 {
        return None;
    }
    let echo = &inner[IPV6_HEADER_LEN..];
    if echo[0] != Icmpv6Types::EchoRequest.0 {
        return None;
    }
    Some((
        u16::from_be_bytes([echo[4], echo[5]]),
        u16::from_be_bytes([echo[6], echo[7]]),
    ))
}
