//! The raw-socket echo prober.

use crate::packet::{
    build_echo_request_v4, build_echo_request_v6, classify_v4, classify_v6, ReplyClass,
};
use crate::transport::RawIcmpSocket;
use async_trait::async_trait;
use pmtud_core::{IpFamily, PmtuError, ProbeOutcome, ProbeRequest, Prober, ProberFactory};
use std::net::IpAddr;
use std::time::Instant;
use tracing::trace;

/// Covers the largest possible reply plus link-layer slack.
const RECV_BUFFER_LEN: usize = 65536 + 128;

/// Sends ICMP Echo Requests over a raw socket and classifies what comes
/// back. Exactly one packet is transmitted per [`Prober::probe`] call;
/// retries are the caller's policy.
pub struct IcmpProber {
    socket: RawIcmpSocket,
    target: IpAddr,
    buffer: Vec<u8>,
}

impl IcmpProber {
    /// Opens a raw ICMP socket of the target's family.
    pub fn new(target: IpAddr) -> Result<Self, PmtuError> {
        let socket = RawIcmpSocket::open(IpFamily::of(target))?;
        Ok(Self {
            socket,
            target,
            buffer: vec![0u8; RECV_BUFFER_LEN],
        })
    }

    fn build_packet(&self, request: &ProbeRequest) -> Result<Vec<u8>, PmtuError> {
        match self.target {
            IpAddr::V4(dst) => build_echo_request_v4(dst, request),
            IpAddr::V6(_) => build_echo_request_v6(request),
        }
    }
}

#[async_trait]
impl Prober for IcmpProber {
    async fn probe(&mut self, request: &ProbeRequest) -> ProbeOutcome {
        let packet = match self.build_packet(request) {
            Ok(packet) => packet,
            Err(e) => return ProbeOutcome::TransportError(e.to_string()),
        };

        let sent_at = Instant::now();
        if let Err(e) = self.socket.send_to(&packet, self.target) {
            // The local stack refusing the size is a path bound in itself:
            // the first hop is our own interface.
            if e.raw_os_error() == Some(libc::EMSGSIZE) {
                trace!(size = request.size, "send rejected by local interface MTU");
                return ProbeOutcome::FragmentationNeeded { mtu_hint: None };
            }
            return ProbeOutcome::TransportError(e.to_string());
        }

        let deadline = sent_at + request.timeout;
        loop {
            let n = match self.socket.recv_deadline(&mut self.buffer, deadline).await {
                Ok(n) => n,
                Err(PmtuError::Timeout) => return ProbeOutcome::Timeout,
                Err(e) => return ProbeOutcome::TransportError(e.to_string()),
            };

            let class = match self.socket.family() {
                IpFamily::V4 => classify_v4(&self.buffer[..n]),
                IpFamily::V6 => classify_v6(&self.buffer[..n]),
            };

            match class {
                ReplyClass::EchoReply { ident, seq }
                    if ident == request.ident && seq == request.seq =>
                {
                    return ProbeOutcome::Delivered {
                        rtt: sent_at.elapsed(),
                    };
                }
                ReplyClass::FragmentationNeeded {
                    ident,
                    seq,
                    mtu_hint,
                } if ident == request.ident && seq == request.seq => {
                    return ProbeOutcome::FragmentationNeeded { mtu_hint };
                }
                ReplyClass::Unreachable { ident, seq }
                    if ident == request.ident && seq == request.seq =>
                {
                    return ProbeOutcome::Unreachable;
                }
                _ => {
                    // Raw sockets see every ICMP packet on the host; stale
                    // or foreign ones are skipped until the deadline.
                    trace!(len = n, "ignored packet not matching probe");
                }
            }
        }
    }
}

/// Opens [`IcmpProber`]s over the host's raw ICMP transport.
#[derive(Debug, Default, Clone, Copy)]
pub struct IcmpProberFactory;

impl ProberFactory for IcmpProberFactory {
    fn open(&self, target: IpAddr) -> Result<Box<dyn Prober>, PmtuError> {
        Ok(Box::new(IcmpProber::new(target)?))
    }
}
