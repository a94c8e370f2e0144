//! Raw ICMP socket transport.

use pmtud_core::{IpFamily, PmtuError};
use socket2::{Domain, Protocol, SockAddr, Socket, Type};
use std::io::Read;
use std::net::{IpAddr, SocketAddr};
use std::os::fd::AsRawFd;
use std::time::{Duration, Instant};

// Constants from linux headers not exported by libc.
#[cfg(target_os = "linux")]
const IP_MTU_DISCOVER: libc::c_int = 10;
#[cfg(target_os = "linux")]
const IPV6_MTU_DISCOVER: libc::c_int = 23;
#[cfg(target_os = "linux")]
const PMTUDISC_PROBE: libc::c_int = 3;

/// How often the nonblocking socket is polled while waiting for a reply.
const RECV_POLL_INTERVAL: Duration = Duration::from_millis(1);

/// One raw ICMP (or ICMPv6) socket, owned by a single discovery task.
pub struct RawIcmpSocket {
    socket: Socket,
    family: IpFamily,
}

impl RawIcmpSocket {
    /// Opens a nonblocking raw ICMP socket for the family.
    ///
    /// IPv4 packets carry caller-built IP headers so the DF flag stays under
    /// our control. On Linux the kernel's own path MTU handling is switched
    /// to probe mode so it neither fragments outgoing probes nor clamps them
    /// to a cached route MTU.
    pub fn open(family: IpFamily) -> Result<Self, PmtuError> {
        let (domain, protocol) = match family {
            IpFamily::V4 => (Domain::IPV4, Protocol::ICMPV4),
            IpFamily::V6 => (Domain::IPV6, Protocol::ICMPV6),
        };

        let socket =
            Socket::new(domain, Type::RAW, Some(protocol)).map_err(PmtuError::SocketCreation)?;
        socket
            .set_nonblocking(true)
            .map_err(PmtuError::SocketCreation)?;

        match family {
            IpFamily::V4 => {
                set_sockopt(&socket, libc::IPPROTO_IP, libc::IP_HDRINCL, 1)?;
                #[cfg(target_os = "linux")]
                set_sockopt(&socket, libc::IPPROTO_IP, IP_MTU_DISCOVER, PMTUDISC_PROBE)?;
            }
            IpFamily::V6 => {
                #[cfg(target_os = "linux")]
                set_sockopt(&socket, libc::IPPROTO_IPV6, IPV6_MTU_DISCOVER, PMTUDISC_PROBE)?;
            }
        }

        Ok(Self { socket, family })
    }

    /// The family this socket was opened for.
    pub fn family(&self) -> IpFamily {
        self.family
    }

    /// Sends one packet to the destination.
    pub fn send_to(&self, buf: &[u8], dest: IpAddr) -> std::io::Result<usize> {
        let addr = SockAddr::from(SocketAddr::new(dest, 0));
        self.socket.send_to(buf, &addr)
    }

    /// Reads the next inbound packet, waiting until `deadline`.
    ///
    /// Raw sockets deliver every ICMP packet the host receives, so callers
    /// must be prepared to read several unrelated packets per probe.
    pub async fn recv_deadline(
        &mut self,
        buf: &mut [u8],
        deadline: Instant,
    ) -> Result<usize, PmtuError> {
        loop {
            match (&self.socket).read(buf) {
                Ok(n) => return Ok(n),
                Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                    if Instant::now() >= deadline {
                        return Err(PmtuError::Timeout);
                    }
                    tokio::time::sleep(RECV_POLL_INTERVAL).await;
                }
                Err(e) => return Err(PmtuError::Transport(e.to_string())),
            }
        }
    }
}

fn set_sockopt(
    socket: &Socket,
    level: libc::c_int,
    name: libc::c_int,
    value: libc::c_int,
) -> Result<(), PmtuError> {
    let result = unsafe {
        libc::setsockopt(
            socket.as_raw_fd(),
            level,
            name,
            &value as *const _ as *const libc::c_void,
            std::mem::size_of::<libc::c_int>() as libc::socklen_t,
        )
    };

    if result < 0 {
        return Err(PmtuError::SocketCreation(std::io::Error::last_os_error()));
    }
    Ok(())
}
