//! Resolve a host/port pair to candidate remote addresses and bind a
//! datagram socket usable for one of them.

use std::net::{SocketAddr, ToSocketAddrs};

use socket2::{Domain, Protocol, Socket, Type};
use tokio::net::UdpSocket;
use tracing::{debug, warn};

use crate::error::{Result, TftpError};

/// Resolve `host:port`, try each candidate address family in turn, and
/// return a bound UDP socket plus the candidate address it should talk to
/// first.
///
/// TFTP servers commonly advertise both IPv4 and IPv6 records; we must
/// survive platforms where one family is disabled, so a creation failure
/// for "address family unsupported" or "protocol unsupported" moves on to
/// the next candidate rather than failing outright.
pub fn bind_socket(host: &str, port: u16) -> Result<(UdpSocket, SocketAddr)> {
    let candidates: Vec<SocketAddr> = (host, port)
        .to_socket_addrs()
        .map_err(TftpError::LocalIo)?
        .collect();

    for candidate in &candidates {
        let domain = match candidate {
            SocketAddr::V4(_) => Domain::IPV4,
            SocketAddr::V6(_) => Domain::IPV6,
        };

        let socket = match Socket::new(domain, Type::DGRAM, Some(Protocol::UDP)) {
            Ok(socket) => socket,
            Err(e) => match e.raw_os_error() {
                Some(libc::EAFNOSUPPORT) | Some(libc::EPROTONOSUPPORT) => {
                    debug!("socket family unsupported for {candidate}, trying next candidate");
                    continue;
                }
                _ => {
                    warn!("socket creation failed for {candidate}: {e}, trying next candidate");
                    continue;
                }
            },
        };

        let bind_addr: SocketAddr = match domain {
            Domain::IPV4 => "0.0.0.0:0".parse().unwrap(),
            _ => "[::]:0".parse().unwrap(),
        };
        if let Err(e) = socket.bind(&bind_addr.into()) {
            warn!("bind failed for {candidate}: {e}, trying next candidate");
            continue;
        }
        if let Err(e) = socket.set_nonblocking(true) {
            warn!("set_nonblocking failed for {candidate}: {e}, trying next candidate");
            continue;
        }

        let std_socket: std::net::UdpSocket = socket.into();
        let sock = UdpSocket::from_std(std_socket)?;
        debug!("bound {:?}, initial peer {candidate}", sock.local_addr()?);
        return Ok((sock, *candidate));
    }

    Err(TftpError::Unreachable {
        host: host.to_string(),
        port,
    })
}
