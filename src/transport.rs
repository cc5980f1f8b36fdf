// Copyright 2026 U.S. Federal Government (in countries where recognized)
// SPDX-License-Identifier: Apache-2.0

//! IPv4/UDP multicast transport for PTP messages.
//!
//! PTP uses two UDP ports: 319 for event messages (Sync, Delay_Req), which
//! are the ones that matter for timestamping, and 320 for general messages
//! (Follow_Up, Delay_Resp, Announce). Both sockets join the primary PTP
//! multicast group `224.0.1.129`; the peer group `224.0.0.107` is joined as
//! well so peer-delay traffic on the segment is not filtered by IGMP
//! snooping switches, even though this endpoint never speaks it.
//!
//! # Security Warning
//!
//! Multicast PTP provides no authentication; any host on the segment can
//! claim to be a grandmaster. Use only on trusted networks.

use std::io;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4, UdpSocket};

use log::{info, warn};
use socket2::{Domain, Protocol, Socket, Type};

use crate::error::PtpError;

/// UDP port for event messages (Sync, Delay_Req).
pub const PTP_EVENT_PORT: u16 = 319;

/// UDP port for general messages (Follow_Up, Delay_Resp, Announce).
pub const PTP_GENERAL_PORT: u16 = 320;

/// The primary PTP multicast group, destination of all messages here.
pub const PTP_PRIMARY_MULTICAST: Ipv4Addr = Ipv4Addr::new(224, 0, 1, 129);

/// The peer-delay multicast group; joined but otherwise unused.
pub const PTP_PEER_MULTICAST: Ipv4Addr = Ipv4Addr::new(224, 0, 0, 107);

/// The network operations the protocol engine needs.
///
/// Receive operations are non-blocking: `Ok(None)` means no datagram is
/// waiting. The engine is driven by an outer super-loop and must never
/// block inside a handler.
pub trait Network {
    /// Send an event message to the primary multicast group, port 319.
    fn send_event(&mut self, buf: &[u8]) -> Result<usize, PtpError>;

    /// Send a general message to the primary multicast group, port 320.
    fn send_general(&mut self, buf: &[u8]) -> Result<usize, PtpError>;

    /// Poll the event socket; returns the payload length if one was read.
    fn recv_event(&mut self, buf: &mut [u8]) -> Result<Option<usize>, PtpError>;

    /// Poll the general socket; returns the payload length if one was read.
    fn recv_general(&mut self, buf: &mut [u8]) -> Result<Option<usize>, PtpError>;
}

/// A [`Network`] implementation over two multicast UDP sockets.
pub struct UdpTransport {
    event: UdpSocket,
    general: UdpSocket,
    interface: Ipv4Addr,
}

impl UdpTransport {
    /// Bind the event and general ports and join the PTP multicast groups
    /// on the given interface address.
    ///
    /// Both ports are privileged; binding them typically requires
    /// root/admin. A failure here is fatal to the endpoint (the port
    /// transitions to FAULTY).
    pub fn open(interface: Ipv4Addr) -> Result<Self, PtpError> {
        info!("transport: binding PTP event and general ports");
        let event = open_multicast_socket(PTP_EVENT_PORT, interface)?;
        let general = open_multicast_socket(PTP_GENERAL_PORT, interface)?;
        info!(
            "transport: joined {} and {} on {}",
            PTP_PRIMARY_MULTICAST, PTP_PEER_MULTICAST, interface
        );
        Ok(UdpTransport {
            event,
            general,
            interface,
        })
    }

    fn recv_on(socket: &UdpSocket, buf: &mut [u8]) -> Result<Option<usize>, PtpError> {
        match socket.recv_from(buf) {
            Ok((len, _src)) => Ok(Some(len)),
            Err(err) if err.kind() == io::ErrorKind::WouldBlock => Ok(None),
            Err(err) => Err(PtpError::Transport(err)),
        }
    }
}

impl Network for UdpTransport {
    fn send_event(&mut self, buf: &[u8]) -> Result<usize, PtpError> {
        let dst = SocketAddr::V4(SocketAddrV4::new(PTP_PRIMARY_MULTICAST, PTP_EVENT_PORT));
        Ok(self.event.send_to(buf, dst)?)
    }

    fn send_general(&mut self, buf: &[u8]) -> Result<usize, PtpError> {
        let dst = SocketAddr::V4(SocketAddrV4::new(PTP_PRIMARY_MULTICAST, PTP_GENERAL_PORT));
        Ok(self.general.send_to(buf, dst)?)
    }

    fn recv_event(&mut self, buf: &mut [u8]) -> Result<Option<usize>, PtpError> {
        Self::recv_on(&self.event, buf)
    }

    fn recv_general(&mut self, buf: &mut [u8]) -> Result<Option<usize>, PtpError> {
        Self::recv_on(&self.general, buf)
    }
}

impl Drop for UdpTransport {
    fn drop(&mut self) {
        for socket in [&self.event, &self.general] {
            for group in [PTP_PRIMARY_MULTICAST, PTP_PEER_MULTICAST] {
                if let Err(err) = socket.leave_multicast_v4(&group, &self.interface) {
                    warn!("transport: leaving {} failed: {}", group, err);
                }
            }
        }
    }
}

/// Create a non-blocking UDP socket bound to `port` on all interfaces,
/// joined to both PTP multicast groups.
fn open_multicast_socket(port: u16, interface: Ipv4Addr) -> Result<UdpSocket, PtpError> {
    let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))?;
    socket.set_reuse_address(true)?;
    socket.set_nonblocking(true)?;

    let bind_addr = SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, port));
    socket.bind(&bind_addr.into())?;
    socket.set_multicast_if_v4(&interface)?;

    let socket: UdpSocket = socket.into();
    socket.join_multicast_v4(&PTP_PRIMARY_MULTICAST, &interface)?;
    socket.join_multicast_v4(&PTP_PEER_MULTICAST, &interface)?;
    // Our own transmissions must not be looped back into the handlers.
    socket.set_multicast_loop_v4(false)?;
    Ok(socket)
}
