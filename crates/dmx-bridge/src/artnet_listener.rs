//! Art-Net receiver.
//!
//! Listens on `0.0.0.0:<artnet.port>` and turns every ArtDmx (OpDmx) datagram
//! into a `LightingFrame` for the dispatcher. Other opcodes (ArtPoll, ArtSync,
//! ...) are ignored; datagrams that do not decode are dropped.

use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::time::Duration;

use artnet_protocol::ArtCommand;
use socket2::{Domain, Protocol, Socket, Type};
use tokio::net::UdpSocket;
use tracing::{debug, info, trace, warn};

use dmx_protocol::events::LightingFrame;
use dmx_protocol::DMX_CHANNELS;

use crate::dispatcher::Dispatcher;

/// Largest Art-Net packet we expect (ArtDmx header + 512 channels) with headroom.
const RECV_BUFFER: usize = 1024;

pub struct ArtnetListener {
    socket: UdpSocket,
}

impl ArtnetListener {
    /// Bind the Art-Net port. Port 0 picks an ephemeral port.
    pub fn bind(port: u16) -> std::io::Result<Self> {
        let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))?;
        // Share the port with other Art-Net tools on the same host
        socket.set_reuse_address(true)?;
        socket.set_broadcast(true)?;

        let addr = SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, port);
        socket.bind(&addr.into())?;
        socket.set_nonblocking(true)?;

        let std_socket: std::net::UdpSocket = socket.into();
        let socket = UdpSocket::from_std(std_socket)?;
        info!(port, "Art-Net listener bound");
        Ok(Self { socket })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    /// Receive loop. Frames are dispatched one at a time, in arrival order.
    pub async fn run(self, mut dispatcher: Dispatcher) {
        let mut buf = [0u8; RECV_BUFFER];

        loop {
            match self.socket.recv_from(&mut buf).await {
                Ok((len, origin)) => {
                    if let Some(frame) = decode_frame(&buf[..len], origin) {
                        dispatcher.on_frame(frame).await;
                    }
                }
                Err(e) => {
                    warn!(error = %e, "Art-Net recv error");
                    tokio::time::sleep(Duration::from_millis(100)).await;
                }
            }
        }
    }
}

/// Decode one datagram. Only ArtDmx yields a frame.
pub fn decode_frame(datagram: &[u8], origin: SocketAddr) -> Option<LightingFrame> {
    let command = match ArtCommand::from_buffer(datagram) {
        Ok(c) => c,
        Err(e) => {
            debug!(origin = %origin, len = datagram.len(), error = %e, "Dropping undecodable datagram");
            return None;
        }
    };

    match command {
        ArtCommand::Output(output) => {
            let data: &[u8] = output.data.as_ref();
            let data = &data[..data.len().min(DMX_CHANNELS)];
            Some(LightingFrame {
                universe: u16::from(output.port_address),
                data: data.to_vec(),
                origin,
            })
        }
        other => {
            trace!(origin = %origin, command = ?other, "Ignoring non-DMX Art-Net packet");
            None
        }
    }
}
