//! Single-shot TCP message channel used for the pre-probe configuration
//! handoff and the post-probe verdict.

use std::io::{Read, Write};
use std::net::{Shutdown, SocketAddr, TcpListener, TcpStream};

use compdetect_core::CompDetectError;
use socket2::{Domain, Protocol, Socket, Type};

/// Upper bound on the serialized configuration.
pub const MAX_CONFIG_MESSAGE: usize = 4096;
/// Upper bound on the verdict text.
pub const MAX_VERDICT_MESSAGE: usize = 64;

const LISTEN_BACKLOG: i32 = 5;

pub struct ChannelListener {
    listener: TcpListener,
}

impl ChannelListener {
    /// Binds and listens on `addr`. The IPv6 wildcard is bound dual-stack, so
    /// it also accepts IPv4 peers.
    pub fn bind(addr: SocketAddr) -> Result<Self, CompDetectError> {
        let socket = Socket::new(Domain::for_address(addr), Type::STREAM, Some(Protocol::TCP))?;
        socket.set_reuse_address(true)?;
        if addr.is_ipv6() && addr.ip().is_unspecified() {
            socket.set_only_v6(false)?;
        }
        socket.bind(&addr.into())?;
        socket.listen(LISTEN_BACKLOG)?;

        Ok(Self {
            listener: socket.into(),
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, CompDetectError> {
        Ok(self.listener.local_addr()?)
    }

    /// Accepts exactly one peer and closes the listening endpoint.
    pub fn accept_one(self) -> Result<ResultChannel, CompDetectError> {
        let (stream, peer) = self.listener.accept()?;
        tracing::debug!("Accepted {} on {:?}", peer, self.listener.local_addr().ok());
        Ok(ResultChannel { stream, peer })
    }
}

/// One connected end of a single-message exchange.
///
/// Both operations consume the channel, so a channel carries at most one message.
pub struct ResultChannel {
    stream: TcpStream,
    peer: SocketAddr,
}

impl ResultChannel {
    pub fn connect(addr: SocketAddr) -> Result<Self, CompDetectError> {
        let stream = TcpStream::connect(addr)?;
        tracing::debug!("Connected to {}", addr);
        Ok(Self { stream, peer: addr })
    }

    /// Writes the whole message and closes the write half.
    ///
    /// `write_all` fails with `WriteZero` if fewer bytes than requested are accepted.
    pub fn send_message(mut self, message: &[u8]) -> Result<(), CompDetectError> {
        self.stream.write_all(message)?;
        self.stream.flush()?;
        self.stream.shutdown(Shutdown::Write)?;
        tracing::debug!("Sent {} bytes to {}", message.len(), self.peer);
        Ok(())
    }

    /// Blocks until the peer closes, then returns what it sent.
    pub fn recv_message(mut self, limit: usize) -> Result<Vec<u8>, CompDetectError> {
        let mut message = Vec::new();
        (&mut self.stream)
            .take(limit as u64 + 1)
            .read_to_end(&mut message)?;

        if message.len() > limit {
            return Err(CompDetectError::ProtocolViolation(format!(
                "message from {} exceeds {} bytes",
                self.peer, limit
            )));
        }
        tracing::debug!("Received {} bytes from {}", message.len(), self.peer);
        Ok(message)
    }
}
