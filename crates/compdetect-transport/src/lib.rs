pub use compdetect_core::{ProbeConfig, ProbePhase, ProbeSession, Role, Verdict};
pub mod channel;
pub mod client;
pub mod receiver;
pub mod sender;
pub mod server;

pub use channel::{ChannelListener, ResultChannel};
pub use client::{ProbeClient, Schedule};
pub use receiver::{ReceiveOutcome, Termination, TrainReceiver};
pub use sender::TrainSender;
pub use server::{ProbeServer, ServerReport};

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};

/// Wildcard address of the same family as `peer`.
pub(crate) fn unspecified(peer: IpAddr, port: u16) -> SocketAddr {
    match peer {
        IpAddr::V4(_) => SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), port),
        IpAddr::V6(_) => SocketAddr::new(IpAddr::V6(Ipv6Addr::UNSPECIFIED), port),
    }
}
