use std::io;
use std::net::SocketAddr;
use std::os::unix::io::AsRawFd;

use compdetect_codec::{EntropyClass, PayloadFactory, TrainTemplate};
use compdetect_core::config::MAX_TRAIN_LEN;
use compdetect_core::{CompDetectError, ProbeConfig};
use socket2::{Domain, Protocol, SockAddr, Socket, Type};

/// Open-loop packet-train transmitter for the client's probing phase.
pub struct TrainSender {
    socket: Socket,
    destination: SockAddr,
    ipv4: bool,
}

impl TrainSender {
    /// Binds the probe socket to `udp_src_port` and disables fragmentation.
    pub fn bind(config: &ProbeConfig) -> Result<Self, CompDetectError> {
        let destination = config.probe_dst_addr();
        let domain = Domain::for_address(destination);
        let socket = Socket::new(domain, Type::DGRAM, Some(Protocol::UDP))?;

        let local = crate::unspecified(destination.ip(), config.udp_src_port);
        socket.bind(&local.into())?;

        set_dont_fragment(&socket, destination.is_ipv4())?;

        if let Some(ttl) = config.ttl {
            if destination.is_ipv4() {
                socket.set_ttl(u32::from(ttl))?;
            } else {
                socket.set_unicast_hops_v6(u32::from(ttl))?;
            }
            tracing::debug!("Probe TTL set to {}", ttl);
        }

        Ok(Self {
            socket,
            destination: destination.into(),
            ipv4: destination.is_ipv4(),
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, CompDetectError> {
        self.socket.local_addr()?.as_socket().ok_or_else(|| {
            let msg = "probe socket has no IP address";
            CompDetectError::Transport(io::Error::new(io::ErrorKind::Other, msg))
        })
    }

    /// Hop limit currently applied to outgoing probes.
    pub fn ttl(&self) -> Result<u32, CompDetectError> {
        let ttl = if self.ipv4 {
            self.socket.ttl()?
        } else {
            self.socket.unicast_hops_v6()?
        };
        Ok(ttl)
    }

    /// Whether the kernel is in path-MTU "do" mode for this socket.
    pub fn dont_fragment(&self) -> Result<bool, CompDetectError> {
        Ok(get_dont_fragment(&self.socket, self.ipv4)?)
    }

    /// Sends ids `0..count` back-to-back, patching only the id field.
    ///
    /// There is no pacing inside a train and no retry: the first failed or
    /// short send aborts the probe. Ids are 16-bit, so `count` may not
    /// exceed `MAX_TRAIN_LEN`.
    pub fn send_train(
        &self,
        template: &mut TrainTemplate,
        count: u32,
    ) -> Result<(), CompDetectError> {
        if count > MAX_TRAIN_LEN {
            return Err(CompDetectError::InvalidConfig(format!(
                "train of {} packets overflows the 16-bit id space ({})",
                count, MAX_TRAIN_LEN
            )));
        }

        let len = template.len();
        for id in 0..count {
            template.set_id(id as u16);
            let sent = self.socket.send_to(template.as_bytes(), &self.destination)?;
            if sent != len {
                return Err(CompDetectError::Transport(io::Error::new(
                    io::ErrorKind::WriteZero,
                    format!("sent {} of {} bytes for packet {}", sent, len, id),
                )));
            }
        }
        tracing::info!("Sent {:?} entropy train: {} x {} bytes", template.class(), count, len);
        Ok(())
    }
}

/// Client-side probing phase: low train, `gamma` pause, high train.
pub fn run_probe(config: &ProbeConfig) -> Result<(), CompDetectError> {
    let sender = TrainSender::bind(config)?;
    let factory = PayloadFactory::new(config.payload_len(), config.udp_head_bytes);

    let mut low = factory.generate(EntropyClass::Low)?;
    sender.send_train(&mut low, config.n)?;
    drop(low);

    tracing::debug!("Waiting {}s before the high entropy train", config.gamma);
    std::thread::sleep(config.inter_train_delay());

    let mut high = factory.generate(EntropyClass::High)?;
    sender.send_train(&mut high, config.n)?;
    Ok(())
}

/// Forces path-MTU discovery "do" mode so trains are never fragmented.
#[cfg(target_os = "linux")]
fn set_dont_fragment(socket: &Socket, ipv4: bool) -> io::Result<()> {
    let (level, name, value) = mtu_discover_option(ipv4);

    // # Path-MTU "do" mode
    // Sets DF on every datagram and turns an oversized send into EMSGSIZE,
    // so no train packet is ever split on the way to the server.
    unsafe {
        let val: libc::c_int = value;
        let rc = libc::setsockopt(
            socket.as_raw_fd(),
            level,
            name,
            &val as *const libc::c_int as *const libc::c_void,
            std::mem::size_of::<libc::c_int>() as libc::socklen_t,
        );
        if rc != 0 {
            return Err(io::Error::last_os_error());
        }
    }
    Ok(())
}

#[cfg(target_os = "linux")]
fn get_dont_fragment(socket: &Socket, ipv4: bool) -> io::Result<bool> {
    let (level, name, expected) = mtu_discover_option(ipv4);

    // Reads back the discovery mode the kernel actually holds for the socket.
    unsafe {
        let mut val: libc::c_int = 0;
        let mut len = std::mem::size_of::<libc::c_int>() as libc::socklen_t;
        let rc = libc::getsockopt(
            socket.as_raw_fd(),
            level,
            name,
            &mut val as *mut libc::c_int as *mut libc::c_void,
            &mut len,
        );
        if rc != 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(val == expected)
    }
}

#[cfg(target_os = "linux")]
fn mtu_discover_option(ipv4: bool) -> (libc::c_int, libc::c_int, libc::c_int) {
    if ipv4 {
        (libc::IPPROTO_IP, libc::IP_MTU_DISCOVER, libc::IP_PMTUDISC_DO)
    } else {
        (libc::IPPROTO_IPV6, libc::IPV6_MTU_DISCOVER, libc::IPV6_PMTUDISC_DO)
    }
}

#[cfg(not(target_os = "linux"))]
fn set_dont_fragment(_socket: &Socket, _ipv4: bool) -> io::Result<()> {
    Err(mtu_discover_unsupported())
}

#[cfg(not(target_os = "linux"))]
fn get_dont_fragment(_socket: &Socket, _ipv4: bool) -> io::Result<bool> {
    Err(mtu_discover_unsupported())
}

#[cfg(not(target_os = "linux"))]
fn mtu_discover_unsupported() -> io::Error {
    io::Error::new(
        io::ErrorKind::Unsupported,
        "don't-fragment probing requires IP_MTU_DISCOVER",
    )
}
