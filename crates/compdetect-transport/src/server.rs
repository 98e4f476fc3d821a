use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};
use std::time::Duration;

use compdetect_core::{
    CompDetectError, DetectionEngine, DetectionResult, ProbeConfig, ProbePhase, ProbeSession, Role,
};

use crate::channel::{ChannelListener, MAX_CONFIG_MESSAGE};
use crate::receiver::{ReceiveOutcome, TrainReceiver, PROBE_CUTOFF};

/// What the server learned during one run.
#[derive(Debug, Clone)]
pub struct ServerReport {
    pub config: ProbeConfig,
    pub outcome: ReceiveOutcome,
    pub result: DetectionResult,
}

/// Server role: receive config, classify both trains, report the verdict.
pub struct ProbeServer {
    preprobe: ChannelListener,
    cutoff: Duration,
}

impl ProbeServer {
    /// Opens the pre-probe endpoint. Nothing else is bound until the
    /// client's configuration arrives.
    pub fn bind(preprobe_addr: SocketAddr) -> Result<Self, CompDetectError> {
        Ok(Self {
            preprobe: ChannelListener::bind(preprobe_addr)?,
            cutoff: PROBE_CUTOFF,
        })
    }

    /// Opens the pre-probe endpoint on every local address, IPv4 and IPv6.
    ///
    /// Falls back to the IPv4 wildcard on hosts without IPv6.
    pub fn bind_any(port: u16) -> Result<Self, CompDetectError> {
        match Self::bind(SocketAddr::from((Ipv6Addr::UNSPECIFIED, port))) {
            Ok(server) => Ok(server),
            Err(e) => {
                tracing::warn!("Dual-stack bind on port {} failed ({}), using IPv4 only", port, e);
                Self::bind(SocketAddr::from((Ipv4Addr::UNSPECIFIED, port)))
            }
        }
    }

    pub fn with_cutoff(mut self, cutoff: Duration) -> Self {
        self.cutoff = cutoff;
        self
    }

    pub fn local_addr(&self) -> Result<SocketAddr, CompDetectError> {
        self.preprobe.local_addr()
    }

    /// Runs all three phases to completion. Any error ends the session.
    pub fn run(self) -> Result<ServerReport, CompDetectError> {
        let mut session = ProbeSession::new(Role::Server);
        let report = serve_phases(&mut session, self.preprobe, self.cutoff);
        report.map_err(|e| session.fail(e))
    }
}

fn serve_phases(
    session: &mut ProbeSession,
    preprobe: ChannelListener,
    cutoff: Duration,
) -> Result<ServerReport, CompDetectError> {
    session.advance()?;
    let config = serve_pre_probe(preprobe)?;

    session.advance()?;
    let (outcome, result) = serve_probe(&config, cutoff)?;

    session.advance()?;
    serve_post_probe(&config, &result)?;

    let phase = session.advance()?;
    debug_assert_eq!(phase, ProbePhase::Done);

    Ok(ServerReport { config, outcome, result })
}

fn serve_pre_probe(preprobe: ChannelListener) -> Result<ProbeConfig, CompDetectError> {
    let blob = preprobe.accept_one()?.recv_message(MAX_CONFIG_MESSAGE)?;
    let config = ProbeConfig::from_blob(&blob)?;
    tracing::info!(
        "Pre-probe: l={} n={} tau={}ms udp_dst_port={} postprobe_port={}",
        config.l,
        config.n,
        config.tau,
        config.udp_dst_port,
        config.server_port_postprobing
    );
    Ok(config)
}

fn serve_probe(
    config: &ProbeConfig,
    cutoff: Duration,
) -> Result<(ReceiveOutcome, DetectionResult), CompDetectError> {
    let outcome = TrainReceiver::for_config(config)?
        .with_cutoff(cutoff)
        .run(config.payload_len())?;

    let result = DetectionEngine::new(config.tau).evaluate(&outcome.low, &outcome.high);
    Ok((outcome, result))
}

fn serve_post_probe(config: &ProbeConfig, result: &DetectionResult) -> Result<(), CompDetectError> {
    let addr = crate::unspecified(config.server_ip_addr, config.server_port_postprobing);
    let message = result.verdict().message();

    ChannelListener::bind(addr)?
        .accept_one()?
        .send_message(message.as_bytes())?;

    tracing::info!("Post-probe: sent \"{}\"", message);
    Ok(())
}
