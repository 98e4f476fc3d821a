use std::time::Duration;

use compdetect_core::{CompDetectError, ProbeConfig, ProbePhase, ProbeSession, Role, Verdict};

use crate::channel::{ResultChannel, MAX_VERDICT_MESSAGE};
use crate::sender;

/// Fixed waits that stand in for a handshake between the two roles.
///
/// The client has no way to know when the server is ready; these delays are
/// the whole synchronization contract and are supplied by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Schedule {
    /// Gives the server time to bind its probe socket.
    pub before_probe: Duration,
    /// Gives the server time to finish receiving and open the post-probe port.
    pub before_postprobe: Duration,
}

impl Default for Schedule {
    fn default() -> Self {
        Self {
            before_probe: Duration::from_secs(2),
            before_postprobe: Duration::from_secs(60),
        }
    }
}

/// Client role: ship config, send both trains, collect the verdict.
pub struct ProbeClient {
    config: ProbeConfig,
    schedule: Schedule,
}

impl ProbeClient {
    pub fn new(config: ProbeConfig, schedule: Schedule) -> Self {
        Self { config, schedule }
    }

    pub fn run(&self) -> Result<Verdict, CompDetectError> {
        let mut session = ProbeSession::new(Role::Client);
        let verdict = self.run_phases(&mut session);
        verdict.map_err(|e| session.fail(e))
    }

    fn run_phases(&self, session: &mut ProbeSession) -> Result<Verdict, CompDetectError> {
        session.advance()?;
        let blob = self.config.to_blob()?;
        ResultChannel::connect(self.config.preprobe_addr())?.send_message(&blob)?;
        tracing::info!("Pre-probe: configuration sent to {}", self.config.preprobe_addr());

        std::thread::sleep(self.schedule.before_probe);

        session.advance()?;
        sender::run_probe(&self.config)?;

        tracing::debug!(
            "Waiting {:?} for the server to finish probing",
            self.schedule.before_postprobe
        );
        std::thread::sleep(self.schedule.before_postprobe);

        session.advance()?;
        let message = ResultChannel::connect(self.config.postprobe_addr())?
            .recv_message(MAX_VERDICT_MESSAGE)?;
        let verdict = Verdict::from_message(&message)?;
        tracing::info!("Post-probe: server reported \"{}\"", verdict.message());

        let phase = session.advance()?;
        debug_assert_eq!(phase, ProbePhase::Done);
        Ok(verdict)
    }
}
