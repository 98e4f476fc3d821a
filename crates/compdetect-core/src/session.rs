use core::fmt;

use crate::error::CompDetectError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Client,
    Server,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Client => f.write_str("client"),
            Role::Server => f.write_str("server"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ProbePhase {
    Idle,
    PreProbe,
    Probe,
    PostProbe,
    Done,
}

impl ProbePhase {
    fn next(self) -> Option<ProbePhase> {
        match self {
            ProbePhase::Idle => Some(ProbePhase::PreProbe),
            ProbePhase::PreProbe => Some(ProbePhase::Probe),
            ProbePhase::Probe => Some(ProbePhase::PostProbe),
            ProbePhase::PostProbe => Some(ProbePhase::Done),
            ProbePhase::Done => None,
        }
    }
}

/// Phase tracker for one role of a detection run.
///
/// Each role walks `Idle -> PreProbe -> Probe -> PostProbe -> Done` on its
/// own; the two sides only meet through the network rendezvous. A fatal error
/// in any phase jumps straight to `Done`.
#[derive(Debug)]
pub struct ProbeSession {
    role: Role,
    phase: ProbePhase,
    failed: bool,
}

impl ProbeSession {
    pub fn new(role: Role) -> Self {
        Self {
            role,
            phase: ProbePhase::Idle,
            failed: false,
        }
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn phase(&self) -> ProbePhase {
        self.phase
    }

    /// True once `Done` was reached through `fail`.
    pub fn failed(&self) -> bool {
        self.failed
    }

    pub fn is_done(&self) -> bool {
        self.phase == ProbePhase::Done
    }

    /// Moves to the next phase and returns it.
    pub fn advance(&mut self) -> Result<ProbePhase, CompDetectError> {
        let next = self.phase.next().ok_or_else(|| {
            CompDetectError::PhaseViolation(format!("{} session is already done", self.role))
        })?;
        tracing::info!("[{}] {:?} -> {:?}", self.role, self.phase, next);
        self.phase = next;
        Ok(next)
    }

    /// Terminates the session after a fatal error, handing the error back.
    pub fn fail(&mut self, err: CompDetectError) -> CompDetectError {
        tracing::error!("[{}] {:?} failed: {}", self.role, self.phase, err);
        self.phase = ProbePhase::Done;
        self.failed = true;
        err
    }
}
