use std::time::Instant;

/// Wall-clock timer for a single challenge session.
///
/// `start` fires once, at the moment active play begins (never at nickname
/// entry); `stop` freezes the elapsed reading and is idempotent.
#[derive(Debug, Clone, Default)]
pub struct ScoreClock {
    started_at: Option<Instant>,
    frozen_ms: Option<u64>,
}

impl ScoreClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records the current instant. A second call before `stop` is a no-op.
    pub fn start(&mut self) {
        if self.started_at.is_none() {
            self.started_at = Some(Instant::now());
        }
    }

    pub fn has_started(&self) -> bool {
        self.started_at.is_some()
    }

    pub fn is_stopped(&self) -> bool {
        self.frozen_ms.is_some()
    }

    /// Elapsed play time in milliseconds: zero before `start`, live while
    /// running, frozen after `stop`.
    pub fn elapsed_ms(&self) -> u64 {
        if let Some(frozen) = self.frozen_ms {
            return frozen;
        }
        match self.started_at {
            Some(at) => at.elapsed().as_millis() as u64,
            None => 0,
        }
    }

    /// Freezes the elapsed reading. Calling twice yields the same value as
    /// calling once.
    pub fn stop(&mut self) {
        if self.frozen_ms.is_none() {
            self.frozen_ms = Some(self.elapsed_ms());
        }
    }
}
