//! Out-of-band messaging: pong scheduling and dispatch of application OOB
//! codes. See [`PongScheduler`].

use web_time::{Duration, Instant};

use crate::{loss::GroupObservation, seq::GroupId, wire::Pong};

/// Minimum spacing between two pongs, so a burst of closing groups doesn't
/// flood the peer.
const MIN_PONG_INTERVAL: Duration = Duration::from_millis(10);

/// Accumulates closed-group statistics and decides, on each `Tick`, whether
/// a pong is due.
#[derive(Debug, Default)]
pub struct PongScheduler {
    pending: Option<(GroupId, GroupObservation)>,
    last_sent: Option<Instant>,
}

impl PongScheduler {
    /// Creates an empty scheduler.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a newly closed group's statistics as a pong candidate,
    /// overwriting whatever hadn't been sent yet (only the most recent
    /// closure needs acknowledging).
    pub fn observe(&mut self, code_group: GroupId, observation: GroupObservation) {
        self.pending = Some((code_group, observation));
    }

    /// If there's a pending observation and the minimum interval has
    /// elapsed, builds the pong to send and clears the pending state.
    pub fn due_pong(&mut self, now: Instant, local_rtt_estimate: Duration) -> Option<Pong> {
        let (code_group, observation) = self.pending?;

        if let Some(last) = self.last_sent {
            if now.saturating_duration_since(last) < MIN_PONG_INTERVAL {
                return None;
            }
        }

        self.pending = None;
        self.last_sent = Some(now);
        Some(Pong {
            code_group,
            seen: observation.seen,
            count: observation.count,
            #[allow(clippy::cast_possible_truncation)]
            rtt_ms: local_rtt_estimate.as_millis() as u32,
        })
    }
}
