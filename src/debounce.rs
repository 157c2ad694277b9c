// FaceCube — Face Debounce State Machine
//
// A debounced latch rather than a classic FSM: the accepted face only
// changes after a candidate face has been continuously observed for
// FACE_SETTLE_MS.  The settle time is deliberately long relative to the
// sampling rate — battery life and resistance to accidental bumps are
// worth more here than fast response.

use crate::config::FACE_SETTLE_MS;
use crate::events::Face;

/// What a tick decided, if anything.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaceAction {
    /// The accepted face changed; a new session has started.
    Switched(Face),
    /// The session crossed a whole-minute boundary (low-frequency heartbeat).
    SessionTick { face: Face, elapsed_s: u32 },
}

pub struct FaceTracker {
    accepted: Face,
    candidate: Face,
    candidate_since: i64,
    session_start: i64,
    last_heartbeat_s: u32,
}

impl FaceTracker {
    /// Initialise from the first classified reading at boot.  An `Unknown`
    /// first reading (cube mid-air, on an edge) falls back to face six so
    /// there is always a real accepted face.
    pub fn new(initial: Face, now_ms: i64) -> Self {
        let face = if initial == Face::Unknown {
            Face::Six
        } else {
            initial
        };
        Self {
            accepted: face,
            candidate: face,
            candidate_since: now_ms,
            session_start: now_ms,
            last_heartbeat_s: 0,
        }
    }

    pub fn accepted(&self) -> Face {
        self.accepted
    }

    /// Age of the current face session in whole seconds.
    pub fn session_delta_s(&self, now_ms: i64) -> u32 {
        if now_ms < self.session_start {
            return 0;
        }
        ((now_ms - self.session_start) / 1000) as u32
    }

    /// Feed one classified reading.  Must be called once per sample in
    /// arrival order — the settle timer depends on it.
    pub fn tick(&mut self, face: Face, now_ms: i64) -> Option<FaceAction> {
        // Unknown readings hold the last candidate: one noisy sample must
        // not discard progress toward a commit.
        if face != Face::Unknown {
            if face != self.candidate {
                // Any different reading restarts the settle timer.  This also
                // covers drifting back to the accepted face, which cancels a
                // pending switch.
                self.candidate = face;
                self.candidate_since = now_ms;
            } else if self.candidate != self.accepted
                && now_ms - self.candidate_since >= FACE_SETTLE_MS
            {
                self.accepted = self.candidate;
                self.session_start = now_ms;
                self.last_heartbeat_s = 0;
                return Some(FaceAction::Switched(self.accepted));
            }
        }

        let elapsed_s = self.session_delta_s(now_ms);
        if elapsed_s != 0 && elapsed_s % 60 == 0 && elapsed_s != self.last_heartbeat_s {
            self.last_heartbeat_s = elapsed_s;
            return Some(FaceAction::SessionTick {
                face: self.accepted,
                elapsed_s,
            });
        }

        None
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    const TICK_MS: i64 = 100;

    /// Drive `faces` through the tracker at a fixed tick rate, collecting
    /// every action with the tick index it fired on.
    fn run(
        tracker: &mut FaceTracker,
        faces: &[Face],
        start_ms: i64,
    ) -> Vec<(usize, FaceAction)> {
        let mut out = Vec::new();
        for (i, &f) in faces.iter().enumerate() {
            let now = start_ms + (i as i64) * TICK_MS;
            if let Some(action) = tracker.tick(f, now) {
                out.push((i, action));
            }
        }
        out
    }

    #[test]
    fn boot_falls_back_to_face_six_on_unknown() {
        let t = FaceTracker::new(Face::Unknown, 0);
        assert_eq!(t.accepted(), Face::Six);
    }

    #[test]
    fn single_switch_after_settle() {
        // [One]x20 then [Two]x20 at 100 ms: exactly one switch, at tick 15
        // of the second run (1500 ms settle / 100 ms tick).
        let mut t = FaceTracker::new(Face::One, 0);
        let mut seq = vec![Face::One; 20];
        seq.extend(vec![Face::Two; 20]);

        let actions = run(&mut t, &seq, 0);
        assert_eq!(actions, vec![(35, FaceAction::Switched(Face::Two))]);
        assert_eq!(t.accepted(), Face::Two);
    }

    #[test]
    fn intervening_reading_resets_settle_timer() {
        let mut t = FaceTracker::new(Face::One, 0);
        // 14 ticks of Two (1400 ms — just short), one tick of Three, then
        // Two again: the Three must restart the timer, so no switch occurs
        // until 15 further Two ticks.
        let mut seq = vec![Face::Two; 14];
        seq.push(Face::Three);
        seq.extend(vec![Face::Two; 14]);
        let actions = run(&mut t, &seq, 0);
        assert!(actions.is_empty());
        assert_eq!(t.accepted(), Face::One);

        // One more full settle run of Two now commits.
        let actions = run(&mut t, &[Face::Two; 16], 2900);
        assert_eq!(actions.len(), 1);
        assert_eq!(t.accepted(), Face::Two);
    }

    #[test]
    fn unknown_holds_candidate_and_its_timer() {
        let mut t = FaceTracker::new(Face::One, 0);
        // Two for 10 ticks, Unknown for 5, Two again: the Unknowns neither
        // reset the timer nor count as a different candidate, so the commit
        // lands exactly when 1500 ms have passed since the first Two.
        let mut seq = vec![Face::Two; 10];
        seq.extend(vec![Face::Unknown; 5]);
        seq.extend(vec![Face::Two; 10]);
        let actions = run(&mut t, &seq, 0);
        assert_eq!(actions, vec![(15, FaceAction::Switched(Face::Two))]);
    }

    #[test]
    fn drift_back_to_accepted_cancels_pending_switch() {
        let mut t = FaceTracker::new(Face::One, 0);
        // Almost-settled candidate, then the cube tips back: One != Two
        // resets the candidate to One, which can never commit (it already
        // is the accepted face).
        let mut seq = vec![Face::Two; 14];
        seq.extend(vec![Face::One; 30]);
        let actions = run(&mut t, &seq, 0);
        assert!(actions.is_empty());
        assert_eq!(t.accepted(), Face::One);
    }

    #[test]
    fn accepted_changes_at_most_once_per_stable_run() {
        let mut t = FaceTracker::new(Face::One, 0);
        // A long stable run of a single candidate commits once, then stays
        // silent (apart from minute heartbeats, which a 3 s run can't reach).
        let actions = run(&mut t, &[Face::Four; 30], 0);
        let switches: Vec<_> = actions
            .iter()
            .filter(|(_, a)| matches!(a, FaceAction::Switched(_)))
            .collect();
        assert_eq!(switches.len(), 1);
    }

    #[test]
    fn heartbeat_fires_once_per_minute_boundary() {
        let mut t = FaceTracker::new(Face::Three, 0);
        let mut ticks = Vec::new();
        // 70 seconds of stable readings at 1 s apart.
        for s in 1..=70i64 {
            if let Some(a) = t.tick(Face::Three, s * 1000) {
                ticks.push((s, a));
            }
        }
        assert_eq!(
            ticks,
            vec![(
                60,
                FaceAction::SessionTick {
                    face: Face::Three,
                    elapsed_s: 60
                }
            )]
        );
    }

    #[test]
    fn switch_resets_session_age() {
        let mut t = FaceTracker::new(Face::One, 0);
        let actions = run(&mut t, &[Face::Two; 20], 0);
        assert_eq!(actions.len(), 1);
        // Session restarted at the commit tick (15 → 1500 ms).
        assert_eq!(t.session_delta_s(1500), 0);
        assert_eq!(t.session_delta_s(43_500), 42);
    }
}
