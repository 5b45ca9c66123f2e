//! Fishing state machine.
//!
//! ```text
//! Idle -> AwaitingBite -> CatchWindowOpen -> Resolved(catch | fail) -> Idle
//! ```
//!
//! The server decides when a fish bites and whether it is caught. The client
//! only runs a countdown for feedback while the catch window is open; when it
//! runs out the client reports `catchFail` and shows a failure, but a later
//! server `catch` still wins.
//!
//! The countdown and the single-use catch input live inside the
//! `CatchWindowOpen` state, so leaving that state by any path drops both.

use std::fmt;
use std::time::Duration;

use isle_shared::protocol::{ClientMsg, Fish, FishingEvent, PlayerId};
use tokio::time::Instant;
use tracing::{debug, info};

use crate::world::Player;

/// Default length of the local catch countdown.
pub const CATCH_WINDOW: Duration = Duration::from_millis(3000);

/// Local countdown shown while the catch window is open.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Countdown {
    started: Instant,
    duration: Duration,
}

impl Countdown {
    pub fn start(now: Instant, duration: Duration) -> Self {
        Self {
            started: now,
            duration,
        }
    }

    pub fn deadline(&self) -> Instant {
        self.started + self.duration
    }

    pub fn expired(&self, now: Instant) -> bool {
        now >= self.deadline()
    }

    /// Remaining share of the window in `[0, 1]`.
    pub fn remaining_fraction(&self, now: Instant) -> f32 {
        if self.duration.is_zero() {
            return 0.0;
        }
        let left = self.deadline().saturating_duration_since(now);
        (left.as_secs_f32() / self.duration.as_secs_f32()).clamp(0.0, 1.0)
    }
}

/// Handle for the catch keypress. Held only while the window is open and
/// consumed by the first attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatchInput(());

/// State carried by an open catch window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatchWindow {
    countdown: Option<Countdown>,
    input: Option<CatchInput>,
}

impl CatchWindow {
    fn open(now: Instant, duration: Duration) -> Self {
        Self {
            countdown: Some(Countdown::start(now, duration)),
            input: Some(CatchInput(())),
        }
    }

    pub fn countdown(&self) -> Option<&Countdown> {
        self.countdown.as_ref()
    }

    /// Whether the catch key is still live for this window.
    pub fn accepts_attempt(&self) -> bool {
        self.input.is_some()
    }
}

/// Why a session failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailCause {
    /// The server reported a miss (no bite, or window elapsed server-side).
    Server,
    /// The local countdown ran out first.
    LocalTimeout,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FishingOutcome {
    Caught(Fish),
    Failed(FailCause),
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum FishingPhase {
    #[default]
    Idle,
    AwaitingBite,
    CatchWindowOpen(CatchWindow),
    Resolved(FishingOutcome),
}

/// Data-free view of a phase, for notifications.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FishingState {
    Idle,
    AwaitingBite,
    CatchWindowOpen,
    Caught,
    Failed,
}

impl fmt::Display for FishingState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            FishingState::Idle => "idle",
            FishingState::AwaitingBite => "waiting for a bite",
            FishingState::CatchWindowOpen => "catch window open",
            FishingState::Caught => "caught",
            FishingState::Failed => "failed",
        })
    }
}

impl FishingPhase {
    pub fn state(&self) -> FishingState {
        match self {
            FishingPhase::Idle => FishingState::Idle,
            FishingPhase::AwaitingBite => FishingState::AwaitingBite,
            FishingPhase::CatchWindowOpen(_) => FishingState::CatchWindowOpen,
            FishingPhase::Resolved(FishingOutcome::Caught(_)) => FishingState::Caught,
            FishingPhase::Resolved(FishingOutcome::Failed(_)) => FishingState::Failed,
        }
    }
}

/// Locally rejected fishing commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FishingRejection {
    AlreadyFishing,
    NotFacingWater,
    /// No open window, or the attempt for this window was already used.
    NoCatchWindow,
}

impl fmt::Display for FishingRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FishingRejection::AlreadyFishing => write!(f, "already fishing"),
            FishingRejection::NotFacingWater => write!(f, "you need to face water to fish"),
            FishingRejection::NoCatchWindow => write!(f, "nothing on the line"),
        }
    }
}

impl std::error::Error for FishingRejection {}

/// Drives one player's fishing sessions.
#[derive(Debug, Clone)]
pub struct FishingMachine {
    local_id: PlayerId,
    window: Duration,
    phase: FishingPhase,
}

impl FishingMachine {
    pub fn new(local_id: PlayerId, window: Duration) -> Self {
        Self {
            local_id,
            window,
            phase: FishingPhase::Idle,
        }
    }

    pub fn phase(&self) -> &FishingPhase {
        &self.phase
    }

    pub fn state(&self) -> FishingState {
        self.phase.state()
    }

    /// A session is in progress or its catch is still on display. Movement and
    /// new casts are blocked.
    ///
    /// A local timeout still counts: the server's session runs until its own
    /// `fail` or `catch` arrives.
    pub fn is_fishing(&self) -> bool {
        matches!(
            self.phase,
            FishingPhase::AwaitingBite
                | FishingPhase::CatchWindowOpen(_)
                | FishingPhase::Resolved(
                    FishingOutcome::Caught(_) | FishingOutcome::Failed(FailCause::LocalTimeout)
                )
        )
    }

    /// The catch panel is on screen; only the catch key reaches fishing.
    pub fn panel_open(&self) -> bool {
        matches!(
            self.phase,
            FishingPhase::CatchWindowOpen(_) | FishingPhase::Resolved(_)
        )
    }

    /// Casts a line. Needs the local player to be facing water.
    pub fn start(&mut self, player: &Player) -> Result<ClientMsg, FishingRejection> {
        if self.is_fishing() {
            return Err(FishingRejection::AlreadyFishing);
        }
        if !player.facing_water {
            return Err(FishingRejection::NotFacingWater);
        }
        // A server-failed result still on screen is dismissed first.
        self.acknowledge();
        self.phase = FishingPhase::AwaitingBite;
        debug!(id = %self.local_id, "Line cast, waiting for bite");
        Ok(ClientMsg::fish(&self.local_id, player.direction))
    }

    /// Applies a server fishing event. Events for other players are ignored.
    /// Returns true if the phase changed.
    pub fn on_event(&mut self, event: &FishingEvent, now: Instant) -> bool {
        if event.player_id() != &self.local_id {
            return false;
        }

        let next = match (event, &self.phase) {
            (FishingEvent::Start { .. }, FishingPhase::AwaitingBite) => {
                info!("Fish on the line");
                FishingPhase::CatchWindowOpen(CatchWindow::open(now, self.window))
            }
            (
                FishingEvent::Catch { fish, .. },
                FishingPhase::CatchWindowOpen(_)
                | FishingPhase::Resolved(FishingOutcome::Failed(FailCause::LocalTimeout)),
            ) => {
                info!(fish = %fish.name, rarity = %fish.tier(), "Caught a fish");
                FishingPhase::Resolved(FishingOutcome::Caught(fish.clone()))
            }
            (
                FishingEvent::Fail { .. },
                FishingPhase::AwaitingBite
                | FishingPhase::CatchWindowOpen(_)
                | FishingPhase::Resolved(FishingOutcome::Failed(_)),
            ) => FishingPhase::Resolved(FishingOutcome::Failed(FailCause::Server)),
            (event, phase) => {
                debug!(?event, state = %phase.state(), "Ignoring fishing event");
                return false;
            }
        };

        let changed = next != self.phase;
        self.phase = next;
        changed
    }

    /// Uses this window's catch input. Stops the countdown; the session then
    /// waits for the server's verdict.
    pub fn attempt_catch(&mut self) -> Result<ClientMsg, FishingRejection> {
        let FishingPhase::CatchWindowOpen(window) = &mut self.phase else {
            return Err(FishingRejection::NoCatchWindow);
        };
        if window.input.take().is_none() {
            return Err(FishingRejection::NoCatchWindow);
        }
        window.countdown = None;
        debug!("Catch attempt sent");
        Ok(ClientMsg::catch_attempt(&self.local_id))
    }

    /// Fails the session if the countdown has run out, returning the
    /// `catchFail` notice for the server.
    pub fn poll_timeout(&mut self, now: Instant) -> Option<ClientMsg> {
        let FishingPhase::CatchWindowOpen(window) = &self.phase else {
            return None;
        };
        if !window.countdown.is_some_and(|c| c.expired(now)) {
            return None;
        }
        info!("Catch window elapsed");
        self.phase = FishingPhase::Resolved(FishingOutcome::Failed(FailCause::LocalTimeout));
        Some(ClientMsg::catch_fail(&self.local_id))
    }

    /// When the running countdown ends, if one is running.
    pub fn deadline(&self) -> Option<Instant> {
        match &self.phase {
            FishingPhase::CatchWindowOpen(window) => window.countdown.map(|c| c.deadline()),
            _ => None,
        }
    }

    /// Remaining share of the countdown, if one is running.
    pub fn progress(&self, now: Instant) -> Option<f32> {
        match &self.phase {
            FishingPhase::CatchWindowOpen(window) => {
                window.countdown.map(|c| c.remaining_fraction(now))
            }
            _ => None,
        }
    }

    /// Closes the result panel.
    pub fn acknowledge(&mut self) -> bool {
        if matches!(self.phase, FishingPhase::Resolved(_)) {
            self.phase = FishingPhase::Idle;
            return true;
        }
        false
    }

    /// Reels in before a bite. No message is sent.
    pub fn cancel(&mut self) -> bool {
        if self.phase == FishingPhase::AwaitingBite {
            self.phase = FishingPhase::Idle;
            return true;
        }
        false
    }

    /// Drops any session, e.g. after losing the connection.
    pub fn reset(&mut self) -> bool {
        let changed = self.phase != FishingPhase::Idle;
        self.phase = FishingPhase::Idle;
        changed
    }
}
