//! The interaction engine: wires arbitration, fret resolution, strum
//! detection and sound channels to the two periodic clocks.
//!
//! The engine is single-threaded.  Collaborators push [`EngineEvent`]s at any
//! time; they are queued and drained in order at the start of every
//! [`advance`](InteractionEngine::advance), after which whichever clocks are
//! due tick:
//!
//! * **arbitration** (1 s): re-pick the controlling hand per side.
//! * **sampling** (30 ms): resolve the note, detect plucks, play, pause idle
//!   notes.
//!
//! A sampling tick reads the controlling hands once into a [`TickSnapshot`]
//! and works only from that copy.

use std::collections::VecDeque;
use std::time::Instant;

use log::{info, trace, warn};

use crate::channel::{AudioBackend, PlayAction, StringChannel};
use crate::clock::Periodic;
use crate::config::EngineConfig;
use crate::error::{EngineResult, TrackingError};
use crate::fretboard::{FretboardGeometry, Note};
use crate::hand::{HandArbiter, Side, TrackedHand, UserId};
use crate::resolver::{Contact, FretVisuals, GatingPolicy, NoteResolver};
use crate::spatial::Vec3;
use crate::strum::{Pluck, StrumDetector, StrumZone};

// ════════════════════════════════════════════════════════════════════════════
// Collaborators and events
// ════════════════════════════════════════════════════════════════════════════

/// Attaches tracking to a user's physical hand.
pub trait HandTracker {
    /// Begin tracking `side` of `user`, returning the initial position.
    fn attach(&mut self, user: UserId, side: Side) -> Result<Vec3, TrackingError>;
}

/// Everything the outside world can tell the engine.
#[derive(Clone, Debug, PartialEq)]
pub enum EngineEvent {
    SessionStarted,
    UserJoined(UserId),
    UserLeft(UserId),
    HandMoved   { user: UserId, side: Side, position: Vec3 },
    FretContact { user: UserId, note: Note, contact: Contact },
}

/// Controlling hands and note as seen at the start of a tick.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TickSnapshot {
    pub left:  Option<TrackedHand>,
    pub right: Option<TrackedHand>,
    pub note:  Note,
}

/// What one [`advance`](InteractionEngine::advance) call did.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TickReport {
    pub arbitrated:   bool,
    pub sampled:      bool,
    /// Current note after this call.
    pub note:         Note,
    /// The sampling tick moved the note away from the one it started with.
    pub note_changed: bool,
    pub plucks:       Vec<Pluck>,
    /// Strings that paused on this call.
    pub paused:       Vec<usize>,
}

// ════════════════════════════════════════════════════════════════════════════
// InteractionEngine
// ════════════════════════════════════════════════════════════════════════════

pub struct InteractionEngine<T, V, A> {
    config:      EngineConfig,
    left:        HandArbiter,
    right:       HandArbiter,
    resolver:    NoteResolver,
    strum:       StrumDetector,
    channels:    Vec<StringChannel>,
    tracker:     T,
    visuals:     V,
    audio:       A,
    arbitration: Periodic,
    sampling:    Periodic,
    pending:     VecDeque<EngineEvent>,
}

impl<T: HandTracker, V: FretVisuals, A: AudioBackend> InteractionEngine<T, V, A> {
    /// Validate `config` and load every string's sounds.
    pub fn new(config: EngineConfig, tracker: T, visuals: V, mut audio: A) -> EngineResult<Self> {
        config.validate()?;

        let frets   = config.fretboard.frets;
        let sustain = config.timing.sustain_timeout();
        let channels = config
            .strings
            .iter()
            .map(|s| {
                StringChannel::load(
                    &s.name, &config.audio.base_url, s.sound_offset, frets, sustain, &mut audio,
                )
            })
            .collect();
        let zones = config.strings.iter().map(StrumZone::from_config).collect();

        Ok(InteractionEngine {
            left:        HandArbiter::new(Side::Left),
            right:       HandArbiter::new(Side::Right),
            resolver:    NoteResolver::new(
                FretboardGeometry::from_config(&config.fretboard),
                config.fretboard.gating,
            ),
            strum:       StrumDetector::new(zones, config.strum.edge_memory),
            channels,
            tracker,
            visuals,
            audio,
            arbitration: Periodic::new(config.timing.arbitration_period()),
            sampling:    Periodic::new(config.timing.sample_period()),
            pending:     VecDeque::new(),
            config,
        })
    }

    // ── events ───────────────────────────────────────────────────────────

    /// Queue an event for the next [`advance`](Self::advance).
    pub fn push_event(&mut self, event: EngineEvent) {
        self.pending.push_back(event);
    }

    /// Apply one event immediately.
    pub fn handle_event(&mut self, event: EngineEvent, now: Instant) {
        match event {
            EngineEvent::SessionStarted => self.session_started(now),
            EngineEvent::UserJoined(user) => self.user_joined(user),
            EngineEvent::UserLeft(user) => self.user_left(user),
            EngineEvent::HandMoved { user, side, position } => {
                if !self.arbiter_mut(side).update_position(user, position) {
                    trace!("ignoring {} hand update for untracked user {}", side, user);
                }
            }
            EngineEvent::FretContact { user, note, contact } => self.fret_contact(user, note, contact, now),
        }
    }

    fn session_started(&mut self, now: Instant) {
        if self.is_started() {
            warn!("session already started, ignoring");
            return;
        }
        info!(
            "session started: {} string(s), {} frets, {:?} gating",
            self.channels.len(), self.config.fretboard.frets, self.resolver.policy()
        );
        self.arbitration.start(now);
        self.sampling.start(now);
    }

    fn user_joined(&mut self, user: UserId) {
        info!("user joined: {}", user);
        for side in Side::BOTH {
            match self.tracker.attach(user, side) {
                Ok(position) => {
                    self.arbiter_mut(side).register(user, position);
                    info!("   added {} hand of {}", side, user);
                }
                Err(e) => warn!("   {}", e),
            }
        }
    }

    fn user_left(&mut self, user: UserId) {
        info!("user left: {}", user);
        for side in Side::BOTH {
            if self.arbiter_mut(side).unregister(user).is_none() {
                warn!("   no {} hand found for {}", side, user);
            }
        }
        self.resolver.forget(user);
    }

    fn fret_contact(&mut self, user: UserId, note: Note, contact: Contact, now: Instant) {
        if self.resolver.policy() != GatingPolicy::Touch {
            return;
        }
        if !self.resolver.geometry().contains_note(note) {
            warn!("contact on unknown fret {} from {}", note.0, user);
            return;
        }
        if self.left.hand(user).is_none() {
            trace!("ignoring fret contact from {}, no left hand tracked", user);
            return;
        }
        self.resolver.contact(user, note, contact, now);
    }

    // ── clocks ───────────────────────────────────────────────────────────

    /// Drain queued events, then run whichever clocks are due at `now`.
    pub fn advance(&mut self, now: Instant) -> TickReport {
        while let Some(event) = self.pending.pop_front() {
            self.handle_event(event, now);
        }

        let arbitrated = self.arbitration.poll(now);
        if arbitrated {
            self.arbitrate();
        }
        let mut report = if self.sampling.poll(now) {
            self.sample(now)
        } else {
            TickReport::default()
        };
        report.arbitrated = arbitrated;
        report.note = self.resolver.current_note();
        report
    }

    /// One arbitration tick.
    pub fn arbitrate(&mut self) {
        self.left.reselect();
        self.right.reselect();
    }

    /// One sampling tick.
    pub fn sample(&mut self, now: Instant) -> TickReport {
        let snap = self.snapshot();

        let note   = self.resolver.resolve(snap.left.as_ref(), &mut self.visuals);
        let plucks = self.strum.sample(snap.right.map(|h| h.position), now);
        for pluck in &plucks {
            let channel = &mut self.channels[pluck.string];
            if channel.play_string(note, now, &mut self.audio) == PlayAction::Unavailable {
                trace!("pluck on {} dropped, {} not loaded", channel.name(), note);
            }
        }

        let paused = self
            .channels
            .iter_mut()
            .enumerate()
            .filter_map(|(i, ch)| ch.pause_if_needed(now, &mut self.audio).then_some(i))
            .collect();

        TickReport {
            sampled: true,
            note,
            note_changed: note != snap.note,
            plucks,
            paused,
            ..TickReport::default()
        }
    }

    pub fn snapshot(&self) -> TickSnapshot {
        TickSnapshot {
            left:  self.left.active().copied(),
            right: self.right.active().copied(),
            note:  self.resolver.current_note(),
        }
    }

    // ── accessors ────────────────────────────────────────────────────────

    pub fn is_started(&self) -> bool { self.sampling.is_running() }

    pub fn config(&self) -> &EngineConfig { &self.config }

    pub fn arbiter(&self, side: Side) -> &HandArbiter {
        match side {
            Side::Left  => &self.left,
            Side::Right => &self.right,
        }
    }

    fn arbiter_mut(&mut self, side: Side) -> &mut HandArbiter {
        match side {
            Side::Left  => &mut self.left,
            Side::Right => &mut self.right,
        }
    }

    pub fn current_note(&self) -> Note { self.resolver.current_note() }

    pub fn resolver(&self) -> &NoteResolver { &self.resolver }

    pub fn strum(&self) -> &StrumDetector { &self.strum }

    pub fn channels(&self) -> &[StringChannel] { &self.channels }

    pub fn pending_events(&self) -> usize { self.pending.len() }

    pub fn visuals(&self) -> &V { &self.visuals }

    pub fn audio(&self) -> &A { &self.audio }

    pub fn audio_mut(&mut self) -> &mut A { &mut self.audio }

    pub fn tracker(&self) -> &T { &self.tracker }
}

// ════════════════════════════════════════════════════════════════════════════
// Tests
// ════════════════════════════════════════════════════════════════════════════
