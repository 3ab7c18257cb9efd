//! Top-level application loop.
//!
//! `AppState` owns the [`InteractionEngine`] wired to the MIDI player and the
//! fret highlights.  Each frame it forwards tracking events to the engine,
//! advances the engine clocks and hands a [`Scene`] to the visualizer.

use std::sync::mpsc::{self, Receiver, TryRecvError};
use std::thread;
use std::time::{Duration, Instant};

use log::{info, warn};
use string_engine::{EngineEvent, GatingPolicy, InteractionEngine, Side, Stroke, TickReport, UserId};

use crate::config::AppConfig;
use crate::player::{open_midi_output, MidiAudio, MidiOut};
use crate::tracking::{spawn_tracking_source, RestingTracker, SimInput, SimTrackingSource, SimWorld};
use crate::visualizer::{FretHighlights, Scene, Visualizer};
use crate::AppError;

pub type GuitarEngine = InteractionEngine<RestingTracker, FretHighlights, MidiAudio>;

const MIDI_CLIENT: &str = "leap_guitar";

// ════════════════════════════════════════════════════════════════════════════
// AppState
// ════════════════════════════════════════════════════════════════════════════

pub struct AppState {
    engine:      GuitarEngine,
    plucks:      u64,
    last_pluck:  Option<String>,
    pub status:  String,
}

impl AppState {
    pub fn new(cfg: &AppConfig, midi: Box<dyn MidiOut>) -> Result<Self, AppError> {
        let mut audio = MidiAudio::new(midi, cfg.app.channel, cfg.app.program, cfg.app.velocity);
        audio.register_strings(&cfg.engine, |name| cfg.open_pitch(name));

        let highlights = FretHighlights::new(cfg.engine.fretboard.frets);
        let engine = InteractionEngine::new(cfg.engine.clone(), RestingTracker::default(), highlights, audio)?;

        Ok(AppState {
            engine,
            plucks:     0,
            last_pluck: None,
            status:     "Waiting for players".to_string(),
        })
    }

    /// Queue every event the tracking source has produced so far.
    ///
    /// Returns false once the source has gone away.
    pub fn pump(&mut self, events: &Receiver<EngineEvent>) -> bool {
        loop {
            match events.try_recv() {
                Ok(e) => self.engine.push_event(e),
                Err(TryRecvError::Empty)        => return true,
                Err(TryRecvError::Disconnected) => return false,
            }
        }
    }

    /// Advance the engine to `now` and refresh the status line.
    pub fn tick(&mut self, now: Instant) -> TickReport {
        let report = self.engine.advance(now);

        for pluck in &report.plucks {
            self.plucks += 1;
            let stroke = match pluck.stroke {
                Stroke::Down => "down",
                Stroke::Up   => "up",
            };
            let name = self.engine.channels()[pluck.string].name();
            self.last_pluck = Some(format!("{} {} on {}", name, stroke, report.note));
        }
        if report.sampled || report.arbitrated {
            self.status = self.compose_status(&report);
        }
        report
    }

    fn compose_status(&self, report: &TickReport) -> String {
        let who = |side: Side| {
            self.engine.arbiter(side).active_id().map_or_else(|| "-".to_string(), |u: UserId| u.to_string())
        };
        let mut status = format!(
            "{} | left {}  right {} | {} player(s) | {} pluck(s)",
            report.note,
            who(Side::Left),
            who(Side::Right),
            self.engine.arbiter(Side::Left).len(),
            self.plucks,
        );
        if let Some(p) = &self.last_pluck {
            status.push_str(" | last ");
            status.push_str(p);
        }
        status
    }

    pub fn scene(&self) -> Scene<'_> {
        Scene {
            geometry:   self.engine.resolver().geometry(),
            highlights: self.engine.visuals(),
            zones:      self.engine.strum().zones(),
            left:       self.engine.arbiter(Side::Left),
            right:      self.engine.arbiter(Side::Right),
            channels:   self.engine.channels(),
            note:       self.engine.current_note(),
            status:     &self.status,
        }
    }

    pub fn engine(&self) -> &GuitarEngine { &self.engine }

    pub fn plucks(&self) -> u64 { self.plucks }
}

// ════════════════════════════════════════════════════════════════════════════
// Tracking source selection
// ════════════════════════════════════════════════════════════════════════════

fn sim_world(cfg: &AppConfig) -> SimWorld {
    SimWorld::new(
        string_engine::FretboardGeometry::from_config(&cfg.engine.fretboard),
        cfg.app.remote_users,
        cfg.engine.fretboard.gating == GatingPolicy::Touch,
    )
}

#[cfg(not(feature = "leap"))]
fn open_tracking(cfg: &AppConfig, sim_rx: Receiver<SimInput>) -> Receiver<EngineEvent> {
    spawn_tracking_source(SimTrackingSource { rx: sim_rx, world: sim_world(cfg) })
}

#[cfg(feature = "leap")]
fn open_tracking(cfg: &AppConfig, _sim_rx: Receiver<SimInput>) -> Receiver<EngineEvent> {
    use crate::tracking::{FretContacts, LeapTrackingSource};

    let contacts = (cfg.engine.fretboard.gating == GatingPolicy::Touch).then(|| {
        FretContacts::new(string_engine::FretboardGeometry::from_config(&cfg.engine.fretboard))
    });
    spawn_tracking_source(LeapTrackingSource::new(contacts))
}

// ════════════════════════════════════════════════════════════════════════════
// run() — the windowed application loop
// ════════════════════════════════════════════════════════════════════════════

/// Run the full application.
///
/// Creates the visualizer, the tracking source (simulation by default,
/// hardware with `--features leap`) and the MIDI player, then drives the
/// event/engine/render loop at ~60 fps.
pub fn run(cfg: AppConfig) -> Result<(), AppError> {
    // ── Sim input channel ─────────────────────────────────────────────────
    let (sim_tx, sim_rx) = mpsc::channel::<SimInput>();
    let events = open_tracking(&cfg, sim_rx);

    // ── Visualizer (owns the window and the sim input sender) ────────────
    let mut vis = Visualizer::new(sim_tx)?;

    // ── App state ─────────────────────────────────────────────────────────
    let mut app = AppState::new(&cfg, open_midi_output(MIDI_CLIENT))?;

    // ── Main loop ─────────────────────────────────────────────────────────
    while vis.is_open() {
        if !vis.poll_input() { break; }

        if !app.pump(&events) {
            warn!("tracking source stopped");
            break;
        }
        app.tick(Instant::now());

        vis.render(&app.scene());
    }

    info!("session over after {} pluck(s)", app.plucks());
    Ok(())
}

// ════════════════════════════════════════════════════════════════════════════
// run_headless() — no window, scripted players
// ════════════════════════════════════════════════════════════════════════════

/// Play the simulation on autopilot for the configured duration without
/// opening a window.
pub fn run_headless(cfg: AppConfig) -> Result<(), AppError> {
    // Held so the simulation keeps running; nothing is ever sent.
    let (_sim_tx, sim_rx) = mpsc::channel::<SimInput>();
    let world  = sim_world(&cfg).with_autopilot();
    let events = spawn_tracking_source(SimTrackingSource { rx: sim_rx, world });

    let mut app = AppState::new(&cfg, open_midi_output(MIDI_CLIENT))?;

    let duration = cfg.headless_duration();
    info!("headless run for {:?} with {} remote player(s)", duration, cfg.app.remote_users);

    let deadline = Instant::now() + duration;
    while Instant::now() < deadline {
        if !app.pump(&events) {
            warn!("tracking source stopped");
            break;
        }
        let report = app.tick(Instant::now());
        if report.arbitrated {
            info!("{}", app.status);
        }
        thread::sleep(Duration::from_millis(5));
    }

    info!("headless run finished after {} pluck(s)", app.plucks());
    Ok(())
}

// ════════════════════════════════════════════════════════════════════════════
// Tests
// ════════════════════════════════════════════════════════════════════════════
