//! Hand tracking — both from LeapMotion hardware and a keyboard simulation.
//!
//! The public interface is a stream of [`EngineEvent`]s delivered over a
//! `mpsc` channel.  The app forwards them to the engine untouched and doesn't
//! need to know whether they came from real hardware or the simulator.

use std::sync::mpsc::{self, Receiver, Sender, TryRecvError};
use std::thread;
use std::time::{Duration, Instant};

use log::{debug, info};
use string_engine::{
    Contact, EngineEvent, FretboardGeometry, HandTracker, Note, Side, TrackingError, UserId, Vec3,
};

// ════════════════════════════════════════════════════════════════════════════
// TrackingSource trait — unified interface for hw and sim
// ════════════════════════════════════════════════════════════════════════════

/// Anything that can deliver [`EngineEvent`]s over a channel.
pub trait TrackingSource: Send + 'static {
    fn run(self: Box<Self>, tx: Sender<EngineEvent>);
}

/// Spawn a tracking source on its own thread and return the receiving end.
pub fn spawn_tracking_source<S: TrackingSource>(source: S) -> Receiver<EngineEvent> {
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || Box::new(source).run(tx));
    rx
}

// ════════════════════════════════════════════════════════════════════════════
// RestingTracker
// ════════════════════════════════════════════════════════════════════════════

/// Attaches every hand at a resting spot; real positions follow as
/// [`EngineEvent::HandMoved`] from the tracking source.
#[derive(Clone, Copy, Debug)]
pub struct RestingTracker {
    pub rest: Vec3,
}

impl Default for RestingTracker {
    fn default() -> Self {
        RestingTracker { rest: Vec3::new(0.0, 0.0, 3.0) }
    }
}

impl HandTracker for RestingTracker {
    fn attach(&mut self, _user: UserId, _side: Side) -> Result<Vec3, TrackingError> {
        Ok(self.rest)
    }
}

// ════════════════════════════════════════════════════════════════════════════
// FretContacts — trigger-volume enter/exit from palm positions
// ════════════════════════════════════════════════════════════════════════════

/// Turns left-palm positions into [`EngineEvent::FretContact`] edges, one
/// fret touched per user at a time.
#[derive(Clone, Debug)]
pub struct FretContacts {
    geometry: FretboardGeometry,
    touching: Vec<(UserId, Note)>,
}

impl FretContacts {
    pub fn new(geometry: FretboardGeometry) -> Self {
        FretContacts { geometry, touching: Vec::new() }
    }

    pub fn update(&mut self, user: UserId, palm: Vec3, out: &mut Vec<EngineEvent>) {
        let note = self.geometry.note_at(palm);
        let prev = self.touching.iter().position(|(u, _)| *u == user);

        match prev {
            Some(i) if self.touching[i].1 == note => return,
            Some(i) => {
                let (_, old) = self.touching.swap_remove(i);
                out.push(EngineEvent::FretContact { user, note: old, contact: Contact::Exit });
            }
            None => {}
        }
        if !note.is_open() {
            self.touching.push((user, note));
            out.push(EngineEvent::FretContact { user, note, contact: Contact::Enter });
        }
    }

    pub fn forget(&mut self, user: UserId) {
        self.touching.retain(|(u, _)| *u != user);
    }
}

// ════════════════════════════════════════════════════════════════════════════
// LeapTrackingSource — real hardware (feature = "leap")
// ════════════════════════════════════════════════════════════════════════════

/// Tracking source backed by a real LeapMotion controller.
///
/// Requires the `leap` feature flag and the LeapC shared library installed.
/// The controller sees one local player.  Palm positions (millimetres,
/// device-relative) are shifted by `origin_mm` and scaled to metres.
#[cfg(feature = "leap")]
pub struct LeapTrackingSource {
    pub user:      UserId,
    pub origin_mm: Vec3,
    pub contacts:  Option<FretContacts>,
}

#[cfg(feature = "leap")]
impl LeapTrackingSource {
    pub fn new(contacts: Option<FretContacts>) -> Self {
        // Palms hovering 20 cm over the device sit on the rest line.
        LeapTrackingSource { user: UserId(1), origin_mm: Vec3::new(0.0, 200.0, 0.0), contacts }
    }

    fn to_instrument(&self, x: f32, y: f32, z: f32) -> Vec3 {
        let p = Vec3::new(x, y, z) - self.origin_mm;
        Vec3::new(p.x * 0.001, p.y * 0.001, p.z * 0.001)
    }
}

#[cfg(feature = "leap")]
impl TrackingSource for LeapTrackingSource {
    fn run(mut self: Box<Self>, tx: Sender<EngineEvent>) {
        use leaprs::*;

        let mut connection = match Connection::create(ConnectionConfig::default()) {
            Ok(c)  => c,
            Err(e) => {
                log::error!("failed to create LeapC connection: {:?}", e);
                return;
            }
        };
        if let Err(e) = connection.open() {
            log::error!("failed to open LeapMotion device: {:?}", e);
            return;
        }
        info!("LeapMotion connected, tracking {}", self.user);

        for e in [EngineEvent::SessionStarted, EngineEvent::UserJoined(self.user)] {
            if tx.send(e).is_err() { return; }
        }

        let mut out = Vec::new();
        loop {
            let msg = match connection.poll(100) {
                Ok(m)  => m,
                Err(_) => continue,
            };

            if let Event::Tracking(frame) = msg.event() {
                for h in frame.hands() {
                    let side = if h.hand_type() == HandType::Left { Side::Left } else { Side::Right };
                    let p = h.palm().position();
                    let position = self.to_instrument(p.x, p.y, p.z);
                    out.push(EngineEvent::HandMoved { user: self.user, side, position });
                    if side == Side::Left {
                        if let Some(contacts) = self.contacts.as_mut() {
                            contacts.update(self.user, position, &mut out);
                        }
                    }
                }
                for e in out.drain(..) {
                    if tx.send(e).is_err() { return; }
                }
            }
        }
    }
}

// ════════════════════════════════════════════════════════════════════════════
// Simulation — keyboard-driven local player plus scripted remote players
// ════════════════════════════════════════════════════════════════════════════

/// Raw input event from the simulation window.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SimInput {
    KeyDown(SimKey),
    KeyUp(SimKey),
}

/// Simulated key codes (mapped from minifb Key).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SimKey {
    NeckUp,      // →
    NeckDown,    // ←
    StepIn,      // ↑
    StepOut,     // ↓
    RaiseHand,   // W
    LowerHand,   // S
    Flick,       // Space
    Join,        // J
    Leave,       // K
    Quit,        // Q
}

const LOCAL_USER:  UserId = UserId(1);
const NECK_SPEED:  f32 = 0.15;  // m/s along the neck
const STEP_SPEED:  f32 = 0.50;  // m/s toward / away from the instrument
const HAND_SPEED:  f32 = 0.30;  // m/s right hand up / down
const FLICK:       f32 = 0.04;  // m above / below the rest line after a flick
const STRUM_X:     f32 = -0.15;
const MAX_BODY_Z:  f32 = 3.0;

/// The keyboard player.
#[derive(Clone, Copy, Debug, PartialEq)]
struct LocalPlayer {
    left_x:  f32,
    right_y: f32,
    body_z:  f32,
}

impl LocalPlayer {
    fn left(&self) -> Vec3  { Vec3::new(self.left_x, 0.0, self.body_z) }
    fn right(&self) -> Vec3 { Vec3::new(STRUM_X, self.right_y, self.body_z) }
}

/// A scripted player circling the instrument on a breathing orbit, strumming
/// the air as it goes.
#[derive(Clone, Copy, Debug, PartialEq)]
struct RemotePlayer {
    id:    UserId,
    phase: f32,
}

impl RemotePlayer {
    fn hands(&self, t: f32) -> (Vec3, Vec3) {
        let radius = 0.9 + 0.7 * (0.4 * t + self.phase).sin();
        let angle  = 0.25 * t + self.phase;
        let left   = Vec3::new(radius * angle.cos(), 0.0, radius * angle.sin());
        let right  = left + Vec3::new(-0.25, 0.08 * (3.0 * t + self.phase).sin(), 0.0);
        (left, right)
    }
}

/// The simulated room: one local player, any number of remote players.
///
/// [`SimWorld::step`] returns the events a tracking layer would have produced
/// since the previous step.
#[derive(Clone, Debug)]
pub struct SimWorld {
    geometry:  FretboardGeometry,
    contacts:  Option<FretContacts>,
    autopilot: bool,
    local:     LocalPlayer,
    remotes:   Vec<RemotePlayer>,
    next_id:   u64,
    held:      Vec<SimKey>,
    pending:   Vec<EngineEvent>,
}

impl SimWorld {
    /// A session with the local player plus `remote_users` scripted players.
    /// With `emit_contacts` the world also reports fret touches.
    pub fn new(geometry: FretboardGeometry, remote_users: usize, emit_contacts: bool) -> Self {
        let local = LocalPlayer {
            left_x:  geometry.fret_centre(5),
            right_y: FLICK,
            body_z:  0.0,
        };
        let mut world = SimWorld {
            contacts: emit_contacts.then(|| FretContacts::new(geometry.clone())),
            geometry,
            autopilot: false,
            local,
            remotes:   Vec::new(),
            next_id:   LOCAL_USER.0 + 1,
            held:      Vec::new(),
            pending:   vec![EngineEvent::SessionStarted, EngineEvent::UserJoined(LOCAL_USER)],
        };
        for _ in 0..remote_users {
            world.join_remote();
        }
        world
    }

    /// Let the local player walk the frets and strum on its own.
    pub fn with_autopilot(mut self) -> Self {
        self.autopilot = true;
        self
    }

    pub fn local_user(&self) -> UserId { LOCAL_USER }

    pub fn remote_count(&self) -> usize { self.remotes.len() }

    pub fn local_hands(&self) -> (Vec3, Vec3) { (self.local.left(), self.local.right()) }

    /// Apply one window input.  Returns false on quit.
    pub fn input(&mut self, input: SimInput) -> bool {
        match input {
            SimInput::KeyDown(SimKey::Quit) => return false,
            SimInput::KeyDown(SimKey::Join) => self.join_remote(),
            SimInput::KeyDown(SimKey::Leave) => self.leave_remote(),
            SimInput::KeyDown(SimKey::Flick) => self.flick(),
            SimInput::KeyDown(key) => {
                if !self.held.contains(&key) {
                    self.held.push(key);
                }
            }
            SimInput::KeyUp(key) => self.held.retain(|k| *k != key),
        }
        true
    }

    /// Advance to `t` seconds since start, `dt` seconds after the last step.
    pub fn step(&mut self, t: f32, dt: f32) -> Vec<EngineEvent> {
        if self.autopilot {
            self.autopilot_step(t);
        } else {
            self.keyboard_step(dt);
        }

        let mut out = std::mem::take(&mut self.pending);
        let (left, right) = self.local_hands();
        self.emit_hands(LOCAL_USER, left, right, &mut out);
        for r in self.remotes.clone() {
            let (left, right) = r.hands(t);
            self.emit_hands(r.id, left, right, &mut out);
        }
        out
    }

    fn emit_hands(&mut self, user: UserId, left: Vec3, right: Vec3, out: &mut Vec<EngineEvent>) {
        out.push(EngineEvent::HandMoved { user, side: Side::Left, position: left });
        out.push(EngineEvent::HandMoved { user, side: Side::Right, position: right });
        if let Some(contacts) = self.contacts.as_mut() {
            contacts.update(user, left, out);
        }
    }

    fn keyboard_step(&mut self, dt: f32) {
        let dir = |up: SimKey, down: SimKey| {
            (self.held.contains(&up) as i32 - self.held.contains(&down) as i32) as f32
        };
        let neck  = dir(SimKey::NeckUp, SimKey::NeckDown);
        let step  = dir(SimKey::StepOut, SimKey::StepIn);
        let hand  = dir(SimKey::RaiseHand, SimKey::LowerHand);

        let nut = self.geometry.fret_centre(0) + self.geometry.spacing();
        let p = &mut self.local;
        p.left_x  = (p.left_x + neck * NECK_SPEED * dt).clamp(-self.geometry.spacing(), nut);
        p.body_z  = (p.body_z + step * STEP_SPEED * dt).clamp(0.0, MAX_BODY_Z);
        p.right_y = (p.right_y + hand * HAND_SPEED * dt).clamp(-0.15, 0.15);
    }

    /// Move to the next fret every 1.5 s, flick every 0.4 s.
    fn autopilot_step(&mut self, t: f32) {
        let frets = self.geometry.frets();
        let fret  = 1 + ((t / 1.5) as usize) % (frets - 1);
        self.local.left_x = self.geometry.fret_centre(fret);

        let above = ((t / 0.4) as usize) % 2 == 0;
        self.local.right_y = if above { FLICK } else { -FLICK };
    }

    fn flick(&mut self) {
        self.local.right_y = if self.local.right_y >= 0.0 { -FLICK } else { FLICK };
    }

    fn join_remote(&mut self) {
        let id = UserId(self.next_id);
        self.next_id += 1;
        // Spread players around the orbit.
        let phase = (id.0 as f32 * 2.399) % std::f32::consts::TAU;
        self.remotes.push(RemotePlayer { id, phase });
        self.pending.push(EngineEvent::UserJoined(id));
        debug!("sim: remote player {} joined", id);
    }

    fn leave_remote(&mut self) {
        if let Some(r) = self.remotes.pop() {
            if let Some(contacts) = self.contacts.as_mut() {
                contacts.forget(r.id);
            }
            self.pending.push(EngineEvent::UserLeft(r.id));
            debug!("sim: remote player {} left", r.id);
        }
    }
}

/// Tracking source driven by [`SimInput`] events (from the visualizer's window).
///
/// The visualizer sends `SimInput` events here; this thread folds them into a
/// [`SimWorld`] and streams the resulting hand events at ~60 Hz.  The source
/// stops when the input sender is dropped or on [`SimKey::Quit`].
pub struct SimTrackingSource {
    pub rx:    Receiver<SimInput>,
    pub world: SimWorld,
}

const SIM_FRAME: Duration = Duration::from_millis(16);

impl TrackingSource for SimTrackingSource {
    fn run(self: Box<Self>, tx: Sender<EngineEvent>) {
        let SimTrackingSource { rx, mut world } = *self;
        info!("simulation started with {} remote player(s)", world.remote_count());

        let start = Instant::now();
        let mut last = start;
        loop {
            loop {
                match rx.try_recv() {
                    Ok(input) => {
                        if !world.input(input) { return; }
                    }
                    Err(TryRecvError::Empty)        => break,
                    Err(TryRecvError::Disconnected) => return,
                }
            }

            let now = Instant::now();
            let events = world.step(
                now.duration_since(start).as_secs_f32(),
                now.duration_since(last).as_secs_f32(),
            );
            last = now;

            for e in events {
                if tx.send(e).is_err() { return; }
            }
            thread::sleep(SIM_FRAME);
        }
    }
}

// ════════════════════════════════════════════════════════════════════════════
// Tests
// ════════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;

    fn geometry() -> FretboardGeometry {
        FretboardGeometry::new(13, 0.045, 0.05, 0.05)
    }

    fn joined(events: &[EngineEvent]) -> Vec<UserId> {
        events
            .iter()
            .filter_map(|e| match e {
                EngineEvent::UserJoined(u) => Some(*u),
                _ => None,
            })
            .collect()
    }

    fn contacts(events: &[EngineEvent]) -> Vec<(Note, Contact)> {
        events
            .iter()
            .filter_map(|e| match e {
                EngineEvent::FretContact { note, contact, .. } => Some((*note, *contact)),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn first_step_starts_session_and_joins_everyone() {
        let mut w = SimWorld::new(geometry(), 2, false);
        let events = w.step(0.0, 0.0);
        assert_eq!(events[0], EngineEvent::SessionStarted);
        assert_eq!(joined(&events), vec![UserId(1), UserId(2), UserId(3)]);
        // two hands per player
        let moves = events.iter().filter(|e| matches!(e, EngineEvent::HandMoved { .. })).count();
        assert_eq!(moves, 6);
        // nothing queued twice
        assert!(joined(&w.step(0.016, 0.016)).is_empty());
    }

    #[test]
    fn held_arrow_slides_left_hand() {
        let mut w = SimWorld::new(geometry(), 0, false);
        let x0 = w.local_hands().0.x;
        w.input(SimInput::KeyDown(SimKey::NeckUp));
        w.step(1.0, 1.0);
        assert!((w.local_hands().0.x - (x0 + NECK_SPEED)).abs() < 1e-5);
        w.input(SimInput::KeyUp(SimKey::NeckUp));
        w.step(2.0, 1.0);
        assert!((w.local_hands().0.x - (x0 + NECK_SPEED)).abs() < 1e-5);
    }

    #[test]
    fn stepping_out_is_clamped() {
        let mut w = SimWorld::new(geometry(), 0, false);
        w.input(SimInput::KeyDown(SimKey::StepIn));
        w.step(1.0, 1.0);
        assert_eq!(w.local_hands().0.z, 0.0);
        w.input(SimInput::KeyUp(SimKey::StepIn));
        w.input(SimInput::KeyDown(SimKey::StepOut));
        w.step(100.0, 100.0);
        assert_eq!(w.local_hands().1.z, MAX_BODY_Z);
    }

    #[test]
    fn flick_crosses_rest_line() {
        let mut w = SimWorld::new(geometry(), 0, false);
        assert!(w.local_hands().1.y > 0.0);
        w.input(SimInput::KeyDown(SimKey::Flick));
        assert!(w.local_hands().1.y < 0.0);
        w.input(SimInput::KeyDown(SimKey::Flick));
        assert!(w.local_hands().1.y > 0.0);
    }

    #[test]
    fn join_and_leave_remote_players() {
        let mut w = SimWorld::new(geometry(), 1, false);
        w.step(0.0, 0.0);

        w.input(SimInput::KeyDown(SimKey::Join));
        assert_eq!(joined(&w.step(0.1, 0.1)), vec![UserId(3)]);
        assert_eq!(w.remote_count(), 2);

        w.input(SimInput::KeyDown(SimKey::Leave));
        let events = w.step(0.2, 0.1);
        assert!(events.contains(&EngineEvent::UserLeft(UserId(3))));
        assert_eq!(w.remote_count(), 1);
    }

    #[test]
    fn leave_without_remotes_is_a_no_op() {
        let mut w = SimWorld::new(geometry(), 0, false);
        w.step(0.0, 0.0);
        w.input(SimInput::KeyDown(SimKey::Leave));
        let events = w.step(0.1, 0.1);
        assert!(!events.iter().any(|e| matches!(e, EngineEvent::UserLeft(_))));
    }

    #[test]
    fn quit_stops_input() {
        let mut w = SimWorld::new(geometry(), 0, false);
        assert!(w.input(SimInput::KeyDown(SimKey::NeckUp)));
        assert!(!w.input(SimInput::KeyDown(SimKey::Quit)));
    }

    #[test]
    fn contacts_follow_the_left_hand() {
        let g = geometry();
        let mut fc = FretContacts::new(g.clone());
        let mut out = Vec::new();
        let user = UserId(1);

        fc.update(user, Vec3::new(g.fret_centre(3), 0.0, 0.0), &mut out);
        assert_eq!(contacts(&out), vec![(Note(3), Contact::Enter)]);

        out.clear();
        fc.update(user, Vec3::new(g.fret_centre(3) + 0.01, 0.0, 0.0), &mut out);
        assert!(out.is_empty());

        fc.update(user, Vec3::new(g.fret_centre(4), 0.0, 0.0), &mut out);
        assert_eq!(contacts(&out), vec![(Note(3), Contact::Exit), (Note(4), Contact::Enter)]);

        out.clear();
        fc.update(user, Vec3::new(g.fret_centre(4), 0.5, 0.0), &mut out);
        assert_eq!(contacts(&out), vec![(Note(4), Contact::Exit)]);
    }

    #[test]
    fn world_emits_contacts_only_when_asked() {
        let mut quiet = SimWorld::new(geometry(), 0, false);
        assert!(contacts(&quiet.step(0.0, 0.0)).is_empty());

        let mut touchy = SimWorld::new(geometry(), 0, true);
        assert_eq!(contacts(&touchy.step(0.0, 0.0)), vec![(Note(5), Contact::Enter)]);
    }

    #[test]
    fn autopilot_walks_frets_and_strums() {
        let g = geometry();
        let mut w = SimWorld::new(g.clone(), 0, false).with_autopilot();
        w.step(0.0, 0.0);
        assert_eq!(g.note_at(w.local_hands().0), Note(1));
        assert!(w.local_hands().1.y > 0.0);

        w.step(0.5, 0.5);
        assert!(w.local_hands().1.y < 0.0);

        w.step(1.6, 1.1);
        assert_eq!(g.note_at(w.local_hands().0), Note(2));
    }

    #[test]
    fn remote_orbit_stays_in_range() {
        let r = RemotePlayer { id: UserId(2), phase: 1.0 };
        for i in 0..200 {
            let (left, right) = r.hands(i as f32 * 0.1);
            let d = left.flat().length();
            assert!((0.19..=1.61).contains(&d), "radius {}", d);
            assert_eq!(left.y, 0.0);
            assert!(right.y.abs() <= 0.08 + 1e-6);
        }
    }

    #[test]
    fn resting_tracker_attaches_everyone() {
        let mut t = RestingTracker::default();
        assert_eq!(t.attach(UserId(9), Side::Right), Ok(Vec3::new(0.0, 0.0, 3.0)));
    }
}
