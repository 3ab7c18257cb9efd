//! Demonstrates string_engine: two players compete for one guitar on a
//! scripted timeline, with console stand-ins for tracking, frets and audio.

use std::time::{Duration, Instant};

use string_engine::{
    AudioBackend, AudioError, EngineConfig, EngineEvent, FretVisuals, HandTracker, InstanceId,
    InteractionEngine, Note, PlaybackOptions, Side, SoundId, TrackingError, UserId, Vec3,
};

struct Tracker;
impl HandTracker for Tracker {
    fn attach(&mut self, _user: UserId, _side: Side) -> Result<Vec3, TrackingError> {
        Ok(Vec3::new(0.0, 0.0, 5.0))
    }
}

struct Frets;
impl FretVisuals for Frets {
    fn set_highlighted(&mut self, fret: Note, highlighted: bool) {
        if highlighted { println!("   [frets] {} lit", fret); }
    }
}

#[derive(Default)]
struct Console { next: u32 }
impl AudioBackend for Console {
    fn load_sound(&mut self, uri: &str) -> Result<SoundId, AudioError> {
        self.next += 1;
        let _ = uri;
        Ok(SoundId(self.next))
    }
    fn start_instance(&mut self, sound: SoundId, _o: &PlaybackOptions) -> InstanceId {
        println!("   [audio] start sound {}", sound.0);
        InstanceId(sound.0)
    }
    fn set_state(&mut self, instance: InstanceId, o: &PlaybackOptions) {
        println!("   [audio] instance {} {}", instance.0, if o.paused { "paused" } else { "rewound" });
    }
    fn stop(&mut self, instance: InstanceId) {
        println!("   [audio] stop instance {}", instance.0);
    }
}

fn main() {
    println!("\n=== String Engine Demo ===\n");

    let mut engine = InteractionEngine::new(EngineConfig::default(), Tracker, Frets, Console::default())
        .expect("default config is valid");
    let geometry = engine.resolver().geometry().clone();
    let t0 = Instant::now();
    let at = |ms: u64| t0 + Duration::from_millis(ms);

    let (alice, bob) = (UserId(1), UserId(2));
    let fret = |i: usize, z: f32| Vec3::new(geometry.fret_centre(i), 0.0, z);
    let strum = |y: f32, z: f32| Vec3::new(-0.15, y, z);
    let moved = |user, side, position| EngineEvent::HandMoved { user, side, position };

    // ── 1. Alice joins close to the neck, Bob hangs back ─────────────────
    println!("1. Alice frets 5 at the neck, Bob stands a metre away");
    engine.push_event(EngineEvent::SessionStarted);
    engine.push_event(EngineEvent::UserJoined(alice));
    engine.push_event(EngineEvent::UserJoined(bob));
    engine.push_event(moved(alice, Side::Left, fret(5, 0.0)));
    engine.push_event(moved(alice, Side::Right, strum(0.04, 0.0)));
    engine.push_event(moved(bob, Side::Left, fret(2, 1.0)));
    engine.push_event(moved(bob, Side::Right, strum(0.04, 1.0)));
    engine.advance(at(0));
    let r = engine.advance(at(1000));
    println!("   arbitrated={} note={}\n", r.arbitrated, r.note);

    // ── 2. Alice strums down, then up ─────────────────────────────────────
    println!("2. Alice strums down and back up");
    engine.push_event(moved(alice, Side::Right, strum(-0.04, 0.0)));
    let r = engine.advance(at(1030));
    println!("   plucks={:?}", r.plucks);
    engine.push_event(moved(alice, Side::Right, strum(0.04, 0.0)));
    let r = engine.advance(at(1060));
    println!("   plucks={:?}\n", r.plucks);

    // ── 3. Bob steps in and takes over at the next arbitration ────────────
    println!("3. Bob steps in front of Alice");
    engine.push_event(moved(bob, Side::Left, fret(2, 0.0)));
    engine.push_event(moved(bob, Side::Right, strum(0.04, 0.0)));
    engine.push_event(moved(alice, Side::Left, fret(5, 0.5)));
    engine.push_event(moved(alice, Side::Right, strum(0.04, 0.5)));
    let r = engine.advance(at(2000));
    println!("   arbitrated={} note={}", r.arbitrated, r.note);
    engine.push_event(moved(bob, Side::Right, strum(-0.04, 0.0)));
    let r = engine.advance(at(2030));
    println!("   plucks={:?}\n", r.plucks);

    // ── 4. Nobody plays: the note pauses after the sustain timeout ────────
    println!("4. Silence for five seconds");
    let r = engine.advance(at(7030));
    println!("   paused strings={:?}\n", r.paused);

    println!("Done.");
}
