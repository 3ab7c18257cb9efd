//! Pluck detection for the controlling right hand.
//!
//! Each string zone keeps the last vertical coordinate it saw and fires a
//! [`Pluck`] whenever the hand crosses the string's rest line between two
//! samples, in either direction.  Samples outside the zone's capture gate
//! never fire.

use std::time::Instant;

use log::trace;
use serde::Deserialize;

use crate::config::StringConfig;
use crate::spatial::{Band, Vec3};

/// What a zone remembers about samples taken outside its capture gate.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EdgeMemory {
    /// Every sample updates the edge memory, gated or not.
    #[default]
    Always,
    /// Only samples inside the gate update the edge memory.
    Gated,
}

/// Direction of a rest-line crossing.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Stroke {
    /// Above the rest line, then below.
    Down,
    /// Below the rest line, then above.
    Up,
}

/// A detected pluck on string `string` (index into the configured strings).
///
/// Carries no note: the consumer reads the resolver at the moment of the pluck.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Pluck {
    pub string: usize,
    pub stroke: Stroke,
}

// ════════════════════════════════════════════════════════════════════════════
// StrumZone
// ════════════════════════════════════════════════════════════════════════════

/// Capture gate and edge memory for one string.
#[derive(Clone, Debug)]
pub struct StrumZone {
    pub name:      String,
    pub capture_x: Band,
    pub capture_z: Band,
    pub rest_line: f32,
    previous_y:    Option<f32>,
    last_sample:   Option<Instant>,
}

impl StrumZone {
    pub fn new(name: &str, capture_x: Band, capture_z: Band, rest_line: f32) -> Self {
        StrumZone {
            name: name.to_string(),
            capture_x,
            capture_z,
            rest_line,
            previous_y:  None,
            last_sample: None,
        }
    }

    pub fn from_config(cfg: &StringConfig) -> Self {
        Self::new(&cfg.name, cfg.capture_x, cfg.capture_z, cfg.rest_line)
    }

    pub fn in_gate(&self, p: Vec3) -> bool {
        self.capture_x.contains(p.x) && self.capture_z.contains(p.z)
    }

    pub fn previous_y(&self) -> Option<f32> { self.previous_y }

    pub fn last_sample(&self) -> Option<Instant> { self.last_sample }

    /// Feed one sample; returns the stroke if the rest line was crossed.
    fn sample(&mut self, p: Vec3, memory: EdgeMemory, now: Instant) -> Option<Stroke> {
        let gated = self.in_gate(p);
        if !gated {
            trace!("string {}: hand {} outside capture gate", self.name, p);
            if memory == EdgeMemory::Always {
                self.remember(p.y, now);
            }
            return None;
        }

        let stroke = self.previous_y.and_then(|prev| {
            let before = prev - self.rest_line;
            let after  = p.y - self.rest_line;
            if before > 0.0 && after < 0.0 {
                Some(Stroke::Down)
            } else if before < 0.0 && after > 0.0 {
                Some(Stroke::Up)
            } else {
                None
            }
        });
        self.remember(p.y, now);
        stroke
    }

    fn remember(&mut self, y: f32, now: Instant) {
        self.previous_y  = Some(y);
        self.last_sample = Some(now);
    }
}

// ════════════════════════════════════════════════════════════════════════════
// StrumDetector
// ════════════════════════════════════════════════════════════════════════════

#[derive(Clone, Debug)]
pub struct StrumDetector {
    zones:  Vec<StrumZone>,
    memory: EdgeMemory,
}

impl StrumDetector {
    pub fn new(zones: Vec<StrumZone>, memory: EdgeMemory) -> Self {
        StrumDetector { zones, memory }
    }

    pub fn zones(&self) -> &[StrumZone] { &self.zones }

    /// Sample every zone once.
    ///
    /// With no hand in control nothing fires and edge memory is untouched.
    pub fn sample(&mut self, hand: Option<Vec3>, now: Instant) -> Vec<Pluck> {
        let Some(p) = hand else { return Vec::new() };
        let memory = self.memory;
        self.zones
            .iter_mut()
            .enumerate()
            .filter_map(|(string, zone)| {
                zone.sample(p, memory, now).map(|stroke| Pluck { string, stroke })
            })
            .collect()
    }
}

// ════════════════════════════════════════════════════════════════════════════
// Tests
// ════════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn zone() -> StrumZone {
        StrumZone::new("E", Band::new(-0.3, -0.05), Band::new(-0.06, 0.06), 0.0)
    }

    fn detector(memory: EdgeMemory) -> StrumDetector {
        StrumDetector::new(vec![zone()], memory)
    }

    fn in_zone(y: f32) -> Option<Vec3> {
        Some(Vec3::new(-0.1, y, 0.0))
    }

    /// Feed a sequence of heights 30 ms apart and count plucks.
    fn run(det: &mut StrumDetector, ys: &[f32]) -> Vec<Pluck> {
        let t0 = Instant::now();
        ys.iter()
            .enumerate()
            .flat_map(|(i, &y)| det.sample(in_zone(y), t0 + Duration::from_millis(30 * i as u64)))
            .collect()
    }

    #[test]
    fn downstroke_fires_once() {
        let plucks = run(&mut detector(EdgeMemory::Always), &[0.06, -0.01]);
        assert_eq!(plucks, vec![Pluck { string: 0, stroke: Stroke::Down }]);
    }

    #[test]
    fn upstroke_fires_once() {
        let plucks = run(&mut detector(EdgeMemory::Always), &[-0.01, 0.06]);
        assert_eq!(plucks, vec![Pluck { string: 0, stroke: Stroke::Up }]);
    }

    #[test]
    fn staying_on_one_side_never_fires() {
        assert!(run(&mut detector(EdgeMemory::Always), &[0.06, 0.05, 0.04]).is_empty());
    }

    #[test]
    fn first_sample_never_fires() {
        assert!(run(&mut detector(EdgeMemory::Always), &[-0.02]).is_empty());
    }

    #[test]
    fn touching_the_rest_line_is_not_a_crossing() {
        assert!(run(&mut detector(EdgeMemory::Always), &[0.02, 0.0, 0.02]).is_empty());
    }

    #[test]
    fn back_and_forth_fires_every_crossing() {
        let plucks = run(&mut detector(EdgeMemory::Always), &[0.05, -0.05, 0.05, -0.05]);
        let strokes: Vec<Stroke> = plucks.iter().map(|p| p.stroke).collect();
        assert_eq!(strokes, vec![Stroke::Down, Stroke::Up, Stroke::Down]);
    }

    #[test]
    fn rest_line_offset_is_respected() {
        let mut det = StrumDetector::new(
            vec![StrumZone::new("A", Band::new(-0.3, -0.05), Band::new(-0.06, 0.06), 0.1)],
            EdgeMemory::Always,
        );
        assert!(run(&mut det, &[0.06, -0.01]).is_empty());
        let plucks = run(&mut det, &[0.11]);
        assert_eq!(plucks, vec![Pluck { string: 0, stroke: Stroke::Up }]);
    }

    #[test]
    fn no_hand_skips_and_keeps_memory() {
        let t0 = Instant::now();
        let mut det = detector(EdgeMemory::Always);
        det.sample(in_zone(0.05), t0);
        assert!(det.sample(None, t0 + Duration::from_millis(30)).is_empty());
        assert_eq!(det.zones()[0].previous_y(), Some(0.05));
        assert_eq!(det.sample(in_zone(-0.05), t0 + Duration::from_millis(60)).len(), 1);
    }

    #[test]
    fn crossing_outside_gate_does_not_fire() {
        let t0 = Instant::now();
        let mut det = detector(EdgeMemory::Always);
        det.sample(in_zone(0.05), t0);
        let outside = Some(Vec3::new(0.3, -0.05, 0.0));
        assert!(det.sample(outside, t0 + Duration::from_millis(30)).is_empty());
    }

    #[test]
    fn always_memory_tracks_outside_gate() {
        let t0 = Instant::now();
        let mut det = detector(EdgeMemory::Always);
        det.sample(in_zone(0.05), t0);
        // crosses below while outside, then re-enters below: no pluck
        det.sample(Some(Vec3::new(0.3, -0.05, 0.0)), t0 + Duration::from_millis(30));
        assert_eq!(det.zones()[0].previous_y(), Some(-0.05));
        assert!(det.sample(in_zone(-0.04), t0 + Duration::from_millis(60)).is_empty());
    }

    #[test]
    fn gated_memory_freezes_outside_gate() {
        let t0 = Instant::now();
        let mut det = detector(EdgeMemory::Gated);
        det.sample(in_zone(0.05), t0);
        det.sample(Some(Vec3::new(0.3, -0.05, 0.0)), t0 + Duration::from_millis(30));
        assert_eq!(det.zones()[0].previous_y(), Some(0.05));
        assert_eq!(det.zones()[0].last_sample(), Some(t0));
        // re-entering below the line counts as a downstroke
        let plucks = det.sample(in_zone(-0.04), t0 + Duration::from_millis(60));
        assert_eq!(plucks, vec![Pluck { string: 0, stroke: Stroke::Down }]);
    }

    #[test]
    fn zones_fire_independently() {
        let t0 = Instant::now();
        let mut det = StrumDetector::new(
            vec![
                StrumZone::new("E", Band::new(-0.3, -0.05), Band::new(-0.06, -0.02), 0.0),
                StrumZone::new("A", Band::new(-0.3, -0.05), Band::new(0.02, 0.06), 0.0),
            ],
            EdgeMemory::Always,
        );
        det.sample(Some(Vec3::new(-0.1, 0.05, 0.04)), t0);
        let plucks = det.sample(Some(Vec3::new(-0.1, -0.05, 0.04)), t0 + Duration::from_millis(30));
        assert_eq!(plucks, vec![Pluck { string: 1, stroke: Stroke::Down }]);
    }
}
