//! Fretboard geometry and fret touch bookkeeping.

use std::collections::BTreeMap;
use std::fmt;
use std::time::Instant;

use crate::config::FretboardConfig;
use crate::spatial::{Band, Vec3};

// ════════════════════════════════════════════════════════════════════════════
// Note
// ════════════════════════════════════════════════════════════════════════════

/// Fret index along the neck.  `Note::OPEN` (0) means no fret is held.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Note(pub u8);

impl Note {
    pub const OPEN: Note = Note(0);

    pub fn index(self) -> usize { self.0 as usize }

    pub fn is_open(self) -> bool { self.0 == 0 }
}

impl fmt::Display for Note {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_open() { f.write_str("open") } else { write!(f, "fret {}", self.0) }
    }
}

// ════════════════════════════════════════════════════════════════════════════
// FretboardGeometry
// ════════════════════════════════════════════════════════════════════════════

/// Where each fret sits and how far from the neck a hand may stray.
///
/// Fret `i` is centred at `x = (frets - 1 - i) * spacing`, so the highest
/// fret sits on the origin and the nut end lies toward positive x.
#[derive(Clone, Debug, PartialEq)]
pub struct FretboardGeometry {
    frets:       usize,
    spacing:     f32,
    half_height: f32,
    half_depth:  f32,
}

impl FretboardGeometry {
    pub fn new(frets: usize, spacing: f32, half_height: f32, half_depth: f32) -> Self {
        FretboardGeometry { frets, spacing, half_height, half_depth }
    }

    pub fn from_config(cfg: &FretboardConfig) -> Self {
        Self::new(cfg.frets, cfg.spacing, cfg.half_height, cfg.half_depth)
    }

    pub fn frets(&self) -> usize { self.frets }

    pub fn spacing(&self) -> f32 { self.spacing }

    pub fn half_height(&self) -> f32 { self.half_height }

    pub fn half_depth(&self) -> f32 { self.half_depth }

    /// Centre of fret `i` along the neck axis.
    pub fn fret_centre(&self, i: usize) -> f32 {
        (self.frets - 1 - i) as f32 * self.spacing
    }

    /// Capture band of fret `i` along x: half a fret either side of centre.
    pub fn fret_band(&self, i: usize) -> Band {
        Band::centred(self.fret_centre(i), self.spacing * 0.5)
    }

    /// Whether `p` is close enough to the neck on y and z to press a fret.
    pub fn within_neck(&self, p: Vec3) -> bool {
        p.y.abs() <= self.half_height && p.z.abs() <= self.half_depth
    }

    /// Fret under `p`, or `Note::OPEN` if none.
    ///
    /// Frets are tested from 1 upward and the first band hit wins, so a
    /// position exactly on a shared band edge resolves to the lower fret.
    pub fn note_at(&self, p: Vec3) -> Note {
        if !self.within_neck(p) {
            return Note::OPEN;
        }
        (1..self.frets)
            .find(|&i| self.fret_band(i).contains(p.x))
            .map_or(Note::OPEN, |i| Note(i as u8))
    }

    pub fn contains_note(&self, note: Note) -> bool {
        note.index() < self.frets
    }
}

// ════════════════════════════════════════════════════════════════════════════
// TouchSet
// ════════════════════════════════════════════════════════════════════════════

/// Frets currently touched, with the instant each touch began.
///
/// Used when frets are pressed through collision volumes: several frets can
/// be in contact at once and the most recent touch wins.  Touches stamped
/// with the same instant are ordered by arrival.
#[derive(Clone, Debug, Default)]
pub struct TouchSet {
    touches:  BTreeMap<Note, (Instant, u64)>,
    arrivals: u64,
}

impl TouchSet {
    pub fn new() -> Self { Self::default() }

    pub fn touch(&mut self, note: Note, at: Instant) {
        self.arrivals += 1;
        self.touches.insert(note, (at, self.arrivals));
    }

    pub fn release(&mut self, note: Note) -> bool {
        self.touches.remove(&note).is_some()
    }

    pub fn len(&self) -> usize { self.touches.len() }

    pub fn is_empty(&self) -> bool { self.touches.is_empty() }

    /// The most recently touched note, or `Note::OPEN` if nothing is touched.
    pub fn most_recent(&self) -> Note {
        self.touches
            .iter()
            .max_by_key(|(_, &stamp)| stamp)
            .map_or(Note::OPEN, |(&note, _)| note)
    }
}

// ════════════════════════════════════════════════════════════════════════════
// Tests
// ════════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn neck() -> FretboardGeometry {
        FretboardGeometry::new(13, 0.045, 0.05, 0.05)
    }

    #[test]
    fn fret_centres_run_toward_origin() {
        let g = neck();
        assert!((g.fret_centre(0) - 0.54).abs() < 1e-6);
        assert!((g.fret_centre(12)).abs() < 1e-6);
        assert!(g.fret_centre(3) > g.fret_centre(4));
    }

    #[test]
    fn every_fret_centre_resolves_to_itself() {
        let g = neck();
        for i in 1..13 {
            let p = Vec3::new(g.fret_centre(i), 0.0, 0.0);
            assert_eq!(g.note_at(p), Note(i as u8), "fret {}", i);
        }
    }

    #[test]
    fn outside_every_band_is_open() {
        let g = neck();
        // beyond the last fret, past the nut, and over fret 0
        for x in [-0.2, 0.8, g.fret_centre(0)] {
            assert_eq!(g.note_at(Vec3::new(x, 0.0, 0.0)), Note::OPEN, "x = {}", x);
        }
    }

    #[test]
    fn off_the_neck_is_open() {
        let g = neck();
        let x = g.fret_centre(5);
        assert_eq!(g.note_at(Vec3::new(x, 0.06, 0.0)), Note::OPEN);
        assert_eq!(g.note_at(Vec3::new(x, 0.0, -0.06)), Note::OPEN);
        assert_eq!(g.note_at(Vec3::new(x, 0.049, 0.049)), Note(5));
    }

    #[test]
    fn shared_band_edge_picks_lower_fret() {
        let g = neck();
        let edge = g.fret_centre(4) - 0.0225;
        assert_eq!(g.note_at(Vec3::new(edge, 0.0, 0.0)), Note(4));
    }

    #[test]
    fn touch_set_picks_latest_and_falls_back() {
        let t0 = Instant::now();
        let mut ts = TouchSet::new();
        ts.touch(Note(3), t0 + Duration::from_millis(100));
        ts.touch(Note(7), t0 + Duration::from_millis(250));
        assert_eq!(ts.most_recent(), Note(7));

        assert!(ts.release(Note(7)));
        assert_eq!(ts.most_recent(), Note(3));

        assert!(ts.release(Note(3)));
        assert_eq!(ts.most_recent(), Note::OPEN);
        assert!(!ts.release(Note(3)));
    }

    #[test]
    fn touch_set_tie_goes_to_later_arrival() {
        let t = Instant::now();
        let mut ts = TouchSet::new();
        ts.touch(Note(7), t);
        ts.touch(Note(3), t);
        assert_eq!(ts.most_recent(), Note(3));

        ts.touch(Note(9), t);
        ts.touch(Note(5), t);
        assert_eq!(ts.most_recent(), Note(5));
        assert!(ts.release(Note(5)));
        assert_eq!(ts.most_recent(), Note(9));
    }

    #[test]
    fn retouch_refreshes_timestamp() {
        let t0 = Instant::now();
        let mut ts = TouchSet::new();
        ts.touch(Note(3), t0);
        ts.touch(Note(7), t0 + Duration::from_millis(10));
        ts.touch(Note(3), t0 + Duration::from_millis(20));
        assert_eq!(ts.most_recent(), Note(3));
        assert_eq!(ts.len(), 2);
    }
}
