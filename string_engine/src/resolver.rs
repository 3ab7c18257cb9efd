//! Fret resolution for the controlling left hand.
//!
//! Two gating policies are supported:
//!
//! | Policy | Note source |
//! |---|---|
//! | [`GatingPolicy::Position`] | fret band under the raw hand position, sampled every tick |
//! | [`GatingPolicy::Touch`] | most recent fret contact the controlling user reported |
//!
//! Either way the current note is forced to open while no left hand is in
//! control, and every change moves the fret highlight exactly once.  Contacts
//! are tracked per user, so a hand already resting on a fret keeps it when it
//! takes control.

use std::collections::BTreeMap;
use std::time::Instant;

use log::debug;
use serde::Deserialize;

use crate::fretboard::{FretboardGeometry, Note, TouchSet};
use crate::hand::{TrackedHand, UserId};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GatingPolicy {
    #[default]
    Position,
    Touch,
}

/// Fret appearance, owned by the scene layer.
pub trait FretVisuals {
    fn set_highlighted(&mut self, fret: Note, highlighted: bool);
}

/// Contact phase reported for a fret trigger volume.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Contact {
    Enter,
    Exit,
}

#[derive(Debug)]
pub struct NoteResolver {
    geometry: FretboardGeometry,
    policy:   GatingPolicy,
    /// Contacts per user, kept whether or not that user is in control.
    touches:  BTreeMap<UserId, TouchSet>,
    current:  Note,
}

impl NoteResolver {
    pub fn new(geometry: FretboardGeometry, policy: GatingPolicy) -> Self {
        NoteResolver { geometry, policy, touches: BTreeMap::new(), current: Note::OPEN }
    }

    pub fn current_note(&self) -> Note { self.current }

    pub fn policy(&self) -> GatingPolicy { self.policy }

    pub fn geometry(&self) -> &FretboardGeometry { &self.geometry }

    /// Frets `user` is touching, if they have touched any.
    pub fn touches(&self, user: UserId) -> Option<&TouchSet> {
        self.touches.get(&user)
    }

    /// Record a fret contact by `user`.  Ignored under the position policy.
    pub fn contact(&mut self, user: UserId, note: Note, contact: Contact, at: Instant) {
        if self.policy != GatingPolicy::Touch {
            return;
        }
        assert!(self.geometry.contains_note(note), "fret {} outside the neck", note.0);
        match contact {
            Contact::Enter => self.touches.entry(user).or_default().touch(note, at),
            Contact::Exit  => {
                if let Some(set) = self.touches.get_mut(&user) {
                    set.release(note);
                    if set.is_empty() {
                        self.touches.remove(&user);
                    }
                }
            }
        }
    }

    /// Drop every contact held by `user`.
    pub fn forget(&mut self, user: UserId) {
        self.touches.remove(&user);
    }

    /// Candidate note for `hand` without touching any state.
    pub fn candidate(&self, hand: Option<&TrackedHand>) -> Note {
        let Some(hand) = hand else { return Note::OPEN };
        match self.policy {
            GatingPolicy::Position => self.geometry.note_at(hand.position),
            GatingPolicy::Touch    => self.touches(hand.owner).map_or(Note::OPEN, TouchSet::most_recent),
        }
    }

    /// Resolve the note for this tick and commit it.
    ///
    /// On change the previous fret loses its highlight and the new one gains
    /// it; nothing is touched when the note is unchanged.
    pub fn resolve(&mut self, hand: Option<&TrackedHand>, visuals: &mut dyn FretVisuals) -> Note {
        let next = self.candidate(hand);
        if next != self.current {
            debug!("note change: {} -> {}", self.current, next);
            visuals.set_highlighted(self.current, false);
            visuals.set_highlighted(next, true);
            self.current = next;
        }
        self.current
    }
}

// ════════════════════════════════════════════════════════════════════════════
// Tests
// ════════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hand::Side;
    use crate::spatial::Vec3;
    use std::time::Duration;

    #[derive(Default)]
    struct RecordingVisuals {
        calls: Vec<(Note, bool)>,
    }

    impl FretVisuals for RecordingVisuals {
        fn set_highlighted(&mut self, fret: Note, highlighted: bool) {
            self.calls.push((fret, highlighted));
        }
    }

    fn resolver(policy: GatingPolicy) -> NoteResolver {
        NoteResolver::new(FretboardGeometry::new(13, 0.045, 0.05, 0.05), policy)
    }

    fn hand(user: u64, position: Vec3) -> TrackedHand {
        TrackedHand { owner: UserId(user), side: Side::Left, position }
    }

    fn at_fret(r: &NoteResolver, i: usize) -> TrackedHand {
        hand(1, Vec3::new(r.geometry().fret_centre(i), 0.0, 0.0))
    }

    #[test]
    fn no_hand_resolves_open() {
        let mut r = resolver(GatingPolicy::Position);
        let mut vis = RecordingVisuals::default();
        assert_eq!(r.resolve(None, &mut vis), Note::OPEN);
        assert!(vis.calls.is_empty());
    }

    #[test]
    fn change_moves_highlight_once() {
        let mut r = resolver(GatingPolicy::Position);
        let mut vis = RecordingVisuals::default();
        let p = at_fret(&r, 5);

        assert_eq!(r.resolve(Some(&p), &mut vis), Note(5));
        assert_eq!(vis.calls, vec![(Note::OPEN, false), (Note(5), true)]);

        // same fret again: no visual traffic
        assert_eq!(r.resolve(Some(&p), &mut vis), Note(5));
        assert_eq!(vis.calls.len(), 2);

        let q = at_fret(&r, 6);
        assert_eq!(r.resolve(Some(&q), &mut vis), Note(6));
        assert_eq!(&vis.calls[2..], &[(Note(5), false), (Note(6), true)]);
    }

    #[test]
    fn losing_the_hand_drops_to_open() {
        let mut r = resolver(GatingPolicy::Position);
        let mut vis = RecordingVisuals::default();
        let p = at_fret(&r, 2);
        r.resolve(Some(&p), &mut vis);
        assert_eq!(r.resolve(None, &mut vis), Note::OPEN);
        assert_eq!(vis.calls.last(), Some(&(Note::OPEN, true)));
    }

    #[test]
    fn leaving_the_neck_drops_to_open() {
        let mut r = resolver(GatingPolicy::Position);
        let mut vis = RecordingVisuals::default();
        let x = r.geometry().fret_centre(8);
        r.resolve(Some(&hand(1, Vec3::new(x, 0.0, 0.0))), &mut vis);
        assert_eq!(r.resolve(Some(&hand(1, Vec3::new(x, 0.2, 0.0))), &mut vis), Note::OPEN);
    }

    #[test]
    fn touch_policy_follows_latest_contact() {
        let t0 = Instant::now();
        let mut r = resolver(GatingPolicy::Touch);
        let mut vis = RecordingVisuals::default();
        let h = hand(1, Vec3::new(5.0, 5.0, 5.0)); // position is irrelevant here
        let user = h.owner;

        r.contact(user, Note(3), Contact::Enter, t0 + Duration::from_millis(100));
        r.contact(user, Note(7), Contact::Enter, t0 + Duration::from_millis(250));
        assert_eq!(r.resolve(Some(&h), &mut vis), Note(7));

        r.contact(user, Note(7), Contact::Exit, t0 + Duration::from_millis(300));
        assert_eq!(r.resolve(Some(&h), &mut vis), Note(3));

        r.contact(user, Note(3), Contact::Exit, t0 + Duration::from_millis(400));
        assert_eq!(r.resolve(Some(&h), &mut vis), Note::OPEN);
        assert_eq!(vis.calls.len(), 6);
        assert!(r.touches(user).is_none());
    }

    #[test]
    fn touch_policy_reads_only_the_hands_owner() {
        let t = Instant::now();
        let mut r = resolver(GatingPolicy::Touch);
        let mut vis = RecordingVisuals::default();
        r.contact(UserId(1), Note(4), Contact::Enter, t);
        r.contact(UserId(2), Note(9), Contact::Enter, t);

        assert_eq!(r.resolve(Some(&hand(1, Vec3::ZERO)), &mut vis), Note(4));
        assert_eq!(r.resolve(Some(&hand(2, Vec3::ZERO)), &mut vis), Note(9));

        r.forget(UserId(2));
        assert_eq!(r.resolve(Some(&hand(2, Vec3::ZERO)), &mut vis), Note::OPEN);
        assert_eq!(r.touches(UserId(1)).map(TouchSet::len), Some(1));
    }

    #[test]
    fn touch_policy_still_needs_a_hand() {
        let mut r = resolver(GatingPolicy::Touch);
        let mut vis = RecordingVisuals::default();
        r.contact(UserId(1), Note(4), Contact::Enter, Instant::now());
        assert_eq!(r.resolve(None, &mut vis), Note::OPEN);
    }

    #[test]
    fn position_policy_ignores_contacts() {
        let mut r = resolver(GatingPolicy::Position);
        r.contact(UserId(1), Note(4), Contact::Enter, Instant::now());
        assert!(r.touches(UserId(1)).is_none());
    }

    #[test]
    #[should_panic]
    fn contact_outside_neck_is_a_bug() {
        let mut r = resolver(GatingPolicy::Touch);
        r.contact(UserId(1), Note(13), Contact::Enter, Instant::now());
    }
}
