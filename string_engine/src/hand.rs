//! Hand arbitration.
//!
//! Every connected user contributes one tracked hand per side.  Exactly one
//! of them is "in control" per side: the hand whose floor-plane distance to
//! the instrument origin is smallest, re-evaluated once per arbitration tick.

use std::collections::BTreeMap;
use std::fmt;

use log::{debug, info};

use crate::spatial::{flat_distance, Vec3};

// ════════════════════════════════════════════════════════════════════════════
// Identifiers
// ════════════════════════════════════════════════════════════════════════════

/// Opaque user identifier handed out by the session host.
///
/// Ordering matters: arbitration ties go to the lowest id.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct UserId(pub u64);

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Side {
    Left,
    Right,
}

impl Side {
    pub const BOTH: [Side; 2] = [Side::Left, Side::Right];

    pub fn name(self) -> &'static str {
        match self {
            Side::Left  => "left",
            Side::Right => "right",
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ════════════════════════════════════════════════════════════════════════════
// TrackedHand
// ════════════════════════════════════════════════════════════════════════════

/// Latest known position of one user's hand.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TrackedHand {
    pub owner:    UserId,
    pub side:     Side,
    pub position: Vec3,
}

// ════════════════════════════════════════════════════════════════════════════
// HandArbiter
// ════════════════════════════════════════════════════════════════════════════

/// Registry of all hands for one side plus the currently active one.
///
/// `active` is always a key of `hands`, or `None`.
#[derive(Debug)]
pub struct HandArbiter {
    side:   Side,
    origin: Vec3,
    hands:  BTreeMap<UserId, TrackedHand>,
    active: Option<UserId>,
}

impl HandArbiter {
    pub fn new(side: Side) -> Self {
        Self::with_origin(side, Vec3::ZERO)
    }

    pub fn with_origin(side: Side, origin: Vec3) -> Self {
        HandArbiter { side, origin, hands: BTreeMap::new(), active: None }
    }

    pub fn side(&self) -> Side { self.side }

    pub fn len(&self) -> usize { self.hands.len() }

    pub fn is_empty(&self) -> bool { self.hands.is_empty() }

    /// Start tracking `user`'s hand.  Re-registering replaces the position.
    pub fn register(&mut self, user: UserId, position: Vec3) {
        self.hands.insert(user, TrackedHand { owner: user, side: self.side, position });
    }

    /// Stop tracking `user`'s hand.
    ///
    /// If it was the active hand, no hand is active until the next
    /// [`reselect`](Self::reselect).  Returns the removed hand.
    pub fn unregister(&mut self, user: UserId) -> Option<TrackedHand> {
        let removed = self.hands.remove(&user);
        if removed.is_some() && self.active == Some(user) {
            self.active = None;
        }
        removed
    }

    /// Store the latest position for `user`.  Last write wins.
    ///
    /// Returns `false` if the user has no registered hand on this side.
    pub fn update_position(&mut self, user: UserId, position: Vec3) -> bool {
        match self.hands.get_mut(&user) {
            Some(hand) => {
                hand.position = position;
                true
            }
            None => false,
        }
    }

    pub fn hand(&self, user: UserId) -> Option<&TrackedHand> {
        self.hands.get(&user)
    }

    pub fn hands(&self) -> impl Iterator<Item = &TrackedHand> {
        self.hands.values()
    }

    pub fn active(&self) -> Option<&TrackedHand> {
        self.active.and_then(|id| self.hands.get(&id))
    }

    pub fn active_id(&self) -> Option<UserId> { self.active }

    pub fn active_position(&self) -> Option<Vec3> {
        self.active().map(|h| h.position)
    }

    /// Pick the hand closest to the origin on the floor plane.
    ///
    /// Hands are scanned in ascending user id and only a strictly smaller
    /// distance replaces the candidate, so ties go to the lowest id.
    pub fn reselect(&mut self) -> Option<UserId> {
        let mut closest: Option<(UserId, f32)> = None;

        debug!("finding closest {} hand among {}", self.side, self.hands.len());
        for hand in self.hands.values() {
            let dist = flat_distance(hand.position, self.origin);
            debug!("  user {} pos {} dist {:.3}", hand.owner, hand.position, dist);
            if closest.map_or(true, |(_, best)| dist < best) {
                closest = Some((hand.owner, dist));
            }
        }

        let winner = closest.map(|(id, _)| id);
        if winner != self.active {
            match winner {
                Some(id) => info!("{} hand now controlled by user {}", self.side, id),
                None     => info!("no {} hand in control", self.side),
            }
        }
        self.active = winner;
        winner
    }
}

// ════════════════════════════════════════════════════════════════════════════
// Tests
// ════════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;

    fn arbiter(hands: &[(u64, Vec3)]) -> HandArbiter {
        let mut a = HandArbiter::new(Side::Left);
        for &(id, pos) in hands {
            a.register(UserId(id), pos);
        }
        a
    }

    #[test]
    fn empty_registry_has_no_active_hand() {
        let mut a = HandArbiter::new(Side::Right);
        assert_eq!(a.reselect(), None);
        assert!(a.active().is_none());
    }

    #[test]
    fn nearest_flat_distance_wins() {
        let mut a = arbiter(&[
            (1, Vec3::new(2.0, 0.0, 0.0)),
            (2, Vec3::new(0.5, 0.0, 0.5)),
            (3, Vec3::new(0.0, 0.0, -3.0)),
        ]);
        assert_eq!(a.reselect(), Some(UserId(2)));
        assert_eq!(a.active().map(|h| h.owner), Some(UserId(2)));
    }

    #[test]
    fn height_does_not_count() {
        // user 1 is far overhead but right above the origin
        let mut a = arbiter(&[
            (1, Vec3::new(0.0, 5.0, 0.1)),
            (2, Vec3::new(0.3, 0.0, 0.0)),
        ]);
        assert_eq!(a.reselect(), Some(UserId(1)));
    }

    #[test]
    fn ties_go_to_lowest_user_id() {
        let mut a = arbiter(&[
            (9, Vec3::new(1.0, 0.0, 0.0)),
            (4, Vec3::new(-1.0, 0.0, 0.0)),
            (7, Vec3::new(0.0, 0.0, 1.0)),
        ]);
        assert_eq!(a.reselect(), Some(UserId(4)));
    }

    #[test]
    fn unregistering_active_leaves_none_until_reselect() {
        let mut a = arbiter(&[
            (1, Vec3::new(0.1, 0.0, 0.0)),
            (2, Vec3::new(1.0, 0.0, 0.0)),
        ]);
        a.reselect();
        assert_eq!(a.active_id(), Some(UserId(1)));

        assert!(a.unregister(UserId(1)).is_some());
        assert_eq!(a.active_id(), None);
        assert!(a.active_position().is_none());

        assert_eq!(a.reselect(), Some(UserId(2)));
    }

    #[test]
    fn unregistering_other_hand_keeps_active() {
        let mut a = arbiter(&[
            (1, Vec3::new(0.1, 0.0, 0.0)),
            (2, Vec3::new(1.0, 0.0, 0.0)),
        ]);
        a.reselect();
        a.unregister(UserId(2));
        assert_eq!(a.active_id(), Some(UserId(1)));
        assert!(a.unregister(UserId(2)).is_none());
    }

    #[test]
    fn positions_update_but_active_waits_for_reselect() {
        let mut a = arbiter(&[
            (1, Vec3::new(0.1, 0.0, 0.0)),
            (2, Vec3::new(1.0, 0.0, 0.0)),
        ]);
        a.reselect();
        assert!(a.update_position(UserId(2), Vec3::new(0.01, 0.0, 0.0)));
        assert_eq!(a.active_id(), Some(UserId(1)));
        assert_eq!(a.reselect(), Some(UserId(2)));
        assert_eq!(a.active_position(), Some(Vec3::new(0.01, 0.0, 0.0)));
    }

    #[test]
    fn update_for_unknown_user_is_rejected() {
        let mut a = HandArbiter::new(Side::Left);
        assert!(!a.update_position(UserId(5), Vec3::ZERO));
        assert!(a.is_empty());
    }

    #[test]
    fn reselect_does_not_move_hands() {
        let p = Vec3::new(0.2, 0.3, 0.4);
        let mut a = arbiter(&[(1, p)]);
        a.reselect();
        assert_eq!(a.hand(UserId(1)).map(|h| h.position), Some(p));
    }
}
