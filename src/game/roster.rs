//! Participant Roster
//!
//! Registered participants and the ordered active list a session draws
//! from. The engine refuses roster changes while a session runs.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::core::rng::shuffle;
use crate::core::{PlayerId, RandomSource};
use crate::error::{GameError, GameResult};

/// A player entered in the elimination game.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Participant {
    /// Player handle.
    pub id: PlayerId,
    /// Name shown in announcements ("First Last").
    pub display_name: String,
}

impl Participant {
    /// New participant.
    pub fn new(id: impl Into<PlayerId>, display_name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            display_name: display_name.into(),
        }
    }

    /// Last word of the display name.
    pub fn surname(&self) -> &str {
        self.display_name
            .split_whitespace()
            .last()
            .unwrap_or(self.display_name.as_str())
    }

    /// "Name (@handle)".
    pub fn label(&self) -> String {
        format!("{} ({})", self.display_name, self.id)
    }
}

/// Order participants by surname, then full name, then handle.
///
/// Bettors address participants by 1-based position in this order.
pub fn betting_order(participants: &[Participant]) -> Vec<Participant> {
    let mut ordered = participants.to_vec();
    ordered.sort_by(|a, b| {
        a.surname()
            .to_lowercase()
            .cmp(&b.surname().to_lowercase())
            .then_with(|| a.display_name.cmp(&b.display_name))
            .then_with(|| a.id.cmp(&b.id))
    });
    ordered
}

/// Registered and active participants.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Roster {
    registered: BTreeMap<PlayerId, Participant>,
    active: Vec<PlayerId>,
}

impl Roster {
    /// Empty roster.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register and activate a participant.
    pub fn add(&mut self, participant: Participant) -> GameResult<()> {
        if self.registered.contains_key(&participant.id) {
            return Err(GameError::AlreadyRegistered(participant.id));
        }
        self.active.push(participant.id.clone());
        self.registered.insert(participant.id.clone(), participant);
        Ok(())
    }

    /// Remove a participant entirely.
    pub fn remove(&mut self, id: &PlayerId) -> GameResult<Participant> {
        let participant = self
            .registered
            .remove(id)
            .ok_or_else(|| GameError::UnknownParticipant(id.clone()))?;
        self.active.retain(|p| p != id);
        Ok(participant)
    }

    /// Drop a participant from the active list. They stay registered.
    pub fn deactivate(&mut self, id: &PlayerId) {
        self.active.retain(|p| p != id);
    }

    /// Re-activate every registered participant in shuffled order.
    pub fn reset(&mut self, rng: &dyn RandomSource) {
        let mut ids: Vec<PlayerId> = self.registered.keys().cloned().collect();
        shuffle(rng, &mut ids);
        self.active = ids;
    }

    /// Active participants in order.
    pub fn active(&self) -> Vec<Participant> {
        self.active
            .iter()
            .filter_map(|id| self.registered.get(id).cloned())
            .collect()
    }

    /// Registered participant by handle.
    pub fn get(&self, id: &PlayerId) -> Option<&Participant> {
        self.registered.get(id)
    }

    /// Number of active participants.
    pub fn len(&self) -> usize {
        self.active.len()
    }

    /// No active participants.
    pub fn is_empty(&self) -> bool {
        self.active.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::SeededRng;

    fn roster() -> Roster {
        let mut r = Roster::new();
        r.add(Participant::new("zed", "Zed Adams")).unwrap();
        r.add(Participant::new("amy", "Amy Young")).unwrap();
        r.add(Participant::new("bo", "Bo Miller")).unwrap();
        r
    }

    #[test]
    fn test_surname() {
        assert_eq!(Participant::new("x", "Mary Jane Watson").surname(), "Watson");
        assert_eq!(Participant::new("x", "Cher").surname(), "Cher");
    }

    #[test]
    fn test_betting_order_by_surname() {
        let order: Vec<String> = betting_order(&roster().active())
            .into_iter()
            .map(|p| p.display_name)
            .collect();
        assert_eq!(order, vec!["Zed Adams", "Bo Miller", "Amy Young"]);
    }

    #[test]
    fn test_add_remove() {
        let mut r = roster();
        assert!(matches!(
            r.add(Participant::new("bo", "Bo Again")),
            Err(GameError::AlreadyRegistered(_))
        ));
        r.remove(&PlayerId::new("bo")).unwrap();
        assert_eq!(r.len(), 2);
        assert!(r.remove(&PlayerId::new("bo")).is_err());
    }

    #[test]
    fn test_reset_restores_everyone() {
        let mut r = roster();
        r.deactivate(&PlayerId::new("zed"));
        assert_eq!(r.len(), 2);
        assert!(r.get(&PlayerId::new("zed")).is_some());
        r.active.clear();
        assert!(r.is_empty());
        r.reset(&SeededRng::new(3));
        assert_eq!(r.len(), 3);
    }
}
