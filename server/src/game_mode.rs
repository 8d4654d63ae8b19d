//! Game-mode policy seam.
//!
//! The combat core does not own damage scaling, kill scoring, or match
//! lifecycle; it consults whatever mode the session runs. The mode is
//! queried fresh on every death attempt because match state can change
//! between the triggering event and processing.

use log::info;
use shared::{ControllerId, DamageKind, EntityId};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchState {
    InProgress,
    /// Terminal: a level transition is underway, no further deaths process.
    LeavingMap,
}

pub trait GameMode: Send {
    /// Adjusts incoming damage before the ledger commits it.
    fn modify_damage(
        &self,
        damage: f32,
        victim: EntityId,
        kind: DamageKind,
        instigator: Option<ControllerId>,
        causer: Option<EntityId>,
    ) -> f32;

    /// Scores a confirmed kill.
    fn killed(
        &mut self,
        killer: Option<ControllerId>,
        victim_controller: Option<ControllerId>,
        victim: EntityId,
        kind: DamageKind,
    );

    fn match_state(&self) -> MatchState;

    /// Team rule backing enemy checks.
    fn can_deal_damage(&self, attacker_team: u8, victim_team: u8) -> bool;
}

#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct Score {
    pub kills: u32,
    pub deaths: u32,
}

/// Free-for-all: everyone is everyone's enemy, damage passes through
/// unmodified, suicides score no kill.
pub struct FreeForAllMode {
    state: MatchState,
    scores: HashMap<ControllerId, Score>,
}

impl FreeForAllMode {
    pub fn new() -> Self {
        Self {
            state: MatchState::InProgress,
            scores: HashMap::new(),
        }
    }

    pub fn begin_leaving_map(&mut self) {
        self.state = MatchState::LeavingMap;
    }

    pub fn score(&self, controller: ControllerId) -> Score {
        self.scores.get(&controller).copied().unwrap_or_default()
    }
}

impl Default for FreeForAllMode {
    fn default() -> Self {
        Self::new()
    }
}

impl GameMode for FreeForAllMode {
    fn modify_damage(
        &self,
        damage: f32,
        _victim: EntityId,
        _kind: DamageKind,
        _instigator: Option<ControllerId>,
        _causer: Option<EntityId>,
    ) -> f32 {
        damage
    }

    fn killed(
        &mut self,
        killer: Option<ControllerId>,
        victim_controller: Option<ControllerId>,
        victim: EntityId,
        kind: DamageKind,
    ) {
        if let Some(victim_controller) = victim_controller {
            self.scores.entry(victim_controller).or_default().deaths += 1;
        }

        if let Some(killer) = killer {
            if Some(killer) != victim_controller {
                self.scores.entry(killer).or_default().kills += 1;
            }
        }

        info!(
            "Entity {} killed by {:?} ({:?})",
            victim, killer, kind
        );
    }

    fn match_state(&self) -> MatchState {
        self.state
    }

    fn can_deal_damage(&self, _attacker_team: u8, _victim_team: u8) -> bool {
        true
    }
}
