//! Client-side mirror of replicated combat state.
//!
//! The mirror applies authoritative snapshots and reacts to changes. Hit
//! records are dispatched by serial: a bumped serial means a new event,
//! even if the payload repeats, and the kill flag decides between the
//! death-reaction and hit-reaction paths using exactly the carried values.
//!
//! The local status-effect track lives here too. It is deliberately
//! independent of the authority-side effect flag: it governs only local
//! input disabling and overlay cosmetics, runs on its own timer, and may
//! diverge from the server's view.

use log::{debug, info};
use shared::{CharacterSnapshot, EffectKind, EntityId, LastHitInfo, Vec3, WeaponInfo};
use std::collections::HashMap;

/// Local view of one replicated character. Scoped fields keep their last
/// known value when a snapshot omits them.
#[derive(Debug, Clone)]
pub struct CharacterView {
    pub id: EntityId,
    pub health: f32,
    pub max_health: f32,
    pub dying: bool,
    pub effect_active: bool,
    pub shrunk: bool,
    pub scale: f32,
    pub current_weapon: Option<EntityId>,
    pub position: Option<Vec3>,
    pub inventory: Vec<WeaponInfo>,
    pub targeting: bool,
    pub running: bool,
}

/// Reactions surfaced to the presentation layer (HUD, sound, vibration).
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MirrorEvent {
    HitTaken {
        victim: EntityId,
        hit: LastHitInfo,
    },
    DeathObserved {
        victim: EntityId,
        hit: LastHitInfo,
    },
    /// The local pawn instigated a hit on someone else.
    EnemyHitConfirmed {
        victim: EntityId,
    },
}

/// The local-presentation status effect track: input disable, overlay,
/// duration timer. Never spawns server-visible state.
#[derive(Debug)]
pub struct LocalEffects {
    active: Option<(EffectKind, f64)>,
    pub input_enabled: bool,
    pub overlay: Option<EffectKind>,
    /// Missing overlay assets degrade gracefully: the state transition
    /// still runs, only the cosmetic step is skipped.
    pub overlay_available: bool,
}

impl LocalEffects {
    pub fn new() -> Self {
        Self {
            active: None,
            input_enabled: true,
            overlay: None,
            overlay_available: true,
        }
    }

    /// Activates an effect locally unless one is already running. Disables
    /// input immediately and arms the expiry timer.
    pub fn activate(&mut self, kind: EffectKind, now: f64) -> bool {
        if self.active.is_some() {
            return false;
        }

        self.active = Some((kind, now + kind.duration()));
        self.input_enabled = false;
        if self.overlay_available {
            self.overlay = Some(kind);
        }
        info!("Local {:?} effect for {:.1}s", kind, kind.duration());
        true
    }

    /// Expires the effect when its local timer fires, re-enabling input.
    pub fn advance(&mut self, now: f64) {
        if let Some((kind, until)) = self.active {
            if now >= until {
                self.active = None;
                self.input_enabled = true;
                self.overlay = None;
                debug!("Local {:?} effect expired", kind);
            }
        }
    }

    pub fn active_kind(&self) -> Option<EffectKind> {
        self.active.map(|(kind, _)| kind)
    }
}

impl Default for LocalEffects {
    fn default() -> Self {
        Self::new()
    }
}

pub struct Mirror {
    pub local_entity: Option<EntityId>,
    views: HashMap<EntityId, CharacterView>,
    last_hit_serials: HashMap<EntityId, u32>,
    pub local_effects: LocalEffects,
    /// Local fire intent; force-released when a freeze lands on us.
    pub fire_held: bool,
    events: Vec<MirrorEvent>,
    last_tick: u32,
}

impl Mirror {
    pub fn new() -> Self {
        Self {
            local_entity: None,
            views: HashMap::new(),
            last_hit_serials: HashMap::new(),
            local_effects: LocalEffects::new(),
            fire_held: false,
            events: Vec::new(),
            last_tick: 0,
        }
    }

    pub fn bind_local_entity(&mut self, entity: EntityId) {
        self.local_entity = Some(entity);
    }

    /// Applies one authoritative state packet. Stale packets (older tick
    /// than already applied) are dropped; UDP makes no ordering promise.
    pub fn apply_state(&mut self, tick: u32, characters: Vec<CharacterSnapshot>, now: f64) {
        if tick < self.last_tick {
            debug!("Dropping stale state packet (tick {} < {})", tick, self.last_tick);
            return;
        }
        self.last_tick = tick;

        for snapshot in &characters {
            if let Some(hit) = snapshot.last_hit {
                let seen = self.last_hit_serials.get(&snapshot.id).copied();
                if seen != Some(hit.serial) {
                    self.last_hit_serials.insert(snapshot.id, hit.serial);
                    self.on_hit_record(snapshot.id, hit, now);
                }
            }

            self.merge_view(snapshot);
        }

        // entities absent from the snapshot are gone from the world
        let present: Vec<EntityId> = characters.iter().map(|s| s.id).collect();
        self.views.retain(|id, _| present.contains(id));
        self.last_hit_serials.retain(|id, _| present.contains(id));
    }

    fn merge_view(&mut self, snapshot: &CharacterSnapshot) {
        let view = self.views.entry(snapshot.id).or_insert_with(|| CharacterView {
            id: snapshot.id,
            health: snapshot.health,
            max_health: snapshot.max_health,
            dying: snapshot.dying,
            effect_active: snapshot.effect_active,
            shrunk: snapshot.shrunk,
            scale: snapshot.scale,
            current_weapon: snapshot.current_weapon,
            position: snapshot.position,
            inventory: Vec::new(),
            targeting: false,
            running: false,
        });

        view.health = snapshot.health;
        view.max_health = snapshot.max_health;
        view.dying = snapshot.dying;
        view.effect_active = snapshot.effect_active;
        view.shrunk = snapshot.shrunk;
        view.scale = snapshot.scale;
        view.current_weapon = snapshot.current_weapon;
        if let Some(position) = snapshot.position {
            view.position = Some(position);
        }
        if let Some(inventory) = &snapshot.inventory {
            view.inventory = inventory.clone();
        }
        if let Some(targeting) = snapshot.targeting {
            view.targeting = targeting;
        }
        if let Some(running) = snapshot.running {
            view.running = running;
        }
    }

    /// Dispatches a changed hit record to the death or hit reaction path,
    /// using the values carried in the record.
    fn on_hit_record(&mut self, victim: EntityId, hit: LastHitInfo, now: f64) {
        if hit.killed {
            self.events.push(MirrorEvent::DeathObserved { victim, hit });
            if Some(victim) == self.local_entity {
                info!("We died ({:?}, {:.1} damage)", hit.kind, hit.damage);
                self.local_effects.input_enabled = false;
                self.fire_held = false;
            }
        } else {
            self.events.push(MirrorEvent::HitTaken { victim, hit });
            if Some(victim) == self.local_entity {
                if let Some(kind) = hit.kind.effect() {
                    let started = self.local_effects.activate(kind, now);
                    if started && kind == EffectKind::Freeze {
                        // observed weapons keep firing through a freeze
                        // without this
                        self.fire_held = false;
                    }
                }
            }
        }

        if hit.instigator.is_some()
            && hit.instigator == self.local_entity
            && Some(victim) != self.local_entity
        {
            self.events.push(MirrorEvent::EnemyHitConfirmed { victim });
        }
    }

    /// Ticks the local effect timer.
    pub fn advance(&mut self, now: f64) {
        self.local_effects.advance(now);
    }

    pub fn drain_events(&mut self) -> Vec<MirrorEvent> {
        std::mem::take(&mut self.events)
    }

    pub fn view(&self, id: EntityId) -> Option<&CharacterView> {
        self.views.get(&id)
    }

    pub fn local_view(&self) -> Option<&CharacterView> {
        self.local_entity.and_then(|id| self.views.get(&id))
    }

    pub fn views(&self) -> impl Iterator<Item = &CharacterView> {
        self.views.values()
    }

    /// HUD warning threshold mirror.
    pub fn low_health_warning(&self) -> bool {
        match self.local_view() {
            Some(view) => {
                view.health > 0.0 && view.health < view.max_health * shared::LOW_HEALTH_PERCENTAGE
            }
            None => false,
        }
    }
}

impl Default for Mirror {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::{DamageKind, FREEZE_DURATION, SHRINK_DURATION};

    fn snapshot(id: EntityId) -> CharacterSnapshot {
        CharacterSnapshot {
            id,
            health: 100.0,
            max_health: 100.0,
            dying: false,
            effect_active: false,
            shrunk: false,
            scale: 1.0,
            current_weapon: None,
            position: Some(Vec3::ZERO),
            last_hit: None,
            inventory: None,
            targeting: Some(false),
            running: Some(false),
        }
    }

    fn hit(serial: u32, damage: f32, kind: DamageKind, killed: bool) -> LastHitInfo {
        LastHitInfo {
            serial,
            damage,
            kind,
            instigator: None,
            causer: None,
            killed,
        }
    }

    #[test]
    fn test_hit_record_dispatches_once_per_serial() {
        let mut mirror = Mirror::new();
        let victim = EntityId::new(1, 1);

        let mut snap = snapshot(victim);
        snap.last_hit = Some(hit(1, 25.0, DamageKind::Normal, false));

        mirror.apply_state(1, vec![snap.clone()], 0.0);
        // same record redelivered in the next packet
        mirror.apply_state(2, vec![snap], 0.1);

        let events = mirror.drain_events();
        assert_eq!(events.len(), 1);
        assert!(matches!(events[0], MirrorEvent::HitTaken { .. }));
    }

    #[test]
    fn test_kill_flag_routes_to_death_reaction() {
        let mut mirror = Mirror::new();
        let victim = EntityId::new(1, 1);

        let mut snap = snapshot(victim);
        snap.dying = true;
        snap.last_hit = Some(hit(1, 90.0, DamageKind::Normal, true));
        mirror.apply_state(1, vec![snap], 0.0);

        let events = mirror.drain_events();
        assert_eq!(events.len(), 1);
        match events[0] {
            MirrorEvent::DeathObserved { victim: v, hit } => {
                assert_eq!(v, victim);
                assert_eq!(hit.damage, 90.0);
            }
            _ => panic!("Expected death reaction"),
        }
    }

    #[test]
    fn test_local_freeze_reaction_disables_input() {
        let mut mirror = Mirror::new();
        let me = EntityId::new(1, 1);
        mirror.bind_local_entity(me);
        mirror.fire_held = true;

        let mut snap = snapshot(me);
        snap.last_hit = Some(hit(1, 10.0, DamageKind::Freeze, false));
        mirror.apply_state(1, vec![snap], 0.0);

        assert!(!mirror.local_effects.input_enabled);
        assert_eq!(mirror.local_effects.active_kind(), Some(EffectKind::Freeze));
        assert_eq!(mirror.local_effects.overlay, Some(EffectKind::Freeze));
        assert!(!mirror.fire_held);

        // timer expiry restores input
        mirror.advance(FREEZE_DURATION + 0.01);
        assert!(mirror.local_effects.input_enabled);
        assert!(mirror.local_effects.overlay.is_none());
    }

    #[test]
    fn test_local_track_mutual_exclusion() {
        let mut mirror = Mirror::new();
        let me = EntityId::new(1, 1);
        mirror.bind_local_entity(me);

        let mut snap = snapshot(me);
        snap.last_hit = Some(hit(1, 10.0, DamageKind::Shrink, false));
        mirror.apply_state(1, vec![snap.clone()], 0.0);
        assert_eq!(mirror.local_effects.active_kind(), Some(EffectKind::Shrink));

        // freeze hit while the shrink track is active changes nothing
        snap.last_hit = Some(hit(2, 10.0, DamageKind::Freeze, false));
        mirror.apply_state(2, vec![snap], 0.1);
        assert_eq!(mirror.local_effects.active_kind(), Some(EffectKind::Shrink));

        mirror.advance(SHRINK_DURATION + 0.01);
        assert!(mirror.local_effects.active_kind().is_none());
        assert!(mirror.local_effects.input_enabled);
    }

    #[test]
    fn test_other_entity_effect_hit_does_not_touch_local_track() {
        let mut mirror = Mirror::new();
        let me = EntityId::new(1, 1);
        let other = EntityId::new(2, 1);
        mirror.bind_local_entity(me);

        let mut snap = snapshot(other);
        snap.last_hit = Some(hit(1, 10.0, DamageKind::Freeze, false));
        mirror.apply_state(1, vec![snapshot(me), snap], 0.0);

        assert!(mirror.local_effects.input_enabled);
        assert!(mirror.local_effects.active_kind().is_none());
    }

    #[test]
    fn test_missing_overlay_degrades_gracefully() {
        let mut mirror = Mirror::new();
        let me = EntityId::new(1, 1);
        mirror.bind_local_entity(me);
        mirror.local_effects.overlay_available = false;

        let mut snap = snapshot(me);
        snap.last_hit = Some(hit(1, 10.0, DamageKind::Shrink, false));
        mirror.apply_state(1, vec![snap], 0.0);

        // state transition ran, only the cosmetic step was skipped
        assert_eq!(mirror.local_effects.active_kind(), Some(EffectKind::Shrink));
        assert!(mirror.local_effects.overlay.is_none());
        assert!(!mirror.local_effects.input_enabled);
    }

    #[test]
    fn test_hit_confirm_for_local_instigator() {
        let mut mirror = Mirror::new();
        let me = EntityId::new(1, 1);
        let other = EntityId::new(2, 1);
        mirror.bind_local_entity(me);

        let mut snap = snapshot(other);
        snap.last_hit = Some(LastHitInfo {
            serial: 1,
            damage: 20.0,
            kind: DamageKind::Normal,
            instigator: Some(me),
            causer: None,
            killed: false,
        });
        mirror.apply_state(1, vec![snapshot(me), snap], 0.0);

        let events = mirror.drain_events();
        assert!(events
            .iter()
            .any(|e| matches!(e, MirrorEvent::EnemyHitConfirmed { victim } if *victim == other)));
    }

    #[test]
    fn test_stale_packet_dropped() {
        let mut mirror = Mirror::new();
        let victim = EntityId::new(1, 1);

        let mut fresh = snapshot(victim);
        fresh.health = 60.0;
        mirror.apply_state(10, vec![fresh], 0.0);

        let stale = snapshot(victim);
        mirror.apply_state(5, vec![stale], 0.1);

        assert_eq!(mirror.view(victim).unwrap().health, 60.0);
    }

    #[test]
    fn test_scoped_fields_keep_last_known_value() {
        let mut mirror = Mirror::new();
        let other = EntityId::new(2, 1);

        let mut snap = snapshot(other);
        snap.targeting = Some(true);
        mirror.apply_state(1, vec![snap.clone()], 0.0);
        assert!(mirror.view(other).unwrap().targeting);

        // next snapshot omits the scoped field
        snap.targeting = None;
        snap.position = None;
        mirror.apply_state(2, vec![snap], 0.1);

        let view = mirror.view(other).unwrap();
        assert!(view.targeting);
        assert_eq!(view.position, Some(Vec3::ZERO));
    }

    #[test]
    fn test_departed_entities_pruned() {
        let mut mirror = Mirror::new();
        let a = EntityId::new(1, 1);
        let b = EntityId::new(2, 1);

        mirror.apply_state(1, vec![snapshot(a), snapshot(b)], 0.0);
        assert!(mirror.view(b).is_some());

        mirror.apply_state(2, vec![snapshot(a)], 0.1);
        assert!(mirror.view(b).is_none());
    }

    #[test]
    fn test_low_health_warning_threshold() {
        let mut mirror = Mirror::new();
        let me = EntityId::new(1, 1);
        mirror.bind_local_entity(me);

        let mut snap = snapshot(me);
        snap.health = 49.0;
        mirror.apply_state(1, vec![snap.clone()], 0.0);
        assert!(mirror.low_health_warning());

        snap.health = 51.0;
        mirror.apply_state(2, vec![snap.clone()], 0.1);
        assert!(!mirror.low_health_warning());

        snap.health = 0.0;
        snap.dying = true;
        mirror.apply_state(3, vec![snap], 0.2);
        assert!(!mirror.low_health_warning());
    }
}
