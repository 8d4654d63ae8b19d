//! Health & damage ledger.
//!
//! Authority-only bookkeeping of hit points, death eligibility, and the
//! death sequence. Damage amounts pass through the game-mode policy before
//! committing; survivors go down the hit-reaction path, lethal hits run the
//! death transition exactly once.

use crate::game_mode::MatchState;
use crate::tasks::TaskKind;
use crate::world::{Ctx, World, WorldEvent};
use log::{debug, info};
use shared::{
    ControllerId, DamageKind, EntityId, COLLISION_GRACE, CORPSE_LIFESPAN, NOISE_LOUDNESS,
    RAGDOLL_LEAD, RAGDOLL_MIN_DELAY,
};

impl World {
    /// Applies a damage-causing action to `target` and returns the damage
    /// actually committed after the game-mode adjustment. Zero-effect calls
    /// (invulnerable target, already-dead target, non-authority context)
    /// return 0.0 and change nothing.
    pub fn apply_damage(
        &mut self,
        ctx: Ctx,
        target: EntityId,
        damage: f32,
        kind: DamageKind,
        instigator: Option<ControllerId>,
        causer: Option<EntityId>,
    ) -> f32 {
        if !self.gate(ctx) {
            return 0.0;
        }

        let (controller, health, position) = match self.characters.get(target) {
            Some(c) => (c.controller, c.health, c.position),
            None => return 0.0,
        };

        if let Some(controller) = controller {
            if self
                .controllers
                .get(&controller)
                .map_or(false, |c| c.god_mode)
            {
                return 0.0;
            }
        }

        if health <= 0.0 {
            return 0.0;
        }

        let damage = self
            .game_mode
            .modify_damage(damage, target, kind, instigator, causer);
        if damage <= 0.0 {
            return 0.0;
        }

        let mut died = false;
        if let Some(character) = self.characters.get_mut(target) {
            character.health -= damage;
            if kind.credits_killer() {
                if let Some(instigator) = instigator {
                    character.last_hit_by = Some(instigator);
                }
            }
            died = character.health <= 0.0;
        }

        if died {
            self.die(ctx, target, damage, kind, instigator, causer);
        } else {
            self.play_hit(target, damage, kind, instigator, causer);
        }

        let source = instigator
            .and_then(|i| self.controllers.get(&i))
            .and_then(|c| c.pawn)
            .unwrap_or(target);
        self.presentation
            .make_noise(position, NOISE_LOUDNESS, source);
        self.events.push(WorldEvent::Noise {
            location: position,
            loudness: NOISE_LOUDNESS,
            source,
        });

        damage
    }

    /// Death eligibility, evaluated fresh on every attempt: match state can
    /// change between the triggering event and its processing.
    pub fn can_die(&self, target: EntityId) -> bool {
        let character = match self.characters.get(target) {
            // already destroyed
            Some(c) => c,
            None => return false,
        };

        if character.dying {
            return false;
        }
        if self.game_mode.match_state() == MatchState::LeavingMap {
            // level transition occurring
            return false;
        }

        true
    }

    /// Commits the death: floors health, resolves kill credit, notifies the
    /// game mode, forces one out-of-band movement refresh, and runs the
    /// death sequence.
    pub fn die(
        &mut self,
        ctx: Ctx,
        target: EntityId,
        killing_damage: f32,
        kind: DamageKind,
        killer: Option<ControllerId>,
        causer: Option<EntityId>,
    ) -> bool {
        if !self.gate(ctx) || !self.can_die(target) {
            return false;
        }

        let (victim_controller, killer) = match self.characters.get_mut(target) {
            Some(character) => {
                character.health = character.health.min(0.0);
                let resolved = Self::resolve_killer(
                    killer,
                    character.controller,
                    character.last_hit_by,
                    kind,
                );
                (character.controller, resolved)
            }
            None => return false,
        };

        self.game_mode.killed(killer, victim_controller, target, kind);

        if let Some(character) = self.characters.get_mut(target) {
            character.movement_refresh = true;
        }

        let killer_pawn = killer
            .and_then(|k| self.controllers.get(&k))
            .and_then(|c| c.pawn);
        self.on_death(target, killing_damage, kind, killer_pawn, causer);
        true
    }

    /// Environmental deaths refer back to the previous qualifying attacker
    /// so they receive credit (knocked into pits, etc).
    fn resolve_killer(
        nominal: Option<ControllerId>,
        victim_controller: Option<ControllerId>,
        last_hit_by: Option<ControllerId>,
        kind: DamageKind,
    ) -> Option<ControllerId> {
        if nominal.is_some() && nominal != victim_controller {
            return nominal;
        }
        if !kind.credits_killer() && last_hit_by.is_some() {
            return last_hit_by;
        }
        nominal
    }

    /// The death sequence. Guarded by the monotonic dying flag: repeat
    /// invocations are no-ops.
    fn on_death(
        &mut self,
        target: EntityId,
        killing_damage: f32,
        kind: DamageKind,
        instigator: Option<EntityId>,
        causer: Option<EntityId>,
    ) {
        let now = self.time;

        match self.characters.get_mut(target) {
            Some(character) => {
                if character.dying {
                    return;
                }
                character.dying = true;
                character.replicate_movement = false;
                character.torn_off = true;
                character.wants_to_fire = false;
            }
            None => return,
        }

        // Attached proxies only exist while an effect is active; they die
        // with their owner, which runs the effect teardown on a dead entity.
        if self
            .characters
            .get(target)
            .map_or(false, |c| c.effect_active())
        {
            self.end_effect(target);
        }

        // the held weapon falls where its owner did, remaining ammo intact
        self.drop_held_weapon(target);

        if let Some(character) = self.characters.get_mut(target) {
            character
                .hit_buffer
                .replicate_hit(now, killing_damage, kind, instigator, causer, true);
        }

        let duration = self.presentation.play_death_reaction(target, kind);

        self.destroy_inventory(Ctx::authority(), target);
        self.presentation.revert_visuals(target);

        let controller = self.characters.get(target).and_then(|c| c.controller);
        if let Some(controller) = controller {
            if let Some(ctrl) = self.controllers.get_mut(&controller) {
                ctrl.input_enabled = false;
            }
        }

        if duration > 0.0 {
            // hand off a little before the animation ends so the pose
            // doesn't blend back
            let delay = (duration - RAGDOLL_LEAD).max(RAGDOLL_MIN_DELAY);
            self.tasks.schedule(now + delay, target, TaskKind::RagdollStart);
        } else {
            self.start_ragdoll(target);
        }

        self.tasks
            .schedule(now + COLLISION_GRACE, target, TaskKind::CollisionGraceOver);
        self.tasks
            .schedule(now + CORPSE_LIFESPAN, target, TaskKind::CorpseExpired);

        info!("Entity {} died ({:?})", target, kind);
    }

    /// Survivor path: buffer the hit for replication, start a status effect
    /// on a qualifying classification, trigger the presentation reaction.
    fn play_hit(
        &mut self,
        target: EntityId,
        damage: f32,
        kind: DamageKind,
        instigator: Option<ControllerId>,
        causer: Option<EntityId>,
    ) {
        let now = self.time;
        let instigator_pawn = instigator
            .and_then(|i| self.controllers.get(&i))
            .and_then(|c| c.pawn);

        if let Some(character) = self.characters.get_mut(target) {
            character
                .hit_buffer
                .replicate_hit(now, damage, kind, instigator_pawn, causer, false);
        }

        if let Some(effect) = kind.effect() {
            self.try_start_effect(target, effect);
        }

        self.presentation.play_hit_reaction(target, damage, kind);
    }

    pub(crate) fn start_ragdoll(&mut self, target: EntityId) {
        if let Some(character) = self.characters.get_mut(target) {
            character.ragdoll = true;
            debug!("Entity {} ragdoll handoff", target);
        }
    }

    fn drop_held_weapon(&mut self, target: EntityId) {
        let held = match self.characters.get(target) {
            Some(c) => c.current_weapon,
            None => return,
        };
        let (kind, ammo, ammo_in_clip) = match held.and_then(|w| self.weapons.get(w)) {
            Some(w) => (w.kind, w.ammo, w.ammo_in_clip),
            None => return,
        };
        let position = match self.characters.get(target) {
            Some(c) => c.position,
            None => return,
        };

        self.spawn_pickup(Ctx::authority(), kind, ammo, ammo_in_clip, position);
    }

    // ---- alternate death entry points ----

    pub fn suicide(&mut self, ctx: Ctx, target: EntityId) -> bool {
        self.killed_by(ctx, target, target)
    }

    /// Direct kill attributed to `event_instigator`'s controller, bypassing
    /// the damage pipeline.
    pub fn killed_by(&mut self, ctx: Ctx, target: EntityId, event_instigator: EntityId) -> bool {
        if !self.gate(ctx) {
            return false;
        }

        let health = match self.characters.get(target) {
            Some(c) if !c.dying => c.health,
            _ => return false,
        };

        let killer = self
            .characters
            .get(event_instigator)
            .and_then(|c| c.controller);
        if let Some(character) = self.characters.get_mut(target) {
            character.last_hit_by = None;
        }

        self.die(ctx, target, health, DamageKind::Suicide, killer, None)
    }

    /// World-boundary death; credit carries over to the last qualifying
    /// attacker via the attribution chain.
    pub fn fell_out_of_world(&mut self, ctx: Ctx, target: EntityId) -> bool {
        let health = match self.characters.get(target) {
            Some(c) => c.health,
            None => return false,
        };
        self.die(ctx, target, health, DamageKind::Falling, None, None)
    }
}
