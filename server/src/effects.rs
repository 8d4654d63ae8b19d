//! Status effect controller, authority track.
//!
//! One effect at most per entity, started by a qualifying damage
//! classification and ended only by its proxy's lifespan running out (or
//! the proxy dying with its owner). Freeze revokes possession for the
//! duration; shrink halves the capsule scale. The client keeps its own
//! cosmetic track that is deliberately not synchronized with this one.

use crate::character::ActiveEffect;
use crate::tasks::TaskKind;
use crate::world::{Ctx, World};
use log::{info, warn};
use shared::{EffectKind, EntityId, SHRINK_SCALE, SIZE_RESTORE_NUDGE};

impl World {
    /// Starts an effect on `target` unless one is already active. Returns
    /// whether the effect started.
    pub(crate) fn try_start_effect(&mut self, target: EntityId, kind: EffectKind) -> bool {
        let now = self.time;

        let (already_active, controller) = match self.characters.get(target) {
            Some(c) => (c.effect_active(), c.controller),
            None => return false,
        };
        if already_active {
            // mutual exclusion across effect families
            return false;
        }

        let revoked_controller = match kind {
            EffectKind::Freeze => {
                let controller = match controller {
                    Some(c) => c,
                    // possession transfer without a controller reference is
                    // unrecoverable
                    None => panic!("freeze on entity {} with no controller attached", target),
                };
                self.unpossess(controller);
                self.stop_fire(Ctx::authority(), target);
                Some(controller)
            }
            EffectKind::Shrink => {
                if let Some(character) = self.characters.get_mut(target) {
                    character.shrunk = true;
                    character.scale = SHRINK_SCALE;
                }
                self.presentation.effect_cosmetic(target, kind, false);
                None
            }
        };

        // proxy actor attached to the victim; its lifespan expiry is the
        // only thing that ends the effect
        self.tasks
            .schedule(now + kind.duration(), target, TaskKind::EffectProxyExpired);

        if let Some(character) = self.characters.get_mut(target) {
            character.effect = Some(ActiveEffect {
                kind,
                revoked_controller,
            });
        }

        info!("Effect {:?} started on {} ({:.1}s)", kind, target, kind.duration());
        true
    }

    /// Ends the active effect: proxy expiry on the living, proxy teardown
    /// on the dead. Alive entities get their reversal (and, for freeze,
    /// their controller back); dead ones get a one-time size restoration
    /// instead.
    pub(crate) fn end_effect(&mut self, target: EntityId) {
        let effect = match self.characters.get_mut(target) {
            Some(c) => c.effect.take(),
            None => return,
        };
        let effect = match effect {
            Some(e) => e,
            None => return,
        };

        // the proxy may have been destroyed early by the death sequence
        self.tasks.cancel(target, TaskKind::EffectProxyExpired);

        let alive = self
            .characters
            .get(target)
            .map_or(false, |c| c.is_alive());

        if effect.kind == EffectKind::Freeze && alive {
            match effect.revoked_controller {
                Some(controller) if self.controllers.contains_key(&controller) => {
                    self.possess(controller, target);
                }
                Some(controller) => {
                    warn!(
                        "Controller {:?} left before unfreeze of {}",
                        controller, target
                    );
                }
                None => {}
            }
        }

        if alive {
            if effect.kind == EffectKind::Shrink {
                if let Some(character) = self.characters.get_mut(target) {
                    character.shrunk = false;
                    character.scale = 1.0;
                }
            }
            self.presentation.effect_cosmetic(target, effect.kind, true);
        } else if self
            .characters
            .get(target)
            .map_or(false, |c| c.shrunk)
        {
            self.restore_size(target);
        }

        info!("Effect {:?} ended on {}", effect.kind, target);
    }

    /// Dead-entity size restoration: raise the body so the restored
    /// capsule doesn't clip the floor, then reset to identity scale.
    fn restore_size(&mut self, target: EntityId) {
        if let Some(character) = self.characters.get_mut(target) {
            character.position = character.position.raised(SIZE_RESTORE_NUDGE);
            character.scale = 1.0;
            character.shrunk = false;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game_mode::FreeForAllMode;
    use crate::presentation::recording::{Reaction, RecordingPresentation};
    use shared::{DamageKind, Vec3, FREEZE_DURATION, SHRINK_DURATION};

    fn test_world() -> (World, RecordingPresentation) {
        let presentation = RecordingPresentation::new(1.5);
        let world = World::new(
            Box::new(FreeForAllMode::new()),
            Box::new(presentation.clone()),
        );
        (world, presentation)
    }

    #[test]
    fn test_freeze_revokes_and_restores_control() {
        let (mut world, _) = test_world();
        let (controller, victim) = world.spawn_player(1, Vec3::ZERO);

        world.apply_damage(Ctx::authority(), victim, 10.0, DamageKind::Freeze, None, None);

        let character = world.character(victim).unwrap();
        assert!(character.effect_active());
        assert_eq!(character.controller, None);
        assert_eq!(world.controller(controller).unwrap().pawn, None);

        world.advance(FREEZE_DURATION + 0.01);

        let character = world.character(victim).unwrap();
        assert!(!character.effect_active());
        assert_eq!(character.controller, Some(controller));
        assert_eq!(world.controller(controller).unwrap().pawn, Some(victim));
    }

    #[test]
    fn test_freeze_stops_weapon_fire() {
        let (mut world, _) = test_world();
        let (_, victim) = world.spawn_player(1, Vec3::ZERO);
        world.spawn_default_inventory(Ctx::authority(), victim, &[shared::WeaponKind::Rifle]);
        world.advance(shared::EQUIP_DURATION + 0.01);
        world.start_fire(Ctx::authority(), victim);
        assert!(world.character(victim).unwrap().wants_to_fire);

        world.apply_damage(Ctx::authority(), victim, 10.0, DamageKind::Freeze, None, None);

        assert!(!world.character(victim).unwrap().wants_to_fire);
    }

    #[test]
    fn test_shrink_scales_without_revoking_control() {
        let (mut world, _) = test_world();
        let (controller, victim) = world.spawn_player(1, Vec3::ZERO);

        world.apply_damage(Ctx::authority(), victim, 10.0, DamageKind::Shrink, None, None);

        let character = world.character(victim).unwrap();
        assert!(character.effect_active());
        assert!(character.shrunk);
        assert_eq!(character.scale, SHRINK_SCALE);
        // shrink never touches possession
        assert_eq!(character.controller, Some(controller));

        world.advance(SHRINK_DURATION + 0.01);

        let character = world.character(victim).unwrap();
        assert!(!character.effect_active());
        assert!(!character.shrunk);
        assert_eq!(character.scale, 1.0);
    }

    #[test]
    fn test_mutual_exclusion_across_families() {
        let (mut world, _) = test_world();
        let (_, victim) = world.spawn_player(1, Vec3::ZERO);

        world.apply_damage(Ctx::authority(), victim, 10.0, DamageKind::Shrink, None, None);
        assert!(world.character(victim).unwrap().shrunk);

        // freeze request while shrunk is rejected outright
        world.apply_damage(Ctx::authority(), victim, 10.0, DamageKind::Freeze, None, None);
        let character = world.character(victim).unwrap();
        assert_eq!(character.effect.unwrap().kind, EffectKind::Shrink);
        assert!(character.controller.is_some());

        // a second shrink is equally rejected
        world.apply_damage(Ctx::authority(), victim, 10.0, DamageKind::Shrink, None, None);
        assert_eq!(world.character(victim).unwrap().effect.unwrap().kind, EffectKind::Shrink);

        // after natural expiry a new effect may start
        world.advance(SHRINK_DURATION + 0.01);
        world.apply_damage(Ctx::authority(), victim, 10.0, DamageKind::Freeze, None, None);
        assert_eq!(
            world.character(victim).unwrap().effect.unwrap().kind,
            EffectKind::Freeze
        );
    }

    #[test]
    fn test_effect_cosmetic_reversal_on_expiry() {
        let (mut world, presentation) = test_world();
        let (_, victim) = world.spawn_player(1, Vec3::ZERO);

        world.apply_damage(Ctx::authority(), victim, 10.0, DamageKind::Shrink, None, None);
        world.advance(SHRINK_DURATION + 0.01);

        let reversals = presentation.count(|r| {
            matches!(
                r,
                Reaction::EffectCosmetic {
                    reverse: true,
                    ..
                }
            )
        });
        assert_eq!(reversals, 1);
    }

    #[test]
    fn test_dead_shrunk_entity_gets_size_restoration() {
        let (mut world, presentation) = test_world();
        let (attacker, _) = world.spawn_player(1, Vec3::ZERO);
        let (_, victim) = world.spawn_player(2, Vec3::new(0.0, 0.0, 10.0));

        world.apply_damage(
            Ctx::authority(),
            victim,
            10.0,
            DamageKind::Shrink,
            Some(attacker),
            None,
        );
        assert!(world.character(victim).unwrap().shrunk);

        // lethal hit while shrunk: the proxy dies with its owner
        world.apply_damage(
            Ctx::authority(),
            victim,
            200.0,
            DamageKind::Normal,
            Some(attacker),
            None,
        );

        let character = world.character(victim).unwrap();
        assert!(character.dying);
        assert!(!character.effect_active());
        assert!(!character.shrunk);
        assert_eq!(character.scale, 1.0);
        assert_eq!(character.position.z, 10.0 + SIZE_RESTORE_NUDGE);

        // restoration replaces the cosmetic reversal
        let reversals = presentation.count(|r| {
            matches!(
                r,
                Reaction::EffectCosmetic {
                    reverse: true,
                    ..
                }
            )
        });
        assert_eq!(reversals, 0);

        // the expiry task was cancelled along with the proxy
        world.advance(SHRINK_DURATION + 1.0);
        assert_eq!(world.character(victim).unwrap().scale, 1.0);
    }

    #[test]
    fn test_frozen_bot_is_not_a_valid_target() {
        let (mut world, _) = test_world();
        let (hunter, _) = world.spawn_player(1, Vec3::ZERO);
        let (_, bot) = world.spawn_bot(Vec3::ZERO);

        assert!(world.is_enemy_for(bot, hunter));

        world.apply_damage(Ctx::authority(), bot, 10.0, DamageKind::Freeze, None, None);
        assert!(!world.is_enemy_for(bot, hunter));

        world.advance(FREEZE_DURATION + 0.01);
        assert!(world.is_enemy_for(bot, hunter));
    }

    #[test]
    fn test_frozen_player_remains_targetable() {
        let (mut world, _) = test_world();
        let (hunter, _) = world.spawn_player(1, Vec3::ZERO);
        let (_, player) = world.spawn_player(2, Vec3::ZERO);

        world.apply_damage(Ctx::authority(), player, 10.0, DamageKind::Freeze, None, None);
        assert!(world.is_enemy_for(player, hunter));
    }

    #[test]
    #[should_panic(expected = "no controller attached")]
    fn test_freeze_without_controller_is_fatal() {
        let (mut world, _) = test_world();
        let (controller, victim) = world.spawn_player(1, Vec3::ZERO);
        world.unpossess(controller);

        world.try_start_effect(victim, EffectKind::Freeze);
    }

    #[test]
    fn test_freeze_round_trip_restores_exact_controller() {
        let (mut world, _) = test_world();
        let (first, _) = world.spawn_player(1, Vec3::ZERO);
        let (second, victim) = world.spawn_player(2, Vec3::ZERO);

        world.apply_damage(
            Ctx::authority(),
            victim,
            10.0,
            DamageKind::Freeze,
            Some(first),
            None,
        );
        world.advance(FREEZE_DURATION + 0.01);

        assert_eq!(world.character(victim).unwrap().controller, Some(second));
        assert_ne!(world.character(victim).unwrap().controller, Some(first));
    }
}
