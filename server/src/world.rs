//! Authoritative simulation world.
//!
//! A single `World` per session holds the canonical copy of every combat
//! entity and is the only writer of their state. There is no lock around
//! it: the authority role check at the entry of each mutating operation is
//! the mutual-exclusion mechanism. Remote processes observe the world
//! through per-connection snapshots built by [`World::snapshot_for`] and
//! feed requests back in as [`ClientCommand`]s.

use crate::arena::Arena;
use crate::character::{Character, Controller, ControllerKind};
use crate::game_mode::GameMode;
use crate::inventory::Weapon;
use crate::pickup::Pickup;
use crate::presentation::Presentation;
use crate::tasks::{Task, TaskKind, TaskQueue};
use log::{debug, info};
use shared::{
    CharacterSnapshot, ClientCommand, ControllerId, EntityId, Vec3, Visibility,
    HEALTH_REGEN_PER_SEC,
};
use std::collections::HashMap;

/// Which side of the replication boundary a request originates from.
/// Carried in a request context instead of read from ambient state, so the
/// gating decision is explicit at every mutation entry point.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Authority,
    Remote,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ctx {
    pub role: Role,
}

impl Ctx {
    pub fn authority() -> Self {
        Self {
            role: Role::Authority,
        }
    }

    pub fn remote() -> Self {
        Self { role: Role::Remote }
    }
}

/// Cross-system signals emitted by the core and drained once per tick.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum WorldEvent {
    Noise {
        location: Vec3,
        loudness: f32,
        source: EntityId,
    },
}

pub struct World {
    pub(crate) time: f64,
    tick: u32,
    pub(crate) characters: Arena<Character>,
    pub(crate) weapons: Arena<Weapon>,
    pub(crate) pickups: Vec<Pickup>,
    pub(crate) controllers: HashMap<ControllerId, Controller>,
    next_controller_id: u32,
    pub(crate) next_pickup_id: u32,
    pub(crate) tasks: TaskQueue,
    pub(crate) game_mode: Box<dyn GameMode>,
    pub(crate) presentation: Box<dyn Presentation>,
    pub(crate) events: Vec<WorldEvent>,
}

impl World {
    pub fn new(game_mode: Box<dyn GameMode>, presentation: Box<dyn Presentation>) -> Self {
        Self {
            time: 0.0,
            tick: 0,
            characters: Arena::new(),
            weapons: Arena::new(),
            pickups: Vec::new(),
            controllers: HashMap::new(),
            next_controller_id: 1,
            next_pickup_id: 1,
            tasks: TaskQueue::new(),
            game_mode,
            presentation,
            events: Vec::new(),
        }
    }

    /// The single gating function for mutating operations. Non-authority
    /// requests are silently refused; speculative client calls are expected
    /// and tolerated.
    pub(crate) fn gate(&self, ctx: Ctx) -> bool {
        ctx.role == Role::Authority
    }

    pub fn time(&self) -> f64 {
        self.time
    }

    pub fn tick(&self) -> u32 {
        self.tick
    }

    // ---- spawning & possession ----

    fn new_controller(&mut self, kind: ControllerKind, team: u8) -> ControllerId {
        let id = ControllerId(self.next_controller_id);
        self.next_controller_id += 1;
        self.controllers.insert(id, Controller::new(id, kind, team));
        id
    }

    pub fn spawn_player(&mut self, client_id: u32, position: Vec3) -> (ControllerId, EntityId) {
        let controller = self.new_controller(ControllerKind::Player { client_id }, 0);
        let entity = self.characters.insert(Character::player(position));
        self.possess(controller, entity);
        info!("Spawned player entity {} for client {}", entity, client_id);
        (controller, entity)
    }

    pub fn spawn_bot(&mut self, position: Vec3) -> (ControllerId, EntityId) {
        let controller = self.new_controller(ControllerKind::Bot, 0);
        let entity = self.characters.insert(Character::bot(position));
        self.possess(controller, entity);
        info!("Spawned bot entity {}", entity);
        (controller, entity)
    }

    pub fn possess(&mut self, controller: ControllerId, pawn: EntityId) {
        if !self.characters.contains(pawn) {
            return;
        }
        if let Some(ctrl) = self.controllers.get_mut(&controller) {
            ctrl.pawn = Some(pawn);
        } else {
            return;
        }
        if let Some(character) = self.characters.get_mut(pawn) {
            character.controller = Some(controller);
        }
    }

    pub fn unpossess(&mut self, controller: ControllerId) {
        let pawn = match self.controllers.get_mut(&controller) {
            Some(ctrl) => ctrl.pawn.take(),
            None => return,
        };
        if let Some(pawn) = pawn {
            if let Some(character) = self.characters.get_mut(pawn) {
                character.controller = None;
            }
        }
    }

    /// Removes a character and everything keyed to it: inventory weapons,
    /// scheduled tasks, possession links.
    pub fn despawn_character(&mut self, id: EntityId) {
        self.destroy_inventory(Ctx::authority(), id);

        if let Some(character) = self.characters.remove(id) {
            if let Some(controller) = character.controller {
                if let Some(ctrl) = self.controllers.get_mut(&controller) {
                    ctrl.pawn = None;
                }
            }
            self.tasks.cancel_owned(id);
            info!("Despawned entity {}", id);
        }
    }

    /// Disconnect path: tears down the controller and its pawn.
    pub fn remove_player(&mut self, controller: ControllerId) {
        let pawn = self.controllers.get(&controller).and_then(|c| c.pawn);
        if let Some(pawn) = pawn {
            self.despawn_character(pawn);
        }
        self.controllers.remove(&controller);
    }

    // ---- accessors ----

    pub fn character(&self, id: EntityId) -> Option<&Character> {
        self.characters.get(id)
    }

    pub fn character_ids(&self) -> Vec<EntityId> {
        self.characters.ids()
    }

    pub fn weapon(&self, id: EntityId) -> Option<&Weapon> {
        self.weapons.get(id)
    }

    pub fn controller(&self, id: ControllerId) -> Option<&Controller> {
        self.controllers.get(&id)
    }

    pub fn controller_mut(&mut self, id: ControllerId) -> Option<&mut Controller> {
        self.controllers.get_mut(&id)
    }

    // ---- targeting collaborator ----

    /// Valid-target eligibility queried by other combatants. Bots with an
    /// active status effect are unpossessed and must not be selected.
    pub fn is_enemy_for(&self, target: EntityId, test: ControllerId) -> bool {
        let character = match self.characters.get(target) {
            Some(c) => c,
            None => return false,
        };

        if character.is_bot && character.effect_active() {
            return false;
        }
        if character.controller == Some(test) {
            return false;
        }

        let my_team = character
            .controller
            .and_then(|c| self.controllers.get(&c))
            .map(|c| c.team);
        let test_team = self.controllers.get(&test).map(|c| c.team);

        match (my_team, test_team) {
            (Some(mine), Some(theirs)) => self.game_mode.can_deal_damage(theirs, mine),
            _ => true,
        }
    }

    // ---- simulation ----

    /// Advances simulation time and fires every scheduled task that came
    /// due. All cross-entity calls triggered here run synchronously within
    /// this tick.
    pub fn advance(&mut self, dt: f64) {
        self.time += dt;
        self.tick += 1;

        self.regen_health(dt);

        for task in self.tasks.drain_due(self.time) {
            self.run_task(task);
        }
    }

    fn regen_health(&mut self, dt: f64) {
        let regenerating: Vec<EntityId> = self
            .controllers
            .values()
            .filter(|c| c.health_regen)
            .filter_map(|c| c.pawn)
            .collect();

        for id in regenerating {
            if let Some(character) = self.characters.get_mut(id) {
                if character.is_alive() && character.health < character.max_health {
                    character.health = (character.health + HEALTH_REGEN_PER_SEC * dt as f32)
                        .min(character.max_health);
                }
            }
        }
    }

    fn run_task(&mut self, task: Task) {
        debug!("Task {:?} fired for {}", task.kind, task.owner);
        match task.kind {
            TaskKind::EffectProxyExpired => self.end_effect(task.owner),
            TaskKind::RagdollStart => self.start_ragdoll(task.owner),
            TaskKind::CollisionGraceOver => {
                if let Some(character) = self.characters.get_mut(task.owner) {
                    character.collision_enabled = false;
                }
            }
            TaskKind::EquipFinished => self.finish_equip(task.owner),
            TaskKind::CorpseExpired => self.despawn_character(task.owner),
        }
    }

    // ---- command handling ----

    /// Executes a request forwarded by a non-authoritative side. The
    /// request is re-executed here under the authority role, never trusted
    /// as already-applied.
    pub fn handle_command(&mut self, ctx: Ctx, controller: ControllerId, command: ClientCommand) {
        if !self.gate(ctx) {
            return;
        }

        let (pawn, input_enabled) = match self.controllers.get(&controller) {
            Some(ctrl) => (ctrl.pawn, ctrl.input_enabled),
            None => return,
        };
        let pawn = match pawn {
            Some(p) => p,
            None => return,
        };
        if !input_enabled {
            return;
        }

        match command {
            ClientCommand::EquipWeapon { weapon } => {
                self.equip_weapon(ctx, pawn, weapon);
            }
            ClientCommand::NextWeapon => self.next_weapon(ctx, pawn),
            ClientCommand::PrevWeapon => self.prev_weapon(ctx, pawn),
            ClientCommand::StartFire => self.start_fire(ctx, pawn),
            ClientCommand::StopFire => self.stop_fire(ctx, pawn),
            ClientCommand::SetTargeting { targeting } => self.set_targeting(ctx, pawn, targeting),
            ClientCommand::SetRunning { running } => self.set_running(ctx, pawn, running),
            ClientCommand::ClaimPickup { pickup } => {
                self.give_pickup_to(ctx, pickup, pawn);
            }
        }
    }

    pub fn set_targeting(&mut self, ctx: Ctx, entity: EntityId, targeting: bool) {
        if !self.gate(ctx) {
            return;
        }
        if let Some(character) = self.characters.get_mut(entity) {
            character.targeting = targeting;
        }
    }

    pub fn set_running(&mut self, ctx: Ctx, entity: EntityId, running: bool) {
        if !self.gate(ctx) {
            return;
        }
        if let Some(character) = self.characters.get_mut(entity) {
            character.running = running;
        }
    }

    pub fn set_inventory_capacity(&mut self, entity: EntityId, capacity: usize) {
        if let Some(character) = self.characters.get_mut(entity) {
            character.inventory_capacity = capacity;
        }
    }

    // ---- replication ----

    /// Builds the wire view of every character for one receiving
    /// connection, applying the per-field visibility table.
    pub fn snapshot_for(&self, viewer: Option<EntityId>) -> Vec<CharacterSnapshot> {
        self.characters
            .iter()
            .map(|(id, character)| {
                let inventory = if Visibility::OwnerOnly.allows(id, viewer) {
                    Some(
                        character
                            .inventory
                            .iter()
                            .filter_map(|w| self.weapons.get(*w).map(|weapon| weapon.info(*w)))
                            .collect(),
                    )
                } else {
                    None
                };

                let skip_owner = Visibility::SkipOwner.allows(id, viewer);

                CharacterSnapshot {
                    id,
                    health: character.health,
                    max_health: character.max_health,
                    dying: character.dying,
                    effect_active: character.effect_active(),
                    shrunk: character.shrunk,
                    scale: character.scale,
                    current_weapon: character.current_weapon,
                    position: (character.replicate_movement || character.movement_refresh)
                        .then_some(character.position),
                    last_hit: character.hit_buffer.visible(self.time),
                    inventory,
                    targeting: skip_owner.then_some(character.targeting),
                    running: skip_owner.then_some(character.running),
                }
            })
            .collect()
    }

    /// Clears one-shot forced position refreshes once a broadcast carried
    /// them.
    pub fn clear_movement_refresh(&mut self) {
        for id in self.characters.ids() {
            if let Some(character) = self.characters.get_mut(id) {
                character.movement_refresh = false;
            }
        }
    }

    pub fn drain_events(&mut self) -> Vec<WorldEvent> {
        std::mem::take(&mut self.events)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game_mode::FreeForAllMode;
    use crate::presentation::recording::RecordingPresentation;
    use shared::DamageKind;

    fn test_world() -> World {
        World::new(
            Box::new(FreeForAllMode::new()),
            Box::new(RecordingPresentation::new(1.5)),
        )
    }

    #[test]
    fn test_gate_refuses_remote() {
        let world = test_world();
        assert!(world.gate(Ctx::authority()));
        assert!(!world.gate(Ctx::remote()));
    }

    #[test]
    fn test_spawn_player_links_possession() {
        let mut world = test_world();
        let (controller, entity) = world.spawn_player(1, Vec3::ZERO);

        assert_eq!(world.character(entity).unwrap().controller, Some(controller));
        assert_eq!(world.controller(controller).unwrap().pawn, Some(entity));
    }

    #[test]
    fn test_unpossess_clears_both_sides() {
        let mut world = test_world();
        let (controller, entity) = world.spawn_player(1, Vec3::ZERO);

        world.unpossess(controller);

        assert_eq!(world.character(entity).unwrap().controller, None);
        assert_eq!(world.controller(controller).unwrap().pawn, None);
    }

    #[test]
    fn test_despawn_cancels_owned_tasks() {
        let mut world = test_world();
        let (_, entity) = world.spawn_player(1, Vec3::ZERO);
        world
            .tasks
            .schedule(10.0, entity, TaskKind::CollisionGraceOver);

        world.despawn_character(entity);

        assert!(world.tasks.is_empty());
        assert!(world.character(entity).is_none());
    }

    #[test]
    fn test_advance_moves_time_and_tick() {
        let mut world = test_world();
        world.advance(0.05);
        world.advance(0.05);

        assert!((world.time() - 0.1).abs() < 1e-9);
        assert_eq!(world.tick(), 2);
    }

    #[test]
    fn test_health_regen_caps_at_max() {
        let mut world = test_world();
        let (controller, entity) = world.spawn_player(1, Vec3::ZERO);
        world.controller_mut(controller).unwrap().health_regen = true;

        if let Some(character) = world.characters.get_mut(entity) {
            character.health = 99.9;
        }
        world.advance(1.0);

        let character = world.character(entity).unwrap();
        assert_eq!(character.health, character.max_health);
    }

    #[test]
    fn test_snapshot_visibility_scopes() {
        let mut world = test_world();
        let (_, own) = world.spawn_player(1, Vec3::ZERO);
        let (_, other) = world.spawn_player(2, Vec3::ZERO);

        let snapshots = world.snapshot_for(Some(own));
        let own_view = snapshots.iter().find(|s| s.id == own).unwrap();
        let other_view = snapshots.iter().find(|s| s.id == other).unwrap();

        // inventory is owner-only
        assert!(own_view.inventory.is_some());
        assert!(other_view.inventory.is_none());

        // targeting/running are skip-owner
        assert!(own_view.targeting.is_none());
        assert!(other_view.targeting.is_some());
        assert!(other_view.running.is_some());
    }

    #[test]
    fn test_snapshot_windowed_hit_record() {
        let mut world = test_world();
        let (attacker, _) = world.spawn_player(1, Vec3::ZERO);
        let (_, victim) = world.spawn_player(2, Vec3::ZERO);

        world.apply_damage(
            Ctx::authority(),
            victim,
            10.0,
            DamageKind::Normal,
            Some(attacker),
            None,
        );

        let visible = world.snapshot_for(None);
        let view = visible.iter().find(|s| s.id == victim).unwrap();
        assert!(view.last_hit.is_some());

        // window elapses, late joiners see no stale hit
        world.advance(1.0);
        let expired = world.snapshot_for(None);
        let view = expired.iter().find(|s| s.id == victim).unwrap();
        assert!(view.last_hit.is_none());
    }

    #[test]
    fn test_command_ignored_without_pawn() {
        let mut world = test_world();
        let (controller, entity) = world.spawn_player(1, Vec3::ZERO);
        world.unpossess(controller);

        // must not panic or mutate anything
        world.handle_command(Ctx::authority(), controller, ClientCommand::NextWeapon);
        assert!(world.character(entity).unwrap().current_weapon.is_none());
    }

    #[test]
    fn test_remote_command_context_refused() {
        let mut world = test_world();
        let (controller, entity) = world.spawn_player(1, Vec3::ZERO);

        world.handle_command(
            Ctx::remote(),
            controller,
            ClientCommand::SetTargeting { targeting: true },
        );
        assert!(!world.character(entity).unwrap().targeting);
    }
}
