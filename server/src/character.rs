//! Combat entities and the agents that direct them.

use crate::hit_buffer::HitBuffer;
use shared::{
    ControllerId, EffectKind, EntityId, Vec3, DEFAULT_INVENTORY_CAPACITY, DEFAULT_MAX_HEALTH,
};

/// An active authority-track status effect. At most one per character; the
/// kind decides what activation took away and what expiry must give back.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ActiveEffect {
    pub kind: EffectKind,
    /// Controller detached at freeze activation, re-attached at expiry.
    pub revoked_controller: Option<ControllerId>,
}

/// Server-side combat entity. Everything here is authoritative state; the
/// replicated subset is selected by the snapshot builder.
#[derive(Debug)]
pub struct Character {
    pub position: Vec3,
    pub health: f32,
    pub max_health: f32,
    /// Monotonic: set once by the death sequence, never reset.
    pub dying: bool,
    pub is_bot: bool,
    pub controller: Option<ControllerId>,
    /// Most recent controller that dealt crediting damage. Environmental
    /// deaths transfer kill credit to this controller.
    pub last_hit_by: Option<ControllerId>,

    /// Owned weapons in acquisition order, unique membership.
    pub inventory: Vec<EntityId>,
    pub inventory_capacity: usize,
    pub current_weapon: Option<EntityId>,
    pub wants_to_fire: bool,
    pub targeting: bool,
    pub running: bool,

    pub effect: Option<ActiveEffect>,
    pub shrunk: bool,
    pub scale: f32,

    pub hit_buffer: HitBuffer,

    pub replicate_movement: bool,
    /// Once torn off the entity is never authority-owned again.
    pub torn_off: bool,
    /// One forced out-of-band position refresh after death.
    pub movement_refresh: bool,
    pub collision_enabled: bool,
    pub ragdoll: bool,
}

impl Character {
    fn new(position: Vec3, is_bot: bool) -> Self {
        Self {
            position,
            health: DEFAULT_MAX_HEALTH,
            max_health: DEFAULT_MAX_HEALTH,
            dying: false,
            is_bot,
            controller: None,
            last_hit_by: None,
            inventory: Vec::new(),
            inventory_capacity: DEFAULT_INVENTORY_CAPACITY,
            current_weapon: None,
            wants_to_fire: false,
            targeting: false,
            running: false,
            effect: None,
            shrunk: false,
            scale: 1.0,
            hit_buffer: HitBuffer::new(),
            replicate_movement: true,
            torn_off: false,
            movement_refresh: false,
            collision_enabled: true,
            ragdoll: false,
        }
    }

    pub fn player(position: Vec3) -> Self {
        Self::new(position, false)
    }

    pub fn bot(position: Vec3) -> Self {
        Self::new(position, true)
    }

    pub fn is_alive(&self) -> bool {
        self.health > 0.0
    }

    pub fn can_fire(&self) -> bool {
        self.is_alive()
    }

    pub fn effect_active(&self) -> bool {
        self.effect.is_some()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControllerKind {
    Player { client_id: u32 },
    Bot,
}

/// A directing agent: human connection or bot brain. Possession links run
/// both ways (`pawn` here, `controller` on the character) and are updated
/// together.
#[derive(Debug)]
pub struct Controller {
    pub id: ControllerId,
    pub kind: ControllerKind,
    pub pawn: Option<EntityId>,
    pub input_enabled: bool,
    pub god_mode: bool,
    pub health_regen: bool,
    pub team: u8,
}

impl Controller {
    pub fn new(id: ControllerId, kind: ControllerKind, team: u8) -> Self {
        Self {
            id,
            kind,
            pawn: None,
            input_enabled: true,
            god_mode: false,
            health_regen: false,
            team,
        }
    }

    pub fn is_bot(&self) -> bool {
        matches!(self.kind, ControllerKind::Bot)
    }
}
