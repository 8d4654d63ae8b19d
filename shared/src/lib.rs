use serde::{Deserialize, Serialize};

/// Seconds a replicated hit record stays visible after its last update.
/// Damage landing on the same processing tick is coalesced into it.
pub const HIT_COALESCE_WINDOW: f64 = 0.5;

pub const FREEZE_DURATION: f64 = 5.0;
pub const SHRINK_DURATION: f64 = 8.0;
pub const EQUIP_DURATION: f64 = 0.5;

/// Ragdoll starts this long before the death animation ends, floored at
/// `RAGDOLL_MIN_DELAY` so the handoff never fires on the same tick.
pub const RAGDOLL_LEAD: f64 = 0.7;
pub const RAGDOLL_MIN_DELAY: f64 = 0.1;

/// Residual window after death during which the corpse still blocks others.
pub const COLLISION_GRACE: f64 = 1.0;
pub const CORPSE_LIFESPAN: f64 = 25.0;

pub const NOISE_LOUDNESS: f32 = 1.0;
pub const SHRINK_SCALE: f32 = 0.5;
pub const SIZE_RESTORE_NUDGE: f32 = 50.0;

pub const DEFAULT_MAX_HEALTH: f32 = 100.0;
pub const DEFAULT_INVENTORY_CAPACITY: usize = 4;
pub const LOW_HEALTH_PERCENTAGE: f32 = 0.5;
pub const HEALTH_REGEN_PER_SEC: f32 = 5.0;

/// Generation-checked handle to a server-side entity. The generation makes
/// stale references to recycled slots resolve to nothing instead of aliasing
/// whatever entity reused the slot, so instigator/causer references can
/// outlive the entity they point at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EntityId {
    pub index: u32,
    pub generation: u32,
}

impl EntityId {
    pub fn new(index: u32, generation: u32) -> Self {
        Self { index, generation }
    }
}

impl std::fmt::Display for EntityId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}v{}", self.index, self.generation)
    }
}

/// A directing agent: a connected player or a bot brain. Never recycled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ControllerId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Vec3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Vec3 {
    pub const ZERO: Vec3 = Vec3 {
        x: 0.0,
        y: 0.0,
        z: 0.0,
    };

    pub fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    pub fn raised(self, dz: f32) -> Self {
        Vec3::new(self.x, self.y, self.z + dz)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DamageKind {
    Normal,
    Freeze,
    Shrink,
    Falling,
    Suicide,
}

impl DamageKind {
    /// Environmental kinds do not credit the nominal killer; credit carries
    /// over to whoever last dealt qualifying damage.
    pub fn credits_killer(self) -> bool {
        !matches!(self, DamageKind::Falling)
    }

    pub fn effect(self) -> Option<EffectKind> {
        match self {
            DamageKind::Freeze => Some(EffectKind::Freeze),
            DamageKind::Shrink => Some(EffectKind::Shrink),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EffectKind {
    Freeze,
    Shrink,
}

impl EffectKind {
    pub fn duration(self) -> f64 {
        match self {
            EffectKind::Freeze => FREEZE_DURATION,
            EffectKind::Shrink => SHRINK_DURATION,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WeaponKind {
    Rifle,
    RocketLauncher,
    FreezeRay,
    ShrinkRay,
}

impl WeaponKind {
    pub fn damage_kind(self) -> DamageKind {
        match self {
            WeaponKind::FreezeRay => DamageKind::Freeze,
            WeaponKind::ShrinkRay => DamageKind::Shrink,
            _ => DamageKind::Normal,
        }
    }
}

/// Snapshot of the most recent damaging event on a character. Overwritten or
/// coalesced in place on the server; the serial bumps on every write so
/// observers detect a change even when the payload repeats.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LastHitInfo {
    pub serial: u32,
    pub damage: f32,
    pub kind: DamageKind,
    pub instigator: Option<EntityId>,
    pub causer: Option<EntityId>,
    pub killed: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WeaponInfo {
    pub id: EntityId,
    pub kind: WeaponKind,
    pub ammo: i32,
    pub ammo_in_clip: i32,
}

/// Who is allowed to see a replicated field. The snapshot builder consults
/// this per receiving connection; fields outside the viewer's scope are sent
/// as `None`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visibility {
    Everyone,
    OwnerOnly,
    SkipOwner,
}

impl Visibility {
    pub fn allows(self, owner: EntityId, viewer: Option<EntityId>) -> bool {
        match self {
            Visibility::Everyone => true,
            Visibility::OwnerOnly => viewer == Some(owner),
            Visibility::SkipOwner => viewer != Some(owner),
        }
    }
}

/// Per-character wire state. Scoped fields are `Option` and filled according
/// to the visibility table:
///
/// - health, dying, effect/shrunk flags, scale, current weapon: everyone
/// - position: everyone, while movement replication is on (or one forced
///   refresh after death)
/// - last_hit: everyone, but only inside its coalescing window
/// - inventory: owner only
/// - targeting, running: everyone except the owner (locally instigated)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CharacterSnapshot {
    pub id: EntityId,
    pub health: f32,
    pub max_health: f32,
    pub dying: bool,
    pub effect_active: bool,
    pub shrunk: bool,
    pub scale: f32,
    pub current_weapon: Option<EntityId>,
    pub position: Option<Vec3>,
    pub last_hit: Option<LastHitInfo>,
    pub inventory: Option<Vec<WeaponInfo>>,
    pub targeting: Option<bool>,
    pub running: Option<bool>,
}

/// Requests a non-authoritative side forwards to the authority instead of
/// executing locally.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum ClientCommand {
    EquipWeapon { weapon: EntityId },
    NextWeapon,
    PrevWeapon,
    StartFire,
    StopFire,
    SetTargeting { targeting: bool },
    SetRunning { running: bool },
    ClaimPickup { pickup: u32 },
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub enum Packet {
    Connect {
        client_version: u32,
    },
    Command {
        sequence: u32,
        command: ClientCommand,
    },
    Disconnect,

    Connected {
        client_id: u32,
        entity: EntityId,
    },
    State {
        tick: u32,
        timestamp: u64,
        characters: Vec<CharacterSnapshot>,
    },
    Disconnected {
        reason: String,
    },
}
