//! Weapon inventory and the equip state machine.
//!
//! Membership is an ordered set: acquisition order, no duplicates, exactly
//! one current weapon at most. Only the authority mutates membership;
//! remote sides forward an equip request over the wire and see the result
//! replicated back.

use crate::tasks::TaskKind;
use crate::world::{Ctx, World};
use log::debug;
use shared::{EntityId, WeaponInfo, WeaponKind, EQUIP_DURATION};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WeaponState {
    /// In inventory, not held.
    Idle,
    /// Being brought up; cycling is blocked until this finishes.
    Equipping,
    Equipped,
}

#[derive(Debug)]
pub struct Weapon {
    pub kind: WeaponKind,
    pub ammo: i32,
    pub ammo_in_clip: i32,
    pub owner: Option<EntityId>,
    pub state: WeaponState,
    pub firing: bool,
}

impl Weapon {
    pub fn new(kind: WeaponKind) -> Self {
        let (ammo, ammo_in_clip) = default_loadout(kind);
        Self::with_ammo(kind, ammo, ammo_in_clip)
    }

    pub fn with_ammo(kind: WeaponKind, ammo: i32, ammo_in_clip: i32) -> Self {
        Self {
            kind,
            ammo,
            ammo_in_clip,
            owner: None,
            state: WeaponState::Idle,
            firing: false,
        }
    }

    pub fn info(&self, id: EntityId) -> WeaponInfo {
        WeaponInfo {
            id,
            kind: self.kind,
            ammo: self.ammo,
            ammo_in_clip: self.ammo_in_clip,
        }
    }
}

fn default_loadout(kind: WeaponKind) -> (i32, i32) {
    match kind {
        WeaponKind::Rifle => (200, 30),
        WeaponKind::RocketLauncher => (12, 1),
        WeaponKind::FreezeRay => (40, 8),
        WeaponKind::ShrinkRay => (40, 8),
    }
}

impl World {
    pub fn spawn_weapon(&mut self, ctx: Ctx, kind: WeaponKind, ammo: i32, ammo_in_clip: i32) -> Option<EntityId> {
        if !self.gate(ctx) {
            return None;
        }
        Some(self.weapons.insert(Weapon::with_ammo(kind, ammo, ammo_in_clip)))
    }

    /// Appends a weapon to the inventory unless already present. The weapon
    /// is told it entered an inventory by pointing its owner back at us.
    pub fn add_weapon(&mut self, ctx: Ctx, owner: EntityId, weapon: EntityId) -> bool {
        if !self.gate(ctx) {
            return false;
        }
        if !self.weapons.contains(weapon) || !self.characters.contains(owner) {
            return false;
        }

        if let Some(w) = self.weapons.get_mut(weapon) {
            w.owner = Some(owner);
        }
        if let Some(character) = self.characters.get_mut(owner) {
            if !character.inventory.contains(&weapon) {
                character.inventory.push(weapon);
            }
        }
        true
    }

    pub fn remove_weapon(&mut self, ctx: Ctx, owner: EntityId, weapon: EntityId) -> bool {
        if !self.gate(ctx) {
            return false;
        }

        if let Some(w) = self.weapons.get_mut(weapon) {
            w.owner = None;
            w.state = WeaponState::Idle;
            w.firing = false;
        }

        match self.characters.get_mut(owner) {
            Some(character) => {
                character.inventory.retain(|w| *w != weapon);
                if character.current_weapon == Some(weapon) {
                    character.current_weapon = None;
                }
                true
            }
            None => false,
        }
    }

    /// Equips a weapon already in the inventory. On a non-authoritative
    /// side this is a silent no-op; the request goes over the wire instead
    /// and re-executes here.
    pub fn equip_weapon(&mut self, ctx: Ctx, owner: EntityId, weapon: EntityId) -> bool {
        if !self.gate(ctx) {
            return false;
        }
        let in_inventory = self
            .characters
            .get(owner)
            .map_or(false, |c| c.inventory.contains(&weapon));
        if !in_inventory {
            return false;
        }

        self.set_current_weapon(owner, weapon);
        true
    }

    /// Unequip-previous then equip-new; the new weapon runs through its
    /// equip transition before it can fire or be cycled away from.
    fn set_current_weapon(&mut self, owner: EntityId, new: EntityId) {
        let now = self.time;

        let previous = match self.characters.get(owner) {
            Some(c) => c.current_weapon,
            None => return,
        };

        if let Some(previous) = previous {
            if let Some(w) = self.weapons.get_mut(previous) {
                w.state = WeaponState::Idle;
                w.firing = false;
            }
            self.tasks.cancel(previous, TaskKind::EquipFinished);
        }

        if let Some(character) = self.characters.get_mut(owner) {
            character.current_weapon = Some(new);
        }
        if let Some(w) = self.weapons.get_mut(new) {
            // ownership must point back before the change replicates
            w.owner = Some(owner);
            w.state = WeaponState::Equipping;
        }

        self.tasks
            .schedule(now + EQUIP_DURATION, new, TaskKind::EquipFinished);
        debug!("Entity {} equipping weapon {}", owner, new);
    }

    pub(crate) fn finish_equip(&mut self, weapon: EntityId) {
        let owner = match self.weapons.get(weapon) {
            Some(w) => w.owner,
            None => return,
        };

        let still_current = owner
            .and_then(|o| self.characters.get(o))
            .map_or(false, |c| c.current_weapon == Some(weapon));
        if !still_current {
            return;
        }

        let resume_fire = owner
            .and_then(|o| self.characters.get(o))
            .map_or(false, |c| c.wants_to_fire && c.can_fire());

        if let Some(w) = self.weapons.get_mut(weapon) {
            w.state = WeaponState::Equipped;
            w.firing = resume_fire;
        }
    }

    pub fn next_weapon(&mut self, ctx: Ctx, owner: EntityId) {
        self.cycle_weapon(ctx, owner, 1);
    }

    pub fn prev_weapon(&mut self, ctx: Ctx, owner: EntityId) {
        self.cycle_weapon(ctx, owner, -1);
    }

    /// Cycling requires at least two weapons and no equip transition in
    /// flight; the index wraps in both directions.
    fn cycle_weapon(&mut self, ctx: Ctx, owner: EntityId, direction: isize) {
        if !self.gate(ctx) {
            return;
        }

        let (len, current_index, mid_equip) = match self.characters.get(owner) {
            Some(character) => {
                let index = character
                    .current_weapon
                    .and_then(|cw| character.inventory.iter().position(|w| *w == cw));
                let mid_equip = character
                    .current_weapon
                    .and_then(|cw| self.weapons.get(cw))
                    .map_or(false, |w| w.state == WeaponState::Equipping);
                (character.inventory.len(), index, mid_equip)
            }
            None => return,
        };

        if len < 2 || mid_equip {
            return;
        }

        let len = len as isize;
        let index = current_index.map_or(-1, |i| i as isize);
        let target = (((index + direction) % len) + len) % len;

        let weapon = match self.characters.get(owner) {
            Some(c) => c.inventory[target as usize],
            None => return,
        };
        self.set_current_weapon(owner, weapon);
    }

    pub fn start_fire(&mut self, ctx: Ctx, entity: EntityId) {
        if !self.gate(ctx) {
            return;
        }

        let (wants_to_fire, can_fire, current) = match self.characters.get(entity) {
            Some(c) => (c.wants_to_fire, c.can_fire(), c.current_weapon),
            None => return,
        };
        if wants_to_fire {
            return;
        }

        if let Some(character) = self.characters.get_mut(entity) {
            character.wants_to_fire = true;
        }
        if can_fire {
            if let Some(w) = current.and_then(|c| self.weapons.get_mut(c)) {
                if w.state == WeaponState::Equipped {
                    w.firing = true;
                }
            }
        }
    }

    pub fn stop_fire(&mut self, ctx: Ctx, entity: EntityId) {
        if !self.gate(ctx) {
            return;
        }

        let (wants_to_fire, current) = match self.characters.get(entity) {
            Some(c) => (c.wants_to_fire, c.current_weapon),
            None => return,
        };
        if !wants_to_fire {
            return;
        }

        if let Some(character) = self.characters.get_mut(entity) {
            character.wants_to_fire = false;
        }
        if let Some(w) = current.and_then(|c| self.weapons.get_mut(c)) {
            w.firing = false;
        }
    }

    /// Spawns the default loadout and equips the first entry.
    pub fn spawn_default_inventory(&mut self, ctx: Ctx, owner: EntityId, kinds: &[WeaponKind]) {
        if !self.gate(ctx) {
            return;
        }

        for kind in kinds {
            let weapon = self.weapons.insert(Weapon::new(*kind));
            self.add_weapon(ctx, owner, weapon);
        }

        let first = self
            .characters
            .get(owner)
            .and_then(|c| c.inventory.first().copied());
        if let Some(first) = first {
            self.equip_weapon(ctx, owner, first);
        }
    }

    /// Removes and destroys every owned weapon, newest first.
    pub fn destroy_inventory(&mut self, ctx: Ctx, owner: EntityId) {
        if !self.gate(ctx) {
            return;
        }

        let weapons: Vec<EntityId> = match self.characters.get(owner) {
            Some(c) => c.inventory.clone(),
            None => return,
        };

        for weapon in weapons.into_iter().rev() {
            self.remove_weapon(ctx, owner, weapon);
            self.weapons.remove(weapon);
            self.tasks.cancel_owned(weapon);
        }
    }
}
