//! World pickup items with at-most-once claim semantics.
//!
//! A pickup pre-spawns its backing weapon instance at initialization. The
//! claimed flag is the single source of truth for whether that instance is
//! owned by someone: granting sets it, end-of-life cleanup destroys only
//! instances it never got set for.

use crate::world::{Ctx, World};
use log::info;
use shared::{EntityId, Vec3, WeaponKind};

#[derive(Debug)]
pub struct Pickup {
    pub id: u32,
    pub weapon_kind: WeaponKind,
    pub ammo: i32,
    pub ammo_in_clip: i32,
    /// Monotonic: set once when granted, never cleared.
    pub claimed: bool,
    pub spawned: Option<EntityId>,
    pub position: Vec3,
}

impl World {
    /// Places a pickup and pre-spawns its backing weapon. Empty pickups
    /// (no ammo) spawn nothing and can never be claimed.
    pub fn spawn_pickup(
        &mut self,
        ctx: Ctx,
        kind: WeaponKind,
        ammo: i32,
        ammo_in_clip: i32,
        position: Vec3,
    ) -> Option<u32> {
        if !self.gate(ctx) {
            return None;
        }

        let id = self.next_pickup_id;
        self.next_pickup_id += 1;

        let spawned = if ammo > 0 {
            self.spawn_weapon(ctx, kind, ammo, ammo_in_clip)
        } else {
            None
        };

        self.pickups.push(Pickup {
            id,
            weapon_kind: kind,
            ammo,
            ammo_in_clip,
            claimed: false,
            spawned,
            position,
        });
        info!("Spawned pickup {} ({:?})", id, kind);
        Some(id)
    }

    pub fn pickup(&self, id: u32) -> Option<&Pickup> {
        self.pickups.iter().find(|p| p.id == id)
    }

    /// Eligibility: the claimant must be alive with inventory room, and the
    /// pickup must still be unclaimed with a backing instance.
    pub fn can_be_picked_up(&self, id: u32, claimant: EntityId) -> bool {
        let pickup = match self.pickup(id) {
            Some(p) => p,
            None => return false,
        };
        if pickup.claimed || pickup.spawned.is_none() {
            return false;
        }

        match self.characters.get(claimant) {
            Some(c) => c.is_alive() && c.inventory.len() < c.inventory_capacity,
            None => false,
        }
    }

    /// Grants the backing instance, then sets the claimed flag. The order
    /// matters: the flag is what end-of-life cleanup consults.
    pub fn give_pickup_to(&mut self, ctx: Ctx, id: u32, claimant: EntityId) -> bool {
        if !self.gate(ctx) {
            return false;
        }
        if !self.can_be_picked_up(id, claimant) {
            return false;
        }

        let weapon = match self.pickup(id).and_then(|p| p.spawned) {
            Some(w) => w,
            None => return false,
        };

        if !self.add_weapon(ctx, claimant, weapon) {
            return false;
        }

        if let Some(pickup) = self.pickups.iter_mut().find(|p| p.id == id) {
            pickup.claimed = true;
        }
        info!("Pickup {} claimed by {}", id, claimant);
        true
    }

    /// End-of-life: an instance nobody ever claimed is torn down with the
    /// pickup.
    pub fn remove_pickup(&mut self, ctx: Ctx, id: u32) -> bool {
        if !self.gate(ctx) {
            return false;
        }

        let index = match self.pickups.iter().position(|p| p.id == id) {
            Some(i) => i,
            None => return false,
        };
        let pickup = self.pickups.remove(index);

        if !pickup.claimed {
            if let Some(weapon) = pickup.spawned {
                self.weapons.remove(weapon);
                self.tasks.cancel_owned(weapon);
            }
        }
        true
    }
}
