//! Replicated last-hit buffer.
//!
//! Damage outcomes reach observers through a single replicated record per
//! character rather than one event per hit. Damage landing on the same
//! processing tick with the same instigator and classification folds into
//! the pending record; anything else overwrites it. The record is only
//! visible for a short window after its last update so late joiners do not
//! replay stale hit reactions.

use shared::{DamageKind, EntityId, LastHitInfo, HIT_COALESCE_WINDOW};

#[derive(Debug)]
pub struct HitBuffer {
    record: Option<LastHitInfo>,
    timeout: f64,
    next_serial: u32,
}

impl HitBuffer {
    pub fn new() -> Self {
        Self {
            record: None,
            timeout: 0.0,
            next_serial: 1,
        }
    }

    /// Buffers a damage outcome for replication. Returns false when the
    /// event was dropped as a redundant death notification.
    pub fn replicate_hit(
        &mut self,
        now: f64,
        mut damage: f32,
        kind: DamageKind,
        instigator: Option<EntityId>,
        causer: Option<EntityId>,
        killed: bool,
    ) -> bool {
        let timeout = now + HIT_COALESCE_WINDOW;

        if let Some(last) = &self.record {
            if last.instigator == instigator && last.kind == kind && self.timeout == timeout {
                // same processing tick
                if killed && last.killed {
                    // redundant death take hit, just ignore it
                    return false;
                }
                damage += last.damage;
            }
        }

        let serial = self.next_serial;
        self.next_serial = self.next_serial.wrapping_add(1);

        self.record = Some(LastHitInfo {
            serial,
            damage,
            kind,
            instigator,
            causer,
            killed,
        });
        self.timeout = timeout;
        true
    }

    /// The record as observers may see it: present only inside its
    /// visibility window.
    pub fn visible(&self, now: f64) -> Option<LastHitInfo> {
        if now < self.timeout {
            self.record
        } else {
            None
        }
    }

    pub fn latest(&self) -> Option<LastHitInfo> {
        self.record
    }

    pub fn timeout(&self) -> f64 {
        self.timeout
    }
}

impl Default for HitBuffer {
    fn default() -> Self {
        Self::new()
    }
}
