//! Scheduled simulation tasks.
//!
//! Every timer-driven callback chain in the combat core (effect expiry,
//! ragdoll handoff, equip completion, post-death collision shutoff, corpse
//! cleanup) is an explicit task keyed by the owning entity. Handlers
//! re-resolve entity state at fire time instead of capturing it, and
//! removing an entity cancels everything it owns.

use shared::EntityId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskKind {
    /// The attached status-effect proxy reached its lifespan.
    EffectProxyExpired,
    RagdollStart,
    CollisionGraceOver,
    EquipFinished,
    CorpseExpired,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Task {
    pub due: f64,
    pub owner: EntityId,
    pub kind: TaskKind,
}

#[derive(Debug, Default)]
pub struct TaskQueue {
    pending: Vec<Task>,
}

impl TaskQueue {
    pub fn new() -> Self {
        Self {
            pending: Vec::new(),
        }
    }

    pub fn schedule(&mut self, due: f64, owner: EntityId, kind: TaskKind) {
        self.pending.push(Task { due, owner, kind });
    }

    /// Pops all tasks due at or before `now`, in due order.
    pub fn drain_due(&mut self, now: f64) -> Vec<Task> {
        let mut due: Vec<Task> = Vec::new();
        let mut remaining = Vec::with_capacity(self.pending.len());

        for task in self.pending.drain(..) {
            if task.due <= now {
                due.push(task);
            } else {
                remaining.push(task);
            }
        }

        self.pending = remaining;
        due.sort_by(|a, b| a.due.partial_cmp(&b.due).unwrap_or(std::cmp::Ordering::Equal));
        due
    }

    /// Drops every task owned by a removed entity. Timers are bound to
    /// entity lifetime; nothing owned by a despawned entity may fire later.
    pub fn cancel_owned(&mut self, owner: EntityId) {
        self.pending.retain(|task| task.owner != owner);
    }

    pub fn cancel(&mut self, owner: EntityId, kind: TaskKind) {
        self.pending
            .retain(|task| !(task.owner == owner && task.kind == kind));
    }

    pub fn has(&self, owner: EntityId, kind: TaskKind) -> bool {
        self.pending
            .iter()
            .any(|task| task.owner == owner && task.kind == kind)
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}
