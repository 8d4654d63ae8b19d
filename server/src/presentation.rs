//! Presentation seam.
//!
//! Animation, sound, and effect visuals live outside the combat core. The
//! core only needs to trigger them and, for the death reaction, learn the
//! animation duration so the ragdoll handoff can be scheduled against it.

use log::debug;
use shared::{DamageKind, EffectKind, EntityId, Vec3};

pub trait Presentation: Send {
    /// Plays the death reaction. Returns the animation duration in seconds;
    /// zero means no animation and the ragdoll handoff runs immediately.
    fn play_death_reaction(&mut self, entity: EntityId, kind: DamageKind) -> f64;

    fn play_hit_reaction(&mut self, entity: EntityId, damage: f32, kind: DamageKind);

    /// Cosmetic side of a status effect; `reverse` signals the effect ended
    /// with the entity still alive.
    fn effect_cosmetic(&mut self, entity: EntityId, kind: EffectKind, reverse: bool);

    /// Reverts the entity to its default visual mode.
    fn revert_visuals(&mut self, entity: EntityId);

    /// Positioned noise/alert signal, attributed to `source`.
    fn make_noise(&mut self, location: Vec3, loudness: f32, source: EntityId);
}

/// Headless presentation for the dedicated server binary: every reaction is
/// a log line with a fixed death-animation duration.
pub struct LogPresentation {
    pub death_anim_duration: f64,
}

impl LogPresentation {
    pub fn new() -> Self {
        Self {
            death_anim_duration: 1.5,
        }
    }
}

impl Default for LogPresentation {
    fn default() -> Self {
        Self::new()
    }
}

impl Presentation for LogPresentation {
    fn play_death_reaction(&mut self, entity: EntityId, kind: DamageKind) -> f64 {
        debug!("Death reaction on {} ({:?})", entity, kind);
        self.death_anim_duration
    }

    fn play_hit_reaction(&mut self, entity: EntityId, damage: f32, kind: DamageKind) {
        debug!("Hit reaction on {}: {:.1} ({:?})", entity, damage, kind);
    }

    fn effect_cosmetic(&mut self, entity: EntityId, kind: EffectKind, reverse: bool) {
        debug!(
            "Effect cosmetic on {}: {:?} (reverse: {})",
            entity, kind, reverse
        );
    }

    fn revert_visuals(&mut self, entity: EntityId) {
        debug!("Reverting visuals on {}", entity);
    }

    fn make_noise(&mut self, location: Vec3, loudness: f32, source: EntityId) {
        debug!(
            "Noise at ({:.1}, {:.1}, {:.1}) loudness {:.1} from {}",
            location.x, location.y, location.z, loudness, source
        );
    }
}

/// Test double that records every call, used across the server test suites.
pub mod recording {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[derive(Debug, Clone, PartialEq)]
    pub enum Reaction {
        Death { entity: EntityId, kind: DamageKind },
        Hit { entity: EntityId, damage: f32, kind: DamageKind },
        EffectCosmetic { entity: EntityId, kind: EffectKind, reverse: bool },
        RevertVisuals { entity: EntityId },
        Noise { location: Vec3, loudness: f32, source: EntityId },
    }

    #[derive(Clone)]
    pub struct RecordingPresentation {
        pub death_anim_duration: f64,
        calls: Arc<Mutex<Vec<Reaction>>>,
    }

    impl RecordingPresentation {
        pub fn new(death_anim_duration: f64) -> Self {
            Self {
                death_anim_duration,
                calls: Arc::new(Mutex::new(Vec::new())),
            }
        }

        pub fn calls(&self) -> Vec<Reaction> {
            self.calls.lock().unwrap().clone()
        }

        pub fn count<F: Fn(&Reaction) -> bool>(&self, predicate: F) -> usize {
            self.calls.lock().unwrap().iter().filter(|r| predicate(r)).count()
        }
    }

    impl Presentation for RecordingPresentation {
        fn play_death_reaction(&mut self, entity: EntityId, kind: DamageKind) -> f64 {
            self.calls.lock().unwrap().push(Reaction::Death { entity, kind });
            self.death_anim_duration
        }

        fn play_hit_reaction(&mut self, entity: EntityId, damage: f32, kind: DamageKind) {
            self.calls
                .lock()
                .unwrap()
                .push(Reaction::Hit { entity, damage, kind });
        }

        fn effect_cosmetic(&mut self, entity: EntityId, kind: EffectKind, reverse: bool) {
            self.calls
                .lock()
                .unwrap()
                .push(Reaction::EffectCosmetic { entity, kind, reverse });
        }

        fn revert_visuals(&mut self, entity: EntityId) {
            self.calls
                .lock()
                .unwrap()
                .push(Reaction::RevertVisuals { entity });
        }

        fn make_noise(&mut self, location: Vec3, loudness: f32, source: EntityId) {
            self.calls.lock().unwrap().push(Reaction::Noise {
                location,
                loudness,
                source,
            });
        }
    }
}
