use crate::dual_state::DualStateCell;
use serde::{Deserialize, Serialize};
use shared::{ExperienceMessage, PositionLookMessage};

/// Position, orientation and scale of an entity
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Transform {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub yaw: f32,
    pub pitch: f32,
    pub scale: f32,
}

impl Default for Transform {
    fn default() -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            z: 0.0,
            yaw: 0.0,
            pitch: 0.0,
            scale: 1.0,
        }
    }
}

impl Transform {
    pub fn at(x: f64, y: f64, z: f64) -> Self {
        Self {
            x,
            y,
            z,
            ..Self::default()
        }
    }

    pub fn with_look(self, yaw: f32, pitch: f32) -> Self {
        Self { yaw, pitch, ..self }
    }

    pub fn to_message(&self) -> PositionLookMessage {
        PositionLookMessage {
            x: self.x,
            y: self.y,
            z: self.z,
            yaw: self.yaw,
            pitch: self.pitch,
        }
    }
}

/// Experience bar state
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Experience {
    /// Progress towards the next level, normally within `[0, 1]`
    pub bar_value: f32,
    pub level: u16,
    pub total: u16,
}

impl Experience {
    pub fn new(bar_value: f32, level: u16, total: u16) -> Self {
        Self {
            bar_value,
            level,
            total,
        }
    }

    pub fn to_message(&self) -> ExperienceMessage {
        ExperienceMessage::new(self.bar_value, self.level, self.total)
    }
}

/// Simulation-facing state every entity carries
///
/// Mutations land on the live side; the tick loop publishes them with
/// [`EntityCore::copy_to_snapshot`].
#[derive(Debug)]
pub struct EntityCore {
    id: u32,
    world: String,
    transform: DualStateCell<Transform>,
    experience: DualStateCell<Experience>,
}

impl EntityCore {
    pub fn new(id: u32, world: impl Into<String>) -> Self {
        Self {
            id,
            world: world.into(),
            transform: DualStateCell::new(Transform::default()),
            experience: DualStateCell::new(Experience::default()),
        }
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    /// Name of the world the entity lives in
    pub fn world(&self) -> &str {
        &self.world
    }

    /// Transform as of the last tick
    pub fn transform(&self) -> Transform {
        self.transform.snapshot()
    }

    pub fn live_transform(&self) -> Transform {
        self.transform.live()
    }

    pub(crate) fn set_transform(&self, transform: Transform) {
        self.transform.set_live(transform);
    }

    pub(crate) fn update_transform<F>(&self, update: F)
    where
        F: FnOnce(&mut Transform),
    {
        self.transform.update_live(update);
    }

    /// Experience as of the last tick
    pub fn experience(&self) -> Experience {
        self.experience.snapshot()
    }

    pub fn live_experience(&self) -> Experience {
        self.experience.live()
    }

    pub(crate) fn set_experience(&self, experience: Experience) {
        self.experience.set_live(experience);
    }

    pub fn copy_to_snapshot(&self) {
        self.transform.copy_to_snapshot();
        self.experience.copy_to_snapshot();
    }
}
