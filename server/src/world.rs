//! World placement hooks
//!
//! Terrain, chunks and physics live elsewhere. The session core only needs
//! to place an entity in the world when it logs in and take it out again
//! when it leaves.

use crate::entity::{EntityCore, Transform};
use log::info;
use parking_lot::Mutex;
use std::collections::HashSet;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum WorldError {
    #[error("entity {0} is already in the world")]
    AlreadyPlaced(u32),
    #[error("entity {0} is not in the world")]
    NotPlaced(u32),
    #[error("entity {0} is already spawned")]
    AlreadySpawned(u32),
    #[error("entity {0} is not spawned")]
    NotSpawned(u32),
}

pub trait World: Send + Sync {
    fn name(&self) -> &str;

    /// Where players without saved data start
    fn spawn_point(&self) -> Transform;

    /// Adds the entity to the simulated world
    fn place(&self, entity: &EntityCore) -> Result<(), WorldError>;

    fn remove(&self, entity: &EntityCore) -> Result<(), WorldError>;

    /// Makes a placed entity visible to other clients
    fn spawn(&self, entity: &EntityCore) -> Result<(), WorldError>;

    fn despawn(&self, entity: &EntityCore) -> Result<(), WorldError>;
}

/// Bookkeeping-only world that tracks which entities are present
#[derive(Debug)]
pub struct SimpleWorld {
    name: String,
    spawn: Transform,
    placed: Mutex<HashSet<u32>>,
    spawned: Mutex<HashSet<u32>>,
}

impl SimpleWorld {
    pub fn new(name: impl Into<String>, spawn: Transform) -> Self {
        Self {
            name: name.into(),
            spawn,
            placed: Mutex::new(HashSet::new()),
            spawned: Mutex::new(HashSet::new()),
        }
    }

    pub fn is_placed(&self, entity_id: u32) -> bool {
        self.placed.lock().contains(&entity_id)
    }

    pub fn is_spawned(&self, entity_id: u32) -> bool {
        self.spawned.lock().contains(&entity_id)
    }

    /// Number of entities currently placed
    pub fn population(&self) -> usize {
        self.placed.lock().len()
    }
}

impl World for SimpleWorld {
    fn name(&self) -> &str {
        &self.name
    }

    fn spawn_point(&self) -> Transform {
        self.spawn
    }

    fn place(&self, entity: &EntityCore) -> Result<(), WorldError> {
        if !self.placed.lock().insert(entity.id()) {
            return Err(WorldError::AlreadyPlaced(entity.id()));
        }
        info!("Entity {} placed in {}", entity.id(), self.name);
        Ok(())
    }

    fn remove(&self, entity: &EntityCore) -> Result<(), WorldError> {
        if !self.placed.lock().remove(&entity.id()) {
            return Err(WorldError::NotPlaced(entity.id()));
        }
        info!("Entity {} removed from {}", entity.id(), self.name);
        Ok(())
    }

    fn spawn(&self, entity: &EntityCore) -> Result<(), WorldError> {
        if !self.is_placed(entity.id()) {
            return Err(WorldError::NotPlaced(entity.id()));
        }
        if !self.spawned.lock().insert(entity.id()) {
            return Err(WorldError::AlreadySpawned(entity.id()));
        }
        Ok(())
    }

    fn despawn(&self, entity: &EntityCore) -> Result<(), WorldError> {
        if !self.spawned.lock().remove(&entity.id()) {
            return Err(WorldError::NotSpawned(entity.id()));
        }
        Ok(())
    }
}
