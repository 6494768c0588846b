//! blackboard
//! Process-wide registry of the shared singletons every module reads and writes.
//!
//! Each role is registered exactly once at startup, before any module that
//! depends on it is constructed. The registry itself takes no locks: a slot is
//! a `OnceLock` and every registered instance synchronizes its own fields.

pub mod actuators;
pub mod field_objects;
pub mod game_info;
pub mod sensors;
pub mod team_info;

use std::{
    any::Any,
    fmt,
    sync::{
        Arc, OnceLock,
        atomic::{AtomicBool, Ordering},
    },
};

use log::{debug, info};

use crate::error::{BlackboardError, ConfigurationError};
use crate::jobs::JobList;

pub use actuators::{ActuatorTargets, ActuatorsData, Sound, WalkCommand};
pub use field_objects::{FieldObjects, SelfLocation};
pub use game_info::{GameInformation, GameSnapshot, GameState};
pub use sensors::{JOINT_COUNT, SensorSnapshot, SensorsData};
pub use team_info::{TeamInformation, TeamPacket};

/// The fixed set of shared roles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    Sensors,
    Actuators,
    FieldObjects,
    Jobs,
    GameInfo,
    TeamInfo,
}

impl Role {
    pub const ALL: [Role; 6] = [
        Role::Sensors,
        Role::Actuators,
        Role::FieldObjects,
        Role::Jobs,
        Role::GameInfo,
        Role::TeamInfo,
    ];

    #[inline]
    fn slot(self) -> usize {
        self as usize
    }

    pub fn name(&self) -> &'static str {
        match self {
            Role::Sensors => "Sensors",
            Role::Actuators => "Actuators",
            Role::FieldObjects => "FieldObjects",
            Role::Jobs => "Jobs",
            Role::GameInfo => "GameInfo",
            Role::TeamInfo => "TeamInfo",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Ties a concrete type to the role it fills.
pub trait BlackboardEntry: Any + Send + Sync {
    const ROLE: Role;
}

impl BlackboardEntry for SensorsData {
    const ROLE: Role = Role::Sensors;
}
impl BlackboardEntry for ActuatorsData {
    const ROLE: Role = Role::Actuators;
}
impl BlackboardEntry for FieldObjects {
    const ROLE: Role = Role::FieldObjects;
}
impl BlackboardEntry for JobList {
    const ROLE: Role = Role::Jobs;
}
impl BlackboardEntry for GameInformation {
    const ROLE: Role = Role::GameInfo;
}
impl BlackboardEntry for TeamInformation {
    const ROLE: Role = Role::TeamInfo;
}

type Slot = OnceLock<Arc<dyn Any + Send + Sync>>;

pub struct Blackboard {
    slots: [Slot; 6],
    torn_down: AtomicBool,
}

impl Default for Blackboard {
    fn default() -> Self {
        Self::new()
    }
}

impl Blackboard {
    pub fn new() -> Self {
        Self {
            slots: std::array::from_fn(|_| OnceLock::new()),
            torn_down: AtomicBool::new(false),
        }
    }

    /// Register `instance` under `T::ROLE`. A role can only be filled once.
    pub fn add<T: BlackboardEntry>(&self, instance: Arc<T>) -> Result<(), ConfigurationError> {
        let erased: Arc<dyn Any + Send + Sync> = instance;
        self.slots[T::ROLE.slot()]
            .set(erased)
            .map_err(|_| ConfigurationError::DuplicateRole(T::ROLE))?;
        debug!("Blackboard: registered {}", T::ROLE);
        Ok(())
    }

    /// Shared handle to the instance registered under `T::ROLE`.
    pub fn get<T: BlackboardEntry>(&self) -> Result<Arc<T>, BlackboardError> {
        if self.torn_down.load(Ordering::Acquire) {
            return Err(BlackboardError::TornDown);
        }
        let entry = self.slots[T::ROLE.slot()]
            .get()
            .ok_or(BlackboardError::Unregistered(T::ROLE))?;
        Arc::clone(entry)
            .downcast::<T>()
            .map_err(|_| BlackboardError::Unregistered(T::ROLE))
    }

    pub fn is_registered(&self, role: Role) -> bool {
        self.slots[role.slot()].get().is_some()
    }

    /// Every role is filled.
    pub fn is_complete(&self) -> bool {
        Role::ALL.iter().all(|role| self.is_registered(*role))
    }

    /// Invalidate all further lookups. Handles already taken stay usable.
    pub fn teardown(&self) {
        if !self.torn_down.swap(true, Ordering::AcqRel) {
            info!("Blackboard: torn down");
        }
    }

    pub fn is_torn_down(&self) -> bool {
        self.torn_down.load(Ordering::Acquire)
    }

    // Typed shorthands for the fixed roles.

    pub fn sensors(&self) -> Result<Arc<SensorsData>, BlackboardError> {
        self.get()
    }

    pub fn actuators(&self) -> Result<Arc<ActuatorsData>, BlackboardError> {
        self.get()
    }

    pub fn field_objects(&self) -> Result<Arc<FieldObjects>, BlackboardError> {
        self.get()
    }

    pub fn jobs(&self) -> Result<Arc<JobList>, BlackboardError> {
        self.get()
    }

    pub fn game_info(&self) -> Result<Arc<GameInformation>, BlackboardError> {
        self.get()
    }

    pub fn team_info(&self) -> Result<Arc<TeamInformation>, BlackboardError> {
        self.get()
    }
}

impl fmt::Debug for Blackboard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let registered: Vec<&str> = Role::ALL
            .iter()
            .filter(|role| self.is_registered(**role))
            .map(Role::name)
            .collect();
        f.debug_struct("Blackboard")
            .field("registered", &registered)
            .field("torn_down", &self.is_torn_down())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_returns_the_registered_instance() {
        let board = Blackboard::new();
        let jobs = Arc::new(JobList::new());
        board.add(Arc::clone(&jobs)).unwrap();

        let fetched = board.jobs().unwrap();
        assert!(Arc::ptr_eq(&jobs, &fetched));
        assert!(board.is_registered(Role::Jobs));
        assert!(!board.is_complete());
    }

    #[test]
    fn test_role_display() {
        assert_eq!(Role::FieldObjects.to_string(), "FieldObjects");
    }
}
