use serde::{Deserialize, Serialize};
use uuid::Uuid;
use ryde_shared::Masked;
use crate::{CoreError, CoreResult};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Passenger,
    ParkAdmin,
}

/// The authenticated caller, as vouched for by the identity service.
///
/// Authorization is always an explicit capability check on the actor made before a core
/// operation runs; queries themselves are never filtered by role.
#[derive(Debug, Clone)]
pub struct Actor {
    pub user_id: Uuid,
    pub email: Masked<String>,
    pub role: Role,
}

impl Actor {
    pub fn new(user_id: Uuid, email: impl Into<String>, role: Role) -> Self {
        Self {
            user_id,
            email: Masked(email.into()),
            role,
        }
    }

    pub fn is_park_admin(&self) -> bool {
        self.role == Role::ParkAdmin
    }

    pub fn owns(&self, owner_id: Uuid) -> bool {
        self.user_id == owner_id
    }

    /// Owner-scoped lookups report foreign records as missing rather than forbidden.
    pub fn ensure_owner(&self, owner_id: Uuid, what: &str) -> CoreResult<()> {
        if self.owns(owner_id) {
            Ok(())
        } else {
            Err(CoreError::NotFound(what.to_string()))
        }
    }

    /// Park-scoped administration: caller must be a park admin assigned to that park.
    pub fn ensure_manages_park(&self, park_admin_id: Option<Uuid>) -> CoreResult<()> {
        if !self.is_park_admin() {
            return Err(CoreError::Forbidden("park admin role required".to_string()));
        }
        match park_admin_id {
            Some(admin_id) if admin_id == self.user_id => Ok(()),
            _ => Err(CoreError::Forbidden("park is not managed by this user".to_string())),
        }
    }
}
