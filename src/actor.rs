//! Caller identity supplied by the authentication layer in front of us.
//! Nothing here authenticates; it only authorizes.

use serde::{Deserialize, Serialize};

use crate::{entity::Role, prelude::*};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
  pub user_id: i32,
  pub role: Role,
}

impl Actor {
  pub fn new(user_id: i32, role: Role) -> Self {
    Self { user_id, role }
  }

  #[cfg(test)]
  pub fn customer(user_id: i32) -> Self {
    Self::new(user_id, Role::Customer)
  }

  pub fn is_staff(&self) -> bool {
    matches!(self.role, Role::Admin | Role::Manager)
  }

  pub fn is_admin(&self) -> bool {
    self.role == Role::Admin
  }

  /// Owner or staff.
  pub fn can_access(&self, owner_id: i32) -> bool {
    self.user_id == owner_id || self.is_staff()
  }

  pub fn ensure_access(&self, owner_id: i32) -> Result<()> {
    if self.can_access(owner_id) {
      Ok(())
    } else {
      Err(Error::forbidden("Not allowed to access this resource"))
    }
  }

  pub fn ensure_owner(&self, owner_id: i32) -> Result<()> {
    if self.user_id == owner_id {
      Ok(())
    } else {
      Err(Error::forbidden("Only the owner may do this"))
    }
  }

  pub fn ensure_staff(&self) -> Result<()> {
    if self.is_staff() {
      Ok(())
    } else {
      Err(Error::forbidden("Staff role required"))
    }
  }

  pub fn ensure_admin(&self) -> Result<()> {
    if self.is_admin() {
      Ok(())
    } else {
      Err(Error::forbidden("Admin role required"))
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn staff_can_access_any_owner() {
    let admin = Actor::new(1, Role::Admin);
    let manager = Actor::new(2, Role::Manager);
    let customer = Actor::customer(3);

    assert!(admin.can_access(42));
    assert!(manager.can_access(42));
    assert!(customer.can_access(3));
    assert!(!customer.can_access(42));
    assert!(matches!(customer.ensure_access(42), Err(Error::Forbidden(_))));
  }

  #[test]
  fn ownership_is_strict() {
    assert!(Actor::new(1, Role::Admin).ensure_owner(2).is_err());
    assert!(Actor::customer(2).ensure_owner(2).is_ok());
  }

  #[test]
  fn role_checks() {
    assert!(Actor::new(1, Role::Manager).ensure_staff().is_ok());
    assert!(Actor::new(1, Role::Manager).ensure_admin().is_err());
    assert!(Actor::customer(1).ensure_staff().is_err());
  }
}
