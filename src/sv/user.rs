use serde::Deserialize;

use crate::{
  actor::Actor,
  entity::{Role, user},
  gateway::CredentialHasher,
  prelude::*,
};

const MIN_PASSWORD_LEN: usize = 8;

#[derive(Debug, Clone, Deserialize)]
pub struct NewUser {
  pub email: String,
  pub first_name: String,
  pub last_name: String,
  pub password: String,
}

pub struct User<'a> {
  db: &'a DatabaseConnection,
  hasher: &'a dyn CredentialHasher,
}

impl<'a> User<'a> {
  pub fn new(db: &'a DatabaseConnection, hasher: &'a dyn CredentialHasher) -> Self {
    Self { db, hasher }
  }

  /// Credentials are hashed here, before the row is built.
  pub async fn register(&self, new: NewUser) -> Result<user::Model> {
    let email = new.email.trim().to_lowercase();
    if !email.contains('@') || email.starts_with('@') || email.ends_with('@') {
      return Err(Error::validation("Invalid email address"));
    }
    if new.first_name.trim().is_empty() || new.last_name.trim().is_empty() {
      return Err(Error::validation("First and last name are required"));
    }
    if new.password.chars().count() < MIN_PASSWORD_LEN {
      return Err(Error::validation(format!(
        "Password must be at least {MIN_PASSWORD_LEN} characters"
      )));
    }

    if self.by_email(&email).await?.is_some() {
      return Err(Error::conflict("Email is already registered"));
    }

    let password_hash = self.hasher.hash(&new.password).map_err(|err| {
      error!("Password hashing failed: {err:#}");
      Error::upstream("Could not secure credentials")
    })?;

    let user = user::ActiveModel {
      email: Set(email),
      first_name: Set(new.first_name.trim().to_string()),
      last_name: Set(new.last_name.trim().to_string()),
      password_hash: Set(password_hash),
      role: Set(Role::Customer),
      created_at: Set(now()),
      ..Default::default()
    }
    .insert(self.db)
    .await?;

    info!("User #{} registered", user.id);
    Ok(user)
  }

  pub async fn by_id(&self, id: i32) -> Result<Option<user::Model>> {
    Ok(user::Entity::find_by_id(id).one(self.db).await?)
  }

  pub async fn by_email(&self, email: &str) -> Result<Option<user::Model>> {
    let user = user::Entity::find()
      .filter(user::Column::Email.eq(email.trim().to_lowercase()))
      .one(self.db)
      .await?;
    Ok(user)
  }

  pub async fn verify_credentials(&self, email: &str, password: &str) -> Result<user::Model> {
    let user = self.by_email(email).await?.ok_or(Error::NotFound("User"))?;
    let valid = self.hasher.verify(password, &user.password_hash).map_err(|err| {
      error!("Password verification failed: {err:#}");
      Error::upstream("Could not verify credentials")
    })?;

    if valid { Ok(user) } else { Err(Error::forbidden("Invalid credentials")) }
  }

  pub async fn all(&self, actor: &Actor) -> Result<Vec<user::Model>> {
    actor.ensure_staff()?;
    let users =
      user::Entity::find().order_by_asc(user::Column::CreatedAt).all(self.db).await?;
    Ok(users)
  }

  pub async fn set_role(&self, actor: &Actor, id: i32, role: Role) -> Result<user::Model> {
    actor.ensure_admin()?;
    if actor.user_id == id && role != Role::Admin {
      return Err(Error::validation("Admins cannot demote themselves"));
    }

    let user = self.by_id(id).await?.ok_or(Error::NotFound("User"))?;
    let user = user::ActiveModel { role: Set(role), ..user.into() }.update(self.db).await?;

    info!("User #{id} is now {:?}", user.role);
    Ok(user)
  }

  pub async fn count(&self) -> Result<u64> {
    Ok(user::Entity::find().count(self.db).await?)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::testing;

  fn signup(email: &str) -> NewUser {
    NewUser {
      email: email.into(),
      first_name: "Ada".into(),
      last_name: "Lovelace".into(),
      password: "correct horse".into(),
    }
  }

  #[tokio::test]
  async fn register_hashes_before_persisting() {
    let h = testing::harness().await;
    let sv = h.app.sv().user;

    let user = sv.register(signup("Ada@Example.com")).await.unwrap();
    assert_eq!(user.email, "ada@example.com");
    assert_eq!(user.password_hash, "plain:correct horse");
    assert_eq!(user.role, Role::Customer);

    assert!(sv.verify_credentials("ada@example.com", "correct horse").await.is_ok());
    assert!(matches!(
      sv.verify_credentials("ada@example.com", "wrong horse").await,
      Err(Error::Forbidden(_))
    ));
  }

  #[tokio::test]
  async fn register_rejects_bad_input() {
    let h = testing::harness().await;
    let sv = h.app.sv().user;

    assert!(matches!(sv.register(signup("nope")).await, Err(Error::Validation(_))));
    let short = NewUser { password: "short".into(), ..signup("a@b.c") };
    assert!(matches!(sv.register(short).await, Err(Error::Validation(_))));

    sv.register(signup("a@b.c")).await.unwrap();
    assert!(matches!(sv.register(signup("A@B.C")).await, Err(Error::Conflict(_))));
    assert_eq!(sv.count().await.unwrap(), 1);
  }

  #[tokio::test]
  async fn only_admins_change_roles() {
    let h = testing::harness().await;
    let sv = h.app.sv().user;
    let admin = testing::user(h.db(), Role::Admin).await;
    let target = testing::customer(h.db()).await;

    let manager = Actor::new(target.id, Role::Manager);
    assert!(matches!(
      sv.set_role(&manager, target.id, Role::Admin).await,
      Err(Error::Forbidden(_))
    ));

    let admin = Actor::new(admin.id, Role::Admin);
    let promoted = sv.set_role(&admin, target.id, Role::Manager).await.unwrap();
    assert_eq!(promoted.role, Role::Manager);
    assert!(matches!(
      sv.set_role(&admin, admin.user_id, Role::Customer).await,
      Err(Error::Validation(_))
    ));
    assert!(matches!(sv.set_role(&admin, 9_999, Role::Manager).await, Err(Error::NotFound(_))));
  }
}
