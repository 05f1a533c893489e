//! Email/password accounts, stored alongside the brokerage collections.

use argon2::{
  Argon2, PasswordHash, PasswordHasher as _, PasswordVerifier as _, password_hash::SaltString,
};
use chrono::Utc;
use rand_core::OsRng;
use rusqlite::OptionalExtension as _;
use uuid::Uuid;

use plancare_core::{
  identity::{Identity, IdentityProvider},
  profile::Uid,
};

use crate::{
  Error, Result,
  encode::{encode_dt, encode_uuid},
  store::SqliteStore,
};

fn hash_password(password: &str) -> Result<String> {
  let salt = SaltString::generate(&mut OsRng);
  Argon2::default()
    .hash_password(password.as_bytes(), &salt)
    .map(|hash| hash.to_string())
    .map_err(|e| Error::PasswordHash(e.to_string()))
}

impl IdentityProvider for SqliteStore {
  type Error = Error;

  async fn create_account(&self, email: String, password: String) -> Result<Option<Identity>> {
    let password_hash = hash_password(&password)?;
    let uid = encode_uuid(Uuid::new_v4());
    let created_at = encode_dt(Utc::now());

    let identity = Identity { uid: Uid::new(uid.clone()), email: email.clone() };
    let inserted = self
      .conn
      .call(move |conn| {
        Ok(conn.execute(
          "INSERT INTO accounts (uid, email, password_hash, created_at)
           VALUES (?1, ?2, ?3, ?4)
           ON CONFLICT (email) DO NOTHING",
          rusqlite::params![uid, email, password_hash, created_at],
        )?)
      })
      .await?;

    Ok((inserted > 0).then_some(identity))
  }

  async fn verify_password(&self, email: String, password: String) -> Result<Option<Identity>> {
    let lookup = email.clone();
    let row: Option<(String, String)> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              "SELECT uid, password_hash FROM accounts WHERE email = ?1",
              rusqlite::params![lookup],
              |r| Ok((r.get(0)?, r.get(1)?)),
            )
            .optional()?,
        )
      })
      .await?;

    let Some((uid, stored)) = row else { return Ok(None) };
    let parsed = PasswordHash::new(&stored).map_err(|e| Error::PasswordHash(e.to_string()))?;
    let matches = Argon2::default().verify_password(password.as_bytes(), &parsed).is_ok();

    Ok(matches.then(|| Identity { uid: Uid::new(uid), email }))
  }
}
