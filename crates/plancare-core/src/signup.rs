//! Account creation and repair of half-finished sign-ups.
//!
//! A sign-up writes the `users` profile and the role-specific record in one
//! commit. If that commit fails after the provider created the account,
//! signing up again with the same credentials resumes it. A `users` profile
//! whose role-specific record is missing (written by an older client that
//! wrote the two documents separately) is completed with
//! [`Brokerage::repair_sign_up`].

use chrono::Utc;
use serde::Deserialize;

use crate::{
  error::{Error, Result},
  identity::{Identity, IdentityProvider, normalize_email},
  profile::{Clinic, ClinicRef, Patient, Uid, UserProfile},
  role::Role,
  session::Session,
  store::{BrokerageStore, CommitOutcome, DocRef, Precondition, WriteBatch, WriteOp},
  workflow::Brokerage,
};

const MIN_PASSWORD_LEN: usize = 6;

/// A self-service registration. Admins cannot register themselves.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "role", rename_all = "lowercase")]
pub enum NewAccount {
  #[serde(rename_all = "camelCase")]
  Patient {
    email:     String,
    password:  String,
    #[serde(default)]
    clinic_id: Option<Uid>,
  },
  #[serde(rename_all = "camelCase")]
  Clinic {
    email:       String,
    password:    String,
    clinic_name: String,
  },
}

impl NewAccount {
  fn credentials(&self) -> (&str, &str) {
    match self {
      Self::Patient { email, password, .. } | Self::Clinic { email, password, .. } => {
        (email, password)
      }
    }
  }

  fn role(&self) -> Role {
    match self {
      Self::Patient { .. } => Role::Patient,
      Self::Clinic { .. } => Role::Clinic,
    }
  }
}

fn validate_credentials(email: &str, password: &str) -> Result<()> {
  let valid_email = email
    .split_once('@')
    .is_some_and(|(local, domain)| !local.is_empty() && domain.contains('.'));
  if !valid_email {
    return Err(Error::InvalidSignUp(format!("not an email address: {email:?}")));
  }
  if password.chars().count() < MIN_PASSWORD_LEN {
    return Err(Error::InvalidSignUp(format!(
      "password must be at least {MIN_PASSWORD_LEN} characters"
    )));
  }
  Ok(())
}

impl<S: BrokerageStore + 'static> Brokerage<S> {
  /// Register a patient or clinic and write its documents.
  pub async fn sign_up<P: IdentityProvider>(
    &self,
    provider: &P,
    account: NewAccount,
  ) -> Result<Session> {
    let (email, password) = account.credentials();
    let email = normalize_email(email);
    validate_credentials(&email, password)?;

    match &account {
      NewAccount::Patient { clinic_id: Some(clinic), .. } => {
        let found = self
          .settings
          .step
          .read("load clinic", || self.store.get_clinic(clinic.clone()))
          .await
          .map_err(Error::StoreUnavailable)?;
        if found.is_none() {
          return Err(Error::InvalidSignUp(format!("unknown clinic: {clinic}")));
        }
      }
      NewAccount::Clinic { clinic_name, .. } if clinic_name.trim().is_empty() => {
        return Err(Error::InvalidSignUp("clinic name is required".into()));
      }
      _ => {}
    }

    let identity = self.create_identity(provider, &email, password).await?;
    let now = Utc::now();
    let profile = UserProfile {
      uid:        identity.uid.clone(),
      email:      identity.email.clone(),
      role:       account.role(),
      created_at: now,
    };

    let mut batch = WriteBatch::new()
      .require(Precondition::DocumentAbsent(DocRef::User(identity.uid.clone())))
      .write(WriteOp::CreateProfile(profile.clone()));

    batch = match account {
      NewAccount::Patient { clinic_id, .. } => {
        let mut batch = batch.write(WriteOp::CreatePatient(Patient::new(
          identity.uid.clone(),
          ClinicRef::from(clinic_id.clone()),
          now,
        )));
        if let Some(clinic) = clinic_id {
          batch = batch.write(WriteOp::AddReferral { clinic, patient: identity.uid.clone() });
        }
        batch
      }
      NewAccount::Clinic { clinic_name, .. } => batch.write(WriteOp::CreateClinic(Clinic::new(
        identity.uid.clone(),
        clinic_name.trim().to_owned(),
        now,
      ))),
    };

    self.write_profile(batch, &identity).await?;
    tracing::info!(uid = %identity.uid, role = %profile.role, "account registered");
    Ok(Session::new(profile))
  }

  /// Provision an administrator. Not reachable through self-service sign-up.
  pub async fn create_admin<P: IdentityProvider>(
    &self,
    provider: &P,
    email: &str,
    password: &str,
  ) -> Result<Session> {
    let email = normalize_email(email);
    validate_credentials(&email, password)?;
    let identity = self.create_identity(provider, &email, password).await?;

    let profile = UserProfile {
      uid:        identity.uid.clone(),
      email:      identity.email.clone(),
      role:       Role::Admin,
      created_at: Utc::now(),
    };
    let batch = WriteBatch::new()
      .require(Precondition::DocumentAbsent(DocRef::User(identity.uid.clone())))
      .write(WriteOp::CreateProfile(profile.clone()));
    self.write_profile(batch, &identity).await?;

    tracing::info!(uid = %identity.uid, "admin account provisioned");
    Ok(Session::new(profile))
  }

  /// Complete a sign-up whose role-specific record is missing.
  ///
  /// Returns `true` if a record was created.
  pub async fn repair_sign_up(&self, uid: &Uid) -> Result<bool> {
    let step = self.settings.step;
    let profile = step
      .read("load profile", || self.store.get_profile(uid.clone()))
      .await
      .map_err(Error::StoreUnavailable)?
      .ok_or_else(|| Error::ProfileNotFound(uid.clone()))?;

    let repair = match profile.role {
      Role::Patient => {
        let existing = step
          .read("load patient", || self.store.get_patient(uid.clone()))
          .await
          .map_err(Error::StoreUnavailable)?;
        existing.is_none().then(|| {
          (
            DocRef::Patient(uid.clone()),
            WriteOp::CreatePatient(Patient::new(
              uid.clone(),
              ClinicRef::Unassigned,
              profile.created_at,
            )),
          )
        })
      }
      Role::Clinic => {
        let existing = step
          .read("load clinic", || self.store.get_clinic(uid.clone()))
          .await
          .map_err(Error::StoreUnavailable)?;
        existing.is_none().then(|| {
          let name = profile.email.split('@').next().unwrap_or(&profile.email).to_owned();
          (
            DocRef::Clinic(uid.clone()),
            WriteOp::CreateClinic(Clinic::new(uid.clone(), name, profile.created_at)),
          )
        })
      }
      Role::Admin | Role::Unknown => None,
    };

    let Some((doc, op)) = repair else {
      return Ok(false);
    };

    let batch = WriteBatch::new().require(Precondition::DocumentAbsent(doc)).write(op);
    match self.commit(batch).await? {
      CommitOutcome::Applied => {
        tracing::warn!(%uid, role = %profile.role, "completed half-finished sign-up");
        Ok(true)
      }
      // Someone else created the record in the meantime.
      CommitOutcome::Conflict => Ok(false),
    }
  }

  /// Create the provider account, or take over one left behind by an earlier
  /// attempt whose profile write never landed.
  async fn create_identity<P: IdentityProvider>(
    &self,
    provider: &P,
    email: &str,
    password: &str,
  ) -> Result<Identity> {
    let step = self.settings.step;
    let created = step
      .once(provider.create_account(email.to_owned(), password.to_owned()))
      .await
      .map_err(Error::ProviderUnavailable)?;
    if let Some(identity) = created {
      return Ok(identity);
    }

    // Taken. Only the owner of the credentials may resume, and only while
    // no profile exists.
    let owner = step
      .read("verify password", || {
        provider.verify_password(email.to_owned(), password.to_owned())
      })
      .await
      .map_err(Error::ProviderUnavailable)?
      .ok_or_else(|| Error::EmailInUse(email.to_owned()))?;
    let profile = step
      .read("load profile", || self.store.get_profile(owner.uid.clone()))
      .await
      .map_err(Error::StoreUnavailable)?;
    if profile.is_some() {
      return Err(Error::EmailInUse(email.to_owned()));
    }

    tracing::warn!(uid = %owner.uid, "resuming sign-up whose profile was never written");
    Ok(owner)
  }

  async fn write_profile(&self, batch: WriteBatch, identity: &Identity) -> Result<()> {
    match self.commit(batch).await {
      Ok(CommitOutcome::Applied) => Ok(()),
      Ok(CommitOutcome::Conflict) => Err(Error::EmailInUse(identity.email.clone())),
      Err(e) => {
        tracing::error!(
          uid = %identity.uid,
          error = %e,
          "account created but profile write failed; signing up again resumes it"
        );
        Err(e)
      }
    }
  }
}
