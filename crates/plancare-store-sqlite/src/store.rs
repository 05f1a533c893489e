//! [`SqliteStore`]: the SQLite implementation of [`BrokerageStore`].

use std::{collections::HashMap, path::Path};

use rusqlite::{OptionalExtension as _, TransactionBehavior, params_from_iter};

use plancare_core::{
  activity::ActivityEvent,
  profile::{Clinic, Patient, Uid, UserProfile},
  store::{ActivityQuery, BrokerageStore, CommitOutcome, SubscriptionQuery, WriteBatch},
  subscription::{Subscription, SubscriptionId},
};

use crate::{
  Result,
  encode::{
    RawActivity, RawClinic, RawPatient, RawProfile, RawSubscription, Step, encode_batch,
    encode_uuid,
  },
  schema::SCHEMA,
};

/// SQLite's "no limit".
fn sql_limit(limit: Option<usize>) -> i64 {
  limit.and_then(|n| i64::try_from(n).ok()).unwrap_or(-1)
}

// ─── Store ───────────────────────────────────────────────────────────────────

/// A brokerage store backed by a single SQLite file.
///
/// Cloning is cheap; the inner connection is reference-counted.
#[derive(Clone)]
pub struct SqliteStore {
  pub(crate) conn: tokio_rusqlite::Connection,
}

impl SqliteStore {
  /// Open (or create) a store at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  /// Open an in-memory store, useful for testing.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  async fn init_schema(&self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        conn.execute_batch(SCHEMA)?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  async fn referrals(&self, clinic: Option<String>) -> Result<HashMap<String, Vec<String>>> {
    let rows: Vec<(String, String)> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(
          "SELECT clinic_id, patient_id FROM clinic_referrals
           WHERE ?1 IS NULL OR clinic_id = ?1
           ORDER BY rowid",
        )?;
        let rows = stmt
          .query_map(rusqlite::params![clinic], |row| Ok((row.get(0)?, row.get(1)?)))?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    let mut by_clinic: HashMap<String, Vec<String>> = HashMap::new();
    for (clinic, patient) in rows {
      by_clinic.entry(clinic).or_default().push(patient);
    }
    Ok(by_clinic)
  }
}

// ─── BrokerageStore impl ─────────────────────────────────────────────────────

impl BrokerageStore for SqliteStore {
  type Error = crate::Error;

  // ── Principals ────────────────────────────────────────────────────────────

  async fn get_profile(&self, uid: Uid) -> Result<Option<UserProfile>> {
    let raw: Option<RawProfile> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              &format!("SELECT {} FROM users WHERE uid = ?1", RawProfile::COLUMNS),
              rusqlite::params![uid.as_str()],
              RawProfile::from_row,
            )
            .optional()?,
        )
      })
      .await?;
    raw.map(RawProfile::into_profile).transpose()
  }

  async fn get_patient(&self, uid: Uid) -> Result<Option<Patient>> {
    let raw: Option<RawPatient> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              &format!("SELECT {} FROM patients WHERE user_id = ?1", RawPatient::COLUMNS),
              rusqlite::params![uid.as_str()],
              RawPatient::from_row,
            )
            .optional()?,
        )
      })
      .await?;
    raw.map(RawPatient::into_patient).transpose()
  }

  async fn list_patients(&self) -> Result<Vec<Patient>> {
    let raws: Vec<RawPatient> = self
      .conn
      .call(|conn| {
        let mut stmt = conn.prepare(&format!(
          "SELECT {} FROM patients ORDER BY joined_at, user_id",
          RawPatient::COLUMNS
        ))?;
        let rows = stmt
          .query_map([], RawPatient::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;
    raws.into_iter().map(RawPatient::into_patient).collect()
  }

  async fn get_clinic(&self, uid: Uid) -> Result<Option<Clinic>> {
    let key = uid.as_str().to_owned();
    let raw: Option<RawClinic> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              &format!("SELECT {} FROM clinics WHERE clinic_id = ?1", RawClinic::COLUMNS),
              rusqlite::params![key],
              RawClinic::from_row,
            )
            .optional()?,
        )
      })
      .await?;

    let Some(raw) = raw else { return Ok(None) };
    let mut referrals = self.referrals(Some(uid.as_str().to_owned())).await?;
    let patients = referrals.remove(uid.as_str()).unwrap_or_default();
    raw.into_clinic(patients).map(Some)
  }

  async fn list_clinics(&self) -> Result<Vec<Clinic>> {
    let raws: Vec<RawClinic> = self
      .conn
      .call(|conn| {
        let mut stmt = conn.prepare(&format!(
          "SELECT {} FROM clinics ORDER BY created_at, clinic_id",
          RawClinic::COLUMNS
        ))?;
        let rows = stmt
          .query_map([], RawClinic::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    let mut referrals = self.referrals(None).await?;
    raws
      .into_iter()
      .map(|raw| {
        let patients = referrals.remove(&raw.clinic_id).unwrap_or_default();
        raw.into_clinic(patients)
      })
      .collect()
  }

  // ── Subscriptions and activity ────────────────────────────────────────────

  async fn get_subscription(&self, id: SubscriptionId) -> Result<Option<Subscription>> {
    let key = encode_uuid(id.as_uuid());
    let raw: Option<RawSubscription> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              &format!(
                "SELECT {} FROM subscriptions WHERE subscription_id = ?1",
                RawSubscription::COLUMNS
              ),
              rusqlite::params![key],
              RawSubscription::from_row,
            )
            .optional()?,
        )
      })
      .await?;
    raw.map(RawSubscription::into_subscription).transpose()
  }

  async fn list_subscriptions(&self, query: SubscriptionQuery) -> Result<Vec<Subscription>> {
    let clinic = query.clinic.map(|c| c.as_str().to_owned());
    let patient = query.patient.map(|p| p.as_str().to_owned());
    let limit = sql_limit(query.limit);

    let raws: Vec<RawSubscription> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&format!(
          "SELECT {} FROM subscriptions
           WHERE (?1 IS NULL OR clinic_id = ?1)
             AND (?2 IS NULL OR patient_id = ?2)
           ORDER BY created_at DESC, rowid DESC
           LIMIT ?3",
          RawSubscription::COLUMNS
        ))?;
        let rows = stmt
          .query_map(rusqlite::params![clinic, patient, limit], RawSubscription::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;
    raws.into_iter().map(RawSubscription::into_subscription).collect()
  }

  async fn list_activity(&self, query: ActivityQuery) -> Result<Vec<ActivityEvent>> {
    let clinic = query.clinic.map(|c| c.as_str().to_owned());
    let limit = sql_limit(query.limit);

    let raws: Vec<RawActivity> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&format!(
          "SELECT {} FROM activity_feed
           WHERE ?1 IS NULL OR clinic_id = ?1
           ORDER BY timestamp DESC, rowid DESC
           LIMIT ?2",
          RawActivity::COLUMNS
        ))?;
        let rows = stmt
          .query_map(rusqlite::params![clinic, limit], RawActivity::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;
    raws.into_iter().map(RawActivity::into_event).collect()
  }

  // ── Writes ────────────────────────────────────────────────────────────────

  async fn commit(&self, batch: WriteBatch) -> Result<CommitOutcome> {
    let steps = encode_batch(batch)?;

    let outcome = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        for step in &steps {
          let holds = match step {
            Step::Check { sql, params, expect_row } => {
              let found = tx
                .query_row(sql, params_from_iter(params.iter()), |_| Ok(()))
                .optional()?
                .is_some();
              found == *expect_row
            }
            Step::Write { sql, params, must_hit } => {
              let touched = tx.execute(sql, params_from_iter(params.iter()))?;
              touched > 0 || !must_hit
            }
          };
          if !holds {
            // Dropping `tx` rolls back.
            return Ok(CommitOutcome::Conflict);
          }
        }
        tx.commit()?;
        Ok(CommitOutcome::Applied)
      })
      .await?;

    if outcome == CommitOutcome::Conflict {
      tracing::debug!("write batch rejected by a precondition");
    }
    Ok(outcome)
  }
}
