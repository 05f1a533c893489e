//! The plan catalog.
//!
//! Plans are configuration, not data: they are never stored in the document
//! database, and changing a price means shipping a different catalog. Each
//! subscription copies the plan's figures at creation time, so stored
//! subscriptions are unaffected by catalog changes.

use std::{collections::HashSet, sync::Arc};

use serde::{Deserialize, Serialize};

use crate::error::{CatalogError, Error};

#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Hash,
  Serialize,
  Deserialize,
  strum::Display,
  strum::EnumString,
  strum::AsRefStr,
)]
pub enum PlanId {
  A,
  B,
  C,
}

/// A subscription tier. Amounts are in yen.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Plan {
  pub id:                PlanId,
  pub name:              String,
  pub description:       String,
  pub features:          Vec<String>,
  /// Monthly price charged to the patient.
  pub total:             u32,
  /// Share paid to the referring clinic.
  pub clinic_commission: u32,
  /// Share kept by the platform.
  pub admin_revenue:     u32,
}

impl Plan {
  fn validate(&self) -> Result<(), CatalogError> {
    if self.total == 0 {
      return Err(CatalogError::ZeroTotal(self.id));
    }
    if self.clinic_commission == 0 {
      return Err(CatalogError::ZeroCommission(self.id));
    }
    if self.clinic_commission.checked_add(self.admin_revenue) != Some(self.total) {
      return Err(CatalogError::SplitMismatch {
        id:           self.id,
        total:        self.total,
        commission:   self.clinic_commission,
        platform_cut: self.admin_revenue,
      });
    }
    Ok(())
  }
}

/// An ordered, validated, immutable set of plans. Cheap to clone.
#[derive(Debug, Clone)]
pub struct PlanCatalog {
  plans: Arc<[Plan]>,
}

impl PlanCatalog {
  /// Build a catalog, checking every plan's split and rejecting duplicates.
  pub fn new(plans: Vec<Plan>) -> Result<Self, CatalogError> {
    if plans.is_empty() {
      return Err(CatalogError::Empty);
    }
    let mut seen = HashSet::new();
    for plan in &plans {
      if !seen.insert(plan.id) {
        return Err(CatalogError::Duplicate(plan.id));
      }
      plan.validate()?;
    }
    Ok(Self { plans: plans.into() })
  }

  /// The plans currently offered to patients.
  pub fn standard() -> Self {
    let plan = |id, name: &str, description: &str, features: &[&str], total: u32, commission: u32| Plan {
      id,
      name: name.to_owned(),
      description: description.to_owned(),
      features: features.iter().map(|f| (*f).to_owned()).collect(),
      total,
      clinic_commission: commission,
      admin_revenue: total - commission,
    };

    Self {
      plans: vec![
        plan(
          PlanId::A,
          "プランA",
          "ベーシックサポートプラン",
          &["Basic Back Supporter", "Monthly Health Check-in", "Email Support"],
          3000,
          2000,
        ),
        plan(
          PlanId::B,
          "プランB",
          "スタンダードサポートプラン",
          &[
            "Advanced Back Supporter",
            "Bi-Weekly Health Check-in",
            "Priority Email Support",
            "Access to Wellness Webinars",
          ],
          4000,
          2500,
        ),
        plan(
          PlanId::C,
          "プランC",
          "プレミアムサポートプラン",
          &[
            "Premium Back Supporter",
            "Weekly Health Check-in",
            "24/7 Phone & Email Support",
            "Access to Wellness Webinars",
            "Personalized Health Plan",
          ],
          5000,
          3000,
        ),
      ]
      .into(),
    }
  }

  pub fn list_plans(&self) -> &[Plan] { &self.plans }

  pub fn get(&self, id: PlanId) -> Option<&Plan> { self.plans.iter().find(|p| p.id == id) }

  /// Look up a plan by its external identifier, e.g. `"B"`.
  pub fn lookup(&self, id: &str) -> Result<&Plan, Error> {
    id.parse::<PlanId>()
      .ok()
      .and_then(|id| self.get(id))
      .ok_or_else(|| Error::PlanNotFound(id.to_owned()))
  }
}

impl Default for PlanCatalog {
  fn default() -> Self { Self::standard() }
}
