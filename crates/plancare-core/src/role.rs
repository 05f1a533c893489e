//! Roles, sections and the routes a principal can be sent to.

use serde::{Deserialize, Serialize};

/// The kind of principal a profile describes.
///
/// Profiles are written by this crate with one of the first three variants.
/// Any other stored value decodes to [`Role::Unknown`], which is never granted
/// access and always lands on [`Route::Root`].
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
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Role {
  Patient,
  Clinic,
  Admin,
  #[serde(other)]
  Unknown,
}

impl Role {
  /// Decode a stored role tag, mapping anything unrecognised to `Unknown`.
  pub fn from_tag(tag: &str) -> Self { tag.parse().unwrap_or(Self::Unknown) }
}

/// A navigable location in the application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Route {
  Root,
  PatientDashboard,
  ClinicDashboard,
  AdminDashboard,
  PatientLogin,
  ClinicLogin,
  AdminLogin,
}

impl Route {
  pub fn path(self) -> &'static str {
    match self {
      Self::Root => "/",
      Self::PatientDashboard => "/patient/dashboard",
      Self::ClinicDashboard => "/clinic/dashboard",
      Self::AdminDashboard => "/admin/dashboard",
      Self::PatientLogin => "/auth/patient/login",
      Self::ClinicLogin => "/auth/clinic/login",
      Self::AdminLogin => "/auth/admin/login",
    }
  }
}

/// Where a principal with `role` belongs.
pub fn canonical_dashboard(role: Role) -> Route {
  match role {
    Role::Patient => Route::PatientDashboard,
    Role::Clinic => Route::ClinicDashboard,
    Role::Admin => Route::AdminDashboard,
    Role::Unknown => Route::Root,
  }
}

/// A top-level area of the application, each with its own sign-in entry.
#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Serialize,
  Deserialize,
  strum::Display,
  strum::EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Section {
  Patient,
  Clinic,
  Admin,
}

impl Section {
  pub fn sign_in(self) -> Route {
    match self {
      Self::Patient => Route::PatientLogin,
      Self::Clinic => Route::ClinicLogin,
      Self::Admin => Route::AdminLogin,
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn every_role_has_a_dashboard() {
    assert_eq!(canonical_dashboard(Role::Patient).path(), "/patient/dashboard");
    assert_eq!(canonical_dashboard(Role::Clinic).path(), "/clinic/dashboard");
    assert_eq!(canonical_dashboard(Role::Admin).path(), "/admin/dashboard");
    assert_eq!(canonical_dashboard(Role::Unknown), Route::Root);
  }

  #[test]
  fn unrecognised_tags_decode_to_unknown() {
    assert_eq!(Role::from_tag("clinic"), Role::Clinic);
    assert_eq!(Role::from_tag("superuser"), Role::Unknown);
    assert_eq!(Role::from_tag("unknown"), Role::Unknown);

    let role: Role = serde_json::from_str("\"owner\"").unwrap();
    assert_eq!(role, Role::Unknown);
  }

  #[test]
  fn sections_sign_in_on_their_own_login() {
    assert_eq!(Section::Patient.sign_in().path(), "/auth/patient/login");
    assert_eq!("clinic".parse::<Section>().unwrap().sign_in(), Route::ClinicLogin);
  }
}
