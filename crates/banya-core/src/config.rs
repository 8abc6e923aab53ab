//! Versioned point configuration.
//!
//! The amounts are administrator-mutable. Each change appends a new snapshot;
//! scoring always receives an explicit snapshot and never reads ambient state,
//! so stored rows can be traced back to the version that produced them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{Error, Result, scoring::PointReason};

/// One immutable snapshot of the five point amounts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PointConfig {
  pub version:           u32,
  pub base_points:       f64,
  pub long_bonus:        f64,
  pub region_bonus:      f64,
  pub country_bonus:     f64,
  pub ultraunique_bonus: f64,
  pub created_at:        DateTime<Utc>,
}

impl PointConfig {
  pub const DEFAULT_AMOUNT: f64 = 1.0;

  /// The initial snapshot every new store starts from.
  pub fn initial(created_at: DateTime<Utc>) -> Self {
    Self {
      version: 1,
      base_points: Self::DEFAULT_AMOUNT,
      long_bonus: Self::DEFAULT_AMOUNT,
      region_bonus: Self::DEFAULT_AMOUNT,
      country_bonus: Self::DEFAULT_AMOUNT,
      ultraunique_bonus: Self::DEFAULT_AMOUNT,
      created_at,
    }
  }

  /// The configured amount for `reason`.
  pub fn amount(&self, reason: PointReason) -> f64 {
    match reason {
      PointReason::Base => self.base_points,
      PointReason::Long => self.long_bonus,
      PointReason::Ultraunique => self.ultraunique_bonus,
      PointReason::NewRegion => self.region_bonus,
      PointReason::NewCountry => self.country_bonus,
    }
  }

  /// All amounts must be finite and non-negative.
  pub fn validate(&self) -> Result<()> {
    for (key, value) in self.entries() {
      if !value.is_finite() {
        return Err(Error::ConfigurationInvalid(format!(
          "{key} must be a finite number, got {value}"
        )));
      }
      if value < 0.0 {
        return Err(Error::ConfigurationInvalid(format!(
          "{key} must not be negative, got {value}"
        )));
      }
    }
    Ok(())
  }

  /// `(setting key, amount)` pairs in a stable order.
  pub fn entries(&self) -> [(&'static str, f64); 5] {
    [
      ("base_points", self.base_points),
      ("long_bonus", self.long_bonus),
      ("region_bonus", self.region_bonus),
      ("country_bonus", self.country_bonus),
      ("ultraunique_bonus", self.ultraunique_bonus),
    ]
  }

  /// Build the next snapshot from a partial update. The result is validated.
  pub fn next(
    &self,
    update: &PointConfigUpdate,
    created_at: DateTime<Utc>,
  ) -> Result<Self> {
    let next = Self {
      version: self.version + 1,
      base_points: update.base_points.unwrap_or(self.base_points),
      long_bonus: update.long_bonus.unwrap_or(self.long_bonus),
      region_bonus: update.region_bonus.unwrap_or(self.region_bonus),
      country_bonus: update.country_bonus.unwrap_or(self.country_bonus),
      ultraunique_bonus: update
        .ultraunique_bonus
        .unwrap_or(self.ultraunique_bonus),
      created_at,
    };
    next.validate()?;
    Ok(next)
  }
}

/// Partial settings change; `None` keeps the current amount.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PointConfigUpdate {
  pub base_points:       Option<f64>,
  pub long_bonus:        Option<f64>,
  pub region_bonus:      Option<f64>,
  pub country_bonus:     Option<f64>,
  pub ultraunique_bonus: Option<f64>,
}

impl PointConfigUpdate {
  pub fn is_empty(&self) -> bool { *self == Self::default() }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn next_merges_and_bumps_version() {
    let base = PointConfig::initial(Utc::now());
    let update = PointConfigUpdate { long_bonus: Some(5.5), ..Default::default() };
    let next = base.next(&update, Utc::now()).unwrap();
    assert_eq!(next.version, 2);
    assert_eq!(next.long_bonus, 5.5);
    assert_eq!(next.base_points, base.base_points);
  }

  #[test]
  fn negative_amount_is_rejected() {
    let base = PointConfig::initial(Utc::now());
    let update = PointConfigUpdate { region_bonus: Some(-1.0), ..Default::default() };
    let err = base.next(&update, Utc::now()).unwrap_err();
    assert!(matches!(err, Error::ConfigurationInvalid(msg) if msg.contains("region_bonus")));
  }

  #[test]
  fn non_finite_amount_is_rejected() {
    let base = PointConfig::initial(Utc::now());
    let update = PointConfigUpdate { base_points: Some(f64::NAN), ..Default::default() };
    assert!(base.next(&update, Utc::now()).is_err());
  }

  #[test]
  fn zero_is_allowed() {
    let base = PointConfig::initial(Utc::now());
    let update = PointConfigUpdate { country_bonus: Some(0.0), ..Default::default() };
    assert_eq!(base.next(&update, Utc::now()).unwrap().country_bonus, 0.0);
  }
}
