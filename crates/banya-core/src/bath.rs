//! Reference data: countries, regions and baths.
//!
//! Baths may be duplicates of one another. A duplicate points at another
//! bath through `canonical_id`; following those links always ends at a single
//! canonical bath. Scoring only ever sees the resolved canonical bath.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
  Error, Result,
  ids::{BathId, CountryId, RegionId},
};

// ─── Geography ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Country {
  pub country_id: CountryId,
  pub name:       String,
  /// ISO code, e.g. `"RU"`.
  pub code:       Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewCountry {
  pub name: String,
  pub code: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Region {
  pub region_id:  RegionId,
  pub country_id: Option<CountryId>,
  pub name:       String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewRegion {
  pub name:       String,
  pub country_id: Option<CountryId>,
}

// ─── Bath ────────────────────────────────────────────────────────────────────

/// Where a bath is.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BathLocation {
  pub city:       Option<String>,
  pub country_id: Option<CountryId>,
  pub region_id:  Option<RegionId>,
  pub lat:        Option<f64>,
  pub lng:        Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Bath {
  pub bath_id:      BathId,
  pub name:         String,
  /// Alternate names that refer to the same venue.
  pub aliases:      Vec<String>,
  pub location:     BathLocation,
  /// Set when this record duplicates another bath.
  pub canonical_id: Option<BathId>,
  pub is_archived:  bool,
  /// Classification used by the `ultraunique` bonus.
  pub ultra_unique: bool,
  pub created_at:   DateTime<Utc>,
}

/// Input to [`crate::store::VisitStore::add_bath`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewBath {
  pub name:         String,
  #[serde(default)]
  pub aliases:      Vec<String>,
  #[serde(default)]
  pub location:     BathLocation,
  #[serde(default)]
  pub ultra_unique: bool,
}

impl NewBath {
  pub fn new(name: impl Into<String>) -> Self {
    Self { name: name.into(), ..Self::default() }
  }
}

/// The scoring-relevant view of a canonical bath.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedBath {
  pub bath_id:      BathId,
  pub region_id:    Option<RegionId>,
  /// The bath's own country, else the country of its region.
  pub country_id:   Option<CountryId>,
  pub ultra_unique: bool,
}

// ─── Canonicalisation ────────────────────────────────────────────────────────

/// Follow `canonical_id` links from `start` to the canonical bath.
///
/// `next` returns the `canonical_id` of a bath, `Ok(None)` for a canonical
/// bath, or an error if the bath does not exist. A link chain that revisits a
/// bath yields [`Error::AliasCycle`].
pub fn resolve_canonical<F>(start: BathId, mut next: F) -> Result<BathId>
where
  F: FnMut(BathId) -> Result<Option<BathId>>,
{
  let mut seen = HashSet::new();
  let mut current = start;
  loop {
    if !seen.insert(current) {
      return Err(Error::AliasCycle { source_id: start, target_id: current });
    }
    match next(current)? {
      Some(parent) => current = parent,
      None => return Ok(current),
    }
  }
}

/// Check that pointing `source` at `target` keeps the alias graph acyclic.
///
/// Every bath on the path from `target` to its canonical bath must differ
/// from `source`. Returns the canonical id `source` will resolve to.
pub fn check_merge<F>(source: BathId, target: BathId, mut next: F) -> Result<BathId>
where
  F: FnMut(BathId) -> Result<Option<BathId>>,
{
  resolve_canonical(target, |id| {
    if id == source {
      return Err(Error::AliasCycle { source_id: source, target_id: target });
    }
    next(id)
  })
}

#[cfg(test)]
mod tests {
  use std::collections::HashMap;

  use super::*;

  fn links(pairs: &[(i64, Option<i64>)]) -> HashMap<BathId, Option<BathId>> {
    pairs
      .iter()
      .map(|(id, parent)| (BathId(*id), parent.map(BathId)))
      .collect()
  }

  fn lookup(
    table: &HashMap<BathId, Option<BathId>>,
  ) -> impl FnMut(BathId) -> Result<Option<BathId>> + '_ {
    |id| table.get(&id).copied().ok_or(Error::BathNotFound(id))
  }

  #[test]
  fn resolves_through_chain() {
    let table = links(&[(1, None), (2, Some(1)), (3, Some(2))]);
    assert_eq!(resolve_canonical(BathId(3), lookup(&table)).unwrap(), BathId(1));
    assert_eq!(resolve_canonical(BathId(1), lookup(&table)).unwrap(), BathId(1));
  }

  #[test]
  fn detects_cycle() {
    let table = links(&[(1, Some(2)), (2, Some(1))]);
    let err = resolve_canonical(BathId(1), lookup(&table)).unwrap_err();
    assert!(matches!(err, Error::AliasCycle { .. }));
  }

  #[test]
  fn missing_bath_is_reported() {
    let table = links(&[(1, Some(9))]);
    let err = resolve_canonical(BathId(1), lookup(&table)).unwrap_err();
    assert!(matches!(err, Error::BathNotFound(BathId(9))));
  }

  #[test]
  fn merge_into_own_alias_is_rejected() {
    let table = links(&[(1, None), (2, Some(1))]);
    let err = check_merge(BathId(1), BathId(2), lookup(&table)).unwrap_err();
    assert!(matches!(err, Error::AliasCycle { .. }));

    let ok = check_merge(BathId(2), BathId(1), lookup(&table)).unwrap();
    assert_eq!(ok, BathId(1));
  }

  #[test]
  fn merge_into_alias_further_down_the_chain_is_rejected() {
    // 3 -> 2 -> 1: pointing 2 at 3 would close 2 -> 3 -> 2.
    let table = links(&[(1, None), (2, Some(1)), (3, Some(2))]);
    let err = check_merge(BathId(2), BathId(3), lookup(&table)).unwrap_err();
    assert!(matches!(err, Error::AliasCycle { .. }));

    assert_eq!(check_merge(BathId(4), BathId(3), lookup(&table)).unwrap(), BathId(1));
  }
}
