//! Encoding and decoding helpers between domain types and the plain
//! representations stored in SQLite columns.
//!
//! Timestamps are stored as fixed-width RFC 3339 strings with microsecond
//! precision and a `Z` suffix, so text comparison in SQL matches time order.
//! UUIDs are stored as hyphenated lowercase strings.

use banya_core::{
  bath::{Bath, BathLocation},
  config::PointConfig,
  ids::{BathId, CountryId, RegionId, UserId, VisitId},
  scoring::{PointLog, PointReason},
  user::User,
  visit::{Visit, VisitStatus},
};
use chrono::{DateTime, SecondsFormat, Utc};
use uuid::Uuid;

use crate::{Error, Result};

// ─── Uuid ─────────────────────────────────────────────────────────────────────

pub fn encode_uuid(id: Uuid) -> String { id.hyphenated().to_string() }

pub fn decode_uuid(s: &str) -> Result<Uuid> { Ok(Uuid::parse_str(s)?) }

// ─── DateTime<Utc> ───────────────────────────────────────────────────────────

pub fn encode_dt(dt: DateTime<Utc>) -> String {
  dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::DateParse(e.to_string()))
}

// ─── Enums ───────────────────────────────────────────────────────────────────

pub fn decode_status(s: &str) -> Result<VisitStatus> {
  s.parse()
    .map_err(|_| Error::Decode(format!("unknown visit status: {s:?}")))
}

pub fn decode_reason(s: &str) -> Result<PointReason> {
  s.parse()
    .map_err(|_| Error::Decode(format!("unknown point reason: {s:?}")))
}

// ─── Aliases ─────────────────────────────────────────────────────────────────

pub fn encode_aliases(aliases: &[String]) -> Result<String> {
  Ok(serde_json::to_string(aliases)?)
}

pub fn decode_aliases(s: &str) -> Result<Vec<String>> {
  Ok(serde_json::from_str(s)?)
}

// ─── Row types ───────────────────────────────────────────────────────────────

pub const VISIT_COLUMNS: &str = "v.visit_id, v.bath_id, v.created_by, v.status, \
   v.visited_at, v.flag_long, v.flag_ultraunique, v.revision, v.created_at, \
   v.updated_at";

/// Raw values read from a `visits` row (participants are loaded separately).
pub struct RawVisit {
  pub visit_id:         i64,
  pub bath_id:          Option<i64>,
  pub created_by:       Option<i64>,
  pub status:           String,
  pub visited_at:       String,
  pub flag_long:        bool,
  pub flag_ultraunique: bool,
  pub revision:         i64,
  pub created_at:       String,
  pub updated_at:       String,
}

impl RawVisit {
  /// Map a row selected with [`VISIT_COLUMNS`].
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      visit_id:         row.get(0)?,
      bath_id:          row.get(1)?,
      created_by:       row.get(2)?,
      status:           row.get(3)?,
      visited_at:       row.get(4)?,
      flag_long:        row.get(5)?,
      flag_ultraunique: row.get(6)?,
      revision:         row.get(7)?,
      created_at:       row.get(8)?,
      updated_at:       row.get(9)?,
    })
  }

  pub fn into_visit(self, participants: Vec<UserId>) -> Result<Visit> {
    Ok(Visit {
      visit_id: VisitId(self.visit_id),
      bath_id: self.bath_id.map(BathId),
      participants,
      created_by: self.created_by.map(UserId),
      status: decode_status(&self.status)?,
      visited_at: decode_dt(&self.visited_at)?,
      flag_long: self.flag_long,
      flag_ultraunique: self.flag_ultraunique,
      revision: u64::try_from(self.revision)
        .map_err(|_| Error::Decode(format!("negative revision {}", self.revision)))?,
      created_at: decode_dt(&self.created_at)?,
      updated_at: decode_dt(&self.updated_at)?,
    })
  }
}

pub const POINT_LOG_COLUMNS: &str =
  "log_id, visit_id, user_id, reason, points, batch_id, config_version, created_at";

pub struct RawPointLog {
  pub log_id:         String,
  pub visit_id:       i64,
  pub user_id:        i64,
  pub reason:         String,
  pub points:         f64,
  pub batch_id:       String,
  pub config_version: u32,
  pub created_at:     String,
}

impl RawPointLog {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      log_id:         row.get(0)?,
      visit_id:       row.get(1)?,
      user_id:        row.get(2)?,
      reason:         row.get(3)?,
      points:         row.get(4)?,
      batch_id:       row.get(5)?,
      config_version: row.get(6)?,
      created_at:     row.get(7)?,
    })
  }

  pub fn into_point_log(self) -> Result<PointLog> {
    Ok(PointLog {
      log_id:         decode_uuid(&self.log_id)?,
      visit_id:       VisitId(self.visit_id),
      user_id:        UserId(self.user_id),
      reason:         decode_reason(&self.reason)?,
      points:         self.points,
      batch_id:       decode_uuid(&self.batch_id)?,
      config_version: self.config_version,
      created_at:     decode_dt(&self.created_at)?,
    })
  }
}

pub const USER_COLUMNS: &str =
  "user_id, username, display_name, is_admin, is_active, points, visit_count, created_at";

pub struct RawUser {
  pub user_id:      i64,
  pub username:     Option<String>,
  pub display_name: String,
  pub is_admin:     bool,
  pub is_active:    bool,
  pub points:       f64,
  pub visit_count:  u32,
  pub created_at:   String,
}

impl RawUser {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      user_id:      row.get(0)?,
      username:     row.get(1)?,
      display_name: row.get(2)?,
      is_admin:     row.get(3)?,
      is_active:    row.get(4)?,
      points:       row.get(5)?,
      visit_count:  row.get(6)?,
      created_at:   row.get(7)?,
    })
  }

  pub fn into_user(self) -> Result<User> {
    Ok(User {
      user_id:      UserId(self.user_id),
      username:     self.username,
      display_name: self.display_name,
      is_admin:     self.is_admin,
      is_active:    self.is_active,
      points:       self.points,
      visit_count:  self.visit_count,
      created_at:   decode_dt(&self.created_at)?,
    })
  }
}

pub const BATH_COLUMNS: &str = "bath_id, name, aliases, city, country_id, region_id, \
   lat, lng, canonical_id, is_archived, ultra_unique, created_at";

pub struct RawBath {
  pub bath_id:      i64,
  pub name:         String,
  pub aliases:      String,
  pub city:         Option<String>,
  pub country_id:   Option<i64>,
  pub region_id:    Option<i64>,
  pub lat:          Option<f64>,
  pub lng:          Option<f64>,
  pub canonical_id: Option<i64>,
  pub is_archived:  bool,
  pub ultra_unique: bool,
  pub created_at:   String,
}

impl RawBath {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      bath_id:      row.get(0)?,
      name:         row.get(1)?,
      aliases:      row.get(2)?,
      city:         row.get(3)?,
      country_id:   row.get(4)?,
      region_id:    row.get(5)?,
      lat:          row.get(6)?,
      lng:          row.get(7)?,
      canonical_id: row.get(8)?,
      is_archived:  row.get(9)?,
      ultra_unique: row.get(10)?,
      created_at:   row.get(11)?,
    })
  }

  pub fn into_bath(self) -> Result<Bath> {
    Ok(Bath {
      bath_id:      BathId(self.bath_id),
      name:         self.name,
      aliases:      decode_aliases(&self.aliases)?,
      location:     BathLocation {
        city:       self.city,
        country_id: self.country_id.map(CountryId),
        region_id:  self.region_id.map(RegionId),
        lat:        self.lat,
        lng:        self.lng,
      },
      canonical_id: self.canonical_id.map(BathId),
      is_archived:  self.is_archived,
      ultra_unique: self.ultra_unique,
      created_at:   decode_dt(&self.created_at)?,
    })
  }
}

pub const CONFIG_COLUMNS: &str = "version, base_points, long_bonus, region_bonus, \
   country_bonus, ultraunique_bonus, created_at";

pub struct RawConfig {
  pub version:           u32,
  pub base_points:       f64,
  pub long_bonus:        f64,
  pub region_bonus:      f64,
  pub country_bonus:     f64,
  pub ultraunique_bonus: f64,
  pub created_at:        String,
}

impl RawConfig {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      version:           row.get(0)?,
      base_points:       row.get(1)?,
      long_bonus:        row.get(2)?,
      region_bonus:      row.get(3)?,
      country_bonus:     row.get(4)?,
      ultraunique_bonus: row.get(5)?,
      created_at:        row.get(6)?,
    })
  }

  pub fn into_config(self) -> Result<PointConfig> {
    Ok(PointConfig {
      version:           self.version,
      base_points:       self.base_points,
      long_bonus:        self.long_bonus,
      region_bonus:      self.region_bonus,
      country_bonus:     self.country_bonus,
      ultraunique_bonus: self.ultraunique_bonus,
      created_at:        decode_dt(&self.created_at)?,
    })
  }
}

#[cfg(test)]
mod tests {
  use chrono::TimeZone;

  use super::*;

  #[test]
  fn timestamps_sort_as_text() {
    let early = Utc.with_ymd_and_hms(2024, 1, 5, 9, 0, 0).unwrap();
    let late = early + chrono::Duration::microseconds(1_500);
    assert!(encode_dt(early) < encode_dt(late));
    assert_eq!(encode_dt(early), "2024-01-05T09:00:00.000000Z");
    assert_eq!(decode_dt(&encode_dt(late)).unwrap(), late);
  }
}
