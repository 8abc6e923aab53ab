//! Synchronous queries shared by the store's transactions.
//!
//! Every function takes a plain [`Connection`]; callers pass a
//! [`rusqlite::Transaction`] (which derefs to one) whenever the work must be
//! atomic with other writes.

use std::collections::BTreeSet;

use banya_core::{
  bath::{self, Bath, ResolvedBath},
  config::PointConfig,
  ids::{BathId, CountryId, RegionId, UserId, VisitId},
  recompute::{DiscoveryScope, Geo, ScopeState},
  scoring::{HistoryEntry, ParticipantHistory, PointLog, PointReason},
  user::User,
  visit::{Visit, VisitDetail, VisitKey},
};
use chrono::Utc;
use rusqlite::{Connection, OptionalExtension as _, params};

use crate::{
  Error, Result,
  encode::{
    BATH_COLUMNS, CONFIG_COLUMNS, POINT_LOG_COLUMNS, RawBath, RawConfig, RawPointLog,
    RawUser, RawVisit, USER_COLUMNS, VISIT_COLUMNS, decode_dt, encode_dt, encode_uuid,
  },
};

const CONFIRMED: &str = "confirmed";

// ─── Users ───────────────────────────────────────────────────────────────────

pub fn load_user(conn: &Connection, id: UserId) -> Result<Option<User>> {
  let raw = conn
    .query_row(
      &format!("SELECT {USER_COLUMNS} FROM users WHERE user_id = ?1"),
      params![id.get()],
      RawUser::from_row,
    )
    .optional()?;
  raw.map(RawUser::into_user).transpose()
}

/// Fail with [`banya_core::Error::UserNotFound`] for the first unknown id.
pub fn ensure_users_exist(conn: &Connection, ids: &[UserId]) -> Result<()> {
  let mut stmt = conn.prepare_cached("SELECT 1 FROM users WHERE user_id = ?1")?;
  for &id in ids {
    if !stmt.exists(params![id.get()])? {
      return Err(banya_core::Error::UserNotFound(id).into());
    }
  }
  Ok(())
}

/// Recompute the denormalised `points` and `visit_count` of `users`.
pub fn refresh_user_totals(conn: &Connection, users: &BTreeSet<UserId>) -> Result<()> {
  let mut stmt = conn.prepare_cached(
    "UPDATE users SET
       points = COALESCE(
         (SELECT SUM(l.points) FROM point_logs l WHERE l.user_id = users.user_id), 0),
       visit_count = (
         SELECT COUNT(*)
         FROM visit_participants p
         JOIN visits v ON v.visit_id = p.visit_id
         WHERE p.user_id = users.user_id AND v.status = 'confirmed')
     WHERE user_id = ?1",
  )?;
  for user in users {
    stmt.execute(params![user.get()])?;
  }
  Ok(())
}

pub fn refresh_all_user_totals(conn: &Connection) -> Result<()> {
  let users: BTreeSet<UserId> = {
    let mut stmt = conn.prepare("SELECT user_id FROM users")?;
    stmt
      .query_map([], |row| row.get::<_, i64>(0))?
      .map(|id| id.map(UserId))
      .collect::<rusqlite::Result<_>>()?
  };
  refresh_user_totals(conn, &users)
}

// ─── Baths ───────────────────────────────────────────────────────────────────

pub fn load_bath(conn: &Connection, id: BathId) -> Result<Option<Bath>> {
  let raw = conn
    .query_row(
      &format!("SELECT {BATH_COLUMNS} FROM baths WHERE bath_id = ?1"),
      params![id.get()],
      RawBath::from_row,
    )
    .optional()?;
  raw.map(RawBath::into_bath).transpose()
}

/// The `canonical_id` link of one bath; `None` if the bath does not exist.
fn canonical_link(conn: &Connection, id: BathId) -> rusqlite::Result<Option<Option<BathId>>> {
  conn
    .query_row(
      "SELECT canonical_id FROM baths WHERE bath_id = ?1",
      params![id.get()],
      |row| row.get::<_, Option<i64>>(0),
    )
    .optional()
    .map(|link| link.map(|parent| parent.map(BathId)))
}

type NextLink<'a> = dyn FnMut(BathId) -> banya_core::Result<Option<BathId>> + 'a;

/// Walk alias links with `walk`, surfacing database failures over the
/// not-found error they are reported as during the walk.
fn walk_links<T>(
  conn: &Connection,
  walk: impl FnOnce(&mut NextLink<'_>) -> banya_core::Result<T>,
) -> Result<T> {
  let mut failure = None;
  let mut next = |id: BathId| match canonical_link(conn, id) {
    Ok(Some(link)) => Ok(link),
    Ok(None) => Err(banya_core::Error::BathNotFound(id)),
    Err(e) => {
      failure = Some(e);
      Err(banya_core::Error::BathNotFound(id))
    }
  };
  let outcome = walk(&mut next);
  match failure {
    Some(e) => Err(e.into()),
    None => Ok(outcome?),
  }
}

pub fn canonical_bath_id(conn: &Connection, id: BathId) -> Result<BathId> {
  walk_links(conn, |next| bath::resolve_canonical(id, next))
}

/// Check that `source` may become an alias of `target`; returns the canonical
/// id both will resolve to.
pub fn check_merge(conn: &Connection, source: BathId, target: BathId) -> Result<BathId> {
  if canonical_link(conn, source)?.is_none() {
    return Err(banya_core::Error::BathNotFound(source).into());
  }
  walk_links(conn, |next| bath::check_merge(source, target, next))
}

/// Resolve `id` to its canonical bath's scoring view.
pub fn resolve_bath(conn: &Connection, id: BathId) -> Result<ResolvedBath> {
  let canonical = canonical_bath_id(conn, id)?;
  let (region_id, country_id, ultra_unique) = conn.query_row(
    "SELECT b.region_id, COALESCE(b.country_id, r.country_id), b.ultra_unique
     FROM baths b
     LEFT JOIN regions r ON r.region_id = b.region_id
     WHERE b.bath_id = ?1",
    params![canonical.get()],
    |row| {
      Ok((
        row.get::<_, Option<i64>>(0)?,
        row.get::<_, Option<i64>>(1)?,
        row.get::<_, bool>(2)?,
      ))
    },
  )?;
  Ok(ResolvedBath {
    bath_id: canonical,
    region_id: region_id.map(RegionId),
    country_id: country_id.map(CountryId),
    ultra_unique,
  })
}

// ─── Visits ──────────────────────────────────────────────────────────────────

pub fn load_participants(conn: &Connection, id: VisitId) -> Result<Vec<UserId>> {
  let mut stmt = conn.prepare_cached(
    "SELECT user_id FROM visit_participants WHERE visit_id = ?1 ORDER BY user_id",
  )?;
  let ids = stmt
    .query_map(params![id.get()], |row| row.get::<_, i64>(0))?
    .map(|r| r.map(UserId))
    .collect::<rusqlite::Result<Vec<_>>>()?;
  Ok(ids)
}

pub fn load_visit(conn: &Connection, id: VisitId) -> Result<Option<Visit>> {
  let raw = conn
    .query_row(
      &format!("SELECT {VISIT_COLUMNS} FROM visits v WHERE v.visit_id = ?1"),
      params![id.get()],
      RawVisit::from_row,
    )
    .optional()?;
  match raw {
    Some(raw) => Ok(Some(raw.into_visit(load_participants(conn, id)?)?)),
    None => Ok(None),
  }
}

pub fn require_visit(conn: &Connection, id: VisitId) -> Result<Visit> {
  load_visit(conn, id)?.ok_or_else(|| banya_core::Error::VisitNotFound(id).into())
}

pub fn load_detail(conn: &Connection, id: VisitId) -> Result<VisitDetail> {
  let visit = require_visit(conn, id)?;
  let logs = load_point_logs(conn, id)?;
  Ok(VisitDetail::new(visit, logs))
}

/// Persist every column of `visit`, bumping its revision.
pub fn update_visit_row(conn: &Connection, visit: &Visit) -> Result<()> {
  let revision = i64::try_from(visit.revision)
    .map_err(|_| Error::Decode(format!("revision overflow {}", visit.revision)))?;
  conn.execute(
    "UPDATE visits SET
       bath_id = ?2, status = ?3, visited_at = ?4, flag_long = ?5,
       revision = ?6 + 1, updated_at = ?7
     WHERE visit_id = ?1",
    params![
      visit.visit_id.get(),
      visit.bath_id.map(BathId::get),
      visit.status.as_str(),
      encode_dt(visit.visited_at),
      visit.flag_long,
      revision,
      encode_dt(Utc::now()),
    ],
  )?;
  Ok(())
}

pub fn replace_participants(conn: &Connection, id: VisitId, users: &[UserId]) -> Result<()> {
  conn.execute("DELETE FROM visit_participants WHERE visit_id = ?1", params![id.get()])?;
  let mut stmt = conn
    .prepare_cached("INSERT INTO visit_participants (visit_id, user_id) VALUES (?1, ?2)")?;
  for user in users {
    stmt.execute(params![id.get(), user.get()])?;
  }
  Ok(())
}

pub fn set_flag_ultraunique(conn: &Connection, id: VisitId, value: bool) -> Result<()> {
  conn.execute(
    "UPDATE visits SET flag_ultraunique = ?2 WHERE visit_id = ?1",
    params![id.get(), value],
  )?;
  Ok(())
}

/// Ids and revisions of confirmed visits at `bath`.
pub fn confirmed_visits_at(conn: &Connection, bath: BathId) -> Result<Vec<(VisitId, u64)>> {
  let mut stmt = conn.prepare(
    "SELECT visit_id, revision FROM visits WHERE bath_id = ?1 AND status = ?2",
  )?;
  let rows = stmt
    .query_map(params![bath.get(), CONFIRMED], |row| {
      Ok((VisitId(row.get(0)?), row.get::<_, i64>(1)?))
    })?
    .collect::<rusqlite::Result<Vec<_>>>()?;
  rows
    .into_iter()
    .map(|(id, rev)| {
      u64::try_from(rev)
        .map(|rev| (id, rev))
        .map_err(|_| Error::Decode(format!("negative revision {rev}")))
    })
    .collect()
}

pub fn confirmed_visit_ids(conn: &Connection) -> Result<Vec<VisitId>> {
  let mut stmt =
    conn.prepare("SELECT visit_id FROM visits WHERE status = ?1 ORDER BY visited_at, visit_id")?;
  let ids = stmt
    .query_map(params![CONFIRMED], |row| row.get::<_, i64>(0))?
    .map(|r| r.map(VisitId))
    .collect::<rusqlite::Result<Vec<_>>>()?;
  Ok(ids)
}

// ─── Discovery history ───────────────────────────────────────────────────────

/// Confirmed visits of `user` to the region or country of `bath`.
///
/// Only the geographies the scored visit touches are scanned, never the
/// user's whole history.
pub fn participant_history(
  conn: &Connection,
  user: UserId,
  bath: &ResolvedBath,
) -> Result<ParticipantHistory> {
  if bath.region_id.is_none() && bath.country_id.is_none() {
    return Ok(ParticipantHistory::new(user, Vec::new()));
  }
  let mut stmt = conn.prepare_cached(
    "SELECT v.visit_id, v.visited_at, b.region_id, COALESCE(b.country_id, r.country_id) AS cid
     FROM visits v
     JOIN visit_participants p ON p.visit_id = v.visit_id
     JOIN baths b              ON b.bath_id  = v.bath_id
     LEFT JOIN regions r       ON r.region_id = b.region_id
     WHERE p.user_id = ?1
       AND v.status = 'confirmed'
       AND (b.region_id = ?2 OR COALESCE(b.country_id, r.country_id) = ?3)",
  )?;
  let raws = stmt
    .query_map(
      params![
        user.get(),
        bath.region_id.map(RegionId::get),
        bath.country_id.map(CountryId::get),
      ],
      |row| {
        Ok((
          row.get::<_, i64>(0)?,
          row.get::<_, String>(1)?,
          row.get::<_, Option<i64>>(2)?,
          row.get::<_, Option<i64>>(3)?,
        ))
      },
    )?
    .collect::<rusqlite::Result<Vec<_>>>()?;

  let visits = raws
    .into_iter()
    .map(|(id, at, region, country)| {
      Ok(HistoryEntry {
        key:        VisitKey { visited_at: decode_dt(&at)?, visit_id: VisitId(id) },
        region_id:  region.map(RegionId),
        country_id: country.map(CountryId),
      })
    })
    .collect::<Result<Vec<_>>>()?;
  Ok(ParticipantHistory::new(user, visits))
}

/// History and current holders of one discovery scope.
pub fn scope_state(conn: &Connection, scope: DiscoveryScope) -> Result<ScopeState> {
  let (geo_filter, geo_id, reason) = match scope.geo {
    Geo::Region(id) => ("b.region_id = ?2", id.get(), PointReason::NewRegion),
    Geo::Country(id) => (
      "COALESCE(b.country_id, r.country_id) = ?2",
      id.get(),
      PointReason::NewCountry,
    ),
  };

  let history = {
    let mut stmt = conn.prepare_cached(&format!(
      "SELECT v.visit_id, v.visited_at
       FROM visits v
       JOIN visit_participants p ON p.visit_id = v.visit_id
       JOIN baths b              ON b.bath_id  = v.bath_id
       LEFT JOIN regions r       ON r.region_id = b.region_id
       WHERE p.user_id = ?1 AND v.status = 'confirmed' AND {geo_filter}"
    ))?;
    let raws = stmt
      .query_map(params![scope.user_id.get(), geo_id], |row| {
        Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?))
      })?
      .collect::<rusqlite::Result<Vec<_>>>()?;
    raws
      .into_iter()
      .map(|(id, at)| Ok(VisitKey { visited_at: decode_dt(&at)?, visit_id: VisitId(id) }))
      .collect::<Result<Vec<_>>>()?
  };

  let holders = {
    let mut stmt = conn.prepare_cached(&format!(
      "SELECT DISTINCT l.visit_id
       FROM point_logs l
       JOIN visits v        ON v.visit_id = l.visit_id
       JOIN baths b         ON b.bath_id  = v.bath_id
       LEFT JOIN regions r  ON r.region_id = b.region_id
       WHERE l.user_id = ?1 AND l.reason = ?3 AND {geo_filter}"
    ))?;
    stmt
      .query_map(params![scope.user_id.get(), geo_id, reason.as_str()], |row| {
        row.get::<_, i64>(0)
      })?
      .map(|r| r.map(VisitId))
      .collect::<rusqlite::Result<Vec<_>>>()?
  };

  Ok(ScopeState { history, holders })
}

// ─── Point logs ──────────────────────────────────────────────────────────────

pub fn load_point_logs(conn: &Connection, visit: VisitId) -> Result<Vec<PointLog>> {
  let mut stmt = conn.prepare_cached(&format!(
    "SELECT {POINT_LOG_COLUMNS} FROM point_logs WHERE visit_id = ?1 ORDER BY user_id, reason"
  ))?;
  let raws = stmt
    .query_map(params![visit.get()], RawPointLog::from_row)?
    .collect::<rusqlite::Result<Vec<_>>>()?;
  raws.into_iter().map(RawPointLog::into_point_log).collect()
}

pub fn delete_point_logs(conn: &Connection, visit: VisitId) -> Result<usize> {
  Ok(conn.execute("DELETE FROM point_logs WHERE visit_id = ?1", params![visit.get()])?)
}

pub fn insert_point_logs(conn: &Connection, logs: &[PointLog]) -> Result<()> {
  let mut stmt = conn.prepare_cached(&format!(
    "INSERT INTO point_logs ({POINT_LOG_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)"
  ))?;
  for log in logs {
    stmt.execute(params![
      encode_uuid(log.log_id),
      log.visit_id.get(),
      log.user_id.get(),
      log.reason.as_str(),
      log.points,
      encode_uuid(log.batch_id),
      log.config_version,
      encode_dt(log.created_at),
    ])?;
  }
  Ok(())
}

// ─── Configuration ───────────────────────────────────────────────────────────

/// Load snapshot `version`, or the latest when `None`.
pub fn load_config(conn: &Connection, version: Option<u32>) -> Result<PointConfig> {
  let raw = match version {
    Some(v) => conn
      .query_row(
        &format!("SELECT {CONFIG_COLUMNS} FROM point_config WHERE version = ?1"),
        params![v],
        RawConfig::from_row,
      )
      .optional()?
      .ok_or(banya_core::Error::ConfigVersionNotFound(v))?,
    None => conn.query_row(
      &format!("SELECT {CONFIG_COLUMNS} FROM point_config ORDER BY version DESC LIMIT 1"),
      [],
      RawConfig::from_row,
    )?,
  };
  raw.into_config()
}

pub fn insert_config(conn: &Connection, config: &PointConfig) -> Result<()> {
  conn.execute(
    &format!(
      "INSERT OR IGNORE INTO point_config ({CONFIG_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)"
    ),
    params![
      config.version,
      config.base_points,
      config.long_bonus,
      config.region_bonus,
      config.country_bonus,
      config.ultraunique_bonus,
      encode_dt(config.created_at),
    ],
  )?;
  Ok(())
}
