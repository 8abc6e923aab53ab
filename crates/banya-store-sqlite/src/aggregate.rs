//! Aggregation queries.
//!
//! Totals are grouped straight from `visits`, `visit_participants` and
//! `point_logs`; the denormalised columns on `users` are never read here.
//! Ranking and ordering happen in `banya_core::aggregate`.

use std::collections::BTreeMap;

use banya_core::{
  aggregate::{BathMapEntry, UserTotals, VisitorCount},
  ids::{BathId, UserId},
  period::Window,
};
use rusqlite::{Connection, params};

use crate::{Result, encode::encode_dt};

/// Confirmed visits inside the window bound to `?1` (start) and `?2` (end).
const WINDOWED: &str = "
  SELECT v.visit_id, v.bath_id
  FROM visits v
  WHERE v.status = 'confirmed'
    AND (?1 IS NULL OR v.visited_at >= ?1)
    AND (?2 IS NULL OR v.visited_at <  ?2)";

fn bounds(window: Window) -> (Option<String>, Option<String>) {
  (window.start.map(encode_dt), window.end.map(encode_dt))
}

/// Per-user point sums over rows of confirmed visits in `window`.
///
/// Every user owning a row in the window appears, active or not, so the row
/// totals always add up to the points logged in the window.
pub fn user_totals(conn: &Connection, window: Window) -> Result<Vec<UserTotals>> {
  let (start, end) = bounds(window);
  let mut stmt = conn.prepare_cached(&format!(
    "WITH windowed AS ({WINDOWED}),
     pts AS (
       SELECT l.user_id, SUM(l.points) AS points
       FROM point_logs l JOIN windowed w ON w.visit_id = l.visit_id
       GROUP BY l.user_id
     ),
     cnt AS (
       SELECT p.user_id,
              COUNT(DISTINCT p.visit_id) AS visits,
              COUNT(DISTINCT w.bath_id)  AS baths
       FROM visit_participants p JOIN windowed w ON w.visit_id = p.visit_id
       GROUP BY p.user_id
     )
     SELECT u.user_id, u.display_name, u.username, pts.points,
            COALESCE(cnt.visits, 0), COALESCE(cnt.baths, 0)
     FROM pts
     JOIN users u    ON u.user_id = pts.user_id
     LEFT JOIN cnt   ON cnt.user_id = pts.user_id"
  ))?;
  let rows = stmt
    .query_map(params![start, end], |row| {
      Ok(UserTotals {
        user_id:      UserId(row.get(0)?),
        display_name: row.get(1)?,
        username:     row.get(2)?,
        points:       row.get(3)?,
        visit_count:  row.get(4)?,
        bath_count:   row.get(5)?,
      })
    })?
    .collect::<rusqlite::Result<Vec<_>>>()?;
  Ok(rows)
}

/// Confirmed visits per bath in `window`, with per-visitor counts.
pub fn bath_map_entries(conn: &Connection, window: Window) -> Result<Vec<BathMapEntry>> {
  let (start, end) = bounds(window);

  let mut entries: BTreeMap<BathId, BathMapEntry> = {
    let mut stmt = conn.prepare_cached(&format!(
      "WITH windowed AS ({WINDOWED})
       SELECT b.bath_id, b.name, b.city, b.lat, b.lng, COUNT(*)
       FROM windowed w JOIN baths b ON b.bath_id = w.bath_id
       GROUP BY b.bath_id"
    ))?;
    stmt
      .query_map(params![start, end], |row| {
        let entry = BathMapEntry {
          bath_id:     BathId(row.get(0)?),
          name:        row.get(1)?,
          city:        row.get(2)?,
          lat:         row.get(3)?,
          lng:         row.get(4)?,
          visit_count: row.get(5)?,
          visitors:    Vec::new(),
        };
        Ok((entry.bath_id, entry))
      })?
      .collect::<rusqlite::Result<_>>()?
  };

  let mut stmt = conn.prepare_cached(&format!(
    "WITH windowed AS ({WINDOWED})
     SELECT w.bath_id, p.user_id, u.display_name, COUNT(*)
     FROM windowed w
     JOIN visit_participants p ON p.visit_id = w.visit_id
     JOIN users u              ON u.user_id  = p.user_id
     GROUP BY w.bath_id, p.user_id"
  ))?;
  let visitors = stmt
    .query_map(params![start, end], |row| {
      Ok((
        BathId(row.get(0)?),
        VisitorCount {
          user_id:      UserId(row.get(1)?),
          display_name: row.get(2)?,
          visit_count:  row.get(3)?,
        },
      ))
    })?
    .collect::<rusqlite::Result<Vec<_>>>()?;
  for (bath_id, visitor) in visitors {
    if let Some(entry) = entries.get_mut(&bath_id) {
      entry.visitors.push(visitor);
    }
  }

  Ok(entries.into_values().collect())
}

/// Distinct confirmed visits per participant in `window`.
pub fn visit_counts(conn: &Connection, window: Window) -> Result<Vec<(UserId, String, u32)>> {
  let (start, end) = bounds(window);
  let mut stmt = conn.prepare_cached(&format!(
    "WITH windowed AS ({WINDOWED})
     SELECT p.user_id, u.display_name, COUNT(DISTINCT w.visit_id)
     FROM windowed w
     JOIN visit_participants p ON p.visit_id = w.visit_id
     JOIN users u              ON u.user_id  = p.user_id
     GROUP BY p.user_id"
  ))?;
  let rows = stmt
    .query_map(params![start, end], |row| {
      Ok((UserId(row.get(0)?), row.get(1)?, row.get(2)?))
    })?
    .collect::<rusqlite::Result<Vec<_>>>()?;
  Ok(rows)
}
