//! Read models for leaderboards and the bath map, and the ranking rules that
//! order them. The store supplies grouped totals; ranking happens here.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use crate::{
  ids::{BathId, UserId},
  period::{IsoWeek, Period},
  scoring::display_points,
};

// ─── Points leaderboard ──────────────────────────────────────────────────────

/// One user's totals inside a window, before ranking.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserTotals {
  pub user_id:      UserId,
  pub display_name: String,
  pub username:     Option<String>,
  pub points:       f64,
  pub visit_count:  u32,
  pub bath_count:   u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeaderboardRow {
  pub rank:           u32,
  pub user_id:        UserId,
  pub display_name:   String,
  pub username:       Option<String>,
  /// Full precision.
  pub points:         f64,
  /// `points` rounded for display.
  pub display_points: i64,
  pub visit_count:    u32,
  pub bath_count:     u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Leaderboard {
  pub period: Period,
  pub rows:   Vec<LeaderboardRow>,
}

impl Leaderboard {
  pub fn total_points(&self) -> f64 { self.rows.iter().map(|r| r.points).sum() }
}

/// Points descending, ties by ascending user id.
fn by_points(a: &UserTotals, b: &UserTotals) -> Ordering {
  b.points
    .total_cmp(&a.points)
    .then_with(|| a.user_id.cmp(&b.user_id))
}

pub fn rank_leaderboard(mut totals: Vec<UserTotals>) -> Vec<LeaderboardRow> {
  totals.sort_by(by_points);
  totals
    .into_iter()
    .zip(1..)
    .map(|(t, rank)| LeaderboardRow {
      rank,
      user_id: t.user_id,
      display_name: t.display_name,
      username: t.username,
      display_points: display_points(t.points),
      points: t.points,
      visit_count: t.visit_count,
      bath_count: t.bath_count,
    })
    .collect()
}

// ─── Weekly visit leaderboard ────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VisitCountRow {
  pub rank:         u32,
  pub user_id:      UserId,
  pub display_name: String,
  pub visit_count:  u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WeeklyLeaderboard {
  pub week: IsoWeek,
  pub rows: Vec<VisitCountRow>,
}

/// Visit count descending, ties by ascending user id. Ranks are sequential.
pub fn rank_visit_counts(mut rows: Vec<(UserId, String, u32)>) -> Vec<VisitCountRow> {
  rows.sort_by(|a, b| b.2.cmp(&a.2).then_with(|| a.0.cmp(&b.0)));
  rows
    .into_iter()
    .zip(1..)
    .map(|((user_id, display_name, visit_count), rank)| VisitCountRow {
      rank,
      user_id,
      display_name,
      visit_count,
    })
    .collect()
}

// ─── Bath map ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VisitorCount {
  pub user_id:      UserId,
  pub display_name: String,
  pub visit_count:  u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BathMapEntry {
  pub bath_id:     BathId,
  pub name:        String,
  pub city:        Option<String>,
  pub lat:         Option<f64>,
  pub lng:         Option<f64>,
  /// Distinct visits to this bath in the window.
  pub visit_count: u32,
  pub visitors:    Vec<VisitorCount>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BathMap {
  pub period: Period,
  pub baths:  Vec<BathMapEntry>,
}

/// Sort visitors (count desc, user id asc) inside each entry, then entries
/// (visit count desc, bath id asc).
pub fn sort_bath_map(mut entries: Vec<BathMapEntry>) -> Vec<BathMapEntry> {
  for entry in &mut entries {
    entry.visitors.sort_by(|a, b| {
      b.visit_count
        .cmp(&a.visit_count)
        .then_with(|| a.user_id.cmp(&b.user_id))
    });
  }
  entries.sort_by(|a, b| {
    b.visit_count
      .cmp(&a.visit_count)
      .then_with(|| a.bath_id.cmp(&b.bath_id))
  });
  entries
}

#[cfg(test)]
mod tests {
  use super::*;

  fn totals(user: i64, points: f64) -> UserTotals {
    UserTotals {
      user_id:      UserId(user),
      display_name: format!("user {user}"),
      username:     None,
      points,
      visit_count:  1,
      bath_count:   1,
    }
  }

  #[test]
  fn ranks_by_points_then_user_id() {
    let rows = rank_leaderboard(vec![totals(3, 2.0), totals(2, 5.0), totals(1, 2.0)]);
    let order: Vec<_> = rows.iter().map(|r| (r.rank, r.user_id.get())).collect();
    assert_eq!(order, vec![(1, 2), (2, 1), (3, 3)]);
  }

  #[test]
  fn display_points_are_rounded() {
    let rows = rank_leaderboard(vec![totals(1, 2.6)]);
    assert_eq!(rows[0].points, 2.6);
    assert_eq!(rows[0].display_points, 3);
  }

  #[test]
  fn visit_counts_rank_with_tiebreak() {
    let rows = rank_visit_counts(vec![
      (UserId(5), "e".into(), 2),
      (UserId(1), "a".into(), 2),
      (UserId(3), "c".into(), 4),
    ]);
    let order: Vec<_> = rows.iter().map(|r| r.user_id.get()).collect();
    assert_eq!(order, vec![3, 1, 5]);
  }

  #[test]
  fn bath_map_sorts_entries_and_visitors() {
    let visitor = |user: i64, count: u32| VisitorCount {
      user_id:      UserId(user),
      display_name: String::new(),
      visit_count:  count,
    };
    let entry = |bath: i64, count: u32, visitors| BathMapEntry {
      bath_id: BathId(bath),
      name: String::new(),
      city: None,
      lat: None,
      lng: None,
      visit_count: count,
      visitors,
    };
    let sorted = sort_bath_map(vec![
      entry(2, 1, vec![visitor(1, 1)]),
      entry(1, 3, vec![visitor(4, 1), visitor(2, 3)]),
    ]);
    assert_eq!(sorted[0].bath_id, BathId(1));
    assert_eq!(sorted[0].visitors[0].user_id, UserId(2));
  }
}
