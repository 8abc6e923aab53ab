//! [`SqliteStore`]: the SQLite implementation of [`VisitStore`].

use std::{collections::BTreeSet, future::Future, path::Path, time::Duration};

use chrono::{DateTime, Utc};
use rusqlite::{params, params_from_iter, types::Value};
use tracing::{debug, info, warn};

use banya_core::{
  aggregate::{self, BathMap, Leaderboard, WeeklyLeaderboard},
  bath::{Bath, Country, NewBath, NewCountry, NewRegion, Region, ResolvedBath},
  config::{PointConfig, PointConfigUpdate},
  ids::{BathId, CountryId, RegionId, UserId, VisitId},
  period::{IsoWeek, Period},
  recompute::{Footprint, affected_scopes},
  store::{RescoreReport, VisitStore},
  user::{NewUser, User, UserFlags},
  visit::{
    NewVisit, Visit, VisitDetail, VisitPatch, VisitQuery, VisitStatus, normalize_participants,
  },
  workflow::{self, Actor, Eligibility},
};

use crate::{
  Error, Result, aggregate as queries,
  encode::{RawVisit, VISIT_COLUMNS, encode_aliases, encode_dt},
  locks::ScopeLocks,
  recompute::{self, Changed},
  schema::SCHEMA,
  sql,
};

/// How long a write waits for its discovery scopes before giving up.
pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(5);

// ─── Store ───────────────────────────────────────────────────────────────────

/// A banya visit store backed by a single SQLite file.
///
/// Cloning is cheap; the connection and the lock table are shared.
#[derive(Clone)]
pub struct SqliteStore {
  conn:         tokio_rusqlite::Connection,
  locks:        ScopeLocks,
  lock_timeout: Duration,
}

/// How much point-log state a visit write disturbs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Rescore {
  Nothing,
  /// Only the visit's own non-discovery rows can change.
  OwnRows,
  /// Discovery ordering may change; rebalance every affected scope.
  Coordinated,
}

struct Plan {
  after:   Visit,
  rescore: Rescore,
}

impl SqliteStore {
  /// Open (or create) a store at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    Self::init(conn).await
  }

  /// Open an in-memory store, useful for testing.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    Self::init(conn).await
  }

  async fn init(conn: tokio_rusqlite::Connection) -> Result<Self> {
    let store = Self { conn, locks: ScopeLocks::new(), lock_timeout: DEFAULT_LOCK_TIMEOUT };
    store.init_schema().await?;
    Ok(store)
  }

  /// Override how long writes wait for contended scopes.
  pub fn with_lock_timeout(mut self, timeout: Duration) -> Self {
    self.lock_timeout = timeout;
    self
  }

  #[cfg(test)]
  pub(crate) fn scope_locks(&self) -> &ScopeLocks { &self.locks }

  async fn init_schema(&self) -> Result<()> {
    self
      .call(|conn| {
        conn.execute_batch(SCHEMA)?;
        sql::insert_config(conn, &PointConfig::initial(Utc::now()))
      })
      .await
  }

  /// Run `op` on the connection thread.
  async fn call<T, F>(&self, op: F) -> Result<T>
  where
    F: FnOnce(&mut rusqlite::Connection) -> Result<T> + Send + 'static,
    T: Send + 'static,
  {
    self.conn.call(move |conn| Ok(op(conn))).await?
  }

  /// Run `attempt`, and once more if it lost a race with another writer.
  async fn retry_once<T, F, Fut>(&self, what: &'static str, mut attempt: F) -> Result<T>
  where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
  {
    match attempt().await {
      Err(e) if e.is_concurrent_modification() => {
        warn!(error = %e, "{what} raced with another write; retrying once");
        attempt().await
      }
      other => other,
    }
  }

  // ── Visit writes ──────────────────────────────────────────────────────

  async fn write_visit<F>(&self, id: VisitId, plan: F) -> Result<VisitDetail>
  where
    F: Fn(&Visit) -> banya_core::Result<Plan> + Send + Sync,
  {
    self.retry_once("visit write", || self.try_write_visit(id, &plan)).await
  }

  /// Plan a write from the stored visit, take the scopes it touches, then
  /// commit it together with its whole recomputation batch.
  async fn try_write_visit<F>(&self, id: VisitId, plan: &F) -> Result<VisitDetail>
  where
    F: Fn(&Visit) -> banya_core::Result<Plan> + Sync,
  {
    let (before, before_bath) = self
      .call(move |conn| {
        let visit = sql::require_visit(conn, id)?;
        let bath = visit.bath_id.map(|b| sql::resolve_bath(conn, b)).transpose()?;
        Ok((visit, bath))
      })
      .await?;

    let Plan { mut after, rescore } = plan(&before)?;

    let bath_id = after.bath_id;
    let participants = after.participants.clone();
    let after_bath = self
      .call(move |conn| {
        sql::ensure_users_exist(conn, &participants)?;
        bath_id.map(|b| sql::resolve_bath(conn, b)).transpose()
      })
      .await?;
    if let Some(bath) = &after_bath {
      after.bath_id = Some(bath.bath_id);
    }

    let before_fp = Footprint::of(&before, before_bath.as_ref());
    let scopes = match rescore {
      Rescore::Coordinated => affected_scopes(
        before_fp.as_ref(),
        Footprint::of(&after, after_bath.as_ref()).as_ref(),
      ),
      Rescore::Nothing | Rescore::OwnRows => BTreeSet::new(),
    };
    let _held = self
      .locks
      .acquire(&scopes, self.lock_timeout)
      .await
      .ok_or(banya_core::Error::ConcurrentModification(id))?;

    let expected = before.revision;
    self
      .call(move |conn| {
        let tx = conn.transaction()?;
        let current = sql::require_visit(&tx, id)?;
        if current.revision != expected {
          return Err(banya_core::Error::ConcurrentModification(id).into());
        }
        // A merge since planning may have turned the bath into an alias.
        if let Some(bath) = after.bath_id
          && sql::canonical_bath_id(&tx, bath)? != bath
        {
          return Err(banya_core::Error::ConcurrentModification(id).into());
        }

        sql::update_visit_row(&tx, &after)?;
        if after.participants != current.participants {
          sql::replace_participants(&tx, id, &after.participants)?;
        }

        let changes = match rescore {
          Rescore::Nothing => Vec::new(),
          Rescore::OwnRows => vec![Changed { visit_id: id, before: None, reorders: false }],
          Rescore::Coordinated => {
            vec![Changed { visit_id: id, before: before_fp, reorders: true }]
          }
        };
        if !changes.is_empty() {
          let config = sql::load_config(&tx, None)?;
          let outcome = recompute::run(&tx, &changes, &config)?;
          debug!(
            visit_id = %id,
            batch_id = %outcome.batch.batch_id,
            rescored = outcome.rescored,
            revised = outcome.revised,
            "visit write rescored"
          );
        }

        let detail = sql::load_detail(&tx, id)?;
        tx.commit()?;
        Ok(detail)
      })
      .await
  }

  async fn try_merge(&self, source: BathId, target: BathId) -> Result<Bath> {
    // Plan: which confirmed visits move, and their footprints either side.
    type Moved = Vec<(VisitId, u64, Option<Footprint>)>;
    let (planned, moved, scopes): (BathId, Moved, BTreeSet<_>) = self
      .call(move |conn| {
        let canonical = sql::check_merge(conn, source, target)?;
        let from = sql::resolve_bath(conn, source)?;
        let to = sql::resolve_bath(conn, canonical)?;

        let mut moved = Vec::new();
        let mut scopes = BTreeSet::new();
        for (visit_id, revision) in sql::confirmed_visits_at(conn, source)? {
          let mut visit = sql::require_visit(conn, visit_id)?;
          let before = Footprint::of(&visit, Some(&from));
          visit.bath_id = Some(canonical);
          let after = Footprint::of(&visit, Some(&to));
          scopes.extend(affected_scopes(before.as_ref(), after.as_ref()));
          moved.push((visit_id, revision, before));
        }
        Ok((canonical, moved, scopes))
      })
      .await?;

    let conflict = banya_core::Error::ConcurrentMerge { source_id: source, target_id: target };
    let _held = self
      .locks
      .acquire(&scopes, self.lock_timeout)
      .await
      .ok_or(conflict)?;

    self
      .call(move |conn| {
        let tx = conn.transaction()?;
        let canonical = sql::check_merge(&tx, source, target)?;
        if canonical != planned {
          let conflict = banya_core::Error::ConcurrentMerge { source_id: source, target_id: target };
          return Err(conflict.into());
        }

        let expected: Vec<(VisitId, u64)> = moved.iter().map(|m| (m.0, m.1)).collect();
        let current = sql::confirmed_visits_at(&tx, source)?;
        if let Some(&(stale, _)) = current
          .iter()
          .chain(&expected)
          .find(|&&v| !(current.contains(&v) && expected.contains(&v)))
        {
          return Err(banya_core::Error::ConcurrentModification(stale).into());
        }

        tx.execute(
          "UPDATE visits SET bath_id = ?2, revision = revision + 1, updated_at = ?3
           WHERE bath_id = ?1",
          params![source.get(), canonical.get(), encode_dt(Utc::now())],
        )?;
        tx.execute(
          "UPDATE baths SET canonical_id = ?2, is_archived = 1 WHERE bath_id = ?1",
          params![source.get(), target.get()],
        )?;

        let changes: Vec<Changed> = moved
          .into_iter()
          .map(|(visit_id, _, before)| Changed { visit_id, before, reorders: true })
          .collect();
        if !changes.is_empty() {
          let config = sql::load_config(&tx, None)?;
          recompute::run(&tx, &changes, &config)?;
        }

        let bath = sql::load_bath(&tx, canonical)?
          .ok_or(banya_core::Error::BathNotFound(canonical))?;
        tx.commit()?;
        info!(%source, %target, %canonical, "merged baths");
        Ok(bath)
      })
      .await
  }
}

fn ensure_country(conn: &rusqlite::Connection, id: Option<CountryId>) -> Result<()> {
  let Some(id) = id else { return Ok(()) };
  let exists = conn
    .prepare_cached("SELECT 1 FROM countries WHERE country_id = ?1")?
    .exists(params![id.get()])?;
  if !exists {
    return Err(banya_core::Error::CountryNotFound(id).into());
  }
  Ok(())
}

fn ensure_region(conn: &rusqlite::Connection, id: Option<RegionId>) -> Result<()> {
  let Some(id) = id else { return Ok(()) };
  let exists = conn
    .prepare_cached("SELECT 1 FROM regions WHERE region_id = ?1")?
    .exists(params![id.get()])?;
  if !exists {
    return Err(banya_core::Error::RegionNotFound(id).into());
  }
  Ok(())
}

// ─── VisitStore impl ─────────────────────────────────────────────────────────

impl VisitStore for SqliteStore {
  type Error = Error;

  // ── Users ─────────────────────────────────────────────────────────────

  async fn upsert_user(&self, input: NewUser) -> Result<User> {
    let id = input.user_id;
    let display_name = input.resolved_display_name();
    let now = encode_dt(Utc::now());
    self
      .call(move |conn| {
        conn.execute(
          "INSERT INTO users (user_id, username, display_name, created_at)
           VALUES (?1, ?2, ?3, ?4)
           ON CONFLICT (user_id) DO UPDATE SET
             username = excluded.username,
             display_name = excluded.display_name",
          params![id.get(), input.username, display_name, now],
        )?;
        sql::load_user(conn, id)?.ok_or_else(|| banya_core::Error::UserNotFound(id).into())
      })
      .await
  }

  async fn get_user(&self, id: UserId) -> Result<Option<User>> {
    self.call(move |conn| sql::load_user(conn, id)).await
  }

  async fn set_user_flags(&self, id: UserId, flags: UserFlags) -> Result<User> {
    self
      .call(move |conn| {
        let changed = conn.execute(
          "UPDATE users SET
             is_admin = COALESCE(?2, is_admin),
             is_active = COALESCE(?3, is_active)
           WHERE user_id = ?1",
          params![id.get(), flags.is_admin, flags.is_active],
        )?;
        if changed == 0 {
          return Err(banya_core::Error::UserNotFound(id).into());
        }
        sql::load_user(conn, id)?.ok_or_else(|| banya_core::Error::UserNotFound(id).into())
      })
      .await
  }

  // ── Reference data ────────────────────────────────────────────────────

  async fn add_country(&self, input: NewCountry) -> Result<Country> {
    self
      .call(move |conn| {
        conn.execute(
          "INSERT INTO countries (name, code) VALUES (?1, ?2)",
          params![input.name, input.code],
        )?;
        Ok(Country {
          country_id: CountryId(conn.last_insert_rowid()),
          name:       input.name,
          code:       input.code,
        })
      })
      .await
  }

  async fn add_region(&self, input: NewRegion) -> Result<Region> {
    self
      .call(move |conn| {
        ensure_country(conn, input.country_id)?;
        conn.execute(
          "INSERT INTO regions (name, country_id) VALUES (?1, ?2)",
          params![input.name, input.country_id.map(CountryId::get)],
        )?;
        Ok(Region {
          region_id:  RegionId(conn.last_insert_rowid()),
          country_id: input.country_id,
          name:       input.name,
        })
      })
      .await
  }

  async fn add_bath(&self, input: NewBath) -> Result<Bath> {
    let aliases = encode_aliases(&input.aliases)?;
    let now = encode_dt(Utc::now());
    self
      .call(move |conn| {
        let loc = &input.location;
        ensure_country(conn, loc.country_id)?;
        ensure_region(conn, loc.region_id)?;
        conn.execute(
          "INSERT INTO baths
             (name, aliases, city, country_id, region_id, lat, lng, ultra_unique, created_at)
           VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
          params![
            input.name,
            aliases,
            loc.city,
            loc.country_id.map(CountryId::get),
            loc.region_id.map(RegionId::get),
            loc.lat,
            loc.lng,
            input.ultra_unique,
            now,
          ],
        )?;
        let id = BathId(conn.last_insert_rowid());
        sql::load_bath(conn, id)?.ok_or_else(|| banya_core::Error::BathNotFound(id).into())
      })
      .await
  }

  async fn get_bath(&self, id: BathId) -> Result<Option<Bath>> {
    self.call(move |conn| sql::load_bath(conn, id)).await
  }

  async fn resolve_bath(&self, id: BathId) -> Result<ResolvedBath> {
    self.call(move |conn| sql::resolve_bath(conn, id)).await
  }

  async fn merge_baths(&self, source: BathId, target: BathId) -> Result<Bath> {
    self.retry_once("bath merge", || self.try_merge(source, target)).await
  }

  // ── Visits ────────────────────────────────────────────────────────────

  async fn create_visit(&self, input: NewVisit) -> Result<VisitDetail> {
    let now = Utc::now();
    let visited_at = encode_dt(input.visited_at.unwrap_or(now));
    let stamp = encode_dt(now);
    let flag_long = input.is_long();
    let participants = normalize_participants(input.participants);
    let (bath_id, created_by) = (input.bath_id, input.created_by);

    self
      .call(move |conn| {
        let tx = conn.transaction()?;
        sql::ensure_users_exist(&tx, &participants)?;
        if let Some(creator) = created_by {
          sql::ensure_users_exist(&tx, &[creator])?;
        }
        let bath = bath_id.map(|b| sql::resolve_bath(&tx, b)).transpose()?;

        tx.execute(
          "INSERT INTO visits
             (bath_id, created_by, status, visited_at, flag_long, flag_ultraunique,
              created_at, updated_at)
           VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7)",
          params![
            bath.map(|b| b.bath_id.get()),
            created_by.map(UserId::get),
            VisitStatus::Draft.as_str(),
            visited_at,
            flag_long,
            bath.is_some_and(|b| b.ultra_unique),
            stamp,
          ],
        )?;
        let id = VisitId(tx.last_insert_rowid());
        sql::replace_participants(&tx, id, &participants)?;

        let detail = sql::load_detail(&tx, id)?;
        tx.commit()?;
        Ok(detail)
      })
      .await
  }

  async fn get_visit(&self, id: VisitId) -> Result<Option<VisitDetail>> {
    self
      .call(move |conn| match sql::load_visit(conn, id)? {
        Some(visit) => Ok(Some(VisitDetail::new(visit, sql::load_point_logs(conn, id)?))),
        None => Ok(None),
      })
      .await
  }

  async fn list_visits<'a>(&'a self, query: &'a VisitQuery) -> Result<Vec<VisitDetail>> {
    let mut sql_text = format!("SELECT {VISIT_COLUMNS} FROM visits v WHERE 1 = 1");
    let mut values: Vec<Value> = Vec::new();

    if let Some(status) = query.status {
      values.push(Value::Text(status.as_str().to_owned()));
      sql_text.push_str(&format!(" AND v.status = ?{}", values.len()));
    }
    if let Some(bath) = query.bath_id {
      values.push(Value::Integer(bath.get()));
      sql_text.push_str(&format!(" AND v.bath_id = ?{}", values.len()));
    }
    if let Some(user) = query.user_id {
      values.push(Value::Integer(user.get()));
      sql_text.push_str(&format!(
        " AND EXISTS (SELECT 1 FROM visit_participants p \
           WHERE p.visit_id = v.visit_id AND p.user_id = ?{})",
        values.len()
      ));
    }
    if let Some(from) = query.date_from {
      values.push(Value::Text(encode_dt(from)));
      sql_text.push_str(&format!(" AND v.visited_at >= ?{}", values.len()));
    }
    if let Some(to) = query.date_to {
      values.push(Value::Text(encode_dt(to)));
      sql_text.push_str(&format!(" AND v.visited_at < ?{}", values.len()));
    }

    let limit = i64::try_from(query.effective_limit()).unwrap_or(i64::MAX);
    let offset = i64::try_from(query.offset.unwrap_or(0)).unwrap_or(i64::MAX);
    values.push(Value::Integer(limit));
    values.push(Value::Integer(offset));
    sql_text.push_str(&format!(
      " ORDER BY v.visited_at DESC, v.visit_id DESC LIMIT ?{} OFFSET ?{}",
      values.len() - 1,
      values.len()
    ));

    self
      .call(move |conn| {
        let raws = {
          let mut stmt = conn.prepare(&sql_text)?;
          stmt
            .query_map(params_from_iter(values), RawVisit::from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?
        };
        raws
          .into_iter()
          .map(|raw| {
            let id = VisitId(raw.visit_id);
            let visit = raw.into_visit(sql::load_participants(conn, id)?)?;
            Ok(VisitDetail::new(visit, sql::load_point_logs(conn, id)?))
          })
          .collect()
      })
      .await
  }

  async fn update_visit(&self, id: VisitId, patch: VisitPatch) -> Result<VisitDetail> {
    self
      .write_visit(id, move |visit| {
        let after = patch.apply(visit);
        let rescore = if !visit.status.is_scoring_eligible() {
          Rescore::Nothing
        } else {
          workflow::check_complete(&after)?;
          if patch.reorders(visit) {
            Rescore::Coordinated
          } else if after.flag_long != visit.flag_long {
            Rescore::OwnRows
          } else {
            Rescore::Nothing
          }
        };
        Ok(Plan { after, rescore })
      })
      .await
  }

  async fn transition(&self, id: VisitId, to: VisitStatus, actor: Actor) -> Result<VisitDetail> {
    let detail = self
      .write_visit(id, move |visit| {
        let rescore = match workflow::check_transition(visit, to, actor)? {
          Eligibility::Enters | Eligibility::Leaves => Rescore::Coordinated,
          Eligibility::Unchanged => Rescore::Nothing,
        };
        let mut after = visit.clone();
        after.status = to;
        Ok(Plan { after, rescore })
      })
      .await?;
    info!(visit_id = %id, status = %to, %actor, "visit transitioned");
    Ok(detail)
  }

  // ── Point configuration ───────────────────────────────────────────────

  async fn current_config(&self) -> Result<PointConfig> {
    self.call(|conn| sql::load_config(conn, None)).await
  }

  async fn update_config(&self, update: PointConfigUpdate) -> Result<PointConfig> {
    let config = self
      .call(move |conn| {
        let tx = conn.transaction()?;
        let current = sql::load_config(&tx, None)?;
        if update.is_empty() {
          return Ok(current);
        }
        let next = current.next(&update, Utc::now())?;
        sql::insert_config(&tx, &next)?;
        tx.commit()?;
        Ok(next)
      })
      .await?;
    info!(version = config.version, "point configuration updated");
    Ok(config)
  }

  async fn rescore_all(&self, version: Option<u32>) -> Result<RescoreReport> {
    self
      .call(move |conn| {
        let tx = conn.transaction()?;
        let config = sql::load_config(&tx, version)?;
        let (batch, visits, rows) = recompute::run_all(&tx, &config)?;
        tx.commit()?;
        Ok(RescoreReport {
          batch_id:       batch.batch_id,
          config_version: batch.config_version,
          visits:         u32::try_from(visits).unwrap_or(u32::MAX),
          point_logs:     u32::try_from(rows).unwrap_or(u32::MAX),
        })
      })
      .await
  }

  // ── Aggregation ───────────────────────────────────────────────────────

  async fn leaderboard(&self, period: Period, reference: DateTime<Utc>) -> Result<Leaderboard> {
    let window = period.window(reference);
    let totals = self.call(move |conn| queries::user_totals(conn, window)).await?;
    Ok(Leaderboard { period, rows: aggregate::rank_leaderboard(totals) })
  }

  async fn bath_map(&self, period: Period, reference: DateTime<Utc>) -> Result<BathMap> {
    let window = period.window(reference);
    let entries = self.call(move |conn| queries::bath_map_entries(conn, window)).await?;
    Ok(BathMap { period, baths: aggregate::sort_bath_map(entries) })
  }

  async fn weekly_visits(&self, week: IsoWeek) -> Result<WeeklyLeaderboard> {
    let window = week.window()?;
    let counts = self.call(move |conn| queries::visit_counts(conn, window)).await?;
    Ok(WeeklyLeaderboard { week, rows: aggregate::rank_visit_counts(counts) })
  }
}
