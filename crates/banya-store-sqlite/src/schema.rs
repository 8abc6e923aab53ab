//! SQL schema for the banya SQLite store.
//!
//! Executed once at connection startup. Future migrations will be gated on
//! `PRAGMA user_version`.

/// Full schema DDL; idempotent thanks to `CREATE TABLE IF NOT EXISTS`.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;

CREATE TABLE IF NOT EXISTS users (
    user_id      INTEGER PRIMARY KEY,          -- external (Telegram) id
    username     TEXT,
    display_name TEXT    NOT NULL,
    is_admin     INTEGER NOT NULL DEFAULT 0,
    is_active    INTEGER NOT NULL DEFAULT 1,
    points       REAL    NOT NULL DEFAULT 0,   -- derived from point_logs
    visit_count  INTEGER NOT NULL DEFAULT 0,   -- derived from confirmed visits
    created_at   TEXT    NOT NULL
);

CREATE TABLE IF NOT EXISTS countries (
    country_id INTEGER PRIMARY KEY AUTOINCREMENT,
    name       TEXT NOT NULL UNIQUE,
    code       TEXT
);

CREATE TABLE IF NOT EXISTS regions (
    region_id  INTEGER PRIMARY KEY AUTOINCREMENT,
    country_id INTEGER REFERENCES countries(country_id),
    name       TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS baths (
    bath_id      INTEGER PRIMARY KEY AUTOINCREMENT,
    name         TEXT    NOT NULL,
    aliases      TEXT    NOT NULL DEFAULT '[]',  -- JSON array of strings
    city         TEXT,
    country_id   INTEGER REFERENCES countries(country_id),
    region_id    INTEGER REFERENCES regions(region_id),
    lat          REAL,
    lng          REAL,
    canonical_id INTEGER REFERENCES baths(bath_id),
    is_archived  INTEGER NOT NULL DEFAULT 0,
    ultra_unique INTEGER NOT NULL DEFAULT 0,
    created_at   TEXT    NOT NULL,
    CHECK (canonical_id IS NULL OR canonical_id != bath_id)
);

-- Visits reference canonical baths only; aliases are resolved on write.
CREATE TABLE IF NOT EXISTS visits (
    visit_id         INTEGER PRIMARY KEY AUTOINCREMENT,
    bath_id          INTEGER REFERENCES baths(bath_id),
    created_by       INTEGER REFERENCES users(user_id),
    status           TEXT    NOT NULL DEFAULT 'draft'
                     CHECK (status IN ('draft', 'pending', 'confirmed', 'disputed', 'cancelled')),
    visited_at       TEXT    NOT NULL,   -- fixed-width RFC 3339, sortable as text
    flag_long        INTEGER NOT NULL DEFAULT 0,
    flag_ultraunique INTEGER NOT NULL DEFAULT 0,
    revision         INTEGER NOT NULL DEFAULT 1,
    created_at       TEXT    NOT NULL,
    updated_at       TEXT    NOT NULL
);

CREATE TABLE IF NOT EXISTS visit_participants (
    visit_id INTEGER NOT NULL REFERENCES visits(visit_id) ON DELETE CASCADE,
    user_id  INTEGER NOT NULL REFERENCES users(user_id),
    PRIMARY KEY (visit_id, user_id)
);

-- Append-only configuration snapshots.
CREATE TABLE IF NOT EXISTS point_config (
    version           INTEGER PRIMARY KEY,
    base_points       REAL NOT NULL CHECK (base_points >= 0),
    long_bonus        REAL NOT NULL CHECK (long_bonus >= 0),
    region_bonus      REAL NOT NULL CHECK (region_bonus >= 0),
    country_bonus     REAL NOT NULL CHECK (country_bonus >= 0),
    ultraunique_bonus REAL NOT NULL CHECK (ultraunique_bonus >= 0),
    created_at        TEXT NOT NULL
);

-- Rows are never updated. A visit's full set is deleted and re-inserted
-- inside one transaction when it is rescored.
CREATE TABLE IF NOT EXISTS point_logs (
    log_id         TEXT    PRIMARY KEY,
    visit_id       INTEGER NOT NULL REFERENCES visits(visit_id) ON DELETE CASCADE,
    user_id        INTEGER NOT NULL REFERENCES users(user_id),
    reason         TEXT    NOT NULL
                   CHECK (reason IN ('base', 'long', 'ultraunique', 'new_region', 'new_country')),
    points         REAL    NOT NULL CHECK (points >= 0),
    batch_id       TEXT    NOT NULL,
    config_version INTEGER NOT NULL REFERENCES point_config(version),
    created_at     TEXT    NOT NULL,
    UNIQUE (visit_id, user_id, reason)
);

CREATE INDEX IF NOT EXISTS visits_status_date_idx  ON visits(status, visited_at);
CREATE INDEX IF NOT EXISTS visits_bath_idx         ON visits(bath_id);
CREATE INDEX IF NOT EXISTS participants_user_idx   ON visit_participants(user_id);
CREATE INDEX IF NOT EXISTS baths_region_idx        ON baths(region_id);
CREATE INDEX IF NOT EXISTS baths_country_idx       ON baths(country_id);
CREATE INDEX IF NOT EXISTS point_logs_visit_idx    ON point_logs(visit_id);
CREATE INDEX IF NOT EXISTS point_logs_user_idx     ON point_logs(user_id, reason);

PRAGMA user_version = 1;
";
