//! Table definitions, applied idempotently on every open.

pub(crate) const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS kills (
    kill_id                 INTEGER PRIMARY KEY,
    kill_time               INTEGER NOT NULL,
    solar_system_id         INTEGER NOT NULL,
    victim_ship_type_id     INTEGER NOT NULL,
    victim_corporation_id   INTEGER,
    victim_alliance_id      INTEGER,
    attacker_count          INTEGER NOT NULL,
    attacker_corporations   TEXT NOT NULL,
    attacker_alliances      TEXT NOT NULL,
    attacker_ships          TEXT NOT NULL,
    final_blow_ship_type_id INTEGER,
    total_value             REAL NOT NULL,
    is_pod_kill             INTEGER NOT NULL,
    hash                    TEXT NOT NULL,
    ingested_at             INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_kills_time ON kills (kill_time, kill_id);
CREATE INDEX IF NOT EXISTS idx_kills_system_time ON kills (solar_system_id, kill_time);

CREATE TABLE IF NOT EXISTS enrichments (
    kill_id     INTEGER PRIMARY KEY REFERENCES kills (kill_id) ON DELETE CASCADE,
    status      TEXT NOT NULL CHECK (status IN ('enriched', 'unfetchable')),
    detail      TEXT,
    reason      TEXT,
    recorded_at INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS enrichment_claims (
    kill_id    INTEGER PRIMARY KEY,
    worker_id  TEXT NOT NULL,
    claimed_at INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS fetch_attempts (
    kill_id         INTEGER PRIMARY KEY REFERENCES kills (kill_id) ON DELETE CASCADE,
    attempts        INTEGER NOT NULL,
    last_attempt_at INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS processed_kills (
    worker_id    TEXT NOT NULL,
    kill_id      INTEGER NOT NULL,
    processed_at INTEGER NOT NULL,
    PRIMARY KEY (worker_id, kill_id)
);

CREATE INDEX IF NOT EXISTS idx_processed_at ON processed_kills (processed_at);

CREATE TABLE IF NOT EXISTS worker_checkpoints (
    worker_id            TEXT PRIMARY KEY,
    last_processed_time  INTEGER,
    last_poll_time       INTEGER,
    consecutive_failures INTEGER NOT NULL DEFAULT 0
);
"#;
