use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch("CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL);")?;

    let version: i64 = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_version",
        [],
        |r| r.get(0),
    )?;

    if version < 1 {
        info!("Running migration v1 (initial schema)");
        conn.execute_batch(
            "
            CREATE TABLE users (
                id              TEXT PRIMARY KEY,
                username        TEXT NOT NULL UNIQUE,
                password        TEXT NOT NULL,
                display_name    TEXT NOT NULL,
                role            TEXT NOT NULL DEFAULT 'employee',
                created_at      TEXT NOT NULL DEFAULT (datetime('now'))
            );

            -- Live editable flow content. Editing happens here; assignments
            -- never read these tables directly.
            CREATE TABLE flows (
                id                  TEXT PRIMARY KEY,
                name                TEXT NOT NULL,
                description         TEXT NOT NULL DEFAULT '',
                created_by          TEXT NOT NULL REFERENCES users(id),
                is_active           INTEGER NOT NULL DEFAULT 1,
                sequential          INTEGER NOT NULL DEFAULT 0,
                allow_self_pause    INTEGER NOT NULL DEFAULT 1,
                created_at          TEXT NOT NULL DEFAULT (datetime('now')),
                updated_at          TEXT NOT NULL DEFAULT (datetime('now'))
            );

            CREATE TABLE flow_steps (
                id          TEXT PRIMARY KEY,
                flow_id     TEXT NOT NULL REFERENCES flows(id) ON DELETE CASCADE,
                title       TEXT NOT NULL,
                description TEXT NOT NULL DEFAULT '',
                rank        TEXT NOT NULL,
                required    INTEGER NOT NULL DEFAULT 1,
                created_at  TEXT NOT NULL DEFAULT (datetime('now')),
                UNIQUE (flow_id, rank)
            );

            CREATE TABLE components (
                id          TEXT PRIMARY KEY,
                step_id     TEXT NOT NULL REFERENCES flow_steps(id) ON DELETE CASCADE,
                title       TEXT NOT NULL,
                rank        TEXT NOT NULL,
                required    INTEGER NOT NULL DEFAULT 1,
                payload     TEXT NOT NULL,
                created_at  TEXT NOT NULL DEFAULT (datetime('now')),
                UNIQUE (step_id, rank)
            );

            -- Publication history. Content fields are copied at creation
            -- and never change; is_active is the only mutable column.
            CREATE TABLE flow_versions (
                id          TEXT PRIMARY KEY,
                original_id TEXT NOT NULL REFERENCES flows(id),
                version     INTEGER NOT NULL,
                name        TEXT NOT NULL,
                description TEXT NOT NULL,
                is_active   INTEGER NOT NULL DEFAULT 0,
                created_at  TEXT NOT NULL DEFAULT (datetime('now')),
                updated_at  TEXT NOT NULL DEFAULT (datetime('now')),
                UNIQUE (original_id, version)
            );

            -- Storage-level backstop for the at-most-one-active invariant.
            CREATE UNIQUE INDEX idx_flow_versions_active
                ON flow_versions(original_id) WHERE is_active = 1;

            -- Snapshots are fully denormalized; no foreign keys into the
            -- live tables, only traceability ids.
            CREATE TABLE flow_snapshots (
                id                  TEXT PRIMARY KEY,
                original_flow_id    TEXT NOT NULL,
                version             INTEGER NOT NULL,
                flow_version        INTEGER,
                name                TEXT NOT NULL,
                description         TEXT NOT NULL,
                sequential          INTEGER NOT NULL,
                allow_self_pause    INTEGER NOT NULL,
                created_at          TEXT NOT NULL DEFAULT (datetime('now')),
                UNIQUE (original_flow_id, version)
            );

            CREATE TABLE step_snapshots (
                id                  TEXT PRIMARY KEY,
                snapshot_id         TEXT NOT NULL REFERENCES flow_snapshots(id) ON DELETE CASCADE,
                original_step_id    TEXT NOT NULL,
                title               TEXT NOT NULL,
                description         TEXT NOT NULL,
                rank                TEXT NOT NULL,
                required            INTEGER NOT NULL
            );

            CREATE INDEX idx_step_snapshots_snapshot
                ON step_snapshots(snapshot_id);

            CREATE TABLE component_snapshots (
                id                      TEXT PRIMARY KEY,
                step_snapshot_id        TEXT NOT NULL REFERENCES step_snapshots(id) ON DELETE CASCADE,
                original_component_id   TEXT NOT NULL,
                title                   TEXT NOT NULL,
                rank                    TEXT NOT NULL,
                required                INTEGER NOT NULL,
                payload                 TEXT NOT NULL
            );

            CREATE INDEX idx_component_snapshots_step
                ON component_snapshots(step_snapshot_id);

            -- snapshot_id intentionally carries no foreign key: a completed
            -- assignment outlives its snapshot once GC prunes it.
            CREATE TABLE assignments (
                id                  TEXT PRIMARY KEY,
                user_id             TEXT NOT NULL REFERENCES users(id),
                flow_id             TEXT NOT NULL REFERENCES flows(id),
                snapshot_id         TEXT NOT NULL,
                buddy_id            TEXT REFERENCES users(id),
                assigned_by         TEXT NOT NULL REFERENCES users(id),
                status              TEXT NOT NULL DEFAULT 'assigned',
                assigned_at         TEXT NOT NULL DEFAULT (datetime('now')),
                started_at          TEXT,
                due_date            TEXT,
                completed_at        TEXT,
                paused_at           TEXT,
                pause_reason        TEXT,
                completion_notes    TEXT,
                final_score         INTEGER,
                overdue_notified    INTEGER NOT NULL DEFAULT 0,
                row_version         INTEGER NOT NULL DEFAULT 0
            );

            CREATE INDEX idx_assignments_user
                ON assignments(user_id, status);
            CREATE INDEX idx_assignments_snapshot
                ON assignments(snapshot_id);

            -- The single source of truth for progress. Step and flow
            -- rollups are computed from these rows, never stored.
            CREATE TABLE component_progress (
                assignment_id           TEXT NOT NULL REFERENCES assignments(id) ON DELETE CASCADE,
                component_snapshot_id   TEXT NOT NULL,
                step_snapshot_id        TEXT NOT NULL,
                is_completed            INTEGER NOT NULL DEFAULT 0,
                attempts_count          INTEGER NOT NULL DEFAULT 0,
                best_score              INTEGER NOT NULL DEFAULT 0,
                last_score              INTEGER NOT NULL DEFAULT 0,
                time_spent_minutes      INTEGER NOT NULL DEFAULT 0,
                completed_at            TEXT,
                PRIMARY KEY (assignment_id, component_snapshot_id)
            );

            CREATE INDEX idx_component_progress_step
                ON component_progress(assignment_id, step_snapshot_id);

            CREATE TABLE notifications (
                id              TEXT PRIMARY KEY,
                user_id         TEXT NOT NULL REFERENCES users(id),
                kind            TEXT NOT NULL,
                message         TEXT NOT NULL,
                assignment_id   TEXT REFERENCES assignments(id),
                is_read         INTEGER NOT NULL DEFAULT 0,
                created_at      TEXT NOT NULL DEFAULT (datetime('now'))
            );

            CREATE INDEX idx_notifications_user
                ON notifications(user_id, created_at);

            CREATE TABLE achievements (
                id          TEXT PRIMARY KEY,
                user_id     TEXT NOT NULL REFERENCES users(id),
                code        TEXT NOT NULL,
                title       TEXT NOT NULL,
                earned_at   TEXT NOT NULL DEFAULT (datetime('now')),
                UNIQUE (user_id, code)
            );

            INSERT INTO schema_version (version) VALUES (1);
            ",
        )?;
    }

    info!("Database migrations complete");
    Ok(())
}
