//! SQLite schema DDL and migration steps for the graph store.

use rusqlite::{params, Connection};

use crate::errors::CpgResult;

/// Current schema version. Migrations run from whatever the database
/// reports up to this value.
pub const SCHEMA_VERSION: i32 = 2;

/// Baseline DDL, safe to replay on an initialised database.
pub const SCHEMA_STATEMENTS: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS schema_meta (
        key TEXT PRIMARY KEY,
        value TEXT
    );",
    "CREATE TABLE IF NOT EXISTS graphs (
        job_id TEXT PRIMARY KEY,
        root TEXT NOT NULL,
        node_count INTEGER NOT NULL,
        edge_count INTEGER NOT NULL,
        files_seen INTEGER NOT NULL,
        created_at TEXT DEFAULT CURRENT_TIMESTAMP
    );",
    "CREATE TABLE IF NOT EXISTS nodes (
        job_id TEXT NOT NULL REFERENCES graphs(job_id) ON DELETE CASCADE,
        position INTEGER NOT NULL,
        id TEXT NOT NULL,
        kind TEXT NOT NULL,
        name TEXT NOT NULL,
        file TEXT NOT NULL,
        language TEXT NOT NULL,
        line_start INTEGER NOT NULL,
        line_end INTEGER NOT NULL,
        loc INTEGER NOT NULL,
        fidelity TEXT NOT NULL,
        payload TEXT NOT NULL,
        PRIMARY KEY (job_id, id)
    );",
    "CREATE TABLE IF NOT EXISTS edges (
        job_id TEXT NOT NULL REFERENCES graphs(job_id) ON DELETE CASCADE,
        position INTEGER NOT NULL,
        source TEXT NOT NULL,
        target TEXT NOT NULL,
        kind TEXT NOT NULL,
        payload TEXT NOT NULL,
        PRIMARY KEY (job_id, source, target, kind)
    );",
    "CREATE TABLE IF NOT EXISTS node_annotations (
        job_id TEXT NOT NULL REFERENCES graphs(job_id) ON DELETE CASCADE,
        node_id TEXT NOT NULL,
        key TEXT NOT NULL,
        value TEXT NOT NULL,
        updated_at TEXT DEFAULT CURRENT_TIMESTAMP,
        PRIMARY KEY (job_id, node_id, key)
    );",
    "CREATE INDEX IF NOT EXISTS idx_nodes_file ON nodes(job_id, file);",
    "CREATE INDEX IF NOT EXISTS idx_nodes_kind ON nodes(job_id, kind);",
    "CREATE INDEX IF NOT EXISTS idx_edges_source ON edges(job_id, source);",
    "CREATE INDEX IF NOT EXISTS idx_edges_target ON edges(job_id, target);",
];

/// Create the baseline tables and run pending migrations.
pub fn init_schema(conn: &Connection) -> CpgResult<()> {
    for statement in SCHEMA_STATEMENTS {
        conn.execute_batch(statement)?;
    }
    migrate_schema(conn)
}

/// Run all pending migrations up to [`SCHEMA_VERSION`]. Each step runs in
/// a savepoint so a failure rolls back only that step.
pub fn migrate_schema(conn: &Connection) -> CpgResult<()> {
    let mut current_version = get_schema_version(conn);

    while current_version < SCHEMA_VERSION {
        let next_version = current_version + 1;
        conn.execute_batch("SAVEPOINT cpg_migrate_step;")?;

        let step_result = (|| -> CpgResult<()> {
            match next_version {
                1 => migrate_to_v1(conn)?,
                2 => migrate_to_v2(conn)?,
                _ => {}
            }
            set_schema_version(conn, next_version)?;
            conn.execute_batch("RELEASE SAVEPOINT cpg_migrate_step;")?;
            Ok(())
        })();

        match step_result {
            Ok(()) => current_version = next_version,
            Err(e) => {
                let _ = conn.execute_batch("ROLLBACK TO SAVEPOINT cpg_migrate_step;");
                let _ = conn.execute_batch("RELEASE SAVEPOINT cpg_migrate_step;");
                return Err(e);
            }
        }
    }

    Ok(())
}

/// Stored schema version, 0 when absent or unparsable.
pub fn get_schema_version(conn: &Connection) -> i32 {
    let result: Result<String, _> = conn.query_row(
        "SELECT value FROM schema_meta WHERE key = 'schema_version';",
        [],
        |row| row.get(0),
    );
    match result {
        Ok(v) => v.parse::<i32>().unwrap_or(0),
        Err(_) => 0,
    }
}

fn set_schema_version(conn: &Connection, version: i32) -> CpgResult<()> {
    conn.execute(
        "INSERT INTO schema_meta(key, value) VALUES('schema_version', ?1) \
         ON CONFLICT(key) DO UPDATE SET value = excluded.value;",
        params![version.to_string()],
    )?;
    Ok(())
}

/// v0 -> v1: baseline, created by [`SCHEMA_STATEMENTS`].
fn migrate_to_v1(_conn: &Connection) -> CpgResult<()> {
    Ok(())
}

/// v1 -> v2: index edges by kind for per-relation queries.
fn migrate_to_v2(conn: &Connection) -> CpgResult<()> {
    conn.execute_batch("CREATE INDEX IF NOT EXISTS idx_edges_kind ON edges(job_id, kind);")?;
    Ok(())
}
