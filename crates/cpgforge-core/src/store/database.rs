//! SQLite persistence of built graphs and their annotations.
//!
//! Each public method opens its own connection, so a `GraphStore` is just a
//! path and can be shared freely between threads.

use std::path::{Path, PathBuf};

use rusqlite::{params, Connection, OptionalExtension};
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{debug, info};

use crate::annotations::Annotations;
use crate::errors::{CpgError, CpgResult};
use crate::graph::Graph;
use crate::models::{Edge, Node};
use crate::store::schema;

/// Expand a leading `~` to the user's home directory.
fn expand_tilde(path: &Path) -> PathBuf {
    let text = path.to_string_lossy();
    if text == "~" || text.starts_with("~/") {
        if let Some(home) = std::env::var_os("HOME") {
            let mut expanded = PathBuf::from(home);
            if text.len() > 2 {
                expanded.push(&text[2..]);
            }
            return expanded;
        }
    }
    path.to_path_buf()
}

/// One stored graph, without its contents.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct JobSummary {
    pub job_id: String,
    pub root: String,
    pub node_count: usize,
    pub edge_count: usize,
    pub files_seen: usize,
    pub created_at: String,
}

#[derive(Clone, Debug)]
pub struct GraphStore {
    db_path: PathBuf,
}

impl GraphStore {
    /// Open (creating if needed) the store at `db_path`. Parent directories
    /// are created and the schema is brought up to date.
    pub fn open(db_path: impl AsRef<Path>) -> CpgResult<Self> {
        let expanded = expand_tilde(db_path.as_ref());
        let resolved = if expanded.is_absolute() {
            expanded
        } else {
            std::env::current_dir()?.join(expanded)
        };
        if let Some(parent) = resolved.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let store = Self { db_path: resolved };
        let conn = store.connect()?;
        schema::init_schema(&conn)?;
        Ok(store)
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    fn connect(&self) -> CpgResult<Connection> {
        let conn = Connection::open(&self.db_path)?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        Ok(conn)
    }

    /// Store `graph` under `job_id`, replacing any graph (and annotations)
    /// previously stored under it. All or nothing.
    pub fn save_graph(&self, job_id: &str, root: &str, graph: &Graph, files_seen: usize) -> CpgResult<()> {
        graph.validate()?;
        let mut conn = self.connect()?;
        let tx = conn.transaction()?;

        tx.execute("DELETE FROM graphs WHERE job_id = ?1;", params![job_id])?;
        tx.execute(
            "INSERT INTO graphs(job_id, root, node_count, edge_count, files_seen) \
             VALUES (?1, ?2, ?3, ?4, ?5);",
            params![
                job_id,
                root,
                graph.node_count() as i64,
                graph.edge_count() as i64,
                files_seen as i64
            ],
        )?;

        {
            let mut insert_node = tx.prepare(
                "INSERT INTO nodes(job_id, position, id, kind, name, file, language, \
                     line_start, line_end, loc, fidelity, payload) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12);",
            )?;
            for (position, node) in graph.nodes.iter().enumerate() {
                insert_node.execute(params![
                    job_id,
                    position as i64,
                    node.id,
                    node.kind.as_str(),
                    node.name,
                    node.file,
                    node.language,
                    node.line_start,
                    node.line_end,
                    node.loc,
                    node.fidelity.as_str(),
                    serde_json::to_string(node)?,
                ])?;
            }

            let mut insert_edge = tx.prepare(
                "INSERT INTO edges(job_id, position, source, target, kind, payload) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6);",
            )?;
            for (position, edge) in graph.edges.iter().enumerate() {
                insert_edge.execute(params![
                    job_id,
                    position as i64,
                    edge.source,
                    edge.target,
                    edge.kind.as_str(),
                    serde_json::to_string(edge)?,
                ])?;
            }
        }

        tx.commit()?;
        info!(
            "Saved graph {job_id} ({} nodes, {} edges)",
            graph.node_count(),
            graph.edge_count()
        );
        Ok(())
    }

    /// Load the graph stored under `job_id`, in its saved order.
    pub fn load_graph(&self, job_id: &str) -> CpgResult<Option<Graph>> {
        let conn = self.connect()?;
        let exists = conn
            .query_row(
                "SELECT 1 FROM graphs WHERE job_id = ?1;",
                params![job_id],
                |row| row.get::<_, i64>(0),
            )
            .optional()?
            .is_some();
        if !exists {
            return Ok(None);
        }

        let mut stmt = conn.prepare("SELECT payload FROM nodes WHERE job_id = ?1 ORDER BY position;")?;
        let payloads = stmt
            .query_map(params![job_id], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        let nodes = payloads
            .iter()
            .map(|p| serde_json::from_str::<Node>(p))
            .collect::<Result<Vec<_>, _>>()?;

        let mut stmt = conn.prepare("SELECT payload FROM edges WHERE job_id = ?1 ORDER BY position;")?;
        let payloads = stmt
            .query_map(params![job_id], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        let edges = payloads
            .iter()
            .map(|p| serde_json::from_str::<Edge>(p))
            .collect::<Result<Vec<_>, _>>()?;

        let graph = Graph::assemble(nodes, edges);
        graph.validate()?;
        debug!("Loaded graph {job_id} with {} nodes", graph.node_count());
        Ok(Some(graph))
    }

    /// Patch the annotation fields of one node. Content is stored as given.
    pub fn annotate(&self, job_id: &str, node_id: &str, fields: &Map<String, Value>) -> CpgResult<()> {
        let mut conn = self.connect()?;
        let tx = conn.transaction()?;
        let known: Option<i64> = tx
            .query_row(
                "SELECT 1 FROM graphs WHERE job_id = ?1;",
                params![job_id],
                |row| row.get(0),
            )
            .optional()?;
        if known.is_none() {
            return Err(CpgError::InvalidGraph(format!("no graph stored for job {job_id}")));
        }
        for (key, value) in fields {
            tx.execute(
                "INSERT INTO node_annotations(job_id, node_id, key, value) VALUES (?1, ?2, ?3, ?4) \
                 ON CONFLICT(job_id, node_id, key) DO UPDATE SET \
                     value = excluded.value, updated_at = CURRENT_TIMESTAMP;",
                params![job_id, node_id, key, serde_json::to_string(value)?],
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    /// Annotations of a job, in first-annotated order.
    pub fn load_annotations(&self, job_id: &str) -> CpgResult<Annotations> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare(
            "SELECT node_id, key, value FROM node_annotations WHERE job_id = ?1 ORDER BY rowid;",
        )?;
        let rows = stmt
            .query_map(params![job_id], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        let mut annotations = Annotations::new();
        for (node_id, key, raw) in rows {
            let mut fields = Map::new();
            fields.insert(key, serde_json::from_str(&raw)?);
            annotations.annotate(node_id, fields);
        }
        Ok(annotations)
    }

    pub fn list_jobs(&self) -> CpgResult<Vec<JobSummary>> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare(
            "SELECT job_id, root, node_count, edge_count, files_seen, COALESCE(created_at, '') \
             FROM graphs ORDER BY created_at, job_id;",
        )?;
        let jobs = stmt
            .query_map([], |row| {
                Ok(JobSummary {
                    job_id: row.get(0)?,
                    root: row.get(1)?,
                    node_count: row.get::<_, i64>(2)? as usize,
                    edge_count: row.get::<_, i64>(3)? as usize,
                    files_seen: row.get::<_, i64>(4)? as usize,
                    created_at: row.get(5)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(jobs)
    }

    /// Remove a job with its nodes, edges and annotations. Returns whether
    /// anything was stored under `job_id`.
    pub fn delete_graph(&self, job_id: &str) -> CpgResult<bool> {
        let conn = self.connect()?;
        let deleted = conn.execute("DELETE FROM graphs WHERE job_id = ?1;", params![job_id])?;
        Ok(deleted > 0)
    }
}
