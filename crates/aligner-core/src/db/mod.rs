//! SQLite persistence for the permanent tier: decisions, gaps, gap details.
//!
//! Entity sets are stored as JSON arrays in TEXT columns; reads are
//! tolerant of malformed JSON and unknown enum labels (they fall back to
//! defaults rather than failing the row).

use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Mutex;

use rusqlite::{params, Connection, OptionalExtension};

use crate::error::{Error, Result};
use crate::types::{
    Decision, DecisionFilter, DecisionType, Gap, GapDetail, GapDetailPayload, GapFilter,
    GapSeverity, GapStatus, NewDecision, NewGap,
};

const SCHEMA: &str = include_str!("schema.sql");

const GAP_COLUMNS: &str = "id, assignee_id, decision_id, context_key, description, \
                           recommendation, severity, status, priority, created_at";

/// Database connection wrapper.
///
/// Thread-safe via internal Mutex. All database operations acquire the lock.
pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    /// Open database at specific path and apply the schema.
    pub fn open_path(path: &Path) -> Result<Self> {
        let conn = Connection::open(path).map_err(Error::Database)?;
        Self::init(conn)
    }

    /// Open an in-memory database (tests, ephemeral deployments).
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(Error::Database)?;
        Self::init(conn)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.execute_batch("PRAGMA foreign_keys = ON")?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Check database connectivity
    pub fn ping(&self) -> Result<()> {
        let conn = self.conn.lock().map_err(|_| Error::LockPoisoned)?;
        conn.execute_batch("SELECT 1").map_err(Error::Database)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Decision Operations
    // ─────────────────────────────────────────────────────────────────────────

    /// Persist a decision. Idempotent on `source_message_id`: reprocessing
    /// the same message returns the existing decision's id.
    pub fn create_decision(&self, decision: &NewDecision) -> Result<String> {
        if let Some(existing) = self.decision_for_message(&decision.source_message_id)? {
            return Ok(existing.id);
        }

        let conn = self.conn.lock().map_err(|_| Error::LockPoisoned)?;
        let id = uuid::Uuid::new_v4().to_string();

        let inserted = conn.execute(
            "INSERT INTO decision
             (id, author_id, decision_type, text, affected_components, referenced_reqs,
              source_message_id, channel_id, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                id,
                decision.author_id,
                decision.decision_type.as_str(),
                decision.text,
                serde_json::to_string(&decision.affected_components)?,
                serde_json::to_string(&decision.referenced_reqs)?,
                decision.source_message_id,
                decision.channel_id,
                decision.created_at,
            ],
        );

        match inserted {
            Ok(_) => Ok(id),
            Err(e) => {
                // Lost a race on source_message_id; the winner's row is ours
                let err = Error::Database(e);
                if err.is_constraint_violation() {
                    drop(conn);
                    self.decision_for_message(&decision.source_message_id)?
                        .map(|d| d.id)
                        .ok_or(err)
                } else {
                    Err(err)
                }
            }
        }
    }

    /// Get decision by ID
    pub fn get_decision(&self, decision_id: &str) -> Result<Option<Decision>> {
        let conn = self.conn.lock().map_err(|_| Error::LockPoisoned)?;
        let mut stmt = conn.prepare(
            "SELECT id, author_id, decision_type, text, affected_components, referenced_reqs,
                    source_message_id, channel_id, created_at
             FROM decision WHERE id = ?1",
        )?;

        Ok(stmt
            .query_row(params![decision_id], Self::map_decision)
            .optional()?)
    }

    /// Get the decision extracted from a given message, if any
    pub fn decision_for_message(&self, message_id: &str) -> Result<Option<Decision>> {
        let conn = self.conn.lock().map_err(|_| Error::LockPoisoned)?;
        let mut stmt = conn.prepare(
            "SELECT id, author_id, decision_type, text, affected_components, referenced_reqs,
                    source_message_id, channel_id, created_at
             FROM decision WHERE source_message_id = ?1",
        )?;

        Ok(stmt
            .query_row(params![message_id], Self::map_decision)
            .optional()?)
    }

    /// List decisions, newest first. Component filtering happens after the
    /// query since components live in a JSON column.
    pub fn list_decisions(&self, filter: &DecisionFilter) -> Result<Vec<Decision>> {
        let conn = self.conn.lock().map_err(|_| Error::LockPoisoned)?;
        let decisions = if let Some(author) = &filter.author_id {
            let mut stmt = conn.prepare(
                "SELECT id, author_id, decision_type, text, affected_components, referenced_reqs,
                        source_message_id, channel_id, created_at
                 FROM decision WHERE author_id = ?1 ORDER BY created_at DESC",
            )?;
            stmt.query_map(params![author], Self::map_decision)?
                .collect::<std::result::Result<Vec<_>, _>>()?
        } else {
            let mut stmt = conn.prepare(
                "SELECT id, author_id, decision_type, text, affected_components, referenced_reqs,
                        source_message_id, channel_id, created_at
                 FROM decision ORDER BY created_at DESC",
            )?;
            stmt.query_map([], Self::map_decision)?
                .collect::<std::result::Result<Vec<_>, _>>()?
        };

        let mut decisions: Vec<Decision> = decisions
            .into_iter()
            .filter(|d| {
                filter
                    .component
                    .as_ref()
                    .is_none_or(|c| d.affected_components.contains(c))
            })
            .collect();

        if let Some(limit) = filter.limit {
            decisions.truncate(limit);
        }
        Ok(decisions)
    }

    fn map_decision(row: &rusqlite::Row) -> rusqlite::Result<Decision> {
        let decision_type: String = row.get(2)?;
        let components: String = row.get(4)?;
        let reqs: String = row.get(5)?;
        Ok(Decision {
            id: row.get(0)?,
            author_id: row.get(1)?,
            decision_type: DecisionType::parse(&decision_type).unwrap_or(DecisionType::Other),
            text: row.get(3)?,
            affected_components: serde_json::from_str(&components).unwrap_or_default(),
            referenced_reqs: serde_json::from_str(&reqs).unwrap_or_default(),
            source_message_id: row.get(6)?,
            channel_id: row.get(7)?,
            created_at: row.get(8)?,
        })
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Gap Operations
    // ─────────────────────────────────────────────────────────────────────────

    /// Persist a gap with the next priority slot. Surfaces the constraint
    /// violation on a duplicate (assignee_id, context_key); the caller
    /// decides whether that means "reuse the existing gap".
    pub fn create_gap(&self, gap: &NewGap) -> Result<String> {
        let conn = self.conn.lock().map_err(|_| Error::LockPoisoned)?;
        let id = uuid::Uuid::new_v4().to_string();
        let now = chrono::Utc::now().timestamp_millis();

        // Append at the end of the priority order
        let max_priority: i32 = conn.query_row(
            "SELECT COALESCE(MAX(priority), 0) FROM gap",
            [],
            |row| row.get(0),
        )?;

        conn.execute(
            "INSERT INTO gap
             (id, assignee_id, decision_id, context_key, description, recommendation,
              severity, status, priority, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 'open', ?8, ?9)",
            params![
                id,
                gap.assignee_id,
                gap.decision_id,
                gap.context_key,
                gap.description,
                gap.recommendation,
                gap.severity.as_str(),
                max_priority + 1,
                now,
            ],
        )?;

        Ok(id)
    }

    /// Get gap by ID
    pub fn get_gap(&self, gap_id: &str) -> Result<Option<Gap>> {
        let conn = self.conn.lock().map_err(|_| Error::LockPoisoned)?;
        let mut stmt =
            conn.prepare(&format!("SELECT {GAP_COLUMNS} FROM gap WHERE id = ?1"))?;

        Ok(stmt.query_row(params![gap_id], Self::map_gap).optional()?)
    }

    /// Get the gap already recorded for an (assignee, context) pair
    pub fn gap_for_context(&self, assignee_id: &str, context_key: &str) -> Result<Option<Gap>> {
        let conn = self.conn.lock().map_err(|_| Error::LockPoisoned)?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {GAP_COLUMNS} FROM gap WHERE assignee_id = ?1 AND context_key = ?2"
        ))?;

        Ok(stmt
            .query_row(params![assignee_id, context_key], Self::map_gap)
            .optional()?)
    }

    /// List gaps ordered by priority
    pub fn list_gaps(&self, filter: &GapFilter) -> Result<Vec<Gap>> {
        let conn = self.conn.lock().map_err(|_| Error::LockPoisoned)?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {GAP_COLUMNS} FROM gap
             WHERE (?1 IS NULL OR assignee_id = ?1)
               AND (?2 IS NULL OR status = ?2)
             ORDER BY priority"
        ))?;

        let mut gaps = stmt
            .query_map(
                params![filter.assignee_id, filter.status.map(|s| s.as_str())],
                Self::map_gap,
            )?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        if let Some(limit) = filter.limit {
            gaps.truncate(limit);
        }
        Ok(gaps)
    }

    /// Reorder a gap to a new priority slot
    pub fn update_gap_priority(&self, gap_id: &str, priority: i32) -> Result<Gap> {
        {
            let conn = self.conn.lock().map_err(|_| Error::LockPoisoned)?;
            let updated = conn.execute(
                "UPDATE gap SET priority = ?1 WHERE id = ?2",
                params![priority, gap_id],
            )?;
            if updated == 0 {
                return Err(Error::NotFound(format!("gap {gap_id}")));
            }
        }
        self.get_gap(gap_id)?
            .ok_or_else(|| Error::NotFound(format!("gap {gap_id}")))
    }

    /// Move a gap through its lifecycle (open → acknowledged → resolved)
    pub fn update_gap_status(&self, gap_id: &str, status: GapStatus) -> Result<Gap> {
        {
            let conn = self.conn.lock().map_err(|_| Error::LockPoisoned)?;
            let updated = conn.execute(
                "UPDATE gap SET status = ?1 WHERE id = ?2",
                params![status.as_str(), gap_id],
            )?;
            if updated == 0 {
                return Err(Error::NotFound(format!("gap {gap_id}")));
            }
        }
        self.get_gap(gap_id)?
            .ok_or_else(|| Error::NotFound(format!("gap {gap_id}")))
    }

    fn map_gap(row: &rusqlite::Row) -> rusqlite::Result<Gap> {
        let severity: String = row.get(6)?;
        let status: String = row.get(7)?;
        Ok(Gap {
            id: row.get(0)?,
            assignee_id: row.get(1)?,
            decision_id: row.get(2)?,
            context_key: row.get(3)?,
            description: row.get(4)?,
            recommendation: row.get(5)?,
            severity: GapSeverity::parse(&severity).unwrap_or(GapSeverity::Warning),
            status: GapStatus::parse(&status).unwrap_or(GapStatus::Open),
            priority: row.get(8)?,
            created_at: row.get(9)?,
        })
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Gap Detail Operations
    // ─────────────────────────────────────────────────────────────────────────

    /// Attach a typed detail row to a gap
    pub fn create_gap_detail(&self, gap_id: &str, payload: &GapDetailPayload) -> Result<String> {
        let conn = self.conn.lock().map_err(|_| Error::LockPoisoned)?;
        let id = uuid::Uuid::new_v4().to_string();
        let now = chrono::Utc::now().timestamp_millis();

        conn.execute(
            "INSERT INTO gap_detail (id, gap_id, detail_type, payload, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                id,
                gap_id,
                payload.detail_type(),
                serde_json::to_string(payload)?,
                now,
            ],
        )?;

        Ok(id)
    }

    /// List a gap's detail rows in insertion order
    pub fn list_gap_details(&self, gap_id: &str) -> Result<Vec<GapDetail>> {
        let rows = {
            let conn = self.conn.lock().map_err(|_| Error::LockPoisoned)?;
            let mut stmt = conn.prepare(
                "SELECT id, gap_id, payload, created_at
                 FROM gap_detail WHERE gap_id = ?1 ORDER BY rowid",
            )?;
            stmt.query_map(params![gap_id], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, i64>(3)?,
                ))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?
        };

        rows.into_iter()
            .map(|(id, gap_id, payload, created_at)| {
                Ok(GapDetail {
                    id,
                    gap_id,
                    payload: serde_json::from_str(&payload)?,
                    created_at,
                })
            })
            .collect()
    }

    /// Prior gaps whose context details share a component with `components`,
    /// newest first. Feeds the relationship detail of a new gap.
    pub fn find_gaps_sharing_component(
        &self,
        components: &BTreeSet<String>,
        limit: usize,
    ) -> Result<Vec<(Gap, BTreeSet<String>)>> {
        if components.is_empty() {
            return Ok(Vec::new());
        }

        let rows = {
            let conn = self.conn.lock().map_err(|_| Error::LockPoisoned)?;
            let mut stmt = conn.prepare(
                "SELECT g.id, g.assignee_id, g.decision_id, g.context_key, g.description,
                        g.recommendation, g.severity, g.status, g.priority, g.created_at,
                        d.payload
                 FROM gap g
                 JOIN gap_detail d ON d.gap_id = g.id
                 WHERE d.detail_type = 'context'
                 ORDER BY g.created_at DESC",
            )?;
            stmt.query_map([], |row| {
                let gap = Self::map_gap(row)?;
                let payload: String = row.get(10)?;
                Ok((gap, payload))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?
        };

        let mut related = Vec::new();
        for (gap, payload) in rows {
            let Ok(GapDetailPayload::Context {
                components: gap_components,
                ..
            }) = serde_json::from_str(&payload)
            else {
                continue;
            };
            let shared: BTreeSet<String> =
                components.intersection(&gap_components).cloned().collect();
            if !shared.is_empty() {
                related.push((gap, shared));
                if related.len() >= limit {
                    break;
                }
            }
        }
        Ok(related)
    }
}
