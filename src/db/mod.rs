//! SQLite-backed storage: the camera table and the detection log.

mod schema;

use anyhow::Result;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};
use std::path::Path;
use std::sync::Mutex;

use crate::camera::Camera;

pub use schema::SCHEMA;

const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// One logged face occurrence. Immutable once written; rows leave the
/// table only through [`Database::purge_detections_before`].
#[derive(Debug, Clone, PartialEq)]
pub struct DetectionEvent {
    /// Recognized identity, or `None` for an unknown person.
    pub name: Option<String>,
    pub confidence: f32,
    pub is_known: bool,
    pub detected_at: DateTime<Utc>,
    pub camera_id: Option<i64>,
}

/// Append-only consumer of detection events.
pub trait DetectionSink: Send + Sync {
    fn record(&self, event: &DetectionEvent) -> Result<()>;
}

pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn open_in_memory() -> Result<Self> {
        Ok(Self {
            conn: Mutex::new(Connection::open_in_memory()?),
        })
    }

    pub fn initialize(&self) -> Result<()> {
        self.conn().execute_batch(SCHEMA)?;
        Ok(())
    }

    fn conn(&self) -> std::sync::MutexGuard<'_, Connection> {
        self.conn.lock().expect("database lock poisoned")
    }

    // ========================================================================
    // Camera operations
    // ========================================================================

    pub fn list_cameras(&self) -> Result<Vec<Camera>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT id, name, address FROM cameras WHERE address != '' ORDER BY id",
        )?;

        let cameras = stmt
            .query_map([], |row| {
                Ok(Camera {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    address: row.get(2)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(cameras)
    }

    pub fn add_camera(&self, name: &str, address: &str) -> Result<i64> {
        let conn = self.conn();
        conn.execute(
            "INSERT INTO cameras (name, address) VALUES (?, ?)",
            params![name, address],
        )?;
        Ok(conn.last_insert_rowid())
    }

    // ========================================================================
    // Detection log
    // ========================================================================

    pub fn record_detection(&self, event: &DetectionEvent) -> Result<i64> {
        let conn = self.conn();
        conn.execute(
            r#"
            INSERT INTO detections (name, confidence, is_known, detected_at, camera_id)
            VALUES (?, ?, ?, ?, ?)
            "#,
            params![
                event.name,
                event.confidence as f64,
                event.is_known,
                event.detected_at.format(TIMESTAMP_FORMAT).to_string(),
                event.camera_id,
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// Most recent detections, newest first.
    pub fn recent_detections(&self, limit: usize) -> Result<Vec<DetectionEvent>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            r#"
            SELECT name, confidence, is_known, detected_at, camera_id
            FROM detections
            ORDER BY detected_at DESC, id DESC
            LIMIT ?
            "#,
        )?;

        let events = stmt
            .query_map([limit as i64], |row| {
                let detected_at: String = row.get(3)?;
                Ok(DetectionEvent {
                    name: row.get(0)?,
                    confidence: row.get::<_, f64>(1)? as f32,
                    is_known: row.get(2)?,
                    detected_at: parse_timestamp(&detected_at),
                    camera_id: row.get(4)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(events)
    }

    /// Delete detections older than the cutoff. Returns how many rows went.
    pub fn purge_detections_before(&self, cutoff: DateTime<Utc>) -> Result<usize> {
        let conn = self.conn();
        let deleted = conn.execute(
            "DELETE FROM detections WHERE detected_at < ?",
            params![cutoff.format(TIMESTAMP_FORMAT).to_string()],
        )?;
        Ok(deleted)
    }

    pub fn count_detections(&self) -> Result<i64> {
        let conn = self.conn();
        let count = conn.query_row("SELECT COUNT(*) FROM detections", [], |row| row.get(0))?;
        Ok(count)
    }
}

impl DetectionSink for Database {
    fn record(&self, event: &DetectionEvent) -> Result<()> {
        self.record_detection(event)?;
        Ok(())
    }
}

fn parse_timestamp(value: &str) -> DateTime<Utc> {
    chrono::NaiveDateTime::parse_from_str(value, TIMESTAMP_FORMAT)
        .map(|dt| dt.and_utc())
        .unwrap_or_else(|_| Utc::now())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Timelike};

    fn db() -> Database {
        let db = Database::open_in_memory().unwrap();
        db.initialize().unwrap();
        db
    }

    fn event(name: Option<&str>, when: DateTime<Utc>) -> DetectionEvent {
        DetectionEvent {
            name: name.map(|n| n.to_string()),
            confidence: 0.8,
            is_known: name.is_some(),
            detected_at: when.with_nanosecond(0).unwrap(),
            camera_id: Some(1),
        }
    }

    #[test]
    fn detections_round_trip() {
        let db = db();
        let now = Utc::now();
        db.record_detection(&event(Some("Alice"), now)).unwrap();
        db.record_detection(&event(None, now)).unwrap();

        let events = db.recent_detections(10).unwrap();
        assert_eq!(events.len(), 2);
        assert!(events.iter().any(|e| e.name.as_deref() == Some("Alice") && e.is_known));
        assert!(events.iter().any(|e| e.name.is_none() && !e.is_known));
    }

    #[test]
    fn recent_detections_respects_limit_and_order() {
        let db = db();
        let base = Utc::now().with_nanosecond(0).unwrap();
        for i in 0..5 {
            db.record_detection(&event(Some("Alice"), base + Duration::seconds(i)))
                .unwrap();
        }

        let events = db.recent_detections(2).unwrap();
        assert_eq!(events.len(), 2);
        assert!(events[0].detected_at >= events[1].detected_at);
    }

    #[test]
    fn purge_removes_only_old_rows() {
        let db = db();
        let now = Utc::now().with_nanosecond(0).unwrap();
        db.record_detection(&event(Some("Old"), now - Duration::days(30)))
            .unwrap();
        db.record_detection(&event(Some("New"), now)).unwrap();

        let purged = db
            .purge_detections_before(now - Duration::days(7))
            .unwrap();

        assert_eq!(purged, 1);
        let remaining = db.recent_detections(10).unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].name.as_deref(), Some("New"));
    }

    #[test]
    fn camera_list_skips_blank_addresses() {
        let db = db();
        db.add_camera("Front door", "192.168.0.10:8080").unwrap();
        db.add_camera("Unconfigured", "").unwrap();

        let cameras = db.list_cameras().unwrap();
        assert_eq!(cameras.len(), 1);
        assert_eq!(cameras[0].name, "Front door");
        assert_eq!(cameras[0].address, "192.168.0.10:8080");
    }
}
