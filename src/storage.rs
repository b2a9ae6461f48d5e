use anyhow::{anyhow, Result};
use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};

use crate::geometry::BoundingBox;
use crate::open_db_connection;

/// Persisted violation row. Dashboards read these fields; keep them stable.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ViolationRecord {
    pub image_name: String,
    pub original_image: String,
    pub violation_image: String,
    pub fine_amount: u32,
    /// Seconds since the epoch.
    pub timestamp: i64,
    pub stream_id: String,
    pub person_box: BoundingBox,
    pub vehicle_box: BoundingBox,
    pub no_helmet_box: BoundingBox,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StoredViolation {
    pub id: i64,
    #[serde(flatten)]
    pub record: ViolationRecord,
}

pub trait ViolationStore: Send {
    /// Insert a record, returning its row id.
    fn insert(&mut self, record: &ViolationRecord) -> Result<i64>;

    /// Newest first.
    fn list_recent(&mut self, limit: usize) -> Result<Vec<StoredViolation>>;

    fn count(&mut self) -> Result<u64>;
}

pub struct SqliteViolationStore {
    conn: Connection,
}

impl SqliteViolationStore {
    pub fn open(db_path: &str) -> Result<Self> {
        let conn = open_db_connection(db_path)?;
        let mut store = Self { conn };
        store.ensure_schema()?;
        Ok(store)
    }

    fn ensure_schema(&mut self) -> Result<()> {
        self.conn.execute_batch(
            r#"
            PRAGMA journal_mode=WAL;

            CREATE TABLE IF NOT EXISTS no_helmet_records (
              id INTEGER PRIMARY KEY AUTOINCREMENT,
              image_name TEXT NOT NULL,
              original_image TEXT NOT NULL,
              violation_image TEXT NOT NULL,
              fine_amount INTEGER NOT NULL,
              timestamp INTEGER NOT NULL,
              stream_id TEXT NOT NULL,
              person_box TEXT NOT NULL,
              vehicle_box TEXT NOT NULL,
              no_helmet_box TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_no_helmet_records_ts ON no_helmet_records(timestamp);
            "#,
        )?;
        Ok(())
    }
}

impl ViolationStore for SqliteViolationStore {
    fn insert(&mut self, record: &ViolationRecord) -> Result<i64> {
        self.conn.execute(
            r#"
            INSERT INTO no_helmet_records(
              image_name, original_image, violation_image, fine_amount, timestamp,
              stream_id, person_box, vehicle_box, no_helmet_box
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            "#,
            params![
                record.image_name,
                record.original_image,
                record.violation_image,
                record.fine_amount,
                record.timestamp,
                record.stream_id,
                serde_json::to_string(&record.person_box)?,
                serde_json::to_string(&record.vehicle_box)?,
                serde_json::to_string(&record.no_helmet_box)?,
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    fn list_recent(&mut self, limit: usize) -> Result<Vec<StoredViolation>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT id, image_name, original_image, violation_image, fine_amount, timestamp,
                   stream_id, person_box, vehicle_box, no_helmet_box
            FROM no_helmet_records
            ORDER BY timestamp DESC, id DESC
            LIMIT ?1
            "#,
        )?;
        let mut rows = stmt.query(params![limit as i64])?;
        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            let id: i64 = row.get(0)?;
            out.push(StoredViolation {
                id,
                record: ViolationRecord {
                    image_name: row.get(1)?,
                    original_image: row.get(2)?,
                    violation_image: row.get(3)?,
                    fine_amount: row.get(4)?,
                    timestamp: row.get(5)?,
                    stream_id: row.get(6)?,
                    person_box: parse_box(id, &row.get::<_, String>(7)?)?,
                    vehicle_box: parse_box(id, &row.get::<_, String>(8)?)?,
                    no_helmet_box: parse_box(id, &row.get::<_, String>(9)?)?,
                },
            });
        }
        Ok(out)
    }

    fn count(&mut self) -> Result<u64> {
        let n: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM no_helmet_records", [], |row| row.get(0))?;
        Ok(n as u64)
    }
}

fn parse_box(id: i64, raw: &str) -> Result<BoundingBox> {
    serde_json::from_str(raw).map_err(|e| anyhow!("corrupt record {}: bad box {:?}: {}", id, raw, e))
}

#[derive(Clone, Debug, Default)]
pub struct InMemoryViolationStore {
    rows: Vec<StoredViolation>,
}

impl InMemoryViolationStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ViolationStore for InMemoryViolationStore {
    fn insert(&mut self, record: &ViolationRecord) -> Result<i64> {
        let id = self.rows.len() as i64 + 1;
        self.rows.push(StoredViolation {
            id,
            record: record.clone(),
        });
        Ok(id)
    }

    fn list_recent(&mut self, limit: usize) -> Result<Vec<StoredViolation>> {
        let mut rows = self.rows.clone();
        rows.sort_by(|a, b| {
            b.record
                .timestamp
                .cmp(&a.record.timestamp)
                .then(b.id.cmp(&a.id))
        });
        rows.truncate(limit);
        Ok(rows)
    }

    fn count(&mut self) -> Result<u64> {
        Ok(self.rows.len() as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(ts: i64, name: &str) -> ViolationRecord {
        ViolationRecord {
            image_name: name.to_string(),
            original_image: name.to_string(),
            violation_image: format!("viol_{name}"),
            fine_amount: 500,
            timestamp: ts,
            stream_id: "cam-1".into(),
            person_box: BoundingBox::new(100.0, 100.0, 200.0, 300.0),
            vehicle_box: BoundingBox::new(90.0, 250.0, 210.0, 350.0),
            no_helmet_box: BoundingBox::new(130.0, 100.0, 170.0, 140.0),
        }
    }

    fn exercise(store: &mut dyn ViolationStore) {
        let a = store.insert(&record(100, "a.jpg")).unwrap();
        let b = store.insert(&record(300, "b.jpg")).unwrap();
        let c = store.insert(&record(200, "c.jpg")).unwrap();
        assert!(a < b && b < c);
        assert_eq!(store.count().unwrap(), 3);

        let recent = store.list_recent(2).unwrap();
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].id, b);
        assert_eq!(recent[1].id, c);
        assert_eq!(recent[0].record, record(300, "b.jpg"));
    }

    #[test]
    fn sqlite_store_round_trips_records() {
        let mut store = SqliteViolationStore::open(&crate::shared_memory_uri()).unwrap();
        exercise(&mut store);
    }

    #[test]
    fn in_memory_store_matches_sqlite_ordering() {
        let mut store = InMemoryViolationStore::new();
        exercise(&mut store);
    }
}
