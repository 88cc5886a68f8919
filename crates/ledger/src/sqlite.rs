//! SQLite ledger.
//!
//! Uses a single database file with two tables:
//! - `attachments`: one row per stored attachment, ordered by `iid`
//! - `compositions`: one row per produced artifact
//!
//! `claim_pair` runs as a conditional update inside a transaction, so the
//! select-and-consume step stays atomic even when several processes share the
//! database.

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteRow, SqliteSynchronous,
};
use sqlx::{Row, SqlitePool};
use tracing::{debug, info};
use tryon_core::error::{LedgerError, NotFoundError, PersistenceError, ReclassifyError};
use tryon_core::{AttachmentRecord, CompositionRecord, ImageKind, SessionLedger, UserId};

use crate::{asset, records};

fn db_error(context: &str, e: sqlx::Error) -> PersistenceError {
    PersistenceError::Database(format!("{context}: {e}"))
}

fn parse_kind(raw: &str) -> Result<ImageKind, PersistenceError> {
    match raw {
        "person" => Ok(ImageKind::Person),
        "garment" => Ok(ImageKind::Garment),
        "unclassified" => Ok(ImageKind::Unclassified),
        other => Err(PersistenceError::Database(format!(
            "unknown declared_type '{other}'"
        ))),
    }
}

fn parse_time(raw: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

/// A [`SessionLedger`] stored in SQLite.
pub struct SqliteLedger {
    pool: SqlitePool,
}

impl SqliteLedger {
    /// Open (or create) the database at a `sqlite://` URL.
    pub async fn new(url: &str) -> Result<Self, PersistenceError> {
        let options = SqliteConnectOptions::from_str(url)
            .map_err(|e| db_error("invalid SQLite URL", e))?;
        let ledger = Self::connect(options).await?;
        info!("SQLite ledger initialized at {url}");
        Ok(ledger)
    }

    /// Open (or create) the database at a file path.
    pub async fn open(path: &Path) -> Result<Self, PersistenceError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| asset::io_error(parent, e))?;
        }
        Self::connect(SqliteConnectOptions::new().filename(path)).await
    }

    async fn connect(options: SqliteConnectOptions) -> Result<Self, PersistenceError> {
        let options = options
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await
            .map_err(|e| db_error("failed to open SQLite", e))?;

        let ledger = Self { pool };
        ledger.run_migrations().await?;
        Ok(ledger)
    }

    async fn run_migrations(&self) -> Result<(), PersistenceError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS attachments (
                iid           INTEGER PRIMARY KEY AUTOINCREMENT,
                id            TEXT UNIQUE NOT NULL,
                user_id       TEXT NOT NULL,
                source_ref    TEXT NOT NULL,
                local_path    TEXT NOT NULL,
                declared_type TEXT NOT NULL,
                consumed      INTEGER NOT NULL DEFAULT 0,
                created_at    TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| db_error("attachments table", e))?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS compositions (
                iid            INTEGER PRIMARY KEY AUTOINCREMENT,
                id             TEXT UNIQUE NOT NULL,
                user_id        TEXT NOT NULL,
                person_record  TEXT NOT NULL,
                garment_record TEXT NOT NULL,
                person_image   TEXT NOT NULL,
                garment_image  TEXT NOT NULL,
                output_image   TEXT NOT NULL,
                created_at     TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| db_error("compositions table", e))?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_attachments_user ON attachments(user_id, iid)")
            .execute(&self.pool)
            .await
            .map_err(|e| db_error("attachments index", e))?;

        debug!("SQLite ledger migrations complete");
        Ok(())
    }

    fn row_to_record(row: &SqliteRow) -> Result<AttachmentRecord, PersistenceError> {
        let get = |col: &str| -> Result<String, PersistenceError> {
            row.try_get::<String, _>(col)
                .map_err(|e| db_error(&format!("{col} column"), e))
        };
        let consumed: i64 = row
            .try_get("consumed")
            .map_err(|e| db_error("consumed column", e))?;

        Ok(AttachmentRecord {
            id: get("id")?,
            source_ref: get("source_ref")?,
            local_path: PathBuf::from(get("local_path")?),
            declared_type: parse_kind(&get("declared_type")?)?,
            consumed: consumed != 0,
            created_at: parse_time(&get("created_at")?),
        })
    }

    fn row_to_composition(row: &SqliteRow) -> Result<CompositionRecord, PersistenceError> {
        let get = |col: &str| -> Result<String, PersistenceError> {
            row.try_get::<String, _>(col)
                .map_err(|e| db_error(&format!("{col} column"), e))
        };
        Ok(CompositionRecord {
            id: get("id")?,
            person_record: get("person_record")?,
            garment_record: get("garment_record")?,
            person_image: PathBuf::from(get("person_image")?),
            garment_image: PathBuf::from(get("garment_image")?),
            output_image: PathBuf::from(get("output_image")?),
            created_at: parse_time(&get("created_at")?),
        })
    }

    async fn fetch_record(
        &self,
        user: &UserId,
        record_id: &str,
    ) -> Result<Option<AttachmentRecord>, PersistenceError> {
        let row = sqlx::query("SELECT * FROM attachments WHERE user_id = ?1 AND id = ?2")
            .bind(user.as_str())
            .bind(record_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| db_error("record lookup", e))?;
        row.as_ref().map(Self::row_to_record).transpose()
    }
}

#[async_trait]
impl SessionLedger for SqliteLedger {
    fn name(&self) -> &str {
        "sqlite"
    }

    async fn records(&self, user: &UserId) -> Result<Vec<AttachmentRecord>, PersistenceError> {
        let rows = sqlx::query("SELECT * FROM attachments WHERE user_id = ?1 ORDER BY iid")
            .bind(user.as_str())
            .fetch_all(&self.pool)
            .await
            .map_err(|e| db_error("records query", e))?;
        rows.iter().map(Self::row_to_record).collect()
    }

    async fn append(
        &self,
        user: &UserId,
        record: AttachmentRecord,
    ) -> Result<(), PersistenceError> {
        sqlx::query(
            r#"
            INSERT INTO attachments
                (id, user_id, source_ref, local_path, declared_type, consumed, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
        )
        .bind(&record.id)
        .bind(user.as_str())
        .bind(&record.source_ref)
        .bind(record.local_path.to_string_lossy().into_owned())
        .bind(record.declared_type.as_str())
        .bind(record.consumed as i64)
        .bind(record.created_at.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(|e| db_error("INSERT attachment", e))?;

        debug!(user = %user, record = %record.id, "Stored attachment record");
        Ok(())
    }

    async fn reclassify(
        &self,
        user: &UserId,
        record_id: &str,
        new_kind: ImageKind,
    ) -> Result<AttachmentRecord, ReclassifyError> {
        if !new_kind.is_classified() {
            return Err(ReclassifyError::TargetUnclassified);
        }
        let mut record = self.fetch_record(user, record_id).await?.ok_or_else(|| {
            ReclassifyError::UnknownRecord {
                record_id: record_id.to_string(),
            }
        })?;
        records::check_reclassifiable(&record)?;

        let original = record.local_path.clone();
        let moved = asset::relocate(user, record_id, &original, new_kind).await?;

        let updated = sqlx::query(
            r#"
            UPDATE attachments SET declared_type = ?1, local_path = ?2
            WHERE user_id = ?3 AND id = ?4 AND declared_type = 'unclassified' AND consumed = 0
            "#,
        )
        .bind(new_kind.as_str())
        .bind(moved.to_string_lossy().into_owned())
        .bind(user.as_str())
        .bind(record_id)
        .execute(&self.pool)
        .await;

        match updated {
            Ok(done) if done.rows_affected() == 1 => {
                record.declared_type = new_kind;
                record.local_path = moved;
                Ok(record)
            }
            Ok(_) => {
                asset::restore(&moved, &original).await;
                Err(ReclassifyError::AlreadyConsumed {
                    record_id: record_id.to_string(),
                })
            }
            Err(e) => {
                asset::restore(&moved, &original).await;
                Err(db_error("UPDATE declared_type", e).into())
            }
        }
    }

    async fn mark_consumed(
        &self,
        user: &UserId,
        record_id: &str,
    ) -> Result<AttachmentRecord, LedgerError> {
        sqlx::query("UPDATE attachments SET consumed = 1 WHERE user_id = ?1 AND id = ?2")
            .bind(user.as_str())
            .bind(record_id)
            .execute(&self.pool)
            .await
            .map_err(|e| db_error("UPDATE consumed", e))?;

        self.fetch_record(user, record_id).await?.ok_or_else(|| {
            NotFoundError::Record {
                user: user.to_string(),
                record_id: record_id.to_string(),
            }
            .into()
        })
    }

    async fn claim_pair(
        &self,
        user: &UserId,
        person_id: &str,
        garment_id: &str,
    ) -> Result<(), LedgerError> {
        for id in [person_id, garment_id] {
            if self.fetch_record(user, id).await?.is_none() {
                return Err(NotFoundError::Record {
                    user: user.to_string(),
                    record_id: id.to_string(),
                }
                .into());
            }
        }

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| db_error("begin claim", e))?;
        let claimed = sqlx::query(
            "UPDATE attachments SET consumed = 1 WHERE user_id = ?1 AND id IN (?2, ?3) AND consumed = 0",
        )
        .bind(user.as_str())
        .bind(person_id)
        .bind(garment_id)
        .execute(&mut *tx)
        .await
        .map_err(|e| db_error("claim pair", e))?;

        if claimed.rows_affected() != 2 {
            tx.rollback()
                .await
                .map_err(|e| db_error("rollback claim", e))?;
            let mut taken = person_id;
            if let Some(person) = self.fetch_record(user, person_id).await? {
                if !person.consumed {
                    taken = garment_id;
                }
            }
            return Err(LedgerError::AlreadyConsumed {
                record_id: taken.to_string(),
            });
        }

        tx.commit()
            .await
            .map_err(|e| db_error("commit claim", e))?;
        Ok(())
    }

    async fn append_composition(
        &self,
        user: &UserId,
        record: CompositionRecord,
    ) -> Result<(), PersistenceError> {
        sqlx::query(
            r#"
            INSERT INTO compositions
                (id, user_id, person_record, garment_record,
                 person_image, garment_image, output_image, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            "#,
        )
        .bind(&record.id)
        .bind(user.as_str())
        .bind(&record.person_record)
        .bind(&record.garment_record)
        .bind(record.person_image.to_string_lossy().into_owned())
        .bind(record.garment_image.to_string_lossy().into_owned())
        .bind(record.output_image.to_string_lossy().into_owned())
        .bind(record.created_at.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(|e| db_error("INSERT composition", e))?;
        Ok(())
    }

    async fn compositions(
        &self,
        user: &UserId,
    ) -> Result<Vec<CompositionRecord>, PersistenceError> {
        let rows = sqlx::query("SELECT * FROM compositions WHERE user_id = ?1 ORDER BY iid")
            .bind(user.as_str())
            .fetch_all(&self.pool)
            .await
            .map_err(|e| db_error("compositions query", e))?;
        rows.iter().map(Self::row_to_composition).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn ledger(dir: &Path) -> SqliteLedger {
        SqliteLedger::open(&dir.join("ledger.db")).await.unwrap()
    }

    #[tokio::test]
    async fn append_and_read_back_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let db = ledger(dir.path()).await;
        let user = UserId::new("u1");
        let a = AttachmentRecord::new("a", "/in/a.png", ImageKind::Garment);
        let b = AttachmentRecord::new("b", "/in/b.png", ImageKind::Unclassified);
        db.append(&user, a.clone()).await.unwrap();
        db.append(&user, b.clone()).await.unwrap();

        let records = db.records(&user).await.unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].id, a.id);
        assert_eq!(records[1].declared_type, ImageKind::Unclassified);
        assert!(db.records(&UserId::new("other")).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn reopening_keeps_records() {
        let dir = tempfile::tempdir().unwrap();
        let user = UserId::new("u1");
        let rec = AttachmentRecord::new("a", "/in/a.png", ImageKind::Person);
        {
            let db = ledger(dir.path()).await;
            db.append(&user, rec.clone()).await.unwrap();
        }
        let db = ledger(dir.path()).await;
        let found = db.find_latest_unused(&user, ImageKind::Person).await.unwrap();
        assert_eq!(found.map(|r| r.id), Some(rec.id));
    }

    #[tokio::test]
    async fn reclassify_updates_row_and_file() {
        let dir = tempfile::tempdir().unwrap();
        let db = ledger(dir.path()).await;
        let user = UserId::new("u1");
        let path = dir.path().join("u1_None_1.png");
        tokio::fs::write(&path, b"img").await.unwrap();
        let rec = AttachmentRecord::new("a", &path, ImageKind::Unclassified);
        db.append(&user, rec.clone()).await.unwrap();

        let updated = db.reclassify(&user, &rec.id, ImageKind::Person).await.unwrap();
        assert_eq!(updated.declared_type, ImageKind::Person);
        assert!(updated.local_path.exists());

        let stored = db.records(&user).await.unwrap();
        assert_eq!(stored[0].local_path, updated.local_path);
        assert!(!db.has_unused(&user, None).await.unwrap());
    }

    #[tokio::test]
    async fn claim_pair_only_once() {
        let dir = tempfile::tempdir().unwrap();
        let db = ledger(dir.path()).await;
        let user = UserId::new("u1");
        let person = AttachmentRecord::new("p", "/in/p.png", ImageKind::Person);
        let garment = AttachmentRecord::new("g", "/in/g.png", ImageKind::Garment);
        db.append(&user, person.clone()).await.unwrap();
        db.append(&user, garment.clone()).await.unwrap();

        db.claim_pair(&user, &person.id, &garment.id).await.unwrap();
        let err = db
            .claim_pair(&user, &person.id, &garment.id)
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::AlreadyConsumed { .. }));

        let err = db.claim_pair(&user, &person.id, "ghost").await.unwrap_err();
        assert!(matches!(err, LedgerError::NotFound(_)));
    }

    #[tokio::test]
    async fn partial_claim_rolls_back() {
        let dir = tempfile::tempdir().unwrap();
        let db = ledger(dir.path()).await;
        let user = UserId::new("u1");
        let person = AttachmentRecord::new("p", "/in/p.png", ImageKind::Person);
        let garment = AttachmentRecord::new("g", "/in/g.png", ImageKind::Garment);
        db.append(&user, person.clone()).await.unwrap();
        db.append(&user, garment.clone()).await.unwrap();
        db.mark_consumed(&user, &garment.id).await.unwrap();

        let err = db
            .claim_pair(&user, &person.id, &garment.id)
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::AlreadyConsumed { ref record_id } if *record_id == garment.id));
        assert!(db.has_unused(&user, Some(ImageKind::Person)).await.unwrap());
    }

    #[tokio::test]
    async fn compositions_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let db = ledger(dir.path()).await;
        let user = UserId::new("u1");
        let person = AttachmentRecord::new("p", "/in/p.png", ImageKind::Person);
        let garment = AttachmentRecord::new("g", "/in/g.png", ImageKind::Garment);
        let rec = CompositionRecord::new(&person, &garment, "/out/x.jpeg");
        db.append_composition(&user, rec.clone()).await.unwrap();

        let all = db.compositions(&user).await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].artifact_name(), Some("x.jpeg"));
        assert_eq!(all[0].person_record, person.id);
    }
}
