use async_trait::async_trait;

use super::{IdGenError, IdGenerator};
use crate::admission::DoneSignal;
use crate::db::SqlDb;

/// Ids from an autoincrement table. Only the latest row is kept.
#[derive(Debug)]
pub struct SqlIdGen {
    db: SqlDb,
    insert: String,
    delete: String,
}

impl SqlIdGen {
    /// Create the backing table if needed.
    pub async fn open(db: SqlDb, table: &str) -> Result<Self, IdGenError> {
        if !is_identifier(table) {
            return Err(IdGenError::InvalidTable(table.to_string()));
        }
        db.exec(
            None,
            &format!("CREATE TABLE IF NOT EXISTS {table} (id INTEGER PRIMARY KEY AUTOINCREMENT)"),
            vec![],
        )
        .await?;

        Ok(Self {
            db,
            insert: format!("INSERT INTO {table} DEFAULT VALUES"),
            delete: format!("DELETE FROM {table} WHERE id = ?1"),
        })
    }
}

#[async_trait]
impl IdGenerator for SqlIdGen {
    async fn next_id(&self, cancel: Option<&DoneSignal>) -> Result<i64, IdGenError> {
        let id = self.db.exec(cancel, &self.insert, vec![]).await?.last_insert_id;
        if id > 1 {
            if let Err(e) = self.db.exec(cancel, &self.delete, vec![(id - 1).into()]).await {
                tracing::debug!(error = %e, id = id - 1, "Failed to prune previous id row");
            }
        }
        Ok(id)
    }

    async fn close(&self) {
        self.db.close().await;
    }
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}
