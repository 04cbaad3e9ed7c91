use anyhow::Result;
use chrono::Utc;
use sqlx::{sqlite::SqliteConnectOptions, SqlitePool};
use std::fs;
use std::path::PathBuf;
use tracing::{debug, info};

/// Size-bounded byte cache for proxied base-map tiles and detail graph
/// images. Payloads live as files on disk, metadata in SQLite; eviction
/// is least-recently-used.
pub struct ByteCache {
    pool: SqlitePool,
    dir: PathBuf,
    max_bytes: u64,
}

/// Upper bound on rows dropped per eviction pass; the next insert picks
/// up where this one left off.
const EVICT_BATCH: i64 = 50;

impl ByteCache {
    pub async fn open(dir: PathBuf, max_size_gb: u64) -> Result<Self> {
        if !dir.exists() {
            fs::create_dir_all(&dir)?;
        }

        let opts = SqliteConnectOptions::new()
            .filename(dir.join("cache_index.db"))
            .create_if_missing(true);
        let pool = SqlitePool::connect_with(opts).await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS entries (
                key TEXT PRIMARY KEY,
                file_name TEXT NOT NULL,
                size_bytes INTEGER NOT NULL,
                last_used_at INTEGER NOT NULL
            )",
        )
        .execute(&pool)
        .await?;

        Ok(ByteCache {
            pool,
            dir,
            max_bytes: max_size_gb * 1024 * 1024 * 1024,
        })
    }

    pub async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let row: Option<(String,)> =
            sqlx::query_as("SELECT file_name FROM entries WHERE key = ?")
                .bind(key)
                .fetch_optional(&self.pool)
                .await?;

        let Some((file_name,)) = row else {
            debug!("cache miss: {}", key);
            return Ok(None);
        };

        let path = self.dir.join(&file_name);
        if !path.exists() {
            // Stale index entry; the payload file is gone.
            sqlx::query("DELETE FROM entries WHERE key = ?")
                .bind(key)
                .execute(&self.pool)
                .await?;
            return Ok(None);
        }

        sqlx::query("UPDATE entries SET last_used_at = ? WHERE key = ?")
            .bind(Utc::now().timestamp())
            .bind(key)
            .execute(&self.pool)
            .await?;

        debug!("cache hit: {}", key);
        Ok(Some(fs::read(path)?))
    }

    pub async fn put(&self, key: &str, data: &[u8]) -> Result<()> {
        let file_name = file_name_for(key);
        fs::write(self.dir.join(&file_name), data)?;

        sqlx::query(
            "INSERT OR REPLACE INTO entries (key, file_name, size_bytes, last_used_at)
             VALUES (?, ?, ?, ?)",
        )
        .bind(key)
        .bind(&file_name)
        .bind(data.len() as i64)
        .bind(Utc::now().timestamp())
        .execute(&self.pool)
        .await?;

        self.evict().await
    }

    async fn evict(&self) -> Result<()> {
        let total: i64 = sqlx::query_scalar("SELECT COALESCE(SUM(size_bytes), 0) FROM entries")
            .fetch_one(&self.pool)
            .await?;
        if (total as u64) <= self.max_bytes {
            return Ok(());
        }

        info!("cache over {} bytes, evicting oldest entries", self.max_bytes);
        let victims: Vec<(String, String)> = sqlx::query_as(
            "SELECT key, file_name FROM entries ORDER BY last_used_at ASC LIMIT ?",
        )
        .bind(EVICT_BATCH)
        .fetch_all(&self.pool)
        .await?;

        for (key, file_name) in victims {
            let _ = fs::remove_file(self.dir.join(&file_name));
            sqlx::query("DELETE FROM entries WHERE key = ?")
                .bind(&key)
                .execute(&self.pool)
                .await?;
            debug!("evicted: {}", key);
        }
        Ok(())
    }
}

fn file_name_for(key: &str) -> String {
    let safe: String = key
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect();
    format!("{safe}.bin")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_names_are_filesystem_safe() {
        assert_eq!(file_name_for("osm:12/2104/1346@2"), "osm_12_2104_1346_2.bin");
        assert_eq!(file_name_for("graph_7_600x300"), "graph_7_600x300.bin");
    }
}
