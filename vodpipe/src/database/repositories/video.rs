//! Video repository.

use async_trait::async_trait;
use sqlx::SqlitePool;

use crate::database::models::VideoDbModel;
use crate::domain::VideoRecord;
use crate::{Error, Result};

/// Store of per-video records, keyed by video identifier.
///
/// Every write replaces the whole record so concurrent readers observe either
/// the old or the new value, never a mix.
#[async_trait]
pub trait VideoRepository: Send + Sync {
    async fn get_video(&self, video_id: &str) -> Result<Option<VideoRecord>>;
    async fn upsert_video(&self, record: &VideoRecord) -> Result<()>;
    async fn delete_video(&self, video_id: &str) -> Result<()>;
    async fn list_videos(&self) -> Result<Vec<VideoRecord>>;
}

/// SQLx implementation of VideoRepository.
pub struct SqlxVideoRepository {
    pool: SqlitePool,
}

impl SqlxVideoRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

fn decode_row(row: VideoDbModel) -> Result<VideoRecord> {
    let video_id = row.video_id.clone();
    row.into_record()
        .map_err(|e| Error::storage(format!("unreadable record for {video_id}: {e}")))
}

#[async_trait]
impl VideoRepository for SqlxVideoRepository {
    async fn get_video(&self, video_id: &str) -> Result<Option<VideoRecord>> {
        let row = sqlx::query_as::<_, VideoDbModel>("SELECT * FROM videos WHERE video_id = ?")
            .bind(video_id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(decode_row).transpose()
    }

    async fn upsert_video(&self, record: &VideoRecord) -> Result<()> {
        let row = VideoDbModel::from_record(record)?;
        sqlx::query(
            r#"
            INSERT INTO videos (video_id, status, playing, video_info, segment_info, updated_at)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT(video_id) DO UPDATE SET
                status = excluded.status,
                playing = excluded.playing,
                video_info = excluded.video_info,
                segment_info = excluded.segment_info,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&row.video_id)
        .bind(row.status)
        .bind(row.playing)
        .bind(&row.video_info)
        .bind(&row.segment_info)
        .bind(&row.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn delete_video(&self, video_id: &str) -> Result<()> {
        sqlx::query("DELETE FROM videos WHERE video_id = ?")
            .bind(video_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn list_videos(&self) -> Result<Vec<VideoRecord>> {
        let rows = sqlx::query_as::<_, VideoDbModel>("SELECT * FROM videos ORDER BY video_id")
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(decode_row).collect()
    }
}
