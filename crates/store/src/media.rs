use crate::Store;
use domain::model::{AccountId, MediaAsset, MediaAssetId};
use domain::{CoreError, CoreResult};
use sqlx::Row;

fn row_to_media(row: &sqlx::postgres::PgRow) -> CoreResult<MediaAsset> {
    Ok(MediaAsset {
        id: row.try_get("id").map_err(transient)?,
        account_id: row.try_get("account_id").map_err(transient)?,
        stored_path: row.try_get("stored_path").map_err(transient)?,
        media_url: row.try_get("media_url").map_err(transient)?,
        bytes: row.try_get("bytes").map_err(transient)?,
        sha256: row.try_get("sha256").map_err(transient)?,
        short_hash: row.try_get("short_hash").map_err(transient)?,
    })
}

fn transient(e: sqlx::Error) -> CoreError {
    CoreError::Transient(e.to_string())
}

impl Store {
    /// `(account_id, sha256)` is unique; re-registering the same asset for
    /// an account is idempotent.
    pub async fn register_media_asset(
        &self,
        account_id: AccountId,
        stored_path: &str,
        media_url: &str,
        bytes: i64,
        sha256: &str,
        short_hash: &str,
    ) -> CoreResult<MediaAsset> {
        let row = sqlx::query(
            "insert into scheduler.media_assets \
                (account_id, stored_path, media_url, bytes, sha256, short_hash) \
             values ($1, $2, $3, $4, $5, $6) \
             on conflict (account_id, sha256) do update set \
                stored_path = excluded.stored_path, media_url = excluded.media_url \
             returning id, account_id, stored_path, media_url, bytes, sha256, short_hash",
        )
        .bind(account_id)
        .bind(stored_path)
        .bind(media_url)
        .bind(bytes)
        .bind(sha256)
        .bind(short_hash)
        .fetch_one(&self.pool)
        .await
        .map_err(transient)?;
        row_to_media(&row)
    }

    pub async fn get_media_asset(&self, id: MediaAssetId) -> CoreResult<MediaAsset> {
        let row = sqlx::query(
            "select id, account_id, stored_path, media_url, bytes, sha256, short_hash \
             from scheduler.media_assets where id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(transient)?
        .ok_or_else(|| CoreError::NotFound(format!("media asset {id}")))?;
        row_to_media(&row)
    }

    pub async fn list_media_assets(&self, account_id: AccountId) -> CoreResult<Vec<MediaAsset>> {
        let rows = sqlx::query(
            "select id, account_id, stored_path, media_url, bytes, sha256, short_hash \
             from scheduler.media_assets where account_id = $1 order by id",
        )
        .bind(account_id)
        .fetch_all(&self.pool)
        .await
        .map_err(transient)?;
        rows.iter().map(row_to_media).collect()
    }
}
