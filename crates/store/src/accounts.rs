use crate::Store;
use domain::model::{Account, AccountId};
use domain::{CoreError, CoreResult};
use sqlx::Row;
use std::str::FromStr;

fn row_to_account(row: &sqlx::postgres::PgRow) -> CoreResult<Account> {
    let tz_name: String = row.try_get("timezone").map_err(transient)?;
    let timezone = chrono_tz::Tz::from_str(&tz_name)
        .map_err(|_| CoreError::Validation(format!("invalid stored timezone: {tz_name}")))?;
    Ok(Account {
        id: row.try_get("id").map_err(transient)?,
        platform_user_id: row.try_get("platform_user_id").map_err(transient)?,
        handle: row.try_get("handle").map_err(transient)?,
        access_token: row.try_get("access_token").map_err(transient)?,
        timezone,
        active: row.try_get("active").map_err(transient)?,
    })
}

fn transient(e: sqlx::Error) -> CoreError {
    CoreError::Transient(e.to_string())
}

impl Store {
    pub async fn list_accounts(&self) -> CoreResult<Vec<Account>> {
        let rows = sqlx::query(
            "select id, platform_user_id, handle, access_token, timezone, active \
             from scheduler.accounts order by id",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(transient)?;
        rows.iter().map(row_to_account).collect()
    }

    pub async fn get_account(&self, id: AccountId) -> CoreResult<Account> {
        let row = sqlx::query(
            "select id, platform_user_id, handle, access_token, timezone, active \
             from scheduler.accounts where id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(transient)?
        .ok_or_else(|| CoreError::NotFound(format!("account {id}")))?;
        row_to_account(&row)
    }

    /// Upserts by `platform_user_id`, the external identity. Used by the
    /// account-refresh surface, which receives a fresh token/timezone from
    /// the external OAuth flow.
    pub async fn upsert_account(
        &self,
        platform_user_id: &str,
        handle: &str,
        access_token: &str,
        timezone: chrono_tz::Tz,
    ) -> CoreResult<Account> {
        let row = sqlx::query(
            "insert into scheduler.accounts (platform_user_id, handle, access_token, timezone) \
             values ($1, $2, $3, $4) \
             on conflict (platform_user_id) do update set \
                handle = excluded.handle, \
                access_token = excluded.access_token, \
                timezone = excluded.timezone \
             returning id, platform_user_id, handle, access_token, timezone, active",
        )
        .bind(platform_user_id)
        .bind(handle)
        .bind(access_token)
        .bind(timezone.name())
        .fetch_one(&self.pool)
        .await
        .map_err(transient)?;
        row_to_account(&row)
    }

    pub async fn set_account_active(&self, id: AccountId, active: bool) -> CoreResult<()> {
        let n = sqlx::query("update scheduler.accounts set active = $1 where id = $2")
            .bind(active)
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(transient)?
            .rows_affected();
        if n == 0 {
            return Err(CoreError::NotFound(format!("account {id}")));
        }
        Ok(())
    }

    /// Spec §6 `/freeze`: flips `active=false` and fails every non-terminal
    /// post for the account in the same transaction, so a concurrent
    /// leaser tick can never observe the account marked inactive with a
    /// post still `scheduled`/`leased`/`publishing`.
    pub async fn freeze_account(&self, id: AccountId) -> CoreResult<u64> {
        let mut tx = self.pool.begin().await.map_err(transient)?;

        let n = sqlx::query("update scheduler.accounts set active = false where id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(transient)?
            .rows_affected();
        if n == 0 {
            return Err(CoreError::NotFound(format!("account {id}")));
        }

        let failed = sqlx::query(
            "update scheduler.posts set \
                status = 'failed', \
                error_code = 'account_frozen', \
                locked_at = null, \
                leased_by = null, \
                lease_expires_at = null, \
                updated_at = now() \
             where account_id = $1 and status in ('scheduled', 'leased', 'publishing')",
        )
        .bind(id)
        .execute(&mut *tx)
        .await
        .map_err(transient)?
        .rows_affected();

        tx.commit().await.map_err(transient)?;
        Ok(failed)
    }
}
