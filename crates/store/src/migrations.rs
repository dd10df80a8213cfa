use anyhow::Context;
use sqlx::{Executor, PgPool, Postgres};

const MIGRATIONS: &[(i32, &str)] = &[
    (1, include_str!("migrations/0001_schema.sql")),
    (2, include_str!("migrations/0002_lease_ownership.sql")),
];

/// Single-connection advisory lock around the whole migration sequence:
/// advisory locks are per-session, so lock/run/unlock must happen on one
/// connection or a concurrent migrator could acquire the lock on a
/// different session while this one is still mid-migration.
const MIGRATION_LOCK_KEY: i64 = 0x5343_4845_4455_4C52; // "SCHEDULR"

pub async fn migrate(pool: &PgPool) -> anyhow::Result<()> {
    let mut conn = pool
        .acquire()
        .await
        .context("acquire connection for scheduler migrations")?;

    sqlx::query("select pg_advisory_lock($1)")
        .bind(MIGRATION_LOCK_KEY)
        .execute(&mut *conn)
        .await
        .context("acquire scheduler migration lock")?;

    let res: anyhow::Result<()> = async {
        exec_sql_batch(&mut *conn, MIGRATIONS[0].1)
            .await
            .context("apply scheduler schema bootstrap (v1)")?;

        for (version, sql) in MIGRATIONS {
            if *version == 1 {
                continue;
            }
            let applied: Option<i32> = sqlx::query_scalar(
                "select version from scheduler.schema_migrations where version = $1",
            )
            .bind(*version)
            .fetch_optional(&mut *conn)
            .await
            .context("read scheduler.schema_migrations")?;

            if applied.is_some() {
                continue;
            }

            let mut tx = conn.begin().await.context("begin migration tx")?;
            exec_sql_batch(&mut *tx, sql)
                .await
                .with_context(|| format!("apply scheduler migration v{version}"))?;
            sqlx::query("insert into scheduler.schema_migrations(version) values ($1)")
                .bind(*version)
                .execute(&mut *tx)
                .await
                .context("insert scheduler.schema_migrations")?;
            tx.commit().await.context("commit migration tx")?;
        }
        Ok(())
    }
    .await;

    let _ = sqlx::query("select pg_advisory_unlock($1)")
        .bind(MIGRATION_LOCK_KEY)
        .execute(&mut *conn)
        .await;

    res
}

async fn exec_sql_batch<E>(exec: &mut E, sql: &str) -> anyhow::Result<()>
where
    for<'c> &'c mut E: Executor<'c, Database = Postgres>,
{
    for stmt in sql.split(';') {
        let s = stmt.trim();
        if s.is_empty() {
            continue;
        }
        sqlx::query(s).execute(&mut *exec).await.with_context(|| {
            format!(
                "execute migration statement: {}",
                s.lines().next().unwrap_or("")
            )
        })?;
    }
    Ok(())
}
