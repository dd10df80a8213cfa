mod accounts;
mod media;
mod migrations;
mod posts;

pub use accounts::*;
pub use media::*;
pub use posts::*;

use sqlx::PgPool;

/// Transactional persistence for accounts, posts, and media assets. A thin
/// wrapper over a `PgPool`, with methods grouped into per-concern modules
/// rather than one flat impl block.
#[derive(Clone)]
pub struct Store {
    pool: PgPool,
}

impl Store {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub async fn migrate(&self) -> anyhow::Result<()> {
        migrations::migrate(&self.pool).await
    }
}
