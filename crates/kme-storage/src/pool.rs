use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

/// Thin wrapper over the connection pool, mirroring the rest of the
/// codebase's preference for an explicit handle over a bare type alias.
pub struct DatabasePool {
    pool: PgPool,
}

impl DatabasePool {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn get_pool(&self) -> &PgPool {
        &self.pool
    }
}

/// Connects with a bounded pool size. Schema management (migrations) is
/// an administrative concern external to this crate; the core assumes
/// the `keys`, `saes`, `key_access_logs`, and `key_distribution_events`
/// tables already exist.
pub async fn create_pool(database_url: &str, max_connections: u32, min_connections: u32) -> anyhow::Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(max_connections)
        .min_connections(min_connections)
        .connect(database_url)
        .await?;
    Ok(pool)
}
