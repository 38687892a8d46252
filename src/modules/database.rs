use crate::config::database::PostgresSettings;
use sqlx::{postgres::PgPoolOptions, PgConnection, PgPool};
use tracing::info;

pub async fn get_postgres_pool(config: PostgresSettings) -> PgPool {
    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&config.database_url)
        .await
        .expect("Failed to connect to postgres");

    if config.is_migrating {
        info!("Running database migrations");
        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .expect("Failed to run migrations");
    }

    pool
}

/// Groups related queries behind a marker type so query helpers hang off
/// `impl PgQuery<'c, Marker>` blocks instead of loose functions.
pub struct PgQuery<'c, T> {
    pub payload: T,
    pub conn: &'c mut PgConnection,
}

impl<'c, T> PgQuery<'c, T> {
    pub fn new(payload: T, conn: &'c mut PgConnection) -> Self {
        Self { payload, conn }
    }
}
