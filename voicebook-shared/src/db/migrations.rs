/// Embedded schema migrations
///
/// Migrations live in `voicebook-shared/migrations/` as reversible
/// `{version}_{name}.up.sql` / `.down.sql` pairs and are compiled into the
/// binary with `sqlx::migrate!`.

use sqlx::postgres::PgPool;
use tracing::{info, warn};

/// Runs all pending migrations
///
/// # Errors
///
/// Returns an error if a migration fails to apply; the failing migration is
/// rolled back.
pub async fn run_migrations(pool: &PgPool) -> Result<(), sqlx::migrate::MigrateError> {
    info!("Starting database migrations");

    let migrator = sqlx::migrate!("./migrations");

    match migrator.run(pool).await {
        Ok(()) => {
            info!(
                migrations = migrator.iter().count(),
                "Database migrations completed"
            );
            Ok(())
        }
        Err(e) => {
            warn!(error = %e, "Migration failed");
            Err(e)
        }
    }
}
