//! Versioned schema migrations.
//!
//! Applied versions are tracked in `schema_version`. Migrations run in
//! order, each inside its own transaction, and every statement is written
//! to be safe to re-run. Never edit a released migration; append a new one.

use anyhow::{Context, Result};
use sqlx::PgPool;

pub struct Migration {
    pub version: i32,
    pub description: &'static str,
    pub statements: &'static [&'static str],
}

pub const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        description: "users and sessions",
        statements: &[
            r#"
            CREATE TABLE IF NOT EXISTS users (
                id BIGSERIAL PRIMARY KEY,
                username VARCHAR(150) NOT NULL UNIQUE,
                email TEXT,
                password_hash TEXT NOT NULL,
                date_joined TIMESTAMPTZ NOT NULL DEFAULT NOW()
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS sessions (
                token TEXT PRIMARY KEY,
                user_id BIGINT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                created_at TIMESTAMPTZ NOT NULL,
                expires_at TIMESTAMPTZ NOT NULL
            )
            "#,
            "CREATE INDEX IF NOT EXISTS idx_sessions_user ON sessions(user_id)",
        ],
    },
    Migration {
        version: 2,
        description: "experiments and blocks",
        statements: &[
            r#"
            CREATE TABLE IF NOT EXISTS experiments (
                id BIGSERIAL PRIMARY KEY,
                name VARCHAR(100) NOT NULL,
                creator_id BIGINT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS blocks (
                id BIGSERIAL PRIMARY KEY,
                experiment_id BIGINT NOT NULL REFERENCES experiments(id) ON DELETE CASCADE,
                sequence VARCHAR(100) NOT NULL,
                block_type TEXT NOT NULL,
                max_time INTEGER NOT NULL CHECK (max_time >= 0),
                max_time_per_trial INTEGER NOT NULL CHECK (max_time_per_trial >= 0),
                resting_time INTEGER NOT NULL CHECK (resting_time >= 0),
                num_trials INTEGER NOT NULL CHECK (num_trials >= 1)
            )
            "#,
            "CREATE INDEX IF NOT EXISTS idx_experiments_creator ON experiments(creator_id)",
            "CREATE INDEX IF NOT EXISTS idx_blocks_experiment ON blocks(experiment_id)",
        ],
    },
    Migration {
        version: 3,
        description: "subjects, trials and keypresses",
        statements: &[
            r#"
            CREATE TABLE IF NOT EXISTS subjects (
                id BIGSERIAL PRIMARY KEY,
                age INTEGER NOT NULL,
                created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS trials (
                id BIGSERIAL PRIMARY KEY,
                block_id BIGINT NOT NULL REFERENCES blocks(id) ON DELETE CASCADE,
                subject_id BIGINT NOT NULL REFERENCES subjects(id) ON DELETE CASCADE,
                started_at TIMESTAMPTZ NOT NULL
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS keypresses (
                id BIGSERIAL PRIMARY KEY,
                trial_id BIGINT NOT NULL REFERENCES trials(id) ON DELETE CASCADE,
                value TEXT NOT NULL,
                timestamp TIMESTAMPTZ NOT NULL
            )
            "#,
            "CREATE INDEX IF NOT EXISTS idx_trials_block ON trials(block_id)",
            "CREATE INDEX IF NOT EXISTS idx_keypresses_trial ON keypresses(trial_id)",
        ],
    },
    Migration {
        version: 4,
        description: "studies, groups and experiment grouping",
        statements: &[
            r#"
            CREATE TABLE IF NOT EXISTS studies (
                id BIGSERIAL PRIMARY KEY,
                name VARCHAR(100) NOT NULL,
                description TEXT,
                creator_id BIGINT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS study_groups (
                id BIGSERIAL PRIMARY KEY,
                name VARCHAR(100) NOT NULL,
                study_id BIGINT NOT NULL REFERENCES studies(id) ON DELETE CASCADE,
                creator_id BIGINT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
            )
            "#,
            r#"
            ALTER TABLE experiments
                ADD COLUMN IF NOT EXISTS group_id BIGINT REFERENCES study_groups(id) ON DELETE CASCADE
            "#,
            "CREATE INDEX IF NOT EXISTS idx_experiments_group ON experiments(group_id)",
        ],
    },
];

/// Highest version in [`MIGRATIONS`]
pub fn latest_version() -> i32 {
    MIGRATIONS.iter().map(|m| m.version).max().unwrap_or(0)
}

async fn current_version(pool: &PgPool) -> Result<i32> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            applied_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
        )
        "#,
    )
    .execute(pool)
    .await
    .context("Failed to create schema_version table")?;

    let version: Option<i32> = sqlx::query_scalar("SELECT MAX(version) FROM schema_version")
        .fetch_one(pool)
        .await
        .context("Failed to read schema version")?;

    Ok(version.unwrap_or(0))
}

/// Applies every migration newer than the recorded schema version.
pub async fn run_migrations(pool: &PgPool) -> Result<()> {
    let current = current_version(pool).await?;
    let latest = latest_version();

    if current == latest {
        log::info!("Database schema is up to date (v{})", current);
        return Ok(());
    }
    if current > latest {
        log::warn!(
            "Database schema version ({}) is newer than this build ({}); leaving it alone",
            current,
            latest
        );
        return Ok(());
    }

    log::info!("Running database migrations: v{} -> v{}", current, latest);
    for migration in MIGRATIONS.iter().filter(|m| m.version > current) {
        let mut tx = pool.begin().await?;
        for statement in migration.statements {
            sqlx::query(statement)
                .execute(&mut *tx)
                .await
                .with_context(|| {
                    format!(
                        "Migration v{} ({}) failed",
                        migration.version, migration.description
                    )
                })?;
        }
        sqlx::query("INSERT INTO schema_version (version) VALUES ($1)")
            .bind(migration.version)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        log::info!("Applied migration v{}: {}", migration.version, migration.description);
    }

    Ok(())
}
