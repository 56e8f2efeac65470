use anyhow::{anyhow, Context, Result};
use sqlx::{postgres::PgPoolOptions, postgres::PgRow, PgPool, Row};

use crate::model::{
    Block, BlockType, Experiment, Group, Id, Keypress, NewBlock, NewExperiment, NewGroup,
    NewKeypress, NewStudy, NewTrial, NewUser, Session, Study, Subject, Trial, User,
};
use crate::store::migrations;
use crate::store::traits::{
    DuplicateKey, ExperimentStore, RecordingStore, SessionStore, Store, StudyStore, UserStore,
};

#[derive(Debug, Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Create a new PostgreSQL store with the given database URL
    pub async fn new(database_url: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await
            .context("Failed to create PostgreSQL connection pool")?;

        Ok(Self { pool })
    }

    /// Bring the schema up to the latest migration
    pub async fn migrate(&self) -> Result<()> {
        migrations::run_migrations(&self.pool).await
    }
}

const USER_COLUMNS: &str = "id, username, email, password_hash, date_joined";
const STUDY_COLUMNS: &str = "id, name, description, creator_id, created_at";
const GROUP_COLUMNS: &str = "id, name, study_id, creator_id, created_at";
const EXPERIMENT_COLUMNS: &str = "id, name, creator_id, group_id, created_at";
const BLOCK_COLUMNS: &str =
    "id, experiment_id, sequence, block_type, max_time, max_time_per_trial, resting_time, num_trials";

fn user_from_row(row: &PgRow) -> User {
    User {
        id: row.get("id"),
        username: row.get("username"),
        email: row.get("email"),
        password_hash: row.get("password_hash"),
        date_joined: row.get("date_joined"),
    }
}

fn study_from_row(row: &PgRow) -> Study {
    Study {
        id: row.get("id"),
        name: row.get("name"),
        description: row.get("description"),
        creator_id: row.get("creator_id"),
        created_at: row.get("created_at"),
    }
}

fn group_from_row(row: &PgRow) -> Group {
    Group {
        id: row.get("id"),
        name: row.get("name"),
        study_id: row.get("study_id"),
        creator_id: row.get("creator_id"),
        created_at: row.get("created_at"),
    }
}

fn experiment_from_row(row: &PgRow) -> Experiment {
    Experiment {
        id: row.get("id"),
        name: row.get("name"),
        creator_id: row.get("creator_id"),
        group_id: row.get("group_id"),
        created_at: row.get("created_at"),
    }
}

fn block_from_row(row: &PgRow) -> Result<Block> {
    let block_type: String = row.get("block_type");
    let block_type: BlockType = block_type
        .parse()
        .map_err(|e| anyhow!("Corrupt block row: {}", e))?;

    Ok(Block {
        id: row.get("id"),
        experiment_id: row.get("experiment_id"),
        sequence: row.get("sequence"),
        block_type,
        max_time: row.get("max_time"),
        max_time_per_trial: row.get("max_time_per_trial"),
        resting_time: row.get("resting_time"),
        num_trials: row.get("num_trials"),
    })
}

fn trial_from_row(row: &PgRow) -> Trial {
    Trial {
        id: row.get("id"),
        block_id: row.get("block_id"),
        subject_id: row.get("subject_id"),
        started_at: row.get("started_at"),
    }
}

fn keypress_from_row(row: &PgRow) -> Keypress {
    Keypress {
        id: row.get("id"),
        trial_id: row.get("trial_id"),
        value: row.get("value"),
        timestamp: row.get("timestamp"),
    }
}

#[async_trait::async_trait]
impl UserStore for PostgresStore {
    async fn create_user(&self, user: NewUser) -> Result<User> {
        let row = sqlx::query(&format!(
            "INSERT INTO users (username, email, password_hash) VALUES ($1, $2, $3) RETURNING {}",
            USER_COLUMNS
        ))
        .bind(&user.username)
        .bind(&user.email)
        .bind(&user.password_hash)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match e.as_database_error() {
            Some(db) if db.is_unique_violation() => {
                anyhow::Error::new(DuplicateKey(format!("username '{}'", user.username)))
            }
            _ => anyhow::Error::new(e).context("Failed to create user"),
        })?;

        Ok(user_from_row(&row))
    }

    async fn get_user(&self, id: Id) -> Result<Option<User>> {
        let row = sqlx::query(&format!("SELECT {} FROM users WHERE id = $1", USER_COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to fetch user")?;

        Ok(row.as_ref().map(user_from_row))
    }

    async fn get_user_by_username(&self, username: &str) -> Result<Option<User>> {
        let row = sqlx::query(&format!("SELECT {} FROM users WHERE username = $1", USER_COLUMNS))
            .bind(username)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to fetch user by username")?;

        Ok(row.as_ref().map(user_from_row))
    }
}

#[async_trait::async_trait]
impl SessionStore for PostgresStore {
    async fn create_session(&self, session: Session) -> Result<()> {
        sqlx::query(
            "INSERT INTO sessions (token, user_id, created_at, expires_at) VALUES ($1, $2, $3, $4)",
        )
        .bind(&session.token)
        .bind(session.user_id)
        .bind(session.created_at)
        .bind(session.expires_at)
        .execute(&self.pool)
        .await
        .context("Failed to create session")?;

        Ok(())
    }

    async fn get_session(&self, token: &str) -> Result<Option<Session>> {
        let row = sqlx::query(
            "SELECT token, user_id, created_at, expires_at FROM sessions WHERE token = $1",
        )
        .bind(token)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to fetch session")?;

        Ok(row.map(|row| Session {
            token: row.get("token"),
            user_id: row.get("user_id"),
            created_at: row.get("created_at"),
            expires_at: row.get("expires_at"),
        }))
    }

    async fn delete_session(&self, token: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM sessions WHERE token = $1")
            .bind(token)
            .execute(&self.pool)
            .await
            .context("Failed to delete session")?;

        Ok(result.rows_affected() > 0)
    }
}

#[async_trait::async_trait]
impl StudyStore for PostgresStore {
    async fn create_study(&self, creator_id: Id, study: NewStudy) -> Result<Study> {
        let row = sqlx::query(&format!(
            "INSERT INTO studies (name, description, creator_id) VALUES ($1, $2, $3) RETURNING {}",
            STUDY_COLUMNS
        ))
        .bind(&study.name)
        .bind(&study.description)
        .bind(creator_id)
        .fetch_one(&self.pool)
        .await
        .context("Failed to create study")?;

        Ok(study_from_row(&row))
    }

    async fn get_study(&self, id: Id) -> Result<Option<Study>> {
        let row = sqlx::query(&format!("SELECT {} FROM studies WHERE id = $1", STUDY_COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to fetch study")?;

        Ok(row.as_ref().map(study_from_row))
    }

    async fn list_studies_for_user(&self, user_id: Id) -> Result<Vec<Study>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM studies WHERE creator_id = $1 ORDER BY id",
            STUDY_COLUMNS
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .context("Failed to list studies")?;

        Ok(rows.iter().map(study_from_row).collect())
    }

    async fn create_group(&self, study_id: Id, creator_id: Id, group: NewGroup) -> Result<Group> {
        let row = sqlx::query(&format!(
            "INSERT INTO study_groups (name, study_id, creator_id) VALUES ($1, $2, $3) RETURNING {}",
            GROUP_COLUMNS
        ))
        .bind(&group.name)
        .bind(study_id)
        .bind(creator_id)
        .fetch_one(&self.pool)
        .await
        .context("Failed to create group")?;

        Ok(group_from_row(&row))
    }

    async fn get_group(&self, id: Id) -> Result<Option<Group>> {
        let row = sqlx::query(&format!("SELECT {} FROM study_groups WHERE id = $1", GROUP_COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to fetch group")?;

        Ok(row.as_ref().map(group_from_row))
    }

    async fn list_groups_for_user(&self, user_id: Id) -> Result<Vec<Group>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM study_groups WHERE creator_id = $1 ORDER BY id",
            GROUP_COLUMNS
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .context("Failed to list groups")?;

        Ok(rows.iter().map(group_from_row).collect())
    }
}

#[async_trait::async_trait]
impl ExperimentStore for PostgresStore {
    async fn create_experiment(&self, experiment: NewExperiment) -> Result<Experiment> {
        let row = sqlx::query(&format!(
            "INSERT INTO experiments (name, creator_id, group_id) VALUES ($1, $2, $3) RETURNING {}",
            EXPERIMENT_COLUMNS
        ))
        .bind(&experiment.name)
        .bind(experiment.creator_id)
        .bind(experiment.group_id)
        .fetch_one(&self.pool)
        .await
        .context("Failed to create experiment")?;

        Ok(experiment_from_row(&row))
    }

    async fn get_experiment(&self, id: Id) -> Result<Option<Experiment>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM experiments WHERE id = $1",
            EXPERIMENT_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to fetch experiment")?;

        Ok(row.as_ref().map(experiment_from_row))
    }

    async fn list_experiments_for_user(&self, user_id: Id) -> Result<Vec<Experiment>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM experiments WHERE creator_id = $1 ORDER BY id",
            EXPERIMENT_COLUMNS
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .context("Failed to list experiments")?;

        Ok(rows.iter().map(experiment_from_row).collect())
    }

    async fn list_experiments_for_group(&self, group_id: Id) -> Result<Vec<Experiment>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM experiments WHERE group_id = $1 ORDER BY id",
            EXPERIMENT_COLUMNS
        ))
        .bind(group_id)
        .fetch_all(&self.pool)
        .await
        .context("Failed to list group experiments")?;

        Ok(rows.iter().map(experiment_from_row).collect())
    }

    async fn create_block(&self, experiment_id: Id, block: NewBlock) -> Result<Block> {
        let row = sqlx::query(&format!(
            r#"
            INSERT INTO blocks (experiment_id, sequence, block_type, max_time, max_time_per_trial, resting_time, num_trials)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING {}
            "#,
            BLOCK_COLUMNS
        ))
        .bind(experiment_id)
        .bind(&block.sequence)
        .bind(block.block_type.as_str())
        .bind(block.max_time)
        .bind(block.max_time_per_trial)
        .bind(block.resting_time)
        .bind(block.num_trials)
        .fetch_one(&self.pool)
        .await
        .context("Failed to create block")?;

        block_from_row(&row)
    }

    async fn list_blocks(&self, experiment_id: Id) -> Result<Vec<Block>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM blocks WHERE experiment_id = $1 ORDER BY id",
            BLOCK_COLUMNS
        ))
        .bind(experiment_id)
        .fetch_all(&self.pool)
        .await
        .context("Failed to list blocks")?;

        rows.iter().map(block_from_row).collect()
    }
}

#[async_trait::async_trait]
impl RecordingStore for PostgresStore {
    async fn create_subject(&self, age: i32) -> Result<Subject> {
        let row = sqlx::query("INSERT INTO subjects (age) VALUES ($1) RETURNING id, age, created_at")
            .bind(age)
            .fetch_one(&self.pool)
            .await
            .context("Failed to create subject")?;

        Ok(Subject {
            id: row.get("id"),
            age: row.get("age"),
            created_at: row.get("created_at"),
        })
    }

    async fn create_trial(&self, trial: NewTrial) -> Result<Trial> {
        let row = sqlx::query(
            r#"
            INSERT INTO trials (block_id, subject_id, started_at)
            VALUES ($1, $2, $3)
            RETURNING id, block_id, subject_id, started_at
            "#,
        )
        .bind(trial.block_id)
        .bind(trial.subject_id)
        .bind(trial.started_at)
        .fetch_one(&self.pool)
        .await
        .context("Failed to create trial")?;

        Ok(trial_from_row(&row))
    }

    async fn create_keypress(&self, keypress: NewKeypress) -> Result<Keypress> {
        let row = sqlx::query(
            r#"
            INSERT INTO keypresses (trial_id, value, timestamp)
            VALUES ($1, $2, $3)
            RETURNING id, trial_id, value, timestamp
            "#,
        )
        .bind(keypress.trial_id)
        .bind(&keypress.value)
        .bind(keypress.timestamp)
        .fetch_one(&self.pool)
        .await
        .context("Failed to create keypress")?;

        Ok(keypress_from_row(&row))
    }

    async fn list_trials_for_experiment(&self, experiment_id: Id) -> Result<Vec<Trial>> {
        let rows = sqlx::query(
            r#"
            SELECT t.id, t.block_id, t.subject_id, t.started_at
            FROM trials t
            JOIN blocks b ON b.id = t.block_id
            WHERE b.experiment_id = $1
            ORDER BY t.block_id, t.id
            "#,
        )
        .bind(experiment_id)
        .fetch_all(&self.pool)
        .await
        .context("Failed to list trials")?;

        Ok(rows.iter().map(trial_from_row).collect())
    }

    async fn list_keypresses_for_trials(&self, trial_ids: &[Id]) -> Result<Vec<Keypress>> {
        if trial_ids.is_empty() {
            return Ok(Vec::new());
        }
        let rows = sqlx::query(
            r#"
            SELECT id, trial_id, value, timestamp
            FROM keypresses
            WHERE trial_id = ANY($1)
            ORDER BY trial_id, id
            "#,
        )
        .bind(trial_ids)
        .fetch_all(&self.pool)
        .await
        .context("Failed to list keypresses")?;

        Ok(rows.iter().map(keypress_from_row).collect())
    }
}

impl Store for PostgresStore {}
