use crate::model::{
    Block, Experiment, Group, Id, Keypress, NewBlock, NewExperiment, NewGroup, NewKeypress,
    NewStudy, NewTrial, NewUser, Session, Study, Subject, Trial, User,
};
use anyhow::Result;

/// An insert collided with a unique key, e.g. a username already taken.
#[derive(Debug, thiserror::Error)]
#[error("{0} already exists")]
pub struct DuplicateKey(pub String);

impl DuplicateKey {
    /// True when `error` (or anything it wraps) is a [`DuplicateKey`]
    pub fn is(error: &anyhow::Error) -> bool {
        error.downcast_ref::<DuplicateKey>().is_some()
    }
}

#[async_trait::async_trait]
pub trait UserStore: Send + Sync {
    async fn create_user(&self, user: NewUser) -> Result<User>;
    async fn get_user(&self, id: Id) -> Result<Option<User>>;
    async fn get_user_by_username(&self, username: &str) -> Result<Option<User>>;
}

#[async_trait::async_trait]
pub trait SessionStore: Send + Sync {
    async fn create_session(&self, session: Session) -> Result<()>;
    async fn get_session(&self, token: &str) -> Result<Option<Session>>;
    /// Returns false when no session had that token
    async fn delete_session(&self, token: &str) -> Result<bool>;
}

#[async_trait::async_trait]
pub trait StudyStore: Send + Sync {
    async fn create_study(&self, creator_id: Id, study: NewStudy) -> Result<Study>;
    async fn get_study(&self, id: Id) -> Result<Option<Study>>;
    async fn list_studies_for_user(&self, user_id: Id) -> Result<Vec<Study>>;
    async fn create_group(&self, study_id: Id, creator_id: Id, group: NewGroup) -> Result<Group>;
    async fn get_group(&self, id: Id) -> Result<Option<Group>>;
    async fn list_groups_for_user(&self, user_id: Id) -> Result<Vec<Group>>;
}

#[async_trait::async_trait]
pub trait ExperimentStore: Send + Sync {
    async fn create_experiment(&self, experiment: NewExperiment) -> Result<Experiment>;
    async fn get_experiment(&self, id: Id) -> Result<Option<Experiment>>;
    async fn list_experiments_for_user(&self, user_id: Id) -> Result<Vec<Experiment>>;
    async fn list_experiments_for_group(&self, group_id: Id) -> Result<Vec<Experiment>>;
    async fn create_block(&self, experiment_id: Id, block: NewBlock) -> Result<Block>;
    /// Blocks in table order (ascending id), which is also creation order
    async fn list_blocks(&self, experiment_id: Id) -> Result<Vec<Block>>;
}

/// Trial data captured from subjects. Rows are only ever inserted.
#[async_trait::async_trait]
pub trait RecordingStore: Send + Sync {
    async fn create_subject(&self, age: i32) -> Result<Subject>;
    async fn create_trial(&self, trial: NewTrial) -> Result<Trial>;
    async fn create_keypress(&self, keypress: NewKeypress) -> Result<Keypress>;
    /// All trials of an experiment, ordered by block id then trial id
    async fn list_trials_for_experiment(&self, experiment_id: Id) -> Result<Vec<Trial>>;
    /// Keypresses of the given trials, ordered by trial id then keypress id
    async fn list_keypresses_for_trials(&self, trial_ids: &[Id]) -> Result<Vec<Keypress>>;
}

pub trait Store:
    UserStore + SessionStore + StudyStore + ExperimentStore + RecordingStore + Send + Sync
{
}
