use anyhow::{bail, Result};
use chrono::Utc;
use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};

use crate::model::{
    Block, Experiment, Group, Id, Keypress, NewBlock, NewExperiment, NewGroup, NewKeypress,
    NewStudy, NewTrial, NewUser, Session, Study, Subject, Trial, User,
};
use crate::store::traits::{
    DuplicateKey, ExperimentStore, RecordingStore, SessionStore, Store, StudyStore, UserStore,
};

#[derive(Debug, Default)]
struct Tables {
    next_id: Id,
    users: Vec<User>,
    sessions: HashMap<String, Session>,
    studies: Vec<Study>,
    groups: Vec<Group>,
    experiments: Vec<Experiment>,
    blocks: Vec<Block>,
    subjects: Vec<Subject>,
    trials: Vec<Trial>,
    keypresses: Vec<Keypress>,
}

impl Tables {
    fn allocate_id(&mut self) -> Id {
        self.next_id += 1;
        self.next_id
    }
}

/// Row counts of the recording tables
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordCounts {
    pub subjects: usize,
    pub trials: usize,
    pub keypresses: usize,
}

/// Store kept entirely in process memory, for tests and local demos.
/// Rows are appended in id order, so table order matches the SQL store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn counts(&self) -> RecordCounts {
        let tables = self.tables.read();
        RecordCounts {
            subjects: tables.subjects.len(),
            trials: tables.trials.len(),
            keypresses: tables.keypresses.len(),
        }
    }
}

#[async_trait::async_trait]
impl UserStore for MemoryStore {
    async fn create_user(&self, user: NewUser) -> Result<User> {
        let mut tables = self.tables.write();
        if tables.users.iter().any(|u| u.username == user.username) {
            return Err(DuplicateKey(format!("username '{}'", user.username)).into());
        }
        let user = User {
            id: tables.allocate_id(),
            username: user.username,
            email: user.email,
            password_hash: user.password_hash,
            date_joined: Utc::now(),
        };
        tables.users.push(user.clone());
        Ok(user)
    }

    async fn get_user(&self, id: Id) -> Result<Option<User>> {
        Ok(self.tables.read().users.iter().find(|u| u.id == id).cloned())
    }

    async fn get_user_by_username(&self, username: &str) -> Result<Option<User>> {
        Ok(self
            .tables
            .read()
            .users
            .iter()
            .find(|u| u.username == username)
            .cloned())
    }
}

#[async_trait::async_trait]
impl SessionStore for MemoryStore {
    async fn create_session(&self, session: Session) -> Result<()> {
        self.tables
            .write()
            .sessions
            .insert(session.token.clone(), session);
        Ok(())
    }

    async fn get_session(&self, token: &str) -> Result<Option<Session>> {
        Ok(self.tables.read().sessions.get(token).cloned())
    }

    async fn delete_session(&self, token: &str) -> Result<bool> {
        Ok(self.tables.write().sessions.remove(token).is_some())
    }
}

#[async_trait::async_trait]
impl StudyStore for MemoryStore {
    async fn create_study(&self, creator_id: Id, study: NewStudy) -> Result<Study> {
        let mut tables = self.tables.write();
        let study = Study {
            id: tables.allocate_id(),
            name: study.name,
            description: study.description,
            creator_id,
            created_at: Utc::now(),
        };
        tables.studies.push(study.clone());
        Ok(study)
    }

    async fn get_study(&self, id: Id) -> Result<Option<Study>> {
        Ok(self.tables.read().studies.iter().find(|s| s.id == id).cloned())
    }

    async fn list_studies_for_user(&self, user_id: Id) -> Result<Vec<Study>> {
        Ok(self
            .tables
            .read()
            .studies
            .iter()
            .filter(|s| s.creator_id == user_id)
            .cloned()
            .collect())
    }

    async fn create_group(&self, study_id: Id, creator_id: Id, group: NewGroup) -> Result<Group> {
        let mut tables = self.tables.write();
        if !tables.studies.iter().any(|s| s.id == study_id) {
            bail!("study {} does not exist", study_id);
        }
        let group = Group {
            id: tables.allocate_id(),
            name: group.name,
            study_id,
            creator_id,
            created_at: Utc::now(),
        };
        tables.groups.push(group.clone());
        Ok(group)
    }

    async fn get_group(&self, id: Id) -> Result<Option<Group>> {
        Ok(self.tables.read().groups.iter().find(|g| g.id == id).cloned())
    }

    async fn list_groups_for_user(&self, user_id: Id) -> Result<Vec<Group>> {
        Ok(self
            .tables
            .read()
            .groups
            .iter()
            .filter(|g| g.creator_id == user_id)
            .cloned()
            .collect())
    }
}

#[async_trait::async_trait]
impl ExperimentStore for MemoryStore {
    async fn create_experiment(&self, experiment: NewExperiment) -> Result<Experiment> {
        let mut tables = self.tables.write();
        let experiment = Experiment {
            id: tables.allocate_id(),
            name: experiment.name,
            creator_id: experiment.creator_id,
            group_id: experiment.group_id,
            created_at: Utc::now(),
        };
        tables.experiments.push(experiment.clone());
        Ok(experiment)
    }

    async fn get_experiment(&self, id: Id) -> Result<Option<Experiment>> {
        Ok(self
            .tables
            .read()
            .experiments
            .iter()
            .find(|e| e.id == id)
            .cloned())
    }

    async fn list_experiments_for_user(&self, user_id: Id) -> Result<Vec<Experiment>> {
        Ok(self
            .tables
            .read()
            .experiments
            .iter()
            .filter(|e| e.creator_id == user_id)
            .cloned()
            .collect())
    }

    async fn list_experiments_for_group(&self, group_id: Id) -> Result<Vec<Experiment>> {
        Ok(self
            .tables
            .read()
            .experiments
            .iter()
            .filter(|e| e.group_id == Some(group_id))
            .cloned()
            .collect())
    }

    async fn create_block(&self, experiment_id: Id, block: NewBlock) -> Result<Block> {
        let mut tables = self.tables.write();
        if !tables.experiments.iter().any(|e| e.id == experiment_id) {
            bail!("experiment {} does not exist", experiment_id);
        }
        let block = Block {
            id: tables.allocate_id(),
            experiment_id,
            sequence: block.sequence,
            block_type: block.block_type,
            max_time: block.max_time,
            max_time_per_trial: block.max_time_per_trial,
            resting_time: block.resting_time,
            num_trials: block.num_trials,
        };
        tables.blocks.push(block.clone());
        Ok(block)
    }

    async fn list_blocks(&self, experiment_id: Id) -> Result<Vec<Block>> {
        Ok(self
            .tables
            .read()
            .blocks
            .iter()
            .filter(|b| b.experiment_id == experiment_id)
            .cloned()
            .collect())
    }
}

#[async_trait::async_trait]
impl RecordingStore for MemoryStore {
    async fn create_subject(&self, age: i32) -> Result<Subject> {
        let mut tables = self.tables.write();
        let subject = Subject {
            id: tables.allocate_id(),
            age,
            created_at: Utc::now(),
        };
        tables.subjects.push(subject.clone());
        Ok(subject)
    }

    async fn create_trial(&self, trial: NewTrial) -> Result<Trial> {
        let mut tables = self.tables.write();
        if !tables.blocks.iter().any(|b| b.id == trial.block_id) {
            bail!("block {} does not exist", trial.block_id);
        }
        if !tables.subjects.iter().any(|s| s.id == trial.subject_id) {
            bail!("subject {} does not exist", trial.subject_id);
        }
        let trial = Trial {
            id: tables.allocate_id(),
            block_id: trial.block_id,
            subject_id: trial.subject_id,
            started_at: trial.started_at,
        };
        tables.trials.push(trial.clone());
        Ok(trial)
    }

    async fn create_keypress(&self, keypress: NewKeypress) -> Result<Keypress> {
        let mut tables = self.tables.write();
        if !tables.trials.iter().any(|t| t.id == keypress.trial_id) {
            bail!("trial {} does not exist", keypress.trial_id);
        }
        let keypress = Keypress {
            id: tables.allocate_id(),
            trial_id: keypress.trial_id,
            value: keypress.value,
            timestamp: keypress.timestamp,
        };
        tables.keypresses.push(keypress.clone());
        Ok(keypress)
    }

    async fn list_trials_for_experiment(&self, experiment_id: Id) -> Result<Vec<Trial>> {
        let tables = self.tables.read();
        let block_ids: HashSet<Id> = tables
            .blocks
            .iter()
            .filter(|b| b.experiment_id == experiment_id)
            .map(|b| b.id)
            .collect();
        let mut trials: Vec<Trial> = tables
            .trials
            .iter()
            .filter(|t| block_ids.contains(&t.block_id))
            .cloned()
            .collect();
        trials.sort_by_key(|t| (t.block_id, t.id));
        Ok(trials)
    }

    async fn list_keypresses_for_trials(&self, trial_ids: &[Id]) -> Result<Vec<Keypress>> {
        let wanted: HashSet<Id> = trial_ids.iter().copied().collect();
        let mut keypresses: Vec<Keypress> = self
            .tables
            .read()
            .keypresses
            .iter()
            .filter(|k| wanted.contains(&k.trial_id))
            .cloned()
            .collect();
        keypresses.sort_by_key(|k| (k.trial_id, k.id));
        Ok(keypresses)
    }
}

impl Store for MemoryStore {}
