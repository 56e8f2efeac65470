use chrono::{DateTime, Utc};

use crate::logic::timestamps::from_epoch_millis;
use crate::model::{
    Block, Id, IngestionSummary, NewKeypress, NewTrial, TrialRecord, TrialSubmission,
    DEFAULT_SUBJECT_AGE,
};
use crate::store::traits::Store;

#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error("invalid experiment code")]
    InvalidCode,
    #[error("experiment {0} not found")]
    ExperimentNotFound(Id),
    #[error("experiment_trials is not valid: {0}")]
    MalformedTrials(#[from] serde_json::Error),
    #[error("block index {index} has no matching block (experiment has {available})")]
    BlockOutOfRange { index: usize, available: usize },
    #[error("block {block}, trial {trial}: started_at {value} is not a valid timestamp")]
    InvalidStartedAt { block: usize, trial: usize, value: f64 },
    #[error("block {block}, trial {trial}, keypress {keypress}: timestamp {value} is not a valid timestamp")]
    InvalidKeypressTimestamp {
        block: usize,
        trial: usize,
        keypress: usize,
        value: f64,
    },
    #[error("subject age {0} is out of range")]
    InvalidAge(i32),
    #[error(transparent)]
    Store(#[from] anyhow::Error),
}

/// Fully validated rows for one submission, not yet tied to a subject.
#[derive(Debug, Clone, PartialEq)]
pub struct IngestionPlan {
    pub subject_age: i32,
    pub trials: Vec<PlannedTrial>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PlannedTrial {
    pub block_id: Id,
    pub started_at: DateTime<Utc>,
    pub keypresses: Vec<(String, DateTime<Utc>)>,
}

impl IngestionPlan {
    /// Pairs each block index with the experiment's block at that position
    /// and converts every timestamp. Nothing is written when this fails.
    pub fn build(
        blocks: &[Block],
        per_block: Vec<Vec<TrialRecord>>,
        subject_age: Option<i32>,
    ) -> Result<Self, IngestError> {
        let subject_age = subject_age.unwrap_or(DEFAULT_SUBJECT_AGE);
        if !(0..=150).contains(&subject_age) {
            return Err(IngestError::InvalidAge(subject_age));
        }

        let mut trials = Vec::new();
        for (block_index, records) in per_block.into_iter().enumerate() {
            if records.is_empty() {
                continue;
            }
            let block = blocks.get(block_index).ok_or(IngestError::BlockOutOfRange {
                index: block_index,
                available: blocks.len(),
            })?;

            for (trial_index, record) in records.into_iter().enumerate() {
                let started_at =
                    from_epoch_millis(record.started_at).ok_or(IngestError::InvalidStartedAt {
                        block: block_index,
                        trial: trial_index,
                        value: record.started_at,
                    })?;

                let keypresses = record
                    .keypresses
                    .into_iter()
                    .enumerate()
                    .map(|(keypress_index, keypress)| {
                        let timestamp = from_epoch_millis(keypress.timestamp).ok_or(
                            IngestError::InvalidKeypressTimestamp {
                                block: block_index,
                                trial: trial_index,
                                keypress: keypress_index,
                                value: keypress.timestamp,
                            },
                        )?;
                        Ok((keypress.value.into_string(), timestamp))
                    })
                    .collect::<Result<Vec<_>, IngestError>>()?;

                trials.push(PlannedTrial {
                    block_id: block.id,
                    started_at,
                    keypresses,
                });
            }
        }

        Ok(Self { subject_age, trials })
    }

    pub fn keypress_count(&self) -> usize {
        self.trials.iter().map(|t| t.keypresses.len()).sum()
    }
}

/// Stores one subject's trial data for an experiment.
///
/// Rows go in one statement at a time: the subject, then each trial
/// followed by its keypresses.
pub async fn ingest<S: Store + ?Sized>(
    store: &S,
    submission: TrialSubmission,
) -> Result<IngestionSummary, IngestError> {
    let experiment_id = submission.experiment.parse().ok_or(IngestError::InvalidCode)?;
    let experiment = store
        .get_experiment(experiment_id)
        .await?
        .ok_or(IngestError::ExperimentNotFound(experiment_id))?;

    let blocks = store.list_blocks(experiment.id).await?;
    let per_block = submission.experiment_trials.decode()?;
    let plan = IngestionPlan::build(&blocks, per_block, submission.subject_age)?;

    let subject = store.create_subject(plan.subject_age).await?;
    let summary = IngestionSummary {
        subject_id: subject.id,
        trials: plan.trials.len(),
        keypresses: plan.keypress_count(),
    };

    for planned in plan.trials {
        let trial = store
            .create_trial(NewTrial {
                block_id: planned.block_id,
                subject_id: subject.id,
                started_at: planned.started_at,
            })
            .await?;

        for (value, timestamp) in planned.keypresses {
            if timestamp < trial.started_at {
                log::warn!(
                    "Keypress at {} precedes start of trial {} ({})",
                    timestamp,
                    trial.id,
                    trial.started_at
                );
            }
            store
                .create_keypress(NewKeypress {
                    trial_id: trial.id,
                    value,
                    timestamp,
                })
                .await?;
        }
    }

    log::info!(
        "Recorded subject {} for experiment {}: {} trials, {} keypresses",
        summary.subject_id,
        experiment.id,
        summary.trials,
        summary.keypresses
    );

    Ok(summary)
}
