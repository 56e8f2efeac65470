use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::{Id, LooseId, TextOrNumber};

/// Age recorded for a subject when the client does not send one.
pub const DEFAULT_SUBJECT_AGE: i32 = 25;

/// An anonymous participant. A new one is created for every submission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Subject {
    pub id: Id,
    pub age: i32,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trial {
    pub id: Id,
    pub block_id: Id,
    pub subject_id: Id,
    pub started_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewTrial {
    pub block_id: Id,
    pub subject_id: Id,
    pub started_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Keypress {
    pub id: Id,
    pub trial_id: Id,
    pub value: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewKeypress {
    pub trial_id: Id,
    pub value: String,
    pub timestamp: DateTime<Utc>,
}

/// Body posted by the browser once a subject finishes an experiment.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TrialSubmission {
    pub experiment: LooseId,
    pub experiment_trials: TrialMatrix,
    #[serde(default)]
    pub subject_age: Option<i32>,
}

/// Per-block lists of trial records. The browser client double-encodes this
/// field (a string holding JSON), so both forms are accepted.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum TrialMatrix {
    Nested(Vec<Vec<TrialRecord>>),
    Encoded(String),
}

impl TrialMatrix {
    pub fn decode(self) -> Result<Vec<Vec<TrialRecord>>, serde_json::Error> {
        match self {
            TrialMatrix::Nested(blocks) => Ok(blocks),
            TrialMatrix::Encoded(raw) => serde_json::from_str(&raw),
        }
    }
}

/// One trial as recorded client side. Times are epoch milliseconds.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TrialRecord {
    pub started_at: f64,
    #[serde(default)]
    pub keypresses: Vec<KeypressRecord>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct KeypressRecord {
    pub value: TextOrNumber,
    pub timestamp: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IngestionSummary {
    pub subject_id: Id,
    pub trials: usize,
    pub keypresses: usize,
}

/// A stored trial together with its keypresses, for export.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecordedTrial {
    #[serde(flatten)]
    pub trial: Trial,
    pub keypresses: Vec<Keypress>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trial_matrix_accepts_encoded_string() {
        let body = serde_json::json!({
            "experiment": "3",
            "experiment_trials": "[[{\"started_at\": 1000, \"keypresses\": [{\"value\": \"a\", \"timestamp\": 1250.5}]}], []]"
        });

        let submission: TrialSubmission = serde_json::from_value(body).unwrap();
        assert_eq!(submission.experiment.parse(), Some(3));

        let blocks = submission.experiment_trials.decode().unwrap();
        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[0][0].keypresses[0].timestamp, 1250.5);
        assert!(blocks[1].is_empty());
    }

    #[test]
    fn test_trial_matrix_accepts_nested_arrays() {
        let body = serde_json::json!({
            "experiment": 3,
            "experiment_trials": [[{"started_at": 1000, "keypresses": [{"value": 4, "timestamp": 1100}]}]],
            "subject_age": 31
        });

        let submission: TrialSubmission = serde_json::from_value(body).unwrap();
        assert_eq!(submission.subject_age, Some(31));

        let blocks = submission.experiment_trials.decode().unwrap();
        assert_eq!(blocks[0][0].keypresses[0].value.clone().into_string(), "4");
    }

    #[test]
    fn test_malformed_encoded_matrix_is_an_error() {
        let matrix = TrialMatrix::Encoded("[[{".to_string());
        assert!(matrix.decode().is_err());
    }
}
