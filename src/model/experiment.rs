use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::model::{Id, LooseId, TextOrNumber};

/// An experiment; its id is the code subjects type in to take it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Experiment {
    pub id: Id,
    pub name: String,
    pub creator_id: Id,
    pub group_id: Option<Id>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewExperiment {
    pub name: String,
    pub creator_id: Id,
    pub group_id: Option<Id>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BlockType {
    Practice,
    Training,
    Test,
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("'{0}' is not a valid block type")]
pub struct UnknownBlockType(pub String);

impl BlockType {
    pub const ALL: [BlockType; 3] = [BlockType::Practice, BlockType::Training, BlockType::Test];

    pub fn as_str(&self) -> &'static str {
        match self {
            BlockType::Practice => "practice",
            BlockType::Training => "training",
            BlockType::Test => "test",
        }
    }
}

impl FromStr for BlockType {
    type Err = UnknownBlockType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        BlockType::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| UnknownBlockType(s.to_string()))
    }
}

impl fmt::Display for BlockType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A timed run of trials sharing one key sequence and timing setup.
/// Times are stored as whole numbers in the unit the client uses.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Block {
    pub id: Id,
    pub experiment_id: Id,
    pub sequence: String,
    pub block_type: BlockType,
    pub max_time: i32,
    pub max_time_per_trial: i32,
    pub resting_time: i32,
    pub num_trials: i32,
}

/// A block that passed validation and is ready to be inserted.
#[derive(Debug, Clone, PartialEq)]
pub struct NewBlock {
    pub sequence: String,
    pub block_type: BlockType,
    pub max_time: i32,
    pub max_time_per_trial: i32,
    pub resting_time: i32,
    pub num_trials: i32,
}

/// One block as described by the experiment builder, before validation.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct BlockSpec {
    pub sequence: TextOrNumber,
    pub max_time_per_trial: i64,
    pub resting_time: i64,
    pub block_type: String,
    pub max_time: i64,
    pub num_trials: i64,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct NewExperimentRequest {
    pub name: String,
    #[serde(default)]
    pub group: Option<LooseId>,
    pub blocks: Vec<BlockSpec>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExperimentWithBlocks {
    pub experiment: Experiment,
    pub blocks: Vec<Block>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_block_type_parsing() {
        assert_eq!("practice".parse::<BlockType>(), Ok(BlockType::Practice));
        assert_eq!("test".parse::<BlockType>(), Ok(BlockType::Test));
        assert_eq!(
            "Practice".parse::<BlockType>(),
            Err(UnknownBlockType("Practice".to_string()))
        );
    }

    #[test]
    fn test_block_type_serde_matches_as_str() {
        for block_type in BlockType::ALL {
            let json = serde_json::to_value(block_type).unwrap();
            assert_eq!(json, serde_json::Value::String(block_type.as_str().to_string()));
        }
    }

    #[test]
    fn test_block_spec_accepts_numeric_sequence() {
        let spec: BlockSpec = serde_json::from_str(
            r#"{"sequence": 41324, "max_time_per_trial": 5, "resting_time": 10,
                "block_type": "training", "max_time": 30, "num_trials": 12}"#,
        )
        .unwrap();

        assert_eq!(spec.sequence.into_string(), "41324");
        assert_eq!(spec.num_trials, 12);
    }
}
