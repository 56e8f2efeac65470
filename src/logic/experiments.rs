use crate::logic::validate::{clean_block, clean_name, ValidationError, MAX_NAME_LENGTH};
use crate::model::{ExperimentWithBlocks, Id, NewExperiment, NewExperimentRequest, User};
use crate::store::traits::Store;

#[derive(Debug, thiserror::Error)]
pub enum ExperimentError {
    #[error("invalid experiment: {0}")]
    InvalidExperiment(ValidationError),
    #[error("invalid group id")]
    InvalidGroup,
    #[error("group {0} not found")]
    GroupNotFound(Id),
    #[error("group {0} belongs to another user")]
    GroupForbidden(Id),
    /// The experiment and any earlier blocks were already saved.
    #[error("block {index} of experiment {experiment_id} is invalid: {source}")]
    InvalidBlock {
        index: usize,
        experiment_id: Id,
        #[source]
        source: ValidationError,
    },
    #[error(transparent)]
    Store(#[from] anyhow::Error),
}

/// Creates an experiment owned by `creator`, then its blocks in order.
///
/// Each block is validated right before it is saved. The first invalid
/// block stops the loop; rows written before it are kept.
pub async fn create_experiment<S: Store + ?Sized>(
    store: &S,
    creator: &User,
    request: NewExperimentRequest,
) -> Result<ExperimentWithBlocks, ExperimentError> {
    let name = clean_name("name", &request.name, MAX_NAME_LENGTH)
        .map_err(ExperimentError::InvalidExperiment)?;

    let group_id = match request.group {
        Some(group) => {
            let group_id = group.parse().ok_or(ExperimentError::InvalidGroup)?;
            let group = store
                .get_group(group_id)
                .await?
                .ok_or(ExperimentError::GroupNotFound(group_id))?;
            if group.creator_id != creator.id {
                return Err(ExperimentError::GroupForbidden(group_id));
            }
            Some(group.id)
        }
        None => None,
    };

    let experiment = store
        .create_experiment(NewExperiment {
            name,
            creator_id: creator.id,
            group_id,
        })
        .await?;
    log::info!(
        "User {} created experiment {} ('{}')",
        creator.username,
        experiment.id,
        experiment.name
    );

    let mut blocks = Vec::with_capacity(request.blocks.len());
    for (index, spec) in request.blocks.into_iter().enumerate() {
        let block = clean_block(spec).map_err(|source| {
            log::warn!(
                "Rejected block {} of experiment {}: {}",
                index,
                experiment.id,
                source
            );
            ExperimentError::InvalidBlock {
                index,
                experiment_id: experiment.id,
                source,
            }
        })?;
        blocks.push(store.create_block(experiment.id, block).await?);
    }

    Ok(ExperimentWithBlocks { experiment, blocks })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{BlockSpec, LooseId, NewGroup, NewStudy, NewUser, TextOrNumber};
    use crate::store::traits::{ExperimentStore, StudyStore, UserStore};
    use crate::store::MemoryStore;

    fn spec(block_type: &str) -> BlockSpec {
        BlockSpec {
            sequence: TextOrNumber::Text("24134".to_string()),
            max_time_per_trial: 8,
            resting_time: 15,
            block_type: block_type.to_string(),
            max_time: 90,
            num_trials: 10,
        }
    }

    async fn user(store: &MemoryStore, username: &str) -> User {
        store
            .create_user(NewUser {
                username: username.to_string(),
                email: None,
                password_hash: "unused".to_string(),
            })
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_creates_experiment_and_blocks_in_order() {
        let store = MemoryStore::new();
        let owner = user(&store, "owner").await;
        let request = NewExperimentRequest {
            name: "Pilot".to_string(),
            group: None,
            blocks: vec![spec("practice"), spec("training"), spec("test")],
        };

        let created = create_experiment(&store, &owner, request).await.unwrap();
        assert_eq!(created.experiment.creator_id, owner.id);
        assert_eq!(created.blocks.len(), 3);

        let stored = store.list_blocks(created.experiment.id).await.unwrap();
        assert_eq!(stored, created.blocks);
    }

    #[tokio::test]
    async fn test_invalid_block_type_stops_at_that_block() {
        let store = MemoryStore::new();
        let owner = user(&store, "owner").await;
        let request = NewExperimentRequest {
            name: "Pilot".to_string(),
            group: None,
            blocks: vec![spec("practice"), spec("bogus"), spec("test")],
        };

        let err = create_experiment(&store, &owner, request).await.unwrap_err();
        let ExperimentError::InvalidBlock { index, experiment_id, .. } = err else {
            panic!("expected InvalidBlock, got {:?}", err);
        };
        assert_eq!(index, 1);

        // Experiment and the first block survive.
        assert!(store.get_experiment(experiment_id).await.unwrap().is_some());
        assert_eq!(store.list_blocks(experiment_id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_group_must_belong_to_creator() {
        let store = MemoryStore::new();
        let owner = user(&store, "owner").await;
        let other = user(&store, "other").await;
        let study = store
            .create_study(owner.id, NewStudy { name: "S".to_string(), description: None })
            .await
            .unwrap();
        let group = store
            .create_group(study.id, owner.id, NewGroup { name: "G".to_string() })
            .await
            .unwrap();

        let request = |group: i64| NewExperimentRequest {
            name: "Grouped".to_string(),
            group: Some(LooseId::Number(group)),
            blocks: vec![],
        };

        let err = create_experiment(&store, &other, request(group.id)).await.unwrap_err();
        assert!(matches!(err, ExperimentError::GroupForbidden(_)));

        let err = create_experiment(&store, &owner, request(404)).await.unwrap_err();
        assert!(matches!(err, ExperimentError::GroupNotFound(404)));

        let created = create_experiment(&store, &owner, request(group.id)).await.unwrap();
        assert_eq!(created.experiment.group_id, Some(group.id));
        assert_eq!(store.list_experiments_for_group(group.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_blank_name_creates_nothing() {
        let store = MemoryStore::new();
        let owner = user(&store, "owner").await;
        let request = NewExperimentRequest {
            name: "  ".to_string(),
            group: None,
            blocks: vec![spec("practice")],
        };

        let err = create_experiment(&store, &owner, request).await.unwrap_err();
        assert!(matches!(err, ExperimentError::InvalidExperiment(_)));
        assert!(store.list_experiments_for_user(owner.id).await.unwrap().is_empty());
    }
}
