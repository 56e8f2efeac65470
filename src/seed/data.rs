use crate::logic::{clean_block, hash_password_blocking};
use crate::model::{BlockSpec, NewExperiment, NewGroup, NewStudy, NewUser, TextOrNumber, User};
use crate::store::traits::Store;
use anyhow::Result;

pub const DEMO_USERNAME: &str = "demo";
const DEFAULT_DEMO_PASSWORD: &str = "demo-lab-password";

/// Creates a demo researcher with one study, group and experiment.
/// Does nothing if the demo account already exists.
pub async fn load_seed_data<S: Store + ?Sized>(store: &S) -> Result<()> {
    if store.get_user_by_username(DEMO_USERNAME).await?.is_some() {
        log::info!("Seed data already present, skipping");
        return Ok(());
    }

    let password =
        std::env::var("SEED_DEMO_PASSWORD").unwrap_or_else(|_| DEFAULT_DEMO_PASSWORD.to_string());
    let researcher = store
        .create_user(NewUser {
            username: DEMO_USERNAME.to_string(),
            email: Some("demo@localhost".to_string()),
            password_hash: hash_password_blocking(password).await?,
        })
        .await?;

    load_demo_experiment(store, &researcher).await
}

async fn load_demo_experiment<S: Store + ?Sized>(store: &S, researcher: &User) -> Result<()> {
    let study = store
        .create_study(
            researcher.id,
            NewStudy {
                name: "Sequence learning pilot".to_string(),
                description: Some("Five-element finger tapping sequence".to_string()),
            },
        )
        .await?;
    let group = store
        .create_group(
            study.id,
            researcher.id,
            NewGroup {
                name: "Pilot cohort".to_string(),
            },
        )
        .await?;
    let experiment = store
        .create_experiment(NewExperiment {
            name: "Finger tapping (demo)".to_string(),
            creator_id: researcher.id,
            group_id: Some(group.id),
        })
        .await?;

    // (block type, sequence, trials)
    let layout = [
        ("practice", "12345", 3),
        ("training", "41324", 12),
        ("training", "41324", 12),
        ("test", "23142", 6),
    ];
    for (block_type, sequence, num_trials) in layout {
        let block = clean_block(BlockSpec {
            sequence: TextOrNumber::Text(sequence.to_string()),
            max_time_per_trial: 10,
            resting_time: 30,
            block_type: block_type.to_string(),
            max_time: 120,
            num_trials,
        })?;
        store.create_block(experiment.id, block).await?;
    }

    log::info!(
        "Seeded demo experiment {} for user '{}'",
        experiment.id,
        researcher.username
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::traits::{ExperimentStore, StudyStore, UserStore};
    use crate::store::MemoryStore;

    #[tokio::test]
    async fn test_seed_is_idempotent() {
        let store = MemoryStore::new();
        load_seed_data(&store).await.unwrap();
        load_seed_data(&store).await.unwrap();

        let demo = store.get_user_by_username(DEMO_USERNAME).await.unwrap().unwrap();
        let experiments = store.list_experiments_for_user(demo.id).await.unwrap();
        assert_eq!(experiments.len(), 1);
        assert_eq!(store.list_groups_for_user(demo.id).await.unwrap().len(), 1);

        let blocks = store.list_blocks(experiments[0].id).await.unwrap();
        assert_eq!(blocks.len(), 4);
        assert_eq!(blocks[3].sequence, "23142");
    }
}
