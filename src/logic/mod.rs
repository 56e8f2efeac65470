pub mod experiments;
pub mod ingest;
pub mod passwords;
pub mod timestamps;
pub mod validate;

pub use experiments::{create_experiment, ExperimentError};
pub use ingest::{ingest, IngestError, IngestionPlan};
pub use passwords::{
    hash_password, hash_password_blocking, verify_password, verify_password_blocking,
};
pub use validate::{clean_block, clean_name, validate_registration, ValidationError};
