use axum::{
    routing::{get, post},
    Router,
};
use tower_http::services::ServeDir;

use crate::api::handlers::AppState;
use crate::api::{account_handlers, handlers};
use crate::store::traits::Store;

pub fn create_router<S: Store + 'static>(static_dir: &str) -> Router<AppState<S>> {
    Router::new()
        // Health check
        .route("/health", get(handlers::health_check))
        // Accounts
        .route("/register", post(account_handlers::register::<S>))
        .route("/login", post(account_handlers::login::<S>))
        .route("/logout", post(account_handlers::logout::<S>))
        .route("/profile", get(handlers::profile::<S>))
        // Subject-facing: load an experiment by code, then submit its trials
        .route("/experiment", get(handlers::lookup_experiment::<S>))
        .route("/trials", post(handlers::create_trials::<S>))
        // Path used by the original browser client
        .route("/create_trials", post(handlers::create_trials::<S>))
        // Researcher-facing experiment management
        .route("/experiments", post(handlers::create_experiment::<S>))
        .route("/create_experiment", post(handlers::create_experiment::<S>))
        .route("/experiments/:code", get(handlers::get_experiment::<S>))
        .route(
            "/experiments/:code/trials",
            get(handlers::list_experiment_trials::<S>),
        )
        // Studies and groups
        .route(
            "/studies",
            get(handlers::list_studies::<S>).post(handlers::create_study::<S>),
        )
        .route(
            "/studies/:study_id/groups",
            post(handlers::create_group::<S>),
        )
        .route(
            "/groups/:group_id/experiments",
            get(handlers::list_group_experiments::<S>),
        )
        // Browser client assets
        .nest_service("/static", ServeDir::new(static_dir))
}
