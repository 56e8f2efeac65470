use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
};
use itertools::Itertools;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::sync::Arc;

use crate::api::session_extractor::CurrentUser;
use crate::config::SessionConfig;
use crate::logic::validate::{clean_name, MAX_NAME_LENGTH};
use crate::logic::{self, ExperimentError, IngestError};
use crate::model::{
    Experiment, ExperimentWithBlocks, Group, Id, IngestionSummary, ListResponse, LooseId,
    NewExperimentRequest, NewGroup, NewStudy, RecordedTrial, Study, TrialSubmission, User,
};
use crate::store::traits::Store;

/// Shared request state: the store plus session cookie settings.
pub struct AppContext<S> {
    pub store: S,
    pub sessions: SessionSettings,
}

impl<S> AppContext<S> {
    pub fn new(store: S, sessions: SessionSettings) -> Self {
        Self { store, sessions }
    }
}

pub type AppState<S> = Arc<AppContext<S>>;

#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub cookie_name: String,
    pub ttl: chrono::Duration,
    pub secure_cookie: bool,
}

impl From<&SessionConfig> for SessionSettings {
    fn from(config: &SessionConfig) -> Self {
        Self {
            cookie_name: config.cookie_name.clone(),
            ttl: chrono::Duration::hours(config.ttl_hours),
            secure_cookie: config.secure_cookie,
        }
    }
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self::from(&SessionConfig::default())
    }
}

/// Simple health check endpoint
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: String,
}

pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        timestamp: chrono::Utc::now().to_rfc3339(),
    })
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl ErrorResponse {
    pub fn new(message: &str) -> Self {
        Self {
            error: message.to_string(),
            details: None,
        }
    }

    pub fn with_details(message: &str, details: serde_json::Value) -> Self {
        Self {
            error: message.to_string(),
            details: Some(details),
        }
    }
}

pub type ApiError = (StatusCode, Json<ErrorResponse>);

pub fn error_response(status: StatusCode, message: &str) -> ApiError {
    (status, Json(ErrorResponse::new(message)))
}

pub fn internal_error(e: anyhow::Error) -> ApiError {
    log::error!("Store error: {:#}", e);
    error_response(StatusCode::INTERNAL_SERVER_ERROR, &e.to_string())
}

/// Parses a JSON request body regardless of its content type; the browser
/// client posts with whatever `fetch` defaults to.
pub fn parse_json_body<T: DeserializeOwned>(body: &Bytes) -> Result<T, ApiError> {
    serde_json::from_slice(body).map_err(|e| {
        error_response(
            StatusCode::BAD_REQUEST,
            &format!("Malformed request body: {}", e),
        )
    })
}

#[derive(Debug, Deserialize)]
pub struct ExperimentCodeQuery {
    pub code: Option<String>,
}

fn parse_code(raw: Option<String>) -> Result<Id, ApiError> {
    raw.and_then(|code| LooseId::Text(code).parse())
        .ok_or_else(|| error_response(StatusCode::BAD_REQUEST, "Form invalid"))
}

async fn load_experiment<S: Store>(store: &S, id: Id) -> Result<ExperimentWithBlocks, ApiError> {
    let experiment = store
        .get_experiment(id)
        .await
        .map_err(internal_error)?
        .ok_or_else(|| error_response(StatusCode::NOT_FOUND, "Experiment not found"))?;
    let blocks = store.list_blocks(experiment.id).await.map_err(internal_error)?;

    Ok(ExperimentWithBlocks { experiment, blocks })
}

/// GET /experiment?code=<code>
/// What the subject's browser loads before running the experiment
pub async fn lookup_experiment<S: Store>(
    State(state): State<AppState<S>>,
    Query(query): Query<ExperimentCodeQuery>,
) -> Result<Json<ExperimentWithBlocks>, ApiError> {
    let id = parse_code(query.code)?;
    Ok(Json(load_experiment(&state.store, id).await?))
}

/// GET /experiments/:code
pub async fn get_experiment<S: Store>(
    State(state): State<AppState<S>>,
    Path(code): Path<String>,
) -> Result<Json<ExperimentWithBlocks>, ApiError> {
    let id = parse_code(Some(code))?;
    Ok(Json(load_experiment(&state.store, id).await?))
}

/// POST /trials
/// Stores the trials and keypresses a subject produced
pub async fn create_trials<S: Store>(
    State(state): State<AppState<S>>,
    body: Bytes,
) -> Result<Json<IngestionSummary>, ApiError> {
    let submission: TrialSubmission = parse_json_body(&body)?;

    match logic::ingest(&state.store, submission).await {
        Ok(summary) => Ok(Json(summary)),
        Err(IngestError::Store(e)) => Err(internal_error(e)),
        Err(e @ IngestError::ExperimentNotFound(_)) => {
            Err(error_response(StatusCode::NOT_FOUND, &e.to_string()))
        }
        Err(e) => {
            log::warn!("Rejected trial submission: {}", e);
            Err(error_response(StatusCode::BAD_REQUEST, &e.to_string()))
        }
    }
}

/// POST /experiments
/// Defines a new experiment owned by the logged-in researcher
pub async fn create_experiment<S: Store>(
    State(state): State<AppState<S>>,
    current: CurrentUser,
    body: Bytes,
) -> Result<(StatusCode, Json<ExperimentWithBlocks>), ApiError> {
    let request: NewExperimentRequest = parse_json_body(&body)?;

    match logic::create_experiment(&state.store, &current.user, request).await {
        Ok(created) => Ok((StatusCode::CREATED, Json(created))),
        Err(ExperimentError::Store(e)) => Err(internal_error(e)),
        Err(e @ ExperimentError::GroupNotFound(_)) => {
            Err(error_response(StatusCode::NOT_FOUND, &e.to_string()))
        }
        Err(e @ ExperimentError::GroupForbidden(_)) => {
            Err(error_response(StatusCode::FORBIDDEN, &e.to_string()))
        }
        Err(ExperimentError::InvalidBlock {
            index,
            experiment_id,
            source,
        }) => Err((
            StatusCode::UNPROCESSABLE_ENTITY,
            Json(ErrorResponse::with_details(
                &format!("Block {} is invalid: {}", index, source),
                serde_json::json!({
                    "block_index": index,
                    "experiment_id": experiment_id,
                }),
            )),
        )),
        Err(e) => Err(error_response(StatusCode::BAD_REQUEST, &e.to_string())),
    }
}

/// GET /experiments/:code/trials
/// Recorded trials with their keypresses, for the experiment's creator
pub async fn list_experiment_trials<S: Store>(
    State(state): State<AppState<S>>,
    current: CurrentUser,
    Path(code): Path<String>,
) -> Result<Json<ListResponse<RecordedTrial>>, ApiError> {
    let id = parse_code(Some(code))?;
    let experiment = state
        .store
        .get_experiment(id)
        .await
        .map_err(internal_error)?
        .ok_or_else(|| error_response(StatusCode::NOT_FOUND, "Experiment not found"))?;
    if experiment.creator_id != current.user.id {
        return Err(error_response(
            StatusCode::FORBIDDEN,
            "Only the experiment's creator can export its data",
        ));
    }

    let trials = state
        .store
        .list_trials_for_experiment(experiment.id)
        .await
        .map_err(internal_error)?;
    let trial_ids: Vec<Id> = trials.iter().map(|t| t.id).collect();
    let mut keypresses_by_trial = state
        .store
        .list_keypresses_for_trials(&trial_ids)
        .await
        .map_err(internal_error)?
        .into_iter()
        .into_group_map_by(|k| k.trial_id);

    let recorded = trials
        .into_iter()
        .map(|trial| RecordedTrial {
            keypresses: keypresses_by_trial.remove(&trial.id).unwrap_or_default(),
            trial,
        })
        .collect();

    Ok(Json(ListResponse::new(recorded)))
}

/// POST /studies
pub async fn create_study<S: Store>(
    State(state): State<AppState<S>>,
    current: CurrentUser,
    body: Bytes,
) -> Result<(StatusCode, Json<Study>), ApiError> {
    let new_study: NewStudy = parse_json_body(&body)?;
    let name = clean_name("name", &new_study.name, MAX_NAME_LENGTH)
        .map_err(|e| error_response(StatusCode::BAD_REQUEST, &e.to_string()))?;

    let study = state
        .store
        .create_study(
            current.user.id,
            NewStudy {
                name,
                description: new_study.description.filter(|d| !d.trim().is_empty()),
            },
        )
        .await
        .map_err(internal_error)?;

    Ok((StatusCode::CREATED, Json(study)))
}

/// GET /studies
pub async fn list_studies<S: Store>(
    State(state): State<AppState<S>>,
    current: CurrentUser,
) -> Result<Json<ListResponse<Study>>, ApiError> {
    let studies = state
        .store
        .list_studies_for_user(current.user.id)
        .await
        .map_err(internal_error)?;

    Ok(Json(ListResponse::new(studies)))
}

/// POST /studies/:study_id/groups
pub async fn create_group<S: Store>(
    State(state): State<AppState<S>>,
    current: CurrentUser,
    Path(study_id): Path<Id>,
    body: Bytes,
) -> Result<(StatusCode, Json<Group>), ApiError> {
    let new_group: NewGroup = parse_json_body(&body)?;
    let name = clean_name("name", &new_group.name, MAX_NAME_LENGTH)
        .map_err(|e| error_response(StatusCode::BAD_REQUEST, &e.to_string()))?;

    let study = state
        .store
        .get_study(study_id)
        .await
        .map_err(internal_error)?
        .ok_or_else(|| error_response(StatusCode::NOT_FOUND, "Study not found"))?;
    if study.creator_id != current.user.id {
        return Err(error_response(
            StatusCode::FORBIDDEN,
            "Study belongs to another user",
        ));
    }

    let group = state
        .store
        .create_group(study.id, current.user.id, NewGroup { name })
        .await
        .map_err(internal_error)?;

    Ok((StatusCode::CREATED, Json(group)))
}

/// GET /groups/:group_id/experiments
pub async fn list_group_experiments<S: Store>(
    State(state): State<AppState<S>>,
    current: CurrentUser,
    Path(group_id): Path<Id>,
) -> Result<Json<ListResponse<Experiment>>, ApiError> {
    let group = state
        .store
        .get_group(group_id)
        .await
        .map_err(internal_error)?
        .ok_or_else(|| error_response(StatusCode::NOT_FOUND, "Group not found"))?;
    if group.creator_id != current.user.id {
        return Err(error_response(
            StatusCode::FORBIDDEN,
            "Group belongs to another user",
        ));
    }

    let experiments = state
        .store
        .list_experiments_for_group(group.id)
        .await
        .map_err(internal_error)?;

    Ok(Json(ListResponse::new(experiments)))
}

#[derive(Debug, Serialize)]
pub struct ProfileResponse {
    pub user: User,
    pub experiments: Vec<Experiment>,
    pub studies: Vec<Study>,
    pub groups: Vec<Group>,
}

/// GET /profile
pub async fn profile<S: Store>(
    State(state): State<AppState<S>>,
    current: CurrentUser,
) -> Result<Json<ProfileResponse>, ApiError> {
    let user_id = current.user.id;
    let experiments = state
        .store
        .list_experiments_for_user(user_id)
        .await
        .map_err(internal_error)?;
    let studies = state
        .store
        .list_studies_for_user(user_id)
        .await
        .map_err(internal_error)?;
    let groups = state
        .store
        .list_groups_for_user(user_id)
        .await
        .map_err(internal_error)?;

    Ok(Json(ProfileResponse {
        user: current.user,
        experiments,
        studies,
        groups,
    }))
}
