//! HTTP/JSON presentation surface with a server-sent event stream

use std::{
    convert::Infallible,
    net::SocketAddr,
    path::PathBuf,
    sync::{Arc, Mutex, MutexGuard},
    time::Duration,
};

use anyhow::{Context, Result};
use axum::{
    extract::State,
    http::StatusCode,
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Response,
    },
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::{net::TcpListener, sync::broadcast};
use tokio_stream::{wrappers::BroadcastStream, Stream, StreamExt};

use crate::{
    config::SurveyConfig,
    controller::{Prompt, SurveyController, SurveyEvent, SurveyListener, SurveyUpdate},
    dataset::DatasetLoader,
    results::{HeatmapPayload, ResultWriter},
    sampling::Granularity,
    session::{Answer, SessionError, SessionState},
};

/// Dataset load progress. Survey endpoints only work once it is `Ready`.
#[derive(Clone, Debug, Serialize)]
#[serde(tag = "status", content = "error", rename_all = "snake_case")]
pub enum LoadState {
    Loading,
    Ready,
    Failed(String),
}

pub struct AppState {
    load: Mutex<LoadState>,
    controller: Mutex<Option<SurveyController>>,
    broadcaster: broadcast::Sender<String>,
    output: Option<PathBuf>,
}

impl AppState {
    pub fn new(output: Option<PathBuf>) -> Self {
        let (broadcaster, _) = broadcast::channel(256);
        Self {
            load: Mutex::new(LoadState::Loading),
            controller: Mutex::new(None),
            broadcaster,
            output,
        }
    }

    pub fn load_state(&self) -> LoadState {
        lock(&self.load).clone()
    }

    /// Runs the one-shot dataset load and records its outcome.
    pub async fn initialize(&self, config: SurveyConfig) {
        let loader = DatasetLoader::new(&config.dataset);
        match loader.load().await {
            Ok(dataset) => {
                let controller = SurveyController::new(Arc::new(dataset), config);
                *lock(&self.controller) = Some(controller);
                *lock(&self.load) = LoadState::Ready;
            }
            Err(err) => {
                tracing::error!(error = %err, "dataset load failed");
                *lock(&self.load) = LoadState::Failed(err.to_string());
            }
        }
    }

    fn with_controller<T>(
        &self,
        f: impl FnOnce(&mut SurveyController, &mut BroadcastListener<'_>) -> Result<T, ApiError>,
    ) -> Result<T, ApiError> {
        match self.load_state() {
            LoadState::Ready => {}
            LoadState::Loading => return Err(ApiError::Loading),
            LoadState::Failed(message) => return Err(ApiError::LoadFailed(message)),
        }
        let mut guard = lock(&self.controller);
        let controller = guard.as_mut().ok_or(ApiError::Loading)?;
        let mut listener = BroadcastListener {
            sender: &self.broadcaster,
        };
        f(controller, &mut listener)
    }

    fn export(&self, update: &SurveyUpdate) -> Result<(), ApiError> {
        if let (SurveyUpdate::Completed { result }, Some(path)) = (update, &self.output) {
            ResultWriter::new(path)
                .write(result)
                .map_err(|err| ApiError::Export(err.to_string()))?;
        }
        Ok(())
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Forwards every session update to the SSE subscribers.
struct BroadcastListener<'a> {
    sender: &'a broadcast::Sender<String>,
}

impl BroadcastListener<'_> {
    fn publish(&self, update: &SurveyUpdate) {
        if let Ok(payload) = serde_json::to_string(update) {
            let _ = self.sender.send(payload);
        }
    }
}

impl SurveyListener for BroadcastListener<'_> {
    fn on_present(&mut self, prompt: &Prompt) {
        self.publish(&SurveyUpdate::Present {
            prompt: prompt.clone(),
        });
    }

    fn on_back_refused(&mut self, prompt: &Prompt) {
        self.publish(&SurveyUpdate::BackRefused {
            prompt: prompt.clone(),
        });
    }

    fn on_complete(&mut self, result: &HeatmapPayload) {
        self.publish(&SurveyUpdate::Completed {
            result: result.clone(),
        });
    }
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("dataset is still loading")]
    Loading,
    #[error("dataset failed to load: {0}")]
    LoadFailed(String),
    #[error(transparent)]
    Session(#[from] SessionError),
    #[error("{0}")]
    NotFound(&'static str),
    #[error("failed to export result: {0}")]
    Export(String),
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::Loading => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::LoadFailed(_) | ApiError::Export(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Session(_) => StatusCode::CONFLICT,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
        };
        let body = ErrorBody {
            error: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

pub struct WebServerConfig {
    pub survey: SurveyConfig,
    pub output: Option<PathBuf>,
    pub host: String,
    pub port: u16,
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/options", get(options))
        .route("/api/status", get(status))
        .route("/api/start", post(start))
        .route("/api/prompt", get(prompt))
        .route("/api/answer", post(answer))
        .route("/api/back", post(back))
        .route("/api/result", get(result))
        .route("/api/events", get(stream_events))
        .with_state(state)
}

pub async fn run(config: WebServerConfig) -> Result<()> {
    let WebServerConfig {
        survey,
        output,
        host,
        port,
    } = config;

    let state = Arc::new(AppState::new(output));
    let loading = state.clone();
    tokio::spawn(async move {
        loading.initialize(survey).await;
    });

    let addr: SocketAddr = format!("{host}:{port}")
        .parse()
        .with_context(|| format!("invalid listen address {host}:{port}"))?;
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    tracing::info!(%addr, "survey API listening");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    tracing::info!("shutting down survey API");
}

#[derive(Serialize)]
struct OptionEntry {
    granularity: Granularity,
    label: String,
}

async fn options() -> Json<Vec<OptionEntry>> {
    Json(
        Granularity::ALL
            .iter()
            .map(|granularity| OptionEntry {
                granularity: *granularity,
                label: granularity.to_string(),
            })
            .collect(),
    )
}

#[derive(Serialize)]
struct StatusBody {
    dataset: LoadState,
    session: Option<SessionState>,
    granularity: Option<Granularity>,
}

async fn status(State(state): State<Arc<AppState>>) -> Json<StatusBody> {
    let controller = lock(&state.controller);
    Json(StatusBody {
        dataset: state.load_state(),
        session: controller.as_ref().map(|c| c.state()),
        granularity: controller.as_ref().and_then(|c| c.granularity()),
    })
}

#[derive(Deserialize)]
struct StartRequest {
    granularity: Granularity,
}

async fn start(
    State(state): State<Arc<AppState>>,
    Json(request): Json<StartRequest>,
) -> Result<Json<SurveyUpdate>, ApiError> {
    let update = state.with_controller(|controller, listener| {
        Ok(controller.start(request.granularity, listener)?)
    })?;
    state.export(&update)?;
    Ok(Json(update))
}

async fn prompt(State(state): State<Arc<AppState>>) -> Result<Json<Prompt>, ApiError> {
    state.with_controller(|controller, _| {
        controller
            .current_prompt()
            .map(Json)
            .ok_or(ApiError::NotFound("no city is being presented"))
    })
}

#[derive(Deserialize)]
struct AnswerRequest {
    answer: Answer,
}

async fn answer(
    State(state): State<Arc<AppState>>,
    Json(request): Json<AnswerRequest>,
) -> Result<Json<SurveyUpdate>, ApiError> {
    dispatch(&state, SurveyEvent::Answer(request.answer))
}

async fn back(State(state): State<Arc<AppState>>) -> Result<Json<SurveyUpdate>, ApiError> {
    dispatch(&state, SurveyEvent::Back)
}

fn dispatch(state: &AppState, event: SurveyEvent) -> Result<Json<SurveyUpdate>, ApiError> {
    let update = state.with_controller(|controller, listener| {
        Ok(controller.handle(event, listener)?)
    })?;
    state.export(&update)?;
    Ok(Json(update))
}

async fn result(State(state): State<Arc<AppState>>) -> Result<Json<HeatmapPayload>, ApiError> {
    state.with_controller(|controller, _| {
        controller
            .result()
            .cloned()
            .map(Json)
            .ok_or(ApiError::NotFound("no completed survey"))
    })
}

async fn stream_events(
    State(state): State<Arc<AppState>>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let rx = state.broadcaster.subscribe();
    let stream = BroadcastStream::new(rx).filter_map(|msg| match msg {
        Ok(payload) => Some(Ok(Event::default().data(payload))),
        Err(_) => None,
    });
    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("keep-alive"),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ready_state(dir: &std::path::Path) -> AppState {
        let dataset = dir.join("cities.geojson");
        std::fs::write(
            &dataset,
            r#"{"features": [
                {"properties": {"city": "Durham", "lat": 54.78, "lng": -1.57}},
                {"properties": {"city": "Oxford", "lat": 51.75, "lng": -1.26}}
            ]}"#,
        )
        .unwrap();
        let mut config = SurveyConfig::great_britain();
        config.dataset = dataset;
        config.seed = Some(8);
        let state = AppState::new(Some(dir.join("out/result.json")));
        tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap()
            .block_on(state.initialize(config));
        state
    }

    #[test]
    fn test_requests_before_load_are_refused() {
        let state = AppState::new(None);
        let err = dispatch(&state, SurveyEvent::Back).unwrap_err();
        assert!(matches!(err, ApiError::Loading));
        assert_eq!(err.into_response().status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[test]
    fn test_load_failure_is_reported() {
        let state = AppState::new(None);
        let mut config = SurveyConfig::great_britain();
        config.dataset = PathBuf::from("missing/cities.geojson");
        tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap()
            .block_on(state.initialize(config));

        assert!(matches!(state.load_state(), LoadState::Failed(_)));
        let err = dispatch(&state, SurveyEvent::Back).unwrap_err();
        assert!(matches!(err, ApiError::LoadFailed(_)));
    }

    #[test]
    fn test_completed_survey_is_exported() {
        let dir = tempfile::tempdir().unwrap();
        let state = ready_state(dir.path());
        let mut events = state.broadcaster.subscribe();

        state
            .with_controller(|controller, listener| {
                Ok(controller.start(Granularity::Comprehensive, listener)?)
            })
            .unwrap();
        dispatch(&state, SurveyEvent::Answer(Answer::North)).unwrap();
        let Json(update) = dispatch(&state, SurveyEvent::Answer(Answer::South)).unwrap();

        assert!(matches!(update, SurveyUpdate::Completed { .. }));
        assert!(dir.path().join("out/result.json").exists());
        let first = events.try_recv().unwrap();
        assert!(first.contains("\"kind\":\"present\""));

        let err = dispatch(&state, SurveyEvent::Back).unwrap_err();
        assert_eq!(err.into_response().status(), StatusCode::CONFLICT);
    }
}
