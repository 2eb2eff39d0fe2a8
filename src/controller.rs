//! Owns the active survey and turns user events into session transitions

use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::{
    config::SurveyConfig,
    dataset::{CityId, DataSet},
    results::{HeatmapPayload, ResultAggregator},
    rng::RngManager,
    sampling::{prepare_queue, Granularity, GridSampler},
    session::{Answer, BackOutcome, Cursor, SessionError, SessionState, Step, SurveySession},
    spatial::LatLng,
};

/// Input from the answer surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "answer", rename_all = "snake_case")]
pub enum SurveyEvent {
    Answer(Answer),
    Back,
}

/// What the presentation surface shows for the current city.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Prompt {
    pub city: CityId,
    pub name: String,
    pub position: LatLng,
    /// One-based.
    pub number: usize,
    pub total: usize,
    /// Answer recorded on an earlier visit, if the user came back here.
    pub previous: Option<Answer>,
}

impl Prompt {
    pub fn question(&self) -> String {
        format!(
            "Is {} in the North or South? ({}/{})",
            self.name, self.number, self.total
        )
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SurveyUpdate {
    Present { prompt: Prompt },
    BackRefused { prompt: Prompt },
    Completed { result: HeatmapPayload },
}

/// Receives session updates as they happen.
pub trait SurveyListener {
    fn on_present(&mut self, prompt: &Prompt);

    fn on_back_refused(&mut self, _prompt: &Prompt) {}

    fn on_complete(&mut self, result: &HeatmapPayload);
}

/// Listener that ignores every update.
pub struct NoopListener;

impl SurveyListener for NoopListener {
    fn on_present(&mut self, _prompt: &Prompt) {}

    fn on_complete(&mut self, _result: &HeatmapPayload) {}
}

/// Holds the loaded cities and the one survey in progress. A new session
/// (and a new queue) is built on every [`SurveyController::start`].
pub struct SurveyController {
    dataset: Arc<DataSet>,
    config: SurveyConfig,
    sampler: GridSampler,
    rng: RngManager,
    session: SurveySession,
    granularity: Option<Granularity>,
    result: Option<HeatmapPayload>,
}

impl SurveyController {
    pub fn new(dataset: Arc<DataSet>, config: SurveyConfig) -> Self {
        let rng = RngManager::from_optional_seed(config.seed);
        Self::with_rng(dataset, config, rng)
    }

    pub fn with_rng(dataset: Arc<DataSet>, config: SurveyConfig, rng: RngManager) -> Self {
        Self {
            sampler: config.sampler(),
            dataset,
            config,
            rng,
            session: SurveySession::new(),
            granularity: None,
            result: None,
        }
    }

    pub fn dataset(&self) -> &DataSet {
        &self.dataset
    }

    pub fn session(&self) -> &SurveySession {
        &self.session
    }

    pub fn state(&self) -> SessionState {
        self.session.state()
    }

    pub fn granularity(&self) -> Option<Granularity> {
        self.granularity
    }

    pub fn result(&self) -> Option<&HeatmapPayload> {
        self.result.as_ref()
    }

    pub fn current_prompt(&self) -> Option<Prompt> {
        self.session.current().map(|cursor| self.prompt(cursor))
    }

    /// Discards any survey in progress and starts a new one.
    pub fn start(
        &mut self,
        granularity: Granularity,
        listener: &mut dyn SurveyListener,
    ) -> Result<SurveyUpdate, SessionError> {
        let queue = prepare_queue(&self.dataset, &self.sampler, granularity.mode(), &mut self.rng);
        tracing::info!(
            survey = %self.config.name,
            granularity = ?granularity,
            cities = queue.len(),
            "survey started"
        );
        self.session = SurveySession::new();
        self.granularity = Some(granularity);
        self.result = None;
        let step = self.session.start(queue)?;
        Ok(self.emit_step(step, listener))
    }

    pub fn handle(
        &mut self,
        event: SurveyEvent,
        listener: &mut dyn SurveyListener,
    ) -> Result<SurveyUpdate, SessionError> {
        match event {
            SurveyEvent::Answer(answer) => {
                let step = self.session.answer(answer)?;
                Ok(self.emit_step(step, listener))
            }
            SurveyEvent::Back => match self.session.back()? {
                BackOutcome::Moved(cursor) => {
                    let prompt = self.prompt(cursor);
                    listener.on_present(&prompt);
                    Ok(SurveyUpdate::Present { prompt })
                }
                BackOutcome::AtStart => {
                    let prompt = self
                        .current_prompt()
                        .ok_or(SessionError::NotPresenting(self.session.state()))?;
                    tracing::warn!("back requested on the first city");
                    listener.on_back_refused(&prompt);
                    Ok(SurveyUpdate::BackRefused { prompt })
                }
            },
        }
    }

    fn emit_step(&mut self, step: Step, listener: &mut dyn SurveyListener) -> SurveyUpdate {
        match step {
            Step::Present(cursor) => {
                let prompt = self.prompt(cursor);
                listener.on_present(&prompt);
                SurveyUpdate::Present { prompt }
            }
            Step::Completed => {
                let result = self.aggregate();
                listener.on_complete(&result);
                self.result = Some(result.clone());
                SurveyUpdate::Completed { result }
            }
        }
    }

    fn aggregate(&self) -> HeatmapPayload {
        let labeled = self.session.labeled_queue().unwrap_or_default();
        let points = ResultAggregator::new(&self.dataset).aggregate(&labeled);
        let payload = HeatmapPayload {
            survey: self.config.name.clone(),
            granularity: self.granularity.unwrap_or(Granularity::Comprehensive),
            completed_at: Utc::now(),
            options: self.config.render.clone(),
            points,
        };
        tracing::info!(
            survey = %payload.survey,
            points = payload.points.len(),
            south_share = payload.south_share(),
            "survey completed"
        );
        payload
    }

    fn prompt(&self, cursor: Cursor) -> Prompt {
        let city = &self.dataset[cursor.city];
        Prompt {
            city: city.id,
            name: city.name.clone(),
            position: city.position,
            number: cursor.number(),
            total: cursor.total,
            previous: self.session.label(cursor.index),
        }
    }
}
