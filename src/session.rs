//! Survey session state machine

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::dataset::CityId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Answer {
    North,
    South,
}

impl Answer {
    /// Value handed to the interpolation renderer.
    pub fn weight(self) -> u8 {
        match self {
            Answer::North => 0,
            Answer::South => 1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "index", rename_all = "snake_case")]
pub enum SessionState {
    Idle,
    Presenting(usize),
    Completed,
}

/// The queue slot currently shown to the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cursor {
    pub index: usize,
    pub total: usize,
    pub city: CityId,
}

impl Cursor {
    /// One-based position for display, e.g. "3 of 40".
    pub fn number(&self) -> usize {
        self.index + 1
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Present(Cursor),
    Completed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackOutcome {
    Moved(Cursor),
    /// Already on the first city; nothing changed.
    AtStart,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SessionError {
    #[error("session already started")]
    AlreadyStarted,
    #[error("no city is being presented (session is {0:?})")]
    NotPresenting(SessionState),
    #[error("city {0:?} appears more than once in the queue")]
    DuplicateCity(CityId),
}

/// Walks a queue of cities, recording one answer per slot.
#[derive(Debug, Clone)]
pub struct SurveySession {
    queue: Vec<CityId>,
    labels: Vec<Option<Answer>>,
    state: SessionState,
}

impl Default for SurveySession {
    fn default() -> Self {
        Self::new()
    }
}

impl SurveySession {
    pub fn new() -> Self {
        Self {
            queue: Vec::new(),
            labels: Vec::new(),
            state: SessionState::Idle,
        }
    }

    pub fn start(&mut self, queue: Vec<CityId>) -> Result<Step, SessionError> {
        if self.state != SessionState::Idle {
            return Err(SessionError::AlreadyStarted);
        }
        let mut seen = HashSet::with_capacity(queue.len());
        if let Some(duplicate) = queue.iter().find(|id| !seen.insert(**id)) {
            return Err(SessionError::DuplicateCity(*duplicate));
        }

        self.labels = vec![None; queue.len()];
        self.queue = queue;
        Ok(self.enter(0))
    }

    pub fn answer(&mut self, answer: Answer) -> Result<Step, SessionError> {
        let index = self.presenting()?;
        self.labels[index] = Some(answer);
        Ok(self.enter(index + 1))
    }

    /// Step back one city. The earlier answer stays recorded until it is
    /// answered again.
    pub fn back(&mut self) -> Result<BackOutcome, SessionError> {
        let index = self.presenting()?;
        if index == 0 {
            return Ok(BackOutcome::AtStart);
        }
        self.state = SessionState::Presenting(index - 1);
        Ok(BackOutcome::Moved(self.cursor_at(index - 1)))
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Number of cities answered in sequence so far, in `[0, len]`.
    pub fn position(&self) -> usize {
        match self.state {
            SessionState::Idle => 0,
            SessionState::Presenting(index) => index,
            SessionState::Completed => self.queue.len(),
        }
    }

    pub fn current(&self) -> Option<Cursor> {
        match self.state {
            SessionState::Presenting(index) => Some(self.cursor_at(index)),
            _ => None,
        }
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn is_completed(&self) -> bool {
        self.state == SessionState::Completed
    }

    pub fn label(&self, index: usize) -> Option<Answer> {
        self.labels.get(index).copied().flatten()
    }

    /// The answered queue, in queue order. `None` until the session completes.
    pub fn labeled_queue(&self) -> Option<Vec<(CityId, Answer)>> {
        if !self.is_completed() {
            return None;
        }
        self.queue
            .iter()
            .zip(&self.labels)
            .map(|(id, label)| label.map(|answer| (*id, answer)))
            .collect()
    }

    fn presenting(&self) -> Result<usize, SessionError> {
        match self.state {
            SessionState::Presenting(index) => Ok(index),
            other => Err(SessionError::NotPresenting(other)),
        }
    }

    fn enter(&mut self, index: usize) -> Step {
        if index < self.queue.len() {
            self.state = SessionState::Presenting(index);
            Step::Present(self.cursor_at(index))
        } else {
            self.state = SessionState::Completed;
            Step::Completed
        }
    }

    fn cursor_at(&self, index: usize) -> Cursor {
        Cursor {
            index,
            total: self.queue.len(),
            city: self.queue[index],
        }
    }
}
