pub mod config;
pub mod controller;
pub mod dataset;
pub mod results;
pub mod rng;
pub mod sampling;
pub mod session;
pub mod spatial;
pub mod terminal;
pub mod web;

pub use config::{ConfigLoader, SurveyConfig};
pub use controller::{SurveyController, SurveyEvent, SurveyListener, SurveyUpdate};
pub use dataset::{DataSet, DatasetLoader};
pub use sampling::Granularity;
pub use session::Answer;
