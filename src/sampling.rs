//! Grid sampling, deduplication and shuffling of the survey queue

use std::collections::HashSet;
use std::fmt;
use std::num::NonZeroU32;

use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::{
    dataset::{CityId, DataSet},
    rng::{RngManager, SAMPLER_STREAM, SHUFFLE_STREAM},
    spatial::{BoundingBox, Grid},
};

pub const DEFAULT_MAX_PICK_ATTEMPTS: usize = 20;

/// The three levels of detail offered when a survey starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum Granularity {
    Coarse,
    Medium,
    Comprehensive,
}

impl Granularity {
    pub const ALL: [Granularity; 3] = [
        Granularity::Coarse,
        Granularity::Medium,
        Granularity::Comprehensive,
    ];

    pub fn mode(self) -> SamplingMode {
        match self {
            Granularity::Coarse => SamplingMode::interval(7),
            Granularity::Medium => SamplingMode::interval(15),
            Granularity::Comprehensive => SamplingMode::Comprehensive,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Granularity::Coarse => "Just curious",
            Granularity::Medium => "Quite interested",
            Granularity::Comprehensive => "I'm insane",
        }
    }
}

impl fmt::Display for Granularity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.mode() {
            SamplingMode::Interval(n) => {
                write!(f, "{} (Sample granularity: {})", self.label(), n)
            }
            SamplingMode::Comprehensive => {
                write!(f, "{} (Sample granularity: all)", self.label())
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SamplingMode {
    /// Grid sampling with N windows along the X axis.
    Interval(NonZeroU32),
    /// Every city in the dataset, unsampled.
    Comprehensive,
}

impl SamplingMode {
    /// Panics on zero; only used with the built-in granularities.
    const fn interval(n: u32) -> Self {
        match NonZeroU32::new(n) {
            Some(n) => SamplingMode::Interval(n),
            None => panic!("sampling interval must be positive"),
        }
    }
}

/// Outcome of one sampling pass, before deduplication.
#[derive(Debug, Clone, Default)]
pub struct SamplePass {
    pub picks: Vec<CityId>,
    pub windows: usize,
    pub non_empty_windows: usize,
    /// Re-rolls caused by a pick that was already in the pool.
    pub rerolls: usize,
}

/// Picks at most one city per grid window over a bounding box.
#[derive(Debug, Clone)]
pub struct GridSampler {
    bounds: BoundingBox,
    max_pick_attempts: usize,
}

impl GridSampler {
    pub fn new(bounds: BoundingBox) -> Self {
        Self {
            bounds,
            max_pick_attempts: DEFAULT_MAX_PICK_ATTEMPTS,
        }
    }

    pub fn with_max_pick_attempts(mut self, attempts: usize) -> Self {
        self.max_pick_attempts = attempts.max(1);
        self
    }

    pub fn bounds(&self) -> &BoundingBox {
        &self.bounds
    }

    /// Walks the grid row by row. Each non-empty window contributes one
    /// uniformly chosen member, re-rolled while it is already in the pool
    /// until `max_pick_attempts` picks have been made. The last pick is kept
    /// regardless, so the result can hold duplicates.
    pub fn sample<R: Rng + ?Sized>(
        &self,
        dataset: &DataSet,
        granularity: NonZeroU32,
        rng: &mut R,
    ) -> SamplePass {
        let grid = Grid::new(&self.bounds, granularity);
        let mut in_pool = vec![false; dataset.len()];
        let mut members: Vec<CityId> = Vec::new();
        let mut pass = SamplePass {
            windows: grid.window_count(),
            ..SamplePass::default()
        };

        for window in grid.windows() {
            members.clear();
            members.extend(
                dataset
                    .iter()
                    .filter(|city| window.contains(city.position))
                    .map(|city| city.id),
            );
            if members.is_empty() {
                continue;
            }
            pass.non_empty_windows += 1;

            let mut picked = members[rng.gen_range(0..members.len())];
            let mut attempts = 1;
            while in_pool[picked.index()] && attempts < self.max_pick_attempts {
                picked = members[rng.gen_range(0..members.len())];
                attempts += 1;
                pass.rerolls += 1;
                tracing::trace!(city = %dataset[picked].name, "city already in pool, re-rolled");
            }

            in_pool[picked.index()] = true;
            pass.picks.push(picked);
        }

        tracing::debug!(
            granularity = granularity.get(),
            windows = pass.windows,
            non_empty = pass.non_empty_windows,
            rerolls = pass.rerolls,
            "sampling pass finished"
        );
        pass
    }
}

/// Drops every repeat of an id already seen, keeping first occurrences in
/// their original order.
pub fn dedup_keep_first(queue: &mut Vec<CityId>) {
    let mut seen = HashSet::with_capacity(queue.len());
    queue.retain(|id| seen.insert(*id));
}

/// Uniform in-place Fisher-Yates shuffle.
pub fn shuffle_queue<R: Rng + ?Sized>(queue: &mut [CityId], rng: &mut R) {
    queue.shuffle(rng);
}

/// Full queue pipeline: sample (or take everything), dedup, shuffle.
pub fn prepare_queue(
    dataset: &DataSet,
    sampler: &GridSampler,
    mode: SamplingMode,
    rng: &mut RngManager,
) -> Vec<CityId> {
    let mut queue = match mode {
        SamplingMode::Interval(granularity) => {
            let pass = sampler.sample(dataset, granularity, &mut rng.stream(SAMPLER_STREAM));
            let mut queue = pass.picks;
            dedup_keep_first(&mut queue);
            if queue.len() < pass.non_empty_windows {
                tracing::debug!(
                    non_empty = pass.non_empty_windows,
                    queued = queue.len(),
                    "duplicates survived re-rolls; queue shorter than sampled windows"
                );
            }
            queue
        }
        SamplingMode::Comprehensive => dataset.ids().collect(),
    };
    shuffle_queue(&mut queue, &mut rng.stream(SHUFFLE_STREAM));
    queue
}
