use std::collections::HashSet;
use std::num::NonZeroU32;

use northsouth::{
    dataset::DataSet,
    rng::RngManager,
    sampling::{dedup_keep_first, prepare_queue, Granularity, GridSampler, SamplingMode},
    spatial::{BoundingBox, Grid},
};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

fn cities() -> DataSet {
    let path = concat!(env!("CARGO_MANIFEST_DIR"), "/data/cities.geojson");
    let text = std::fs::read_to_string(path).expect("fixture dataset exists");
    DataSet::from_geojson_str(&text).expect("fixture dataset parses")
}

#[test]
fn coarse_grid_over_great_britain() {
    let bounds = BoundingBox::great_britain();
    let grid = Grid::new(&bounds, NonZeroU32::new(7).unwrap());

    assert_eq!(grid.demarcations_x().len(), 7);
    assert_eq!(grid.demarcations_y().len(), 14);
    assert!((grid.box_size_x() - 2.418).abs() < 1e-3);
    assert!((grid.box_size_y() - 1.258).abs() < 1e-3);
}

#[test]
fn sampled_queue_is_distinct_and_bounded_by_windows() {
    let dataset = cities();
    let sampler = GridSampler::new(BoundingBox::great_britain());

    for seed in 0..20 {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let pass = sampler.sample(&dataset, NonZeroU32::new(7).unwrap(), &mut rng);
        assert_eq!(pass.picks.len(), pass.non_empty_windows);

        let mut queue = pass.picks.clone();
        dedup_keep_first(&mut queue);
        let unique: HashSet<_> = queue.iter().collect();
        assert_eq!(unique.len(), queue.len());
        assert!(queue.len() <= pass.non_empty_windows);
        assert!(!queue.is_empty());
    }
}

#[test]
fn same_seed_prepares_same_queue() {
    let dataset = cities();
    let sampler = GridSampler::new(BoundingBox::great_britain());

    let mode = Granularity::Medium.mode();
    let a = prepare_queue(&dataset, &sampler, mode, &mut RngManager::new(99));
    let b = prepare_queue(&dataset, &sampler, mode, &mut RngManager::new(99));

    assert_eq!(a, b);
}

#[test]
fn finer_granularity_reaches_more_cities() {
    let dataset = cities();
    let sampler = GridSampler::new(BoundingBox::great_britain());

    let coarse_mode = Granularity::Coarse.mode();
    let medium_mode = Granularity::Medium.mode();
    let coarse = prepare_queue(&dataset, &sampler, coarse_mode, &mut RngManager::new(5));
    let medium = prepare_queue(&dataset, &sampler, medium_mode, &mut RngManager::new(5));

    assert!(medium.len() > coarse.len());
}

#[test]
fn comprehensive_mode_uses_every_city_once() {
    let dataset = cities();
    let sampler = GridSampler::new(BoundingBox::great_britain());

    let mode = SamplingMode::Comprehensive;
    let queue = prepare_queue(&dataset, &sampler, mode, &mut RngManager::new(3));

    assert_eq!(queue.len(), dataset.len());
    let unique: HashSet<_> = queue.iter().collect();
    assert_eq!(unique.len(), dataset.len());
    let in_order: Vec<_> = dataset.ids().collect();
    assert_ne!(queue, in_order, "comprehensive queue should be shuffled");
}
