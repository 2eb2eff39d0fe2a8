use std::sync::Arc;

use northsouth::{
    config::ConfigLoader,
    controller::{NoopListener, SurveyController, SurveyEvent, SurveyUpdate},
    dataset::DatasetLoader,
    results::{HeatmapPayload, ResultWriter},
    rng::RngManager,
    sampling::Granularity,
    session::{Answer, SessionState},
};

async fn controller(seed: u64) -> SurveyController {
    let loader = ConfigLoader::new(env!("CARGO_MANIFEST_DIR"));
    let config = loader
        .load("surveys/great_britain.yaml")
        .expect("survey config parses");
    let dataset = DatasetLoader::new(&config.dataset)
        .load()
        .await
        .expect("dataset loads");
    SurveyController::with_rng(Arc::new(dataset), config, RngManager::new(seed))
}

fn answer(controller: &mut SurveyController, answer: Answer) -> SurveyUpdate {
    controller
        .handle(SurveyEvent::Answer(answer), &mut NoopListener)
        .expect("answer accepted")
}

#[tokio::test]
async fn config_fixture_loads() {
    let loader = ConfigLoader::new(env!("CARGO_MANIFEST_DIR"));
    let config = loader.load("surveys/great_britain.yaml").unwrap();
    assert_eq!(config.name, "great_britain");
    assert_eq!(config.max_pick_attempts, 20);

    let dataset = DatasetLoader::new(&config.dataset).load().await.unwrap();
    assert_eq!(dataset.len(), 80);
}

#[tokio::test]
async fn reanswered_city_keeps_latest_label() {
    let mut controller = controller(21).await;
    let first = match controller
        .start(Granularity::Coarse, &mut NoopListener)
        .unwrap()
    {
        SurveyUpdate::Present { prompt } => prompt,
        other => panic!("expected a prompt, got {other:?}"),
    };

    answer(&mut controller, Answer::South);
    let update = controller.handle(SurveyEvent::Back, &mut NoopListener).unwrap();
    assert!(matches!(update, SurveyUpdate::Present { ref prompt } if prompt.city == first.city));
    answer(&mut controller, Answer::North);

    let total = controller.session().len();
    let mut last = None;
    for _ in 1..total {
        last = Some(answer(&mut controller, Answer::South));
    }

    let result = match last {
        Some(SurveyUpdate::Completed { result }) => result,
        other => panic!("expected completion, got {other:?}"),
    };
    assert_eq!(result.points.len(), total);
    assert_eq!(result.points[0].lat, first.position.lat);
    assert_eq!(result.points[0].lng, first.position.lng);
    assert_eq!(result.points[0].value, 0);
    assert!(result.points[1..].iter().all(|p| p.value == 1));
    assert_eq!(controller.state(), SessionState::Completed);
}

#[tokio::test]
async fn cursor_stays_bounded_through_a_survey() {
    let mut controller = controller(4).await;
    controller
        .start(Granularity::Coarse, &mut NoopListener)
        .unwrap();
    let total = controller.session().len();

    let mut completions = 0;
    for step in 0..total * 2 {
        let event = if step % 3 == 2 {
            SurveyEvent::Back
        } else {
            SurveyEvent::Answer(Answer::North)
        };
        match controller.handle(event, &mut NoopListener) {
            Ok(SurveyUpdate::Completed { .. }) => completions += 1,
            Ok(_) => {}
            Err(_) => assert!(controller.session().is_completed()),
        }
        assert!(controller.session().position() <= total);
    }
    while !controller.session().is_completed() {
        let update = controller.handle(SurveyEvent::Answer(Answer::North), &mut NoopListener);
        if let Ok(SurveyUpdate::Completed { .. }) = update {
            completions += 1;
        }
    }
    assert_eq!(completions, 1);
}

#[tokio::test]
async fn completed_payload_round_trips_through_export() {
    let mut controller = controller(12).await;
    controller
        .start(Granularity::Coarse, &mut NoopListener)
        .unwrap();
    while !controller.session().is_completed() {
        answer(&mut controller, Answer::North);
    }
    let payload = controller.result().expect("result recorded").clone();

    let dir = tempfile::tempdir().unwrap();
    let path = ResultWriter::new(dir.path().join("results/gb.json"))
        .write(&payload)
        .unwrap();
    let written: HeatmapPayload =
        serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap();

    assert_eq!(written.points, payload.points);
    assert_eq!(written.granularity, Granularity::Coarse);
    assert_eq!(written.options.cell_size, 5);
}
