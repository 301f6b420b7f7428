use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use number_plate_reader::config::PipelineConfig;
use number_plate_reader::plate_detection::detection_pipeline::{BatchReport, DetectionPipeline};
use number_plate_reader::plate_detection::event_sink::PlateEventSink;
use number_plate_reader::plate_detection::plate_matcher::PlateRegistry;
use number_plate_reader::plate_detection::region_extractor::Region;
use number_plate_reader::plate_detection::text_recognizer::{TextCandidate, TextRecognizer};
use number_plate_reader::plate_detection::{BoundingBox, Detection, PlateEvent};
use number_plate_reader::{PlateReaderError, Result};
use opencv::core::{Scalar, CV_8UC3};
use opencv::prelude::*;

/// Recognizer answering from a script and recording the size of every
/// region it was shown.
struct FakeRecognizer {
    answers: VecDeque<Result<Vec<TextCandidate>>>,
    seen: Arc<Mutex<Vec<(i32, i32)>>>,
}

impl TextRecognizer for FakeRecognizer {
    fn recognize(&mut self, region: &Region) -> Result<Vec<TextCandidate>> {
        self.seen
            .lock()
            .unwrap()
            .push((region.width(), region.height()));
        self.answers.pop_front().unwrap_or_else(|| Ok(vec![]))
    }
}

fn reader(
    config: PipelineConfig,
    answers: Vec<Result<Vec<TextCandidate>>>,
) -> (DetectionPipeline, Arc<Mutex<Vec<(i32, i32)>>>) {
    let seen = Arc::new(Mutex::new(vec![]));
    let recognizer = FakeRecognizer {
        answers: answers.into(),
        seen: seen.clone(),
    };
    (DetectionPipeline::new(config, Box::new(recognizer)), seen)
}

fn read(text: &str) -> Result<Vec<TextCandidate>> {
    Ok(vec![TextCandidate::new(text, Some(0.9))])
}

fn road_frame() -> Mat {
    Mat::new_rows_cols_with_default(120, 160, CV_8UC3, Scalar::new(40.0, 80.0, 120.0, 0.0))
        .unwrap()
}

fn plate_at(center_x: f32, center_y: f32) -> Detection {
    Detection::new(3, BoundingBox::new(center_x, center_y, 40.0, 12.0))
}

fn matched(events: &[PlateEvent]) -> Vec<&str> {
    events.iter().filter_map(PlateEvent::matched_plate).collect()
}

fn crops(events: &[PlateEvent]) -> usize {
    events.iter().filter(|event| event.region().is_some()).count()
}

#[test]
fn known_plate_is_cropped_and_matched() {
    let (mut pipeline, seen) = reader(PipelineConfig::default(), vec![read("AB-1234")]);
    pipeline.on_frame(road_frame()).unwrap();

    let report = pipeline.on_detections(&[plate_at(80.0, 60.0)]);

    let events = report.events();
    assert_eq!(events.len(), 2);
    assert_eq!(events[0].region().unwrap().bounds().width, 40);
    assert_eq!(matched(events), vec!["AB-1234"]);
    match &events[1] {
        PlateEvent::MatchedPlate {
            similarity,
            recognized_text,
            ..
        } => {
            assert_eq!(*similarity, 1.0);
            assert_eq!(recognized_text, "AB-1234");
        }
        other => panic!("unexpected event {other:?}"),
    }
    assert_eq!(*seen.lock().unwrap(), vec![(40, 12)]);
}

#[test]
fn unreadable_plate_is_only_cropped() {
    let (mut pipeline, _) = reader(PipelineConfig::default(), vec![Ok(vec![])]);
    pipeline.on_frame(road_frame()).unwrap();

    let report = pipeline.on_detections(&[plate_at(80.0, 60.0)]);

    assert_eq!(crops(report.events()), 1);
    assert!(matched(report.events()).is_empty());
}

#[test]
fn detections_before_any_frame_emit_nothing() {
    let (mut pipeline, seen) = reader(PipelineConfig::default(), vec![read("AB-1234")]);

    let report = pipeline.on_detections(&[plate_at(80.0, 60.0)]);

    assert!(matches!(report, BatchReport::NoFrameAvailable));
    assert!(report.events().is_empty());
    assert!(seen.lock().unwrap().is_empty());
}

#[test]
fn weak_similarity_stays_below_the_gate() {
    // Scores 0.3 against AB-1234, its closest known plate.
    let (mut pipeline, _) = reader(PipelineConfig::default(), vec![read("AB-QQQQQQQQQQ")]);
    pipeline.on_frame(road_frame()).unwrap();

    let report = pipeline.on_detections(&[plate_at(80.0, 60.0)]);

    assert_eq!(crops(report.events()), 1);
    assert!(matched(report.events()).is_empty());
}

#[test]
fn one_failing_detection_does_not_stop_the_batch() {
    let (mut pipeline, seen) = reader(
        PipelineConfig::default(),
        vec![
            Err(PlateReaderError::Recognition("engine crashed".to_string())),
            read("MC-RL04"),
        ],
    );
    pipeline.on_frame(road_frame()).unwrap();

    let report = pipeline.on_detections(&[
        plate_at(40.0, 30.0),
        plate_at(500.0, 500.0),
        plate_at(120.0, 90.0),
    ]);

    let BatchReport::Processed { events, skipped } = report else {
        panic!("batch was not processed");
    };
    assert_eq!(skipped.out_of_bounds, 1);
    assert_eq!(skipped.recognition_failures, 1);
    assert_eq!(crops(&events), 2);
    assert_eq!(matched(&events), vec!["MC-RL04"]);
    assert_eq!(seen.lock().unwrap().len(), 2);
}

#[test]
fn plates_straddling_the_border_are_clamped() {
    let (mut pipeline, seen) = reader(PipelineConfig::default(), vec![read("XYZ-7890")]);
    pipeline.on_frame(road_frame()).unwrap();

    let report = pipeline.on_detections(&[plate_at(150.0, 115.0)]);

    assert_eq!(matched(report.events()), vec!["XYZ-7890"]);
    assert_eq!(*seen.lock().unwrap(), vec![(30, 11)]);
}

#[test]
fn custom_registry_and_threshold_are_honored() {
    let config = PipelineConfig::new(3, 0.9, PlateRegistry::new(["ZZ-0001"])).unwrap();
    let (mut pipeline, _) = reader(config, vec![read("ZZ-0001"), read("ZZ-0002")]);
    pipeline.on_frame(road_frame()).unwrap();

    let report = pipeline.on_detections(&[plate_at(40.0, 30.0), plate_at(120.0, 90.0)]);

    // ZZ-0002 scores 6/7 against ZZ-0001, below 0.9.
    assert_eq!(matched(report.events()), vec!["ZZ-0001"]);
    assert_eq!(crops(report.events()), 2);
}

#[test]
fn latest_frame_wins() {
    let (mut pipeline, seen) = reader(PipelineConfig::default(), vec![read("AB-1234")]);
    pipeline.on_frame(road_frame()).unwrap();
    pipeline
        .on_frame(Mat::new_rows_cols_with_default(40, 60, CV_8UC3, Scalar::all(0.0)).unwrap())
        .unwrap();

    // Inside the first frame, partly outside the second.
    let report = pipeline.on_detections(&[plate_at(50.0, 30.0)]);

    assert_eq!(matched(report.events()), vec!["AB-1234"]);
    assert_eq!(*seen.lock().unwrap(), vec![(30, 12)]);
}

#[test]
fn sink_publishes_what_the_pipeline_matched() {
    let (mut pipeline, _) = reader(
        PipelineConfig::default(),
        vec![read("AB-1234"), read("XYZ-7890")],
    );
    pipeline.on_frame(road_frame()).unwrap();
    let report = pipeline.on_detections(&[plate_at(40.0, 30.0), plate_at(120.0, 90.0)]);

    let sink = PlateEventSink::new(None).unwrap();
    let published = sink.publish(1, report.events());

    assert_eq!(published, vec!["AB-1234", "XYZ-7890"]);
}
