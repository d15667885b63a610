use std::sync::atomic::AtomicBool;
use std::time::Duration;

use doorway_guide::output::{open_recorder, RecorderConfig};
use doorway_guide::{
    classify, session, BackendRegistry, BoundingBox, Detection, Distance, FrameGeometry,
    FrameSource, GuidanceError, GuidanceSession, LogSpeech, ManualClock, ScriptedBackend,
    ScriptedFrame, SourceConfig, SyntheticSource, Zone,
};

fn door(x1: i32, x2: i32) -> Detection {
    Detection::new("door", BoundingBox::new(x1, 0, x2, 50))
}

fn geometry() -> FrameGeometry {
    FrameGeometry::compute(900, 540).expect("geometry")
}

#[test]
fn scenario_a_left_far() {
    let g = geometry();
    assert_eq!((g.left_bound, g.right_bound), (300, 600));
    assert!((g.distance_threshold - 90.0).abs() < 1e-9);

    let d = door(100, 140);
    assert_eq!(d.bounding_box.center_x(), 120);
    assert_eq!(d.bounding_box.width(), 40);

    let i = classify(&d, &g).unwrap();
    assert_eq!((i.zone, i.distance), (Zone::Left, Distance::Far));
    assert_eq!(i.phrase, "door is on the left; rotate left to approach.");
}

#[test]
fn scenario_b_right_near() {
    let i = classify(&door(650, 800), &geometry()).unwrap();
    assert_eq!((i.zone, i.distance), (Zone::Right, Distance::Near));
    assert_eq!(i.phrase, "door is on the right; no rotation needed.");
}

#[test]
fn scenario_c_center_near() {
    let i = classify(&door(400, 500), &geometry()).unwrap();
    assert_eq!((i.zone, i.distance), (Zone::Center, Distance::Near));
    assert_eq!(i.phrase, "door is centered and close.");
}

#[test]
fn invalid_geometry_is_fatal() {
    assert!(matches!(
        FrameGeometry::compute(0, 540),
        Err(GuidanceError::InvalidGeometry { .. })
    ));
}

#[test]
fn throttle_speaks_at_zero_and_seven_only() {
    let mut s = GuidanceSession::new(
        geometry(),
        "door",
        Duration::from_secs(6),
        Box::new(LogSpeech::new()),
    )
    .unwrap();

    let spoken: Vec<u64> = [0u64, 3, 7]
        .into_iter()
        .filter(|&t| {
            s.process_frame(&[door(100, 140)], Duration::from_secs(t))
                .spoken
                .is_some()
        })
        .collect();
    assert_eq!(spoken, vec![0, 7]);
    assert_eq!(s.stats().suppressed, 1);
}

#[test]
fn scripted_pipeline_end_to_end() {
    let mut source = SyntheticSource::new(SourceConfig {
        url: "stub://corridor".to_string(),
        target_fps: 30,
        width: 900,
        height: 540,
        max_frames: Some(4),
    })
    .unwrap();
    source.connect().unwrap();
    let (w, h) = source.resolution();
    let g = FrameGeometry::compute(w, h).unwrap();

    let mut detectors = BackendRegistry::new();
    detectors.register(ScriptedBackend::new(vec![
        ScriptedFrame {
            frame: 1,
            at_secs: None,
            detections: vec![
                Detection::new("window", BoundingBox::new(0, 0, 50, 50)),
                door(650, 800),
            ],
        },
        ScriptedFrame {
            frame: 2,
            at_secs: None,
            detections: vec![door(500, 500)],
        },
        ScriptedFrame {
            frame: 4,
            at_secs: None,
            detections: vec![door(400, 500)],
        },
    ]));

    let mut s = GuidanceSession::new(g, "door", Duration::from_secs(6), Box::new(LogSpeech::new()))
        .unwrap();
    let dir = tempfile::tempdir().unwrap();
    let recording = dir.path().join("corridor.rgb");
    let mut recorder = open_recorder(RecorderConfig {
        path: recording.clone(),
        width: w,
        height: h,
        fps: 30,
    })
    .unwrap();
    let stop = AtomicBool::new(false);
    let stats = session::run(
        &mut source,
        &mut detectors,
        &mut s,
        Some(recorder.as_mut()),
        &ManualClock::new(),
        &stop,
    )
    .unwrap();

    assert_eq!(stats.frames_recorded, 4);
    assert_eq!(recorder.frames_written(), 4);
    let bytes = std::fs::metadata(&recording).unwrap().len();
    assert_eq!(bytes, 4 * 900 * 540 * 3);

    assert_eq!(stats.frames, 4);
    assert_eq!(stats.detections, 4);
    assert_eq!(stats.spoken, 1);
    assert_eq!(stats.suppressed, 1);
    assert_eq!(stats.rejected, 1);
}
