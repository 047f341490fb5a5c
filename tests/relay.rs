use std::sync::Arc;
use std::time::Duration;

use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use bytes::Bytes;
use futures::channel::mpsc;
use futures::{SinkExt, StreamExt};
use image::{Rgb, RgbImage};
use serde_json::Value;
use tokio::sync::watch;
use tokio::time::timeout;
use tower::ServiceExt;

use vidrelay::capture::codec::{decode_frame, encode_jpeg};
use vidrelay::pipeline::{WorkerSettings, WorkerStats};
use vidrelay::server::{self, run_session, AppState, Inbound, SessionContext, SessionSettings};
use vidrelay::vision::{BoundingBox, Detection, Detector, IouTracker};
use vidrelay::{FrameBuffer, FrameCodec, MonotonicClock, OutputBuffer, RelayError, VisionWorker};

fn state_with_output(count: u8) -> Arc<AppState> {
    let frames = Arc::new(FrameBuffer::new(2, 10, FrameCodec::new(32, 18, 70)).unwrap());
    let output = Arc::new(OutputBuffer::new(10).unwrap());
    for i in 0..count {
        output.add(vec![i], i as f64);
    }
    AppState::new(
        frames,
        output,
        MonotonicClock::new(),
        SessionSettings::default(),
        Arc::new(WorkerStats::default()),
    )
}

async fn get_json(state: Arc<AppState>, uri: &str) -> Value {
    let response = server::router(state)
        .oneshot(Request::get(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&body).unwrap()
}

#[tokio::test]
async fn health_reports_healthy() {
    let body = get_json(state_with_output(0), "/api/health").await;
    assert_eq!(body, serde_json::json!({ "status": "healthy" }));
}

#[tokio::test]
async fn snaps_returns_three_evenly_spaced_frames() {
    let body = get_json(state_with_output(7), "/ws/get_snaps").await;
    let snaps: Vec<Vec<u8>> = body["snaps"]
        .as_array()
        .unwrap()
        .iter()
        .map(|s| STANDARD.decode(s.as_str().unwrap()).unwrap())
        .collect();
    assert_eq!(snaps, vec![vec![0], vec![3], vec![6]]);
}

#[tokio::test]
async fn snaps_is_short_when_output_is_short() {
    let body = get_json(state_with_output(2), "/ws/get_snaps").await;
    assert_eq!(body["snaps"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn stats_expose_buffer_counters() {
    let body = get_json(state_with_output(12), "/api/stats").await;
    assert_eq!(body["output_buffer"]["len"], 10);
    assert_eq!(body["output_buffer"]["evicted"], 2);
    assert_eq!(body["frame_buffer"]["capacity"], 20);
    assert_eq!(body["active_sessions"], 0);
}

/// Reports one person in the middle of every frame
struct CentrePerson;

impl Detector for CentrePerson {
    fn detect(&mut self, frame: &RgbImage) -> vidrelay::Result<Vec<Detection>> {
        let (w, h) = (frame.width() as f32, frame.height() as f32);
        Ok(vec![Detection {
            bbox: BoundingBox::new(w * 0.25, h * 0.25, w * 0.75, h * 0.9),
            confidence: 0.8,
            class_id: 0,
        }])
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn frames_round_trip_through_worker_and_session() {
    let frames = Arc::new(FrameBuffer::new(2, 10, FrameCodec::new(160, 90, 80)).unwrap());
    let output = Arc::new(OutputBuffer::new(10).unwrap());
    let clock = MonotonicClock::new();

    let worker = VisionWorker::new(
        frames.clone(),
        output.clone(),
        Box::new(CentrePerson),
        Box::new(IouTracker::default()),
        WorkerSettings {
            target_fps: 20,
            confidence_threshold: 0.5,
            classes: vec![0],
            box_thickness: 2,
            jpeg_quality: 80,
        },
    )
    .unwrap();
    let worker = worker.spawn().unwrap();

    let (_shutdown, shutdown_rx) = watch::channel(false);
    let ctx = SessionContext {
        frames: frames.clone(),
        output: output.clone(),
        clock,
        settings: SessionSettings {
            staleness_secs: 1.5,
            egress_period: Duration::from_millis(20),
        },
        shutdown: shutdown_rx,
    };
    let (inlet, inbound) = mpsc::unbounded::<vidrelay::Result<Inbound>>();
    let (outbound, mut outlet) = mpsc::unbounded::<Bytes>();
    let outbound = outbound.sink_map_err(|e| RelayError::Socket(e.to_string()));
    let session = tokio::spawn(run_session(7, inbound, outbound, ctx));

    let camera = encode_jpeg(&RgbImage::from_pixel(320, 180, Rgb([200, 200, 200])), 90).unwrap();
    inlet.unbounded_send(Ok(Inbound::Frame(camera))).unwrap();

    let annotated = timeout(Duration::from_secs(5), outlet.next())
        .await
        .expect("annotated frame relayed")
        .unwrap();
    let image = decode_frame(&annotated).unwrap();
    assert_eq!(image.dimensions(), (160, 90));
    // box edge is drawn in a saturated palette color, unlike the grey input
    let edge = image.get_pixel(80, 81);
    let spread = edge.0.iter().max().unwrap() - edge.0.iter().min().unwrap();
    assert!(spread > 40, "expected a colored box edge, got {:?}", edge);

    drop(inlet);
    timeout(Duration::from_secs(2), session).await.unwrap().unwrap();
    tokio::task::spawn_blocking(move || worker.stop()).await.unwrap();
}
