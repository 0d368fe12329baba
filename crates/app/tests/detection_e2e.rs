//! End-to-end scenarios: synthetic audio in, confirmed alerts out.

use std::time::Duration;

use roadsense_app::config::AppConfig;
use roadsense_app::runtime;
use roadsense_audio::{FrameAssembler, FramerConfig};
use roadsense_detect::{
    BandSpec, DetectState, Detector, DetectorConfig, Signature,
};
use roadsense_dsp::SpectralAnalyzer;
use roadsense_relay::{AlertMessage, MemoryTransport, WireMessage};

const SAMPLE_RATE: u32 = 16_000;
const FRAME_LEN: usize = 1_280; // 80 ms
const HOP: usize = 640; // 40 ms

fn tone(freq: f32, millis: u32, amplitude: f32) -> Vec<i16> {
    let total = (SAMPLE_RATE as u64 * millis as u64 / 1000) as usize;
    (0..total)
        .map(|i| {
            let t = i as f32 / SAMPLE_RATE as f32;
            ((2.0 * std::f32::consts::PI * freq * t).sin() * amplitude * 32767.0) as i16
        })
        .collect()
}

fn siren_config() -> DetectorConfig {
    DetectorConfig {
        suspect_threshold: 0.5,
        confirm_threshold: 0.8,
        confirm_ms: 200, // K = 5 at a 40 ms hop
        cooldown_ms: 3_000,
        direction_margin: 0.2,
        signatures: vec![Signature {
            name: "siren".into(),
            enabled: true,
            bands: vec![BandSpec {
                low_hz: 380.0,
                high_hz: 420.0,
                min_magnitude: 0.004,
                max_magnitude: 1.0,
                weight: 1.0,
            }],
            min_score: 0.0,
        }],
    }
}

/// 500 ms of a 400 Hz tone confirms exactly one siren within 200–250 ms of
/// onset, then the cooldown holds.
#[test]
fn siren_tone_confirms_once_within_latency_budget() {
    let framer_cfg = FramerConfig {
        frame_len: FRAME_LEN,
        hop: HOP,
        sample_rate_hz: SAMPLE_RATE,
        channels: 1,
    };
    let mut assembler = FrameAssembler::new(framer_cfg);
    let mut analyzer = SpectralAnalyzer::new(SAMPLE_RATE, FRAME_LEN);
    let mut detector = Detector::new(siren_config(), 40.0).unwrap();

    let frames = assembler.push(&tone(400.0, 500, 0.5));
    assert_eq!(frames.len(), 11);

    let frame_ms = (FRAME_LEN as u64 * 1000) / SAMPLE_RATE as u64;
    let mut events = Vec::new();
    for frame in &frames {
        let spectrum = analyzer.analyze(&frame.samples, frame.seq).unwrap();
        let confirmed_at = frame.timestamp_ms + frame_ms;
        let outcome = detector.process_frame(&spectrum, frame.balance, confirmed_at);
        events.extend(outcome.events);
    }

    assert_eq!(events.len(), 1, "expected exactly one siren event");
    let event = &events[0];
    assert_eq!(event.signature, "siren");
    assert!(
        (200..=250).contains(&event.timestamp_ms),
        "confirmed at {} ms",
        event.timestamp_ms
    );
    assert_eq!(detector.state_of("siren"), Some(DetectState::Cooldown));
}

/// Silence never produces an event for any configured signature.
#[test]
fn silence_confirms_nothing() {
    let framer_cfg = FramerConfig {
        frame_len: FRAME_LEN,
        hop: HOP,
        sample_rate_hz: SAMPLE_RATE,
        channels: 1,
    };
    let mut assembler = FrameAssembler::new(framer_cfg);
    let mut analyzer = SpectralAnalyzer::new(SAMPLE_RATE, FRAME_LEN);
    let mut detector = Detector::new(DetectorConfig::default(), 40.0).unwrap();

    for frame in assembler.push(&vec![0i16; 16_000]) {
        let spectrum = analyzer.analyze(&frame.samples, frame.seq).unwrap();
        let outcome = detector.process_frame(&spectrum, 0.0, frame.timestamp_ms);
        assert!(outcome.events.is_empty());
    }
    assert_eq!(detector.state_of("siren"), Some(DetectState::Idle));
    assert_eq!(detector.state_of("horn"), Some(DetectState::Idle));
}

async fn next_alert(server: &mut roadsense_relay::HarnessLink) -> AlertMessage {
    loop {
        match tokio::time::timeout(Duration::from_secs(5), server.recv())
            .await
            .expect("timed out waiting for alert")
            .expect("link closed")
        {
            WireMessage::Alert(alert) => return alert,
            WireMessage::Heartbeat { .. } => continue,
            other => panic!("unexpected message {:?}", other),
        }
    }
}

/// Backgrounding holds frames; resuming releases the buffered audio.
#[tokio::test(flavor = "multi_thread")]
async fn suspended_pipeline_holds_frames_until_resume() {
    let mut config = AppConfig::default();
    config.audio.agc_enabled = false;
    config.detector = siren_config();

    let (transport, mut harness) = MemoryTransport::pair();
    let (handle, mut producer) = runtime::start(config, Box::new(transport)).unwrap();
    let mut server = harness.accept().await.unwrap();

    handle.suspend().unwrap();
    producer.push(&tone(400.0, 500, 0.5));
    let nothing = tokio::time::timeout(Duration::from_millis(300), server.recv()).await;
    assert!(nothing.is_err(), "alert emitted while suspended");

    handle.resume().unwrap();
    let alert = next_alert(&mut server).await;
    assert_eq!(alert.signature, "siren");
    server.send(WireMessage::Ack { ack_id: alert.id });

    drop(producer);
    handle.shutdown().await.unwrap();
}

/// The full task pipeline: pushed samples come out the far end as exactly
/// one acknowledged alert on the wearable link.
#[tokio::test(flavor = "multi_thread")]
async fn tone_reaches_wearable_as_single_alert() {
    let mut config = AppConfig::default();
    config.audio.agc_enabled = false;
    config.detector = siren_config();

    let (transport, mut harness) = MemoryTransport::pair();
    let (handle, mut producer) = runtime::start(config, Box::new(transport)).unwrap();
    let mut server = harness.accept().await.unwrap();

    producer.push(&tone(400.0, 500, 0.5));

    let alert = next_alert(&mut server).await;
    assert_eq!(alert.id, 1);
    assert_eq!(alert.signature, "siren");
    assert!(alert.confidence >= 0.8);
    server.send(WireMessage::Ack { ack_id: alert.id });

    // The cooldown suppresses any further siren alert from the same tone.
    tokio::time::sleep(Duration::from_millis(300)).await;
    let metrics = &handle.metrics;
    assert_eq!(
        metrics
            .events_confirmed
            .load(std::sync::atomic::Ordering::Relaxed),
        1
    );
    assert_eq!(metrics.dropped_frames(), 0);

    drop(producer);
    handle.shutdown().await.unwrap();
}
