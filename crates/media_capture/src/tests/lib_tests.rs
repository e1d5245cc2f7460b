use super::*;

#[tokio::test]
async fn synthetic_stream_carries_requested_tracks_and_stops_once() {
    let capability = SyntheticMediaCapability::new();
    let stream = capability
        .acquire(CaptureConstraints::camera_and_microphone())
        .await
        .expect("acquire");

    assert_eq!(stream.tracks(), vec![TrackKind::Video, TrackKind::Audio]);
    assert!(stream.is_live());
    assert_eq!(capability.acquired_count(), 1);

    stream.stop_all_tracks();
    stream.stop_all_tracks();
    assert!(!stream.is_live());
}

#[tokio::test]
async fn synthetic_capability_rejects_empty_constraints() {
    let capability = SyntheticMediaCapability::new();
    let result = capability
        .acquire(CaptureConstraints {
            video: false,
            audio: false,
        })
        .await;

    assert!(result.is_err());
    assert_eq!(capability.acquired_count(), 0);
}

#[tokio::test]
async fn missing_capability_always_fails() {
    let err = MissingMediaCapability
        .acquire(CaptureConstraints::camera_and_microphone())
        .await
        .err()
        .expect("missing device must fail");
    assert!(err.to_string().contains("unavailable"));
}

#[test]
fn simulated_presence_respects_degenerate_probabilities() {
    let always = SimulatedPresence::new(1.0);
    let never = SimulatedPresence::new(0.0);
    for _ in 0..64 {
        assert!(always.sample().expect("sample"));
        assert!(!never.sample().expect("sample"));
    }
}

#[test]
fn simulated_presence_clamps_out_of_range_probability() {
    assert_eq!(SimulatedPresence::new(4.0).probability(), 1.0);
    assert_eq!(SimulatedPresence::new(-1.0).probability(), 0.0);
    assert_eq!(
        SimulatedPresence::new(f64::NAN).probability(),
        SimulatedPresence::DEFAULT_PROBABILITY
    );
}
