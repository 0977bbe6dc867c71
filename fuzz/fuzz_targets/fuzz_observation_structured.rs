#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use playsync_core::TimeRanges;
use playsync_observe::transport::{decode, encode};
use playsync_observe::{
    BaseObservation, ContentId, MainThreadMessage, ObservationPosition, ReadyState,
};

#[derive(Arbitrary, Debug)]
struct FuzzObservation {
    polled: f64,
    wanted: Option<f64>,
    duration: f64,
    ready: u8,
    paused: bool,
    ranges: Vec<(f64, f64)>,
}

fuzz_target!(|input: FuzzObservation| {
    let buffered: TimeRanges = input.ranges.iter().take(64).copied().collect();
    let polled = if input.polled.is_finite() { input.polled } else { 0.0 };
    let wanted = input.wanted.filter(|w| w.is_finite());
    let value = BaseObservation {
        position: ObservationPosition::new(polled, wanted),
        duration: input.duration,
        paused: input.paused,
        ready_state: ReadyState::from_code(input.ready),
        buffer_gap: buffered.buffer_gap_at(polled),
        current_range: buffered.range_containing(polled),
        buffered,
        ..BaseObservation::initial()
    };
    let message = MainThreadMessage::PlaybackObservation {
        content_id: ContentId::new("fuzz"),
        value: value.clone(),
    };
    let text = encode(&message).expect("observation encodes");
    let back: MainThreadMessage = decode(&text).expect("encoded observation decodes");
    let MainThreadMessage::PlaybackObservation { value: got, .. } = back;
    assert_eq!(got.position, value.position);
    assert_eq!(got.buffered, value.buffered);
    assert_eq!(got.ready_state, value.ready_state);
    assert_eq!(got.duration.is_nan(), value.duration.is_nan());
});
