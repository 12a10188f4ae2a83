use geotrack_telemetry::{
    metrics, new_session_id, record_frame_decoded, record_position_published,
};

#[test]
fn counters_accumulate() {
    let before = metrics().snapshot();
    record_frame_decoded();
    record_frame_decoded();
    record_position_published();
    let after = metrics().snapshot();

    assert_eq!(after.frames_decoded - before.frames_decoded, 2);
    assert_eq!(after.positions_published - before.positions_published, 1);
}

#[test]
fn session_ids_are_unique() {
    assert_ne!(new_session_id(), new_session_id());
}
