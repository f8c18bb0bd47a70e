//! Stream batch tests for WiRoc core

use wiroc_core::punch::{decode_punches, decode_test_punches};
use wiroc_core::{Error, PunchLog, TestPunchBoard, TestPunchStatus};

const PUNCH_BATCH: &str = r#"{"punches":[
    {"sinumber":8154321,"stationnumber":31,"timestamp":"2024-05-11T10:15:02.125"},
    {"sinumber":8154322,"stationnumber":32,"timestamp":"2024-05-11T10:15:09.500"}
]}"#;

fn test_batch(status: &str, tries: u32) -> String {
    format!(
        r#"{{"punches":[{{"id":7,"sinumber":16,"stationnumber":100,"timestamp":"2024-05-11T10:00:00","status":"{}","noofsendtries":{},"retries":{}}}]}}"#,
        status, tries, tries
    )
}

#[test]
fn test_decode_punch_batch() {
    let punches = decode_punches(PUNCH_BATCH).expect("decode failed");
    assert_eq!(punches.len(), 2);
    assert_eq!(punches[0].sinumber, 8154321);
    assert_eq!(punches[0].stationnumber, 31);
    assert_eq!(punches[1].timestamp, "2024-05-11T10:15:09.500");
}

#[test]
fn test_empty_batch() {
    assert!(decode_punches(r#"{"punches":[]}"#).unwrap().is_empty());
}

#[test]
fn test_malformed_batch_is_an_error() {
    assert!(matches!(
        decode_punches("{\"punches\":"),
        Err(Error::Batch { channel: "punches", .. })
    ));
    assert!(matches!(
        decode_test_punches("[]"),
        Err(Error::Batch { channel: "testpunches", .. })
    ));
}

#[test]
fn test_decode_test_punch_batch() {
    let punches = decode_test_punches(&test_batch("notacked", 2)).unwrap();
    assert_eq!(punches.len(), 1);
    assert_eq!(punches[0].id, 7);
    assert_eq!(punches[0].status, TestPunchStatus::NotAcked);
    assert_eq!(punches[0].noofsendtries, 2);
}

#[test]
fn test_unknown_status_tolerated() {
    let punches = decode_test_punches(&test_batch("exploded", 0)).unwrap();
    assert_eq!(punches[0].status, TestPunchStatus::Unknown);
}

#[test]
fn test_punch_log_appends() {
    let mut log = PunchLog::new();
    let batch = decode_punches(PUNCH_BATCH).unwrap();
    log.extend(&batch);
    log.extend(&batch);
    assert_eq!(log.len(), 4);
}

#[test]
fn test_board_upserts_by_id() {
    let mut board = TestPunchBoard::new();
    board.merge(&decode_test_punches(&test_batch("pending", 0)).unwrap());
    board.merge(&decode_test_punches(&test_batch("acked", 1)).unwrap());

    assert_eq!(board.len(), 1);
    let punch = board.get(7).unwrap();
    assert_eq!(punch.status, TestPunchStatus::Acked);
    assert_eq!(punch.retries, 1);
}
