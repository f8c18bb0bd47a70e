//! Chunk reassembly tests for WiRoc core

use parking_lot::Mutex;
use std::sync::Arc;
use wiroc_core::{wire, ChunkBuffer, CompletedMessage, DeviceId};

const MAX: usize = 20;

fn collecting_buffer() -> (ChunkBuffer, Arc<Mutex<Vec<CompletedMessage>>>) {
    let buffer = ChunkBuffer::new(MAX);
    let received = Arc::new(Mutex::new(Vec::new()));
    let sink = received.clone();
    buffer
        .subscribe(move |m| sink.lock().push(m.clone()))
        .detach();
    (buffer, received)
}

fn feed(buffer: &ChunkBuffer, device: &DeviceId, message: &[u8]) {
    for chunk in message.chunks(MAX) {
        buffer.provide_chunk(device, chunk);
    }
}

#[test]
fn test_short_chunk_completes_immediately() {
    let (buffer, received) = collecting_buffer();
    let device = DeviceId::new("dev-1");

    buffer.provide_chunk(&device, b"channel\t3");

    let received = received.lock();
    assert_eq!(received.len(), 1);
    assert_eq!(received[0].device, device);
    assert_eq!(received[0].text, "channel\t3");
}

#[test]
fn test_full_chunks_wait_for_short_final() {
    let (buffer, received) = collecting_buffer();
    let device = DeviceId::new("dev-1");

    let first = [b'a'; MAX];
    let second = [b'b'; MAX];
    buffer.provide_chunk(&device, &first);
    buffer.provide_chunk(&device, &second);
    assert!(received.lock().is_empty());
    assert_eq!(buffer.pending_len(&device), 2 * MAX);

    buffer.provide_chunk(&device, b"end");

    let received = received.lock();
    assert_eq!(received.len(), 1);
    let expected = format!("{}{}end", "a".repeat(MAX), "b".repeat(MAX));
    assert_eq!(received[0].text, expected);
    assert_eq!(buffer.pending_len(&device), 0);
}

#[test]
fn test_every_multiple_with_short_tail() {
    let (buffer, received) = collecting_buffer();
    let device = DeviceId::new("dev-1");
    let mut expected = Vec::new();

    for full_chunks in 0..4 {
        for tail in 0..MAX {
            let text: String = (0..full_chunks * MAX + tail)
                .map(|i| char::from(b'a' + (i % 26) as u8))
                .collect();

            feed(&buffer, &device, text.as_bytes());
            if tail == 0 {
                // Boundary-length payloads are closed by an empty notification
                buffer.provide_chunk(&device, b"");
            }

            expected.push(text);
            assert_eq!(buffer.pending_len(&device), 0);
        }
    }

    let received: Vec<String> = received.lock().iter().map(|m| m.text.clone()).collect();
    assert_eq!(received, expected);
}

#[test]
fn test_padded_boundary_message() {
    let (buffer, received) = collecting_buffer();
    let device = DeviceId::new("dev-1");

    let cmd = "x".repeat(MAX);
    let padded = wire::pad_for_chunking(cmd.clone(), MAX);
    assert_eq!(padded.len(), MAX + 1);

    feed(&buffer, &device, padded.as_bytes());

    let received = received.lock();
    assert_eq!(received.len(), 1);
    assert_eq!(received[0].text, format!("{} ", cmd));
}

#[test]
fn test_devices_are_isolated() {
    let (buffer, received) = collecting_buffer();
    let a = DeviceId::new("dev-a");
    let b = DeviceId::new("dev-b");

    buffer.provide_chunk(&a, &[b'a'; MAX]);
    buffer.provide_chunk(&b, &[b'b'; MAX]);
    buffer.provide_chunk(&b, b"B");
    buffer.provide_chunk(&a, b"A");

    let received = received.lock();
    assert_eq!(received.len(), 2);
    assert_eq!(received[0].device, b);
    assert_eq!(received[0].text, format!("{}B", "b".repeat(MAX)));
    assert_eq!(received[1].device, a);
    assert_eq!(received[1].text, format!("{}A", "a".repeat(MAX)));
}

#[test]
fn test_messages_delivered_in_arrival_order() {
    let (buffer, received) = collecting_buffer();
    let device = DeviceId::new("dev-1");

    for i in 0..10 {
        buffer.provide_chunk(&device, format!("msg-{}", i).as_bytes());
    }

    let texts: Vec<String> = received.lock().iter().map(|m| m.text.clone()).collect();
    let expected: Vec<String> = (0..10).map(|i| format!("msg-{}", i)).collect();
    assert_eq!(texts, expected);
}

#[test]
fn test_unsubscribe_stops_delivery() {
    let buffer = ChunkBuffer::new(MAX);
    let device = DeviceId::new("dev-1");
    let count = Arc::new(Mutex::new(0));

    let c = count.clone();
    let sub = buffer.subscribe(move |_| *c.lock() += 1);

    buffer.provide_chunk(&device, b"one");
    sub.unsubscribe();
    buffer.provide_chunk(&device, b"two");

    assert_eq!(*count.lock(), 1);
}

#[test]
fn test_reset_discards_partial() {
    let (buffer, received) = collecting_buffer();
    let device = DeviceId::new("dev-1");

    buffer.provide_chunk(&device, &[b'z'; MAX]);
    buffer.reset(&device);
    assert_eq!(buffer.pending_len(&device), 0);

    buffer.provide_chunk(&device, b"fresh");
    let received = received.lock();
    assert_eq!(received.len(), 1);
    assert_eq!(received[0].text, "fresh");
}

#[test]
fn test_multibyte_split_across_chunks() {
    let (buffer, received) = collecting_buffer();
    let device = DeviceId::new("dev-1");

    // '¤' is two bytes; put its first byte at the end of a full chunk
    let mut message = "a".repeat(MAX - 1);
    message.push('¤');
    message.push_str("tail");
    feed(&buffer, &device, message.as_bytes());

    let received = received.lock();
    assert_eq!(received.len(), 1);
    assert_eq!(received[0].text, message);
}

#[test]
fn test_invalid_utf8_is_lossy() {
    let (buffer, received) = collecting_buffer();
    let device = DeviceId::new("dev-1");

    buffer.provide_chunk(&device, &[b'o', b'k', 0xff]);

    let received = received.lock();
    assert_eq!(received.len(), 1);
    assert!(received[0].text.starts_with("ok"));
}
