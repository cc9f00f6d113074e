use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;

use replay_engine::{BufferConfig, BufferView, MediaTime, ReplayBuffer, Segment};

/// Every field of one view must describe the same applied ingest.
fn assert_consistent(view: &BufferView) {
    assert_eq!(
        view.next_start_time,
        MediaTime::from_seconds(view.segment_count as i64)
    );
    assert!(view.earliest_available_time <= view.next_start_time);

    for (index, slot) in view.slots.iter().enumerate() {
        let Some(slot) = slot else { continue };
        assert_eq!(slot.start_time, MediaTime::from_seconds(slot.sequence as i64));
        assert!(slot.sequence < view.segment_count);
        if let Some(snapshot) = &slot.snapshot {
            assert_eq!(index % 10, 0, "snapshot on non-anchor slot {index}");
            assert_eq!(snapshot.first_sequence, slot.sequence);
            assert_eq!(snapshot.start_time, slot.start_time);
            assert!(snapshot.last_sequence < view.segment_count);
            assert!(snapshot.segment_count() <= view.slots.len());
        }
    }
}

#[test]
fn readers_never_observe_a_half_applied_ingest() {
    let (buffer, _events) = ReplayBuffer::in_memory(BufferConfig::default()).expect("spawn");
    let done = Arc::new(AtomicBool::new(false));

    let readers: Vec<_> = (0..4)
        .map(|_| {
            let buffer = buffer.clone();
            let done = Arc::clone(&done);
            thread::spawn(move || {
                let mut observed = 0_u64;
                let mut last_count = 0;
                loop {
                    let finished = done.load(Ordering::Acquire);
                    let view = buffer.view();
                    assert_consistent(&view);
                    assert!(view.segment_count >= last_count);
                    last_count = view.segment_count;
                    observed += 1;
                    if finished {
                        return observed;
                    }
                }
            })
        })
        .collect();

    let segment = Segment::video(MediaTime::from_seconds(1), 1280, 720);
    for _ in 0..1_000 {
        buffer.ingest(segment.clone()).expect("enqueue");
    }
    buffer.flush().expect("flush");
    done.store(true, Ordering::Release);

    for reader in readers {
        let observed = reader.join().expect("reader panicked");
        assert!(observed > 0);
    }
    let view = buffer.view();
    assert_eq!(view.segment_count, 1_000);
    assert_consistent(&view);
    buffer.shutdown().expect("shutdown");
}

#[test]
fn ingest_from_many_threads_counts_every_segment() {
    let (buffer, _events) = ReplayBuffer::in_memory(BufferConfig::default()).expect("spawn");

    let writers: Vec<_> = (0..4)
        .map(|_| {
            let buffer = buffer.clone();
            thread::spawn(move || {
                let segment = Segment::video(MediaTime::from_millis(500), 1280, 720);
                for _ in 0..50 {
                    buffer.ingest(segment.clone()).expect("enqueue");
                }
            })
        })
        .collect();
    for writer in writers {
        writer.join().expect("writer panicked");
    }
    buffer.flush().expect("flush");

    assert_eq!(buffer.current_segment_count(), 200);
    assert_eq!(buffer.next_start_time(), MediaTime::from_seconds(100));
}
