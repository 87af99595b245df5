//! Cross-thread behaviour of the snapshot cell and peak gauges.

use rtcycle_stats::{MaxGauge, MinGauge, SnapshotCell};
use std::sync::Arc;
use std::thread;

#[test]
fn test_snapshot_cell_hands_off_in_order() -> Result<(), Box<dyn std::error::Error>> {
    let cell = Arc::new(SnapshotCell::<u64>::new());
    let producer = {
        let cell = Arc::clone(&cell);
        thread::spawn(move || {
            let mut published = Vec::new();
            for seq in 0..10_000_u64 {
                if cell.publish(seq).is_ok() {
                    published.push(seq);
                }
            }
            published
        })
    };

    let mut taken = Vec::new();
    loop {
        if let Some(v) = cell.take() {
            taken.push(v);
        }
        if producer.is_finished() && !cell.is_pending() {
            break;
        }
        thread::yield_now();
    }

    let published = producer.join().ok().ok_or("producer panicked")?;
    if let Some(v) = cell.take() {
        taken.push(v);
    }
    assert_eq!(taken, published);
    assert!(taken.windows(2).all(|w| matches!(w, [a, b] if a < b)));
    Ok(())
}

#[test]
fn test_gauges_across_threads() -> Result<(), Box<dyn std::error::Error>> {
    let max = Arc::new(MaxGauge::new());
    let min = Arc::new(MinGauge::new());

    let handles: Vec<_> = (0..4_u64)
        .map(|t| {
            let max = Arc::clone(&max);
            let min = Arc::clone(&min);
            thread::spawn(move || {
                for i in 0..1_000_u64 {
                    let v = t * 1_000 + i + 1;
                    max.record(v);
                    min.record(v);
                }
            })
        })
        .collect();
    for h in handles {
        h.join().ok().ok_or("worker panicked")?;
    }

    assert_eq!(max.take(), 4_000);
    assert_eq!(min.take(), Some(1));
    assert_eq!(max.get(), 0);
    assert_eq!(min.get(), None);
    Ok(())
}
