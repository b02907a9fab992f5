//! Integration tests for the stream scheduler

use gumdrop_core::*;
use std::sync::Arc;

fn connection() -> Connection {
    Connection::new(
        SchedulerConfig::default(),
        AsyncConfig::default(),
        TimerExecutor::current().expect("test runtime"),
        Arc::new(NullResponseWriter),
    )
}

/// Open a set of streams with effectively unlimited windows and `queued`
/// bytes ready on each.
fn open_with_queues(conn: &mut Connection, specs: &[(StreamId, u16, usize)]) {
    conn.on_window_update(0, (MAX_WINDOW_SIZE - INITIAL_WINDOW_SIZE) as u32)
        .unwrap();
    for &(id, weight, queued) in specs {
        conn.on_headers(id, true).unwrap();
        if weight != DEFAULT_WEIGHT {
            conn.on_priority(id, 0, weight, false).unwrap();
        }
        conn.on_window_update(id, (MAX_WINDOW_SIZE - INITIAL_WINDOW_SIZE) as u32)
            .unwrap();
        conn.enqueue(id, queued).unwrap();
    }
}

fn drain_until_first_empty(conn: &mut Connection, ids: &[StreamId]) {
    loop {
        let drained = ids
            .iter()
            .any(|id| conn.stream(*id).map(|s| s.queued_bytes() == 0).unwrap_or(true));
        if drained {
            break;
        }
        let Some((id, n)) = conn.next_sendable(usize::MAX) else { break };
        conn.account(id, n);
    }
}

#[tokio::test]
async fn test_equal_weights_equal_work() {
    let ten_mib = 10 << 20;
    let mut conn = connection();
    open_with_queues(&mut conn, &[(1, 16, ten_mib), (3, 16, ten_mib)]);

    drain_until_first_empty(&mut conn, &[1, 3]);

    let a = conn.stream(1).unwrap().bytes_sent() as i64;
    let b = conn.stream(3).unwrap().bytes_sent() as i64;
    assert!(
        (a - b).abs() <= (ten_mib as i64) / 10,
        "uneven split: {} vs {}",
        a,
        b
    );
}

#[tokio::test]
async fn test_three_to_one_weighting() {
    let ten_mib = 10 << 20;
    let mut conn = connection();
    open_with_queues(&mut conn, &[(1, 192, ten_mib), (3, 64, ten_mib)]);

    drain_until_first_empty(&mut conn, &[1, 3]);

    let x = conn.stream(1).unwrap().bytes_sent() as f64;
    let y = conn.stream(3).unwrap().bytes_sent() as f64;
    let ratio = x / y;
    assert!((2.7..=3.3).contains(&ratio), "ratio {}", ratio);
}

#[tokio::test]
async fn test_sibling_ratio_inside_every_window() {
    // the 3:1 split must hold across each 1 MiB window, not just in
    // aggregate
    let mut conn = connection();
    open_with_queues(&mut conn, &[(1, 192, 40 << 20), (3, 64, 40 << 20)]);

    let window = 1 << 20;
    for _ in 0..8 {
        let (start_x, start_y) = (
            conn.stream(1).unwrap().bytes_sent(),
            conn.stream(3).unwrap().bytes_sent(),
        );
        let mut sent = 0usize;
        while sent < window {
            let (id, n) = conn.next_sendable(usize::MAX).unwrap();
            conn.account(id, n);
            sent += n;
        }
        let dx = (conn.stream(1).unwrap().bytes_sent() - start_x) as f64;
        let dy = (conn.stream(3).unwrap().bytes_sent() - start_y) as f64;
        let share = dx / (dx + dy);
        // 0.75 target with the +/-10% envelope
        assert!((0.65..=0.85).contains(&share), "window share {}", share);
    }
}

#[tokio::test]
async fn test_no_schedulable_stream_starves() {
    let mut conn = connection();
    open_with_queues(
        &mut conn,
        &[
            (1, 256, 100 << 20),
            (3, 256, 100 << 20),
            (5, 256, 100 << 20),
            (7, 1, 100 << 20),
        ],
    );

    let threshold = SchedulerConfig::default().starvation_threshold_rounds;
    let mut waited = 0u32;
    for _ in 0..3000 {
        let (id, n) = conn.next_sendable(usize::MAX).unwrap();
        conn.account(id, n);
        if id == 7 {
            waited = 0;
        } else {
            waited += 1;
            assert!(
                waited <= threshold * 2,
                "weight-1 stream starved for {} rounds",
                waited
            );
        }
    }
}

#[tokio::test]
async fn test_writer_budget_respected() {
    let mut conn = connection();
    open_with_queues(&mut conn, &[(1, 16, 1 << 20)]);

    let (_, n) = conn.next_sendable(4000).unwrap();
    assert!(n <= 4000);
}

#[tokio::test]
async fn test_bytes_accounting_matches_stats() {
    let mut conn = connection();
    open_with_queues(&mut conn, &[(1, 16, 50_000), (3, 16, 50_000)]);

    let mut total = 0u64;
    while let Some((id, n)) = conn.next_sendable(usize::MAX) {
        conn.account(id, n);
        total += n as u64;
    }
    assert_eq!(total, 100_000);
    assert_eq!(conn.stats().bytes_scheduled(), 100_000);
    assert_eq!(
        conn.stream(1).unwrap().bytes_sent() + conn.stream(3).unwrap().bytes_sent(),
        100_000
    );
}
