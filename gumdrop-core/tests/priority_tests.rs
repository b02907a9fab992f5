//! Integration tests for the priority dependency tree

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

fn raise_windows(conn: &mut Connection, ids: &[StreamId]) {
    conn.on_window_update(0, (MAX_WINDOW_SIZE - INITIAL_WINDOW_SIZE) as u32)
        .unwrap();
    for &id in ids {
        conn.on_window_update(id, (MAX_WINDOW_SIZE - INITIAL_WINDOW_SIZE) as u32)
            .unwrap();
    }
}

#[tokio::test]
async fn test_exclusive_promotion_scenario() {
    // root -> {A=1, B=3}; add C=5 exclusive under root
    let mut conn = connection();
    conn.on_headers(1, false).unwrap();
    conn.on_headers(3, false).unwrap();
    conn.on_priority(5, 0, 16, true).unwrap();
    conn.on_headers(5, false).unwrap();
    raise_windows(&mut conn, &[1, 3, 5]);

    // after the op: root -> C -> {A, B}
    let snap = conn.snapshot();
    let c = snap.iter().find(|s| s.stream_id == 5).unwrap();
    assert_eq!(c.parent, 0);
    assert_eq!(c.children, vec![1, 3]);

    // only C has data: C sends
    conn.enqueue(5, 100_000).unwrap();
    let (id, n) = conn.next_sendable(usize::MAX).unwrap();
    assert_eq!(id, 5);
    conn.account(5, n);

    // C closes; A and B share equally
    conn.close_stream(5).unwrap();
    conn.enqueue(1, 1 << 20).unwrap();
    conn.enqueue(3, 1 << 20).unwrap();

    for _ in 0..20 {
        let (id, n) = conn.next_sendable(usize::MAX).unwrap();
        conn.account(id, n);
    }
    let a = conn.stream(1).unwrap().bytes_sent();
    let b = conn.stream(3).unwrap().bytes_sent();
    assert_eq!(a, b);
}

#[tokio::test]
async fn test_dependency_inversion_via_priority_frames() {
    // B=3 depends on A=1; a PRIORITY frame makes A depend on B
    let mut conn = connection();
    conn.on_headers(1, false).unwrap();
    conn.on_priority(3, 1, 16, false).unwrap();

    conn.on_priority(1, 3, 16, false).unwrap();

    let snap = conn.snapshot();
    let a = snap.iter().find(|s| s.stream_id == 1).unwrap();
    let b = snap.iter().find(|s| s.stream_id == 3).unwrap();
    assert_eq!(b.parent, 0); // B moved to A's former parent
    assert_eq!(a.parent, 3); // A now depends on B
}

#[tokio::test]
async fn test_weight_boundaries_on_the_wire() {
    let mut conn = connection();
    conn.on_priority(1, 0, 1, false).unwrap();
    conn.on_priority(3, 0, 256, false).unwrap();

    assert!(matches!(
        conn.on_priority(5, 0, 0, false),
        Err(Error::Protocol(_))
    ));
    assert!(matches!(
        conn.on_priority(5, 0, 257, false),
        Err(Error::Protocol(_))
    ));
}

#[tokio::test]
async fn test_self_dependency_rejected() {
    let mut conn = connection();
    conn.on_headers(1, false).unwrap();
    assert!(matches!(
        conn.on_priority(1, 1, 16, false),
        Err(Error::Protocol(_))
    ));
}

#[tokio::test]
async fn test_reprioritize_noop_keeps_structure() {
    let mut conn = connection();
    conn.on_headers(1, false).unwrap();
    conn.on_priority(3, 1, 32, false).unwrap();

    let before = format!("{:?}", conn.snapshot());
    conn.on_priority(3, 1, 32, false).unwrap();
    assert_eq!(before, format!("{:?}", conn.snapshot()));
}

#[tokio::test]
async fn test_snapshot_serializes_for_diagnostics() {
    let mut conn = connection();
    conn.on_headers(1, false).unwrap();
    conn.on_priority(3, 1, 32, false).unwrap();

    let json = serde_json::to_value(conn.snapshot()).unwrap();
    assert_eq!(json[0]["stream_id"], 1);
    assert_eq!(json[1]["parent"], 1);
    assert_eq!(json[1]["weight"], 32);
    assert_eq!(json[1]["closed"], false);
}

#[tokio::test]
async fn test_ghost_subtree_prune_keeps_shares_stable() {
    // root -> {1, ghost 5 -> 7}; pruning the dead 5/7 subtree must not
    // disturb stream 1 and 3's split
    let mut conn = connection();
    conn.on_headers(1, false).unwrap();
    conn.on_headers(3, false).unwrap();
    conn.on_headers(5, false).unwrap();
    conn.on_priority(7, 5, 16, false).unwrap();
    conn.on_headers(7, false).unwrap();
    raise_windows(&mut conn, &[1, 3, 5, 7]);

    conn.enqueue(1, 1 << 20).unwrap();
    conn.enqueue(3, 1 << 20).unwrap();

    conn.close_stream(5).unwrap();
    let before: Vec<StreamId> = (0..6)
        .map(|_| {
            let (id, n) = conn.next_sendable(16384).unwrap();
            conn.account(id, n);
            id
        })
        .collect();

    // closing the leaf dissolves the whole ghost chain
    conn.close_stream(7).unwrap();
    assert!(conn.snapshot().iter().all(|s| s.stream_id != 5));

    let after: Vec<StreamId> = (0..6)
        .map(|_| {
            let (id, n) = conn.next_sendable(16384).unwrap();
            conn.account(id, n);
            id
        })
        .collect();

    // identical alternation pattern before and after the prune
    assert_eq!(before, after);
}
