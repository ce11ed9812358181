//! Ready queue tests for wos-core

use wos_core::{Priority, PriorityQueue, ThreadId};

#[test]
fn test_priority_ordering_for_all_sizes() {
    for n in 1..=32u8 {
        let mut q: PriorityQueue<ThreadId, 32> = PriorityQueue::new();
        // 37 is coprime to every size here, so this visits each of 1..=n
        // once in an order unrelated to rank.
        for i in 0..n {
            let prio = (usize::from(i) * 37 % usize::from(n)) as u8 + 1;
            q.push(Priority::new(prio).unwrap(), ThreadId(i)).unwrap();
        }
        let (top, _) = q.peek().unwrap();
        assert_eq!(top.raw(), n);

        let popped: Vec<u8> = core::iter::from_fn(|| q.pop()).map(|(p, _)| p.raw()).collect();
        let expected: Vec<u8> = (1..=n).rev().collect();
        assert_eq!(popped, expected);
    }
}

#[test]
fn test_round_robin_reinsertion() {
    let mut q: PriorityQueue<ThreadId, 4> = PriorityQueue::new();
    let prio = Priority::new(3).unwrap();
    for id in 1..=3 {
        q.push(prio, ThreadId(id)).unwrap();
    }

    let mut seen = Vec::new();
    for _ in 0..6 {
        let (prio, id) = q.pop().unwrap();
        seen.push(id.0);
        q.push(prio, id).unwrap();
    }
    assert_eq!(seen, vec![1, 2, 3, 1, 2, 3]);
}

#[test]
fn test_priority_zero_rejected() {
    assert!(Priority::new(0).is_err());
    assert!(Priority::IDLE < Priority::MIN);
}
