//! The queue fabric used from real threads, the way tasks on separate executors use it.

use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;

use embassy_futures::block_on;
use embassy_time::Duration;
use myrtio_netkit::ipc::{Link, Publisher, Queue, TaskEventQueue, forward_next};

#[test]
fn test_producer_and_consumer_threads_keep_fifo_order() {
    let queue = Queue::<u32, 4>::new();

    thread::scope(|s| {
        s.spawn(|| {
            for i in 0..64 {
                block_on(queue.push_timeout(i, Duration::from_secs(5))).unwrap();
            }
        });

        let mut received = Vec::new();
        while received.len() < 64 {
            received.push(block_on(queue.pop_wait()));
        }
        assert_eq!(received, (0..64).collect::<Vec<_>>());
    });
}

#[test]
fn test_push_timeout_succeeds_once_consumer_frees_room() {
    let queue = Queue::<u8, 1>::new();
    queue.try_push(1).unwrap();

    thread::scope(|s| {
        s.spawn(|| {
            thread::sleep(std::time::Duration::from_millis(20));
            assert_eq!(queue.pop(), Some(1));
        });
        block_on(queue.push_timeout(2, Duration::from_secs(5))).unwrap();
    });
    assert_eq!(queue.pop(), Some(2));
}

#[test]
fn test_full_subscriber_is_skipped_while_others_receive() {
    let slow = Queue::<u32, 2>::new();
    let fast = Queue::<u32, 16>::new();
    let publisher = Publisher::<u32, 2>::new();
    let _slow_link = Link::new(&publisher, &slow).unwrap();
    let _fast_link = Link::new(&publisher, &fast).unwrap();

    let mut dropped = 0;
    for i in 0..10 {
        dropped += publisher.publish(i).dropped;
    }
    assert_eq!(dropped, 8);
    assert_eq!((slow.pop(), slow.pop(), slow.pop()), (Some(0), Some(1), None));
    for i in 0..10 {
        assert_eq!(fast.pop(), Some(i));
    }
}

#[test]
fn test_task_event_queues_forward_one_item_per_wakeup() {
    let numbers = Queue::<u32, 8>::new();
    let words = Queue::<&'static str, 8>::new();
    let number_pub = Publisher::<u32, 1>::new();
    let word_pub = Publisher::<&'static str, 1>::new();
    let done = AtomicBool::new(false);

    let mut seen_numbers = Vec::new();
    let mut seen_words = Vec::new();
    {
        let mut number_events =
            TaskEventQueue::new(&number_pub, &numbers, |n: &u32| seen_numbers.push(*n)).unwrap();
        let mut word_events =
            TaskEventQueue::new(&word_pub, &words, |w: &&'static str| seen_words.push(*w)).unwrap();

        thread::scope(|s| {
            s.spawn(|| {
                for i in 0..4 {
                    number_pub.publish(i);
                    word_pub.publish(["a", "b", "c", "d"][i as usize]);
                }
                done.store(true, Ordering::Release);
            });

            let mut forwarded = 0;
            while forwarded < 8 {
                block_on(forward_next(&mut [&mut number_events, &mut word_events]));
                forwarded += 1;
            }
        });
        assert!(done.load(Ordering::Acquire));
        assert_eq!(number_events.count() + word_events.count(), 0);
    }

    assert_eq!(seen_numbers, [0, 1, 2, 3]);
    assert_eq!(seen_words, ["a", "b", "c", "d"]);
    assert_eq!(number_pub.subscriber_count(), 0);
    assert_eq!(word_pub.subscriber_count(), 0);
}
