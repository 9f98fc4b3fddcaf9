//! Delivery of queued events on the consuming task's own context.
//!
//! A producer publishes or pushes and moves on. The consuming task waits until one of
//! its queues has something, then forwards exactly one item to that queue's listener
//! before going back to its own loop. Per-wakeup work stays bounded no matter how
//! deep the queues get, and items reach the listener in the order they were pushed.

use core::future::poll_fn;
use core::task::{Context, Poll};

use super::link::{Link, LinkError, Publisher};
use super::queue::{Queue, QueueError};

/// Receives events forwarded from a [`TaskEventQueue`].
pub trait EventListener<T> {
    fn event(&mut self, event: &T);
}

impl<T, F: FnMut(&T)> EventListener<T> for F {
    fn event(&mut self, event: &T) {
        self(event)
    }
}

/// A queue bound to a listener and linked into a publisher for its lifetime.
///
/// The queue storage is borrowed, usually from a `static` or a `StaticCell`, so the
/// link can refer to it for as long as this value exists. Dropping the
/// `TaskEventQueue` unlinks the queue before the borrow ends.
pub struct TaskEventQueue<'p, 'q, T, L, const N: usize, const SUBS: usize> {
    queue: &'q Queue<T, N>,
    _link: Link<'p, 'q, T, SUBS>,
    listener: L,
}

impl<'p, 'q, T, L, const N: usize, const SUBS: usize> TaskEventQueue<'p, 'q, T, L, N, SUBS>
where
    T: Send,
    L: EventListener<T>,
{
    pub fn new(
        publisher: &'p Publisher<'q, T, SUBS>,
        queue: &'q Queue<T, N>,
        listener: L,
    ) -> Result<Self, LinkError> {
        let link = Link::new(publisher, queue)?;
        Ok(Self {
            queue,
            _link: link,
            listener,
        })
    }

    /// Pushes straight into this queue, bypassing the publisher.
    pub fn push(&self, item: T) -> Result<(), QueueError<T>> {
        self.queue.try_push(item)
    }

    /// Pops at most one item and hands it to the listener. Returns whether an item
    /// was forwarded.
    pub fn forward_to_event_queue(&mut self) -> bool {
        match self.queue.pop() {
            Some(item) => {
                self.listener.event(&item);
                true
            }
            None => false,
        }
    }

    /// Capacity of the underlying queue.
    pub fn size(&self) -> usize {
        self.queue.size()
    }

    /// Items waiting in the underlying queue.
    pub fn count(&self) -> usize {
        self.queue.count()
    }

    pub fn listener(&self) -> &L {
        &self.listener
    }

    pub fn listener_mut(&mut self) -> &mut L {
        &mut self.listener
    }
}

/// Object-safe view of a [`TaskEventQueue`], so a task can wait on queues of
/// different item types together.
pub trait TaskEventSource {
    /// Pops at most one item and forwards it to the listener.
    fn forward_to_event_queue(&mut self) -> bool;

    /// Ready once the queue is non-empty; registers the task's waker otherwise.
    fn poll_ready(&self, cx: &mut Context<'_>) -> Poll<()>;

    fn size(&self) -> usize;

    fn count(&self) -> usize;
}

impl<T, L, const N: usize, const SUBS: usize> TaskEventSource
    for TaskEventQueue<'_, '_, T, L, N, SUBS>
where
    T: Send,
    L: EventListener<T>,
{
    fn forward_to_event_queue(&mut self) -> bool {
        TaskEventQueue::forward_to_event_queue(self)
    }

    fn poll_ready(&self, cx: &mut Context<'_>) -> Poll<()> {
        self.queue.poll_ready(cx)
    }

    fn size(&self) -> usize {
        TaskEventQueue::size(self)
    }

    fn count(&self) -> usize {
        TaskEventQueue::count(self)
    }
}

/// Waits until any of `sources` holds an item, then forwards exactly one item from
/// the first ready source. Returns that source's index.
pub async fn forward_next(sources: &mut [&mut dyn TaskEventSource]) -> usize {
    let index = poll_fn(|cx| {
        // poll every source so each registers the waker
        let mut ready = None;
        for (i, source) in sources.iter().enumerate() {
            if source.poll_ready(cx).is_ready() && ready.is_none() {
                ready = Some(i);
            }
        }
        match ready {
            Some(i) => Poll::Ready(i),
            None => Poll::Pending,
        }
    })
    .await;
    sources[index].forward_to_event_queue();
    index
}

#[cfg(test)]
mod tests {
    use super::*;
    use embassy_futures::block_on;
    use heapless::Vec;

    #[derive(Default)]
    struct Recorder {
        seen: Vec<u32, 8>,
    }

    impl EventListener<u32> for Recorder {
        fn event(&mut self, event: &u32) {
            let _ = self.seen.push(*event);
        }
    }

    #[test]
    fn test_forwards_one_item_per_call_in_order() {
        let queue = Queue::<u32, 4>::new();
        let publisher = Publisher::<u32, 2>::new();
        let mut events = TaskEventQueue::new(&publisher, &queue, Recorder::default()).unwrap();

        publisher.publish(1);
        publisher.publish(2);
        events.push(3).unwrap();
        assert_eq!(events.count(), 3);
        assert_eq!(events.size(), 4);

        assert!(events.forward_to_event_queue());
        assert_eq!(events.listener().seen.as_slice(), &[1]);
        assert!(events.forward_to_event_queue());
        assert!(events.forward_to_event_queue());
        assert!(!events.forward_to_event_queue());
        assert_eq!(events.listener().seen.as_slice(), &[1, 2, 3]);
    }

    #[test]
    fn test_drop_unlinks_from_publisher() {
        let queue = Queue::<u32, 4>::new();
        let publisher = Publisher::<u32, 2>::new();
        {
            let _events = TaskEventQueue::new(&publisher, &queue, |_: &u32| {}).unwrap();
            assert_eq!(publisher.subscriber_count(), 1);
        }
        assert_eq!(publisher.subscriber_count(), 0);
    }

    #[test]
    fn test_forward_next_picks_ready_source() {
        let numbers = Queue::<u32, 4>::new();
        let flags = Queue::<bool, 4>::new();
        let number_pub = Publisher::<u32, 1>::new();
        let flag_pub = Publisher::<bool, 1>::new();

        let mut got_flag = false;
        let mut number_events =
            TaskEventQueue::new(&number_pub, &numbers, Recorder::default()).unwrap();
        let mut flag_events =
            TaskEventQueue::new(&flag_pub, &flags, |flag: &bool| got_flag = *flag).unwrap();

        flag_pub.publish(true);
        let index = block_on(forward_next(&mut [&mut number_events, &mut flag_events]));
        assert_eq!(index, 1);

        number_pub.publish(5);
        number_pub.publish(6);
        let index = block_on(forward_next(&mut [&mut number_events, &mut flag_events]));
        assert_eq!(index, 0);
        assert_eq!(number_events.count(), 1);
        assert_eq!(number_events.listener().seen.as_slice(), &[5]);

        drop(flag_events);
        assert!(got_flag);
    }
}
