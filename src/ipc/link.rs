//! One-to-many broadcast of values into subscriber queues.
//!
//! A [`Publisher`] keeps a bounded list of borrowed sinks. A [`Link`] adds one sink
//! to that list when created and removes it when dropped, so a queue can never be
//! delivered to after whoever linked it is gone.
//!
//! Queues must be declared before the publisher, and links after both:
//!
//! ```ignore
//! static STATUS: Publisher<'static, NetworkStatus, 4> = Publisher::new();
//! static UI_QUEUE: Queue<NetworkStatus, 8> = Queue::new();
//!
//! let _link = Link::new(&STATUS, &UI_QUEUE)?;
//! STATUS.publish(status);
//! ```

use core::cell::RefCell;

use embassy_sync::blocking_mutex::Mutex;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use heapless::Vec;

use super::queue::Queue;

/// Anything a [`Publisher`] can deliver into.
pub trait Sink<T> {
    /// Accepts `value` without waiting, or hands it back if there is no room.
    fn deliver(&self, value: T) -> Result<(), T>;
}

impl<T, const N: usize> Sink<T> for Queue<T, N> {
    fn deliver(&self, value: T) -> Result<(), T> {
        self.try_push(value).map_err(|e| e.into_inner())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum LinkError {
    /// The publisher already holds as many subscribers as it can.
    Full,
    /// This sink is already linked into the publisher.
    AlreadyLinked,
}

/// Result of one [`Publisher::publish`] call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PublishOutcome {
    /// Subscribers that accepted a copy.
    pub delivered: usize,
    /// Subscribers whose queue was full.
    pub dropped: usize,
}

type SinkRef<'q, T> = &'q (dyn Sink<T> + Sync);

/// Broadcasts values to every currently linked sink, in link order.
///
/// There is no retained history: a sink linked after a publish doesn't see it.
/// Delivery never waits; a full subscriber loses that value and the rest still get it.
pub struct Publisher<'q, T, const SUBS: usize> {
    sinks: Mutex<CriticalSectionRawMutex, RefCell<Vec<SinkRef<'q, T>, SUBS>>>,
}

impl<T, const SUBS: usize> Default for Publisher<'_, T, SUBS> {
    fn default() -> Self {
        Self::new()
    }
}

impl<'q, T, const SUBS: usize> Publisher<'q, T, SUBS> {
    pub const fn new() -> Self {
        Self {
            sinks: Mutex::new(RefCell::new(Vec::new())),
        }
    }

    fn subscribe(&self, sink: SinkRef<'q, T>) -> Result<(), LinkError> {
        self.sinks.lock(|sinks| {
            let mut sinks = sinks.borrow_mut();
            if sinks.iter().any(|s| same_sink(*s, sink)) {
                return Err(LinkError::AlreadyLinked);
            }
            sinks.push(sink).map_err(|_| LinkError::Full)
        })
    }

    fn unsubscribe(&self, sink: SinkRef<'q, T>) {
        self.sinks.lock(|sinks| {
            let mut sinks = sinks.borrow_mut();
            if let Some(index) = sinks.iter().position(|s| same_sink(*s, sink)) {
                // keep link order for the remaining subscribers
                sinks.remove(index);
            }
        });
    }

    /// Number of sinks currently linked.
    pub fn subscriber_count(&self) -> usize {
        self.sinks.lock(|sinks| sinks.borrow().len())
    }
}

impl<T: Clone, const SUBS: usize> Publisher<'_, T, SUBS> {
    /// Delivers a copy of `value` to every linked sink.
    pub fn publish(&self, value: T) -> PublishOutcome {
        self.sinks.lock(|sinks| {
            let sinks = sinks.borrow();
            let mut outcome = PublishOutcome::default();
            for sink in sinks.iter() {
                match sink.deliver(value.clone()) {
                    Ok(()) => outcome.delivered += 1,
                    Err(_) => outcome.dropped += 1,
                }
            }
            if outcome.dropped > 0 {
                warn!(
                    "Publish dropped for {} of {} subscribers",
                    outcome.dropped,
                    sinks.len()
                );
            }
            outcome
        })
    }
}

fn same_sink<T>(a: SinkRef<'_, T>, b: SinkRef<'_, T>) -> bool {
    core::ptr::addr_eq(a, b)
}

/// Registration of one sink into a [`Publisher`], undone on drop.
pub struct Link<'p, 'q, T, const SUBS: usize> {
    publisher: &'p Publisher<'q, T, SUBS>,
    sink: SinkRef<'q, T>,
}

impl<'p, 'q, T, const SUBS: usize> Link<'p, 'q, T, SUBS> {
    pub fn new(
        publisher: &'p Publisher<'q, T, SUBS>,
        sink: &'q (dyn Sink<T> + Sync),
    ) -> Result<Self, LinkError> {
        publisher.subscribe(sink)?;
        Ok(Self { publisher, sink })
    }

    pub fn publisher(&self) -> &'p Publisher<'q, T, SUBS> {
        self.publisher
    }
}

impl<T, const SUBS: usize> Drop for Link<'_, '_, T, SUBS> {
    fn drop(&mut self) {
        self.publisher.unsubscribe(self.sink);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_publish_reaches_every_linked_queue() {
        let first = Queue::<u32, 4>::new();
        let second = Queue::<u32, 4>::new();
        let publisher = Publisher::<u32, 4>::new();
        let _a = Link::new(&publisher, &first).unwrap();
        let _b = Link::new(&publisher, &second).unwrap();

        let outcome = publisher.publish(7);
        assert_eq!(
            outcome,
            PublishOutcome {
                delivered: 2,
                dropped: 0
            }
        );
        assert_eq!(first.pop(), Some(7));
        assert_eq!(second.pop(), Some(7));
    }

    #[test]
    fn test_full_subscriber_does_not_block_others() {
        let small = Queue::<u32, 1>::new();
        let large = Queue::<u32, 4>::new();
        let publisher = Publisher::<u32, 2>::new();
        let _a = Link::new(&publisher, &small).unwrap();
        let _b = Link::new(&publisher, &large).unwrap();

        publisher.publish(1);
        let outcome = publisher.publish(2);
        assert_eq!(outcome.delivered, 1);
        assert_eq!(outcome.dropped, 1);
        assert_eq!(small.pop(), Some(1));
        assert_eq!(small.pop(), None);
        assert_eq!(large.pop(), Some(1));
        assert_eq!(large.pop(), Some(2));
    }

    #[test]
    fn test_drop_unlinks() {
        let queue = Queue::<u32, 4>::new();
        let publisher = Publisher::<u32, 1>::new();
        {
            let _link = Link::new(&publisher, &queue).unwrap();
            assert_eq!(publisher.subscriber_count(), 1);
        }
        assert_eq!(publisher.subscriber_count(), 0);
        assert_eq!(publisher.publish(3).delivered, 0);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_link_capacity_and_duplicates() {
        let first = Queue::<u32, 1>::new();
        let second = Queue::<u32, 1>::new();
        let publisher = Publisher::<u32, 1>::new();
        let _a = Link::new(&publisher, &first).unwrap();
        assert_eq!(
            Link::new(&publisher, &first).err(),
            Some(LinkError::AlreadyLinked)
        );
        assert_eq!(Link::new(&publisher, &second).err(), Some(LinkError::Full));
    }

    #[test]
    fn test_publish_preserves_order_per_queue() {
        let queue = Queue::<u32, 8>::new();
        let publisher = Publisher::<u32, 1>::new();
        let _link = Link::new(&publisher, &queue).unwrap();
        for i in 0..5 {
            publisher.publish(i);
        }
        for i in 0..5 {
            assert_eq!(queue.pop(), Some(i));
        }
    }
}
