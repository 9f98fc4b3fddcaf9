//! Bounded FIFO queue shared between tasks.

use core::future::poll_fn;
use core::task::{Context, Poll};

use embassy_futures::select::{Either, select};
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::{Channel, TrySendError};
use embassy_time::{Duration, Instant, Timer};

/// Error returned when an item could not be enqueued.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum QueueError<T> {
    /// The queue stayed full; the rejected item is handed back.
    Full(T),
}

impl<T> QueueError<T> {
    pub fn into_inner(self) -> T {
        match self {
            QueueError::Full(item) => item,
        }
    }
}

/// Fixed-capacity, strictly FIFO queue of value-typed items.
///
/// Any number of tasks may push; one task is expected to drain it. The capacity `N`
/// is fixed at compile time and never grows. A full queue never overwrites or
/// reorders what it already holds: [`try_push`](Self::try_push) rejects immediately,
/// [`push_timeout`](Self::push_timeout) waits for room up to a bound and then rejects.
pub struct Queue<T, const N: usize> {
    channel: Channel<CriticalSectionRawMutex, T, N>,
}

impl<T, const N: usize> Default for Queue<T, N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T, const N: usize> Queue<T, N> {
    pub const fn new() -> Self {
        Self {
            channel: Channel::new(),
        }
    }

    /// Enqueues `item` if there is room, without waiting.
    pub fn try_push(&self, item: T) -> Result<(), QueueError<T>> {
        match self.channel.try_send(item) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(item)) => Err(QueueError::Full(item)),
        }
    }

    /// Enqueues `item`, waiting at most `timeout` for room to free up.
    pub async fn push_timeout(&self, item: T, timeout: Duration) -> Result<(), QueueError<T>> {
        let deadline = Instant::now() + timeout;
        let mut item = item;
        loop {
            match self.try_push(item) {
                Ok(()) => return Ok(()),
                Err(QueueError::Full(back)) => item = back,
            }
            let room = poll_fn(|cx| self.channel.poll_ready_to_send(cx));
            if let Either::Second(()) = select(room, Timer::at(deadline)).await {
                return self.try_push(item);
            }
        }
    }

    /// Removes and returns the oldest item, if any. Never waits.
    pub fn pop(&self) -> Option<T> {
        self.channel.try_receive().ok()
    }

    /// Waits for an item and removes it.
    pub async fn pop_wait(&self) -> T {
        self.channel.receive().await
    }

    /// Resolves once the queue holds at least one item, registering the caller's waker
    /// otherwise. Only the draining task should poll this.
    pub fn poll_ready(&self, cx: &mut Context<'_>) -> Poll<()> {
        self.channel.poll_ready_to_receive(cx)
    }

    /// Capacity of the queue.
    pub const fn size(&self) -> usize {
        N
    }

    /// Number of items currently waiting.
    pub fn count(&self) -> usize {
        self.channel.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channel.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.channel.is_full()
    }

    /// Drops every waiting item.
    pub fn clear(&self) {
        self.channel.clear();
    }
}
