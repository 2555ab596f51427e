//! Lock-free single-producer single-consumer channel
//!
//! A fixed set of payload slots shared between exactly one producer and one
//! consumer. Neither side blocks, locks or allocates once the channel is
//! built: a request that does not fit simply comes back short or empty.
//!
//! Cursor protocol:
//! - Both cursors run over `0..2 * capacity` so a full channel and an empty
//!   one are distinguishable without sacrificing a slot
//! - The producer owns the slots between the write cursor and the read
//!   cursor plus capacity; the consumer owns the slots between the read and
//!   write cursors
//! - Each side publishes with a release store of its own cursor and observes
//!   the other side with an acquire load
//!
//! SPSC is enforced by ownership: [`LockFreeChannel::split`] hands out one
//! [`ChannelProducer`] and one [`ChannelConsumer`], neither of which is
//! `Clone`. Re-preparing requires reuniting the two halves first.

use crate::error::ChannelError;
use crossbeam::utils::CachePadded;
use std::cell::UnsafeCell;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// A value that can live in a channel slot
pub trait ChannelPayload: Send {
    /// Return the slot to its cleared state, sized for `element_capacity`
    /// elements where the payload has a size
    fn prepare(&mut self, element_capacity: usize);
}

impl<T: Default + Clone + Send> ChannelPayload for Vec<T> {
    fn prepare(&mut self, element_capacity: usize) {
        self.clear();
        self.resize(element_capacity, T::default());
    }
}

impl<T: Send> ChannelPayload for Option<T> {
    fn prepare(&mut self, _element_capacity: usize) {
        *self = None;
    }
}

macro_rules! scalar_payload {
    ($($t:ty),*) => {
        $(
            impl ChannelPayload for $t {
                fn prepare(&mut self, _element_capacity: usize) {
                    *self = <$t>::default();
                }
            }
        )*
    };
}

scalar_payload!(f32, f64, u32, u64, usize);

/// Up to two contiguous index ranges inside the slot array
///
/// The second range is non-empty only when the region wraps past the end.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChannelRegion {
    pub start1: usize,
    pub len1: usize,
    pub start2: usize,
    pub len2: usize,
}

impl ChannelRegion {
    fn new(start: usize, count: usize, capacity: usize) -> Self {
        let len1 = count.min(capacity - start);
        Self {
            start1: start,
            len1,
            start2: 0,
            len2: count - len1,
        }
    }

    /// Total number of slots covered
    pub fn len(&self) -> usize {
        self.len1 + self.len2
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

struct Shared<T> {
    slots: Box<[UnsafeCell<T>]>,
    capacity: usize,
    /// Next position the producer writes, in `0..2 * capacity`
    write: CachePadded<AtomicUsize>,
    /// Next position the consumer reads, in `0..2 * capacity`
    read: CachePadded<AtomicUsize>,
}

// SAFETY: the cursor protocol gives each slot exactly one accessor at a time,
// and payloads only ever move between threads as `T: Send`.
unsafe impl<T: Send> Sync for Shared<T> {}

impl<T> Shared<T> {
    #[inline]
    fn occupied(&self, write: usize, read: usize) -> usize {
        if write >= read {
            write - read
        } else {
            write + 2 * self.capacity - read
        }
    }

    #[inline]
    fn advance(&self, position: usize, count: usize) -> usize {
        let next = position + count;
        if next >= 2 * self.capacity {
            next - 2 * self.capacity
        } else {
            next
        }
    }

    #[inline]
    fn index(&self, position: usize) -> usize {
        if position >= self.capacity {
            position - self.capacity
        } else {
            position
        }
    }

    fn available_for_reading(&self) -> usize {
        let write = self.write.load(Ordering::Acquire);
        let read = self.read.load(Ordering::Acquire);
        self.occupied(write, read)
    }

    fn free_space(&self) -> usize {
        self.capacity - self.available_for_reading()
    }

    /// Shared slice pair for `region`
    ///
    /// # Safety
    /// The caller must own every slot in `region` under the cursor protocol.
    unsafe fn slices(&self, region: ChannelRegion) -> (&[T], &[T]) {
        let base = UnsafeCell::raw_get(self.slots.as_ptr()) as *const T;
        (
            std::slice::from_raw_parts(base.add(region.start1), region.len1),
            std::slice::from_raw_parts(base.add(region.start2), region.len2),
        )
    }

    /// Mutable slice pair for `region`
    ///
    /// # Safety
    /// The caller must own every slot in `region` under the cursor protocol
    /// and must not create overlapping references.
    #[allow(clippy::mut_from_ref)]
    unsafe fn slices_mut(&self, region: ChannelRegion) -> (&mut [T], &mut [T]) {
        // UnsafeCell<T> has the same layout as T
        let base = UnsafeCell::raw_get(self.slots.as_ptr());
        (
            std::slice::from_raw_parts_mut(base.add(region.start1), region.len1),
            std::slice::from_raw_parts_mut(base.add(region.start2), region.len2),
        )
    }
}

/// An unsplit channel; the only place `prepare` is reachable
pub struct LockFreeChannel<T> {
    shared: Shared<T>,
}

impl<T: ChannelPayload + Default> LockFreeChannel<T> {
    /// Create a channel with `capacity` default-initialised slots
    ///
    /// This is the only allocation the channel ever makes.
    pub fn new(capacity: usize) -> Result<Self, ChannelError> {
        if capacity == 0 {
            return Err(ChannelError::ZeroCapacity);
        }

        let slots = (0..capacity)
            .map(|_| UnsafeCell::new(T::default()))
            .collect::<Vec<_>>()
            .into_boxed_slice();

        Ok(Self {
            shared: Shared {
                slots,
                capacity,
                write: CachePadded::new(AtomicUsize::new(0)),
                read: CachePadded::new(AtomicUsize::new(0)),
            },
        })
    }
}

impl<T: ChannelPayload> LockFreeChannel<T> {
    /// Clear every slot for `element_capacity` elements and rewind both cursors
    pub fn prepare(&mut self, element_capacity: usize) {
        for slot in self.shared.slots.iter_mut() {
            slot.get_mut().prepare(element_capacity);
        }
        *self.shared.write.get_mut() = 0;
        *self.shared.read.get_mut() = 0;
    }

    /// Hand out the two ends of the channel
    pub fn split(self) -> (ChannelProducer<T>, ChannelConsumer<T>) {
        let shared = Arc::new(self.shared);
        (
            ChannelProducer {
                shared: Arc::clone(&shared),
            },
            ChannelConsumer { shared },
        )
    }

    /// Put the two ends back together so the channel can be re-prepared
    ///
    /// Unread items stay in place.
    pub fn reunite(
        producer: ChannelProducer<T>,
        consumer: ChannelConsumer<T>,
    ) -> Result<Self, ChannelError> {
        if !Arc::ptr_eq(&producer.shared, &consumer.shared) {
            return Err(ChannelError::Mismatched);
        }
        drop(consumer);
        Arc::try_unwrap(producer.shared)
            .map(|shared| Self { shared })
            .map_err(|_| ChannelError::Mismatched)
    }
}

impl<T> LockFreeChannel<T> {
    pub fn capacity(&self) -> usize {
        self.shared.capacity
    }

    pub fn available_for_reading(&self) -> usize {
        self.shared.available_for_reading()
    }

    pub fn free_space(&self) -> usize {
        self.shared.free_space()
    }
}

/// The writing end of a channel
pub struct ChannelProducer<T> {
    shared: Arc<Shared<T>>,
}

impl<T: ChannelPayload> ChannelProducer<T> {
    /// Reserve `num_items` slots for writing
    ///
    /// All or nothing: the region is empty unless every requested slot is
    /// free. Nothing is published until the chunk is finished.
    pub fn request_write(&mut self, num_items: usize) -> WriteChunk<'_, T> {
        let shared = &*self.shared;
        let write = shared.write.load(Ordering::Relaxed);
        let read = shared.read.load(Ordering::Acquire);
        let free = shared.capacity - shared.occupied(write, read);

        let region = if num_items == 0 || num_items > free {
            ChannelRegion::default()
        } else {
            ChannelRegion::new(shared.index(write), num_items, shared.capacity)
        };

        WriteChunk {
            shared,
            region,
            write,
        }
    }

    /// Write a single value, handing it back if the channel is full
    pub fn push(&mut self, value: T) -> Result<(), T> {
        let mut chunk = self.request_write(1);
        if chunk.is_empty() {
            return Err(value);
        }
        chunk.slices_mut().0[0] = value;
        chunk.finish();
        Ok(())
    }

    pub fn capacity(&self) -> usize {
        self.shared.capacity
    }

    /// Advisory: the consumer may free more space at any moment
    pub fn free_space(&self) -> usize {
        self.shared.free_space()
    }

    pub fn available_for_reading(&self) -> usize {
        self.shared.available_for_reading()
    }
}

/// Slots reserved by [`ChannelProducer::request_write`]
///
/// Dropping the chunk without finishing it publishes nothing.
pub struct WriteChunk<'a, T> {
    shared: &'a Shared<T>,
    region: ChannelRegion,
    write: usize,
}

impl<T> WriteChunk<'_, T> {
    pub fn region(&self) -> ChannelRegion {
        self.region
    }

    pub fn len(&self) -> usize {
        self.region.len()
    }

    pub fn is_empty(&self) -> bool {
        self.region.is_empty()
    }

    /// The reserved slots, in write order
    pub fn slices_mut(&mut self) -> (&mut [T], &mut [T]) {
        // SAFETY: the region lies in the producer-owned span, and the chunk
        // holds the producer's unique borrow for its whole lifetime.
        unsafe { self.shared.slices_mut(self.region) }
    }

    /// Publish every reserved slot
    pub fn finish(self) {
        let count = self.region.len();
        self.finish_partial(count);
    }

    /// Publish the first `count` reserved slots
    pub fn finish_partial(self, count: usize) {
        let count = count.min(self.region.len());
        if count > 0 {
            let next = self.shared.advance(self.write, count);
            self.shared.write.store(next, Ordering::Release);
        }
    }
}

/// The reading end of a channel
pub struct ChannelConsumer<T> {
    shared: Arc<Shared<T>>,
}

impl<T: ChannelPayload> ChannelConsumer<T> {
    /// Claim up to `num_items` written slots for reading
    ///
    /// The region is truncated to what is available and may be empty.
    pub fn request_read(&mut self, num_items: usize) -> ReadChunk<'_, T> {
        let shared = &*self.shared;
        let read = shared.read.load(Ordering::Relaxed);
        let write = shared.write.load(Ordering::Acquire);
        let count = num_items.min(shared.occupied(write, read));

        ReadChunk {
            shared,
            region: ChannelRegion::new(shared.index(read), count, shared.capacity),
            read,
        }
    }

    /// Take the oldest value, leaving `T::default()` in its slot
    ///
    /// Suited to payloads whose default is free to build, such as `Option`
    /// or plain snapshots.
    pub fn pop(&mut self) -> Option<T>
    where
        T: Default,
    {
        let mut chunk = self.request_read(1);
        if chunk.is_empty() {
            return None;
        }
        let value = std::mem::take(&mut chunk.slices_mut().0[0]);
        chunk.finish();
        Some(value)
    }

    pub fn capacity(&self) -> usize {
        self.shared.capacity
    }

    /// Advisory: the producer may publish more at any moment
    pub fn available_for_reading(&self) -> usize {
        self.shared.available_for_reading()
    }

    pub fn free_space(&self) -> usize {
        self.shared.free_space()
    }
}

/// Slots claimed by [`ChannelConsumer::request_read`]
///
/// Dropping the chunk without finishing it leaves the items in place.
pub struct ReadChunk<'a, T> {
    shared: &'a Shared<T>,
    region: ChannelRegion,
    read: usize,
}

impl<T> ReadChunk<'_, T> {
    pub fn region(&self) -> ChannelRegion {
        self.region
    }

    pub fn len(&self) -> usize {
        self.region.len()
    }

    pub fn is_empty(&self) -> bool {
        self.region.is_empty()
    }

    /// The claimed slots, oldest first
    pub fn slices(&self) -> (&[T], &[T]) {
        // SAFETY: the region lies in the consumer-owned span.
        unsafe { self.shared.slices(self.region) }
    }

    /// Mutable access so the consumer can move values out before finishing
    pub fn slices_mut(&mut self) -> (&mut [T], &mut [T]) {
        // SAFETY: as above, and the chunk holds the consumer's unique borrow.
        unsafe { self.shared.slices_mut(self.region) }
    }

    /// Release every claimed slot back to the producer
    pub fn finish(self) {
        let count = self.region.len();
        self.finish_partial(count);
    }

    /// Release the first `count` claimed slots
    pub fn finish_partial(self, count: usize) {
        let count = count.min(self.region.len());
        if count > 0 {
            let next = self.shared.advance(self.read, count);
            self.shared.read.store(next, Ordering::Release);
        }
    }
}
