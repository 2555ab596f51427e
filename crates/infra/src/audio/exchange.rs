//! Coefficient handoff between the control and audio contexts
//!
//! The control side publishes a finished [`CoefficientSet`] into a single
//! pending pointer. The audio side swaps it out at the start of a block,
//! installs it, and sends the set it replaced back through a retire queue so
//! the control side drops it. The audio side never frees or allocates, and
//! it never sees a half-written set.
//!
//! - Publishing twice before the audio side looks replaces the pending set;
//!   the stale one is dropped on the control side
//! - If the retire queue is full the audio side leaves the pending set where
//!   it is and tries again next block

use super::lockfree_channel::{ChannelConsumer, ChannelProducer, LockFreeChannel};
use crate::error::ChannelError;
use cascade_core::domain::CoefficientSet;
use crossbeam::utils::CachePadded;
use std::ptr;
use std::sync::atomic::{AtomicPtr, Ordering};
use std::sync::Arc;

type RetireSlot = Option<Arc<CoefficientSet>>;

struct Pending {
    /// Null, or a pointer produced by `Arc::into_raw`
    set: CachePadded<AtomicPtr<CoefficientSet>>,
}

impl Pending {
    fn take(&self) -> Option<Arc<CoefficientSet>> {
        let raw = self.set.swap(ptr::null_mut(), Ordering::AcqRel);
        // SAFETY: non-null values only come from `Arc::into_raw` in `publish`,
        // and the swap hands ownership to exactly one caller.
        (!raw.is_null()).then(|| unsafe { Arc::from_raw(raw) })
    }
}

impl Drop for Pending {
    fn drop(&mut self) {
        drop(self.take());
    }
}

/// Create the two ends of a coefficient handoff
///
/// `retire_capacity` bounds how many replaced sets the audio side can hand
/// back before the control side collects them.
pub fn coefficient_exchange(
    retire_capacity: usize,
) -> Result<(CoefficientPublisher, CoefficientSubscriber), ChannelError> {
    let mut retire = LockFreeChannel::<RetireSlot>::new(retire_capacity)?;
    retire.prepare(0);
    let (retire_tx, retire_rx) = retire.split();

    let pending = Arc::new(Pending {
        set: CachePadded::new(AtomicPtr::new(ptr::null_mut())),
    });

    Ok((
        CoefficientPublisher {
            pending: Arc::clone(&pending),
            retired: retire_rx,
            current: None,
        },
        CoefficientSubscriber {
            pending,
            retire: retire_tx,
            active: None,
        },
    ))
}

/// Control-side end: publishes new sets and drops retired ones
pub struct CoefficientPublisher {
    pending: Arc<Pending>,
    retired: ChannelConsumer<RetireSlot>,
    current: Option<Arc<CoefficientSet>>,
}

impl CoefficientPublisher {
    /// Make `set` the next cascade the audio side installs
    pub fn publish(&mut self, set: Arc<CoefficientSet>) {
        self.collect_garbage();

        let raw = Arc::into_raw(Arc::clone(&set)) as *mut CoefficientSet;
        let stale = self.pending.set.swap(raw, Ordering::AcqRel);
        if !stale.is_null() {
            // SAFETY: the audio side never took this pointer, so ownership
            // came back to us through the swap.
            drop(unsafe { Arc::from_raw(stale) });
        }

        self.current = Some(set);
    }

    /// The most recently published set, installed or not
    pub fn current(&self) -> Option<&Arc<CoefficientSet>> {
        self.current.as_ref()
    }

    /// True while a published set is waiting for the audio side
    pub fn has_pending(&self) -> bool {
        !self.pending.set.load(Ordering::Acquire).is_null()
    }

    /// Drop every set the audio side has retired; returns how many
    pub fn collect_garbage(&mut self) -> usize {
        let mut collected = 0;
        while let Some(slot) = self.retired.pop() {
            drop(slot);
            collected += 1;
        }
        collected
    }
}

/// Audio-side end: installs published sets without allocating or freeing
pub struct CoefficientSubscriber {
    pending: Arc<Pending>,
    retire: ChannelProducer<RetireSlot>,
    active: Option<Arc<CoefficientSet>>,
}

impl CoefficientSubscriber {
    /// Install the pending set, if any; returns true when the active set changed
    ///
    /// Wait-free. Defers the swap while the retire queue has no room.
    pub fn update(&mut self) -> bool {
        if self.active.is_some() && self.retire.free_space() == 0 {
            return false;
        }

        let Some(incoming) = self.pending.take() else {
            return false;
        };

        if let Some(old) = self.active.replace(incoming) {
            let pushed = self.retire.push(Some(old));
            debug_assert!(pushed.is_ok(), "retire queue filled while checked free");
        }
        true
    }

    /// The cascade currently in use
    pub fn active(&self) -> Option<&CoefficientSet> {
        self.active.as_deref()
    }
}
