//! Parameter snapshots travelling from an automation or UI thread to the
//! controller without blocking either side

use super::lockfree_channel::{ChannelConsumer, ChannelPayload, ChannelProducer, LockFreeChannel};
use crate::error::{ChannelError, ProcessorError, Result};
use cascade_core::domain::FilterSettings;

/// New settings for one filter slot
#[derive(Debug, Clone, Copy, Default)]
pub struct SlotUpdate {
    pub slot: usize,
    pub settings: FilterSettings,
}

impl SlotUpdate {
    pub fn new(slot: usize, settings: impl Into<FilterSettings>) -> Self {
        Self {
            slot,
            settings: settings.into(),
        }
    }
}

impl ChannelPayload for FilterSettings {
    fn prepare(&mut self, _element_capacity: usize) {
        *self = FilterSettings::default();
    }
}

impl ChannelPayload for SlotUpdate {
    fn prepare(&mut self, _element_capacity: usize) {
        *self = SlotUpdate::default();
    }
}

/// Producer end of the parameter queue
pub struct ParameterQueue {
    producer: ChannelProducer<SlotUpdate>,
}

impl ParameterQueue {
    /// Create a queue holding up to `capacity` pending updates
    pub fn with_capacity(
        capacity: usize,
    ) -> std::result::Result<(ParameterQueue, ParameterReceiver), ChannelError> {
        let mut channel = LockFreeChannel::new(capacity)?;
        channel.prepare(0);
        let (producer, consumer) = channel.split();
        Ok((ParameterQueue { producer }, ParameterReceiver { consumer }))
    }

    /// Queue an update; fails with [`ProcessorError::QueueFull`] when the
    /// controller has fallen behind
    pub fn push(&mut self, update: SlotUpdate) -> Result<()> {
        self.producer
            .push(update)
            .map_err(|_| ProcessorError::QueueFull)
    }

    pub fn free_space(&self) -> usize {
        self.producer.free_space()
    }
}

/// Consumer end of the parameter queue, drained by the controller
pub struct ParameterReceiver {
    consumer: ChannelConsumer<SlotUpdate>,
}

impl ParameterReceiver {
    pub fn pop(&mut self) -> Option<SlotUpdate> {
        self.consumer.pop()
    }

    pub fn pending(&self) -> usize {
        self.consumer.available_for_reading()
    }
}
