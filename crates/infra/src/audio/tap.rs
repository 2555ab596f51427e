//! Copies of processed audio blocks for a diagnostic reader
//!
//! Every slot is sized for the largest block when the tap is built, so the
//! audio side only ever copies into existing storage. When the reader falls
//! behind, blocks are dropped and counted.

use super::lockfree_channel::{ChannelConsumer, ChannelPayload, ChannelProducer, LockFreeChannel};
use crate::error::ChannelError;

/// One channel's worth of processed samples
#[derive(Debug, Clone, Default)]
pub struct AudioBlock {
    channel: usize,
    len: usize,
    samples: Vec<f32>,
}

impl AudioBlock {
    pub fn channel(&self) -> usize {
        self.channel
    }

    pub fn samples(&self) -> &[f32] {
        &self.samples[..self.len]
    }

    pub fn peak(&self) -> f32 {
        self.samples().iter().fold(0.0_f32, |peak, s| peak.max(s.abs()))
    }

    pub fn rms(&self) -> f32 {
        let samples = self.samples();
        if samples.is_empty() {
            return 0.0;
        }
        let sum: f32 = samples.iter().map(|s| s * s).sum();
        (sum / samples.len() as f32).sqrt()
    }
}

impl ChannelPayload for AudioBlock {
    fn prepare(&mut self, element_capacity: usize) {
        self.channel = 0;
        self.len = 0;
        self.samples.clear();
        self.samples.resize(element_capacity, 0.0);
    }
}

/// Audio-side writer
pub struct BlockTap {
    producer: ChannelProducer<AudioBlock>,
    dropped: u64,
}

impl BlockTap {
    /// Build a tap of `capacity` blocks, each up to `max_block_size` samples
    pub fn with_capacity(
        capacity: usize,
        max_block_size: usize,
    ) -> Result<(BlockTap, TapReader), ChannelError> {
        let mut channel = LockFreeChannel::new(capacity)?;
        channel.prepare(max_block_size);
        let (producer, consumer) = channel.split();
        Ok((
            BlockTap {
                producer,
                dropped: 0,
            },
            TapReader { consumer },
        ))
    }

    /// Copy `samples` into the tap; returns false if the block was dropped
    ///
    /// Samples beyond the prepared block size are cut off.
    pub fn write(&mut self, channel: usize, samples: &[f32]) -> bool {
        let mut chunk = self.producer.request_write(1);
        if chunk.is_empty() {
            self.dropped += 1;
            return false;
        }

        let block = &mut chunk.slices_mut().0[0];
        let len = samples.len().min(block.samples.len());
        block.samples[..len].copy_from_slice(&samples[..len]);
        block.len = len;
        block.channel = channel;
        chunk.finish();
        true
    }

    /// Blocks lost because the reader was behind
    pub fn dropped(&self) -> u64 {
        self.dropped
    }
}

/// Reader side of the tap
pub struct TapReader {
    consumer: ChannelConsumer<AudioBlock>,
}

impl TapReader {
    /// Visit every block written so far, oldest first; returns how many
    pub fn drain(&mut self, mut visit: impl FnMut(&AudioBlock)) -> usize {
        let available = self.consumer.available_for_reading();
        let chunk = self.consumer.request_read(available);
        let (first, second) = chunk.slices();
        first.iter().chain(second).for_each(&mut visit);
        let count = chunk.len();
        chunk.finish();
        count
    }

    pub fn pending(&self) -> usize {
        self.consumer.available_for_reading()
    }
}
