//! Real-time filtering plumbing
//!
//! Everything here is split into a control-side half and an audio-side half:
//! - `lockfree_channel`: SPSC slot channel, the transport under the rest
//! - `exchange`: hands finished coefficient sets to the audio side
//! - `filter_chain`: one slot on one channel
//! - `engine`: multi-slot, multi-channel equaliser
//! - `queue` / `tap`: parameter snapshots in, processed blocks out

pub mod engine;
pub mod exchange;
pub mod filter_chain;
pub mod lockfree_channel;
pub mod queue;
pub mod tap;

pub use engine::{equalizer, DrainReport, EqualizerController, EqualizerProcessor, SlotController, UpdateOutcome};
pub use exchange::{coefficient_exchange, CoefficientPublisher, CoefficientSubscriber};
pub use filter_chain::{filter_chain, FilterChain, FilterChainHandle, ProcessSpec};
pub use lockfree_channel::{
    ChannelConsumer, ChannelPayload, ChannelProducer, ChannelRegion, LockFreeChannel, ReadChunk,
    WriteChunk,
};
pub use queue::{ParameterQueue, ParameterReceiver, SlotUpdate};
pub use tap::{AudioBlock, BlockTap, TapReader};
