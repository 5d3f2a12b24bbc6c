//! ChannelPool - the registry of channel instances
//!
//! Owns a fixed set of channels sized from configuration at construction,
//! together with the wake queue they share. This is the routing layer a
//! device front-end talks to: look a channel up by index, open a session on
//! it, and let the session do the I/O.

use crate::cancel::CancelToken;
use crate::error::RingError;
use crate::ring::{Capabilities, ChannelConfig, RingChannel, Session};
use crate::wakequeue::{IdGen, WakeQueueArc};

/// Pool sizing, fixed at system start.
#[derive(Debug, Clone, Copy)]
pub struct PoolConfig {
    /// Number of independent channel instances.
    pub nr_channels: usize,
    pub items_per_channel: usize,
    /// Bytes per item; each channel's capacity is
    /// `items_per_channel * item_size`.
    pub item_size: usize,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            nr_channels: 4,
            items_per_channel: 20,
            item_size: 64,
        }
    }
}

/// Fixed collection of channels sharing one wake queue.
pub struct ChannelPool {
    channels: Vec<RingChannel>,
    queue: WakeQueueArc,
}

impl ChannelPool {
    #[must_use]
    pub fn new(config: PoolConfig) -> Self {
        let queue = WakeQueueArc::new();
        let id_gen = IdGen::new();
        let channel_config = ChannelConfig {
            items_per_channel: config.items_per_channel,
            item_size: config.item_size,
        };

        let channels = (0..config.nr_channels)
            .map(|index| {
                RingChannel::new(
                    channel_config,
                    queue.clone(),
                    &id_gen,
                    &format!("chan{index}"),
                )
            })
            .collect();

        log::debug!(
            "pool: created {} channels of {} bytes each",
            config.nr_channels,
            channel_config.capacity()
        );
        Self { channels, queue }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.channels.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    /// Get the channel at `index`, if it exists.
    #[must_use]
    pub fn get(&self, index: usize) -> Option<&RingChannel> {
        self.channels.get(index)
    }

    /// Open a session on the channel at `index`.
    ///
    /// # Panics
    ///
    /// Panics if `index` is out of range; channel indices are fixed by the
    /// pool configuration, so an unknown index is a caller bug.
    pub fn open(
        &self,
        index: usize,
        caps: Capabilities,
        cancel: CancelToken,
    ) -> Result<Session, RingError> {
        let channel = self
            .channels
            .get(index)
            .unwrap_or_else(|| panic!("no channel at index {index}"));
        channel.open(caps, cancel)
    }

    /// The wake queue shared by all channels in this pool.
    #[must_use]
    pub fn queue(&self) -> &WakeQueueArc {
        &self.queue
    }
}

impl std::fmt::Debug for ChannelPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ChannelPool(channels={})", self.channels.len())
    }
}
