pub mod cancel;
pub mod error;
pub mod pool;
pub mod ring;
pub mod wakequeue;

// Re-export the channel types for convenience
pub use ring::{Capabilities, ChannelConfig, IoMode, RingChannel, Session};

// Re-export the pool types for convenience
pub use pool::{ChannelPool, PoolConfig};

// Re-export cancellation and errors for convenience
pub use cancel::CancelToken;
pub use error::RingError;

// Re-export wake queue types for convenience
pub use wakequeue::{Handle, IdGen, WakeQueueArc};
