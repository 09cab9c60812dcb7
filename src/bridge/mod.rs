//! The bridging engine
//!
//! - [`flatten`] - nested status records to retained MQTT publishes
//! - [`channel`] - the queue between the broker delivery task and the loop
//! - [`scheduler`] - countdown deciding when the fleet is polled
//! - [`bridge_loop`] - the Starting / Running / ShuttingDown state machine

pub mod bridge_loop;
pub mod channel;
pub mod flatten;
pub mod scheduler;

pub use bridge_loop::{BridgeLoop, BridgeOptions, BridgeState, CommandOutcome, TickReport};
pub use channel::{ChannelClosed, CommandChannel, CommandSender};
pub use flatten::{FlattenEncoder, FlattenError, PublishSummary};
pub use scheduler::{PollScheduler, PollState};
