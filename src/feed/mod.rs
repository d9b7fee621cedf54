//! The sequenced, resumable sample feed: ring, wire codec, session state
//! machine and the producer contract that drives them.

pub mod config;
pub mod error;
pub mod live;
pub mod playback;
pub mod producer;
pub mod ring;
pub mod sample;
pub mod server;
pub mod session;
pub mod wire;

pub use config::FeedConfig;
pub use producer::Producer;
pub use ring::{Run, RunSlot};
pub use sample::{Payload, PayloadKind, Sample, SampleInput, Side};
pub use server::{build_router, AppState};
pub use session::{run_session, SessionConfig};
pub use wire::WireFormat;
