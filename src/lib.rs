//! Feed server library.
//!
//! Exposes the sequenced sample ring, wire codec, session state machine and
//! the producer contract used by the binaries under `src/bin`.

pub mod feed;
pub mod producers;
