//! Presence decision engine.
//!
//! Pure, synchronous pieces: the result correlator, per-mode cycle routing
//! and the presence state machine. The monitor drives them from async tasks.

mod correlator;
mod cycle;
mod machine;

pub use correlator::*;
pub use cycle::*;
pub use machine::*;
