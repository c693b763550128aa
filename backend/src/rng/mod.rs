//! Deterministic random draws
//!
//! Uses hash-keyed draws instead of a stateful stream, so randomness is a
//! function of identity rather than call order.
//! CRITICAL: All randomness in the simulator MUST go through this module.

mod hash_draw;

pub use hash_draw::DeterministicRng;
