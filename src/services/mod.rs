//! Puzzle domain services.
//!
//! ARCHITECTURE
//! ============
//! Pure, synchronous building blocks shared by the authority and by client
//! mirrors: the piece graph and its snap resolver, the player registry, hold
//! timers and progress tracking. Nothing here knows about channels or sockets.

pub mod graph;
pub mod hold;
pub mod progress;
pub mod registry;
pub mod resolver;
