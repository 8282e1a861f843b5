//! Synchronization core for a cooperative jigsaw puzzle.
//!
//! One authority per session owns the canonical piece graph and turns client
//! intents into ordered batches of facts. Clients mirror those facts and
//! predict their own drag locally.

pub mod authority;
pub mod camera;
pub mod config;
pub mod cut;
pub mod frame;
pub mod predictor;
pub mod routes;
pub mod services;
pub mod state;
