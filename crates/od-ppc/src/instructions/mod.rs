//! Gekko instruction implementations
//!
//! Each function operates on a [`PpcThread`](crate::thread::PpcThread) and
//! leaves the pc alone unless it is a branch.

pub mod branch;
pub mod float;
pub mod integer;
pub mod load_store;
pub mod paired;
pub mod system;
