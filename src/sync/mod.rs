//! Causality tracking for replicated documents
//!
//! A [`StateVector`] summarizes what a replica has observed: for every
//! client, the highest operation sequence number integrated so far.
//! Comparing two state vectors yields the minimal set of operations one
//! replica must send the other.

mod state_vector;

pub use state_vector::StateVector;
