//! Headset-side implementation of the real-time streaming protocol core:
//! device sampling scheduling and the session orchestrator that answers
//! timesync queries, reassembles video shards and reports feedback.

pub mod scheduler;
pub mod session;
