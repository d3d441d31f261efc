#![warn(
    clippy::all,
    clippy::nursery,
    clippy::pedantic,
    clippy::style,
    clippy::complexity,
    clippy::perf,
    clippy::correctness,
    clippy::suspicious
)]
#![allow(
    clippy::similar_names,
    clippy::missing_safety_doc,
    clippy::missing_panics_doc,
    clippy::missing_errors_doc
)]

//! Process-wide registry of conversation threads.
//!
//! The store owns every thread's ordered message history and the
//! per-thread turn gate that serializes one turn's append-invoke-append
//! sequence against concurrent turns on the same thread.

mod store;

pub use store::ThreadStore;
