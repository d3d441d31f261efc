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

//! Turn orchestration for multi-turn dialogue.
//!
//! The `TurnOrchestrator` executes one conversational turn end-to-end:
//! resolve the thread, append the user message, snapshot history, invoke
//! the model, append the reply.

mod orchestrator;

pub use orchestrator::{TurnConfig, TurnError, TurnOrchestrator, TurnOutcome};
