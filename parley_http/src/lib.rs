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

//! HTTP transport for the conversational core.
//!
//! Routing, (de)serialization, CORS and error-to-status mapping live
//! here; conversation semantics stay in `parley_conversation`.

mod routes;
mod service;

pub use routes::{router, routes, CHAT_PATH, INFO_PATH, THREAD_HISTORY_PATH};
pub use service::{cors_layer, serve, ApiError, AppState};
