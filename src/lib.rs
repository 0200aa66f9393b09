//! Asynchronous order-processing pipeline.
//!
//! Orders are created and edited through [`service::OrderService`] and
//! processed in the background by [`worker::ProcessingWorker`], which
//! consumes order ids from a durable at-least-once queue and applies the
//! NEW -> PROCESSED transition through a conditional store update. The
//! request-handling layer lives outside this crate and talks to the
//! service through its typed results.

pub mod config;
pub mod error;
pub mod messaging;
pub mod metrics;
pub mod models;
pub mod service;
pub mod store;
pub mod utils;
pub mod worker;
