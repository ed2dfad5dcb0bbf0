//! Synthetic load service for exercising autoscalers.
//!
//! Serves `/health`, `/predict` and `/load` over HTTP. `/predict` multiplies a
//! fixed random weight matrix by the caller's features and adds deliberate
//! extra work; `/load` burns CPU or accelerator time for a requested number of
//! seconds.

pub mod config;
pub mod error;
pub mod io;
pub mod model;
pub mod server;
pub mod telemetry;
pub mod workload;
