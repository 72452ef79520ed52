//! Runestone Builder · assignment authoring backend
//!
//! Library half of the service: the exercise wizard, previews, data files,
//! readings, accommodations, the short-answer component, and the axum router
//! that exposes them. `main.rs` only wires telemetry, state and the listener.

pub mod accommodations;
pub mod client;
pub mod config;
pub mod datafile;
pub mod domain;
pub mod logic;
pub mod memory;
pub mod preview;
pub mod protocol;
pub mod readings;
pub mod registry;
pub mod routes;
pub mod seeds;
pub mod shortanswer;
pub mod state;
pub mod steps;
pub mod telemetry;
pub mod util;
pub mod wizard;
