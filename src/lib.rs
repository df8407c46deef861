// Nudge - continuously retrained productivity model
// Library exports

pub mod config;
pub mod daemon;
pub mod dataset;
pub mod inference;
pub mod logging;
pub mod models;
pub mod server;
pub mod training;
