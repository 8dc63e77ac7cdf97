//! wsbridge library
//!
//! Polls OpenWeatherMap per configured location and projects each
//! observation into sensor characteristics, history entries and alerts.
//! The binary wires these modules to a logging host; integration tests wire
//! them to in-process fakes.

pub mod cli;
pub mod config;
pub mod data;
pub mod history;
pub mod host;
pub mod platform;
pub mod scheduler;
pub mod sensors;
pub mod store;
pub mod tracker;

#[cfg(test)]
mod testing;
