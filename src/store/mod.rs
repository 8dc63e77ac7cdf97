//! Persistent location contexts
//!
//! Each tracked location's resolved coordinates are written to disk so a
//! restart can restore trackers without resolving them again, and so the
//! platform can detect locations that were removed from the configuration.

mod context;

pub use context::{default_state_dir, ContextStore, LocationContext};
