pub use cadence_core::prelude::*;

// vim: ts=4
