pub use crate::app::App;
pub use cadence_types::prelude::*;

// vim: ts=4
