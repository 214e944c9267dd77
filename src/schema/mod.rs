//! Plain data types shared across the runtime.

pub mod node;
pub mod state;
pub mod value;
