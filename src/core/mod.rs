pub mod cache;
pub mod config;
pub mod engine;
pub mod events;
pub mod graph;
pub mod history;
pub mod journey;
pub mod markup;
pub mod snapshot;
pub mod store;
pub mod timer;
