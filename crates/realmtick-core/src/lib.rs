pub mod actions;
pub mod behavior;
pub mod cache;
pub mod catalog;
pub mod clock;
pub mod config;
pub mod engine;
pub mod error;
pub mod event;
pub mod fatigue;
pub mod game_data;
pub mod io;
pub mod job;
pub mod keys;
pub mod kv;
pub mod learning;
pub mod modifiers;
pub mod paths;
pub mod pipeline;
pub mod profile;
pub mod queue;
pub mod rules;
pub mod store;
pub mod types;
pub mod world;

pub use error::{Result, TickError};
