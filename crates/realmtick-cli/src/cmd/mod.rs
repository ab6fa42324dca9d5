pub mod config;
pub mod decide;
pub mod enqueue;
pub mod entity;
pub mod queue;
pub mod run;
