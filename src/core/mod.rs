//! Core of pincer: the data model and everything that owns or mutates it.

pub mod config;
pub mod error;
pub mod evidence;
pub mod journal;
pub mod model;
pub mod orchestrator;
pub mod pool;
pub mod resolver;
pub mod store;
pub mod time;
