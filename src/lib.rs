pub mod common;
pub mod core;
pub mod engine;
pub mod services;
