pub mod components;
pub mod config;
pub mod error;
pub mod pipeline;
pub mod shutdown;
pub mod startup;
pub mod utils;
