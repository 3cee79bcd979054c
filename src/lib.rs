pub mod config;
pub mod error;
pub mod interpolate;
pub mod model;
pub mod output;
pub mod resolver;
pub mod server;
pub mod store;
pub mod stream;
