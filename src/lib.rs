pub mod aggregate;
pub mod args;
pub mod commands;
mod config;
mod db;
mod error;
pub mod merchant;
pub mod model;
pub mod server;
pub mod store;
pub mod sync;
pub mod tracker;
mod utils;

#[cfg(test)]
mod test;

pub use config::Config;
pub use db::Db;
pub use error::{Error, ErrorType, Result};
