pub mod az;
pub mod config;
pub mod cosmos;
pub mod deploy;
pub mod error;
pub mod health;
pub mod io;
pub mod package;
pub mod paths;
pub mod rule;
pub mod settings;
pub mod shell;
pub mod steps;
pub mod template;

pub use error::{DeployError, Result};
