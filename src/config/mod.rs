//! Configuration Module
//!
//! Layered configuration loading from TOML files and environment variables.

mod settings;

pub use settings::{
    CorsSettings, DatabaseSettings, LogSettings, RelaySettings, ServerSettings, Settings,
    StartPosition,
};
