mod loader;
mod schema;

pub use {
    loader::{clear_config_dir, data_dir, discover_and_load, load_config, set_config_dir},
    schema::{ApiConfig, JurisConfig, PlatformConfig, SessionConfig},
};
