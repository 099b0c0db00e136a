pub mod loader;
pub mod model;

pub use loader::{effective_pool_size, load_from_path, load_from_str, validate_cli, ConfigError};
pub use model::{
    Expected, GlobalSettings, HeaderPair, Method, Protocol, RawConfig, ServiceDefinition,
    ValidatedConfig,
};
