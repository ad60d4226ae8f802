pub mod configuration;

pub use configuration::{ConfigurationError, ConfigurationManager, GenovecConfiguration};
