pub mod loader;
pub mod manager;
pub mod types;
pub mod validation;

pub use loader::{ConfigLoader, Environment};
pub use manager::{get_config, init_config, ConfigLoadError};
pub use types::*;
pub use validation::{ConfigValidationError, ValidationUtils, Validator};
