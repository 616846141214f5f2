// Re-export all model types
pub use self::api_key::*;
pub use self::environment::*;
pub use self::errors::*;
pub use self::feature_flag::*;
pub use self::validation::*;

mod api_key;
mod environment;
mod errors;
mod feature_flag;
mod validation;
