pub mod canonical;
pub mod convert;
pub mod decode;
pub mod error;
pub mod fetch;
pub mod normalize;
pub mod options;
pub mod singbox;
pub mod store;
pub mod sub_parse;

pub use error::ConvertError;
pub use options::{EnvDefaults, Options, ResolvedOptions, RulesPreset};
pub use singbox::Configuration;
pub use sub_parse::Endpoint;
