pub mod settings;

pub use settings::{
    AuthorityConfig, CasConfig, GeneralConfig, KeyMaterialMode, Settings, TelemetryConfig,
};
