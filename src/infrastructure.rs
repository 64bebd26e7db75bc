// Infrastructure layer modules
pub mod klaviyo_client;
pub mod klaviyo_config;
pub mod klaviyo_request;
pub mod logging;

// Re-exports
pub use klaviyo_client::{HttpKlaviyoClient, KlaviyoApi, KlaviyoError, KlaviyoRequest};
pub use klaviyo_config::{KlaviyoConfig, KlaviyoConfigError};
pub use logging::{LogFormat, init_logging};
