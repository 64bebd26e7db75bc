// アプリケーション層モジュール
pub mod endpoint;
pub mod health_handler;
pub mod lambda_service;
pub mod lists_handler;
pub mod preferences_handler;
pub mod profile_handler;
pub mod profile_locator;
pub mod subscribe_handler;
pub mod unsubscribe_handler;

// 再エクスポート
pub use endpoint::{Endpoint, HandlerError, dispatch};
pub use health_handler::HealthHandler;
pub use lambda_service::{KlaviyoContext, StartupError, serve};
pub use lists_handler::ListsHandler;
pub use preferences_handler::PreferencesHandler;
pub use profile_handler::ProfileHandler;
pub use profile_locator::ProfileLocator;
pub use subscribe_handler::SubscribeHandler;
pub use unsubscribe_handler::UnsubscribeHandler;
