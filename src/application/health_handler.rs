// ヘルスチェックハンドラー
//
// Klaviyo APIへ疎通確認（GET /accounts/）を行い、結果を返す。

use super::endpoint::{Endpoint, HandlerError};
use super::preferences_handler::now_rfc3339;
use crate::infrastructure::klaviyo_request;
use crate::infrastructure::{KlaviyoApi, KlaviyoConfig};
use async_trait::async_trait;
use lambda_http::Request;
use lambda_http::http::Method;
use serde_json::{Value, json};

/// 許可するメソッド（OPTIONSを除く）
pub const ALLOWED_METHODS: &[Method] = &[Method::GET];

/// ヘルスチェックハンドラー
pub struct HealthHandler<A: KlaviyoApi> {
    api: A,
    config: KlaviyoConfig,
}

impl<A: KlaviyoApi> HealthHandler<A> {
    pub fn new(api: A, config: KlaviyoConfig) -> Self {
        Self { api, config }
    }
}

#[async_trait]
impl<A: KlaviyoApi> Endpoint for HealthHandler<A> {
    fn name(&self) -> &'static str {
        "health"
    }

    fn allowed_methods(&self) -> &'static [Method] {
        ALLOWED_METHODS
    }

    async fn handle_method(&self, _request: &Request) -> Result<Value, HandlerError> {
        self.api.send(klaviyo_request::get_accounts()).await?;

        Ok(json!({
            "status": "ok",
            "revision": self.config.revision(),
            "timestamp": now_rfc3339(),
        }))
    }
}
