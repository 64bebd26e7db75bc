// 購読ハンドラー
//
// メールアドレスをリストに購読させる。
// 氏名・マーケティング設定が指定された場合は、先にプロフィールを作成/更新する。

use super::endpoint::{Endpoint, HandlerError, parse_json_body};
use super::preferences_handler::{now_rfc3339, preference_properties};
use crate::domain::{SubscribeRequest, Subscription};
use crate::infrastructure::klaviyo_request;
use crate::infrastructure::{KlaviyoApi, KlaviyoConfig};
use async_trait::async_trait;
use lambda_http::Request;
use lambda_http::http::Method;
use serde_json::{Map, Value, json};
use tracing::info;

/// 許可するメソッド（OPTIONSを除く）
pub const ALLOWED_METHODS: &[Method] = &[Method::POST];

/// 購読ハンドラー
pub struct SubscribeHandler<A: KlaviyoApi> {
    api: A,
    config: KlaviyoConfig,
}

impl<A: KlaviyoApi> SubscribeHandler<A> {
    pub fn new(api: A, config: KlaviyoConfig) -> Self {
        Self { api, config }
    }

    /// profile-import用の属性を構築
    fn import_attributes(&self, subscription: &Subscription) -> Map<String, Value> {
        let mut attributes = Map::new();
        attributes.insert("email".to_string(), json!(subscription.email));
        if let Some(first_name) = &subscription.first_name {
            attributes.insert("first_name".to_string(), json!(first_name));
        }
        if let Some(last_name) = &subscription.last_name {
            attributes.insert("last_name".to_string(), json!(last_name));
        }
        if let Some(preference) = subscription.preference {
            let properties = preference_properties(&self.config, preference, &now_rfc3339());
            attributes.insert("properties".to_string(), Value::Object(properties));
        }
        attributes
    }

    /// 購読処理
    ///
    /// # 処理フロー
    /// 1. 入力検証（email必須、list_idはデフォルトリストにフォールバック）
    /// 2. 必要な場合のみ `POST /profile-import/`
    /// 3. `POST /profile-subscription-bulk-create-jobs/`
    async fn subscribe(&self, request: &Request) -> Result<Value, HandlerError> {
        let body: SubscribeRequest = parse_json_body(request)?;
        let subscription = body.validate(self.config.default_list_id())?;

        if subscription.needs_profile_import() {
            self.api
                .send(klaviyo_request::import_profile(
                    self.import_attributes(&subscription),
                ))
                .await?;
        }

        self.api
            .send(klaviyo_request::subscribe(&subscription))
            .await?;

        info!(
            list_id = %subscription.list_id,
            sms = subscription.subscribes_sms(),
            "購読ジョブを作成"
        );

        Ok(json!({
            "email": subscription.email,
            "list_id": subscription.list_id,
            "status": "subscribed",
        }))
    }
}

#[async_trait]
impl<A: KlaviyoApi> Endpoint for SubscribeHandler<A> {
    fn name(&self) -> &'static str {
        "subscribe"
    }

    fn allowed_methods(&self) -> &'static [Method] {
        ALLOWED_METHODS
    }

    async fn handle_method(&self, request: &Request) -> Result<Value, HandlerError> {
        self.subscribe(request).await
    }
}
