// 購読解除ハンドラー

use super::endpoint::{Endpoint, HandlerError, parse_json_body};
use crate::domain::UnsubscribeRequest;
use crate::infrastructure::klaviyo_request;
use crate::infrastructure::{KlaviyoApi, KlaviyoConfig};
use async_trait::async_trait;
use lambda_http::Request;
use lambda_http::http::Method;
use serde_json::{Value, json};
use tracing::info;

/// 許可するメソッド（OPTIONSを除く）
pub const ALLOWED_METHODS: &[Method] = &[Method::POST];

/// 購読解除ハンドラー
///
/// list_idもデフォルトリストも無い場合は、メールマーケティング全体から購読解除する。
pub struct UnsubscribeHandler<A: KlaviyoApi> {
    api: A,
    config: KlaviyoConfig,
}

impl<A: KlaviyoApi> UnsubscribeHandler<A> {
    pub fn new(api: A, config: KlaviyoConfig) -> Self {
        Self { api, config }
    }

    async fn unsubscribe(&self, request: &Request) -> Result<Value, HandlerError> {
        let body: UnsubscribeRequest = parse_json_body(request)?;
        let unsubscription = body.validate(self.config.default_list_id())?;

        self.api
            .send(klaviyo_request::unsubscribe(&unsubscription))
            .await?;

        info!(
            list_id = unsubscription.list_id.as_deref().unwrap_or("(all)"),
            "購読解除ジョブを作成"
        );

        let mut data = json!({
            "email": unsubscription.email,
            "status": "unsubscribed",
        });
        if let (Some(list_id), Some(object)) = (&unsubscription.list_id, data.as_object_mut()) {
            object.insert("list_id".to_string(), json!(list_id));
        }
        Ok(data)
    }
}

#[async_trait]
impl<A: KlaviyoApi> Endpoint for UnsubscribeHandler<A> {
    fn name(&self) -> &'static str {
        "unsubscribe"
    }

    fn allowed_methods(&self) -> &'static [Method] {
        ALLOWED_METHODS
    }

    async fn handle_method(&self, request: &Request) -> Result<Value, HandlerError> {
        self.unsubscribe(request).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::endpoint::dispatch;
    use crate::application::endpoint::tests::{body_json, request};
    use crate::infrastructure::klaviyo_client::tests::MockKlaviyoApi;
    use crate::infrastructure::logging::init_test_logging;

    #[tokio::test]
    async fn test_unsubscribe_from_list() {
        init_test_logging();
        let api = MockKlaviyoApi::new();
        api.push_empty();
        let handler = UnsubscribeHandler::new(api.clone(), KlaviyoConfig::new("pk"));

        let response = dispatch(
            &handler,
            &request(
                "POST",
                "/",
                Some(json!({"email": "jane@example.com", "list_id": "LIST01"})),
            ),
        )
        .await;

        assert_eq!(response.status(), 200);
        assert_eq!(
            body_json(&response)["data"],
            json!({"email": "jane@example.com", "list_id": "LIST01", "status": "unsubscribed"})
        );
        let requests = api.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].path, "/profile-subscription-bulk-delete-jobs/");
    }

    #[tokio::test]
    async fn test_unsubscribe_uses_default_list() {
        init_test_logging();
        let api = MockKlaviyoApi::new();
        let handler = UnsubscribeHandler::new(
            api.clone(),
            KlaviyoConfig::new("pk").with_default_list_id("DEFAULT"),
        );

        dispatch(
            &handler,
            &request("POST", "/", Some(json!({"email": "jane@example.com"}))),
        )
        .await;

        assert_eq!(
            api.requests()[0].body.as_ref().unwrap()["data"]["relationships"]["list"]["data"]["id"],
            "DEFAULT"
        );
    }

    #[tokio::test]
    async fn test_unsubscribe_globally_without_list() {
        init_test_logging();
        let api = MockKlaviyoApi::new();
        let handler = UnsubscribeHandler::new(api.clone(), KlaviyoConfig::new("pk"));

        let response = dispatch(
            &handler,
            &request("POST", "/", Some(json!({"email": "jane@example.com"}))),
        )
        .await;

        assert_eq!(
            body_json(&response)["data"],
            json!({"email": "jane@example.com", "status": "unsubscribed"})
        );
        assert!(api.requests()[0].body.as_ref().unwrap()["data"].get("relationships").is_none());
    }

    #[tokio::test]
    async fn test_unsubscribe_invalid_email() {
        init_test_logging();
        let api = MockKlaviyoApi::new();
        let handler = UnsubscribeHandler::new(api.clone(), KlaviyoConfig::new("pk"));

        let response = dispatch(
            &handler,
            &request("POST", "/", Some(json!({"email": "jane"}))),
        )
        .await;

        assert_eq!(response.status(), 400);
        assert_eq!(body_json(&response)["error"], "invalid email address: jane");
    }

    #[tokio::test]
    async fn test_unsubscribe_upstream_error() {
        init_test_logging();
        let api = MockKlaviyoApi::new();
        api.push_error(429, "Request was throttled.");
        let handler = UnsubscribeHandler::new(api.clone(), KlaviyoConfig::new("pk"));

        let response = dispatch(
            &handler,
            &request("POST", "/", Some(json!({"email": "jane@example.com"}))),
        )
        .await;

        assert_eq!(response.status(), 500);
        assert_eq!(body_json(&response)["error"], "Request was throttled.");
    }
}
