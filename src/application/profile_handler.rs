// プロフィールハンドラー
//
// GET: 識別子からプロフィールを検索して正規化した内容を返す
// PATCH: 指定された属性のみ更新する

use super::endpoint::{Endpoint, HandlerError, parse_json_body};
use super::preferences_handler::identifier_from_query;
use super::profile_locator::ProfileLocator;
use crate::domain::{Profile, ProfileIdentifier, ProfileUpdate};
use crate::infrastructure::klaviyo_request;
use crate::infrastructure::{KlaviyoApi, KlaviyoConfig};
use async_trait::async_trait;
use lambda_http::Request;
use lambda_http::http::Method;
use serde::Deserialize;
use serde_json::Value;
use tracing::info;

/// 許可するメソッド（OPTIONSを除く）
pub const ALLOWED_METHODS: &[Method] = &[Method::GET, Method::PATCH];

/// PATCHリクエストボディ（識別子 + 更新内容）
#[derive(Debug, Deserialize)]
struct ProfilePatch {
    #[serde(flatten)]
    identifier: ProfileIdentifier,
    #[serde(flatten)]
    update: ProfileUpdate,
}

/// プロフィールハンドラー
pub struct ProfileHandler<A: KlaviyoApi> {
    api: A,
    config: KlaviyoConfig,
}

impl<A: KlaviyoApi> ProfileHandler<A> {
    pub fn new(api: A, config: KlaviyoConfig) -> Self {
        Self { api, config }
    }

    fn to_data(profile: &Profile) -> Result<Value, HandlerError> {
        serde_json::to_value(profile).map_err(|e| HandlerError::Internal(e.to_string()))
    }

    async fn get(&self, request: &Request) -> Result<Value, HandlerError> {
        let identifier = identifier_from_query(request);
        let profile = ProfileLocator::new(&self.api, &self.config)
            .require(&identifier)
            .await?;

        Self::to_data(&profile)
    }

    /// 更新後のプロフィールを返す
    ///
    /// Klaviyoがボディを返さない場合は、取得済みのプロフィールに更新内容を反映して返す。
    async fn patch(&self, request: &Request) -> Result<Value, HandlerError> {
        let body: ProfilePatch = parse_json_body(request)?;
        if body.update.is_empty() {
            return Err(HandlerError::BadRequest("no fields to update".to_string()));
        }
        let identifier = body.identifier.normalized();

        let mut profile = ProfileLocator::new(&self.api, &self.config)
            .require(&identifier)
            .await?;

        let response = self
            .api
            .send(klaviyo_request::update_profile(
                &profile.id,
                body.update.to_attributes(),
            ))
            .await?;

        info!(profile_id = %profile.id, "プロフィールを更新");

        let updated = response
            .as_ref()
            .and_then(|b| b.get("data"))
            .and_then(|data| Profile::from_resource(data, self.config.preference_property()));

        match updated {
            Some(updated) => Self::to_data(&updated),
            None => {
                profile.apply(&body.update, self.config.preference_property());
                Self::to_data(&profile)
            }
        }
    }
}

#[async_trait]
impl<A: KlaviyoApi> Endpoint for ProfileHandler<A> {
    fn name(&self) -> &'static str {
        "profile"
    }

    fn allowed_methods(&self) -> &'static [Method] {
        ALLOWED_METHODS
    }

    async fn handle_method(&self, request: &Request) -> Result<Value, HandlerError> {
        if request.method() == Method::PATCH {
            self.patch(request).await
        } else {
            self.get(request).await
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::endpoint::dispatch;
    use crate::application::endpoint::tests::{body_json, request};
    use crate::infrastructure::klaviyo_client::tests::MockKlaviyoApi;
    use crate::infrastructure::logging::init_test_logging;
    use serde_json::json;

    fn handler(api: &MockKlaviyoApi) -> ProfileHandler<MockKlaviyoApi> {
        ProfileHandler::new(api.clone(), KlaviyoConfig::new("pk"))
    }

    fn resource() -> Value {
        json!({
            "type": "profile",
            "id": "01H",
            "attributes": {
                "email": "jane@example.com",
                "external_id": "cust-42",
                "first_name": "Jane",
                "last_name": "Doe",
                "properties": {"marketing_preference": "menswear"}
            }
        })
    }

    // ==================== GET ====================

    #[tokio::test]
    async fn test_get_returns_normalized_profile() {
        init_test_logging();
        let api = MockKlaviyoApi::new();
        api.push_ok(json!({"data": [resource()]}));

        let response = dispatch(
            &handler(&api),
            &request("GET", "/?email=jane%40example.com", None),
        )
        .await;

        assert_eq!(response.status(), 200);
        assert_eq!(
            body_json(&response),
            json!({
                "success": true,
                "data": {
                    "id": "01H",
                    "email": "jane@example.com",
                    "external_id": "cust-42",
                    "first_name": "Jane",
                    "last_name": "Doe",
                    "properties": {"marketing_preference": "menswear"},
                    "preference": "menswear"
                }
            })
        );
    }

    #[tokio::test]
    async fn test_get_not_found() {
        init_test_logging();
        let api = MockKlaviyoApi::new();
        api.push_ok(json!({"data": []})).push_ok(json!({"data": []}));

        let response = dispatch(&handler(&api), &request("GET", "/?external_id=404", None)).await;

        assert_eq!(response.status(), 404);
        assert_eq!(
            body_json(&response),
            json!({"success": false, "error": "profile not found"})
        );
        assert_eq!(api.requests().len(), 2);
    }

    #[tokio::test]
    async fn test_get_rejects_path_like_profile_id() {
        init_test_logging();
        let api = MockKlaviyoApi::new();

        let response = dispatch(
            &handler(&api),
            &request("GET", "/?profile_id=..%2Flists%2FL1", None),
        )
        .await;

        assert_eq!(response.status(), 400);
        assert_eq!(
            body_json(&response),
            json!({"success": false, "error": "invalid profile_id: ../lists/L1"})
        );
        assert!(api.requests().is_empty());
    }

    #[tokio::test]
    async fn test_get_upstream_error() {
        init_test_logging();
        let api = MockKlaviyoApi::new();
        api.push_network_error();

        let response = dispatch(
            &handler(&api),
            &request("GET", "/?email=jane%40example.com", None),
        )
        .await;

        assert_eq!(response.status(), 500);
        assert_eq!(body_json(&response)["error"], "Klaviyo is unreachable");
    }

    // ==================== PATCH ====================

    #[tokio::test]
    async fn test_patch_sends_only_provided_fields() {
        init_test_logging();
        let api = MockKlaviyoApi::new();
        let mut updated = resource();
        updated["attributes"]["first_name"] = json!("Janet");
        api.push_ok(json!({"data": [resource()]}))
            .push_ok(json!({"data": updated}));

        let response = dispatch(
            &handler(&api),
            &request(
                "PATCH",
                "/",
                Some(json!({"email": "jane@example.com", "first_name": "Janet"})),
            ),
        )
        .await;

        assert_eq!(response.status(), 200);
        assert_eq!(body_json(&response)["data"]["first_name"], "Janet");

        let requests = api.requests();
        assert_eq!(
            requests[1].body.as_ref().unwrap(),
            &json!({
                "data": {"type": "profile", "id": "01H", "attributes": {"first_name": "Janet"}}
            })
        );
    }

    #[tokio::test]
    async fn test_patch_without_response_body_merges_locally() {
        init_test_logging();
        let api = MockKlaviyoApi::new();
        api.push_ok(json!({"data": [resource()]})).push_empty();

        let response = dispatch(
            &handler(&api),
            &request(
                "PATCH",
                "/",
                Some(json!({
                    "external_id": "cust-42",
                    "properties": {"marketing_preference": "womenswear", "vip": true}
                })),
            ),
        )
        .await;

        let data = &body_json(&response)["data"];
        assert_eq!(data["preference"], "womenswear");
        assert_eq!(data["properties"]["vip"], true);
        assert_eq!(data["first_name"], "Jane");
    }

    #[tokio::test]
    async fn test_patch_merge_uses_trimmed_values() {
        init_test_logging();
        let api = MockKlaviyoApi::new();
        api.push_ok(json!({"data": [resource()]})).push_empty();

        let response = dispatch(
            &handler(&api),
            &request(
                "PATCH",
                "/",
                Some(json!({
                    "email": "jane@example.com",
                    "first_name": "   ",
                    "last_name": " Smith "
                })),
            ),
        )
        .await;

        assert_eq!(response.status(), 200);
        let data = &body_json(&response)["data"];
        assert_eq!(data["first_name"], "Jane");
        assert_eq!(data["last_name"], "Smith");
        assert_eq!(
            api.requests()[1].body.as_ref().unwrap()["data"]["attributes"],
            json!({"last_name": "Smith"})
        );
    }

    #[tokio::test]
    async fn test_patch_nothing_to_update() {
        init_test_logging();
        let api = MockKlaviyoApi::new();

        let response = dispatch(
            &handler(&api),
            &request("PATCH", "/", Some(json!({"email": "jane@example.com"}))),
        )
        .await;

        assert_eq!(response.status(), 400);
        assert_eq!(body_json(&response)["error"], "no fields to update");
        assert!(api.requests().is_empty());
    }

    #[tokio::test]
    async fn test_patch_missing_body() {
        init_test_logging();
        let api = MockKlaviyoApi::new();

        let response = dispatch(&handler(&api), &request("PATCH", "/", None)).await;
        assert_eq!(response.status(), 400);
    }

    #[tokio::test]
    async fn test_options_preflight() {
        init_test_logging();
        let api = MockKlaviyoApi::new();

        let response = dispatch(&handler(&api), &request("OPTIONS", "/", None)).await;

        assert_eq!(response.status(), 200);
        assert_eq!(
            response.headers().get("access-control-allow-methods").unwrap(),
            "GET, PATCH, OPTIONS"
        );
        assert!(api.requests().is_empty());
    }
}
