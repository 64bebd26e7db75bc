// マーケティング設定ハンドラー
//
// GET: プロフィールに保存された設定値を返す
// PATCH: 設定値を検証してプロフィールプロパティへ書き込む

use super::endpoint::{Endpoint, HandlerError, parse_json_body, query_param};
use super::profile_locator::ProfileLocator;
use crate::domain::subscription::parse_preference;
use crate::domain::{MarketingPreference, Profile, ProfileIdentifier};
use crate::infrastructure::klaviyo_request;
use crate::infrastructure::{KlaviyoApi, KlaviyoConfig};
use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use lambda_http::Request;
use lambda_http::http::Method;
use serde::Deserialize;
use serde_json::{Map, Value, json};
use tracing::info;

/// 許可するメソッド（OPTIONSを除く）
pub const ALLOWED_METHODS: &[Method] = &[Method::GET, Method::PATCH];

/// 現在時刻（RFC 3339、UTC、秒精度）
pub(crate) fn now_rfc3339() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// 設定値と更新日時のプロパティを構築
pub(crate) fn preference_properties(
    config: &KlaviyoConfig,
    preference: MarketingPreference,
    updated_at: &str,
) -> Map<String, Value> {
    let mut properties = Map::new();
    properties.insert(
        config.preference_property().to_string(),
        Value::String(preference.encode()),
    );
    properties.insert(
        config.preference_updated_at_property(),
        Value::String(updated_at.to_string()),
    );
    properties
}

/// クエリ文字列から識別子を取得
pub(crate) fn identifier_from_query(request: &Request) -> ProfileIdentifier {
    ProfileIdentifier {
        profile_id: query_param(request, "profile_id"),
        email: query_param(request, "email"),
        external_id: query_param(request, "external_id")
            .or_else(|| query_param(request, "customer_id")),
    }
    .normalized()
}

/// PATCHリクエストボディ
#[derive(Debug, Deserialize)]
struct PreferencesPatch {
    #[serde(flatten)]
    identifier: ProfileIdentifier,
    #[serde(default)]
    preference: Option<String>,
}

/// マーケティング設定ハンドラー
pub struct PreferencesHandler<A: KlaviyoApi> {
    api: A,
    config: KlaviyoConfig,
}

impl<A: KlaviyoApi> PreferencesHandler<A> {
    pub fn new(api: A, config: KlaviyoConfig) -> Self {
        Self { api, config }
    }

    /// プロフィールから設定レスポンスを構築
    fn preference_data(&self, profile: &Profile) -> Value {
        let updated_at = profile
            .properties
            .get(&self.config.preference_updated_at_property())
            .and_then(|v| v.as_str());

        let mut data = json!({
            "profile_id": profile.id,
            "preference": profile.preference,
        });
        if let (Some(updated_at), Some(object)) = (updated_at, data.as_object_mut()) {
            object.insert("updated_at".to_string(), json!(updated_at));
        }
        data
    }

    /// GET: 現在の設定値を取得
    async fn get(&self, request: &Request) -> Result<Value, HandlerError> {
        let identifier = identifier_from_query(request);
        let profile = ProfileLocator::new(&self.api, &self.config)
            .require(&identifier)
            .await?;

        Ok(self.preference_data(&profile))
    }

    /// PATCH: 設定値を更新
    async fn patch(&self, request: &Request) -> Result<Value, HandlerError> {
        let body: PreferencesPatch = parse_json_body(request)?;
        let preference = parse_preference(body.preference)?
            .ok_or_else(|| HandlerError::BadRequest("preference is required".to_string()))?;
        let identifier = body.identifier.normalized();

        let profile = ProfileLocator::new(&self.api, &self.config)
            .require(&identifier)
            .await?;

        let updated_at = now_rfc3339();
        let mut attributes = Map::new();
        attributes.insert(
            "properties".to_string(),
            Value::Object(preference_properties(&self.config, preference, &updated_at)),
        );
        self.api
            .send(klaviyo_request::update_profile(&profile.id, attributes))
            .await?;

        info!(
            profile_id = %profile.id,
            preference = %preference,
            "マーケティング設定を更新"
        );

        Ok(json!({
            "profile_id": profile.id,
            "preference": preference,
            "updated_at": updated_at,
        }))
    }
}

#[async_trait]
impl<A: KlaviyoApi> Endpoint for PreferencesHandler<A> {
    fn name(&self) -> &'static str {
        "preferences"
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
