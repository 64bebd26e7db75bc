// プロフィールモデル
//
// ストアフロントから受け取る識別子・更新内容と、
// Klaviyo JSON:APIリソースから正規化したプロフィールを定義する。

use super::marketing_preference::MarketingPreference;
use super::subscription::InputError;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// 空白のみの文字列をNoneとして扱い、前後空白を除去する
pub(crate) fn normalize_optional(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// JSON:APIのリソース種別
const PROFILE_RESOURCE_TYPE: &str = "profile";

/// プロフィールIDとして妥当か（英数字・`-`・`_` のみ）
///
/// IDはURLパスにそのまま埋め込まれるため、`/` `.` `?` `%` などは受け付けない。
pub fn is_valid_profile_id(profile_id: &str) -> bool {
    !profile_id.is_empty()
        && profile_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

/// プロフィール検索用の識別子
///
/// いずれか1つ以上が必要。検索は `profile_id` → `email` → `external_id` の順に行う。
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ProfileIdentifier {
    /// KlaviyoプロフィールID
    #[serde(default)]
    pub profile_id: Option<String>,

    /// メールアドレス
    #[serde(default)]
    pub email: Option<String>,

    /// 外部ID（ストアの顧客ID）
    #[serde(default, alias = "customer_id")]
    pub external_id: Option<String>,
}

impl ProfileIdentifier {
    /// 識別子を正規化する（前後空白除去、空文字はNone）
    pub fn normalized(self) -> Self {
        Self {
            profile_id: normalize_optional(self.profile_id),
            email: normalize_optional(self.email),
            external_id: normalize_optional(self.external_id),
        }
    }

    /// 識別子が1つも指定されていないか
    pub fn is_empty(&self) -> bool {
        self.profile_id.is_none() && self.email.is_none() && self.external_id.is_none()
    }

    /// `profile_id` の形式を検証する
    pub fn validate(&self) -> Result<(), InputError> {
        match &self.profile_id {
            Some(profile_id) if !is_valid_profile_id(profile_id) => {
                Err(InputError::InvalidProfileId(profile_id.clone()))
            }
            _ => Ok(()),
        }
    }
}

/// プロフィール更新内容
///
/// 指定されたフィールドのみKlaviyoへ送信する。
/// `email` と `external_id` は検索用の識別子であり、ここでは更新しない。
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ProfileUpdate {
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub phone_number: Option<String>,
    /// カスタムプロパティ（既存プロパティとマージされる）
    #[serde(default)]
    pub properties: Option<Map<String, Value>>,
}

impl ProfileUpdate {
    /// 更新対象が1つもないか
    pub fn is_empty(&self) -> bool {
        self.to_attributes().is_empty()
    }

    /// Klaviyo `profile` リソースのattributesを構築
    pub fn to_attributes(&self) -> Map<String, Value> {
        // 空白のみの文字列は送信しない
        let mut attributes = Map::new();

        let fields = [
            ("first_name", &self.first_name),
            ("last_name", &self.last_name),
            ("phone_number", &self.phone_number),
        ];
        for (key, value) in fields {
            if let Some(value) = normalize_optional(value.clone()) {
                attributes.insert(key.to_string(), Value::String(value));
            }
        }

        if let Some(properties) = self.properties.as_ref().filter(|p| !p.is_empty()) {
            attributes.insert("properties".to_string(), Value::Object(properties.clone()));
        }

        attributes
    }
}

/// 正規化済みプロフィール
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Profile {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone_number: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub external_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
    pub properties: Map<String, Value>,
    /// `properties` から復元したマーケティング設定
    pub preference: MarketingPreference,
}

impl Profile {
    /// Klaviyo `profile` リソース（`data` の要素）から変換
    ///
    /// # Arguments
    /// * `resource` - `{ "type": "profile", "id": ..., "attributes": {...} }`
    /// * `preference_property` - 設定値を保存しているプロパティ名
    ///
    /// # Returns
    /// `type` が `profile` でない、またはIDを持たないリソースの場合は`None`
    pub fn from_resource(resource: &Value, preference_property: &str) -> Option<Self> {
        if resource.get("type").and_then(|t| t.as_str()) != Some(PROFILE_RESOURCE_TYPE) {
            return None;
        }
        let id = resource.get("id")?.as_str()?.to_string();
        let attributes = resource.get("attributes");

        let text = |key: &str| -> Option<String> {
            attributes
                .and_then(|a| a.get(key))
                .and_then(|v| v.as_str())
                .map(str::to_string)
        };

        let properties = attributes
            .and_then(|a| a.get("properties"))
            .and_then(|p| p.as_object())
            .cloned()
            .unwrap_or_default();

        let preference = MarketingPreference::from_property(properties.get(preference_property));

        Some(Self {
            id,
            email: text("email"),
            phone_number: text("phone_number"),
            external_id: text("external_id"),
            first_name: text("first_name"),
            last_name: text("last_name"),
            properties,
            preference,
        })
    }

    /// 更新内容をローカルに反映する（Klaviyoがボディを返さない場合用）
    ///
    /// 文字列は [`ProfileUpdate::to_attributes`] と同じ規則で正規化する
    /// （前後空白除去、空白のみの値は無視）。
    pub fn apply(&mut self, update: &ProfileUpdate, preference_property: &str) {
        if let Some(v) = normalize_optional(update.first_name.clone()) {
            self.first_name = Some(v);
        }
        if let Some(v) = normalize_optional(update.last_name.clone()) {
            self.last_name = Some(v);
        }
        if let Some(v) = normalize_optional(update.phone_number.clone()) {
            self.phone_number = Some(v);
        }
        if let Some(properties) = &update.properties {
            for (key, value) in properties {
                self.properties.insert(key.clone(), value.clone());
            }
        }
        self.preference =
            MarketingPreference::from_property(self.properties.get(preference_property));
    }
}
