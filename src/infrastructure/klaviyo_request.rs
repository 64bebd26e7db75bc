// Klaviyo JSON:APIリクエスト構築
//
// 各エンドポイントが送信するKlaviyoリクエストのパス・クエリ・ボディを組み立てる。
// リビジョン 2025-01-15 のスキーマに準拠する。

use super::klaviyo_client::KlaviyoRequest;
use crate::domain::mailing_list::PAGE_CURSOR_PARAM;
use crate::domain::{Subscription, Unsubscription};
use serde_json::{Map, Value, json};

/// 購読同意ステータス
const CONSENT_SUBSCRIBED: &str = "SUBSCRIBED";
const CONSENT_UNSUBSCRIBED: &str = "UNSUBSCRIBED";

/// リスト一覧で取得するフィールド
const LIST_FIELDS: &str = "name,created,updated,opt_in_process";

/// フィルター式の文字列リテラルを作成（`\` と `"` をエスケープ）
pub fn quote_filter_value(value: &str) -> String {
    let escaped = value.replace('\\', "\\\\").replace('"', "\\\"");
    format!("\"{escaped}\"")
}

/// `equals(field,"value")` 形式のフィルター式
pub fn equals_filter(field: &str, value: &str) -> String {
    format!("equals({},{})", field, quote_filter_value(value))
}

/// カスタムプロパティ参照 `properties["name"]`
pub fn property_field(property: &str) -> String {
    format!("properties[{}]", quote_filter_value(property))
}

/// プロフィールID指定取得 `GET /profiles/{id}/`
pub fn get_profile(profile_id: &str) -> KlaviyoRequest {
    KlaviyoRequest::get(format!("/profiles/{profile_id}/"))
}

/// フィルター検索 `GET /profiles/?filter=...`
pub fn find_profiles(filter: String) -> KlaviyoRequest {
    KlaviyoRequest::get("/profiles/").with_query("filter", filter)
}

/// プロフィール更新 `PATCH /profiles/{id}/`
pub fn update_profile(profile_id: &str, attributes: Map<String, Value>) -> KlaviyoRequest {
    KlaviyoRequest::patch(
        format!("/profiles/{profile_id}/"),
        json!({
            "data": {
                "type": "profile",
                "id": profile_id,
                "attributes": attributes,
            }
        }),
    )
}

/// プロフィール作成または更新 `POST /profile-import/`
pub fn import_profile(attributes: Map<String, Value>) -> KlaviyoRequest {
    KlaviyoRequest::post(
        "/profile-import/",
        json!({
            "data": {
                "type": "profile",
                "attributes": attributes,
            }
        }),
    )
}

/// リストへの関連付け
fn list_relationship(list_id: &str) -> Value {
    json!({
        "list": {
            "data": { "type": "list", "id": list_id }
        }
    })
}

/// チャネル別のマーケティング同意
fn marketing_consent(consent: &str) -> Value {
    json!({ "marketing": { "consent": consent } })
}

/// 購読ジョブ作成 `POST /profile-subscription-bulk-create-jobs/`
///
/// メールは常に購読、SMSは同意かつ電話番号がある場合のみ購読する。
pub fn subscribe(subscription: &Subscription) -> KlaviyoRequest {
    let mut subscriptions = Map::new();
    subscriptions.insert("email".to_string(), marketing_consent(CONSENT_SUBSCRIBED));
    if subscription.subscribes_sms() {
        subscriptions.insert("sms".to_string(), marketing_consent(CONSENT_SUBSCRIBED));
    }

    let mut profile_attributes = Map::new();
    profile_attributes.insert("email".to_string(), json!(subscription.email));
    if let Some(phone_number) = &subscription.phone_number {
        profile_attributes.insert("phone_number".to_string(), json!(phone_number));
    }
    profile_attributes.insert("subscriptions".to_string(), Value::Object(subscriptions));

    let mut attributes = Map::new();
    if let Some(source) = &subscription.custom_source {
        attributes.insert("custom_source".to_string(), json!(source));
    }
    attributes.insert(
        "profiles".to_string(),
        json!({
            "data": [{ "type": "profile", "attributes": profile_attributes }]
        }),
    );

    KlaviyoRequest::post(
        "/profile-subscription-bulk-create-jobs/",
        json!({
            "data": {
                "type": "profile-subscription-bulk-create-job",
                "attributes": attributes,
                "relationships": list_relationship(&subscription.list_id),
            }
        }),
    )
}

/// 購読解除ジョブ作成 `POST /profile-subscription-bulk-delete-jobs/`
///
/// リスト未指定時はリレーションを付けず、マーケティング全体から購読解除する。
pub fn unsubscribe(unsubscription: &Unsubscription) -> KlaviyoRequest {
    let mut data = json!({
        "type": "profile-subscription-bulk-delete-job",
        "attributes": {
            "profiles": {
                "data": [{
                    "type": "profile",
                    "attributes": {
                        "email": unsubscription.email,
                        "subscriptions": {
                            "email": marketing_consent(CONSENT_UNSUBSCRIBED),
                        }
                    }
                }]
            }
        }
    });

    if let (Some(list_id), Some(object)) = (&unsubscription.list_id, data.as_object_mut()) {
        object.insert("relationships".to_string(), list_relationship(list_id));
    }

    KlaviyoRequest::post(
        "/profile-subscription-bulk-delete-jobs/",
        json!({ "data": data }),
    )
}

/// リスト一覧取得 `GET /lists/`
pub fn get_lists(cursor: Option<&str>) -> KlaviyoRequest {
    let request = KlaviyoRequest::get("/lists/").with_query("fields[list]", LIST_FIELDS);
    match cursor {
        Some(cursor) => request.with_query(PAGE_CURSOR_PARAM, cursor),
        None => request,
    }
}

/// アカウント取得 `GET /accounts/`（ヘルスチェック用）
pub fn get_accounts() -> KlaviyoRequest {
    KlaviyoRequest::get("/accounts/")
}
