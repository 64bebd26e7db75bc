// ストアフロント向けレスポンスエンベロープ
//
// 全エンドポイント共通の `{ success, data?, error? }` 形式を定義する。

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// レスポンスエンベロープ
///
/// JSONシリアライズ時に未設定フィールドは省略される。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiEnvelope {
    /// 処理成否
    pub success: bool,

    /// 成功時のペイロード
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,

    /// 失敗時のエラーメッセージ
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ApiEnvelope {
    /// データ付きの成功エンベロープ
    pub fn ok(data: Value) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    /// データなしの成功エンベロープ（OPTIONSプリフライト等）
    pub fn empty() -> Self {
        Self {
            success: true,
            data: None,
            error: None,
        }
    }

    /// エラーエンベロープ
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_ok_serializes_without_error_field() {
        let json = serde_json::to_value(ApiEnvelope::ok(json!({"id": "01H"}))).unwrap();
        assert_eq!(json, json!({"success": true, "data": {"id": "01H"}}));
    }

    #[test]
    fn test_empty_serializes_success_only() {
        let json = serde_json::to_value(ApiEnvelope::empty()).unwrap();
        assert_eq!(json, json!({"success": true}));
    }

    #[test]
    fn test_error_serializes_without_data_field() {
        let json = serde_json::to_value(ApiEnvelope::error("email is required")).unwrap();
        assert_eq!(json, json!({"success": false, "error": "email is required"}));
    }
}
