// Lambdaエントリポイント共通処理
//
// 各バイナリはwarm start時に設定とHTTPクライアントを使い回す。
// 初期化に失敗した場合でも、プリフライトと405はエンベロープで応答する。

use super::endpoint::{Endpoint, dispatch, envelope_response, preflight};
use crate::domain::ApiEnvelope;
use crate::infrastructure::{HttpKlaviyoClient, KlaviyoConfig, KlaviyoConfigError, KlaviyoError};
use lambda_http::http::{Method, StatusCode};
use lambda_http::{Body, Request, Response};
use thiserror::Error;
use tracing::error;

/// 初期化失敗時にストアフロントへ返すメッセージ
const UNAVAILABLE_MESSAGE: &str = "service is not configured";

/// 初期化エラー
#[derive(Debug, Error)]
pub enum StartupError {
    #[error(transparent)]
    Config(#[from] KlaviyoConfigError),

    #[error("HTTPクライアント初期化エラー: {0}")]
    Client(#[from] KlaviyoError),
}

/// Klaviyo呼び出しに必要な設定とクライアントの組
#[derive(Debug, Clone)]
pub struct KlaviyoContext {
    pub config: KlaviyoConfig,
    pub client: HttpKlaviyoClient,
}

impl KlaviyoContext {
    /// 環境変数（必要に応じてSSM）から初期化
    pub async fn load() -> Result<Self, StartupError> {
        let config = KlaviyoConfig::from_env_with_ssm().await?;
        let client = HttpKlaviyoClient::new(&config)?;
        Ok(Self { config, client })
    }
}

/// 初期化結果に応じてリクエストを処理する
///
/// # Arguments
/// * `name` - ログ用のエンドポイント名
/// * `allowed` - 許可メソッド（初期化失敗時のプリフライト応答に使用）
/// * `context` - 初期化結果
/// * `build` - 初期化済みコンテキストからエンドポイントを組み立てる
pub async fn serve<E, F>(
    name: &str,
    allowed: &[Method],
    context: Result<&KlaviyoContext, StartupError>,
    request: &Request,
    build: F,
) -> Response<Body>
where
    E: Endpoint,
    F: FnOnce(&KlaviyoContext) -> E,
{
    match context {
        Ok(context) => dispatch(&build(context), request).await,
        Err(err) => unavailable_response(name, allowed, &err, request),
    }
}

/// 初期化失敗時のレスポンス
pub fn unavailable_response(
    name: &str,
    allowed: &[Method],
    err: &StartupError,
    request: &Request,
) -> Response<Body> {
    if let Some(response) = preflight(name, request, allowed) {
        return response;
    }

    error!(
        endpoint = name,
        error = %err,
        "初期化に失敗したためリクエストを処理できない"
    );
    envelope_response(
        StatusCode::INTERNAL_SERVER_ERROR,
        &ApiEnvelope::error(UNAVAILABLE_MESSAGE),
        allowed,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::endpoint::tests::{body_json, request};
    use crate::infrastructure::logging::init_test_logging;
    use serde_json::json;

    const ALLOWED: &[Method] = &[Method::POST];

    fn missing_key() -> StartupError {
        StartupError::Config(KlaviyoConfigError::MissingEnvVar("KLAVIYO_API_KEY".to_string()))
    }

    #[test]
    fn test_unavailable_answers_preflight() {
        init_test_logging();
        let response = unavailable_response(
            "subscribe",
            ALLOWED,
            &missing_key(),
            &request("OPTIONS", "/", None),
        );

        assert_eq!(response.status(), 200);
        assert_eq!(
            response.headers().get("access-control-allow-origin").unwrap(),
            "*"
        );
    }

    #[test]
    fn test_unavailable_rejects_wrong_method() {
        init_test_logging();
        let response = unavailable_response(
            "subscribe",
            ALLOWED,
            &missing_key(),
            &request("GET", "/", None),
        );

        assert_eq!(response.status(), 405);
    }

    #[test]
    fn test_unavailable_hides_configuration_detail() {
        init_test_logging();
        let response = unavailable_response(
            "subscribe",
            ALLOWED,
            &missing_key(),
            &request("POST", "/", Some(json!({"email": "jane@example.com"}))),
        );

        assert_eq!(response.status(), 500);
        assert_eq!(
            body_json(&response),
            json!({"success": false, "error": "service is not configured"})
        );
    }
}
