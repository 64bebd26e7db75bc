// KlaviyoClient - Klaviyo REST API用HTTPクライアント
//
// JSON:API形式のリクエストを `https://a.klaviyo.com/api` へ送信し、
// レスポンスまたはエラーを正規化して返す。再試行は行わない。

use super::klaviyo_config::KlaviyoConfig;
use async_trait::async_trait;
use reqwest::{Client, Method, StatusCode};
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error, instrument};

/// リクエストタイムアウト（秒）
const REQUEST_TIMEOUT_SECS: u64 = 10;

/// 接続タイムアウト（秒）
const CONNECT_TIMEOUT_SECS: u64 = 5;

/// JSON:APIのメディアタイプ
const JSON_API_MEDIA_TYPE: &str = "application/vnd.api+json";

/// 詳細が取得できないエラーレスポンス用メッセージ
const GENERIC_ERROR_MESSAGE: &str = "Klaviyo request failed";

/// Klaviyo API呼び出しエラー
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum KlaviyoError {
    /// 2xx以外のレスポンス（最初のエラー詳細付き）
    #[error("Klaviyo APIエラー: status={status}, detail={detail}")]
    Api {
        /// HTTPステータスコード
        status: u16,
        /// `errors[0].detail`（無ければ`title`）
        detail: String,
    },

    /// ネットワークエラー（タイムアウト・接続失敗など）
    #[error("ネットワークエラー: {0}")]
    Network(String),

    /// レスポンスボディが解釈できない
    #[error("不正なレスポンス: {0}")]
    InvalidResponse(String),
}

impl KlaviyoError {
    /// 404 Not Foundか
    pub fn is_not_found(&self) -> bool {
        matches!(self, KlaviyoError::Api { status: 404, .. })
    }

    /// ストアフロントへ返却するメッセージ
    pub fn client_message(&self) -> String {
        match self {
            KlaviyoError::Api { detail, .. } => detail.clone(),
            KlaviyoError::Network(_) => "Klaviyo is unreachable".to_string(),
            KlaviyoError::InvalidResponse(_) => "unexpected response from Klaviyo".to_string(),
        }
    }
}

/// Klaviyoへのリクエスト
///
/// パスはベースURLからの相対パス（例: `/profiles/`）。
#[derive(Debug, Clone, PartialEq)]
pub struct KlaviyoRequest {
    pub method: Method,
    pub path: String,
    pub query: Vec<(String, String)>,
    pub body: Option<Value>,
}

impl KlaviyoRequest {
    /// GETリクエストを作成
    pub fn get(path: impl Into<String>) -> Self {
        Self {
            method: Method::GET,
            path: path.into(),
            query: Vec::new(),
            body: None,
        }
    }

    /// POSTリクエストを作成
    pub fn post(path: impl Into<String>, body: Value) -> Self {
        Self {
            method: Method::POST,
            path: path.into(),
            query: Vec::new(),
            body: Some(body),
        }
    }

    /// PATCHリクエストを作成
    pub fn patch(path: impl Into<String>, body: Value) -> Self {
        Self {
            method: Method::PATCH,
            path: path.into(),
            query: Vec::new(),
            body: Some(body),
        }
    }

    /// クエリパラメータを追加
    pub fn with_query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    /// クエリパラメータの値を取得（テスト・ログ用）
    pub fn query_value(&self, key: &str) -> Option<&str> {
        self.query
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

/// Klaviyo API呼び出し用トレイト
///
/// 実際のHTTPクライアントとテスト用モックを差し替えられるようにする。
#[async_trait]
pub trait KlaviyoApi: Send + Sync {
    /// リクエストを送信する
    ///
    /// # Returns
    /// * `Ok(Some(body))` - ボディ付きの2xxレスポンス
    /// * `Ok(None)` - 202 Accepted / 204 No Content / 空ボディ
    /// * `Err(KlaviyoError)` - 2xx以外、またはネットワークエラー
    async fn send(&self, request: KlaviyoRequest) -> Result<Option<Value>, KlaviyoError>;
}

/// エラーレスポンスボディから最初のエラー詳細を取り出す
///
/// `{"errors": [{"detail": "...", "title": "..."}]}` の `detail` を優先し、
/// 無ければ `title` を返す。
pub fn extract_error_detail(body: &str) -> Option<String> {
    let parsed: Value = serde_json::from_str(body).ok()?;
    let first = parsed.get("errors")?.as_array()?.first()?;

    ["detail", "title"]
        .iter()
        .filter_map(|key| first.get(*key).and_then(|v| v.as_str()))
        .map(str::trim)
        .find(|v| !v.is_empty())
        .map(str::to_string)
}

/// reqwestを使用したKlaviyoクライアント
#[derive(Clone)]
pub struct HttpKlaviyoClient {
    client: Client,
    base_url: String,
    api_key: String,
    revision: String,
}

impl std::fmt::Debug for HttpKlaviyoClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpKlaviyoClient")
            .field("base_url", &self.base_url)
            .field("revision", &self.revision)
            .finish_non_exhaustive()
    }
}

impl HttpKlaviyoClient {
    /// 設定からクライアントを作成
    pub fn new(config: &KlaviyoConfig) -> Result<Self, KlaviyoError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
            .build()
            .map_err(|e| KlaviyoError::Network(e.to_string()))?;

        Ok(Self {
            client,
            base_url: config.base_url().to_string(),
            api_key: config.api_key().to_string(),
            revision: config.revision().to_string(),
        })
    }

    /// 相対パスから完全なURLを構築
    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }
}

#[async_trait]
impl KlaviyoApi for HttpKlaviyoClient {
    #[instrument(skip(self, request), fields(method = %request.method, path = %request.path))]
    async fn send(&self, request: KlaviyoRequest) -> Result<Option<Value>, KlaviyoError> {
        let url = self.url(&request.path);
        debug!(url = %url, "Klaviyoへリクエスト送信");

        let mut builder = self
            .client
            .request(request.method.clone(), &url)
            .header("Authorization", format!("Klaviyo-API-Key {}", self.api_key))
            .header("revision", &self.revision)
            .header("Accept", JSON_API_MEDIA_TYPE);

        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }

        if let Some(body) = &request.body {
            let body = serde_json::to_string(body)
                .map_err(|e| KlaviyoError::InvalidResponse(e.to_string()))?;
            builder = builder
                .header("Content-Type", JSON_API_MEDIA_TYPE)
                .body(body);
        }

        let response = builder.send().await.map_err(|e| {
            error!(error = %e, "Klaviyoリクエスト失敗");
            KlaviyoError::Network(e.to_string())
        })?;

        let status = response.status();

        // 202 Accepted / 204 No Contentはボディなしの成功
        if status == StatusCode::ACCEPTED || status == StatusCode::NO_CONTENT {
            debug!(status = %status, "Klaviyoリクエスト成功（ボディなし）");
            return Ok(None);
        }

        let text = response
            .text()
            .await
            .map_err(|e| KlaviyoError::Network(e.to_string()))?;

        if !status.is_success() {
            let detail =
                extract_error_detail(&text).unwrap_or_else(|| GENERIC_ERROR_MESSAGE.to_string());
            error!(
                status = %status,
                detail = %detail,
                "Klaviyoエラーレスポンス"
            );
            return Err(KlaviyoError::Api {
                status: status.as_u16(),
                detail,
            });
        }

        if text.trim().is_empty() {
            return Ok(None);
        }

        let body = serde_json::from_str(&text).map_err(|e| {
            error!(error = %e, "Klaviyoレスポンスのパースに失敗");
            KlaviyoError::InvalidResponse(e.to_string())
        })?;

        debug!(status = %status, "Klaviyoリクエスト成功");
        Ok(Some(body))
    }
}
