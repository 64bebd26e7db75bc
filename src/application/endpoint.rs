// エンドポイント共通処理
//
// HTTPメソッドの振り分け（OPTIONS/405）、リクエストの解析、
// エンベロープ形式のレスポンス生成とCORSヘッダー付与を行う。

use crate::domain::{ApiEnvelope, InputError};
use crate::infrastructure::KlaviyoError;
use async_trait::async_trait;
use lambda_http::http::header::{
    ACCESS_CONTROL_ALLOW_HEADERS, ACCESS_CONTROL_ALLOW_METHODS, ACCESS_CONTROL_ALLOW_ORIGIN,
    CONTENT_TYPE, HeaderMap, HeaderValue,
};
use lambda_http::http::{Method, StatusCode};
use lambda_http::{Body, Request, RequestExt, Response};
use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;
use tracing::{error, info, warn};

/// 許可するリクエストヘッダー
const ALLOWED_HEADERS: &str = "Content-Type, Authorization";

/// ハンドラーのエラー型
///
/// 各バリアントがHTTPステータスに対応する。
#[derive(Debug, Error)]
pub enum HandlerError {
    /// 入力不足・形式不正（400）
    #[error("bad request: {0}")]
    BadRequest(String),

    /// プロフィールが見つからない（404）
    #[error("not found: {0}")]
    NotFound(String),

    /// 許可されていないメソッド（405）
    #[error("method not allowed: {0}")]
    MethodNotAllowed(Method),

    /// Klaviyo APIエラー（500）
    #[error("upstream error: {0}")]
    Upstream(#[from] KlaviyoError),

    /// 内部エラー（500）
    #[error("internal error: {0}")]
    Internal(String),
}

impl From<InputError> for HandlerError {
    fn from(err: InputError) -> Self {
        HandlerError::BadRequest(err.to_string())
    }
}

impl HandlerError {
    /// 対応するHTTPステータスコード
    pub fn status(&self) -> StatusCode {
        match self {
            HandlerError::BadRequest(_) => StatusCode::BAD_REQUEST,
            HandlerError::NotFound(_) => StatusCode::NOT_FOUND,
            HandlerError::MethodNotAllowed(_) => StatusCode::METHOD_NOT_ALLOWED,
            HandlerError::Upstream(_) | HandlerError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// ストアフロントへ返却するエラーメッセージ
    pub fn client_message(&self) -> String {
        match self {
            HandlerError::BadRequest(message) | HandlerError::NotFound(message) => message.clone(),
            HandlerError::MethodNotAllowed(method) => format!("method {method} is not allowed"),
            HandlerError::Upstream(err) => err.client_message(),
            HandlerError::Internal(_) => "internal server error".to_string(),
        }
    }
}

/// エンドポイント定義
///
/// 各エンドポイントは許可メソッドと処理本体のみを実装し、
/// OPTIONS・405・エラー変換は [`dispatch`] が共通で行う。
#[async_trait]
pub trait Endpoint: Send + Sync {
    /// ログ用のエンドポイント名
    fn name(&self) -> &'static str;

    /// 許可するメソッド（OPTIONSを除く）
    fn allowed_methods(&self) -> &'static [Method];

    /// 許可メソッドのリクエストを処理し、`data` に載せる値を返す
    async fn handle_method(&self, request: &Request) -> Result<Value, HandlerError>;
}

/// リクエストをエンドポイントに振り分けてレスポンスを生成
///
/// # 処理フロー
/// 1. OPTIONS → 200（プリフライト）
/// 2. 許可されていないメソッド → 405
/// 3. 処理本体を実行し、成功時は200、失敗時はエラーに応じたステータス
pub async fn dispatch<E: Endpoint + ?Sized>(endpoint: &E, request: &Request) -> Response<Body> {
    let method = request.method().clone();
    let allowed = endpoint.allowed_methods();

    if let Some(response) = preflight(endpoint.name(), request, allowed) {
        return response;
    }

    info!(endpoint = endpoint.name(), method = %method, "リクエスト受信");

    match endpoint.handle_method(request).await {
        Ok(data) => {
            info!(
                endpoint = endpoint.name(),
                method = %method,
                status = 200,
                "リクエスト処理完了"
            );
            envelope_response(StatusCode::OK, &ApiEnvelope::ok(data), allowed)
        }
        Err(err) => {
            let status = err.status();
            if status.is_server_error() {
                error!(
                    endpoint = endpoint.name(),
                    method = %method,
                    status = status.as_u16(),
                    error = %err,
                    "リクエスト処理エラー"
                );
            } else {
                warn!(
                    endpoint = endpoint.name(),
                    method = %method,
                    status = status.as_u16(),
                    error = %err,
                    "リクエスト拒否"
                );
            }
            error_response(&err, allowed)
        }
    }
}

/// 処理本体を呼ばずに応答できるリクエストを処理する
///
/// OPTIONSは200、許可されていないメソッドは405を返す。
/// それ以外は`None`（処理本体へ進む）。
pub fn preflight(name: &str, request: &Request, allowed: &[Method]) -> Option<Response<Body>> {
    let method = request.method();

    if method == Method::OPTIONS {
        return Some(envelope_response(StatusCode::OK, &ApiEnvelope::empty(), allowed));
    }

    if !allowed.contains(method) {
        warn!(endpoint = name, method = %method, "許可されていないメソッド");
        return Some(error_response(
            &HandlerError::MethodNotAllowed(method.clone()),
            allowed,
        ));
    }

    None
}

/// エラーからエンベロープ形式のレスポンスを生成
pub fn error_response(err: &HandlerError, allowed: &[Method]) -> Response<Body> {
    envelope_response(err.status(), &ApiEnvelope::error(err.client_message()), allowed)
}

/// エンベロープをJSONボディとしてレスポンスを生成
pub fn envelope_response(
    status: StatusCode,
    envelope: &ApiEnvelope,
    allowed: &[Method],
) -> Response<Body> {
    // ApiEnvelopeのシリアライズは失敗しない（キーが文字列のJSON値のみ）
    let json = serde_json::to_string(envelope)
        .unwrap_or_else(|_| r#"{"success":false,"error":"internal server error"}"#.to_string());

    let mut response = Response::new(Body::Text(json));
    *response.status_mut() = status;
    *response.headers_mut() = build_cors_headers(allowed);

    response
}

/// CORSヘッダーを生成
///
/// - Content-Type: application/json
/// - Access-Control-Allow-Origin: *
/// - Access-Control-Allow-Headers: Content-Type, Authorization
/// - Access-Control-Allow-Methods: 許可メソッド + OPTIONS
pub fn build_cors_headers(allowed: &[Method]) -> HeaderMap {
    let mut headers = HeaderMap::new();

    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    headers.insert(ACCESS_CONTROL_ALLOW_ORIGIN, HeaderValue::from_static("*"));
    headers.insert(
        ACCESS_CONTROL_ALLOW_HEADERS,
        HeaderValue::from_static(ALLOWED_HEADERS),
    );

    let methods = allowed
        .iter()
        .map(Method::as_str)
        .chain(std::iter::once("OPTIONS"))
        .collect::<Vec<_>>()
        .join(", ");
    if let Ok(value) = HeaderValue::from_str(&methods) {
        headers.insert(ACCESS_CONTROL_ALLOW_METHODS, value);
    }

    headers
}

/// クエリパラメータを取得（前後空白除去、空文字はNone）
///
/// Lambdaイベント由来のパラメータを優先し、無ければURIのクエリ文字列を参照する。
pub fn query_param(request: &Request, key: &str) -> Option<String> {
    let from_event = request
        .query_string_parameters()
        .first(key)
        .map(str::to_string);

    from_event
        .or_else(|| {
            request.uri().query().and_then(|query| {
                url::form_urlencoded::parse(query.as_bytes())
                    .find(|(k, _)| k == key)
                    .map(|(_, v)| v.into_owned())
            })
        })
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// JSONボディを指定の型にデシリアライズ
///
/// ボディが空、またはJSONとして解釈できない場合は400。
pub fn parse_json_body<T: DeserializeOwned>(request: &Request) -> Result<T, HandlerError> {
    let bytes: &[u8] = match request.body() {
        Body::Empty => &[],
        Body::Text(text) => text.as_bytes(),
        Body::Binary(bytes) => bytes.as_slice(),
        _ => &[],
    };

    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Err(HandlerError::BadRequest("request body is required".to_string()));
    }

    serde_json::from_slice(bytes)
        .map_err(|e| HandlerError::BadRequest(format!("invalid JSON body: {e}")))
}

#[cfg(test)]
pub mod tests {
    use super::*;
    use lambda_http::http::Request as HttpRequest;
    use serde::Deserialize;
    use serde_json::json;

    // テスト用のリクエスト生成ヘルパー
    pub fn request(method: &str, uri: &str, body: Option<Value>) -> Request {
        let body = match body {
            Some(value) => Body::Text(value.to_string()),
            None => Body::Empty,
        };
        HttpRequest::builder()
            .method(method)
            .uri(uri)
            .header("Content-Type", "application/json")
            .body(body)
            .unwrap()
    }

    // レスポンスボディをJSONとして取得
    pub fn body_json(response: &Response<Body>) -> Value {
        let text = match response.body() {
            Body::Text(text) => text.clone(),
            Body::Binary(bytes) => String::from_utf8(bytes.clone()).unwrap(),
            Body::Empty => String::new(),
            _ => panic!("予期しないBody型"),
        };
        serde_json::from_str(&text).unwrap()
    }

    struct EchoEndpoint;

    const ECHO_METHODS: &[Method] = &[Method::GET, Method::POST];

    #[async_trait]
    impl Endpoint for EchoEndpoint {
        fn name(&self) -> &'static str {
            "echo"
        }

        fn allowed_methods(&self) -> &'static [Method] {
            ECHO_METHODS
        }

        async fn handle_method(&self, request: &Request) -> Result<Value, HandlerError> {
            match query_param(request, "fail").as_deref() {
                Some("missing") => Err(HandlerError::NotFound("profile not found".to_string())),
                Some("upstream") => Err(HandlerError::Upstream(KlaviyoError::Api {
                    status: 400,
                    detail: "Invalid email".to_string(),
                })),
                Some("internal") => Err(HandlerError::Internal("secret detail".to_string())),
                _ => Ok(json!({"method": request.method().as_str()})),
            }
        }
    }

    // ==================== dispatch ====================

    #[tokio::test]
    async fn test_dispatch_options_returns_200() {
        let response = dispatch(&EchoEndpoint, &request("OPTIONS", "/", None)).await;

        assert_eq!(response.status(), 200);
        assert_eq!(body_json(&response), json!({"success": true}));
        assert_eq!(
            response.headers().get("access-control-allow-methods").unwrap(),
            "GET, POST, OPTIONS"
        );
    }

    #[tokio::test]
    async fn test_dispatch_rejects_unsupported_method() {
        let response = dispatch(&EchoEndpoint, &request("DELETE", "/", None)).await;

        assert_eq!(response.status(), 405);
        assert_eq!(
            body_json(&response),
            json!({"success": false, "error": "method DELETE is not allowed"})
        );
        assert_eq!(response.headers().get("access-control-allow-origin").unwrap(), "*");
    }

    #[tokio::test]
    async fn test_dispatch_success_envelope() {
        let response = dispatch(&EchoEndpoint, &request("GET", "/", None)).await;

        assert_eq!(response.status(), 200);
        assert_eq!(
            body_json(&response),
            json!({"success": true, "data": {"method": "GET"}})
        );
        assert_eq!(response.headers().get("content-type").unwrap(), "application/json");
    }

    #[tokio::test]
    async fn test_dispatch_maps_not_found() {
        let response = dispatch(&EchoEndpoint, &request("GET", "/?fail=missing", None)).await;

        assert_eq!(response.status(), 404);
        assert_eq!(body_json(&response)["error"], "profile not found");
    }

    #[tokio::test]
    async fn test_dispatch_maps_upstream_error_to_500() {
        let response = dispatch(&EchoEndpoint, &request("POST", "/?fail=upstream", None)).await;

        assert_eq!(response.status(), 500);
        assert_eq!(
            body_json(&response),
            json!({"success": false, "error": "Invalid email"})
        );
    }

    #[tokio::test]
    async fn test_dispatch_hides_internal_detail() {
        let response = dispatch(&EchoEndpoint, &request("GET", "/?fail=internal", None)).await;

        assert_eq!(response.status(), 500);
        assert_eq!(body_json(&response)["error"], "internal server error");
    }

    // ==================== CORSヘッダー ====================

    #[test]
    fn test_build_cors_headers() {
        let headers = build_cors_headers(&[Method::GET, Method::PATCH]);

        assert_eq!(headers.get(CONTENT_TYPE).unwrap(), "application/json");
        assert_eq!(headers.get(ACCESS_CONTROL_ALLOW_ORIGIN).unwrap(), "*");
        assert_eq!(
            headers.get(ACCESS_CONTROL_ALLOW_HEADERS).unwrap(),
            "Content-Type, Authorization"
        );
        assert_eq!(
            headers.get(ACCESS_CONTROL_ALLOW_METHODS).unwrap(),
            "GET, PATCH, OPTIONS"
        );
    }

    // ==================== リクエスト解析 ====================

    #[test]
    fn test_query_param_from_uri() {
        let req = request("GET", "/?email=jane%40example.com&blank=%20", None);

        assert_eq!(query_param(&req, "email").as_deref(), Some("jane@example.com"));
        assert_eq!(query_param(&req, "blank"), None);
        assert_eq!(query_param(&req, "missing"), None);
    }

    #[derive(Debug, Deserialize)]
    struct Sample {
        email: String,
    }

    #[test]
    fn test_parse_json_body() {
        let req = request("POST", "/", Some(json!({"email": "jane@example.com"})));
        let sample: Sample = parse_json_body(&req).unwrap();
        assert_eq!(sample.email, "jane@example.com");
    }

    #[test]
    fn test_parse_json_body_empty() {
        let result: Result<Sample, _> = parse_json_body(&request("POST", "/", None));
        match result.unwrap_err() {
            HandlerError::BadRequest(message) => assert_eq!(message, "request body is required"),
            other => panic!("予期しないエラー: {other}"),
        }
    }

    #[test]
    fn test_parse_json_body_invalid() {
        let req = HttpRequest::builder()
            .method("POST")
            .uri("/")
            .body(Body::Text("{not json".to_string()))
            .unwrap();
        let result: Result<Sample, _> = parse_json_body(&req);
        assert!(matches!(result, Err(HandlerError::BadRequest(_))));
    }

    // ==================== HandlerError ====================

    #[test]
    fn test_handler_error_status() {
        assert_eq!(HandlerError::BadRequest("x".into()).status(), 400);
        assert_eq!(HandlerError::NotFound("x".into()).status(), 404);
        assert_eq!(HandlerError::MethodNotAllowed(Method::PUT).status(), 405);
        assert_eq!(HandlerError::Internal("x".into()).status(), 500);
        assert_eq!(
            HandlerError::from(KlaviyoError::Network("x".into())).status(),
            500
        );
    }

    #[test]
    fn test_input_error_becomes_bad_request() {
        let err = HandlerError::from(InputError::MissingField("email"));
        assert_eq!(err.status(), 400);
        assert_eq!(err.client_message(), "email is required");
    }
}
