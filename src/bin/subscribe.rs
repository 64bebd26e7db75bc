/// 購読 HTTP Lambdaエントリポイント
///
/// Lambda Function URL経由のHTTPリクエストを処理する。
/// POST: メールアドレスをKlaviyoリストに購読させる。
use klaviyo_proxy::application::subscribe_handler::ALLOWED_METHODS;
use klaviyo_proxy::application::{KlaviyoContext, StartupError, SubscribeHandler, serve};
use klaviyo_proxy::infrastructure::init_logging;
use lambda_http::{Body, Error, Request, Response, run, service_fn};
use tokio::sync::OnceCell;
use tracing::info;

/// ログ用のエンドポイント名
const ENDPOINT_NAME: &str = "subscribe";

/// 設定とHTTPクライアントの静的インスタンス
///
/// Lambda warm start時にコネクションを再利用する。
/// 初期化に失敗した場合は次のリクエストで再試行する。
static CONTEXT: OnceCell<KlaviyoContext> = OnceCell::const_new();

async fn get_context() -> Result<&'static KlaviyoContext, StartupError> {
    CONTEXT.get_or_try_init(KlaviyoContext::load).await
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    // 構造化ログを初期化
    init_logging();

    info!(endpoint = ENDPOINT_NAME, "Lambda関数を初期化");

    run(service_fn(handler)).await
}

/// HTTPリクエストハンドラー
///
/// エラーは全てエンベロープ形式のレスポンスに変換するため、常に`Ok`を返す。
async fn handler(request: Request) -> Result<Response<Body>, Error> {
    let context = get_context().await;

    Ok(serve(ENDPOINT_NAME, ALLOWED_METHODS, context, &request, |context| {
        SubscribeHandler::new(context.client.clone(), context.config.clone())
    })
    .await)
}
