// リスト一覧ハンドラー

use super::endpoint::{Endpoint, HandlerError, query_param};
use crate::domain::MailingListPage;
use crate::infrastructure::KlaviyoApi;
use crate::infrastructure::klaviyo_request;
use async_trait::async_trait;
use lambda_http::Request;
use lambda_http::http::Method;
use serde_json::{Value, json};
use tracing::info;

/// 許可するメソッド（OPTIONSを除く）
pub const ALLOWED_METHODS: &[Method] = &[Method::GET];

/// リスト一覧ハンドラー
///
/// `cursor` クエリで次ページを取得できる。
pub struct ListsHandler<A: KlaviyoApi> {
    api: A,
}

impl<A: KlaviyoApi> ListsHandler<A> {
    pub fn new(api: A) -> Self {
        Self { api }
    }

    async fn list(&self, request: &Request) -> Result<Value, HandlerError> {
        let cursor = query_param(request, "cursor");
        let body = self
            .api
            .send(klaviyo_request::get_lists(cursor.as_deref()))
            .await?
            .unwrap_or_else(|| json!({"data": []}));

        let page = MailingListPage::from_response(&body);
        info!(
            count = page.lists.len(),
            has_next = page.next_cursor.is_some(),
            "リスト一覧を取得"
        );

        serde_json::to_value(page).map_err(|e| HandlerError::Internal(e.to_string()))
    }
}

#[async_trait]
impl<A: KlaviyoApi> Endpoint for ListsHandler<A> {
    fn name(&self) -> &'static str {
        "lists"
    }

    fn allowed_methods(&self) -> &'static [Method] {
        ALLOWED_METHODS
    }

    async fn handle_method(&self, request: &Request) -> Result<Value, HandlerError> {
        self.list(request).await
    }
}
