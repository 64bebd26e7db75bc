// Klaviyoリスト一覧
//
// `GET /lists/` のレスポンスをストアフロント向けの要約に変換する。

use serde::Serialize;
use serde_json::Value;
use url::Url;

/// ページネーションカーソルのクエリパラメータ名
pub const PAGE_CURSOR_PARAM: &str = "page[cursor]";

/// リスト要約
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MailingList {
    pub id: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated: Option<String>,
    /// `single_opt_in` / `double_opt_in`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub opt_in_process: Option<String>,
}

impl MailingList {
    /// Klaviyo `list` リソースから変換（IDのないリソースは無視）
    pub fn from_resource(resource: &Value) -> Option<Self> {
        let id = resource.get("id")?.as_str()?.to_string();
        let attributes = resource.get("attributes");
        let text = |key: &str| {
            attributes
                .and_then(|a| a.get(key))
                .and_then(|v| v.as_str())
                .map(str::to_string)
        };

        Some(Self {
            id,
            name: text("name").unwrap_or_default(),
            created: text("created"),
            updated: text("updated"),
            opt_in_process: text("opt_in_process"),
        })
    }
}

/// リスト一覧ページ
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MailingListPage {
    pub lists: Vec<MailingList>,
    /// 次ページ取得用カーソル（最終ページではNone）
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_cursor: Option<String>,
}

impl MailingListPage {
    /// `GET /lists/` のレスポンスボディから変換
    pub fn from_response(body: &Value) -> Self {
        let lists = body
            .get("data")
            .and_then(|d| d.as_array())
            .map(|items| items.iter().filter_map(MailingList::from_resource).collect())
            .unwrap_or_default();

        let next_cursor = body
            .get("links")
            .and_then(|l| l.get("next"))
            .and_then(|n| n.as_str())
            .and_then(extract_cursor);

        Self { lists, next_cursor }
    }
}

/// `links.next` のURLから `page[cursor]` の値を取り出す
pub fn extract_cursor(next_link: &str) -> Option<String> {
    let url = Url::parse(next_link).ok()?;
    url.query_pairs()
        .find(|(key, _)| key == PAGE_CURSOR_PARAM)
        .map(|(_, value)| value.into_owned())
        .filter(|v| !v.is_empty())
}
