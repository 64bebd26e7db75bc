// Klaviyo API接続設定
//
// 環境変数（およびSSM Parameter Store）からKlaviyo APIへの接続設定を読み込む。

use aws_sdk_ssm::Client as SsmClient;
use thiserror::Error;
use tracing::info;

/// KlaviyoのデフォルトAPIベースURL
pub const DEFAULT_BASE_URL: &str = "https://a.klaviyo.com/api";

/// 使用するKlaviyo APIリビジョン
pub const DEFAULT_REVISION: &str = "2025-01-15";

/// マーケティング設定を保存するプロフィールプロパティ名（デフォルト）
pub const DEFAULT_PREFERENCE_PROPERTY: &str = "marketing_preference";

/// 外部IDフォールバック検索に使うカスタムプロパティ名（デフォルト）
pub const DEFAULT_LOOKUP_PROPERTY: &str = "shopify_customer_id";

const ENV_API_KEY: &str = "KLAVIYO_API_KEY";
const ENV_API_KEY_SSM_PARAMETER: &str = "KLAVIYO_API_KEY_SSM_PARAMETER";
const ENV_BASE_URL: &str = "KLAVIYO_API_BASE_URL";
const ENV_REVISION: &str = "KLAVIYO_API_REVISION";
const ENV_DEFAULT_LIST_ID: &str = "KLAVIYO_DEFAULT_LIST_ID";
const ENV_PREFERENCE_PROPERTY: &str = "KLAVIYO_PREFERENCE_PROPERTY";
const ENV_LOOKUP_PROPERTY: &str = "KLAVIYO_LOOKUP_PROPERTY";

/// Klaviyo設定エラー
#[derive(Debug, Error)]
pub enum KlaviyoConfigError {
    /// 必須の環境変数が設定されていない
    #[error("必須の環境変数が設定されていません: {0}")]
    MissingEnvVar(String),

    /// SSMからのAPIキー取得に失敗
    #[error("SSMパラメータ取得エラー: {0}")]
    SsmError(String),
}

/// 環境変数を読み込む（空白のみの値は未設定扱い）
fn optional_env(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Klaviyo API接続設定
///
/// # 環境変数
/// - `KLAVIYO_API_KEY`: プライベートAPIキー（必須、SSM指定時は省略可）
/// - `KLAVIYO_API_KEY_SSM_PARAMETER`: APIキーを格納したSSM SecureString名
/// - `KLAVIYO_API_BASE_URL`: APIベースURL（デフォルト: `https://a.klaviyo.com/api`）
/// - `KLAVIYO_API_REVISION`: `revision` ヘッダー値（デフォルト: `2025-01-15`）
/// - `KLAVIYO_DEFAULT_LIST_ID`: list_id未指定時のリストID
/// - `KLAVIYO_PREFERENCE_PROPERTY`: 設定値を保存するプロパティ名
/// - `KLAVIYO_LOOKUP_PROPERTY`: 外部IDフォールバック検索用プロパティ名
#[derive(Clone)]
pub struct KlaviyoConfig {
    api_key: String,
    base_url: String,
    revision: String,
    default_list_id: Option<String>,
    preference_property: String,
    lookup_property: String,
}

impl std::fmt::Debug for KlaviyoConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // APIキーはログに出さない
        f.debug_struct("KlaviyoConfig")
            .field("base_url", &self.base_url)
            .field("revision", &self.revision)
            .field("default_list_id", &self.default_list_id)
            .field("preference_property", &self.preference_property)
            .field("lookup_property", &self.lookup_property)
            .finish_non_exhaustive()
    }
}

impl KlaviyoConfig {
    /// APIキーのみ指定し、その他はデフォルト値で作成
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
            revision: DEFAULT_REVISION.to_string(),
            default_list_id: None,
            preference_property: DEFAULT_PREFERENCE_PROPERTY.to_string(),
            lookup_property: DEFAULT_LOOKUP_PROPERTY.to_string(),
        }
    }

    /// ベースURLを設定
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// APIリビジョンを設定
    pub fn with_revision(mut self, revision: impl Into<String>) -> Self {
        self.revision = revision.into();
        self
    }

    /// デフォルトリストIDを設定
    pub fn with_default_list_id(mut self, list_id: impl Into<String>) -> Self {
        self.default_list_id = Some(list_id.into());
        self
    }

    /// 設定値プロパティ名を設定
    pub fn with_preference_property(mut self, property: impl Into<String>) -> Self {
        self.preference_property = property.into();
        self
    }

    /// フォールバック検索プロパティ名を設定
    pub fn with_lookup_property(mut self, property: impl Into<String>) -> Self {
        self.lookup_property = property.into();
        self
    }

    /// 環境変数から設定を読み込み
    ///
    /// # Returns
    /// - `Ok(KlaviyoConfig)`: 設定が正常に読み込まれた
    /// - `Err(KlaviyoConfigError::MissingEnvVar)`: `KLAVIYO_API_KEY` が未設定
    pub fn from_env() -> Result<Self, KlaviyoConfigError> {
        let api_key = optional_env(ENV_API_KEY)
            .ok_or_else(|| KlaviyoConfigError::MissingEnvVar(ENV_API_KEY.to_string()))?;

        Ok(Self::with_env_overrides(api_key))
    }

    /// 環境変数から設定を読み込み、APIキーが無ければSSMから取得
    ///
    /// `KLAVIYO_API_KEY` が設定されていればそれを優先する。
    /// 未設定かつ `KLAVIYO_API_KEY_SSM_PARAMETER` が設定されている場合、
    /// SSM Parameter Storeから復号して取得する。
    pub async fn from_env_with_ssm() -> Result<Self, KlaviyoConfigError> {
        if let Some(api_key) = optional_env(ENV_API_KEY) {
            return Ok(Self::with_env_overrides(api_key));
        }

        let parameter_name = optional_env(ENV_API_KEY_SSM_PARAMETER)
            .ok_or_else(|| KlaviyoConfigError::MissingEnvVar(ENV_API_KEY.to_string()))?;

        info!(parameter = %parameter_name, "SSMからKlaviyo APIキーを取得");
        let api_key = fetch_api_key_from_ssm(&parameter_name).await?;

        Ok(Self::with_env_overrides(api_key))
    }

    /// APIキー以外の任意設定を環境変数から反映
    fn with_env_overrides(api_key: String) -> Self {
        let mut config = Self::new(api_key);

        if let Some(base_url) = optional_env(ENV_BASE_URL) {
            config.base_url = base_url;
        }
        if let Some(revision) = optional_env(ENV_REVISION) {
            config.revision = revision;
        }
        config.default_list_id = optional_env(ENV_DEFAULT_LIST_ID);
        if let Some(property) = optional_env(ENV_PREFERENCE_PROPERTY) {
            config.preference_property = property;
        }
        if let Some(property) = optional_env(ENV_LOOKUP_PROPERTY) {
            config.lookup_property = property;
        }

        config
    }

    /// APIキーを取得
    pub fn api_key(&self) -> &str {
        &self.api_key
    }

    /// ベースURLを取得（末尾スラッシュなし）
    pub fn base_url(&self) -> &str {
        self.base_url.trim_end_matches('/')
    }

    /// APIリビジョンを取得
    pub fn revision(&self) -> &str {
        &self.revision
    }

    /// デフォルトリストIDを取得
    pub fn default_list_id(&self) -> Option<&str> {
        self.default_list_id.as_deref()
    }

    /// 設定値プロパティ名を取得
    pub fn preference_property(&self) -> &str {
        &self.preference_property
    }

    /// 設定更新日時プロパティ名を取得
    pub fn preference_updated_at_property(&self) -> String {
        format!("{}_updated_at", self.preference_property)
    }

    /// フォールバック検索プロパティ名を取得
    pub fn lookup_property(&self) -> &str {
        &self.lookup_property
    }
}

/// SSM Parameter StoreからAPIキーを復号して取得
async fn fetch_api_key_from_ssm(parameter_name: &str) -> Result<String, KlaviyoConfigError> {
    let aws_config = aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await;
    let client = SsmClient::new(&aws_config);

    let output = client
        .get_parameter()
        .name(parameter_name)
        .with_decryption(true)
        .send()
        .await
        .map_err(|e| KlaviyoConfigError::SsmError(e.into_service_error().to_string()))?;

    output
        .parameter()
        .and_then(|p| p.value())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .ok_or_else(|| {
            KlaviyoConfigError::SsmError(format!(
                "パラメータ {} に値がありません",
                parameter_name
            ))
        })
}
