// 購読・購読解除リクエスト
//
// ストアフロントから受け取る購読系リクエストの型と入力検証を提供する。

use super::marketing_preference::MarketingPreference;
use super::profile::normalize_optional;
use serde::Deserialize;
use thiserror::Error;

/// 入力検証エラー
///
/// メッセージはそのままストアフロントへ返却される。
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum InputError {
    /// 必須フィールドが未指定
    #[error("{0} is required")]
    MissingField(&'static str),

    /// メールアドレス形式が不正
    #[error("invalid email address: {0}")]
    InvalidEmail(String),

    /// マーケティング設定値が不正
    #[error("invalid preference: {0} (expected menswear, womenswear, both or no_preference)")]
    InvalidPreference(String),

    /// プロフィールIDに使用できない文字を含む
    #[error("invalid profile_id: {0}")]
    InvalidProfileId(String),
}

/// メールアドレスの最低限の形式チェック
///
/// 空白を含まず、`@` がちょうど1つ、ローカル部とドメイン部が空でなく、
/// ドメイン部にドットを含む（先頭・末尾を除く）こと。
pub fn is_valid_email(email: &str) -> bool {
    if email.chars().any(char::is_whitespace) {
        return false;
    }

    let mut parts = email.split('@');
    let (Some(local), Some(domain), None) = (parts.next(), parts.next(), parts.next()) else {
        return false;
    };

    !local.is_empty()
        && domain.contains('.')
        && !domain.starts_with('.')
        && !domain.ends_with('.')
}

/// 必須のメールアドレスを検証して返す
pub fn require_email(email: Option<String>) -> Result<String, InputError> {
    let email = normalize_optional(email).ok_or(InputError::MissingField("email"))?;
    if !is_valid_email(&email) {
        return Err(InputError::InvalidEmail(email));
    }
    Ok(email)
}

/// 任意のマーケティング設定文字列を検証する
pub fn parse_preference(value: Option<String>) -> Result<Option<MarketingPreference>, InputError> {
    normalize_optional(value)
        .map(|v| v.parse().map_err(|_| InputError::InvalidPreference(v)))
        .transpose()
}

/// 購読リクエスト（POST subscribe のボディ）
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SubscribeRequest {
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub list_id: Option<String>,
    #[serde(default)]
    pub phone_number: Option<String>,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub preference: Option<String>,
    /// SMSマーケティングにも同意するか（phone_number必須）
    #[serde(default)]
    pub sms_consent: bool,
    /// Klaviyo側に記録する流入元
    #[serde(default)]
    pub custom_source: Option<String>,
}

/// 検証済み購読内容
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subscription {
    pub email: String,
    pub list_id: String,
    pub phone_number: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub preference: Option<MarketingPreference>,
    pub sms_consent: bool,
    pub custom_source: Option<String>,
}

impl Subscription {
    /// プロフィール属性の事前登録（profile-import）が必要か
    pub fn needs_profile_import(&self) -> bool {
        self.first_name.is_some() || self.last_name.is_some() || self.preference.is_some()
    }

    /// SMS同意を送信するか
    pub fn subscribes_sms(&self) -> bool {
        self.sms_consent && self.phone_number.is_some()
    }
}

impl SubscribeRequest {
    /// 入力を検証して購読内容に変換
    ///
    /// # Arguments
    /// * `default_list_id` - `list_id` 未指定時に使用するリストID
    pub fn validate(self, default_list_id: Option<&str>) -> Result<Subscription, InputError> {
        let email = require_email(self.email)?;
        let list_id = normalize_optional(self.list_id)
            .or_else(|| default_list_id.map(str::to_string))
            .ok_or(InputError::MissingField("list_id"))?;
        let preference = parse_preference(self.preference)?;

        Ok(Subscription {
            email,
            list_id,
            phone_number: normalize_optional(self.phone_number),
            first_name: normalize_optional(self.first_name),
            last_name: normalize_optional(self.last_name),
            preference,
            sms_consent: self.sms_consent,
            custom_source: normalize_optional(self.custom_source),
        })
    }
}

/// 購読解除リクエスト（POST unsubscribe のボディ）
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UnsubscribeRequest {
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub list_id: Option<String>,
}

/// 検証済み購読解除内容
///
/// `list_id` が`None`の場合はマーケティング全体からの購読解除となる。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Unsubscription {
    pub email: String,
    pub list_id: Option<String>,
}

impl UnsubscribeRequest {
    /// 入力を検証して購読解除内容に変換
    pub fn validate(self, default_list_id: Option<&str>) -> Result<Unsubscription, InputError> {
        let email = require_email(self.email)?;
        let list_id =
            normalize_optional(self.list_id).or_else(|| default_list_id.map(str::to_string));

        Ok(Unsubscription { email, list_id })
    }
}
