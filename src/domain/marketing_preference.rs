// マーケティング設定（メンズ/ウィメンズ）
//
// ストアフロントUIの選択肢と、Klaviyoプロフィールの自由記述プロパティに
// 保存する文字列表現との相互変換を行う。

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// メンズウェアを表すタグ
pub const MENSWEAR_TAG: &str = "menswear";

/// ウィメンズウェアを表すタグ
pub const WOMENSWEAR_TAG: &str = "womenswear";

/// 設定なしを表すタグ
pub const NO_PREFERENCE_TAG: &str = "no_preference";

/// 保存時のタグ区切り文字
const TAG_SEPARATOR: &str = ",";

/// マーケティング設定値の解析エラー
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PreferenceParseError {
    /// 未知の設定値
    #[error("不明なマーケティング設定値です: {0}")]
    Unknown(String),
}

/// マーケティング設定
///
/// UIでは4択の列挙値として扱い、Klaviyo側ではタグのカンマ区切り文字列として保存する。
///
/// | 列挙値 | 保存文字列 |
/// |---|---|
/// | `Menswear` | `menswear` |
/// | `Womenswear` | `womenswear` |
/// | `Both` | `menswear,womenswear` |
/// | `NoPreference` | `no_preference` |
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum MarketingPreference {
    Menswear,
    Womenswear,
    Both,
    #[default]
    NoPreference,
}

/// 単一トークンの分類結果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Tag {
    Menswear,
    Womenswear,
    Both,
    NoPreference,
}

/// トークン1つをタグに分類する（大文字小文字・前後空白は無視）
fn classify_token(token: &str) -> Option<Tag> {
    match token.trim().to_ascii_lowercase().as_str() {
        "menswear" | "mens" | "men" => Some(Tag::Menswear),
        "womenswear" | "womens" | "women" => Some(Tag::Womenswear),
        "both" => Some(Tag::Both),
        "no_preference" | "none" => Some(Tag::NoPreference),
        _ => None,
    }
}

impl MarketingPreference {
    /// 全バリアント
    pub const ALL: [MarketingPreference; 4] = [
        MarketingPreference::Menswear,
        MarketingPreference::Womenswear,
        MarketingPreference::Both,
        MarketingPreference::NoPreference,
    ];

    /// UI向けの識別子
    pub fn as_str(&self) -> &'static str {
        match self {
            MarketingPreference::Menswear => MENSWEAR_TAG,
            MarketingPreference::Womenswear => WOMENSWEAR_TAG,
            MarketingPreference::Both => "both",
            MarketingPreference::NoPreference => NO_PREFERENCE_TAG,
        }
    }

    /// プロフィールプロパティに保存する文字列へ変換
    pub fn encode(&self) -> String {
        match self {
            MarketingPreference::Menswear => MENSWEAR_TAG.to_string(),
            MarketingPreference::Womenswear => WOMENSWEAR_TAG.to_string(),
            MarketingPreference::Both => [MENSWEAR_TAG, WOMENSWEAR_TAG].join(TAG_SEPARATOR),
            MarketingPreference::NoPreference => NO_PREFERENCE_TAG.to_string(),
        }
    }

    /// 保存済み文字列から設定を復元
    ///
    /// `,` `;` `|` 空白で分割したトークン単位で判定するため、
    /// `womenswear` が `menswear` として誤判定されることはない。
    /// 解釈できない値はすべて`NoPreference`になる。
    pub fn parse_stored(stored: &str) -> Self {
        let mut mens = false;
        let mut womens = false;

        for token in stored.split(|c: char| c == ',' || c == ';' || c == '|' || c.is_whitespace()) {
            match classify_token(token) {
                Some(Tag::Menswear) => mens = true,
                Some(Tag::Womenswear) => womens = true,
                Some(Tag::Both) => {
                    mens = true;
                    womens = true;
                }
                Some(Tag::NoPreference) | None => {}
            }
        }

        match (mens, womens) {
            (true, true) => MarketingPreference::Both,
            (true, false) => MarketingPreference::Menswear,
            (false, true) => MarketingPreference::Womenswear,
            (false, false) => MarketingPreference::NoPreference,
        }
    }

    /// プロフィールプロパティのJSON値から設定を復元
    ///
    /// 文字列以外（未設定、数値など）は`NoPreference`として扱う。
    pub fn from_property(value: Option<&serde_json::Value>) -> Self {
        value
            .and_then(|v| v.as_str())
            .map(Self::parse_stored)
            .unwrap_or_default()
    }
}

impl fmt::Display for MarketingPreference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// UIからの入力値を厳密に解析する
impl FromStr for MarketingPreference {
    type Err = PreferenceParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match classify_token(s) {
            Some(Tag::Menswear) => Ok(MarketingPreference::Menswear),
            Some(Tag::Womenswear) => Ok(MarketingPreference::Womenswear),
            Some(Tag::Both) => Ok(MarketingPreference::Both),
            Some(Tag::NoPreference) => Ok(MarketingPreference::NoPreference),
            None => Err(PreferenceParseError::Unknown(s.to_string())),
        }
    }
}
