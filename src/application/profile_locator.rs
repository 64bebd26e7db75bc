// プロフィール検索
//
// 識別子からKlaviyoプロフィールを特定する。
// profile_id → email → external_id → カスタムプロパティ の順に問い合わせ、
// 最初に見つかったプロフィールを返す。

use super::endpoint::HandlerError;
use crate::domain::profile::is_valid_profile_id;
use crate::domain::{Profile, ProfileIdentifier};
use crate::infrastructure::klaviyo_request::{self, equals_filter, property_field};
use crate::infrastructure::{KlaviyoApi, KlaviyoConfig, KlaviyoError, KlaviyoRequest};
use tracing::{debug, info};

/// プロフィール検索
pub struct ProfileLocator<'a, A: KlaviyoApi> {
    api: &'a A,
    config: &'a KlaviyoConfig,
}

impl<'a, A: KlaviyoApi> ProfileLocator<'a, A> {
    pub fn new(api: &'a A, config: &'a KlaviyoConfig) -> Self {
        Self { api, config }
    }

    /// 識別子からプロフィールを検索
    ///
    /// # Returns
    /// * `Ok(Some(profile))` - 見つかった
    /// * `Ok(None)` - どの手段でも見つからない
    /// * `Err(KlaviyoError)` - Klaviyo APIエラー（ID指定取得の404は除く）
    ///
    /// 形式が不正な`profile_id`はKlaviyoへ送信せず、見つからなかったものとして扱う。
    pub async fn find(
        &self,
        identifier: &ProfileIdentifier,
    ) -> Result<Option<Profile>, KlaviyoError> {
        if let Some(profile_id) = &identifier.profile_id {
            if let Some(profile) = self.find_by_id(profile_id).await? {
                return Ok(Some(profile));
            }
        }

        if let Some(email) = &identifier.email {
            if let Some(profile) = self.find_first(equals_filter("email", email)).await? {
                return Ok(Some(profile));
            }
        }

        if let Some(external_id) = &identifier.external_id {
            let filter = equals_filter("external_id", external_id);
            if let Some(profile) = self.find_first(filter).await? {
                return Ok(Some(profile));
            }

            // external_id未設定の顧客はカスタムプロパティで検索
            debug!(
                lookup_property = self.config.lookup_property(),
                "external_idで見つからないためカスタムプロパティで再検索"
            );
            let field = property_field(self.config.lookup_property());
            if let Some(profile) = self.find_first(equals_filter(&field, external_id)).await? {
                return Ok(Some(profile));
            }
        }

        Ok(None)
    }

    /// 識別子からプロフィールを取得（見つからなければ404）
    ///
    /// 識別子が1つも無い場合、または`profile_id`の形式が不正な場合は400。
    pub async fn require(&self, identifier: &ProfileIdentifier) -> Result<Profile, HandlerError> {
        if identifier.is_empty() {
            return Err(HandlerError::BadRequest(
                "one of profile_id, email or external_id is required".to_string(),
            ));
        }
        identifier.validate()?;

        match self.find(identifier).await? {
            Some(profile) => {
                info!(profile_id = %profile.id, "プロフィールを特定");
                Ok(profile)
            }
            None => Err(HandlerError::NotFound("profile not found".to_string())),
        }
    }

    /// ID指定で取得（404はNone）
    async fn find_by_id(&self, profile_id: &str) -> Result<Option<Profile>, KlaviyoError> {
        if !is_valid_profile_id(profile_id) {
            debug!("形式が不正なprofile_idのため検索をスキップ");
            return Ok(None);
        }

        match self.api.send(klaviyo_request::get_profile(profile_id)).await {
            Ok(body) => Ok(body
                .as_ref()
                .and_then(|b| b.get("data"))
                .and_then(|data| Profile::from_resource(data, self.config.preference_property()))),
            Err(err) if err.is_not_found() => Ok(None),
            Err(err) => Err(err),
        }
    }

    /// フィルター検索の先頭要素を取得
    async fn find_first(&self, filter: String) -> Result<Option<Profile>, KlaviyoError> {
        let request: KlaviyoRequest = klaviyo_request::find_profiles(filter);
        let body = self.api.send(request).await?;

        Ok(body
            .as_ref()
            .and_then(|b| b.get("data"))
            .and_then(|data| data.as_array())
            .and_then(|items| items.first())
            .and_then(|item| Profile::from_resource(item, self.config.preference_property())))
    }
}
