// ドメイン層モジュール
pub mod api_envelope;
pub mod mailing_list;
pub mod marketing_preference;
pub mod profile;
pub mod subscription;

// 再エクスポート
pub use api_envelope::ApiEnvelope;
pub use mailing_list::{MailingList, MailingListPage};
pub use marketing_preference::{MarketingPreference, PreferenceParseError};
pub use profile::{Profile, ProfileIdentifier, ProfileUpdate};
pub use subscription::{
    InputError, SubscribeRequest, Subscription, UnsubscribeRequest, Unsubscription,
};
