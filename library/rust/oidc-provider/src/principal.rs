//! プリンシパル（ユーザー / グループの正規化された ID 表現）。
//!
//! プリンシパル ID は `<provider>_<kind>://<external_id>` 形式の文字列で、
//! [`parse_principal_id`] により `(kind, external_id)` へ可逆に戻せる。

use crate::error::OidcProviderError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// PrincipalKind はプリンシパルの種別を表す。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PrincipalKind {
    User,
    Group,
}

impl PrincipalKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Group => "group",
        }
    }
}

impl fmt::Display for PrincipalKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PrincipalKind {
    type Err = OidcProviderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(Self::User),
            "group" => Ok(Self::Group),
            other => Err(OidcProviderError::InvalidPrincipalId(format!(
                "unknown principal kind: {other}"
            ))),
        }
    }
}

/// Principal はリクエスト単位で生成されるユーザーまたはグループの ID。
/// 永続化はせず、生成後は変更しない。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Principal {
    /// `<provider>_<kind>://<external_id>` 形式の ID
    pub id: String,

    pub kind: PrincipalKind,

    /// プリンシパルを発行したプロバイダー名
    pub provider: String,

    pub display_name: String,

    /// グループでは空文字
    #[serde(default)]
    pub login_name: String,

    /// 呼び出し元自身を表すか
    #[serde(default)]
    pub is_self: bool,

    /// 呼び出し元が所属するグループか
    #[serde(default)]
    pub is_member_of: bool,
}

impl Principal {
    /// ユーザープリンシパルを生成する。
    pub fn user(
        provider: &str,
        external_id: &str,
        display_name: impl Into<String>,
        login_name: impl Into<String>,
    ) -> Self {
        Self {
            id: format_principal_id(provider, PrincipalKind::User, external_id),
            kind: PrincipalKind::User,
            provider: provider.to_string(),
            display_name: display_name.into(),
            login_name: login_name.into(),
            is_self: false,
            is_member_of: false,
        }
    }

    /// グループプリンシパルを生成する。
    pub fn group(provider: &str, external_id: &str, display_name: impl Into<String>) -> Self {
        Self {
            id: format_principal_id(provider, PrincipalKind::Group, external_id),
            kind: PrincipalKind::Group,
            provider: provider.to_string(),
            display_name: display_name.into(),
            login_name: String::new(),
            is_self: false,
            is_member_of: false,
        }
    }

    pub fn with_self(mut self, is_self: bool) -> Self {
        self.is_self = is_self;
        self
    }

    pub fn with_member_of(mut self, is_member_of: bool) -> Self {
        self.is_member_of = is_member_of;
        self
    }
}

/// プリンシパル ID を組み立てる。
pub fn format_principal_id(provider: &str, kind: PrincipalKind, external_id: &str) -> String {
    format!("{provider}_{kind}://{external_id}")
}

/// プリンシパル ID を `(kind, external_id)` に分解する。
///
/// 最初の `:` で分割したあと、左側を最初の `_` で分割する。
/// どちらかが空でない 2 要素にならない場合、または種別が user / group 以外の場合は
/// `InvalidPrincipalId` を返す。
pub fn parse_principal_id(id: &str) -> Result<(PrincipalKind, String), OidcProviderError> {
    let invalid = || OidcProviderError::InvalidPrincipalId(id.to_string());

    let (scheme, rest) = id.split_once(':').ok_or_else(invalid)?;
    let external_id = rest.strip_prefix("//").unwrap_or(rest);
    if scheme.is_empty() || external_id.is_empty() {
        return Err(invalid());
    }

    let (provider, kind) = scheme.split_once('_').ok_or_else(invalid)?;
    if provider.is_empty() || kind.is_empty() {
        return Err(invalid());
    }

    let kind = kind.parse::<PrincipalKind>().map_err(|_| invalid())?;
    Ok((kind, external_id.to_string()))
}
