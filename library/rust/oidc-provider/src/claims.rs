//! UserInfo エンドポイントの Claims 構造体。

use crate::error::OidcProviderError;
use serde::Deserialize;

/// Claims は UserInfo レスポンスをデコードした結果を表す。ログインごとに生成する。
///
/// `sub` は必須。その他の項目は省略可能だが、型が一致しない場合はデコードエラーにする。
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct Claims {
    /// ユーザーの一意識別子
    pub sub: String,

    #[serde(default)]
    pub name: Option<String>,

    #[serde(default)]
    pub preferred_username: Option<String>,

    #[serde(default)]
    pub given_name: Option<String>,

    #[serde(default)]
    pub family_name: Option<String>,

    #[serde(default)]
    pub email: Option<String>,

    #[serde(default)]
    pub email_verified: Option<bool>,

    /// 所属グループ名の一覧
    #[serde(default)]
    pub groups: Vec<String>,
}

impl Claims {
    /// UserInfo レスポンスボディを Claims にデコードする。
    /// `sub` が空の場合はプリンシパル ID を組み立てられないためエラーにする。
    pub fn from_slice(body: &[u8]) -> Result<Self, OidcProviderError> {
        let claims: Self = serde_json::from_slice(body)
            .map_err(|e| OidcProviderError::ClaimDecode(e.to_string()))?;
        if claims.sub.trim().is_empty() {
            return Err(OidcProviderError::ClaimDecode("empty sub claim".to_string()));
        }
        Ok(claims)
    }

    /// 表示名を返す。name が空の場合は email にフォールバックする。
    pub fn display_name(&self) -> &str {
        match self.name.as_deref() {
            Some(name) if !name.is_empty() => name,
            _ => self.email(),
        }
    }

    pub fn email(&self) -> &str {
        self.email.as_deref().unwrap_or_default()
    }
}

impl std::fmt::Display for Claims {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Claims{{sub={}, username={:?}, email={:?}, groups={}}}",
            self.sub,
            self.preferred_username,
            self.email,
            self.groups.len(),
        )
    }
}
