//! Keycloak Admin API を使ったディレクトリ検索クライアント。
//!
//! ユーザー / グループの検索結果を [`ExternalAccount`] に正規化する。
//! グループの入れ子（subGroups）は明示的なスタックで深さ優先に展開し、
//! 各階層で先頭 [`MAX_SUBGROUPS_PER_LEVEL`] 件までしか辿らない。

use crate::config::ProviderConfig;
use crate::error::OidcProviderError;
use crate::oidc_client::truncate;
use crate::principal::PrincipalKind;
use crate::transport::build_http_client;
use serde::Deserialize;
use std::iter::Take;
use std::slice::Iter;
use tracing::{debug, error, warn};

/// 1 階層あたりに展開するサブグループの上限。
/// 不正・誤設定のディレクトリデータによる無制限な展開を防ぐための安全上限で、
/// これを超えるサブグループは黙って切り捨てる。
pub const MAX_SUBGROUPS_PER_LEVEL: usize = 100;

/// ExternalId はディレクトリのレコード ID。
/// 文字列（UUID）と数値のどちらも受け付け、文字列に正規化する。
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExternalId(pub String);

impl<'de> Deserialize<'de> for ExternalId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        use serde::de;

        struct ExternalIdVisitor;

        impl<'de> de::Visitor<'de> for ExternalIdVisitor {
            type Value = ExternalId;

            fn expecting(&self, formatter: &mut std::fmt::Formatter) -> std::fmt::Result {
                formatter.write_str("a string or integer id")
            }

            fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
            where
                E: de::Error,
            {
                if v.is_empty() {
                    return Err(E::custom("empty id"));
                }
                Ok(ExternalId(v.to_string()))
            }

            fn visit_u64<E>(self, v: u64) -> Result<Self::Value, E>
            where
                E: de::Error,
            {
                Ok(ExternalId(v.to_string()))
            }

            fn visit_i64<E>(self, v: i64) -> Result<Self::Value, E>
            where
                E: de::Error,
            {
                Ok(ExternalId(v.to_string()))
            }
        }

        deserializer.deserialize_any(ExternalIdVisitor)
    }
}

/// DirectoryUser は Keycloak Admin API のユーザー表現。
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DirectoryUser {
    pub id: ExternalId,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub email_verified: bool,
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
}

/// DirectoryGroup は Keycloak Admin API のグループ表現。
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DirectoryGroup {
    pub id: ExternalId,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub sub_groups: Vec<DirectoryGroup>,
}

/// ExternalAccount はディレクトリから取得したユーザーまたはグループのレコード。
/// `kind` はディレクトリのペイロードには含まれないため、正規化時に付与する。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExternalAccount {
    pub id: String,
    pub kind: PrincipalKind,
    pub email: String,
    pub username: String,
    pub enabled: bool,
    /// ユーザーでは名、グループではグループ名
    pub name: String,
    pub last_name: String,
}

impl From<DirectoryUser> for ExternalAccount {
    fn from(u: DirectoryUser) -> Self {
        Self {
            id: u.id.0,
            kind: PrincipalKind::User,
            email: u.email,
            username: u.username,
            enabled: u.enabled,
            name: u.first_name,
            last_name: u.last_name,
        }
    }
}

impl From<&DirectoryGroup> for ExternalAccount {
    fn from(g: &DirectoryGroup) -> Self {
        Self {
            id: g.id.0.clone(),
            kind: PrincipalKind::Group,
            email: String::new(),
            username: String::new(),
            enabled: true,
            name: g.name.clone(),
            last_name: String::new(),
        }
    }
}

/// グループのサブグループを深さ優先（行きがけ順）で平坦化する。
///
/// 再帰は使わず、階層ごとのイテレータをスタックに積んで辿る。
/// 各階層で先頭 [`MAX_SUBGROUPS_PER_LEVEL`] 件のみを訪問し、残りは子孫ごと捨てる。
pub fn flatten_subgroups(group: &DirectoryGroup) -> Vec<&DirectoryGroup> {
    let mut flattened = Vec::new();
    let mut stack: Vec<Take<Iter<'_, DirectoryGroup>>> =
        vec![group.sub_groups.iter().take(MAX_SUBGROUPS_PER_LEVEL)];

    while let Some(level) = stack.last_mut() {
        match level.next() {
            Some(sub) => {
                flattened.push(sub);
                stack.push(sub.sub_groups.iter().take(MAX_SUBGROUPS_PER_LEVEL));
            }
            None => {
                stack.pop();
            }
        }
    }

    flattened
}

/// issuer から Keycloak Admin API の検索ベース URL を導出する。
///
/// `https://host/auth/realms/foo` → `https://host/admin/realms/foo`
pub fn search_base_url(issuer: &str) -> Result<String, OidcProviderError> {
    const MARKER: &str = "/auth/";

    let (origin, realm_path) = issuer
        .split_once(MARKER)
        .ok_or_else(|| OidcProviderError::UrlDerivation(issuer.to_string()))?;
    let realm_path = realm_path.trim_end_matches('/');
    if origin.is_empty() || realm_path.is_empty() {
        return Err(OidcProviderError::UrlDerivation(issuer.to_string()));
    }

    Ok(format!("{origin}/admin/{realm_path}"))
}

/// DirectoryClient は 1 回の検索・取得の間だけ使う Keycloak Admin API クライアント。
pub struct DirectoryClient {
    http: reqwest::Client,
    base_url: String,
}

/// GET の結果。検索で 401 を空結果として扱うために区別する。
enum Fetched {
    Body(Vec<u8>),
    Unauthorized,
}

impl DirectoryClient {
    /// 設定の issuer と mTLS 証明書からクライアントを生成する。
    pub fn from_config(config: &ProviderConfig) -> Result<Self, OidcProviderError> {
        let base_url = search_base_url(&config.issuer)?;
        let http = build_http_client(config)?;
        Ok(Self { http, base_url })
    }

    /// 既存の HTTP クライアントとベース URL からクライアントを生成する。
    pub fn with_http_client(http: reqwest::Client, base_url: &str) -> Self {
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    /// 検索語に一致するユーザー / グループを取得する。
    ///
    /// `kind` が `None` の場合は両方を検索する。
    /// ディレクトリが 401 を返した場合はエラーではなく空の結果を返す。
    ///
    /// サブグループの展開には 2 つの上限がある。各階層は先頭
    /// [`MAX_SUBGROUPS_PER_LEVEL`] 件まで。深さは serde_json の再帰上限（128）で
    /// 制限され、1 階層がオブジェクトと配列の 2 段を消費するため、およそ 63 階層を
    /// 超えるレスポンスは `DirectoryDecode` になる。
    pub async fn search_principals(
        &self,
        term: &str,
        kind: Option<PrincipalKind>,
        access_token: &str,
    ) -> Result<Vec<ExternalAccount>, OidcProviderError> {
        let mut accounts = Vec::new();
        let term = urlencoding::encode(term);

        if kind.is_none() || kind == Some(PrincipalKind::User) {
            let url = format!("{}/users?search={}", self.base_url, term);
            let body = match self.get(&url, access_token).await? {
                Fetched::Body(body) => body,
                Fetched::Unauthorized => return Ok(Vec::new()),
            };
            let users: Vec<DirectoryUser> = decode(&url, &body)?;
            accounts.extend(users.into_iter().map(ExternalAccount::from));
        }

        if kind.is_none() || kind == Some(PrincipalKind::Group) {
            let url = format!("{}/groups?search={}", self.base_url, term);
            let body = match self.get(&url, access_token).await? {
                Fetched::Body(body) => body,
                Fetched::Unauthorized => return Ok(Vec::new()),
            };
            let groups: Vec<DirectoryGroup> = decode(&url, &body)?;
            for group in &groups {
                accounts.push(ExternalAccount::from(group));
                accounts.extend(flatten_subgroups(group).into_iter().map(ExternalAccount::from));
            }
        }

        debug!(
            base_url = %self.base_url,
            count = accounts.len(),
            "ディレクトリ検索が完了しました"
        );
        Ok(accounts)
    }

    /// ID を指定してユーザーまたはグループを 1 件取得する。
    pub async fn get_by_id(
        &self,
        external_id: &str,
        kind: PrincipalKind,
        access_token: &str,
    ) -> Result<ExternalAccount, OidcProviderError> {
        let collection = match kind {
            PrincipalKind::User => "users",
            PrincipalKind::Group => "groups",
        };
        let url = format!(
            "{}/{}/{}",
            self.base_url,
            collection,
            urlencoding::encode(external_id)
        );

        let body = match self.get(&url, access_token).await? {
            Fetched::Body(body) => body,
            Fetched::Unauthorized => {
                return Err(OidcProviderError::DirectoryRequest {
                    status: reqwest::StatusCode::UNAUTHORIZED.as_u16(),
                    url,
                    body: String::new(),
                })
            }
        };

        match kind {
            PrincipalKind::User => decode::<DirectoryUser>(&url, &body).map(ExternalAccount::from),
            PrincipalKind::Group => {
                decode::<DirectoryGroup>(&url, &body).map(|g| ExternalAccount::from(&g))
            }
        }
    }

    async fn get(&self, url: &str, access_token: &str) -> Result<Fetched, OidcProviderError> {
        let resp = self
            .http
            .get(url)
            .bearer_auth(access_token)
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await
            .map_err(|e| {
                error!(url = %url, error = %e, "ディレクトリへのリクエストに失敗しました");
                OidcProviderError::DirectoryUnavailable {
                    url: url.to_string(),
                    message: e.to_string(),
                }
            })?;

        let status = resp.status();
        if status == reqwest::StatusCode::UNAUTHORIZED {
            warn!(url = %url, "ディレクトリが 401 を返しました");
            return Ok(Fetched::Unauthorized);
        }

        let body = resp
            .bytes()
            .await
            .map_err(|e| OidcProviderError::DirectoryUnavailable {
                url: url.to_string(),
                message: e.to_string(),
            })?
            .to_vec();

        if !status.is_success() {
            let body = String::from_utf8_lossy(&body);
            error!(url = %url, status = %status, "ディレクトリがエラーを返しました");
            return Err(OidcProviderError::DirectoryRequest {
                status: status.as_u16(),
                url: url.to_string(),
                body: truncate(&body, 1024).to_string(),
            });
        }

        Ok(Fetched::Body(body))
    }
}

fn decode<T: serde::de::DeserializeOwned>(url: &str, body: &[u8]) -> Result<T, OidcProviderError> {
    serde_json::from_slice(body).map_err(|e| {
        error!(url = %url, error = %e, "ディレクトリのレスポンス解析に失敗しました");
        OidcProviderError::DirectoryDecode {
            url: url.to_string(),
            message: e.to_string(),
        }
    })
}
