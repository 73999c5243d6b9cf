//! OIDC プロトコルクライアント: ディスカバリー、認可コード交換、UserInfo 取得。

use crate::claims::Claims;
use crate::config::ProviderConfig;
use crate::error::OidcProviderError;
use crate::verifier::TokenVerifier;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use tracing::{debug, error};

/// ProviderMetadata は `.well-known/openid-configuration` から取得したエンドポイント。
#[derive(Debug, Clone, Deserialize)]
pub struct ProviderMetadata {
    pub issuer: String,
    pub authorization_endpoint: String,
    pub token_endpoint: String,
    #[serde(default)]
    pub userinfo_endpoint: Option<String>,
    pub jwks_uri: String,
}

/// TokenResponse はトークンエンドポイントのレスポンス。
/// トークンは SecretString で保持し、Debug 出力に含めない。
#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    #[serde(default)]
    pub access_token: Option<SecretString>,
    #[serde(default)]
    pub id_token: Option<SecretString>,
    #[serde(default)]
    pub token_type: Option<String>,
    #[serde(default)]
    pub refresh_token: Option<SecretString>,
    #[serde(default)]
    pub expires_in: Option<u64>,
}

impl TokenResponse {
    /// 空でないアクセストークンを返す。
    pub fn access_token(&self) -> Option<&str> {
        non_empty(self.access_token.as_ref())
    }

    /// 検証対象のトークンを返す。ID トークンが無い場合はアクセストークンを使う。
    pub fn verifiable_token(&self) -> Option<&str> {
        non_empty(self.id_token.as_ref()).or_else(|| self.access_token())
    }
}

fn non_empty(token: Option<&SecretString>) -> Option<&str> {
    token
        .map(|t| t.expose_secret().as_str())
        .filter(|t| !t.is_empty())
}

/// OidcClient は 1 回のログイン処理の間だけ使う OIDC クライアント。
pub struct OidcClient {
    http: reqwest::Client,
    metadata: ProviderMetadata,
}

impl OidcClient {
    /// issuer に対してディスカバリーを行い、クライアントを生成する。
    /// 失敗してもここではリトライしない。
    pub async fn discover(http: reqwest::Client, issuer: &str) -> Result<Self, OidcProviderError> {
        let issuer = issuer.trim_end_matches('/');
        let well_known = format!("{issuer}/.well-known/openid-configuration");
        let discovery_error = |message: String| OidcProviderError::Discovery {
            issuer: issuer.to_string(),
            message,
        };

        debug!(issuer = %issuer, "OIDC ディスカバリーを実行します");

        let resp = http
            .get(&well_known)
            .send()
            .await
            .map_err(|e| discovery_error(e.to_string()))?;

        if !resp.status().is_success() {
            return Err(discovery_error(format!(
                "discovery endpoint returned {}",
                resp.status()
            )));
        }

        let metadata: ProviderMetadata = resp
            .json()
            .await
            .map_err(|e| discovery_error(format!("invalid provider metadata: {e}")))?;

        if metadata.issuer.trim_end_matches('/') != issuer {
            return Err(discovery_error(format!(
                "issuer did not match the issuer returned by provider: {}",
                metadata.issuer
            )));
        }

        Ok(Self { http, metadata })
    }

    /// 認可コードをトークンと交換する。
    /// 一部のプロバイダーに合わせ、スコープを追加パラメータとして明示的に送る。
    pub async fn exchange_code(
        &self,
        config: &ProviderConfig,
        code: &str,
        scopes: &[String],
    ) -> Result<TokenResponse, OidcProviderError> {
        let scope = scopes.join(" ");
        let params = [
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", config.redirect_url.as_str()),
            ("client_id", config.client_id.as_str()),
            ("client_secret", config.client_secret.expose_secret().as_str()),
            ("scope", scope.as_str()),
        ];

        let resp = self
            .http
            .post(&self.metadata.token_endpoint)
            .form(&params)
            .send()
            .await
            .map_err(|e| {
                error!(error = %e, "トークンエンドポイントへの HTTP リクエストに失敗しました");
                OidcProviderError::TokenExchange(e.to_string())
            })?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            error!(
                token_endpoint = %self.metadata.token_endpoint,
                status = %status,
                body = %truncate(&body, 500),
                "トークン交換に失敗しました"
            );
            return Err(OidcProviderError::TokenExchange(format!(
                "token endpoint returned HTTP {status}"
            )));
        }

        resp.json().await.map_err(|e| {
            error!(error = %e, "トークンレスポンスの解析に失敗しました");
            OidcProviderError::TokenExchange(format!("invalid token response: {e}"))
        })
    }

    /// クライアント ID にバインドした検証器でトークンを検証する。
    pub async fn verify(
        &self,
        raw_token: &str,
        client_id: &str,
    ) -> Result<serde_json::Value, OidcProviderError> {
        TokenVerifier::new(
            &self.http,
            &self.metadata.jwks_uri,
            &self.metadata.issuer,
            client_id,
        )
        .verify(raw_token)
        .await
    }

    /// アクセストークンで UserInfo を取得し、Claims にデコードする。
    pub async fn user_info(&self, access_token: &str) -> Result<Claims, OidcProviderError> {
        let endpoint = self.metadata.userinfo_endpoint.as_deref().ok_or_else(|| {
            OidcProviderError::UserInfo("user info endpoint is not supported by this provider".into())
        })?;

        let resp = self
            .http
            .get(endpoint)
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(|e| OidcProviderError::UserInfo(e.to_string()))?;

        if !resp.status().is_success() {
            return Err(OidcProviderError::UserInfo(format!(
                "userinfo endpoint returned HTTP {}",
                resp.status()
            )));
        }

        let body = resp
            .bytes()
            .await
            .map_err(|e| OidcProviderError::UserInfo(e.to_string()))?;
        Claims::from_slice(&body)
    }
}

/// ログ出力用に UTF-8 境界を守って文字列を切り詰める。
pub(crate) fn truncate(s: &str, max: usize) -> &str {
    if s.len() <= max {
        return s;
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}
