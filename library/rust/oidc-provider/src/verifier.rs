//! ID トークン検証器: プロバイダーの JWKS から公開鍵を取得し、JWT を検証する。

use crate::error::OidcProviderError;
use jsonwebtoken::{decode, decode_header, Algorithm, DecodingKey, Validation};
use serde::Deserialize;

/// JWKS レスポンスの構造体。
#[derive(Debug, Clone, Deserialize)]
struct JwksResponse {
    keys: Vec<Jwk>,
}

/// 個々の JWK 鍵。RSA 以外の鍵は n / e を持たないため省略可能にする。
#[derive(Debug, Clone, Deserialize)]
struct Jwk {
    #[serde(default)]
    kid: Option<String>,
    kty: String,
    #[serde(default)]
    n: Option<String>,
    #[serde(default)]
    e: Option<String>,
}

/// JwkKey は検証に使用する RSA 公開鍵の情報。
#[derive(Debug, Clone)]
pub struct JwkKey {
    pub kid: Option<String>,
    pub n: String,
    pub e: String,
}

/// TokenVerifier はクライアント ID にバインドされた ID トークン検証器。
/// 検証の結果得られた Claims は呼び出し側で利用しない。
pub struct TokenVerifier<'a> {
    http: &'a reqwest::Client,
    jwks_uri: String,
    issuer: String,
    client_id: String,
}

impl<'a> TokenVerifier<'a> {
    pub fn new(http: &'a reqwest::Client, jwks_uri: &str, issuer: &str, client_id: &str) -> Self {
        Self {
            http,
            jwks_uri: jwks_uri.to_string(),
            issuer: issuer.to_string(),
            client_id: client_id.to_string(),
        }
    }

    /// JWT の署名・issuer・オーディエンス・有効期限を検証する。
    pub async fn verify(&self, raw_token: &str) -> Result<serde_json::Value, OidcProviderError> {
        let header = decode_header(raw_token)
            .map_err(|e| OidcProviderError::TokenVerification(e.to_string()))?;

        if !matches!(
            header.alg,
            Algorithm::RS256
                | Algorithm::RS384
                | Algorithm::RS512
                | Algorithm::PS256
                | Algorithm::PS384
                | Algorithm::PS512
        ) {
            return Err(OidcProviderError::TokenVerification(format!(
                "unsupported signing algorithm: {:?}",
                header.alg
            )));
        }

        let keys = self.fetch_keys().await?;
        let jwk = select_key(&keys, header.kid.as_deref())?;

        let key = DecodingKey::from_rsa_components(&jwk.n, &jwk.e)
            .map_err(|e| OidcProviderError::TokenVerification(e.to_string()))?;

        let mut validation = Validation::new(header.alg);
        validation.set_issuer(&[&self.issuer]);
        validation.set_audience(&[&self.client_id]);

        let data = decode::<serde_json::Value>(raw_token, &key, &validation)
            .map_err(|e| OidcProviderError::TokenVerification(e.to_string()))?;

        Ok(data.claims)
    }

    /// JWKS エンドポイントから RSA 公開鍵を取得する。
    async fn fetch_keys(&self) -> Result<Vec<JwkKey>, OidcProviderError> {
        let resp = self
            .http
            .get(&self.jwks_uri)
            .send()
            .await
            .map_err(|e| OidcProviderError::TokenVerification(format!("JWKS fetch failed: {e}")))?;

        if !resp.status().is_success() {
            return Err(OidcProviderError::TokenVerification(format!(
                "JWKS fetch failed with status {}",
                resp.status()
            )));
        }

        let jwks: JwksResponse = resp
            .json()
            .await
            .map_err(|e| OidcProviderError::TokenVerification(format!("invalid JWKS: {e}")))?;

        Ok(jwks
            .keys
            .into_iter()
            .filter(|k| k.kty == "RSA")
            .filter_map(|k| match (k.n, k.e) {
                (Some(n), Some(e)) => Some(JwkKey { kid: k.kid, n, e }),
                _ => None,
            })
            .collect())
    }
}

/// kid に一致する鍵を選ぶ。kid が無いトークンは鍵が 1 つだけの場合に限りその鍵を使う。
fn select_key<'k>(keys: &'k [JwkKey], kid: Option<&str>) -> Result<&'k JwkKey, OidcProviderError> {
    match kid {
        Some(kid) => keys
            .iter()
            .find(|k| k.kid.as_deref() == Some(kid))
            .ok_or_else(|| OidcProviderError::TokenVerification(format!("unknown kid: {kid}"))),
        None => match keys {
            [only] => Ok(only),
            _ => Err(OidcProviderError::TokenVerification(
                "missing kid in header".into(),
            )),
        },
    }
}
