//! 結合テスト共通: wiremock による IdP / ディレクトリのモックと、テスト用 JWT の生成。

#![allow(dead_code)]

use std::sync::{Arc, OnceLock};
use std::time::{SystemTime, UNIX_EPOCH};

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use rand::rngs::OsRng;
use rsa::pkcs1::EncodeRsaPrivateKey;
use rsa::traits::PublicKeyParts;
use rsa::RsaPrivateKey;
use serde::Serialize;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use k1s0_oidc_provider::{
    AllowListAccessChecker, ConfigService, InMemoryConfigStore, InMemorySecretStore,
    OidcProvider, ProviderConfig, TokenGroupMembership,
};

pub const REALM_PATH: &str = "/auth/realms/k1s0";
pub const ADMIN_PATH: &str = "/admin/realms/k1s0";
pub const CLIENT_ID: &str = "k1s0-control-plane";
pub const CLIENT_SECRET: &str = "s3cr3t";
pub const KID: &str = "test-key-1";
pub const ACCESS_TOKEN: &str = "provider-access-token";

/// テスト用 RSA 鍵。生成が重いためテストバイナリ内で 1 度だけ生成する。
pub fn signing_key() -> &'static RsaPrivateKey {
    static KEY: OnceLock<RsaPrivateKey> = OnceLock::new();
    KEY.get_or_init(|| RsaPrivateKey::new(&mut OsRng, 2048).unwrap())
}

#[derive(Serialize)]
pub struct IdTokenClaims {
    pub sub: String,
    pub iss: String,
    pub aud: String,
    pub exp: u64,
    pub iat: u64,
}

pub fn now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_secs()
}

/// テスト用の RS256 JWT を生成する。
pub fn sign(claims: &IdTokenClaims) -> String {
    let mut header = Header::new(Algorithm::RS256);
    header.kid = Some(KID.into());

    let pem = signing_key()
        .to_pkcs1_pem(rsa::pkcs1::LineEnding::LF)
        .unwrap();
    let key = EncodingKey::from_rsa_pem(pem.as_bytes()).unwrap();
    encode(&header, claims, &key).unwrap()
}

pub fn jwks() -> serde_json::Value {
    let public_key = signing_key().to_public_key();
    serde_json::json!({
        "keys": [
            {
                "kid": KID,
                "kty": "RSA",
                "alg": "RS256",
                "use": "sig",
                "n": URL_SAFE_NO_PAD.encode(public_key.n().to_bytes_be()),
                "e": URL_SAFE_NO_PAD.encode(public_key.e().to_bytes_be()),
            },
            // 検証に使われない EC 鍵が混在していても無視される
            { "kid": "ec-key", "kty": "EC", "crv": "P-256", "x": "x", "y": "y" }
        ]
    })
}

/// Idp は wiremock 上の Keycloak 風 IdP。
pub struct Idp {
    pub server: MockServer,
    pub issuer: String,
}

impl Idp {
    pub async fn start() -> Self {
        let server = MockServer::start().await;
        let issuer = format!("{}{REALM_PATH}", server.uri());
        Self { server, issuer }
    }

    pub fn endpoint(&self, suffix: &str) -> String {
        format!("{}{REALM_PATH}/protocol/openid-connect/{suffix}", self.server.uri())
    }

    pub fn config(&self) -> ProviderConfig {
        ProviderConfig::new(&self.issuer, CLIENT_ID, CLIENT_SECRET)
            .with_redirect_url("https://k1s0.example.com/verify-auth")
            .with_auth_endpoint(&self.endpoint("auth"))
            .with_scopes("profile,email")
    }

    /// 有効な ID トークンを生成する。
    pub fn id_token(&self, sub: &str) -> String {
        sign(&IdTokenClaims {
            sub: sub.into(),
            iss: self.issuer.clone(),
            aud: CLIENT_ID.into(),
            exp: now() + 900,
            iat: now(),
        })
    }

    pub async fn mount_discovery(&self) {
        Mock::given(method("GET"))
            .and(path(format!("{REALM_PATH}/.well-known/openid-configuration")))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "issuer": self.issuer,
                "authorization_endpoint": self.endpoint("auth"),
                "token_endpoint": self.endpoint("token"),
                "userinfo_endpoint": self.endpoint("userinfo"),
                "jwks_uri": self.endpoint("certs"),
                "response_types_supported": ["code"],
                "subject_types_supported": ["public"],
                "id_token_signing_alg_values_supported": ["RS256"],
            })))
            .mount(&self.server)
            .await;

        Mock::given(method("GET"))
            .and(path(format!("{REALM_PATH}/protocol/openid-connect/certs")))
            .respond_with(ResponseTemplate::new(200).set_body_json(jwks()))
            .mount(&self.server)
            .await;
    }

    pub async fn mount_token(&self, response: ResponseTemplate) {
        Mock::given(method("POST"))
            .and(path(format!("{REALM_PATH}/protocol/openid-connect/token")))
            .respond_with(response)
            .mount(&self.server)
            .await;
    }

    pub async fn mount_userinfo(&self, body: serde_json::Value) {
        Mock::given(method("GET"))
            .and(path(format!("{REALM_PATH}/protocol/openid-connect/userinfo")))
            .respond_with(ResponseTemplate::new(200).set_body_json(body))
            .mount(&self.server)
            .await;
    }

    /// ID トークンとアクセストークンを返す正常系のトークンレスポンス。
    pub fn token_response(&self, sub: &str) -> ResponseTemplate {
        ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "access_token": ACCESS_TOKEN,
            "id_token": self.id_token(sub),
            "token_type": "Bearer",
            "expires_in": 300,
        }))
    }
}

pub fn config_service() -> ConfigService {
    ConfigService::new(
        Arc::new(InMemoryConfigStore::new()),
        Arc::new(InMemorySecretStore::new()),
    )
}

pub fn provider(name: &str) -> OidcProvider {
    OidcProvider::new(
        name,
        config_service(),
        Arc::new(AllowListAccessChecker),
        Arc::new(TokenGroupMembership),
    )
    .unwrap()
}
