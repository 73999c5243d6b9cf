//! OIDC プロバイダー設定。
//!
//! 設定は外部の設定ストアに保存され、ホストサービスの auth-config と同じ camelCase キーを持つ。
//! YAML からも読み込める。

use crate::error::OidcProviderError;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

/// AccessMode はログイン許可の判定モードを表す。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccessMode {
    /// 認証できた全ユーザーを許可する
    #[default]
    Unrestricted,
    /// 許可リストに含まれるユーザー / グループのみ許可する
    Restricted,
    /// 許可リストに含まれるユーザー / グループのみ許可する（必須）
    Required,
}

impl AccessMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Unrestricted => "unrestricted",
            Self::Restricted => "restricted",
            Self::Required => "required",
        }
    }
}

fn default_enabled() -> bool {
    true
}

fn empty_secret() -> SecretString {
    SecretString::new(String::new())
}

/// ProviderConfig は外部 OIDC プロバイダーへの接続設定を表す。
///
/// `client_secret` と `private_key` は設定ストア上ではシークレット参照として保存され、
/// [`crate::store::ConfigService`] が実値に解決する。
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderConfig {
    /// OIDC issuer URL。例: `https://auth.k1s0.internal.example.com/auth/realms/k1s0`
    pub issuer: String,

    pub client_id: String,

    #[serde(default = "empty_secret")]
    pub client_secret: SecretString,

    /// 認可コードのリダイレクト先（ホストサービスの URL）
    #[serde(default, alias = "rancherUrl")]
    pub redirect_url: String,

    /// ブラウザをリダイレクトさせる認可エンドポイント
    #[serde(default)]
    pub auth_endpoint: String,

    /// 追加で要求するスコープ（カンマ区切り）
    #[serde(default)]
    pub scopes: String,

    #[serde(default)]
    pub access_mode: AccessMode,

    #[serde(default)]
    pub allowed_principal_ids: Vec<String>,

    /// mTLS 用クライアント証明書（PEM）
    #[serde(default)]
    pub certificate: Option<String>,

    /// mTLS 用秘密鍵（PEM）
    #[serde(default)]
    pub private_key: Option<SecretString>,

    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

impl ProviderConfig {
    /// 必須項目のみで ProviderConfig を生成する。
    pub fn new(issuer: &str, client_id: &str, client_secret: &str) -> Self {
        Self {
            issuer: issuer.to_string(),
            client_id: client_id.to_string(),
            client_secret: SecretString::new(client_secret.to_string()),
            redirect_url: String::new(),
            auth_endpoint: String::new(),
            scopes: String::new(),
            access_mode: AccessMode::default(),
            allowed_principal_ids: Vec::new(),
            certificate: None,
            private_key: None,
            enabled: true,
        }
    }

    pub fn with_redirect_url(mut self, redirect_url: &str) -> Self {
        self.redirect_url = redirect_url.to_string();
        self
    }

    pub fn with_auth_endpoint(mut self, auth_endpoint: &str) -> Self {
        self.auth_endpoint = auth_endpoint.to_string();
        self
    }

    pub fn with_scopes(mut self, scopes: &str) -> Self {
        self.scopes = scopes.to_string();
        self
    }

    pub fn with_access(mut self, mode: AccessMode, allowed_principal_ids: Vec<String>) -> Self {
        self.access_mode = mode;
        self.allowed_principal_ids = allowed_principal_ids;
        self
    }

    /// mTLS 用のクライアント証明書と秘密鍵を設定する。
    pub fn with_client_certificate(mut self, certificate: &str, private_key: &str) -> Self {
        self.certificate = Some(certificate.to_string());
        self.private_key = Some(SecretString::new(private_key.to_string()));
        self
    }

    /// YAML 文字列から設定を読み込み、検証する。
    pub fn from_yaml_str(yaml: &str) -> Result<Self, OidcProviderError> {
        let config: Self = serde_yaml::from_str(yaml)
            .map_err(|e| OidcProviderError::Config(format!("failed to parse YAML: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// YAML ファイルから設定を読み込み、検証する。
    pub fn load(path: &str) -> Result<Self, OidcProviderError> {
        let yaml = std::fs::read_to_string(path)
            .map_err(|e| OidcProviderError::Config(format!("failed to read {path}: {e}")))?;
        Self::from_yaml_str(&yaml)
    }

    /// 設定値のバリデーション。
    pub fn validate(&self) -> Result<(), OidcProviderError> {
        if self.issuer.trim().is_empty() {
            return Err(OidcProviderError::Config("issuer is required".into()));
        }
        let issuer = url::Url::parse(&self.issuer)
            .map_err(|e| OidcProviderError::Config(format!("issuer is not a valid URL: {e}")))?;
        if !matches!(issuer.scheme(), "http" | "https") || issuer.host_str().is_none() {
            return Err(OidcProviderError::Config(
                "issuer must be an absolute http(s) URL".into(),
            ));
        }
        if self.client_id.trim().is_empty() {
            return Err(OidcProviderError::Config("clientId is required".into()));
        }
        Ok(())
    }

    /// 要求スコープ集合 `{openid} ∪ split(scopes, ",")` を順序を保って返す。
    pub fn scope_set(&self) -> Vec<String> {
        let mut scopes = vec!["openid".to_string()];
        for scope in self.scopes.split(',').map(str::trim) {
            if !scope.is_empty() && !scopes.iter().any(|s| s == scope) {
                scopes.push(scope.to_string());
            }
        }
        scopes
    }

    /// 証明書と秘密鍵が両方設定されている場合に PEM の組を返す。
    pub fn client_certificate(&self) -> Option<(&str, &str)> {
        match (&self.certificate, &self.private_key) {
            (Some(cert), Some(key))
                if !cert.trim().is_empty() && !key.expose_secret().trim().is_empty() =>
            {
                Some((cert.as_str(), key.expose_secret().as_str()))
            }
            _ => None,
        }
    }
}
