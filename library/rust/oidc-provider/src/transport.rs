//! 呼び出し単位の HTTP トランスポート。
//!
//! mTLS の証明書はプロバイダー設定ごとに異なるため、共有クライアントを書き換えず、
//! ログイン・検索の呼び出しごとに設定から reqwest::Client を生成する。

use crate::config::ProviderConfig;
use crate::error::OidcProviderError;

/// 設定の mTLS 証明書・秘密鍵を組み込んだ HTTP クライアントを生成する。
///
/// 証明書と秘密鍵の両方が設定されている場合のみクライアント証明書を使用する。
pub fn build_http_client(config: &ProviderConfig) -> Result<reqwest::Client, OidcProviderError> {
    let mut builder = reqwest::Client::builder();

    if let Some((certificate, private_key)) = config.client_certificate() {
        let mut pem = Vec::with_capacity(certificate.len() + private_key.len() + 1);
        pem.extend_from_slice(certificate.trim_end().as_bytes());
        pem.push(b'\n');
        pem.extend_from_slice(private_key.as_bytes());

        let identity = reqwest::Identity::from_pem(&pem).map_err(|e| {
            tracing::error!(error = %e, "mTLS クライアント証明書の読み込みに失敗しました");
            OidcProviderError::TlsSetup("invalid client certificate or private key".into())
        })?;
        builder = builder.identity(identity);
        tracing::debug!("mTLS クライアント証明書を設定しました");
    }

    builder
        .build()
        .map_err(|e| OidcProviderError::TlsSetup(format!("failed to build HTTP client: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_without_certificate() {
        let config = ProviderConfig::new("https://idp.example.com/auth/realms/k1s0", "c", "s");
        assert!(build_http_client(&config).is_ok());
    }

    #[test]
    fn test_certificate_without_key_is_ignored() {
        let mut config = ProviderConfig::new("https://idp.example.com/auth/realms/k1s0", "c", "s");
        config.certificate = Some("not a pem".into());
        assert!(build_http_client(&config).is_ok());
    }

    #[test]
    fn test_invalid_certificate_is_tls_setup_error() {
        let config = ProviderConfig::new("https://idp.example.com/auth/realms/k1s0", "c", "s")
            .with_client_certificate("not a pem", "also not a pem");
        let err = build_http_client(&config).unwrap_err();
        assert!(matches!(err, OidcProviderError::TlsSetup(_)));
        assert!(!err.to_string().contains("also not a pem"));
    }
}
