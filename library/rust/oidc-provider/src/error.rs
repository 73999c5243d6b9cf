//! 外部 IdP 連携のエラー定義。
//!
//! エラーメッセージにはアクセストークン・クライアントシークレット・秘密鍵を含めない。

/// OidcProviderError はログイン・検索・プリンシパル解決で発生するエラーを表す。
///
/// `AccessDenied` のみがエンドユーザーへそのまま表示してよいエラーで、
/// それ以外はログに詳細を残し、利用者には汎用的な認証失敗として返すこと。
#[derive(thiserror::Error, Debug)]
pub enum OidcProviderError {
    /// プロバイダー設定が存在しない、または不正。
    #[error("provider config error: {0}")]
    Config(String),

    /// mTLS クライアント証明書・秘密鍵の読み込みに失敗した。
    #[error("TLS setup failed: {0}")]
    TlsSetup(String),

    /// OIDC ディスカバリーに失敗した。リトライは呼び出し側の責務。
    #[error("OIDC discovery failed for issuer {issuer}: {message}")]
    Discovery { issuer: String, message: String },

    /// 認可コードとトークンの交換に失敗した。
    #[error("token exchange failed: {0}")]
    TokenExchange(String),

    /// トークンレスポンスに ID トークンもアクセストークンも含まれていない。
    #[error("token response contains neither id_token nor access_token")]
    MissingToken,

    /// トークンの署名・オーディエンス・有効期限の検証に失敗した。
    #[error("token verification failed: {0}")]
    TokenVerification(String),

    /// UserInfo エンドポイントの呼び出しに失敗した。
    #[error("userinfo request failed: {0}")]
    UserInfo(String),

    /// UserInfo レスポンスを Claims に変換できなかった。
    #[error("failed to decode claims: {0}")]
    ClaimDecode(String),

    /// issuer から Keycloak Admin API のベース URL を導出できなかった。
    #[error("cannot derive directory search URL from issuer {0}")]
    UrlDerivation(String),

    /// ディレクトリが 2xx 以外（401 を除く検索）を返した。
    #[error("directory request failed with status {status}: url={url}, body={body}")]
    DirectoryRequest {
        status: u16,
        url: String,
        body: String,
    },

    /// ディレクトリへの HTTP 通信自体に失敗した。
    #[error("directory unreachable: url={url}: {message}")]
    DirectoryUnavailable { url: String, message: String },

    /// ディレクトリのレスポンス JSON を解析できなかった。
    #[error("failed to decode directory response: url={url}: {message}")]
    DirectoryDecode { url: String, message: String },

    /// プリンシパル ID が `<provider>_<kind>://<external>` 形式ではない。
    #[error("invalid principal id: {0}")]
    InvalidPrincipalId(String),

    /// アクセスポリシーにより拒否された。
    #[error("unauthorized")]
    AccessDenied,

    /// アクセスポリシーの評価自体に失敗した。
    #[error("access check failed: {0}")]
    AccessCheck(String),

    /// シークレットストアの読み書きに失敗した。
    #[error("secret store error: {0}")]
    SecretStore(String),
}

impl OidcProviderError {
    /// アクセス拒否（unauthorized）かどうかを返す。
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, Self::AccessDenied)
    }

    /// エンドユーザーへ表示するメッセージを返す。
    /// プロバイダー内部の情報を漏らさないよう、拒否以外は一律の文言にする。
    pub fn public_message(&self) -> &'static str {
        if self.is_unauthorized() {
            "unauthorized"
        } else {
            "authentication failed"
        }
    }
}
