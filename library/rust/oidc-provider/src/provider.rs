//! 外部 IdP プロバイダーのファサード。
//!
//! ホストサービスのリクエストハンドラーから呼ばれ、ログイン・検索・プリンシパル取得・
//! アクセス判定を提供する。設定は呼び出しごとに読み直し、状態は保持しない。

use std::collections::HashMap;
use std::sync::Arc;

use secrecy::{ExposeSecret, SecretString};
use tracing::{debug, info, instrument};

use crate::access::{AccessChecker, AccessGate};
use crate::config::ProviderConfig;
use crate::directory::DirectoryClient;
use crate::error::OidcProviderError;
use crate::oidc_client::OidcClient;
use crate::principal::{parse_principal_id, Principal, PrincipalKind};
use crate::resolver::{self, PrincipalResolver};
use crate::store::ConfigService;
use crate::token::{AuthToken, MembershipChecker};
use crate::transport::build_http_client;

/// ユーザー追加属性のキー: プリンシパル ID
pub const USER_ATTRIBUTE_PRINCIPAL_ID: &str = "principalid";
/// ユーザー追加属性のキー: ログイン名
pub const USER_ATTRIBUTE_USER_NAME: &str = "username";

/// LoginResult はログイン成功時に呼び出し元へ返す値。
#[derive(Debug, Clone)]
pub struct LoginResult {
    /// `is_self = true` のユーザープリンシパル
    pub user: Principal,

    /// `is_member_of = true` のグループプリンシパル
    pub groups: Vec<Principal>,

    /// IdP のアクセストークン。ディレクトリ検索で再利用する。
    pub access_token: SecretString,
}

/// OidcProvider は 1 つの外部 IdP 設定に対応するプロバイダー。
///
/// ディレクトリ検索を有効にした場合（Keycloak 向け）は検索・プリンシパル取得で
/// Admin API を呼び出し、無効の場合は検索語やプリンシパル ID からプリンシパルを組み立てる。
pub struct OidcProvider {
    name: String,
    resolver: PrincipalResolver,
    configs: ConfigService,
    access: Arc<dyn AccessChecker>,
    membership: Arc<dyn MembershipChecker>,
    directory: bool,
}

impl OidcProvider {
    /// プロバイダーを生成する。
    ///
    /// プロバイダー名はプリンシパル ID に埋め込まれるため、`_` と `:` を含められない。
    pub fn new(
        name: &str,
        configs: ConfigService,
        access: Arc<dyn AccessChecker>,
        membership: Arc<dyn MembershipChecker>,
    ) -> Result<Self, OidcProviderError> {
        if name.is_empty() || name.contains(['_', ':']) {
            return Err(OidcProviderError::Config(format!(
                "invalid provider name: {name:?}"
            )));
        }
        Ok(Self {
            name: name.to_string(),
            resolver: PrincipalResolver::new(name),
            configs,
            access,
            membership,
            directory: false,
        })
    }

    /// ディレクトリ（Keycloak Admin API）による検索を有効にする。
    pub fn with_directory(mut self) -> Self {
        self.directory = true;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// 認可コードでログインし、ユーザー・グループのプリンシパルとアクセストークンを返す。
    ///
    /// `config` が `None` の場合は設定ストアから読み込む。
    /// アクセスポリシーで拒否された場合は `AccessDenied` を返し、トークンは返さない。
    #[instrument(skip(self, code, config), fields(provider = %self.name))]
    pub async fn login(
        &self,
        code: &str,
        config: Option<ProviderConfig>,
    ) -> Result<LoginResult, OidcProviderError> {
        let config = match config {
            Some(config) => {
                config.validate()?;
                config
            }
            None => self.configs.get(&self.name).await?,
        };

        let http = build_http_client(&config)?;
        let client = OidcClient::discover(http, &config.issuer).await?;

        let scopes = config.scope_set();
        let tokens = client.exchange_code(&config, code, &scopes).await?;

        let raw_token = tokens
            .verifiable_token()
            .ok_or(OidcProviderError::MissingToken)?;
        // 検証済みの Claims は使わず、UserInfo から取得し直す
        client.verify(raw_token, &config.client_id).await?;

        let access_token = tokens
            .access_token()
            .ok_or(OidcProviderError::MissingToken)?;
        let claims = client.user_info(access_token).await?;
        debug!(claims = %claims, "UserInfo を取得しました");

        let user = self.resolver.user_to_principal(&claims).with_self(true);
        let groups: Vec<Principal> = claims
            .groups
            .iter()
            .filter(|g| !g.is_empty())
            .map(|g| self.resolver.group_to_principal(g).with_member_of(true))
            .collect();

        AccessGate::new(self.access.as_ref())
            .authorize(
                config.access_mode,
                &config.allowed_principal_ids,
                &user.id,
                &groups,
            )
            .await?;

        info!(user_id = %user.id, groups = groups.len(), "ログインに成功しました");
        Ok(LoginResult {
            user,
            groups,
            access_token: SecretString::new(access_token.to_string()),
        })
    }

    /// 検索語に一致するプリンシパルを返す。アクセスゲートは通さない。
    #[instrument(skip(self, caller), fields(provider = %self.name))]
    pub async fn search(
        &self,
        term: &str,
        kind: Option<PrincipalKind>,
        caller: &AuthToken,
    ) -> Result<Vec<Principal>, OidcProviderError> {
        if !self.directory {
            if term.is_empty() {
                return Ok(Vec::new());
            }
            let kind = kind.unwrap_or(PrincipalKind::User);
            let principal = match kind {
                PrincipalKind::User => Principal::user(&self.name, term, term, term),
                PrincipalKind::Group => Principal::group(&self.name, term, term),
            };
            return Ok(vec![self.resolve(kind, principal, caller)]);
        }

        let Some(access_token) = caller.provider_access_token.as_ref() else {
            debug!("IdP アクセストークンが無いため検索結果は空です");
            return Ok(Vec::new());
        };

        let config = self.configs.get(&self.name).await?;
        let directory = DirectoryClient::from_config(&config)?;
        let accounts = directory
            .search_principals(term, kind, access_token.expose_secret())
            .await?;

        Ok(accounts
            .iter()
            .map(|account| {
                let principal = self.resolver.to_principal(account);
                self.resolve(account.kind, principal, caller)
            })
            .collect())
    }

    /// プリンシパル ID からプリンシパルを取得する。
    #[instrument(skip(self, caller), fields(provider = %self.name))]
    pub async fn get_principal(
        &self,
        principal_id: &str,
        caller: &AuthToken,
    ) -> Result<Principal, OidcProviderError> {
        let (kind, external_id) = parse_principal_id(principal_id)?;

        let access_token = caller
            .provider_access_token
            .as_ref()
            .filter(|_| self.directory);
        let principal = match access_token {
            Some(access_token) => {
                let config = self.configs.get(&self.name).await?;
                let account = DirectoryClient::from_config(&config)?
                    .get_by_id(&external_id, kind, access_token.expose_secret())
                    .await?;
                self.resolver.to_principal(&account)
            }
            None => match kind {
                PrincipalKind::User => {
                    Principal::user(&self.name, &external_id, external_id.as_str(), external_id.as_str())
                }
                PrincipalKind::Group => Principal::group(&self.name, &external_id, external_id.as_str()),
            },
        };

        Ok(self.resolve(kind, principal, caller))
    }

    /// 設定を読み直し、指定ユーザーがアクセス可能かを返す。
    #[instrument(skip(self, groups), fields(provider = %self.name))]
    pub async fn can_access(
        &self,
        user_id: &str,
        groups: &[Principal],
    ) -> Result<bool, OidcProviderError> {
        let config = self.configs.get(&self.name).await?;
        match AccessGate::new(self.access.as_ref())
            .authorize(config.access_mode, &config.allowed_principal_ids, user_id, groups)
            .await
        {
            Ok(()) => Ok(true),
            Err(OidcProviderError::AccessDenied) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// ブラウザをリダイレクトさせる認可エンドポイントの URL を返す。
    pub fn authorization_redirect_url(&self, config: &ProviderConfig) -> String {
        format!(
            "{}?client_id={}&response_type=code&redirect_uri={}",
            config.auth_endpoint,
            urlencoding::encode(&config.client_id),
            urlencoding::encode(&config.redirect_url)
        )
    }

    /// ユーザーオブジェクトに付与する追加属性を返す。
    pub fn user_extra_attributes(&self, caller: &AuthToken) -> HashMap<String, Vec<String>> {
        HashMap::from([
            (
                USER_ATTRIBUTE_PRINCIPAL_ID.to_string(),
                vec![caller.user_principal.id.clone()],
            ),
            (
                USER_ATTRIBUTE_USER_NAME.to_string(),
                vec![caller.user_principal.login_name.clone()],
            ),
        ])
    }

    /// 設定を保存する。シークレットはシークレットストアへ退避される。
    #[instrument(skip(self, config), fields(provider = %self.name))]
    pub async fn save_config(&self, config: ProviderConfig) -> Result<(), OidcProviderError> {
        config.validate()?;
        self.configs.save(&self.name, config).await
    }

    pub fn is_this_user_me(&self, me: &Principal, other: &Principal) -> bool {
        resolver::is_this_user_me(me, other)
    }

    fn resolve(&self, kind: PrincipalKind, principal: Principal, caller: &AuthToken) -> Principal {
        self.resolver
            .resolve_from_token(kind, principal, Some(caller), self.membership.as_ref())
    }
}
