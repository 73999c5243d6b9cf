//! k1s0-oidc-provider: 外部 IdP (OIDC + Keycloak Admin API) 連携ライブラリ
//!
//! 認可コードフローでのログイン、ID トークン検証、UserInfo からのプリンシパル生成、
//! ディレクトリ（Keycloak Admin API）によるユーザー / グループ検索、
//! 許可リストによるアクセス判定を提供する。
//!
//! # 使い方
//!
//! ```ignore
//! use std::sync::Arc;
//! use k1s0_oidc_provider::{
//!     AllowListAccessChecker, ConfigService, InMemoryConfigStore, InMemorySecretStore,
//!     OidcProvider, ProviderConfig, TokenGroupMembership,
//! };
//!
//! let configs = ConfigService::new(
//!     Arc::new(InMemoryConfigStore::new()),
//!     Arc::new(InMemorySecretStore::new()),
//! );
//! let provider = OidcProvider::new(
//!     "keycloakoidc",
//!     configs,
//!     Arc::new(AllowListAccessChecker),
//!     Arc::new(TokenGroupMembership),
//! )?
//! .with_directory();
//!
//! provider
//!     .save_config(ProviderConfig::load("/etc/k1s0/keycloakoidc.yaml")?)
//!     .await?;
//!
//! let login = provider.login("authorization-code", None).await?;
//! println!("{} ({} groups)", login.user.id, login.groups.len());
//! ```

pub mod access;
pub mod claims;
pub mod config;
pub mod directory;
pub mod error;
pub mod oidc_client;
pub mod principal;
pub mod provider;
pub mod resolver;
pub mod store;
pub mod token;
pub mod transport;
pub mod verifier;

pub use access::{AccessChecker, AccessGate, AllowListAccessChecker};
pub use claims::Claims;
pub use config::{AccessMode, ProviderConfig};
pub use directory::{DirectoryClient, DirectoryGroup, DirectoryUser, ExternalAccount};
pub use error::OidcProviderError;
pub use principal::{format_principal_id, parse_principal_id, Principal, PrincipalKind};
pub use provider::{LoginResult, OidcProvider};
pub use resolver::{is_this_user_me, PrincipalResolver};
pub use store::{ConfigService, ConfigStore, InMemoryConfigStore, InMemorySecretStore, SecretStore};
pub use token::{AuthToken, MembershipChecker, TokenGroupMembership};
