//! アクセスゲート: 解決済みのユーザー / グループに対してログイン可否を判定する。

use async_trait::async_trait;
use tracing::{info, warn};

use crate::config::AccessMode;
use crate::error::OidcProviderError;
use crate::principal::Principal;

/// AccessChecker はホストサービスのユーザーマネージャーが持つアクセスポリシー評価を抽象化するトレイト。
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AccessChecker: Send + Sync {
    /// 許可する場合は `Ok(true)`、拒否する場合は `Ok(false)` を返す。
    async fn check_access(
        &self,
        mode: AccessMode,
        allowed_principal_ids: &[String],
        user_id: &str,
        group_principals: &[Principal],
    ) -> Result<bool, OidcProviderError>;
}

/// AllowListAccessChecker は許可リストのみで判定するアクセスチェッカー。
///
/// `unrestricted` は全員を許可し、`restricted` / `required` は
/// ユーザー ID かいずれかのグループ ID が許可リストに含まれる場合に許可する。
#[derive(Debug, Clone, Copy, Default)]
pub struct AllowListAccessChecker;

#[async_trait]
impl AccessChecker for AllowListAccessChecker {
    async fn check_access(
        &self,
        mode: AccessMode,
        allowed_principal_ids: &[String],
        user_id: &str,
        group_principals: &[Principal],
    ) -> Result<bool, OidcProviderError> {
        if mode == AccessMode::Unrestricted {
            return Ok(true);
        }
        let allowed = |id: &str| allowed_principal_ids.iter().any(|a| a == id);
        Ok(allowed(user_id) || group_principals.iter().any(|g| allowed(&g.id)))
    }
}

/// AccessGate はログインごとに 1 回だけアクセスポリシーを評価する。
pub struct AccessGate<'a> {
    checker: &'a dyn AccessChecker,
}

impl<'a> AccessGate<'a> {
    pub fn new(checker: &'a dyn AccessChecker) -> Self {
        Self { checker }
    }

    /// 許可なら `Ok(())`、拒否なら `AccessDenied` を返す。
    /// 評価自体の失敗は `AccessCheck` としてログインを中断させる。
    pub async fn authorize(
        &self,
        mode: AccessMode,
        allowed_principal_ids: &[String],
        user_id: &str,
        group_principals: &[Principal],
    ) -> Result<(), OidcProviderError> {
        let allowed = self
            .checker
            .check_access(mode, allowed_principal_ids, user_id, group_principals)
            .await
            .map_err(|e| match e {
                OidcProviderError::AccessCheck(_) => e,
                other => OidcProviderError::AccessCheck(other.to_string()),
            })?;

        if allowed {
            info!(user_id = %user_id, access_mode = mode.as_str(), "アクセスを許可しました");
            Ok(())
        } else {
            warn!(user_id = %user_id, access_mode = mode.as_str(), "アクセスを拒否しました");
            Err(OidcProviderError::AccessDenied)
        }
    }
}
