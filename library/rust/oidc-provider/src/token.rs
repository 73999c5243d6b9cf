//! 呼び出し元のセッショントークンと、トークンに基づくグループ所属判定。

use crate::principal::Principal;
use secrecy::SecretString;

/// AuthToken はホストサービスのトークンマネージャーが発行したセッショントークンのうち、
/// このライブラリが参照する部分を表す。
#[derive(Debug, Clone)]
pub struct AuthToken {
    /// ログイン時に解決したユーザープリンシパル
    pub user_principal: Principal,

    /// ログイン時に解決したグループプリンシパル
    pub group_principals: Vec<Principal>,

    /// ログイン時に IdP から受け取ったアクセストークン
    pub provider_access_token: Option<SecretString>,
}

impl AuthToken {
    pub fn new(user_principal: Principal) -> Self {
        Self {
            user_principal,
            group_principals: Vec::new(),
            provider_access_token: None,
        }
    }

    pub fn with_groups(mut self, group_principals: Vec<Principal>) -> Self {
        self.group_principals = group_principals;
        self
    }

    pub fn with_access_token(mut self, access_token: &str) -> Self {
        self.provider_access_token = Some(SecretString::new(access_token.to_string()));
        self
    }
}

/// MembershipChecker はトークンマネージャーのグループ所属判定を抽象化するトレイト。
#[cfg_attr(test, mockall::automock)]
pub trait MembershipChecker: Send + Sync {
    /// 呼び出し元トークンが指定グループに所属しているかを返す。
    fn is_member_of(&self, token: &AuthToken, group: &Principal) -> bool;
}

/// TokenGroupMembership はトークンに記録されたグループプリンシパルの ID で所属を判定する。
#[derive(Debug, Clone, Copy, Default)]
pub struct TokenGroupMembership;

impl MembershipChecker for TokenGroupMembership {
    fn is_member_of(&self, token: &AuthToken, group: &Principal) -> bool {
        token.group_principals.iter().any(|g| g.id == group.id)
    }
}
