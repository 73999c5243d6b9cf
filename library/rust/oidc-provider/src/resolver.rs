//! プリンシパルリゾルバー: Claims / ディレクトリレコードから Principal を組み立て、
//! 呼び出し元トークンに照らして is_self / is_member_of を付与する。

use crate::claims::Claims;
use crate::directory::ExternalAccount;
use crate::principal::{Principal, PrincipalKind};
use crate::token::{AuthToken, MembershipChecker};

/// PrincipalResolver はプロバイダー名に紐づくプリンシパル変換器。
#[derive(Debug, Clone)]
pub struct PrincipalResolver {
    provider: String,
}

impl PrincipalResolver {
    pub fn new(provider: &str) -> Self {
        Self {
            provider: provider.to_string(),
        }
    }

    /// UserInfo の Claims からユーザープリンシパルを生成する。
    /// 表示名は name、空なら email。ログイン名は email。
    pub fn user_to_principal(&self, claims: &Claims) -> Principal {
        Principal::user(&self.provider, &claims.sub, claims.display_name(), claims.email())
    }

    /// グループ名からグループプリンシパルを生成する。
    pub fn group_to_principal(&self, group_name: &str) -> Principal {
        Principal::group(&self.provider, group_name, group_name)
    }

    /// ディレクトリのレコードをプリンシパルに変換する。
    pub fn to_principal(&self, account: &ExternalAccount) -> Principal {
        match account.kind {
            PrincipalKind::User => {
                let full_name = format!("{} {}", account.name, account.last_name);
                let display_name = [full_name.trim(), account.email.as_str(), account.username.as_str()]
                    .into_iter()
                    .find(|s| !s.is_empty())
                    .unwrap_or_default()
                    .to_string();
                Principal::user(&self.provider, &account.id, display_name, account.username.clone())
            }
            PrincipalKind::Group => Principal::group(&self.provider, &account.id, account.name.clone()),
        }
    }

    /// 呼び出し元トークンに照らしてプリンシパルのフラグを設定する。
    ///
    /// ユーザーの場合、呼び出し元自身であれば is_self を立て、表示名・ログイン名を
    /// セッションの値で上書きする（検索結果が古い可能性があるため）。
    /// グループの場合、トークンマネージャーで所属を判定する。
    pub fn resolve_from_token(
        &self,
        kind: PrincipalKind,
        mut principal: Principal,
        caller: Option<&AuthToken>,
        membership: &dyn MembershipChecker,
    ) -> Principal {
        principal.kind = kind;
        let Some(token) = caller else {
            return principal;
        };

        match kind {
            PrincipalKind::User => {
                principal.is_self = is_this_user_me(&token.user_principal, &principal);
                if principal.is_self {
                    principal.login_name = token.user_principal.login_name.clone();
                    principal.display_name = token.user_principal.display_name.clone();
                }
            }
            PrincipalKind::Group => {
                principal.is_member_of = membership.is_member_of(token, &principal);
            }
        }
        principal
    }
}

/// `other` が呼び出し元自身 `me` を表すかを判定する。
/// ID・ログイン名・種別がすべて一致する場合に真。
pub fn is_this_user_me(me: &Principal, other: &Principal) -> bool {
    me.id == other.id && me.login_name == other.login_name && me.kind == other.kind
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::principal::parse_principal_id;
    use crate::token::{MockMembershipChecker, TokenGroupMembership};

    fn claims(name: Option<&str>, email: Option<&str>) -> Claims {
        Claims {
            sub: "f47ac10b".into(),
            name: name.map(String::from),
            preferred_username: Some("taro".into()),
            given_name: None,
            family_name: None,
            email: email.map(String::from),
            email_verified: Some(true),
            groups: vec![],
        }
    }

    fn account(kind: PrincipalKind, id: &str) -> ExternalAccount {
        ExternalAccount {
            id: id.into(),
            kind,
            email: String::new(),
            username: String::new(),
            enabled: true,
            name: String::new(),
            last_name: String::new(),
        }
    }

    #[test]
    fn test_user_to_principal() {
        let resolver = PrincipalResolver::new("oidc");
        let p = resolver.user_to_principal(&claims(Some("Taro Yamada"), Some("taro@example.com")));
        assert_eq!(p.id, "oidc_user://f47ac10b");
        assert_eq!(p.kind, PrincipalKind::User);
        assert_eq!(p.display_name, "Taro Yamada");
        assert_eq!(p.login_name, "taro@example.com");
        assert!(!p.is_self);
    }

    #[test]
    fn test_user_to_principal_display_name_falls_back_to_email() {
        let resolver = PrincipalResolver::new("oidc");
        let p = resolver.user_to_principal(&claims(Some(""), Some("a@b.com")));
        assert_eq!(p.display_name, "a@b.com");
    }

    #[test]
    fn test_group_to_principal() {
        let p = PrincipalResolver::new("oidc").group_to_principal("platform-admins");
        assert_eq!(p.id, "oidc_group://platform-admins");
        assert_eq!(p.display_name, "platform-admins");
        assert!(p.login_name.is_empty());
    }

    #[test]
    fn test_to_principal_user_display_name_chain() {
        let resolver = PrincipalResolver::new("keycloakoidc");

        let mut a = account(PrincipalKind::User, "u-1");
        a.name = "Taro".into();
        a.last_name = "Yamada".into();
        a.email = "taro@example.com".into();
        a.username = "taro.yamada".into();
        let p = resolver.to_principal(&a);
        assert_eq!(p.display_name, "Taro Yamada");
        assert_eq!(p.login_name, "taro.yamada");

        a.name.clear();
        a.last_name.clear();
        assert_eq!(resolver.to_principal(&a).display_name, "taro@example.com");

        a.email.clear();
        assert_eq!(resolver.to_principal(&a).display_name, "taro.yamada");
    }

    #[test]
    fn test_to_principal_round_trips() {
        let resolver = PrincipalResolver::new("keycloakoidc");
        for a in [account(PrincipalKind::User, "42"), account(PrincipalKind::Group, "g-7")] {
            let p = resolver.to_principal(&a);
            let (kind, external_id) = parse_principal_id(&p.id).unwrap();
            assert_eq!(kind, a.kind);
            assert_eq!(external_id, a.id);
        }
    }

    #[test]
    fn test_resolve_self_overwrites_names() {
        let resolver = PrincipalResolver::new("oidc");
        let me = Principal::user("oidc", "u1", "Fresh Name", "taro@example.com");
        let token = AuthToken::new(me);

        let stale = Principal::user("oidc", "u1", "Stale Name", "taro@example.com");
        let p = resolver.resolve_from_token(
            PrincipalKind::User,
            stale,
            Some(&token),
            &TokenGroupMembership,
        );
        assert!(p.is_self);
        assert_eq!(p.display_name, "Fresh Name");
    }

    #[test]
    fn test_resolve_other_user_is_not_self() {
        let resolver = PrincipalResolver::new("oidc");
        let token = AuthToken::new(Principal::user("oidc", "u1", "Me", "me@example.com"));

        let other = Principal::user("oidc", "u2", "Other", "other@example.com");
        let p = resolver.resolve_from_token(
            PrincipalKind::User,
            other,
            Some(&token),
            &TokenGroupMembership,
        );
        assert!(!p.is_self);
        assert_eq!(p.display_name, "Other");

        // 同じ ID でもログイン名が違えば自分ではない
        let same_id = Principal::user("oidc", "u1", "Me", "someone@example.com");
        let p = resolver.resolve_from_token(
            PrincipalKind::User,
            same_id,
            Some(&token),
            &TokenGroupMembership,
        );
        assert!(!p.is_self);
    }

    #[test]
    fn test_resolve_group_uses_membership_checker() {
        let resolver = PrincipalResolver::new("oidc");
        let token = AuthToken::new(Principal::user("oidc", "u1", "Me", "me@example.com"));

        let mut membership = MockMembershipChecker::new();
        membership
            .expect_is_member_of()
            .withf(|_, g| g.id == "oidc_group://devs")
            .times(1)
            .returning(|_, _| true);

        let p = resolver.resolve_from_token(
            PrincipalKind::Group,
            resolver.group_to_principal("devs"),
            Some(&token),
            &membership,
        );
        assert!(p.is_member_of);
    }

    #[test]
    fn test_resolve_without_token_leaves_flags_unset() {
        let resolver = PrincipalResolver::new("oidc");
        let mut membership = MockMembershipChecker::new();
        membership.expect_is_member_of().never();

        let p = resolver.resolve_from_token(
            PrincipalKind::Group,
            resolver.group_to_principal("devs"),
            None,
            &membership,
        );
        assert!(!p.is_member_of);
        assert!(!p.is_self);
    }
}
