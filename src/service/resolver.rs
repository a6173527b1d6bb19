use std::collections::HashSet;
use std::sync::Arc;

use futures::future::join_all;

use super::ServiceResult;
use crate::{
    error::ServiceError,
    model::account::AccountId,
    store::{AccountStore, StoreResult},
};

/// Maps an identifier that may name either an account or a person profile to
/// the account id notifications are delivered to. Owns no data.
#[derive(Clone)]
pub struct ParticipantResolver {
    accounts: Arc<dyn AccountStore>,
}

impl ParticipantResolver {
    pub fn new(accounts: Arc<dyn AccountStore>) -> Self {
        Self { accounts }
    }

    pub async fn resolve(&self, identifier: u64) -> ServiceResult<AccountId> {
        self.lookup(identifier)
            .await?
            .ok_or_else(|| ServiceError::UnresolvedParticipant(vec![identifier]))
    }

    /// All or nothing. On failure the error carries every identifier that
    /// could not be resolved, in input order. On success the account ids are
    /// unique and keep the order of first appearance.
    pub async fn resolve_all(&self, identifiers: &[u64]) -> ServiceResult<Vec<AccountId>> {
        let mut seen = HashSet::new();
        let unique: Vec<u64> = identifiers
            .iter()
            .copied()
            .filter(|id| seen.insert(*id))
            .collect();

        let lookups = join_all(unique.iter().map(|&id| self.lookup(id))).await;

        let mut resolved = Vec::with_capacity(unique.len());
        let mut taken = HashSet::new();
        let mut unresolved = Vec::new();
        for (identifier, lookup) in unique.into_iter().zip(lookups) {
            match lookup? {
                Some(account_id) => {
                    if taken.insert(account_id) {
                        resolved.push(account_id);
                    }
                }
                None => unresolved.push(identifier),
            }
        }

        if !unresolved.is_empty() {
            tracing::debug!(?unresolved, "participant resolution failed");
            return Err(ServiceError::UnresolvedParticipant(unresolved));
        }
        Ok(resolved)
    }

    // Ids come from one sequence, so a hit on both sides only happens with
    // foreign data. Such an identifier is treated as unresolvable.
    async fn lookup(&self, identifier: u64) -> StoreResult<Option<AccountId>> {
        let (account, profile) = futures::try_join!(
            self.accounts.account(identifier),
            self.accounts.profile(identifier)
        )?;
        match (account, profile) {
            (Some(account), Some(profile)) if profile.account_id != account.id => {
                tracing::warn!(
                    identifier,
                    account_id = account.id,
                    profile_account_id = profile.account_id,
                    "identifier names both an account and another account's profile"
                );
                Ok(None)
            }
            (Some(account), _) => Ok(Some(account.id)),
            (None, Some(profile)) => Ok(self
                .accounts
                .account(profile.account_id)
                .await?
                .map(|a| a.id)),
            (None, None) => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{
        account::{Account, AccountStatus, NewAccount, NewProfile, Profile, ProfileId, ProfileKind},
        role::Role,
    };
    use crate::service::testing::{Harness, at};
    use async_trait::async_trait;
    use chrono::Utc;
    use std::collections::BTreeMap;
    use tracing_test::traced_test;

    /// Accounts and profiles numbered independently, the way two
    /// auto-increment tables would.
    #[derive(Default)]
    struct OverlappingIds {
        accounts: BTreeMap<AccountId, Account>,
        profiles: BTreeMap<ProfileId, Profile>,
    }

    impl OverlappingIds {
        fn with_account(mut self, id: AccountId, role: Role) -> Self {
            self.accounts.insert(
                id,
                Account {
                    id,
                    name: format!("account {id}"),
                    email: format!("a{id}@x.io"),
                    password_hash: String::new(),
                    role,
                    status: AccountStatus::Active,
                    created_at: Utc::now(),
                },
            );
            self
        }

        fn with_profile(mut self, id: ProfileId, account_id: AccountId) -> Self {
            self.profiles.insert(
                id,
                Profile {
                    id,
                    account_id,
                    kind: ProfileKind::Employee,
                    display_name: String::new(),
                    code: None,
                },
            );
            self
        }
    }

    #[async_trait]
    impl AccountStore for OverlappingIds {
        async fn insert_account(
            &self,
            _: NewAccount,
            _: Option<ProfileKind>,
        ) -> StoreResult<(Account, Option<Profile>)> {
            unimplemented!()
        }
        async fn account(&self, id: AccountId) -> StoreResult<Option<Account>> {
            Ok(self.accounts.get(&id).cloned())
        }
        async fn account_by_email(&self, _: &str) -> StoreResult<Option<Account>> {
            unimplemented!()
        }
        async fn accounts(
            &self,
            _: Option<Role>,
            _: Option<AccountStatus>,
        ) -> StoreResult<Vec<Account>> {
            unimplemented!()
        }
        async fn set_status(&self, _: AccountId, _: AccountStatus) -> StoreResult<bool> {
            unimplemented!()
        }
        async fn insert_profile(&self, _: NewProfile) -> StoreResult<Profile> {
            unimplemented!()
        }
        async fn profile(&self, id: ProfileId) -> StoreResult<Option<Profile>> {
            Ok(self.profiles.get(&id).cloned())
        }
    }

    fn resolver(h: &Harness) -> ParticipantResolver {
        ParticipantResolver::new(h.stores.accounts.clone())
    }

    #[tokio::test]
    async fn accounts_and_profiles_both_resolve_to_accounts() {
        let h = Harness::new(at(2026, 3, 2, 8, 0));
        let emp = h.account("Eve", Role::Employee).await;
        let profile = h.profile(&emp, ProfileKind::Employee).await;
        assert_ne!(profile.id, emp.id);

        let r = resolver(&h);
        assert_eq!(r.resolve(emp.id).await.unwrap(), emp.id);
        assert_eq!(r.resolve(profile.id).await.unwrap(), emp.id);
        assert!(matches!(
            r.resolve(777).await,
            Err(ServiceError::UnresolvedParticipant(ids)) if ids == vec![777]
        ));
    }

    #[tokio::test]
    async fn one_bad_identifier_fails_the_whole_batch() {
        let h = Harness::new(at(2026, 3, 2, 8, 0));
        let mut good = Vec::new();
        for name in ["A", "B", "C", "D", "E"] {
            good.push(h.account(name, Role::Employee).await.id);
        }
        let mut batch = good.clone();
        batch.insert(2, 4_242);

        let err = resolver(&h).resolve_all(&batch).await.unwrap_err();
        match err {
            ServiceError::UnresolvedParticipant(ids) => assert_eq!(ids, vec![4_242]),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn batch_collapses_aliases_of_the_same_account() {
        let h = Harness::new(at(2026, 3, 2, 8, 0));
        let emp = h.account("Eve", Role::Employee).await;
        let other = h.account("Olu", Role::Client).await;
        let profile = h.profile(&emp, ProfileKind::Employee).await;

        let ids = resolver(&h)
            .resolve_all(&[profile.id, other.id, emp.id, other.id])
            .await
            .unwrap();
        assert_eq!(ids, vec![emp.id, other.id]);
    }

    #[tokio::test]
    #[traced_test]
    async fn overlapping_account_and_profile_ids_are_not_guessed() {
        // admin account 1 has no profile; employee account 2 owns profile 1
        let store = OverlappingIds::default()
            .with_account(1, Role::Admin)
            .with_account(2, Role::Employee)
            .with_profile(1, 2)
            .with_profile(5, 2);
        let r = ParticipantResolver::new(Arc::new(store));

        assert!(matches!(
            r.resolve(1).await,
            Err(ServiceError::UnresolvedParticipant(ids)) if ids == vec![1]
        ));
        assert!(logs_contain("identifier names both an account and another account's profile"));
        assert_eq!(r.resolve(2).await.unwrap(), 2);
        assert_eq!(r.resolve(5).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn registered_profiles_never_shadow_accounts() {
        let h = Harness::new(at(2026, 3, 2, 8, 0));
        let admin = h.account("Ada", Role::Admin).await;
        let (emp, profile) = h
            .stores
            .accounts
            .insert_account(
                NewAccount {
                    name: "Eve".into(),
                    email: "eve@x.io".into(),
                    password_hash: String::new(),
                    role: Role::Employee,
                    status: AccountStatus::Active,
                    created_at: Utc::now(),
                },
                Some(ProfileKind::Employee),
            )
            .await
            .unwrap();
        let profile = profile.unwrap();

        let r = resolver(&h);
        assert_eq!(r.resolve(admin.id).await.unwrap(), admin.id);
        assert_eq!(r.resolve(profile.id).await.unwrap(), emp.id);
        assert_eq!(
            r.resolve_all(&[profile.id, admin.id, emp.id]).await.unwrap(),
            vec![emp.id, admin.id]
        );
    }
}
