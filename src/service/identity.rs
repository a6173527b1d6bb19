use std::sync::Arc;
use std::time::Duration;

use anyhow::anyhow;
use futures::future::join_all;
use serde::Deserialize;
use serde_json::json;
use utoipa::ToSchema;

use super::{
    ServiceResult,
    notification::{NotificationEvent, NotificationFanout},
};
use crate::{
    auth::password::{hash_password, verify_password},
    clock::Clock,
    error::{ConflictError, ServiceError, UnauthorizedError},
    mail::{self, Mailer},
    model::{
        account::{Account, AccountId, AccountStatus, NewAccount, ProfileKind},
        notification::NotificationKind,
        role::Role,
    },
    store::{AccountStore, StoreError},
};

const MIN_PASSWORD_LEN: usize = 8;

#[derive(Debug, Clone, Deserialize, ToSchema)]
#[schema(example = json!({
    "name": "Acme Ltd",
    "email": "ops@acme.io",
    "password": "s3cure-passw0rd",
    "role": "client"
}))]
pub struct Registration {
    pub name: String,
    pub email: String,
    pub password: String,
    pub role: Role,
}

/// Accounts, profiles and the client approval flow.
///
/// `AccountStatus` is the only record of whether an account may sign in.
pub struct IdentityService {
    accounts: Arc<dyn AccountStore>,
    fanout: Arc<NotificationFanout>,
    mailer: Arc<dyn Mailer>,
    clock: Arc<dyn Clock>,
    mail_timeout: Duration,
}

impl IdentityService {
    pub fn new(
        accounts: Arc<dyn AccountStore>,
        fanout: Arc<NotificationFanout>,
        mailer: Arc<dyn Mailer>,
        clock: Arc<dyn Clock>,
        mail_timeout: Duration,
    ) -> Self {
        Self {
            accounts,
            fanout,
            mailer,
            clock,
            mail_timeout,
        }
    }

    /// Self-registration (`created_by == None`) is open to clients only and
    /// leaves the account pending approval. Admins may create any role,
    /// active immediately.
    #[tracing::instrument(skip(self, input), fields(email = %input.email, role = %input.role))]
    pub async fn register(
        &self,
        input: Registration,
        created_by: Option<Role>,
    ) -> ServiceResult<Account> {
        let status = match (created_by, input.role) {
            (None, Role::Client) => AccountStatus::Pending,
            (Some(Role::Admin), _) => AccountStatus::Active,
            _ => return Err(UnauthorizedError::RoleNotAllowed.into()),
        };

        let name = input.name.trim();
        let email = input.email.trim().to_lowercase();
        if name.is_empty() {
            return Err(ServiceError::invalid("name is required"));
        }
        if !email.contains('@') {
            return Err(ServiceError::invalid("a valid email is required"));
        }
        if input.password.len() < MIN_PASSWORD_LEN {
            return Err(ServiceError::invalid(format!(
                "password must be at least {MIN_PASSWORD_LEN} characters"
            )));
        }
        if self.accounts.account_by_email(&email).await?.is_some() {
            return Err(ConflictError::EmailTaken.into());
        }

        let password_hash = hash_password(&input.password)
            .map_err(|e| StoreError::Backend(anyhow!("password hashing failed: {e}")))?;

        let profile_kind = ProfileKind::for_role(input.role);
        let (account, _) = match self
            .accounts
            .insert_account(
                NewAccount {
                    name: name.to_string(),
                    email,
                    password_hash,
                    role: input.role,
                    status,
                    created_at: self.clock.now(),
                },
                profile_kind,
            )
            .await
        {
            Ok(inserted) => inserted,
            Err(StoreError::Duplicate) => return Err(ConflictError::EmailTaken.into()),
            Err(e) => return Err(e.into()),
        };
        tracing::info!(account_id = account.id, status = %account.status, "account registered");

        if account.status == AccountStatus::Pending {
            self.announce_pending(&account).await;
        }
        Ok(account)
    }

    /// Pending and inactive accounts cannot sign in.
    pub async fn authenticate(&self, email: &str, password: &str) -> ServiceResult<Account> {
        let email = email.trim().to_lowercase();
        let account = self
            .accounts
            .account_by_email(&email)
            .await?
            .ok_or(UnauthorizedError::InvalidCredentials)?;

        if verify_password(password, &account.password_hash).is_err() {
            tracing::warn!(account_id = account.id, "failed sign-in attempt");
            return Err(UnauthorizedError::InvalidCredentials.into());
        }
        if !account.is_active() {
            return Err(UnauthorizedError::InactiveAccount.into());
        }
        Ok(account)
    }

    #[tracing::instrument(skip(self))]
    pub async fn approve(&self, account_id: AccountId, admin_id: AccountId) -> ServiceResult<Account> {
        let account = self.pending(account_id).await?;
        let account = self.set_status(account, AccountStatus::Active).await?;
        tracing::info!(account_id, admin_id, "registration approved");

        self.send(mail::account_approved(&account)).await;
        self.fanout
            .notify(
                NotificationEvent::new(
                    NotificationKind::Client,
                    "Account Approved",
                    "Your account has been approved. Welcome to OfficeSphere!",
                )
                .to(account.id)
                .with_metadata(json!({ "account_id": account.id, "action": "account-approved" })),
            )
            .await;
        Ok(account)
    }

    #[tracing::instrument(skip(self))]
    pub async fn reject(&self, account_id: AccountId, admin_id: AccountId) -> ServiceResult<Account> {
        let account = self.pending(account_id).await?;
        let account = self.set_status(account, AccountStatus::Inactive).await?;
        tracing::info!(account_id, admin_id, "registration rejected");

        self.send(mail::registration_rejected(&account)).await;
        Ok(account)
    }

    /// Accounts are never deleted, only switched off.
    #[tracing::instrument(skip(self))]
    pub async fn deactivate(&self, account_id: AccountId, admin_id: AccountId) -> ServiceResult<Account> {
        if account_id == admin_id {
            return Err(ServiceError::invalid("admins cannot deactivate themselves"));
        }
        let account = self.account(account_id).await?;
        let account = self.set_status(account, AccountStatus::Inactive).await?;
        tracing::info!(account_id, admin_id, "account deactivated");
        Ok(account)
    }

    pub async fn account(&self, account_id: AccountId) -> ServiceResult<Account> {
        self.accounts
            .account(account_id)
            .await?
            .ok_or_else(|| ServiceError::not_found("account", account_id))
    }

    pub async fn list(
        &self,
        role: Option<Role>,
        status: Option<AccountStatus>,
    ) -> ServiceResult<Vec<Account>> {
        Ok(self.accounts.accounts(role, status).await?)
    }

    async fn pending(&self, account_id: AccountId) -> ServiceResult<Account> {
        let account = self.account(account_id).await?;
        if account.status != AccountStatus::Pending {
            return Err(ConflictError::AccountNotPending.into());
        }
        Ok(account)
    }

    async fn set_status(&self, mut account: Account, status: AccountStatus) -> ServiceResult<Account> {
        if !self.accounts.set_status(account.id, status).await? {
            return Err(ServiceError::not_found("account", account.id));
        }
        account.status = status;
        Ok(account)
    }

    async fn announce_pending(&self, client: &Account) {
        let admins = self
            .accounts
            .accounts(Some(Role::Admin), Some(AccountStatus::Active))
            .await
            .unwrap_or_else(|e| {
                tracing::error!(error = %e, "failed to load admins for approval mail");
                Vec::new()
            });

        self.fanout
            .notify(
                NotificationEvent::new(
                    NotificationKind::Client,
                    "New Client Registered",
                    format!("{} ({}) registered and is awaiting approval", client.name, client.email),
                )
                .to_all(admins.iter().map(|a| a.id))
                .with_metadata(json!({ "account_id": client.id, "action": "client-registered" })),
            )
            .await;

        join_all(
            admins
                .iter()
                .map(|admin| self.send(mail::approval_required(admin, client))),
        )
        .await;
    }

    async fn send(&self, email: mail::Email) {
        mail::deliver(self.mailer.as_ref(), email, self.mail_timeout).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::service::testing::{Harness, RecordingMailer, at};
    use tracing_test::traced_test;

    fn client_signup(email: &str) -> Registration {
        Registration {
            name: "Acme Ltd".into(),
            email: email.into(),
            password: "s3cure-passw0rd".into(),
            role: Role::Client,
        }
    }

    #[tokio::test]
    async fn self_registered_clients_wait_for_approval() {
        let h = Harness::new(at(2026, 3, 2, 9, 0));
        let admin = h.account("Ada", Role::Admin).await;
        let identity = &h.services.identity;

        let client = identity
            .register(client_signup("Ops@Acme.io"), None)
            .await
            .unwrap();
        assert_eq!(client.status, AccountStatus::Pending);
        assert_eq!(client.email, "ops@acme.io");
        assert!(matches!(
            identity.authenticate("ops@acme.io", "s3cure-passw0rd").await,
            Err(ServiceError::Unauthorized(UnauthorizedError::InactiveAccount))
        ));

        let sent = h.mailer.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].to, admin.email);
        assert_eq!(h.services.inbox.unread_count(admin.id).await.unwrap(), 1);

        let approved = identity.approve(client.id, admin.id).await.unwrap();
        assert!(approved.is_active());
        assert_eq!(h.mailer.sent()[1].to, "ops@acme.io");
        assert!(identity
            .authenticate("ops@acme.io", "s3cure-passw0rd")
            .await
            .is_ok());

        assert!(matches!(
            identity.approve(client.id, admin.id).await,
            Err(ServiceError::Conflict(ConflictError::AccountNotPending))
        ));
    }

    #[tokio::test]
    async fn public_registration_is_client_only_and_emails_are_unique() {
        let h = Harness::new(at(2026, 3, 2, 9, 0));
        let identity = &h.services.identity;

        let mut employee = client_signup("eve@officesphere.io");
        employee.role = Role::Employee;
        assert!(matches!(
            identity.register(employee.clone(), None).await,
            Err(ServiceError::Unauthorized(UnauthorizedError::RoleNotAllowed))
        ));

        let created = identity.register(employee, Some(Role::Admin)).await.unwrap();
        assert_eq!(created.status, AccountStatus::Active);

        assert!(matches!(
            identity
                .register(client_signup("EVE@officesphere.io"), None)
                .await,
            Err(ServiceError::Conflict(ConflictError::EmailTaken))
        ));
        assert!(matches!(
            identity.authenticate("eve@officesphere.io", "wrong-password").await,
            Err(ServiceError::Unauthorized(UnauthorizedError::InvalidCredentials))
        ));
    }

    #[tokio::test]
    async fn registration_creates_a_profile_that_resolves_to_the_account() {
        let h = Harness::new(at(2026, 3, 2, 9, 0));
        let mut input = client_signup("eve@officesphere.io");
        input.role = Role::Employee;
        let account = h.services.identity.register(input, Some(Role::Admin)).await.unwrap();

        // profiles are allocated right after their account
        let profile = h.stores.accounts.profile(account.id + 1).await.unwrap().unwrap();
        assert_eq!(profile.account_id, account.id);
        assert_eq!(profile.code, Some(format!("EMP{:04}", account.id)));
    }

    #[tokio::test]
    #[traced_test]
    async fn mail_failures_do_not_fail_approval() {
        let h = Harness::with_mailer(
            at(2026, 3, 2, 9, 0),
            RecordingMailer::broken(),
        );
        let admin = h.account("Ada", Role::Admin).await;
        let client = h.services.identity.register(client_signup("x@y.io"), None).await.unwrap();

        let approved = h.services.identity.approve(client.id, admin.id).await.unwrap();
        assert!(approved.is_active());
        assert!(logs_contain("email delivery failed"));
    }

    #[tokio::test]
    #[traced_test]
    async fn stalled_mail_relay_does_not_hold_up_registration() {
        let config = Config {
            mail_timeout: Duration::from_millis(50),
            ..Config::default()
        };
        let h = Harness::with_config(at(2026, 3, 2, 9, 0), &config, RecordingMailer::hanging());
        let admin = h.account("Ada", Role::Admin).await;
        h.account("Abe", Role::Admin).await;
        let identity = &h.services.identity;

        let client = tokio::time::timeout(
            Duration::from_secs(2),
            identity.register(client_signup("ops@acme.io"), None),
        )
        .await
        .expect("registration blocked on the mail relay")
        .unwrap();
        assert_eq!(client.status, AccountStatus::Pending);
        assert_eq!(h.services.inbox.unread_count(admin.id).await.unwrap(), 1);

        let approved = tokio::time::timeout(Duration::from_secs(2), identity.approve(client.id, admin.id))
            .await
            .expect("approval blocked on the mail relay")
            .unwrap();
        assert!(approved.is_active());
        assert!(logs_contain("email delivery timed out"));
    }

    #[tokio::test]
    async fn rejection_and_deactivation_switch_accounts_off() {
        let h = Harness::new(at(2026, 3, 2, 9, 0));
        let admin = h.account("Ada", Role::Admin).await;
        let emp = h.account("Eve", Role::Employee).await;
        let identity = &h.services.identity;

        let client = identity.register(client_signup("c@acme.io"), None).await.unwrap();
        let rejected = identity.reject(client.id, admin.id).await.unwrap();
        assert_eq!(rejected.status, AccountStatus::Inactive);

        let off = identity.deactivate(emp.id, admin.id).await.unwrap();
        assert_eq!(off.status, AccountStatus::Inactive);
        assert!(identity.deactivate(admin.id, admin.id).await.is_err());

        let inactive = identity.list(None, Some(AccountStatus::Inactive)).await.unwrap();
        assert_eq!(inactive.len(), 2);
    }
}
