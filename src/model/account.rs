use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};
use utoipa::ToSchema;

use super::role::Role;

pub type AccountId = u64;
pub type ProfileId = u64;

/// Sole source of truth for whether an account may sign in.
/// `Account::is_active` is derived from it and never stored.
#[derive(
    Debug, Copy, Clone, Eq, PartialEq, Serialize, Deserialize, Display, EnumString, AsRefStr, ToSchema,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum AccountStatus {
    Pending,
    Active,
    Inactive,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[schema(example = json!({
    "id": 7,
    "name": "Jane Doe",
    "email": "jane@officesphere.io",
    "role": "employee",
    "status": "active",
    "created_at": "2026-01-05T08:00:00Z"
}))]
pub struct Account {
    pub id: AccountId,
    pub name: String,
    pub email: String,
    #[serde(skip)]
    pub password_hash: String,
    pub role: Role,
    pub status: AccountStatus,
    #[schema(value_type = String, format = "date-time")]
    pub created_at: DateTime<Utc>,
}

impl Account {
    pub fn is_active(&self) -> bool {
        self.status == AccountStatus::Active
    }
}

#[derive(Debug, Clone)]
pub struct NewAccount {
    pub name: String,
    pub email: String,
    pub password_hash: String,
    pub role: Role,
    pub status: AccountStatus,
    pub created_at: DateTime<Utc>,
}

#[derive(
    Debug, Copy, Clone, Eq, PartialEq, Serialize, Deserialize, Display, EnumString, AsRefStr, ToSchema,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ProfileKind {
    Employee,
    Client,
}

impl ProfileKind {
    /// Profile kind created alongside an account of `role`, if any.
    pub fn for_role(role: Role) -> Option<Self> {
        match role {
            Role::Employee => Some(ProfileKind::Employee),
            Role::Client => Some(ProfileKind::Client),
            Role::Admin => None,
        }
    }

    fn code_prefix(self) -> &'static str {
        match self {
            ProfileKind::Employee => "EMP",
            ProfileKind::Client => "CLT",
        }
    }
}

/// A person profile. Profile and account ids are drawn from one sequence,
/// so an id names at most one of them and meeting participants may be
/// named by either.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct Profile {
    pub id: ProfileId,
    pub account_id: AccountId,
    pub kind: ProfileKind,
    pub display_name: String,
    pub code: Option<String>,
}

#[derive(Debug, Clone)]
pub struct NewProfile {
    pub account_id: AccountId,
    pub kind: ProfileKind,
    pub display_name: String,
    pub code: Option<String>,
}

impl NewProfile {
    /// The profile registration attaches to a freshly created account.
    pub fn for_account(account: &Account, kind: ProfileKind) -> Self {
        Self {
            account_id: account.id,
            kind,
            display_name: account.name.clone(),
            code: Some(format!("{}{:04}", kind.code_prefix(), account.id)),
        }
    }
}
