use moka::future::Cache;
use std::time::Duration;

/// Token ids (`jti`) that must no longer be accepted.
///
/// Entries expire together with the longest-lived token, after which the
/// token is rejected for being expired anyway.
#[derive(Clone)]
pub struct RevocationList {
    revoked: Cache<String, ()>,
}

impl RevocationList {
    pub fn new(ttl_secs: usize) -> Self {
        Self {
            revoked: Cache::builder()
                .max_capacity(500_000)
                .time_to_live(Duration::from_secs(ttl_secs as u64))
                .build(),
        }
    }

    pub async fn revoke(&self, jti: &str) {
        self.revoked.insert(jti.to_string(), ()).await;
    }

    pub async fn is_revoked(&self, jti: &str) -> bool {
        self.revoked.contains_key(jti)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn revoked_ids_are_remembered() {
        let list = RevocationList::new(60);
        assert!(!list.is_revoked("a").await);
        list.revoke("a").await;
        assert!(list.is_revoked("a").await);
        assert!(!list.is_revoked("b").await);
    }
}
