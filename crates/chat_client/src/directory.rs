use async_trait::async_trait;
use chat_server::errors::ProfileError;
use chat_server::types::Identity;
use dashmap::DashMap;

/// Resolves the username a player types into the identity the profile store
/// is keyed by.
#[async_trait]
pub trait AccountDirectory: Send + Sync {
    /// `Ok(None)` when no account has that username.
    async fn lookup(&self, username: &str) -> Result<Option<Identity>, ProfileError>;
}

/// Usernames are stored lowercase.
#[derive(Debug, Default, Clone)]
pub struct MemoryAccountDirectory {
    accounts: DashMap<String, Identity>,
}

impl MemoryAccountDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, username: &str, identity: Identity) {
        self.accounts.insert(username.to_lowercase(), identity);
    }

    pub fn len(&self) -> usize {
        self.accounts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.accounts.is_empty()
    }
}

#[async_trait]
impl AccountDirectory for MemoryAccountDirectory {
    async fn lookup(&self, username: &str) -> Result<Option<Identity>, ProfileError> {
        Ok(self
            .accounts
            .get(&username.to_lowercase())
            .map(|entry| entry.value().clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn lookup_ignores_case() {
        let directory = MemoryAccountDirectory::new();
        directory.register("Bob", Identity::from("id-bob"));

        assert_eq!(
            directory.lookup("BOB").await.unwrap(),
            Some(Identity::from("id-bob"))
        );
        assert_eq!(directory.lookup("carol").await.unwrap(), None);
        assert_eq!(directory.len(), 1);
    }
}
