use std::collections::BTreeMap;
use std::fmt::Display;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use log::{debug, info, warn};
use tokio::sync::Mutex;

use crate::constants::{ADMIN_KEY, BAN_KEY, BLOCK_LIST_KEY, MUTE_KEY};
use crate::errors::ProfileError;
use crate::types::Identity;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum RecordKey {
    Mute,
    Ban,
    BlockList,
    Admin,
}
impl RecordKey {
    pub const ALL: [RecordKey; 4] = [
        RecordKey::Mute,
        RecordKey::Ban,
        RecordKey::BlockList,
        RecordKey::Admin,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            RecordKey::Mute => MUTE_KEY,
            RecordKey::Ban => BAN_KEY,
            RecordKey::BlockList => BLOCK_LIST_KEY,
            RecordKey::Admin => ADMIN_KEY,
        }
    }

    pub fn from_key(key: &str) -> Option<RecordKey> {
        RecordKey::ALL.into_iter().find(|k| k.as_str() == key)
    }
}
impl Display for RecordKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Small string records scoped per identity. Every call can fail on its own
/// and is never retried by callers.
#[async_trait]
pub trait ProfileStore: Send + Sync {
    async fn get(&self, identity: &Identity, key: RecordKey)
    -> Result<Option<String>, ProfileError>;

    /// Last writer wins.
    async fn set(&self, identity: &Identity, key: RecordKey, value: String)
    -> Result<(), ProfileError>;
}

type Snapshot = BTreeMap<Identity, BTreeMap<String, String>>;

/// In-process store. With a snapshot path it loads the file at start-up and
/// rewrites it after every write.
#[derive(Debug, Default, Clone)]
pub struct MemoryProfileStore {
    records: Arc<DashMap<(Identity, RecordKey), String>>,
    snapshot_path: Option<PathBuf>,
    snapshot_lock: Arc<Mutex<()>>,
}

impl MemoryProfileStore {
    pub fn new() -> Self {
        MemoryProfileStore::default()
    }

    pub async fn open(path: impl AsRef<Path>) -> Result<Self, ProfileError> {
        let path = path.as_ref().to_path_buf();
        let store = MemoryProfileStore {
            snapshot_path: Some(path.clone()),
            ..MemoryProfileStore::default()
        };

        let raw = match tokio::fs::read_to_string(&path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!("no profile snapshot at {}, starting empty", path.display());
                return Ok(store);
            }
            Err(e) => return Err(ProfileError::Io(e.to_string())),
        };
        let snapshot: Snapshot =
            serde_json::from_str(&raw).map_err(|e| ProfileError::Io(e.to_string()))?;

        for (identity, records) in snapshot {
            for (key, value) in records {
                match RecordKey::from_key(&key) {
                    Some(key) => {
                        store.records.insert((identity.clone(), key), value);
                    }
                    None => debug!("skipping unknown record key {key} for {identity}"),
                }
            }
        }
        info!(
            "loaded {} profile records from {}",
            store.records.len(),
            path.display()
        );
        Ok(store)
    }

    pub async fn seed_admins(&self, admins: &[Identity]) -> Result<(), ProfileError> {
        for admin in admins {
            self.set(admin, RecordKey::Admin, "true".to_owned()).await?;
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    fn snapshot(&self) -> Snapshot {
        let mut snapshot = Snapshot::new();
        for entry in self.records.iter() {
            let (identity, key) = entry.key();
            snapshot
                .entry(identity.clone())
                .or_default()
                .insert(key.as_str().to_owned(), entry.value().clone());
        }
        snapshot
    }

    /// Callers hold `snapshot_lock`.
    async fn persist(&self) -> Result<(), ProfileError> {
        let Some(path) = &self.snapshot_path else {
            return Ok(());
        };
        let json = serde_json::to_string_pretty(&self.snapshot())
            .map_err(|e| ProfileError::Io(e.to_string()))?;
        let tmp = path.with_extension("tmp");
        tokio::fs::write(&tmp, json)
            .await
            .map_err(|e| ProfileError::Io(e.to_string()))?;
        tokio::fs::rename(&tmp, path)
            .await
            .map_err(|e| ProfileError::Io(e.to_string()))
    }
}

#[async_trait]
impl ProfileStore for MemoryProfileStore {
    async fn get(
        &self,
        identity: &Identity,
        key: RecordKey,
    ) -> Result<Option<String>, ProfileError> {
        Ok(self
            .records
            .get(&(identity.clone(), key))
            .map(|value| value.clone()))
    }

    async fn set(
        &self,
        identity: &Identity,
        key: RecordKey,
        value: String,
    ) -> Result<(), ProfileError> {
        debug!("{identity}: {key} = {value:?}");
        let _guard = self.snapshot_lock.lock().await;
        let record = (identity.clone(), key);
        let previous = self.records.insert(record.clone(), value);
        if let Err(e) = self.persist().await {
            warn!("{identity}: {key} not saved, keeping the previous value: {e}");
            match previous {
                Some(previous) => self.records.insert(record, previous),
                None => self.records.remove(&record).map(|(_, value)| value),
            };
            return Err(e);
        }
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;

    /// Store whose every call fails.
    pub struct UnavailableStore;

    #[async_trait]
    impl ProfileStore for UnavailableStore {
        async fn get(&self, _: &Identity, _: RecordKey) -> Result<Option<String>, ProfileError> {
            Err(ProfileError::Unavailable("backend offline".to_owned()))
        }

        async fn set(&self, _: &Identity, _: RecordKey, _: String) -> Result<(), ProfileError> {
            Err(ProfileError::Unavailable("backend offline".to_owned()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_path(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!(
            "chat_profiles_{}_{}.json",
            name,
            std::process::id()
        ))
    }

    #[tokio::test]
    async fn records_are_scoped_per_identity_and_key() {
        let store = MemoryProfileStore::new();
        let alice = Identity::from("alice");
        let bob = Identity::from("bob");

        store
            .set(&alice, RecordKey::Mute, "2".to_owned())
            .await
            .unwrap();

        assert_eq!(
            store.get(&alice, RecordKey::Mute).await.unwrap(),
            Some("2".to_owned())
        );
        assert_eq!(store.get(&alice, RecordKey::Ban).await.unwrap(), None);
        assert_eq!(store.get(&bob, RecordKey::Mute).await.unwrap(), None);
    }

    #[tokio::test]
    async fn last_writer_wins() {
        let store = MemoryProfileStore::new();
        let alice = Identity::from("alice");
        store.set(&alice, RecordKey::Mute, "1".to_owned()).await.unwrap();
        store.set(&alice, RecordKey::Mute, "2".to_owned()).await.unwrap();
        assert_eq!(
            store.get(&alice, RecordKey::Mute).await.unwrap(),
            Some("2".to_owned())
        );
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn failed_snapshot_write_leaves_the_record_unchanged() {
        let path = std::env::temp_dir()
            .join(format!("chat_profiles_missing_dir_{}", std::process::id()))
            .join("profiles.json");
        let store = MemoryProfileStore::open(&path).await.unwrap();
        let bob = Identity::from("bob");

        assert!(store.set(&bob, RecordKey::Ban, "2099-01-01T00:00:00Z".to_owned()).await.is_err());
        assert_eq!(store.get(&bob, RecordKey::Ban).await.unwrap(), None);
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn snapshot_survives_reopen() {
        let path = temp_path("reopen");
        let _ = tokio::fs::remove_file(&path).await;

        let store = MemoryProfileStore::open(&path).await.unwrap();
        assert!(store.is_empty());
        store
            .seed_admins(&[Identity::from("root")])
            .await
            .unwrap();
        store
            .set(&Identity::from("bob"), RecordKey::BlockList, r#"["carol"]"#.to_owned())
            .await
            .unwrap();

        let reopened = MemoryProfileStore::open(&path).await.unwrap();
        assert_eq!(
            reopened
                .get(&Identity::from("root"), RecordKey::Admin)
                .await
                .unwrap(),
            Some("true".to_owned())
        );
        assert_eq!(
            reopened
                .get(&Identity::from("bob"), RecordKey::BlockList)
                .await
                .unwrap(),
            Some(r#"["carol"]"#.to_owned())
        );

        let _ = tokio::fs::remove_file(&path).await;
    }

    #[tokio::test]
    async fn corrupt_snapshot_is_an_error() {
        let path = temp_path("corrupt");
        tokio::fs::write(&path, "not json").await.unwrap();
        assert!(matches!(
            MemoryProfileStore::open(&path).await,
            Err(ProfileError::Io(_))
        ));
        let _ = tokio::fs::remove_file(&path).await;
    }
}
