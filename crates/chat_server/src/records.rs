use chrono::{DateTime, Datelike, SecondsFormat, TimeDelta, Utc};
use log::{error, warn};

use crate::channels::ChatChannel;
use crate::errors::ProfileError;
use crate::profile_store::{ProfileStore, RecordKey};
use crate::types::Identity;

// Mute: integer bitmask of muted channels. "-1" is how older records spell
// every channel.
pub fn parse_mute_flags(raw: &str) -> ChatChannel {
    match raw.trim().parse::<i64>() {
        Ok(-1) => ChatChannel::all(),
        Ok(bits) => u32::try_from(bits)
            .map(ChatChannel::from_bits_truncate)
            .unwrap_or(ChatChannel::empty()),
        Err(_) => ChatChannel::empty(),
    }
}

pub async fn get_mute(
    store: &dyn ProfileStore,
    identity: &Identity,
) -> Result<ChatChannel, ProfileError> {
    let raw = store.get(identity, RecordKey::Mute).await?;
    Ok(raw.as_deref().map(parse_mute_flags).unwrap_or(ChatChannel::empty()))
}

pub async fn set_mute(
    store: &dyn ProfileStore,
    identity: &Identity,
    flags: ChatChannel,
) -> Result<(), ProfileError> {
    store
        .set(identity, RecordKey::Mute, flags.bits().to_string())
        .await
}

// Ban: RFC 3339 expiry, empty when not banned.
pub async fn ban_expiry(
    store: &dyn ProfileStore,
    identity: &Identity,
) -> Result<Option<DateTime<Utc>>, ProfileError> {
    let Some(raw) = store.get(identity, RecordKey::Ban).await? else {
        return Ok(None);
    };
    let raw = raw.trim();
    if raw.is_empty() {
        return Ok(None);
    }
    DateTime::parse_from_rfc3339(raw)
        .map(|expiry| Some(expiry.with_timezone(&Utc)))
        .map_err(|e| ProfileError::CorruptRecord {
            identity: identity.to_string(),
            key: RecordKey::Ban.as_str(),
            reason: e.to_string(),
        })
}

/// An expiry at or before `now` no longer bans.
pub async fn is_banned(
    store: &dyn ProfileStore,
    identity: &Identity,
    now: DateTime<Utc>,
) -> Result<bool, ProfileError> {
    Ok(ban_expiry(store, identity)
        .await?
        .is_some_and(|expiry| expiry > now))
}

pub async fn get_ban(store: &dyn ProfileStore, identity: &Identity) -> Result<bool, ProfileError> {
    is_banned(store, identity, Utc::now()).await
}

/// Expiry of a ban starting at `now`. `None` when it falls outside the
/// four-digit years an RFC 3339 record can hold.
pub fn ban_until(now: DateTime<Utc>, duration: TimeDelta) -> Option<DateTime<Utc>> {
    now.checked_add_signed(duration)
        .filter(|until| (0..=9999).contains(&until.year()))
}

pub async fn set_ban(
    store: &dyn ProfileStore,
    identity: &Identity,
    until: DateTime<Utc>,
) -> Result<(), ProfileError> {
    store
        .set(
            identity,
            RecordKey::Ban,
            until.to_rfc3339_opts(SecondsFormat::Secs, true),
        )
        .await
}

pub async fn clear_ban(store: &dyn ProfileStore, identity: &Identity) -> Result<(), ProfileError> {
    store.set(identity, RecordKey::Ban, String::new()).await
}

// Block list: JSON array of lowercase display names.
pub async fn get_block_list(
    store: &dyn ProfileStore,
    identity: &Identity,
) -> Result<Vec<String>, ProfileError> {
    let Some(raw) = store.get(identity, RecordKey::BlockList).await? else {
        return Ok(Vec::new());
    };
    if raw.trim().is_empty() {
        return Ok(Vec::new());
    }
    serde_json::from_str::<Vec<String>>(&raw).map_err(|e| ProfileError::CorruptRecord {
        identity: identity.to_string(),
        key: RecordKey::BlockList.as_str(),
        reason: e.to_string(),
    })
}

pub async fn set_block_list(
    store: &dyn ProfileStore,
    identity: &Identity,
    names: &[String],
) -> Result<(), ProfileError> {
    let json = serde_json::to_string(names).map_err(|e| ProfileError::CorruptRecord {
        identity: identity.to_string(),
        key: RecordKey::BlockList.as_str(),
        reason: e.to_string(),
    })?;
    store.set(identity, RecordKey::BlockList, json).await
}

pub fn block_list_contains(names: &[String], name: &str) -> bool {
    names.iter().any(|n| n.eq_ignore_ascii_case(name))
}

/// Missing, unparsable or unreadable records all mean "not an admin".
pub async fn is_admin(store: &dyn ProfileStore, identity: &Identity) -> bool {
    match store.get(identity, RecordKey::Admin).await {
        Ok(Some(raw)) => match raw.trim().to_ascii_lowercase().parse::<bool>() {
            Ok(admin) => admin,
            Err(_) => {
                warn!("unparsable Admin record for {identity}: {raw:?}");
                false
            }
        },
        Ok(None) => false,
        Err(e) => {
            error!("admin lookup for {identity} failed: {e}");
            false
        }
    }
}
