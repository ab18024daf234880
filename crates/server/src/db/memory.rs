//! In-memory implementation of every store.
//!
//! Used by the test suites and by `WALLET_STORAGE=memory` for local runs.
//! All three tables live behind one `RwLock` so the change-detection join sees
//! a consistent snapshot, and every mutation holds the write lock for its
//! whole read-modify-write.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use tokio::sync::RwLock;

use wallet_core::{
    DeviceLogId, PassKey, PassRecordId, PushToken, RegistrationId, UnixTime, merge_json,
};

use super::{LogSink, PassStore, RegistrationStore, RepositoryError};
use crate::models::{
    ChangedSerials, DeviceLog, NewDeviceLog, NewPass, Pass, Registration, UpsertedRegistration,
};

/// Registration key: device plus pass.
type RegistrationKey = (String, PassKey);

#[derive(Default)]
struct Tables {
    passes: HashMap<PassKey, Pass>,
    registrations: HashMap<RegistrationKey, Registration>,
    device_logs: Vec<DeviceLog>,
    next_id: i64,
    /// Newest pass version handed out, across all passes.
    version_clock: UnixTime,
}

impl Tables {
    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }

    fn issue_version(&mut self) -> UnixTime {
        self.version_clock = self.version_clock.next_version(UnixTime::now());
        self.version_clock
    }
}

/// Shared in-memory store. Cloning shares the underlying tables.
#[derive(Clone, Default)]
pub struct MemoryStore {
    tables: Arc<RwLock<Tables>>,
}

impl MemoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of registrations currently stored.
    pub async fn registration_count(&self) -> usize {
        self.tables.read().await.registrations.len()
    }
}

#[async_trait]
impl PassStore for MemoryStore {
    async fn create_or_replace(&self, new: NewPass) -> Result<Pass, RepositoryError> {
        let mut tables = self.tables.write().await;
        let now = Utc::now();
        let version = tables.issue_version();

        let previous = tables.passes.get(&new.key).cloned();
        let pass = match previous {
            Some(existing) => Pass {
                template_type: new.template_type,
                data: new.data,
                version_updated_at: version,
                updated_at: now,
                ..existing
            },
            None => Pass {
                id: PassRecordId::new(tables.next_id()),
                pass_type_identifier: new.key.pass_type_identifier.clone(),
                serial_number: new.key.serial_number.clone(),
                template_type: new.template_type,
                data: new.data,
                version_updated_at: version,
                created_at: now,
                updated_at: now,
            },
        };

        tables.passes.insert(new.key, pass.clone());
        Ok(pass)
    }

    async fn merge_update(&self, key: &PassKey, partial: Value) -> Result<Pass, RepositoryError> {
        let mut tables = self.tables.write().await;
        if !tables.passes.contains_key(key) {
            return Err(RepositoryError::NotFound);
        }
        let version = tables.issue_version();
        let pass = tables
            .passes
            .get_mut(key)
            .ok_or(RepositoryError::NotFound)?;

        merge_json(&mut pass.data, partial);
        pass.version_updated_at = version;
        pass.updated_at = Utc::now();

        Ok(pass.clone())
    }

    async fn get(&self, key: &PassKey) -> Result<Pass, RepositoryError> {
        self.tables
            .read()
            .await
            .passes
            .get(key)
            .cloned()
            .ok_or(RepositoryError::NotFound)
    }

    async fn health_check(&self) -> Result<(), RepositoryError> {
        Ok(())
    }
}

#[async_trait]
impl RegistrationStore for MemoryStore {
    async fn upsert(
        &self,
        device_id: &str,
        key: &PassKey,
        push_token: &str,
    ) -> Result<UpsertedRegistration, RepositoryError> {
        let push_token = PushToken::parse(push_token)?;
        let mut tables = self.tables.write().await;
        let now = Utc::now();
        let reg_key = (device_id.to_owned(), key.clone());

        if let Some(existing) = tables.registrations.get_mut(&reg_key) {
            existing.push_token = push_token;
            existing.updated_at = now;
            return Ok(UpsertedRegistration {
                registration: existing.clone(),
                created: false,
            });
        }

        let registration = Registration {
            id: RegistrationId::new(tables.next_id()),
            device_library_identifier: device_id.to_owned(),
            pass_type_identifier: key.pass_type_identifier.clone(),
            serial_number: key.serial_number.clone(),
            push_token,
            registered_at: now,
            updated_at: now,
            last_notified_at: None,
        };
        tables.registrations.insert(reg_key, registration.clone());

        Ok(UpsertedRegistration {
            registration,
            created: true,
        })
    }

    async fn remove(&self, device_id: &str, key: &PassKey) -> Result<(), RepositoryError> {
        self.tables
            .write()
            .await
            .registrations
            .remove(&(device_id.to_owned(), key.clone()));
        Ok(())
    }

    async fn list_by_pass(&self, key: &PassKey) -> Result<Vec<Registration>, RepositoryError> {
        let tables = self.tables.read().await;
        let mut rows: Vec<Registration> = tables
            .registrations
            .values()
            .filter(|r| r.pass_type_identifier == key.pass_type_identifier)
            .filter(|r| r.serial_number == key.serial_number)
            .cloned()
            .collect();
        rows.sort_by_key(|r| r.id);
        Ok(rows)
    }

    async fn list_changed_serials(
        &self,
        device_id: &str,
        pass_type_identifier: &str,
        since: UnixTime,
    ) -> Result<ChangedSerials, RepositoryError> {
        let tables = self.tables.read().await;
        let changed = tables
            .registrations
            .values()
            .filter(|r| r.device_library_identifier == device_id)
            .filter(|r| r.pass_type_identifier == pass_type_identifier)
            .filter_map(|r| {
                let pass = tables.passes.get(&r.pass_key())?;
                (pass.version_updated_at > since)
                    .then(|| (r.serial_number.clone(), pass.version_updated_at))
            })
            .collect::<Vec<_>>();

        Ok(ChangedSerials::from_changed(
            changed,
            tables.version_clock.max(since),
        ))
    }

    async fn mark_notified(
        &self,
        device_id: &str,
        key: &PassKey,
        at: DateTime<Utc>,
    ) -> Result<(), RepositoryError> {
        let mut tables = self.tables.write().await;
        if let Some(registration) = tables
            .registrations
            .get_mut(&(device_id.to_owned(), key.clone()))
        {
            registration.last_notified_at = Some(at);
        }
        Ok(())
    }
}

#[async_trait]
impl LogSink for MemoryStore {
    async fn append(&self, entry: NewDeviceLog) -> Result<DeviceLog, RepositoryError> {
        let mut tables = self.tables.write().await;
        let log = DeviceLog {
            id: DeviceLogId::new(tables.next_id()),
            device_library_identifier: entry.device_library_identifier,
            level: entry.level,
            message: entry.message,
            pass_type_identifier: entry.pass_type_identifier,
            serial_number: entry.serial_number,
            context: entry.context,
            created_at: Utc::now(),
        };
        tables.device_logs.push(log.clone());
        Ok(log)
    }

    async fn recent(&self, limit: i64) -> Result<Vec<DeviceLog>, RepositoryError> {
        let limit = usize::try_from(limit).unwrap_or(0);
        let tables = self.tables.read().await;
        Ok(tables.device_logs.iter().rev().take(limit).cloned().collect())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use serde_json::json;
    use wallet_core::LogLevel;

    use super::*;

    fn token(c: char) -> String {
        c.to_string().repeat(64)
    }

    fn new_pass(serial: &str, data: Value) -> NewPass {
        NewPass {
            key: PassKey::new("pass.t", serial),
            template_type: "generic".to_string(),
            data,
        }
    }

    #[tokio::test]
    async fn test_create_then_get_returns_same_data() {
        let store = MemoryStore::new();
        let data = json!({"description": "x", "nested": {"a": [1, 2]}});
        store.create_or_replace(new_pass("s1", data.clone())).await.unwrap();

        let pass = store.get(&PassKey::new("pass.t", "s1")).await.unwrap();
        assert_eq!(pass.data, data);
        assert_eq!(pass.template_type, "generic");
        assert!(pass.version_updated_at > UnixTime::ZERO);
    }

    #[tokio::test]
    async fn test_get_missing_is_not_found() {
        let store = MemoryStore::new();
        let result = store.get(&PassKey::new("pass.t", "nope")).await;
        assert!(matches!(result, Err(RepositoryError::NotFound)));
    }

    #[tokio::test]
    async fn test_replace_moves_version_forward_and_keeps_id() {
        let store = MemoryStore::new();
        let first = store.create_or_replace(new_pass("s1", json!({}))).await.unwrap();
        let second = store
            .create_or_replace(new_pass("s1", json!({"v": 2})))
            .await
            .unwrap();

        assert_eq!(first.id, second.id);
        assert!(second.version_updated_at > first.version_updated_at);
        assert_eq!(second.data, json!({"v": 2}));
        assert_eq!(second.created_at, first.created_at);
    }

    #[tokio::test]
    async fn test_merge_update_deep_merges() {
        let store = MemoryStore::new();
        store
            .create_or_replace(new_pass("s1", json!({"description": "x", "logoText": "Acme"})))
            .await
            .unwrap();

        let updated = store
            .merge_update(&PassKey::new("pass.t", "s1"), json!({"description": "y"}))
            .await
            .unwrap();

        assert_eq!(updated.data, json!({"description": "y", "logoText": "Acme"}));
    }

    #[tokio::test]
    async fn test_merge_update_missing_is_not_found() {
        let store = MemoryStore::new();
        let result = store
            .merge_update(&PassKey::new("pass.t", "s1"), json!({"a": 1}))
            .await;
        assert!(matches!(result, Err(RepositoryError::NotFound)));
    }

    #[tokio::test]
    async fn test_upsert_is_idempotent() {
        let store = MemoryStore::new();
        let key = PassKey::new("pass.t", "s1");

        let first = store.upsert("device", &key, &token('a')).await.unwrap();
        let second = store.upsert("device", &key, &token('b')).await.unwrap();

        assert!(first.created);
        assert!(!second.created);
        assert_eq!(first.registration.id, second.registration.id);
        assert_eq!(second.registration.push_token.as_str(), token('b'));
        assert_eq!(store.registration_count().await, 1);
    }

    #[tokio::test]
    async fn test_upsert_rejects_bad_token() {
        let store = MemoryStore::new();
        let result = store
            .upsert("device", &PassKey::new("pass.t", "s1"), &token('g'))
            .await;

        assert!(matches!(result, Err(RepositoryError::InvalidToken(_))));
        assert_eq!(store.registration_count().await, 0);
    }

    #[tokio::test]
    async fn test_remove_absent_is_ok() {
        let store = MemoryStore::new();
        store
            .remove("ghost", &PassKey::new("pass.t", "s1"))
            .await
            .unwrap();
        assert_eq!(store.registration_count().await, 0);
    }

    #[tokio::test]
    async fn test_list_by_pass_only_returns_that_pass() {
        let store = MemoryStore::new();
        let s1 = PassKey::new("pass.t", "s1");
        let s2 = PassKey::new("pass.t", "s2");
        store.upsert("d1", &s1, &token('a')).await.unwrap();
        store.upsert("d2", &s1, &token('b')).await.unwrap();
        store.upsert("d3", &s2, &token('c')).await.unwrap();

        let rows = store.list_by_pass(&s1).await.unwrap();
        let devices: Vec<_> = rows
            .iter()
            .map(|r| r.device_library_identifier.as_str())
            .collect();
        assert_eq!(devices, vec!["d1", "d2"]);
    }

    #[tokio::test]
    async fn test_list_changed_serials_is_strict() {
        let store = MemoryStore::new();
        let key = PassKey::new("pass.t", "s1");
        let pass = store.create_or_replace(new_pass("s1", json!({}))).await.unwrap();
        store.upsert("device", &key, &token('a')).await.unwrap();

        let version = pass.version_updated_at;
        let before = UnixTime::from_secs(version.as_secs() - 1);

        let changed = store
            .list_changed_serials("device", "pass.t", before)
            .await
            .unwrap();
        assert!(changed.serial_numbers.contains("s1"));
        assert_eq!(changed.last_updated, version);

        let unchanged = store
            .list_changed_serials("device", "pass.t", version)
            .await
            .unwrap();
        assert!(unchanged.serial_numbers.is_empty());
    }

    #[tokio::test]
    async fn test_list_changed_serials_scoped_to_device_and_type() {
        let store = MemoryStore::new();
        store.create_or_replace(new_pass("s1", json!({}))).await.unwrap();
        store
            .create_or_replace(NewPass {
                key: PassKey::new("pass.other", "s9"),
                template_type: "generic".to_string(),
                data: json!({}),
            })
            .await
            .unwrap();
        store
            .upsert("device", &PassKey::new("pass.t", "s1"), &token('a'))
            .await
            .unwrap();
        store
            .upsert("device", &PassKey::new("pass.other", "s9"), &token('a'))
            .await
            .unwrap();
        store
            .upsert("other-device", &PassKey::new("pass.t", "s1"), &token('b'))
            .await
            .unwrap();

        let changed = store
            .list_changed_serials("device", "pass.t", UnixTime::ZERO)
            .await
            .unwrap();
        assert_eq!(changed.serial_numbers.len(), 1);
        assert!(changed.serial_numbers.contains("s1"));
    }

    #[tokio::test]
    async fn test_list_changed_serials_ignores_registrations_without_pass() {
        let store = MemoryStore::new();
        store
            .upsert("device", &PassKey::new("pass.t", "missing"), &token('a'))
            .await
            .unwrap();

        let changed = store
            .list_changed_serials("device", "pass.t", UnixTime::ZERO)
            .await
            .unwrap();
        assert!(changed.serial_numbers.is_empty());
    }

    #[tokio::test]
    async fn test_write_burst_does_not_hide_later_update() {
        let store = MemoryStore::new();
        let s1 = PassKey::new("pass.t", "s1");
        let s2 = PassKey::new("pass.t", "s2");
        store.create_or_replace(new_pass("s2", json!({}))).await.unwrap();
        store.create_or_replace(new_pass("s1", json!({}))).await.unwrap();
        for n in 0..5 {
            store.merge_update(&s1, json!({ "n": n })).await.unwrap();
        }
        store.upsert("device", &s1, &token('a')).await.unwrap();
        store.upsert("device", &s2, &token('a')).await.unwrap();

        let first = store
            .list_changed_serials("device", "pass.t", UnixTime::ZERO)
            .await
            .unwrap();

        let updated = store.merge_update(&s2, json!({ "seat": "4B" })).await.unwrap();
        assert!(updated.version_updated_at > first.last_updated);

        let second = store
            .list_changed_serials("device", "pass.t", first.last_updated)
            .await
            .unwrap();
        assert_eq!(second.serial_numbers.len(), 1);
        assert!(second.serial_numbers.contains("s2"));
        assert!(second.last_updated > first.last_updated);
    }

    #[tokio::test]
    async fn test_versions_increase_across_passes() {
        let store = MemoryStore::new();
        let mut previous = UnixTime::ZERO;
        for serial in ["a", "b", "a", "c", "b"] {
            let pass = store
                .create_or_replace(new_pass(serial, json!({})))
                .await
                .unwrap();
            assert!(pass.version_updated_at > previous);
            previous = pass.version_updated_at;
        }
    }

    #[tokio::test]
    async fn test_empty_poll_keeps_requested_tag() {
        let store = MemoryStore::new();
        store.create_or_replace(new_pass("s1", json!({}))).await.unwrap();
        store
            .upsert("device", &PassKey::new("pass.t", "s1"), &token('a'))
            .await
            .unwrap();
        let ahead = UnixTime::from_secs(UnixTime::now().as_secs() + 3_600);

        let changed = store
            .list_changed_serials("device", "pass.t", ahead)
            .await
            .unwrap();

        assert!(changed.serial_numbers.is_empty());
        assert_eq!(changed.last_updated, ahead);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_upserts_keep_one_registration() {
        let store = MemoryStore::new();
        let key = PassKey::new("pass.t", "s1");

        let tasks = (0..16).map(|i| {
            let store = store.clone();
            let key = key.clone();
            let digit = if i % 2 == 0 { 'a' } else { 'b' };
            tokio::spawn(async move { store.upsert("device", &key, &token(digit)).await })
        });
        let results = futures::future::join_all(tasks).await;

        let created = results
            .into_iter()
            .map(|r| r.unwrap().unwrap())
            .filter(|r| r.created)
            .count();
        assert_eq!(created, 1);
        assert_eq!(store.registration_count().await, 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_merges_keep_every_key() {
        let store = MemoryStore::new();
        let key = PassKey::new("pass.t", "s1");
        store
            .create_or_replace(new_pass("s1", json!({ "base": true })))
            .await
            .unwrap();

        let tasks = (0..16).map(|i| {
            let store = store.clone();
            let key = key.clone();
            let mut patch = serde_json::Map::new();
            patch.insert(format!("k{i}"), json!(i));
            tokio::spawn(async move { store.merge_update(&key, Value::Object(patch)).await })
        });
        for result in futures::future::join_all(tasks).await {
            result.unwrap().unwrap();
        }

        let pass = store.get(&key).await.unwrap();
        let data = pass.data.as_object().unwrap();
        assert_eq!(data.len(), 17);
        assert_eq!(data["base"], json!(true));
        for i in 0..16 {
            assert_eq!(data[format!("k{i}").as_str()], json!(i));
        }
    }

    #[tokio::test]
    async fn test_mark_notified() {
        let store = MemoryStore::new();
        let key = PassKey::new("pass.t", "s1");
        store.upsert("device", &key, &token('a')).await.unwrap();

        let at = Utc::now();
        store.mark_notified("device", &key, at).await.unwrap();

        let rows = store.list_by_pass(&key).await.unwrap();
        assert_eq!(rows[0].last_notified_at, Some(at));
    }

    #[tokio::test]
    async fn test_device_logs_newest_first() {
        let store = MemoryStore::new();
        store
            .append(NewDeviceLog::error(Some("d".into()), "first"))
            .await
            .unwrap();
        store
            .append(NewDeviceLog::error(Some("d".into()), "second"))
            .await
            .unwrap();

        let logs = store.recent(10).await.unwrap();
        assert_eq!(logs.len(), 2);
        assert_eq!(logs[0].message, "second");
        assert_eq!(logs[0].level, LogLevel::Error);

        let limited = store.recent(1).await.unwrap();
        assert_eq!(limited.len(), 1);
    }
}
