// mysql-s3-backup/src/backup/retention.rs
use chrono::{DateTime, Days, TimeDelta, TimeZone, Utc};
use tracing::{debug, info};

use super::s3_upload::namespace_prefix;
use crate::clock::resolve_local;
use crate::errors::SweepError;
use crate::storage::{ObjectStore, StoredObject};

/// `now` minus `retention_days` calendar days (same wall-clock time), as a UTC instant.
///
/// A shifted wall time that does not exist or occurs twice is resolved like a
/// trigger time. `None` only when the date leaves chrono's range.
pub fn retention_cutoff<Tz: TimeZone>(now: &DateTime<Tz>, retention_days: u32) -> Option<DateTime<Utc>> {
    let shifted = now
        .naive_local()
        .checked_sub_days(Days::new(u64::from(retention_days)))?;
    resolve_local(&now.timezone(), shifted)
        .or_else(|| {
            now.clone()
                .checked_sub_signed(TimeDelta::try_days(i64::from(retention_days))?)
        })
        .map(|cutoff| cutoff.with_timezone(&Utc))
}

/// Objects strictly older than `cutoff`. An object modified exactly at the cutoff is kept.
pub fn expired_objects(objects: &[StoredObject], cutoff: DateTime<Utc>) -> Vec<&StoredObject> {
    objects
        .iter()
        .filter(|object| object.last_modified < cutoff)
        .collect()
}

/// Deletes every stored backup of `db_name` older than the retention window.
///
/// A listing failure deletes nothing. The first failed delete stops the sweep;
/// objects already deleted in this pass stay deleted.
pub async fn sweep_expired_backups<Tz: TimeZone>(
    store: &dyn ObjectStore,
    customer_name: &str,
    db_name: &str,
    retention_days: u32,
    now: DateTime<Tz>,
) -> Result<usize, SweepError> {
    let prefix = namespace_prefix(customer_name, db_name);
    let cutoff = retention_cutoff(&now, retention_days).ok_or(SweepError::Cutoff(retention_days))?;

    let objects = store
        .list_objects(&prefix)
        .await
        .map_err(|source| SweepError::List {
            prefix: prefix.clone(),
            source,
        })?;

    let expired = expired_objects(&objects, cutoff);
    debug!(
        prefix = %prefix,
        listed = objects.len(),
        expired = expired.len(),
        cutoff = %cutoff,
        "Evaluated retention"
    );

    let mut deleted = 0;
    for object in expired {
        info!("Deleting expired backup {} (last modified {})", object.key, object.last_modified);
        store
            .delete_object(&object.key)
            .await
            .map_err(|source| SweepError::Delete {
                key: object.key.clone(),
                deleted_so_far: deleted,
                source,
            })?;
        deleted += 1;
    }

    Ok(deleted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::test_zone::CentralEurope2026;
    use crate::storage::memory::MemoryStore;
    use chrono::{Duration, Local};

    fn now() -> DateTime<Local> {
        Local.with_ymd_and_hms(2026, 6, 15, 2, 0, 0).single().unwrap()
    }

    fn object(key: &str, last_modified: DateTime<Utc>) -> StoredObject {
        StoredObject {
            key: key.to_string(),
            last_modified,
        }
    }

    #[test]
    fn test_cutoff_is_calendar_days() {
        let cutoff = retention_cutoff(&now(), 7).unwrap();
        let expected = Local
            .with_ymd_and_hms(2026, 6, 8, 2, 0, 0)
            .single()
            .unwrap()
            .with_timezone(&Utc);
        assert_eq!(cutoff, expected);
    }

    #[test]
    fn test_cutoff_landing_in_spring_gap_still_resolves() {
        let now = CentralEurope2026.with_ymd_and_hms(2026, 4, 5, 2, 30, 0).single().unwrap();
        let cutoff = retention_cutoff(&now, 7).unwrap();
        // 2026-03-29 02:30 does not exist; the cutoff moves to 03:00 (+02:00).
        assert_eq!(cutoff, Utc.with_ymd_and_hms(2026, 3, 29, 1, 0, 0).unwrap());
    }

    #[test]
    fn test_ambiguous_cutoff_takes_earlier_instant() {
        let now = CentralEurope2026.with_ymd_and_hms(2026, 11, 1, 2, 30, 0).single().unwrap();
        let cutoff = retention_cutoff(&now, 7).unwrap();
        // 2026-10-25 02:30 occurs at +02:00 and again at +01:00.
        assert_eq!(cutoff, Utc.with_ymd_and_hms(2026, 10, 25, 0, 30, 0).unwrap());
    }

    #[tokio::test]
    async fn test_sweep_runs_when_cutoff_falls_on_dst_change() {
        let store = MemoryStore::default();
        store.insert("acme/orders/old", Utc.with_ymd_and_hms(2026, 3, 28, 0, 0, 0).unwrap());
        store.insert("acme/orders/new", Utc.with_ymd_and_hms(2026, 3, 30, 0, 0, 0).unwrap());
        let now = CentralEurope2026
            .with_ymd_and_hms(2026, 4, 5, 2, 30, 0)
            .single()
            .unwrap();

        let deleted = sweep_expired_backups(&store, "acme", "orders", 7, now)
            .await
            .unwrap();
        assert_eq!(deleted, 1);
        assert_eq!(store.keys(), vec!["acme/orders/new"]);
    }

    #[test]
    fn test_expired_objects_is_strict_filter() {
        let cutoff = retention_cutoff(&now(), 7).unwrap();
        let objects = vec![
            object("old", cutoff - Duration::days(3)),
            object("just-old", cutoff - Duration::milliseconds(1)),
            object("boundary", cutoff),
            object("fresh", cutoff + Duration::hours(1)),
        ];

        let expired: Vec<&str> = expired_objects(&objects, cutoff)
            .into_iter()
            .map(|o| o.key.as_str())
            .collect();
        assert_eq!(expired, vec!["old", "just-old"]);
    }

    #[tokio::test]
    async fn test_sweep_deletes_only_expired_objects_in_namespace() {
        let cutoff = retention_cutoff(&now(), 7).unwrap();
        let store = MemoryStore::default();
        store.insert("acme/orders/old.sql.tar.gz", cutoff - Duration::days(1));
        store.insert("acme/orders/boundary.sql.tar.gz", cutoff);
        store.insert("acme/orders/new.sql.tar.gz", cutoff + Duration::days(6));
        store.insert("acme/orders_archive/old.sql.tar.gz", cutoff - Duration::days(30));
        store.insert("other/orders/old.sql.tar.gz", cutoff - Duration::days(30));

        let deleted = sweep_expired_backups(&store, "acme", "orders", 7, now())
            .await
            .unwrap();

        assert_eq!(deleted, 1);
        assert_eq!(
            store.keys(),
            vec![
                "acme/orders/boundary.sql.tar.gz",
                "acme/orders/new.sql.tar.gz",
                "acme/orders_archive/old.sql.tar.gz",
                "other/orders/old.sql.tar.gz",
            ]
        );
    }

    #[tokio::test]
    async fn test_listing_failure_deletes_nothing() {
        let store = MemoryStore {
            fail_list: true,
            ..Default::default()
        };
        store.insert("acme/orders/old", Utc::now() - Duration::days(100));

        let err = sweep_expired_backups(&store, "acme", "orders", 1, Local::now())
            .await
            .unwrap_err();
        assert!(matches!(err, SweepError::List { .. }));
        assert_eq!(store.keys().len(), 1);
    }

    #[tokio::test]
    async fn test_delete_failure_stops_sweep_without_rollback() {
        let cutoff = retention_cutoff(&now(), 7).unwrap();
        let store = MemoryStore {
            fail_delete_key: Some("acme/orders/b".to_string()),
            ..Default::default()
        };
        // Listing is key-ordered: a, b, c.
        store.insert("acme/orders/a", cutoff - Duration::days(3));
        store.insert("acme/orders/b", cutoff - Duration::days(2));
        store.insert("acme/orders/c", cutoff - Duration::days(1));

        let err = sweep_expired_backups(&store, "acme", "orders", 7, now())
            .await
            .unwrap_err();

        match err {
            SweepError::Delete { key, deleted_so_far, .. } => {
                assert_eq!(key, "acme/orders/b");
                assert_eq!(deleted_so_far, 1);
            }
            other => panic!("unexpected error: {:?}", other),
        }
        assert_eq!(store.keys(), vec!["acme/orders/b", "acme/orders/c"]);
    }
}
