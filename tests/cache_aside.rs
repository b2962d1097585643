#![cfg(feature = "test")]

use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use serde::Serialize;
use taskflow_cache::prelude::*;
use taskflow_cache::test::FakeStore;
use taskflow_cache::test::RecordingObserver;
use taskflow_cache::test::TestError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Report {
    owner: i64,
    total: u64,
}

fn policies() -> PolicyTable {
    PolicyTable::new()
        .with("analytics", "overview", CachePolicy::new(300))
        .unwrap()
        .with(
            "analytics",
            "trends",
            CachePolicy::new(900).with_variants(["7d", "30d", "90d"]),
        )
        .unwrap()
        .with("tasks", "list", CachePolicy::new(300))
        .unwrap()
}

struct Fixture {
    store:    Arc<FakeStore>,
    observer: Arc<RecordingObserver>,
    cache:    ResourceCache,
}

fn fixture() -> Fixture {
    fixture_with(|builder| builder)
}

fn fixture_with(
    tune: impl FnOnce(taskflow_cache::cache::ResourceCacheBuilder) -> taskflow_cache::cache::ResourceCacheBuilder,
) -> Fixture {
    let store = FakeStore::shared();
    let observer = RecordingObserver::shared();
    let builder = ResourceCache::builder()
        .store(store.clone() as Arc<dyn KeyValueStore>)
        .policies(Arc::new(policies()))
        .observer(observer.clone() as Arc<dyn Observer>);
    let cache = tune(builder).build().unwrap();
    Fixture { store, observer, cache }
}

async fn load<T>(calls: &AtomicUsize, value: T) -> Result<T, TestError> {
    calls.fetch_add(1, Ordering::SeqCst);
    Ok(value)
}

async fn fail(calls: &AtomicUsize) -> Result<Report, TestError> {
    calls.fetch_add(1, Ordering::SeqCst);
    Err(TestError::new("database is down"))
}

fn report(total: u64) -> Report {
    Report { owner: 42, total }
}

#[tokio::test]
async fn hit_short_circuits_loader() {
    let fx = fixture();
    let calls = AtomicUsize::new(0);

    let first = fx
        .cache
        .fetch_with_source("analytics", "overview", 42, None, || load(&calls, report(3)))
        .await
        .unwrap();
    assert_eq!(first.source, CacheSource::Loaded);

    let second = fx
        .cache
        .fetch_with_source("analytics", "overview", 42, None, || load(&calls, report(100)))
        .await
        .unwrap();
    assert_eq!(second.source, CacheSource::Hit);
    assert_eq!(second.value, report(3));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(fx.observer.misses(), 1);
    assert_eq!(fx.observer.hits(), 1);
}

#[tokio::test]
async fn miss_populates_with_policy_ttl() {
    let fx = fixture();
    let calls = AtomicUsize::new(0);

    let value: Report = fx
        .cache
        .fetch("analytics", "overview", 42, None, || load(&calls, report(1)))
        .await
        .unwrap();
    assert_eq!(value, report(1));

    let key = fx.cache.key("analytics", "overview", 42, None).unwrap();
    assert!(fx.store.contains(&key));
    assert_eq!(fx.store.ttl_of(&key), Some(Duration::from_secs(300)));

    let again: Report = fx
        .cache
        .fetch("analytics", "overview", 42, None, || load(&calls, report(2)))
        .await
        .unwrap();
    assert_eq!(again, report(1));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn invalidate_then_fetch_misses() {
    let fx = fixture();
    let calls = AtomicUsize::new(0);

    let _: Report = fx
        .cache
        .fetch("analytics", "overview", 42, None, || load(&calls, report(1)))
        .await
        .unwrap();

    let outcome = fx.cache.invalidate("analytics", "overview", 42, None).await.unwrap();
    assert!(outcome.is_complete());
    assert_eq!(outcome.deleted.len(), 1);

    let fetched = fx
        .cache
        .fetch_with_source("analytics", "overview", 42, None, || load(&calls, report(2)))
        .await
        .unwrap();
    assert_eq!(fetched.source, CacheSource::Loaded);
    assert_eq!(fetched.value, report(2));
    assert_eq!(calls.load(Ordering::SeqCst), 2);

    // Deleting an absent key is fine.
    fx.cache.invalidate("tasks", "list", 42, None).await.unwrap();
    fx.cache.invalidate("tasks", "list", 42, None).await.unwrap();
}

#[tokio::test]
async fn entries_expire_by_ttl() {
    let fx = fixture();
    let calls = AtomicUsize::new(0);

    let _: Report = fx
        .cache
        .fetch("analytics", "overview", 42, None, || load(&calls, report(1)))
        .await
        .unwrap();

    fx.store.advance(Duration::from_secs(299));
    let fetched = fx
        .cache
        .fetch_with_source("analytics", "overview", 42, None, || load(&calls, report(2)))
        .await
        .unwrap();
    assert!(fetched.is_hit());

    fx.store.advance(Duration::from_secs(1));
    let fetched = fx
        .cache
        .fetch_with_source("analytics", "overview", 42, None, || load(&calls, report(2)))
        .await
        .unwrap();
    assert_eq!(fetched.source, CacheSource::Loaded);
    assert_eq!(fetched.value, report(2));
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn write_failure_is_invisible_to_readers() {
    let fx = fixture();
    let calls = AtomicUsize::new(0);
    fx.store.fail_set(true);

    let fetched = fx
        .cache
        .fetch_with_source("analytics", "overview", 42, None, || load(&calls, report(5)))
        .await
        .unwrap();
    assert_eq!(fetched.value, report(5));
    assert_eq!(fetched.source, CacheSource::Degraded);
    assert_eq!(fx.observer.degradations(), 1);

    // Nothing was stored, so the loader runs again.
    let _: Report = fx
        .cache
        .fetch("analytics", "overview", 42, None, || load(&calls, report(5)))
        .await
        .unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn read_failure_degrades_to_loader() {
    let fx = fixture();
    let calls = AtomicUsize::new(0);
    fx.store.fail_get(true);

    let fetched = fx
        .cache
        .fetch_with_source("analytics", "overview", 42, None, || load(&calls, report(8)))
        .await
        .unwrap();
    assert_eq!(fetched.value, report(8));
    assert_eq!(fetched.source, CacheSource::Degraded);
    assert_eq!(fx.observer.degradations(), 1);

    fx.store.fail_get(false);
    let fetched = fx
        .cache
        .fetch_with_source("analytics", "overview", 42, None, || load(&calls, report(9)))
        .await
        .unwrap();
    // The write after the failed read went through.
    assert!(fetched.is_hit());
    assert_eq!(fetched.value, report(8));
}

#[tokio::test]
async fn corrupt_entry_is_a_miss() {
    let fx = fixture();
    let calls = AtomicUsize::new(0);
    fx.store
        .raw_insert("analytics:overview:42", b"{not json", Duration::from_secs(300));

    let fetched = fx
        .cache
        .fetch_with_source("analytics", "overview", 42, None, || load(&calls, report(4)))
        .await
        .unwrap();
    assert_eq!(fetched.value, report(4));
    assert_eq!(fetched.source, CacheSource::Degraded);
    assert_eq!(fx.observer.degradations(), 1);

    let fetched = fx
        .cache
        .fetch_with_source("analytics", "overview", 42, None, || load(&calls, report(0)))
        .await
        .unwrap();
    assert!(fetched.is_hit());
    assert_eq!(fetched.value, report(4));
}

#[tokio::test]
async fn loader_failure_propagates() {
    let fx = fixture();
    let calls = AtomicUsize::new(0);

    let err = fx
        .cache
        .fetch("analytics", "overview", 42, None, || fail(&calls))
        .await
        .unwrap_err();
    assert!(matches!(err, CacheError::SourceUnavailable { ref key, .. } if key == "analytics:overview:42"));
    assert!(!err.is_degradation());

    let key = fx.cache.key("analytics", "overview", 42, None).unwrap();
    assert!(!fx.store.contains(&key));
    assert_eq!(fx.store.sets(), 0);
}

#[tokio::test(start_paused = true)]
async fn loader_timeout_is_source_unavailable() {
    let fx = fixture_with(|b| b.loader_timeout(Duration::from_secs(1)));

    let err = fx
        .cache
        .fetch("analytics", "overview", 42, None, || async {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok::<_, TestError>(report(1))
        })
        .await
        .unwrap_err();
    assert!(matches!(err, CacheError::SourceUnavailable { .. }));
    assert_eq!(fx.store.sets(), 0);
}

#[tokio::test(start_paused = true)]
async fn slow_store_degrades_to_pass_through() {
    let fx = fixture_with(|b| b.store_timeout(Duration::from_millis(100)));
    let calls = AtomicUsize::new(0);
    fx.store.delay(Some(Duration::from_secs(5)));

    let fetched = fx
        .cache
        .fetch_with_source("analytics", "overview", 42, None, || load(&calls, report(6)))
        .await
        .unwrap();
    assert_eq!(fetched.value, report(6));
    assert_eq!(fetched.source, CacheSource::Degraded);
    // Both the read and the write timed out.
    assert_eq!(fx.observer.degradations(), 2);
}

#[tokio::test]
async fn variants_are_isolated() {
    let fx = fixture();
    let calls = AtomicUsize::new(0);

    let week: Report = fx
        .cache
        .fetch("analytics", "trends", 42, Some("7d"), || load(&calls, report(7)))
        .await
        .unwrap();
    let month: Report = fx
        .cache
        .fetch("analytics", "trends", 42, Some("30d"), || load(&calls, report(30)))
        .await
        .unwrap();
    assert_eq!(week, report(7));
    assert_eq!(month, report(30));
    assert_eq!(calls.load(Ordering::SeqCst), 2);

    fx.cache.invalidate("analytics", "trends", 42, Some("7d")).await.unwrap();
    let month = fx
        .cache
        .fetch_with_source("analytics", "trends", 42, Some("30d"), || load(&calls, report(0)))
        .await
        .unwrap();
    assert!(month.is_hit());
    assert_eq!(month.value, report(30));

    // Another owner never sees these entries.
    let other: Report = fx
        .cache
        .fetch("analytics", "trends", 43, Some("30d"), || load(&calls, report(1)))
        .await
        .unwrap();
    assert_eq!(other, report(1));
}

#[tokio::test]
async fn invalidate_all_covers_every_variant() {
    let fx = fixture();
    let calls = AtomicUsize::new(0);

    for variant in ["7d", "30d", "90d"] {
        let _: Report = fx
            .cache
            .fetch("analytics", "trends", 42, Some(variant), || load(&calls, report(1)))
            .await
            .unwrap();
    }
    let outcome = fx.cache.invalidate_all("analytics", "trends", 42).await.unwrap();
    assert_eq!(outcome.deleted.len(), 3);

    let status = fx.cache.status("analytics", "trends", 42, &[]).await.unwrap();
    assert_eq!(status.len(), 3);
    assert!(status.iter().all(|entry| !entry.exists && entry.size_bytes == 0));
}

#[tokio::test]
async fn partial_invalidation_failure_reports_failed_keys() {
    let fx = fixture();
    let failing = fx.cache.key("analytics", "trends", 42, Some("30d")).unwrap();
    fx.store.fail_delete_of(&failing);

    let outcome = fx.cache.invalidate_namespace("analytics", 42).await.unwrap();
    assert!(!outcome.is_complete());
    assert_eq!(outcome.failed, vec![failing]);
    assert_eq!(outcome.deleted.len(), 3);
    assert_eq!(fx.observer.invalidation_failures(), 1);
}

#[tokio::test]
async fn total_invalidation_failure_is_an_error() {
    let fx = fixture();
    fx.store.fail_delete(true);

    let err = fx.cache.invalidate_all("analytics", "trends", 42).await.unwrap_err();
    match &err {
        CacheError::InvalidationFailed { keys } => assert_eq!(keys.len(), 3),
        other => panic!("unexpected error {other:?}"),
    }
    assert!(err.is_degradation());
    // Every key was attempted.
    assert_eq!(fx.store.deletes(), 3);
    assert_eq!(fx.observer.invalidation_failures(), 1);

    let outcome = fx.cache.invalidate_keys(&[]).await.unwrap();
    assert!(outcome.is_complete());
}

#[tokio::test]
async fn status_reports_without_touching_entries() {
    let fx = fixture();
    let calls = AtomicUsize::new(0);

    let _: Report = fx
        .cache
        .fetch("analytics", "overview", 42, None, || load(&calls, report(12)))
        .await
        .unwrap();
    let gets_before = fx.store.gets();

    let status = fx.cache.namespace_status("analytics", 42).await.unwrap();
    let labels = status.iter().map(|entry| entry.label()).collect::<Vec<_>>();
    assert_eq!(labels, vec!["overview", "trends:30d", "trends:7d", "trends:90d"]);

    let overview = &status[0];
    assert!(overview.exists);
    assert_eq!(
        overview.size_bytes,
        serde_json::to_vec(&report(12)).unwrap().len()
    );
    assert!(status[1..].iter().all(|entry| !entry.exists));

    // Status reads don't count as hits and don't refresh anything.
    assert_eq!(fx.observer.hits(), 0);
    assert_eq!(fx.store.gets(), gets_before + 4);

    fx.store.fail_get(true);
    let err = fx.cache.status("analytics", "overview", 42, &[]).await.unwrap_err();
    assert!(matches!(err, CacheError::SourceUnavailable { .. }));
}

#[tokio::test]
async fn status_of_selected_variants() {
    let fx = fixture();
    let calls = AtomicUsize::new(0);

    let _: Report = fx
        .cache
        .fetch("analytics", "trends", 42, Some("7d"), || load(&calls, report(7)))
        .await
        .unwrap();

    let status = fx.cache.status("analytics", "trends", 42, &["7d"]).await.unwrap();
    assert_eq!(status.len(), 1);
    assert_eq!(status[0].key, fx.cache.key("analytics", "trends", 42, Some("7d")).unwrap());
    assert!(status[0].exists);
    assert_eq!(status[0].size_bytes, serde_json::to_vec(&report(7)).unwrap().len());

    // Order follows the request.
    let status = fx.cache.status("analytics", "trends", 42, &["90d", "7d"]).await.unwrap();
    let labels = status.iter().map(|entry| entry.label()).collect::<Vec<_>>();
    assert_eq!(labels, vec!["trends:90d", "trends:7d"]);
    assert!(!status[0].exists);
    assert!(status[1].exists);

    let err = fx.cache.status("analytics", "trends", 42, &["1y"]).await.unwrap_err();
    assert!(matches!(err, CacheError::UnknownResourcePolicy { .. }));
    let err = fx.cache.status("analytics", "overview", 42, &["7d"]).await.unwrap_err();
    assert!(matches!(err, CacheError::UnknownResourcePolicy { .. }));
}

#[tokio::test]
async fn policy_misuse_fails_fast() {
    let fx = fixture();
    let calls = AtomicUsize::new(0);

    for (resource, variant) in [
        ("unknown", None),
        ("trends", None),
        ("trends", Some("1y")),
        ("overview", Some("7d")),
    ] {
        let err = fx
            .cache
            .fetch("analytics", resource, 42, variant, || load(&calls, report(1)))
            .await
            .unwrap_err();
        assert!(
            matches!(err, CacheError::UnknownResourcePolicy { .. }),
            "{resource}/{variant:?}: {err:?}"
        );
        assert!(err.is_programming_error());
    }
    assert_eq!(calls.load(Ordering::SeqCst), 0);
    assert_eq!(fx.store.gets(), 0);

    assert!(fx.cache.invalidate("nope", "overview", 42, None).await.is_err());
    assert!(fx.cache.namespace_status("nope", 42).await.is_err());
}

#[tokio::test]
async fn moka_store_backs_the_cache() {
    let cache = ResourceCache::builder()
        .store(Arc::new(MokaStore::builder().name("test").build().unwrap()) as Arc<dyn KeyValueStore>)
        .policies(Arc::new(policies()))
        .build()
        .unwrap();
    let calls = AtomicUsize::new(0);

    let _: Report = cache
        .fetch("tasks", "list", 1, None, || load(&calls, report(1)))
        .await
        .unwrap();
    let fetched = cache
        .fetch_with_source("tasks", "list", 1, None, || load(&calls, report(2)))
        .await
        .unwrap();
    assert!(fetched.is_hit());
    assert_eq!(fetched.value, report(1));

    cache.invalidate_all("tasks", "list", 1).await.unwrap();
    let status = cache.status("tasks", "list", 1, &[]).await.unwrap();
    assert!(!status[0].exists);
}
