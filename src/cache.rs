use crate::dipalme::model::{Event, ScrapeResult};
use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Whatever produces the full, merged event listing
#[async_trait]
pub trait EventSource: Send + Sync {
    async fn scrape_all(&self) -> ScrapeResult;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheState {
    Empty,
    Fresh,
    Stale,
    Refreshing,
}

#[derive(Debug, Clone, Default)]
struct CacheEntry {
    data: Vec<Event>,
    last_update: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CachedEvents {
    #[serde(flatten)]
    pub result: ScrapeResult,
    pub cached: bool,
    pub last_update: Option<DateTime<Utc>>,
    pub updating: bool,
}

/**
Stale-while-revalidate holder for the merged listing.
Reads never wait on the network; at most one refresh runs at a time.
*/
pub struct EventCache {
    source: Arc<dyn EventSource>,
    ttl: TimeDelta,
    entry: RwLock<CacheEntry>,
    updating: AtomicBool,
}

impl EventCache {
    pub fn new(source: Arc<dyn EventSource>, ttl: Duration) -> Arc<Self> {
        Arc::new(Self {
            source,
            ttl: TimeDelta::from_std(ttl).unwrap_or(TimeDelta::MAX),
            entry: RwLock::new(CacheEntry::default()),
            updating: AtomicBool::new(false),
        })
    }

    pub fn state(&self) -> CacheState {
        if self.updating.load(Ordering::SeqCst) {
            return CacheState::Refreshing;
        }

        let entry = self.snapshot();
        match entry.last_update {
            None => CacheState::Empty,
            Some(_) if self.is_stale(&entry) => CacheState::Stale,
            Some(_) => CacheState::Fresh,
        }
    }

    /// Serves whatever is cached and kicks off a background refresh once the entry is stale
    #[tracing::instrument(skip(self))]
    pub fn read(self: &Arc<Self>) -> CachedEvents {
        let entry = self.snapshot();

        if self.is_stale(&entry) && self.trigger_refresh().is_some() {
            info!("Cache is stale, refreshing in the background");
        }

        let message = match entry.last_update {
            Some(_) => format!("Served {} cached events", entry.data.len()),
            None => "Cache is warming up, events will be available shortly".to_string(),
        };

        CachedEvents {
            cached: entry.last_update.is_some(),
            last_update: entry.last_update,
            updating: self.updating.load(Ordering::SeqCst),
            result: ScrapeResult::success(entry.data, message),
        }
    }

    /// Starts a detached refresh unless one is already running
    pub fn trigger_refresh(self: &Arc<Self>) -> Option<JoinHandle<()>> {
        let guard = RefreshGuard::acquire(self)?;

        Some(tokio::spawn(async move {
            guard.cache.refresh().await;
        }))
    }

    /// Fills the cache shortly after startup without holding up the server
    pub fn warm_on_startup(self: &Arc<Self>, delay: Duration) -> JoinHandle<()> {
        let cache = Arc::clone(self);

        tokio::spawn(async move {
            tokio::time::sleep(delay).await;

            info!("Warming up the events cache");
            match cache.trigger_refresh() {
                Some(refresh) => {
                    if let Err(e) = refresh.await {
                        warn!("Cache warm-up did not complete: {}", e);
                    }
                }
                None => debug!("A refresh is already running, skipping warm-up"),
            }
        })
    }

    async fn refresh(&self) {
        let result = self.source.scrape_all().await;

        if !result.success {
            warn!(
                "Refresh failed, keeping the current entry: {}",
                result.error.as_deref().unwrap_or("unknown error")
            );
            return;
        }

        if result.data.is_empty() {
            warn!("Refresh returned no events, keeping the current entry");
            return;
        }

        let count = result.data.len();
        *self.entry.write().unwrap_or_else(PoisonError::into_inner) = CacheEntry {
            data: result.data,
            last_update: Some(Utc::now()),
        };

        info!("Cache refreshed with {} events", count);
    }

    fn snapshot(&self) -> CacheEntry {
        self.entry
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn is_stale(&self, entry: &CacheEntry) -> bool {
        match entry.last_update {
            None => true,
            Some(last_update) => Utc::now() - last_update > self.ttl,
        }
    }
}

/// Owns the `updating` flag for the lifetime of one refresh
struct RefreshGuard {
    cache: Arc<EventCache>,
}

impl RefreshGuard {
    fn acquire(cache: &Arc<EventCache>) -> Option<Self> {
        cache
            .updating
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .ok()
            .map(|_| Self {
                cache: Arc::clone(cache),
            })
    }
}

impl Drop for RefreshGuard {
    fn drop(&mut self) {
        self.cache.updating.store(false, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dipalme::model::Category;
    use std::sync::atomic::AtomicUsize;
    use tokio::sync::Notify;

    struct FakeSource {
        calls: AtomicUsize,
        gate: Option<Notify>,
        result: ScrapeResult,
    }

    impl FakeSource {
        fn returning(result: ScrapeResult) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                gate: None,
                result,
            })
        }

        fn gated(result: ScrapeResult) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                gate: Some(Notify::new()),
                result,
            })
        }

        fn open(&self) {
            if let Some(gate) = &self.gate {
                gate.notify_one();
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl EventSource for FakeSource {
        async fn scrape_all(&self) -> ScrapeResult {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(gate) = &self.gate {
                gate.notified().await;
            }
            self.result.clone()
        }
    }

    fn events(titles: &[&str]) -> Vec<Event> {
        titles
            .iter()
            .map(|title| Event {
                title: Some(title.to_string()),
                ..Event::untitled(Category::Fiestas)
            })
            .collect()
    }

    fn scraped(titles: &[&str]) -> ScrapeResult {
        ScrapeResult::success(events(titles), "scraped".to_string())
    }

    fn seed(cache: &EventCache, titles: &[&str], age: TimeDelta) {
        *cache.entry.write().unwrap() = CacheEntry {
            data: events(titles),
            last_update: Some(Utc::now() - age),
        };
    }

    async fn wait_until_idle(cache: &EventCache) {
        tokio::time::timeout(Duration::from_secs(2), async {
            while cache.updating.load(Ordering::SeqCst) {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("refresh never finished");
    }

    const TTL: Duration = Duration::from_secs(30 * 60);

    #[test_log::test(tokio::test)]
    async fn when_empty_a_read_should_return_at_once_and_refresh_in_background() {
        let source = FakeSource::gated(scraped(&["A", "B"]));
        let cache = EventCache::new(source.clone(), TTL);

        let first = cache.read();

        assert!(!first.cached);
        assert!(first.updating);
        assert!(first.result.success);
        assert!(first.result.data.is_empty());
        assert_eq!(cache.state(), CacheState::Refreshing);

        source.open();
        wait_until_idle(&cache).await;

        let second = cache.read();
        assert!(second.cached);
        assert!(!second.updating);
        assert_eq!(second.result.data, events(&["A", "B"]));
        assert!(second.last_update.is_some());
        assert_eq!(cache.state(), CacheState::Fresh);
        assert_eq!(source.calls(), 1);
    }

    #[test_log::test(tokio::test)]
    async fn should_serve_refreshed_data_right_after_a_refresh() {
        let source = FakeSource::returning(scraped(&["A"]));
        let cache = EventCache::new(source.clone(), TTL);

        cache.trigger_refresh().unwrap().await.unwrap();
        let read = cache.read();

        assert!(read.cached);
        assert!(!read.updating);
        assert_eq!(read.result.data, events(&["A"]));
        assert_eq!(source.calls(), 1);
    }

    #[test_log::test(tokio::test)]
    async fn concurrent_reads_should_start_a_single_refresh() {
        let source = FakeSource::gated(scraped(&["A"]));
        let cache = EventCache::new(source.clone(), TTL);
        seed(&cache, &["old"], TimeDelta::hours(1));

        let reads = futures::future::join_all((0..8).map(|_| {
            let cache = cache.clone();
            tokio::spawn(async move { cache.read() })
        }))
        .await;

        for read in reads {
            let read = read.unwrap();
            assert!(read.updating);
            assert_eq!(read.result.data, events(&["old"]));
        }
        assert!(cache.trigger_refresh().is_none());

        source.open();
        wait_until_idle(&cache).await;

        assert_eq!(source.calls(), 1);
        assert_eq!(cache.read().result.data, events(&["A"]));
    }

    #[test_log::test(tokio::test)]
    async fn when_fresh_a_read_should_not_refresh() {
        let source = FakeSource::returning(scraped(&["new"]));
        let cache = EventCache::new(source.clone(), TTL);
        seed(&cache, &["current"], TimeDelta::minutes(5));

        let read = cache.read();

        assert!(read.cached);
        assert!(!read.updating);
        assert_eq!(read.result.data, events(&["current"]));
        assert_eq!(source.calls(), 0);
    }

    #[test_log::test(tokio::test)]
    async fn when_a_refresh_fails_should_keep_serving_stale_data() {
        let source = FakeSource::returning(ScrapeResult::failure("site down"));
        let cache = EventCache::new(source.clone(), TTL);
        seed(&cache, &["stale"], TimeDelta::hours(2));

        cache.trigger_refresh().unwrap().await.unwrap();

        assert_eq!(cache.state(), CacheState::Stale);
        assert_eq!(cache.snapshot().data, events(&["stale"]));
    }

    #[test_log::test(tokio::test)]
    async fn when_empty_and_refresh_fails_should_stay_empty() {
        let source = FakeSource::returning(ScrapeResult::failure("site down"));
        let cache = EventCache::new(source.clone(), TTL);

        cache.trigger_refresh().unwrap().await.unwrap();

        assert_eq!(cache.state(), CacheState::Empty);
        assert!(!cache.updating.load(Ordering::SeqCst));
    }

    #[test_log::test(tokio::test)]
    async fn should_not_replace_data_with_an_empty_scrape() {
        let source = FakeSource::returning(scraped(&[]));
        let cache = EventCache::new(source.clone(), TTL);
        seed(&cache, &["kept"], TimeDelta::hours(2));

        cache.trigger_refresh().unwrap().await.unwrap();

        assert_eq!(cache.snapshot().data, events(&["kept"]));
    }

    #[test_log::test(tokio::test)]
    async fn should_warm_up_after_the_delay() {
        let source = FakeSource::returning(scraped(&["warm"]));
        let cache = EventCache::new(source.clone(), TTL);

        cache
            .warm_on_startup(Duration::from_millis(10))
            .await
            .unwrap();

        assert_eq!(cache.state(), CacheState::Fresh);
        assert_eq!(source.calls(), 1);
    }
}
