//! Locator resolution
//!
//! Turns an opaque locator into image bytes through ordered fallback tiers:
//! remote fetch (with a soft deadline), then direct path, basename, recursive
//! scan and bundle lookup. The first tier to produce probe-able image bytes
//! wins; every failure is absorbed and reported only through the trace.

pub mod error;
pub mod fetch;
pub mod locator;
pub mod session;
pub mod storage;
pub mod tiers;

#[cfg(test)]
pub(crate) mod test_support;

use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use tokio_util::sync::CancellationToken;

use crate::settings::ResolverConfig;

pub use error::{FetchError, ResolveError, ResolvedAsset};
pub use fetch::{ByteFetcher, HttpFetcher, OfflineFetcher};
pub use locator::Locator;
pub use session::{SessionEpoch, SessionTracker};
pub use storage::{BundleAccessor, DirectoryBundle, EmbeddedBundle, EmptyBundle, FsStorageRoot, StorageRoot};
pub use tiers::{LocalProbe, ResolutionTier, ResolutionTrace, ScanLimits, TierAttempt, TierOutcome};

/// Outcome of one resolution, with its diagnostic trace
#[derive(Debug, Clone, PartialEq)]
pub struct Resolution {
    pub asset: ResolvedAsset,
    pub trace: ResolutionTrace,
}

impl Resolution {
    fn failed(reason: ResolveError, trace: ResolutionTrace) -> Self {
        Self {
            asset: ResolvedAsset::Failure(reason),
            trace,
        }
    }

    fn hit(bytes: Bytes, trace: ResolutionTrace) -> Self {
        Self {
            asset: ResolvedAsset::Bytes(bytes),
            trace,
        }
    }
}

/// Resolve a locator once with default limits.
///
/// Convenience wrapper around [`LocatorResolver`] for callers that have no
/// session of their own.
pub async fn resolve(
    locator: &str,
    storage: Arc<dyn StorageRoot>,
    bundle: Arc<dyn BundleAccessor>,
    fetcher: Arc<dyn ByteFetcher>,
    deadline: Duration,
) -> ResolvedAsset {
    let config = ResolverConfig {
        fetch_deadline_ms: deadline.as_millis() as u64,
        ..ResolverConfig::default()
    };
    LocatorResolver::new(storage, bundle, fetcher, config)
        .resolve(locator, &CancellationToken::new())
        .await
        .asset
}

/// Shared, stateless resolver; one per viewer
pub struct LocatorResolver {
    fetcher: Arc<dyn ByteFetcher>,
    local: LocalProbe,
    deadline: Duration,
}

impl LocatorResolver {
    pub fn new(
        storage: Arc<dyn StorageRoot>,
        bundle: Arc<dyn BundleAccessor>,
        fetcher: Arc<dyn ByteFetcher>,
        config: ResolverConfig,
    ) -> Self {
        Self {
            fetcher,
            local: LocalProbe::new(storage, bundle, config.scan_limits()),
            deadline: config.fetch_deadline(),
        }
    }

    /// Soft deadline after which local tiers start racing the fetch
    pub fn deadline(&self) -> Duration {
        self.deadline
    }

    pub async fn resolve(&self, raw: &str, cancel: &CancellationToken) -> Resolution {
        let locator = Locator::parse(raw);
        let started = Instant::now();

        let resolution = match &locator {
            Locator::Empty => Resolution::failed(ResolveError::NoLocator, ResolutionTrace::default()),
            Locator::Remote { url, .. } => self.resolve_remote(url, &locator, cancel).await,
            Locator::Local { .. } => {
                let mut trace = ResolutionTrace::default();
                let hit = self.run_local(&locator, cancel.clone(), &mut trace, cancel).await;
                self.finish(hit, trace, cancel)
            }
        };

        match (&resolution.asset, resolution.trace.winner) {
            (ResolvedAsset::Bytes(bytes), Some(tier)) => tracing::info!(
                locator = raw,
                tier = tier.display_name(),
                bytes = bytes.len(),
                elapsed_ms = started.elapsed().as_millis() as u64,
                "panorama resolved"
            ),
            (ResolvedAsset::Failure(reason), _) => tracing::warn!(
                locator = raw,
                %reason,
                attempts = resolution.trace.attempts.len(),
                "panorama unresolved, using fallback material"
            ),
            _ => {}
        }
        resolution
    }

    async fn resolve_remote(&self, url: &str, locator: &Locator, cancel: &CancellationToken) -> Resolution {
        let mut trace = ResolutionTrace::default();
        let fetch_started = Instant::now();
        let mut fetch = self.fetcher.fetch(url);

        // Phase 1: the fetch alone, up to the soft deadline
        let deadline = tokio::time::sleep(self.deadline);
        tokio::pin!(deadline);
        let fetch_pending = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                return Resolution::failed(ResolveError::Cancelled, trace);
            }
            result = &mut fetch => {
                match verify_remote(result) {
                    Ok(bytes) => {
                        trace.record(ResolutionTier::Remote, TierOutcome::Hit { bytes: bytes.len() }, fetch_started.elapsed());
                        return Resolution::hit(bytes, trace);
                    }
                    Err(e) => {
                        trace.record(ResolutionTier::Remote, TierOutcome::Failed(e), fetch_started.elapsed());
                        false
                    }
                }
            }
            _ = &mut deadline => {
                trace.record(
                    ResolutionTier::Remote,
                    TierOutcome::Failed(ResolveError::NetworkTimeout),
                    fetch_started.elapsed(),
                );
                true
            }
        };

        if !fetch_pending {
            let hit = self.run_local(locator, cancel.clone(), &mut trace, cancel).await;
            return self.finish(hit, trace, cancel);
        }

        // Phase 2: the outstanding fetch races the local tiers
        tracing::debug!(url, deadline_ms = self.deadline.as_millis() as u64, "fetch past deadline, racing local tiers");
        let local_cancel = cancel.child_token();
        let mut local = self.spawn_local(locator, local_cancel.clone());
        let mut fetch_open = true;
        let mut local_open = true;

        while fetch_open || local_open {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    return Resolution::failed(ResolveError::Cancelled, trace);
                }
                result = &mut fetch, if fetch_open => {
                    fetch_open = false;
                    match verify_remote(result) {
                        Ok(bytes) => {
                            local_cancel.cancel();
                            trace.record(ResolutionTier::Remote, TierOutcome::Hit { bytes: bytes.len() }, fetch_started.elapsed());
                            return Resolution::hit(bytes, trace);
                        }
                        Err(e) => {
                            trace.record(ResolutionTier::Remote, TierOutcome::Failed(e), fetch_started.elapsed());
                        }
                    }
                }
                joined = &mut local, if local_open => {
                    local_open = false;
                    let (hit, local_trace) = joined.unwrap_or_else(|e| {
                        tracing::warn!("local resolution worker failed: {}", e);
                        (None, ResolutionTrace::default())
                    });
                    trace.merge(local_trace);
                    if let Some((_, bytes)) = hit {
                        return Resolution::hit(bytes, trace);
                    }
                }
            }
        }

        self.finish(None, trace, cancel)
    }

    /// Run the blocking local chain on the blocking pool and wait for it
    async fn run_local(
        &self,
        locator: &Locator,
        local_cancel: CancellationToken,
        trace: &mut ResolutionTrace,
        cancel: &CancellationToken,
    ) -> Option<Bytes> {
        let handle = self.spawn_local(locator, local_cancel);
        tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            joined = handle => {
                let (hit, local_trace) = joined.unwrap_or_else(|e| {
                    tracing::warn!("local resolution worker failed: {}", e);
                    (None, ResolutionTrace::default())
                });
                trace.merge(local_trace);
                hit.map(|(_, bytes)| bytes)
            }
        }
    }

    fn spawn_local(
        &self,
        locator: &Locator,
        cancel: CancellationToken,
    ) -> tokio::task::JoinHandle<(Option<(ResolutionTier, Bytes)>, ResolutionTrace)> {
        let probe = self.local.clone();
        let locator = locator.clone();
        tokio::task::spawn_blocking(move || probe.run(&locator, &cancel))
    }

    fn finish(&self, hit: Option<Bytes>, trace: ResolutionTrace, cancel: &CancellationToken) -> Resolution {
        match hit {
            Some(bytes) => Resolution::hit(bytes, trace),
            None if cancel.is_cancelled() => Resolution::failed(ResolveError::Cancelled, trace),
            None => Resolution::failed(ResolveError::NotFound, trace),
        }
    }
}

fn verify_remote(result: Result<Bytes, FetchError>) -> Result<Bytes, ResolveError> {
    let bytes = result.map_err(ResolveError::from)?;
    tiers::probe_image(&bytes)?;
    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use super::test_support::{png_bytes, CountingBundle, FakeFetcher, RecordingStorage};

    fn resolver_with(
        storage: Arc<dyn StorageRoot>,
        bundle: Arc<dyn BundleAccessor>,
        fetcher: Arc<dyn ByteFetcher>,
        deadline_ms: u64,
    ) -> LocatorResolver {
        let config = ResolverConfig {
            fetch_deadline_ms: deadline_ms,
            ..ResolverConfig::default()
        };
        LocatorResolver::new(storage, bundle, fetcher, config)
    }

    #[tokio::test]
    async fn test_empty_locator_performs_no_io() {
        let dir = tempfile::tempdir().unwrap();
        let storage = Arc::new(RecordingStorage::new(FsStorageRoot::new(dir.path())));
        let bundle = Arc::new(CountingBundle::new(EmbeddedBundle::new()));
        let fetcher = Arc::new(FakeFetcher::immediate(Ok(png_bytes(2, 1))));

        let resolver = resolver_with(storage.clone(), bundle.clone(), fetcher.clone(), 100);
        for raw in ["", "   "] {
            let resolution = resolver.resolve(raw, &CancellationToken::new()).await;
            assert_eq!(resolution.asset, ResolvedAsset::Failure(ResolveError::NoLocator));
            assert!(resolution.trace.attempts.is_empty());
        }

        assert!(storage.calls().is_empty());
        assert_eq!(bundle.lookups(), 0);
        assert_eq!(fetcher.calls(), 0);
    }

    #[tokio::test]
    async fn test_remote_hit_before_deadline_skips_local_tiers() {
        let dir = tempfile::tempdir().unwrap();
        let storage = Arc::new(RecordingStorage::new(FsStorageRoot::new(dir.path())));
        let fetcher = Arc::new(FakeFetcher::immediate(Ok(png_bytes(4, 2))));

        let resolver = resolver_with(storage.clone(), Arc::new(EmptyBundle), fetcher.clone(), 500);
        let resolution = resolver
            .resolve("https://cdn.example.com/tours/den.jpg", &CancellationToken::new())
            .await;

        assert!(resolution.asset.is_bytes());
        assert_eq!(resolution.trace.winner, Some(ResolutionTier::Remote));
        assert_eq!(fetcher.calls(), 1);
        assert!(storage.calls().is_empty());
    }

    #[tokio::test]
    async fn test_failed_fetch_falls_back_to_local_path_of_url() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("tours")).unwrap();
        fs::write(dir.path().join("tours/den.jpg"), png_bytes(4, 2)).unwrap();

        let fetcher = Arc::new(FakeFetcher::immediate(Err(FetchError::Status(404))));
        let resolver = resolver_with(
            Arc::new(FsStorageRoot::new(dir.path())),
            Arc::new(EmptyBundle),
            fetcher,
            500,
        );
        let resolution = resolver
            .resolve("https://cdn.example.com/tours/den.jpg?token=1", &CancellationToken::new())
            .await;

        assert!(resolution.asset.is_bytes());
        assert_eq!(resolution.trace.winner, Some(ResolutionTier::DirectPath));
        assert_eq!(
            resolution.trace.attempts[0].outcome,
            TierOutcome::Failed(ResolveError::NetworkError("server answered with status 404".into()))
        );
    }

    #[tokio::test]
    async fn test_undecodable_remote_bytes_fall_back() {
        let dir = tempfile::tempdir().unwrap();
        let fetcher = Arc::new(FakeFetcher::immediate(Ok(Bytes::from_static(b"<html>"))));
        let bundle = Arc::new(EmbeddedBundle::new().with_asset("den", png_bytes(2, 2)));
        let resolver = resolver_with(Arc::new(FsStorageRoot::new(dir.path())), bundle, fetcher, 500);

        let resolution = resolver
            .resolve("https://cdn.example.com/den.jpg", &CancellationToken::new())
            .await;

        assert_eq!(resolution.trace.winner, Some(ResolutionTier::Bundle));
        assert_eq!(
            resolution.trace.attempts[0].outcome,
            TierOutcome::Failed(ResolveError::DecodeFailure)
        );
    }

    #[tokio::test]
    async fn test_slow_fetch_loses_to_local_after_deadline() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("den.jpg"), png_bytes(2, 2)).unwrap();

        let fetcher = Arc::new(FakeFetcher::delayed(Duration::from_secs(30), Ok(png_bytes(8, 4))));
        let resolver = resolver_with(
            Arc::new(FsStorageRoot::new(dir.path())),
            Arc::new(EmptyBundle),
            fetcher,
            20,
        );

        let started = Instant::now();
        let resolution = resolver
            .resolve("https://cdn.example.com/den.jpg", &CancellationToken::new())
            .await;

        assert!(started.elapsed() < Duration::from_secs(10));
        assert_eq!(resolution.trace.winner, Some(ResolutionTier::DirectPath));
        assert_eq!(
            resolution.trace.attempts[0].outcome,
            TierOutcome::Failed(ResolveError::NetworkTimeout)
        );
    }

    #[tokio::test]
    async fn test_late_fetch_still_wins_when_local_tiers_miss() {
        let dir = tempfile::tempdir().unwrap();
        let fetcher = Arc::new(FakeFetcher::delayed(Duration::from_millis(80), Ok(png_bytes(8, 4))));
        let resolver = resolver_with(
            Arc::new(FsStorageRoot::new(dir.path())),
            Arc::new(EmptyBundle),
            fetcher,
            10,
        );

        let resolution = resolver
            .resolve("https://cdn.example.com/den.jpg", &CancellationToken::new())
            .await;

        assert!(resolution.asset.is_bytes());
        assert_eq!(resolution.trace.winner, Some(ResolutionTier::Remote));
        let tiers: Vec<_> = resolution.trace.attempts.iter().map(|a| a.tier).collect();
        assert_eq!(tiers.first(), Some(&ResolutionTier::Remote));
        assert_eq!(tiers.last(), Some(&ResolutionTier::Remote));
        assert!(tiers.contains(&ResolutionTier::Bundle));
    }

    #[tokio::test]
    async fn test_all_tiers_exhausted_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let resolver = resolver_with(
            Arc::new(FsStorageRoot::new(dir.path())),
            Arc::new(EmptyBundle),
            Arc::new(OfflineFetcher),
            50,
        );

        let resolution = resolver.resolve("local://a/b/c.jpg", &CancellationToken::new()).await;
        assert_eq!(resolution.asset, ResolvedAsset::Failure(ResolveError::NotFound));
        assert_eq!(resolution.trace.winner, None);
    }

    #[tokio::test]
    async fn test_cancelled_session_reports_cancelled() {
        let dir = tempfile::tempdir().unwrap();
        let fetcher = Arc::new(FakeFetcher::delayed(Duration::from_secs(30), Ok(png_bytes(2, 2))));
        let resolver = resolver_with(
            Arc::new(FsStorageRoot::new(dir.path())),
            Arc::new(EmptyBundle),
            fetcher,
            10_000,
        );

        let cancel = CancellationToken::new();
        let canceller = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            canceller.cancel();
        });

        let resolution = resolver.resolve("https://cdn.example.com/x.jpg", &cancel).await;
        assert_eq!(resolution.asset, ResolvedAsset::Failure(ResolveError::Cancelled));
    }

    #[tokio::test]
    async fn test_resolve_convenience_wrapper() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("listing/42")).unwrap();
        fs::write(dir.path().join("listing/42/pano_bedroom_final.jpg"), png_bytes(4, 2)).unwrap();

        let asset = resolve(
            "bedroom_final.jpg",
            Arc::new(FsStorageRoot::new(dir.path())),
            Arc::new(EmptyBundle),
            Arc::new(OfflineFetcher),
            Duration::from_millis(100),
        )
        .await;
        assert!(asset.is_bytes());
    }
}
