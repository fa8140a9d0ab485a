//! Resolution tiers and the "first success wins" combinator
//!
//! Each tier is a tagged strategy; the local chain is run in order until one
//! of them yields bytes that probe as an image. Every attempt is recorded in a
//! `ResolutionTrace` for diagnostics only.

use std::cell::Cell;
use std::io::Cursor;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use tokio_util::sync::CancellationToken;

use super::error::ResolveError;
use super::locator::{names_match, Locator};
use super::storage::{BundleAccessor, StorageRoot};

/// A single resolution strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResolutionTier {
    Remote,
    DirectPath,
    BasenamePath,
    RecursiveScan,
    Bundle,
}

impl ResolutionTier {
    /// Local tiers in the order they must be attempted
    pub const LOCAL_ORDER: [ResolutionTier; 4] = [
        ResolutionTier::DirectPath,
        ResolutionTier::BasenamePath,
        ResolutionTier::RecursiveScan,
        ResolutionTier::Bundle,
    ];

    pub fn display_name(&self) -> &'static str {
        match self {
            ResolutionTier::Remote => "remote fetch",
            ResolutionTier::DirectPath => "direct path",
            ResolutionTier::BasenamePath => "basename path",
            ResolutionTier::RecursiveScan => "recursive scan",
            ResolutionTier::Bundle => "bundle lookup",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum TierOutcome {
    Hit { bytes: usize },
    Miss,
    /// Tier not applicable (e.g. basename equals the direct path)
    Skipped,
    Failed(ResolveError),
}

#[derive(Debug, Clone, PartialEq)]
pub struct TierAttempt {
    pub tier: ResolutionTier,
    pub outcome: TierOutcome,
    pub elapsed: Duration,
}

/// Ordered record of every tier attempted for one locator
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResolutionTrace {
    pub attempts: Vec<TierAttempt>,
    pub winner: Option<ResolutionTier>,
}

impl ResolutionTrace {
    pub fn record(&mut self, tier: ResolutionTier, outcome: TierOutcome, elapsed: Duration) {
        tracing::debug!(tier = tier.display_name(), ?outcome, ?elapsed, "resolution tier");
        if matches!(outcome, TierOutcome::Hit { .. }) {
            self.winner = Some(tier);
        }
        self.attempts.push(TierAttempt {
            tier,
            outcome,
            elapsed,
        });
    }

    pub fn merge(&mut self, other: ResolutionTrace) {
        self.attempts.extend(other.attempts);
        if other.winner.is_some() {
            self.winner = other.winner;
        }
    }

    /// Tiers in the order they were attempted (skipped tiers excluded)
    pub fn attempted_tiers(&self) -> Vec<ResolutionTier> {
        self.attempts
            .iter()
            .filter(|a| a.outcome != TierOutcome::Skipped)
            .map(|a| a.tier)
            .collect()
    }
}

/// Run `attempt` over `strategies` in order and return the first success.
///
/// Failures are handed to `on_failure` and never stop the chain.
pub fn first_success<S, T, E>(
    strategies: impl IntoIterator<Item = S>,
    mut attempt: impl FnMut(S) -> Result<T, E>,
    mut on_failure: impl FnMut(S, E),
) -> Option<(S, T)>
where
    S: Copy,
{
    for strategy in strategies {
        match attempt(strategy) {
            Ok(value) => return Some((strategy, value)),
            Err(e) => on_failure(strategy, e),
        }
    }
    None
}

/// Check that bytes carry a recognisable image header with sane dimensions
pub fn probe_image(bytes: &[u8]) -> Result<(u32, u32), ResolveError> {
    let (width, height) = image::ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .map_err(|_| ResolveError::DecodeFailure)?
        .into_dimensions()
        .map_err(|_| ResolveError::DecodeFailure)?;
    if width == 0 || height == 0 {
        return Err(ResolveError::DecodeFailure);
    }
    Ok((width, height))
}

/// Limits for the recursive scan tier
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanLimits {
    pub max_depth: usize,
    pub max_entries: usize,
}

/// Outcome of a single local tier
enum LocalMiss {
    Skipped,
    Miss,
    Failed(ResolveError),
}

/// Blocking chain of local tiers: direct path, basename, scan, bundle
#[derive(Clone)]
pub struct LocalProbe {
    storage: Arc<dyn StorageRoot>,
    bundle: Arc<dyn BundleAccessor>,
    limits: ScanLimits,
}

impl LocalProbe {
    pub fn new(
        storage: Arc<dyn StorageRoot>,
        bundle: Arc<dyn BundleAccessor>,
        limits: ScanLimits,
    ) -> Self {
        Self {
            storage,
            bundle,
            limits,
        }
    }

    /// Run every local tier in order. Blocking; call from a worker thread.
    pub fn run(
        &self,
        locator: &Locator,
        cancel: &CancellationToken,
    ) -> (Option<(ResolutionTier, Bytes)>, ResolutionTrace) {
        let mut trace = ResolutionTrace::default();
        let started = Cell::new(Instant::now());

        let hit = first_success(
            ResolutionTier::LOCAL_ORDER,
            |tier| {
                started.set(Instant::now());
                if cancel.is_cancelled() {
                    return Err(LocalMiss::Failed(ResolveError::Cancelled));
                }
                self.attempt(tier, locator)
            },
            |tier, miss| {
                let outcome = match miss {
                    LocalMiss::Skipped => TierOutcome::Skipped,
                    LocalMiss::Miss => TierOutcome::Miss,
                    LocalMiss::Failed(e) => TierOutcome::Failed(e),
                };
                trace.record(tier, outcome, started.get().elapsed());
            },
        );

        if let Some((tier, bytes)) = &hit {
            trace.record(
                *tier,
                TierOutcome::Hit { bytes: bytes.len() },
                started.get().elapsed(),
            );
        }
        (hit, trace)
    }

    fn attempt(&self, tier: ResolutionTier, locator: &Locator) -> Result<Bytes, LocalMiss> {
        let relative = locator.relative_path().ok_or(LocalMiss::Skipped)?;
        let basename = locator.basename().ok_or(LocalMiss::Skipped)?;

        let bytes = match tier {
            ResolutionTier::Remote => return Err(LocalMiss::Skipped),
            ResolutionTier::DirectPath => self.read(&relative)?,
            ResolutionTier::BasenamePath => {
                if relative.as_os_str() == basename.as_str() {
                    return Err(LocalMiss::Skipped);
                }
                self.read(Path::new(&basename))?
            }
            ResolutionTier::RecursiveScan => {
                let found = self
                    .storage
                    .find_in_subdirectories(
                        self.limits.max_depth,
                        self.limits.max_entries,
                        &mut |name| names_match(name, &basename),
                    )
                    .ok_or(LocalMiss::Miss)?;
                tracing::debug!(path = %found.display(), "recursive scan matched");
                self.read(&found)?
            }
            ResolutionTier::Bundle => {
                let stem = locator.bundle_stem().ok_or(LocalMiss::Skipped)?;
                self.bundle.lookup(&stem).ok_or(LocalMiss::Miss)?
            }
        };

        probe_image(&bytes).map_err(LocalMiss::Failed)?;
        Ok(bytes)
    }

    fn read(&self, relative: &Path) -> Result<Bytes, LocalMiss> {
        self.storage.read(relative).map_err(|_| LocalMiss::Miss)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolver::storage::{EmbeddedBundle, FsStorageRoot};
    use crate::resolver::test_support::{png_bytes, RecordingStorage};
    use std::fs;

    fn probe_with(storage: Arc<dyn StorageRoot>, bundle: Arc<dyn BundleAccessor>) -> LocalProbe {
        LocalProbe::new(
            storage,
            bundle,
            ScanLimits {
                max_depth: 6,
                max_entries: 1000,
            },
        )
    }

    #[test]
    fn test_first_success_stops_at_first_hit() {
        let mut failures = Vec::new();
        let result = first_success(
            [1, 2, 3, 4],
            |n| if n == 3 { Ok(n * 10) } else { Err(n) },
            |s, e| failures.push((s, e)),
        );
        assert_eq!(result, Some((3, 30)));
        assert_eq!(failures, vec![(1, 1), (2, 2)]);
    }

    #[test]
    fn test_first_success_exhausts_without_hit() {
        let result: Option<(u8, ())> = first_success([1u8, 2], |_| Err(()), |_, _| {});
        assert!(result.is_none());
    }

    #[test]
    fn test_probe_rejects_non_images() {
        assert_eq!(probe_image(b"not an image"), Err(ResolveError::DecodeFailure));
        assert_eq!(probe_image(&png_bytes(4, 2)), Ok((4, 2)));
    }

    #[test]
    fn test_local_tiers_run_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let recording = Arc::new(RecordingStorage::new(FsStorageRoot::new(dir.path())));
        let bundle = Arc::new(EmbeddedBundle::new());
        let probe = probe_with(recording.clone(), bundle);

        let locator = Locator::parse("local://tours/7/kitchen.jpg");
        let (hit, trace) = probe.run(&locator, &CancellationToken::new());

        assert!(hit.is_none());
        assert_eq!(trace.attempted_tiers(), ResolutionTier::LOCAL_ORDER.to_vec());
        assert_eq!(
            recording.calls(),
            vec![
                "read tours/7/kitchen.jpg".to_string(),
                "read kitchen.jpg".to_string(),
                "scan".to_string(),
            ]
        );
    }

    #[test]
    fn test_recursive_scan_wins_for_nested_substring_match() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("uploads/2024/march")).unwrap();
        fs::write(
            dir.path().join("uploads/2024/march/2024_kitchen.jpg"),
            png_bytes(8, 4),
        )
        .unwrap();

        let probe = probe_with(
            Arc::new(FsStorageRoot::new(dir.path())),
            Arc::new(EmbeddedBundle::new()),
        );
        let (hit, trace) = probe.run(&Locator::parse("tours/kitchen.jpg"), &CancellationToken::new());

        let (tier, _) = hit.expect("scan should find the nested file");
        assert_eq!(tier, ResolutionTier::RecursiveScan);
        assert_eq!(trace.winner, Some(ResolutionTier::RecursiveScan));
        assert_eq!(trace.attempts[0].outcome, TierOutcome::Miss);
        assert_eq!(trace.attempts[1].outcome, TierOutcome::Miss);
    }

    #[test]
    fn test_basename_tier_skipped_when_equal_to_direct_path() {
        let dir = tempfile::tempdir().unwrap();
        let probe = probe_with(
            Arc::new(FsStorageRoot::new(dir.path())),
            Arc::new(EmbeddedBundle::new().with_asset("lobby", png_bytes(2, 1))),
        );
        let (hit, trace) = probe.run(&Locator::parse("lobby.jpg"), &CancellationToken::new());

        assert_eq!(hit.map(|(t, _)| t), Some(ResolutionTier::Bundle));
        assert_eq!(trace.attempts[1].outcome, TierOutcome::Skipped);
    }

    #[test]
    fn test_non_image_bytes_fall_through_to_next_tier() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("rooms")).unwrap();
        fs::write(dir.path().join("rooms/den.jpg"), b"corrupt").unwrap();
        fs::write(dir.path().join("den.jpg"), png_bytes(2, 2)).unwrap();

        let probe = probe_with(
            Arc::new(FsStorageRoot::new(dir.path())),
            Arc::new(EmbeddedBundle::new()),
        );
        let (hit, trace) = probe.run(&Locator::parse("rooms/den.jpg"), &CancellationToken::new());

        assert_eq!(hit.map(|(t, _)| t), Some(ResolutionTier::BasenamePath));
        assert_eq!(
            trace.attempts[0].outcome,
            TierOutcome::Failed(ResolveError::DecodeFailure)
        );
    }

    #[test]
    fn test_cancelled_probe_does_no_io() {
        let dir = tempfile::tempdir().unwrap();
        let recording = Arc::new(RecordingStorage::new(FsStorageRoot::new(dir.path())));
        let probe = probe_with(recording.clone(), Arc::new(EmbeddedBundle::new()));

        let cancel = CancellationToken::new();
        cancel.cancel();
        let (hit, _) = probe.run(&Locator::parse("a/b.jpg"), &cancel);

        assert!(hit.is_none());
        assert!(recording.calls().is_empty());
    }
}
