//! Test doubles shared by the resolver tests

use std::io::{self, Cursor};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use bytes::Bytes;
use futures_util::future::BoxFuture;
use image::{ImageFormat, Rgba, RgbaImage};

use super::error::FetchError;
use super::fetch::ByteFetcher;
use super::storage::{BundleAccessor, StorageRoot};

/// Encode a small checkerboard PNG
pub fn png_bytes(width: u32, height: u32) -> Bytes {
    let img = RgbaImage::from_fn(width, height, |x, y| {
        if (x + y) % 2 == 0 {
            Rgba([255, 255, 255, 255])
        } else {
            Rgba([20, 40, 60, 255])
        }
    });
    let mut out = Cursor::new(Vec::new());
    img.write_to(&mut out, ImageFormat::Png).unwrap();
    Bytes::from(out.into_inner())
}

/// Storage wrapper that records every call it receives
pub struct RecordingStorage<S> {
    inner: S,
    calls: Mutex<Vec<String>>,
}

impl<S: StorageRoot> RecordingStorage<S> {
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

impl<S: StorageRoot> StorageRoot for RecordingStorage<S> {
    fn root(&self) -> &Path {
        self.inner.root()
    }

    fn read(&self, relative: &Path) -> io::Result<Bytes> {
        self.calls
            .lock()
            .unwrap()
            .push(format!("read {}", relative.to_string_lossy().replace('\\', "/")));
        self.inner.read(relative)
    }

    fn find_in_subdirectories(
        &self,
        max_depth: usize,
        max_entries: usize,
        matches: &mut dyn FnMut(&str) -> bool,
    ) -> Option<PathBuf> {
        self.calls.lock().unwrap().push("scan".to_string());
        self.inner.find_in_subdirectories(max_depth, max_entries, matches)
    }
}

/// Bundle wrapper that counts lookups
pub struct CountingBundle<B> {
    inner: B,
    lookups: AtomicUsize,
}

impl<B: BundleAccessor> CountingBundle<B> {
    pub fn new(inner: B) -> Self {
        Self {
            inner,
            lookups: AtomicUsize::new(0),
        }
    }

    pub fn lookups(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }
}

impl<B: BundleAccessor> BundleAccessor for CountingBundle<B> {
    fn lookup(&self, stem: &str) -> Option<Bytes> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        self.inner.lookup(stem)
    }
}

/// Fetcher with a scripted result and optional latency
pub struct FakeFetcher {
    delay: Duration,
    result: Result<Bytes, FetchError>,
    calls: AtomicUsize,
}

impl FakeFetcher {
    pub fn immediate(result: Result<Bytes, FetchError>) -> Self {
        Self::delayed(Duration::ZERO, result)
    }

    pub fn delayed(delay: Duration, result: Result<Bytes, FetchError>) -> Self {
        Self {
            delay,
            result,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl ByteFetcher for FakeFetcher {
    fn fetch(&self, _url: &str) -> BoxFuture<'static, Result<Bytes, FetchError>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let delay = self.delay;
        let result = self.result.clone();
        Box::pin(async move {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            result
        })
    }
}
