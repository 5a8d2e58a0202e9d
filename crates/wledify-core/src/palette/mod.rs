//! Album artwork palettes
//!
//! [`PaletteExtractor`] turns an artwork URL into an ordered [`Palette`].
//! Concurrent requests for the same URL share one in-flight extraction, and
//! the most recent successful palette is kept as a single-entry cache.

mod extract;
mod loader;

pub use extract::{extract_swatches, ExtractOptions};
pub use loader::{HttpImageLoader, ImageLoader, LoadError};

use std::sync::Arc;

use futures::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;

use crate::error::PaletteUnavailable;

/// One extracted color
#[derive(Debug, Clone, PartialEq)]
pub struct Swatch {
    pub red: u8,
    pub green: u8,
    pub blue: u8,
    /// `#rrggbb`
    pub hex: String,
    /// Share of sampled pixels, 0.0..=1.0
    pub area: f32,
}

impl Swatch {
    pub fn new(red: u8, green: u8, blue: u8, area: f32) -> Self {
        Self {
            red,
            green,
            blue,
            hex: format!("#{:02x}{:02x}{:02x}", red, green, blue),
            area,
        }
    }

    pub fn rgb(&self) -> [u8; 3] {
        [self.red, self.green, self.blue]
    }
}

/// Swatches ordered by dominance, index 0 first
#[derive(Debug, Clone, PartialEq)]
pub struct Palette {
    swatches: Vec<Swatch>,
}

impl Palette {
    pub fn new(swatches: Vec<Swatch>) -> Self {
        Self { swatches }
    }

    pub fn swatches(&self) -> &[Swatch] {
        &self.swatches
    }

    /// The color used for one-shot sync
    pub fn dominant(&self) -> Option<&Swatch> {
        self.swatches.first()
    }

    pub fn len(&self) -> usize {
        self.swatches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.swatches.is_empty()
    }
}

type Extraction = Shared<BoxFuture<'static, Result<Arc<Palette>, PaletteUnavailable>>>;

#[derive(Default)]
struct ExtractorState {
    /// URL of the most recent request; only its result may be cached
    latest: Option<String>,
    cached: Option<(String, Arc<Palette>)>,
    in_flight: Option<(String, Extraction)>,
}

/// Single-flight, single-entry palette cache in front of an [`ImageLoader`]
pub struct PaletteExtractor {
    loader: Arc<dyn ImageLoader>,
    options: ExtractOptions,
    state: Mutex<ExtractorState>,
}

impl PaletteExtractor {
    pub fn new(loader: Arc<dyn ImageLoader>) -> Self {
        Self::with_options(loader, ExtractOptions::default())
    }

    pub fn with_options(loader: Arc<dyn ImageLoader>, options: ExtractOptions) -> Self {
        Self {
            loader,
            options,
            state: Mutex::new(ExtractorState::default()),
        }
    }

    /// Palette for `url`.
    ///
    /// A cached palette for the same URL is returned as the same `Arc`.
    /// A call while an extraction for `url` is outstanding awaits that
    /// extraction instead of fetching again.
    pub async fn extract(&self, url: &str) -> Result<Arc<Palette>, PaletteUnavailable> {
        let extraction = {
            let mut state = self.state.lock();
            state.latest = Some(url.to_string());
            if let Some((cached_url, palette)) = &state.cached {
                if cached_url == url {
                    return Ok(palette.clone());
                }
            }
            match &state.in_flight {
                Some((pending_url, extraction)) if pending_url == url => extraction.clone(),
                _ => {
                    tracing::debug!(url = %url, "Starting palette extraction");
                    let extraction = self.start(url.to_string());
                    state.in_flight = Some((url.to_string(), extraction.clone()));
                    extraction
                }
            }
        };

        let result = extraction.await;

        let mut state = self.state.lock();
        if matches!(&state.in_flight, Some((pending_url, _)) if pending_url == url) {
            state.in_flight = None;
        }
        match &result {
            Ok(palette) if state.latest.as_deref() == Some(url) => {
                state.cached = Some((url.to_string(), palette.clone()));
            }
            Ok(_) => tracing::debug!(url = %url, "Discarding palette for superseded artwork"),
            Err(e) => tracing::warn!(url = %url, "Palette unavailable: {}", e),
        }
        result
    }

    /// Cached palette if it belongs to `url`
    pub fn cached_for(&self, url: &str) -> Option<Arc<Palette>> {
        let state = self.state.lock();
        state
            .cached
            .as_ref()
            .filter(|(cached_url, _)| cached_url == url)
            .map(|(_, palette)| palette.clone())
    }

    /// The most recent cached palette, whatever its URL
    pub fn current(&self) -> Option<Arc<Palette>> {
        self.state.lock().cached.as_ref().map(|(_, p)| p.clone())
    }

    /// Drop the cache (artwork disappeared or user logged out).
    ///
    /// An outstanding extraction keeps running so a quick return of the same
    /// artwork joins it; its result is only cached if requested again.
    pub fn invalidate(&self) {
        let mut state = self.state.lock();
        state.latest = None;
        state.cached = None;
    }

    fn start(&self, url: String) -> Extraction {
        let loader = self.loader.clone();
        let options = self.options.clone();
        async move {
            let image = loader.load(&url).await?;
            let swatches = tokio::task::spawn_blocking(move || extract_swatches(&image, &options))
                .await
                .map_err(|e| PaletteUnavailable::LoadFailed(e.to_string()))?;
            if swatches.is_empty() {
                return Err(PaletteUnavailable::NoSwatches);
            }
            tracing::info!(url = %url, count = swatches.len(), "Palette extracted");
            Ok(Arc::new(Palette::new(swatches)))
        }
        .boxed()
        .shared()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use image::{DynamicImage, Rgba, RgbaImage};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// Serves a solid image per URL and counts loads
    struct FakeLoader {
        loads: AtomicUsize,
        delay: Duration,
    }

    impl FakeLoader {
        fn new(delay: Duration) -> Arc<Self> {
            Arc::new(Self {
                loads: AtomicUsize::new(0),
                delay,
            })
        }

        fn loads(&self) -> usize {
            self.loads.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl ImageLoader for FakeLoader {
        async fn load(&self, url: &str) -> Result<DynamicImage, LoadError> {
            self.loads.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            let color = match url {
                "u1" => [255, 0, 0, 255],
                "u2" => [0, 0, 255, 255],
                "clear" => [0, 0, 0, 0],
                _ => return Err(LoadError::Status(404)),
            };
            Ok(DynamicImage::ImageRgba8(RgbaImage::from_pixel(8, 8, Rgba(color))))
        }
    }

    #[tokio::test]
    async fn test_repeat_calls_return_same_palette_without_refetch() {
        let loader = FakeLoader::new(Duration::ZERO);
        let extractor = PaletteExtractor::new(loader.clone());

        let first = extractor.extract("u1").await.unwrap();
        let second = extractor.extract("u1").await.unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(loader.loads(), 1);
        assert_eq!(first.dominant().unwrap().rgb(), [255, 0, 0]);
    }

    #[tokio::test]
    async fn test_concurrent_calls_share_one_fetch() {
        let loader = FakeLoader::new(Duration::from_millis(50));
        let extractor = PaletteExtractor::new(loader.clone());

        let (a, b) = tokio::join!(extractor.extract("u1"), extractor.extract("u1"));
        assert!(Arc::ptr_eq(&a.unwrap(), &b.unwrap()));
        assert_eq!(loader.loads(), 1);
    }

    #[tokio::test]
    async fn test_new_url_supersedes_cache() {
        let loader = FakeLoader::new(Duration::ZERO);
        let extractor = PaletteExtractor::new(loader.clone());

        extractor.extract("u1").await.unwrap();
        let blue = extractor.extract("u2").await.unwrap();

        assert!(extractor.cached_for("u1").is_none());
        assert!(Arc::ptr_eq(&extractor.current().unwrap(), &blue));
        assert_eq!(loader.loads(), 2);
    }

    #[tokio::test]
    async fn test_load_failure_is_unavailable() {
        let extractor = PaletteExtractor::new(FakeLoader::new(Duration::ZERO));
        let err = extractor.extract("missing").await.unwrap_err();
        assert!(matches!(err, PaletteUnavailable::LoadFailed(_)));
        assert!(extractor.current().is_none());
    }

    #[tokio::test]
    async fn test_no_swatches_is_unavailable() {
        let extractor = PaletteExtractor::new(FakeLoader::new(Duration::ZERO));
        assert_eq!(
            extractor.extract("clear").await.unwrap_err(),
            PaletteUnavailable::NoSwatches
        );
    }

    #[tokio::test]
    async fn test_superseded_result_is_not_cached() {
        let loader = FakeLoader::new(Duration::from_millis(30));
        let extractor = Arc::new(PaletteExtractor::new(loader));

        let slow = {
            let extractor = extractor.clone();
            tokio::spawn(async move { extractor.extract("u1").await })
        };
        tokio::time::sleep(Duration::from_millis(5)).await;
        extractor.invalidate();
        extractor.extract("u2").await.unwrap();
        slow.await.unwrap().unwrap();

        assert!(extractor.cached_for("u1").is_none());
        assert!(extractor.cached_for("u2").is_some());
    }

    #[tokio::test]
    async fn test_artwork_returning_after_invalidate_joins_outstanding_fetch() {
        let loader = FakeLoader::new(Duration::from_millis(50));
        let extractor = Arc::new(PaletteExtractor::new(loader.clone()));

        let first = {
            let extractor = extractor.clone();
            tokio::spawn(async move { extractor.extract("u1").await })
        };
        tokio::time::sleep(Duration::from_millis(5)).await;
        extractor.invalidate();

        let again = extractor.extract("u1").await.unwrap();
        let first = first.await.unwrap().unwrap();

        assert_eq!(loader.loads(), 1);
        assert!(Arc::ptr_eq(&first, &again));
        assert!(extractor.cached_for("u1").is_some());
    }

    #[tokio::test]
    async fn test_invalidated_fetch_is_not_cached() {
        let loader = FakeLoader::new(Duration::from_millis(30));
        let extractor = Arc::new(PaletteExtractor::new(loader));

        let pending = {
            let extractor = extractor.clone();
            tokio::spawn(async move { extractor.extract("u1").await })
        };
        tokio::time::sleep(Duration::from_millis(5)).await;
        extractor.invalidate();
        pending.await.unwrap().unwrap();

        assert!(extractor.current().is_none());
    }

    #[test]
    fn test_hex_formatting() {
        assert_eq!(Swatch::new(255, 0, 16, 1.0).hex, "#ff0010");
    }
}
