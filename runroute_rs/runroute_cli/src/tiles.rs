//! Slippy-map tile download with an on-disk cache.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use image::{imageops, RgbaImage};
use reqwest::blocking::Client;
use runroute::geo::{expand_tile_url, Viewport};
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

const USER_AGENT: &str = concat!("runroute/", env!("CARGO_PKG_VERSION"));

pub struct TileFetcher {
    client: Client,
    cache_dir: PathBuf,
}

impl TileFetcher {
    pub fn new(cache_dir: impl Into<PathBuf>) -> Result<Self> {
        let cache_dir = cache_dir.into();
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(15))
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self { client, cache_dir })
    }

    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    /// Fetch one tile, serving from the cache when present.
    pub fn fetch(&self, url: &str) -> Result<RgbaImage> {
        let path = self.cache_dir.join(format!("{}.tile", cache_key(url)));
        let bytes = match fs::read(&path) {
            Ok(bytes) => {
                debug!("tile cache hit {url}");
                bytes
            }
            Err(_) => {
                let bytes = self.download(url)?;
                // Best-effort cache write
                if fs::create_dir_all(&self.cache_dir).is_ok() {
                    let _ = fs::write(&path, &bytes);
                }
                bytes
            }
        };
        let image = image::load_from_memory(&bytes)
            .with_context(|| format!("failed to decode tile {url}"))?;
        Ok(image.into_rgba8())
    }

    fn download(&self, url: &str) -> Result<Vec<u8>> {
        let response = self
            .client
            .get(url)
            .send()
            .with_context(|| format!("request for {url} failed"))?;
        if !response.status().is_success() {
            return Err(anyhow!("tile server responded with {} for {url}", response.status()));
        }
        let bytes = response
            .bytes()
            .with_context(|| format!("failed to read tile {url}"))?;
        Ok(bytes.to_vec())
    }

    /// Paint every tile covering `viewport` onto `canvas`.
    ///
    /// Tiles that fail to load are skipped, leaving the background visible.
    pub fn compose(
        &self,
        canvas: &mut RgbaImage,
        template: &str,
        subdomains: &[String],
        viewport: &Viewport,
    ) -> usize {
        let mut loaded = 0;
        for placed in viewport.tiles() {
            let url = expand_tile_url(template, placed.tile, subdomains);
            match self.fetch(&url) {
                Ok(tile) => {
                    imageops::overlay(
                        canvas,
                        &tile,
                        i64::from(placed.offset.0),
                        i64::from(placed.offset.1),
                    );
                    loaded += 1;
                }
                Err(err) => warn!("tile skipped: {err:#}"),
            }
        }
        loaded
    }
}

pub(crate) fn cache_key(url: &str) -> String {
    let digest = Sha256::digest(url.as_bytes());
    digest.iter().map(|b| format!("{b:02x}")).collect()
}
