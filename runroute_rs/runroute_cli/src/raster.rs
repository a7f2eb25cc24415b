//! Static map surface: tiles composited with `image`, overlays drawn with plotters.

use std::path::Path;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use image::{DynamicImage, ImageFormat, Rgba, RgbImage, RgbaImage};
use plotters::coord::Shift;
use plotters::prelude::*;
use runroute::geo::{LatLngBounds, Viewport};
use runroute::polyline::Coordinate;
use runroute::{parse_hex_color, Layer, MapBackend, MapHandle, MapScene, RouteError};
use tracing::debug;

use crate::tiles::TileFetcher;

/// Voyager's land colour, shown where no tile was drawn.
const BACKGROUND: RGBColor = RGBColor(0xf2, 0xef, 0xe9);

pub struct RasterBackend {
    size: (u32, u32),
    tiles: Option<Arc<TileFetcher>>,
}

impl RasterBackend {
    pub fn new(size: (u32, u32)) -> Self {
        Self { size, tiles: None }
    }

    pub fn with_tiles(mut self, fetcher: Arc<TileFetcher>) -> Self {
        self.tiles = Some(fetcher);
        self
    }
}

impl MapBackend for RasterBackend {
    type Handle = RasterHandle;

    fn is_available(&self) -> bool {
        self.size.0 > 0 && self.size.1 > 0
    }

    fn construct(&mut self, scene: &MapScene) -> Result<RasterHandle, RouteError> {
        let mut handle = RasterHandle {
            scene: scene.clone(),
            viewport: scene.viewport(self.size),
            tiles: self.tiles.clone(),
            frame: RgbImage::new(0, 0),
        };
        handle
            .redraw()
            .map_err(|e| RouteError::MapBackend(format!("{e:#}")))?;
        Ok(handle)
    }
}

pub struct RasterHandle {
    scene: MapScene,
    viewport: Viewport,
    tiles: Option<Arc<TileFetcher>>,
    frame: RgbImage,
}

impl RasterHandle {
    pub fn frame(&self) -> &RgbImage {
        &self.frame
    }

    pub fn viewport(&self) -> &Viewport {
        &self.viewport
    }

    fn redraw(&mut self) -> Result<()> {
        let (width, height) = self.viewport.size;
        let mut canvas = RgbaImage::from_pixel(
            width,
            height,
            Rgba([BACKGROUND.0, BACKGROUND.1, BACKGROUND.2, 255]),
        );
        if let Some(fetcher) = self.tiles.as_ref() {
            let loaded = fetcher.compose(
                &mut canvas,
                &self.scene.tile_url,
                &self.scene.subdomains,
                &self.viewport,
            );
            debug!("composited {loaded} tile(s) at zoom {}", self.viewport.zoom);
        }

        let mut buffer = DynamicImage::ImageRgba8(canvas).into_rgb8().into_raw();
        {
            let root = BitMapBackend::with_buffer(&mut buffer, (width, height)).into_drawing_area();
            paint_layers(&root, &self.scene, &self.viewport)?;
            root.present()?;
        }
        self.frame = RgbImage::from_raw(width, height, buffer)
            .ok_or_else(|| anyhow!("frame buffer does not match {width}x{height}"))?;
        Ok(())
    }

    pub fn save_png(&self, path: &Path) -> Result<()> {
        self.frame
            .save_with_format(path, ImageFormat::Png)
            .with_context(|| format!("failed to write {}", path.display()))
    }

    /// Vector output carries the overlays only; tiles are raster data.
    pub fn save_svg(&self, path: &Path) -> Result<()> {
        let root = SVGBackend::new(path, self.viewport.size).into_drawing_area();
        root.fill(&BACKGROUND)?;
        paint_layers(&root, &self.scene, &self.viewport)?;
        root.present()?;
        Ok(())
    }
}

impl MapHandle for RasterHandle {
    fn set_tile_url(&mut self, url: &str) -> Result<(), RouteError> {
        self.scene.tile_url = url.to_string();
        self.redraw()
            .map_err(|e| RouteError::MapBackend(format!("{e:#}")))
    }

    fn dispose(&mut self) {
        self.frame = RgbImage::new(0, 0);
        self.tiles = None;
    }

    fn viewport_bounds(&self) -> Option<LatLngBounds> {
        Some(self.viewport.visible_bounds())
    }
}

fn to_pixel(viewport: &Viewport, coord: Coordinate) -> (i32, i32) {
    let (x, y) = viewport.to_screen(coord);
    (x.round() as i32, y.round() as i32)
}

fn stroke_px(weight: f64) -> u32 {
    weight.round().max(1.0) as u32
}

/// Paint layers in scene order so later layers cover earlier ones.
fn paint_layers<DB>(
    area: &DrawingArea<DB, Shift>,
    scene: &MapScene,
    viewport: &Viewport,
) -> Result<()>
where
    DB: DrawingBackend,
    DB::ErrorType: 'static,
{
    for layer in &scene.layers {
        match layer {
            Layer::Path { points, style } => {
                let [r, g, b] = parse_hex_color(&style.color)?;
                let stroke = RGBColor(r, g, b)
                    .mix(style.opacity)
                    .stroke_width(stroke_px(style.weight));
                let pixels: Vec<(i32, i32)> =
                    points.iter().map(|p| to_pixel(viewport, *p)).collect();
                area.draw(&PathElement::new(pixels, stroke))?;
            }
            Layer::FinishMarker { at, icon } => {
                let (cx, cy) = viewport.to_screen(*at);
                let (ax, ay) = icon.anchor();
                let left = (cx - ax).round() as i32;
                let top = (cy - ay).round() as i32;
                for y in 0..icon.size() {
                    for x in 0..icon.size() {
                        let Some([r, g, b, a]) = icon.pixel(x, y) else {
                            continue;
                        };
                        if a == 0 {
                            continue;
                        }
                        area.draw_pixel(
                            (left + x as i32, top + y as i32),
                            &RGBAColor(r, g, b, f64::from(a) / 255.0),
                        )?;
                    }
                }
            }
            Layer::StartMarker { at, style } => {
                let center = to_pixel(viewport, *at);
                let radius = style.radius.round() as i32;
                let [fr, fg, fb] = parse_hex_color(&style.fill_color)?;
                let [sr, sg, sb] = parse_hex_color(&style.stroke_color)?;
                area.draw(&Circle::new(
                    center,
                    radius,
                    RGBColor(fr, fg, fb).mix(style.fill_opacity).filled(),
                ))?;
                area.draw(&Circle::new(
                    center,
                    radius,
                    RGBColor(sr, sg, sb).stroke_width(stroke_px(style.stroke_weight)),
                ))?;
            }
        }
    }
    Ok(())
}
