//! Route rendering contract.
//!
//! A [`RouteView`] owns one map surface at a time, built by an injected
//! [`MapBackend`] from a backend-neutral [`MapScene`]. Any change of route or
//! mode disposes the live surface before a new one is constructed, so stale
//! overlays never survive an input change.

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::RenderConfig;
use crate::finish::FinishIcon;
use crate::geo::{LatLngBounds, Route, Viewport};
use crate::polyline::Coordinate;
use crate::RouteError;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TileStyle {
    #[default]
    Standard,
    Satellite,
}

impl TileStyle {
    pub fn toggled(self) -> Self {
        match self {
            TileStyle::Standard => TileStyle::Satellite,
            TileStyle::Satellite => TileStyle::Standard,
        }
    }
}

/// Inline preview or fullscreen viewer.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RenderMode {
    #[default]
    Thumbnail,
    Modal,
}

impl RenderMode {
    pub fn is_interactive(self) -> bool {
        matches!(self, RenderMode::Modal)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Interactions {
    pub dragging: bool,
    pub scroll_wheel_zoom: bool,
    pub double_click_zoom: bool,
    pub touch_zoom: bool,
    pub box_zoom: bool,
    pub keyboard: bool,
    pub zoom_control: bool,
}

impl Interactions {
    pub fn for_mode(mode: RenderMode) -> Self {
        let on = mode.is_interactive();
        Self {
            dragging: on,
            scroll_wheel_zoom: on,
            double_click_zoom: on,
            touch_zoom: on,
            box_zoom: on,
            keyboard: on,
            zoom_control: on,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PathStyle {
    pub color: String,
    pub weight: f64,
    pub opacity: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StartMarkerStyle {
    pub radius: f64,
    pub fill_color: String,
    pub fill_opacity: f64,
    pub stroke_color: String,
    pub stroke_weight: f64,
    pub z_index_offset: i32,
}

/// One overlay. A scene's layers are painted in order, last on top.
#[derive(Clone, Debug, PartialEq)]
pub enum Layer {
    Path {
        points: Vec<Coordinate>,
        style: PathStyle,
    },
    FinishMarker {
        at: Coordinate,
        icon: FinishIcon,
    },
    StartMarker {
        at: Coordinate,
        style: StartMarkerStyle,
    },
}

impl Layer {
    pub fn is_marker(&self) -> bool {
        !matches!(self, Layer::Path { .. })
    }

    pub fn marker_position(&self) -> Option<Coordinate> {
        match self {
            Layer::Path { .. } => None,
            Layer::FinishMarker { at, .. } | Layer::StartMarker { at, .. } => Some(*at),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct FitBounds {
    pub bounds: LatLngBounds,
    pub padding_px: u32,
    pub animate: bool,
}

/// Everything a backend needs to draw one route.
#[derive(Clone, Debug, PartialEq)]
pub struct MapScene {
    pub tile_url: String,
    pub subdomains: Vec<String>,
    pub max_zoom: u8,
    pub interactions: Interactions,
    pub layers: Vec<Layer>,
    pub fit: FitBounds,
}

impl MapScene {
    /// Lay out tiles, path, finish marker, then start marker.
    ///
    /// The start marker goes last so it stays visible when a loop finishes
    /// where it began.
    pub fn compose(
        route: &Route,
        mode: RenderMode,
        tiles: TileStyle,
        config: &RenderConfig,
    ) -> Result<Self, RouteError> {
        let (start, finish, bounds) = match (route.start(), route.finish(), route.bounds()) {
            (Some(start), Some(finish), Some(bounds)) if route.is_drawable() => {
                (start, finish, bounds)
            }
            _ => return Err(RouteError::InsufficientData),
        };
        let style = config.mode_style(mode);

        let layers = vec![
            Layer::Path {
                points: route.points().to_vec(),
                style: PathStyle {
                    color: config.route_color.clone(),
                    weight: style.path_weight,
                    opacity: config.route_opacity,
                },
            },
            Layer::FinishMarker {
                at: finish,
                icon: FinishIcon::generate(style.finish_icon_size)?,
            },
            Layer::StartMarker {
                at: start,
                style: StartMarkerStyle {
                    radius: style.start_radius,
                    fill_color: config.start_fill.clone(),
                    fill_opacity: 1.0,
                    stroke_color: config.start_stroke.clone(),
                    stroke_weight: style.start_stroke_weight,
                    z_index_offset: config.start_z_index_offset,
                },
            },
        ];

        Ok(Self {
            tile_url: config.tiles.url_for(tiles).to_string(),
            subdomains: config.tiles.subdomains.clone(),
            max_zoom: config.tiles.max_zoom,
            interactions: Interactions::for_mode(mode),
            layers,
            fit: FitBounds {
                bounds,
                padding_px: style.padding_px,
                animate: false,
            },
        })
    }

    pub fn path(&self) -> Option<&[Coordinate]> {
        self.layers.iter().find_map(|layer| match layer {
            Layer::Path { points, .. } => Some(points.as_slice()),
            _ => None,
        })
    }

    /// The marker painted last at `at`, if any.
    pub fn topmost_marker_at(&self, at: Coordinate) -> Option<&Layer> {
        self.layers
            .iter()
            .rev()
            .find(|layer| matches!(layer.marker_position(), Some(pos) if pos.same_position(&at)))
    }

    pub fn viewport(&self, size: (u32, u32)) -> Viewport {
        Viewport::fit(&self.fit.bounds, size, self.fit.padding_px, self.max_zoom)
    }
}

/// A map-rendering library binding.
pub trait MapBackend {
    type Handle: MapHandle;

    /// False when the library is missing or the container is not mounted.
    fn is_available(&self) -> bool {
        true
    }

    fn construct(&mut self, scene: &MapScene) -> Result<Self::Handle, RouteError>;
}

/// A live map surface.
pub trait MapHandle {
    fn set_tile_url(&mut self, url: &str) -> Result<(), RouteError>;

    /// Release the surface. Called exactly once per handle.
    fn dispose(&mut self);

    /// Geographic extent on screen, when the backend can report it.
    fn viewport_bounds(&self) -> Option<LatLngBounds> {
        None
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ViewStatus {
    /// Nothing requested yet, or unmounted.
    Detached,
    /// No route, or too few points to draw.
    Placeholder,
    /// The backend could not provide a surface.
    Unavailable,
    Rendered,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MapViewState {
    pub tile_style: TileStyle,
    pub interactive: bool,
    pub viewport_bounds: Option<LatLngBounds>,
    pub status: ViewStatus,
}

pub struct RouteView<B: MapBackend> {
    backend: B,
    config: RenderConfig,
    mode: RenderMode,
    tile_style: TileStyle,
    encoded: Option<String>,
    route: Option<Route>,
    scene: Option<MapScene>,
    handle: Option<B::Handle>,
    status: ViewStatus,
    on_expand: Option<Box<dyn FnMut()>>,
}

impl<B: MapBackend> RouteView<B> {
    pub fn new(backend: B, mode: RenderMode, config: RenderConfig) -> Self {
        Self {
            backend,
            config,
            mode,
            tile_style: TileStyle::Standard,
            encoded: None,
            route: None,
            scene: None,
            handle: None,
            status: ViewStatus::Detached,
            on_expand: None,
        }
    }

    /// Callback fired when a thumbnail is clicked.
    pub fn with_expand<F>(mut self, callback: F) -> Self
    where
        F: FnMut() + 'static,
    {
        self.on_expand = Some(Box::new(callback));
        self
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    pub fn mode(&self) -> RenderMode {
        self.mode
    }

    pub fn status(&self) -> ViewStatus {
        self.status
    }

    pub fn route(&self) -> Option<&Route> {
        self.route.as_ref()
    }

    pub fn scene(&self) -> Option<&MapScene> {
        self.scene.as_ref()
    }

    /// The live surface, present only while rendered.
    pub fn handle(&self) -> Option<&B::Handle> {
        self.handle.as_ref()
    }

    pub fn state(&self) -> MapViewState {
        MapViewState {
            tile_style: self.tile_style,
            interactive: self.mode.is_interactive(),
            viewport_bounds: self.handle.as_ref().and_then(|h| h.viewport_bounds()),
            status: self.status,
        }
    }

    /// Show `encoded`, rebuilding only when it differs from the current input.
    /// An unavailable view always retries.
    ///
    /// A malformed route is returned as an error, every time it is passed in,
    /// and leaves the placeholder up.
    pub fn set_route(&mut self, encoded: Option<&str>) -> Result<ViewStatus, RouteError> {
        let encoded = encoded.filter(|s| !s.is_empty());
        let settled = matches!(self.status, ViewStatus::Placeholder | ViewStatus::Rendered);
        if settled && self.encoded.as_deref() == encoded {
            return Ok(self.status);
        }
        self.encoded = encoded.map(str::to_owned);
        self.rebuild()
    }

    /// Rebuild the current input, e.g. once the container has been mounted.
    pub fn refresh(&mut self) -> Result<ViewStatus, RouteError> {
        self.rebuild()
    }

    pub fn set_mode(&mut self, mode: RenderMode) -> Result<ViewStatus, RouteError> {
        if mode == self.mode {
            return Ok(self.status);
        }
        self.mode = mode;
        if !mode.is_interactive() {
            self.tile_style = TileStyle::Standard;
        }
        if self.status == ViewStatus::Detached {
            return Ok(self.status);
        }
        self.rebuild()
    }

    /// Swap the tile source in place. Returns false in thumbnail mode, where
    /// the toggle is not offered.
    pub fn set_tile_style(&mut self, style: TileStyle) -> Result<bool, RouteError> {
        if !self.mode.is_interactive() {
            debug!("tile toggle ignored outside the interactive view");
            return Ok(false);
        }
        if style == self.tile_style {
            return Ok(true);
        }
        let url = self.config.tiles.url_for(style).to_string();
        if let Some(handle) = self.handle.as_mut() {
            handle.set_tile_url(&url)?;
        }
        if let Some(scene) = self.scene.as_mut() {
            scene.tile_url = url;
        }
        self.tile_style = style;
        Ok(true)
    }

    pub fn toggle_tiles(&mut self) -> Result<bool, RouteError> {
        self.set_tile_style(self.tile_style.toggled())
    }

    pub fn tile_style(&self) -> TileStyle {
        self.tile_style
    }

    /// Thumbnail clicks expand instead of interacting with the map.
    pub fn click(&mut self) -> bool {
        if self.mode.is_interactive() {
            return false;
        }
        match self.on_expand.as_mut() {
            Some(callback) => {
                callback();
                true
            }
            None => false,
        }
    }

    pub fn unmount(&mut self) {
        self.teardown();
        self.encoded = None;
        self.route = None;
        self.status = ViewStatus::Detached;
    }

    fn teardown(&mut self) {
        if let Some(mut handle) = self.handle.take() {
            handle.dispose();
        }
        self.scene = None;
    }

    fn rebuild(&mut self) -> Result<ViewStatus, RouteError> {
        self.teardown();
        self.route = None;
        self.status = ViewStatus::Placeholder;

        let Some(encoded) = self.encoded.as_deref() else {
            return Ok(self.status);
        };
        let route = match Route::decode(encoded) {
            Ok(route) => route,
            Err(err) => {
                warn!("route decode failed: {err}");
                self.encoded = None;
                return Err(err);
            }
        };
        if !route.is_drawable() {
            debug!("route has {} point(s); showing placeholder", route.len());
            self.route = Some(route);
            return Ok(self.status);
        }
        if !self.backend.is_available() {
            debug!("map backend unavailable; rendering nothing");
            self.route = Some(route);
            self.status = ViewStatus::Unavailable;
            return Ok(self.status);
        }

        let scene = MapScene::compose(&route, self.mode, self.tile_style, &self.config)?;
        self.route = Some(route);
        match self.backend.construct(&scene) {
            Ok(handle) => {
                self.handle = Some(handle);
                self.scene = Some(scene);
                self.status = ViewStatus::Rendered;
            }
            Err(err) => {
                warn!("map construction failed: {err}");
                self.status = ViewStatus::Unavailable;
            }
        }
        Ok(self.status)
    }
}

impl<B: MapBackend> Drop for RouteView<B> {
    fn drop(&mut self) {
        self.teardown();
    }
}
