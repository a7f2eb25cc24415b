//! Route geometry: decoded routes, bounding boxes, and Web-Mercator viewports.

use std::f64::consts::PI;

use serde::{Deserialize, Serialize};

use crate::polyline::{self, Coordinate};
use crate::RouteError;

/// Pixel edge of one slippy-map tile.
pub const TILE_SIZE: f64 = 256.0;
/// Deepest zoom any tile server offers.
pub const MAX_TILE_ZOOM: u8 = 22;
const MAX_LATITUDE: f64 = 85.051_128_779_806_59;
const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// A decoded route. Built once per decode and never mutated afterwards.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Route {
    points: Vec<Coordinate>,
}

impl Route {
    pub fn decode(encoded: &str) -> Result<Self, RouteError> {
        polyline::decode(encoded).map(Self::from_points)
    }

    pub fn from_points(points: Vec<Coordinate>) -> Self {
        Self { points }
    }

    pub fn points(&self) -> &[Coordinate] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// A path needs at least two points.
    pub fn is_drawable(&self) -> bool {
        self.points.len() >= 2
    }

    pub fn start(&self) -> Option<Coordinate> {
        self.points.first().copied()
    }

    pub fn finish(&self) -> Option<Coordinate> {
        self.points.last().copied()
    }

    /// True when the route ends where it started.
    pub fn is_closed_loop(&self) -> bool {
        match (self.start(), self.finish()) {
            (Some(start), Some(finish)) if self.is_drawable() => start.same_position(&finish),
            _ => false,
        }
    }

    pub fn bounds(&self) -> Option<LatLngBounds> {
        LatLngBounds::from_points(&self.points)
    }

    /// Great-circle length of the route in metres.
    pub fn distance_m(&self) -> f64 {
        self.points
            .windows(2)
            .map(|w| haversine_distance(w[0], w[1]))
            .sum()
    }

    pub fn encode(&self) -> String {
        polyline::encode(&self.points)
    }
}

pub fn haversine_distance(a: Coordinate, b: Coordinate) -> f64 {
    let dlat = (b.lat - a.lat).to_radians();
    let dlon = (b.lng - a.lng).to_radians();
    let h = (dlat / 2.0).sin().powi(2)
        + a.lat.to_radians().cos() * b.lat.to_radians().cos() * (dlon / 2.0).sin().powi(2);
    let c = 2.0 * h.sqrt().atan2((1.0 - h).sqrt());
    EARTH_RADIUS_M * c
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct LatLngBounds {
    pub south: f64,
    pub west: f64,
    pub north: f64,
    pub east: f64,
}

impl LatLngBounds {
    pub fn from_points(points: &[Coordinate]) -> Option<Self> {
        let first = points.first()?;
        let mut bounds = Self {
            south: first.lat,
            west: first.lng,
            north: first.lat,
            east: first.lng,
        };
        for point in &points[1..] {
            bounds.extend(*point);
        }
        Some(bounds)
    }

    pub fn extend(&mut self, point: Coordinate) {
        self.south = self.south.min(point.lat);
        self.north = self.north.max(point.lat);
        self.west = self.west.min(point.lng);
        self.east = self.east.max(point.lng);
    }

    pub fn contains(&self, point: Coordinate) -> bool {
        point.lat >= self.south
            && point.lat <= self.north
            && point.lng >= self.west
            && point.lng <= self.east
    }

    pub fn south_west(&self) -> Coordinate {
        Coordinate::new(self.south, self.west)
    }

    pub fn north_east(&self) -> Coordinate {
        Coordinate::new(self.north, self.east)
    }
}

fn world_size(zoom: f64) -> f64 {
    TILE_SIZE * zoom.exp2()
}

/// Project onto the Web-Mercator plane in pixels at `zoom`.
pub fn project(coord: Coordinate, zoom: f64) -> (f64, f64) {
    let size = world_size(zoom);
    let lat = coord.lat.clamp(-MAX_LATITUDE, MAX_LATITUDE).to_radians();
    let x = (coord.lng + 180.0) / 360.0 * size;
    let y = (1.0 - (lat.tan() + 1.0 / lat.cos()).ln() / PI) / 2.0 * size;
    (x, y)
}

pub fn unproject((x, y): (f64, f64), zoom: f64) -> Coordinate {
    let size = world_size(zoom);
    let lng = x / size * 360.0 - 180.0;
    let lat = (PI * (1.0 - 2.0 * y / size)).sinh().atan().to_degrees();
    Coordinate::new(lat, lng)
}

/// A slippy-map tile address.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TileCoord {
    pub z: u8,
    pub x: u32,
    pub y: u32,
}

/// A tile placed on screen: its address and the pixel offset of its top-left corner.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PlacedTile {
    pub tile: TileCoord,
    pub offset: (i32, i32),
}

/// Fill a `{s}/{z}/{x}/{y}/{r}` tile template.
///
/// Subdomains rotate on `x + y` so neighbouring tiles spread across hosts.
pub fn expand_tile_url(template: &str, tile: TileCoord, subdomains: &[String]) -> String {
    let mut url = template
        .replace("{z}", &tile.z.to_string())
        .replace("{x}", &tile.x.to_string())
        .replace("{y}", &tile.y.to_string())
        .replace("{r}", "");
    if let Some(sub) = subdomains
        .get((tile.x as usize + tile.y as usize) % subdomains.len().max(1))
    {
        url = url.replace("{s}", sub);
    }
    url
}

/// Map centre and integer zoom for a fixed-size surface.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Viewport {
    pub center: Coordinate,
    pub zoom: u8,
    pub size: (u32, u32),
}

impl Viewport {
    /// Fit `bounds` inside `size` less `padding` on every side, snapping down to
    /// a whole zoom level so the route is never clipped.
    pub fn fit(bounds: &LatLngBounds, size: (u32, u32), padding: u32, max_zoom: u8) -> Self {
        let nw = project(Coordinate::new(bounds.north, bounds.west), 0.0);
        let se = project(Coordinate::new(bounds.south, bounds.east), 0.0);
        let span_x = (se.0 - nw.0).abs();
        let span_y = (se.1 - nw.1).abs();
        let avail_x = (f64::from(size.0) - 2.0 * f64::from(padding)).max(1.0);
        let avail_y = (f64::from(size.1) - 2.0 * f64::from(padding)).max(1.0);

        let max_zoom = max_zoom.min(MAX_TILE_ZOOM);
        let scale = match (span_x > f64::EPSILON, span_y > f64::EPSILON) {
            (true, true) => (avail_x / span_x).min(avail_y / span_y),
            (true, false) => avail_x / span_x,
            (false, true) => avail_y / span_y,
            (false, false) => f64::INFINITY,
        };
        let zoom = if scale.is_finite() {
            scale.log2().floor().clamp(0.0, f64::from(max_zoom)) as u8
        } else {
            max_zoom
        };

        let center = unproject(((nw.0 + se.0) / 2.0, (nw.1 + se.1) / 2.0), 0.0);
        Self { center, zoom, size }
    }

    fn origin(&self) -> (f64, f64) {
        let (cx, cy) = project(self.center, f64::from(self.zoom));
        (
            cx - f64::from(self.size.0) / 2.0,
            cy - f64::from(self.size.1) / 2.0,
        )
    }

    /// Screen pixel of `coord`, origin at the top-left corner.
    pub fn to_screen(&self, coord: Coordinate) -> (f64, f64) {
        let (x, y) = project(coord, f64::from(self.zoom));
        let (ox, oy) = self.origin();
        (x - ox, y - oy)
    }

    /// Geographic extent currently on screen.
    pub fn visible_bounds(&self) -> LatLngBounds {
        let zoom = f64::from(self.zoom);
        let (ox, oy) = self.origin();
        let nw = unproject((ox, oy), zoom);
        let se = unproject(
            (ox + f64::from(self.size.0), oy + f64::from(self.size.1)),
            zoom,
        );
        LatLngBounds {
            south: se.lat,
            west: nw.lng,
            north: nw.lat,
            east: se.lng,
        }
    }

    /// Tiles covering the surface, wrapped horizontally and clipped vertically.
    pub fn tiles(&self) -> Vec<PlacedTile> {
        let (ox, oy) = self.origin();
        let count = 1i64 << self.zoom.min(MAX_TILE_ZOOM);
        let first_x = (ox / TILE_SIZE).floor() as i64;
        let first_y = (oy / TILE_SIZE).floor() as i64;
        let last_x = ((ox + f64::from(self.size.0) - 1.0) / TILE_SIZE).floor() as i64;
        let last_y = ((oy + f64::from(self.size.1) - 1.0) / TILE_SIZE).floor() as i64;

        let mut out = Vec::new();
        for ty in first_y.max(0)..=last_y.min(count - 1) {
            for tx in first_x..=last_x {
                let offset = (
                    (tx as f64 * TILE_SIZE - ox).round() as i32,
                    (ty as f64 * TILE_SIZE - oy).round() as i32,
                );
                out.push(PlacedTile {
                    tile: TileCoord {
                        z: self.zoom,
                        x: tx.rem_euclid(count) as u32,
                        y: ty as u32,
                    },
                    offset,
                });
            }
        }
        out
    }
}
