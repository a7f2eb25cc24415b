//! Route maps for running activities: the encoded-polyline codec, route
//! geometry, the checkered finish marker, and the contract for drawing a route
//! on an injected map surface.

use thiserror::Error;

pub mod activity;
pub mod config;
pub mod finish;
pub mod geo;
pub mod polyline;
pub mod render;
pub mod track;

pub use activity::{parse_activity_feed, ActivityFeed, ActivityRoute};
pub use config::{parse_hex_color, ModeStyle, RenderConfig, TileSources};
pub use finish::FinishIcon;
pub use geo::{LatLngBounds, Route, TileCoord, Viewport};
pub use polyline::{decode, encode, Coordinate};
pub use render::{
    Layer, MapBackend, MapHandle, MapScene, MapViewState, RenderMode, RouteView, TileStyle,
    ViewStatus,
};
pub use track::parse_track;

#[derive(Error, Debug)]
pub enum RouteError {
    #[error("polyline ends inside a value at byte {offset}")]
    TruncatedPolyline { offset: usize },
    #[error("invalid polyline byte 0x{byte:02x} at offset {offset}")]
    InvalidPolylineByte { offset: usize, byte: u8 },
    #[error("polyline value overflows at byte {offset}")]
    PolylineOverflow { offset: usize },
    #[error("unsupported file format: {0}")]
    UnsupportedFormat(String),
    #[error("failed to parse FIT file: {0}")]
    FitParse(String),
    #[error("failed to parse GPX file: {0}")]
    GpxParse(String),
    #[error("invalid activity feed: {0}")]
    Feed(String),
    #[error("invalid configuration: {0}")]
    Config(String),
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),
    #[error("route needs at least two points")]
    InsufficientData,
    #[error("map backend error: {0}")]
    MapBackend(String),
}

impl RouteError {
    /// True for errors caused by a malformed encoded polyline.
    pub fn is_decode_error(&self) -> bool {
        matches!(
            self,
            RouteError::TruncatedPolyline { .. }
                | RouteError::InvalidPolylineByte { .. }
                | RouteError::PolylineOverflow { .. }
        )
    }
}
