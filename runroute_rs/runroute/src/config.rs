//! Render configuration: tile sources, colours, and per-mode styling.
//!
//! Defaults reproduce the dashboard's look. A JSON file may override any
//! subset of fields, and `RUNROUTE_*` environment variables override the file.

use serde::{Deserialize, Serialize};

use crate::geo::MAX_TILE_ZOOM;
use crate::render::{RenderMode, TileStyle};
use crate::RouteError;

pub const STANDARD_TILES: &str =
    "https://cartodb-basemaps-{s}.global.ssl.fastly.net/rastertiles/voyager/{z}/{x}/{y}.png";
pub const SATELLITE_TILES: &str =
    "https://server.arcgisonline.com/ArcGIS/rest/services/World_Imagery/MapServer/tile/{z}/{y}/{x}";
pub const ROUTE_COLOR: &str = "#FC4C02";
pub const START_FILL: &str = "#06d6a0";
pub const START_STROKE: &str = "#ffffff";

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TileSources {
    pub standard: String,
    pub satellite: String,
    pub subdomains: Vec<String>,
    pub max_zoom: u8,
}

impl Default for TileSources {
    fn default() -> Self {
        Self {
            standard: STANDARD_TILES.to_string(),
            satellite: SATELLITE_TILES.to_string(),
            subdomains: vec!["a".into(), "b".into(), "c".into()],
            max_zoom: 19,
        }
    }
}

impl TileSources {
    pub fn url_for(&self, style: TileStyle) -> &str {
        match style {
            TileStyle::Standard => &self.standard,
            TileStyle::Satellite => &self.satellite,
        }
    }
}

/// Sizes that differ between the thumbnail and the modal.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ModeStyle {
    pub path_weight: f64,
    pub start_radius: f64,
    pub start_stroke_weight: f64,
    pub finish_icon_size: u32,
    pub padding_px: u32,
}

impl ModeStyle {
    pub fn thumbnail() -> Self {
        Self {
            path_weight: 3.5,
            start_radius: 5.0,
            start_stroke_weight: 1.5,
            finish_icon_size: 14,
            padding_px: 12,
        }
    }

    pub fn modal() -> Self {
        Self {
            path_weight: 4.0,
            start_radius: 7.0,
            start_stroke_weight: 2.0,
            finish_icon_size: 18,
            padding_px: 40,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderConfig {
    pub tiles: TileSources,
    pub route_color: String,
    pub route_opacity: f64,
    pub start_fill: String,
    pub start_stroke: String,
    pub start_z_index_offset: i32,
    pub thumbnail: ModeStyle,
    pub modal: ModeStyle,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            tiles: TileSources::default(),
            route_color: ROUTE_COLOR.to_string(),
            route_opacity: 0.95,
            start_fill: START_FILL.to_string(),
            start_stroke: START_STROKE.to_string(),
            start_z_index_offset: 1000,
            thumbnail: ModeStyle::thumbnail(),
            modal: ModeStyle::modal(),
        }
    }
}

impl RenderConfig {
    pub fn mode_style(&self, mode: RenderMode) -> &ModeStyle {
        match mode {
            RenderMode::Thumbnail => &self.thumbnail,
            RenderMode::Modal => &self.modal,
        }
    }

    pub fn from_json_str(json: &str) -> Result<Self, RouteError> {
        serde_json::from_str(json).map_err(|e| RouteError::Config(e.to_string()))
    }

    /// Read a JSON config file, apply environment overrides, and validate.
    #[cfg(not(feature = "wasm"))]
    pub fn load(path: &std::path::Path) -> Result<Self, RouteError> {
        let data = std::fs::read_to_string(path)
            .map_err(|e| RouteError::Config(format!("{}: {e}", path.display())))?;
        let mut config = Self::from_json_str(&data)?;
        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    #[cfg(feature = "wasm")]
    pub fn load(_path: &std::path::Path) -> Result<Self, RouteError> {
        Err(RouteError::Config(
            "config files are unavailable on wasm".into(),
        ))
    }

    #[cfg(not(feature = "wasm"))]
    pub fn apply_env_overrides(&mut self) -> Result<(), RouteError> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    /// No process environment in the browser.
    #[cfg(feature = "wasm")]
    pub fn apply_env_overrides(&mut self) -> Result<(), RouteError> {
        Ok(())
    }

    /// Apply `RUNROUTE_*` overrides from any key lookup.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), RouteError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup("RUNROUTE_STANDARD_TILES") {
            self.tiles.standard = url;
        }
        if let Some(url) = lookup("RUNROUTE_SATELLITE_TILES") {
            self.tiles.satellite = url;
        }
        if let Some(color) = lookup("RUNROUTE_ROUTE_COLOR") {
            self.route_color = color;
        }
        if let Some(zoom) = lookup("RUNROUTE_MAX_ZOOM") {
            self.tiles.max_zoom = zoom
                .trim()
                .parse()
                .map_err(|_| RouteError::Config(format!("RUNROUTE_MAX_ZOOM: bad value {zoom:?}")))?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), RouteError> {
        for (name, template) in [
            ("tiles.standard", &self.tiles.standard),
            ("tiles.satellite", &self.tiles.satellite),
        ] {
            for key in ["{z}", "{x}", "{y}"] {
                if !template.contains(key) {
                    return Err(RouteError::Config(format!("{name} is missing {key}")));
                }
            }
        }
        if self.tiles.standard.contains("{s}") && self.tiles.subdomains.is_empty() {
            return Err(RouteError::Config(
                "tiles.standard uses {s} but no subdomains are configured".into(),
            ));
        }
        if self.tiles.max_zoom > MAX_TILE_ZOOM {
            return Err(RouteError::Config(format!(
                "tiles.max_zoom must be at most {MAX_TILE_ZOOM}"
            )));
        }
        for (name, color) in [
            ("route_color", &self.route_color),
            ("start_fill", &self.start_fill),
            ("start_stroke", &self.start_stroke),
        ] {
            parse_hex_color(color).map_err(|_| RouteError::Config(format!("{name}: {color}")))?;
        }
        if !(0.0..=1.0).contains(&self.route_opacity) {
            return Err(RouteError::Config("route_opacity must be within 0..=1".into()));
        }
        for (name, style) in [("thumbnail", &self.thumbnail), ("modal", &self.modal)] {
            if style.path_weight <= 0.0 || style.start_radius <= 0.0 || style.finish_icon_size == 0
            {
                return Err(RouteError::Config(format!("{name}: sizes must be positive")));
            }
        }
        Ok(())
    }
}

/// Parse `#rrggbb` (or `#rgb`) into its channels.
pub fn parse_hex_color(value: &str) -> Result<[u8; 3], RouteError> {
    let hex = value
        .strip_prefix('#')
        .ok_or_else(|| RouteError::InvalidParameter(format!("colour {value:?} needs a leading #")))?;
    let bad = || RouteError::InvalidParameter(format!("colour {value:?} is not hex"));
    if !hex.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Err(bad());
    }
    match hex.len() {
        6 => {
            let channel = |i: usize| u8::from_str_radix(&hex[i..i + 2], 16).map_err(|_| bad());
            Ok([channel(0)?, channel(2)?, channel(4)?])
        }
        3 => {
            let channel = |i: usize| {
                u8::from_str_radix(&hex[i..i + 1], 16)
                    .map(|v| v * 17)
                    .map_err(|_| bad())
            };
            Ok([channel(0)?, channel(1)?, channel(2)?])
        }
        _ => Err(bad()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn defaults_are_valid() {
        RenderConfig::default().validate().unwrap();
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let config = RenderConfig::from_json_str(
            r##"{ "route_color": "#123456", "tiles": { "max_zoom": 17 } }"##,
        )
        .unwrap();
        assert_eq!(config.route_color, "#123456");
        assert_eq!(config.tiles.max_zoom, 17);
        assert_eq!(config.tiles.standard, STANDARD_TILES);
        assert_eq!(config.modal, ModeStyle::modal());
    }

    #[test]
    fn malformed_json_is_a_config_error() {
        assert!(matches!(
            RenderConfig::from_json_str("{ nope"),
            Err(RouteError::Config(_))
        ));
    }

    #[test]
    fn overrides_replace_file_values() {
        let env: HashMap<&str, &str> = [
            ("RUNROUTE_SATELLITE_TILES", "https://sat.example/{z}/{y}/{x}.jpg"),
            ("RUNROUTE_MAX_ZOOM", "16"),
        ]
        .into_iter()
        .collect();
        let mut config = RenderConfig::default();
        config
            .apply_overrides(|key| env.get(key).map(|v| v.to_string()))
            .unwrap();
        assert_eq!(config.tiles.satellite, "https://sat.example/{z}/{y}/{x}.jpg");
        assert_eq!(config.tiles.max_zoom, 16);
        assert_eq!(config.tiles.standard, STANDARD_TILES);

        let err = config
            .apply_overrides(|key| (key == "RUNROUTE_MAX_ZOOM").then(|| "high".to_string()))
            .unwrap_err();
        assert!(matches!(err, RouteError::Config(_)));
    }

    #[test]
    fn validation_rejects_bad_templates_and_colours() {
        let mut config = RenderConfig::default();
        config.tiles.satellite = "https://sat.example/{z}/{x}.png".into();
        assert!(config.validate().is_err());

        let mut config = RenderConfig::default();
        config.route_color = "orange".into();
        assert!(config.validate().is_err());

        let mut config = RenderConfig::default();
        config.thumbnail.finish_icon_size = 0;
        assert!(config.validate().is_err());
    }

    #[cfg(not(feature = "wasm"))]
    #[test]
    fn load_reads_and_validates_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("runroute.json");
        std::fs::write(&path, r##"{ "route_color": "#0a0b0c" }"##).unwrap();
        let config = RenderConfig::load(&path).unwrap();
        assert_eq!(config.tiles.standard, STANDARD_TILES);
        assert_eq!(config.modal, ModeStyle::modal());

        std::fs::write(&path, r##"{ "route_color": "orange" }"##).unwrap();
        assert!(matches!(RenderConfig::load(&path), Err(RouteError::Config(_))));
        assert!(RenderConfig::load(&dir.path().join("missing.json")).is_err());
    }

    #[cfg(feature = "wasm")]
    #[test]
    fn browser_builds_keep_file_loading_api() {
        let err = RenderConfig::load(std::path::Path::new("runroute.json")).unwrap_err();
        assert!(matches!(err, RouteError::Config(_)));

        let mut config = RenderConfig::default();
        config.apply_env_overrides().unwrap();
        assert_eq!(config, RenderConfig::default());
    }

    #[test]
    fn hex_colours() {
        assert_eq!(parse_hex_color("#FC4C02").unwrap(), [0xfc, 0x4c, 0x02]);
        assert_eq!(parse_hex_color("#fff").unwrap(), [0xff, 0xff, 0xff]);
        assert!(parse_hex_color("FC4C02").is_err());
        assert!(parse_hex_color("#12345").is_err());
        assert!(parse_hex_color("#12345g").is_err());
    }
}
