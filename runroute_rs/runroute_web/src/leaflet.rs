//! Leaflet binding for the route map contract, reached through the global `L`.

use std::collections::HashMap;

use js_sys::{Array, Function, Object, Reflect};
use runroute::geo::LatLngBounds;
use runroute::render::{FitBounds, Interactions, PathStyle, StartMarkerStyle};
use runroute::{FinishIcon, Layer, MapBackend, MapHandle, MapScene, RouteError};
use serde::Serialize;
use wasm_bindgen::{Clamped, JsCast, JsValue};
use web_sys::{CanvasRenderingContext2d, HtmlCanvasElement, HtmlElement, ImageData};

#[derive(Serialize, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
struct MapOptions {
    zoom_control: bool,
    attribution_control: bool,
    dragging: bool,
    scroll_wheel_zoom: bool,
    double_click_zoom: bool,
    touch_zoom: bool,
    box_zoom: bool,
    keyboard: bool,
}

impl From<&Interactions> for MapOptions {
    fn from(i: &Interactions) -> Self {
        Self {
            zoom_control: i.zoom_control,
            attribution_control: false,
            dragging: i.dragging,
            scroll_wheel_zoom: i.scroll_wheel_zoom,
            double_click_zoom: i.double_click_zoom,
            touch_zoom: i.touch_zoom,
            box_zoom: i.box_zoom,
            keyboard: i.keyboard,
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct TileOptions<'a> {
    max_zoom: u8,
    subdomains: &'a [String],
}

#[derive(Serialize)]
struct PolylineOptions<'a> {
    color: &'a str,
    weight: f64,
    opacity: f64,
}

impl<'a> From<&'a PathStyle> for PolylineOptions<'a> {
    fn from(style: &'a PathStyle) -> Self {
        Self {
            color: &style.color,
            weight: style.weight,
            opacity: style.opacity,
        }
    }
}

#[derive(Serialize, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
struct CircleMarkerOptions<'a> {
    radius: f64,
    fill_color: &'a str,
    fill_opacity: f64,
    color: &'a str,
    weight: f64,
    z_index_offset: i32,
}

impl<'a> From<&'a StartMarkerStyle> for CircleMarkerOptions<'a> {
    fn from(style: &'a StartMarkerStyle) -> Self {
        Self {
            radius: style.radius,
            fill_color: &style.fill_color,
            fill_opacity: style.fill_opacity,
            color: &style.stroke_color,
            weight: style.stroke_weight,
            z_index_offset: style.z_index_offset,
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct IconOptions<'a> {
    icon_url: &'a str,
    icon_size: [u32; 2],
    icon_anchor: [f64; 2],
}

#[derive(Serialize, Debug, PartialEq)]
struct FitOptions {
    padding: [u32; 2],
    animate: bool,
}

impl From<&FitBounds> for FitOptions {
    fn from(fit: &FitBounds) -> Self {
        Self {
            padding: [fit.padding_px, fit.padding_px],
            animate: fit.animate,
        }
    }
}

fn to_js<T: Serialize + ?Sized>(value: &T) -> Result<JsValue, RouteError> {
    let serializer = serde_wasm_bindgen::Serializer::json_compatible();
    value
        .serialize(&serializer)
        .map_err(|e| RouteError::MapBackend(e.to_string()))
}

fn js_error(value: JsValue) -> RouteError {
    RouteError::MapBackend(
        value
            .as_string()
            .or_else(|| {
                Reflect::get(&value, &JsValue::from_str("message"))
                    .ok()
                    .and_then(|m| m.as_string())
            })
            .unwrap_or_else(|| "leaflet call failed".to_string()),
    )
}

fn call(target: &JsValue, method: &str, args: &[&JsValue]) -> Result<JsValue, RouteError> {
    let func = Reflect::get(target, &JsValue::from_str(method))
        .map_err(js_error)?
        .dyn_into::<Function>()
        .map_err(|_| RouteError::MapBackend(format!("{method} is not a function")))?;
    let array = Array::new();
    for arg in args {
        array.push(arg);
    }
    func.apply(target, &array).map_err(js_error)
}

fn leaflet() -> Option<JsValue> {
    Reflect::get(&js_sys::global(), &JsValue::from_str("L"))
        .ok()
        .filter(|l| !l.is_undefined() && !l.is_null())
}

/// Rasterise the finish flag into a PNG data URL via a scratch canvas.
fn finish_icon_data_url(icon: &FinishIcon) -> Result<String, RouteError> {
    let document = web_sys::window()
        .and_then(|w| w.document())
        .ok_or_else(|| RouteError::MapBackend("no document".into()))?;
    let canvas: HtmlCanvasElement = document
        .create_element("canvas")
        .map_err(js_error)?
        .dyn_into()
        .map_err(|_| RouteError::MapBackend("canvas element unavailable".into()))?;
    canvas.set_width(icon.size());
    canvas.set_height(icon.size());
    let ctx: CanvasRenderingContext2d = canvas
        .get_context("2d")
        .map_err(js_error)?
        .ok_or_else(|| RouteError::MapBackend("2d context unavailable".into()))?
        .dyn_into()
        .map_err(|_| RouteError::MapBackend("2d context unavailable".into()))?;
    let data = ImageData::new_with_u8_clamped_array_and_sh(
        Clamped(icon.rgba()),
        icon.size(),
        icon.size(),
    )
    .map_err(js_error)?;
    ctx.put_image_data(&data, 0.0, 0.0).map_err(js_error)?;
    canvas.to_data_url().map_err(js_error)
}

pub struct LeafletBackend {
    container: HtmlElement,
    icon_urls: HashMap<u32, String>,
}

impl LeafletBackend {
    pub fn new(container: HtmlElement) -> Self {
        Self {
            container,
            icon_urls: HashMap::new(),
        }
    }

    fn icon_url(&mut self, icon: &FinishIcon) -> Result<String, RouteError> {
        if let Some(url) = self.icon_urls.get(&icon.size()) {
            return Ok(url.clone());
        }
        let url = finish_icon_data_url(icon)?;
        self.icon_urls.insert(icon.size(), url.clone());
        Ok(url)
    }

    fn add_layer(&mut self, l: &JsValue, map: &JsValue, layer: &Layer) -> Result<(), RouteError> {
        let overlay = match layer {
            Layer::Path { points, style } => {
                let latlngs: Vec<[f64; 2]> = points.iter().map(|p| [p.lat, p.lng]).collect();
                call(
                    l,
                    "polyline",
                    &[&to_js(&latlngs)?, &to_js(&PolylineOptions::from(style))?],
                )?
            }
            Layer::FinishMarker { at, icon } => {
                let url = self.icon_url(icon)?;
                let (ax, ay) = icon.anchor();
                let icon_js = call(
                    l,
                    "icon",
                    &[&to_js(&IconOptions {
                        icon_url: &url,
                        icon_size: [icon.size(), icon.size()],
                        icon_anchor: [ax, ay],
                    })?],
                )?;
                let options = Object::new();
                Reflect::set(&options, &JsValue::from_str("icon"), &icon_js).map_err(js_error)?;
                call(l, "marker", &[&to_js(&[at.lat, at.lng])?, &options])?
            }
            Layer::StartMarker { at, style } => call(
                l,
                "circleMarker",
                &[
                    &to_js(&[at.lat, at.lng])?,
                    &to_js(&CircleMarkerOptions::from(style))?,
                ],
            )?,
        };
        call(&overlay, "addTo", &[map])?;
        Ok(())
    }
}

impl MapBackend for LeafletBackend {
    type Handle = LeafletHandle;

    fn is_available(&self) -> bool {
        leaflet().is_some() && self.container.is_connected()
    }

    fn construct(&mut self, scene: &MapScene) -> Result<LeafletHandle, RouteError> {
        let l = leaflet().ok_or_else(|| RouteError::MapBackend("Leaflet is not loaded".into()))?;
        let container: &JsValue = self.container.as_ref();
        let map = call(
            &l,
            "map",
            &[container, &to_js(&MapOptions::from(&scene.interactions))?],
        )?;
        let mut handle = LeafletHandle {
            map: map.clone(),
            tile_layer: JsValue::UNDEFINED,
        };

        // From here on a failure must still remove the half-built map.
        let build = (|| -> Result<JsValue, RouteError> {
            let tile_layer = call(
                &l,
                "tileLayer",
                &[
                    &JsValue::from_str(&scene.tile_url),
                    &to_js(&TileOptions {
                        max_zoom: scene.max_zoom,
                        subdomains: &scene.subdomains,
                    })?,
                ],
            )?;
            call(&tile_layer, "addTo", &[&map])?;
            for layer in &scene.layers {
                self.add_layer(&l, &map, layer)?;
            }
            let b = &scene.fit.bounds;
            let bounds = to_js(&[[b.south, b.west], [b.north, b.east]])?;
            call(
                &map,
                "fitBounds",
                &[&bounds, &to_js(&FitOptions::from(&scene.fit))?],
            )?;
            Ok(tile_layer)
        })();

        match build {
            Ok(tile_layer) => {
                handle.tile_layer = tile_layer;
                Ok(handle)
            }
            Err(err) => {
                handle.dispose();
                Err(err)
            }
        }
    }
}

pub struct LeafletHandle {
    map: JsValue,
    tile_layer: JsValue,
}

impl MapHandle for LeafletHandle {
    fn set_tile_url(&mut self, url: &str) -> Result<(), RouteError> {
        call(&self.tile_layer, "setUrl", &[&JsValue::from_str(url)])?;
        Ok(())
    }

    fn dispose(&mut self) {
        if self.map.is_undefined() {
            return;
        }
        let _ = call(&self.map, "remove", &[]);
        self.map = JsValue::UNDEFINED;
        self.tile_layer = JsValue::UNDEFINED;
    }

    fn viewport_bounds(&self) -> Option<LatLngBounds> {
        let bounds = call(&self.map, "getBounds", &[]).ok()?;
        let edge = |name: &str| call(&bounds, name, &[]).ok()?.as_f64();
        Some(LatLngBounds {
            south: edge("getSouth")?,
            west: edge("getWest")?,
            north: edge("getNorth")?,
            east: edge("getEast")?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use runroute::{RenderConfig, RenderMode};

    #[test]
    fn thumbnail_map_is_locked() {
        let options = MapOptions::from(&Interactions::for_mode(RenderMode::Thumbnail));
        let json = serde_json::to_value(&options).unwrap();
        assert_eq!(json["zoomControl"], false);
        assert_eq!(json["attributionControl"], false);
        assert_eq!(json["scrollWheelZoom"], false);
        assert_eq!(json["boxZoom"], false);
        assert_eq!(json["keyboard"], false);
    }

    #[test]
    fn modal_map_is_interactive() {
        let options = MapOptions::from(&Interactions::for_mode(RenderMode::Modal));
        assert!(options.zoom_control && options.dragging && options.touch_zoom);
        assert!(!options.attribution_control);
    }

    #[test]
    fn start_marker_options_use_leaflet_names() {
        let config = RenderConfig::default();
        let style = StartMarkerStyle {
            radius: config.thumbnail.start_radius,
            fill_color: config.start_fill.clone(),
            fill_opacity: 1.0,
            stroke_color: config.start_stroke.clone(),
            stroke_weight: config.thumbnail.start_stroke_weight,
            z_index_offset: config.start_z_index_offset,
        };
        let json = serde_json::to_value(CircleMarkerOptions::from(&style)).unwrap();
        assert_eq!(json["radius"], 5.0);
        assert_eq!(json["fillColor"], "#06d6a0");
        assert_eq!(json["fillOpacity"], 1.0);
        assert_eq!(json["color"], "#ffffff");
        assert_eq!(json["weight"], 1.5);
        assert_eq!(json["zIndexOffset"], 1000);
    }

    #[test]
    fn fit_padding_is_symmetric() {
        let fit = FitBounds {
            bounds: LatLngBounds {
                south: 0.0,
                west: 0.0,
                north: 1.0,
                east: 1.0,
            },
            padding_px: 40,
            animate: false,
        };
        assert_eq!(
            FitOptions::from(&fit),
            FitOptions {
                padding: [40, 40],
                animate: false
            }
        );
    }
}
