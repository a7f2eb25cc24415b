//! Recorded tracks (FIT or GPX) as coordinate sequences ready for encoding.

use tracing::debug;

use crate::polyline::Coordinate;
use crate::RouteError;

/// Degrees per FIT semicircle (2^31 semicircles span 180 degrees).
const SEMICIRCLE_DEG: f64 = 180.0 / 2_147_483_648.0;

/// Parse a track from bytes using the provided format hint (extension or name).
pub fn parse_track(input: &[u8], format: &str) -> Result<Vec<Coordinate>, RouteError> {
    let format_lc = format.to_ascii_lowercase();
    let points = if format_lc.ends_with(".fit") || format_lc == "fit" {
        parse_fit_track(input)?
    } else if format_lc.ends_with(".gpx") || format_lc == "gpx" {
        parse_gpx_track(input)?
    } else {
        return Err(RouteError::UnsupportedFormat(format.to_string()));
    };
    debug!("parsed {} track point(s) from {format}", points.len());
    Ok(points)
}

fn parse_fit_track(input: &[u8]) -> Result<Vec<Coordinate>, RouteError> {
    use fitparser::de::from_bytes;
    use fitparser::profile::MesgNum;

    let records = from_bytes(input).map_err(|e| RouteError::FitParse(e.to_string()))?;
    let mut out = Vec::new();
    for record in records.into_iter() {
        if record.kind() != MesgNum::Record {
            continue;
        }
        let mut lat = None;
        let mut lng = None;
        for field in record.fields() {
            match field.name() {
                "position_lat" => lat = fit_value_to_f64(field.value()),
                "position_long" => lng = fit_value_to_f64(field.value()),
                _ => {}
            }
        }
        // Records without a fix (treadmill, signal loss) carry no position.
        if let (Some(lat), Some(lng)) = (lat, lng) {
            out.push(semicircles_to_coordinate(lat, lng));
        }
    }
    Ok(out)
}

fn semicircles_to_coordinate(lat: f64, lng: f64) -> Coordinate {
    Coordinate::new(lat * SEMICIRCLE_DEG, lng * SEMICIRCLE_DEG)
}

fn fit_value_to_f64(value: &fitparser::Value) -> Option<f64> {
    match value {
        fitparser::Value::SInt32(v) => Some(*v as f64),
        fitparser::Value::UInt32(v) => Some(*v as f64),
        fitparser::Value::SInt64(v) => Some(*v as f64),
        fitparser::Value::Float32(v) => Some(*v as f64),
        fitparser::Value::Float64(v) => Some(*v),
        fitparser::Value::Array(values) => values.iter().find_map(fit_value_to_f64),
        _ => None,
    }
}

fn parse_gpx_track(input: &[u8]) -> Result<Vec<Coordinate>, RouteError> {
    use gpx::read;
    use std::io::Cursor;

    let gpx = read(Cursor::new(input)).map_err(|e| RouteError::GpxParse(e.to_string()))?;
    let mut out: Vec<Coordinate> = gpx
        .tracks
        .iter()
        .flat_map(|track| track.segments.iter())
        .flat_map(|segment| segment.points.iter())
        .map(|point| {
            let geo = point.point();
            Coordinate::new(geo.y(), geo.x())
        })
        .collect();
    // Planned routes (<rte>) stand in when nothing was recorded.
    if out.is_empty() {
        out = gpx
            .routes
            .iter()
            .flat_map(|route| route.points.iter())
            .map(|point| {
                let geo = point.point();
                Coordinate::new(geo.y(), geo.x())
            })
            .collect();
    }
    Ok(out)
}
