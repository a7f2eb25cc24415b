//! Encoded-polyline codec (Google's algorithm, precision 1e5).
//!
//! Each coordinate is stored as two zigzag-encoded deltas from the previous
//! coordinate, written as little-endian groups of 5 bits offset by 63 so that
//! every byte lands in the printable ASCII range `?`..=`~`.

use serde::{Deserialize, Serialize};

use crate::RouteError;

const PRECISION: f64 = 1e5;
const CHAR_OFFSET: u8 = 63;
const CHAR_MAX: u8 = CHAR_OFFSET + 0x3f;
const CONTINUATION: u8 = 0x20;
const CHUNK_MASK: u8 = 0x1f;
// Seven groups carry 35 bits, enough for any zigzagged 32-bit delta.
const MAX_SHIFT: u32 = 30;

/// A latitude/longitude pair in decimal degrees.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    pub lat: f64,
    pub lng: f64,
}

impl Coordinate {
    pub fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }

    fn to_e5(self) -> (i64, i64) {
        (
            (self.lat * PRECISION).round() as i64,
            (self.lng * PRECISION).round() as i64,
        )
    }

    /// Equal at the codec's 1e-5 degree resolution.
    pub fn same_position(&self, other: &Coordinate) -> bool {
        self.to_e5() == other.to_e5()
    }
}

impl From<(f64, f64)> for Coordinate {
    fn from((lat, lng): (f64, f64)) -> Self {
        Self { lat, lng }
    }
}

/// Decode an encoded polyline into coordinates.
///
/// An empty string yields an empty vector. Input that ends inside a value, or
/// after a latitude without its longitude, is rejected rather than truncated.
pub fn decode(encoded: &str) -> Result<Vec<Coordinate>, RouteError> {
    let bytes = encoded.as_bytes();
    // Typical routes spend 8-10 bytes per point.
    let mut points = Vec::with_capacity(bytes.len() / 8);
    let mut idx = 0usize;
    let mut lat = 0i64;
    let mut lng = 0i64;

    while idx < bytes.len() {
        lat += read_delta(bytes, &mut idx)?;
        lng += read_delta(bytes, &mut idx)?;
        points.push(Coordinate::new(lat as f64 / PRECISION, lng as f64 / PRECISION));
    }

    Ok(points)
}

fn read_delta(bytes: &[u8], idx: &mut usize) -> Result<i64, RouteError> {
    let mut result = 0i64;
    let mut shift = 0u32;
    loop {
        let offset = *idx;
        let byte = *bytes
            .get(offset)
            .ok_or(RouteError::TruncatedPolyline { offset })?;
        if !(CHAR_OFFSET..=CHAR_MAX).contains(&byte) {
            return Err(RouteError::InvalidPolylineByte { offset, byte });
        }
        let chunk = byte - CHAR_OFFSET;
        result |= i64::from(chunk & CHUNK_MASK) << shift;
        *idx += 1;
        if chunk & CONTINUATION == 0 {
            break;
        }
        shift += 5;
        if shift > MAX_SHIFT {
            return Err(RouteError::PolylineOverflow { offset });
        }
    }
    Ok(if result & 1 == 1 {
        !(result >> 1)
    } else {
        result >> 1
    })
}

/// Encode coordinates, rounding each ordinate to 1e-5 degrees.
pub fn encode(points: &[Coordinate]) -> String {
    let mut out = String::with_capacity(points.len() * 8);
    let mut prev_lat = 0i64;
    let mut prev_lng = 0i64;
    for point in points {
        let (lat, lng) = point.to_e5();
        write_delta(&mut out, lat - prev_lat);
        write_delta(&mut out, lng - prev_lng);
        prev_lat = lat;
        prev_lng = lng;
    }
    out
}

fn write_delta(out: &mut String, delta: i64) {
    let mut value = (if delta < 0 { !(delta << 1) } else { delta << 1 }) as u64;
    while value >= u64::from(CONTINUATION) {
        let chunk = (value as u8 & CHUNK_MASK) | CONTINUATION;
        out.push(char::from(chunk + CHAR_OFFSET));
        value >>= 5;
    }
    out.push(char::from(value as u8 + CHAR_OFFSET));
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const REFERENCE: &str = "_p~iF~ps|U_ulLnnqC_mqNvxq`@";

    fn reference_points() -> Vec<Coordinate> {
        vec![
            Coordinate::new(38.5, -120.2),
            Coordinate::new(40.7, -120.95),
            Coordinate::new(43.252, -126.453),
        ]
    }

    fn assert_close(actual: &[Coordinate], expected: &[Coordinate]) {
        assert_eq!(actual.len(), expected.len());
        for (a, e) in actual.iter().zip(expected) {
            assert!((a.lat - e.lat).abs() < 1e-5, "lat {} vs {}", a.lat, e.lat);
            assert!((a.lng - e.lng).abs() < 1e-5, "lng {} vs {}", a.lng, e.lng);
        }
    }

    #[test]
    fn decodes_reference_polyline() {
        let points = decode(REFERENCE).unwrap();
        assert_close(&points, &reference_points());
    }

    #[test]
    fn encodes_reference_polyline() {
        assert_eq!(encode(&reference_points()), REFERENCE);
    }

    #[test]
    fn empty_input_is_empty_route() {
        assert!(decode("").unwrap().is_empty());
        assert_eq!(encode(&[]), "");
    }

    #[test]
    fn decode_is_idempotent() {
        let first = decode(REFERENCE).unwrap();
        let second = decode(REFERENCE).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn truncated_varint_is_rejected() {
        // `_` carries the continuation bit and nothing follows it.
        let err = decode("_p~iF~ps|U_").unwrap_err();
        assert!(matches!(err, RouteError::TruncatedPolyline { offset: 11 }));
    }

    #[test]
    fn latitude_without_longitude_is_rejected() {
        let err = decode("_p~iF").unwrap_err();
        assert!(matches!(err, RouteError::TruncatedPolyline { offset: 5 }));
    }

    #[test]
    fn bytes_outside_alphabet_are_rejected() {
        let err = decode("_p~iF ps|U").unwrap_err();
        assert!(matches!(
            err,
            RouteError::InvalidPolylineByte { offset: 5, byte: b' ' }
        ));
        let err = decode("é").unwrap_err();
        assert!(matches!(err, RouteError::InvalidPolylineByte { offset: 0, .. }));
    }

    #[test]
    fn runaway_continuation_is_rejected() {
        let err = decode("~~~~~~~~").unwrap_err();
        assert!(matches!(err, RouteError::PolylineOverflow { offset: 6 }));
    }

    #[test]
    fn only_whole_coordinates_are_emitted() {
        // Point boundaries of the reference string: 10, 18 and 27 bytes.
        let boundaries = [0usize, 10, 18, 27];
        for cut in 0..=REFERENCE.len() {
            let prefix = &REFERENCE[..cut];
            match boundaries.iter().position(|&b| b == cut) {
                Some(count) => {
                    let points = decode(prefix).unwrap();
                    assert_close(&points, &reference_points()[..count]);
                }
                None => assert!(decode(prefix).is_err(), "prefix {cut} decoded"),
            }
        }
    }

    #[test]
    fn closed_loop_returns_to_origin() {
        let route = vec![
            Coordinate::new(37.97, -122.03),
            Coordinate::new(37.98, -122.04),
            Coordinate::new(37.97, -122.03),
        ];
        let decoded = decode(&encode(&route)).unwrap();
        assert!(decoded[0].same_position(&decoded[2]));
    }

    proptest! {
        #[test]
        fn decode_recovers_quantized_points(
            raw in prop::collection::vec((-9_000_000i64..=9_000_000, -18_000_000i64..=18_000_000), 0..64)
        ) {
            let points: Vec<Coordinate> = raw
                .iter()
                .map(|&(lat, lng)| Coordinate::new(lat as f64 / PRECISION, lng as f64 / PRECISION))
                .collect();
            let decoded = decode(&encode(&points)).unwrap();
            prop_assert_eq!(decoded.len(), points.len());
            for (d, p) in decoded.iter().zip(&points) {
                prop_assert!(d.same_position(p));
            }
        }
    }
}
