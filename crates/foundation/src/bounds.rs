use serde::{Deserialize, Serialize};

/// WGS84 position, serialized as `[lng, lat]` like GeoJSON.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(from = "[f64; 2]", into = "[f64; 2]")]
pub struct LngLat {
    pub lng: f64,
    pub lat: f64,
}

impl LngLat {
    pub const fn new(lng: f64, lat: f64) -> Self {
        Self { lng, lat }
    }
}

impl From<[f64; 2]> for LngLat {
    fn from(v: [f64; 2]) -> Self {
        Self::new(v[0], v[1])
    }
}

impl From<LngLat> for [f64; 2] {
    fn from(p: LngLat) -> Self {
        [p.lng, p.lat]
    }
}

/// Axis-aligned geographic bounds, serialized as `[[w, s], [e, n]]`.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LngLatBounds {
    pub sw: LngLat,
    pub ne: LngLat,
}

impl LngLatBounds {
    pub fn new(sw: LngLat, ne: LngLat) -> Self {
        Self { sw, ne }
    }

    /// Smallest bounds covering all `points`. Returns `None` for an empty input.
    pub fn from_points<I: IntoIterator<Item = LngLat>>(points: I) -> Option<Self> {
        let mut iter = points.into_iter();
        let first = iter.next()?;
        let mut b = Self::new(first, first);
        for p in iter {
            b.extend(p);
        }
        Some(b)
    }

    pub fn extend(&mut self, p: LngLat) {
        self.sw.lng = self.sw.lng.min(p.lng);
        self.sw.lat = self.sw.lat.min(p.lat);
        self.ne.lng = self.ne.lng.max(p.lng);
        self.ne.lat = self.ne.lat.max(p.lat);
    }

    pub fn center(&self) -> LngLat {
        LngLat::new(
            (self.sw.lng + self.ne.lng) * 0.5,
            (self.sw.lat + self.ne.lat) * 0.5,
        )
    }

    pub fn contains(&self, p: LngLat) -> bool {
        p.lng >= self.sw.lng && p.lng <= self.ne.lng && p.lat >= self.sw.lat && p.lat <= self.ne.lat
    }
}

/// Pixel position on the map canvas.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ScreenPoint {
    pub x: f64,
    pub y: f64,
}

impl ScreenPoint {
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn distance(&self, other: ScreenPoint) -> f64 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        (dx * dx + dy * dy).sqrt()
    }
}

#[cfg(test)]
mod tests {
    use super::{LngLat, LngLatBounds};

    #[test]
    fn bounds_from_points_and_center() {
        let b = LngLatBounds::from_points([
            LngLat::new(12.0, 52.0),
            LngLat::new(14.0, 53.0),
            LngLat::new(13.0, 51.0),
        ])
        .unwrap();
        assert_eq!(b.sw, LngLat::new(12.0, 51.0));
        assert_eq!(b.ne, LngLat::new(14.0, 53.0));
        assert_eq!(b.center(), LngLat::new(13.0, 52.0));
        assert!(b.contains(LngLat::new(13.5, 52.5)));
        assert!(!b.contains(LngLat::new(15.0, 52.5)));
    }

    #[test]
    fn empty_points_have_no_bounds() {
        assert!(LngLatBounds::from_points(std::iter::empty()).is_none());
    }

    #[test]
    fn lng_lat_serializes_as_pair() {
        let json = serde_json::to_value(LngLat::new(12.8105, 52.616)).unwrap();
        assert_eq!(json, serde_json::json!([12.8105, 52.616]));
    }
}
