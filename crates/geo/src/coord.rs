//! GPS coordinates, great-circle distances and cache-key quantization.

/// Mean Earth radius in miles, used by the haversine distance calculation.
pub const EARTH_RADIUS_MILES: f64 = 3959.0;

/// A validated (latitude, longitude) pair in decimal degrees.
///
/// Construction enforces the validity invariant — latitude in [-90, 90],
/// longitude in [-180, 180]. Anything outside those ranges is treated as an
/// absent coordinate by the caller, so [`new`](Self::new) returns an `Option`
/// rather than an error.
///
/// # Examples
///
/// ```
/// use snapsort_geo::Coordinate;
///
/// let oslo = Coordinate::new(59.9139, 10.7522).unwrap();
/// assert!(Coordinate::new(91.0, 0.0).is_none());
/// assert!(Coordinate::new(0.0, -181.0).is_none());
/// assert_eq!(oslo.latitude(), 59.9139);
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Coordinate {
    lat: f64,
    lon: f64,
}

impl Coordinate {
    /// Create a coordinate, returning `None` for out-of-range (or NaN) input.
    pub fn new(lat: f64, lon: f64) -> Option<Self> {
        if !(-90.0..=90.0).contains(&lat) || !(-180.0..=180.0).contains(&lon) {
            return None;
        }
        Some(Self { lat, lon })
    }

    pub fn latitude(&self) -> f64 {
        self.lat
    }

    pub fn longitude(&self) -> f64 {
        self.lon
    }

    /// Great-circle distance to `other` in miles (haversine formula on a
    /// sphere of radius [`EARTH_RADIUS_MILES`]).
    ///
    /// ```
    /// use snapsort_geo::Coordinate;
    ///
    /// let sf = Coordinate::new(37.7749, -122.4194).unwrap();
    /// let oakland = Coordinate::new(37.8044, -122.2712).unwrap();
    /// let miles = sf.distance_miles(&oakland);
    /// assert!(miles > 5.0 && miles < 15.0);
    /// ```
    pub fn distance_miles(&self, other: &Self) -> f64 {
        let lat1 = self.lat.to_radians();
        let lat2 = other.lat.to_radians();
        let dlat = (other.lat - self.lat).to_radians();
        let dlon = (other.lon - self.lon).to_radians();

        let a = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
        let c = 2.0 * a.sqrt().asin();
        EARTH_RADIUS_MILES * c
    }

    /// Quantize to a cache key at the given decimal-degree precision.
    ///
    /// Two coordinates within the same quantization cell always produce the
    /// same key, which is the core invariant the geocode cache relies on to
    /// absorb GPS jitter. At precision 3 a cell is roughly 111 m tall.
    pub fn quantize(&self, precision: u8) -> QuantizedKey {
        let scale = 10f64.powi(i32::from(precision));
        QuantizedKey {
            lat_q: (self.lat * scale).round() as i32,
            lon_q: (self.lon * scale).round() as i32,
            precision,
        }
    }
}

/// A coordinate rounded to a fixed decimal precision, used as the geocode
/// cache lookup key.
///
/// Stored as scaled integers so the key is `Eq + Hash` and round-trips
/// through SQLite without float-comparison surprises.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct QuantizedKey {
    /// Latitude scaled by `10^precision` and rounded.
    pub lat_q: i32,
    /// Longitude scaled by `10^precision` and rounded.
    pub lon_q: i32,
    /// Decimal places of the quantization grid.
    pub precision: u8,
}
