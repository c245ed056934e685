//! Tile-quantized spatial index.
//!
//! Coordinates are bucketed by `(floor(lat / t), floor(lon / t))` where `t`
//! is the tile size in degrees. Only occupied tiles allocate a bucket, so
//! the index works over the whole globe at any resolution.

use hashbrown::HashMap;
use serde::{Deserialize, Serialize};

use crate::error::{Result, SiftError};
use crate::models::BoundingBox;

/// One tile per 1/20th of a degree
pub const DEFAULT_TILE_SIZE: f64 = 0.05;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TileKey {
    pub lat: i64,
    pub lon: i64,
}

impl TileKey {
    pub fn new(lat: i64, lon: i64) -> Self {
        Self { lat, lon }
    }

    /// Chebyshev distance in tiles
    pub fn distance(&self, other: &TileKey) -> u64 {
        self.lat.abs_diff(other.lat).max(self.lon.abs_diff(other.lon))
    }
}

#[derive(Debug, Clone)]
pub struct TileIndex<T> {
    tile_size: f64,
    buckets: HashMap<TileKey, Vec<T>>,
    len: usize,
    /// Smallest and largest occupied keys, per axis
    bounds: Option<(TileKey, TileKey)>,
}

impl<T> TileIndex<T> {
    pub fn new(tile_size: f64) -> Result<Self> {
        if !tile_size.is_finite() || tile_size <= 0.0 {
            return Err(SiftError::Config(format!(
                "tile size must be a positive number of degrees, got {}",
                tile_size
            )));
        }
        Ok(Self {
            tile_size,
            buckets: HashMap::new(),
            len: 0,
            bounds: None,
        })
    }

    /// For tile sizes fixed at compile time.
    pub(crate) fn with_known_size(tile_size: f64) -> Self {
        debug_assert!(tile_size.is_finite() && tile_size > 0.0);
        Self {
            tile_size,
            buckets: HashMap::new(),
            len: 0,
            bounds: None,
        }
    }

    pub fn tile_size(&self) -> f64 {
        self.tile_size
    }

    pub fn tile_key(&self, lat: f64, lon: f64) -> TileKey {
        tile_key(lat, lon, self.tile_size)
    }

    /// Append `value` to the bucket of (lat, lon).
    pub fn register_object(&mut self, lat: f64, lon: f64, value: T) -> TileKey {
        let key = self.tile_key(lat, lon);
        self.buckets.entry(key).or_default().push(value);
        self.len += 1;
        self.bounds = Some(match self.bounds {
            None => (key, key),
            Some((lo, hi)) => (
                TileKey::new(lo.lat.min(key.lat), lo.lon.min(key.lon)),
                TileKey::new(hi.lat.max(key.lat), hi.lon.max(key.lon)),
            ),
        });
        key
    }

    /// Objects of one tile, in registration order
    pub fn bucket(&self, key: &TileKey) -> &[T] {
        self.buckets.get(key).map(Vec::as_slice).unwrap_or(&[])
    }

    /// All non-empty buckets whose tile intersects `bbox`.
    ///
    /// Walks the tile range of the box, or the occupied buckets when the
    /// box covers more tiles than there are buckets.
    pub fn query(&self, bbox: &BoundingBox) -> Vec<(TileKey, &[T])> {
        let lo = self.tile_key(bbox.min_lat, bbox.min_lon);
        let hi = self.tile_key(bbox.max_lat, bbox.max_lon);
        if lo.lat > hi.lat || lo.lon > hi.lon {
            return Vec::new();
        }

        // u64::MAX + 1 squared does not fit in a u128
        let rows = u128::from(hi.lat.abs_diff(lo.lat)) + 1;
        let cols = u128::from(hi.lon.abs_diff(lo.lon)) + 1;
        match rows.checked_mul(cols) {
            Some(span) if span <= self.buckets.len() as u128 => {}
            _ => {
                return self
                    .buckets
                    .iter()
                    .filter(|(k, _)| {
                        k.lat >= lo.lat && k.lat <= hi.lat && k.lon >= lo.lon && k.lon <= hi.lon
                    })
                    .map(|(k, v)| (*k, v.as_slice()))
                    .collect();
            }
        }

        let mut result = Vec::new();
        for lat in lo.lat..=hi.lat {
            for lon in lo.lon..=hi.lon {
                let key = TileKey::new(lat, lon);
                if let Some(bucket) = self.buckets.get(&key) {
                    result.push((key, bucket.as_slice()));
                }
            }
        }
        result
    }

    /// Non-empty buckets on the square ring at tile distance `k` from
    /// `center` (`k == 0` is the center tile itself).
    ///
    /// Rings with more tiles than there are buckets filter the buckets
    /// instead of walking the ring.
    pub fn ring(&self, center: TileKey, k: u64) -> Vec<(TileKey, &[T])> {
        if u128::from(k) * 8 > self.buckets.len() as u128 {
            return self
                .buckets
                .iter()
                .filter(|(key, _)| center.distance(key) == k)
                .map(|(key, v)| (*key, v.as_slice()))
                .collect();
        }

        let mut result = Vec::new();
        // Edges past the i64 key range hold no tiles.
        let mut visit = |lat: i128, lon: i128| {
            let (Ok(lat), Ok(lon)) = (i64::try_from(lat), i64::try_from(lon)) else {
                return;
            };
            let key = TileKey::new(lat, lon);
            if let Some(bucket) = self.buckets.get(&key) {
                result.push((key, bucket.as_slice()));
            }
        };

        let (lat, lon, k) = (i128::from(center.lat), i128::from(center.lon), i128::from(k));
        if k == 0 {
            visit(lat, lon);
            return result;
        }

        for x in (lon - k)..=(lon + k) {
            visit(lat - k, x);
            visit(lat + k, x);
        }
        for y in (lat - k + 1)..=(lat + k - 1) {
            visit(y, lon - k);
            visit(y, lon + k);
        }
        result
    }

    /// Objects of the nearest non-empty ring around (lat, lon), searching
    /// at most `depth` rings out. Empty if nothing is that close.
    pub fn closest_objects(&self, lat: f64, lon: f64, depth: u64) -> Vec<&T> {
        let center = self.tile_key(lat, lon);
        for k in 0..=depth {
            let found: Vec<&T> = self
                .ring(center, k)
                .into_iter()
                .flat_map(|(_, bucket)| bucket.iter())
                .collect();
            if !found.is_empty() {
                return found;
            }
            if self.covers_all(center, k) {
                break;
            }
        }
        Vec::new()
    }

    /// True when rings 0..=k around `center` include every occupied tile.
    pub fn covers_all(&self, center: TileKey, k: u64) -> bool {
        match self.bounds {
            None => true,
            Some((lo, hi)) => {
                center.distance(&lo) <= k
                    && center.distance(&hi) <= k
                    && center.distance(&TileKey::new(lo.lat, hi.lon)) <= k
                    && center.distance(&TileKey::new(hi.lat, lo.lon)) <= k
            }
        }
    }

    /// Smallest and largest occupied tile keys
    pub fn key_bounds(&self) -> Option<(TileKey, TileKey)> {
        self.bounds
    }

    pub fn objects(&self) -> impl Iterator<Item = &T> {
        self.buckets.values().flat_map(|b| b.iter())
    }

    /// Total registered objects
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn bucket_count(&self) -> usize {
        self.buckets.len()
    }
}

/// Bucket key of a coordinate for a tile size
pub fn tile_key(lat: f64, lon: f64, tile_size: f64) -> TileKey {
    TileKey::new(
        (lat / tile_size).floor() as i64,
        (lon / tile_size).floor() as i64,
    )
}
