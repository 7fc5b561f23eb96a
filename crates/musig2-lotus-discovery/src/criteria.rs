//! Lookup criteria for `find_signers`/`subscribe`: transaction type, amount
//! range, minimum reputation, an optional geographic radius (Haversine
//! distance over metadata-embedded coordinates), and exact-match custom
//! tags.

use musig2_lotus_router::messages::SignerAdvertisement;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GeoPoint {
    pub lat_deg: f64,
    pub lon_deg: f64,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GeoFilter {
    pub center: GeoPoint,
    pub radius_km: f64,
}

const EARTH_RADIUS_KM: f64 = 6371.0088;

/// Great-circle distance between two points, in kilometers.
pub fn haversine_km(a: GeoPoint, b: GeoPoint) -> f64 {
    let lat1 = a.lat_deg.to_radians();
    let lat2 = b.lat_deg.to_radians();
    let dlat = (b.lat_deg - a.lat_deg).to_radians();
    let dlon = (b.lon_deg - a.lon_deg).to_radians();

    let h = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_KM * h.sqrt().asin()
}

#[derive(Clone, Debug, Default)]
pub struct LookupCriteria {
    pub tx_kind: Option<String>,
    pub amount: Option<u64>,
    pub min_reputation: Option<i64>,
    pub geo: Option<GeoFilter>,
    pub tags: std::collections::BTreeMap<String, String>,
    pub max_results: usize,
}

impl LookupCriteria {
    pub fn new() -> Self {
        Self {
            max_results: 20,
            ..Default::default()
        }
    }
}

/// Extracts an advertisement's advertised location from its metadata, if
/// present, as `{"geo": {"lat": .., "lon": ..}}`.
fn advertised_location(ad: &SignerAdvertisement) -> Option<GeoPoint> {
    let meta = ad.metadata.as_ref()?;
    let geo = meta.get("geo")?;
    let lat = geo.get("lat")?.as_f64()?;
    let lon = geo.get("lon")?.as_f64()?;
    Some(GeoPoint { lat_deg: lat, lon_deg: lon })
}

/// Whether `ad` satisfies `criteria`. `reputation` is looked up by the
/// caller (the security manager's reputation store) since advertisements
/// don't carry their own publisher's live reputation.
pub fn matches(ad: &SignerAdvertisement, criteria: &LookupCriteria, reputation: i64) -> bool {
    if let Some(ref kind) = criteria.tx_kind {
        if !ad.criteria.tx_kinds.iter().any(|k| k == kind) {
            return false;
        }
    }
    if let Some(amount) = criteria.amount {
        if let Some(range) = ad.criteria.amount_range {
            if !range.contains(amount) {
                return false;
            }
        }
    }
    if let Some(min_rep) = criteria.min_reputation {
        if reputation < min_rep {
            return false;
        }
    }
    if let Some(geo) = criteria.geo {
        match advertised_location(ad) {
            Some(loc) if haversine_km(geo.center, loc) <= geo.radius_km => {}
            _ => return false,
        }
    }
    for (k, v) in &criteria.tags {
        if ad.criteria.tags.get(k) != Some(v) {
            return false;
        }
    }
    true
}
