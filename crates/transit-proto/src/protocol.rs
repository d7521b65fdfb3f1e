use serde::{Deserialize, Serialize};

use crate::feeds::Route;

/// One station as served by `GET /api/stations/{feed}`.
///
/// Stations are immutable snapshots: a successful poll replaces the whole
/// collection, nothing is patched in place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Station {
    pub stop_id: String,
    pub stop_name: String,
    pub stop_lat: f64,
    pub stop_lon: f64,
    /// Short route codes ("A", "7", ...). May repeat and may contain codes
    /// this client does not know about.
    #[serde(default)]
    pub routes: Vec<String>,
    /// Upcoming arrivals as epoch seconds. The backend does not sort these.
    #[serde(default)]
    pub next_arrival: Vec<i64>,
}

impl Station {
    /// Earliest upcoming arrival, scanning the whole (unordered) list.
    pub fn next_arrival_min(&self) -> Option<i64> {
        self.next_arrival.iter().copied().min()
    }

    /// True if any of this station's route codes parses to `route`.
    pub fn serves(&self, route: Route) -> bool {
        self.routes
            .iter()
            .any(|code| code.parse::<Route>().map_or(false, |r| r == route))
    }
}

/// Most stations the directory list shows at once.
pub const MAX_LISTED_STATIONS: usize = 10;

/// Stations in `stations` that serve `route`, in collection order.
pub fn filter_by_route(stations: &[Station], route: Route) -> Vec<&Station> {
    stations.iter().filter(|s| s.serves(route)).collect()
}

/// One page of the station directory: the stations serving `route` (all of
/// them when `None`), capped at [`MAX_LISTED_STATIONS`].
pub fn directory_page(stations: &[Station], route: Option<Route>) -> Vec<&Station> {
    stations
        .iter()
        .filter(|s| route.map_or(true, |r| s.serves(r)))
        .take(MAX_LISTED_STATIONS)
        .collect()
}

// ── Accessibility ─────────────────────────────────────────────────────────────

/// One elevator or escalator outage from `GET /api/accessibility/outages`.
///
/// Field names follow the upstream MTA feed. Every field is optional there,
/// so every field is optional here.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Outage {
    #[serde(default)]
    pub station: Option<String>,
    /// Equipment id, e.g. "EL123".
    #[serde(default)]
    pub equipment: Option<String>,
    /// "EL" or "ES".
    #[serde(default)]
    pub equipmenttype: Option<String>,
    /// Free text describing what the equipment connects.
    #[serde(default)]
    pub serving: Option<String>,
    #[serde(default)]
    pub reason: Option<String>,
    /// As sent upstream ("MM/DD/YYYY hh:mm:ss AM").
    #[serde(default)]
    pub estimatedreturntoservice: Option<String>,
}

impl Outage {
    pub fn equipment_kind(&self) -> &str {
        match self.equipmenttype.as_deref() {
            Some("EL") => "Elevator",
            Some("ES") => "Escalator",
            Some(other) => other,
            None => "Equipment",
        }
    }
}

// ── Favorites wire shapes ─────────────────────────────────────────────────────

/// Body of `GET /api/user/favorites/stations`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FavoritesResponse {
    pub favorite_stations: Vec<String>,
}

/// Body of `POST /api/user/favorites/stations`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AddFavoriteRequest {
    pub station_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FavoriteRef {
    pub station_id: String,
}

/// Success body of `POST /api/user/favorites/stations`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AddFavoriteResponse {
    pub favorite: FavoriteRef,
}

/// Error body the backend attaches to most non-2xx responses. Upstream
/// proxy endpoints use `error` instead of `message`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ErrorBody {
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ErrorBody {
    pub fn text(self) -> Option<String> {
        self.message.or(self.error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn station(routes: &[&str], arrivals: &[i64]) -> Station {
        Station {
            stop_id: "A27".into(),
            stop_name: "42 St-Port Authority Bus Terminal".into(),
            stop_lat: 40.757308,
            stop_lon: -73.989735,
            routes: routes.iter().map(|r| r.to_string()).collect(),
            next_arrival: arrivals.to_vec(),
        }
    }

    #[test]
    fn test_station_decodes_backend_shape() {
        let json = r#"{
            "stop_id": "127",
            "stop_name": "Times Sq-42 St",
            "stop_lat": 40.75529,
            "stop_lon": -73.987495,
            "routes": ["1", "2", "3"],
            "next_arrival": [1700000300, 1700000120]
        }"#;
        let s: Station = serde_json::from_str(json).unwrap();
        assert_eq!(s.stop_id, "127");
        assert_eq!(s.routes, vec!["1", "2", "3"]);
        assert_eq!(s.next_arrival_min(), Some(1700000120));
    }

    #[test]
    fn test_station_missing_lists_default_to_empty() {
        let json = r#"{"stop_id":"L08","stop_name":"Bedford Av","stop_lat":40.717304,"stop_lon":-73.956872}"#;
        let s: Station = serde_json::from_str(json).unwrap();
        assert!(s.routes.is_empty());
        assert_eq!(s.next_arrival_min(), None);
    }

    #[test]
    fn test_next_arrival_min_ignores_order() {
        let s = station(&["A"], &[500, 100, 300]);
        assert_eq!(s.next_arrival_min(), Some(100));
    }

    #[test]
    fn test_filter_by_route() {
        let ace = station(&["A", "C", "E"], &[]);
        let mut l = station(&["L"], &[]);
        l.stop_id = "L08".into();
        let odd = station(&["X9"], &[]);
        let all = vec![ace.clone(), l, odd];
        let hits = filter_by_route(&all, Route::C);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].stop_id, ace.stop_id);
    }

    #[test]
    fn test_directory_page_filters_then_caps() {
        let mut all = Vec::new();
        for i in 0..15 {
            let mut s = station(if i % 3 == 0 { &["L"] } else { &["A"] }, &[]);
            s.stop_id = format!("S{:02}", i);
            all.push(s);
        }
        assert_eq!(directory_page(&all, None).len(), MAX_LISTED_STATIONS);
        let l: Vec<&str> = directory_page(&all, Some(Route::L))
            .iter()
            .map(|s| s.stop_id.as_str())
            .collect();
        assert_eq!(l, vec!["S00", "S03", "S06", "S09", "S12"]);
        assert!(directory_page(&all, Some(Route::G)).is_empty());
    }

    #[test]
    fn test_outage_decodes_sparse_upstream_rows() {
        let rows: Vec<Outage> = serde_json::from_str(
            r#"[
                {"station": "Times Sq-42 St", "equipment": "EL123", "equipmenttype": "EL",
                 "serving": "Street to mezzanine", "reason": "Repair",
                 "estimatedreturntoservice": "04/20/2025 11:00:00 PM", "ADA": "Y"},
                {"station": "Bedford Av"}
            ]"#,
        )
        .unwrap();
        assert_eq!(rows[0].equipment_kind(), "Elevator");
        assert_eq!(rows[0].equipment.as_deref(), Some("EL123"));
        assert_eq!(rows[1].equipment_kind(), "Equipment");
        assert!(rows[1].reason.is_none());
    }

    #[test]
    fn test_error_body_falls_back_to_error_field() {
        let b: ErrorBody = serde_json::from_str(r#"{"error":"MTA feed down"}"#).unwrap();
        assert_eq!(b.text().as_deref(), Some("MTA feed down"));
        let b: ErrorBody = serde_json::from_str(r#"{"message":"nope","error":"x"}"#).unwrap();
        assert_eq!(b.text().as_deref(), Some("nope"));
    }

    #[test]
    fn test_favorites_response_decode() {
        let r: FavoritesResponse =
            serde_json::from_str(r#"{"favorite_stations":["127","A27"]}"#).unwrap();
        assert_eq!(r.favorite_stations, vec!["127", "A27"]);
    }
}
