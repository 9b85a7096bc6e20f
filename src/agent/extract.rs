//! Entity Extraction
//!
//! Pulls parameter candidates out of a chat message: identifiers, stop
//! names, coordinates, radius, row limits and clock times.

use std::sync::LazyLock;

use regex::Regex;

macro_rules! pattern {
    ($name:ident, $re:expr) => {
        static $name: LazyLock<Regex> = LazyLock::new(|| Regex::new($re).expect("valid regex"));
    };
}

pattern!(QUOTED, r#""([^"]+)""#);
pattern!(ROUTE_TYPE, r"(?i)\broute[_ ]type\s*[:=]?\s*(\d+)\b");
pattern!(ROUTE_ID, r"(?i)\broute[_ ]id\s*[:=]?\s*([a-z0-9_-]+)\b");
pattern!(
    ROUTE_REF,
    r"(?i)\broute(?:\s+short\s+name)?(?:\s*[:=]\s*|\s+)([a-z0-9_-]+)\b"
);
pattern!(STOP_ID, r"(?i)\bstop[_ ]id\s*[:=]?\s*([a-z0-9_-]+)\b");
pattern!(STOP_CODE, r"(?i)\bstop\s+([a-z]*\d[a-z0-9_-]*)\b");
pattern!(
    STOP_NAME,
    r#"(?i)\bstop(?:\s+name)?\s*(?:contains|like|named)?\s*"([^"]+)""#
);
pattern!(
    LOCATION,
    r"(?i)\b(?:to|at|for)\s+([a-z0-9&'./\- ]{2,}?)(?:[?.!,;:]\s*)?$"
);
pattern!(LAT, r"\blat(?:itude)?\s*[:=]?\s*(-?\d+(?:\.\d+)?)");
pattern!(LON, r"\b(?:lon|lng|longitude)\s*[:=]?\s*(-?\d+(?:\.\d+)?)");
pattern!(COORD_PAIR, r"(-?\d+\.\d+)\s*,\s*(-?\d+\.\d+)");
pattern!(RADIUS, r"(\d+(?:\.\d+)?)\s*(?:km|kilometer|kilometers)\b");
pattern!(TOP, r"\btop\s+(\d+)\b");
pattern!(LIMIT, r"\blimit\s+(\d+)\b");
pattern!(TIME, r"\b(\d{1,2}):([0-5]\d)(?::([0-5]\d))?\b");
pattern!(
    TIME_PHRASE,
    r"(?i)\s*\b(?:(?:after|before|from|since)\s+)?\d{1,2}:[0-5]\d(?::[0-5]\d)?\b|\s*\b(?:right\s+)?now\b"
);
pattern!(NOW, r"\bnow\b");

const ROUTE_REF_STOPWORDS: &[&str] = &[
    "id", "type", "short", "name", "details", "detail", "info", "stops", "stop", "serving", "for",
    "on", "in", "the", "a", "and", "is", "has", "have", "with", "that", "this", "list", "number",
];

const LOCATION_STOPWORDS: &[&str] = &[
    "this", "that", "there", "here", "stop", "route", "trip", "this stop", "that stop",
    "the stop", "me", "us",
];

/// Values recognized in one message
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Entities {
    pub quoted: Option<String>,
    pub route_type: Option<i64>,
    pub route_id: Option<String>,
    /// `route X`: a short name or an id
    pub route_ref: Option<String>,
    pub stop_id: Option<String>,
    pub stop_name: Option<String>,
    pub lat: Option<f64>,
    pub lon: Option<f64>,
    pub radius_km: Option<f64>,
    pub limit: Option<i64>,
    /// `HH:MM:SS`
    pub time: Option<String>,
    pub now: bool,
}

impl Entities {
    pub fn extract(text: &str) -> Self {
        let lower = text.to_lowercase();
        let mut entities = Self {
            quoted: capture(&QUOTED, text),
            route_type: capture(&ROUTE_TYPE, text).and_then(|v| v.parse().ok()),
            route_id: capture(&ROUTE_ID, text),
            route_ref: ROUTE_REF
                .captures_iter(text)
                .map(|caps| caps[1].to_string())
                .find(|value| !ROUTE_REF_STOPWORDS.contains(&value.to_lowercase().as_str())),
            stop_id: capture(&STOP_ID, text).or_else(|| capture(&STOP_CODE, text)),
            ..Self::default()
        };

        entities.stop_name = capture(&STOP_NAME, text).or_else(|| entities.quoted.clone());
        if entities.stop_name.is_none() && entities.stop_id.is_none() {
            entities.stop_name = trailing_location(text);
        }

        match (capture(&LAT, &lower), capture(&LON, &lower)) {
            (Some(lat), Some(lon)) => {
                entities.lat = lat.parse().ok();
                entities.lon = lon.parse().ok();
            }
            _ => {
                if let Some(caps) = COORD_PAIR.captures(&lower) {
                    entities.lat = caps[1].parse().ok();
                    entities.lon = caps[2].parse().ok();
                }
            }
        }

        entities.radius_km = capture(&RADIUS, &lower).and_then(|v| v.parse().ok());
        entities.limit = capture(&TOP, &lower)
            .or_else(|| capture(&LIMIT, &lower))
            .and_then(|v| v.parse().ok());
        entities.time = TIME.captures(&lower).map(|caps| {
            let hours: u32 = caps[1].parse().unwrap_or(0);
            let seconds = caps.get(3).map_or("00", |m| m.as_str());
            format!("{:02}:{}:{}", hours, &caps[2], seconds)
        });
        entities.now = NOW.is_match(&lower);

        entities
    }

    pub fn has_coordinates(&self) -> bool {
        self.lat.is_some() && self.lon.is_some()
    }

    /// Fill gaps from an earlier turn; values in this turn win
    pub fn carry_over(self, previous: &Entities) -> Self {
        Self {
            quoted: self.quoted.or_else(|| previous.quoted.clone()),
            route_type: self.route_type.or(previous.route_type),
            route_id: self.route_id.or_else(|| previous.route_id.clone()),
            route_ref: self.route_ref.or_else(|| previous.route_ref.clone()),
            stop_id: self.stop_id.or_else(|| previous.stop_id.clone()),
            stop_name: self.stop_name.or_else(|| previous.stop_name.clone()),
            lat: self.lat.or(previous.lat),
            lon: self.lon.or(previous.lon),
            radius_km: self.radius_km.or(previous.radius_km),
            limit: self.limit.or(previous.limit),
            time: self.time.or_else(|| previous.time.clone()),
            now: self.now || previous.now,
        }
    }
}

fn capture(re: &Regex, text: &str) -> Option<String> {
    re.captures(text).map(|caps| caps[1].trim().to_string())
}

/// `... to|at|for <place>` at the end of the message
fn trailing_location(text: &str) -> Option<String> {
    let cleaned = TIME_PHRASE.replace_all(text, "");
    let candidate = capture(&LOCATION, cleaned.trim_end())?;
    let candidate = candidate
        .trim_matches(|c: char| ".,!?;:".contains(c) || c.is_whitespace())
        .to_string();
    let lower = candidate.to_lowercase();

    if candidate.is_empty()
        || LOCATION_STOPWORDS.contains(&lower.as_str())
        || lower.starts_with("stop_id")
        || lower.starts_with("route ")
        || lower.starts_with("trip ")
    {
        return None;
    }
    Some(candidate)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_route_reference() {
        let e = Entities::extract("How many stops does route 10 have?");
        assert_eq!(e.route_ref.as_deref(), Some("10"));
        assert!(e.route_id.is_none());
        assert!(e.stop_name.is_none());

        let e = Entities::extract("route_id: R22 details");
        assert_eq!(e.route_id.as_deref(), Some("R22"));

        assert!(Entities::extract("list routes").route_ref.is_none());
    }

    #[test]
    fn test_stop_name_sources() {
        let e = Entities::extract("Which routes stop at Central Station?");
        assert_eq!(e.stop_name.as_deref(), Some("Central Station"));

        let e = Entities::extract(r#"stop named "Market Street" please"#);
        assert_eq!(e.stop_name.as_deref(), Some("Market Street"));
        assert_eq!(e.quoted.as_deref(), Some("Market Street"));

        let e = Entities::extract("arrivals for stop S2");
        assert_eq!(e.stop_id.as_deref(), Some("S2"));
        assert!(e.stop_name.is_none());

        assert!(Entities::extract("show stops for route 10").stop_name.is_none());
    }

    #[test]
    fn test_time_phrases_are_not_places() {
        let e = Entities::extract("arrivals at Market Street after 8:05");
        assert_eq!(e.stop_name.as_deref(), Some("Market Street"));
        assert_eq!(e.time.as_deref(), Some("08:05:00"));

        let e = Entities::extract("departures at Harbor Terminal now");
        assert_eq!(e.stop_name.as_deref(), Some("Harbor Terminal"));
        assert!(e.now);
    }

    #[test]
    fn test_coordinates_radius_and_limit() {
        let e = Entities::extract("stops near 40.75, -73.99 within 2 km, top 5");
        assert_eq!(e.lat, Some(40.75));
        assert_eq!(e.lon, Some(-73.99));
        assert_eq!(e.radius_km, Some(2.0));
        assert_eq!(e.limit, Some(5));

        let e = Entities::extract("nearby stops lat=40.7 lon=-74.0 limit 3");
        assert!(e.has_coordinates());
        assert_eq!(e.limit, Some(3));
    }

    #[test]
    fn test_carry_over_prefers_current() {
        let previous = Entities::extract("stops on route 10");
        let current = Entities::extract("what about route 22").carry_over(&previous);
        assert_eq!(current.route_ref.as_deref(), Some("22"));

        let current = Entities::extract("show me more").carry_over(&previous);
        assert_eq!(current.route_ref.as_deref(), Some("10"));
    }
}
