//! Transit Domain
//!
//! The fixed four-table GTFS schedule model. Generated templates may only
//! reference these tables, these columns, and these joins.

use serde_json::{Value, json};

#[derive(Debug, Clone, Copy)]
pub struct TableDef {
    pub name: &'static str,
    pub columns: &'static [&'static str],
}

impl TableDef {
    pub fn has_column(&self, column: &str) -> bool {
        self.columns.contains(&column)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinKind {
    Inner,
    Left,
}

#[derive(Debug, Clone, Copy)]
pub struct JoinDef {
    pub left: (&'static str, &'static str),
    pub right: (&'static str, &'static str),
    pub kind: JoinKind,
    /// Alias required on the right side (self joins)
    pub alias: Option<&'static str>,
}

pub const TABLES: &[TableDef] = &[
    TableDef {
        name: "routes",
        columns: &[
            "route_id",
            "agency_id",
            "route_short_name",
            "route_long_name",
            "route_desc",
            "route_type",
            "route_url",
            "route_color",
            "route_text_color",
            "route_sort_order",
        ],
    },
    TableDef {
        name: "trips",
        columns: &[
            "route_id",
            "service_id",
            "trip_id",
            "trip_headsign",
            "direction_id",
            "direction",
            "block_id",
            "shape_id",
            "wheelchair_accessible",
            "branch_letter",
            "boarding_type",
        ],
    },
    TableDef {
        name: "stop_times",
        columns: &[
            "trip_id",
            "arrival_time",
            "departure_time",
            "stop_id",
            "stop_sequence",
            "pickup_type",
            "drop_off_type",
            "timepoint",
            "shape_dist_traveled",
        ],
    },
    TableDef {
        name: "stops",
        columns: &[
            "stop_id",
            "stop_code",
            "stop_name",
            "stop_desc",
            "stop_lat",
            "stop_lon",
            "stop_url",
            "location_type",
            "wheelchair_boarding",
            "platform_code",
            "parent_station",
            "level_id",
            "zone_id",
        ],
    },
];

pub const JOINS: &[JoinDef] = &[
    JoinDef {
        left: ("routes", "route_id"),
        right: ("trips", "route_id"),
        kind: JoinKind::Inner,
        alias: None,
    },
    JoinDef {
        left: ("trips", "trip_id"),
        right: ("stop_times", "trip_id"),
        kind: JoinKind::Inner,
        alias: None,
    },
    JoinDef {
        left: ("stops", "stop_id"),
        right: ("stop_times", "stop_id"),
        kind: JoinKind::Inner,
        alias: None,
    },
    JoinDef {
        left: ("stops", "parent_station"),
        right: ("stops", "stop_id"),
        kind: JoinKind::Left,
        alias: Some("parent_stop"),
    },
];

/// Template keys every generated schema must provide in strict mode
pub const REQUIRED_TEMPLATE_KEYS: &[&str] = &[
    "list_routes",
    "route_details",
    "list_stops",
    "stop_details",
    "stops_on_route",
    "routes_serving_stop",
    "arrivals_for_stop",
    "busiest_stops",
    "busiest_routes",
    "accessible_stops",
    "accessible_trips",
];

pub fn table(name: &str) -> Option<&'static TableDef> {
    TABLES.iter().find(|t| t.name == name)
}

pub fn is_known_table(name: &str) -> bool {
    table(name).is_some()
}

/// JSON description embedded in generation prompts
pub fn truth_schema_json() -> Value {
    let tables: Vec<Value> = TABLES
        .iter()
        .map(|t| json!({ "name": t.name, "columns": t.columns }))
        .collect();

    let joins: Vec<Value> = JOINS
        .iter()
        .map(|j| {
            let kind = match j.kind {
                JoinKind::Inner => "inner",
                JoinKind::Left => "left",
            };
            let mut join = json!({
                "left": format!("{}.{}", j.left.0, j.left.1),
                "right": format!("{}.{}", j.right.0, j.right.1),
                "type": kind,
            });
            if let Some(alias) = j.alias {
                join["alias"] = json!(alias);
            }
            join
        })
        .collect();

    json!({
        "dialect": "sqlite",
        "placeholder_style": ":name",
        "tables": tables,
        "joins": joins,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup() {
        assert!(is_known_table("stop_times"));
        assert!(!is_known_table("agency"));
        assert!(table("stops").unwrap().has_column("parent_station"));
        assert!(!table("routes").unwrap().has_column("stop_id"));
    }

    #[test]
    fn test_truth_schema_lists_self_join_alias() {
        let schema = truth_schema_json();
        assert_eq!(schema["tables"].as_array().unwrap().len(), 4);
        let joins = schema["joins"].as_array().unwrap();
        assert_eq!(joins[3]["alias"], "parent_stop");
        assert_eq!(joins[3]["type"], "left");
        assert!(joins[0].get("alias").is_none());
    }
}
