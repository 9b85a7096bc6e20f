//! Agent Schema Contract
//!
//! Query templates and display specs produced by the schema generator.
//! A raw generated value goes through `from_value` → `normalize` →
//! `validate`; only a schema with no validation issues reaches the planner.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::domain::{self, REQUIRED_TEMPLATE_KEYS};
use super::safety::{self, LimitClause};
use crate::types::{ValidationError, ValidationErrorKind};

/// `default_limit` used when a template declares none
const FALLBACK_DEFAULT_LIMIT: i64 = 25;

// =============================================================================
// Contract Types
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentSchema {
    pub query_templates: Vec<QueryTemplate>,
    pub display_templates: Vec<DisplaySpec>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryTemplate {
    pub key: String,
    #[serde(default)]
    pub description: String,
    pub tables: Vec<String>,
    #[serde(default)]
    pub intent_keywords: Vec<String>,
    pub sql: String,
    #[serde(default)]
    pub params: Vec<TemplateParam>,
    /// Alternatives: at least one group must be fully bound
    #[serde(default)]
    pub required_inputs: Vec<Vec<String>>,
    #[serde(default)]
    pub default_limit: i64,
    pub display_key: String,
}

impl QueryTemplate {
    pub fn param(&self, name: &str) -> Option<&TemplateParam> {
        self.params.iter().find(|p| p.name == name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemplateParam {
    pub name: String,
    #[serde(rename = "type")]
    pub param_type: ParamType,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub values: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
}

impl TemplateParam {
    fn new(name: &str, param_type: ParamType) -> Self {
        Self {
            name: name.to_string(),
            param_type,
            values: Vec::new(),
            default: None,
        }
    }

    fn with_default(mut self, default: Value) -> Self {
        self.default = Some(default);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamType {
    #[serde(alias = "text")]
    String,
    #[serde(alias = "int")]
    Integer,
    #[serde(alias = "float", alias = "real")]
    Number,
    Enum,
    Time,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DisplaySpec {
    pub key: String,
    pub title_template: String,
    pub columns: Vec<ColumnSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub row_id_field: Option<String>,
    #[serde(default, skip_serializing_if = "Formatting::is_empty")]
    pub formatting: Formatting,
}

/// Rendering hints: which columns hold clock times, coordinates or colors
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Formatting {
    pub time_fields: Vec<String>,
    pub latlon_fields: Vec<String>,
    pub color_fields: Vec<String>,
}

impl Formatting {
    pub fn is_empty(&self) -> bool {
        self.time_fields.is_empty() && self.latlon_fields.is_empty() && self.color_fields.is_empty()
    }

    /// Hints implied by column types and `*_color` names
    pub fn infer(columns: &[ColumnSpec]) -> Self {
        Self {
            time_fields: names_where(columns, |c| c.column_type == ColumnType::Time),
            latlon_fields: names_where(columns, |c| c.column_type == ColumnType::Coordinate),
            color_fields: names_where(columns, |c| c.name.ends_with("_color")),
        }
    }

    fn fields(&self) -> impl Iterator<Item = &String> {
        self.time_fields
            .iter()
            .chain(&self.latlon_fields)
            .chain(&self.color_fields)
    }
}

fn names_where(columns: &[ColumnSpec], keep: impl Fn(&ColumnSpec) -> bool) -> Vec<String> {
    columns
        .iter()
        .filter(|c| keep(c))
        .map(|c| c.name.clone())
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnSpec {
    pub name: String,
    pub label: String,
    #[serde(rename = "type", default)]
    pub column_type: ColumnType,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnType {
    #[default]
    #[serde(alias = "text")]
    String,
    #[serde(alias = "int")]
    Integer,
    #[serde(alias = "float", alias = "real")]
    Number,
    Time,
    #[serde(alias = "latlon")]
    Coordinate,
}

// =============================================================================
// Parsing, Normalization, Validation
// =============================================================================

fn issue(kind: ValidationErrorKind, field: &str, message: impl Into<String>) -> ValidationError {
    ValidationError::new(kind, message).with_field(field)
}

impl AgentSchema {
    /// Typed view of a generated value; a contract mismatch is one issue
    pub fn from_value(value: Value) -> Result<Self, Vec<ValidationError>> {
        serde_json::from_value(value).map_err(|e| {
            vec![ValidationError::new(
                ValidationErrorKind::Schema,
                format!("schema does not match the contract: {}", e),
            )]
        })
    }

    pub fn template(&self, key: &str) -> Option<&QueryTemplate> {
        self.query_templates.iter().find(|t| t.key == key)
    }

    pub fn display(&self, key: &str) -> Option<&DisplaySpec> {
        self.display_templates.iter().find(|d| d.key == key)
    }

    /// Clamp limits into `1..=max_rows` and make every statement bounded
    pub fn normalize(&mut self, max_rows: usize) {
        let cap = max_rows.max(1) as i64;
        for template in &mut self.query_templates {
            template.default_limit = if template.default_limit <= 0 {
                FALLBACK_DEFAULT_LIMIT.min(cap)
            } else {
                template.default_limit.min(cap)
            };

            for table in &mut template.tables {
                *table = table.trim().to_lowercase();
            }

            let sql = template.sql.trim();
            let sql = sql.strip_suffix(';').unwrap_or(sql).trim_end();
            let mut sql = safety::clamp_literal_limits(sql, cap as usize);
            if !safety::has_limit_keyword(&sql) {
                sql.push_str(" LIMIT :limit");
            }

            if let Some(LimitClause::Param(name)) = safety::limit_clause(&sql)
                && template.param(&name).is_none()
            {
                template
                    .params
                    .push(TemplateParam::new(&name, ParamType::Integer));
            }
            template.sql = sql;
        }
    }

    /// Every contract violation, empty when the schema is usable
    pub fn validate(&self, max_rows: usize, strict: bool) -> Vec<ValidationError> {
        let mut issues = Vec::new();

        let mut seen = HashSet::new();
        for template in &self.query_templates {
            if !seen.insert(template.key.as_str()) {
                issues.push(issue(
                    ValidationErrorKind::Schema,
                    &template.key,
                    "duplicate template key",
                ));
            }
        }
        let mut seen = HashSet::new();
        for display in &self.display_templates {
            if !seen.insert(display.key.as_str()) {
                issues.push(issue(
                    ValidationErrorKind::Schema,
                    &display.key,
                    "duplicate display key",
                ));
            }
        }

        for template in &self.query_templates {
            self.validate_template(template, max_rows, &mut issues);
        }
        for display in &self.display_templates {
            validate_display(display, &mut issues);
        }

        if strict {
            for key in REQUIRED_TEMPLATE_KEYS {
                if self.template(key).is_none() {
                    issues.push(issue(
                        ValidationErrorKind::Schema,
                        key,
                        "required template is missing",
                    ));
                }
            }
        }

        issues
    }

    fn validate_template(
        &self,
        template: &QueryTemplate,
        max_rows: usize,
        issues: &mut Vec<ValidationError>,
    ) {
        let key = template.key.as_str();
        let sql = template.sql.as_str();

        if self.display(&template.display_key).is_none() {
            issues.push(issue(
                ValidationErrorKind::Schema,
                key,
                format!("display_key '{}' does not exist", template.display_key),
            ));
        }

        if template.tables.is_empty() {
            issues.push(issue(ValidationErrorKind::Schema, key, "no tables declared"));
        }
        for table in &template.tables {
            if !domain::is_known_table(table) {
                issues.push(issue(
                    ValidationErrorKind::UnknownIdentifier,
                    key,
                    format!("unknown table '{}'", table),
                ));
            }
        }

        if let Err(reason) = safety::check_statement(sql) {
            issues.push(issue(ValidationErrorKind::Safety, key, reason.to_string()));
            // Identifier checks on an unsafe statement add only noise
            return;
        }
        if safety::has_select_star(sql) {
            issues.push(issue(
                ValidationErrorKind::Safety,
                key,
                "SELECT * is not allowed",
            ));
        }

        match safety::limit_clause(sql) {
            None => issues.push(issue(
                ValidationErrorKind::Range,
                key,
                "statement needs LIMIT :limit or a literal LIMIT",
            )),
            Some(LimitClause::Literal(n)) if n as usize > max_rows => issues.push(issue(
                ValidationErrorKind::Range,
                key,
                format!("LIMIT {} exceeds the cap of {}", n, max_rows),
            )),
            Some(LimitClause::Param(name)) => {
                if let Some(param) = template.param(&name)
                    && param.param_type != ParamType::Integer
                {
                    issues.push(issue(
                        ValidationErrorKind::Range,
                        key,
                        format!("limit param '{}' must be an integer", name),
                    ));
                }
            }
            Some(LimitClause::Literal(_)) => {}
        }

        let placeholders = safety::placeholders(sql);
        for name in &placeholders {
            if template.param(name).is_none() {
                issues.push(issue(
                    ValidationErrorKind::Consistency,
                    key,
                    format!("placeholder ':{}' is not a declared param", name),
                ));
            }
        }
        let mut declared = HashSet::new();
        for param in &template.params {
            if !declared.insert(param.name.as_str()) {
                issues.push(issue(
                    ValidationErrorKind::Consistency,
                    key,
                    format!("param '{}' declared twice", param.name),
                ));
            }
            if !placeholders.contains(&param.name) {
                issues.push(issue(
                    ValidationErrorKind::Consistency,
                    key,
                    format!("param '{}' is never used", param.name),
                ));
            }
            if param.param_type == ParamType::Enum && param.values.is_empty() {
                issues.push(issue(
                    ValidationErrorKind::Schema,
                    key,
                    format!("enum param '{}' declares no values", param.name),
                ));
            }
        }

        for group in &template.required_inputs {
            if group.is_empty() {
                issues.push(issue(
                    ValidationErrorKind::Schema,
                    key,
                    "empty required_inputs group",
                ));
            }
            for name in group {
                if template.param(name).is_none() {
                    issues.push(issue(
                        ValidationErrorKind::Consistency,
                        key,
                        format!("required input '{}' is not a declared param", name),
                    ));
                }
            }
        }

        let ctes = safety::cte_names(sql);
        for table in safety::referenced_tables(sql) {
            if !domain::is_known_table(&table) && !ctes.contains(&table) {
                issues.push(issue(
                    ValidationErrorKind::UnknownIdentifier,
                    key,
                    format!("statement reads unknown table '{}'", table),
                ));
            }
        }

        let aliases = safety::alias_map(sql);
        for (qualifier, column) in safety::column_refs(sql) {
            match aliases.get(&qualifier).and_then(|t| domain::table(t)) {
                Some(table) if !table.has_column(&column) => issues.push(issue(
                    ValidationErrorKind::UnknownIdentifier,
                    key,
                    format!("unknown column '{}.{}'", qualifier, column),
                )),
                Some(_) => {}
                None if ctes.contains(&qualifier) => {}
                None => issues.push(issue(
                    ValidationErrorKind::UnknownIdentifier,
                    key,
                    format!("unknown table or alias '{}'", qualifier),
                )),
            }
        }

        if !(1..=max_rows as i64).contains(&template.default_limit) {
            issues.push(issue(
                ValidationErrorKind::Range,
                key,
                format!("default_limit {} outside 1..={}", template.default_limit, max_rows),
            ));
        }
    }
}

fn validate_display(display: &DisplaySpec, issues: &mut Vec<ValidationError>) {
    let key = display.key.as_str();
    if display.columns.is_empty() {
        issues.push(issue(ValidationErrorKind::Schema, key, "no columns declared"));
    }
    let mut names = HashSet::new();
    for column in &display.columns {
        if !names.insert(column.name.as_str()) {
            issues.push(issue(
                ValidationErrorKind::Schema,
                key,
                format!("column '{}' declared twice", column.name),
            ));
        }
    }
    if let Some(field) = &display.row_id_field
        && !names.contains(field.as_str())
    {
        issues.push(issue(
            ValidationErrorKind::Schema,
            key,
            format!("row_id_field '{}' is not a column", field),
        ));
    }
    for field in display.formatting.fields() {
        if !names.contains(field.as_str()) {
            issues.push(issue(
                ValidationErrorKind::Schema,
                key,
                format!("formatting field '{}' is not a column", field),
            ));
        }
    }
}

// =============================================================================
// Bundled Schema
// =============================================================================

struct TemplateDef {
    key: &'static str,
    description: &'static str,
    tables: &'static [&'static str],
    intents: &'static [&'static str],
    sql: &'static str,
    params: fn() -> Vec<TemplateParam>,
    required: &'static [&'static [&'static str]],
    default_limit: i64,
    display: &'static str,
}

struct DisplayDef {
    key: &'static str,
    title: &'static str,
    columns: &'static [(&'static str, &'static str, ColumnType)],
    row_id: Option<&'static str>,
}

fn limit() -> TemplateParam {
    TemplateParam::new("limit", ParamType::Integer)
}

fn string(name: &str) -> TemplateParam {
    TemplateParam::new(name, ParamType::String)
}

const STOP_MATCH: &str = "stops.stop_id = :stop_id OR stops.stop_name LIKE :stop_name \
     OR stops.parent_station IN (SELECT parent_stop.stop_id FROM stops AS parent_stop \
     WHERE parent_stop.stop_name LIKE :stop_name)";

const TEMPLATES: &[TemplateDef] = &[
    TemplateDef {
        key: "list_routes",
        description: "All routes, optionally filtered by route_type",
        tables: &["routes"],
        intents: &["list routes", "show routes", "all routes", "what routes", "which routes", "route list"],
        sql: "SELECT routes.route_id, routes.route_short_name, routes.route_long_name, routes.route_type \
              FROM routes \
              WHERE (:route_type IS NULL OR routes.route_type = :route_type) \
              ORDER BY routes.route_sort_order, routes.route_short_name \
              LIMIT :limit",
        params: || vec![TemplateParam::new("route_type", ParamType::Integer), limit()],
        required: &[],
        default_limit: 25,
        display: "routes_table",
    },
    TemplateDef {
        key: "route_details",
        description: "One route by id or short name, with its trip count",
        tables: &["routes", "trips"],
        intents: &["route details", "details for route", "route info", "about route"],
        sql: "SELECT routes.route_id, routes.route_short_name, routes.route_long_name, routes.route_desc, \
              routes.route_type, routes.route_color, COUNT(DISTINCT trips.trip_id) AS trip_count \
              FROM routes LEFT JOIN trips ON trips.route_id = routes.route_id \
              WHERE routes.route_id = :route_id OR routes.route_short_name = :route_id \
              GROUP BY routes.route_id \
              LIMIT :limit",
        params: || vec![string("route_id"), limit()],
        required: &[&["route_id"]],
        default_limit: 5,
        display: "route_detail_card",
    },
    TemplateDef {
        key: "list_stops",
        description: "Stops by name fragment or within a radius of a coordinate",
        tables: &["stops"],
        intents: &["list stops", "show stops", "nearby stops", "stops near", "all stops", "stops within"],
        sql: "SELECT stops.stop_id, stops.stop_name, stops.stop_lat, stops.stop_lon, stops.wheelchair_boarding \
              FROM stops \
              WHERE (:stop_name IS NULL OR stops.stop_name LIKE '%' || :stop_name || '%') \
              AND (:lat IS NULL OR :lon IS NULL OR ( \
              stops.stop_lat BETWEEN :lat - :radius_km / 111.0 AND :lat + :radius_km / 111.0 \
              AND stops.stop_lon BETWEEN :lon - :radius_km / 111.0 AND :lon + :radius_km / 111.0)) \
              ORDER BY stops.stop_name \
              LIMIT :limit",
        params: || {
            vec![
                string("stop_name"),
                TemplateParam::new("lat", ParamType::Number),
                TemplateParam::new("lon", ParamType::Number),
                TemplateParam::new("radius_km", ParamType::Number).with_default(Value::from(1.0)),
                limit(),
            ]
        },
        required: &[],
        default_limit: 25,
        display: "stops_table",
    },
    TemplateDef {
        key: "stop_details",
        description: "One stop by id or name, with its parent station",
        tables: &["stops"],
        intents: &["stop details", "details for stop", "stop info", "about stop"],
        sql: "SELECT stops.stop_id, stops.stop_code, stops.stop_name, stops.stop_lat, stops.stop_lon, \
              stops.wheelchair_boarding, parent_stop.stop_name AS parent_station_name \
              FROM stops \
              LEFT JOIN stops AS parent_stop ON parent_stop.stop_id = stops.parent_station \
              WHERE stops.stop_id = :stop_id OR stops.stop_name LIKE :stop_name \
              LIMIT :limit",
        params: || vec![string("stop_id"), string("stop_name"), limit()],
        required: &[&["stop_id"], &["stop_name"]],
        default_limit: 5,
        display: "stop_detail_card",
    },
    TemplateDef {
        key: "stops_on_route",
        description: "Stops served by a route in sequence order",
        tables: &["routes", "trips", "stop_times", "stops"],
        intents: &["stops on route", "stops for route", "route stops", "stops along"],
        sql: "SELECT stops.stop_id, stops.stop_name, MIN(stop_times.stop_sequence) AS stop_sequence \
              FROM routes \
              JOIN trips ON trips.route_id = routes.route_id \
              JOIN stop_times ON stop_times.trip_id = trips.trip_id \
              JOIN stops ON stops.stop_id = stop_times.stop_id \
              WHERE routes.route_id = :route_id OR routes.route_short_name = :route_id \
              GROUP BY stops.stop_id, stops.stop_name \
              ORDER BY stop_sequence \
              LIMIT :limit",
        params: || vec![string("route_id"), limit()],
        required: &[&["route_id"]],
        default_limit: 50,
        display: "route_stops_table",
    },
    TemplateDef {
        key: "routes_serving_stop",
        description: "Routes with at least one trip calling at a stop or its platforms",
        tables: &["stops", "stop_times", "trips", "routes"],
        intents: &["routes serving", "serve stop", "which routes stop", "routes at stop", "routes stop at"],
        sql: "SELECT DISTINCT routes.route_id, routes.route_short_name, routes.route_long_name \
              FROM stops \
              JOIN stop_times ON stop_times.stop_id = stops.stop_id \
              JOIN trips ON trips.trip_id = stop_times.trip_id \
              JOIN routes ON routes.route_id = trips.route_id \
              WHERE STOP_MATCH \
              ORDER BY routes.route_short_name \
              LIMIT :limit",
        params: || vec![string("stop_id"), string("stop_name"), limit()],
        required: &[&["stop_id"], &["stop_name"]],
        default_limit: 25,
        display: "stop_routes_table",
    },
    TemplateDef {
        key: "arrivals_for_stop",
        description: "Upcoming arrivals at a stop from a time of day",
        tables: &["stop_times", "stops", "trips", "routes"],
        intents: &["arrival", "arrivals", "departure", "departures", "schedule", "next bus"],
        sql: "SELECT stop_times.arrival_time, stop_times.departure_time, routes.route_short_name, \
              trips.trip_headsign, stops.stop_name \
              FROM stop_times \
              JOIN stops ON stops.stop_id = stop_times.stop_id \
              JOIN trips ON trips.trip_id = stop_times.trip_id \
              JOIN routes ON routes.route_id = trips.route_id \
              WHERE (stops.stop_id = :stop_id OR stops.stop_name LIKE :stop_name) \
              AND stop_times.arrival_time >= :after_time \
              ORDER BY stop_times.arrival_time \
              LIMIT :limit",
        params: || {
            vec![
                string("stop_id"),
                string("stop_name"),
                TemplateParam::new("after_time", ParamType::Time),
                limit(),
            ]
        },
        required: &[&["stop_id"], &["stop_name"]],
        default_limit: 10,
        display: "arrivals_table",
    },
    TemplateDef {
        key: "busiest_stops",
        description: "Stops ranked by scheduled visits",
        tables: &["stop_times", "stops"],
        intents: &["busiest stops", "top stops", "most used stops", "busiest stop"],
        sql: "SELECT stops.stop_id, stops.stop_name, COUNT(*) AS visit_count \
              FROM stop_times JOIN stops ON stops.stop_id = stop_times.stop_id \
              GROUP BY stops.stop_id, stops.stop_name \
              ORDER BY visit_count DESC, stops.stop_name \
              LIMIT :limit",
        params: || vec![limit()],
        required: &[],
        default_limit: 10,
        display: "busiest_stops_table",
    },
    TemplateDef {
        key: "busiest_routes",
        description: "Routes ranked by trip count",
        tables: &["routes", "trips"],
        intents: &["busiest routes", "top routes", "most used routes", "busiest route"],
        sql: "SELECT routes.route_id, routes.route_short_name, routes.route_long_name, \
              COUNT(DISTINCT trips.trip_id) AS trip_count \
              FROM routes JOIN trips ON trips.route_id = routes.route_id \
              GROUP BY routes.route_id \
              ORDER BY trip_count DESC, routes.route_short_name \
              LIMIT :limit",
        params: || vec![limit()],
        required: &[],
        default_limit: 10,
        display: "busiest_routes_table",
    },
    TemplateDef {
        key: "accessible_stops",
        description: "Stops with wheelchair boarding",
        tables: &["stops"],
        intents: &["accessible stops", "wheelchair stops", "wheelchair accessible stops"],
        sql: "SELECT stops.stop_id, stops.stop_name, stops.stop_lat, stops.stop_lon \
              FROM stops \
              WHERE stops.wheelchair_boarding = 1 \
              ORDER BY stops.stop_name \
              LIMIT :limit",
        params: || vec![limit()],
        required: &[],
        default_limit: 25,
        display: "accessible_stops_table",
    },
    TemplateDef {
        key: "accessible_trips",
        description: "Wheelchair accessible trips, optionally for one route",
        tables: &["trips", "routes"],
        intents: &["accessible trips", "wheelchair trips", "wheelchair accessible trips"],
        sql: "SELECT trips.trip_id, routes.route_short_name, trips.trip_headsign, trips.direction_id \
              FROM trips JOIN routes ON routes.route_id = trips.route_id \
              WHERE trips.wheelchair_accessible = 1 \
              AND (:route_id IS NULL OR routes.route_id = :route_id OR routes.route_short_name = :route_id) \
              ORDER BY routes.route_short_name, trips.trip_id \
              LIMIT :limit",
        params: || vec![string("route_id"), limit()],
        required: &[],
        default_limit: 25,
        display: "accessible_trips_table",
    },
    TemplateDef {
        key: "stop_service_volume",
        description: "Scheduled arrivals and trips at a stop or station",
        tables: &["stops", "stop_times"],
        intents: &["how many people", "how many riders", "traffic at", "service volume"],
        sql: "SELECT MIN(stops.stop_name) AS stop_name, COUNT(*) AS arrival_count, \
              COUNT(DISTINCT stop_times.trip_id) AS trip_count \
              FROM stops JOIN stop_times ON stop_times.stop_id = stops.stop_id \
              WHERE STOP_MATCH \
              LIMIT 1",
        params: || vec![string("stop_id"), string("stop_name")],
        required: &[&["stop_id"], &["stop_name"]],
        default_limit: 1,
        display: "stop_volume_summary",
    },
    TemplateDef {
        key: "route_stop_count",
        description: "Number of distinct stops a route serves",
        tables: &["routes", "trips", "stop_times"],
        intents: &["how many stops", "stop count", "number of stops"],
        sql: "SELECT COUNT(DISTINCT stop_times.stop_id) AS stop_count \
              FROM routes \
              JOIN trips ON trips.route_id = routes.route_id \
              JOIN stop_times ON stop_times.trip_id = trips.trip_id \
              WHERE routes.route_id = :route_id OR routes.route_short_name = :route_id \
              LIMIT 1",
        params: || vec![string("route_id")],
        required: &[&["route_id"]],
        default_limit: 1,
        display: "route_stop_count_summary",
    },
];

use ColumnType::{Coordinate, Integer, String as Text, Time};

const DISPLAYS: &[DisplayDef] = &[
    DisplayDef {
        key: "routes_table",
        title: "Routes ({row_count})",
        columns: &[
            ("route_short_name", "Route", Text),
            ("route_long_name", "Name", Text),
            ("route_type", "Type", Integer),
            ("route_id", "Route ID", Text),
        ],
        row_id: Some("route_id"),
    },
    DisplayDef {
        key: "route_detail_card",
        title: "Route {route_short_name}",
        columns: &[
            ("route_id", "Route ID", Text),
            ("route_short_name", "Route", Text),
            ("route_long_name", "Name", Text),
            ("route_desc", "Description", Text),
            ("route_type", "Type", Integer),
            ("route_color", "Color", Text),
            ("trip_count", "Trips", Integer),
        ],
        row_id: Some("route_id"),
    },
    DisplayDef {
        key: "stops_table",
        title: "Stops ({row_count})",
        columns: &[
            ("stop_name", "Stop", Text),
            ("stop_id", "Stop ID", Text),
            ("stop_lat", "Latitude", Coordinate),
            ("stop_lon", "Longitude", Coordinate),
            ("wheelchair_boarding", "Wheelchair", Integer),
        ],
        row_id: Some("stop_id"),
    },
    DisplayDef {
        key: "stop_detail_card",
        title: "Stop {stop_name}",
        columns: &[
            ("stop_id", "Stop ID", Text),
            ("stop_code", "Code", Text),
            ("stop_name", "Stop", Text),
            ("stop_lat", "Latitude", Coordinate),
            ("stop_lon", "Longitude", Coordinate),
            ("wheelchair_boarding", "Wheelchair", Integer),
            ("parent_station_name", "Station", Text),
        ],
        row_id: Some("stop_id"),
    },
    DisplayDef {
        key: "route_stops_table",
        title: "Stops on route {route_id}",
        columns: &[
            ("stop_sequence", "#", Integer),
            ("stop_name", "Stop", Text),
            ("stop_id", "Stop ID", Text),
        ],
        row_id: Some("stop_id"),
    },
    DisplayDef {
        key: "stop_routes_table",
        title: "Routes serving the stop ({row_count})",
        columns: &[
            ("route_short_name", "Route", Text),
            ("route_long_name", "Name", Text),
            ("route_id", "Route ID", Text),
        ],
        row_id: Some("route_id"),
    },
    DisplayDef {
        key: "arrivals_table",
        title: "Arrivals after {after_time}",
        columns: &[
            ("arrival_time", "Arrives", Time),
            ("departure_time", "Departs", Time),
            ("route_short_name", "Route", Text),
            ("trip_headsign", "Headsign", Text),
            ("stop_name", "Stop", Text),
        ],
        row_id: None,
    },
    DisplayDef {
        key: "busiest_stops_table",
        title: "Top {row_count} busiest stops",
        columns: &[
            ("stop_name", "Stop", Text),
            ("visit_count", "Scheduled visits", Integer),
            ("stop_id", "Stop ID", Text),
        ],
        row_id: Some("stop_id"),
    },
    DisplayDef {
        key: "busiest_routes_table",
        title: "Top {row_count} busiest routes",
        columns: &[
            ("route_short_name", "Route", Text),
            ("route_long_name", "Name", Text),
            ("trip_count", "Trips", Integer),
        ],
        row_id: None,
    },
    DisplayDef {
        key: "accessible_stops_table",
        title: "Wheelchair accessible stops ({row_count})",
        columns: &[
            ("stop_name", "Stop", Text),
            ("stop_id", "Stop ID", Text),
            ("stop_lat", "Latitude", Coordinate),
            ("stop_lon", "Longitude", Coordinate),
        ],
        row_id: Some("stop_id"),
    },
    DisplayDef {
        key: "accessible_trips_table",
        title: "Wheelchair accessible trips ({row_count})",
        columns: &[
            ("trip_id", "Trip", Text),
            ("route_short_name", "Route", Text),
            ("trip_headsign", "Headsign", Text),
            ("direction_id", "Direction", Integer),
        ],
        row_id: Some("trip_id"),
    },
    DisplayDef {
        key: "stop_volume_summary",
        title: "Service volume at {stop_name}",
        columns: &[
            ("stop_name", "Stop", Text),
            ("arrival_count", "Scheduled arrivals", Integer),
            ("trip_count", "Trips", Integer),
        ],
        row_id: None,
    },
    DisplayDef {
        key: "route_stop_count_summary",
        title: "Stops served by route {route_id}",
        columns: &[("stop_count", "Stops", Integer)],
        row_id: None,
    },
];

impl AgentSchema {
    /// Hand-written schema covering every required template
    pub fn builtin() -> Self {
        let query_templates = TEMPLATES
            .iter()
            .map(|def| QueryTemplate {
                key: def.key.to_string(),
                description: def.description.to_string(),
                tables: def.tables.iter().map(|t| t.to_string()).collect(),
                intent_keywords: def.intents.iter().map(|k| k.to_string()).collect(),
                sql: def.sql.replace("STOP_MATCH", STOP_MATCH),
                params: (def.params)(),
                required_inputs: def
                    .required
                    .iter()
                    .map(|group| group.iter().map(|n| n.to_string()).collect())
                    .collect(),
                default_limit: def.default_limit,
                display_key: def.display.to_string(),
            })
            .collect();

        let display_templates = DISPLAYS
            .iter()
            .map(|def| {
                let columns: Vec<ColumnSpec> = def
                    .columns
                    .iter()
                    .map(|(name, label, column_type)| ColumnSpec {
                        name: name.to_string(),
                        label: label.to_string(),
                        column_type: *column_type,
                    })
                    .collect();
                DisplaySpec {
                    key: def.key.to_string(),
                    title_template: def.title.to_string(),
                    formatting: Formatting::infer(&columns),
                    columns,
                    row_id_field: def.row_id.map(str::to_string),
                }
            })
            .collect();

        Self {
            query_templates,
            display_templates,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn minimal_value() -> Value {
        json!({
            "query_templates": [{
                "key": "list_routes",
                "tables": ["routes"],
                "sql": "SELECT routes.route_id FROM routes;",
                "display_key": "routes_table"
            }],
            "display_templates": [{
                "key": "routes_table",
                "title_template": "Routes",
                "columns": [{"name": "route_id", "label": "Route", "type": "text"}]
            }]
        })
    }

    #[test]
    fn test_builtin_schema_is_valid() {
        let mut schema = AgentSchema::builtin();
        schema.normalize(50);
        let issues = schema.validate(50, true);
        assert!(issues.is_empty(), "unexpected issues: {:?}", issues);
        assert_eq!(schema.query_templates.len(), 13);
    }

    #[test]
    fn test_normalize_appends_limit_and_declares_param() {
        let mut schema = AgentSchema::from_value(minimal_value()).unwrap();
        schema.normalize(50);

        let template = &schema.query_templates[0];
        assert_eq!(template.sql, "SELECT routes.route_id FROM routes LIMIT :limit");
        assert_eq!(template.default_limit, 25);
        assert_eq!(template.param("limit").unwrap().param_type, ParamType::Integer);
        assert!(schema.validate(50, false).is_empty());
    }

    #[test]
    fn test_normalize_clamps_limits() {
        let mut value = minimal_value();
        value["query_templates"][0]["sql"] = json!("SELECT routes.route_id FROM routes LIMIT 500");
        value["query_templates"][0]["default_limit"] = json!(400);
        let mut schema = AgentSchema::from_value(value).unwrap();
        schema.normalize(20);

        let template = &schema.query_templates[0];
        assert_eq!(template.sql, "SELECT routes.route_id FROM routes LIMIT 20");
        assert_eq!(template.default_limit, 20);
    }

    #[test]
    fn test_contract_mismatch_is_single_issue() {
        let issues = AgentSchema::from_value(json!({"query_templates": "nope"})).unwrap_err();
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].kind, ValidationErrorKind::Schema);
    }

    #[test]
    fn test_validate_collects_every_issue() {
        let mut value = minimal_value();
        value["query_templates"][0]["sql"] = json!(
            "SELECT * FROM routes JOIN agency ON agency.agency_id = routes.agency_id \
             WHERE routes.colour = :colour LIMIT :limit"
        );
        value["query_templates"][0]["display_key"] = json!("missing");
        value["query_templates"][0]["params"] = json!([
            {"name": "limit", "type": "integer"},
            {"name": "mode", "type": "enum"}
        ]);
        let mut schema = AgentSchema::from_value(value).unwrap();
        schema.normalize(50);
        let issues = schema.validate(50, true);
        let messages: Vec<String> = issues.iter().map(ToString::to_string).collect();

        let has = |needle: &str| messages.iter().any(|m| m.contains(needle));
        assert!(has("display_key 'missing' does not exist"));
        assert!(has("SELECT * is not allowed"));
        assert!(has("placeholder ':colour'"));
        assert!(has("param 'mode' is never used"));
        assert!(has("enum param 'mode'"));
        assert!(has("statement reads unknown table 'agency'"));
        assert!(has("unknown column 'routes.colour'"));
        assert!(has("'stop_details': required template is missing"));
    }

    #[test]
    fn test_unsafe_sql_is_reported() {
        let mut value = minimal_value();
        value["query_templates"][0]["sql"] = json!("DELETE FROM routes");
        let schema = AgentSchema::from_value(value).unwrap();
        let issues = schema.validate(50, false);
        assert!(
            issues
                .iter()
                .any(|i| i.kind == ValidationErrorKind::Safety)
        );
    }

    #[test]
    fn test_join_to_system_table_is_rejected() {
        let mut value = minimal_value();
        value["query_templates"][0]["sql"] = json!(
            "SELECT routes.route_id FROM routes JOIN sqlite_master ON 1 = 1 LIMIT :limit"
        );
        let mut schema = AgentSchema::from_value(value).unwrap();
        schema.normalize(50);
        let messages: Vec<String> = schema
            .validate(50, false)
            .iter()
            .map(ToString::to_string)
            .collect();
        assert!(
            messages
                .iter()
                .any(|m| m.contains("statement reads unknown table 'sqlite_master'")),
            "got {:?}",
            messages
        );
    }

    #[test]
    fn test_join_chain_template_validates() {
        let mut value = minimal_value();
        value["query_templates"][0]["sql"] = json!(
            "SELECT stops.stop_id, trips.trip_headsign FROM routes \
             JOIN trips ON trips.route_id = routes.route_id \
             JOIN stop_times AS st ON st.trip_id = trips.trip_id \
             JOIN stops ON stops.stop_id = st.stop_id \
             LIMIT :limit"
        );
        let mut schema = AgentSchema::from_value(value).unwrap();
        schema.normalize(50);
        assert!(schema.validate(50, false).is_empty());
    }

    #[test]
    fn test_formatting_fields_must_be_columns() {
        let mut value = minimal_value();
        value["display_templates"][0]["formatting"] =
            json!({"time_fields": ["arrival_time"], "color_fields": []});
        let mut schema = AgentSchema::from_value(value).unwrap();
        schema.normalize(50);
        let messages: Vec<String> = schema
            .validate(50, false)
            .iter()
            .map(ToString::to_string)
            .collect();
        assert_eq!(
            messages,
            vec!["'routes_table': formatting field 'arrival_time' is not a column"]
        );
    }

    #[test]
    fn test_builtin_formatting_follows_column_types() {
        let schema = AgentSchema::builtin();
        let arrivals = schema.display("arrivals_table").unwrap();
        assert_eq!(
            arrivals.formatting.time_fields,
            vec!["arrival_time", "departure_time"]
        );
        let route = schema.display("route_detail_card").unwrap();
        assert_eq!(route.formatting.color_fields, vec!["route_color"]);
        let stops = schema.display("stops_table").unwrap();
        assert_eq!(stops.formatting.latlon_fields, vec!["stop_lat", "stop_lon"]);
    }

    #[test]
    fn test_duplicate_keys() {
        let mut schema = AgentSchema::builtin();
        schema.query_templates.push(schema.query_templates[0].clone());
        schema.normalize(50);
        let issues = schema.validate(50, true);
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].to_string(), "'list_routes': duplicate template key");
    }
}
