//! Payload validation for bulk ingestion
//!
//! Each endpoint declares a [`FieldSchema`] of required fields. An item is
//! checked before any domain work runs; a field that is absent, null or
//! falsy counts as missing.

use std::str::FromStr;

use chrono::{NaiveDate, NaiveDateTime};
use rust_decimal::Decimal;
use serde_json::Value;

/// JSON value kinds a field may hold
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JsonType {
    Int,
    Float,
    Str,
    Bool,
    List,
    Dict,
}

impl JsonType {
    pub fn name(&self) -> &'static str {
        match self {
            JsonType::Int => "int",
            JsonType::Float => "float",
            JsonType::Str => "str",
            JsonType::Bool => "bool",
            JsonType::List => "list",
            JsonType::Dict => "dict",
        }
    }

    pub fn matches(&self, value: &Value) -> bool {
        match self {
            JsonType::Int => value.is_i64() || value.is_u64(),
            JsonType::Float => value.is_f64(),
            JsonType::Str => value.is_string(),
            JsonType::Bool => value.is_boolean(),
            JsonType::List => value.is_array(),
            JsonType::Dict => value.is_object(),
        }
    }
}

#[derive(Debug, Clone)]
pub enum FieldRule {
    Type(JsonType),
    AnyOf(Vec<JsonType>),
    /// A list whose elements are objects checked against the nested schema
    ListOf(FieldSchema),
}

/// Ordered required fields of one payload item
#[derive(Debug, Clone, Default)]
pub struct FieldSchema {
    fields: Vec<(&'static str, FieldRule)>,
}

impl FieldSchema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn field(mut self, name: &'static str, kind: JsonType) -> Self {
        self.fields.push((name, FieldRule::Type(kind)));
        self
    }

    pub fn any_of(mut self, name: &'static str, kinds: &[JsonType]) -> Self {
        self.fields.push((name, FieldRule::AnyOf(kinds.to_vec())));
        self
    }

    pub fn list_of(mut self, name: &'static str, schema: FieldSchema) -> Self {
        self.fields.push((name, FieldRule::ListOf(schema)));
        self
    }

    pub fn without(mut self, name: &str) -> Self {
        self.fields.retain(|(field, _)| *field != name);
        self
    }

    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.fields.iter().map(|(name, _)| *name)
    }

    fn collect(&self, item: &Value, missing: &mut Vec<String>, incorrect: &mut Vec<String>) {
        for (name, rule) in &self.fields {
            let value = match item.get(*name) {
                Some(v) if !is_falsy(v) => v,
                _ => {
                    missing.push((*name).to_string());
                    continue;
                }
            };
            match rule {
                FieldRule::Type(kind) => {
                    if !kind.matches(value) {
                        incorrect.push(format!("Field {} must be {}", name, kind.name()));
                    }
                }
                FieldRule::AnyOf(kinds) => {
                    if !kinds.iter().any(|k| k.matches(value)) {
                        let names: Vec<&str> = kinds.iter().map(|k| k.name()).collect();
                        incorrect.push(format!("Field {} must be {}", name, names.join(" or ")));
                    }
                }
                FieldRule::ListOf(nested) => match value.as_array() {
                    Some(elements) => {
                        for element in elements {
                            nested.collect(element, missing, incorrect);
                        }
                    }
                    None => incorrect.push(format!("Field {} must be list", name)),
                },
            }
        }
    }
}

fn is_falsy(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Bool(b) => !b,
        Value::Number(n) => n.as_f64().map(|f| f == 0.0).unwrap_or(false),
        Value::String(s) => s.is_empty(),
        Value::Array(a) => a.is_empty(),
        Value::Object(o) => o.is_empty(),
    }
}

/// Message describing what is wrong with an item, or `None` when it passes
pub fn check_missing_or_incorrect_fields(item: &Value, schema: &FieldSchema) -> Option<String> {
    let mut missing = Vec::new();
    let mut incorrect = Vec::new();
    schema.collect(item, &mut missing, &mut incorrect);
    if !missing.is_empty() {
        return Some(format!("Required Fields Not Found: {}", missing.join(", ")));
    }
    if !incorrect.is_empty() {
        return Some(format!("Incorrect Data Type: {}", incorrect.join(", ")));
    }
    None
}

const INT_OR_STR: &[JsonType] = &[JsonType::Int, JsonType::Str];
const NUMBER: &[JsonType] = &[JsonType::Float, JsonType::Int];

pub fn scale_ticket_schema() -> FieldSchema {
    FieldSchema::new()
        .any_of("ref_id", INT_OR_STR)
        .field("name", JsonType::Str)
        .field("weighbridge_id", JsonType::Int)
        .field("product_id", JsonType::Int)
        .field("partner_id", JsonType::Int)
        .any_of("weight_in", NUMBER)
        .any_of("weight_out", NUMBER)
}

/// Return tickets inherit the partner of their source
pub fn scale_ticket_schema_for(item: &Value) -> FieldSchema {
    let is_return = item.get("is_return").map(|v| !is_falsy(v)).unwrap_or(false);
    let has_source = item.get("source_id").map(|v| !is_falsy(v)).unwrap_or(false);
    if is_return && has_source {
        scale_ticket_schema().without("partner_id")
    } else {
        scale_ticket_schema()
    }
}

pub fn quality_control_schema() -> FieldSchema {
    FieldSchema::new()
        .any_of("ref_id", INT_OR_STR)
        .field("name", JsonType::Str)
        .field("scale_no", JsonType::Str)
        .field("delivery_no", JsonType::Str)
        .field("penalty_info", JsonType::List)
}

pub fn weighbridge_schema() -> FieldSchema {
    FieldSchema::new()
        .any_of("ref_id", INT_OR_STR)
        .field("name", JsonType::Str)
        .field("code", JsonType::Str)
        .field("partner_id", JsonType::Int)
}

pub fn partner_schema() -> FieldSchema {
    FieldSchema::new()
        .any_of("ref_id", INT_OR_STR)
        .field("name", JsonType::Str)
}

fn operation_header_schema() -> FieldSchema {
    FieldSchema::new()
        .any_of("ref_id", INT_OR_STR)
        .field("type_id", JsonType::Int)
        .field("name", JsonType::Str)
        .field("afdeling_id", JsonType::Int)
        .field("foreman_id", JsonType::Int)
        .field("foreman_extra_id", JsonType::Int)
        .field("assistant_id", JsonType::Int)
}

fn labour_line_schema() -> FieldSchema {
    FieldSchema::new()
        .field("member_id", JsonType::Int)
        .field("block_id", JsonType::Int)
}

pub fn harvest_operation_schema() -> FieldSchema {
    operation_header_schema()
        .field("clerk_id", JsonType::Int)
        .list_of("labour_ids", labour_line_schema())
}

/// Upkeep names its activity instead of a clerk
pub fn upkeep_operation_schema() -> FieldSchema {
    operation_header_schema()
        .field("activity_id", JsonType::Int)
        .list_of("labour_ids", labour_line_schema())
}

// ============================================================================
// Field-level checks
// ============================================================================

/// Scale readings are never negative
pub fn validate_weight(weight: Decimal) -> Result<(), &'static str> {
    if weight < Decimal::ZERO {
        return Err("Weight cannot be negative");
    }
    Ok(())
}

pub fn validate_month(month: u32) -> Result<(), &'static str> {
    if !(1..=12).contains(&month) {
        return Err("Month must be between 1 and 12");
    }
    Ok(())
}

pub fn validate_month_window(start: u32, end: u32) -> Result<(), &'static str> {
    validate_month(start)?;
    validate_month(end)?;
    if start > end {
        return Err("Start month must not be after end month");
    }
    Ok(())
}

/// Percentage penalties stay within 0..=100
pub fn validate_percentage(value: Decimal) -> Result<(), &'static str> {
    if value < Decimal::ZERO || value > Decimal::from(100) {
        return Err("Percentage must be between 0 and 100");
    }
    Ok(())
}

/// Weighbridge codes are short uppercase alphanumerics
pub fn validate_weighbridge_code(code: &str) -> Result<(), &'static str> {
    if code.is_empty() || code.len() > 16 {
        return Err("Weighbridge code must be 1 to 16 characters");
    }
    if !code.chars().all(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || c == '-') {
        return Err("Weighbridge code must be uppercase alphanumeric only");
    }
    Ok(())
}

/// Indonesian licence plates: region letters, digits, optional suffix letters
/// (e.g. `BK 1234 ABC`, `B1234XY`)
pub fn validate_licence_plate(plate: &str) -> Result<(), &'static str> {
    let compact: String = plate.chars().filter(|c| !c.is_whitespace()).collect();
    let upper = compact.to_ascii_uppercase();
    let region_len = upper.chars().take_while(|c| c.is_ascii_alphabetic()).count();
    let rest = &upper[region_len..];
    let digits_len = rest.chars().take_while(|c| c.is_ascii_digit()).count();
    let suffix = &rest[digits_len..];

    if !(1..=2).contains(&region_len) {
        return Err("Licence plate must start with a 1-2 letter region code");
    }
    if !(1..=4).contains(&digits_len) {
        return Err("Licence plate must have 1-4 digits");
    }
    if suffix.len() > 3 || !suffix.chars().all(|c| c.is_ascii_alphabetic()) {
        return Err("Licence plate suffix must be up to 3 letters");
    }
    Ok(())
}

// ============================================================================
// Payload values
// ============================================================================

const DATE_FORMATS: &[&str] = &["%d/%m/%Y", "%d-%m-%Y", "%Y-%m-%d"];
const DATETIME_FORMATS: &[&str] = &[
    "%d/%m/%Y %H:%M:%S",
    "%d/%m/%Y %H:%M",
    "%d-%m-%Y %H:%M:%S",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
];

/// Parse a mobile date, day first (`31/07/2024`) or ISO (`2024-07-31`)
pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    DATE_FORMATS
        .iter()
        .find_map(|f| NaiveDate::parse_from_str(raw, f).ok())
        .or_else(|| parse_datetime(raw).map(|dt| dt.date()))
}

/// Parse a mobile timestamp, day first or ISO
pub fn parse_datetime(raw: &str) -> Option<NaiveDateTime> {
    let raw = raw.trim();
    DATETIME_FORMATS
        .iter()
        .find_map(|f| NaiveDateTime::parse_from_str(raw, f).ok())
}

/// Exact decimal from a JSON number or numeric string
pub fn json_decimal(value: &Value) -> Option<Decimal> {
    match value {
        Value::Number(n) => Decimal::from_str(&n.to_string())
            .or_else(|_| Decimal::from_scientific(&n.to_string()))
            .ok(),
        Value::String(s) => Decimal::from_str(s.trim()).ok(),
        _ => None,
    }
}
