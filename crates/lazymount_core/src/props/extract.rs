//! Attribute-to-property coercion.

use log::warn;
use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use std::collections::btree_map;
use std::collections::BTreeMap;
use std::error::Error;
use std::fmt::{Display, Formatter};

const DATATYPE_SUFFIX: &str = "Datatype";
const DATA_PREFIX: &str = "data-";

static DASHED_SEGMENT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"-([a-z])").expect("valid dashed segment regex"));

/// Declared type of an attribute, read from its `Datatype` sibling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeclaredType {
    String,
    Number,
    Boolean,
}

impl DeclaredType {
    /// Returns `None` for tags other than `String`, `Number` and `Boolean`.
    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag.trim() {
            "String" => Some(Self::String),
            "Number" => Some(Self::Number),
            "Boolean" => Some(Self::Boolean),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::String => "String",
            Self::Number => "Number",
            Self::Boolean => "Boolean",
        }
    }
}

/// A coerced property value.
#[derive(Debug, Clone, PartialEq)]
pub enum PropertyValue {
    String(String),
    Number(f64),
    Boolean(bool),
}

/// An attribute declared as `Number` did not hold a finite number.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeCoercionError {
    pub attribute: String,
    pub declared: DeclaredType,
    pub value: String,
}

impl Display for TypeCoercionError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "attribute `{}` declared as {} has unparseable value `{}`",
            self.attribute,
            self.declared.as_str(),
            self.value
        )
    }
}

impl Error for TypeCoercionError {}

/// Immutable property map handed to a module factory.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TypedProperties {
    values: BTreeMap<String, PropertyValue>,
}

impl TypedProperties {
    pub fn get(&self, name: &str) -> Option<&PropertyValue> {
        self.values.get(name)
    }

    pub fn get_str(&self, name: &str) -> Option<&str> {
        match self.values.get(name)? {
            PropertyValue::String(value) => Some(value),
            _ => None,
        }
    }

    pub fn get_number(&self, name: &str) -> Option<f64> {
        match self.values.get(name)? {
            PropertyValue::Number(value) => Some(*value),
            _ => None,
        }
    }

    pub fn get_bool(&self, name: &str) -> Option<bool> {
        match self.values.get(name)? {
            PropertyValue::Boolean(value) => Some(*value),
            _ => None,
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> btree_map::Iter<'_, String, PropertyValue> {
        self.values.iter()
    }
}

/// Converts raw mount point attributes into typed properties.
///
/// # Contract
/// - `k` with a `kDatatype` sibling is coerced; the sibling never appears in
///   the output.
/// - `Number` parses the trimmed value as a finite float or fails the whole
///   extraction.
/// - `Boolean` is `true` only for the exact literal `"true"`.
/// - Unrecognized type tags are treated as `String`.
/// - `data-` names are exposed dataset-style: `data-user-id` becomes `userId`.
///   When two attributes map to one name, the first in attribute-name order
///   is kept and the other is skipped with a warning.
/// - Deterministic and side-effect free apart from a warning event for
///   unrecognized tags.
pub fn extract(raw: &BTreeMap<String, String>) -> Result<TypedProperties, TypeCoercionError> {
    let mut values = BTreeMap::new();

    for (key, value) in raw {
        if let Some(base) = key.strip_suffix(DATATYPE_SUFFIX) {
            // Type declarations never surface, with or without a base attribute.
            if !base.is_empty() {
                continue;
            }
        }

        let name = property_name(key);
        if values.contains_key(&name) {
            // First attribute in name order wins; the colliding one is not coerced.
            warn!(
                "event=props_extract module=props status=skip reason=name_collision attribute={} property={}",
                key, name
            );
            continue;
        }

        let declared = match raw.get(&format!("{key}{DATATYPE_SUFFIX}")) {
            Some(tag) => match DeclaredType::from_tag(tag) {
                Some(declared) => declared,
                None => {
                    warn!(
                        "event=props_extract module=props status=fallback reason=unknown_datatype attribute={}",
                        key
                    );
                    DeclaredType::String
                }
            },
            None => DeclaredType::String,
        };

        values.insert(name, coerce(key, value, declared)?);
    }

    Ok(TypedProperties { values })
}

fn coerce(
    attribute: &str,
    value: &str,
    declared: DeclaredType,
) -> Result<PropertyValue, TypeCoercionError> {
    match declared {
        DeclaredType::String => Ok(PropertyValue::String(value.to_string())),
        DeclaredType::Boolean => Ok(PropertyValue::Boolean(value == "true")),
        DeclaredType::Number => value
            .trim()
            .parse::<f64>()
            .ok()
            .filter(|number| number.is_finite())
            .map(PropertyValue::Number)
            .ok_or_else(|| TypeCoercionError {
                attribute: attribute.to_string(),
                declared,
                value: value.to_string(),
            }),
    }
}

fn property_name(attribute: &str) -> String {
    match attribute.strip_prefix(DATA_PREFIX) {
        Some(rest) => DASHED_SEGMENT_RE
            .replace_all(rest, |caps: &Captures<'_>| caps[1].to_ascii_uppercase())
            .into_owned(),
        None => attribute.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::{extract, DeclaredType, PropertyValue, TypeCoercionError};
    use std::collections::BTreeMap;

    fn attrs(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect()
    }

    #[test]
    fn coerces_declared_number_and_drops_sibling() {
        let props = extract(&attrs(&[("data-n", "5"), ("data-nDatatype", "Number")])).unwrap();
        assert_eq!(props.get_number("n"), Some(5.0));
        assert_eq!(props.len(), 1);
    }

    #[test]
    fn boolean_is_true_only_for_literal_true() {
        let props = extract(&attrs(&[
            ("data-a", "true"),
            ("data-aDatatype", "Boolean"),
            ("data-b", "false"),
            ("data-bDatatype", "Boolean"),
            ("data-c", "TRUE"),
            ("data-cDatatype", "Boolean"),
        ]))
        .unwrap();
        assert_eq!(props.get_bool("a"), Some(true));
        assert_eq!(props.get_bool("b"), Some(false));
        assert_eq!(props.get_bool("c"), Some(false));
    }

    #[test]
    fn untyped_attribute_passes_through_unchanged() {
        let props = extract(&attrs(&[("data-label", " Hello ")])).unwrap();
        assert_eq!(props.get_str("label"), Some(" Hello "));
    }

    #[test]
    fn unparseable_number_fails_whole_extraction() {
        let err = extract(&attrs(&[
            ("data-ok", "x"),
            ("data-n", "five"),
            ("data-nDatatype", "Number"),
        ]))
        .unwrap_err();
        assert_eq!(
            err,
            TypeCoercionError {
                attribute: "data-n".to_string(),
                declared: DeclaredType::Number,
                value: "five".to_string(),
            }
        );
    }

    #[test]
    fn empty_and_infinite_numbers_are_rejected() {
        assert!(extract(&attrs(&[("n", ""), ("nDatatype", "Number")])).is_err());
        assert!(extract(&attrs(&[("n", "inf"), ("nDatatype", "Number")])).is_err());
        let props = extract(&attrs(&[("n", " -2.5 "), ("nDatatype", "Number")])).unwrap();
        assert_eq!(props.get("n"), Some(&PropertyValue::Number(-2.5)));
    }

    #[test]
    fn unknown_datatype_falls_back_to_string() {
        let props = extract(&attrs(&[("data-d", "2024-01-01"), ("data-dDatatype", "Date")])).unwrap();
        assert_eq!(props.get_str("d"), Some("2024-01-01"));
    }

    #[test]
    fn orphan_datatype_is_dropped_and_dashed_names_are_camel_cased() {
        let props = extract(&attrs(&[
            ("data-ghostDatatype", "Number"),
            ("data-user-id", "42"),
            ("data-user-idDatatype", "Number"),
            ("title", "Cart"),
        ]))
        .unwrap();
        assert_eq!(props.get_number("userId"), Some(42.0));
        assert_eq!(props.get_str("title"), Some("Cart"));
        assert!(props.get("ghost").is_none());
        assert_eq!(props.len(), 2);
    }

    #[test]
    fn colliding_property_names_keep_first_attribute() {
        let props = extract(&attrs(&[
            ("data-n", "7"),
            ("data-nDatatype", "Number"),
            ("n", "x"),
            ("nDatatype", "Number"),
            ("data-user-id", "a"),
            ("data-userId", "b"),
        ]))
        .unwrap();
        assert_eq!(props.get_number("n"), Some(7.0));
        assert_eq!(props.get_str("userId"), Some("a"));
        assert_eq!(props.len(), 2);
    }
}
