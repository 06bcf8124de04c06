//! Entity and property descriptions
//!
//! Supported property types:
//! - int, double, bool, string, blob
//! - reference: non-owning pointer to another object
//! - composite_reference: owning pointer
//!
//! Multiplicity wraps any of them in an ordered array or an unordered set.

use serde::{Deserialize, Serialize};

use crate::item::{Value, ValueSet};

/// Type of a property's elements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PropertyType {
    Int,
    Double,
    Bool,
    String,
    Blob,
    Reference,
    CompositeReference,
}

impl PropertyType {
    /// Returns the type name for error messages
    pub fn type_name(&self) -> &'static str {
        match self {
            PropertyType::Int => "int",
            PropertyType::Double => "double",
            PropertyType::Bool => "bool",
            PropertyType::String => "string",
            PropertyType::Blob => "blob",
            PropertyType::Reference => "reference",
            PropertyType::CompositeReference => "composite_reference",
        }
    }

    fn is_reference(&self) -> bool {
        matches!(self, PropertyType::Reference | PropertyType::CompositeReference)
    }

    /// Whether one element value has this type.
    fn matches(&self, value: &Value) -> bool {
        matches!(
            (self, value),
            (PropertyType::Int, Value::Int(_))
                | (PropertyType::Double, Value::Double(_))
                | (PropertyType::Bool, Value::Bool(_))
                | (PropertyType::String, Value::String(_))
                | (PropertyType::Blob, Value::Blob(_))
                | (PropertyType::Reference, Value::Reference(_))
                | (PropertyType::CompositeReference, Value::CompositeReference(_))
        )
    }
}

/// How many values a property holds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Multiplicity {
    #[default]
    Single,
    Ordered,
    Unordered,
}

/// One property of an entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropertyDescription {
    pub name: String,
    #[serde(rename = "type")]
    pub property_type: PropertyType,
    #[serde(default)]
    pub multiplicity: Multiplicity,
    /// Declaring package when it differs from the owning entity's package.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub package: Option<String>,
}

impl PropertyDescription {
    pub fn new(name: impl Into<String>, property_type: PropertyType) -> Self {
        Self {
            name: name.into(),
            property_type,
            multiplicity: Multiplicity::Single,
            package: None,
        }
    }

    pub fn ordered(mut self) -> Self {
        self.multiplicity = Multiplicity::Ordered;
        self
    }

    pub fn unordered(mut self) -> Self {
        self.multiplicity = Multiplicity::Unordered;
        self
    }

    pub fn in_package(mut self, package: impl Into<String>) -> Self {
        self.package = Some(package.into());
        self
    }

    pub fn is_composite(&self) -> bool {
        self.property_type == PropertyType::CompositeReference
    }

    /// Whether `value` fits this property's type and multiplicity.
    ///
    /// A plain reference never satisfies a composite property, nor the
    /// other way round.
    pub fn accepts(&self, value: &Value) -> bool {
        match (self.multiplicity, value) {
            (Multiplicity::Single, value) => self.property_type.matches(value),
            (Multiplicity::Ordered, Value::Array(values)) => {
                values.iter().all(|v| self.property_type.matches(v))
            }
            (Multiplicity::Unordered, Value::Set(set)) => {
                set.iter().all(|v| self.property_type.matches(v))
            }
            _ => false,
        }
    }

    /// Human-readable expected shape, for error messages.
    pub fn expected_shape(&self) -> String {
        match self.multiplicity {
            Multiplicity::Single => self.property_type.type_name().to_string(),
            Multiplicity::Ordered => format!("array of {}", self.property_type.type_name()),
            Multiplicity::Unordered => format!("set of {}", self.property_type.type_name()),
        }
    }

    /// Value a freshly instantiated object starts with.
    ///
    /// Single references have no sensible default and start unset.
    pub fn default_value(&self) -> Option<Value> {
        match self.multiplicity {
            Multiplicity::Ordered => Some(Value::Array(Vec::new())),
            Multiplicity::Unordered => Some(Value::Set(ValueSet::new())),
            Multiplicity::Single if self.property_type.is_reference() => None,
            Multiplicity::Single => Some(match self.property_type {
                PropertyType::Int => Value::Int(0),
                PropertyType::Double => Value::Double(0.0),
                PropertyType::Bool => Value::Bool(false),
                PropertyType::Blob => Value::Blob(Vec::new()),
                _ => Value::String(String::new()),
            }),
        }
    }
}

/// Schema of one entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityDescription {
    pub name: String,
    pub package: String,
    #[serde(default)]
    pub properties: Vec<PropertyDescription>,
}

impl EntityDescription {
    pub fn new(name: impl Into<String>, package: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            package: package.into(),
            properties: Vec::new(),
        }
    }

    pub fn with_property(mut self, property: PropertyDescription) -> Self {
        self.properties.push(property);
        self
    }

    pub fn property(&self, name: &str) -> Option<&PropertyDescription> {
        self.properties.iter().find(|p| p.name == name)
    }

    /// Package declaring `property`, falling back to the entity's package.
    pub fn property_package(&self, name: &str) -> Option<&str> {
        self.property(name)
            .map(|p| p.package.as_deref().unwrap_or(&self.package))
    }
}
