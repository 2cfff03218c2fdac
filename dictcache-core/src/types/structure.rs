//! Dictionary structure: the typed attribute list.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::error::{DictError, Result};
use crate::types::{AttributeType, AttributeValue, Key};

/// Declaration of one attribute.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AttributeSpec {
    /// Attribute name, unique within a structure
    pub name: String,
    /// Storage type
    #[serde(rename = "type")]
    pub attr_type: AttributeType,
    /// Value stored for keys the source reports absent
    pub null_value: AttributeValue,
}

impl AttributeSpec {
    /// Creates an attribute declaration.
    pub fn new(name: impl Into<String>, attr_type: AttributeType, null_value: AttributeValue) -> Self {
        Self {
            name: name.into(),
            attr_type,
            null_value,
        }
    }
}

/// Ordered, validated attribute list of a dictionary.
///
/// Attribute values in a [`SourceRow`] are positional and follow this order.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<AttributeSpec>", into = "Vec<AttributeSpec>")]
pub struct DictionaryStructure {
    attributes: Vec<AttributeSpec>,
}

impl DictionaryStructure {
    /// Validates and creates a structure.
    ///
    /// Null values are coerced to their declared type.
    ///
    /// # Errors
    /// Returns `InvalidStructure` for an empty list, empty or duplicate names,
    /// or a null value that cannot be represented in the declared type.
    pub fn new(attributes: Vec<AttributeSpec>) -> Result<Self> {
        if attributes.is_empty() {
            return Err(DictError::InvalidStructure("no attributes declared".into()));
        }

        let mut seen = HashSet::with_capacity(attributes.len());
        let mut validated = Vec::with_capacity(attributes.len());

        for spec in attributes {
            if spec.name.trim().is_empty() {
                return Err(DictError::InvalidStructure("attribute name is empty".into()));
            }
            if !seen.insert(spec.name.clone()) {
                return Err(DictError::InvalidStructure(format!(
                    "duplicate attribute '{}'",
                    spec.name
                )));
            }

            let declared = spec.null_value.attribute_type();
            let null_value = spec.null_value.coerce(spec.attr_type).ok_or_else(|| {
                DictError::InvalidStructure(format!(
                    "null value of '{}' is {}, expected {}",
                    spec.name, declared, spec.attr_type
                ))
            })?;

            validated.push(AttributeSpec {
                name: spec.name,
                attr_type: spec.attr_type,
                null_value,
            });
        }

        Ok(Self { attributes: validated })
    }

    /// Returns all attributes in declaration order.
    pub fn attributes(&self) -> &[AttributeSpec] {
        &self.attributes
    }

    /// Number of attributes.
    pub fn len(&self) -> usize {
        self.attributes.len()
    }

    /// Always false for a validated structure.
    pub fn is_empty(&self) -> bool {
        self.attributes.is_empty()
    }

    /// Returns the position of the named attribute.
    pub fn index_of(&self, name: &str) -> Result<usize> {
        self.attributes
            .iter()
            .position(|a| a.name == name)
            .ok_or_else(|| DictError::UnknownAttribute(name.to_owned()))
    }

    /// Returns the attribute at `index`.
    pub fn attribute(&self, index: usize) -> Option<&AttributeSpec> {
        self.attributes.get(index)
    }

    /// Checks that a source row carries exactly one value of the declared
    /// type per attribute.
    pub fn check_row(&self, row: &SourceRow) -> Result<()> {
        if row.values.len() != self.attributes.len() {
            return Err(DictError::InvalidRow {
                key: row.key,
                reason: format!(
                    "expected {} values, got {}",
                    self.attributes.len(),
                    row.values.len()
                ),
            });
        }

        for (spec, value) in self.attributes.iter().zip(&row.values) {
            if value.attribute_type() != spec.attr_type {
                return Err(DictError::InvalidRow {
                    key: row.key,
                    reason: format!(
                        "attribute '{}' is {}, got {}",
                        spec.name,
                        spec.attr_type,
                        value.attribute_type()
                    ),
                });
            }
        }

        Ok(())
    }

    /// Coerces loosely typed row values (e.g. parsed from JSON) to the
    /// declared types, then checks the row.
    pub fn coerce_row(&self, row: SourceRow) -> Result<SourceRow> {
        let key = row.key;
        if row.values.len() != self.attributes.len() {
            return Err(DictError::InvalidRow {
                key,
                reason: format!(
                    "expected {} values, got {}",
                    self.attributes.len(),
                    row.values.len()
                ),
            });
        }

        let values = self
            .attributes
            .iter()
            .zip(row.values)
            .map(|(spec, value)| {
                let actual = value.attribute_type();
                value.coerce(spec.attr_type).ok_or_else(|| DictError::InvalidRow {
                    key,
                    reason: format!("attribute '{}' is {}, got {}", spec.name, spec.attr_type, actual),
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(SourceRow { key, values })
    }
}

impl TryFrom<Vec<AttributeSpec>> for DictionaryStructure {
    type Error = DictError;

    fn try_from(attributes: Vec<AttributeSpec>) -> Result<Self> {
        Self::new(attributes)
    }
}

impl From<DictionaryStructure> for Vec<AttributeSpec> {
    fn from(structure: DictionaryStructure) -> Self {
        structure.attributes
    }
}

/// One key's attribute values as loaded from a backing source.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SourceRow {
    /// Dictionary key
    pub key: Key,
    /// Values in structure order
    pub values: Vec<AttributeValue>,
}

impl SourceRow {
    /// Creates a row.
    pub fn new(key: Key, values: Vec<AttributeValue>) -> Self {
        Self { key, values }
    }
}
