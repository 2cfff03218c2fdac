//! Columnar attribute storage parallel to the cell table.
//!
//! One column per attribute, one entry per slot. Entries are only written
//! while the owning slot is write-locked in the cell table, so a reader
//! holding the slot's read lock always sees the values of the bound key.

use parking_lot::RwLock;

use dictcache_core::{
    AttributeSpec, AttributeType, AttributeValue, DictError, DictionaryStructure, Result,
};

/// Values of one attribute, indexed by slot.
pub struct Column<T> {
    values: Box<[RwLock<T>]>,
    /// Value of an absent key
    null: T,
}

impl<T: Clone> Column<T> {
    fn new(len: usize, null: T) -> Self {
        Self {
            values: (0..len).map(|_| RwLock::new(null.clone())).collect(),
            null,
        }
    }

    /// Copy of the value at `slot`.
    pub fn get(&self, slot: usize) -> T {
        self.values[slot].read().clone()
    }

    /// Runs `f` on the value at `slot` without copying it.
    pub fn with<R>(&self, slot: usize, f: impl FnOnce(&T) -> R) -> R {
        f(&self.values[slot].read())
    }

    fn set(&self, slot: usize, value: T) {
        *self.values[slot].write() = value;
    }

    fn reset(&self, slot: usize) {
        self.set(slot, self.null.clone());
    }
}

/// A typed column.
pub enum AttributeColumn {
    /// `UInt64` values
    UInt64(Column<u64>),
    /// `Int64` values
    Int64(Column<i64>),
    /// `Float64` values
    Float64(Column<f64>),
    /// `String` values
    String(Column<String>),
}

impl AttributeColumn {
    /// Column typed after `null_value`, every entry starting as that value.
    fn new(null_value: &AttributeValue, len: usize) -> Self {
        match null_value {
            AttributeValue::UInt64(v) => AttributeColumn::UInt64(Column::new(len, *v)),
            AttributeValue::Int64(v) => AttributeColumn::Int64(Column::new(len, *v)),
            AttributeValue::Float64(v) => AttributeColumn::Float64(Column::new(len, *v)),
            AttributeValue::String(v) => AttributeColumn::String(Column::new(len, v.clone())),
        }
    }

    /// Storage type of this column.
    pub fn attribute_type(&self) -> AttributeType {
        match self {
            AttributeColumn::UInt64(_) => AttributeType::UInt64,
            AttributeColumn::Int64(_) => AttributeType::Int64,
            AttributeColumn::Float64(_) => AttributeType::Float64,
            AttributeColumn::String(_) => AttributeType::String,
        }
    }

    /// Returns the string column, if this is one.
    pub fn as_strings(&self) -> Option<&Column<String>> {
        match self {
            AttributeColumn::String(column) => Some(column),
            _ => None,
        }
    }

    /// Stores `value` at `slot`, or returns the value's type if it does not
    /// match the column.
    fn set(&self, slot: usize, value: &AttributeValue) -> std::result::Result<(), AttributeType> {
        match (self, value) {
            (AttributeColumn::UInt64(c), AttributeValue::UInt64(v)) => c.set(slot, *v),
            (AttributeColumn::Int64(c), AttributeValue::Int64(v)) => c.set(slot, *v),
            (AttributeColumn::Float64(c), AttributeValue::Float64(v)) => c.set(slot, *v),
            (AttributeColumn::String(c), AttributeValue::String(v)) => c.set(slot, v.clone()),
            (_, other) => return Err(other.attribute_type()),
        }
        Ok(())
    }

    fn reset(&self, slot: usize) {
        match self {
            AttributeColumn::UInt64(c) => c.reset(slot),
            AttributeColumn::Int64(c) => c.reset(slot),
            AttributeColumn::Float64(c) => c.reset(slot),
            AttributeColumn::String(c) => c.reset(slot),
        }
    }
}

/// Numeric output types a column can be read as.
pub trait NumericAttribute: Copy + Default + Send + Sync + 'static {
    /// Attribute type this output type reads.
    const TYPE: AttributeType;

    /// Returns the typed column if its type matches.
    fn column(column: &AttributeColumn) -> Option<&Column<Self>>;

    /// Extracts the value if its type matches.
    fn from_value(value: &AttributeValue) -> Option<Self>;
}

impl NumericAttribute for u64 {
    const TYPE: AttributeType = AttributeType::UInt64;

    fn column(column: &AttributeColumn) -> Option<&Column<Self>> {
        match column {
            AttributeColumn::UInt64(c) => Some(c),
            _ => None,
        }
    }

    fn from_value(value: &AttributeValue) -> Option<Self> {
        value.as_u64()
    }
}

impl NumericAttribute for i64 {
    const TYPE: AttributeType = AttributeType::Int64;

    fn column(column: &AttributeColumn) -> Option<&Column<Self>> {
        match column {
            AttributeColumn::Int64(c) => Some(c),
            _ => None,
        }
    }

    fn from_value(value: &AttributeValue) -> Option<Self> {
        value.as_i64()
    }
}

impl NumericAttribute for f64 {
    const TYPE: AttributeType = AttributeType::Float64;

    fn column(column: &AttributeColumn) -> Option<&Column<Self>> {
        match column {
            AttributeColumn::Float64(c) => Some(c),
            _ => None,
        }
    }

    fn from_value(value: &AttributeValue) -> Option<Self> {
        value.as_f64()
    }
}

/// All attribute columns of a dictionary.
pub struct AttributeStore {
    specs: Vec<AttributeSpec>,
    columns: Vec<AttributeColumn>,
}

impl AttributeStore {
    /// Creates one column per attribute, each `slots` long and filled with
    /// the attribute's null value.
    pub fn new(structure: &DictionaryStructure, slots: usize) -> Self {
        let specs = structure.attributes().to_vec();
        let columns = specs
            .iter()
            .map(|spec| AttributeColumn::new(&spec.null_value, slots))
            .collect();
        Self { specs, columns }
    }

    /// Column at `index`.
    pub fn column(&self, index: usize) -> Option<&AttributeColumn> {
        self.columns.get(index)
    }

    /// Reads a numeric value, or `None` if the column has another type.
    pub fn read<T: NumericAttribute>(&self, index: usize, slot: usize) -> Option<T> {
        self.column(index).and_then(T::column).map(|c| c.get(slot))
    }

    /// Writes one full row at `slot`.
    ///
    /// Types are checked before anything is written, so a mismatched row
    /// leaves the slot untouched.
    pub fn write_row(&self, slot: usize, values: &[AttributeValue]) -> Result<()> {
        if values.len() != self.columns.len() {
            return Err(DictError::InvalidArgument(format!(
                "row has {} values, dictionary has {} attributes",
                values.len(),
                self.columns.len()
            )));
        }

        for ((spec, column), value) in self.specs.iter().zip(&self.columns).zip(values) {
            if value.attribute_type() != column.attribute_type() {
                return Err(mismatch(spec, column, value.attribute_type()));
            }
        }

        for ((spec, column), value) in self.specs.iter().zip(&self.columns).zip(values) {
            column
                .set(slot, value)
                .map_err(|actual| mismatch(spec, column, actual))?;
        }
        Ok(())
    }

    /// Writes every attribute's null value at `slot`.
    pub fn write_defaults(&self, slot: usize) {
        for column in &self.columns {
            column.reset(slot);
        }
    }
}

fn mismatch(spec: &AttributeSpec, column: &AttributeColumn, actual: AttributeType) -> DictError {
    DictError::TypeMismatch {
        attribute: spec.name.clone(),
        expected: column.attribute_type(),
        actual,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_store() -> AttributeStore {
        let structure = DictionaryStructure::new(vec![
            AttributeSpec::new("id", AttributeType::UInt64, 7u64.into()),
            AttributeSpec::new("label", AttributeType::String, "none".into()),
        ])
        .unwrap();
        AttributeStore::new(&structure, 4)
    }

    #[test]
    fn test_columns_start_with_null_values() {
        let store = make_store();
        assert_eq!(store.read::<u64>(0, 3), Some(7));
        let label = store.column(1).unwrap().as_strings().unwrap().get(2);
        assert_eq!(label, "none");
    }

    #[test]
    fn test_write_row_and_defaults() {
        let store = make_store();
        store.write_row(1, &[99u64.into(), "hello".into()]).unwrap();
        assert_eq!(store.read::<u64>(0, 1), Some(99));
        store
            .column(1)
            .unwrap()
            .as_strings()
            .unwrap()
            .with(1, |s| assert_eq!(s, "hello"));

        store.write_defaults(1);
        assert_eq!(store.read::<u64>(0, 1), Some(7));
    }

    #[test]
    fn test_mismatched_row_leaves_slot_untouched() {
        let store = make_store();
        store.write_row(2, &[5u64.into(), "kept".into()]).unwrap();

        let err = store.write_row(2, &[6u64.into(), 1i64.into()]).unwrap_err();
        assert!(matches!(err, DictError::TypeMismatch { .. }));
        assert_eq!(store.read::<u64>(0, 2), Some(5));
    }

    #[test]
    fn test_column_rejects_other_type() {
        let store = make_store();
        let column = store.column(0).unwrap();
        assert_eq!(column.set(3, &"text".into()), Err(AttributeType::String));
        assert_eq!(store.read::<u64>(0, 3), Some(7));

        assert_eq!(column.set(3, &8u64.into()), Ok(()));
        column.reset(3);
        assert_eq!(store.read::<u64>(0, 3), Some(7));
    }

    #[test]
    fn test_float_column_typed_by_null_value() {
        let structure =
            DictionaryStructure::new(vec![AttributeSpec::new("ratio", AttributeType::Float64, 0.5f64.into())]).unwrap();
        let store = AttributeStore::new(&structure, 2);
        assert_eq!(store.column(0).unwrap().attribute_type(), AttributeType::Float64);
        assert_eq!(store.read::<f64>(0, 1), Some(0.5));
    }

    #[test]
    fn test_read_wrong_type() {
        let store = make_store();
        assert_eq!(store.read::<i64>(0, 0), None);
        assert_eq!(store.read::<u64>(1, 0), None);
        assert!(store.column(5).is_none());
    }
}
