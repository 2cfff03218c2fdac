//! Default providers and packed string output.

use dictcache_core::{AttributeValue, DictError, Result};

/// Where a lookup takes the value for keys the source does not have.
#[derive(Clone, Debug)]
pub enum Defaults<'a, T> {
    /// The attribute's configured null value
    Attribute,
    /// One value for every row
    Constant(T),
    /// One value per row; must be as long as the key batch
    PerRow(&'a [T]),
}

impl<'a, T> Defaults<'a, T> {
    pub(crate) fn resolve(
        self,
        null_value: &AttributeValue,
        rows: usize,
        convert: impl FnOnce(&AttributeValue) -> Option<T>,
    ) -> Result<DefaultGetter<'a, T>> {
        match self {
            Defaults::Attribute => convert(null_value).map(DefaultGetter::Constant).ok_or_else(|| {
                DictError::InvalidArgument(format!(
                    "null value {:?} does not match the requested output type",
                    null_value
                ))
            }),
            Defaults::Constant(value) => Ok(DefaultGetter::Constant(value)),
            Defaults::PerRow(values) if values.len() == rows => Ok(DefaultGetter::PerRow(values)),
            Defaults::PerRow(values) => Err(DictError::InvalidArgument(format!(
                "{} default values for {} keys",
                values.len(),
                rows
            ))),
        }
    }
}

/// Resolved default provider, queried once per affected row.
pub(crate) enum DefaultGetter<'a, T> {
    Constant(T),
    PerRow(&'a [T]),
}

impl<T> DefaultGetter<'_, T> {
    pub(crate) fn get(&self, row: usize) -> &T {
        match self {
            DefaultGetter::Constant(value) => value,
            DefaultGetter::PerRow(values) => &values[row],
        }
    }
}

/// Strings packed into one buffer, one entry per row.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct StringColumn {
    chars: String,
    offsets: Vec<usize>,
}

impl StringColumn {
    /// Creates an empty column with room for `rows` entries.
    pub fn with_capacity(rows: usize) -> Self {
        Self {
            chars: String::new(),
            offsets: Vec::with_capacity(rows),
        }
    }

    /// Reserves space for `additional` more bytes of string data.
    pub fn reserve_bytes(&mut self, additional: usize) {
        self.chars.reserve(additional);
    }

    /// Appends one entry.
    pub fn push(&mut self, value: &str) {
        self.chars.push_str(value);
        self.offsets.push(self.chars.len());
    }

    /// Removes every entry, keeping allocations.
    pub fn clear(&mut self) {
        self.chars.clear();
        self.offsets.clear();
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.offsets.len()
    }

    /// Returns true if the column has no entries.
    pub fn is_empty(&self) -> bool {
        self.offsets.is_empty()
    }

    /// Total bytes of string data.
    pub fn total_bytes(&self) -> usize {
        self.chars.len()
    }

    /// Bytes of string data the column can hold without reallocating.
    pub fn byte_capacity(&self) -> usize {
        self.chars.capacity()
    }

    /// Entry at `row`.
    pub fn get(&self, row: usize) -> Option<&str> {
        let end = *self.offsets.get(row)?;
        let start = if row == 0 { 0 } else { self.offsets[row - 1] };
        self.chars.get(start..end)
    }

    /// Iterates entries in row order.
    pub fn iter(&self) -> impl Iterator<Item = &str> + '_ {
        (0..self.len()).filter_map(move |row| self.get(row))
    }

    /// Copies entries into owned strings.
    pub fn to_vec(&self) -> Vec<String> {
        self.iter().map(str::to_owned).collect()
    }
}
