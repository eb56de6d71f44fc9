//! Sort compilation.

use bson::{Bson, Document};
use docorm_proto::{Sort, SortDirection};

use super::field::resolve;
use crate::error::Error;

/// Native sort order of the document store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Ascending,
    Descending,
}

impl SortOrder {
    /// Numeric form used in sort and index documents.
    pub fn as_i32(self) -> i32 {
        match self {
            SortOrder::Ascending => 1,
            SortOrder::Descending => -1,
        }
    }

    /// Interpret a primitive as a native sort order.
    pub fn from_primitive(primitive: &Bson) -> Option<Self> {
        let order = match primitive {
            Bson::Int32(i) => *i as i64,
            Bson::Int64(i) => *i,
            _ => return None,
        };
        match order {
            1 => Some(SortOrder::Ascending),
            -1 => Some(SortOrder::Descending),
            _ => None,
        }
    }
}

/// Ordered sort keys.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortSpec(pub Vec<(String, SortOrder)>);

impl SortSpec {
    /// Sort document (`{path: 1 | -1, ...}`), preserving key order.
    pub fn to_document(&self) -> Document {
        let mut document = Document::new();
        for (path, order) in &self.0 {
            document.insert(path.clone(), order.as_i32());
        }
        document
    }
}

/// Map a sort direction to the store's native order.
pub fn sort_order(direction: &SortDirection) -> Result<SortOrder, Error> {
    match direction {
        SortDirection::Ascending => Ok(SortOrder::Ascending),
        SortDirection::Descending => Ok(SortOrder::Descending),
        SortDirection::Custom(primitive) => {
            SortOrder::from_primitive(primitive).ok_or(Error::UnsupportedCustomSort)
        }
    }
}

/// Compile a query's sorts. An empty list yields no sort at all.
pub fn compile_sorts(sorts: &[Sort], aggregate: bool) -> Result<Option<SortSpec>, Error> {
    let mut spec = Vec::with_capacity(sorts.len());

    for sort in sorts {
        match sort {
            Sort::Sort { field, direction } => {
                spec.push((resolve(field, aggregate)?, sort_order(direction)?));
            }
            Sort::Custom(_) => return Err(Error::UnsupportedCustomSort),
        }
    }

    if spec.is_empty() {
        return Ok(None);
    }

    Ok(Some(SortSpec(spec)))
}
