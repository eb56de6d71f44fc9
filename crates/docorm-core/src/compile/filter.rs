//! Filter compilation.
//!
//! Translates ORM filter trees into query documents. The same compiler serves plain
//! collection queries and aggregation pipelines; in the latter, fields are addressed
//! through their owning schema (see [`resolve_projected_path`](super::field::resolve_projected_path)).

use bson::{doc, Bson, Document};
use docorm_proto::{
    ContainsLocation, CustomFilter, Filter, FilterMethod, GroupRelation, QueryValue, Value,
};

use super::field::resolve;
use super::value::to_primitive;
use crate::error::Error;

/// Map a comparison method to its query operator.
pub fn filter_operator(method: &FilterMethod) -> Result<&'static str, Error> {
    match method {
        FilterMethod::Equality { inverse } => Ok(if *inverse { "$ne" } else { "$eq" }),
        FilterMethod::Order { inverse, equality } => Ok(match (inverse, equality) {
            (false, false) => "$gt",
            (false, true) => "$gte",
            (true, false) => "$lt",
            (true, true) => "$lte",
        }),
        FilterMethod::Subset { inverse } => Ok(if *inverse { "$nin" } else { "$in" }),
        FilterMethod::Contains { .. } | FilterMethod::Custom(_) => Err(Error::UnsupportedFilter),
    }
}

/// Regular expression for a contains filter.
pub fn contains_pattern(needle: &str, location: ContainsLocation) -> String {
    match location {
        ContainsLocation::Anywhere => format!(".*{}.*", needle),
        ContainsLocation::Prefix => format!("{}.*", needle),
        ContainsLocation::Suffix => format!(".*{}", needle),
    }
}

/// Compile one filter expression into a query document.
pub fn compile_filter(filter: &Filter, aggregate: bool) -> Result<Document, Error> {
    match filter {
        Filter::Value {
            field,
            method,
            value,
        } => {
            let path = resolve(field, aggregate)?;
            match method {
                FilterMethod::Contains { inverse, location } => {
                    let needle = match value {
                        QueryValue::Bind(Value::String(needle)) => needle,
                        _ => return Err(Error::UnsupportedFilterValue),
                    };
                    let regex = doc! { "$regex": contains_pattern(needle, *location) };
                    let condition = if *inverse {
                        doc! { "$not": regex }
                    } else {
                        regex
                    };
                    Ok(single(path, condition))
                }
                method => {
                    let operator = filter_operator(method)?;
                    let mut condition = Document::new();
                    condition.insert(operator, to_primitive(value)?);
                    Ok(single(path, condition))
                }
            }
        }
        Filter::Field { lhs, method, rhs } => {
            let operator = match method {
                FilterMethod::Equality { .. } | FilterMethod::Order { .. } => {
                    filter_operator(method)?
                }
                _ => return Err(Error::UnsupportedFilter),
            };
            let lhs = format!("${}", resolve(lhs, aggregate)?);
            let rhs = format!("${}", resolve(rhs, aggregate)?);
            let mut comparison = Document::new();
            comparison.insert(operator, vec![Bson::String(lhs), Bson::String(rhs)]);
            Ok(doc! { "$expr": comparison })
        }
        Filter::Group { filters, relation } => {
            let operator = match relation {
                GroupRelation::And => "$and",
                GroupRelation::Or => "$or",
                GroupRelation::Custom(_) => return Err(Error::UnsupportedCustomFilter),
            };
            let mut conditions = filters
                .iter()
                .map(|filter| compile_filter(filter, aggregate))
                .collect::<Result<Vec<_>, _>>()?;

            match conditions.len() {
                0 if operator == "$and" => Ok(Document::new()),
                0 => Ok(match_nothing()),
                1 => Ok(conditions.remove(0)),
                _ => {
                    let mut group = Document::new();
                    group.insert(operator, conditions);
                    Ok(group)
                }
            }
        }
        Filter::Custom(CustomFilter::Document(document)) => Ok(document.clone()),
        Filter::Custom(CustomFilter::Opaque(_)) => Err(Error::UnsupportedCustomFilter),
    }
}

/// Compile a query's top-level filter list.
///
/// No filters match everything; a single filter is used as-is; several are AND-combined.
pub fn compile_filters(filters: &[Filter], aggregate: bool) -> Result<Document, Error> {
    let mut conditions = filters
        .iter()
        .map(|filter| compile_filter(filter, aggregate))
        .collect::<Result<Vec<_>, _>>()?;

    match conditions.len() {
        0 => Ok(Document::new()),
        1 => Ok(conditions.remove(0)),
        _ => Ok(doc! { "$and": conditions }),
    }
}

fn single(key: String, value: Document) -> Document {
    let mut document = Document::new();
    document.insert(key, value);
    document
}

fn match_nothing() -> Document {
    doc! { "$nor": [{}] }
}
