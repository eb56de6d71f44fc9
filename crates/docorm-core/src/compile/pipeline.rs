//! Aggregation pipelines emulating joins.
//!
//! The store has no native joins, so a joined read runs as an aggregation over the
//! base collection:
//!
//! 1. `$replaceRoot` nests each base document under the collection name, so every
//!    field can be addressed as `schema.field` once foreign documents are attached.
//! 2. One `$lookup` per join attaches the matching foreign documents under the join's
//!    alias. Inner joins follow with `$unwind`, which drops rows without a match.
//! 3. `$match` with the query's filters, addressed through projected paths.
//! 4. `$sort`, `$skip` and `$limit` on the joined set.
//! 5. `$project` trims the result to the requested fields.

use std::collections::BTreeMap;

use bson::{doc, Document};
use docorm_proto::{DatabaseQuery, Field, Filter, FilterMethod, Join, JoinMethod};

use super::field::{resolve_path, resolve_projected_path};
use super::filter::compile_filters;
use super::limit_count;
use super::sort::compile_sorts;
use crate::error::Error;

/// Where the documents of a joined schema live in a pipeline result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinedSchema {
    /// Collection the documents come from.
    pub schema: String,
    /// Top-level key of the result document holding them.
    pub key: String,
}

/// Join alias (or collection name, when unaliased) to its joined schema.
pub type AliasTable = BTreeMap<String, JoinedSchema>;

/// A compiled join pipeline together with the alias table its results are read with.
#[derive(Debug, Clone, PartialEq)]
pub struct JoinPipeline {
    pub stages: Vec<Document>,
    pub aliases: AliasTable,
}

struct EqualityJoin<'a> {
    schema: &'a str,
    key: &'a str,
    method: &'a JoinMethod,
    foreign: &'a Field,
    local: &'a Field,
}

fn equality_join(join: &Join) -> Result<EqualityJoin<'_>, Error> {
    match join {
        Join::Join {
            schema,
            alias,
            method,
            foreign,
            local,
        } => Ok(EqualityJoin {
            schema,
            key: alias.as_deref().unwrap_or(schema),
            method,
            foreign,
            local,
        }),
        Join::Advanced {
            schema,
            alias,
            method,
            conditions,
        } => {
            let key = alias.as_deref().unwrap_or(schema);
            let (lhs, rhs) = match conditions.as_slice() {
                [Filter::Field {
                    lhs,
                    method: FilterMethod::Equality { inverse: false },
                    rhs,
                }] => (lhs, rhs),
                _ => return Err(Error::UnsupportedJoin),
            };
            let (foreign, local) = if lhs.schema() == Some(key) {
                (lhs, rhs)
            } else if rhs.schema() == Some(key) {
                (rhs, lhs)
            } else {
                return Err(Error::UnsupportedJoin);
            };
            Ok(EqualityJoin {
                schema,
                key,
                method,
                foreign,
                local,
            })
        }
        Join::Custom(_) => Err(Error::UnsupportedJoin),
    }
}

/// Build the lookup stages for the query's joins, registering each alias.
///
/// Returns the result keys of the joined documents in join order.
fn join_stages(
    joins: &[Join],
    stages: &mut Vec<Document>,
    aliases: &mut AliasTable,
) -> Result<Vec<String>, Error> {
    let mut keys = Vec::with_capacity(joins.len());
    for join in joins {
        let join = equality_join(join)?;
        let unwind = match join.method {
            JoinMethod::Inner => true,
            JoinMethod::Left => false,
            JoinMethod::Custom(_) => return Err(Error::UnsupportedJoin),
        };

        stages.push(doc! {
            "$lookup": {
                "from": join.schema,
                "localField": resolve_projected_path(join.local)?,
                "foreignField": resolve_path(join.foreign)?,
                "as": join.key,
            }
        });
        if unwind {
            stages.push(doc! { "$unwind": format!("${}", join.key) });
        }

        aliases.insert(
            join.key.to_string(),
            JoinedSchema {
                schema: join.schema.to_string(),
                key: join.key.to_string(),
            },
        );
        keys.push(join.key.to_string());
    }
    Ok(keys)
}

fn saturating_i64(count: u64) -> i64 {
    i64::try_from(count).unwrap_or(i64::MAX)
}

/// Compile the aggregation pipeline for a joined read.
pub fn compile_pipeline(query: &DatabaseQuery) -> Result<JoinPipeline, Error> {
    let mut stages = Vec::new();
    let mut aliases = AliasTable::new();

    let mut root = Document::new();
    root.insert(query.schema.clone(), "$$ROOT");
    stages.push(doc! { "$replaceRoot": { "newRoot": root } });

    let joined_keys = join_stages(&query.joins, &mut stages, &mut aliases)?;

    let filter = compile_filters(&query.filters, true)?;
    if !filter.is_empty() {
        stages.push(doc! { "$match": filter });
    }

    if let Some(sort) = compile_sorts(&query.sorts, true)? {
        stages.push(doc! { "$sort": sort.to_document() });
    }

    if let Some(offset) = limit_count(&query.offsets)? {
        stages.push(doc! { "$skip": saturating_i64(offset) });
    }

    if let Some(limit) = limit_count(&query.limits)? {
        stages.push(doc! { "$limit": saturating_i64(limit) });
    }

    let mut projection = Document::new();
    if query.fields.is_empty() {
        projection.insert(query.schema.clone(), 1);
        for key in joined_keys {
            projection.insert(key, 1);
        }
    } else {
        for field in &query.fields {
            projection.insert(resolve_projected_path(field)?, 1);
        }
    }
    stages.push(doc! { "$project": projection });

    Ok(JoinPipeline { stages, aliases })
}
