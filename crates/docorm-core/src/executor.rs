//! Query execution.
//!
//! A query is compiled in full into [`CompiledQuery`] before the first command reaches
//! the store, so translation failures never leave partial work behind. Each compiled
//! query maps onto a single store round trip.

use std::sync::Arc;

use bson::{doc, Bson, Document};
use docorm_proto::{
    Aggregate, AggregateMethod, ConstraintAlgorithm, DatabaseQuery, DatabaseSchema, FieldName,
    Limit, QueryAction, SchemaAction, SchemaConstraint,
};
use futures::future::try_join_all;
use tracing::debug;

use crate::compile::{
    compile_filters, compile_pipeline, compile_sorts, compile_value_documents, limit_count,
    resolve_key, resolve_path, AliasTable, SortOrder,
};
use crate::error::Error;
use crate::row::ResultRow;
use crate::store::{
    AggregateCommand, CountCommand, CreateIndexes, DeleteCommand, DeleteLimit, DocumentStore,
    FindCommand, IndexModel, InsertCommand, UpdateCommand, UpdateStatement,
};

/// Index name used for unique constraints that carry no name of their own.
pub const DEFAULT_INDEX_NAME: &str = "unique";

/// Key under which group aggregates report their value.
const AGGREGATE_KEY: &str = "n";

/// Store commands for one query.
#[derive(Debug, Clone, PartialEq)]
pub enum CompiledQuery {
    Insert(InsertCommand),
    /// Plain read; documents are wrapped under `schema`.
    Find {
        schema: String,
        command: FindCommand,
    },
    /// Joined read over an aggregation pipeline.
    Join {
        command: AggregateCommand,
        aliases: Arc<AliasTable>,
    },
    Update(UpdateCommand),
    Delete(DeleteCommand),
    Count(CountCommand),
    /// Count of a joined read, taken over the pipeline's output.
    JoinCount(AggregateCommand),
    /// Sum, average, minimum or maximum; the first result's `n` is the value.
    Group(AggregateCommand),
}

/// Store commands for one schema operation.
#[derive(Debug, Clone, PartialEq)]
pub enum SchemaCommand {
    /// One submission per unique constraint.
    CreateIndexes(Vec<CreateIndexes>),
    DropCollection(String),
}

/// Compile a query into store commands.
pub fn compile_query(query: &DatabaseQuery) -> Result<CompiledQuery, Error> {
    match &query.action {
        QueryAction::Create => Ok(CompiledQuery::Insert(InsertCommand {
            collection: query.schema.clone(),
            documents: compile_value_documents(&query.fields, &query.input)?,
        })),
        QueryAction::Read if query.joins.is_empty() => {
            let command = FindCommand {
                collection: query.schema.clone(),
                filter: compile_filters(&query.filters, false)?,
                sort: compile_sorts(&query.sorts, false)?.map(|sort| sort.to_document()),
                skip: limit_count(&query.offsets)?,
                limit: limit_count(&query.limits)?,
            };
            Ok(CompiledQuery::Find {
                schema: query.schema.clone(),
                command,
            })
        }
        QueryAction::Read => {
            let pipeline = compile_pipeline(query)?;
            Ok(CompiledQuery::Join {
                command: AggregateCommand {
                    collection: query.schema.clone(),
                    pipeline: pipeline.stages,
                },
                aliases: Arc::new(pipeline.aliases),
            })
        }
        QueryAction::Update => {
            let filter = compile_filters(&query.filters, false)?;
            let updates = compile_value_documents(&query.fields, &query.input)?
                .into_iter()
                .map(|document| UpdateStatement {
                    filter: filter.clone(),
                    update: doc! { "$set": document },
                    multi: true,
                })
                .collect();
            Ok(CompiledQuery::Update(UpdateCommand {
                collection: query.schema.clone(),
                updates,
            }))
        }
        QueryAction::Delete => {
            let limit = match query.limits.first() {
                None => DeleteLimit::All,
                Some(Limit::Count(1)) => DeleteLimit::One,
                Some(_) => return Err(Error::UnsupportedCustomLimit),
            };
            Ok(CompiledQuery::Delete(DeleteCommand {
                collection: query.schema.clone(),
                filter: compile_filters(&query.filters, false)?,
                limit,
            }))
        }
        QueryAction::Aggregate(aggregate) => compile_aggregate(query, aggregate),
        QueryAction::Custom(_) => Err(Error::UnsupportedCustomAction),
    }
}

fn compile_aggregate(query: &DatabaseQuery, aggregate: &Aggregate) -> Result<CompiledQuery, Error> {
    let (field, method) = match aggregate {
        Aggregate::Field { field, method } => (field, method),
        Aggregate::Custom(_) => return Err(Error::UnsupportedCustomAggregate),
    };

    let accumulator = match method {
        AggregateMethod::Count if query.joins.is_empty() => {
            return Ok(CompiledQuery::Count(CountCommand {
                collection: query.schema.clone(),
                filter: compile_filters(&query.filters, false)?,
            }));
        }
        AggregateMethod::Count => {
            let pipeline = compile_pipeline(query)?;
            return Ok(CompiledQuery::JoinCount(AggregateCommand {
                collection: query.schema.clone(),
                pipeline: pipeline.stages,
            }));
        }
        AggregateMethod::Sum => "$sum",
        AggregateMethod::Average => "$avg",
        AggregateMethod::Minimum => "$min",
        AggregateMethod::Maximum => "$max",
        AggregateMethod::Custom(_) => return Err(Error::UnsupportedCustomAggregate),
    };

    let path = resolve_path(field)?;
    let mut reduction = Document::new();
    reduction.insert(accumulator, format!("${}", path));
    let mut group = doc! { "_id": Bson::Null };
    group.insert(AGGREGATE_KEY, reduction);

    Ok(CompiledQuery::Group(AggregateCommand {
        collection: query.schema.clone(),
        pipeline: vec![
            doc! { "$match": compile_filters(&query.filters, false)? },
            doc! { "$group": group },
        ],
    }))
}

fn index_key(name: &FieldName) -> Result<String, Error> {
    match name {
        FieldName::Key(key) => resolve_key(key),
        FieldName::Custom(_) => Err(Error::InvalidIndexKey),
    }
}

/// Compile a schema operation into store commands.
pub fn compile_schema(schema: &DatabaseSchema) -> Result<SchemaCommand, Error> {
    if schema.action == SchemaAction::Delete {
        return Ok(SchemaCommand::DropCollection(schema.schema.clone()));
    }

    let mut commands = Vec::new();
    for constraint in &schema.create_constraints {
        let (fields, name) = match constraint {
            SchemaConstraint::Constraint {
                algorithm:
                    ConstraintAlgorithm::Unique(fields)
                    | ConstraintAlgorithm::CompositeIdentifier(fields),
                name,
            } => (fields, name),
            SchemaConstraint::Constraint { .. } | SchemaConstraint::Custom(_) => continue,
        };

        let mut keys = Document::new();
        for field in fields {
            keys.insert(index_key(field)?, SortOrder::Ascending.as_i32());
        }

        commands.push(CreateIndexes {
            collection: schema.schema.clone(),
            indexes: vec![IndexModel {
                name: name.as_deref().unwrap_or(DEFAULT_INDEX_NAME).to_string(),
                keys,
                unique: true,
            }],
        });
    }
    Ok(SchemaCommand::CreateIndexes(commands))
}

/// Runs compiled queries against a store.
pub struct Executor<'a> {
    store: &'a dyn DocumentStore,
}

impl<'a> Executor<'a> {
    pub fn new(store: &'a dyn DocumentStore) -> Self {
        Self { store }
    }

    /// Execute a query, handing each result row to `on_row`.
    ///
    /// Writes and aggregates produce a single aggregate row carrying the affected count or
    /// the aggregate value.
    pub async fn execute(
        &self,
        query: &DatabaseQuery,
        on_row: &mut (dyn FnMut(ResultRow) + Send),
    ) -> Result<(), Error> {
        let compiled = compile_query(query)?;
        self.run(compiled, on_row).await
    }

    /// Execute an already compiled query.
    pub async fn run(
        &self,
        compiled: CompiledQuery,
        on_row: &mut (dyn FnMut(ResultRow) + Send),
    ) -> Result<(), Error> {
        match compiled {
            CompiledQuery::Insert(command) => {
                debug!(
                    collection = %command.collection,
                    documents = command.documents.len(),
                    "insert"
                );
                let expected = command.documents.len();
                let reply = self.store.insert_many(command).await?;
                if reply.inserted != expected {
                    return Err(Error::InsertFailed {
                        expected,
                        acknowledged: reply.inserted,
                    });
                }
                on_row(ResultRow::aggregate(reply.inserted as i64));
            }
            CompiledQuery::Find { schema, command } => {
                debug!(
                    collection = %command.collection,
                    filter = %command.filter,
                    sort = ?command.sort,
                    skip = ?command.skip,
                    limit = ?command.limit,
                    "find"
                );
                self.store
                    .find(command, &mut |document: Document| {
                        on_row(ResultRow::document(&schema, document))
                    })
                    .await?;
            }
            CompiledQuery::Join { command, aliases } => {
                debug!(collection = %command.collection, stages = ?command.pipeline, "join");
                self.store
                    .aggregate(command, &mut |document: Document| {
                        on_row(ResultRow::joined(document, aliases.clone()))
                    })
                    .await?;
            }
            CompiledQuery::Update(command) => {
                debug!(command = %command.to_command(), "update");
                let reply = self.store.update(command).await?;
                on_row(ResultRow::aggregate(reply.modified as i64));
            }
            CompiledQuery::Delete(command) => {
                debug!(command = %command.to_command(), "delete");
                let reply = self.store.delete(command).await?;
                on_row(ResultRow::aggregate(reply.deleted as i64));
            }
            CompiledQuery::Count(command) => {
                debug!(command = %command.to_command(), "count");
                let count = self.store.count(command).await?;
                on_row(ResultRow::aggregate(count as i64));
            }
            CompiledQuery::JoinCount(command) => {
                debug!(collection = %command.collection, stages = ?command.pipeline, "join count");
                let mut count: i64 = 0;
                self.store
                    .aggregate(command, &mut |_: Document| count += 1)
                    .await?;
                on_row(ResultRow::aggregate(count));
            }
            CompiledQuery::Group(command) => {
                debug!(collection = %command.collection, stages = ?command.pipeline, "group");
                let mut first: Option<Document> = None;
                self.store
                    .aggregate(command, &mut |document: Document| {
                        if first.is_none() {
                            first = Some(document);
                        }
                    })
                    .await?;
                let value = first
                    .and_then(|document| document.get(AGGREGATE_KEY).cloned())
                    .unwrap_or(Bson::Null);
                on_row(ResultRow::aggregate(value));
            }
        }
        Ok(())
    }

    /// Execute a schema operation. Index creations are submitted concurrently.
    pub async fn execute_schema(&self, schema: &DatabaseSchema) -> Result<(), Error> {
        match compile_schema(schema)? {
            SchemaCommand::CreateIndexes(commands) => {
                let submissions = commands.into_iter().map(|command| {
                    debug!(command = %command.to_command(), "create indexes");
                    self.store.create_indexes(command)
                });
                try_join_all(submissions).await?;
            }
            SchemaCommand::DropCollection(collection) => {
                debug!(collection = %collection, "drop collection");
                self.store.drop_collection(&collection).await?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use docorm_proto::{Field, Filter, Join, QueryValue, Sort};
    use pretty_assertions::assert_eq;

    use super::*;

    fn users(name: &str) -> Field {
        Field::path(name, "users")
    }

    #[test]
    fn test_read_scenario() {
        let query = DatabaseQuery::read("users")
            .with_filter(Filter::gte(users("age"), 18))
            .with_filter(Filter::eq(users("active"), true))
            .with_sort(Sort::ascending(users("name")))
            .with_limit(10)
            .with_offset(5);

        let compiled = compile_query(&query).unwrap();
        assert_eq!(
            compiled,
            CompiledQuery::Find {
                schema: "users".into(),
                command: FindCommand {
                    collection: "users".into(),
                    filter: doc! {
                        "$and": [{ "age": { "$gte": 18 } }, { "active": { "$eq": true } }]
                    },
                    sort: Some(doc! { "name": 1 }),
                    skip: Some(5),
                    limit: Some(10),
                },
            }
        );
    }

    #[test]
    fn test_read_rejects_custom_limit() {
        let mut query = DatabaseQuery::read("users");
        query.limits.push(Limit::Custom("TOP 3".into()));
        assert!(matches!(
            compile_query(&query),
            Err(Error::UnsupportedCustomLimit)
        ));
    }

    #[test]
    fn test_delete_cardinality() {
        let one = compile_query(&DatabaseQuery::delete("users").with_limit(1)).unwrap();
        assert!(matches!(
            one,
            CompiledQuery::Delete(DeleteCommand {
                limit: DeleteLimit::One,
                ..
            })
        ));

        let all = compile_query(&DatabaseQuery::delete("users")).unwrap();
        assert!(matches!(
            all,
            CompiledQuery::Delete(DeleteCommand {
                limit: DeleteLimit::All,
                ..
            })
        ));

        assert!(matches!(
            compile_query(&DatabaseQuery::delete("users").with_limit(2)),
            Err(Error::UnsupportedCustomLimit)
        ));
    }

    #[test]
    fn test_update_statements() {
        let query = DatabaseQuery::update("users")
            .with_filter(Filter::eq(users("name"), "alice"))
            .with_fields(vec![users("active")])
            .with_input(vec![QueryValue::bind(false)]);

        let compiled = compile_query(&query).unwrap();
        assert_eq!(
            compiled,
            CompiledQuery::Update(UpdateCommand {
                collection: "users".into(),
                updates: vec![UpdateStatement {
                    filter: doc! { "name": { "$eq": "alice" } },
                    update: doc! { "$set": { "active": false } },
                    multi: true,
                }],
            })
        );
    }

    #[test]
    fn test_count_compiles_by_join_presence() {
        let count = Aggregate::field(Field::id("users"), AggregateMethod::Count);
        assert!(matches!(
            compile_query(&DatabaseQuery::aggregate("users", count.clone())).unwrap(),
            CompiledQuery::Count(_)
        ));

        let joined = DatabaseQuery::aggregate("users", count).with_join(Join::inner(
            "pets",
            Field::path("owner_id", "pets"),
            Field::id("users"),
        ));
        assert!(matches!(
            compile_query(&joined).unwrap(),
            CompiledQuery::JoinCount(_)
        ));
    }

    #[test]
    fn test_group_pipeline() {
        let query = DatabaseQuery::aggregate(
            "users",
            Aggregate::field(users("age"), AggregateMethod::Average),
        )
        .with_filter(Filter::eq(users("active"), true));

        let compiled = compile_query(&query).unwrap();
        assert_eq!(
            compiled,
            CompiledQuery::Group(AggregateCommand {
                collection: "users".into(),
                pipeline: vec![
                    doc! { "$match": { "active": { "$eq": true } } },
                    doc! { "$group": { "_id": null, "n": { "$avg": "$age" } } },
                ],
            })
        );
    }

    #[test]
    fn test_custom_aggregates_and_actions() {
        let custom_method = DatabaseQuery::aggregate(
            "users",
            Aggregate::field(users("age"), AggregateMethod::Custom("median".into())),
        );
        assert!(matches!(
            compile_query(&custom_method),
            Err(Error::UnsupportedCustomAggregate)
        ));
        assert!(matches!(
            compile_query(&DatabaseQuery::aggregate("users", Aggregate::Custom("x".into()))),
            Err(Error::UnsupportedCustomAggregate)
        ));
        assert!(matches!(
            compile_query(&DatabaseQuery::new("users", QueryAction::Custom("upsert".into()))),
            Err(Error::UnsupportedCustomAction)
        ));
    }

    #[test]
    fn test_unique_index_schema() {
        let schema = DatabaseSchema::new(SchemaAction::Create, "users")
            .with_constraint(SchemaConstraint::unique(vec!["name".into()]))
            .with_constraint(SchemaConstraint::Constraint {
                algorithm: ConstraintAlgorithm::ForeignKey {
                    fields: vec!["team_id".into()],
                    foreign_schema: "teams".into(),
                    foreign_fields: vec![FieldName::Key(docorm_proto::FieldKey::Id)],
                },
                name: None,
            });

        assert_eq!(
            compile_schema(&schema).unwrap(),
            SchemaCommand::CreateIndexes(vec![CreateIndexes {
                collection: "users".into(),
                indexes: vec![IndexModel {
                    name: DEFAULT_INDEX_NAME.into(),
                    keys: doc! { "name": 1 },
                    unique: true,
                }],
            }])
        );
    }

    #[test]
    fn test_composite_identifier_index() {
        let schema = DatabaseSchema::new(SchemaAction::Update, "memberships").with_constraint(
            SchemaConstraint::Constraint {
                algorithm: ConstraintAlgorithm::CompositeIdentifier(vec![
                    "user_id".into(),
                    "team_id".into(),
                ]),
                name: Some("membership".into()),
            },
        );

        let SchemaCommand::CreateIndexes(commands) = compile_schema(&schema).unwrap() else {
            panic!("expected index creation");
        };
        assert_eq!(commands[0].indexes[0].name, "membership");
        let keys: Vec<&str> = commands[0].indexes[0]
            .keys
            .keys()
            .map(String::as_str)
            .collect();
        assert_eq!(keys, vec!["user_id", "team_id"]);
    }

    #[test]
    fn test_invalid_index_key() {
        let schema = DatabaseSchema::new(SchemaAction::Create, "users")
            .with_constraint(SchemaConstraint::unique(vec![FieldName::Custom("lower(name)".into())]));
        assert!(matches!(
            compile_schema(&schema),
            Err(Error::InvalidIndexKey)
        ));
    }

    #[test]
    fn test_schema_delete_drops() {
        let schema = DatabaseSchema::new(SchemaAction::Delete, "users");
        assert_eq!(
            compile_schema(&schema).unwrap(),
            SchemaCommand::DropCollection("users".into())
        );
    }
}
