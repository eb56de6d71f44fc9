//! Integration tests for query execution against the in-memory store.

use std::any::Any;
use std::sync::Arc;

use async_trait::async_trait;
use bson::{doc, Bson, Document};
use docorm_core::proto::{
    Aggregate, AggregateMethod, ContainsLocation, CustomFilter, DatabaseQuery, DatabaseSchema,
    Field, FieldKey, Filter, Join, QueryAction, QueryValue, SchemaAction, SchemaConstraint,
    Sort,
};
use docorm_core::{
    require_store, AggregateCommand, Database, CountCommand, CreateIndexes, DeleteCommand, DeleteLimit,
    DeleteReply, DocumentDatabase, DocumentStore, Error, FindCommand, IndexModel, InsertCommand,
    InsertReply, MemoryStore, ResultRow, StoreOperation, StoreTransaction, UpdateCommand,
    UpdateReply,
};
use pretty_assertions::assert_eq;

struct TestContext {
    store: MemoryStore,
    database: DocumentDatabase,
}

impl TestContext {
    fn new() -> Self {
        let store = MemoryStore::new();
        let database = DocumentDatabase::new(Arc::new(store.clone()));
        Self { store, database }
    }

    /// Twenty users `user00..user19`, aged 10 to 29, every other one active.
    async fn seed_users(&self) {
        let mut query = DatabaseQuery::create("users").with_fields(vec![
            Field::id("users"),
            users("name"),
            users("age"),
            users("active"),
        ]);
        for i in 0..20 {
            query = query.with_input(vec![
                QueryValue::bind(i),
                QueryValue::bind(format!("user{:02}", i)),
                QueryValue::bind(10 + i),
                QueryValue::bind(i % 2 == 0),
            ]);
        }
        self.database.query(&query).await.unwrap();
    }

    /// Pets owned by users 0 and 2; user 1 has none.
    async fn seed_pets(&self) {
        let query = DatabaseQuery::create("pets")
            .with_fields(vec![Field::id("pets"), pets("name"), pets("owner_id")])
            .with_input(vec![
                QueryValue::bind(100),
                QueryValue::bind("rex"),
                QueryValue::bind(0),
            ])
            .with_input(vec![
                QueryValue::bind(101),
                QueryValue::bind("tom"),
                QueryValue::bind(2),
            ]);
        self.database.query(&query).await.unwrap();
    }

    async fn rows(&self, query: &DatabaseQuery) -> Vec<ResultRow> {
        self.database.query(query).await.unwrap()
    }

    async fn scalar(&self, query: &DatabaseQuery) -> Bson {
        let rows = self.rows(query).await;
        assert_eq!(rows.len(), 1);
        rows[0].value(&Field::path(FieldKey::Aggregate, "users")).unwrap()
    }
}

fn users(name: &str) -> Field {
    Field::path(name, "users")
}

fn pets(name: &str) -> Field {
    Field::path(name, "pets")
}

fn names(rows: &[ResultRow], field: &Field) -> Vec<Option<String>> {
    rows.iter().map(|row| row.decode(field).unwrap()).collect()
}

fn young_users() -> DatabaseQuery {
    DatabaseQuery::read("users").with_filter(Filter::lt(users("age"), 13))
}

#[tokio::test]
async fn test_filtered_sorted_page() {
    let ctx = TestContext::new();
    ctx.seed_users().await;

    let query = DatabaseQuery::read("users")
        .with_filter(Filter::gte(users("age"), 18))
        .with_filter(Filter::eq(users("active"), true))
        .with_sort(Sort::ascending(users("name")))
        .with_limit(10)
        .with_offset(5);

    let rows = ctx.rows(&query).await;
    assert_eq!(names(&rows, &users("name")), vec![Some("user18".to_string())]);

    let operations = ctx.store.operations();
    assert_eq!(
        operations.last(),
        Some(&StoreOperation::Find(FindCommand {
            collection: "users".into(),
            filter: doc! {
                "$and": [{ "age": { "$gte": 18 } }, { "active": { "$eq": true } }]
            },
            sort: Some(doc! { "name": 1 }),
            skip: Some(5),
            limit: Some(10),
        }))
    );
}

#[tokio::test]
async fn test_contains_filters() {
    let ctx = TestContext::new();
    ctx.seed_users().await;

    let suffix = DatabaseQuery::read("users")
        .with_filter(Filter::contains(users("name"), ContainsLocation::Suffix, "7"))
        .with_sort(Sort::descending(users("name")));
    assert_eq!(
        names(&ctx.rows(&suffix).await, &users("name")),
        vec![Some("user17".to_string()), Some("user07".to_string())]
    );

    let either = DatabaseQuery::read("users")
        .with_filter(Filter::or(vec![
            Filter::eq(users("name"), "user03"),
            Filter::in_values(users("age"), [11, 12]),
        ]))
        .with_sort(Sort::ascending(users("age")));
    assert_eq!(
        names(&ctx.rows(&either).await, &users("name")),
        vec![
            Some("user01".to_string()),
            Some("user02".to_string()),
            Some("user03".to_string()),
        ]
    );
}

#[tokio::test]
async fn test_inner_join_drops_unmatched() {
    let ctx = TestContext::new();
    ctx.seed_users().await;
    ctx.seed_pets().await;

    let query = DatabaseQuery::read("users")
        .with_join(Join::inner("pets", pets("owner_id"), Field::id("users")))
        .with_filter(Filter::lt(users("age"), 13))
        .with_sort(Sort::ascending(users("name")))
        .with_fields(vec![users("name"), pets("name")]);

    let rows = ctx.rows(&query).await;
    assert_eq!(
        names(&rows, &users("name")),
        vec![Some("user00".to_string()), Some("user02".to_string())]
    );
    assert_eq!(
        names(&rows, &pets("name")),
        vec![Some("rex".to_string()), Some("tom".to_string())]
    );
}

#[tokio::test]
async fn test_left_join_keeps_parent() {
    let ctx = TestContext::new();
    ctx.seed_users().await;
    ctx.seed_pets().await;

    let query = DatabaseQuery::read("users")
        .with_join(
            Join::left("pets", Field::path("owner_id", "pet"), Field::id("users")).with_alias("pet"),
        )
        .with_filter(Filter::lt(users("age"), 13))
        .with_sort(Sort::ascending(users("name")))
        .with_fields(vec![users("name"), Field::path("name", "pet")]);

    let rows = ctx.rows(&query).await;
    assert_eq!(rows.len(), 3);
    assert_eq!(
        names(&rows, &Field::path("name", "pet")),
        vec![Some("rex".to_string()), None, Some("tom".to_string())]
    );
    assert!(!rows[1].contains(&Field::path("name", "pet")));
    assert!(rows[1].contains(&users("name")));
}

#[tokio::test]
async fn test_delete_cardinality() {
    let ctx = TestContext::new();
    ctx.seed_users().await;

    let one = DatabaseQuery {
        action: QueryAction::Delete,
        ..young_users().with_limit(1)
    };
    assert_eq!(ctx.scalar(&one).await, Bson::Int64(1));
    assert_eq!(ctx.store.documents("users").len(), 19);

    let all = DatabaseQuery {
        action: QueryAction::Delete,
        ..young_users()
    };
    assert_eq!(ctx.scalar(&all).await, Bson::Int64(2));
    assert_eq!(ctx.store.documents("users").len(), 17);

    let operations = ctx.store.operations().len();
    let two = DatabaseQuery::delete("users").with_limit(2);
    assert!(matches!(
        ctx.database.query(&two).await,
        Err(Error::UnsupportedCustomLimit)
    ));
    assert_eq!(ctx.store.operations().len(), operations);
    assert_eq!(ctx.store.documents("users").len(), 17);
}

#[tokio::test]
async fn test_update_reports_modified() {
    let ctx = TestContext::new();
    ctx.seed_users().await;

    let query = DatabaseQuery::update("users")
        .with_filter(Filter::lt(users("age"), 13))
        .with_fields(vec![users("active")])
        .with_input(vec![QueryValue::bind(false)]);
    // user01 is already inactive
    assert_eq!(ctx.scalar(&query).await, Bson::Int64(2));

    let inactive = DatabaseQuery::aggregate(
        "users",
        Aggregate::field(Field::id("users"), AggregateMethod::Count),
    )
    .with_filter(Filter::eq(users("active"), false));
    assert_eq!(ctx.scalar(&inactive).await, Bson::Int64(12));
}

#[tokio::test]
async fn test_aggregates() {
    let ctx = TestContext::new();
    ctx.seed_users().await;
    ctx.seed_pets().await;

    let aggregate = |method: AggregateMethod| {
        DatabaseQuery::aggregate("users", Aggregate::field(users("age"), method))
            .with_filter(Filter::lt(users("age"), 13))
    };

    assert_eq!(ctx.scalar(&aggregate(AggregateMethod::Count)).await, Bson::Int64(3));
    assert_eq!(ctx.scalar(&aggregate(AggregateMethod::Sum)).await, Bson::Int32(33));
    assert_eq!(ctx.scalar(&aggregate(AggregateMethod::Average)).await, Bson::Double(11.0));
    assert_eq!(ctx.scalar(&aggregate(AggregateMethod::Minimum)).await, Bson::Int32(10));
    assert_eq!(ctx.scalar(&aggregate(AggregateMethod::Maximum)).await, Bson::Int32(12));

    let nothing = DatabaseQuery::aggregate(
        "users",
        Aggregate::field(users("age"), AggregateMethod::Maximum),
    )
    .with_filter(Filter::gt(users("age"), 100));
    assert_eq!(ctx.scalar(&nothing).await, Bson::Null);

    let joined = aggregate(AggregateMethod::Count).with_join(Join::inner(
        "pets",
        pets("owner_id"),
        Field::id("users"),
    ));
    assert_eq!(ctx.scalar(&joined).await, Bson::Int64(2));
}

#[tokio::test]
async fn test_unique_index_schema() {
    let ctx = TestContext::new();
    let schema = DatabaseSchema::new(SchemaAction::Create, "users")
        .with_constraint(SchemaConstraint::unique(vec!["name".into()]));

    ctx.database.execute_schema(&schema).await.unwrap();

    assert_eq!(
        ctx.store.operations(),
        vec![StoreOperation::CreateIndexes(CreateIndexes {
            collection: "users".into(),
            indexes: vec![IndexModel {
                name: "unique".into(),
                keys: doc! { "name": 1 },
                unique: true,
            }],
        })]
    );

    let insert = DatabaseQuery::create("users")
        .with_field(users("name"))
        .with_input(vec![QueryValue::bind("alice")]);
    ctx.database.query(&insert).await.unwrap();
    assert!(matches!(
        ctx.database.query(&insert).await,
        Err(Error::Client(_))
    ));
    assert_eq!(ctx.store.documents("users").len(), 1);
}

#[tokio::test]
async fn test_schema_delete_drops_collection() {
    let ctx = TestContext::new();
    ctx.seed_users().await;

    ctx.database
        .execute_schema(&DatabaseSchema::new(SchemaAction::Delete, "users"))
        .await
        .unwrap();
    assert!(ctx.store.documents("users").is_empty());
}

#[tokio::test]
async fn test_compile_failure_sends_nothing() {
    let ctx = TestContext::new();

    let failing = vec![
        DatabaseQuery::read("users").with_filter(Filter::Custom(CustomFilter::Opaque(
            "name ILIKE 'a%'".into(),
        ))),
        DatabaseQuery::read("users").with_sort(Sort::Custom("RANDOM()".into())),
        DatabaseQuery::read("users").with_join(Join::Custom("LATERAL".into())),
        DatabaseQuery::create("users")
            .with_field(users("name"))
            .with_input(vec![QueryValue::Default]),
        DatabaseQuery::aggregate("users", Aggregate::Custom("median".into())),
    ];

    for query in &failing {
        assert!(ctx.database.query(query).await.is_err());
    }
    assert!(ctx.store.operations().is_empty());
}

#[tokio::test]
async fn test_transaction_rolls_back_on_error() {
    let ctx = TestContext::new();
    ctx.seed_users().await;

    let result: Result<(), Error> = ctx
        .database
        .transaction(|tx| async move {
            tx.query(&DatabaseQuery::delete("users")).await?;
            tx.query(&DatabaseQuery::read("users").with_sort(Sort::Custom("?".into())))
                .await?;
            Ok(())
        })
        .await;

    assert!(matches!(result, Err(Error::UnsupportedCustomSort)));
    assert_eq!(ctx.store.documents("users").len(), 20);
    assert_eq!(
        ctx.store.operations().last(),
        Some(&StoreOperation::AbortTransaction)
    );
}

#[tokio::test]
async fn test_transaction_commits() {
    let ctx = TestContext::new();
    ctx.seed_users().await;

    let deleted = ctx
        .database
        .transaction(|tx| async move {
            let rows = tx.query(&DatabaseQuery::delete("users")).await?;
            rows[0].decode::<i64>(&Field::path(FieldKey::Aggregate, "users"))
        })
        .await
        .unwrap();

    assert_eq!(deleted, 20);
    assert!(ctx.store.documents("users").is_empty());
}

/// Store that acknowledges one insert fewer than it received.
struct ShortAckStore {
    inner: MemoryStore,
}

#[async_trait]
impl DocumentStore for ShortAckStore {
    fn as_any(&self) -> &dyn Any {
        self
    }

    async fn find(
        &self,
        command: FindCommand,
        on_document: &mut (dyn FnMut(Document) + Send),
    ) -> Result<(), Error> {
        self.inner.find(command, on_document).await
    }

    async fn aggregate(
        &self,
        command: AggregateCommand,
        on_document: &mut (dyn FnMut(Document) + Send),
    ) -> Result<(), Error> {
        self.inner.aggregate(command, on_document).await
    }

    async fn insert_many(&self, command: InsertCommand) -> Result<InsertReply, Error> {
        let reply = self.inner.insert_many(command).await?;
        Ok(InsertReply {
            inserted: reply.inserted.saturating_sub(1),
        })
    }

    async fn update(&self, command: UpdateCommand) -> Result<UpdateReply, Error> {
        self.inner.update(command).await
    }

    async fn delete(&self, command: DeleteCommand) -> Result<DeleteReply, Error> {
        self.inner.delete(command).await
    }

    async fn count(&self, command: CountCommand) -> Result<u64, Error> {
        self.inner.count(command).await
    }

    async fn create_indexes(&self, command: CreateIndexes) -> Result<(), Error> {
        self.inner.create_indexes(command).await
    }

    async fn drop_collection(&self, collection: &str) -> Result<(), Error> {
        self.inner.drop_collection(collection).await
    }

    async fn start_transaction(&self) -> Result<StoreTransaction, Error> {
        self.inner.start_transaction().await
    }
}

#[tokio::test]
async fn test_insert_ack_mismatch() {
    let database = DocumentDatabase::new(Arc::new(ShortAckStore {
        inner: MemoryStore::new(),
    }));

    let query = DatabaseQuery::create("users")
        .with_field(users("name"))
        .with_input(vec![QueryValue::bind("a")])
        .with_input(vec![QueryValue::bind("b")])
        .with_input(vec![QueryValue::bind("c")]);

    assert!(matches!(
        database.query(&query).await,
        Err(Error::InsertFailed {
            expected: 3,
            acknowledged: 2
        })
    ));
}

#[tokio::test]
async fn test_require_store_mismatch() {
    let database = DocumentDatabase::new(Arc::new(ShortAckStore {
        inner: MemoryStore::new(),
    }));
    assert!(require_store::<ShortAckStore>(&database).is_ok());
    assert!(matches!(
        require_store::<MemoryStore>(&database),
        Err(Error::NotMongoTarget)
    ));
}

#[tokio::test]
async fn test_delete_one_through_store() {
    let ctx = TestContext::new();
    ctx.seed_users().await;

    ctx.database
        .query(&DatabaseQuery::delete("users").with_limit(1))
        .await
        .unwrap();

    assert_eq!(
        ctx.store.operations().last(),
        Some(&StoreOperation::Delete(DeleteCommand {
            collection: "users".into(),
            filter: doc! {},
            limit: DeleteLimit::One,
        }))
    );
}
