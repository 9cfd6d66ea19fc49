pub mod build;

#[cfg(test)]
mod testing;

use std::error::Error;

use async_trait::async_trait;
pub use rust_decimal::Decimal;
pub use sea_orm::{
    sea_query, ActiveModelTrait, ActiveValue, ColumnTrait, ConnectionTrait, Database,
    DatabaseConnection, DatabaseTransaction, DbErr, EntityTrait, QueryFilter, QueryOrder,
    QuerySelect, QueryTrait, Select, StatementBuilder, TransactionError, TransactionTrait,
};
pub use time::{OffsetDateTime, PrimitiveDateTime};

pub trait TransactionErrorExt<T, E> {
    /// Convert transaction [`Result`] into a [`Result`] with
    /// a custom error.
    fn into_raw_result(self) -> Result<T, E>;
}

impl<T, E> TransactionErrorExt<T, E> for Result<T, TransactionError<E>>
where
    E: Error + From<DbErr>,
{
    fn into_raw_result(self) -> Result<T, E> {
        match self {
            Ok(val) => Ok(val),
            Err(TransactionError::Connection(err)) => Err(err.into()),
            Err(TransactionError::Transaction(err)) => Err(err),
        }
    }
}

#[async_trait]
pub trait SelectExt {
    /// Check if at least one record that satisfies a query.
    async fn exists<C: ConnectionTrait + Send>(self, db: &C) -> Result<bool, DbErr>;
}

#[async_trait]
impl<T> SelectExt for T
where
    T: QueryTrait<QueryStatement = sea_query::SelectStatement> + Send,
{
    async fn exists<C: ConnectionTrait + Send>(self, db: &C) -> Result<bool, DbErr> {
        use sea_query::{Expr, Query};

        let mut query = self.into_query();

        // Fix failing tests with SQLite by returning at least some expr
        query.expr(1);

        let stmt = StatementBuilder::build(
            Query::select().expr(Expr::exists(query)),
            &db.get_database_backend(),
        );

        db.query_one(stmt).await?.unwrap().try_get_by_index(0)
    }
}

#[async_trait]
pub trait SelectSingleExt<E: EntityTrait> {
    /// Fetch at most one record, reporting an error if the query
    /// matched more than one row.
    ///
    /// Lookups that expect a unique match should prefer this over `one`,
    /// which silently narrows ambiguous result sets to the first row.
    async fn single<C: ConnectionTrait + Send>(self, db: &C) -> Result<Option<E::Model>, DbErr>;
}

#[async_trait]
impl<E> SelectSingleExt<E> for Select<E>
where
    E: EntityTrait + Send,
{
    async fn single<C: ConnectionTrait + Send>(self, db: &C) -> Result<Option<E::Model>, DbErr> {
        let mut models = self.limit(2).all(db).await?;

        if models.len() > 1 {
            return Err(DbErr::Custom(String::from(
                "multiple rows returned for a single-row query",
            )));
        }

        Ok(models.pop())
    }
}

#[cfg(test)]
mod tests {
    use sea_orm::{
        prelude::*,
        sea_query::{self, ColumnDef, Iden, Table},
        Database, DatabaseConnection, QuerySelect,
    };

    use crate::{SelectExt, SelectSingleExt};

    #[derive(Iden)]
    enum TestVals {
        Table,
        Id,
    }

    #[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
    #[sea_orm(table_name = "test_vals")]
    pub struct Model {
        #[sea_orm(primary_key)]
        pub id: i32,
    }

    #[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
    pub enum Relation {}

    impl ActiveModelBehavior for ActiveModel {}

    async fn create_test_table() -> DatabaseConnection {
        let db = Database::connect("sqlite::memory:")
            .await
            .expect("unable to create test database");

        let table = Table::create()
            .table(TestVals::Table)
            .col(
                ColumnDef::new(TestVals::Id)
                    .integer()
                    .not_null()
                    .auto_increment()
                    .primary_key(),
            )
            .to_owned();

        let builder = db.get_database_backend();
        db.execute(builder.build(&table)).await.unwrap();

        db
    }

    async fn insert_row(db: &DatabaseConnection) {
        Entity::insert(<ActiveModel as std::default::Default>::default())
            .exec_without_returning(db)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn exists() {
        let db = create_test_table().await;

        let exists = Entity::find().select_only().exists(&db).await.unwrap();

        assert!(!exists);

        insert_row(&db).await;

        let exists = Entity::find().select_only().exists(&db).await.unwrap();

        assert!(exists);
    }

    #[tokio::test]
    async fn single() {
        let db = create_test_table().await;

        assert!(Entity::find().single(&db).await.unwrap().is_none());

        insert_row(&db).await;

        let model = Entity::find().single(&db).await.unwrap();

        assert_eq!(model.map(|val| val.id), Some(1));

        insert_row(&db).await;

        assert!(Entity::find().single(&db).await.is_err());

        let filtered = Entity::find()
            .filter(Column::Id.eq(2))
            .single(&db)
            .await
            .unwrap();

        assert_eq!(filtered.map(|val| val.id), Some(2));
    }
}
