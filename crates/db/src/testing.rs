use common::config::Config;
use migration::MigratorTrait;
use sea_orm::{Database, DatabaseConnection};

pub(crate) async fn create_database() -> DatabaseConnection {
    let config = Config::for_tests();

    let db = Database::connect(&config.database.url)
        .await
        .expect("unable to create test database");

    migration::Migrator::up(&db, None)
        .await
        .expect("unable to run migrations");

    db
}
