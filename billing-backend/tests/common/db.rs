//! インメモリSQLiteのテスト用データベース

use migration::{Migrator, MigratorTrait};
use sea_orm::{ConnectOptions, Database, DatabaseConnection};

pub struct TestDatabase {
    pub connection: DatabaseConnection,
}

impl TestDatabase {
    pub async fn new() -> Self {
        let db = Self::without_schema().await;

        Migrator::up(&db.connection, None)
            .await
            .expect("run migrations");

        db
    }

    /// テーブルのない接続（すべてのクエリがエラーになる）
    pub async fn without_schema() -> Self {
        super::init_test_env();

        // インメモリDBは接続ごとに別物になるため、接続は1本に固定する
        let mut opt = ConnectOptions::new("sqlite::memory:".to_string());
        opt.max_connections(1)
            .min_connections(1)
            .sqlx_logging(false);

        let connection = Database::connect(opt).await.expect("connect sqlite");

        Self { connection }
    }
}
