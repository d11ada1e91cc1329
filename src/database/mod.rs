// Copyright 2023 Remi Bernotavicius

use crate::error::{Error, Result};
use diesel::connection::SimpleConnection as _;
use diesel::r2d2::{ConnectionManager, CustomizeConnection, Pool};
use diesel_migrations::{embed_migrations, EmbeddedMigrations, MigrationHarness};
use std::path::Path;

pub mod models;
pub mod schema;

pub type Connection = diesel::sqlite::SqliteConnection;

pub const MIGRATIONS: EmbeddedMigrations = embed_migrations!();

/// Per-connection settings for pooled connections. Writers wait up to five seconds for the lock
/// instead of failing with `SQLITE_BUSY`, and SQLite only enforces `REFERENCES` clauses when
/// asked to.
#[derive(Debug)]
struct ConnectionOptions;

impl CustomizeConnection<Connection, diesel::r2d2::Error> for ConnectionOptions {
    fn on_acquire(&self, conn: &mut Connection) -> std::result::Result<(), diesel::r2d2::Error> {
        conn.batch_execute(
            "PRAGMA busy_timeout = 5000; PRAGMA journal_mode = WAL; PRAGMA foreign_keys = ON;",
        )
        .map_err(diesel::r2d2::Error::QueryError)
    }
}

fn run_migrations(conn: &mut Connection) -> Result<()> {
    conn.run_pending_migrations(MIGRATIONS)
        .map_err(|e| Error::Migration(e.to_string()))?;
    Ok(())
}

/// Handle to the recipe store. Each unit of work checks out its own connection, which goes back
/// to the pool when the work returns, whether it succeeded or not.
#[derive(Clone)]
pub struct Database {
    pool: Pool<ConnectionManager<Connection>>,
}

impl Database {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let url = path
            .as_ref()
            .to_str()
            .ok_or_else(|| {
                diesel::ConnectionError::BadConnection(format!(
                    "non UTF-8 database path {:?}",
                    path.as_ref()
                ))
            })?;
        let pool = Pool::builder()
            .connection_customizer(Box::new(ConnectionOptions))
            .build(ConnectionManager::<Connection>::new(url))?;

        let mut conn = pool.get()?;
        run_migrations(&mut conn)?;
        log::info!("opened recipe database at {url}");

        Ok(Self { pool })
    }

    /// Runs `body` with a pooled connection on the blocking thread pool.
    pub async fn run<T, F>(&self, body: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = pool.get()?;
            body(&mut conn)
        })
        .await?
    }

    /// Blocking variant of [`Database::run`] for callers outside the runtime.
    pub fn run_blocking<T>(&self, body: impl FnOnce(&mut Connection) -> Result<T>) -> Result<T> {
        let mut conn = self.pool.get()?;
        body(&mut conn)
    }
}

#[cfg(test)]
pub fn in_memory() -> Connection {
    use diesel::prelude::Connection as _;

    let mut connection = Connection::establish(":memory:").unwrap();
    connection.batch_execute("PRAGMA foreign_keys = ON;").unwrap();
    run_migrations(&mut connection).unwrap();
    connection
}

#[test]
fn migrations() {
    let mut conn = in_memory();
    let reverted = conn.revert_all_migrations(MIGRATIONS).unwrap();
    assert_eq!(reverted.len(), 1);
    let applied = conn.run_pending_migrations(MIGRATIONS).unwrap();
    assert_eq!(applied.len(), 1);
}

#[test]
fn foreign_keys_are_enforced() {
    use diesel::RunQueryDsl as _;

    let mut conn = in_memory();
    let result = diesel::sql_query(
        "INSERT INTO ingredients (recipe_id, name) VALUES (42, 'orphaned flour')",
    )
    .execute(&mut conn);
    assert!(result.is_err());
}

#[test]
fn pooled_connections_enforce_foreign_keys() {
    use diesel::RunQueryDsl as _;

    let dir = tempfile::tempdir().unwrap();
    let database = Database::open(dir.path().join("recipes.sqlite")).unwrap();
    let result = database.run_blocking(|conn| {
        Ok(diesel::sql_query(
            "INSERT INTO recipe_categories (recipe_id, category_name) VALUES (7, 'vegan')",
        )
        .execute(conn)?)
    });
    assert!(matches!(result, Err(Error::Database(_))));
}

#[test]
fn concurrent_writers_wait_for_each_other() {
    use crate::database::models::{MealCategory, NewMealPlan};
    use crate::meal_plan::{add_meal_plan, get_meal_plans, MealPlanRecord};
    use crate::recipes::{create_recipe, recipe_count, test_recipe};
    use maplit::btreeset;

    let dir = tempfile::tempdir().unwrap();
    let database = Database::open(dir.path().join("recipes.sqlite")).unwrap();
    let day = chrono::NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();

    let writers: Vec<_> = (0..4)
        .map(|writer| {
            let database = database.clone();
            std::thread::spawn(move || {
                for _ in 0..10 {
                    database
                        .run_blocking(|conn| {
                            let name = format!("writer {writer}");
                            let recipe_id =
                                create_recipe(conn, test_recipe(&name, None, 100.0, &["shared"]))?;
                            add_meal_plan(
                                conn,
                                NewMealPlan {
                                    date: day,
                                    meal_type: MealCategory::Dinner,
                                    recipe_id,
                                    servings: 1.0,
                                },
                            )
                        })
                        .unwrap();
                }
            })
        })
        .collect();
    for writer in writers {
        writer.join().unwrap();
    }

    assert_eq!(database.run_blocking(recipe_count).unwrap(), 40);
    let records = database
        .run_blocking(|conn| get_meal_plans(conn, day))
        .unwrap();
    assert_eq!(records.len(), 41);
    let names: std::collections::BTreeSet<_> = records
        .iter()
        .filter_map(|r| match r {
            MealPlanRecord::Meal(meal) => Some(meal.recipe_name.as_str()),
            MealPlanRecord::Totals(_) => None,
        })
        .collect();
    assert_eq!(
        names,
        btreeset! {"writer 0", "writer 1", "writer 2", "writer 3"}
    );
}
