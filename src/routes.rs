// Copyright 2023 Remi Bernotavicius

use crate::database::Database;
use crate::error::{Error, Result};
use crate::recipes::recipe_count;
use axum::extract::rejection::{JsonRejection, PathRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::routing::{delete, get};
use axum::{Json, Router};
use serde::Serialize;

mod meal_plans;
mod recipes;

const NOT_FOUND_MESSAGE: &str = "The requested URL was not found on the server.";

#[derive(Debug, Serialize)]
pub struct Message {
    pub message: &'static str,
}

pub fn router(database: Database) -> Router {
    Router::new()
        .route("/api/recipes", get(recipes::list).post(recipes::create))
        .route("/api/recipes/:id", get(recipes::show).delete(recipes::remove))
        .route("/api/recipe-tags", get(recipes::tags))
        .route(
            "/api/meal-plans",
            get(meal_plans::list).post(meal_plans::create),
        )
        .route("/api/meal-plans/:id", delete(meal_plans::remove))
        .route("/api/statistics", get(statistics))
        .fallback(not_found)
        .with_state(database)
}

async fn statistics(State(database): State<Database>) -> Result<Json<i64>> {
    Ok(Json(database.run(recipe_count).await?))
}

async fn not_found() -> Error {
    Error::not_found(NOT_FOUND_MESSAGE)
}

/// Malformed bodies are the client's fault and get the same envelope as any other bad input.
fn json_body<T>(body: std::result::Result<Json<T>, JsonRejection>) -> Result<T> {
    body.map(|Json(body)| body)
        .map_err(|rejection| Error::validation(rejection.body_text()))
}

fn query_params<T>(params: std::result::Result<Query<T>, QueryRejection>) -> Result<T> {
    params
        .map(|Query(params)| params)
        .map_err(|rejection| Error::validation(rejection.body_text()))
}

/// An id segment that isn't a number can't name anything, so it is just another missing page.
fn path_id<T>(id: std::result::Result<Path<T>, PathRejection>) -> Result<T> {
    id.map(|Path(id)| id).map_err(|rejection| {
        log::debug!("unusable path: {rejection}");
        Error::not_found(NOT_FOUND_MESSAGE)
    })
}

#[cfg(test)]
struct TestApp {
    router: Router,
    _dir: tempfile::TempDir,
}

#[cfg(test)]
impl TestApp {
    fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let database = Database::open(dir.path().join("recipes.sqlite")).unwrap();
        Self {
            router: router(database),
            _dir: dir,
        }
    }

    async fn send(
        &self,
        method: axum::http::Method,
        uri: &str,
        body: Option<String>,
    ) -> (axum::http::StatusCode, serde_json::Value) {
        use axum::body::Body;
        use axum::http::{header, Request};
        use tower::ServiceExt as _;

        let request = Request::builder().method(method).uri(uri);
        let request = match body {
            Some(body) => request
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body)),
            None => request.body(Body::empty()),
        }
        .unwrap();

        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    async fn get(&self, uri: &str) -> (axum::http::StatusCode, serde_json::Value) {
        self.send(axum::http::Method::GET, uri, None).await
    }

    async fn post(
        &self,
        uri: &str,
        body: serde_json::Value,
    ) -> (axum::http::StatusCode, serde_json::Value) {
        self.send(axum::http::Method::POST, uri, Some(body.to_string()))
            .await
    }

    async fn delete(&self, uri: &str) -> (axum::http::StatusCode, serde_json::Value) {
        self.send(axum::http::Method::DELETE, uri, None).await
    }

    async fn create_recipe(&self, body: serde_json::Value) -> i64 {
        let (status, created) = self.post("/api/recipes", body).await;
        assert_eq!(status, axum::http::StatusCode::CREATED, "{created}");
        created["id"].as_i64().unwrap()
    }
}

#[tokio::test]
async fn recipe_lifecycle() {
    use axum::http::StatusCode;
    use serde_json::json;

    let app = TestApp::new();
    let (status, created) = app
        .post(
            "/api/recipes",
            json!({
                "name": "Lentil Soup",
                "category": "dinner",
                "servings": 4,
                "instructions": ["rinse lentils", "simmer"],
                "calories_per_serving": 320.0,
                "ingredients": [
                    {"name": "lentils", "amount": 1.5, "unit": "cup"},
                    {"name": "carrot", "original_text": "2 carrots, diced"}
                ],
                "recipe_categories": ["vegan", "soup"]
            }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(created["message"], "Recipe created successfully");
    let id = created["id"].as_i64().unwrap();

    let (status, recipe) = app.get(&format!("/api/recipes/{id}")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(recipe["name"], "Lentil Soup");
    assert_eq!(recipe["category"], "dinner");
    assert_eq!(recipe["instructions"], json!(["rinse lentils", "simmer"]));
    assert_eq!(recipe["recipe_categories"], json!(["vegan", "soup"]));
    assert_eq!(recipe["ingredients"][0]["name"], "lentils");
    assert_eq!(recipe["ingredients"][1]["original_text"], "2 carrots, diced");

    assert_eq!(app.get("/api/statistics").await.1, json!(1));

    let (status, deleted) = app.delete(&format!("/api/recipes/{id}")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(deleted, json!({"message": "Recipe deleted successfully"}));

    let missing = json!({"error": "Not Found", "message": "The recipe doesn't exist."});
    assert_eq!(
        app.get(&format!("/api/recipes/{id}")).await,
        (StatusCode::NOT_FOUND, missing.clone())
    );
    assert_eq!(
        app.delete(&format!("/api/recipes/{id}")).await,
        (StatusCode::NOT_FOUND, missing)
    );
    assert_eq!(app.get("/api/statistics").await.1, json!(0));
}

#[tokio::test]
async fn invalid_recipes_are_not_stored() {
    use axum::http::{Method, StatusCode};
    use serde_json::json;

    let app = TestApp::new();

    let (status, body) = app.post("/api/recipes", json!({"servings": 2})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body, json!({"error": "Missing field: name"}));

    let (status, body) = app
        .post("/api/recipes", json!({"name": "Waffles", "category": "brunch"}))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Wrong category");
    assert_eq!(
        body["valid_categories"],
        json!(["breakfast", "lunch", "dinner", "snack"])
    );

    let (status, body) = app
        .send(Method::POST, "/api/recipes", Some("{not json".into()))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].is_string());

    assert_eq!(app.get("/api/statistics").await.1, json!(0));
}

#[tokio::test]
async fn listing_filters_and_pages() {
    use axum::http::StatusCode;
    use serde_json::json;

    let app = TestApp::new();
    for i in 0..25 {
        let category = if i % 5 == 0 { "dinner" } else { "lunch" };
        app.create_recipe(json!({"name": format!("Recipe {i}"), "category": category}))
            .await;
    }

    let (status, dinners) = app.get("/api/recipes?category=dinner").await;
    assert_eq!(status, StatusCode::OK);
    let dinners = dinners.as_array().unwrap();
    assert_eq!(dinners.len(), 5);
    assert!(dinners.iter().all(|r| r["category"] == "dinner"));
    assert_eq!(dinners[0]["name"], "Recipe 20");

    let (_, page) = app.get("/api/recipes?page=1&per_page=500").await;
    assert_eq!(page["per_page"], 100);
    assert_eq!(page["total"], 25);
    assert_eq!(page["total_pages"], 1);
    assert_eq!(page["recipes"].as_array().unwrap().len(), 25);

    let (_, page) = app.get("/api/recipes?page=99&per_page=10").await;
    assert_eq!(page["page"], 3);
    assert_eq!(page["total_pages"], 3);
    assert_eq!(page["recipes"].as_array().unwrap().len(), 5);
    assert_eq!(page["recipes"][4]["name"], "Recipe 0");

    let (_, page) = app.get("/api/recipes?page=2").await;
    assert_eq!(page["per_page"], 20);
    assert_eq!(page["recipes"].as_array().unwrap().len(), 5);

    let (_, page) = app.get("/api/recipes?page=1&search=recipe%202").await;
    let names: Vec<_> = page["recipes"]
        .as_array()
        .unwrap()
        .iter()
        .map(|r| r["name"].as_str().unwrap())
        .collect();
    assert_eq!(names, vec!["Recipe 24", "Recipe 23", "Recipe 22", "Recipe 21", "Recipe 20", "Recipe 2"]);

    let (status, body) = app.get("/api/recipes?category=brunch").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Wrong category");

    let (status, _) = app.get("/api/recipes?page=first").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn tag_filter_and_tag_listing() {
    use serde_json::json;

    let app = TestApp::new();
    app.create_recipe(json!({"name": "Chili", "recipe_categories": ["vegan", "spicy", "vegan"]}))
        .await;
    app.create_recipe(json!({"name": "Omelette", "recipe_categories": ["quick"]}))
        .await;

    let (_, page) = app.get("/api/recipes?tag=vegan&page=1").await;
    assert_eq!(page["total"], 1);
    assert_eq!(page["recipes"].as_array().unwrap().len(), 1);
    assert_eq!(page["recipes"][0]["name"], "Chili");

    let (_, tags) = app.get("/api/recipe-tags").await;
    assert_eq!(tags, json!(["quick", "spicy", "vegan"]));
}

#[tokio::test]
async fn meal_plan_day() {
    use axum::http::StatusCode;
    use serde_json::json;

    let app = TestApp::new();
    let oats = app
        .create_recipe(json!({
            "name": "Oats",
            "category": "breakfast",
            "calories_per_serving": 300.0,
            "protein_per_serving": 15.0,
            "fat_per_serving": 7.5,
            "carbs_per_serving": 30.0
        }))
        .await;
    let salad = app
        .create_recipe(json!({
            "name": "Salad",
            "category": "lunch",
            "calories_per_serving": 300.0,
            "protein_per_serving": 15.0,
            "fat_per_serving": 7.5,
            "carbs_per_serving": 30.0
        }))
        .await;

    let (status, created) = app
        .post(
            "/api/meal-plans",
            json!({"date": "2024-01-01", "meal_type": "lunch", "recipe_id": salad, "servings": 2}),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(created["message"], "Meal plan created successfully");
    assert_eq!(created["meal_type"], "lunch");
    assert_eq!(created["servings"], 2.0);

    let (_, created) = app
        .post(
            "/api/meal-plans",
            json!({"date": "2024-01-01", "meal_type": "breakfast", "recipe_id": oats}),
        )
        .await;
    assert_eq!(created["servings"], 1.0);

    let (status, day) = app.get("/api/meal-plans?date=2024-01-01").await;
    assert_eq!(status, StatusCode::OK);
    let day = day.as_array().unwrap();
    assert_eq!(day.len(), 3);
    assert_eq!(day[0]["meal_type"], "breakfast");
    assert_eq!(day[0]["recipe_name"], "Oats");
    assert_eq!(day[1]["meal_type"], "lunch");
    assert_eq!(day[1]["calories"], 600.0);
    assert_eq!(
        day[2],
        json!({"calories": 900.0, "protein": 45.0, "fat": 22.5, "carbs": 90.0})
    );

    let (_, other_day) = app.get("/api/meal-plans?date=2024-01-02").await;
    assert_eq!(other_day.as_array().unwrap().len(), 1);

    let plan_id = day[0]["id"].as_i64().unwrap();
    let (status, deleted) = app.delete(&format!("/api/meal-plans/{plan_id}")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(deleted, json!({"message": "Meal plan deleted successfully"}));
    assert_eq!(
        app.get("/api/meal-plans?date=2024-01-01").await.1[1],
        json!({"calories": 600.0, "protein": 30.0, "fat": 15.0, "carbs": 60.0})
    );
}

#[tokio::test]
async fn invalid_date_is_an_empty_day() {
    use axum::http::StatusCode;
    use serde_json::json;

    let app = TestApp::new();
    let (status, body) = app.get("/api/meal-plans?date=01/02/2024").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(
        body,
        json!([{"calories": 0.0, "protein": 0.0, "fat": 0.0, "carbs": 0.0}])
    );

    let (status, today) = app.get("/api/meal-plans").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(today.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn rejected_meal_plans_are_not_stored() {
    use axum::http::StatusCode;
    use serde_json::json;

    let app = TestApp::new();
    let (status, body) = app
        .post(
            "/api/meal-plans",
            json!({"date": "2024-01-01", "meal_type": "lunch", "recipe_id": 41}),
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(
        body,
        json!({"error": "Not Found", "message": "Recipe not found"})
    );

    let (status, body) = app
        .post("/api/meal-plans", json!({"date": "2024-01-01", "recipe_id": 41}))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body, json!({"error": "Missing field: meal_type"}));

    let recipe = app.create_recipe(json!({"name": "Toast"})).await;
    let (status, _) = app
        .post(
            "/api/meal-plans",
            json!({"date": "2024-01-01", "meal_type": "elevenses", "recipe_id": recipe}),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (_, day) = app.get("/api/meal-plans?date=2024-01-01").await;
    assert_eq!(day.as_array().unwrap().len(), 1);

    let (status, body) = app.delete("/api/meal-plans/999").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["message"], "Meal plan not found");
}

#[tokio::test]
async fn unknown_paths_are_not_found() {
    use axum::http::StatusCode;

    let app = TestApp::new();
    for uri in ["/api/nothing-here", "/api/recipes/abc", "/api/meal-plans/1.5"] {
        let (status, body) = if uri.starts_with("/api/meal-plans") {
            app.delete(uri).await
        } else {
            app.get(uri).await
        };
        assert_eq!(status, StatusCode::NOT_FOUND, "{uri}");
        assert_eq!(body["error"], "Not Found", "{uri}");
    }
}
