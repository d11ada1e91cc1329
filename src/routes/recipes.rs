// Copyright 2023 Remi Bernotavicius

use super::{json_body, path_id, query_params, Message};
use crate::database::models::RecipeId;
use crate::database::Database;
use crate::error::Result;
use crate::recipes::{
    create_recipe, delete_recipe, get_recipe, list_recipes, recipe_tags, NewRecipeRequest,
    PageRequest, RecipeDetail, RecipeFilter, RecipeListParams, RecipeListing,
};
use axum::extract::rejection::{JsonRejection, PathRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct RecipeCreated {
    pub id: RecipeId,
    pub message: &'static str,
}

pub async fn list(
    State(database): State<Database>,
    params: std::result::Result<Query<RecipeListParams>, QueryRejection>,
) -> Result<Json<RecipeListing>> {
    let params = query_params(params)?;
    let filter = RecipeFilter::from_params(&params)?;
    let page = PageRequest::from_params(&params)?;

    let listing = database
        .run(move |conn| list_recipes(conn, &filter, page))
        .await?;
    Ok(Json(listing))
}

pub async fn show(
    State(database): State<Database>,
    id: std::result::Result<Path<RecipeId>, PathRejection>,
) -> Result<Json<RecipeDetail>> {
    let id = path_id(id)?;
    let recipe = database.run(move |conn| get_recipe(conn, id)).await?;
    Ok(Json(recipe))
}

pub async fn create(
    State(database): State<Database>,
    body: std::result::Result<Json<NewRecipeRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<RecipeCreated>)> {
    let recipe = json_body(body)?.validate()?;
    let id = database
        .run(move |conn| create_recipe(conn, recipe))
        .await?;
    Ok((
        StatusCode::CREATED,
        Json(RecipeCreated {
            id,
            message: "Recipe created successfully",
        }),
    ))
}

pub async fn remove(
    State(database): State<Database>,
    id: std::result::Result<Path<RecipeId>, PathRejection>,
) -> Result<Json<Message>> {
    let id = path_id(id)?;
    database.run(move |conn| delete_recipe(conn, id)).await?;
    Ok(Json(Message {
        message: "Recipe deleted successfully",
    }))
}

pub async fn tags(State(database): State<Database>) -> Result<Json<Vec<String>>> {
    Ok(Json(database.run(recipe_tags).await?))
}
