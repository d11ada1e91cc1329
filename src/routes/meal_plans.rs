// Copyright 2023 Remi Bernotavicius

use super::{json_body, path_id, query_params, Message};
use crate::database::models::{MealPlan, MealPlanId};
use crate::database::Database;
use crate::error::Result;
use crate::meal_plan::{
    add_meal_plan, delete_meal_plan, get_meal_plans, parse_date, summarize, today,
    NewMealPlanRequest,
};
use axum::extract::rejection::{JsonRejection, PathRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse as _, Response};
use axum::Json;
use serde::{Deserialize, Serialize};

#[derive(Debug, Default, Deserialize)]
pub struct MealPlanParams {
    pub date: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct MealPlanCreated {
    #[serde(flatten)]
    pub plan: MealPlan,
    pub message: &'static str,
}

pub async fn list(
    State(database): State<Database>,
    params: std::result::Result<Query<MealPlanParams>, QueryRejection>,
) -> Result<Response> {
    let params = query_params(params)?;
    let date = match params.date.as_deref().filter(|d| !d.is_empty()) {
        None => today(),
        Some(date) => match parse_date(date) {
            Ok(date) => date,
            Err(error) => {
                // still answer with a well-formed day, it is just empty
                log::warn!("meal plans requested for {date:?}: {error}");
                return Ok((StatusCode::BAD_REQUEST, Json(summarize(vec![]))).into_response());
            }
        },
    };

    let records = database
        .run(move |conn| get_meal_plans(conn, date))
        .await?;
    Ok(Json(records).into_response())
}

pub async fn create(
    State(database): State<Database>,
    body: std::result::Result<Json<NewMealPlanRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<MealPlanCreated>)> {
    let new_plan = json_body(body)?.validate()?;
    let plan = database
        .run(move |conn| add_meal_plan(conn, new_plan))
        .await?;
    Ok((
        StatusCode::CREATED,
        Json(MealPlanCreated {
            plan,
            message: "Meal plan created successfully",
        }),
    ))
}

pub async fn remove(
    State(database): State<Database>,
    id: std::result::Result<Path<MealPlanId>, PathRejection>,
) -> Result<Json<Message>> {
    let id = path_id(id)?;
    database.run(move |conn| delete_meal_plan(conn, id)).await?;
    Ok(Json(Message {
        message: "Meal plan deleted successfully",
    }))
}
