// Copyright 2023 Remi Bernotavicius

use crate::database;
use crate::database::models::{
    MealCategory, MealPlan, MealPlanId, NewMealPlan, RecipeId, RecipeNutrition,
};
use crate::database::schema::{meal_plans, recipes};
use crate::error::{Error, Result};
use diesel::prelude::OptionalExtension as _;
use diesel::ExpressionMethods as _;
use diesel::QueryDsl as _;
use diesel::RunQueryDsl as _;
use diesel::SelectableHelper as _;
use serde::{Deserialize, Serialize};
use std::ops::AddAssign;

pub const DATE_FORMAT: &str = "%Y-%m-%d";

pub fn today() -> chrono::NaiveDate {
    chrono::Local::now().date_naive()
}

/// Parses a `YYYY-MM-DD` date, zero-padded and nothing else.
pub fn parse_date(date: &str) -> Result<chrono::NaiveDate> {
    let well_formed = date.len() == 10
        && date.bytes().enumerate().all(|(i, b)| match i {
            4 | 7 => b == b'-',
            _ => b.is_ascii_digit(),
        });
    well_formed
        .then(|| chrono::NaiveDate::parse_from_str(date, DATE_FORMAT).ok())
        .flatten()
        .ok_or_else(|| Error::validation("Invalid date format, expected YYYY-MM-DD"))
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct NutritionTotals {
    pub calories: f64,
    pub protein: f64,
    pub fat: f64,
    pub carbs: f64,
}

impl AddAssign for NutritionTotals {
    fn add_assign(&mut self, other: Self) {
        self.calories += other.calories;
        self.protein += other.protein;
        self.fat += other.fat;
        self.carbs += other.carbs;
    }
}

/// One scheduled meal with its recipe's nutrition scaled by the servings eaten.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MealPlanEntry {
    pub id: MealPlanId,
    pub date: chrono::NaiveDate,
    pub meal_type: MealCategory,
    pub recipe_id: RecipeId,
    pub servings: f64,
    pub recipe_name: String,
    pub calories_per_serving: f64,
    pub protein_per_serving: f64,
    pub fat_per_serving: f64,
    pub carbs_per_serving: f64,
    #[serde(flatten)]
    pub nutrition: NutritionTotals,
}

impl MealPlanEntry {
    fn new(plan: MealPlan, recipe: RecipeNutrition) -> Self {
        let nutrition = NutritionTotals {
            calories: recipe.calories_per_serving * plan.servings,
            protein: recipe.protein_per_serving * plan.servings,
            fat: recipe.fat_per_serving * plan.servings,
            carbs: recipe.carbs_per_serving * plan.servings,
        };
        Self {
            id: plan.id,
            date: plan.date,
            meal_type: plan.meal_type,
            recipe_id: plan.recipe_id,
            servings: plan.servings,
            recipe_name: recipe.name,
            calories_per_serving: recipe.calories_per_serving,
            protein_per_serving: recipe.protein_per_serving,
            fat_per_serving: recipe.fat_per_serving,
            carbs_per_serving: recipe.carbs_per_serving,
            nutrition,
        }
    }
}

/// A day's listing is every meal followed by a single totals record, which has no `id` or
/// `meal_type`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum MealPlanRecord {
    Meal(MealPlanEntry),
    Totals(NutritionTotals),
}

/// Orders the day's meals breakfast to snack and appends the totals.
pub fn summarize(mut rows: Vec<(MealPlan, RecipeNutrition)>) -> Vec<MealPlanRecord> {
    rows.sort_by_key(|(plan, _)| (plan.meal_type.rank(), plan.id));

    let mut totals = NutritionTotals::default();
    let mut records: Vec<_> = rows
        .into_iter()
        .map(|(plan, recipe)| {
            let entry = MealPlanEntry::new(plan, recipe);
            totals += entry.nutrition;
            MealPlanRecord::Meal(entry)
        })
        .collect();
    records.push(MealPlanRecord::Totals(totals));
    records
}

pub fn get_meal_plans(
    conn: &mut database::Connection,
    date: chrono::NaiveDate,
) -> Result<Vec<MealPlanRecord>> {
    let rows = meal_plans::table
        .inner_join(recipes::table)
        .filter(meal_plans::date.eq(date))
        .select((MealPlan::as_select(), RecipeNutrition::as_select()))
        .load::<(MealPlan, RecipeNutrition)>(conn)?;
    Ok(summarize(rows))
}

#[derive(Debug, Default, Deserialize)]
pub struct NewMealPlanRequest {
    pub date: Option<String>,
    pub meal_type: Option<String>,
    pub recipe_id: Option<RecipeId>,
    pub servings: Option<f64>,
}

impl NewMealPlanRequest {
    pub fn validate(self) -> Result<NewMealPlan> {
        let missing = |field: &str| Error::validation(format!("Missing field: {field}"));
        let date = self.date.ok_or_else(|| missing("date"))?;
        let meal_type = self.meal_type.ok_or_else(|| missing("meal_type"))?;
        let recipe_id = self.recipe_id.ok_or_else(|| missing("recipe_id"))?;

        let date = parse_date(&date)?;
        let meal_type = meal_type.parse::<MealCategory>().map_err(|_| {
            Error::validation(format!(
                "Invalid meal_type, expected one of: {}",
                MealCategory::names().join(", ")
            ))
        })?;
        let servings = match self.servings {
            None => 1.0,
            Some(s) if s.is_finite() && s > 0.0 => s,
            Some(_) => return Err(Error::validation("servings must be a positive number")),
        };

        Ok(NewMealPlan {
            date,
            meal_type,
            recipe_id,
            servings,
        })
    }
}

/// Schedules a recipe, provided it exists.
pub fn add_meal_plan(conn: &mut database::Connection, new_plan: NewMealPlan) -> Result<MealPlan> {
    let plan = conn.immediate_transaction::<_, Error, _>(|conn| {
        let recipe = recipes::table
            .find(new_plan.recipe_id)
            .select(recipes::id)
            .first::<RecipeId>(conn)
            .optional()?;
        if recipe.is_none() {
            return Err(Error::not_found("Recipe not found"));
        }

        Ok(diesel::insert_into(meal_plans::table)
            .values(&new_plan)
            .returning(MealPlan::as_returning())
            .get_result(conn)?)
    })?;

    log::info!(
        "scheduled recipe {} for {} on {}",
        plan.recipe_id,
        plan.meal_type,
        plan.date
    );
    Ok(plan)
}

pub fn delete_meal_plan(conn: &mut database::Connection, delete_id: MealPlanId) -> Result<()> {
    let deleted = diesel::delete(meal_plans::table.find(delete_id)).execute(conn)?;
    if deleted == 0 {
        return Err(Error::not_found("Meal plan not found"));
    }
    log::info!("deleted meal plan {delete_id}");
    Ok(())
}

#[cfg(test)]
fn date(s: &str) -> chrono::NaiveDate {
    parse_date(s).unwrap()
}

#[cfg(test)]
fn schedule(
    conn: &mut database::Connection,
    day: &str,
    meal_type: MealCategory,
    recipe_id: RecipeId,
    servings: f64,
) -> MealPlan {
    add_meal_plan(
        conn,
        NewMealPlan {
            date: date(day),
            meal_type,
            recipe_id,
            servings,
        },
    )
    .unwrap()
}

#[cfg(test)]
fn meal_plan_count(conn: &mut database::Connection) -> i64 {
    meal_plans::table.count().get_result(conn).unwrap()
}

#[test]
fn dates_must_be_strict() {
    assert_eq!(
        parse_date("2024-01-01").unwrap(),
        chrono::NaiveDate::from_ymd_opt(2024, 1, 1).unwrap()
    );
    for bad in [
        "",
        "2024-1-1",
        "2024-01-1",
        "01-01-2024",
        "2024/01/01",
        "2024-13-01",
        "2024-02-30",
        "2024-01-01T00:00",
        "tomorrow",
    ] {
        assert!(parse_date(bad).is_err(), "{bad:?} should be rejected");
    }
}

#[test]
fn summarize_orders_and_totals() {
    let plan = |id: i32, meal_type, servings| MealPlan {
        id: MealPlanId::from(id),
        date: date("2024-01-01"),
        meal_type,
        recipe_id: RecipeId::from(id),
        servings,
    };
    let recipe = |calories| RecipeNutrition {
        name: "something".into(),
        calories_per_serving: calories,
        protein_per_serving: 10.0,
        fat_per_serving: 5.0,
        carbs_per_serving: 20.0,
    };

    let records = summarize(vec![
        (plan(1, MealCategory::Snack, 1.0), recipe(100.0)),
        (plan(2, MealCategory::Dinner, 1.5), recipe(400.0)),
        (plan(3, MealCategory::Breakfast, 2.0), recipe(250.0)),
    ]);

    let order: Vec<_> = records
        .iter()
        .filter_map(|r| match r {
            MealPlanRecord::Meal(m) => Some(m.meal_type),
            MealPlanRecord::Totals(_) => None,
        })
        .collect();
    assert_eq!(
        order,
        vec![
            MealCategory::Breakfast,
            MealCategory::Dinner,
            MealCategory::Snack
        ]
    );
    assert_eq!(
        records.last(),
        Some(&MealPlanRecord::Totals(NutritionTotals {
            calories: 500.0 + 600.0 + 100.0,
            protein: 20.0 + 15.0 + 10.0,
            fat: 10.0 + 7.5 + 5.0,
            carbs: 40.0 + 30.0 + 20.0,
        }))
    );
}

#[test]
fn empty_day_is_just_totals() {
    assert_eq!(
        summarize(vec![]),
        vec![MealPlanRecord::Totals(NutritionTotals::default())]
    );
    let json = serde_json::to_value(summarize(vec![])).unwrap();
    assert_eq!(
        json,
        serde_json::json!([{"calories": 0.0, "protein": 0.0, "fat": 0.0, "carbs": 0.0}])
    );
}

#[test]
fn breakfast_and_lunch_for_a_day() {
    use crate::recipes::{create_recipe, test_recipe};

    let mut conn = database::in_memory();
    let oats = create_recipe(&mut conn, test_recipe("oats", Some("breakfast"), 200.0, &[])).unwrap();
    let pasta = create_recipe(&mut conn, test_recipe("pasta", Some("lunch"), 500.0, &[])).unwrap();

    schedule(&mut conn, "2024-01-01", MealCategory::Lunch, pasta, 1.0);
    schedule(&mut conn, "2024-01-01", MealCategory::Breakfast, oats, 2.0);
    schedule(&mut conn, "2024-01-02", MealCategory::Dinner, pasta, 3.0);

    let records = get_meal_plans(&mut conn, date("2024-01-01")).unwrap();
    assert_eq!(records.len(), 3);

    let MealPlanRecord::Meal(breakfast) = &records[0] else {
        panic!("expected a meal first");
    };
    assert_eq!(breakfast.meal_type, MealCategory::Breakfast);
    assert_eq!(breakfast.recipe_name, "oats");
    assert_eq!(breakfast.nutrition.calories, 400.0);

    let MealPlanRecord::Meal(lunch) = &records[1] else {
        panic!("expected a meal second");
    };
    assert_eq!(lunch.meal_type, MealCategory::Lunch);
    assert_eq!(lunch.nutrition.calories, 500.0);

    assert_eq!(
        records[2],
        MealPlanRecord::Totals(NutritionTotals {
            calories: 900.0,
            protein: 45.0,
            fat: 22.5,
            carbs: 90.0,
        })
    );

    let json = serde_json::to_value(&records).unwrap();
    assert_eq!(json[0]["date"], "2024-01-01");
    assert_eq!(json[0]["meal_type"], "breakfast");
    assert_eq!(json[0]["calories_per_serving"], 200.0);
    assert!(json[2].get("id").is_none());
    assert!(json[2].get("meal_type").is_none());
}

#[test]
fn adding_for_a_missing_recipe_changes_nothing() {
    let mut conn = database::in_memory();
    let before = meal_plan_count(&mut conn);
    let result = add_meal_plan(
        &mut conn,
        NewMealPlan {
            date: date("2024-01-01"),
            meal_type: MealCategory::Dinner,
            recipe_id: RecipeId::from(77),
            servings: 1.0,
        },
    );
    assert!(matches!(result, Err(Error::NotFound(ref m)) if m == "Recipe not found"));
    assert_eq!(meal_plan_count(&mut conn), before);
}

#[test]
fn delete_meal_plan_by_id() {
    use crate::recipes::{create_recipe, test_recipe};

    let mut conn = database::in_memory();
    let soup = create_recipe(&mut conn, test_recipe("soup", None, 300.0, &[])).unwrap();
    let plan = schedule(&mut conn, "2024-03-05", MealCategory::Dinner, soup, 1.0);

    delete_meal_plan(&mut conn, plan.id).unwrap();
    assert_eq!(meal_plan_count(&mut conn), 0);
    assert!(matches!(
        delete_meal_plan(&mut conn, plan.id),
        Err(Error::NotFound(ref m)) if m == "Meal plan not found"
    ));
}

#[test]
fn deleting_a_recipe_unschedules_it() {
    use crate::recipes::{create_recipe, delete_recipe, test_recipe};

    let mut conn = database::in_memory();
    let soup = create_recipe(&mut conn, test_recipe("soup", None, 300.0, &[])).unwrap();
    schedule(&mut conn, "2024-03-05", MealCategory::Dinner, soup, 1.0);

    delete_recipe(&mut conn, soup).unwrap();
    assert_eq!(meal_plan_count(&mut conn), 0);
}

#[test]
fn meal_plan_request_validation() {
    let request = |date: Option<&str>, meal_type: Option<&str>, recipe_id: Option<i32>| {
        NewMealPlanRequest {
            date: date.map(Into::into),
            meal_type: meal_type.map(Into::into),
            recipe_id: recipe_id.map(RecipeId::from),
            servings: None,
        }
    };
    let message = |r: NewMealPlanRequest| match r.validate() {
        Err(Error::Validation(m)) => m,
        other => panic!("unexpected {other:?}"),
    };

    assert_eq!(message(request(None, None, None)), "Missing field: date");
    assert_eq!(
        message(request(Some("2024-01-01"), None, None)),
        "Missing field: meal_type"
    );
    assert_eq!(
        message(request(Some("2024-01-01"), Some("lunch"), None)),
        "Missing field: recipe_id"
    );
    assert!(message(request(Some("01/01/2024"), Some("lunch"), Some(1))).contains("date"));
    assert!(message(request(Some("2024-01-01"), Some("brunch"), Some(1))).contains("meal_type"));

    let plan = request(Some("2024-01-01"), Some("lunch"), Some(1))
        .validate()
        .unwrap();
    assert_eq!(plan.servings, 1.0);
    assert_eq!(plan.meal_type, MealCategory::Lunch);

    let zero_servings = NewMealPlanRequest {
        servings: Some(0.0),
        ..request(Some("2024-01-01"), Some("lunch"), Some(1))
    };
    assert!(zero_servings.validate().is_err());
}
