// Copyright 2023 Remi Bernotavicius

use derive_more::{Display, From};
use diesel::associations::{Associations, Identifiable};
use diesel::backend::Backend;
use diesel::deserialize::{self, FromSql, FromSqlRow, Queryable};
use diesel::expression::{AsExpression, Selectable};
use diesel::prelude::Insertable;
use diesel::serialize::{self, IsNull, Output, ToSql};
use diesel::sql_types::Text;
use diesel::sqlite::Sqlite;
use diesel_derive_enum::DbEnum;
use diesel_derive_newtype::DieselNewType;
use serde::{Deserialize, Serialize};
use strum::{EnumIter, EnumString, IntoStaticStr};

#[derive(
    DieselNewType,
    Debug,
    Display,
    From,
    Hash,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Copy,
    Clone,
    Serialize,
    Deserialize,
)]
#[serde(transparent)]
pub struct RecipeId(i32);

#[derive(DieselNewType, Debug, Display, Hash, PartialEq, Eq, Copy, Clone, Serialize)]
#[serde(transparent)]
pub struct IngredientId(i32);

#[derive(DieselNewType, Debug, Display, Hash, PartialEq, Eq, Copy, Clone, Serialize)]
#[serde(transparent)]
pub struct RecipeCategoryId(i32);

#[derive(
    DieselNewType,
    Debug,
    Display,
    From,
    Hash,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Copy,
    Clone,
    Serialize,
    Deserialize,
)]
#[serde(transparent)]
pub struct MealPlanId(i32);

/// The fixed classification shared by `Recipe::category` and `MealPlan::meal_type`.
///
/// Not to be confused with the free-text tags kept in `recipe_categories`.
#[derive(
    Debug,
    Display,
    EnumIter,
    EnumString,
    IntoStaticStr,
    Hash,
    Copy,
    Clone,
    PartialEq,
    Eq,
    DbEnum,
    Serialize,
    Deserialize,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum MealCategory {
    #[display("breakfast")]
    Breakfast,
    #[display("lunch")]
    Lunch,
    #[display("dinner")]
    Dinner,
    #[display("snack")]
    Snack,
}

impl MealCategory {
    pub fn iter() -> impl Iterator<Item = Self> {
        <Self as strum::IntoEnumIterator>::iter()
    }

    pub fn names() -> Vec<&'static str> {
        Self::iter().map(<&'static str>::from).collect()
    }

    /// Position of the meal within a day.
    pub fn rank(&self) -> u8 {
        match self {
            Self::Breakfast => 1,
            Self::Lunch => 2,
            Self::Dinner => 3,
            Self::Snack => 4,
        }
    }
}

/// A list of strings stored as a JSON array in a text column.
#[derive(Debug, Clone, Default, PartialEq, Eq, AsExpression, FromSqlRow, Serialize, Deserialize)]
#[diesel(sql_type = Text)]
#[serde(transparent)]
pub struct StringList(pub Vec<String>);

impl FromSql<Text, Sqlite> for StringList {
    fn from_sql(bytes: <Sqlite as Backend>::RawValue<'_>) -> deserialize::Result<Self> {
        let text = <String as FromSql<Text, Sqlite>>::from_sql(bytes)?;
        Ok(Self(serde_json::from_str(&text)?))
    }
}

impl ToSql<Text, Sqlite> for StringList {
    fn to_sql<'b>(&'b self, out: &mut Output<'b, '_, Sqlite>) -> serialize::Result {
        out.set_value(serde_json::to_string(&self.0)?);
        Ok(IsNull::No)
    }
}

#[derive(Queryable, Selectable, Identifiable, Debug, Clone, PartialEq, Serialize)]
#[diesel(table_name = crate::database::schema::recipes)]
pub struct Recipe {
    pub id: RecipeId,
    pub name: String,
    pub description: Option<String>,
    pub category: Option<MealCategory>,
    pub image_url: Option<String>,
    pub source_url: Option<String>,
    pub source: Option<String>,
    pub difficulty: Option<String>,
    pub prep_time_minutes: Option<i32>,
    pub total_time_minutes: Option<i32>,
    pub servings: i32,
    pub instructions: StringList,
    pub notes: Option<String>,
    pub tags: StringList,
    pub calories_per_serving: f64,
    pub protein_per_serving: f64,
    pub fat_per_serving: f64,
    pub carbs_per_serving: f64,
    pub sodium_per_serving: f64,
    pub fiber_per_serving: f64,
    pub rating: Option<f64>,
    pub rating_count: Option<i32>,
}

#[derive(Insertable, Debug, Clone, Default)]
#[diesel(table_name = crate::database::schema::recipes)]
pub struct NewRecipe {
    pub name: String,
    pub description: Option<String>,
    pub category: Option<MealCategory>,
    pub image_url: Option<String>,
    pub source_url: Option<String>,
    pub source: Option<String>,
    pub difficulty: Option<String>,
    pub prep_time_minutes: Option<i32>,
    pub total_time_minutes: Option<i32>,
    pub servings: i32,
    pub instructions: StringList,
    pub notes: Option<String>,
    pub tags: StringList,
    pub calories_per_serving: f64,
    pub protein_per_serving: f64,
    pub fat_per_serving: f64,
    pub carbs_per_serving: f64,
    pub sodium_per_serving: f64,
    pub fiber_per_serving: f64,
    pub rating: Option<f64>,
    pub rating_count: Option<i32>,
}

/// The slice of a recipe the meal planner needs.
#[derive(Queryable, Selectable, Debug, Clone, PartialEq)]
#[diesel(table_name = crate::database::schema::recipes)]
pub struct RecipeNutrition {
    pub name: String,
    pub calories_per_serving: f64,
    pub protein_per_serving: f64,
    pub fat_per_serving: f64,
    pub carbs_per_serving: f64,
}

#[derive(Associations, Queryable, Selectable, Identifiable, Debug, Clone, PartialEq, Serialize)]
#[diesel(belongs_to(Recipe))]
#[diesel(table_name = crate::database::schema::ingredients)]
pub struct Ingredient {
    pub id: IngredientId,
    pub recipe_id: RecipeId,
    pub name: String,
    pub amount: Option<f64>,
    pub unit: Option<String>,
    pub notes: Option<String>,
    pub original_text: Option<String>,
}

#[derive(Insertable, Debug, Clone)]
#[diesel(table_name = crate::database::schema::ingredients)]
pub struct NewIngredient {
    pub recipe_id: RecipeId,
    pub name: String,
    pub amount: Option<f64>,
    pub unit: Option<String>,
    pub notes: Option<String>,
    pub original_text: Option<String>,
}

#[derive(Associations, Queryable, Selectable, Identifiable, Debug, Clone)]
#[diesel(belongs_to(Recipe))]
#[diesel(table_name = crate::database::schema::recipe_categories)]
pub struct RecipeCategory {
    pub id: RecipeCategoryId,
    pub recipe_id: RecipeId,
    pub category_name: String,
}

#[derive(Insertable, Debug, Clone)]
#[diesel(table_name = crate::database::schema::recipe_categories)]
pub struct NewRecipeCategory<'a> {
    pub recipe_id: RecipeId,
    pub category_name: &'a str,
}

#[derive(Associations, Queryable, Selectable, Identifiable, Debug, Clone, PartialEq, Serialize)]
#[diesel(belongs_to(Recipe))]
#[diesel(table_name = crate::database::schema::meal_plans)]
pub struct MealPlan {
    pub id: MealPlanId,
    pub date: chrono::NaiveDate,
    pub meal_type: MealCategory,
    pub recipe_id: RecipeId,
    pub servings: f64,
}

#[derive(Insertable, Debug, Clone)]
#[diesel(table_name = crate::database::schema::meal_plans)]
pub struct NewMealPlan {
    pub date: chrono::NaiveDate,
    pub meal_type: MealCategory,
    pub recipe_id: RecipeId,
    pub servings: f64,
}

#[test]
fn meal_category_names() {
    assert_eq!(
        MealCategory::names(),
        vec!["breakfast", "lunch", "dinner", "snack"]
    );
    assert_eq!(MealCategory::Dinner.to_string(), "dinner");
    assert_eq!("snack".parse::<MealCategory>().unwrap(), MealCategory::Snack);
    assert!("brunch".parse::<MealCategory>().is_err());
    assert!("Breakfast".parse::<MealCategory>().is_err());
}

#[test]
fn meal_category_rank_follows_the_day() {
    let mut meals = vec![
        MealCategory::Snack,
        MealCategory::Dinner,
        MealCategory::Breakfast,
        MealCategory::Lunch,
    ];
    meals.sort_by_key(MealCategory::rank);
    assert_eq!(
        meals,
        vec![
            MealCategory::Breakfast,
            MealCategory::Lunch,
            MealCategory::Dinner,
            MealCategory::Snack
        ]
    );
}
