// Copyright 2023 Remi Bernotavicius

use crate::database;
use crate::database::models::{
    Ingredient, MealCategory, NewIngredient, NewRecipe, NewRecipeCategory, Recipe, RecipeCategory,
    RecipeId, StringList,
};
use crate::database::schema::{ingredients, meal_plans, recipe_categories, recipes};
use crate::error::{Error, Result};
use diesel::prelude::Connection as _;
use diesel::prelude::OptionalExtension as _;
use diesel::BelongingToDsl as _;
use diesel::ExpressionMethods as _;
use diesel::QueryDsl as _;
use diesel::RunQueryDsl as _;
use diesel::SelectableHelper as _;
use serde::{Deserialize, Serialize};

pub mod filter;

pub use filter::{PageRequest, RecipeFilter, RecipeListParams};

pub const RECIPE_NOT_FOUND: &str = "The recipe doesn't exist.";

#[derive(Debug, Serialize)]
pub struct RecipePage {
    pub recipes: Vec<Recipe>,
    pub page: i64,
    pub per_page: i64,
    pub total: i64,
    pub total_pages: i64,
}

/// Without a page request the listing is a bare array, otherwise a page envelope.
#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum RecipeListing {
    All(Vec<Recipe>),
    Page(RecipePage),
}

pub fn list_recipes(
    conn: &mut database::Connection,
    filter: &RecipeFilter,
    page: Option<PageRequest>,
) -> Result<RecipeListing> {
    let Some(page) = page else {
        let all = filter
            .query()
            .order(recipes::id.desc())
            .load::<Recipe>(conn)?;
        return Ok(RecipeListing::All(all));
    };

    let total: i64 = filter.query().count().get_result(conn)?;
    let window = page.window(total);
    let recipes = filter
        .query()
        .order(recipes::id.desc())
        .limit(window.per_page)
        .offset(window.offset)
        .load::<Recipe>(conn)?;

    Ok(RecipeListing::Page(RecipePage {
        recipes,
        page: window.page,
        per_page: window.per_page,
        total: window.total,
        total_pages: window.total_pages,
    }))
}

#[derive(Debug, Serialize)]
pub struct RecipeDetail {
    #[serde(flatten)]
    pub recipe: Recipe,
    pub ingredients: Vec<Ingredient>,
    pub recipe_categories: Vec<String>,
}

pub fn get_recipe(conn: &mut database::Connection, recipe_id: RecipeId) -> Result<RecipeDetail> {
    conn.transaction::<_, Error, _>(|conn| {
        let recipe = recipes::table
            .find(recipe_id)
            .select(Recipe::as_select())
            .first(conn)
            .optional()?
            .ok_or_else(|| Error::not_found(RECIPE_NOT_FOUND))?;

        let ingredients = Ingredient::belonging_to(&recipe)
            .select(Ingredient::as_select())
            .order(ingredients::id.asc())
            .load(conn)?;

        let recipe_categories = RecipeCategory::belonging_to(&recipe)
            .select(recipe_categories::category_name)
            .order(recipe_categories::id.asc())
            .load::<String>(conn)?;

        Ok(RecipeDetail {
            recipe,
            ingredients,
            recipe_categories,
        })
    })
}

#[derive(Debug, Default, Deserialize)]
pub struct NewIngredientRequest {
    pub name: Option<String>,
    pub amount: Option<f64>,
    pub unit: Option<String>,
    pub notes: Option<String>,
    pub original_text: Option<String>,
}

/// Body of a recipe creation request, as loose as the JSON that arrives.
#[derive(Debug, Default, Deserialize)]
pub struct NewRecipeRequest {
    pub name: Option<String>,
    pub description: Option<String>,
    pub category: Option<String>,
    pub image_url: Option<String>,
    pub source_url: Option<String>,
    pub source: Option<String>,
    pub difficulty: Option<String>,
    pub prep_time_minutes: Option<i32>,
    pub total_time_minutes: Option<i32>,
    pub servings: Option<i32>,
    #[serde(default)]
    pub instructions: Vec<String>,
    pub notes: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    pub calories_per_serving: Option<f64>,
    pub protein_per_serving: Option<f64>,
    pub fat_per_serving: Option<f64>,
    pub carbs_per_serving: Option<f64>,
    pub sodium_per_serving: Option<f64>,
    pub fiber_per_serving: Option<f64>,
    pub rating: Option<f64>,
    pub rating_count: Option<i32>,
    #[serde(default)]
    pub ingredients: Vec<NewIngredientRequest>,
    #[serde(default)]
    pub recipe_categories: Vec<String>,
}

#[derive(Debug, Clone)]
struct IngredientDraft {
    name: String,
    amount: Option<f64>,
    unit: Option<String>,
    notes: Option<String>,
    original_text: Option<String>,
}

impl IngredientDraft {
    fn for_recipe(self, recipe_id: RecipeId) -> NewIngredient {
        NewIngredient {
            recipe_id,
            name: self.name,
            amount: self.amount,
            unit: self.unit,
            notes: self.notes,
            original_text: self.original_text,
        }
    }
}

/// A creation request that passed validation and can be written without further checks.
#[derive(Debug, Clone)]
pub struct ValidatedRecipe {
    recipe: NewRecipe,
    ingredients: Vec<IngredientDraft>,
    categories: Vec<String>,
}

fn non_negative(field: &str, value: Option<f64>) -> Result<Option<f64>> {
    match value {
        Some(v) if !v.is_finite() || v < 0.0 => Err(Error::validation(format!(
            "{field} must be a non-negative number"
        ))),
        v => Ok(v),
    }
}

fn non_negative_int(field: &str, value: Option<i32>) -> Result<Option<i32>> {
    match value {
        Some(v) if v < 0 => Err(Error::validation(format!(
            "{field} must be a non-negative number"
        ))),
        v => Ok(v),
    }
}

impl NewRecipeRequest {
    pub fn validate(self) -> Result<ValidatedRecipe> {
        let name = self
            .name
            .as_deref()
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .ok_or_else(|| Error::validation("Missing field: name"))?
            .to_owned();

        let category = match self.category.as_deref().map(str::trim) {
            Some(c) if !c.is_empty() => Some(
                c.parse::<MealCategory>()
                    .map_err(|_| Error::InvalidCategory)?,
            ),
            _ => None,
        };

        let servings = self.servings.unwrap_or(1);
        if servings < 1 {
            return Err(Error::validation("servings must be at least 1"));
        }

        let nutrient = |field: &str, value: Option<f64>| -> Result<f64> {
            Ok(non_negative(field, value)?.unwrap_or(0.0))
        };

        let recipe = NewRecipe {
            name,
            description: self.description,
            category,
            image_url: self.image_url,
            source_url: self.source_url,
            source: self.source,
            difficulty: self.difficulty,
            prep_time_minutes: non_negative_int("prep_time_minutes", self.prep_time_minutes)?,
            total_time_minutes: non_negative_int("total_time_minutes", self.total_time_minutes)?,
            servings,
            instructions: StringList(self.instructions),
            notes: self.notes,
            tags: StringList(self.tags),
            calories_per_serving: nutrient("calories_per_serving", self.calories_per_serving)?,
            protein_per_serving: nutrient("protein_per_serving", self.protein_per_serving)?,
            fat_per_serving: nutrient("fat_per_serving", self.fat_per_serving)?,
            carbs_per_serving: nutrient("carbs_per_serving", self.carbs_per_serving)?,
            sodium_per_serving: nutrient("sodium_per_serving", self.sodium_per_serving)?,
            fiber_per_serving: nutrient("fiber_per_serving", self.fiber_per_serving)?,
            rating: non_negative("rating", self.rating)?,
            rating_count: non_negative_int("rating_count", self.rating_count)?,
        };

        let ingredients = self
            .ingredients
            .into_iter()
            .enumerate()
            .map(|(i, ingredient)| {
                let name = ingredient
                    .name
                    .as_deref()
                    .map(str::trim)
                    .filter(|n| !n.is_empty())
                    .ok_or_else(|| {
                        Error::validation(format!("Missing field: ingredients[{i}].name"))
                    })?
                    .to_owned();
                Ok(IngredientDraft {
                    name,
                    amount: ingredient.amount,
                    unit: ingredient.unit,
                    notes: ingredient.notes,
                    original_text: ingredient.original_text,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let categories = self
            .recipe_categories
            .into_iter()
            .map(|c| c.trim().to_owned())
            .filter(|c| !c.is_empty())
            .collect();

        Ok(ValidatedRecipe {
            recipe,
            ingredients,
            categories,
        })
    }
}

/// Writes the recipe, its ingredients and its tags, or nothing at all.
pub fn create_recipe(
    conn: &mut database::Connection,
    new_recipe: ValidatedRecipe,
) -> Result<RecipeId> {
    let ValidatedRecipe {
        recipe,
        ingredients: drafts,
        categories,
    } = new_recipe;

    let id = conn.immediate_transaction::<_, Error, _>(|conn| {
        let id: RecipeId = diesel::insert_into(recipes::table)
            .values(&recipe)
            .returning(recipes::id)
            .get_result(conn)?;

        for draft in drafts {
            diesel::insert_into(ingredients::table)
                .values(draft.for_recipe(id))
                .execute(conn)?;
        }

        for category_name in &categories {
            diesel::insert_into(recipe_categories::table)
                .values(NewRecipeCategory {
                    recipe_id: id,
                    category_name,
                })
                .execute(conn)?;
        }

        Ok(id)
    })?;

    log::info!("created recipe {id} {:?}", recipe.name);
    Ok(id)
}

/// Removes the recipe along with everything hanging off it.
pub fn delete_recipe(conn: &mut database::Connection, delete_id: RecipeId) -> Result<()> {
    conn.immediate_transaction::<_, Error, _>(|conn| {
        let existing = recipes::table
            .find(delete_id)
            .select(recipes::id)
            .first::<RecipeId>(conn)
            .optional()?;
        if existing.is_none() {
            return Err(Error::not_found(RECIPE_NOT_FOUND));
        }

        diesel::delete(ingredients::table.filter(ingredients::recipe_id.eq(delete_id)))
            .execute(conn)?;
        diesel::delete(
            recipe_categories::table.filter(recipe_categories::recipe_id.eq(delete_id)),
        )
        .execute(conn)?;
        let meals =
            diesel::delete(meal_plans::table.filter(meal_plans::recipe_id.eq(delete_id)))
                .execute(conn)?;
        diesel::delete(recipes::table.find(delete_id)).execute(conn)?;

        log::info!("deleted recipe {delete_id} and {meals} meal plan(s) using it");
        Ok(())
    })
}

/// Every distinct free-text tag, sorted.
pub fn recipe_tags(conn: &mut database::Connection) -> Result<Vec<String>> {
    Ok(recipe_categories::table
        .select(recipe_categories::category_name)
        .distinct()
        .order(recipe_categories::category_name.asc())
        .load(conn)?)
}

pub fn recipe_count(conn: &mut database::Connection) -> Result<i64> {
    Ok(recipes::table.count().get_result(conn)?)
}

#[cfg(test)]
pub fn test_recipe(
    name: &str,
    category: Option<&str>,
    calories: f64,
    tags: &[&str],
) -> ValidatedRecipe {
    NewRecipeRequest {
        name: Some(name.into()),
        category: category.map(Into::into),
        calories_per_serving: Some(calories),
        protein_per_serving: Some(calories / 20.0),
        fat_per_serving: Some(calories / 40.0),
        carbs_per_serving: Some(calories / 10.0),
        recipe_categories: tags.iter().map(|t| t.to_string()).collect(),
        ..Default::default()
    }
    .validate()
    .unwrap()
}

#[cfg(test)]
fn names(listing: &RecipeListing) -> Vec<&str> {
    let recipes = match listing {
        RecipeListing::All(recipes) => recipes,
        RecipeListing::Page(page) => &page.recipes,
    };
    recipes.iter().map(|r| r.name.as_str()).collect()
}

#[cfg(test)]
fn row_counts(conn: &mut database::Connection) -> (i64, i64, i64) {
    (
        recipes::table.count().get_result(conn).unwrap(),
        ingredients::table.count().get_result(conn).unwrap(),
        recipe_categories::table.count().get_result(conn).unwrap(),
    )
}

#[test]
fn list_newest_first() {
    let mut conn = database::in_memory();
    for name in ["pancakes", "soup", "curry"] {
        create_recipe(&mut conn, test_recipe(name, None, 100.0, &[])).unwrap();
    }

    let listing = list_recipes(&mut conn, &RecipeFilter::new(), None).unwrap();
    assert!(matches!(listing, RecipeListing::All(_)));
    assert_eq!(names(&listing), vec!["curry", "soup", "pancakes"]);
}

#[test]
fn list_by_category() {
    let mut conn = database::in_memory();
    create_recipe(&mut conn, test_recipe("pancakes", Some("breakfast"), 300.0, &[])).unwrap();
    create_recipe(&mut conn, test_recipe("omelette", Some("breakfast"), 250.0, &[])).unwrap();
    create_recipe(&mut conn, test_recipe("curry", Some("dinner"), 600.0, &[])).unwrap();
    create_recipe(&mut conn, test_recipe("toast", None, 150.0, &[])).unwrap();

    for category in MealCategory::iter() {
        let filter = RecipeFilter::new().category(category);
        let RecipeListing::All(recipes) = list_recipes(&mut conn, &filter, None).unwrap() else {
            panic!("expected an unpaginated listing");
        };
        assert!(recipes.iter().all(|r| r.category == Some(category)));
    }

    let filter = RecipeFilter::new().category(MealCategory::Breakfast);
    let listing = list_recipes(&mut conn, &filter, None).unwrap();
    assert_eq!(names(&listing), vec!["omelette", "pancakes"]);
}

#[test]
fn search_is_case_insensitive_substring() {
    let mut conn = database::in_memory();
    create_recipe(&mut conn, test_recipe("Chicken Curry", None, 600.0, &[])).unwrap();
    create_recipe(&mut conn, test_recipe("curried lentils", None, 400.0, &[])).unwrap();
    create_recipe(&mut conn, test_recipe("Pancakes", None, 300.0, &[])).unwrap();

    let filter = RecipeFilter::new().search("CURR");
    let listing = list_recipes(&mut conn, &filter, None).unwrap();
    assert_eq!(names(&listing), vec!["curried lentils", "Chicken Curry"]);
}

#[test]
fn search_matches_wildcards_literally() {
    let mut conn = database::in_memory();
    for name in ["50% rye", "500 grain loaf", "a_b salad", "axb salad", r"back\slash"] {
        create_recipe(&mut conn, test_recipe(name, None, 100.0, &[])).unwrap();
    }

    let search = |conn: &mut database::Connection, text: &str| {
        let listing = list_recipes(conn, &RecipeFilter::new().search(text), None).unwrap();
        names(&listing).into_iter().map(str::to_owned).collect::<Vec<_>>()
    };
    assert_eq!(search(&mut conn, "50%"), vec!["50% rye"]);
    assert_eq!(search(&mut conn, "a_b"), vec!["a_b salad"]);
    assert_eq!(search(&mut conn, r"k\s"), vec![r"back\slash"]);
    assert_eq!(search(&mut conn, "50").len(), 2);
}

#[test]
fn filters_combine_with_and() {
    let mut conn = database::in_memory();
    create_recipe(&mut conn, test_recipe("veggie curry", Some("dinner"), 500.0, &["vegan"])).unwrap();
    create_recipe(&mut conn, test_recipe("veggie wrap", Some("lunch"), 400.0, &["vegan"])).unwrap();
    create_recipe(&mut conn, test_recipe("beef curry", Some("dinner"), 700.0, &[])).unwrap();

    let filter = RecipeFilter::new()
        .category(MealCategory::Dinner)
        .tag("vegan")
        .search("curry");
    let listing = list_recipes(&mut conn, &filter, None).unwrap();
    assert_eq!(names(&listing), vec!["veggie curry"]);
}

#[test]
fn tag_filter_returns_each_recipe_once() {
    let mut conn = database::in_memory();
    create_recipe(&mut conn, test_recipe("salad", None, 200.0, &["quick", "quick"])).unwrap();
    create_recipe(&mut conn, test_recipe("wrap", None, 300.0, &["quick", "lunchbox"])).unwrap();
    create_recipe(&mut conn, test_recipe("roast", None, 900.0, &["slow"])).unwrap();

    let filter = RecipeFilter::new().tag("quick");
    let listing = list_recipes(&mut conn, &filter, None).unwrap();
    assert_eq!(names(&listing), vec!["wrap", "salad"]);

    let RecipeListing::Page(page) =
        list_recipes(&mut conn, &filter, Some(PageRequest::new(1, None))).unwrap()
    else {
        panic!("expected a page");
    };
    assert_eq!(page.total, 2);
    assert_eq!(page.recipes.len(), 2);
}

#[test]
fn pages_clamp_into_range() {
    let mut conn = database::in_memory();
    for i in 0..5 {
        create_recipe(&mut conn, test_recipe(&format!("recipe {i}"), None, 100.0, &[])).unwrap();
    }

    let RecipeListing::Page(page) =
        list_recipes(&mut conn, &RecipeFilter::new(), Some(PageRequest::new(9, Some(2))))
            .unwrap()
    else {
        panic!("expected a page");
    };
    assert_eq!(page.page, 3);
    assert_eq!(page.total, 5);
    assert_eq!(page.total_pages, 3);
    assert_eq!(
        page.recipes.iter().map(|r| r.name.as_str()).collect::<Vec<_>>(),
        vec!["recipe 0"]
    );

    let RecipeListing::Page(page) =
        list_recipes(&mut conn, &RecipeFilter::new(), Some(PageRequest::new(1, Some(500))))
            .unwrap()
    else {
        panic!("expected a page");
    };
    assert_eq!(page.per_page, 100);
    assert_eq!(page.recipes.len(), 5);
}

#[test]
fn empty_listing_still_has_a_page() {
    let mut conn = database::in_memory();
    let filter = RecipeFilter::new().tag("nothing has this");
    let RecipeListing::Page(page) =
        list_recipes(&mut conn, &filter, Some(PageRequest::new(3, None))).unwrap()
    else {
        panic!("expected a page");
    };
    assert_eq!((page.page, page.total, page.total_pages), (1, 0, 1));
    assert!(page.recipes.is_empty());
}

#[test]
fn get_recipe_inlines_ingredients_and_tags() {
    let mut conn = database::in_memory();
    let request = NewRecipeRequest {
        name: Some("Pancakes".into()),
        category: Some("breakfast".into()),
        instructions: vec!["Mix".into(), "Fry".into()],
        tags: vec!["sweet".into()],
        ingredients: vec![
            NewIngredientRequest {
                name: Some("flour".into()),
                amount: Some(200.0),
                unit: Some("g".into()),
                ..Default::default()
            },
            NewIngredientRequest {
                name: Some("milk".into()),
                amount: Some(300.0),
                unit: Some("ml".into()),
                original_text: Some("300ml whole milk".into()),
                ..Default::default()
            },
        ],
        recipe_categories: vec!["vegetarian".into(), "quick".into()],
        ..Default::default()
    };
    let id = create_recipe(&mut conn, request.validate().unwrap()).unwrap();

    let detail = get_recipe(&mut conn, id).unwrap();
    assert_eq!(detail.recipe.name, "Pancakes");
    assert_eq!(detail.recipe.category, Some(MealCategory::Breakfast));
    assert_eq!(detail.recipe.servings, 1);
    assert_eq!(detail.recipe.instructions, StringList(vec!["Mix".into(), "Fry".into()]));
    assert_eq!(
        detail
            .ingredients
            .iter()
            .map(|i| i.name.as_str())
            .collect::<Vec<_>>(),
        vec!["flour", "milk"]
    );
    assert!(detail.ingredients.iter().all(|i| i.recipe_id == id));
    assert_eq!(
        detail.ingredients[1].original_text.as_deref(),
        Some("300ml whole milk")
    );
    assert_eq!(detail.recipe_categories, vec!["vegetarian", "quick"]);
}

#[test]
fn get_missing_recipe() {
    let mut conn = database::in_memory();
    let error = get_recipe(&mut conn, RecipeId::from(404)).unwrap_err();
    assert!(matches!(error, Error::NotFound(ref m) if m == RECIPE_NOT_FOUND));
}

#[test]
fn validation_rejects_bad_requests() {
    let missing_name = NewRecipeRequest::default().validate();
    assert!(matches!(missing_name, Err(Error::Validation(ref m)) if m == "Missing field: name"));

    let blank_name = NewRecipeRequest {
        name: Some("   ".into()),
        ..Default::default()
    }
    .validate();
    assert!(matches!(blank_name, Err(Error::Validation(_))));

    let bad_category = NewRecipeRequest {
        name: Some("Soup".into()),
        category: Some("brunch".into()),
        ..Default::default()
    }
    .validate();
    assert!(matches!(bad_category, Err(Error::InvalidCategory)));

    let no_servings = NewRecipeRequest {
        name: Some("Soup".into()),
        servings: Some(0),
        ..Default::default()
    }
    .validate();
    assert!(matches!(no_servings, Err(Error::Validation(_))));

    let negative_calories = NewRecipeRequest {
        name: Some("Soup".into()),
        calories_per_serving: Some(-5.0),
        ..Default::default()
    }
    .validate();
    assert!(matches!(negative_calories, Err(Error::Validation(_))));

    let nameless_ingredient = NewRecipeRequest {
        name: Some("Soup".into()),
        ingredients: vec![NewIngredientRequest::default()],
        ..Default::default()
    }
    .validate();
    assert!(
        matches!(nameless_ingredient, Err(Error::Validation(ref m)) if m == "Missing field: ingredients[0].name")
    );
}

#[test]
fn failed_tag_insert_rolls_back_the_recipe() {
    use diesel::connection::SimpleConnection as _;

    let mut conn = database::in_memory();
    conn.batch_execute(
        "CREATE TRIGGER reject_tag BEFORE INSERT ON recipe_categories
         WHEN NEW.category_name = 'forbidden'
         BEGIN SELECT RAISE(ABORT, 'tag rejected'); END;",
    )
    .unwrap();

    let request = NewRecipeRequest {
        name: Some("Soup".into()),
        ingredients: vec![NewIngredientRequest {
            name: Some("water".into()),
            ..Default::default()
        }],
        recipe_categories: vec!["fine".into(), "forbidden".into()],
        ..Default::default()
    };
    let error = create_recipe(&mut conn, request.validate().unwrap()).unwrap_err();
    assert!(matches!(error, Error::Database(_)));
    assert!(error.to_string().contains("tag rejected"));
    assert_eq!(row_counts(&mut conn), (0, 0, 0));
}

#[test]
fn delete_cascades_to_children() {
    let mut conn = database::in_memory();
    let request = NewRecipeRequest {
        name: Some("Stew".into()),
        ingredients: vec![
            NewIngredientRequest {
                name: Some("beef".into()),
                ..Default::default()
            },
            NewIngredientRequest {
                name: Some("carrot".into()),
                ..Default::default()
            },
        ],
        recipe_categories: vec!["hearty".into()],
        ..Default::default()
    };
    let id = create_recipe(&mut conn, request.validate().unwrap()).unwrap();
    let keep = create_recipe(&mut conn, test_recipe("Salad", None, 100.0, &["light"])).unwrap();
    assert_eq!(row_counts(&mut conn), (2, 2, 2));

    delete_recipe(&mut conn, id).unwrap();
    assert_eq!(row_counts(&mut conn), (1, 0, 1));
    assert!(matches!(get_recipe(&mut conn, id), Err(Error::NotFound(_))));
    assert!(get_recipe(&mut conn, keep).is_ok());

    assert!(matches!(
        delete_recipe(&mut conn, id),
        Err(Error::NotFound(_))
    ));
    assert_eq!(row_counts(&mut conn), (1, 0, 1));
}

#[test]
fn tags_are_distinct_and_sorted() {
    let mut conn = database::in_memory();
    create_recipe(&mut conn, test_recipe("a", None, 1.0, &["vegan", "quick"])).unwrap();
    create_recipe(&mut conn, test_recipe("b", None, 1.0, &["quick", "budget"])).unwrap();

    let tags = recipe_tags(&mut conn).unwrap();
    assert_eq!(tags, vec!["budget", "quick", "vegan"]);
    assert_eq!(recipe_count(&mut conn).unwrap(), 2);
}
