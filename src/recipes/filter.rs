// Copyright 2023 Remi Bernotavicius

use crate::database::models::MealCategory;
use crate::database::schema::{recipe_categories, recipes};
use crate::error::{Error, Result};
use diesel::expression_methods::EscapeExpressionMethods as _;
use diesel::expression_methods::TextExpressionMethods as _;
use diesel::sqlite::Sqlite;
use diesel::ExpressionMethods as _;
use diesel::QueryDsl as _;
use serde::Deserialize;

pub const DEFAULT_PER_PAGE: i64 = 20;
pub const MAX_PER_PAGE: i64 = 100;

/// Raw query-string parameters of a recipe listing. Everything stays a string until validated so
/// bad input turns into our own error envelope rather than an extractor rejection.
#[derive(Debug, Default, Deserialize)]
pub struct RecipeListParams {
    pub category: Option<String>,
    pub tag: Option<String>,
    pub search: Option<String>,
    pub page: Option<String>,
    pub per_page: Option<String>,
}

fn present(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.is_empty())
}

#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    CategoryIs(MealCategory),
    /// Restricts to recipes carrying the tag in `recipe_categories`.
    HasTag(String),
    /// `LIKE` pattern matched against the recipe name, with a backslash as its escape character.
    NameLike(String),
}

/// An AND of predicates over recipes.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecipeFilter {
    predicates: Vec<Predicate>,
}

impl RecipeFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn category(mut self, category: MealCategory) -> Self {
        self.predicates.push(Predicate::CategoryIs(category));
        self
    }

    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.predicates.push(Predicate::HasTag(tag.into()));
        self
    }

    /// Substring match on the name. SQLite's `LIKE` folds case for ASCII letters only.
    pub fn search(mut self, text: &str) -> Self {
        let mut pattern = String::with_capacity(text.len() + 2);
        pattern.push('%');
        for c in text.chars() {
            if matches!(c, '%' | '_' | '\\') {
                pattern.push('\\');
            }
            pattern.push(c);
        }
        pattern.push('%');
        self.predicates.push(Predicate::NameLike(pattern));
        self
    }

    #[cfg(test)]
    pub fn predicates(&self) -> &[Predicate] {
        &self.predicates
    }

    pub fn from_params(params: &RecipeListParams) -> Result<Self> {
        let mut filter = Self::new();
        if let Some(category) = present(&params.category) {
            let category = category
                .parse::<MealCategory>()
                .map_err(|_| Error::InvalidCategory)?;
            filter = filter.category(category);
        }
        if let Some(tag) = present(&params.tag) {
            filter = filter.tag(tag);
        }
        if let Some(search) = present(&params.search) {
            filter = filter.search(search);
        }
        Ok(filter)
    }

    /// Renders the predicates onto a query over `recipes`.
    ///
    /// The tag predicate is a semi-join, so a recipe with several matching tag rows still comes
    /// back once and counts once.
    pub(crate) fn query(&self) -> recipes::BoxedQuery<'_, Sqlite> {
        let mut query = recipes::table.into_boxed();
        for predicate in &self.predicates {
            query = match predicate {
                Predicate::CategoryIs(category) => query.filter(recipes::category.eq(*category)),
                Predicate::HasTag(tag) => query.filter(
                    recipes::id.eq_any(
                        recipe_categories::table
                            .filter(recipe_categories::category_name.eq(tag))
                            .select(recipe_categories::recipe_id),
                    ),
                ),
                Predicate::NameLike(pattern) => {
                    query.filter(recipes::name.like(pattern).escape('\\'))
                }
            };
        }
        query
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    page: i64,
    per_page: i64,
}

/// Where a page lands once the size of the result set is known.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageWindow {
    pub page: i64,
    pub per_page: i64,
    pub total: i64,
    pub total_pages: i64,
    pub offset: i64,
}

impl PageRequest {
    pub fn new(page: i64, per_page: Option<i64>) -> Self {
        Self {
            page,
            per_page: per_page.unwrap_or(DEFAULT_PER_PAGE).clamp(1, MAX_PER_PAGE),
        }
    }

    /// `None` when no page was asked for, meaning the caller wants everything.
    pub fn from_params(params: &RecipeListParams) -> Result<Option<Self>> {
        let Some(page) = present(&params.page) else {
            return Ok(None);
        };
        let page = page
            .parse::<i64>()
            .map_err(|_| Error::validation("page must be an integer"))?;

        let per_page = match present(&params.per_page) {
            Some(per_page) => match per_page.parse::<i64>() {
                Ok(n) if n >= 1 => Some(n),
                _ => return Err(Error::validation("per_page must be a positive integer")),
            },
            None => None,
        };

        Ok(Some(Self::new(page, per_page)))
    }

    #[cfg(test)]
    pub fn per_page(&self) -> i64 {
        self.per_page
    }

    pub fn window(&self, total: i64) -> PageWindow {
        let total_pages = ((total + self.per_page - 1) / self.per_page).max(1);
        let page = self.page.clamp(1, total_pages);
        PageWindow {
            page,
            per_page: self.per_page,
            total,
            total_pages,
            offset: (page - 1) * self.per_page,
        }
    }
}

#[test]
fn filter_from_params() {
    let params = RecipeListParams {
        category: Some("dinner".into()),
        tag: Some("vegan".into()),
        search: Some("Curry".into()),
        ..Default::default()
    };
    let filter = RecipeFilter::from_params(&params).unwrap();
    assert_eq!(
        filter.predicates(),
        &[
            Predicate::CategoryIs(MealCategory::Dinner),
            Predicate::HasTag("vegan".into()),
            Predicate::NameLike("%Curry%".into()),
        ]
    );
}

#[test]
fn search_wildcards_are_literal() {
    let filter = RecipeFilter::new().search(r"50%_a\b");
    assert_eq!(
        filter.predicates(),
        &[Predicate::NameLike(r"%50\%\_a\\b%".into())]
    );
}

#[test]
fn filter_ignores_empty_params() {
    let params = RecipeListParams {
        category: Some("".into()),
        tag: Some("".into()),
        search: Some("".into()),
        ..Default::default()
    };
    let filter = RecipeFilter::from_params(&params).unwrap();
    assert!(filter.predicates().is_empty());
}

#[test]
fn filter_rejects_unknown_category() {
    let params = RecipeListParams {
        category: Some("brunch".into()),
        ..Default::default()
    };
    assert!(matches!(
        RecipeFilter::from_params(&params),
        Err(Error::InvalidCategory)
    ));
}

#[test]
fn page_request_from_params() {
    let params = |page: &str, per_page: Option<&str>| RecipeListParams {
        page: Some(page.into()),
        per_page: per_page.map(Into::into),
        ..Default::default()
    };

    assert_eq!(
        PageRequest::from_params(&RecipeListParams::default()).unwrap(),
        None
    );
    assert_eq!(
        PageRequest::from_params(&params("2", None)).unwrap(),
        Some(PageRequest::new(2, Some(20)))
    );
    assert_eq!(
        PageRequest::from_params(&params("1", Some("500")))
            .unwrap()
            .unwrap()
            .per_page(),
        100
    );
    assert!(PageRequest::from_params(&params("two", None)).is_err());
    assert!(PageRequest::from_params(&params("1", Some("0"))).is_err());
    assert!(PageRequest::from_params(&params("1", Some("ten"))).is_err());
}

#[test]
fn page_window() {
    let window = PageRequest::new(2, Some(20)).window(45);
    assert_eq!(
        window,
        PageWindow {
            page: 2,
            per_page: 20,
            total: 45,
            total_pages: 3,
            offset: 20,
        }
    );

    // past the end clamps to the last page
    let window = PageRequest::new(9, Some(20)).window(45);
    assert_eq!((window.page, window.offset), (3, 40));

    // before the start clamps to the first
    let window = PageRequest::new(-3, Some(20)).window(45);
    assert_eq!((window.page, window.offset), (1, 0));

    // an empty result still has one page
    let window = PageRequest::new(4, None).window(0);
    assert_eq!(
        (window.page, window.total_pages, window.offset),
        (1, 1, 0)
    );

    let window = PageRequest::new(1, Some(20)).window(40);
    assert_eq!(window.total_pages, 2);
}
