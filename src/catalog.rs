//! Catalog listing: filter parameters to one parameterized query.
//!
//! Filters arrive from the query string, get validated against the accepted
//! vocabulary, and are pushed into a `QueryBuilder` so every user value is a
//! bind parameter. Price and degree conditions go through subqueries on
//! `programs`; the per-card aggregates ride along as subselects so a page is
//! always a single round trip.

use serde::{Deserialize, Serialize};
use serde_json::json;
use sqlx::{FromRow, Postgres, QueryBuilder};

use crate::{
    error::AppError,
    models::{Degree, UniversityKind},
    state::AppState,
};

const CARD_SELECT: &str = "SELECT u.id, u.name, u.city, u.kind, u.rating, u.logo_url, \
     u.total_students, u.has_dormitory, u.employment_rate, \
     (SELECT MIN(p.price) FROM programs p WHERE p.university_id = u.id) AS min_price, \
     (SELECT MAX(p.price) FROM programs p WHERE p.university_id = u.id) AS max_price, \
     (SELECT COUNT(*) FROM programs p WHERE p.university_id = u.id) AS programs_count \
     FROM universities u";

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CatalogFilters {
    pub query: Option<String>,
    pub city: Option<String>,
    pub kind: Option<String>,
    pub min_rating: Option<f64>,
    pub max_rating: Option<f64>,
    pub min_price: Option<i64>,
    pub max_price: Option<i64>,
    pub has_dormitory: Option<bool>,
    pub has_grants: Option<bool>,
    pub min_students: Option<i64>,
    pub degree: Option<String>,
    pub sort_by: String,
    pub sort_order: String,
    pub page: i64,
    pub per_page: i64,
}

impl Default for CatalogFilters {
    fn default() -> Self {
        Self {
            query: None,
            city: None,
            kind: None,
            min_rating: None,
            max_rating: None,
            min_price: None,
            max_price: None,
            has_dormitory: None,
            has_grants: None,
            min_students: None,
            degree: None,
            sort_by: "rating".to_string(),
            sort_order: "desc".to_string(),
            page: 1,
            per_page: 20,
        }
    }
}

impl CatalogFilters {
    pub fn validate(&self) -> Result<(), AppError> {
        for rating in [self.min_rating, self.max_rating].into_iter().flatten() {
            if !(0.0..=10.0).contains(&rating) {
                return Err(AppError::Validation(
                    "Rating bounds must be between 0 and 10".to_string(),
                ));
            }
        }

        for price in [self.min_price, self.max_price].into_iter().flatten() {
            if price < 0 {
                return Err(AppError::Validation(
                    "Price bounds must be non-negative".to_string(),
                ));
            }
        }

        if let Some(kind) = &self.kind {
            kind.parse::<UniversityKind>().map_err(|_| {
                AppError::Validation(format!("Unknown university kind: {kind}"))
            })?;
        }

        if let Some(degree) = &self.degree {
            degree
                .parse::<Degree>()
                .map_err(|_| AppError::Validation(format!("Unknown degree: {degree}")))?;
        }

        if !matches!(self.sort_by.as_str(), "rating" | "price" | "students" | "name") {
            return Err(AppError::Validation(format!(
                "Unknown sort field: {}",
                self.sort_by
            )));
        }

        if !matches!(self.sort_order.as_str(), "asc" | "desc") {
            return Err(AppError::Validation(format!(
                "Unknown sort order: {}",
                self.sort_order
            )));
        }

        if self.page < 1 {
            return Err(AppError::Validation("Page must be at least 1".to_string()));
        }

        if !(1..=100).contains(&self.per_page) {
            return Err(AppError::Validation(
                "Page size must be between 1 and 100".to_string(),
            ));
        }

        Ok(())
    }

    /// Sort column, restricted to the whitelist checked in `validate`.
    fn sort_column(&self) -> &'static str {
        match self.sort_by.as_str() {
            "price" => "min_price",
            "students" => "u.total_students",
            "name" => "u.name",
            _ => "u.rating",
        }
    }

    pub fn offset(&self) -> i64 {
        (self.page - 1) * self.per_page
    }
}

fn push_filters(qb: &mut QueryBuilder<'static, Postgres>, filters: &CatalogFilters) {
    qb.push(" WHERE TRUE");

    if let Some(query) = &filters.query {
        let pattern = format!("%{query}%");
        qb.push(" AND (u.name ILIKE ")
            .push_bind(pattern.clone())
            .push(" OR u.description ILIKE ")
            .push_bind(pattern)
            .push(")");
    }

    if let Some(city) = &filters.city {
        qb.push(" AND u.city ILIKE ").push_bind(format!("%{city}%"));
    }

    if let Some(kind) = &filters.kind {
        qb.push(" AND u.kind = ").push_bind(kind.clone());
    }

    if let Some(min_rating) = filters.min_rating {
        qb.push(" AND u.rating >= ").push_bind(min_rating);
    }

    if let Some(max_rating) = filters.max_rating {
        qb.push(" AND u.rating <= ").push_bind(max_rating);
    }

    if let Some(has_dormitory) = filters.has_dormitory {
        qb.push(" AND u.has_dormitory = ").push_bind(has_dormitory);
    }

    if let Some(min_students) = filters.min_students {
        qb.push(" AND u.total_students >= ").push_bind(min_students);
    }

    if filters.min_price.is_some() || filters.max_price.is_some() {
        qb.push(" AND u.id IN (SELECT p.university_id FROM programs p WHERE TRUE");
        if let Some(min_price) = filters.min_price {
            qb.push(" AND p.price >= ").push_bind(min_price);
        }
        if let Some(max_price) = filters.max_price {
            qb.push(" AND p.price <= ").push_bind(max_price);
        }
        qb.push(")");
    }

    if let Some(degree) = &filters.degree {
        qb.push(" AND u.id IN (SELECT p.university_id FROM programs p WHERE p.degree = ")
            .push_bind(degree.clone())
            .push(")");
    }

    if filters.has_grants == Some(true) {
        qb.push(" AND u.id IN (SELECT g.university_id FROM grants g)");
    }
}

pub fn build_card_query(filters: &CatalogFilters) -> QueryBuilder<'static, Postgres> {
    let mut qb = QueryBuilder::new(CARD_SELECT);
    push_filters(&mut qb, filters);

    // Secondary id sort keeps pages stable when the sort key ties.
    qb.push(format!(
        " ORDER BY {} {} NULLS LAST, u.id ASC",
        filters.sort_column(),
        if filters.sort_order == "asc" { "ASC" } else { "DESC" }
    ));

    qb.push(" LIMIT ").push_bind(filters.per_page);
    qb.push(" OFFSET ").push_bind(filters.offset());

    qb
}

pub fn build_count_query(filters: &CatalogFilters) -> QueryBuilder<'static, Postgres> {
    let mut qb = QueryBuilder::new("SELECT COUNT(*) FROM universities u");
    push_filters(&mut qb, filters);
    qb
}

#[derive(Debug, FromRow)]
struct CardRow {
    id: i64,
    name: String,
    city: String,
    kind: String,
    rating: f64,
    logo_url: Option<String>,
    total_students: Option<i64>,
    has_dormitory: bool,
    employment_rate: Option<f64>,
    min_price: Option<i64>,
    max_price: Option<i64>,
    programs_count: i64,
}

#[derive(Debug, Serialize)]
pub struct UniversityCard {
    pub id: i64,
    pub name: String,
    pub city: String,
    pub kind: String,
    pub rating: f64,
    pub logo_url: Option<String>,
    pub min_price: Option<i64>,
    pub max_price: Option<i64>,
    pub programs_count: i64,
    pub students_count: Option<i64>,
    pub has_dormitory: bool,
    pub employment_rate: Option<f64>,
    pub is_favorite: bool,
}

#[derive(Debug, Serialize)]
pub struct CatalogResponse {
    pub universities: Vec<UniversityCard>,
    pub total: i64,
    pub page: i64,
    pub per_page: i64,
    pub total_pages: i64,
    pub filters_applied: serde_json::Value,
}

pub async fn fetch_catalog(
    state: &AppState,
    filters: CatalogFilters,
    user_id: Option<i64>,
) -> Result<CatalogResponse, AppError> {
    filters.validate()?;

    let total: i64 = build_count_query(&filters)
        .build_query_scalar()
        .fetch_one(&state.db)
        .await?;

    let rows: Vec<CardRow> = build_card_query(&filters)
        .build_query_as()
        .fetch_all(&state.db)
        .await?;

    let favorite_ids: Vec<i64> = match user_id {
        Some(user_id) => {
            sqlx::query_scalar("SELECT university_id FROM favorites WHERE user_id = $1")
                .bind(user_id)
                .fetch_all(&state.db)
                .await?
        }
        None => Vec::new(),
    };

    let universities = rows
        .into_iter()
        .map(|row| UniversityCard {
            is_favorite: favorite_ids.contains(&row.id),
            id: row.id,
            name: row.name,
            city: row.city,
            kind: row.kind,
            rating: row.rating,
            logo_url: row.logo_url,
            min_price: row.min_price,
            max_price: row.max_price,
            programs_count: row.programs_count,
            students_count: row.total_students,
            has_dormitory: row.has_dormitory,
            employment_rate: row.employment_rate,
        })
        .collect();

    Ok(CatalogResponse {
        universities,
        total,
        total_pages: total_pages(total, filters.per_page),
        filters_applied: json!({
            "query": filters.query,
            "city": filters.city,
            "kind": filters.kind,
            "min_rating": filters.min_rating,
            "max_rating": filters.max_rating,
            "min_price": filters.min_price,
            "max_price": filters.max_price,
            "has_dormitory": filters.has_dormitory,
            "has_grants": filters.has_grants,
            "degree": filters.degree,
        }),
        page: filters.page,
        per_page: filters.per_page,
    })
}

pub fn total_pages(total: i64, per_page: i64) -> i64 {
    (total + per_page - 1) / per_page
}

#[derive(Debug, Serialize, FromRow)]
pub struct CityCount {
    pub city: String,
    pub count: i64,
}

pub async fn cities(state: &AppState) -> Result<Vec<CityCount>, AppError> {
    let rows = sqlx::query_as::<_, CityCount>(
        "SELECT city, COUNT(*) AS count FROM universities GROUP BY city ORDER BY COUNT(*) DESC",
    )
    .fetch_all(&state.db)
    .await?;

    Ok(rows)
}

#[derive(Debug, Serialize)]
pub struct CatalogStats {
    pub total_universities: i64,
    pub total_programs: i64,
    pub average_rating: f64,
    pub average_price: i64,
    pub cities_count: i64,
}

pub async fn stats(state: &AppState) -> Result<CatalogStats, AppError> {
    let total_universities: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM universities")
        .fetch_one(&state.db)
        .await?;
    let total_programs: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM programs")
        .fetch_one(&state.db)
        .await?;
    let average_rating: Option<f64> = sqlx::query_scalar("SELECT AVG(rating) FROM universities")
        .fetch_one(&state.db)
        .await?;
    let average_price: Option<f64> = sqlx::query_scalar(
        "SELECT AVG(price::double precision) FROM programs WHERE price IS NOT NULL",
    )
    .fetch_one(&state.db)
    .await?;
    let cities_count: i64 = sqlx::query_scalar("SELECT COUNT(DISTINCT city) FROM universities")
        .fetch_one(&state.db)
        .await?;

    Ok(CatalogStats {
        total_universities,
        total_programs,
        average_rating: (average_rating.unwrap_or(0.0) * 100.0).round() / 100.0,
        average_price: average_price.unwrap_or(0.0) as i64,
        cities_count,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_filters_are_valid() {
        assert!(CatalogFilters::default().validate().is_ok());
    }

    #[test]
    fn sort_field_is_whitelisted() {
        let filters = CatalogFilters {
            sort_by: "rating; DROP TABLE universities".to_string(),
            ..Default::default()
        };
        assert!(matches!(filters.validate(), Err(AppError::Validation(_))));
    }

    #[test]
    fn page_bounds_are_enforced() {
        let zero_page = CatalogFilters {
            page: 0,
            ..Default::default()
        };
        assert!(zero_page.validate().is_err());

        let oversized = CatalogFilters {
            per_page: 101,
            ..Default::default()
        };
        assert!(oversized.validate().is_err());
    }

    #[test]
    fn unknown_degree_is_rejected() {
        let filters = CatalogFilters {
            degree: Some("doctorate".to_string()),
            ..Default::default()
        };
        assert!(filters.validate().is_err());
    }

    #[test]
    fn user_values_become_bind_parameters() {
        let filters = CatalogFilters {
            query: Some("tech'); --".to_string()),
            city: Some("Almaty".to_string()),
            min_price: Some(100_000),
            degree: Some("bachelor".to_string()),
            ..Default::default()
        };

        let mut qb = build_card_query(&filters);
        let sql = qb.sql();

        // The raw user strings never appear in the SQL text.
        assert!(!sql.contains("tech"));
        assert!(!sql.contains("Almaty"));
        assert!(sql.contains("u.name ILIKE $1"));
        assert!(sql.contains("u.city ILIKE $3"));
        assert!(sql.contains("p.price >= $4"));
        assert!(sql.contains("p.degree = $5"));
    }

    #[test]
    fn pagination_is_bound_and_ordered() {
        let filters = CatalogFilters {
            page: 3,
            per_page: 10,
            sort_by: "name".to_string(),
            sort_order: "asc".to_string(),
            ..Default::default()
        };

        let mut qb = build_card_query(&filters);
        let sql = qb.sql();

        assert!(sql.contains("ORDER BY u.name ASC NULLS LAST, u.id ASC"));
        assert!(sql.ends_with("LIMIT $1 OFFSET $2"));
        assert_eq!(filters.offset(), 20);
    }

    #[test]
    fn pages_do_not_overlap() {
        let windows: Vec<(i64, i64)> = (1..=4)
            .map(|page| {
                let filters = CatalogFilters {
                    page,
                    per_page: 20,
                    ..Default::default()
                };
                (filters.offset(), filters.offset() + filters.per_page)
            })
            .collect();

        for pair in windows.windows(2) {
            // Each page starts exactly where the previous one ended.
            assert_eq!(pair[0].1, pair[1].0);
        }
    }

    #[test]
    fn price_sort_uses_aggregate_alias() {
        let filters = CatalogFilters {
            sort_by: "price".to_string(),
            ..Default::default()
        };
        assert!(build_card_query(&filters)
            .sql()
            .contains("ORDER BY min_price DESC"));
    }

    #[test]
    fn count_query_shares_filters() {
        let filters = CatalogFilters {
            has_grants: Some(true),
            has_dormitory: Some(true),
            ..Default::default()
        };

        let mut qb = build_count_query(&filters);
        let sql = qb.sql();
        assert!(sql.starts_with("SELECT COUNT(*)"));
        assert!(sql.contains("u.has_dormitory = $1"));
        assert!(sql.contains("SELECT g.university_id FROM grants g"));
        assert!(!sql.contains("LIMIT"));
    }

    #[test]
    fn total_pages_rounds_up() {
        assert_eq!(total_pages(0, 20), 0);
        assert_eq!(total_pages(20, 20), 1);
        assert_eq!(total_pages(21, 20), 2);
    }
}
