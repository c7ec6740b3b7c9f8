//! Favorites and the comparison reduction.
//!
//! A favorite is one row per `(user, university)` pair; the unique index plus
//! `ON CONFLICT DO NOTHING` means a repeated add can never create a second
//! row, whatever the request interleaving. Comparison takes 2..=5
//! universities and picks a winner per metric over a fixed field set.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::FromRow;

use crate::{error::AppError, state::AppState};

pub const MIN_COMPARE: usize = 2;
pub const MAX_COMPARE: usize = 5;

/// Duplicates are collapsed before the bounds check; a request listing the
/// same university twice compares it once.
pub fn normalize_compare_ids(ids: &[i64]) -> Result<Vec<i64>, AppError> {
    let mut unique = Vec::with_capacity(ids.len());
    for &id in ids {
        if !unique.contains(&id) {
            unique.push(id);
        }
    }

    if unique.len() < MIN_COMPARE {
        return Err(AppError::Validation(format!(
            "At least {MIN_COMPARE} universities are required for comparison"
        )));
    }

    if unique.len() > MAX_COMPARE {
        return Err(AppError::Validation(format!(
            "At most {MAX_COMPARE} universities can be compared"
        )));
    }

    Ok(unique)
}

/// Favorites feed the same 2..=5 window. The list is already unique per
/// user, so only the bounds are checked; a user with more than five
/// favorites has to pick via an explicit compare request.
pub fn compare_ids_from_favorites(ids: Vec<i64>) -> Result<Vec<i64>, AppError> {
    if ids.len() < MIN_COMPARE {
        return Err(AppError::Validation(format!(
            "Need at least {MIN_COMPARE} favorites to compare"
        )));
    }

    if ids.len() > MAX_COMPARE {
        return Err(AppError::Validation(format!(
            "Can compare at most {MAX_COMPARE} favorites"
        )));
    }

    Ok(ids)
}

pub const INSERT_FAVORITE_SQL: &str =
    "INSERT INTO favorites (user_id, university_id) VALUES ($1, $2) \
     ON CONFLICT (user_id, university_id) DO NOTHING";

/// A repeated add hits the unique index and affects zero rows; that reads
/// back as a conflict, never as a second row.
pub fn ensure_favorite_inserted(rows_affected: u64) -> Result<(), AppError> {
    if rows_affected == 0 {
        return Err(AppError::Conflict("University is already in favorites"));
    }

    Ok(())
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct ComparisonDetail {
    pub id: i64,
    pub name: String,
    pub city: String,
    pub kind: String,
    pub rating: f64,
    pub founded_year: Option<i32>,
    pub total_students: Option<i64>,
    pub total_teachers: Option<i64>,
    pub programs_count: i64,
    pub min_price: Option<i64>,
    pub max_price: Option<i64>,
    pub avg_price: Option<f64>,
    pub grants_count: i64,
    pub has_dormitory: bool,
    pub has_military_department: bool,
    pub employment_rate: Option<f64>,
    pub campus_area: Option<f64>,
    pub website: Option<String>,
    pub logo_url: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ComparisonResult {
    pub universities: Vec<ComparisonDetail>,
    pub winner_categories: BTreeMap<&'static str, i64>,
    pub ai_analysis: Option<String>,
}

pub async fn fetch_comparison_details(
    state: &AppState,
    ids: &[i64],
) -> Result<Vec<ComparisonDetail>, AppError> {
    let details = sqlx::query_as::<_, ComparisonDetail>(
        "SELECT u.id, u.name, u.city, u.kind, u.rating, u.founded_year, \
         u.total_students, u.total_teachers, \
         (SELECT COUNT(*) FROM programs p WHERE p.university_id = u.id) AS programs_count, \
         (SELECT MIN(p.price) FROM programs p WHERE p.university_id = u.id) AS min_price, \
         (SELECT MAX(p.price) FROM programs p WHERE p.university_id = u.id) AS max_price, \
         (SELECT AVG(p.price::double precision) FROM programs p \
              WHERE p.university_id = u.id) AS avg_price, \
         (SELECT COUNT(*) FROM grants g WHERE g.university_id = u.id) AS grants_count, \
         u.has_dormitory, u.has_military_department, u.employment_rate, u.campus_area, \
         u.website, u.logo_url \
         FROM universities u WHERE u.id = ANY($1)",
    )
    .bind(ids)
    .fetch_all(&state.db)
    .await?;

    if details.len() != ids.len() {
        return Err(AppError::NotFound("Some universities were not found"));
    }

    Ok(details)
}

/// Winner per metric. Ties keep the first university in request order, and a
/// university missing the metric entirely never wins it.
pub fn winner_categories(details: &[ComparisonDetail]) -> BTreeMap<&'static str, i64> {
    let mut winners = BTreeMap::new();

    if let Some(id) = best_by(details, |d| Some(d.rating)) {
        winners.insert("highest_rating", id);
    }
    if let Some(id) = best_by(details, |d| d.total_students.map(|n| n as f64)) {
        winners.insert("most_students", id);
    }
    if let Some(id) = best_by(details, |d| Some(d.programs_count as f64)) {
        winners.insert("most_programs", id);
    }
    if let Some(id) = best_by(details, |d| d.min_price.map(|p| -(p as f64))) {
        winners.insert("lowest_price", id);
    }
    if let Some(id) = best_by(details, |d| Some(d.grants_count as f64)) {
        winners.insert("most_grants", id);
    }
    if let Some(id) = best_by(details, |d| d.employment_rate) {
        winners.insert("best_employment", id);
    }

    winners
}

fn best_by<F>(details: &[ComparisonDetail], key: F) -> Option<i64>
where
    F: Fn(&ComparisonDetail) -> Option<f64>,
{
    let mut best: Option<(i64, f64)> = None;

    for detail in details {
        let Some(value) = key(detail) else { continue };

        match best {
            Some((_, current)) if value <= current => {}
            _ => best = Some((detail.id, value)),
        }
    }

    best.map(|(id, _)| id)
}

#[derive(Debug, Serialize, FromRow)]
pub struct FavoriteUniversity {
    pub id: i64,
    pub name: String,
    pub city: String,
    pub rating: f64,
    pub logo_url: Option<String>,
    pub min_price: Option<i64>,
    pub programs_count: i64,
    pub added_at: DateTime<Utc>,
}

pub async fn list_favorites(
    state: &AppState,
    user_id: i64,
) -> Result<Vec<FavoriteUniversity>, AppError> {
    let rows = sqlx::query_as::<_, FavoriteUniversity>(
        "SELECT u.id, u.name, u.city, u.rating, u.logo_url, \
         (SELECT MIN(p.price) FROM programs p WHERE p.university_id = u.id) AS min_price, \
         (SELECT COUNT(*) FROM programs p WHERE p.university_id = u.id) AS programs_count, \
         f.created_at AS added_at \
         FROM favorites f JOIN universities u ON u.id = f.university_id \
         WHERE f.user_id = $1 ORDER BY f.created_at DESC",
    )
    .bind(user_id)
    .fetch_all(&state.db)
    .await?;

    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn detail(id: i64) -> ComparisonDetail {
        ComparisonDetail {
            id,
            name: format!("University {id}"),
            city: "Almaty".to_string(),
            kind: "public".to_string(),
            rating: 0.0,
            founded_year: None,
            total_students: None,
            total_teachers: None,
            programs_count: 0,
            min_price: None,
            max_price: None,
            avg_price: None,
            grants_count: 0,
            has_dormitory: false,
            has_military_department: false,
            employment_rate: None,
            campus_area: None,
            website: None,
            logo_url: None,
        }
    }

    #[test]
    fn too_few_ids_are_rejected() {
        assert!(normalize_compare_ids(&[1]).is_err());
        assert!(normalize_compare_ids(&[]).is_err());
    }

    #[test]
    fn too_many_ids_are_rejected() {
        assert!(normalize_compare_ids(&[1, 2, 3, 4, 5, 6]).is_err());
    }

    #[test]
    fn bounds_are_inclusive() {
        assert_eq!(normalize_compare_ids(&[1, 2]).unwrap(), vec![1, 2]);
        assert_eq!(
            normalize_compare_ids(&[1, 2, 3, 4, 5]).unwrap(),
            vec![1, 2, 3, 4, 5]
        );
    }

    #[test]
    fn duplicate_ids_collapse_before_the_check() {
        assert!(normalize_compare_ids(&[7, 7]).is_err());
        assert_eq!(normalize_compare_ids(&[7, 7, 9]).unwrap(), vec![7, 9]);
    }

    #[test]
    fn six_favorites_are_rejected_not_truncated() {
        let result = compare_ids_from_favorites(vec![1, 2, 3, 4, 5, 6]);
        assert!(matches!(result, Err(AppError::Validation(_))));
    }

    #[test]
    fn favorite_bounds_are_inclusive() {
        assert!(compare_ids_from_favorites(vec![1]).is_err());
        assert_eq!(compare_ids_from_favorites(vec![1, 2]).unwrap(), vec![1, 2]);
        assert_eq!(
            compare_ids_from_favorites(vec![1, 2, 3, 4, 5]).unwrap(),
            vec![1, 2, 3, 4, 5]
        );
    }

    #[test]
    fn favorite_insert_ignores_a_duplicate_row() {
        // The statement itself guarantees no second row can appear.
        assert!(INSERT_FAVORITE_SQL.contains("ON CONFLICT (user_id, university_id) DO NOTHING"));
    }

    #[test]
    fn zero_inserted_rows_read_as_a_conflict() {
        assert!(matches!(
            ensure_favorite_inserted(0),
            Err(AppError::Conflict(_))
        ));
        assert!(ensure_favorite_inserted(1).is_ok());
    }

    #[test]
    fn winners_pick_the_best_metric() {
        let mut a = detail(1);
        a.rating = 9.0;
        a.min_price = Some(500_000);
        a.grants_count = 2;

        let mut b = detail(2);
        b.rating = 7.5;
        b.min_price = Some(300_000);
        b.total_students = Some(12_000);
        b.employment_rate = Some(0.91);

        let winners = winner_categories(&[a, b]);

        assert_eq!(winners["highest_rating"], 1);
        assert_eq!(winners["lowest_price"], 2);
        assert_eq!(winners["most_grants"], 1);
        assert_eq!(winners["most_students"], 2);
        assert_eq!(winners["best_employment"], 2);
    }

    #[test]
    fn ties_keep_request_order() {
        let mut a = detail(1);
        a.rating = 8.0;
        let mut b = detail(2);
        b.rating = 8.0;

        let winners = winner_categories(&[a, b]);
        assert_eq!(winners["highest_rating"], 1);
    }

    #[test]
    fn missing_metric_never_wins() {
        let a = detail(1); // no employment rate
        let mut b = detail(2);
        b.employment_rate = Some(0.5);

        let winners = winner_categories(&[a, b]);
        assert_eq!(winners["best_employment"], 2);

        let all_missing = winner_categories(&[detail(1), detail(2)]);
        assert!(!all_missing.contains_key("best_employment"));
    }
}
