use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use tracing::info;

use crate::auth::AuthUser;
use crate::error::AppError;
use crate::models::{Degree, Dormitory, Grant, Program, University, UniversityKind};
use crate::state::AppState;

const UNIVERSITY_COLUMNS: &str = "id, name, city, kind, rating, description, mission, \
    website, logo_url, founded_year, total_students, total_teachers, employment_rate, \
    campus_area, has_dormitory, has_military_department";

fn validate_kind(kind: &str) -> Result<(), AppError> {
    kind.parse::<UniversityKind>()
        .map(|_| ())
        .map_err(|_| AppError::Validation(format!("Unknown university kind: {kind}")))
}

fn validate_rating(rating: f64) -> Result<(), AppError> {
    if !(0.0..=10.0).contains(&rating) {
        return Err(AppError::Validation(
            "Rating must be between 0 and 10".to_string(),
        ));
    }

    Ok(())
}

async fn ensure_university_exists(state: &AppState, id: i64) -> Result<(), AppError> {
    let exists: bool =
        sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM universities WHERE id = $1)")
            .bind(id)
            .fetch_one(&state.db)
            .await?;

    if !exists {
        return Err(AppError::NotFound("University not found"));
    }

    Ok(())
}

#[derive(Debug, Deserialize)]
pub struct ListParams {
    pub city: Option<String>,
    pub kind: Option<String>,
}

pub async fn list(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ListParams>,
) -> Result<Json<Vec<University>>, AppError> {
    if let Some(kind) = &params.kind {
        validate_kind(kind)?;
    }

    let mut sql = format!("SELECT {UNIVERSITY_COLUMNS} FROM universities WHERE TRUE");
    if params.city.is_some() {
        sql.push_str(" AND city ILIKE $1");
    }
    if params.kind.is_some() {
        let n = if params.city.is_some() { 2 } else { 1 };
        sql.push_str(&format!(" AND kind = ${n}"));
    }
    sql.push_str(" ORDER BY rating DESC, id ASC LIMIT 100");

    let mut query = sqlx::query_as::<_, University>(&sql);
    if let Some(city) = &params.city {
        query = query.bind(format!("%{city}%"));
    }
    if let Some(kind) = &params.kind {
        query = query.bind(kind);
    }

    Ok(Json(query.fetch_all(&state.db).await?))
}

#[derive(Debug, Serialize)]
pub struct UniversityDetail {
    #[serde(flatten)]
    pub university: University,
    pub programs: Vec<Program>,
    pub grants: Vec<Grant>,
    pub dormitories: Vec<Dormitory>,
}

pub async fn detail(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<UniversityDetail>, AppError> {
    let university = sqlx::query_as::<_, University>(&format!(
        "SELECT {UNIVERSITY_COLUMNS} FROM universities WHERE id = $1"
    ))
    .bind(id)
    .fetch_optional(&state.db)
    .await?
    .ok_or(AppError::NotFound("University not found"))?;

    let programs = sqlx::query_as::<_, Program>(
        "SELECT id, university_id, name, degree, price, duration_years, min_score, \
         language, study_form, description \
         FROM programs WHERE university_id = $1 ORDER BY name",
    )
    .bind(id)
    .fetch_all(&state.db)
    .await?;

    let grants = sqlx::query_as::<_, Grant>(
        "SELECT id, university_id, name, kind, description, min_score, amount, \
         for_applicants FROM grants WHERE university_id = $1 ORDER BY name",
    )
    .bind(id)
    .fetch_all(&state.db)
    .await?;

    let dormitories = sqlx::query_as::<_, Dormitory>(
        "SELECT id, university_id, name, address, capacity, price_per_month, \
         has_wifi, has_kitchen, has_laundry, description \
         FROM dormitories WHERE university_id = $1 ORDER BY name",
    )
    .bind(id)
    .fetch_all(&state.db)
    .await?;

    Ok(Json(UniversityDetail {
        university,
        programs,
        grants,
        dormitories,
    }))
}

#[derive(Debug, Deserialize)]
pub struct CreateUniversity {
    pub name: String,
    pub city: String,
    pub kind: String,
    #[serde(default)]
    pub rating: f64,
    pub description: Option<String>,
    pub mission: Option<String>,
    pub website: Option<String>,
    pub logo_url: Option<String>,
    pub founded_year: Option<i32>,
    pub total_students: Option<i64>,
    pub total_teachers: Option<i64>,
    pub employment_rate: Option<f64>,
    pub campus_area: Option<f64>,
    #[serde(default)]
    pub has_dormitory: bool,
    #[serde(default)]
    pub has_military_department: bool,
}

pub async fn create(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Json(request): Json<CreateUniversity>,
) -> Result<(StatusCode, Json<University>), AppError> {
    user.require_admin()?;
    validate_kind(&request.kind)?;
    validate_rating(request.rating)?;

    if request.name.trim().is_empty() {
        return Err(AppError::Validation("Name must not be empty".to_string()));
    }

    let university = sqlx::query_as::<_, University>(&format!(
        "INSERT INTO universities (name, city, kind, rating, description, mission, \
         website, logo_url, founded_year, total_students, total_teachers, \
         employment_rate, campus_area, has_dormitory, has_military_department) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15) \
         RETURNING {UNIVERSITY_COLUMNS}"
    ))
    .bind(&request.name)
    .bind(&request.city)
    .bind(&request.kind)
    .bind(request.rating)
    .bind(&request.description)
    .bind(&request.mission)
    .bind(&request.website)
    .bind(&request.logo_url)
    .bind(request.founded_year)
    .bind(request.total_students)
    .bind(request.total_teachers)
    .bind(request.employment_rate)
    .bind(request.campus_area)
    .bind(request.has_dormitory)
    .bind(request.has_military_department)
    .fetch_one(&state.db)
    .await?;

    info!(university_id = university.id, "created university");
    Ok((StatusCode::CREATED, Json(university)))
}

#[derive(Debug, Deserialize)]
pub struct UpdateUniversity {
    pub name: Option<String>,
    pub city: Option<String>,
    pub kind: Option<String>,
    pub rating: Option<f64>,
    pub description: Option<String>,
    pub mission: Option<String>,
    pub website: Option<String>,
    pub logo_url: Option<String>,
    pub founded_year: Option<i32>,
    pub total_students: Option<i64>,
    pub total_teachers: Option<i64>,
    pub employment_rate: Option<f64>,
    pub campus_area: Option<f64>,
    pub has_dormitory: Option<bool>,
    pub has_military_department: Option<bool>,
}

pub async fn update(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(id): Path<i64>,
    Json(request): Json<UpdateUniversity>,
) -> Result<Json<University>, AppError> {
    user.require_admin()?;
    if let Some(kind) = &request.kind {
        validate_kind(kind)?;
    }
    if let Some(rating) = request.rating {
        validate_rating(rating)?;
    }

    let university = sqlx::query_as::<_, University>(&format!(
        "UPDATE universities SET \
         name = COALESCE($2, name), city = COALESCE($3, city), \
         kind = COALESCE($4, kind), rating = COALESCE($5, rating), \
         description = COALESCE($6, description), mission = COALESCE($7, mission), \
         website = COALESCE($8, website), logo_url = COALESCE($9, logo_url), \
         founded_year = COALESCE($10, founded_year), \
         total_students = COALESCE($11, total_students), \
         total_teachers = COALESCE($12, total_teachers), \
         employment_rate = COALESCE($13, employment_rate), \
         campus_area = COALESCE($14, campus_area), \
         has_dormitory = COALESCE($15, has_dormitory), \
         has_military_department = COALESCE($16, has_military_department) \
         WHERE id = $1 RETURNING {UNIVERSITY_COLUMNS}"
    ))
    .bind(id)
    .bind(&request.name)
    .bind(&request.city)
    .bind(&request.kind)
    .bind(request.rating)
    .bind(&request.description)
    .bind(&request.mission)
    .bind(&request.website)
    .bind(&request.logo_url)
    .bind(request.founded_year)
    .bind(request.total_students)
    .bind(request.total_teachers)
    .bind(request.employment_rate)
    .bind(request.campus_area)
    .bind(request.has_dormitory)
    .bind(request.has_military_department)
    .fetch_optional(&state.db)
    .await?
    .ok_or(AppError::NotFound("University not found"))?;

    Ok(Json(university))
}

pub async fn remove(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(id): Path<i64>,
) -> Result<StatusCode, AppError> {
    user.require_admin()?;

    let result = sqlx::query("DELETE FROM universities WHERE id = $1")
        .bind(id)
        .execute(&state.db)
        .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound("University not found"));
    }

    info!(university_id = id, "deleted university");
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize)]
pub struct CreateProgram {
    pub name: String,
    pub degree: String,
    pub price: Option<i64>,
    pub duration_years: Option<i32>,
    pub min_score: Option<i32>,
    pub language: Option<String>,
    pub study_form: Option<String>,
    pub description: Option<String>,
}

pub async fn create_program(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(id): Path<i64>,
    Json(request): Json<CreateProgram>,
) -> Result<(StatusCode, Json<Program>), AppError> {
    user.require_admin()?;
    request
        .degree
        .parse::<Degree>()
        .map_err(|_| AppError::Validation(format!("Unknown degree: {}", request.degree)))?;
    if request.price.is_some_and(|p| p < 0) {
        return Err(AppError::Validation("Price must not be negative".to_string()));
    }

    ensure_university_exists(&state, id).await?;

    let program = sqlx::query_as::<_, Program>(
        "INSERT INTO programs (university_id, name, degree, price, duration_years, \
         min_score, language, study_form, description) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9) \
         RETURNING id, university_id, name, degree, price, duration_years, min_score, \
         language, study_form, description",
    )
    .bind(id)
    .bind(&request.name)
    .bind(&request.degree)
    .bind(request.price)
    .bind(request.duration_years)
    .bind(request.min_score)
    .bind(&request.language)
    .bind(&request.study_form)
    .bind(&request.description)
    .fetch_one(&state.db)
    .await?;

    Ok((StatusCode::CREATED, Json(program)))
}

#[derive(Debug, Deserialize)]
pub struct CreateGrant {
    pub name: String,
    pub kind: String,
    pub description: Option<String>,
    pub min_score: Option<i32>,
    pub amount: Option<i64>,
    #[serde(default)]
    pub for_applicants: bool,
}

pub async fn create_grant(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(id): Path<i64>,
    Json(request): Json<CreateGrant>,
) -> Result<(StatusCode, Json<Grant>), AppError> {
    user.require_admin()?;
    ensure_university_exists(&state, id).await?;

    let grant = sqlx::query_as::<_, Grant>(
        "INSERT INTO grants (university_id, name, kind, description, min_score, amount, \
         for_applicants) VALUES ($1, $2, $3, $4, $5, $6, $7) \
         RETURNING id, university_id, name, kind, description, min_score, amount, \
         for_applicants",
    )
    .bind(id)
    .bind(&request.name)
    .bind(&request.kind)
    .bind(&request.description)
    .bind(request.min_score)
    .bind(request.amount)
    .bind(request.for_applicants)
    .fetch_one(&state.db)
    .await?;

    Ok((StatusCode::CREATED, Json(grant)))
}

#[derive(Debug, Deserialize)]
pub struct CreateDormitory {
    pub name: String,
    pub address: Option<String>,
    pub capacity: Option<i32>,
    pub price_per_month: Option<i64>,
    #[serde(default)]
    pub has_wifi: bool,
    #[serde(default)]
    pub has_kitchen: bool,
    #[serde(default)]
    pub has_laundry: bool,
    pub description: Option<String>,
}

pub async fn create_dormitory(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(id): Path<i64>,
    Json(request): Json<CreateDormitory>,
) -> Result<(StatusCode, Json<Dormitory>), AppError> {
    user.require_admin()?;
    ensure_university_exists(&state, id).await?;

    let dormitory = sqlx::query_as::<_, Dormitory>(
        "INSERT INTO dormitories (university_id, name, address, capacity, \
         price_per_month, has_wifi, has_kitchen, has_laundry, description) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9) \
         RETURNING id, university_id, name, address, capacity, price_per_month, \
         has_wifi, has_kitchen, has_laundry, description",
    )
    .bind(id)
    .bind(&request.name)
    .bind(&request.address)
    .bind(request.capacity)
    .bind(request.price_per_month)
    .bind(request.has_wifi)
    .bind(request.has_kitchen)
    .bind(request.has_laundry)
    .bind(&request.description)
    .fetch_one(&state.db)
    .await?;

    Ok((StatusCode::CREATED, Json(dormitory)))
}

#[derive(Debug, Deserialize)]
pub struct ProgramSearchParams {
    pub q: Option<String>,
    pub degree: Option<String>,
    pub city: Option<String>,
    pub max_price: Option<i64>,
}

#[derive(Debug, Serialize, FromRow)]
pub struct ProgramSearchRow {
    pub id: i64,
    pub name: String,
    pub degree: String,
    pub price: Option<i64>,
    pub university_id: i64,
    pub university_name: String,
    pub city: String,
}

pub async fn search_programs(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ProgramSearchParams>,
) -> Result<Json<Vec<ProgramSearchRow>>, AppError> {
    if let Some(degree) = &params.degree {
        degree
            .parse::<Degree>()
            .map_err(|_| AppError::Validation(format!("Unknown degree: {degree}")))?;
    }
    if params.max_price.is_some_and(|p| p < 0) {
        return Err(AppError::Validation("Price must not be negative".to_string()));
    }

    let mut builder = sqlx::QueryBuilder::<sqlx::Postgres>::new(
        "SELECT p.id, p.name, p.degree, p.price, p.university_id, \
         u.name AS university_name, u.city \
         FROM programs p JOIN universities u ON u.id = p.university_id WHERE TRUE",
    );

    if let Some(q) = &params.q {
        builder.push(" AND p.name ILIKE ");
        builder.push_bind(format!("%{q}%"));
    }
    if let Some(degree) = &params.degree {
        builder.push(" AND p.degree = ");
        builder.push_bind(degree.clone());
    }
    if let Some(city) = &params.city {
        builder.push(" AND u.city ILIKE ");
        builder.push_bind(format!("%{city}%"));
    }
    if let Some(max_price) = params.max_price {
        builder.push(" AND p.price <= ");
        builder.push_bind(max_price);
    }
    builder.push(" ORDER BY p.price ASC NULLS LAST, p.id ASC LIMIT 100");

    let rows = builder
        .build_query_as::<ProgramSearchRow>()
        .fetch_all(&state.db)
        .await?;

    Ok(Json(rows))
}
