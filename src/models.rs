//! Row types for the catalog schema and the enums validated at the API edge.
//!
//! Enum-like columns (`role`, `kind`, `degree`) are stored as plain text;
//! the enums here are the accepted vocabulary, parsed before anything is
//! bound into a query.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Admin,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Admin => "admin",
        }
    }
}

impl FromStr for Role {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(Role::User),
            "admin" => Ok(Role::Admin),
            _ => Err(()),
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UniversityKind {
    Public,
    Private,
    International,
}

impl UniversityKind {
    pub fn as_str(self) -> &'static str {
        match self {
            UniversityKind::Public => "public",
            UniversityKind::Private => "private",
            UniversityKind::International => "international",
        }
    }
}

impl FromStr for UniversityKind {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "public" => Ok(UniversityKind::Public),
            "private" => Ok(UniversityKind::Private),
            "international" => Ok(UniversityKind::International),
            _ => Err(()),
        }
    }
}

impl fmt::Display for UniversityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Degree {
    Bachelor,
    Master,
    Phd,
}

impl Degree {
    pub fn as_str(self) -> &'static str {
        match self {
            Degree::Bachelor => "bachelor",
            Degree::Master => "master",
            Degree::Phd => "phd",
        }
    }
}

impl FromStr for Degree {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "bachelor" => Ok(Degree::Bachelor),
            "master" => Ok(Degree::Master),
            "phd" => Ok(Degree::Phd),
            _ => Err(()),
        }
    }
}

impl fmt::Display for Degree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct University {
    pub id: i64,
    pub name: String,
    pub city: String,
    pub kind: String,
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
    pub has_dormitory: bool,
    pub has_military_department: bool,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Program {
    pub id: i64,
    pub university_id: i64,
    pub name: String,
    pub degree: String,
    pub price: Option<i64>,
    pub duration_years: Option<i32>,
    pub min_score: Option<i32>,
    pub language: Option<String>,
    pub study_form: Option<String>,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Grant {
    pub id: i64,
    pub university_id: i64,
    pub name: String,
    pub kind: String,
    pub description: Option<String>,
    pub min_score: Option<i32>,
    pub amount: Option<i64>,
    pub for_applicants: bool,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Dormitory {
    pub id: i64,
    pub university_id: i64,
    pub name: String,
    pub address: Option<String>,
    pub capacity: Option<i32>,
    pub price_per_month: Option<i64>,
    pub has_wifi: bool,
    pub has_kitchen: bool,
    pub has_laundry: bool,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct User {
    pub id: i64,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub full_name: Option<String>,
    pub role: String,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_vocabulary() {
        assert_eq!("admin".parse::<Role>(), Ok(Role::Admin));
        assert_eq!("user".parse::<Role>(), Ok(Role::User));
        assert!("root".parse::<Role>().is_err());
    }

    #[test]
    fn kind_vocabulary() {
        assert_eq!(
            "international".parse::<UniversityKind>(),
            Ok(UniversityKind::International)
        );
        assert!("municipal".parse::<UniversityKind>().is_err());
        assert_eq!(UniversityKind::Private.to_string(), "private");
    }

    #[test]
    fn degree_vocabulary() {
        assert_eq!("phd".parse::<Degree>(), Ok(Degree::Phd));
        assert!("PhD".parse::<Degree>().is_err());
    }
}
