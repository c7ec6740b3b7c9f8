//! Assistant pipelines: knowledge sync, grounded chat, recommendations,
//! comparison narration, text structuring.
//!
//! Sync renders one text chunk per university and per program, embeds them in
//! batches and rebuilds the vector collection from scratch. Chat retrieves
//! the nearest chunks and falls back to web search when retrieval comes back
//! thin; every other upstream failure surfaces as an error.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use tracing::{info, warn};

use crate::error::AppError;
use crate::favorites::ComparisonDetail;
use crate::llm::extract_json;
use crate::models::{Program, University};
use crate::state::AppState;
use crate::vectors::ScoredDoc;
use crate::websearch::WebHit;

/// Chunks fetched per chat question.
pub const RETRIEVAL_K: u64 = 4;
/// Retrieval below this many hits triggers the web-search fallback.
pub const MIN_CONTEXT_HITS: usize = 2;
/// Minimum cosine similarity of the best hit to count as grounded.
pub const MIN_SIMILARITY: f32 = 0.25;
/// Web results requested on fallback.
const WEB_RESULTS: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocKind {
    University,
    Program,
}

impl DocKind {
    pub fn as_str(self) -> &'static str {
        match self {
            DocKind::University => "university",
            DocKind::Program => "program",
        }
    }
}

impl fmt::Display for DocKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DocKind {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "university" => Ok(DocKind::University),
            "program" => Ok(DocKind::Program),
            _ => Err(()),
        }
    }
}

/// One rendered chunk headed for the vector store.
#[derive(Debug, Clone)]
pub struct KnowledgeDoc {
    pub kind: DocKind,
    pub entity_id: i64,
    pub university_id: i64,
    pub text: String,
}

pub fn render_university_doc(u: &University) -> KnowledgeDoc {
    let mut text = format!("{} is a {} university in {}.", u.name, u.kind, u.city);

    if let Some(year) = u.founded_year {
        text.push_str(&format!(" Founded in {year}."));
    }
    if let Some(students) = u.total_students {
        text.push_str(&format!(" {students} students."));
    }
    text.push_str(&format!(" Rating {:.1}.", u.rating));
    if let Some(rate) = u.employment_rate {
        text.push_str(&format!(" Graduate employment rate {:.0}%.", rate * 100.0));
    }
    if u.has_dormitory {
        text.push_str(" Has dormitories.");
    }
    if u.has_military_department {
        text.push_str(" Has a military department.");
    }
    if let Some(description) = &u.description {
        text.push(' ');
        text.push_str(description);
    }
    if let Some(mission) = &u.mission {
        text.push_str(&format!(" Mission: {mission}"));
    }

    KnowledgeDoc {
        kind: DocKind::University,
        entity_id: u.id,
        university_id: u.id,
        text,
    }
}

pub fn render_program_doc(p: &Program, university_name: &str) -> KnowledgeDoc {
    let mut text = format!(
        "{} is a {} program at {}.",
        p.name, p.degree, university_name
    );

    if let Some(price) = p.price {
        text.push_str(&format!(" Tuition {price} KZT per year."));
    }
    if let Some(years) = p.duration_years {
        text.push_str(&format!(" Duration {years} years."));
    }
    if let Some(score) = p.min_score {
        text.push_str(&format!(" Minimum entrance score {score}."));
    }
    if let Some(language) = &p.language {
        text.push_str(&format!(" Taught in {language}."));
    }
    if let Some(form) = &p.study_form {
        text.push_str(&format!(" Study form: {form}."));
    }
    if let Some(description) = &p.description {
        text.push(' ');
        text.push_str(description);
    }

    KnowledgeDoc {
        kind: DocKind::Program,
        entity_id: p.id,
        university_id: p.university_id,
        text,
    }
}

#[derive(Debug, Serialize)]
pub struct SyncReport {
    pub universities: usize,
    pub programs: usize,
    pub indexed: usize,
}

#[derive(Debug, FromRow)]
struct ProgramWithUniversity {
    #[sqlx(flatten)]
    program: Program,
    university_name: String,
}

/// Re-index the whole catalog. Admin-only at the route layer.
pub async fn sync_knowledge(state: &AppState) -> Result<SyncReport, AppError> {
    let universities = sqlx::query_as::<_, University>(
        "SELECT id, name, city, kind, rating, description, mission, website, logo_url, \
         founded_year, total_students, total_teachers, employment_rate, campus_area, \
         has_dormitory, has_military_department FROM universities ORDER BY id",
    )
    .fetch_all(&state.db)
    .await?;

    let programs = sqlx::query_as::<_, ProgramWithUniversity>(
        "SELECT p.id, p.university_id, p.name, p.degree, p.price, p.duration_years, \
         p.min_score, p.language, p.study_form, p.description, \
         u.name AS university_name \
         FROM programs p JOIN universities u ON u.id = p.university_id ORDER BY p.id",
    )
    .fetch_all(&state.db)
    .await?;

    let mut docs: Vec<KnowledgeDoc> = universities.iter().map(render_university_doc).collect();
    docs.extend(
        programs
            .iter()
            .map(|row| render_program_doc(&row.program, &row.university_name)),
    );

    let texts: Vec<String> = docs.iter().map(|d| d.text.clone()).collect();
    let embeddings = state.embedder.embed_batch(&texts).await?;

    state
        .vectors
        .rebuild(state.embedder.dimensions())
        .await?;
    let indexed = state.vectors.upsert(&docs, embeddings).await?;

    info!(
        universities = universities.len(),
        programs = programs.len(),
        indexed,
        "knowledge sync complete"
    );

    Ok(SyncReport {
        universities: universities.len(),
        programs: programs.len(),
        indexed,
    })
}

#[derive(Debug, Serialize)]
pub struct ChatAnswer {
    pub answer: String,
    pub sources: Vec<String>,
    pub used_web_search: bool,
}

/// Enough hits, and the best one actually close to the question.
pub fn context_is_sufficient(hits: &[ScoredDoc]) -> bool {
    hits.len() >= MIN_CONTEXT_HITS
        && hits.first().is_some_and(|hit| hit.score >= MIN_SIMILARITY)
}

const CHAT_SYSTEM: &str = "You are an assistant for applicants choosing a university in \
Kazakhstan. Answer using only the provided context. If the context does not contain the \
answer, say so plainly. Answer in the language of the question.";

fn build_chat_prompt(question: &str, hits: &[ScoredDoc], web: &[WebHit]) -> String {
    let mut prompt = String::from("Context:\n");

    for hit in hits {
        prompt.push_str("- ");
        prompt.push_str(&hit.text);
        prompt.push('\n');
    }
    for hit in web {
        prompt.push_str(&format!("- [web] {}: {}\n", hit.title, hit.content));
    }

    prompt.push_str(&format!("\nQuestion: {question}"));
    prompt
}

/// `kind` narrows retrieval to university or program chunks when the caller
/// already knows which it is asking about.
pub async fn chat(
    state: &AppState,
    question: &str,
    kind: Option<DocKind>,
) -> Result<ChatAnswer, AppError> {
    let vector = state.embedder.embed(question).await?;
    let hits = state.vectors.search(vector, RETRIEVAL_K, kind).await?;

    let mut web = Vec::new();
    if !context_is_sufficient(&hits) {
        // The answer must not silently degrade on a search outage; keep
        // whatever catalog context we have and say so in the logs.
        match state.websearch.search(question, WEB_RESULTS).await {
            Ok(hits) => web = hits,
            Err(error) => warn!(%error, "web search fallback failed"),
        }
    }

    let prompt = build_chat_prompt(question, &hits, &web);
    let answer = state.llm.complete(CHAT_SYSTEM, &prompt).await?;

    let mut sources: Vec<String> = hits
        .iter()
        .map(|hit| format!("{}:{}", hit.kind, hit.entity_id))
        .collect();
    sources.extend(web.iter().map(|hit| hit.url.clone()));

    Ok(ChatAnswer {
        answer,
        sources,
        used_web_search: !web.is_empty(),
    })
}

#[derive(Debug, Deserialize)]
pub struct RecommendRequest {
    pub score: Option<i32>,
    pub city: Option<String>,
    pub budget: Option<i64>,
    pub interests: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Recommendation {
    pub university_id: i64,
    pub reason: String,
    pub match_percentage: i32,
}

#[derive(Debug, FromRow)]
struct Candidate {
    id: i64,
    name: String,
    city: String,
    kind: String,
    rating: f64,
    description: Option<String>,
    min_price: Option<i64>,
}

fn candidate_digest(candidates: &[Candidate]) -> String {
    let mut digest = String::new();

    for c in candidates {
        let description: String = c
            .description
            .as_deref()
            .unwrap_or("")
            .chars()
            .take(200)
            .collect();
        digest.push_str(&format!(
            "id={} | {} | {} | {} | rating {:.1} | min price {} | {}\n",
            c.id,
            c.name,
            c.city,
            c.kind,
            c.rating,
            c.min_price.map_or("unknown".to_string(), |p| p.to_string()),
            description,
        ));
    }

    digest
}

const RECOMMEND_SYSTEM: &str = "You rank universities for an applicant. Reply with JSON only: \
an array of {\"university_id\": number, \"reason\": string, \"match_percentage\": number} \
sorted from best to worst match. Use only ids from the candidate list.";

pub async fn recommend(
    state: &AppState,
    request: &RecommendRequest,
) -> Result<Vec<Recommendation>, AppError> {
    let mut sql = String::from(
        "SELECT u.id, u.name, u.city, u.kind, u.rating, u.description, \
         (SELECT MIN(p.price) FROM programs p WHERE p.university_id = u.id) AS min_price \
         FROM universities u WHERE TRUE",
    );
    if request.city.is_some() {
        sql.push_str(" AND u.city ILIKE $1");
    }
    if request.budget.is_some() {
        let n = if request.city.is_some() { 2 } else { 1 };
        sql.push_str(&format!(
            " AND EXISTS (SELECT 1 FROM programs p WHERE p.university_id = u.id \
             AND p.price <= ${n})"
        ));
    }
    sql.push_str(" ORDER BY u.rating DESC LIMIT 20");

    let mut query = sqlx::query_as::<_, Candidate>(&sql);
    if let Some(city) = &request.city {
        query = query.bind(format!("%{city}%"));
    }
    if let Some(budget) = request.budget {
        query = query.bind(budget);
    }

    let candidates = query.fetch_all(&state.db).await?;
    if candidates.is_empty() {
        return Ok(Vec::new());
    }

    let mut profile = String::from("Applicant profile:");
    if let Some(score) = request.score {
        profile.push_str(&format!(" entrance score {score};"));
    }
    if let Some(city) = &request.city {
        profile.push_str(&format!(" wants to study in {city};"));
    }
    if let Some(budget) = request.budget {
        profile.push_str(&format!(" budget {budget} KZT per year;"));
    }
    if let Some(interests) = &request.interests {
        profile.push_str(&format!(" interests: {interests};"));
    }

    let prompt = format!(
        "{profile}\n\nCandidates:\n{}",
        candidate_digest(&candidates)
    );

    let raw = state.llm.complete(RECOMMEND_SYSTEM, &prompt).await?;
    let picks: Vec<Recommendation> = serde_json::from_str(extract_json(&raw))
        .map_err(|e| AppError::Assistant(format!("Unparseable recommendation reply: {e}")))?;

    // Drop hallucinated ids.
    let known: Vec<i64> = candidates.iter().map(|c| c.id).collect();
    Ok(picks
        .into_iter()
        .filter(|pick| known.contains(&pick.university_id))
        .collect())
}

const COMPARE_SYSTEM: &str = "You compare universities for an applicant. Write a short \
markdown summary: strengths of each, who each one suits, and a final suggestion. \
Base it only on the provided data.";

pub async fn compare_narrative(
    state: &AppState,
    details: &[ComparisonDetail],
) -> Result<String, AppError> {
    let data = serde_json::to_string_pretty(details)?;
    state
        .llm
        .complete(COMPARE_SYSTEM, &format!("Universities:\n{data}"))
        .await
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StructuredText {
    pub history: Option<String>,
    pub mission: Option<String>,
    pub contacts: Contacts,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct Contacts {
    pub phone: Option<String>,
    pub email: Option<String>,
}

const STRUCTURE_SYSTEM: &str = "Extract facts from raw text about a university. Reply with \
JSON only: {\"history\": string|null, \"mission\": string|null, \
\"contacts\": {\"phone\": string|null, \"email\": string|null}}.";

pub async fn structure_text(state: &AppState, text: &str) -> Result<StructuredText, AppError> {
    let raw = state.llm.complete(STRUCTURE_SYSTEM, text).await?;
    serde_json::from_str(extract_json(&raw))
        .map_err(|e| AppError::Assistant(format!("Unparseable structuring reply: {e}")))
}
