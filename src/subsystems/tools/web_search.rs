//! `web_search`: Google results via Serper, condensed into a short digest.
//!
//! Serper answers with several optional blocks. [`format_results`] keeps the
//! most useful ones in a fixed priority order and caps the output so a
//! search never floods the model's context.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use tracing::{debug, error};

use super::{ToolError, WEB_SEARCH};
use crate::llm::ToolDefinition;

/// Upper bound on the digest handed back to the model.
pub const MAX_RESULT_CHARS: usize = 2_000;

const MAX_PLACES: usize = 4;
const MAX_ORGANIC: usize = 3;
const MAX_ATTRIBUTES: usize = 6;

const DESCRIPTION: &str = "Search Google for real-time information NOT available in the wedding \
knowledge base. Use this for: (1) hotel/venue phone numbers, Google Maps links, exact addresses; \
(2) distances or travel times between locations, directions; (3) local services near the venues \
such as makeup artists, salons, laundry, tailors, pharmacies, ATMs, restaurants, florists; \
(4) weather in Jaipur; (5) any other live factual detail the knowledge base cannot answer. \
Do NOT call this for anything already in the knowledge base (itinerary, dress codes, food, shuttles). \
For any \"near me\" or \"nearby\" query anchor it to the actual area: both venues are in Sitapura \
RIICO Industrial Area, Tonk Road, Jaipur 302022, so put \"Sitapura Tonk Road Jaipur 302022\" in the \
query instead of just the hotel name.";

const QUERY_DESCRIPTION: &str = "Precise, area-anchored search query, e.g. \
\"InterContinental Jaipur Tonk Road phone number\", \
\"Jaipur airport to Sitapura Tonk Road Jaipur distance\", \
\"bridal makeup artists Sitapura Tonk Road Jaipur 302022\".";

/// Function-calling definition offered to the model.
pub fn definition() -> ToolDefinition {
    ToolDefinition {
        name: WEB_SEARCH.to_string(),
        description: DESCRIPTION.to_string(),
        parameters: json!({
            "type": "object",
            "properties": {
                "query": { "type": "string", "description": QUERY_DESCRIPTION }
            },
            "required": ["query"]
        }),
    }
}

// ── Backends ──────────────────────────────────────────────────────────────────

/// Search backends. Enum dispatch, same as the LLM providers.
#[derive(Debug, Clone)]
pub enum SearchBackend {
    Serper(SerperClient),
    Dummy(DummySearch),
}

impl SearchBackend {
    pub async fn search(&self, query: &str) -> Result<String, ToolError> {
        match self {
            SearchBackend::Serper(c) => c.search(query).await,
            SearchBackend::Dummy(d) => d.search(query),
        }
    }
}

/// Serper.dev client (`POST /search` with an `X-API-KEY` header).
#[derive(Debug, Clone)]
pub struct SerperClient {
    client: Client,
    api_url: String,
    api_key: String,
    result_count: u32,
    locale: String,
    language: String,
}

#[derive(Debug, Serialize)]
struct SerperRequest<'a> {
    q: &'a str,
    num: u32,
    gl: &'a str,
    hl: &'a str,
}

impl SerperClient {
    pub fn new(
        api_url: String,
        api_key: String,
        result_count: u32,
        locale: String,
        language: String,
        timeout_seconds: u64,
    ) -> Result<Self, ToolError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_seconds))
            .build()
            .map_err(|e| ToolError::Search(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { client, api_url, api_key, result_count, locale, language })
    }

    pub async fn search(&self, query: &str) -> Result<String, ToolError> {
        let body = SerperRequest {
            q: query,
            num: self.result_count,
            gl: &self.locale,
            hl: &self.language,
        };
        debug!(url = %self.api_url, %query, "serper request");

        let response = self
            .client
            .post(&self.api_url)
            .header("X-API-KEY", &self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                error!(error = %e, timeout = e.is_timeout(), "serper request failed (transport)");
                ToolError::Search(e.to_string())
            })?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            error!(%status, body = %text, "serper returned error status");
            return Err(ToolError::Search(format!("search API returned HTTP {}", status.as_u16())));
        }

        let data = response
            .json::<SerperResponse>()
            .await
            .map_err(|e| ToolError::Search(format!("failed to parse search response: {e}")))?;

        Ok(format_results(&data, query))
    }
}

/// Offline backend: canned answer, records every query.
#[derive(Debug, Clone, Default)]
pub struct DummySearch {
    answer: Option<Result<String, String>>,
    queries: Arc<Mutex<Vec<String>>>,
}

impl DummySearch {
    /// Answers every query with the empty-results line.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_answer(answer: impl Into<String>) -> Self {
        Self { answer: Some(Ok(answer.into())), ..Self::default() }
    }

    /// Every search fails with `reason`.
    pub fn failing(reason: impl Into<String>) -> Self {
        Self { answer: Some(Err(reason.into())), ..Self::default() }
    }

    pub fn queries(&self) -> Vec<String> {
        self.queries.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    fn search(&self, query: &str) -> Result<String, ToolError> {
        self.queries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(query.to_string());
        match &self.answer {
            None => Ok(no_results(query)),
            Some(Ok(text)) => Ok(text.clone()),
            Some(Err(reason)) => Err(ToolError::Search(reason.clone())),
        }
    }
}

// ── Response shape ────────────────────────────────────────────────────────────

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SerperResponse {
    answer_box: Option<AnswerBox>,
    knowledge_graph: Option<KnowledgeGraph>,
    #[serde(deserialize_with = "null_as_empty")]
    places: Vec<Place>,
    #[serde(deserialize_with = "null_as_empty")]
    organic: Vec<OrganicResult>,
    #[serde(deserialize_with = "null_as_empty")]
    people_also_ask: Vec<RelatedQuestion>,
}

fn null_as_empty<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: serde::Deserializer<'de>,
    T: Deserialize<'de>,
{
    Ok(Option::<Vec<T>>::deserialize(deserializer)?.unwrap_or_default())
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct AnswerBox {
    answer: Option<String>,
    snippet: Option<String>,
    link: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct KnowledgeGraph {
    title: Option<String>,
    #[serde(rename = "type")]
    kind: Option<String>,
    description: Option<String>,
    address: Option<String>,
    phone: Option<String>,
    website: Option<String>,
    rating: Option<Value>,
    attributes: Option<Map<String, Value>>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct Place {
    title: Option<String>,
    category: Option<String>,
    rating: Option<Value>,
    rating_count: Option<Value>,
    address: Option<String>,
    phone_number: Option<String>,
    website: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct OrganicResult {
    title: Option<String>,
    snippet: Option<String>,
    link: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RelatedQuestion {
    question: Option<String>,
    snippet: Option<String>,
}

// ── Formatting ────────────────────────────────────────────────────────────────

fn no_results(query: &str) -> String {
    format!("No useful results found for: \"{query}\"")
}

/// Render a JSON scalar without quotes; `None` for null and empty strings.
fn scalar(v: &Value) -> Option<String> {
    match v {
        Value::Null => None,
        Value::String(s) if s.trim().is_empty() => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

fn non_empty(s: &Option<String>) -> Option<&str> {
    s.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

/// Condense a Serper response into a digest for the model.
///
/// Priority: answer box, knowledge graph, places (top 4), organic (top 3,
/// only without places), first related question (only when fewer than three
/// lines were produced so far).
pub fn format_results(data: &SerperResponse, query: &str) -> String {
    let mut parts: Vec<String> = Vec::new();

    if let Some(ab) = &data.answer_box {
        if let Some(answer) = non_empty(&ab.answer).or_else(|| non_empty(&ab.snippet)) {
            parts.push(format!("Answer: {answer}"));
        }
        if let Some(link) = non_empty(&ab.link) {
            parts.push(format!("Source: {link}"));
        }
    }

    if let Some(kg) = &data.knowledge_graph {
        if let Some(title) = non_empty(&kg.title) {
            parts.push(format!("\n{title}"));
        }
        if let Some(kind) = non_empty(&kg.kind) {
            parts.push(format!("Type: {kind}"));
        }
        if let Some(description) = non_empty(&kg.description) {
            parts.push(description.to_string());
        }
        if let Some(address) = non_empty(&kg.address) {
            parts.push(format!("Address: {address}"));
        }
        if let Some(phone) = non_empty(&kg.phone) {
            parts.push(format!("Phone: {phone}"));
        }
        if let Some(website) = non_empty(&kg.website) {
            parts.push(format!("Website: {website}"));
        }
        if let Some(rating) = kg.rating.as_ref().and_then(scalar) {
            parts.push(format!("Rating: {rating} ⭐"));
        }
        if let Some(attrs) = &kg.attributes {
            let useful = attrs
                .iter()
                .filter_map(|(k, v)| scalar(v).map(|v| format!("{k}: {v}")))
                .take(MAX_ATTRIBUTES)
                .collect::<Vec<_>>()
                .join(" | ");
            if !useful.is_empty() {
                parts.push(useful);
            }
        }
    }

    let places: Vec<(&Place, &str)> = data
        .places
        .iter()
        .filter_map(|p| non_empty(&p.title).map(|title| (p, title)))
        .take(MAX_PLACES)
        .collect();
    let organic: Vec<(String, Option<&str>)> = data
        .organic
        .iter()
        .filter_map(|r| {
            let text = match (non_empty(&r.title), non_empty(&r.snippet)) {
                (Some(title), Some(snippet)) => format!("{title}: {snippet}"),
                (Some(text), None) | (None, Some(text)) => text.to_string(),
                (None, None) => return None,
            };
            Some((text, non_empty(&r.link)))
        })
        .take(MAX_ORGANIC)
        .collect();

    if !places.is_empty() {
        parts.push("\nNearby places found:".to_string());
        for (i, (p, title)) in places.into_iter().enumerate() {
            let mut line = format!("{}. *{title}*", i + 1);
            if let Some(category) = non_empty(&p.category) {
                line.push_str(&format!(" ({category})"));
            }
            if let Some(rating) = p.rating.as_ref().and_then(scalar) {
                line.push_str(&format!(" — ⭐ {rating}"));
                if let Some(count) = p.rating_count.as_ref().and_then(scalar) {
                    line.push_str(&format!(" ({count} reviews)"));
                }
            }
            parts.push(line);
            if let Some(address) = non_empty(&p.address) {
                parts.push(format!("   📍 {address}"));
            }
            if let Some(phone) = non_empty(&p.phone_number) {
                parts.push(format!("   📞 {phone}"));
            }
            if let Some(website) = non_empty(&p.website) {
                parts.push(format!("   🌐 {website}"));
            }
        }
    } else if !organic.is_empty() {
        if !parts.is_empty() {
            parts.push("\nTop results:".to_string());
        }
        for (i, (text, link)) in organic.into_iter().enumerate() {
            parts.push(format!("{}. {text}", i + 1));
            if let Some(link) = link {
                parts.push(format!("   {link}"));
            }
        }
    }

    if parts.len() < 3 {
        if let Some(paa) = data.people_also_ask.first() {
            if let (Some(question), Some(snippet)) = (non_empty(&paa.question), non_empty(&paa.snippet)) {
                parts.push(format!("\nRelated: {question} → {snippet}"));
            }
        }
    }

    if parts.is_empty() {
        return no_results(query);
    }
    cap(parts.join("\n").trim(), MAX_RESULT_CHARS)
}

fn cap(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        None => text.to_string(),
        Some((idx, _)) => format!("{}…", text[..idx].trim_end()),
    }
}
