//! NCBI Entrez E-utilities client (PubMed, MedGen, ClinVar).
//!
//! Each lookup is an `esearch` for ids followed by one `esummary` for the
//! records, both with `retmode=json`.

use crate::literature::{Article, Condition, LiteratureClient, LiteratureError, Variant};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Map, Value};
use std::time::Duration;
use tracing::{debug, warn};

#[derive(Debug, Clone)]
pub struct EntrezConfig {
    pub base_url: String,
    pub timeout_seconds: u64,
    pub api_key: Option<String>,
}

impl Default for EntrezConfig {
    fn default() -> Self {
        Self {
            base_url: "https://eutils.ncbi.nlm.nih.gov/entrez/eutils".to_string(),
            timeout_seconds: 30,
            api_key: None,
        }
    }
}

#[derive(Debug, Deserialize)]
struct SearchEnvelope {
    esearchresult: SearchResult,
}

#[derive(Debug, Deserialize)]
struct SearchResult {
    #[serde(default)]
    idlist: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct SummaryEnvelope {
    #[serde(default)]
    result: Map<String, Value>,
}

pub struct EntrezClient {
    config: EntrezConfig,
    http_client: reqwest::Client,
}

impl EntrezClient {
    pub fn new(config: EntrezConfig) -> Result<Self, LiteratureError> {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .map_err(|e| LiteratureError::Request(e.to_string()))?;

        Ok(Self {
            config,
            http_client,
        })
    }

    fn endpoint(&self, utility: &str) -> String {
        format!("{}/{}.fcgi", self.config.base_url.trim_end_matches('/'), utility)
    }

    async fn get_json<T: for<'de> Deserialize<'de>>(
        &self,
        utility: &str,
        params: &[(&str, String)],
    ) -> Result<T, LiteratureError> {
        let mut request = self
            .http_client
            .get(self.endpoint(utility))
            .query(params)
            .query(&[("retmode", "json")]);
        if let Some(key) = &self.config.api_key {
            request = request.query(&[("api_key", key)]);
        }

        let response = request
            .send()
            .await
            .map_err(|e| LiteratureError::Request(e.to_string()))?;

        if !response.status().is_success() {
            return Err(LiteratureError::Status(response.status().as_u16()));
        }

        response
            .json()
            .await
            .map_err(|e| LiteratureError::Malformed(e.to_string()))
    }

    async fn search_ids(
        &self,
        db: &str,
        query: &str,
        max_results: usize,
    ) -> Result<Vec<String>, LiteratureError> {
        let envelope: SearchEnvelope = self
            .get_json(
                "esearch",
                &[
                    ("db", db.to_string()),
                    ("term", query.to_string()),
                    ("retmax", max_results.to_string()),
                ],
            )
            .await?;
        Ok(envelope.esearchresult.idlist)
    }

    async fn summaries(
        &self,
        db: &str,
        ids: &[String],
    ) -> Result<Map<String, Value>, LiteratureError> {
        let envelope: SummaryEnvelope = self
            .get_json("esummary", &[("db", db.to_string()), ("id", ids.join(","))])
            .await?;
        Ok(envelope.result)
    }

    async fn try_lookup<T>(
        &self,
        db: &str,
        query: &str,
        max_results: usize,
        parse: fn(&str, &Value) -> T,
    ) -> Result<Vec<T>, LiteratureError> {
        let ids = self.search_ids(db, query, max_results).await?;
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let records = self.summaries(db, &ids).await?;
        Ok(collect_records(&ids, &records, parse))
    }

    async fn lookup<T>(
        &self,
        db: &str,
        query: &str,
        max_results: usize,
        parse: fn(&str, &Value) -> T,
    ) -> Vec<T> {
        match self.try_lookup(db, query, max_results, parse).await {
            Ok(records) => {
                debug!("{} search for {:?} returned {} records", db, query, records.len());
                records
            }
            Err(e) => {
                warn!("{} search for {:?} failed: {}", db, query, e);
                Vec::new()
            }
        }
    }
}

#[async_trait]
impl LiteratureClient for EntrezClient {
    async fn search_articles(&self, query: &str, max_results: usize) -> Vec<Article> {
        self.lookup("pubmed", query, max_results, parse_article).await
    }

    async fn search_conditions(&self, query: &str, max_results: usize) -> Vec<Condition> {
        self.lookup("medgen", query, max_results, parse_condition).await
    }

    async fn search_variants(&self, query: &str, max_results: usize) -> Vec<Variant> {
        self.lookup("clinvar", query, max_results, parse_variant).await
    }
}

/// Records in esearch order; ids missing from the summary are skipped.
fn collect_records<T>(
    ids: &[String],
    records: &Map<String, Value>,
    parse: fn(&str, &Value) -> T,
) -> Vec<T> {
    ids.iter()
        .filter_map(|id| records.get(id).map(|record| parse(id, record)))
        .collect()
}

fn text(record: &Value, field: &str) -> String {
    match record.get(field) {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Object(o)) => o
            .get("value")
            .or_else(|| o.get("description"))
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        _ => String::new(),
    }
}

fn parse_article(id: &str, record: &Value) -> Article {
    let authors = record
        .get("authors")
        .and_then(Value::as_array)
        .map(|authors| {
            authors
                .iter()
                .filter_map(|a| a.get("name").and_then(Value::as_str))
                .map(String::from)
                .collect()
        })
        .unwrap_or_default();

    Article {
        id: id.to_string(),
        title: text(record, "title"),
        authors,
        journal: text(record, "fulljournalname"),
        publication_date: text(record, "pubdate"),
        url: format!("https://pubmed.ncbi.nlm.nih.gov/{}/", id),
    }
}

fn parse_condition(id: &str, record: &Value) -> Condition {
    Condition {
        id: id.to_string(),
        name: text(record, "title"),
        definition: text(record, "definition"),
        url: format!("https://www.ncbi.nlm.nih.gov/medgen/{}", id),
    }
}

fn parse_variant(id: &str, record: &Value) -> Variant {
    let gene = record
        .get("genes")
        .and_then(Value::as_array)
        .and_then(|genes| genes.first())
        .and_then(|g| g.get("symbol"))
        .and_then(Value::as_str)
        .map(String::from)
        .unwrap_or_else(|| text(record, "gene"));

    let mut clinical_significance = text(record, "germline_classification");
    if clinical_significance.is_empty() {
        clinical_significance = text(record, "clinical_significance");
    }

    Variant {
        id: id.to_string(),
        name: text(record, "title"),
        gene,
        clinical_significance,
        url: format!("https://www.ncbi.nlm.nih.gov/clinvar/variation/{}/", id),
    }
}
