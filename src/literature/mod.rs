//! Supporting evidence from public biomedical databases.
//!
//! Lookups never fail from the caller's point of view: an unreachable or
//! misbehaving service yields an empty list and a warning.

pub mod entrez;

pub use entrez::{EntrezClient, EntrezConfig};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A PubMed article.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Article {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub authors: Vec<String>,
    #[serde(default)]
    pub journal: String,
    #[serde(default)]
    pub publication_date: String,
    pub url: String,
}

/// A MedGen condition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Condition {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub definition: String,
    pub url: String,
}

/// A ClinVar variant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Variant {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub gene: String,
    #[serde(default)]
    pub clinical_significance: String,
    pub url: String,
}

/// Evidence gathered for one analysis.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Evidence {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub articles: Vec<Article>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub variants: Vec<Variant>,
}

impl Evidence {
    pub fn is_empty(&self) -> bool {
        self.articles.is_empty() && self.conditions.is_empty() && self.variants.is_empty()
    }
}

/// Failure talking to a literature service. Logged, never surfaced.
#[derive(Debug, Error)]
pub enum LiteratureError {
    #[error("Request failed: {0}")]
    Request(String),

    #[error("Service returned status {0}")]
    Status(u16),

    #[error("Malformed response: {0}")]
    Malformed(String),
}

/// Source of literature, condition and variant records.
#[async_trait]
pub trait LiteratureClient: Send + Sync {
    async fn search_articles(&self, query: &str, max_results: usize) -> Vec<Article>;

    async fn search_conditions(&self, query: &str, max_results: usize) -> Vec<Condition>;

    async fn search_variants(&self, query: &str, max_results: usize) -> Vec<Variant>;
}
