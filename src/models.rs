//! Core data models shared by the text pipeline, the web views, and storage.

use serde::{Deserialize, Serialize};

/// Search terms extracted from user input.
///
/// `people` and `places` are `Some` (possibly empty) on the DBpedia path and
/// `None` on the frequency path, where they are omitted from JSON.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchTerms {
    pub keywords: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub people: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub places: Option<Vec<String>>,
}

impl SearchTerms {
    /// Empty entity lists, as returned by entity classification.
    pub fn with_entities() -> Self {
        Self {
            keywords: Vec::new(),
            people: Some(Vec::new()),
            places: Some(Vec::new()),
        }
    }

    pub fn people(&self) -> &[String] {
        self.people.as_deref().unwrap_or_default()
    }

    pub fn places(&self) -> &[String] {
        self.places.as_deref().unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.keywords.is_empty() && self.people().is_empty() && self.places().is_empty()
    }

    /// Apply `f` to every term in every list.
    pub fn map_terms(self, f: impl Fn(&str) -> String) -> Self {
        let map = |v: Vec<String>| v.iter().map(|s| f(s)).collect::<Vec<_>>();
        Self {
            keywords: map(self.keywords),
            people: self.people.map(map),
            places: self.places.map(map),
        }
    }
}

/// A Zotero account linked through OAuth, stored in SQLite.
#[derive(Debug, Clone)]
pub struct ZoteroUser {
    pub id: String,
    pub username: String,
    pub zotero_userid: String,
    pub oauth_token: String,
    pub api_key: String,
    pub created_at: i64,
    pub updated_at: i64,
}

/// One library item as shown on the stash page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StashItem {
    pub title: String,
    pub creators: Vec<String>,
}

/// Summary of a user's Zotero library.
#[derive(Debug, Clone, Default)]
pub struct ZoteroItems {
    pub titles: Vec<String>,
    pub abstracts: Vec<String>,
    pub creators: Vec<String>,
    pub items: Vec<StashItem>,
}

impl ZoteroItems {
    /// All text fields joined into one document for keyword extraction.
    pub fn combined_text(&self) -> String {
        self.abstracts
            .iter()
            .chain(self.creators.iter())
            .chain(self.titles.iter())
            .map(String::as_str)
            .collect::<Vec<_>>()
            .join(" ")
    }
}
