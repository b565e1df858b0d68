//! DBpedia Spotlight named-entity extraction.
//!
//! Two endpoints are used:
//!
//! - **spot**: surface-form detection; every detected name becomes a keyword.
//! - **annotate**: entity linking with DBpedia types; resource names become
//!   keywords and resources typed `DBpedia:Person` / `DBpedia:Place` are
//!   also collected as people and places.
//!
//! Spotlight collapses one-element arrays into a bare object and omits the
//! array entirely when nothing was found; both shapes are accepted here.

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::collections::BTreeSet;
use std::time::Duration;

use crate::config::SpotlightConfig;
use crate::models::SearchTerms;

const PERSON_TYPE: &str = "DBpedia:Person";
const PLACE_TYPE: &str = "DBpedia:Place";

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum OneOrMany<T> {
    One(T),
    Many(Vec<T>),
}

impl<T> OneOrMany<T> {
    fn into_vec(self) -> Vec<T> {
        match self {
            OneOrMany::One(item) => vec![item],
            OneOrMany::Many(items) => items,
        }
    }
}

#[derive(Debug, Deserialize)]
struct SpotResponse {
    annotation: SpotAnnotation,
}

#[derive(Debug, Deserialize)]
struct SpotAnnotation {
    #[serde(rename = "surfaceForm", default)]
    surface_form: Option<OneOrMany<SurfaceForm>>,
}

#[derive(Debug, Deserialize)]
struct SurfaceForm {
    #[serde(rename = "@name")]
    name: String,
}

#[derive(Debug, Deserialize)]
struct AnnotateResponse {
    #[serde(rename = "Resources", default)]
    resources: Option<OneOrMany<Resource>>,
}

#[derive(Debug, Deserialize)]
struct Resource {
    #[serde(rename = "@surfaceForm")]
    surface_form: String,
    #[serde(rename = "@types", default)]
    types: String,
}

fn parse_resources(doc: &str) -> Result<Vec<Resource>> {
    let parsed: AnnotateResponse =
        serde_json::from_str(doc).context("Malformed Spotlight annotate response")?;
    Ok(parsed
        .resources
        .map(OneOrMany::into_vec)
        .unwrap_or_default())
}

/// Names found by a spot query, with ASCII punctuation removed.
pub fn get_names_from_spotting(doc: &str) -> Result<BTreeSet<String>> {
    let parsed: SpotResponse =
        serde_json::from_str(doc).context("Malformed Spotlight spot response")?;

    let names = parsed
        .annotation
        .surface_form
        .map(OneOrMany::into_vec)
        .unwrap_or_default()
        .into_iter()
        .map(|sf| {
            sf.name
                .chars()
                .filter(|c| !c.is_ascii_punctuation())
                .collect::<String>()
                .trim()
                .to_string()
        })
        .filter(|name| !name.is_empty())
        .collect();

    Ok(names)
}

/// Surface forms of every resource in an annotate response.
pub fn get_names_from_annotate(doc: &str) -> Result<BTreeSet<String>> {
    Ok(parse_resources(doc)?
        .into_iter()
        .map(|r| r.surface_form)
        .collect())
}

/// People and places from an annotate response.
///
/// Both lists are always present; a resource typed as both lands in both.
pub fn get_types(doc: &str) -> Result<SearchTerms> {
    let mut people: Vec<String> = Vec::new();
    let mut places: Vec<String> = Vec::new();

    for resource in parse_resources(doc)? {
        if resource.types.contains(PERSON_TYPE) && !people.contains(&resource.surface_form) {
            people.push(resource.surface_form.clone());
        }
        if resource.types.contains(PLACE_TYPE) && !places.contains(&resource.surface_form) {
            places.push(resource.surface_form);
        }
    }

    Ok(SearchTerms {
        people: Some(people),
        places: Some(places),
        ..SearchTerms::with_entities()
    })
}

/// Client for the DBpedia Spotlight REST API.
#[derive(Clone)]
pub struct SpotlightClient {
    client: reqwest::Client,
    config: SpotlightConfig,
}

impl SpotlightClient {
    pub fn new(config: &SpotlightConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            client,
            config: config.clone(),
        })
    }

    /// GET `{base_url}/{endpoint}` asking for JSON and return the raw body.
    pub async fn query(&self, endpoint: &str, params: &[(&str, String)]) -> Result<String> {
        let url = format!("{}/{}", self.config.base_url.trim_end_matches('/'), endpoint);

        let resp = self
            .client
            .get(&url)
            .query(params)
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await
            .with_context(|| format!("Spotlight request failed: {}", url))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            bail!("Spotlight {} returned {}: {}", endpoint, status, body.trim());
        }

        Ok(resp.text().await?)
    }

    pub async fn spot(&self, text: &str) -> Result<String> {
        self.query("spot", &[("text", text.to_string())]).await
    }

    pub async fn annotate(&self, text: &str) -> Result<String> {
        self.query(
            "annotate",
            &[
                ("text", text.to_string()),
                ("confidence", self.config.confidence.to_string()),
                ("support", self.config.support.to_string()),
            ],
        )
        .await
    }

    /// Keywords (spot ∪ annotate names) plus people and places.
    pub async fn get_search_terms(&self, text: &str) -> Result<SearchTerms> {
        let spot_doc = self.spot(text).await?;
        let spot_set = get_names_from_spotting(&spot_doc)?;

        let annotate_doc = self.annotate(text).await?;
        let annotate_set = get_names_from_annotate(&annotate_doc)?;

        let mut terms = get_types(&annotate_doc)?;
        terms.keywords = spot_set.union(&annotate_set).cloned().collect();

        tracing::debug!(
            keywords = terms.keywords.len(),
            people = terms.people().len(),
            places = terms.places().len(),
            "spotlight terms extracted"
        );

        Ok(terms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;

    const SPOT_DOC: &str = r#"{"annotation": {"@text": "Berlin, Einstein",
        "surfaceForm": [
            {"@name": "Berlin", "@offset": "0"},
            {"@name": "\"Einstein.\"", "@offset": "8"}
        ]}}"#;

    const ANNOTATE_DOC: &str = r#"{"@text": "...", "@confidence": "0.3", "@support": "60",
        "Resources": [
            {"@URI": "http://dbpedia.org/resource/Albert_Einstein", "@surfaceForm": "Einstein",
             "@types": "DBpedia:Agent,Schema:Person,DBpedia:Person"},
            {"@URI": "http://dbpedia.org/resource/Berlin", "@surfaceForm": "Berlin",
             "@types": "Schema:Place,DBpedia:Place,DBpedia:PopulatedPlace"},
            {"@URI": "http://dbpedia.org/resource/Physics", "@surfaceForm": "physics",
             "@types": ""},
            {"@URI": "http://dbpedia.org/resource/Albert_Einstein", "@surfaceForm": "Einstein",
             "@types": "DBpedia:Person"}
        ]}"#;

    #[test]
    fn test_spotting_strips_punctuation() {
        let names = get_names_from_spotting(SPOT_DOC).unwrap();
        assert_eq!(
            names.into_iter().collect::<Vec<_>>(),
            vec!["Berlin", "Einstein"]
        );
    }

    #[test]
    fn test_spotting_single_object() {
        let doc = r#"{"annotation": {"surfaceForm": {"@name": "Paris"}}}"#;
        let names = get_names_from_spotting(doc).unwrap();
        assert!(names.contains("Paris"));
        assert_eq!(names.len(), 1);
    }

    #[test]
    fn test_spotting_nothing_found() {
        let doc = r#"{"annotation": {"@text": "hello"}}"#;
        assert!(get_names_from_spotting(doc).unwrap().is_empty());
    }

    #[test]
    fn test_spotting_malformed() {
        let err = get_names_from_spotting("<html>").unwrap_err();
        assert!(err.to_string().contains("Malformed"));
    }

    #[test]
    fn test_annotate_names() {
        let names = get_names_from_annotate(ANNOTATE_DOC).unwrap();
        assert_eq!(
            names.into_iter().collect::<Vec<_>>(),
            vec!["Berlin", "Einstein", "physics"]
        );
    }

    #[test]
    fn test_annotate_without_resources() {
        let doc = r#"{"@text": "nothing here"}"#;
        assert!(get_names_from_annotate(doc).unwrap().is_empty());
        let terms = get_types(doc).unwrap();
        assert_eq!(terms.people, Some(vec![]));
        assert_eq!(terms.places, Some(vec![]));
    }

    #[test]
    fn test_types_first_person_and_place() {
        let terms = get_types(ANNOTATE_DOC).unwrap();
        assert_eq!(terms.people(), ["Einstein"]);
        assert_eq!(terms.places(), ["Berlin"]);
        assert!(terms.keywords.is_empty());
    }

    #[test]
    fn test_types_single_resource_object() {
        let doc = r#"{"Resources": {"@surfaceForm": "Ada Lovelace", "@types": "DBpedia:Person"}}"#;
        let terms = get_types(doc).unwrap();
        assert_eq!(terms.people(), ["Ada Lovelace"]);
        assert_eq!(terms.places, Some(vec![]));
    }

    #[test]
    fn test_types_place_only_keeps_people_key() {
        let doc = r#"{"Resources": [{"@surfaceForm": "Berlin", "@types": "DBpedia:Place"}]}"#;
        let json = serde_json::to_value(get_types(doc).unwrap()).unwrap();
        assert_eq!(json["people"], serde_json::json!([]));
        assert_eq!(json["places"], serde_json::json!(["Berlin"]));
    }

    #[tokio::test]
    async fn test_get_search_terms_against_mock() {
        let mut server = mockito::Server::new_async().await;
        let spot = server
            .mock("GET", "/spot")
            .match_query(Matcher::UrlEncoded("text".into(), "Einstein in Berlin".into()))
            .match_header("accept", "application/json")
            .with_header("content-type", "application/json")
            .with_body(SPOT_DOC)
            .create_async()
            .await;
        let annotate = server
            .mock("GET", "/annotate")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("text".into(), "Einstein in Berlin".into()),
                Matcher::UrlEncoded("confidence".into(), "0.3".into()),
                Matcher::UrlEncoded("support".into(), "60".into()),
            ]))
            .with_header("content-type", "application/json")
            .with_body(ANNOTATE_DOC)
            .create_async()
            .await;

        let config = SpotlightConfig {
            base_url: server.url(),
            ..SpotlightConfig::default()
        };
        let client = SpotlightClient::new(&config).unwrap();
        let terms = client.get_search_terms("Einstein in Berlin").await.unwrap();

        spot.assert_async().await;
        annotate.assert_async().await;
        assert_eq!(terms.keywords, vec!["Berlin", "Einstein", "physics"]);
        assert_eq!(terms.people(), ["Einstein"]);
        assert_eq!(terms.places(), ["Berlin"]);
    }

    #[tokio::test]
    async fn test_query_error_status() {
        let mut server = mockito::Server::new_async().await;
        let _m = server
            .mock("GET", "/spot")
            .match_query(Matcher::Any)
            .with_status(503)
            .with_body("down for maintenance")
            .create_async()
            .await;

        let config = SpotlightConfig {
            base_url: server.url(),
            ..SpotlightConfig::default()
        };
        let client = SpotlightClient::new(&config).unwrap();
        let err = client.get_search_terms("anything").await.unwrap_err();
        assert!(err.to_string().contains("503"));
    }
}
