//! # Serendipomatic
//!
//! Turns a piece of text, or the contents of a Zotero library, into a small
//! set of search terms that can be fed to cultural-heritage search APIs.
//!
//! Two extractors are available: a frequency ranking of non-stopword tokens
//! ([`keywords::common_words`]) and DBpedia Spotlight entity linking
//! ([`spotlight::SpotlightClient::get_search_terms`]), which additionally
//! classifies entities as people and places. A small web front-end keeps
//! the extracted terms in a session, and a deploy tool ships tarball
//! releases with `current`/`previous` symlinks.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────┐   ┌─────────────┐   ┌──────────────┐
//! │ Text form  │──▶│  Extractor  │──▶│   Session    │──▶ /discoveries/
//! │ Zotero lib │   │ freq|DBpedia│   │ SearchTerms  │
//! └────────────┘   └─────────────┘   └──────────────┘
//!        │                                  │
//!        ▼                                  ▼
//!   Zotero OAuth ──────────────▶ SQLite (zotero_users)
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! serendip init                        # create database
//! serendip keywords "Call me Ishmael"  # frequency keywords
//! serendip terms "Paris in 1789"       # DBpedia terms
//! serendip serve                       # start the web front-end
//! serendip deploy deploy               # ship a release
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`stopwords`] | English stopword list |
//! | [`keywords`] | Tokenizer and frequency keywords |
//! | [`spotlight`] | DBpedia Spotlight client and entity classification |
//! | [`zotero`] | Zotero OAuth and Web API client |
//! | [`forms`] | Input form validation and term sanitizing |
//! | [`session`] | Browser sessions on `tower-sessions` |
//! | [`pages`] | HTML templates |
//! | [`server`] | Web front-end and JSON API |
//! | [`users`] | Linked Zotero accounts |
//! | [`deploy`] | Release packaging and deployment |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |

pub mod config;
pub mod db;
pub mod deploy;
pub mod forms;
pub mod keywords;
pub mod migrate;
pub mod models;
pub mod pages;
pub mod server;
pub mod session;
pub mod spotlight;
pub mod stopwords;
pub mod users;
pub mod zotero;
