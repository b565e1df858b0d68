//! Input form handling and term sanitising.

use serde::{Deserialize, Serialize};

use crate::models::SearchTerms;

pub const TEXT_LABEL: &str = "Copy and paste some text from an article.";
pub const TEXT_HELP: &str = "Cut and paste a block of text.";
pub const ZOTERO_LABEL: &str = "Enter your Zotero username.";
pub const ZOTERO_HELP: &str = "Link your Zotero library to use its titles, abstracts and authors.";
pub const EMPTY_FORM_ERROR: &str = "Enter some text or a Zotero username.";

/// The site index form. Both fields are optional on their own, but at least
/// one must be filled in.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InputForm {
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub zotero_user: String,
}

/// What a valid form asks for.
#[derive(Debug, Clone, PartialEq)]
pub enum Submission {
    Text(String),
    Zotero(String),
}

impl InputForm {
    /// Text wins when both fields are filled in.
    pub fn validate(&self) -> Result<Submission, &'static str> {
        let text = self.text.trim();
        let user = self.zotero_user.trim();

        if !text.is_empty() {
            Ok(Submission::Text(text.to_string()))
        } else if !user.is_empty() {
            Ok(Submission::Zotero(user.to_string()))
        } else {
            Err(EMPTY_FORM_ERROR)
        }
    }
}

/// Replace `& " ' < >` with their HTML entities.
pub fn escape_html(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            '>' => out.push_str("&gt;"),
            '<' => out.push_str("&lt;"),
            other => out.push(other),
        }
    }
    out
}

/// Escape every term before it is stored in a session.
pub fn sanitize(terms: SearchTerms) -> SearchTerms {
    terms.map_terms(escape_html)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_requires_one_field() {
        let form = InputForm {
            text: "   ".into(),
            zotero_user: "".into(),
        };
        assert_eq!(form.validate(), Err(EMPTY_FORM_ERROR));
    }

    #[test]
    fn test_validate_prefers_text() {
        let form = InputForm {
            text: " whales ".into(),
            zotero_user: "melville".into(),
        };
        assert_eq!(form.validate(), Ok(Submission::Text("whales".into())));

        let form = InputForm {
            text: "".into(),
            zotero_user: "melville".into(),
        };
        assert_eq!(form.validate(), Ok(Submission::Zotero("melville".into())));
    }

    #[test]
    fn test_escape_html() {
        assert_eq!(
            escape_html(r#"<b>"Tom" & 'Jerry'</b>"#),
            "&lt;b&gt;&quot;Tom&quot; &amp; &apos;Jerry&apos;&lt;/b&gt;"
        );
        assert_eq!(escape_html("plain"), "plain");
    }

    #[test]
    fn test_sanitize_all_lists() {
        let terms = SearchTerms {
            keywords: vec!["a&b".into()],
            people: Some(vec!["O'Brien".into()]),
            places: None,
        };
        let clean = sanitize(terms);
        assert_eq!(clean.keywords, vec!["a&amp;b"]);
        assert_eq!(clean.people, Some(vec!["O&apos;Brien".to_string()]));
        assert_eq!(clean.places, None);
    }
}
