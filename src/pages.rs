//! HTML pages rendered with Handlebars.
//!
//! Templates live in `templates/` and are compiled into the binary. Values
//! are HTML-escaped by Handlebars, except search terms, which are escaped
//! once when stored in the session and rendered with triple braces.

use anyhow::Result;
use handlebars::Handlebars;
use serde::Serialize;

const HEADER: &str = include_str!("../templates/header.hbs");
const FOOTER: &str = include_str!("../templates/footer.hbs");
const INDEX: &str = include_str!("../templates/index.hbs");
const DISCOVERIES: &str = include_str!("../templates/discoveries.hbs");
const STASH: &str = include_str!("../templates/stash.hbs");

pub struct Pages {
    handlebars: Handlebars<'static>,
}

impl Pages {
    pub fn new() -> Result<Self> {
        let mut handlebars = Handlebars::new();
        handlebars.register_partial("header", HEADER)?;
        handlebars.register_partial("footer", FOOTER)?;
        handlebars.register_template_string("index", INDEX)?;
        handlebars.register_template_string("discoveries", DISCOVERIES)?;
        handlebars.register_template_string("stash", STASH)?;
        Ok(Self { handlebars })
    }

    pub fn render<T: Serialize>(&self, name: &str, data: &T) -> Result<String> {
        Ok(self.handlebars.render(name, data)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_index_escapes_form_values() {
        let pages = Pages::new().unwrap();
        let html = pages
            .render(
                "index",
                &json!({
                    "title": "Home",
                    "form": { "text": "<script>", "zotero_user": "" },
                    "labels": { "text": "Text" },
                    "error": "Enter some text",
                }),
            )
            .unwrap();
        assert!(html.contains("&lt;script&gt;"));
        assert!(html.contains("Enter some text"));
        assert!(html.contains("<title>Home · Serendip-o-matic</title>"));
    }

    #[test]
    fn test_discoveries_lists_terms() {
        let pages = Pages::new().unwrap();
        let html = pages
            .render(
                "discoveries",
                &json!({
                    "title": "Discoveries",
                    "terms": { "keywords": ["whale", "a&amp;b"], "people": ["Ahab"], "places": [] },
                }),
            )
            .unwrap();
        assert!(html.contains("<li>whale</li>"));
        assert!(html.contains("<li>a&amp;b</li>"));
        assert!(html.contains("<h2>People</h2>"));
        assert!(!html.contains("<h2>Places</h2>"));
    }

    #[test]
    fn test_stash_empty_and_full() {
        let pages = Pages::new().unwrap();
        let empty = pages
            .render("stash", &json!({ "title": "Stash", "items": [] }))
            .unwrap();
        assert!(empty.contains("Nothing stashed yet"));

        let full = pages
            .render(
                "stash",
                &json!({
                    "title": "Stash",
                    "items": [{ "title": "Moby Dick", "creators": ["Herman Melville", "Ishmael"] }],
                }),
            )
            .unwrap();
        assert!(full.contains("Moby Dick"));
        assert!(full.contains("Herman Melville; Ishmael"));
    }
}
