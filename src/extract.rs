//! Title and content extraction from article HTML.

use crate::error::ExtractError;
use crate::models::Item;
use scraper::{ElementRef, Html, Selector};

/// Compiled selectors for the two required fields.
#[derive(Debug, Clone)]
pub struct Extractor {
    title: Selector,
    content: Selector,
}

impl Extractor {
    pub fn new(title_selector: &str, content_selector: &str) -> Result<Self, ExtractError> {
        Ok(Self {
            title: compile(title_selector)?,
            content: compile(content_selector)?,
        })
    }

    /// Build an [`Item`] from a page body.
    ///
    /// The title is the trimmed text of the first title match. The content is
    /// every non-blank text node of the first content match, trimmed and
    /// concatenated. Either one coming out empty is
    /// [`ExtractError::MissingField`].
    pub fn extract(&self, url: &str, html: &str) -> Result<Item, ExtractError> {
        let document = Html::parse_document(html);

        let title = document
            .select(&self.title)
            .next()
            .map(|el| el.text().collect::<String>().trim().to_string())
            .unwrap_or_default();
        let content = document
            .select(&self.content)
            .next()
            .map(stripped_text)
            .unwrap_or_default();

        if title.is_empty() || content.is_empty() {
            return Err(ExtractError::MissingField);
        }

        Ok(Item {
            url: url.to_string(),
            title,
            content,
        })
    }
}

fn compile(selector: &str) -> Result<Selector, ExtractError> {
    Selector::parse(selector).map_err(|e| ExtractError::Selector {
        selector: selector.to_string(),
        reason: e.to_string(),
    })
}

fn stripped_text(element: ElementRef<'_>) -> String {
    element
        .text()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .collect()
}
