use super::model::{Category, Event};
use itertools::Itertools;
use lazy_static::lazy_static;
use regex::Regex;
use reqwest::Url;
use scraper::{ElementRef, Html, Selector};
use thiserror::Error;
use tracing::{debug, warn};

const TITLE_MARKER_SELECTOR: &str = ".date-eventos";
const SUMMARY_SELECTOR: &str = ".vista-fiestas-resumen";
const MAX_ASCENT_DEPTH: usize = 10;

lazy_static! {
    static ref TITLE_MARKER: Selector = Selector::parse(TITLE_MARKER_SELECTOR).unwrap();
    static ref SUMMARY: Selector = Selector::parse(SUMMARY_SELECTOR).unwrap();
    static ref IMAGE: Selector = Selector::parse("img").unwrap();
    static ref PARAGRAPH: Selector = Selector::parse("p").unwrap();
    static ref DATE_RANGE: Regex = Regex::new(r"(?is)\bdel\s*:\s*(\S+).*\bal\s*:\s*(\S+)").unwrap();
    static ref LOCATION_LABEL: Regex = Regex::new(r"(?is)^lugar\s*:(.*)$").unwrap();
    static ref PERIOD_LABEL: Regex = Regex::new(r"(?is)^per(?:[ií]odo|ido)\s*:(.*)$").unwrap();
    static ref TYPE_LABEL: Regex = Regex::new(r"(?is)^tipo\s*:(.*)$").unwrap();
}

#[derive(Debug, Error)]
pub enum ExtractionItemError {
    #[error("image source '{src}' can't be resolved: {source}")]
    InvalidImageUrl {
        src: String,
        #[source]
        source: url::ParseError,
    },
}

pub struct Extractor {
    site_origin: Url,
}

impl Extractor {
    pub fn new(site_origin: Url) -> Self {
        Self { site_origin }
    }

    /**
    Returns one event per title marker, in document order.
    Items that fail to extract are logged and skipped.
    */
    #[tracing::instrument(skip(self, document))]
    pub fn extract(&self, document: &str, category: Category) -> Vec<Event> {
        let html = Html::parse_document(document);
        let mut events = Vec::new();

        for (index, marker) in html.select(&TITLE_MARKER).enumerate() {
            match self.extract_event(marker, category) {
                Ok(event) => events.push(event),
                Err(e) => warn!("Skipping event #{}: {}", index, e),
            }
        }

        debug!("Extracted {} events", events.len());

        events
    }

    fn extract_event(
        &self,
        marker: ElementRef,
        category: Category,
    ) -> Result<Event, ExtractionItemError> {
        let mut event = Event::untitled(category);
        event.title = non_empty(normalized_text(marker));

        let Some(container) = find_container(marker) else {
            debug!("No summary found around '{:?}'", event.title);
            return Ok(event);
        };

        if let Some(image) = container.select(&IMAGE).next() {
            event.image_url = image
                .attr("src")
                .and_then(|src| non_empty(src.trim().to_string()))
                .map(|src| self.resolve_image_url(&src))
                .transpose()?;
            event.image_alt = image.attr("alt").and_then(|alt| non_empty(alt.trim().to_string()));
        }

        if let Some(summary) = container.select(&SUMMARY).next() {
            for paragraph in summary.select(&PARAGRAPH) {
                apply_summary_line(&mut event, &normalized_text(paragraph));
            }
        }

        Ok(event)
    }

    fn resolve_image_url(&self, src: &str) -> Result<String, ExtractionItemError> {
        self.site_origin
            .join(src)
            .map(String::from)
            .map_err(|source| ExtractionItemError::InvalidImageUrl {
                src: src.to_string(),
                source,
            })
    }
}

/// Walks up from the marker to the closest ancestor holding a summary.
/// Gives up at `body`, at the top of the tree or after `MAX_ASCENT_DEPTH` parents.
fn find_container(marker: ElementRef) -> Option<ElementRef> {
    marker
        .ancestors()
        .filter_map(ElementRef::wrap)
        .take_while(|ancestor| !matches!(ancestor.value().name(), "body" | "html"))
        .take(MAX_ASCENT_DEPTH)
        .find(|ancestor| ancestor.select(&SUMMARY).next().is_some())
}

/// Later lines overwrite earlier ones for the same label
fn apply_summary_line(event: &mut Event, line: &str) {
    if let Some(dates) = DATE_RANGE.captures(line) {
        event.start_date = Some(dates[1].to_string());
        event.end_date = Some(dates[2].to_string());
    } else if let Some(location) = labeled_value(&LOCATION_LABEL, line) {
        event.location = Some(location);
    } else if let Some(period) = labeled_value(&PERIOD_LABEL, line) {
        event.period = Some(period);
    } else if let Some(category) = labeled_value(&TYPE_LABEL, line) {
        event.category = Some(category);
    }
}

fn labeled_value(label: &Regex, line: &str) -> Option<String> {
    label
        .captures(line)
        .and_then(|captures| non_empty(captures[1].trim().to_string()))
}

fn normalized_text(element: ElementRef) -> String {
    element.text().flat_map(str::split_whitespace).join(" ")
}

fn non_empty(value: String) -> Option<String> {
    if value.is_empty() {
        None
    } else {
        Some(value)
    }
}
