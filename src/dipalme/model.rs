use serde::Serialize;
use strum::{Display, EnumIter, EnumString, IntoStaticStr};

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Display,
    EnumString,
    EnumIter,
    IntoStaticStr,
)]
#[strum(ascii_case_insensitive)]
pub enum Category {
    Fiestas,
    Festivales,
    #[serde(rename = "Espectáculos")]
    #[strum(to_string = "Espectáculos", serialize = "Espectaculos")]
    Espectaculos,
    Exposiciones,
}

impl Category {
    /// Name used both in the `actividad` query parameter and as the record tag
    pub fn wire_name(&self) -> &'static str {
        self.into()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    pub title: Option<String>,
    pub image_url: Option<String>,
    pub image_alt: Option<String>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub location: Option<String>,
    pub period: Option<String>,
    pub category: Option<String>,
    #[serde(rename = "type")]
    pub event_type: Category,
}

impl Event {
    pub fn untitled(event_type: Category) -> Self {
        Self {
            title: None,
            image_url: None,
            image_alt: None,
            start_date: None,
            end_date: None,
            location: None,
            period: None,
            category: None,
            event_type,
        }
    }
}

/// Outcome of a scrape. A failed scrape never carries data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScrapeResult {
    pub success: bool,
    pub data: Vec<Event>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ScrapeResult {
    pub fn success(data: Vec<Event>, message: String) -> Self {
        Self {
            success: true,
            data,
            message: Some(message),
            error: None,
        }
    }

    pub fn failure(error: impl ToString) -> Self {
        Self {
            success: false,
            data: Vec::new(),
            message: None,
            error: Some(error.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test_log::test]
    fn should_parse_category_ignoring_case() {
        assert_eq!(Category::from_str("fiestas").unwrap(), Category::Fiestas);
        assert_eq!(Category::from_str("FESTIVALES").unwrap(), Category::Festivales);
    }

    #[test_log::test]
    fn should_parse_espectaculos_with_and_without_accent() {
        assert_eq!(
            Category::from_str("Espectáculos").unwrap(),
            Category::Espectaculos
        );
        assert_eq!(
            Category::from_str("espectaculos").unwrap(),
            Category::Espectaculos
        );
        assert_eq!(Category::Espectaculos.wire_name(), "Espectáculos");
    }

    #[test_log::test]
    fn should_reject_unknown_category() {
        assert!(Category::from_str("Conciertos").is_err());
    }

    #[test_log::test]
    fn should_serialize_event_with_camel_case_and_nulls() {
        let mut event = Event::untitled(Category::Espectaculos);
        event.image_url = Some("https://www.dipalme.org/a.jpg".to_string());

        let json = serde_json::to_value(&event).unwrap();

        assert_eq!(json["imageUrl"], "https://www.dipalme.org/a.jpg");
        assert_eq!(json["type"], "Espectáculos");
        assert!(json["startDate"].is_null());
    }

    #[test_log::test]
    fn when_a_scrape_fails_should_omit_message() {
        let json = serde_json::to_value(ScrapeResult::failure("boom")).unwrap();

        assert_eq!(json["success"], false);
        assert_eq!(json["data"], serde_json::json!([]));
        assert_eq!(json["error"], "boom");
        assert!(json.get("message").is_none());
    }
}
