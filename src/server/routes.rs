use crate::cache::EventCache;
use crate::dipalme::api::DipalmeAPI;
use crate::dipalme::client::PageFetcher;
use chrono::Utc;
use http::{Method, StatusCode};
use percent_encoding::percent_decode_str;
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, error, info};

const EVENTS_PREFIX: &str = "/api/events/";
const ALLOWED_METHODS: &str = "GET, POST, PUT, DELETE, OPTIONS";
const ALLOWED_HEADERS: &str = "Content-Type, Authorization";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub method: Method,
    pub path: String,
    pub origin: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub status: StatusCode,
    /// Serialized JSON, empty for bodiless answers
    pub body: String,
}

impl Response {
    pub fn json<T: Serialize>(status: StatusCode, body: &T) -> Self {
        match serde_json::to_string(body) {
            Ok(body) => Self { status, body },
            Err(e) => {
                error!("Failed serializing response: {}", e);
                Self::error(StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
            }
        }
    }

    pub fn error(status: StatusCode, message: &str) -> Self {
        Self {
            status,
            body: json!({ "success": false, "data": [], "error": message }).to_string(),
        }
    }

    fn empty(status: StatusCode) -> Self {
        Self {
            status,
            body: String::new(),
        }
    }
}

pub struct AppState<F> {
    pub api: DipalmeAPI<F>,
    pub cache: Arc<EventCache>,
    pub cors_origins: Vec<String>,
}

impl<F: PageFetcher + 'static> AppState<F> {
    pub fn new(api: DipalmeAPI<F>, cache: Arc<EventCache>, cors_origins: Vec<String>) -> Self {
        Self {
            api,
            cache,
            cors_origins,
        }
    }

    pub async fn handle(&self, request: &Request) -> Response {
        if request.method == Method::OPTIONS {
            return Response::empty(StatusCode::NO_CONTENT);
        }

        if request.method != Method::GET {
            return Response::error(StatusCode::METHOD_NOT_ALLOWED, "Method not allowed");
        }

        let path = normalize_path(&request.path);
        info!("GET {}", path);

        match path {
            "/" => Response::json(
                StatusCode::OK,
                &json!({ "message": "Welcome to Kedada API!" }),
            ),
            "/api/health" => Response::json(
                StatusCode::OK,
                &json!({ "status": "OK", "timestamp": Utc::now().to_rfc3339() }),
            ),
            "/api/events/all" => Response::json(StatusCode::OK, &self.cache.read()),
            _ => match event_type_segment(path) {
                Some(segment) => self.list_by_type(segment).await,
                None => Response::error(StatusCode::NOT_FOUND, "Not found"),
            },
        }
    }

    /// The segment arrives percent-encoded, so `Espectáculos` is `Espect%C3%A1culos`
    async fn list_by_type(&self, segment: &str) -> Response {
        let raw_type = match percent_decode_str(segment).decode_utf8() {
            Ok(raw_type) => raw_type,
            Err(e) => {
                debug!("Undecodable event type '{}': {}", segment, e);
                return Response::error(StatusCode::BAD_REQUEST, "Invalid event type encoding");
            }
        };

        match self.api.scrape_by_type(&raw_type).await {
            Ok(result) => Response::json(StatusCode::OK, &result),
            Err(e) => Response::error(StatusCode::BAD_REQUEST, &e.to_string()),
        }
    }

    /// Extra headers for allow-listed origins, nothing otherwise
    pub fn cors_headers(&self, origin: Option<&str>) -> Vec<(&'static str, String)> {
        match origin {
            Some(origin) if self.cors_origins.iter().any(|allowed| allowed == origin) => vec![
                ("Access-Control-Allow-Origin", origin.to_string()),
                ("Access-Control-Allow-Credentials", "true".to_string()),
                ("Access-Control-Allow-Methods", ALLOWED_METHODS.to_string()),
                ("Access-Control-Allow-Headers", ALLOWED_HEADERS.to_string()),
                ("Vary", "Origin".to_string()),
            ],
            _ => Vec::new(),
        }
    }
}

fn normalize_path(target: &str) -> &str {
    let path = target.split(['?', '#']).next().unwrap_or_default();

    match path.trim_end_matches('/') {
        "" => "/",
        trimmed => trimmed,
    }
}

fn event_type_segment(path: &str) -> Option<&str> {
    path.strip_prefix(EVENTS_PREFIX)
        .filter(|segment| !segment.is_empty() && !segment.contains('/'))
}
