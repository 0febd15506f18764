use super::client::{FetchError, PageFetcher};
use super::extractor::Extractor;
use super::model::{Category, Event, ScrapeResult};
use crate::cache::EventSource;
use crate::config::model::SiteConfig;
use async_trait::async_trait;
use futures::future;
use itertools::Itertools;
use reqwest::Url;
use std::str::FromStr;
use std::sync::Arc;
use thiserror::Error;
use tracing::{error, info, warn};

#[derive(Debug, Error, PartialEq, Eq)]
#[error("Invalid event type. Must be one of: {}", .allowed.iter().join(", "))]
pub struct ValidationError {
    pub received: String,
    pub allowed: Vec<Category>,
}

/// Fans scrapes out over the configured categories
pub struct DipalmeAPI<F> {
    fetcher: Arc<F>,
    extractor: Arc<Extractor>,
    base_url: Url,
    categories: Vec<Category>,
}

impl<F> Clone for DipalmeAPI<F> {
    fn clone(&self) -> Self {
        Self {
            fetcher: self.fetcher.clone(),
            extractor: self.extractor.clone(),
            base_url: self.base_url.clone(),
            categories: self.categories.clone(),
        }
    }
}

impl<F: PageFetcher + 'static> DipalmeAPI<F> {
    pub fn new(fetcher: F, site: &SiteConfig) -> Result<Self, url::ParseError> {
        Ok(Self {
            fetcher: Arc::new(fetcher),
            extractor: Arc::new(Extractor::new(Url::parse(&site.origin)?)),
            base_url: Url::parse(&site.base_url)?,
            categories: site.categories.clone(),
        })
    }

    pub fn categories(&self) -> &[Category] {
        &self.categories
    }

    pub fn category_url(&self, category: Category) -> Url {
        let mut url = self.base_url.clone();
        url.query_pairs_mut()
            .append_pair("p", "dipalme")
            .append_pair("actividad", category.wire_name());
        url
    }

    #[tracing::instrument(skip(self))]
    pub async fn scrape_one(&self, category: Category) -> ScrapeResult {
        match self.fetch_events(category).await {
            Ok(events) => {
                let message = format!(
                    "Successfully scraped {} {}",
                    events.len(),
                    category.wire_name().to_lowercase()
                );
                info!("{}", message);

                ScrapeResult::success(events, message)
            }
            Err(e) => {
                error!("Scraping {} failed: {}", category, e);
                ScrapeResult::failure(e)
            }
        }
    }

    async fn fetch_events(&self, category: Category) -> Result<Vec<Event>, FetchError> {
        let document = self.fetcher.fetch(&self.category_url(category)).await?;

        Ok(self.extractor.extract(&document, category))
    }

    /**
    Scrapes every configured category concurrently.
    Results are concatenated in configuration order, whatever order they finish in.
    */
    #[tracing::instrument(skip(self))]
    pub async fn scrape_all(&self) -> ScrapeResult {
        let tasks = self.categories.iter().map(|&category| {
            let api = self.clone();
            tokio::spawn(async move { api.scrape_one(category).await })
        });

        let results = match future::join_all(tasks)
            .await
            .into_iter()
            .collect::<Result<Vec<_>, _>>()
        {
            Ok(results) => results,
            Err(e) => {
                error!("A category scrape did not complete: {}", e);
                return ScrapeResult::failure(format!("Error scraping all events: {}", e));
            }
        };

        let summary = self
            .categories
            .iter()
            .zip(&results)
            .map(|(category, result)| {
                if result.success {
                    format!("{}: {}", category, result.data.len())
                } else {
                    format!("{}: failed", category)
                }
            })
            .join(", ");

        let events = results
            .into_iter()
            .flat_map(|result| result.data)
            .collect::<Vec<_>>();

        let message = format!(
            "Successfully scraped {} total events ({})",
            events.len(),
            summary
        );
        info!("{}", message);

        ScrapeResult::success(events, message)
    }

    pub fn parse_category(&self, raw: &str) -> Result<Category, ValidationError> {
        Category::from_str(raw.trim())
            .ok()
            .filter(|category| self.categories.contains(category))
            .ok_or_else(|| ValidationError {
                received: raw.to_string(),
                allowed: self.categories.clone(),
            })
    }

    /// Rejects unknown categories before any request is made
    pub async fn scrape_by_type(&self, raw: &str) -> Result<ScrapeResult, ValidationError> {
        let category = self.parse_category(raw).inspect_err(|e| {
            warn!("Rejected event type '{}'", e.received);
        })?;

        Ok(self.scrape_one(category).await)
    }
}

#[async_trait]
impl<F: PageFetcher + 'static> EventSource for DipalmeAPI<F> {
    async fn scrape_all(&self) -> ScrapeResult {
        DipalmeAPI::scrape_all(self).await
    }
}
