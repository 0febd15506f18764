use crate::config::model::FetchConfig;
use async_trait::async_trait;
use http::Extensions;
use lazy_static::lazy_static;
use rand::seq::SliceRandom;
use reqwest::header::{
    HeaderMap, HeaderValue, ACCEPT, ACCEPT_ENCODING, ACCEPT_LANGUAGE, CONNECTION,
    UPGRADE_INSECURE_REQUESTS, USER_AGENT,
};
use reqwest::{redirect, Client, Request, Response, StatusCode, Url};
use reqwest_middleware::{ClientBuilder, ClientWithMiddleware, Middleware, Next};
use reqwest_retry::policies::ExponentialBackoff;
use reqwest_retry::{Jitter, RetryTransientMiddleware, Retryable, RetryableStrategy};
use thiserror::Error;
use tracing::{debug, info};

pub const USER_AGENTS: [&str; 5] = [
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.4 Safari/605.1.15",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:125.0) Gecko/20100101 Firefox/125.0",
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36 Edg/124.0.0.0",
];

lazy_static! {
    static ref BROWSER_HEADERS: HeaderMap = {
        let mut headers = HeaderMap::new();
        headers.insert(
            ACCEPT,
            HeaderValue::from_static(
                "text/html,application/xhtml+xml,application/xml;q=0.9,image/webp,*/*;q=0.8",
            ),
        );
        headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("es-ES,es;q=0.9,en;q=0.8"));
        headers.insert(ACCEPT_ENCODING, HeaderValue::from_static("gzip, deflate, br"));
        headers.insert(CONNECTION, HeaderValue::from_static("keep-alive"));
        headers.insert(UPGRADE_INSECURE_REQUESTS, HeaderValue::from_static("1"));
        headers
    };
}

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request to {url} failed: {source}")]
    Request {
        url: Url,
        #[source]
        source: reqwest_middleware::Error,
    },
    #[error("{url} answered with status {status}")]
    Status { url: Url, status: StatusCode },
    #[error("failed reading body of {url}: {source}")]
    Body {
        url: Url,
        #[source]
        source: reqwest::Error,
    },
}

/// Anything that can turn a URL into a raw HTML document
#[async_trait]
pub trait PageFetcher: Send + Sync {
    async fn fetch(&self, url: &Url) -> Result<String, FetchError>;
}

pub struct DipalmeClient {
    client: ClientWithMiddleware,
}

impl DipalmeClient {
    pub fn new(config: &FetchConfig) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .default_headers(BROWSER_HEADERS.clone())
            .timeout(config.timeout)
            .redirect(redirect::Policy::limited(config.max_redirects))
            .build()?;

        // The user agent middleware must come after the retry one so every attempt gets a new agent
        let client = ClientBuilder::new(client)
            .with(RetryTransientMiddleware::new_with_policy_and_strategy(
                backoff_policy(config),
                RetryAnyFailure,
            ))
            .with(RandomUserAgent)
            .build();

        Ok(Self { client })
    }
}

#[async_trait]
impl PageFetcher for DipalmeClient {
    #[tracing::instrument(skip_all, fields(url = %url))]
    async fn fetch(&self, url: &Url) -> Result<String, FetchError> {
        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|source| FetchError::Request {
                url: url.clone(),
                source,
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.clone(),
                status,
            });
        }

        let body = response.text().await.map_err(|source| FetchError::Body {
            url: url.clone(),
            source,
        })?;

        info!("Fetched {} bytes", body.len());

        Ok(body)
    }
}

/// Delay before retry `n` (0-based) is `initial_delay * 2^n`
fn backoff_policy(config: &FetchConfig) -> ExponentialBackoff {
    let retries = config.max_attempts.saturating_sub(1);
    let max_delay = config
        .initial_delay
        .saturating_mul(2u32.saturating_pow(retries));

    ExponentialBackoff::builder()
        .retry_bounds(config.initial_delay, max_delay)
        .jitter(Jitter::None)
        .base(2)
        .build_with_max_retries(retries)
}

/// Retries timeouts, network errors and every non-2xx answer
struct RetryAnyFailure;

impl RetryableStrategy for RetryAnyFailure {
    fn handle(&self, res: &Result<Response, reqwest_middleware::Error>) -> Option<Retryable> {
        match res {
            Ok(response) if response.status().is_success() => None,
            Ok(response) => {
                debug!("Got status {}, retrying", response.status());
                Some(Retryable::Transient)
            }
            Err(_) => Some(Retryable::Transient),
        }
    }
}

struct RandomUserAgent;

#[async_trait]
impl Middleware for RandomUserAgent {
    async fn handle(
        &self,
        mut req: Request,
        extensions: &mut Extensions,
        next: Next<'_>,
    ) -> reqwest_middleware::Result<Response> {
        req.headers_mut()
            .insert(USER_AGENT, HeaderValue::from_static(random_user_agent()));

        next.run(req, extensions).await
    }
}

pub fn random_user_agent() -> &'static str {
    USER_AGENTS
        .choose(&mut rand::thread_rng())
        .copied()
        .unwrap_or(USER_AGENTS[0])
}
