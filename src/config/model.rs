use crate::dipalme::model::Category;
use std::time::Duration;
use strum::IntoEnumIterator;

pub const DIPALME_BASE_URL: &str =
    "https://www.dipalme.org/Servicios/cmsdipro/index.nsf/fiestas_view_actividad.xsp";
pub const DIPALME_SITE_ORIGIN: &str = "https://www.dipalme.org";

pub const DEFAULT_CORS_ORIGINS: [&str; 4] = [
    "https://kedada.vercel.app",
    "https://kedada-git-main-lucas-projects-d3b7a1b1.vercel.app",
    "http://localhost:3000",
    "http://localhost:5173",
];

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub site: SiteConfig,
    pub fetch: FetchConfig,
    pub cache: CacheConfig,
    pub cors_origins: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct SiteConfig {
    pub base_url: String,
    /// Relative image paths are resolved against this
    pub origin: String,
    /// Served categories, in the order results are merged
    pub categories: Vec<Category>,
}

#[derive(Debug, Clone)]
pub struct FetchConfig {
    pub timeout: Duration,
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub max_redirects: usize,
}

#[derive(Debug, Clone)]
pub struct CacheConfig {
    pub ttl: Duration,
    pub warmup_delay: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 5000,
            site: SiteConfig::default(),
            fetch: FetchConfig::default(),
            cache: CacheConfig::default(),
            cors_origins: DEFAULT_CORS_ORIGINS.iter().map(|o| o.to_string()).collect(),
        }
    }
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            base_url: DIPALME_BASE_URL.to_string(),
            origin: DIPALME_SITE_ORIGIN.to_string(),
            categories: Category::iter().collect(),
        }
    }
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            max_attempts: 3,
            initial_delay: Duration::from_millis(1000),
            max_redirects: 5,
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(30 * 60),
            warmup_delay: Duration::from_secs(5),
        }
    }
}
