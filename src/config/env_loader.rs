use crate::config::model::{CacheConfig, Config, FetchConfig, SiteConfig};
use crate::dipalme::model::Category;
use std::env;
use std::str::FromStr;
use std::time::Duration;

pub fn load_config() -> Config {
    load_config_from(|name| env::var(name).ok())
}

/// Builds the config from any variable lookup, falling back to the defaults
pub fn load_config_from(lookup: impl Fn(&str) -> Option<String>) -> Config {
    let defaults = Config::default();

    let port = load_number_config(&lookup, "PORT", defaults.port);

    let site = SiteConfig {
        base_url: lookup("DIPALME_BASE_URL").unwrap_or(defaults.site.base_url),
        origin: lookup("DIPALME_SITE_ORIGIN").unwrap_or(defaults.site.origin),
        categories: load_categories_config(&lookup, "EVENT_CATEGORIES")
            .unwrap_or(defaults.site.categories),
    };

    let fetch = FetchConfig {
        timeout: Duration::from_secs(load_number_config(
            &lookup,
            "FETCH_TIMEOUT_SECS",
            defaults.fetch.timeout.as_secs(),
        )),
        max_attempts: load_number_config(
            &lookup,
            "FETCH_MAX_ATTEMPTS",
            defaults.fetch.max_attempts,
        ),
        initial_delay: Duration::from_millis(load_number_config(
            &lookup,
            "FETCH_INITIAL_DELAY_MS",
            defaults.fetch.initial_delay.as_millis() as u64,
        )),
        max_redirects: load_number_config(
            &lookup,
            "FETCH_MAX_REDIRECTS",
            defaults.fetch.max_redirects,
        ),
    };

    if fetch.max_attempts == 0 {
        panic!("Invalid config 'FETCH_MAX_ATTEMPTS'. Expected at least 1 attempt.");
    }

    let cache = CacheConfig {
        ttl: Duration::from_secs(load_number_config(
            &lookup,
            "CACHE_TTL_SECS",
            defaults.cache.ttl.as_secs(),
        )),
        warmup_delay: Duration::from_secs(load_number_config(
            &lookup,
            "CACHE_WARMUP_DELAY_SECS",
            defaults.cache.warmup_delay.as_secs(),
        )),
    };

    let cors_origins = lookup("CORS_ORIGINS")
        .map(|value| split_list(&value).map(str::to_string).collect())
        .unwrap_or(defaults.cors_origins);

    Config {
        port,
        site,
        fetch,
        cache,
        cors_origins,
    }
}

fn load_number_config<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &str,
    default: T,
) -> T {
    match lookup(name) {
        Some(value) => value.trim().parse().unwrap_or_else(|_| {
            panic!("Invalid config '{}'. Expected a non-negative integer.", name)
        }),
        None => default,
    }
}

fn load_categories_config(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &str,
) -> Option<Vec<Category>> {
    let value = lookup(name)?;

    let mut categories = Vec::new();
    for raw in split_list(&value) {
        let category = Category::from_str(raw)
            .unwrap_or_else(|_| panic!("Invalid config '{}'. Unknown category '{}'", name, raw));

        if !categories.contains(&category) {
            categories.push(category);
        }
    }

    if categories.is_empty() {
        panic!("Invalid config '{}'. Expected at least one category.", name);
    }

    Some(categories)
}

fn split_list(value: &str) -> impl Iterator<Item = &str> {
    value.split(',').map(str::trim).filter(|item| !item.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(vars: &[(&str, &str)]) -> Config {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();

        load_config_from(|name| vars.get(name).cloned())
    }

    #[test_log::test]
    fn when_nothing_is_set_should_use_defaults() {
        let config = load(&[]);

        assert_eq!(config.port, 5000);
        assert_eq!(config.fetch.max_attempts, 3);
        assert_eq!(config.fetch.timeout, Duration::from_secs(30));
        assert_eq!(config.cache.ttl, Duration::from_secs(1800));
        assert_eq!(
            config.site.categories,
            vec![
                Category::Fiestas,
                Category::Festivales,
                Category::Espectaculos,
                Category::Exposiciones
            ]
        );
        assert_eq!(config.cors_origins.len(), 4);
    }

    #[test_log::test]
    fn should_keep_configured_category_order_without_duplicates() {
        let config = load(&[("EVENT_CATEGORIES", "festivales, Fiestas,Festivales")]);

        assert_eq!(
            config.site.categories,
            vec![Category::Festivales, Category::Fiestas]
        );
    }

    #[test_log::test]
    fn should_override_numbers_and_origins() {
        let config = load(&[
            ("PORT", "8080"),
            ("FETCH_INITIAL_DELAY_MS", "250"),
            ("CORS_ORIGINS", "http://a.test, http://b.test"),
        ]);

        assert_eq!(config.port, 8080);
        assert_eq!(config.fetch.initial_delay, Duration::from_millis(250));
        assert_eq!(config.cors_origins, vec!["http://a.test", "http://b.test"]);
    }

    #[test]
    #[should_panic(expected = "Unknown category 'Conciertos'")]
    fn should_panic_on_unknown_category() {
        load(&[("EVENT_CATEGORIES", "Fiestas,Conciertos")]);
    }

    #[test]
    #[should_panic(expected = "Invalid config 'PORT'")]
    fn should_panic_on_invalid_port() {
        load(&[("PORT", "eighty")]);
    }
}
