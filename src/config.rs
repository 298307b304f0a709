use crate::errors::CacheError;
use crate::models::{AreaPurpose, Category};
use lazy_static::lazy_static;
use std::env;
use std::net::SocketAddr;
use std::time::Duration;
use url::Url;

pub const DEFAULT_LISTEN_ADDR: ([u8; 4], u16) = ([127, 0, 0, 1], 3030);
pub const DEFAULT_ORIGIN: &str = "http://localhost:8081";
pub const DEFAULT_CACHE_PREFIX: &str = "car-widget";
pub const DEFAULT_CACHE_VERSION: &str = "v1";

const HOUR_SECS: u64 = 60 * 60;
const DAY_SECS: u64 = 24 * HOUR_SECS;

pub const STATIC_TTL_SECS: u64 = DAY_SECS; // 24 hours
pub const IMAGE_TTL_SECS: u64 = 7 * DAY_SECS; // 7 days
pub const API_TTL_SECS: u64 = 30 * 60; // 30 minutes
pub const FONT_TTL_SECS: u64 = 30 * DAY_SECS; // 30 days
pub const DEFAULT_TTL_SECS: u64 = DAY_SECS;

pub const REQUEST_TIMEOUT_SECS: u64 = 30;
pub const CACHE_FIRST_TIMEOUT_SECS: u64 = 8; // bounds the network fallback of cache-first

/// Environment variables `CacheConfig::from_env` reads after `GATEWAY_ORIGIN`.
pub const ENV_OVERRIDES: &[&str] = &[
    "GATEWAY_LISTEN",
    "CACHE_PREFIX",
    "CACHE_VERSION",
    "CACHE_QUOTA_BYTES",
    "PLACEHOLDER_IMAGE_URL",
    "API_PATH_PREFIX",
];

/// Resources fetched into the static area on install.
pub const PRECACHE_MANIFEST: &[&str] = &[
    "/",
    "/index.html",
    "/style.css",
    "/car-widget-fixed.html",
    "/car-widget-minimal.html",
    "/car-widget-clean.html",
    "/docs/image-optimization.css",
    "/docs/image-optimization.js",
    "https://fonts.googleapis.com/css2?family=Prompt:wght@300;400;600;700;800&display=swap",
    "https://fonts.googleapis.com/css2?family=Kanit:wght@300;400;500;600;700&display=swap",
];

/// How a rule recognises a request URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Matcher {
    /// Whole URL, fragment excluded.
    ExactUrl(String),
    /// Case-insensitive suffix of the path.
    PathSuffix(String),
    PathPrefix(String),
    PathContains(String),
    Host(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CategoryRule {
    pub matcher: Matcher,
    pub category: Category,
}

impl CategoryRule {
    fn new(category: Category, matcher: Matcher) -> Self {
        Self { matcher, category }
    }
}

lazy_static! {
    /// Pattern rules in evaluation order. Manifest entries are prepended to
    /// these when a config is built.
    pub static ref DEFAULT_RULES: Vec<CategoryRule> = {
        let mut rules = Vec::new();
        for suffix in [".css", ".js"] {
            rules.push(CategoryRule::new(Category::StaticAsset, Matcher::PathSuffix(suffix.into())));
        }
        for suffix in [".woff", ".woff2", ".ttf", ".eot"] {
            rules.push(CategoryRule::new(Category::Font, Matcher::PathSuffix(suffix.into())));
        }
        rules.push(CategoryRule::new(Category::Font, Matcher::Host("fonts.googleapis.com".into())));
        rules.push(CategoryRule::new(Category::Font, Matcher::Host("fonts.gstatic.com".into())));
        for suffix in [".jpg", ".jpeg", ".png", ".gif", ".webp", ".avif", ".svg", ".ico"] {
            rules.push(CategoryRule::new(Category::Image, Matcher::PathSuffix(suffix.into())));
        }
        rules.push(CategoryRule::new(Category::Image, Matcher::Host("cdn.shopify.com".into())));
        rules.push(CategoryRule::new(Category::Api, Matcher::PathContains("/api/".into())));
        rules.push(CategoryRule::new(Category::Api, Matcher::PathSuffix("products.json".into())));
        rules.push(CategoryRule::new(Category::Api, Matcher::PathSuffix("cars.json".into())));
        rules
    };
}

/// One duration per request category.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CategoryDurations {
    pub static_asset: Duration,
    pub image: Duration,
    pub api: Duration,
    pub font: Duration,
    pub default: Duration,
}

impl CategoryDurations {
    pub fn uniform(duration: Duration) -> Self {
        Self {
            static_asset: duration,
            image: duration,
            api: duration,
            font: duration,
            default: duration,
        }
    }

    pub fn get(&self, category: Category) -> Duration {
        match category {
            Category::StaticAsset => self.static_asset,
            Category::Image => self.image,
            Category::Api => self.api,
            Category::Font => self.font,
            Category::Default => self.default,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaceholderImage {
    /// Remote placeholder tried before the inline one.
    pub url: Option<Url>,
    pub width: u32,
    pub height: u32,
    pub label: String,
}

impl Default for PlaceholderImage {
    fn default() -> Self {
        Self {
            url: None,
            width: 300,
            height: 200,
            label: "Image not available".to_string(),
        }
    }
}

/// Immutable runtime configuration, built once at startup and shared.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    pub listen_addr: SocketAddr,
    /// Base that relative manifest entries and origin-bound requests resolve against.
    pub origin: Url,
    pub cache_prefix: String,
    pub cache_version: String,
    pub precache_manifest: Vec<Url>,
    pub rules: Vec<CategoryRule>,
    pub ttls: CategoryDurations,
    pub fetch_timeouts: CategoryDurations,
    /// Maximum body bytes a single area may hold.
    pub area_quota_bytes: Option<usize>,
    pub placeholder: PlaceholderImage,
}

impl CacheConfig {
    pub fn new(origin: Url) -> Self {
        let precache_manifest = PRECACHE_MANIFEST
            .iter()
            .filter_map(|entry| origin.join(entry).ok())
            .collect();

        let mut config = Self {
            listen_addr: SocketAddr::from(DEFAULT_LISTEN_ADDR),
            origin,
            cache_prefix: DEFAULT_CACHE_PREFIX.to_string(),
            cache_version: DEFAULT_CACHE_VERSION.to_string(),
            precache_manifest: Vec::new(),
            rules: Vec::new(),
            ttls: CategoryDurations {
                static_asset: Duration::from_secs(STATIC_TTL_SECS),
                image: Duration::from_secs(IMAGE_TTL_SECS),
                api: Duration::from_secs(API_TTL_SECS),
                font: Duration::from_secs(FONT_TTL_SECS),
                default: Duration::from_secs(DEFAULT_TTL_SECS),
            },
            fetch_timeouts: CategoryDurations {
                static_asset: Duration::from_secs(CACHE_FIRST_TIMEOUT_SECS),
                image: Duration::from_secs(CACHE_FIRST_TIMEOUT_SECS),
                api: Duration::from_secs(REQUEST_TIMEOUT_SECS),
                font: Duration::from_secs(CACHE_FIRST_TIMEOUT_SECS),
                default: Duration::from_secs(REQUEST_TIMEOUT_SECS),
            },
            area_quota_bytes: None,
            placeholder: PlaceholderImage::default(),
        };
        config.set_manifest(precache_manifest);
        config
    }

    /// Reads overrides from the environment on top of the defaults.
    pub fn from_env() -> Result<Self, CacheError> {
        let origin = env::var("GATEWAY_ORIGIN").unwrap_or_else(|_| DEFAULT_ORIGIN.to_string());
        let origin = Url::parse(&origin)
            .map_err(|e| CacheError::InvalidUri(format!("GATEWAY_ORIGIN {}: {}", origin, e)))?;
        let mut config = Self::new(origin);

        for key in ENV_OVERRIDES {
            if let Ok(value) = env::var(key) {
                config.apply_override(key, &value)?;
            }
        }
        Ok(config)
    }

    /// Applies one `ENV_OVERRIDES` setting. A malformed value is an error,
    /// never silently dropped.
    pub fn apply_override(&mut self, key: &str, value: &str) -> Result<(), CacheError> {
        let invalid = |e: String| CacheError::InvalidUri(format!("{} {}: {}", key, value, e));
        match key {
            "GATEWAY_LISTEN" => {
                self.listen_addr = value.parse::<SocketAddr>().map_err(|e| invalid(e.to_string()))?
            }
            "CACHE_PREFIX" => self.cache_prefix = value.to_string(),
            "CACHE_VERSION" => self.cache_version = value.to_string(),
            "CACHE_QUOTA_BYTES" => {
                self.area_quota_bytes = Some(value.parse::<usize>().map_err(|e| invalid(e.to_string()))?)
            }
            "PLACEHOLDER_IMAGE_URL" => {
                self.placeholder.url = Some(Url::parse(value).map_err(|e| invalid(e.to_string()))?)
            }
            "API_PATH_PREFIX" => {
                if !value.starts_with('/') {
                    return Err(invalid("must start with '/'".to_string()));
                }
                // After the manifest rules, ahead of every pattern rule.
                let at = self.precache_manifest.len().min(self.rules.len());
                let rule = CategoryRule::new(Category::Api, Matcher::PathPrefix(value.to_string()));
                self.rules.insert(at, rule);
            }
            _ => return Err(invalid("unknown setting".to_string())),
        }
        Ok(())
    }

    pub fn with_version(mut self, version: &str) -> Self {
        self.cache_version = version.to_string();
        self
    }

    pub fn with_manifest(mut self, manifest: Vec<Url>) -> Self {
        self.set_manifest(manifest);
        self
    }

    pub fn with_quota(mut self, bytes: usize) -> Self {
        self.area_quota_bytes = Some(bytes);
        self
    }

    fn set_manifest(&mut self, manifest: Vec<Url>) {
        let mut rules: Vec<CategoryRule> = manifest
            .iter()
            .map(|url| {
                let mut url = url.clone();
                url.set_fragment(None);
                CategoryRule::new(Category::StaticAsset, Matcher::ExactUrl(url.to_string()))
            })
            .collect();
        rules.extend(DEFAULT_RULES.iter().cloned());
        self.rules = rules;
        self.precache_manifest = manifest;
    }

    /// Versioned name of the current area for `purpose`.
    pub fn area_name(&self, purpose: AreaPurpose) -> String {
        format!("{}-{}-{}", self.cache_prefix, purpose.as_str(), self.cache_version)
    }

    pub fn area_for(&self, category: Category) -> String {
        self.area_name(category.area())
    }

    pub fn expected_area_names(&self) -> Vec<String> {
        AreaPurpose::ALL.iter().map(|p| self.area_name(*p)).collect()
    }

    pub fn ttl(&self, category: Category) -> Duration {
        self.ttls.get(category)
    }

    pub fn fetch_timeout(&self, category: Category) -> Duration {
        self.fetch_timeouts.get(category)
    }
}
