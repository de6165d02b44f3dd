//! Barcode lookup with a provider fallback chain.
//!
//! Scanned codes are first normalized ([`normalize_barcode`]) and then handed
//! to a [`BarcodeLookup`], which asks each [`BarcodeProvider`] in order and
//! returns the first product found. A provider that has no match, or that
//! fails, simply passes the code on to the next one.
//!
//! Two HTTP providers are built in:
//!
//! - [`UpcItemDb`] - `GET {base}/prod/trial/lookup?upc={code}`
//! - [`OpenFoodFacts`] - `GET {base}/api/v0/product/{code}.json`
//!
//! There is no caching, rate limiting or circuit breaking.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::error::{Error, Result};
use crate::model::non_blank;

/// GTIN lengths accepted by [`normalize_barcode`] (EAN-8, UPC-A, EAN-13, GTIN-14)
const GTIN_LENGTHS: [usize; 4] = [8, 12, 13, 14];

/// Product details returned by a barcode provider
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductInfo {
    /// Normalized barcode
    pub barcode: String,
    /// Product name
    pub name: String,
    /// Brand or manufacturer
    #[serde(default)]
    pub brand: Option<String>,
    /// Longer description
    #[serde(default)]
    pub description: Option<String>,
    /// Product image URL
    #[serde(default)]
    pub image_url: Option<String>,
    /// Name of the provider that answered
    pub source: String,
}

/// A source of product details keyed by barcode
#[async_trait]
pub trait BarcodeProvider: Send + Sync {
    /// Short provider name used in logs and [`ProductInfo::source`]
    fn name(&self) -> &str;

    /// Look up a normalized barcode.
    ///
    /// `Ok(None)` means the provider answered but does not know the code.
    async fn lookup(&self, code: &str) -> Result<Option<ProductInfo>>;
}

/// Strip whitespace and dashes from a scanned or typed barcode
#[must_use]
pub fn canonical_barcode(code: &str) -> String {
    code.chars()
        .filter(|c| !c.is_whitespace() && *c != '-')
        .collect()
}

/// Normalize a barcode and check it is a well-formed GTIN.
///
/// The result is 8, 12, 13 or 14 ASCII digits whose last digit is a valid
/// GS1 check digit.
pub fn normalize_barcode(code: &str) -> Result<String> {
    let code = canonical_barcode(code);

    if code.is_empty() {
        return Err(Error::validation("barcode is empty"));
    }
    if !code.bytes().all(|b| b.is_ascii_digit()) {
        return Err(Error::validation(format!("barcode {code:?} must contain only digits")));
    }
    if !GTIN_LENGTHS.contains(&code.len()) {
        return Err(Error::validation(format!(
            "barcode {code:?} has {} digits; expected 8, 12, 13 or 14",
            code.len()
        )));
    }
    if !has_valid_check_digit(&code) {
        return Err(Error::validation(format!("barcode {code:?} has an invalid check digit")));
    }

    Ok(code)
}

/// GS1 mod-10 check: weights 3,1,3,... from the digit left of the check digit
fn has_valid_check_digit(digits: &str) -> bool {
    let values: Vec<u32> = digits.bytes().map(|b| u32::from(b - b'0')).collect();
    let Some((check, body)) = values.split_last() else {
        return false;
    };

    let sum: u32 = body
        .iter()
        .rev()
        .enumerate()
        .map(|(i, d)| if i % 2 == 0 { d * 3 } else { *d })
        .sum();

    (10 - sum % 10) % 10 == *check
}

/// Build the shared HTTP client used by the built-in providers
fn http_client(timeout_secs: u64) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .user_agent(concat!("stockroom/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| Error::init(format!("failed to build HTTP client: {e}")))
}

// =============================================================================
// UPCitemdb
// =============================================================================

/// UPCitemdb trial API provider
pub struct UpcItemDb {
    client: reqwest::Client,
    base_url: String,
}

#[derive(Debug, Deserialize)]
struct UpcResponse {
    #[serde(default)]
    items: Vec<UpcItem>,
}

#[derive(Debug, Deserialize)]
struct UpcItem {
    title: Option<String>,
    brand: Option<String>,
    description: Option<String>,
    #[serde(default)]
    images: Vec<String>,
}

impl UpcItemDb {
    /// Create a provider against `base_url`
    pub fn new(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
        }
    }

    fn parse(code: &str, response: UpcResponse) -> Option<ProductInfo> {
        response.items.into_iter().find_map(|item| {
            let name = non_blank(item.title)?;
            Some(ProductInfo {
                barcode: code.to_string(),
                name,
                brand: non_blank(item.brand),
                description: non_blank(item.description),
                image_url: item.images.into_iter().find(|url| !url.trim().is_empty()),
                source: "upcitemdb".to_string(),
            })
        })
    }
}

#[async_trait]
impl BarcodeProvider for UpcItemDb {
    fn name(&self) -> &str {
        "upcitemdb"
    }

    async fn lookup(&self, code: &str) -> Result<Option<ProductInfo>> {
        let url = format!("{}/prod/trial/lookup", self.base_url.trim_end_matches('/'));

        let response = self
            .client
            .get(&url)
            .query(&[("upc", code)])
            .send()
            .await
            .map_err(|e| Error::lookup(format!("upcitemdb request failed: {e}")))?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(Error::lookup(format!(
                "upcitemdb returned {}",
                response.status()
            )));
        }

        let body: UpcResponse = response
            .json()
            .await
            .map_err(|e| Error::lookup(format!("invalid upcitemdb response: {e}")))?;

        Ok(Self::parse(code, body))
    }
}

// =============================================================================
// Open Food Facts
// =============================================================================

/// Open Food Facts product API provider
pub struct OpenFoodFacts {
    client: reqwest::Client,
    base_url: String,
}

#[derive(Debug, Deserialize)]
struct OffResponse {
    #[serde(default)]
    status: i64,
    product: Option<OffProduct>,
}

#[derive(Debug, Deserialize)]
struct OffProduct {
    product_name: Option<String>,
    generic_name: Option<String>,
    brands: Option<String>,
    image_url: Option<String>,
}

impl OpenFoodFacts {
    /// Create a provider against `base_url`
    pub fn new(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
        }
    }

    fn parse(code: &str, response: OffResponse) -> Option<ProductInfo> {
        if response.status != 1 {
            return None;
        }
        let product = response.product?;
        Some(ProductInfo {
            barcode: code.to_string(),
            name: non_blank(product.product_name)?,
            brand: non_blank(product.brands),
            description: non_blank(product.generic_name),
            image_url: non_blank(product.image_url),
            source: "openfoodfacts".to_string(),
        })
    }
}

#[async_trait]
impl BarcodeProvider for OpenFoodFacts {
    fn name(&self) -> &str {
        "openfoodfacts"
    }

    async fn lookup(&self, code: &str) -> Result<Option<ProductInfo>> {
        let url = format!(
            "{}/api/v0/product/{code}.json",
            self.base_url.trim_end_matches('/')
        );

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| Error::lookup(format!("openfoodfacts request failed: {e}")))?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(Error::lookup(format!(
                "openfoodfacts returned {}",
                response.status()
            )));
        }

        let body: OffResponse = response
            .json()
            .await
            .map_err(|e| Error::lookup(format!("invalid openfoodfacts response: {e}")))?;

        Ok(Self::parse(code, body))
    }
}

// =============================================================================
// Fallback chain
// =============================================================================

/// Ordered chain of barcode providers
#[derive(Clone, Default)]
pub struct BarcodeLookup {
    providers: Vec<Arc<dyn BarcodeProvider>>,
}

impl BarcodeLookup {
    /// Chain over the given providers, queried in order
    pub fn new(providers: Vec<Arc<dyn BarcodeProvider>>) -> Self {
        Self { providers }
    }

    /// A chain with no providers; every lookup returns `Ok(None)`
    pub fn disabled() -> Self {
        Self::default()
    }

    /// The built-in UPCitemdb -> Open Food Facts chain, or an empty chain
    /// when lookups are disabled in `config`
    pub fn from_config(config: &Config) -> Result<Self> {
        if !config.barcode_lookup_enabled {
            info!("External barcode lookup disabled");
            return Ok(Self::disabled());
        }

        let client = http_client(config.lookup_timeout_secs)?;
        let upc: Arc<dyn BarcodeProvider> =
            Arc::new(UpcItemDb::new(client.clone(), config.upcitemdb_url.clone()));
        let off: Arc<dyn BarcodeProvider> =
            Arc::new(OpenFoodFacts::new(client, config.openfoodfacts_url.clone()));
        Ok(Self::new(vec![upc, off]))
    }

    /// Number of providers in the chain
    #[must_use]
    pub fn len(&self) -> usize {
        self.providers.len()
    }

    /// Whether the chain has no providers
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    /// Look up a barcode, falling through the providers in order.
    ///
    /// Returns the first hit. If no provider knows the code the result is
    /// `Ok(None)`; only when every provider failed is an error returned.
    pub async fn lookup(&self, code: &str) -> Result<Option<ProductInfo>> {
        let code = normalize_barcode(code)?;
        let mut failures = Vec::new();

        for provider in &self.providers {
            match provider.lookup(&code).await {
                Ok(Some(product)) => {
                    info!(code = %code, provider = provider.name(), "Barcode resolved");
                    return Ok(Some(product));
                }
                Ok(None) => {
                    debug!(code = %code, provider = provider.name(), "Barcode not known to provider");
                }
                Err(e) => {
                    warn!(code = %code, provider = provider.name(), error = %e, "Barcode provider failed");
                    failures.push(format!("{}: {e}", provider.name()));
                }
            }
        }

        if !self.providers.is_empty() && failures.len() == self.providers.len() {
            return Err(Error::lookup(failures.join("; ")));
        }

        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Scripted provider that counts how often it was asked
    struct FakeProvider {
        name: &'static str,
        answer: std::result::Result<Option<&'static str>, &'static str>,
        calls: AtomicUsize,
    }

    impl FakeProvider {
        fn new(
            name: &'static str,
            answer: std::result::Result<Option<&'static str>, &'static str>,
        ) -> Arc<Self> {
            Arc::new(Self {
                name,
                answer,
                calls: AtomicUsize::new(0),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    fn chain(providers: &[&Arc<FakeProvider>]) -> BarcodeLookup {
        BarcodeLookup::new(
            providers
                .iter()
                .map(|p| Arc::clone(p) as Arc<dyn BarcodeProvider>)
                .collect(),
        )
    }

    #[async_trait]
    impl BarcodeProvider for FakeProvider {
        fn name(&self) -> &str {
            self.name
        }

        async fn lookup(&self, code: &str) -> Result<Option<ProductInfo>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match self.answer {
                Ok(Some(name)) => Ok(Some(ProductInfo {
                    barcode: code.to_string(),
                    name: name.to_string(),
                    brand: None,
                    description: None,
                    image_url: None,
                    source: self.name.to_string(),
                })),
                Ok(None) => Ok(None),
                Err(msg) => Err(Error::lookup(msg)),
            }
        }
    }

    const VALID_EAN13: &str = "4006381333931";

    #[test]
    fn test_normalize_barcode() {
        assert_eq!(normalize_barcode(" 4006381-333931 ").unwrap(), VALID_EAN13);
        assert_eq!(normalize_barcode("96385074").unwrap(), "96385074");
        assert_eq!(normalize_barcode("036000291452").unwrap(), "036000291452");
        assert_eq!(normalize_barcode("10614141000415").unwrap(), "10614141000415");
    }

    #[test]
    fn test_normalize_barcode_rejects() {
        assert!(normalize_barcode("").is_err());
        assert!(normalize_barcode("40063813339A1").is_err());
        assert!(normalize_barcode("123456").is_err());
        assert!(normalize_barcode("4006381333932").is_err());
    }

    #[test]
    fn test_upcitemdb_parse() {
        let body: UpcResponse = serde_json::from_str(
            r#"{"code":"OK","items":[{"title":"Nitrile Exam Gloves","brand":"Medline","images":["","https://img/x.jpg"]}]}"#,
        )
        .unwrap();
        let product = UpcItemDb::parse(VALID_EAN13, body).unwrap();
        assert_eq!(product.name, "Nitrile Exam Gloves");
        assert_eq!(product.brand.as_deref(), Some("Medline"));
        assert_eq!(product.image_url.as_deref(), Some("https://img/x.jpg"));
        assert_eq!(product.source, "upcitemdb");

        let empty: UpcResponse = serde_json::from_str(r#"{"code":"OK","items":[]}"#).unwrap();
        assert!(UpcItemDb::parse(VALID_EAN13, empty).is_none());
    }

    #[test]
    fn test_openfoodfacts_parse() {
        let body: OffResponse = serde_json::from_str(
            r#"{"status":1,"product":{"product_name":"Mouthwash","brands":"Corsodyl"}}"#,
        )
        .unwrap();
        let product = OpenFoodFacts::parse(VALID_EAN13, body).unwrap();
        assert_eq!(product.name, "Mouthwash");
        assert_eq!(product.brand.as_deref(), Some("Corsodyl"));

        let missing: OffResponse =
            serde_json::from_str(r#"{"status":0,"status_verbose":"product not found"}"#).unwrap();
        assert!(OpenFoodFacts::parse(VALID_EAN13, missing).is_none());
    }

    #[tokio::test]
    async fn test_first_hit_wins() {
        let first = FakeProvider::new("first", Ok(Some("Alginate")));
        let second = FakeProvider::new("second", Ok(Some("Other")));
        let chain = chain(&[&first, &second]);

        let product = chain.lookup(VALID_EAN13).await.unwrap().unwrap();
        assert_eq!(product.name, "Alginate");
        assert_eq!(product.source, "first");
        assert_eq!(second.calls(), 0);
    }

    #[tokio::test]
    async fn test_miss_and_error_fall_through() {
        let miss = FakeProvider::new("miss", Ok(None));
        let broken = FakeProvider::new("broken", Err("timeout"));
        let last = FakeProvider::new("last", Ok(Some("Impression tray")));
        let chain = chain(&[&miss, &broken, &last]);

        let product = chain.lookup(VALID_EAN13).await.unwrap().unwrap();
        assert_eq!(product.source, "last");
        assert_eq!((miss.calls(), broken.calls(), last.calls()), (1, 1, 1));
    }

    #[tokio::test]
    async fn test_no_match_is_none() {
        let chain = chain(&[
            &FakeProvider::new("a", Ok(None)),
            &FakeProvider::new("b", Err("503")),
        ]);
        assert!(chain.lookup(VALID_EAN13).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_all_failed_is_error() {
        let chain = chain(&[
            &FakeProvider::new("a", Err("dns")),
            &FakeProvider::new("b", Err("503")),
        ]);
        let err = chain.lookup(VALID_EAN13).await.unwrap_err();
        assert!(matches!(err, Error::Lookup(_)));
        assert!(err.to_string().contains("a: "));
    }

    #[tokio::test]
    async fn test_invalid_code_skips_providers() {
        let provider = FakeProvider::new("a", Ok(Some("x")));
        let chain = chain(&[&provider]);
        assert!(matches!(
            chain.lookup("not-a-code").await,
            Err(Error::Validation(_))
        ));
        assert_eq!(provider.calls(), 0);
    }

    #[tokio::test]
    async fn test_disabled_chain() {
        let chain = BarcodeLookup::from_config(&Config::new("/tmp/x").with_barcode_lookup(false))
            .unwrap();
        assert!(chain.is_empty());
        assert!(chain.lookup(VALID_EAN13).await.unwrap().is_none());
    }
}
