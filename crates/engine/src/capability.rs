//! Provider capability assessment.
//!
//! Derives per-provider cancellation-method support and success likelihood:
//! - Registry-backed capabilities come from persisted provider rows
//! - Unknown providers get a heuristic capability from keyword classification
//! - Results are cached process-wide with a TTL; a race to repopulate an
//!   expired entry is benign because all writers compute equivalent snapshots

use chrono::{DateTime, Duration, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, LazyLock};
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::error::EngineError;
use crate::storage::ProviderRegistry;
use crate::types::Method;

/// Keyword patterns for streaming/media providers.
static STREAMING_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    vec![
        Regex::new(r"netflix|hulu|disney|hbo|spotify|youtube|paramount|peacock").unwrap(),
        Regex::new(r"crunchyroll|audible|twitch|deezer|tidal").unwrap(),
        Regex::new(r"stream|music|video|podcast|tvplus|play").unwrap(),
    ]
});

/// Keyword patterns for software/SaaS providers.
static SOFTWARE_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    vec![
        Regex::new(r"adobe|microsoft|office|github|notion|slack|zoom|dropbox").unwrap(),
        Regex::new(r"figma|jetbrains|atlassian|canva|evernote").unwrap(),
        Regex::new(r"cloud|software|suite|premium|pro\b").unwrap(),
    ]
});

/// Keyword patterns for utility/telecom providers.
static UTILITY_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    vec![
        Regex::new(r"comcast|xfinity|verizon|tmobile|vodafone|spectrum").unwrap(),
        Regex::new(r"internet|mobile|wireless|broadband|telecom").unwrap(),
        Regex::new(r"energy|electric|gas|water|insurance|utility").unwrap(),
    ]
});

/// How hard cancelling with this provider tends to be.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    Easy,
    Medium,
    Hard,
}

impl Difficulty {
    /// Get display name for this difficulty.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Easy => "easy",
            Self::Medium => "medium",
            Self::Hard => "hard",
        }
    }
}

/// Provenance of a capability snapshot.
///
/// Tagged so no invalid hybrid state is representable: a snapshot either came
/// from the persisted registry or from the keyword heuristic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CapabilitySource {
    Database,
    Heuristic,
}

/// Provider class derived from keyword matching.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderClass {
    Streaming,
    Software,
    Utility,
    Other,
}

/// Persisted registry row for a provider with known cancellation support.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredProvider {
    /// Normalized provider key
    pub key: String,
    /// Display name
    pub display_name: String,
    pub supports_api: bool,
    pub supports_automation: bool,
    pub api_success_rate: f64,
    pub automation_success_rate: f64,
    pub api_estimated_minutes: u32,
    pub automation_estimated_minutes: u32,
    pub manual_estimated_minutes: u32,
    pub difficulty: Difficulty,
    pub requires_2fa: bool,
    pub has_retention_offers: bool,
}

/// Derived knowledge of a provider's cancellation support.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderCapability {
    /// Normalized provider key
    pub provider_key: String,
    pub supports_api: bool,
    pub supports_automation: bool,
    /// Manual is always available
    pub supports_manual: bool,
    pub api_success_rate: f64,
    pub automation_success_rate: f64,
    pub manual_success_rate: f64,
    pub api_estimated_minutes: u32,
    pub automation_estimated_minutes: u32,
    pub manual_estimated_minutes: u32,
    pub difficulty: Difficulty,
    pub requires_2fa: bool,
    pub has_retention_offers: bool,
    pub source: CapabilitySource,
    pub assessed_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl ProviderCapability {
    /// Whether a method is supported for this provider.
    #[must_use]
    pub fn supports(&self, method: Method) -> bool {
        match method {
            Method::Api => self.supports_api,
            Method::Automation => self.supports_automation,
            Method::Manual => self.supports_manual,
        }
    }

    /// Historical success rate for a method.
    #[must_use]
    pub fn success_rate(&self, method: Method) -> f64 {
        match method {
            Method::Api => self.api_success_rate,
            Method::Automation => self.automation_success_rate,
            Method::Manual => self.manual_success_rate,
        }
    }

    /// Estimated completion time for a method, in minutes.
    #[must_use]
    pub fn estimated_minutes(&self, method: Method) -> u32 {
        match method {
            Method::Api => self.api_estimated_minutes,
            Method::Automation => self.automation_estimated_minutes,
            Method::Manual => self.manual_estimated_minutes,
        }
    }

    /// Whether this cache entry is past its expiry.
    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    /// Whether all success rates satisfy the `[0, 1]` bounds invariant.
    #[must_use]
    pub fn rates_in_bounds(&self) -> bool {
        [
            self.api_success_rate,
            self.automation_success_rate,
            self.manual_success_rate,
        ]
        .iter()
        .all(|r| (0.0..=1.0).contains(r))
    }
}

/// Normalize a provider display name into a cache/registry key.
///
/// Lowercases and strips everything that is not alphanumeric, so
/// "Netflix Premium" and "netflix-premium" share one key.
#[must_use]
pub fn normalize_provider(name: &str) -> String {
    name.chars()
        .filter(char::is_ascii_alphanumeric)
        .collect::<String>()
        .to_lowercase()
}

/// Classify a normalized provider key into a heuristic class.
#[must_use]
pub fn classify_provider(key: &str) -> ProviderClass {
    if STREAMING_PATTERNS.iter().any(|p| p.is_match(key)) {
        return ProviderClass::Streaming;
    }
    if SOFTWARE_PATTERNS.iter().any(|p| p.is_match(key)) {
        return ProviderClass::Software;
    }
    if UTILITY_PATTERNS.iter().any(|p| p.is_match(key)) {
        return ProviderClass::Utility;
    }
    ProviderClass::Other
}

/// Build the heuristic capability for an unknown provider.
///
/// Each class implies a default difficulty, estimated time and
/// retention-offer likelihood. Without registry data no API integration is
/// assumed, and automation is only assumed where self-service web flows are
/// the norm. Manual is always supported.
#[must_use]
pub fn heuristic_capability(
    key: &str,
    now: DateTime<Utc>,
    ttl: Duration,
) -> ProviderCapability {
    let class = classify_provider(key);

    let (difficulty, supports_automation, automation_rate, automation_mins, manual_mins, retention) =
        match class {
            ProviderClass::Streaming => (Difficulty::Easy, true, 0.75, 15, 10, true),
            ProviderClass::Software => (Difficulty::Medium, true, 0.65, 20, 15, false),
            ProviderClass::Utility => (Difficulty::Hard, false, 0.0, 0, 45, true),
            ProviderClass::Other => (Difficulty::Medium, false, 0.0, 0, 30, false),
        };

    ProviderCapability {
        provider_key: key.to_string(),
        supports_api: false,
        supports_automation,
        supports_manual: true,
        api_success_rate: 0.0,
        automation_success_rate: automation_rate,
        manual_success_rate: 0.95,
        api_estimated_minutes: 0,
        automation_estimated_minutes: automation_mins,
        manual_estimated_minutes: manual_mins,
        difficulty,
        requires_2fa: false,
        has_retention_offers: retention,
        source: CapabilitySource::Heuristic,
        assessed_at: now,
        expires_at: now + ttl,
    }
}

/// Build a capability snapshot from a persisted registry row.
fn capability_from_stored(
    stored: &StoredProvider,
    now: DateTime<Utc>,
    ttl: Duration,
) -> ProviderCapability {
    ProviderCapability {
        provider_key: stored.key.clone(),
        supports_api: stored.supports_api,
        supports_automation: stored.supports_automation,
        supports_manual: true,
        api_success_rate: stored.api_success_rate,
        automation_success_rate: stored.automation_success_rate,
        manual_success_rate: 0.95,
        api_estimated_minutes: stored.api_estimated_minutes,
        automation_estimated_minutes: stored.automation_estimated_minutes,
        manual_estimated_minutes: stored.manual_estimated_minutes,
        difficulty: stored.difficulty,
        requires_2fa: stored.requires_2fa,
        has_retention_offers: stored.has_retention_offers,
        source: CapabilitySource::Database,
        assessed_at: now,
        expires_at: now + ttl,
    }
}

/// Capability assessor with a process-wide TTL cache.
pub struct CapabilityAssessor {
    registry: Arc<dyn ProviderRegistry>,
    cache: RwLock<HashMap<String, ProviderCapability>>,
    ttl: Duration,
}

impl CapabilityAssessor {
    /// Create a new assessor.
    #[must_use]
    pub fn new(registry: Arc<dyn ProviderRegistry>, ttl: Duration) -> Self {
        Self {
            registry,
            cache: RwLock::new(HashMap::new()),
            ttl,
        }
    }

    /// Assess cancellation capability for a provider display name.
    ///
    /// Returns the cached snapshot when a valid entry exists; otherwise
    /// derives a fresh one (registry row or heuristic), validates the bounds
    /// invariant, and updates the cache.
    pub async fn assess(&self, provider_name: &str) -> Result<ProviderCapability, EngineError> {
        let key = normalize_provider(provider_name);
        if key.is_empty() {
            return Err(EngineError::Validation(
                "provider name must contain at least one alphanumeric character".to_string(),
            ));
        }

        let now = Utc::now();

        {
            let cache = self.cache.read().await;
            if let Some(entry) = cache.get(&key) {
                if !entry.is_expired(now) {
                    debug!(provider = %key, "Capability cache hit");
                    return Ok(entry.clone());
                }
            }
        }

        let capability = match self.registry.find(&key).await {
            Ok(Some(stored)) => {
                let capability = capability_from_stored(&stored, now, self.ttl);
                if capability.rates_in_bounds() {
                    capability
                } else {
                    warn!(
                        provider = %key,
                        "Registry capability violates rate bounds, using heuristic default"
                    );
                    heuristic_capability(&key, now, self.ttl)
                }
            }
            Ok(None) => heuristic_capability(&key, now, self.ttl),
            Err(e) => {
                warn!(provider = %key, error = %e, "Provider registry unavailable, using heuristic");
                heuristic_capability(&key, now, self.ttl)
            }
        };

        // Last writer wins; concurrent writers computed equivalent snapshots.
        let mut cache = self.cache.write().await;
        cache.insert(key, capability.clone());

        Ok(capability)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryProviderRegistry;

    fn stored_netflix() -> StoredProvider {
        StoredProvider {
            key: "netflix".to_string(),
            display_name: "Netflix".to_string(),
            supports_api: true,
            supports_automation: true,
            api_success_rate: 0.92,
            automation_success_rate: 0.78,
            api_estimated_minutes: 2,
            automation_estimated_minutes: 12,
            manual_estimated_minutes: 10,
            difficulty: Difficulty::Easy,
            requires_2fa: false,
            has_retention_offers: true,
        }
    }

    #[test]
    fn test_normalize_provider() {
        assert_eq!(normalize_provider("Netflix Premium"), "netflixpremium");
        assert_eq!(normalize_provider("T-Mobile (US)"), "tmobileus");
        assert_eq!(normalize_provider("  !!  "), "");
    }

    #[test]
    fn test_classify_provider() {
        assert_eq!(classify_provider("netflixpremium"), ProviderClass::Streaming);
        assert_eq!(classify_provider("adobecreative"), ProviderClass::Software);
        assert_eq!(classify_provider("xfinityinternet"), ProviderClass::Utility);
        assert_eq!(classify_provider("corneliusgym"), ProviderClass::Other);
    }

    #[test]
    fn test_heuristic_manual_always_supported() {
        let now = Utc::now();
        for key in ["netflixpremium", "adobecreative", "xfinityinternet", "unknownbox"] {
            let capability = heuristic_capability(key, now, Duration::hours(1));
            assert!(capability.supports_manual);
            assert!(!capability.supports_api);
            assert!(capability.rates_in_bounds());
            assert_eq!(capability.source, CapabilitySource::Heuristic);
        }
    }

    #[tokio::test]
    async fn test_empty_name_is_rejected() {
        let assessor = CapabilityAssessor::new(
            Arc::new(MemoryProviderRegistry::new()),
            Duration::hours(1),
        );
        let err = assessor.assess("  !! ").await.unwrap_err();
        assert!(matches!(err, EngineError::Validation(_)));
    }

    #[tokio::test]
    async fn test_registry_backed_assessment() {
        let registry = Arc::new(MemoryProviderRegistry::new());
        registry.upsert(stored_netflix()).await.unwrap();

        let assessor = CapabilityAssessor::new(registry, Duration::hours(1));
        let capability = assessor.assess("Netflix").await.unwrap();

        assert_eq!(capability.source, CapabilitySource::Database);
        assert!(capability.supports_api);
        assert!((capability.api_success_rate - 0.92).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn test_out_of_bounds_registry_row_falls_back_to_heuristic() {
        let registry = Arc::new(MemoryProviderRegistry::new());
        let mut stored = stored_netflix();
        stored.api_success_rate = 1.7;
        registry.upsert(stored).await.unwrap();

        let assessor = CapabilityAssessor::new(registry, Duration::hours(1));
        let capability = assessor.assess("Netflix").await.unwrap();

        assert_eq!(capability.source, CapabilitySource::Heuristic);
        assert!(capability.rates_in_bounds());
    }

    #[tokio::test]
    async fn test_cache_hit_skips_registry() {
        let registry = Arc::new(MemoryProviderRegistry::new());
        registry.upsert(stored_netflix()).await.unwrap();

        let assessor = CapabilityAssessor::new(Arc::clone(&registry) as Arc<dyn ProviderRegistry>, Duration::hours(1));
        let first = assessor.assess("Netflix").await.unwrap();

        // Remove the row; the cached snapshot must still be served.
        registry
            .upsert(StoredProvider {
                api_success_rate: 0.1,
                ..stored_netflix()
            })
            .await
            .unwrap();

        let second = assessor.assess("Netflix").await.unwrap();
        assert!((second.api_success_rate - first.api_success_rate).abs() < f64::EPSILON);
    }
}
