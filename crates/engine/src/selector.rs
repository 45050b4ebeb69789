//! Method selection and fallback chain construction.
//!
//! Both functions are pure: identical inputs always yield identical output,
//! which keeps the orchestration state machine deterministic and testable.

use crate::capability::{Difficulty, ProviderCapability};
use crate::types::{Method, MethodPreference};

/// Threshold above which a supported API integration is trusted outright.
const API_CONFIDENCE_THRESHOLD: f64 = 0.85;

/// Threshold above which automation is worth trying on track record alone.
const AUTOMATION_CONFIDENCE_THRESHOLD: f64 = 0.7;

/// Choose the primary cancellation method for a provider.
///
/// A supported explicit preference always wins. Otherwise the consensus
/// heuristic applies: a high-confidence API integration first, then
/// automation when the provider fights back (2FA, retention offers, hard
/// difficulty) or has a good automation track record, then manual.
#[must_use]
pub fn select_method(capability: &ProviderCapability, preference: MethodPreference) -> Method {
    if let Some(preferred) = preference.as_method() {
        if capability.supports(preferred) {
            return preferred;
        }
    }

    if capability.supports_api && capability.api_success_rate > API_CONFIDENCE_THRESHOLD {
        return Method::Api;
    }

    if capability.supports_automation
        && (capability.requires_2fa
            || capability.has_retention_offers
            || capability.difficulty == Difficulty::Hard
            || capability.automation_success_rate > AUTOMATION_CONFIDENCE_THRESHOLD)
    {
        return Method::Automation;
    }

    Method::Manual
}

/// Build the ordered fallback chain starting from the primary method.
///
/// Appends the remaining capability-supported methods, then guarantees
/// `manual` appears exactly once as the final element. A manual primary gets
/// no fallback: a human following instructions has nothing to fall back to.
#[must_use]
pub fn build_fallback_chain(primary: Method, capability: &ProviderCapability) -> Vec<Method> {
    if primary == Method::Manual {
        return vec![Method::Manual];
    }

    let mut chain = vec![primary];
    for method in [Method::Api, Method::Automation] {
        if capability.supports(method) && !chain.contains(&method) {
            chain.push(method);
        }
    }
    chain.push(Method::Manual);
    chain
}
