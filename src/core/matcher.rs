//! Admission decision for one `(path, method)` pair.
//!
//! Checks run in a fixed order and the first conclusive one wins:
//!
//! 1. exempt literal paths are admitted outright
//! 2. exact `path:METHOD` key disabled
//! 3. legacy `path` key disabled
//! 4. disabled `^...` regex keys, matched from the start of the path
//! 5. disabled `{name}` template keys, matched from the start
//! 6. the path's feature flag (exact path mapping, then first prefix)
//! 7. admit
//!
//! A stored pattern that does not compile is logged once and treated as
//! not matching, so it cannot take other routes down with it.

use std::{
    collections::{BTreeSet, HashMap},
    sync::{PoisonError, RwLock},
};

use http::Method;
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::warn;

use crate::core::{flags::FlagStore, key::EndpointKey, registry::EndpointRegistry};

static TEMPLATE_PARAM: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\{([^{}/]+)\}").expect("valid regex"));

/// How a registry key takes part in matching.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatternKind {
    ExactWithMethod,
    ExactLegacy,
    AnchoredRegex,
    WildcardTemplate,
}

impl PatternKind {
    pub fn classify(key: &EndpointKey) -> Self {
        let raw = key.as_str();
        if raw.starts_with('^') {
            PatternKind::AnchoredRegex
        } else if raw.contains('{') || raw.contains('}') {
            PatternKind::WildcardTemplate
        } else if key.is_legacy() {
            PatternKind::ExactLegacy
        } else {
            PatternKind::ExactWithMethod
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PatternKind::ExactWithMethod => "exact",
            PatternKind::ExactLegacy => "legacy",
            PatternKind::AnchoredRegex => "regex",
            PatternKind::WildcardTemplate => "template",
        }
    }
}

/// Why a request was turned away. Never shown to the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    ExactKey(EndpointKey),
    LegacyKey(EndpointKey),
    Regex(EndpointKey),
    Template(EndpointKey),
    Flag(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Exempt,
    Admitted,
    Rejected(Rejection),
}

impl Decision {
    pub fn is_admitted(&self) -> bool {
        !matches!(self, Decision::Rejected(_))
    }
}

/// Compile `pattern` so it only matches at the start of the input, the way
/// a prefix match would. Nothing is implied about the end.
pub fn compile_from_start(pattern: &str) -> Result<Regex, regex::Error> {
    Regex::new(&format!("^(?:{pattern})"))
}

/// Regex source for an OpenAPI-style template. Literal text is escaped and
/// each `{name}` becomes `(?P<name>[^/]+)`. Only the start is anchored.
pub fn template_to_regex(template: &str) -> String {
    let mut source = String::from("^");
    let mut last = 0;
    for caps in TEMPLATE_PARAM.captures_iter(template) {
        let (Some(whole), Some(name)) = (caps.get(0), caps.get(1)) else {
            continue;
        };
        source.push_str(&regex::escape(&template[last..whole.start()]));
        source.push_str(&format!("(?P<{}>[^/]+)", name.as_str()));
        last = whole.end();
    }
    source.push_str(&regex::escape(&template[last..]));
    source
}

/// Evaluates requests against registry entries and feature flags.
#[derive(Debug, Default)]
pub struct PatternMatcher {
    exempt_paths: BTreeSet<String>,
    /// Compiled disabled patterns, `None` for ones that failed. Bounded by
    /// the disabled keys since the last [`PatternMatcher::prune`].
    compiled: RwLock<HashMap<String, Option<Regex>>>,
}

impl PatternMatcher {
    pub fn new(exempt_paths: impl IntoIterator<Item = String>) -> Self {
        Self {
            exempt_paths: exempt_paths.into_iter().collect(),
            compiled: RwLock::default(),
        }
    }

    pub fn is_exempt(&self, path: &str) -> bool {
        self.exempt_paths.contains(path)
    }

    pub fn exempt_paths(&self) -> impl Iterator<Item = &str> {
        self.exempt_paths.iter().map(String::as_str)
    }

    pub fn evaluate(
        &self,
        path: &str,
        method: &Method,
        registry: &EndpointRegistry,
        flags: &FlagStore,
    ) -> Decision {
        if self.is_exempt(path) {
            return Decision::Exempt;
        }

        let exact = EndpointKey::compose(path, method);
        if registry.state(exact.as_str()) == Some(false) {
            return Decision::Rejected(Rejection::ExactKey(exact));
        }

        if registry.state(path) == Some(false) {
            return Decision::Rejected(Rejection::LegacyKey(EndpointKey::legacy(path)));
        }

        let disabled = registry.disabled_keys();

        for key in disabled
            .iter()
            .filter(|key| PatternKind::classify(key) == PatternKind::AnchoredRegex)
        {
            if self.matches(key.as_str(), path, compile_from_start) {
                return Decision::Rejected(Rejection::Regex(key.clone()));
            }
        }

        for key in disabled
            .iter()
            .filter(|key| PatternKind::classify(key) == PatternKind::WildcardTemplate)
        {
            // A template carrying a method is matched against `path:METHOD`,
            // so the method must agree and the template cannot overrun
            // into deeper segments.
            let hit = if key.is_legacy() {
                self.matches(key.as_str(), path, compile_template)
            } else {
                self.matches(key.as_str(), exact.as_str(), compile_template)
            };
            if hit {
                return Decision::Rejected(Rejection::Template(key.clone()));
            }
        }

        if let Some(flag) = flags.flag_for_path(path)
            && !flags.is_exempt(&flag)
            && flags.get(&flag) == Some(false)
        {
            return Decision::Rejected(Rejection::Flag(flag));
        }

        Decision::Admitted
    }

    /// Forget compiled patterns whose key is no longer disabled.
    /// Returns the number of entries dropped.
    pub fn prune(&self, registry: &EndpointRegistry) -> usize {
        let disabled: BTreeSet<EndpointKey> = registry.disabled_keys().into_iter().collect();
        let mut compiled = self.compiled.write().unwrap_or_else(PoisonError::into_inner);
        let before = compiled.len();
        compiled.retain(|pattern, _| disabled.contains(pattern.as_str()));
        before - compiled.len()
    }

    pub fn compiled_len(&self) -> usize {
        self.compiled
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    fn matches(
        &self,
        pattern: &str,
        input: &str,
        compile: fn(&str) -> Result<Regex, regex::Error>,
    ) -> bool {
        if let Some(entry) = self
            .compiled
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(pattern)
        {
            return entry.as_ref().is_some_and(|regex| regex.is_match(input));
        }

        let entry = match compile(pattern) {
            Ok(regex) => Some(regex),
            Err(e) => {
                warn!(pattern, error = %e, "Stored pattern does not compile, treating as no match");
                None
            }
        };
        let hit = entry.as_ref().is_some_and(|regex| regex.is_match(input));
        self.compiled
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(pattern.to_string(), entry);
        hit
    }
}

/// Compile a template key the way matching does.
pub(crate) fn compile_template(template: &str) -> Result<Regex, regex::Error> {
    Regex::new(&template_to_regex(template))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::{
        core::flags::{FlagSettings, PathPrefixMapping},
        ports::discovery::{Domain, DomainSource},
    };

    struct NoDomains;

    impl DomainSource for NoDomains {
        fn discover(&self) -> Vec<Domain> {
            Vec::new()
        }
    }

    fn fixture(settings: FlagSettings) -> (PatternMatcher, EndpointRegistry, FlagStore) {
        let settings = FlagSettings {
            api_prefix: "/api/v1".to_string(),
            ..settings
        };
        (
            PatternMatcher::new(["/health".to_string()]),
            EndpointRegistry::new(),
            FlagStore::new(settings, Arc::new(NoDomains)),
        )
    }

    #[test]
    fn classifies_keys() {
        let kind = |raw: &str| PatternKind::classify(&EndpointKey::new(raw));
        assert_eq!(kind("/a:GET"), PatternKind::ExactWithMethod);
        assert_eq!(kind("/a"), PatternKind::ExactLegacy);
        assert_eq!(kind("^/a/.*"), PatternKind::AnchoredRegex);
        assert_eq!(kind("^/a/\\d{2}"), PatternKind::AnchoredRegex);
        assert_eq!(kind("/users/{id}:GET"), PatternKind::WildcardTemplate);
    }

    #[test]
    fn template_regex_escapes_literals() {
        assert_eq!(
            template_to_regex("/api/v1/users/{user_id}"),
            r"^/api/v1/users/(?P<user_id>[^/]+)"
        );
        assert_eq!(template_to_regex("/files.json"), r"^/files\.json");
    }

    #[test]
    fn exempt_path_bypasses_disabled_entries() {
        let (matcher, registry, flags) = fixture(FlagSettings::default());
        registry.register("/health:GET".into(), false, "");
        let decision = matcher.evaluate("/health", &Method::GET, &registry, &flags);
        assert_eq!(decision, Decision::Exempt);
    }

    #[test]
    fn exact_and_legacy_keys_reject() {
        let (matcher, registry, flags) = fixture(FlagSettings::default());
        registry.register("/a:POST".into(), false, "");
        registry.register("/b".into(), false, "");

        assert!(!matcher.evaluate("/a", &Method::POST, &registry, &flags).is_admitted());
        assert!(matcher.evaluate("/a", &Method::GET, &registry, &flags).is_admitted());
        assert!(!matcher.evaluate("/b", &Method::DELETE, &registry, &flags).is_admitted());
    }

    #[test]
    fn regex_matches_from_start_only() {
        let (matcher, registry, flags) = fixture(FlagSettings::default());
        registry.register("^/api/v1/admin/".into(), false, "");

        assert!(
            !matcher
                .evaluate("/api/v1/admin/users/7", &Method::GET, &registry, &flags)
                .is_admitted()
        );
        assert!(
            matcher
                .evaluate("/x/api/v1/admin/", &Method::GET, &registry, &flags)
                .is_admitted()
        );
    }

    #[test]
    fn method_bound_template_does_not_cover_deeper_paths() {
        let (matcher, registry, flags) = fixture(FlagSettings::default());
        registry.register("/api/v1/users/{user_id}:GET".into(), false, "");

        let rejected = matcher.evaluate("/api/v1/users/42", &Method::GET, &registry, &flags);
        assert!(matches!(rejected, Decision::Rejected(Rejection::Template(_))));
        assert!(
            matcher
                .evaluate("/api/v1/users/42/sub", &Method::GET, &registry, &flags)
                .is_admitted()
        );
        assert!(
            matcher
                .evaluate("/api/v1/users/42", &Method::DELETE, &registry, &flags)
                .is_admitted()
        );
    }

    #[test]
    fn broken_pattern_is_isolated() {
        let (matcher, registry, flags) = fixture(FlagSettings::default());
        registry.register("^/api/(unclosed".into(), false, "");
        registry.register("/api/v1/{a}/{a}".into(), false, "");
        registry.register("^/api/v1/admin".into(), false, "");

        assert!(
            matcher
                .evaluate("/api/v1/recipes", &Method::GET, &registry, &flags)
                .is_admitted()
        );
        assert!(
            !matcher
                .evaluate("/api/v1/admin/x", &Method::GET, &registry, &flags)
                .is_admitted()
        );
    }

    #[test]
    fn prune_drops_patterns_of_reenabled_keys() {
        let (matcher, registry, flags) = fixture(FlagSettings::default());
        registry.register("^/api/v1/admin".into(), false, "");
        registry.register("/api/v1/{id}:GET".into(), false, "");
        matcher.evaluate("/api/v1/x", &Method::GET, &registry, &flags);
        assert_eq!(matcher.compiled_len(), 2);

        registry.enable("^/api/v1/admin".into());
        assert_eq!(matcher.prune(&registry), 1);
        assert_eq!(matcher.compiled_len(), 1);
    }

    #[test]
    fn exact_flag_mapping_beats_prefix_mapping() {
        let settings = FlagSettings {
            path_flags: [("/api/v1/a/x".to_string(), "flagExact".to_string())].into(),
            prefix_flags: vec![PathPrefixMapping::new("/api/v1/a/", "flagPrefix")],
            initial: [
                ("flagExact".to_string(), false),
                ("flagPrefix".to_string(), true),
            ]
            .into(),
            ..FlagSettings::default()
        };
        let (matcher, registry, flags) = fixture(settings);

        let decision = matcher.evaluate("/api/v1/a/x", &Method::GET, &registry, &flags);
        assert_eq!(decision, Decision::Rejected(Rejection::Flag("flagExact".to_string())));
        assert!(matcher.evaluate("/api/v1/a/y", &Method::GET, &registry, &flags).is_admitted());
    }

    #[test]
    fn registry_entry_wins_over_flag() {
        let settings = FlagSettings {
            prefix_flags: vec![PathPrefixMapping::new("/api/v1/a/", "flagPrefix")],
            initial: [("flagPrefix".to_string(), false)].into(),
            ..FlagSettings::default()
        };
        let (matcher, registry, flags) = fixture(settings);
        registry.register("/api/v1/a/x:GET".into(), false, "");

        let decision = matcher.evaluate("/api/v1/a/x", &Method::GET, &registry, &flags);
        assert!(matches!(decision, Decision::Rejected(Rejection::ExactKey(_))));
    }
}
