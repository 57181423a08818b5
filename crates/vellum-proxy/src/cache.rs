//! Compiled rules keyed by their Private-role path.

use std::sync::Arc;
use std::time::Duration;

use vellum_storage::{Clock, DEFAULT_TTL, ExpiringMap, Storage, StorageErrorKind};
use vellum_template::Evaluator;

use crate::error::ProxyError;
use crate::rule::CompiledRule;

/// Cache of compiled proxy rules with sliding expiry.
pub struct RuleCache {
    rules: ExpiringMap<String, Arc<CompiledRule>>,
    evaluator: Arc<dyn Evaluator>,
}

impl std::fmt::Debug for RuleCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RuleCache")
            .field("rules", &self.rules.len())
            .finish_non_exhaustive()
    }
}

impl RuleCache {
    /// Create a cache using the default idle lifetime.
    #[must_use]
    pub fn new(evaluator: Arc<dyn Evaluator>, clock: Arc<dyn Clock>) -> Self {
        Self::with_ttl(evaluator, clock, DEFAULT_TTL)
    }

    /// Create a cache with a custom idle lifetime.
    #[must_use]
    pub fn with_ttl(evaluator: Arc<dyn Evaluator>, clock: Arc<dyn Clock>, ttl: Duration) -> Self {
        Self {
            rules: ExpiringMap::new(ttl, clock),
            evaluator,
        }
    }

    /// Return the rule for `path`, compiling it from `private` on a miss.
    ///
    /// `Ok(None)` means the descriptor is not present in `private`.
    pub fn get_or_compile(
        &self,
        path: &str,
        private: &dyn Storage,
    ) -> Result<Option<Arc<CompiledRule>>, ProxyError> {
        if let Some(rule) = self.rules.get(&path.to_owned()) {
            return Ok(Some(rule));
        }

        let source = match private.read(path) {
            Ok(source) => source,
            Err(e) if e.kind == StorageErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let rule = Arc::new(CompiledRule::compile(&source, self.evaluator.as_ref())?);
        tracing::debug!(path, "Compiled proxy rule");
        self.rules.insert(path.to_owned(), Arc::clone(&rule));
        Ok(Some(rule))
    }

    /// Drop one compiled rule.
    pub fn remove(&self, path: &str) -> bool {
        self.rules.remove(&path.to_owned()).is_some()
    }

    /// Drop every compiled rule.
    pub fn clear(&self) {
        self.rules.clear();
    }

    /// Number of rules currently held (expired ones included until swept).
    #[must_use]
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Drop expired rules, returning how many were removed.
    pub fn sweep(&self) -> usize {
        self.rules.sweep()
    }
}
