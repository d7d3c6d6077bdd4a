//! Work-item tiering.
//!
//! A [`TierPolicy`] maps an item name to [`Tier::Priority`] or
//! [`Tier::Normal`]. The orchestrator only ever sees the policy, so the
//! marker strings an operator configures are independent of the phase logic.

use std::collections::BTreeSet;

use crate::types::{Target, Tier, WorkItem};

// ---------------------------------------------------------------------------
// TierPolicy
// ---------------------------------------------------------------------------

pub trait TierPolicy: Send + Sync {
    fn classify(&self, item: &str) -> Tier;
}

impl<F> TierPolicy for F
where
    F: Fn(&str) -> Tier + Send + Sync,
{
    fn classify(&self, item: &str) -> Tier {
        self(item)
    }
}

// ---------------------------------------------------------------------------
// MarkerPolicy
// ---------------------------------------------------------------------------

/// Priority iff the item name contains any marker, compared case-insensitively.
#[derive(Debug, Clone)]
pub struct MarkerPolicy {
    markers: Vec<String>,
}

impl MarkerPolicy {
    pub fn new<I, S>(markers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let markers = markers
            .into_iter()
            .map(|m| m.as_ref().trim().to_ascii_lowercase())
            .filter(|m| !m.is_empty())
            .collect();
        Self { markers }
    }

    pub fn markers(&self) -> &[String] {
        &self.markers
    }
}

/// Cryptographic and manager-role services come up first and go down last.
pub fn default_markers() -> Vec<String> {
    vec!["crypt".to_string(), "manager".to_string()]
}

impl Default for MarkerPolicy {
    fn default() -> Self {
        Self::new(default_markers())
    }
}

impl TierPolicy for MarkerPolicy {
    fn classify(&self, item: &str) -> Tier {
        let name = item.to_ascii_lowercase();
        if self.markers.iter().any(|m| name.contains(m.as_str())) {
            Tier::Priority
        } else {
            Tier::Normal
        }
    }
}

// ---------------------------------------------------------------------------
// Materialisation
// ---------------------------------------------------------------------------

/// Build one [`WorkItem`] per (target, item) pair, tiered by `policy`.
///
/// Duplicate pairs collapse to a single item.
pub fn classify_items(
    policy: &dyn TierPolicy,
    targets: &[Target],
    items: &[String],
) -> Vec<WorkItem> {
    let mut out: Vec<WorkItem> = Vec::with_capacity(targets.len() * items.len());
    let mut seen: BTreeSet<(&Target, &str)> = BTreeSet::new();
    for target in targets {
        for name in items {
            if !seen.insert((target, name.as_str())) {
                continue;
            }
            out.push(WorkItem {
                target: target.clone(),
                name: name.clone(),
                tier: policy.classify(name),
            });
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_markers_match_crypto_and_manager_roles() {
        let policy = MarkerPolicy::default();
        assert_eq!(policy.classify("CryptSvc"), Tier::Priority);
        assert_eq!(policy.classify("key-manager"), Tier::Priority);
        assert_eq!(policy.classify("nginx"), Tier::Normal);
    }

    #[test]
    fn markers_are_case_insensitive_and_trimmed() {
        let policy = MarkerPolicy::new(["  VAULT "]);
        assert_eq!(policy.markers(), &["vault".to_string()]);
        assert_eq!(policy.classify("hashicorp-Vault-agent"), Tier::Priority);
    }

    #[test]
    fn empty_markers_classify_everything_normal() {
        let policy = MarkerPolicy::new(Vec::<String>::new());
        assert_eq!(policy.classify("cryptd"), Tier::Normal);
    }

    #[test]
    fn closures_are_policies() {
        let policy = |name: &str| {
            if name.starts_with("db") {
                Tier::Priority
            } else {
                Tier::Normal
            }
        };
        assert_eq!(policy.classify("db-primary"), Tier::Priority);
        assert_eq!(policy.classify("cryptd"), Tier::Normal);
    }

    #[test]
    fn classify_items_is_cartesian_and_deduplicated() {
        let targets = vec![Target::new("a"), Target::new("b")];
        let items = vec![
            "cryptd".to_string(),
            "web".to_string(),
            "web".to_string(),
        ];
        let work = classify_items(&MarkerPolicy::default(), &targets, &items);
        assert_eq!(work.len(), 4);
        let priority: Vec<_> = work.iter().filter(|w| w.tier == Tier::Priority).collect();
        assert_eq!(priority.len(), 2);
        assert!(priority.iter().all(|w| w.name == "cryptd"));
    }

    #[test]
    fn classify_items_keeps_first_occurrence_order_across_repeats() {
        let targets = vec![Target::new("b"), Target::new("a"), Target::new("b")];
        let items = vec!["web".to_string(), "cryptd".to_string(), "web".to_string()];
        let work = classify_items(&MarkerPolicy::default(), &targets, &items);
        let pairs: Vec<_> = work
            .iter()
            .map(|w| (w.target.name(), w.name.as_str(), w.tier))
            .collect();
        assert_eq!(
            pairs,
            vec![
                ("b", "web", Tier::Normal),
                ("b", "cryptd", Tier::Priority),
                ("a", "web", Tier::Normal),
                ("a", "cryptd", Tier::Priority),
            ]
        );
    }
}
