//! Model catalog: discovery, aliasing and the two selection pools
//!
//! Raw backend ids such as `qwen2.5:7b-instruct` are mapped to short aliases
//! through an ordered rule table. The aliases are then shuffled into two
//! disjoint pools so the two personas tend to draw different models.

use crate::llm::{ChatBackend, LlmError};
use crate::persona::{ModelChoice, Side};
use rand::seq::SliceRandom;
use rand::Rng;
use serde::Serialize;
use std::collections::BTreeMap;

/// Alias -> raw backend model id
pub type AliasMap = BTreeMap<String, String>;

/// How a rule recognises a raw model id
#[derive(Debug, Clone, Copy)]
pub enum RawIdPattern {
    Contains(&'static str),
    ContainsWithout {
        needle: &'static str,
        excluded: &'static str,
    },
}

impl RawIdPattern {
    pub fn matches(self, raw_id: &str) -> bool {
        let raw_id = raw_id.to_lowercase();
        match self {
            RawIdPattern::Contains(needle) => raw_id.contains(needle),
            RawIdPattern::ContainsWithout { needle, excluded } => {
                raw_id.contains(needle) && !raw_id.contains(excluded)
            }
        }
    }
}

/// One entry of the alias table
#[derive(Debug, Clone, Copy)]
pub struct AliasRule {
    pub pattern: RawIdPattern,
    pub alias: &'static str,
}

/// Alias rules in priority order; the first match wins
pub const ALIAS_RULES: &[AliasRule] = &[
    AliasRule {
        pattern: RawIdPattern::Contains("phi"),
        alias: "Phi 3",
    },
    AliasRule {
        pattern: RawIdPattern::Contains("qwen"),
        alias: "Qwen 2.5",
    },
    AliasRule {
        pattern: RawIdPattern::Contains("gemma"),
        alias: "Gemma 3",
    },
    AliasRule {
        pattern: RawIdPattern::Contains("deepseek"),
        alias: "DeepSeek R1",
    },
    AliasRule {
        pattern: RawIdPattern::Contains("uncensored"),
        alias: "Unhinged llama",
    },
    AliasRule {
        pattern: RawIdPattern::ContainsWithout {
            needle: "llama",
            excluded: "uncensored",
        },
        alias: "Llama 2",
    },
    AliasRule {
        pattern: RawIdPattern::Contains("mistral"),
        alias: "Mistral",
    },
];

/// Alias for a raw id under the given rules
pub fn alias_for(rules: &[AliasRule], raw_id: &str) -> Option<&'static str> {
    rules
        .iter()
        .find(|rule| rule.pattern.matches(raw_id))
        .map(|rule| rule.alias)
}

/// Ask the backend which models it can serve
pub async fn discover_models<B: ChatBackend + ?Sized>(backend: &B) -> Result<Vec<String>, LlmError> {
    backend.list_models().await
}

/// Map raw ids to aliases.
///
/// Ids are visited in sorted order and the first id to claim an alias keeps
/// it, so the result depends only on the set of ids. Unmatched ids are dropped.
pub fn assign_aliases<S: AsRef<str>>(raw_ids: &[S]) -> AliasMap {
    let mut sorted: Vec<&str> = raw_ids.iter().map(AsRef::as_ref).collect();
    sorted.sort_unstable();
    sorted.dedup();

    let mut aliases = AliasMap::new();
    for raw_id in sorted {
        match alias_for(ALIAS_RULES, raw_id) {
            Some(alias) => {
                aliases
                    .entry(alias.to_string())
                    .or_insert_with(|| raw_id.to_string());
            }
            None => tracing::debug!(raw_id, "No alias rule matches model, dropping it"),
        }
    }
    aliases
}

/// Shuffle aliases and split them into two disjoint pools.
/// The left pool gets the floor half.
pub fn partition<R: Rng + ?Sized>(aliases: &AliasMap, rng: &mut R) -> (AliasMap, AliasMap) {
    let mut keys: Vec<&String> = aliases.keys().collect();
    keys.shuffle(rng);
    let midpoint = keys.len() / 2;

    let pick = |subset: &[&String]| -> AliasMap {
        subset
            .iter()
            .map(|k| ((*k).clone(), aliases[*k].clone()))
            .collect()
    };

    (pick(&keys[..midpoint]), pick(&keys[midpoint..]))
}

/// Everything the session knows about available models
#[derive(Debug, Clone, Default, Serialize)]
pub struct CatalogState {
    pub aliases: AliasMap,
    pub left_pool: AliasMap,
    pub right_pool: AliasMap,
}

impl CatalogState {
    pub fn from_raw_ids<S: AsRef<str>, R: Rng + ?Sized>(raw_ids: &[S], rng: &mut R) -> Self {
        let aliases = assign_aliases(raw_ids);
        let (left_pool, right_pool) = partition(&aliases, rng);
        Self {
            aliases,
            left_pool,
            right_pool,
        }
    }

    pub fn pool(&self, side: Side) -> &AliasMap {
        match side {
            Side::Left => &self.left_pool,
            Side::Right => &self.right_pool,
        }
    }

    /// Resolve an alias from the full catalog
    pub fn choice(&self, alias: &str) -> Option<ModelChoice> {
        self.aliases.get(alias).map(|raw_id| ModelChoice {
            alias: alias.to_string(),
            backend_model_id: raw_id.clone(),
        })
    }

    /// Random model from a side's pool, `None` when the pool is empty
    pub fn default_choice<R: Rng + ?Sized>(&self, side: Side, rng: &mut R) -> Option<ModelChoice> {
        let pool = self.pool(side);
        let keys: Vec<&String> = pool.keys().collect();
        keys.choose(rng).and_then(|alias| self.choice(alias))
    }
}
