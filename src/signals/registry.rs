//! Static catalogs of signals and categories.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::preferences::PreferenceKind;
use crate::tier::TierKind;

/// Built-in signal names.
pub mod signal_names {
    pub const USER_CORRECTION: &str = "USER_CORRECTION";
    pub const EXPLICIT_PREFERENCE: &str = "EXPLICIT_PREFERENCE";
    pub const DECISION: &str = "DECISION";
    pub const PROJECT_CONTEXT: &str = "PROJECT_CONTEXT";
    pub const EMOTIONAL_INTENSITY: &str = "EMOTIONAL_INTENSITY";
    pub const BREAKTHROUGH: &str = "BREAKTHROUGH";
    pub const REPEATED_REFERENCE: &str = "REPEATED_REFERENCE";
    pub const SPECIFIC_DETAIL: &str = "SPECIFIC_DETAIL";
    pub const QUESTION: &str = "QUESTION";
    pub const CONTRADICTION: &str = "CONTRADICTION";
    pub const STALE_REFERENCE: &str = "STALE_REFERENCE";
    pub const SMALL_TALK: &str = "SMALL_TALK";
}

/// Built-in category names.
pub mod category_names {
    pub const COLOR_PREFERENCE: &str = "color_preference";
    pub const TYPOGRAPHY_PREFERENCE: &str = "typography_preference";
    pub const LAYOUT_PREFERENCE: &str = "layout_preference";
    pub const INDUSTRY_CONTEXT: &str = "industry_context";
    pub const PERFORMANCE_REQUIREMENT: &str = "performance_requirement";
    pub const BRAND_IDENTITY: &str = "brand_identity";
}

/// How strongly a signal should dominate when several match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalPriority {
    Low,
    Medium,
    High,
    Critical,
}

/// Broad family a signal belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalCategory {
    /// Explicit user feedback about earlier output
    Feedback,
    /// Stated preferences and decisions
    Intent,
    /// Background about the user or their project
    Context,
    /// Emotional register of the message
    Emotion,
    /// Relationship to recent history
    Continuity,
    /// Evidence the message matters little
    Noise,
}

/// Immutable definition of a weighted signal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalDefinition {
    pub name: String,
    /// Contribution to the raw score; may be negative
    pub weight: f64,
    pub category: SignalCategory,
    pub priority: SignalPriority,
}

impl SignalDefinition {
    pub fn new(
        name: impl Into<String>,
        weight: f64,
        category: SignalCategory,
        priority: SignalPriority,
    ) -> Self {
        Self {
            name: name.into(),
            weight,
            category,
            priority,
        }
    }
}

/// Immutable definition of a content category.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryDefinition {
    pub name: String,
    /// Added to the raw score when the category is present
    pub bonus: f64,
    /// Tier records in this category usually deserve
    pub retention_hint: TierKind,
    /// Preference map this category feeds, if any
    pub intelligence: Option<PreferenceKind>,
}

impl CategoryDefinition {
    pub fn new(
        name: impl Into<String>,
        bonus: f64,
        retention_hint: TierKind,
        intelligence: Option<PreferenceKind>,
    ) -> Self {
        Self {
            name: name.into(),
            bonus,
            retention_hint,
            intelligence,
        }
    }
}

/// Catalog of signal definitions keyed by name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalRegistry {
    signals: BTreeMap<String, SignalDefinition>,
}

impl Default for SignalRegistry {
    fn default() -> Self {
        Self::standard()
    }
}

impl SignalRegistry {
    /// The built-in signal catalog.
    pub fn standard() -> Self {
        use signal_names::*;
        use SignalCategory as C;
        use SignalPriority as P;

        Self::from_definitions([
            SignalDefinition::new(USER_CORRECTION, 3.0, C::Feedback, P::Critical),
            SignalDefinition::new(EXPLICIT_PREFERENCE, 2.5, C::Intent, P::High),
            SignalDefinition::new(DECISION, 2.0, C::Intent, P::High),
            SignalDefinition::new(PROJECT_CONTEXT, 1.5, C::Context, P::Medium),
            SignalDefinition::new(EMOTIONAL_INTENSITY, 1.0, C::Emotion, P::Medium),
            SignalDefinition::new(BREAKTHROUGH, 4.0, C::Emotion, P::Critical),
            SignalDefinition::new(REPEATED_REFERENCE, 1.0, C::Continuity, P::Medium),
            SignalDefinition::new(SPECIFIC_DETAIL, 1.0, C::Context, P::Medium),
            SignalDefinition::new(QUESTION, 0.5, C::Intent, P::Low),
            SignalDefinition::new(CONTRADICTION, -1.5, C::Continuity, P::High),
            SignalDefinition::new(STALE_REFERENCE, -1.0, C::Noise, P::Low),
            SignalDefinition::new(SMALL_TALK, -1.0, C::Noise, P::Low),
        ])
    }

    pub fn from_definitions(defs: impl IntoIterator<Item = SignalDefinition>) -> Self {
        Self {
            signals: defs.into_iter().map(|d| (d.name.clone(), d)).collect(),
        }
    }

    /// Add or replace a definition.
    pub fn with_signal(mut self, def: SignalDefinition) -> Self {
        self.signals.insert(def.name.clone(), def);
        self
    }

    pub fn get(&self, name: &str) -> Option<&SignalDefinition> {
        self.signals.get(name)
    }

    pub fn weight(&self, name: &str) -> Option<f64> {
        self.get(name).map(|d| d.weight)
    }

    /// Highest-priority definition among the given names.
    ///
    /// Ties break on larger absolute weight, then name.
    pub fn dominant<'a, I>(&self, names: I) -> Option<&SignalDefinition>
    where
        I: IntoIterator<Item = &'a String>,
    {
        names.into_iter().filter_map(|n| self.get(n)).max_by(|a, b| {
            a.priority
                .cmp(&b.priority)
                .then(a.weight.abs().total_cmp(&b.weight.abs()))
                .then(b.name.cmp(&a.name))
        })
    }

    pub fn iter(&self) -> impl Iterator<Item = &SignalDefinition> {
        self.signals.values()
    }

    pub fn len(&self) -> usize {
        self.signals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.signals.is_empty()
    }
}

/// Catalog of category definitions keyed by name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryRegistry {
    categories: BTreeMap<String, CategoryDefinition>,
}

impl Default for CategoryRegistry {
    fn default() -> Self {
        Self::standard()
    }
}

impl CategoryRegistry {
    /// The built-in category catalog.
    pub fn standard() -> Self {
        use category_names::*;

        Self::from_definitions([
            CategoryDefinition::new(
                COLOR_PREFERENCE,
                1.0,
                TierKind::LongTerm,
                Some(PreferenceKind::Color),
            ),
            CategoryDefinition::new(
                TYPOGRAPHY_PREFERENCE,
                1.0,
                TierKind::LongTerm,
                Some(PreferenceKind::Typography),
            ),
            CategoryDefinition::new(
                LAYOUT_PREFERENCE,
                1.0,
                TierKind::LongTerm,
                Some(PreferenceKind::Layout),
            ),
            CategoryDefinition::new(
                INDUSTRY_CONTEXT,
                1.5,
                TierKind::Permanent,
                Some(PreferenceKind::Industry),
            ),
            CategoryDefinition::new(
                PERFORMANCE_REQUIREMENT,
                1.0,
                TierKind::MediumTerm,
                Some(PreferenceKind::Performance),
            ),
            CategoryDefinition::new(BRAND_IDENTITY, 1.5, TierKind::LongTerm, None),
        ])
    }

    pub fn from_definitions(defs: impl IntoIterator<Item = CategoryDefinition>) -> Self {
        Self {
            categories: defs.into_iter().map(|d| (d.name.clone(), d)).collect(),
        }
    }

    /// Add or replace a definition.
    pub fn with_category(mut self, def: CategoryDefinition) -> Self {
        self.categories.insert(def.name.clone(), def);
        self
    }

    pub fn get(&self, name: &str) -> Option<&CategoryDefinition> {
        self.categories.get(name)
    }

    pub fn bonus(&self, name: &str) -> Option<f64> {
        self.get(name).map(|d| d.bonus)
    }

    /// Preference maps fed by the given categories, deduplicated.
    pub fn learning_routes<'a, I>(&self, names: I) -> Vec<PreferenceKind>
    where
        I: IntoIterator<Item = &'a String>,
    {
        let mut routes: Vec<PreferenceKind> = names
            .into_iter()
            .filter_map(|n| self.get(n))
            .filter_map(|d| d.intelligence)
            .collect();
        routes.sort();
        routes.dedup();
        routes
    }

    pub fn iter(&self) -> impl Iterator<Item = &CategoryDefinition> {
        self.categories.values()
    }

    pub fn len(&self) -> usize {
        self.categories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.categories.is_empty()
    }
}
