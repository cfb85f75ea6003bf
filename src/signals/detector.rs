//! Pattern-based signal and category detection.
//!
//! Detection is a data-driven rule table: each rule pairs a predicate with
//! the signal (or category) it emits. Rules are evaluated in order against
//! normalized text plus a bounded window of the owner's recent history.
//! Adding a signal means adding a rule, not touching control flow.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::LazyLock;

use super::registry::{category_names, signal_names};

/// Result of running the detector over one interaction.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    /// Matched signal names
    pub signals: BTreeSet<String>,
    /// Matched category names
    pub categories: BTreeSet<String>,
    /// Concrete value patterns found (hex colors, sizes, percentages, URLs)
    pub pattern_matches: usize,
    /// Keyword overlap with recent history, 0-100
    pub context_relevance: f64,
}

impl Detection {
    pub fn has_signal(&self, name: &str) -> bool {
        self.signals.contains(name)
    }

    pub fn has_category(&self, name: &str) -> bool {
        self.categories.contains(name)
    }

    pub fn is_empty(&self) -> bool {
        self.signals.is_empty() && self.categories.is_empty()
    }
}

/// Preprocessed view of one history item.
#[derive(Debug, Clone)]
struct HistoryItem {
    normalized: String,
    keywords: BTreeSet<String>,
}

/// Everything a predicate may look at.
#[derive(Debug)]
pub struct DetectionContext<'a> {
    /// Original text, trimmed
    pub raw: &'a str,
    /// Lowercased text with whitespace collapsed
    pub normalized: String,
    /// Significant keywords of the text
    pub keywords: BTreeSet<String>,
    /// Count of concrete value patterns in the text
    pub pattern_matches: usize,
    history: Vec<HistoryItem>,
}

impl<'a> DetectionContext<'a> {
    fn new<S: AsRef<str>>(raw: &'a str, history: &[S], window: usize) -> Self {
        let normalized = normalize(raw);
        let text_keywords = keywords(&normalized);
        let pattern_matches = VALUE_PATTERNS
            .iter()
            .map(|p| p.find_iter(raw).count())
            .sum();

        let history = history
            .iter()
            .take(window)
            .map(|h| {
                let normalized = normalize(h.as_ref());
                let keywords = keywords(&normalized);
                HistoryItem {
                    normalized,
                    keywords,
                }
            })
            .filter(|h| !h.normalized.is_empty())
            .collect();

        Self {
            raw,
            normalized,
            keywords: text_keywords,
            pattern_matches,
            history,
        }
    }

    /// Whether a pattern matches the normalized text.
    pub fn matches(&self, pattern: &Regex) -> bool {
        pattern.is_match(&self.normalized)
    }

    /// History items sharing at least `min_shared` keywords with the text.
    pub fn overlapping_history(&self, min_shared: usize) -> usize {
        self.history
            .iter()
            .filter(|h| h.keywords.intersection(&self.keywords).count() >= min_shared)
            .count()
    }

    /// Percentage of the text's keywords that appear anywhere in the window.
    pub fn relevance(&self) -> f64 {
        if self.keywords.is_empty() || self.history.is_empty() {
            return 0.0;
        }
        let seen = self
            .keywords
            .iter()
            .filter(|k| self.history.iter().any(|h| h.keywords.contains(*k)))
            .count();
        seen as f64 / self.keywords.len() as f64 * 100.0
    }

    /// Emotional intensity: emotional words, exclamation marks, shouted words.
    pub fn emotional_intensity(&self) -> usize {
        let words = EMOTION_PATTERN.find_iter(&self.normalized).count();
        let exclamations = self.raw.matches('!').count().min(3);
        let shouted = self
            .raw
            .split_whitespace()
            .filter(|w| {
                let letters: Vec<char> = w.chars().filter(|c| c.is_alphabetic()).collect();
                letters.len() >= 3 && letters.iter().all(|c| c.is_uppercase())
            })
            .count();
        words + exclamations + shouted
    }
}

/// How a rule decides whether it fires.
#[derive(Clone)]
pub enum RulePredicate {
    /// Regex over the normalized text
    Pattern(Regex),
    /// Arbitrary deterministic check
    Check(fn(&DetectionContext<'_>) -> bool),
}

impl std::fmt::Debug for RulePredicate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pattern(re) => write!(f, "Pattern({})", re.as_str()),
            Self::Check(_) => write!(f, "Check(..)"),
        }
    }
}

impl RulePredicate {
    fn evaluate(&self, ctx: &DetectionContext<'_>) -> bool {
        match self {
            Self::Pattern(re) => ctx.matches(re),
            Self::Check(check) => check(ctx),
        }
    }
}

/// One (predicate, name) pair in the rule table.
#[derive(Debug, Clone)]
pub struct DetectionRule {
    pub name: String,
    pub predicate: RulePredicate,
}

impl DetectionRule {
    pub fn pattern(name: impl Into<String>, pattern: Regex) -> Self {
        Self {
            name: name.into(),
            predicate: RulePredicate::Pattern(pattern),
        }
    }

    pub fn check(name: impl Into<String>, check: fn(&DetectionContext<'_>) -> bool) -> Self {
        Self {
            name: name.into(),
            predicate: RulePredicate::Check(check),
        }
    }
}

// Lazy-initialized regex patterns
static CORRECTION_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(^no\b|\bnope\b|\bactually\b|that'?s (wrong|not right|incorrect)|\bi meant\b|not what i (asked|meant|wanted)|\bcorrection\b|let me correct|you misunderstood|\bi said\b)")
        .expect("invalid regex")
});

static PREFERENCE_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(i (really |strongly )?(prefer|like|love|hate|dislike|want|need)|always use|never use|my favou?rite|please (always|never)|i'?d rather)\b")
        .expect("invalid regex")
});

static DECISION_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(let'?s go with|we'?ll (use|go with)|i'?ve decided|decided (to|on)|final (answer|decision|choice)|settled on|going with)\b")
        .expect("invalid regex")
});

static PROJECT_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(my (project|company|business|brand|startup|client|site|website|app|store|shop)|our (project|company|brand|team|website|app|product|customers)|we are building|i'?m building|i run)\b")
        .expect("invalid regex")
});

static EMOTION_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(love|hate|amazing|awesome|terrible|awful|excited|frustrat\w*|thrilled|incredible|fantastic|perfect|horrible|wow|beautiful|stunning)\b")
        .expect("invalid regex")
});

static BREAKTHROUGH_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(finally|breakthrough|eureka|nailed it|that'?s it|exactly (it|right|what i)|now i (get|understand|see) it|this is (it|exactly)|game[- ]changer|it clicked)\b")
        .expect("invalid regex")
});

static QUESTION_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(\?|^(what|how|why|when|where|which|who|can|could|should|would|is|are|do|does)\b)")
        .expect("invalid regex")
});

static NEGATION_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(not|don'?t|doesn'?t|never|no longer|instead|changed my mind|rather than|anymore)\b")
        .expect("invalid regex")
});

static STALE_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(used to|no longer|anymore|previously|back then|last year|old version|outdated|deprecated)\b")
        .expect("invalid regex")
});

static SMALL_TALK_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(hi|hello|hey|thanks|thank you|thx|ok|okay|cool|lol|nice|great|bye|good morning|good night|sure|yes|yep|k)[\s!.?]*$")
        .expect("invalid regex")
});

static VALUE_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"#(?:[0-9a-fA-F]{6}|[0-9a-fA-F]{3})\b",
        r"\b\d+(?:\.\d+)?\s?(?:px|rem|em|pt|vh|vw|ms|kb|mb)\b",
        r"\b\d+(?:\.\d+)?%",
        r"https?://\S+",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("invalid regex"))
    .collect()
});

static COLOR_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(\b(colou?rs?|palette|hue|red|blue|green|yellow|orange|purple|pink|black|white|gr[ae]y|teal|navy|pastel|dark mode|light mode)\b|#[0-9a-f]{3,6}\b)")
        .expect("invalid regex")
});

static TYPOGRAPHY_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(fonts?|typeface|typography|serif|sans[- ]serif|monospace|bold|italic|font[- ]size|headings?|inter|roboto|helvetica|georgia|arial)\b")
        .expect("invalid regex")
});

static LAYOUT_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(layout|grid|columns?|sidebar|header|footer|navbar|navigation|spacing|whitespace|padding|margin|hero|cards?|minimal(ist)?|responsive)\b")
        .expect("invalid regex")
});

static INDUSTRY_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(industry|fintech|healthcare|e-?commerce|saas|retail|education|real estate|restaurant|nonprofit|legal|finance|gaming|travel|fashion)\b")
        .expect("invalid regex")
});

static PERFORMANCE_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(fast|speed|performance|load(ing)? time|latency|lightweight|optimi[sz]e|seo|lighthouse|core web vitals|mobile[- ]first)\b")
        .expect("invalid regex")
});

static BRAND_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(brand|logo|tagline|slogan|brand voice|tone of voice|identity|mission)\b")
        .expect("invalid regex")
});

const STOP_WORDS: &[&str] = &[
    "about", "also", "been", "could", "does", "from", "have", "here", "into", "just", "like",
    "make", "more", "only", "please", "really", "should", "some", "than", "that", "their",
    "them", "then", "there", "these", "they", "this", "those", "very", "want", "what", "when",
    "will", "with", "would", "your",
];

/// Lowercase and collapse whitespace.
pub fn normalize(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Significant keywords: alphanumeric tokens of 4+ chars outside the stop list.
pub fn keywords(normalized: &str) -> BTreeSet<String> {
    normalized
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| w.chars().count() >= 4 && !STOP_WORDS.contains(w))
        .map(str::to_string)
        .collect()
}

fn is_breakthrough(ctx: &DetectionContext<'_>) -> bool {
    ctx.matches(&BREAKTHROUGH_PATTERN) && ctx.emotional_intensity() >= HIGH_INTENSITY
}

fn is_emotional(ctx: &DetectionContext<'_>) -> bool {
    ctx.emotional_intensity() >= 1
}

fn is_repeated_reference(ctx: &DetectionContext<'_>) -> bool {
    ctx.overlapping_history(2) >= 2
}

fn is_contradiction(ctx: &DetectionContext<'_>) -> bool {
    ctx.matches(&NEGATION_PATTERN) && ctx.overlapping_history(2) >= 1
}

fn has_specific_detail(ctx: &DetectionContext<'_>) -> bool {
    ctx.pattern_matches > 0
}

/// Emotional intensity at which breakthrough vocabulary counts.
const HIGH_INTENSITY: usize = 2;

/// Default number of history items consulted.
pub const DEFAULT_HISTORY_WINDOW: usize = 8;

/// Stateless classifier from text to signals and categories.
#[derive(Debug, Clone)]
pub struct SignalDetector {
    signal_rules: Vec<DetectionRule>,
    category_rules: Vec<DetectionRule>,
    history_window: usize,
}

impl Default for SignalDetector {
    fn default() -> Self {
        Self::standard()
    }
}

impl SignalDetector {
    /// Detector with the built-in rule tables.
    pub fn standard() -> Self {
        use category_names::*;
        use signal_names::*;

        let signal_rules = vec![
            DetectionRule::pattern(USER_CORRECTION, CORRECTION_PATTERN.clone()),
            DetectionRule::pattern(EXPLICIT_PREFERENCE, PREFERENCE_PATTERN.clone()),
            DetectionRule::pattern(DECISION, DECISION_PATTERN.clone()),
            DetectionRule::pattern(PROJECT_CONTEXT, PROJECT_PATTERN.clone()),
            DetectionRule::check(EMOTIONAL_INTENSITY, is_emotional),
            DetectionRule::check(BREAKTHROUGH, is_breakthrough),
            DetectionRule::check(REPEATED_REFERENCE, is_repeated_reference),
            DetectionRule::check(SPECIFIC_DETAIL, has_specific_detail),
            DetectionRule::pattern(QUESTION, QUESTION_PATTERN.clone()),
            DetectionRule::check(CONTRADICTION, is_contradiction),
            DetectionRule::pattern(STALE_REFERENCE, STALE_PATTERN.clone()),
            DetectionRule::pattern(SMALL_TALK, SMALL_TALK_PATTERN.clone()),
        ];

        let category_rules = vec![
            DetectionRule::pattern(COLOR_PREFERENCE, COLOR_PATTERN.clone()),
            DetectionRule::pattern(TYPOGRAPHY_PREFERENCE, TYPOGRAPHY_PATTERN.clone()),
            DetectionRule::pattern(LAYOUT_PREFERENCE, LAYOUT_PATTERN.clone()),
            DetectionRule::pattern(INDUSTRY_CONTEXT, INDUSTRY_PATTERN.clone()),
            DetectionRule::pattern(PERFORMANCE_REQUIREMENT, PERFORMANCE_PATTERN.clone()),
            DetectionRule::pattern(BRAND_IDENTITY, BRAND_PATTERN.clone()),
        ];

        Self {
            signal_rules,
            category_rules,
            history_window: DEFAULT_HISTORY_WINDOW,
        }
    }

    /// Detector with no rules at all.
    pub fn empty() -> Self {
        Self {
            signal_rules: Vec::new(),
            category_rules: Vec::new(),
            history_window: DEFAULT_HISTORY_WINDOW,
        }
    }

    pub fn with_history_window(mut self, window: usize) -> Self {
        self.history_window = window;
        self
    }

    /// Append a signal rule.
    pub fn with_signal_rule(mut self, rule: DetectionRule) -> Self {
        self.signal_rules.push(rule);
        self
    }

    /// Append a category rule.
    pub fn with_category_rule(mut self, rule: DetectionRule) -> Self {
        self.category_rules.push(rule);
        self
    }

    pub fn history_window(&self) -> usize {
        self.history_window
    }

    /// Detect signals and categories in `text`.
    ///
    /// `history` is the owner's recent interaction text, most recent first;
    /// only the first `history_window` items are consulted. Empty or
    /// whitespace-only text yields an empty detection.
    pub fn detect<S: AsRef<str>>(&self, text: &str, history: &[S]) -> Detection {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return Detection::default();
        }

        let ctx = DetectionContext::new(trimmed, history, self.history_window);

        let signals = self
            .signal_rules
            .iter()
            .filter(|r| r.predicate.evaluate(&ctx))
            .map(|r| r.name.clone())
            .collect();

        let categories = self
            .category_rules
            .iter()
            .filter(|r| r.predicate.evaluate(&ctx))
            .map(|r| r.name.clone())
            .collect();

        Detection {
            signals,
            categories,
            pattern_matches: ctx.pattern_matches,
            context_relevance: ctx.relevance(),
        }
    }
}
