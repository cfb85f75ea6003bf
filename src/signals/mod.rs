//! Signal catalogs and text-to-signal detection.
//!
//! A *signal* is a named, weighted piece of evidence that an interaction
//! matters (or doesn't). A *category* is a topical bucket carrying a score
//! bonus and a routing hint for preference learning.
//!
//! ## Example
//!
//! ```rust,ignore
//! use memtier_core::signals::{SignalDetector, signal_names};
//!
//! let detector = SignalDetector::standard();
//! let detection = detector.detect("No, I meant the blue header", &["make the header red"]);
//! assert!(detection.has_signal(signal_names::USER_CORRECTION));
//! ```

mod detector;
mod registry;

pub use detector::{
    keywords, normalize, Detection, DetectionContext, DetectionRule, RulePredicate,
    SignalDetector, DEFAULT_HISTORY_WINDOW,
};
pub use registry::{
    category_names, signal_names, CategoryDefinition, CategoryRegistry, SignalCategory,
    SignalDefinition, SignalPriority, SignalRegistry,
};
