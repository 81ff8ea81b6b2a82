//! crates/baby_english_core/src/vocabulary.rs
//!
//! Resolves the words a learner is allowed to use.
//!
//! Word lists come from an ordered chain of [`VocabularyStore`] sources. The first
//! source that answers with a non-empty list wins and the answer is memoized in a
//! [`VocabularyCache`]. When every source fails the built-in table is used, so
//! resolution itself never fails.

use crate::domain::{AgeLevel, VocabularyCategory, VocabularyTier};
use crate::ports::{PortError, VocabularyStore};
use dashmap::DashMap;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// A set of permitted, lowercase words.
pub type Vocabulary = BTreeSet<String>;

//=========================================================================================
// Built-in Word Lists
//=========================================================================================

type TierLists = [&'static [&'static str]; 3];

const COLORS: TierLists = [
    &["red", "blue", "green", "yellow", "black", "white", "pink", "purple", "orange", "brown"],
    &[
        "gray",
        "gold",
        "silver",
        "navy",
        "teal",
        "maroon",
        "violet",
        "beige",
        "turquoise",
        "magenta",
    ],
    &[
        "crimson", "azure", "indigo", "lavender", "amber", "emerald", "sapphire", "ivory", "coral",
        "burgundy",
    ],
];

const NUMBERS: TierLists = [
    &["one", "two", "three", "four", "five", "six", "seven", "eight", "nine", "ten"],
    &[
        "eleven",
        "twelve",
        "thirteen",
        "fourteen",
        "fifteen",
        "sixteen",
        "seventeen",
        "eighteen",
        "nineteen",
        "twenty",
    ],
    &[
        "thirty", "forty", "fifty", "sixty", "seventy", "eighty", "ninety", "hundred", "thousand",
        "million",
    ],
];

const GREETINGS: TierLists = [
    &["hi", "hello", "bye", "goodbye", "yes", "no", "please", "thank you", "sorry", "good"],
    &[
        "welcome",
        "morning",
        "afternoon",
        "evening",
        "night",
        "excuse me",
        "pardon",
        "how are you",
        "fine",
        "great",
    ],
    &[
        "pleasure",
        "delighted",
        "wonderful",
        "farewell",
        "appreciate",
        "certainly",
        "absolutely",
        "regards",
        "sincerely",
        "cheers",
    ],
];

const VERBS: TierLists = [
    &["go", "come", "see", "look", "eat", "drink", "sleep", "play", "run", "jump"],
    &["walk", "talk", "read", "write", "listen", "watch", "work", "study", "help", "make"],
    &[
        "create",
        "develop",
        "analyze",
        "consider",
        "explain",
        "describe",
        "discuss",
        "present",
        "achieve",
        "accomplish",
    ],
];

const NOUNS: TierLists = [
    &["dog", "cat", "house", "car", "book", "ball", "toy", "food", "water", "bed"],
    &[
        "school", "teacher", "student", "friend", "family", "parent", "child", "computer", "phone",
        "game",
    ],
    &[
        "education",
        "technology",
        "environment",
        "community",
        "development",
        "relationship",
        "experience",
        "opportunity",
        "responsibility",
        "achievement",
    ],
];

const ADJECTIVES: TierLists = [
    &["big", "small", "hot", "cold", "good", "bad", "happy", "sad", "new", "old"],
    &[
        "beautiful",
        "ugly",
        "interesting",
        "boring",
        "difficult",
        "easy",
        "important",
        "funny",
        "serious",
        "smart",
    ],
    &[
        "extraordinary",
        "magnificent",
        "fascinating",
        "challenging",
        "significant",
        "essential",
        "remarkable",
        "exceptional",
        "innovative",
        "sophisticated",
    ],
];

fn tier_lists(category: VocabularyCategory) -> &'static TierLists {
    match category {
        VocabularyCategory::Colors => &COLORS,
        VocabularyCategory::Numbers => &NUMBERS,
        VocabularyCategory::Greetings => &GREETINGS,
        VocabularyCategory::Verbs => &VERBS,
        VocabularyCategory::Nouns => &NOUNS,
        VocabularyCategory::Adjectives => &ADJECTIVES,
    }
}

/// Words introduced at exactly `tier`, without the tiers below it.
pub fn tier_words(category: VocabularyCategory, tier: VocabularyTier) -> &'static [&'static str] {
    let lists = tier_lists(category);
    match tier {
        VocabularyTier::Basic => lists[0],
        VocabularyTier::Intermediate => lists[1],
        VocabularyTier::Advanced => lists[2],
    }
}

/// The cumulative built-in vocabulary of one category at `age_level`.
pub fn builtin_vocabulary(category: VocabularyCategory, age_level: AgeLevel) -> Vocabulary {
    let learner_tier = age_level.tier();
    VocabularyTier::ALL
        .into_iter()
        .filter(|tier| learner_tier.includes(*tier))
        .flat_map(|tier| tier_words(category, tier).iter().map(|w| w.to_string()))
        .collect()
}

//=========================================================================================
// Cache
//=========================================================================================

/// Memoized store answers keyed by `(category, age level)`.
///
/// Entries are never evicted: a curated list is immutable for a given key, so
/// concurrent inserts of the same key are harmless.
#[derive(Debug, Default)]
pub struct VocabularyCache {
    entries: DashMap<(VocabularyCategory, AgeLevel), Arc<Vocabulary>>,
}

impl VocabularyCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(
        &self,
        category: VocabularyCategory,
        age_level: AgeLevel,
    ) -> Option<Arc<Vocabulary>> {
        self.entries
            .get(&(category, age_level))
            .map(|entry| Arc::clone(entry.value()))
    }

    pub fn insert(
        &self,
        category: VocabularyCategory,
        age_level: AgeLevel,
        words: Vocabulary,
    ) -> Arc<Vocabulary> {
        let words = Arc::new(words);
        self.entries.insert((category, age_level), Arc::clone(&words));
        words
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

//=========================================================================================
// Resolver
//=========================================================================================

/// Why a source in the chain produced no usable list.
#[derive(Debug)]
enum SourceMiss {
    Unavailable(PortError),
    TimedOut,
    Empty,
}

pub struct VocabularyResolver {
    sources: Vec<Arc<dyn VocabularyStore>>,
    cache: Arc<VocabularyCache>,
    lookup_timeout: Duration,
}

impl VocabularyResolver {
    /// Creates a resolver that tries `sources` in order before the built-in table.
    pub fn new(
        sources: Vec<Arc<dyn VocabularyStore>>,
        cache: Arc<VocabularyCache>,
        lookup_timeout: Duration,
    ) -> Self {
        Self {
            sources,
            cache,
            lookup_timeout,
        }
    }

    /// A resolver backed by the built-in table only.
    pub fn builtin() -> Self {
        Self::new(Vec::new(), Arc::new(VocabularyCache::new()), Duration::ZERO)
    }

    /// Returns the permitted words for `age_level`.
    ///
    /// With a category, only that category's cumulative list is returned; without
    /// one, the union of every category.
    pub async fn resolve(
        &self,
        age_level: AgeLevel,
        category: Option<VocabularyCategory>,
    ) -> Vocabulary {
        match category {
            Some(category) => self.resolve_category(category, age_level).await,
            None => {
                let mut words = Vocabulary::new();
                for category in VocabularyCategory::ALL {
                    words.extend(self.resolve_category(category, age_level).await);
                }
                words
            }
        }
    }

    async fn resolve_category(
        &self,
        category: VocabularyCategory,
        age_level: AgeLevel,
    ) -> Vocabulary {
        if let Some(cached) = self.cache.get(category, age_level) {
            return cached.as_ref().clone();
        }

        for (position, source) in self.sources.iter().enumerate() {
            match self.lookup(source.as_ref(), category, age_level).await {
                Ok(words) => {
                    debug!(
                        %category,
                        %age_level,
                        source = position,
                        "Vocabulary resolved from store"
                    );
                    return self.cache.insert(category, age_level, words).as_ref().clone();
                }
                Err(miss) => {
                    warn!(
                        %category,
                        %age_level,
                        source = position,
                        reason = ?miss,
                        "Vocabulary source unavailable, trying next"
                    );
                }
            }
        }

        builtin_vocabulary(category, age_level)
    }

    async fn lookup(
        &self,
        source: &dyn VocabularyStore,
        category: VocabularyCategory,
        age_level: AgeLevel,
    ) -> Result<Vocabulary, SourceMiss> {
        let lookup = source.find_words(category, age_level);
        let words = tokio::time::timeout(self.lookup_timeout, lookup)
            .await
            .map_err(|_| SourceMiss::TimedOut)?
            .map_err(SourceMiss::Unavailable)?;

        let words: Vocabulary = words
            .iter()
            .map(|w| w.trim().to_lowercase())
            .filter(|w| !w.is_empty())
            .collect();

        if words.is_empty() {
            Err(SourceMiss::Empty)
        } else {
            Ok(words)
        }
    }
}
