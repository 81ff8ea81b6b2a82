//! crates/baby_english_core/src/domain.rs
//!
//! Defines the pure, core data structures for the application.
//! These structs are independent of any database or serialization format.

use crate::error::CoreError;
use chrono::{DateTime, Utc};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

//=========================================================================================
// Age Levels
//=========================================================================================

/// Linguistic maturity of a learner, from 0 to 18 inclusive.
///
/// This is a proxy for how much vocabulary a learner has, not their literal age.
/// The only way to build one from a raw integer is [`AgeLevel::new`], so every
/// value held by this type is in range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct AgeLevel(u8);

impl AgeLevel {
    pub const MIN: AgeLevel = AgeLevel(0);
    pub const MAX: AgeLevel = AgeLevel(18);

    /// Validates a raw age level.
    pub fn new(value: i32) -> Result<Self, CoreError> {
        if (Self::MIN.0 as i32..=Self::MAX.0 as i32).contains(&value) {
            Ok(Self(value as u8))
        } else {
            Err(CoreError::InvalidAgeLevel(value as i64))
        }
    }

    pub fn value(self) -> u8 {
        self.0
    }

    pub fn category(self) -> AgeCategory {
        match self.0 {
            0..=3 => AgeCategory::Baby,
            4..=6 => AgeCategory::Toddler,
            7..=10 => AgeCategory::Child,
            11..=14 => AgeCategory::Teen,
            _ => AgeCategory::Adult,
        }
    }

    pub fn tier(self) -> VocabularyTier {
        if self.0 <= 3 {
            VocabularyTier::Basic
        } else if self.0 <= 10 {
            VocabularyTier::Intermediate
        } else {
            VocabularyTier::Advanced
        }
    }

    /// The level above this one, or `None` once the learner is at the top.
    pub fn next(self) -> Option<AgeLevel> {
        (!self.is_terminal()).then(|| AgeLevel(self.0 + 1))
    }

    pub fn is_terminal(self) -> bool {
        self == Self::MAX
    }
}

impl Default for AgeLevel {
    fn default() -> Self {
        Self::MIN
    }
}

impl fmt::Display for AgeLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Coarse grouping of age levels used for presentation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgeCategory {
    Baby,
    Toddler,
    Child,
    Teen,
    Adult,
}

impl AgeCategory {
    pub fn as_str(self) -> &'static str {
        match self {
            AgeCategory::Baby => "BABY",
            AgeCategory::Toddler => "TODDLER",
            AgeCategory::Child => "CHILD",
            AgeCategory::Teen => "TEEN",
            AgeCategory::Adult => "ADULT",
        }
    }
}

//=========================================================================================
// Vocabulary Classification
//=========================================================================================

/// Vocabulary band. Bands are cumulative: a higher tier also permits every word
/// of the tiers below it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum VocabularyTier {
    Basic,
    Intermediate,
    Advanced,
}

impl VocabularyTier {
    pub const ALL: [VocabularyTier; 3] = [
        VocabularyTier::Basic,
        VocabularyTier::Intermediate,
        VocabularyTier::Advanced,
    ];

    /// True when a learner at `self` may use the words of `other`.
    pub fn includes(self, other: VocabularyTier) -> bool {
        other <= self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum VocabularyCategory {
    Colors,
    Numbers,
    Greetings,
    Verbs,
    Nouns,
    Adjectives,
}

impl VocabularyCategory {
    pub const ALL: [VocabularyCategory; 6] = [
        VocabularyCategory::Colors,
        VocabularyCategory::Numbers,
        VocabularyCategory::Greetings,
        VocabularyCategory::Verbs,
        VocabularyCategory::Nouns,
        VocabularyCategory::Adjectives,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            VocabularyCategory::Colors => "colors",
            VocabularyCategory::Numbers => "numbers",
            VocabularyCategory::Greetings => "greetings",
            VocabularyCategory::Verbs => "verbs",
            VocabularyCategory::Nouns => "nouns",
            VocabularyCategory::Adjectives => "adjectives",
        }
    }
}

impl fmt::Display for VocabularyCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for VocabularyCategory {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_lowercase();
        Self::ALL
            .into_iter()
            .find(|c| c.as_str() == wanted)
            .ok_or_else(|| CoreError::InvalidInput(format!("unknown vocabulary category '{}'", s)))
    }
}

//=========================================================================================
// Missions
//=========================================================================================

/// A themed learning goal shown to the learner. Missions are static.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mission {
    pub id: &'static str,
    pub name: &'static str,
    pub description: &'static str,
    pub category: VocabularyCategory,
}

const MISSIONS: [Mission; 3] = [
    Mission {
        id: "colors",
        name: "Colors",
        description: "Learn to identify and name different colors in English.",
        category: VocabularyCategory::Colors,
    },
    Mission {
        id: "numbers",
        name: "Numbers",
        description: "Count and recognize numbers from one to ten.",
        category: VocabularyCategory::Numbers,
    },
    Mission {
        id: "greetings",
        name: "Greetings",
        description: "Practice common greetings and polite expressions.",
        category: VocabularyCategory::Greetings,
    },
];

impl Mission {
    pub fn all() -> &'static [Mission] {
        &MISSIONS
    }

    pub fn find(id: &str) -> Option<&'static Mission> {
        let id = id.trim();
        MISSIONS.iter().find(|m| m.id.eq_ignore_ascii_case(id))
    }
}

//=========================================================================================
// Users, Sessions and Transcripts
//=========================================================================================

#[derive(Debug, Clone)]
pub struct User {
    pub id: Uuid,
    pub age_level: AgeLevel,
    pub created_at: DateTime<Utc>,
}

/// A single chat session bound to one mission.
#[derive(Debug, Clone)]
pub struct Session {
    pub id: Uuid,
    pub user_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub mission: VocabularyCategory,
}

impl Session {
    pub fn is_ended(&self) -> bool {
        self.ended_at.is_some()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

impl FromStr for Role {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(Role::User),
            "assistant" => Ok(Role::Assistant),
            other => Err(CoreError::InvalidInput(format!("unknown message role '{}'", other))),
        }
    }
}

/// One chat turn's text. Immutable once created.
#[derive(Debug, Clone)]
pub struct Message {
    pub id: Uuid,
    pub session_id: Uuid,
    pub role: Role,
    pub content: String,
    pub token_count: Option<u32>,
    pub created_at: DateTime<Utc>,
}

impl Message {
    pub fn new(session_id: Uuid, role: Role, content: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            session_id,
            role,
            content: content.into(),
            token_count: None,
            created_at: Utc::now(),
        }
    }

    pub fn with_token_count(mut self, tokens: u32) -> Self {
        self.token_count = Some(tokens);
        self
    }
}

/// Recorded whenever a user message used at least one of the mission's words.
#[derive(Debug, Clone)]
pub struct ScoreEvent {
    pub id: Uuid,
    pub session_id: Uuid,
    pub mission: VocabularyCategory,
    pub matched_words: Vec<String>,
    pub success: bool,
    pub points: u32,
    pub created_at: DateTime<Utc>,
}

/// Everything one chat turn writes. Stored all together or not at all.
#[derive(Debug, Clone)]
pub struct TurnRecord {
    pub user_message: Message,
    pub assistant_message: Message,
    pub score: Option<ScoreEvent>,
}

/// A session row as shown in the history list.
#[derive(Debug, Clone)]
pub struct SessionSummary {
    pub session: Session,
    pub message_count: u32,
    pub total_score: u32,
}

/// A full session transcript.
#[derive(Debug, Clone)]
pub struct SessionExport {
    pub session: Session,
    pub messages: Vec<Message>,
    pub scores: Vec<ScoreEvent>,
    pub exported_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn age_level_rejects_out_of_range_values() {
        assert!(AgeLevel::new(0).is_ok());
        assert!(AgeLevel::new(18).is_ok());
        assert!(matches!(AgeLevel::new(-1), Err(CoreError::InvalidAgeLevel(-1))));
        assert!(matches!(AgeLevel::new(19), Err(CoreError::InvalidAgeLevel(19))));
    }

    #[test]
    fn age_categories_cover_every_level_contiguously() {
        let expected = [
            (0..=3, AgeCategory::Baby),
            (4..=6, AgeCategory::Toddler),
            (7..=10, AgeCategory::Child),
            (11..=14, AgeCategory::Teen),
            (15..=18, AgeCategory::Adult),
        ];
        for (range, category) in expected {
            for level in range {
                assert_eq!(AgeLevel::new(level).unwrap().category(), category);
            }
        }
    }

    #[test]
    fn tiers_follow_level_thresholds() {
        assert_eq!(AgeLevel::new(3).unwrap().tier(), VocabularyTier::Basic);
        assert_eq!(AgeLevel::new(4).unwrap().tier(), VocabularyTier::Intermediate);
        assert_eq!(AgeLevel::new(10).unwrap().tier(), VocabularyTier::Intermediate);
        assert_eq!(AgeLevel::new(11).unwrap().tier(), VocabularyTier::Advanced);
        assert!(VocabularyTier::Advanced.includes(VocabularyTier::Basic));
        assert!(!VocabularyTier::Basic.includes(VocabularyTier::Intermediate));
    }

    #[test]
    fn eighteen_is_terminal() {
        assert_eq!(AgeLevel::MAX.next(), None);
        assert_eq!(AgeLevel::new(17).unwrap().next(), Some(AgeLevel::MAX));
    }

    #[test]
    fn categories_and_missions_parse_from_their_ids() {
        assert_eq!("Colors".parse::<VocabularyCategory>().unwrap(), VocabularyCategory::Colors);
        assert!("shapes".parse::<VocabularyCategory>().is_err());
        assert_eq!(Mission::find("greetings").unwrap().category, VocabularyCategory::Greetings);
        assert!(Mission::find("verbs").is_none());
    }
}
