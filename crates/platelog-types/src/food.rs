use std::{fmt, str::FromStr};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{vision::EncodedImage, PlatelogError, Result, ValidationError};

pub const MAX_RATING: u8 = 5;

/// Single-letter nutrition grade, A best through E worst.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum NutriGrade {
    A,
    B,
    C,
    D,
    E,
}

impl NutriGrade {
    pub const ALL: [NutriGrade; 5] = [
        NutriGrade::A,
        NutriGrade::B,
        NutriGrade::C,
        NutriGrade::D,
        NutriGrade::E,
    ];

    pub fn letter(self) -> char {
        match self {
            NutriGrade::A => 'A',
            NutriGrade::B => 'B',
            NutriGrade::C => 'C',
            NutriGrade::D => 'D',
            NutriGrade::E => 'E',
        }
    }
}

impl fmt::Display for NutriGrade {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.letter())
    }
}

impl FromStr for NutriGrade {
    type Err = PlatelogError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "A" => Ok(NutriGrade::A),
            "B" => Ok(NutriGrade::B),
            "C" => Ok(NutriGrade::C),
            "D" => Ok(NutriGrade::D),
            "E" => Ok(NutriGrade::E),
            other => Err(PlatelogError::InvalidInput(format!(
                "unknown nutrition grade '{other}', expected one of A-E"
            ))),
        }
    }
}

/// Like/dislike view over ratings. Unrated items are neither.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Preference {
    #[default]
    All,
    /// Rated 4 or 5.
    Liked,
    /// Rated 1 or 2.
    Disliked,
}

impl Preference {
    pub fn admits(self, rating: u8) -> bool {
        match self {
            Preference::All => true,
            Preference::Liked => rating >= 4,
            Preference::Disliked => (1..=2).contains(&rating),
        }
    }
}

impl FromStr for Preference {
    type Err = PlatelogError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "all" => Ok(Preference::All),
            "liked" => Ok(Preference::Liked),
            "disliked" => Ok(Preference::Disliked),
            other => Err(PlatelogError::InvalidInput(format!(
                "unknown preference '{other}', expected all, liked or disliked"
            ))),
        }
    }
}

/// Persisted food entry. Never edited in place: replace by delete + add.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FoodItem {
    pub id: Uuid,
    pub name: String,
    /// 0 means unrated.
    pub rating: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nutri_score: Option<NutriGrade>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<EncodedImage>,
    #[serde(default)]
    pub tags: Vec<String>,
    pub created_at: DateTime<Utc>,
}

impl FoodItem {
    /// Validate a draft and mint a new item with a fresh identifier.
    pub fn from_draft(draft: FoodDraft) -> Result<Self> {
        draft.validate()?;
        let notes = draft
            .notes
            .map(|n| n.trim().to_string())
            .filter(|n| !n.is_empty());
        Ok(Self {
            id: Uuid::new_v4(),
            name: draft.name.trim().to_string(),
            rating: draft.rating,
            notes,
            nutri_score: draft.nutri_score,
            image: draft.image,
            tags: draft.tags,
            created_at: Utc::now(),
        })
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t.eq_ignore_ascii_case(tag))
    }
}

/// Form state for an item that has not been submitted yet.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FoodDraft {
    pub name: String,
    pub rating: u8,
    pub notes: Option<String>,
    pub nutri_score: Option<NutriGrade>,
    pub image: Option<EncodedImage>,
    pub tags: Vec<String>,
}

impl FoodDraft {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.name.trim().is_empty() {
            return Err(ValidationError::EmptyName);
        }
        if self.rating > MAX_RATING {
            return Err(ValidationError::RatingOutOfRange(self.rating));
        }
        if self.rating == 0 {
            return Err(ValidationError::Unrated);
        }
        Ok(())
    }
}

/// Split a comma separated tag field into trimmed, non-empty labels.
pub fn parse_tags(input: &str) -> Vec<String> {
    input
        .split(',')
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn draft(name: &str, rating: u8) -> FoodDraft {
        FoodDraft {
            name: name.into(),
            rating,
            ..Default::default()
        }
    }

    #[test]
    fn preference_buckets_ratings() {
        let liked: Vec<u8> = (0..=5).filter(|r| Preference::Liked.admits(*r)).collect();
        let disliked: Vec<u8> = (0..=5).filter(|r| Preference::Disliked.admits(*r)).collect();
        assert_eq!(liked, vec![4, 5]);
        assert_eq!(disliked, vec![1, 2]);
        assert!(Preference::All.admits(0));
        assert_eq!("Liked".parse::<Preference>().unwrap(), Preference::Liked);
        assert!("meh".parse::<Preference>().is_err());
    }

    #[test]
    fn grade_parses_case_insensitively() {
        assert_eq!("c".parse::<NutriGrade>().unwrap(), NutriGrade::C);
        assert_eq!(" E ".parse::<NutriGrade>().unwrap(), NutriGrade::E);
        assert!("F".parse::<NutriGrade>().is_err());
        assert!("AB".parse::<NutriGrade>().is_err());
        assert!(matches!(
            "F".parse::<NutriGrade>(),
            Err(PlatelogError::InvalidInput(_))
        ));
    }

    #[test]
    fn validation_blocks_empty_name_and_zero_rating() {
        assert_eq!(draft("  ", 3).validate(), Err(ValidationError::EmptyName));
        assert_eq!(draft("Kimchi", 0).validate(), Err(ValidationError::Unrated));
        assert_eq!(
            draft("Kimchi", 6).validate(),
            Err(ValidationError::RatingOutOfRange(6))
        );
        assert!(draft("Kimchi", 5).validate().is_ok());
    }

    #[test]
    fn from_draft_trims_and_assigns_unique_ids() {
        let mut d = draft("  Dark chocolate ", 4);
        d.notes = Some("   ".into());
        d.tags = vec!["sweet".into(), "sweet".into()];
        let a = FoodItem::from_draft(d.clone()).expect("valid draft");
        let b = FoodItem::from_draft(d).expect("valid draft");
        assert_eq!(a.name, "Dark chocolate");
        assert_eq!(a.notes, None);
        assert_eq!(a.tags, vec!["sweet".to_string(), "sweet".to_string()]);
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn from_draft_rejects_invalid_drafts() {
        let err = FoodItem::from_draft(draft("", 2)).unwrap_err();
        assert!(matches!(
            err,
            PlatelogError::Validation(ValidationError::EmptyName)
        ));
    }

    #[test]
    fn tag_field_parsing() {
        assert_eq!(
            parse_tags("snack, spicy ,, snack"),
            vec!["snack", "spicy", "snack"]
        );
        assert!(parse_tags(" , ").is_empty());
    }
}
