use serde::Serialize;

/// Number of Kellgren-Lawrence grades the classifier distinguishes.
pub const NUM_GRADES: usize = 5;

/// Description returned for an index outside the known grade range.
pub const UNKNOWN_GRADE: &str = "Unknown Grade";

/// Kellgren-Lawrence severity grades for knee osteoarthritis.
///
/// The discriminant of each variant is the class index produced by the model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum KlGrade {
    Normal = 0,
    Doubtful = 1,
    Minimal = 2,
    Moderate = 3,
    Severe = 4,
}

impl KlGrade {
    /// All grades in class-index order
    pub const ALL: [KlGrade; NUM_GRADES] = [
        KlGrade::Normal,
        KlGrade::Doubtful,
        KlGrade::Minimal,
        KlGrade::Moderate,
        KlGrade::Severe,
    ];

    /// Maps a model class index to its grade
    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    pub fn index(self) -> usize {
        self as usize
    }

    /// Human-readable description shown to the caller
    pub fn description(self) -> &'static str {
        match self {
            Self::Normal => "Grade 0: Normal (No Osteoarthritis)",
            Self::Doubtful => "Grade 1: Doubtful (Possible Osteophyte Lip)",
            Self::Minimal => {
                "Grade 2: Minimal (Definite Osteophytes, Possible Joint Space Narrowing)"
            }
            Self::Moderate => {
                "Grade 3: Moderate (Moderate Osteophytes, Definite Joint Space Narrowing)"
            }
            Self::Severe => {
                "Grade 4: Severe (Large Osteophytes, Severe Joint Space Narrowing, Sclerosis)"
            }
        }
    }
}

/// Looks up the description for a raw class index, falling back to
/// [`UNKNOWN_GRADE`] for indices the model should never produce.
pub fn describe(index: usize) -> &'static str {
    KlGrade::from_index(index)
        .map(KlGrade::description)
        .unwrap_or(UNKNOWN_GRADE)
}
