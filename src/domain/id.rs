use std::{fmt, sync::LazyLock};

use regex::Regex;

/// The namespace prefix shared by every identifier, including the trailing
/// dot.
///
/// Matches `AML.`, `AML123.` and `AML.ABC123.`.
const PREFIX: &str = r"[A-Za-z0-9]+(?:\.[A-Za-z0-9]+)?\.";

fn exact(body: &str) -> Regex {
    Regex::new(&format!("^{PREFIX}{body}$")).expect("identifier patterns are valid regexes")
}

static TACTIC: LazyLock<Regex> = LazyLock::new(|| exact(r"TA\d{4}"));
static TECHNIQUE: LazyLock<Regex> = LazyLock::new(|| exact(r"T\d{4}"));
static SUBTECHNIQUE: LazyLock<Regex> = LazyLock::new(|| exact(r"T\d{4}\.\d{3}"));
static CASE_STUDY: LazyLock<Regex> = LazyLock::new(|| exact(r"CS\d{4}"));
static MITIGATION: LazyLock<Regex> = LazyLock::new(|| exact(r"M\d{4}"));

/// The shape an identifier must have for a given kind of object.
///
/// | Pattern        | Example          |
/// |----------------|------------------|
/// | `Tactic`       | `AML.TA0000`     |
/// | `Technique`    | `AML.T0000`      |
/// | `Subtechnique` | `AML.T0000.000`  |
/// | `CaseStudy`    | `AML.CS0000`     |
/// | `Mitigation`   | `AML.M0000`      |
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum IdPattern {
    /// A tactic identifier.
    Tactic,
    /// A top-level technique identifier.
    Technique,
    /// A sub-technique identifier (technique ID plus a three digit suffix).
    Subtechnique,
    /// A case study identifier.
    CaseStudy,
    /// A mitigation identifier.
    Mitigation,
}

impl IdPattern {
    /// Every pattern, in a fixed order.
    pub const ALL: [Self; 5] = [
        Self::Tactic,
        Self::Technique,
        Self::Subtechnique,
        Self::CaseStudy,
        Self::Mitigation,
    ];

    /// Whether `id` matches this pattern exactly.
    ///
    /// ```
    /// use atlas::IdPattern;
    ///
    /// assert!(IdPattern::Tactic.matches("AML.TA0002"));
    /// assert!(!IdPattern::Tactic.matches("AML.T0002"));
    /// assert!(IdPattern::Subtechnique.matches("AML.T0002.001"));
    /// ```
    #[must_use]
    pub fn matches(self, id: &str) -> bool {
        self.regex().is_match(id)
    }

    /// Returns the pattern an identifier conforms to, if any.
    #[must_use]
    pub fn classify(id: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|pattern| pattern.matches(id))
    }

    /// A short example of a conforming identifier.
    #[must_use]
    pub const fn example(self) -> &'static str {
        match self {
            Self::Tactic => "AML.TA0000",
            Self::Technique => "AML.T0000",
            Self::Subtechnique => "AML.T0000.000",
            Self::CaseStudy => "AML.CS0000",
            Self::Mitigation => "AML.M0000",
        }
    }

    fn regex(self) -> &'static Regex {
        match self {
            Self::Tactic => &TACTIC,
            Self::Technique => &TECHNIQUE,
            Self::Subtechnique => &SUBTECHNIQUE,
            Self::CaseStudy => &CASE_STUDY,
            Self::Mitigation => &MITIGATION,
        }
    }
}

impl fmt::Display for IdPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Tactic => "tactic",
            Self::Technique => "technique",
            Self::Subtechnique => "sub-technique",
            Self::CaseStudy => "case study",
            Self::Mitigation => "mitigation",
        };
        write!(f, "{name} ID (e.g. {})", self.example())
    }
}
