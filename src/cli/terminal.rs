//! Coloured status output.
//!
//! Colour is only used when stdout is a terminal that supports it; otherwise
//! text is passed through untouched.

use std::{fmt::Display, sync::LazyLock};

use owo_colors::{OwoColorize, Style};

static COLOR: LazyLock<bool> =
    LazyLock::new(|| supports_color::on(supports_color::Stream::Stdout).is_some());

/// What a piece of output means to the author reading it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tone {
    /// The matrix, or one of its checks, is fine.
    Good,
    /// Something needs fixing.
    Bad,
    /// Supporting detail under a headline.
    Quiet,
}

impl Tone {
    fn style(self) -> Style {
        match self {
            Self::Good => Style::new().green(),
            Self::Bad => Style::new().yellow().bold(),
            Self::Quiet => Style::new().dimmed(),
        }
    }
}

/// Renders `text` in the style of `tone`.
pub fn paint(text: impl Display, tone: Tone) -> String {
    if *COLOR {
        text.style(tone.style()).to_string()
    } else {
        text.to_string()
    }
}

/// The mark opening a check line in the validation table.
pub fn mark(passed: bool) -> String {
    if passed {
        paint("✓", Tone::Good)
    } else {
        paint("✗", Tone::Bad)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn painted_text_keeps_its_content() {
        for tone in [Tone::Good, Tone::Bad, Tone::Quiet] {
            assert!(paint("3 violations", tone).contains("3 violations"));
        }
        assert!(mark(true).contains('✓'));
        assert!(mark(false).contains('✗'));
    }
}
