//! Local prompt heuristics
//!
//! A cheap keyword pass over the prompt that runs before the model call:
//! well-known club names pin the club (and usually the league), and league
//! aliases from the catalog pin the league. Explicit caller hints always win
//! over anything detected here.

use statviz_catalog::SchemaCatalog;

/// Entity hints handed to the interpreter alongside the prompt.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PromptHints {
    pub league: Option<String>,
    pub club: Option<String>,
}

impl PromptHints {
    /// Merge explicit caller hints over detected ones.
    pub fn merged(self, league: Option<String>, club: Option<String>) -> Self {
        Self {
            league: league.or(self.league),
            club: club.or(self.club),
        }
    }
}

/// Club spellings and nicknames mapped to (official club filter, league).
const CLUB_KEYWORDS: &[(&str, &str, &str)] = &[
    // football
    ("barcelone", "FC Barcelona", "LaLiga"),
    ("barcelona", "FC Barcelona", "LaLiga"),
    ("barca", "FC Barcelona", "LaLiga"),
    ("real madrid", "Real Madrid", "LaLiga"),
    ("psg", "Paris Saint-Germain", "Ligue 1 McDonald's"),
    ("paris", "Paris Saint-Germain", "Ligue 1 McDonald's"),
    ("om", "Olympique de Marseille", "Ligue 1 McDonald's"),
    ("marseille", "Olympique de Marseille", "Ligue 1 McDonald's"),
    ("bayern", "Bayern", "Bundesliga"),
    ("dortmund", "Borussia Dortmund", "Bundesliga"),
    ("juventus", "Juventus", "Serie A"),
    ("juve", "Juventus", "Serie A"),
    ("liverpool", "Liverpool", "Premier League"),
    ("manchester city", "Manchester City", "Premier League"),
    ("man city", "Manchester City", "Premier League"),
    ("manchester united", "Manchester United", "Premier League"),
    ("chelsea", "Chelsea", "Premier League"),
    ("arsenal", "Arsenal", "Premier League"),
    // nba
    ("lakers", "Lakers", "NBA"),
    ("celtics", "Celtics", "NBA"),
    ("knicks", "Knicks", "NBA"),
    ("bulls", "Bulls", "NBA"),
    ("warriors", "Warriors", "NBA"),
];

/// Detect league and club mentions in a prompt.
pub fn analyze(prompt: &str, catalog: &SchemaCatalog) -> PromptHints {
    let lowered = prompt.to_lowercase();

    let mut hints = PromptHints::default();

    for (keyword, club, league) in CLUB_KEYWORDS {
        if contains_word(&lowered, keyword) {
            hints.club = Some((*club).to_string());
            hints.league = Some((*league).to_string());
            break;
        }
    }

    // A league named in the prompt beats the one implied by the club
    for league in &catalog.leagues {
        let mut spellings = vec![league.name.to_lowercase()];
        spellings.extend(league.aliases.iter().cloned());
        if spellings.iter().any(|s| contains_word(&lowered, s)) {
            hints.league = Some(league.name.clone());
            break;
        }
    }

    hints
}

/// Substring match on word boundaries, so "om" does not fire inside
/// "domicile" and "pl" does not fire inside "player".
fn contains_word(haystack: &str, needle: &str) -> bool {
    let mut start = 0;
    while let Some(pos) = haystack[start..].find(needle) {
        let begin = start + pos;
        let end = begin + needle.len();
        let boundary_before = begin == 0
            || !haystack[..begin]
                .chars()
                .next_back()
                .is_some_and(|c| c.is_alphanumeric());
        let boundary_after = end == haystack.len()
            || !haystack[end..].chars().next().is_some_and(|c| c.is_alphanumeric());
        if boundary_before && boundary_after {
            return true;
        }
        start = end;
    }
    false
}
