//! Question Gate
//!
//! Decides whether a chat message is a question about the schedule data.
//! Pure and offline: an ordered list of rules, first match wins, anything
//! unmatched is general chat.

use std::sync::LazyLock;

use regex::Regex;

use super::chat::{ChatMessage, previous_user_message};

const MIN_MESSAGE_CHARS: usize = 3;

const NON_DATA_PHRASES: &[&str] = &[
    "dinner table",
    "table tennis",
    "furniture",
    "restaurant",
    "movie route",
    "bus route map image",
];

const DATA_PHRASES: &[&str] = &[
    "postgres",
    "sql",
    "query",
    "schema",
    "table",
    "column",
    "join",
    "route_id",
    "trip_id",
    "stop_id",
    "gtfs",
    "arrival",
    "departure",
    "stop times",
    "stop_times",
    "busiest stops",
    "busiest routes",
    "accessible stops",
    "accessible trips",
    "wheelchair",
    "nearby stops",
    "route details",
    "stop details",
    "how many people went to",
];

const ENTITY_TOKENS: &[&str] = &[
    "route",
    "routes",
    "stop",
    "stops",
    "trip",
    "trips",
    "arrival",
    "arrivals",
    "departure",
    "departures",
    "schedule",
    "schedules",
    "stop_times",
];

const INTENT_TOKENS: &[&str] = &[
    "show",
    "list",
    "what",
    "which",
    "find",
    "get",
    "top",
    "busiest",
    "nearby",
    "accessible",
    "accessibility",
    "serving",
    "details",
];

const DATA_PATTERNS: &[&str] = &[
    r"\blist\b.*\broutes\b",
    r"\blist\b.*\bstops\b",
    r"\bshow\b.*\broutes\b",
    r"\bshow\b.*\btrips\b",
    r"\bwhat\b.*\broutes\b",
    r"\bwhat\b.*\btrips\b",
    r"\bwhat\b.*\bstops\b",
    r"\bwhich\b.*\broutes\b.*\bstop\b",
    r"\bstops\b.*\bon\b.*\broute\b",
    r"\broutes\b.*\bthere\b.*\bare\b",
    r"\btrips\b.*\boccur\b",
    r"\barrivals?\b.*\bstop\b",
    r"\bdepartures?\b.*\bstop\b",
    r"\bhow many\b.*\bpeople\b.*\bwent to\b",
    r"\bhow many\b.*\b(stops|routes|trips|arrivals|departures)\b",
];

const FOLLOW_UP_PREFIXES: &[&str] = &[
    "what about",
    "how about",
    "and for",
    "and what about",
    "same for",
    "now for",
    "also",
];

const FOLLOW_UP_PHRASES: &[&str] = &[
    "show me more",
    "more results",
    "more rows",
    "next page",
    "the rest",
    "those",
    "that one",
];

static TOKEN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[a-z0-9_]+").expect("valid regex"));

// =============================================================================
// Rules
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Database,
    Chat,
}

#[derive(Debug, Clone)]
pub enum Matcher {
    /// Any phrase appears as a contiguous token run
    Phrases(Vec<String>),
    /// Any regex matches the lowercased message
    Patterns(Vec<Regex>),
    /// One entity token and one intent token both present
    TokenPair {
        entities: Vec<String>,
        intents: Vec<String>,
    },
    /// Elliptical continuation of a database question
    FollowUp,
}

#[derive(Debug, Clone)]
pub struct GateRule {
    pub name: &'static str,
    pub matcher: Matcher,
    pub verdict: Verdict,
}

impl GateRule {
    pub fn new(name: &'static str, matcher: Matcher, verdict: Verdict) -> Self {
        Self {
            name,
            matcher,
            verdict,
        }
    }
}

/// Outcome with the deciding rule, for logging
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GateDecision {
    pub is_database: bool,
    pub rule: Option<&'static str>,
}

struct Input {
    lower: String,
    tokens: Vec<String>,
}

impl Input {
    fn new(text: &str) -> Self {
        let lower = text.to_lowercase();
        let tokens = tokenize(&lower);
        Self { lower, tokens }
    }
}

pub(crate) fn tokenize(lower: &str) -> Vec<String> {
    TOKEN
        .find_iter(lower)
        .map(|m| m.as_str().to_string())
        .collect()
}

pub(crate) fn contains_phrase(tokens: &[String], phrase: &str) -> bool {
    let needle = tokenize(&phrase.to_lowercase());
    if needle.is_empty() || needle.len() > tokens.len() {
        return false;
    }
    tokens.windows(needle.len()).any(|window| window == needle.as_slice())
}

fn owned(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

fn compile(patterns: &[&str]) -> Vec<Regex> {
    patterns
        .iter()
        .map(|p| Regex::new(p).expect("valid gate pattern"))
        .collect()
}

// =============================================================================
// Gate
// =============================================================================

#[derive(Debug, Clone)]
pub struct QuestionGate {
    rules: Vec<GateRule>,
}

impl Default for QuestionGate {
    fn default() -> Self {
        Self::new()
    }
}

impl QuestionGate {
    /// Gate with the standard transit ruleset
    pub fn new() -> Self {
        Self::with_rules(vec![
            GateRule::new(
                "non_data_phrase",
                Matcher::Phrases(owned(NON_DATA_PHRASES)),
                Verdict::Chat,
            ),
            GateRule::new(
                "data_phrase",
                Matcher::Phrases(owned(DATA_PHRASES)),
                Verdict::Database,
            ),
            GateRule::new(
                "entity_and_intent",
                Matcher::TokenPair {
                    entities: owned(ENTITY_TOKENS),
                    intents: owned(INTENT_TOKENS),
                },
                Verdict::Database,
            ),
            GateRule::new(
                "data_pattern",
                Matcher::Patterns(compile(DATA_PATTERNS)),
                Verdict::Database,
            ),
            GateRule::new("follow_up", Matcher::FollowUp, Verdict::Database),
        ])
    }

    pub fn with_rules(rules: Vec<GateRule>) -> Self {
        Self { rules }
    }

    pub fn is_database_question(&self, message: &str, history: &[ChatMessage]) -> bool {
        self.classify(message, history).is_database
    }

    pub fn classify(&self, message: &str, history: &[ChatMessage]) -> GateDecision {
        self.evaluate(message, previous_user_message(history))
    }

    fn evaluate(&self, message: &str, previous: Option<&str>) -> GateDecision {
        let unmatched = GateDecision {
            is_database: false,
            rule: None,
        };
        if message.trim().chars().count() < MIN_MESSAGE_CHARS {
            return unmatched;
        }

        let input = Input::new(message);
        for rule in &self.rules {
            let matched = match &rule.matcher {
                Matcher::Phrases(phrases) => {
                    phrases.iter().any(|p| contains_phrase(&input.tokens, p))
                }
                Matcher::Patterns(patterns) => patterns.iter().any(|p| p.is_match(&input.lower)),
                Matcher::TokenPair { entities, intents } => {
                    input.tokens.iter().any(|t| entities.contains(t))
                        && input.tokens.iter().any(|t| intents.contains(t))
                }
                // Previous turn is judged on its own, without further history
                Matcher::FollowUp => {
                    is_follow_up(message)
                        && previous.is_some_and(|p| self.evaluate(p, None).is_database)
                }
            };
            if matched {
                return GateDecision {
                    is_database: rule.verdict == Verdict::Database,
                    rule: Some(rule.name),
                };
            }
        }
        unmatched
    }
}

/// Whether a message reads as a continuation of the previous question
pub fn is_follow_up(message: &str) -> bool {
    let lower = message.trim().to_lowercase();
    let tokens = tokenize(&lower);
    if tokens.is_empty() {
        return false;
    }
    if tokens.len() == 1 && matches!(tokens[0].as_str(), "more" | "next" | "again") {
        return true;
    }
    FOLLOW_UP_PREFIXES.iter().any(|prefix| {
        let prefix_tokens = tokenize(prefix);
        tokens.starts_with(&prefix_tokens)
    }) || FOLLOW_UP_PHRASES
        .iter()
        .any(|phrase| contains_phrase(&tokens, phrase))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gate() -> QuestionGate {
        QuestionGate::new()
    }

    #[test]
    fn test_general_chat_is_not_database() {
        assert!(!gate().is_database_question("What's the weather today?", &[]));
        assert!(!gate().is_database_question("Tell me a joke", &[]));
        assert!(!gate().is_database_question("hi", &[]));
    }

    #[test]
    fn test_domain_questions() {
        let gate = gate();
        assert!(gate.is_database_question("How many stops does route 10 have?", &[]));
        assert!(gate.is_database_question("Show me the busiest stops", &[]));
        assert!(gate.is_database_question("Next arrivals for stop S2", &[]));
        assert!(gate.is_database_question("which routes stop at Central Station", &[]));
        assert!(gate.is_database_question("how many people went to Central Station", &[]));
    }

    #[test]
    fn test_rejections_win_over_signals() {
        let decision = gate().classify("Find a restaurant near the stop", &[]);
        assert!(!decision.is_database);
        assert_eq!(decision.rule, Some("non_data_phrase"));

        assert!(!gate().is_database_question("I need a new dinner table", &[]));
    }

    #[test]
    fn test_table_is_whole_word() {
        assert!(!gate().is_database_question("Is this vegetable stable?", &[]));
    }

    #[test]
    fn test_follow_up_needs_database_context() {
        let gate = gate();
        let db_history = vec![
            ChatMessage::user("list routes"),
            ChatMessage::assistant("Found 2 routes."),
        ];
        let chat_history = vec![
            ChatMessage::user("tell me a story"),
            ChatMessage::assistant("Once upon a time"),
        ];

        assert!(gate.is_database_question("show me more", &db_history));
        assert!(gate.is_database_question("what about route 22", &db_history));
        assert!(!gate.is_database_question("show me more", &chat_history));
        assert!(!gate.is_database_question("show me more", &[]));
    }

    #[test]
    fn test_custom_rules() {
        let gate = QuestionGate::with_rules(vec![GateRule::new(
            "ferry",
            Matcher::Phrases(vec!["ferry".to_string()]),
            Verdict::Database,
        )]);
        assert!(gate.is_database_question("ferry times please", &[]));
        assert!(!gate.is_database_question("list routes", &[]));
    }

    #[test]
    fn test_is_follow_up() {
        assert!(is_follow_up("more"));
        assert!(is_follow_up("How about stop S2?"));
        assert!(!is_follow_up("list all routes"));
    }
}
