//! Statement Safety Policy
//!
//! Lexical checks applied to every SQL skeleton, once when a generated
//! schema is validated and again right before execution. Scanning happens
//! on a scrubbed copy where comments are blanked and literal contents are
//! masked, so keywords hidden in strings neither trigger nor evade a check.

use std::collections::HashMap;
use std::sync::LazyLock;

use regex::Regex;

/// Mutation and DDL keywords rejected as whole tokens
pub const DENYLIST: &[&str] = &[
    "INSERT", "UPDATE", "DELETE", "DROP", "ALTER", "TRUNCATE", "GRANT", "CREATE", "MERGE", "CALL",
    "ATTACH", "DETACH", "PRAGMA", "VACUUM", "REINDEX", "REVOKE",
];

static WORD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[A-Za-z_][A-Za-z0-9_]*").expect("valid regex"));

static PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:^|[^:A-Za-z0-9_]):([A-Za-z_][A-Za-z0-9_]*)").expect("valid regex")
});

static TOKEN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[a-z_][a-z0-9_]*|\S").expect("valid regex"));

static COLUMN_REF: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b([a-z_][a-z0-9_]*)\.([a-z_][a-z0-9_]*)\b").expect("valid regex")
});

static CTE_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:\bwith|,)\s+(?:recursive\s+)?([a-z_][a-z0-9_]*)(?:\s*\([^)]*\))?\s+as\s*\(")
        .expect("valid regex")
});

static LIMIT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\blimit\s+(?::([a-z_][a-z0-9_]*)|(\d+))\b").expect("valid regex")
});

static LIMIT_KEYWORD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\blimit\b").expect("valid regex"));

static LITERAL_LIMIT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\blimit\s+(\d+)\b").expect("valid regex"));

static SELECT_STAR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\bselect\s+(?:distinct\s+)?\*|,\s*\*\s*(?:,|\bfrom\b)").expect("valid regex")
});

/// Keywords that can follow a table name and are never its alias
const ALIAS_STOPWORDS: &[&str] = &[
    "on", "using", "where", "group", "order", "having", "window", "limit", "offset", "join",
    "inner", "left", "right", "full", "outer", "cross", "natural", "union", "except",
    "intersect", "indexed", "not", "select", "from", "as",
];

/// Why a statement failed the read-only policy
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnsafeReason {
    Empty,
    NotReadOnly,
    ForbiddenKeyword(String),
    MultipleStatements,
    UnterminatedLiteral,
}

impl std::fmt::Display for UnsafeReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Empty => write!(f, "empty statement"),
            Self::NotReadOnly => write!(f, "statement must start with SELECT or WITH"),
            Self::ForbiddenKeyword(word) => write!(f, "forbidden keyword {}", word),
            Self::MultipleStatements => write!(f, "multiple statements"),
            Self::UnterminatedLiteral => write!(f, "unterminated literal"),
        }
    }
}

/// Row limit found in a statement
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LimitClause {
    Param(String),
    Literal(u64),
}

#[derive(Clone, Copy)]
enum ScanState {
    Code,
    Quoted(char),
    LineComment,
    BlockComment,
}

/// Blank comments and mask literal contents, preserving byte offsets of
/// ASCII code. Quote characters themselves are kept.
pub fn scrub(sql: &str) -> Result<String, UnsafeReason> {
    let mut out = String::with_capacity(sql.len());
    let mut state = ScanState::Code;
    let mut chars = sql.chars().peekable();

    while let Some(ch) = chars.next() {
        match state {
            ScanState::Code => match ch {
                '\'' | '"' => {
                    state = ScanState::Quoted(ch);
                    out.push(ch);
                }
                '-' if chars.peek() == Some(&'-') => {
                    chars.next();
                    state = ScanState::LineComment;
                    out.push(' ');
                }
                '/' if chars.peek() == Some(&'*') => {
                    chars.next();
                    state = ScanState::BlockComment;
                    out.push(' ');
                }
                _ => out.push(ch),
            },
            ScanState::Quoted(quote) => {
                if ch == quote {
                    if chars.peek() == Some(&quote) {
                        // Doubled quote is an escape
                        chars.next();
                        out.push_str("  ");
                    } else {
                        state = ScanState::Code;
                        out.push(ch);
                    }
                } else {
                    out.push(' ');
                }
            }
            ScanState::LineComment => {
                if ch == '\n' {
                    state = ScanState::Code;
                    out.push('\n');
                }
            }
            ScanState::BlockComment => {
                if ch == '*' && chars.peek() == Some(&'/') {
                    chars.next();
                    state = ScanState::Code;
                }
            }
        }
    }

    match state {
        ScanState::Quoted(_) => Err(UnsafeReason::UnterminatedLiteral),
        _ => Ok(out),
    }
}

/// Apply the read-only statement policy
pub fn check_statement(sql: &str) -> Result<(), UnsafeReason> {
    let scrubbed = scrub(sql)?;
    let trimmed = scrubbed.trim();
    if trimmed.is_empty() {
        return Err(UnsafeReason::Empty);
    }

    // A single trailing terminator is tolerated
    let body = trimmed.strip_suffix(';').unwrap_or(trimmed);
    if body.contains(';') {
        return Err(UnsafeReason::MultipleStatements);
    }

    let first = WORD
        .find(body)
        .filter(|m| m.start() == 0)
        .map(|m| m.as_str().to_ascii_uppercase());
    if !matches!(first.as_deref(), Some("SELECT") | Some("WITH")) {
        return Err(UnsafeReason::NotReadOnly);
    }

    for word in WORD.find_iter(body) {
        let upper = word.as_str().to_ascii_uppercase();
        if DENYLIST.contains(&upper.as_str()) {
            return Err(UnsafeReason::ForbiddenKeyword(upper));
        }
    }

    Ok(())
}

fn scanned_lower(sql: &str) -> String {
    scrub(sql).unwrap_or_else(|_| sql.to_string()).to_lowercase()
}

/// Named `:placeholders` in first-seen order, without duplicates
pub fn placeholders(sql: &str) -> Vec<String> {
    let scrubbed = scrub(sql).unwrap_or_else(|_| sql.to_string());
    let mut names: Vec<String> = Vec::new();
    for caps in PLACEHOLDER.captures_iter(&scrubbed) {
        let name = caps[1].to_string();
        if !names.contains(&name) {
            names.push(name);
        }
    }
    names
}

/// One table named after FROM, JOIN or a comma in a FROM list
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableRef {
    pub table: String,
    pub alias: Option<String>,
}

fn is_identifier(token: &str) -> bool {
    token
        .chars()
        .next()
        .is_some_and(|c| c.is_ascii_lowercase() || c == '_')
}

/// Walk FROM/JOIN clauses token by token. Anything other than a plain
/// identifier or a subquery in table position (a quoted or qualified
/// name) is reported verbatim so the allowlist rejects it.
pub fn table_refs(sql: &str) -> Vec<TableRef> {
    let lower = scanned_lower(sql);
    let tokens: Vec<&str> = TOKEN.find_iter(&lower).map(|m| m.as_str()).collect();
    let mut refs = Vec::new();

    let mut i = 0;
    while i < tokens.len() {
        if !matches!(tokens[i], "from" | "join") {
            i += 1;
            continue;
        }
        i += 1;
        while let Some(&token) = tokens.get(i) {
            if token == "(" {
                break;
            }
            if !is_identifier(token) {
                refs.push(TableRef {
                    table: token.to_string(),
                    alias: None,
                });
                break;
            }
            let table = match tokens.get(i + 1) {
                Some(&".") => {
                    // schema-qualified name, e.g. main.sqlite_master
                    let name = tokens.get(i + 2).copied().unwrap_or_default();
                    i += 2;
                    format!("{}.{}", token, name)
                }
                _ => token.to_string(),
            };
            i += 1;

            if tokens.get(i) == Some(&"as") {
                i += 1;
            }
            let alias = tokens
                .get(i)
                .copied()
                .filter(|t| is_identifier(t) && !ALIAS_STOPWORDS.contains(t))
                .map(|t| {
                    i += 1;
                    t.to_string()
                });
            refs.push(TableRef { table, alias });

            if tokens.get(i) == Some(&",") {
                i += 1;
            } else {
                break;
            }
        }
    }
    refs
}

/// Alias → table map built from FROM/JOIN clauses
pub fn alias_map(sql: &str) -> HashMap<String, String> {
    let mut map = HashMap::new();
    for TableRef { table, alias } in table_refs(sql) {
        if let Some(alias) = alias {
            map.insert(alias, table.clone());
        }
        map.entry(table.clone()).or_insert(table);
    }
    map
}

/// Tables named after FROM or JOIN
pub fn referenced_tables(sql: &str) -> Vec<String> {
    let mut tables: Vec<String> = Vec::new();
    for TableRef { table, .. } in table_refs(sql) {
        if !tables.contains(&table) {
            tables.push(table);
        }
    }
    tables
}

/// Names introduced by `WITH name AS (...)`
pub fn cte_names(sql: &str) -> Vec<String> {
    let lower = scanned_lower(sql);
    CTE_NAME
        .captures_iter(&lower)
        .map(|caps| caps[1].to_string())
        .collect()
}

/// Every `qualifier.column` pair
pub fn column_refs(sql: &str) -> Vec<(String, String)> {
    let lower = scanned_lower(sql);
    COLUMN_REF
        .captures_iter(&lower)
        .map(|caps| (caps[1].to_string(), caps[2].to_string()))
        .collect()
}

pub fn has_limit_keyword(sql: &str) -> bool {
    LIMIT_KEYWORD.is_match(&scanned_lower(sql))
}

/// The last `LIMIT :param` or `LIMIT n` in the statement
pub fn limit_clause(sql: &str) -> Option<LimitClause> {
    let lower = scanned_lower(sql);
    let caps = LIMIT.captures_iter(&lower).last()?;
    if let Some(name) = caps.get(1) {
        return Some(LimitClause::Param(name.as_str().to_string()));
    }
    caps.get(2)
        .and_then(|n| n.as_str().parse().ok())
        .map(LimitClause::Literal)
}

/// Rewrite every literal `LIMIT n` above `cap` down to the cap
pub fn clamp_literal_limits(sql: &str, cap: usize) -> String {
    LITERAL_LIMIT
        .replace_all(sql, |caps: &regex::Captures<'_>| {
            match caps[1].parse::<usize>() {
                Ok(n) if n <= cap => caps[0].to_string(),
                _ => format!("LIMIT {}", cap),
            }
        })
        .into_owned()
}

pub fn has_select_star(sql: &str) -> bool {
    SELECT_STAR.is_match(&scanned_lower(sql))
}
