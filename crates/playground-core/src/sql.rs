//! SQL statement analysis for the sandbox.
//!
//! This is not a SQL parser. SQLite rejects malformed statements when they
//! are prepared; the lexer here only knows enough to split a request into
//! statements, find the leading keyword of each, and spot constructs the
//! sandbox refuses to run (attaching files, pragmas, transaction control,
//! extension loading).

use std::borrow::Cow;
use std::collections::HashSet;
use std::fmt;

use crate::error::AppError;

/// Lexical category of a [`Token`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Word,
    QuotedIdent,
    String,
    Number,
    Symbol,
    Semicolon,
    Comment,
}

/// A slice of the input with its byte offsets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Token<'a> {
    pub kind: TokenKind,
    pub text: &'a str,
    pub start: usize,
    pub end: usize,
}

impl Token<'_> {
    fn is_word(&self, keyword: &str) -> bool {
        self.kind == TokenKind::Word && self.text.eq_ignore_ascii_case(keyword)
    }

    fn is_symbol(&self, symbol: &str) -> bool {
        self.kind == TokenKind::Symbol && self.text == symbol
    }

    /// Identifier name for words and quoted identifiers. Surrounding quotes
    /// are removed and doubled `"` or `` ` `` inside them unescaped.
    fn identifier(&self) -> Option<Cow<'_, str>> {
        match self.kind {
            TokenKind::Word => Some(Cow::Borrowed(self.text)),
            TokenKind::QuotedIdent if self.text.len() >= 2 => {
                let quote = &self.text[..1];
                let inner = &self.text[1..self.text.len() - 1];
                if quote == "[" {
                    return Some(Cow::Borrowed(inner));
                }
                let doubled = quote.repeat(2);
                if inner.contains(&doubled) {
                    Some(Cow::Owned(inner.replace(&doubled, quote)))
                } else {
                    Some(Cow::Borrowed(inner))
                }
            }
            _ => None,
        }
    }
}

fn is_word_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_' || b == b'$' || b >= 0x80
}

/// Scan a quoted run starting at `start` (which holds the quote byte).
/// Doubled quotes are escapes. Returns the offset just past the closing quote.
fn scan_quoted(bytes: &[u8], start: usize, quote: u8) -> usize {
    let mut i = start + 1;
    while i < bytes.len() {
        if bytes[i] == quote {
            if bytes.get(i + 1) == Some(&quote) {
                i += 2;
                continue;
            }
            return i + 1;
        }
        i += 1;
    }
    bytes.len()
}

/// Split SQL text into tokens. Unterminated strings and comments run to the
/// end of the input.
pub fn tokenize(sql: &str) -> Vec<Token<'_>> {
    let bytes = sql.as_bytes();
    let len = bytes.len();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < len {
        let b = bytes[i];
        let start = i;

        let kind = if b.is_ascii_whitespace() {
            i += 1;
            continue;
        } else if b == b'-' && bytes.get(i + 1) == Some(&b'-') {
            while i < len && bytes[i] != b'\n' {
                i += 1;
            }
            TokenKind::Comment
        } else if b == b'/' && bytes.get(i + 1) == Some(&b'*') {
            i += 2;
            while i < len && !(bytes[i] == b'*' && bytes.get(i + 1) == Some(&b'/')) {
                i += 1;
            }
            i = (i + 2).min(len);
            TokenKind::Comment
        } else if b == b'\'' {
            i = scan_quoted(bytes, i, b'\'');
            TokenKind::String
        } else if b == b'"' || b == b'`' {
            i = scan_quoted(bytes, i, b);
            TokenKind::QuotedIdent
        } else if b == b'[' {
            i = bytes[i..]
                .iter()
                .position(|&c| c == b']')
                .map(|p| i + p + 1)
                .unwrap_or(len);
            TokenKind::QuotedIdent
        } else if b == b';' {
            i += 1;
            TokenKind::Semicolon
        } else if b.is_ascii_digit() {
            while i < len && (bytes[i].is_ascii_alphanumeric() || bytes[i] == b'.') {
                i += 1;
            }
            TokenKind::Number
        } else if is_word_byte(b) {
            while i < len && is_word_byte(bytes[i]) {
                i += 1;
            }
            TokenKind::Word
        } else {
            i += 1;
            TokenKind::Symbol
        };

        tokens.push(Token {
            kind,
            text: &sql[start..i],
            start,
            end: i,
        });
    }

    tokens
}

/// Split SQL text into individual statements.
///
/// Semicolons inside strings, quoted identifiers, comments and trigger
/// bodies (`CREATE TRIGGER ... BEGIN ...; END`) do not split. Leading and
/// trailing comments are dropped, as are empty statements.
pub fn split_statements(sql: &str) -> Vec<&str> {
    let mut statements = Vec::new();
    let mut first: Option<usize> = None;
    let mut last_end = 0;

    // Trigger tracking for the statement under construction.
    let mut header: Vec<&str> = Vec::with_capacity(3);
    let mut is_trigger = false;
    let mut in_body = false;
    let mut body_closed = false;
    let mut case_depth = 0usize;

    for token in tokenize(sql) {
        match token.kind {
            TokenKind::Comment => continue,
            TokenKind::Semicolon if !in_body => {
                if let Some(start) = first.take() {
                    statements.push(&sql[start..last_end]);
                }
                header.clear();
                is_trigger = false;
                body_closed = false;
                case_depth = 0;
                continue;
            }
            TokenKind::Word => {
                if header.len() < 3 {
                    header.push(token.text);
                    is_trigger = is_trigger || starts_create_trigger(&header);
                }

                if is_trigger {
                    if token.is_word("BEGIN") && !in_body && !body_closed {
                        in_body = true;
                    } else if in_body && token.is_word("CASE") {
                        case_depth += 1;
                    } else if in_body && token.is_word("END") {
                        if case_depth > 0 {
                            case_depth -= 1;
                        } else {
                            in_body = false;
                            body_closed = true;
                        }
                    }
                }
            }
            _ => {}
        }

        if first.is_none() {
            first = Some(token.start);
        }
        last_end = token.end;
    }

    if let Some(start) = first {
        statements.push(&sql[start..last_end]);
    }

    statements
}

/// `CREATE TRIGGER` or `CREATE TEMP|TEMPORARY TRIGGER` as the leading words.
fn starts_create_trigger(words: &[&str]) -> bool {
    let is = |word: &str, keyword: &str| word.eq_ignore_ascii_case(keyword);
    match words {
        [create, trigger] => is(*create, "CREATE") && is(*trigger, "TRIGGER"),
        [create, temp, trigger] => {
            is(*create, "CREATE")
                && (is(*temp, "TEMP") || is(*temp, "TEMPORARY"))
                && is(*trigger, "TRIGGER")
        }
        _ => false,
    }
}

/// What a single statement does, judged by its leading keyword.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatementKind {
    Query,
    Explain,
    Insert,
    Update,
    Delete,
    Create,
    Drop,
    Alter,
    Analyze,
    Transaction,
    Attach,
    Detach,
    Pragma,
    Vacuum,
    Reindex,
    Other(String),
}

impl StatementKind {
    pub fn as_str(&self) -> &str {
        match self {
            StatementKind::Query => "QUERY",
            StatementKind::Explain => "EXPLAIN",
            StatementKind::Insert => "INSERT",
            StatementKind::Update => "UPDATE",
            StatementKind::Delete => "DELETE",
            StatementKind::Create => "CREATE",
            StatementKind::Drop => "DROP",
            StatementKind::Alter => "ALTER",
            StatementKind::Analyze => "ANALYZE",
            StatementKind::Transaction => "TRANSACTION",
            StatementKind::Attach => "ATTACH",
            StatementKind::Detach => "DETACH",
            StatementKind::Pragma => "PRAGMA",
            StatementKind::Vacuum => "VACUUM",
            StatementKind::Reindex => "REINDEX",
            StatementKind::Other(keyword) => keyword,
        }
    }

    /// Whether the sandbox will run statements of this kind.
    ///
    /// Attaching databases, pragmas and `VACUUM INTO` reach outside the
    /// in-memory sandbox; transaction control would leave the single sandbox
    /// connection inside an open transaction between requests.
    pub fn is_permitted(&self) -> bool {
        !matches!(
            self,
            StatementKind::Attach
                | StatementKind::Detach
                | StatementKind::Pragma
                | StatementKind::Vacuum
                | StatementKind::Transaction
                | StatementKind::Other(_)
        )
    }

    pub fn is_read_only(&self) -> bool {
        matches!(self, StatementKind::Query | StatementKind::Explain)
    }
}

impl fmt::Display for StatementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A single statement that passed sandbox checks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnalyzedQuery {
    /// Statement text without surrounding comments or the trailing semicolon.
    pub statement: String,
    pub kind: StatementKind,
    /// True when the statement produces a result set.
    pub returns_rows: bool,
}

fn significant(tokens: Vec<Token<'_>>) -> Vec<Token<'_>> {
    tokens
        .into_iter()
        .filter(|t| t.kind != TokenKind::Comment)
        .collect()
}

fn classify(tokens: &[Token<'_>]) -> StatementKind {
    let Some(first) = tokens.iter().find(|t| t.kind == TokenKind::Word) else {
        return StatementKind::Other(String::new());
    };

    match first.text.to_ascii_uppercase().as_str() {
        "SELECT" | "VALUES" => StatementKind::Query,
        "WITH" => classify_cte(tokens),
        "EXPLAIN" => StatementKind::Explain,
        "INSERT" | "REPLACE" => StatementKind::Insert,
        "UPDATE" => StatementKind::Update,
        "DELETE" => StatementKind::Delete,
        "CREATE" => StatementKind::Create,
        "DROP" => StatementKind::Drop,
        "ALTER" => StatementKind::Alter,
        "ANALYZE" => StatementKind::Analyze,
        "BEGIN" | "COMMIT" | "END" | "ROLLBACK" | "SAVEPOINT" | "RELEASE" => {
            StatementKind::Transaction
        }
        "ATTACH" => StatementKind::Attach,
        "DETACH" => StatementKind::Detach,
        "PRAGMA" => StatementKind::Pragma,
        "VACUUM" => StatementKind::Vacuum,
        "REINDEX" => StatementKind::Reindex,
        other => StatementKind::Other(other.to_string()),
    }
}

/// Resolve `WITH ...` to the statement that follows the CTE list.
fn classify_cte(tokens: &[Token<'_>]) -> StatementKind {
    let mut depth = 0usize;
    for token in tokens.iter().skip(1) {
        if token.is_symbol("(") {
            depth += 1;
        } else if token.is_symbol(")") {
            depth = depth.saturating_sub(1);
        } else if depth == 0 && token.kind == TokenKind::Word {
            match token.text.to_ascii_uppercase().as_str() {
                "SELECT" | "VALUES" => return StatementKind::Query,
                "INSERT" | "REPLACE" => return StatementKind::Insert,
                "UPDATE" => return StatementKind::Update,
                "DELETE" => return StatementKind::Delete,
                _ => {}
            }
        }
    }
    StatementKind::Other("WITH".to_string())
}

/// Check a request's SQL against the sandbox rules.
///
/// Exactly one permitted statement is accepted; anything else is rejected
/// before it reaches the database.
pub fn analyze(sql: &str) -> Result<AnalyzedQuery, AppError> {
    let statements = split_statements(sql);

    let statement = match statements.as_slice() {
        [] => return Err(AppError::ValidationError("Query cannot be empty".into())),
        [single] => *single,
        many => {
            return Err(AppError::ForbiddenStatement(format!(
                "Only a single statement may be executed per request, found {}",
                many.len()
            )));
        }
    };

    let tokens = significant(tokenize(statement));
    let kind = classify(&tokens);

    if !kind.is_permitted() {
        let message = match kind.as_str() {
            "" => "Statements without a leading keyword are not allowed in the sandbox".to_string(),
            keyword => format!("{keyword} statements are not allowed in the sandbox"),
        };
        return Err(AppError::ForbiddenStatement(message));
    }

    if tokens.iter().any(|t| {
        t.identifier()
            .is_some_and(|name| name.eq_ignore_ascii_case("load_extension"))
    }) {
        return Err(AppError::ForbiddenStatement(
            "load_extension() is not allowed in the sandbox".into(),
        ));
    }

    let returns_rows = kind.is_read_only()
        || (matches!(
            kind,
            StatementKind::Insert | StatementKind::Update | StatementKind::Delete
        ) && tokens.iter().any(|t| t.is_word("RETURNING")));

    Ok(AnalyzedQuery {
        statement: statement.to_string(),
        kind,
        returns_rows,
    })
}

/// Size information parsed from a declared column type such as `VARCHAR(255)`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TypeShape {
    pub base: String,
    pub size: Option<u32>,
    pub precision: Option<u32>,
    pub scale: Option<u32>,
}

const NUMERIC_BASES: &[&str] = &["DECIMAL", "NUMERIC", "NUMBER", "FLOAT", "DOUBLE", "REAL"];

/// Parse a declared column type.
///
/// Numeric types map their arguments to precision and scale; everything
/// else maps a single argument to a size.
pub fn parse_declared_type(declared: &str) -> TypeShape {
    let declared = declared.trim();
    let (base, args) = match declared.find('(') {
        Some(open) => {
            let close = declared[open..]
                .find(')')
                .map(|c| open + c)
                .unwrap_or(declared.len());
            (declared[..open].trim(), &declared[open + 1..close])
        }
        None => (declared, ""),
    };

    let base = base.to_ascii_uppercase();
    let numbers: Vec<u32> = args
        .split(',')
        .filter_map(|a| a.trim().parse().ok())
        .collect();

    let is_numeric = NUMERIC_BASES.iter().any(|n| base.contains(n));
    let mut shape = TypeShape {
        base,
        ..TypeShape::default()
    };

    if is_numeric {
        shape.precision = numbers.first().copied();
        shape.scale = numbers.get(1).copied();
    } else {
        shape.size = numbers.first().copied();
    }

    shape
}

/// Make result column names usable as map keys.
///
/// Repeated names get a numeric suffix (`id`, `id_1`, ...) so that a join
/// selecting two `id` columns keeps both values.
pub fn unique_column_keys<S: AsRef<str>>(names: &[S]) -> Vec<String> {
    let mut used = HashSet::new();
    names
        .iter()
        .map(|name| {
            let name = name.as_ref();
            let mut key = name.to_string();
            let mut suffix = 1;
            while used.contains(&key) {
                key = format!("{name}_{suffix}");
                suffix += 1;
            }
            used.insert(key.clone());
            key
        })
        .collect()
}
