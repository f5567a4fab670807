//! Platform selectors: the trailing `# [expr]` annotation on recipe lines.
//!
//! A selector is a small boolean expression over platform and Python
//! variables:
//! ```text
//! - pywin32          # [win]
//! - readline         # [unix and not osx]
//! - enum34           # [py<34]
//! ```

use serde::{Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Errors that can occur when parsing or evaluating a selector.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SelectorError {
    #[error("empty selector expression")]
    Empty,

    #[error("unexpected character '{0}' in selector '{1}'")]
    UnexpectedChar(char, String),

    #[error("unexpected end of selector '{0}'")]
    UnexpectedEnd(String),

    #[error("unexpected token '{token}' in selector '{source_text}'")]
    UnexpectedToken { token: String, source_text: String },

    #[error("unknown selector variable '{0}'")]
    UnknownVariable(String),

    #[error("selector variable '{0}' requires a Python version")]
    MissingPython(String),

    #[error("selector variable '{0}' cannot be compared with a number")]
    NotComparable(String),

    #[error("unknown platform '{0}'")]
    UnknownPlatform(String),

    #[error("invalid Python version '{0}', expected MAJOR.MINOR")]
    InvalidPython(String),
}

/// A conda platform subdirectory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(into = "String")]
pub enum Platform {
    Linux64,
    LinuxAarch64,
    LinuxPpc64le,
    Osx64,
    OsxArm64,
    Win64,
    Win32,
    Noarch,
}

impl Platform {
    /// Every platform known to the selector namespace.
    pub const ALL: [Platform; 8] = [
        Self::Linux64,
        Self::LinuxAarch64,
        Self::LinuxPpc64le,
        Self::Osx64,
        Self::OsxArm64,
        Self::Win64,
        Self::Win32,
        Self::Noarch,
    ];

    /// Returns the subdir string, e.g. `linux-64`.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Linux64 => "linux-64",
            Self::LinuxAarch64 => "linux-aarch64",
            Self::LinuxPpc64le => "linux-ppc64le",
            Self::Osx64 => "osx-64",
            Self::OsxArm64 => "osx-arm64",
            Self::Win64 => "win-64",
            Self::Win32 => "win-32",
            Self::Noarch => "noarch",
        }
    }

    /// The platform this binary was compiled for, falling back to `linux-64`.
    #[must_use]
    pub fn host() -> Self {
        match (std::env::consts::OS, std::env::consts::ARCH) {
            ("linux", "aarch64") => Self::LinuxAarch64,
            ("linux", "powerpc64") => Self::LinuxPpc64le,
            ("macos", "aarch64") => Self::OsxArm64,
            ("macos", _) => Self::Osx64,
            ("windows", "x86") => Self::Win32,
            ("windows", _) => Self::Win64,
            _ => Self::Linux64,
        }
    }

    #[must_use]
    pub fn is_linux(&self) -> bool {
        matches!(self, Self::Linux64 | Self::LinuxAarch64 | Self::LinuxPpc64le)
    }

    #[must_use]
    pub fn is_osx(&self) -> bool {
        matches!(self, Self::Osx64 | Self::OsxArm64)
    }

    #[must_use]
    pub fn is_win(&self) -> bool {
        matches!(self, Self::Win64 | Self::Win32)
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<Platform> for String {
    fn from(platform: Platform) -> Self {
        platform.as_str().to_string()
    }
}

impl FromStr for Platform {
    type Err = SelectorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|p| p.as_str() == s)
            .ok_or_else(|| SelectorError::UnknownPlatform(s.to_string()))
    }
}

/// Parse a `MAJOR.MINOR` Python version such as `3.8`.
pub fn parse_python_version(s: &str) -> Result<(u32, u32), SelectorError> {
    let invalid = || SelectorError::InvalidPython(s.to_string());
    let (major, minor) = s.trim().split_once('.').ok_or_else(invalid)?;
    let major = major.parse().map_err(|_| invalid())?;
    let minor = minor.parse().map_err(|_| invalid())?;
    Ok((major, minor))
}

/// The variables a selector is evaluated against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SelectorContext {
    pub platform: Platform,
    pub python: Option<(u32, u32)>,
}

/// A selector variable's value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Value {
    Bool(bool),
    Int(i64),
}

impl SelectorContext {
    #[must_use]
    pub fn new(platform: Platform) -> Self {
        Self {
            platform,
            python: None,
        }
    }

    #[must_use]
    pub fn with_python(mut self, major: u32, minor: u32) -> Self {
        self.python = Some((major, minor));
        self
    }

    fn lookup(&self, name: &str) -> Result<Value, SelectorError> {
        use Platform::{Linux64, LinuxAarch64, LinuxPpc64le, Noarch, Osx64, OsxArm64, Win32, Win64};

        let p = self.platform;
        let flag = match name {
            "linux" => p.is_linux(),
            "osx" => p.is_osx(),
            "win" => p.is_win(),
            "unix" => p.is_linux() || p.is_osx(),
            "noarch" => p == Noarch,
            "linux64" => p == Linux64,
            "aarch64" => p == LinuxAarch64,
            "ppc64le" => p == LinuxPpc64le,
            "arm64" => p == OsxArm64,
            "osx64" => p == Osx64,
            "win32" => p == Win32,
            "win64" => p == Win64,
            "x86" => matches!(p, Linux64 | Osx64 | Win64 | Win32),
            "x86_64" => matches!(p, Linux64 | Osx64 | Win64),
            _ => return self.lookup_python(name),
        };
        Ok(Value::Bool(flag))
    }

    fn lookup_python(&self, name: &str) -> Result<Value, SelectorError> {
        if !is_python_variable(name) {
            return Err(SelectorError::UnknownVariable(name.to_string()));
        }
        let (major, minor) = self
            .python
            .ok_or_else(|| SelectorError::MissingPython(name.to_string()))?;
        // conda-build concatenates the digits, so 3.10 is 310
        let digits = format!("{major}{minor}");
        let py = digits
            .parse::<i64>()
            .map_err(|_| SelectorError::InvalidPython(format!("{major}.{minor}")))?;

        Ok(match name {
            "py" => Value::Int(py),
            "py2k" => Value::Bool(major == 2),
            "py3k" => Value::Bool(major == 3),
            // pyXY flags, e.g. py27 or py310
            _ => Value::Bool(name[2..] == digits),
        })
    }
}

fn is_python_variable(name: &str) -> bool {
    match name {
        "py" | "py2k" | "py3k" => true,
        _ => {
            name.len() > 3
                && name.starts_with("py")
                && name[2..].chars().all(|c| c.is_ascii_digit())
        }
    }
}

/// Returns true if `name` belongs to the selector namespace.
#[must_use]
pub fn is_known_variable(name: &str) -> bool {
    let ctx = SelectorContext::new(Platform::Linux64).with_python(3, 8);
    ctx.lookup(name).is_ok()
}

/// Comparison operator in `ident OP integer`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CmpOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl CmpOp {
    fn apply(self, lhs: i64, rhs: i64) -> bool {
        match self {
            Self::Eq => lhs == rhs,
            Self::Ne => lhs != rhs,
            Self::Lt => lhs < rhs,
            Self::Le => lhs <= rhs,
            Self::Gt => lhs > rhs,
            Self::Ge => lhs >= rhs,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Expr {
    Var(String),
    Compare(String, CmpOp, i64),
    Not(Box<Expr>),
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
}

impl Expr {
    fn evaluate(&self, ctx: &SelectorContext) -> Result<bool, SelectorError> {
        match self {
            Self::Var(name) => match ctx.lookup(name)? {
                Value::Bool(b) => Ok(b),
                Value::Int(n) => Ok(n != 0),
            },
            Self::Compare(name, op, rhs) => match ctx.lookup(name)? {
                Value::Int(lhs) => Ok(op.apply(lhs, *rhs)),
                Value::Bool(_) => Err(SelectorError::NotComparable(name.clone())),
            },
            Self::Not(inner) => Ok(!inner.evaluate(ctx)?),
            Self::And(lhs, rhs) => Ok(lhs.evaluate(ctx)? && rhs.evaluate(ctx)?),
            Self::Or(lhs, rhs) => Ok(lhs.evaluate(ctx)? || rhs.evaluate(ctx)?),
        }
    }

    fn collect_identifiers<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            Self::Var(name) | Self::Compare(name, _, _) => {
                if !out.contains(&name.as_str()) {
                    out.push(name);
                }
            }
            Self::Not(inner) => inner.collect_identifiers(out),
            Self::And(lhs, rhs) | Self::Or(lhs, rhs) => {
                lhs.collect_identifiers(out);
                rhs.collect_identifiers(out);
            }
        }
    }
}

/// A parsed selector expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selector {
    source: String,
    expr: Expr,
}

impl Selector {
    /// The expression text as written, without brackets.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// Evaluate the selector for a platform.
    ///
    /// # Errors
    ///
    /// Returns an error for unknown variables, a missing Python version, or a
    /// numeric comparison against a boolean variable.
    pub fn evaluate(&self, ctx: &SelectorContext) -> Result<bool, SelectorError> {
        self.expr.evaluate(ctx)
    }

    /// Variables referenced by the expression, in first-seen order.
    #[must_use]
    pub fn identifiers(&self) -> Vec<&str> {
        let mut out = Vec::new();
        self.expr.collect_identifiers(&mut out);
        out
    }
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

impl Serialize for Selector {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.source)
    }
}

impl FromStr for Selector {
    type Err = SelectorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let source = s.trim().to_string();
        if source.is_empty() {
            return Err(SelectorError::Empty);
        }
        let tokens = tokenize(&source)?;
        let mut parser = Parser {
            tokens: &tokens,
            pos: 0,
            source: &source,
        };
        let expr = parser.parse_or()?;
        if let Some(token) = parser.peek() {
            return Err(parser.unexpected(token));
        }
        Ok(Self { source, expr })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Ident(String),
    Int(i64),
    Op(CmpOp),
    LParen,
    RParen,
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ident(s) => f.write_str(s),
            Self::Int(n) => write!(f, "{n}"),
            Self::Op(op) => f.write_str(match op {
                CmpOp::Eq => "==",
                CmpOp::Ne => "!=",
                CmpOp::Lt => "<",
                CmpOp::Le => "<=",
                CmpOp::Gt => ">",
                CmpOp::Ge => ">=",
            }),
            Self::LParen => f.write_str("("),
            Self::RParen => f.write_str(")"),
        }
    }
}

fn tokenize(source: &str) -> Result<Vec<Token>, SelectorError> {
    let mut tokens = Vec::new();
    let mut chars = source.char_indices().peekable();

    while let Some(&(start, c)) = chars.peek() {
        if c.is_whitespace() {
            chars.next();
        } else if c.is_ascii_alphabetic() || c == '_' {
            let mut end = start;
            while let Some(&(i, c)) = chars.peek() {
                if !(c.is_ascii_alphanumeric() || c == '_') {
                    break;
                }
                end = i + c.len_utf8();
                chars.next();
            }
            tokens.push(Token::Ident(source[start..end].to_string()));
        } else if c.is_ascii_digit() {
            let mut end = start;
            while let Some(&(i, c)) = chars.peek() {
                if !c.is_ascii_digit() {
                    break;
                }
                end = i + 1;
                chars.next();
            }
            let n = source[start..end]
                .parse()
                .map_err(|_| SelectorError::UnexpectedChar(c, source.to_string()))?;
            tokens.push(Token::Int(n));
        } else {
            chars.next();
            let followed_by_eq = chars.peek().is_some_and(|&(_, n)| n == '=');
            let token = match (c, followed_by_eq) {
                ('(', _) => Token::LParen,
                (')', _) => Token::RParen,
                ('=', true) => Token::Op(CmpOp::Eq),
                ('!', true) => Token::Op(CmpOp::Ne),
                ('<', true) => Token::Op(CmpOp::Le),
                ('>', true) => Token::Op(CmpOp::Ge),
                ('<', false) => Token::Op(CmpOp::Lt),
                ('>', false) => Token::Op(CmpOp::Gt),
                _ => return Err(SelectorError::UnexpectedChar(c, source.to_string())),
            };
            if matches!(token, Token::Op(CmpOp::Eq | CmpOp::Ne | CmpOp::Le | CmpOp::Ge)) {
                chars.next();
            }
            tokens.push(token);
        }
    }

    Ok(tokens)
}

struct Parser<'a> {
    tokens: &'a [Token],
    pos: usize,
    source: &'a str,
}

impl Parser<'_> {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn bump(&mut self) -> Result<Token, SelectorError> {
        let token = self
            .tokens
            .get(self.pos)
            .cloned()
            .ok_or_else(|| SelectorError::UnexpectedEnd(self.source.to_string()))?;
        self.pos += 1;
        Ok(token)
    }

    fn unexpected(&self, token: &Token) -> SelectorError {
        SelectorError::UnexpectedToken {
            token: token.to_string(),
            source_text: self.source.to_string(),
        }
    }

    fn eat_keyword(&mut self, keyword: &str) -> bool {
        if matches!(self.peek(), Some(Token::Ident(s)) if s == keyword) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn parse_or(&mut self) -> Result<Expr, SelectorError> {
        let mut lhs = self.parse_and()?;
        while self.eat_keyword("or") {
            let rhs = self.parse_and()?;
            lhs = Expr::Or(Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_and(&mut self) -> Result<Expr, SelectorError> {
        let mut lhs = self.parse_not()?;
        while self.eat_keyword("and") {
            let rhs = self.parse_not()?;
            lhs = Expr::And(Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_not(&mut self) -> Result<Expr, SelectorError> {
        if self.eat_keyword("not") {
            return Ok(Expr::Not(Box::new(self.parse_not()?)));
        }
        self.parse_atom()
    }

    fn parse_atom(&mut self) -> Result<Expr, SelectorError> {
        match self.bump()? {
            Token::LParen => {
                let inner = self.parse_or()?;
                match self.bump()? {
                    Token::RParen => Ok(inner),
                    other => Err(self.unexpected(&other)),
                }
            }
            Token::Ident(name) if !matches!(name.as_str(), "and" | "or" | "not") => {
                if let Some(Token::Op(op)) = self.peek().cloned() {
                    self.pos += 1;
                    match self.bump()? {
                        Token::Int(rhs) => Ok(Expr::Compare(name, op, rhs)),
                        other => Err(self.unexpected(&other)),
                    }
                } else {
                    Ok(Expr::Var(name))
                }
            }
            other => Err(self.unexpected(&other)),
        }
    }
}

/// Split a line into its content and a trailing selector expression.
///
/// The selector must sit in a YAML comment (a `#` at line start or after
/// whitespace, outside quotes) whose text ends in `[...]`. Lines without a
/// selector come back unchanged.
#[must_use]
pub fn extract_selector(line: &str) -> (&str, Option<&str>) {
    let Some(hash) = find_comment_start(line) else {
        return (line, None);
    };
    let comment = line[hash + 1..].trim();
    let Some(body) = comment.strip_suffix(']') else {
        return (line, None);
    };
    let Some(open) = body.rfind('[') else {
        return (line, None);
    };
    (line[..hash].trim_end(), Some(&body[open + 1..]))
}

fn find_comment_start(line: &str) -> Option<usize> {
    let mut quote: Option<char> = None;
    let mut prev = ' ';

    for (i, c) in line.char_indices() {
        // Quotes only open a scalar at a token boundary, so apostrophes in
        // plain text are not mistaken for one.
        let at_boundary = prev.is_whitespace() || matches!(prev, ':' | '[' | '{' | ',');
        match quote {
            Some(q) if c == q => quote = None,
            Some(_) => {}
            None if (c == '"' || c == '\'') && at_boundary => quote = Some(c),
            None if c == '#' && prev.is_whitespace() => return Some(i),
            None => {}
        }
        prev = c;
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn eval(expr: &str, platform: Platform) -> bool {
        let ctx = SelectorContext::new(platform).with_python(3, 8);
        expr.parse::<Selector>().unwrap().evaluate(&ctx).unwrap()
    }

    #[test]
    fn platform_variables() {
        assert!(eval("linux", Platform::Linux64));
        assert!(!eval("linux", Platform::Osx64));
        assert!(eval("unix", Platform::OsxArm64));
        assert!(!eval("unix", Platform::Win64));
        assert!(eval("win", Platform::Win32));
        assert!(eval("x86_64", Platform::Win64));
        assert!(!eval("x86_64", Platform::LinuxAarch64));
        assert!(eval("aarch64", Platform::LinuxAarch64));
    }

    #[test]
    fn boolean_operators_and_precedence() {
        assert!(eval("unix and not osx", Platform::Linux64));
        assert!(!eval("unix and not osx", Platform::Osx64));
        // `and` binds tighter than `or`
        assert!(eval("win or linux and x86_64", Platform::Win32));
        assert!(!eval("(win or linux) and arm64", Platform::Linux64));
        assert!(eval("not not linux", Platform::Linux64));
    }

    #[test]
    fn python_comparisons() {
        assert!(eval("py>=36", Platform::Linux64));
        assert!(!eval("py<38", Platform::Linux64));
        assert!(eval("py == 38", Platform::Linux64));
        assert!(eval("py38", Platform::Linux64));
        assert!(!eval("py27", Platform::Linux64));
        assert!(eval("py3k", Platform::Linux64));
    }

    #[test]
    fn two_digit_minor_versions() {
        let eval_with = |expr: &str, minor: u32| {
            let ctx = SelectorContext::new(Platform::Linux64).with_python(3, minor);
            expr.parse::<Selector>().unwrap().evaluate(&ctx).unwrap()
        };

        assert!(eval_with("py310", 10));
        assert!(eval_with("py==310", 10));
        assert!(eval_with("py>=310", 10));
        assert!(eval_with("py>38", 10));
        assert!(!eval_with("py<310", 10));

        assert!(eval_with("py==312", 12));
        assert!(eval_with("py>=310 and py<313", 12));
        assert!(!eval_with("py310", 12));
        assert!(eval_with("py<310", 9));
    }

    #[test]
    fn python_variable_without_version() {
        let selector: Selector = "py>=36".parse().unwrap();
        let ctx = SelectorContext::new(Platform::Linux64);
        assert_eq!(
            selector.evaluate(&ctx),
            Err(SelectorError::MissingPython("py".to_string()))
        );
    }

    #[test]
    fn unknown_variable_is_an_error() {
        let selector: Selector = "linux and solaris".parse().unwrap();
        let ctx = SelectorContext::new(Platform::Linux64);
        assert_eq!(
            selector.evaluate(&ctx),
            Err(SelectorError::UnknownVariable("solaris".to_string()))
        );
        assert_eq!(selector.identifiers(), vec!["linux", "solaris"]);
    }

    #[test]
    fn comparing_a_platform_flag_is_an_error() {
        let selector: Selector = "linux >= 3".parse().unwrap();
        let ctx = SelectorContext::new(Platform::Linux64);
        assert!(matches!(
            selector.evaluate(&ctx),
            Err(SelectorError::NotComparable(_))
        ));
    }

    #[test]
    fn malformed_selectors() {
        assert_eq!("".parse::<Selector>(), Err(SelectorError::Empty));
        assert!(matches!(
            "linux and".parse::<Selector>(),
            Err(SelectorError::UnexpectedEnd(_))
        ));
        assert!(matches!(
            "(linux".parse::<Selector>(),
            Err(SelectorError::UnexpectedEnd(_))
        ));
        assert!(matches!(
            "linux osx".parse::<Selector>(),
            Err(SelectorError::UnexpectedToken { .. })
        ));
        assert!(matches!(
            "linux & osx".parse::<Selector>(),
            Err(SelectorError::UnexpectedChar('&', _))
        ));
    }

    #[test]
    fn extract_trailing_selector() {
        assert_eq!(
            extract_selector("    - x2z  # [linux]"),
            ("    - x2z", Some("linux"))
        );
        assert_eq!(
            extract_selector("- foo # pinned for abi [win]"),
            ("- foo", Some("win"))
        );
        assert_eq!(extract_selector("- numpy  # comment"), ("- numpy  # comment", None));
        assert_eq!(extract_selector("- url#[linux]"), ("- url#[linux]", None));
        assert_eq!(
            extract_selector("script: \"echo # [x]\""),
            ("script: \"echo # [x]\"", None)
        );
    }

    #[test]
    fn platform_round_trip_and_known_variables() {
        for platform in Platform::ALL {
            assert_eq!(platform.as_str().parse::<Platform>().unwrap(), platform);
        }
        assert!("linux-128".parse::<Platform>().is_err());
        assert!(is_known_variable("osx"));
        assert!(is_known_variable("py310"));
        assert!(!is_known_variable("solaris"));
    }

    #[test]
    fn python_version_parsing() {
        assert_eq!(parse_python_version("3.10"), Ok((3, 10)));
        assert!(parse_python_version("3").is_err());
        assert!(parse_python_version("three.eight").is_err());
    }
}
