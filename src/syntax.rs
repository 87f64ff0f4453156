//! Lexer and parser for the restricted routine grammar.
//!
//! Routine format:
//! ```text
//! @pipe                      # optional annotations, stripped
//! def clean(s):              # exactly one declared parameter
//!     strip()                # bare call
//!     concat([-1, -2], P)    # bare call, explicit placeholder argument
//!     P[0:2]                 # bare subscript of the placeholder
//!     P = (no_a, no_o)       # placeholder-targeted assignment
//!     def base() -> no_a:    # fork definition (one nesting level)
//!         drop("a")
//! ```
//!
//! - One statement per line; blank lines and `#` comments are skipped.
//! - Expressions: int/float/string/bool literals, identifiers and dotted
//!   paths, calls, subscripts with `a:b` slices, list and tuple literals,
//!   unary minus on numeric literals. No binary operators, no lambdas.
//! - A statement must be one of the four recognized shapes; anything else
//!   is a compile-time error.

use std::fmt;

use crate::error::CompileError;

/// A parsed single-parameter routine.
#[derive(Debug, Clone, PartialEq)]
pub struct Routine {
    pub name: String,
    pub param: String,
    pub body: Vec<Stmt>,
}

/// One statement with its source line.
#[derive(Debug, Clone, PartialEq)]
pub struct Stmt {
    pub line: usize,
    pub kind: StmtKind,
}

#[derive(Debug, Clone, PartialEq)]
pub enum StmtKind {
    /// `target = expr`; only the placeholder is a legal target, which the
    /// rewriter enforces.
    Assign { target: String, value: Expr },
    /// Bare call or subscript expression statement.
    Expr(Expr),
    /// Nested fork definition.
    Fork(ForkDef),
}

/// `def name() -> result:` plus its indented body.
#[derive(Debug, Clone, PartialEq)]
pub struct ForkDef {
    pub name: String,
    pub result: String,
    pub body: Vec<Stmt>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Int(i64),
    Float(f64),
    Str(String),
    Bool(bool),
    /// Identifier or dotted path.
    Path(Vec<String>),
    /// Call with a path callee.
    Call { callee: Vec<String>, args: Vec<Expr> },
    Index { base: Box<Expr>, index: Index },
    List(Vec<Expr>),
    Tuple(Vec<Expr>),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Index {
    At(Box<Expr>),
    Slice {
        start: Option<Box<Expr>>,
        end: Option<Box<Expr>>,
    },
}

// ---------------------------------------------------------------------------
// Lexer
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
enum Tok {
    Ident(String),
    Int(i64),
    Float(f64),
    Str(String),
    LParen,
    RParen,
    LBracket,
    RBracket,
    Comma,
    Dot,
    Colon,
    Eq,
    Arrow,
    Minus,
}

fn describe(tok: &Tok) -> String {
    match tok {
        Tok::Ident(s) => format!("`{s}`"),
        Tok::Int(n) => format!("`{n}`"),
        Tok::Float(x) => format!("`{x}`"),
        Tok::Str(_) => "string literal".to_string(),
        Tok::LParen => "`(`".to_string(),
        Tok::RParen => "`)`".to_string(),
        Tok::LBracket => "`[`".to_string(),
        Tok::RBracket => "`]`".to_string(),
        Tok::Comma => "`,`".to_string(),
        Tok::Dot => "`.`".to_string(),
        Tok::Colon => "`:`".to_string(),
        Tok::Eq => "`=`".to_string(),
        Tok::Arrow => "`->`".to_string(),
        Tok::Minus => "`-`".to_string(),
    }
}

fn syntax_err(line: usize, message: impl Into<String>) -> CompileError {
    CompileError::Syntax {
        line,
        message: message.into(),
    }
}

fn lex_line(text: &str, line: usize) -> Result<Vec<Tok>, CompileError> {
    let chars: Vec<char> = text.chars().collect();
    let mut toks = Vec::new();
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        match c {
            ' ' | '\t' => i += 1,
            '#' => break,
            '(' => {
                toks.push(Tok::LParen);
                i += 1;
            }
            ')' => {
                toks.push(Tok::RParen);
                i += 1;
            }
            '[' => {
                toks.push(Tok::LBracket);
                i += 1;
            }
            ']' => {
                toks.push(Tok::RBracket);
                i += 1;
            }
            ',' => {
                toks.push(Tok::Comma);
                i += 1;
            }
            '.' => {
                toks.push(Tok::Dot);
                i += 1;
            }
            ':' => {
                toks.push(Tok::Colon);
                i += 1;
            }
            '=' => {
                toks.push(Tok::Eq);
                i += 1;
            }
            '-' => {
                if chars.get(i + 1) == Some(&'>') {
                    toks.push(Tok::Arrow);
                    i += 2;
                } else {
                    toks.push(Tok::Minus);
                    i += 1;
                }
            }
            '\'' | '"' => {
                let quote = c;
                i += 1;
                let mut s = String::new();
                loop {
                    match chars.get(i) {
                        None => return Err(syntax_err(line, "unterminated string literal")),
                        Some(&ch) if ch == quote => {
                            i += 1;
                            break;
                        }
                        Some('\\') => {
                            let escaped = match chars.get(i + 1) {
                                Some('n') => '\n',
                                Some('t') => '\t',
                                Some('\\') => '\\',
                                Some('\'') => '\'',
                                Some('"') => '"',
                                _ => return Err(syntax_err(line, "unknown escape in string")),
                            };
                            s.push(escaped);
                            i += 2;
                        }
                        Some(&ch) => {
                            s.push(ch);
                            i += 1;
                        }
                    }
                }
                toks.push(Tok::Str(s));
            }
            c if c.is_ascii_digit() => {
                let start = i;
                while i < chars.len() && chars[i].is_ascii_digit() {
                    i += 1;
                }
                let mut is_float = false;
                if i + 1 < chars.len() && chars[i] == '.' && chars[i + 1].is_ascii_digit() {
                    is_float = true;
                    i += 1;
                    while i < chars.len() && chars[i].is_ascii_digit() {
                        i += 1;
                    }
                }
                let text: String = chars[start..i].iter().collect();
                if is_float {
                    let x = text
                        .parse::<f64>()
                        .map_err(|_| syntax_err(line, format!("invalid number `{text}`")))?;
                    toks.push(Tok::Float(x));
                } else {
                    let n = text
                        .parse::<i64>()
                        .map_err(|_| syntax_err(line, format!("invalid number `{text}`")))?;
                    toks.push(Tok::Int(n));
                }
            }
            c if c.is_alphabetic() || c == '_' => {
                let start = i;
                while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_') {
                    i += 1;
                }
                toks.push(Tok::Ident(chars[start..i].iter().collect()));
            }
            other => {
                return Err(syntax_err(line, format!("unexpected character `{other}`")));
            }
        }
    }
    Ok(toks)
}

// ---------------------------------------------------------------------------
// Parser
// ---------------------------------------------------------------------------

struct Cursor<'a> {
    toks: &'a [Tok],
    pos: usize,
    line: usize,
}

impl<'a> Cursor<'a> {
    fn new(toks: &'a [Tok], line: usize) -> Self {
        Self { toks, pos: 0, line }
    }

    fn peek(&self) -> Option<&Tok> {
        self.toks.get(self.pos)
    }

    fn next(&mut self) -> Option<&'a Tok> {
        let tok = self.toks.get(self.pos)?;
        self.pos += 1;
        Some(tok)
    }

    fn eat(&mut self, tok: &Tok) -> bool {
        if self.peek() == Some(tok) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, tok: &Tok) -> Result<(), CompileError> {
        if self.eat(tok) {
            Ok(())
        } else {
            let found = match self.peek() {
                Some(t) => describe(t),
                None => "end of line".to_string(),
            };
            Err(syntax_err(
                self.line,
                format!("expected {}, found {found}", describe(tok)),
            ))
        }
    }

    fn expect_ident(&mut self) -> Result<String, CompileError> {
        match self.next() {
            Some(Tok::Ident(s)) => Ok(s.clone()),
            Some(t) => Err(syntax_err(
                self.line,
                format!("expected a name, found {}", describe(t)),
            )),
            None => Err(syntax_err(self.line, "expected a name, found end of line")),
        }
    }

    fn at_end(&self) -> bool {
        self.pos >= self.toks.len()
    }

    fn expect_end(&self) -> Result<(), CompileError> {
        if self.at_end() {
            Ok(())
        } else {
            Err(syntax_err(self.line, "trailing tokens after statement"))
        }
    }
}

fn parse_expr(cur: &mut Cursor<'_>) -> Result<Expr, CompileError> {
    let mut expr = parse_atom(cur)?;
    loop {
        match cur.peek() {
            Some(Tok::Dot) => {
                cur.next();
                let name = cur.expect_ident()?;
                match &mut expr {
                    Expr::Path(path) => path.push(name),
                    _ => {
                        return Err(syntax_err(
                            cur.line,
                            "attribute access applies to names only",
                        ));
                    }
                }
            }
            Some(Tok::LParen) => {
                cur.next();
                let args = parse_args(cur)?;
                expr = match expr {
                    Expr::Path(callee) => Expr::Call { callee, args },
                    _ => {
                        return Err(syntax_err(cur.line, "only named targets can be called"));
                    }
                };
            }
            Some(Tok::LBracket) => {
                cur.next();
                let index = parse_index(cur)?;
                cur.expect(&Tok::RBracket)?;
                expr = Expr::Index {
                    base: Box::new(expr),
                    index,
                };
            }
            _ => break,
        }
    }
    Ok(expr)
}

fn parse_atom(cur: &mut Cursor<'_>) -> Result<Expr, CompileError> {
    let line = cur.line;
    match cur.next().cloned() {
        Some(Tok::Int(n)) => Ok(Expr::Int(n)),
        Some(Tok::Float(x)) => Ok(Expr::Float(x)),
        Some(Tok::Str(s)) => Ok(Expr::Str(s)),
        Some(Tok::Minus) => match cur.next() {
            Some(Tok::Int(n)) => Ok(Expr::Int(-n)),
            Some(Tok::Float(x)) => Ok(Expr::Float(-x)),
            _ => Err(syntax_err(line, "`-` applies to numeric literals only")),
        },
        Some(Tok::Ident(id)) => match id.as_str() {
            "true" => Ok(Expr::Bool(true)),
            "false" => Ok(Expr::Bool(false)),
            _ => Ok(Expr::Path(vec![id])),
        },
        Some(Tok::LParen) => {
            if cur.eat(&Tok::RParen) {
                return Ok(Expr::Tuple(Vec::new()));
            }
            let first = parse_expr(cur)?;
            if cur.peek() == Some(&Tok::Comma) {
                let mut items = vec![first];
                while cur.eat(&Tok::Comma) {
                    if cur.peek() == Some(&Tok::RParen) {
                        break;
                    }
                    items.push(parse_expr(cur)?);
                }
                cur.expect(&Tok::RParen)?;
                Ok(Expr::Tuple(items))
            } else {
                cur.expect(&Tok::RParen)?;
                Ok(first)
            }
        }
        Some(Tok::LBracket) => {
            let mut items = Vec::new();
            if !cur.eat(&Tok::RBracket) {
                items.push(parse_expr(cur)?);
                while cur.eat(&Tok::Comma) {
                    if cur.peek() == Some(&Tok::RBracket) {
                        break;
                    }
                    items.push(parse_expr(cur)?);
                }
                cur.expect(&Tok::RBracket)?;
            }
            Ok(Expr::List(items))
        }
        Some(t) => Err(syntax_err(
            line,
            format!("expected an expression, found {}", describe(&t)),
        )),
        None => Err(syntax_err(line, "expected an expression")),
    }
}

fn parse_args(cur: &mut Cursor<'_>) -> Result<Vec<Expr>, CompileError> {
    let mut args = Vec::new();
    if cur.eat(&Tok::RParen) {
        return Ok(args);
    }
    args.push(parse_expr(cur)?);
    while cur.eat(&Tok::Comma) {
        args.push(parse_expr(cur)?);
    }
    cur.expect(&Tok::RParen)?;
    Ok(args)
}

fn parse_index(cur: &mut Cursor<'_>) -> Result<Index, CompileError> {
    if cur.eat(&Tok::Colon) {
        let end = if cur.peek() == Some(&Tok::RBracket) {
            None
        } else {
            Some(Box::new(parse_expr(cur)?))
        };
        return Ok(Index::Slice { start: None, end });
    }
    let first = parse_expr(cur)?;
    if cur.eat(&Tok::Colon) {
        let end = if cur.peek() == Some(&Tok::RBracket) {
            None
        } else {
            Some(Box::new(parse_expr(cur)?))
        };
        Ok(Index::Slice {
            start: Some(Box::new(first)),
            end,
        })
    } else {
        Ok(Index::At(Box::new(first)))
    }
}

enum LineStmt {
    ForkHeader { name: String, result: String },
    Stmt(StmtKind),
}

fn parse_line_stmt(text: &str, line: usize) -> Result<LineStmt, CompileError> {
    let toks = lex_line(text, line)?;
    let mut cur = Cursor::new(&toks, line);

    if toks.first() == Some(&Tok::Ident("def".to_string())) {
        cur.next();
        let name = cur.expect_ident()?;
        cur.expect(&Tok::LParen)?;
        if !cur.eat(&Tok::RParen) {
            return Err(syntax_err(line, "fork definitions take no parameters"));
        }
        cur.expect(&Tok::Arrow)?;
        let result = cur.expect_ident()?;
        cur.expect(&Tok::Colon)?;
        cur.expect_end()?;
        return Ok(LineStmt::ForkHeader { name, result });
    }

    if let (Some(Tok::Ident(target)), Some(Tok::Eq)) = (toks.first(), toks.get(1)) {
        let target = target.clone();
        cur.next();
        cur.next();
        let value = parse_expr(&mut cur)?;
        cur.expect_end()?;
        return Ok(LineStmt::Stmt(StmtKind::Assign { target, value }));
    }

    let expr = parse_expr(&mut cur)?;
    cur.expect_end()?;
    match expr {
        Expr::Call { .. } | Expr::Index { .. } => Ok(LineStmt::Stmt(StmtKind::Expr(expr))),
        _ => Err(CompileError::UnsupportedShape {
            line,
            found: text.trim().to_string(),
        }),
    }
}

fn parse_header(text: &str, line: usize) -> Result<(String, String), CompileError> {
    let bad = || CompileError::BadHeader {
        line,
        found: text.to_string(),
    };
    let toks = lex_line(text, line)?;
    let mut cur = Cursor::new(&toks, line);
    if !cur.eat(&Tok::Ident("def".to_string())) {
        return Err(bad());
    }
    let name = cur.expect_ident().map_err(|_| bad())?;
    cur.expect(&Tok::LParen).map_err(|_| bad())?;
    let mut params = Vec::new();
    if cur.peek() != Some(&Tok::RParen) {
        loop {
            params.push(cur.expect_ident().map_err(|_| bad())?);
            if !cur.eat(&Tok::Comma) {
                break;
            }
        }
    }
    cur.expect(&Tok::RParen).map_err(|_| bad())?;
    cur.expect(&Tok::Colon).map_err(|_| bad())?;
    cur.expect_end().map_err(|_| bad())?;
    if params.len() != 1 {
        return Err(CompileError::ParameterCount { line });
    }
    let param = params.into_iter().next().unwrap_or_default();
    Ok((name, param))
}

/// Parse a routine's source text.
///
/// Leading `@...` annotation lines are stripped so an already-annotated
/// routine can be compiled without tripping over its own marker.
pub fn parse_routine(source: &str) -> Result<Routine, CompileError> {
    let mut lines: Vec<(usize, usize, String)> = Vec::new();
    for (i, raw) in source.lines().enumerate() {
        let text = raw.trim_end();
        let trimmed = text.trim_start();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let indent = text.len() - trimmed.len();
        lines.push((i + 1, indent, trimmed.to_string()));
    }

    let mut idx = 0;
    while idx < lines.len() && lines[idx].2.starts_with('@') {
        idx += 1;
    }
    let Some((header_line, header_indent, header_text)) = lines.get(idx).cloned() else {
        return Err(CompileError::BadHeader {
            line: source.lines().count().max(1),
            found: String::new(),
        });
    };
    let (name, param) = parse_header(&header_text, header_line)?;
    idx += 1;

    let mut body = Vec::new();
    if idx >= lines.len() {
        return Ok(Routine { name, param, body });
    }
    let base = lines[idx].1;
    if base <= header_indent {
        return Err(syntax_err(lines[idx].0, "expected an indented routine body"));
    }

    while idx < lines.len() {
        let (line_no, indent, text) = lines[idx].clone();
        if indent != base {
            return Err(syntax_err(line_no, "inconsistent indentation"));
        }
        match parse_line_stmt(&text, line_no)? {
            LineStmt::ForkHeader {
                name: fork_name,
                result,
            } => {
                idx += 1;
                let mut fork_body = Vec::new();
                while idx < lines.len() && lines[idx].1 > base {
                    let (fork_line, _, fork_text) = lines[idx].clone();
                    match parse_line_stmt(&fork_text, fork_line)? {
                        LineStmt::ForkHeader { .. } => {
                            return Err(CompileError::NestingTooDeep { line: fork_line });
                        }
                        LineStmt::Stmt(kind) => fork_body.push(Stmt {
                            line: fork_line,
                            kind,
                        }),
                    }
                    idx += 1;
                }
                if fork_body.is_empty() {
                    return Err(syntax_err(
                        line_no,
                        format!("fork `{fork_name}` has an empty body"),
                    ));
                }
                body.push(Stmt {
                    line: line_no,
                    kind: StmtKind::Fork(ForkDef {
                        name: fork_name,
                        result,
                        body: fork_body,
                    }),
                });
            }
            LineStmt::Stmt(kind) => {
                body.push(Stmt { line: line_no, kind });
                idx += 1;
            }
        }
    }
    Ok(Routine { name, param, body })
}

// ---------------------------------------------------------------------------
// Pretty-printing (used by rewritten-source rendering and diagnostics)
// ---------------------------------------------------------------------------

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Int(n) => write!(f, "{n}"),
            Expr::Float(x) => write!(f, "{x}"),
            Expr::Bool(b) => write!(f, "{b}"),
            Expr::Str(s) => {
                write!(f, "'{}'", s.replace('\\', "\\\\").replace('\'', "\\'"))
            }
            Expr::Path(path) => write!(f, "{}", path.join(".")),
            Expr::Call { callee, args } => {
                write!(f, "{}(", callee.join("."))?;
                for (i, a) in args.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{a}")?;
                }
                write!(f, ")")
            }
            Expr::Index { base, index } => write!(f, "{base}[{index}]"),
            Expr::List(items) => {
                write!(f, "[")?;
                for (i, x) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{x}")?;
                }
                write!(f, "]")
            }
            Expr::Tuple(items) => {
                write!(f, "(")?;
                for (i, x) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{x}")?;
                }
                if items.len() == 1 {
                    write!(f, ",")?;
                }
                write!(f, ")")
            }
        }
    }
}

impl fmt::Display for Index {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Index::At(e) => write!(f, "{e}"),
            Index::Slice { start, end } => {
                if let Some(s) = start {
                    write!(f, "{s}")?;
                }
                write!(f, ":")?;
                if let Some(e) = end {
                    write!(f, "{e}")?;
                }
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_minimal_routine() {
        let routine = parse_routine("def clean(s):\n    strip()\n").unwrap();
        assert_eq!(routine.name, "clean");
        assert_eq!(routine.param, "s");
        assert_eq!(routine.body.len(), 1);
        assert_eq!(
            routine.body[0].kind,
            StmtKind::Expr(Expr::Call {
                callee: vec!["strip".to_string()],
                args: vec![]
            })
        );
    }

    #[test]
    fn test_annotations_stripped() {
        let routine = parse_routine("@pipe\n@pipe(steps=True)\ndef f(x):\n    g()\n");
        assert!(routine.is_ok());
    }

    #[test]
    fn test_bad_header() {
        let err = parse_routine("fn clean(s):\n    strip()\n").unwrap_err();
        assert!(matches!(err, CompileError::BadHeader { line: 1, .. }));
    }

    #[test]
    fn test_parameter_count() {
        let err = parse_routine("def f(a, b):\n    g()\n").unwrap_err();
        assert!(matches!(err, CompileError::ParameterCount { line: 1 }));
        let err = parse_routine("def f():\n    g()\n").unwrap_err();
        assert!(matches!(err, CompileError::ParameterCount { line: 1 }));
    }

    #[test]
    fn test_assignment_statement() {
        let routine = parse_routine("def f(x):\n    P = (a, b)\n").unwrap();
        match &routine.body[0].kind {
            StmtKind::Assign { target, value } => {
                assert_eq!(target, "P");
                assert_eq!(
                    value,
                    &Expr::Tuple(vec![
                        Expr::Path(vec!["a".to_string()]),
                        Expr::Path(vec!["b".to_string()])
                    ])
                );
            }
            other => panic!("expected assignment, got {other:?}"),
        }
    }

    #[test]
    fn test_subscript_statement_with_slice() {
        let routine = parse_routine("def f(x):\n    P[:2]\n").unwrap();
        match &routine.body[0].kind {
            StmtKind::Expr(Expr::Index { base, index }) => {
                assert_eq!(**base, Expr::Path(vec!["P".to_string()]));
                assert_eq!(
                    index,
                    &Index::Slice {
                        start: None,
                        end: Some(Box::new(Expr::Int(2)))
                    }
                );
            }
            other => panic!("expected subscript, got {other:?}"),
        }
    }

    #[test]
    fn test_negative_literals_in_list() {
        let routine = parse_routine("def f(x):\n    concat([-1, -2, -3], P)\n").unwrap();
        match &routine.body[0].kind {
            StmtKind::Expr(Expr::Call { callee, args }) => {
                assert_eq!(callee, &vec!["concat".to_string()]);
                assert_eq!(
                    args[0],
                    Expr::List(vec![Expr::Int(-1), Expr::Int(-2), Expr::Int(-3)])
                );
                assert_eq!(args[1], Expr::Path(vec!["P".to_string()]));
            }
            other => panic!("expected call, got {other:?}"),
        }
    }

    #[test]
    fn test_dotted_path_call() {
        let routine = parse_routine("def f(x):\n    util.double()\n").unwrap();
        match &routine.body[0].kind {
            StmtKind::Expr(Expr::Call { callee, .. }) => {
                assert_eq!(callee, &vec!["util".to_string(), "double".to_string()]);
            }
            other => panic!("expected call, got {other:?}"),
        }
    }

    #[test]
    fn test_fork_block() {
        let src = "def f(s):\n    strip()\n    def base() -> no_a:\n        drop('a')\n        drop('b')\n    join(',')\n";
        let routine = parse_routine(src).unwrap();
        assert_eq!(routine.body.len(), 3);
        match &routine.body[1].kind {
            StmtKind::Fork(fork) => {
                assert_eq!(fork.name, "base");
                assert_eq!(fork.result, "no_a");
                assert_eq!(fork.body.len(), 2);
            }
            other => panic!("expected fork, got {other:?}"),
        }
    }

    #[test]
    fn test_nested_fork_rejected() {
        let src = "def f(s):\n    def a() -> b:\n        def c() -> d:\n            g()\n";
        let err = parse_routine(src).unwrap_err();
        assert!(matches!(err, CompileError::NestingTooDeep { line: 3 }));
    }

    #[test]
    fn test_empty_fork_body_rejected() {
        let src = "def f(s):\n    def a() -> b:\n    g()\n";
        let err = parse_routine(src).unwrap_err();
        assert!(matches!(err, CompileError::Syntax { line: 2, .. }));
    }

    #[test]
    fn test_bare_literal_statement_rejected() {
        let err = parse_routine("def f(x):\n    42\n").unwrap_err();
        assert!(matches!(err, CompileError::UnsupportedShape { line: 2, .. }));
    }

    #[test]
    fn test_bare_name_statement_rejected() {
        let err = parse_routine("def f(x):\n    x\n").unwrap_err();
        assert!(matches!(err, CompileError::UnsupportedShape { line: 2, .. }));
    }

    #[test]
    fn test_comments_and_blanks_skipped() {
        let src = "def f(x):\n\n    # setup\n    g()   # inline comment\n";
        let routine = parse_routine(src).unwrap();
        assert_eq!(routine.body.len(), 1);
    }

    #[test]
    fn test_inconsistent_indentation() {
        let src = "def f(x):\n    g()\n      h()\n";
        let err = parse_routine(src).unwrap_err();
        assert!(matches!(err, CompileError::Syntax { line: 3, .. }));
    }

    #[test]
    fn test_string_escapes() {
        let routine = parse_routine("def f(x):\n    g('a\\'b\\n')\n").unwrap();
        match &routine.body[0].kind {
            StmtKind::Expr(Expr::Call { args, .. }) => {
                assert_eq!(args[0], Expr::Str("a'b\n".to_string()));
            }
            other => panic!("expected call, got {other:?}"),
        }
    }

    #[test]
    fn test_unterminated_string() {
        let err = parse_routine("def f(x):\n    g('oops)\n").unwrap_err();
        assert!(matches!(err, CompileError::Syntax { line: 2, .. }));
    }

    #[test]
    fn test_expr_display_round_trip() {
        let src = "def f(x):\n    concat([-1, -2], P[0:2])\n";
        let routine = parse_routine(src).unwrap();
        match &routine.body[0].kind {
            StmtKind::Expr(e) => assert_eq!(e.to_string(), "concat([-1, -2], P[0:2])"),
            other => panic!("expected expr, got {other:?}"),
        }
    }

    #[test]
    fn test_empty_body_allowed() {
        let routine = parse_routine("def f(x):\n").unwrap();
        assert!(routine.body.is_empty());
    }
}
