//! Tokenizer and parser for the Gradle Kotlin-DSL subset used by Android
//! application build files.
//!
//! The parser produces a small syntax tree of statements and expressions. It
//! does not evaluate anything: unknown constructs survive as [`Expr::Raw`] so
//! that files using features outside the subset still load.

use std::fmt;

/// A lexical token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Tok {
    Ident(String),
    Str(String),
    Int(i64),
    LBrace,
    RBrace,
    LParen,
    RParen,
    LBracket,
    RBracket,
    Dot,
    SafeDot,
    Comma,
    Assign,
    Lt,
    Gt,
    Newline,
    Semi,
    /// Any other operator (`==`, `?:`, `!!`, `->`, `+`, ...).
    Sym(String),
}

impl fmt::Display for Tok {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ident(name) => f.write_str(name),
            Self::Str(value) => write!(f, "{value:?}"),
            Self::Int(value) => write!(f, "{value}"),
            Self::LBrace => f.write_str("{"),
            Self::RBrace => f.write_str("}"),
            Self::LParen => f.write_str("("),
            Self::RParen => f.write_str(")"),
            Self::LBracket => f.write_str("["),
            Self::RBracket => f.write_str("]"),
            Self::Dot => f.write_str("."),
            Self::SafeDot => f.write_str("?."),
            Self::Comma => f.write_str(","),
            Self::Assign => f.write_str("="),
            Self::Lt => f.write_str("<"),
            Self::Gt => f.write_str(">"),
            Self::Newline => f.write_str("\\n"),
            Self::Semi => f.write_str(";"),
            Self::Sym(sym) => f.write_str(sym),
        }
    }
}

/// A token with the 1-based line it starts on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub tok: Tok,
    pub line: usize,
}

/// A syntax error with its line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyntaxError {
    pub line: usize,
    pub message: String,
}

impl fmt::Display for SyntaxError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "line {}: {}", self.line, self.message)
    }
}

const OPERATOR_CHARS: &str = "=!<>+-*/%&|?:@#^~";

/// Split source text into tokens, dropping comments and insignificant whitespace.
///
/// # Errors
/// Returns an error for unterminated strings, character literals, or block comments.
pub fn tokenize(src: &str) -> Result<Vec<Token>, SyntaxError> {
    let chars: Vec<char> = src.chars().collect();
    let mut tokens = Vec::new();
    let mut line = 1usize;
    let mut i = 0usize;

    let at = |idx: usize| chars.get(idx).copied();

    while let Some(c) = at(i) {
        let start_line = line;
        match c {
            '\n' => {
                tokens.push(Token {
                    tok: Tok::Newline,
                    line,
                });
                line += 1;
                i += 1;
            }
            c if c.is_whitespace() => i += 1,
            '/' if at(i + 1) == Some('/') => {
                while at(i).is_some_and(|c| c != '\n') {
                    i += 1;
                }
            }
            '/' if at(i + 1) == Some('*') => {
                i += 2;
                loop {
                    match at(i) {
                        None => {
                            return Err(SyntaxError {
                                line: start_line,
                                message: "unterminated block comment".to_owned(),
                            })
                        }
                        Some('*') if at(i + 1) == Some('/') => {
                            i += 2;
                            break;
                        }
                        Some(ch) => {
                            if ch == '\n' {
                                line += 1;
                            }
                            i += 1;
                        }
                    }
                }
            }
            '"' if at(i + 1) == Some('"') && at(i + 2) == Some('"') => {
                i += 3;
                let mut value = String::new();
                loop {
                    match at(i) {
                        None => {
                            return Err(SyntaxError {
                                line: start_line,
                                message: "unterminated raw string".to_owned(),
                            })
                        }
                        Some('"') if at(i + 1) == Some('"') && at(i + 2) == Some('"') => {
                            i += 3;
                            break;
                        }
                        Some(ch) => {
                            if ch == '\n' {
                                line += 1;
                            }
                            value.push(ch);
                            i += 1;
                        }
                    }
                }
                tokens.push(Token {
                    tok: Tok::Str(value),
                    line: start_line,
                });
            }
            '"' => {
                i += 1;
                let mut value = String::new();
                loop {
                    match at(i) {
                        None | Some('\n') => {
                            return Err(SyntaxError {
                                line: start_line,
                                message: "unterminated string literal".to_owned(),
                            })
                        }
                        Some('"') => {
                            i += 1;
                            break;
                        }
                        Some('\\') => {
                            let escaped = match at(i + 1) {
                                Some('n') => '\n',
                                Some('t') => '\t',
                                Some('r') => '\r',
                                Some('0') => '\0',
                                Some(other) => other,
                                None => {
                                    return Err(SyntaxError {
                                        line: start_line,
                                        message: "unterminated string literal".to_owned(),
                                    })
                                }
                            };
                            value.push(escaped);
                            i += 2;
                        }
                        Some(ch) => {
                            value.push(ch);
                            i += 1;
                        }
                    }
                }
                tokens.push(Token {
                    tok: Tok::Str(value),
                    line: start_line,
                });
            }
            '\'' => {
                // Char literals only appear in expressions we keep as raw text.
                let close = (i + 1..chars.len().min(i + 4)).find(|&j| at(j) == Some('\''));
                let Some(close) = close else {
                    return Err(SyntaxError {
                        line,
                        message: "unterminated character literal".to_owned(),
                    });
                };
                let value: String = chars.get(i + 1..close).unwrap_or_default().iter().collect();
                tokens.push(Token {
                    tok: Tok::Str(value),
                    line,
                });
                i = close + 1;
            }
            '`' => {
                let start = i + 1;
                let mut end = start;
                while at(end).is_some_and(|ch| ch != '`' && ch != '\n') {
                    end += 1;
                }
                if at(end) != Some('`') {
                    return Err(SyntaxError {
                        line,
                        message: "unterminated backtick identifier".to_owned(),
                    });
                }
                let name: String = chars.get(start..end).unwrap_or_default().iter().collect();
                tokens.push(Token {
                    tok: Tok::Ident(name),
                    line,
                });
                i = end + 1;
            }
            c if c.is_ascii_digit() => {
                let start = i;
                while at(i).is_some_and(|ch| ch.is_ascii_alphanumeric() || ch == '_') {
                    i += 1;
                }
                let text: String = chars.get(start..i).unwrap_or_default().iter().collect();
                let digits: String = text
                    .trim_end_matches(['L', 'l'])
                    .chars()
                    .filter(|ch| *ch != '_')
                    .collect();
                let tok = match digits.parse::<i64>() {
                    Ok(value) => Tok::Int(value),
                    Err(_) => Tok::Sym(text),
                };
                tokens.push(Token { tok, line });
            }
            c if c.is_alphabetic() || c == '_' || c == '$' => {
                let start = i;
                while at(i).is_some_and(|ch| ch.is_alphanumeric() || ch == '_' || ch == '$') {
                    i += 1;
                }
                let name: String = chars.get(start..i).unwrap_or_default().iter().collect();
                tokens.push(Token {
                    tok: Tok::Ident(name),
                    line,
                });
            }
            '{' | '}' | '(' | ')' | '[' | ']' | ',' | ';' => {
                let tok = match c {
                    '{' => Tok::LBrace,
                    '}' => Tok::RBrace,
                    '(' => Tok::LParen,
                    ')' => Tok::RParen,
                    '[' => Tok::LBracket,
                    ']' => Tok::RBracket,
                    ',' => Tok::Comma,
                    _ => Tok::Semi,
                };
                tokens.push(Token { tok, line });
                i += 1;
            }
            '.' => {
                tokens.push(Token {
                    tok: Tok::Dot,
                    line,
                });
                i += 1;
            }
            '?' if at(i + 1) == Some('.') => {
                tokens.push(Token {
                    tok: Tok::SafeDot,
                    line,
                });
                i += 2;
            }
            c if OPERATOR_CHARS.contains(c) => {
                let start = i;
                while at(i).is_some_and(|ch| OPERATOR_CHARS.contains(ch)) {
                    i += 1;
                }
                let op: String = chars.get(start..i).unwrap_or_default().iter().collect();
                let tok = match op.as_str() {
                    "=" => Tok::Assign,
                    "<" => Tok::Lt,
                    ">" => Tok::Gt,
                    _ => Tok::Sym(op),
                };
                tokens.push(Token { tok, line });
            }
            other => {
                return Err(SyntaxError {
                    line,
                    message: format!("unexpected character `{other}`"),
                })
            }
        }
    }

    Ok(tokens)
}

/// An expression in the subset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expr {
    Ident(String),
    Str(String),
    Int(i64),
    Bool(bool),
    Null,
    /// `target.name` or `target?.name`.
    Member { target: Box<Expr>, name: String },
    /// `callee(args) { block }`; either part may be empty.
    Call {
        callee: Box<Expr>,
        args: Vec<Expr>,
        block: Option<Vec<Stmt>>,
    },
    /// `target[index]`.
    Index { target: Box<Expr>, index: Box<Expr> },
    /// `lhs op rhs` for identifier operators (`as`, `version`, `apply`) and `?:`.
    Infix {
        lhs: Box<Expr>,
        op: String,
        rhs: Box<Expr>,
    },
    /// Text of a construct outside the subset.
    Raw(String),
}

impl Expr {
    /// Dotted path of a plain member chain (`flutter.minSdkVersion`).
    pub fn dotted(&self) -> Option<String> {
        match self {
            Self::Ident(name) => Some(name.clone()),
            Self::Member { target, name } => target.dotted().map(|t| format!("{t}.{name}")),
            _ => None,
        }
    }

    /// Name of the function being called, if this is a call on a bare identifier.
    pub fn call_name(&self) -> Option<&str> {
        match self {
            Self::Call { callee, .. } => match callee.as_ref() {
                Self::Ident(name) => Some(name),
                _ => None,
            },
            _ => None,
        }
    }

    /// First argument if it is a string literal.
    pub fn first_str_arg(&self) -> Option<&str> {
        match self {
            Self::Call { args, .. } => match args.first() {
                Some(Self::Str(value)) => Some(value),
                _ => None,
            },
            _ => None,
        }
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ident(name) => f.write_str(name),
            Self::Str(value) => write!(f, "{value:?}"),
            Self::Int(value) => write!(f, "{value}"),
            Self::Bool(value) => write!(f, "{value}"),
            Self::Null => f.write_str("null"),
            Self::Member { target, name } => write!(f, "{target}.{name}"),
            Self::Call {
                callee,
                args,
                block,
            } => {
                write!(f, "{callee}(")?;
                for (idx, arg) in args.iter().enumerate() {
                    if idx > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{arg}")?;
                }
                f.write_str(")")?;
                if block.is_some() {
                    f.write_str(" { ... }")?;
                }
                Ok(())
            }
            Self::Index { target, index } => write!(f, "{target}[{index}]"),
            Self::Infix { lhs, op, rhs } => write!(f, "{lhs} {op} {rhs}"),
            Self::Raw(text) => f.write_str(text),
        }
    }
}

/// A statement and the line it starts on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stmt {
    pub kind: StmtKind,
    pub line: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StmtKind {
    Expr(Expr),
    /// `target = value`.
    Assign { target: Expr, value: Expr },
    /// `val name = value` / `var name = value`.
    Decl { name: String, value: Expr },
    /// `if (cond) { ... } else { ... }`; the condition is kept as text.
    If {
        condition: String,
        then_branch: Vec<Stmt>,
        else_branch: Vec<Stmt>,
    },
}

/// Parse a whole file into top-level statements.
///
/// # Errors
/// Returns an error for tokenizer failures, unbalanced braces or brackets, and
/// statements that start with a token no statement can start with.
pub fn parse(src: &str) -> Result<Vec<Stmt>, SyntaxError> {
    let tokens = tokenize(src)?;
    let mut parser = Parser {
        tokens,
        pos: 0,
        depth: 0,
    };
    let stmts = parser.statements()?;
    match parser.peek() {
        None => Ok(stmts),
        Some(token) => Err(SyntaxError {
            line: token.line,
            message: format!("unexpected `{}` at top level", token.tok),
        }),
    }
}

/// Combined statement and expression nesting accepted before parsing stops.
const MAX_DEPTH: usize = 128;

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    depth: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn peek_tok(&self) -> Option<&Tok> {
        self.peek().map(|t| &t.tok)
    }

    fn peek_tok_at(&self, offset: usize) -> Option<&Tok> {
        self.tokens.get(self.pos + offset).map(|t| &t.tok)
    }

    fn line(&self) -> usize {
        self.peek()
            .or_else(|| self.tokens.last())
            .map_or(1, |t| t.line)
    }

    fn bump(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn eat(&mut self, tok: &Tok) -> bool {
        if self.peek_tok() == Some(tok) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, tok: &Tok) -> Result<(), SyntaxError> {
        if self.eat(tok) {
            return Ok(());
        }
        let found = self
            .peek_tok()
            .map_or_else(|| "end of file".to_owned(), |t| format!("`{t}`"));
        Err(SyntaxError {
            line: self.line(),
            message: format!("expected `{tok}`, found {found}"),
        })
    }

    fn skip_separators(&mut self) {
        while matches!(self.peek_tok(), Some(Tok::Newline | Tok::Semi)) {
            self.pos += 1;
        }
    }

    fn skip_newlines(&mut self) {
        while matches!(self.peek_tok(), Some(Tok::Newline)) {
            self.pos += 1;
        }
    }

    /// Statements until `}` or end of input. The `}` is not consumed.
    fn statements(&mut self) -> Result<Vec<Stmt>, SyntaxError> {
        let mut stmts = Vec::new();
        loop {
            self.skip_separators();
            match self.peek_tok() {
                None | Some(Tok::RBrace) => return Ok(stmts),
                Some(_) => stmts.push(self.statement()?),
            }
        }
    }

    fn block(&mut self) -> Result<Vec<Stmt>, SyntaxError> {
        let open_line = self.line();
        self.expect(&Tok::LBrace)?;
        let stmts = self.statements()?;
        if !self.eat(&Tok::RBrace) {
            return Err(SyntaxError {
                line: open_line,
                message: "unclosed `{`".to_owned(),
            });
        }
        Ok(stmts)
    }

    fn nested<T>(
        &mut self,
        parse: impl FnOnce(&mut Self) -> Result<T, SyntaxError>,
    ) -> Result<T, SyntaxError> {
        if self.depth >= MAX_DEPTH {
            return Err(SyntaxError {
                line: self.line(),
                message: "blocks nested too deeply".to_owned(),
            });
        }
        self.depth = self.depth.saturating_add(1);
        let result = parse(self);
        self.depth = self.depth.saturating_sub(1);
        result
    }

    fn statement(&mut self) -> Result<Stmt, SyntaxError> {
        self.nested(Self::statement_inner)
    }

    fn statement_inner(&mut self) -> Result<Stmt, SyntaxError> {
        let line = self.line();
        let kind = match self.peek_tok() {
            Some(Tok::Ident(kw)) if kw == "val" || kw == "var" => {
                self.pos += 1;
                let name = match self.bump() {
                    Some(Token {
                        tok: Tok::Ident(name),
                        ..
                    }) => name,
                    _ => {
                        return Err(SyntaxError {
                            line,
                            message: "expected a name after `val`".to_owned(),
                        })
                    }
                };
                if self.eat(&Tok::Sym(":".to_owned())) {
                    self.type_ref();
                }
                self.expect(&Tok::Assign)?;
                let value = self.expr()?;
                StmtKind::Decl { name, value }
            }
            Some(Tok::Ident(kw)) if kw == "if" => self.if_statement()?,
            Some(Tok::Ident(kw)) if kw == "import" || kw == "package" => {
                let mut parts = Vec::new();
                while let Some(tok) = self.peek_tok() {
                    if matches!(tok, Tok::Newline | Tok::Semi) {
                        break;
                    }
                    parts.push(tok.to_string());
                    self.pos += 1;
                }
                StmtKind::Expr(Expr::Raw(parts.join(" ")))
            }
            Some(Tok::RParen | Tok::RBracket) => {
                return Err(SyntaxError {
                    line,
                    message: format!("unbalanced `{}`", self.peek_tok().map_or_else(String::new, ToString::to_string)),
                })
            }
            _ => {
                let target = self.expr()?;
                if self.eat(&Tok::Assign) {
                    let value = self.expr()?;
                    StmtKind::Assign { target, value }
                } else {
                    StmtKind::Expr(target)
                }
            }
        };
        Ok(Stmt { kind, line })
    }

    fn if_statement(&mut self) -> Result<StmtKind, SyntaxError> {
        self.pos += 1;
        self.expect(&Tok::LParen)?;
        let condition = self.raw_until_close(&Tok::RParen)?;
        self.skip_newlines();
        let then_branch = self.branch()?;
        let mut else_branch = Vec::new();
        let save = self.pos;
        self.skip_newlines();
        if matches!(self.peek_tok(), Some(Tok::Ident(kw)) if kw == "else") {
            self.pos += 1;
            self.skip_newlines();
            else_branch = if matches!(self.peek_tok(), Some(Tok::Ident(kw)) if kw == "if") {
                let line = self.line();
                vec![Stmt {
                    kind: self.if_statement()?,
                    line,
                }]
            } else {
                self.branch()?
            };
        } else {
            self.pos = save;
        }
        Ok(StmtKind::If {
            condition,
            then_branch,
            else_branch,
        })
    }

    fn branch(&mut self) -> Result<Vec<Stmt>, SyntaxError> {
        if self.peek_tok() == Some(&Tok::LBrace) {
            self.block()
        } else {
            Ok(vec![self.statement()?])
        }
    }

    /// Consume tokens up to the matching `close` and return them as text.
    fn raw_until_close(&mut self, close: &Tok) -> Result<String, SyntaxError> {
        let line = self.line();
        let mut depth = 0usize;
        let mut parts = Vec::new();
        loop {
            let Some(token) = self.bump() else {
                return Err(SyntaxError {
                    line,
                    message: format!("missing `{close}`"),
                });
            };
            match &token.tok {
                Tok::LParen | Tok::LBracket | Tok::LBrace => depth += 1,
                t if t == close && depth == 0 => return Ok(parts.join(" ")),
                Tok::RParen | Tok::RBracket | Tok::RBrace => depth = depth.saturating_sub(1),
                Tok::Newline => continue,
                _ => {}
            }
            parts.push(token.tok.to_string());
        }
    }

    /// Skip a type reference such as `Properties` or `Map<String, Any>`.
    fn type_ref(&mut self) {
        let mut depth = 0usize;
        while let Some(tok) = self.peek_tok() {
            match tok {
                Tok::Lt => depth += 1,
                Tok::Gt => depth = depth.saturating_sub(1),
                Tok::Ident(_) | Tok::Dot | Tok::Comma => {}
                Tok::Sym(s) if s == "?" => {}
                _ if depth > 0 => {}
                _ => return,
            }
            self.pos += 1;
            if depth == 0 && !matches!(self.peek_tok(), Some(Tok::Dot | Tok::Lt)) {
                if let Some(Tok::Sym(s)) = self.peek_tok() {
                    if s == "?" {
                        self.pos += 1;
                    }
                }
                return;
            }
        }
    }

    fn expr(&mut self) -> Result<Expr, SyntaxError> {
        self.nested(Self::expr_inner)
    }

    fn expr_inner(&mut self) -> Result<Expr, SyntaxError> {
        let mut lhs = self.postfix()?;
        loop {
            match self.peek_tok() {
                // Infix function calls: `id("x") version "1.0" apply false`, `x as String`.
                Some(Tok::Ident(op)) if is_infix_word(op) => {
                    let op = op.clone();
                    self.pos += 1;
                    if op == "as" || op == "is" {
                        // `as?` is a safe cast; the target type follows either way.
                        self.eat(&Tok::Sym("?".to_owned()));
                        let start = self.pos;
                        self.type_ref();
                        let ty: Vec<String> = self
                            .tokens
                            .get(start..self.pos)
                            .unwrap_or_default()
                            .iter()
                            .map(|t| t.tok.to_string())
                            .collect();
                        lhs = Expr::Infix {
                            lhs: Box::new(lhs),
                            op,
                            rhs: Box::new(Expr::Ident(ty.concat())),
                        };
                    } else {
                        let rhs = self.postfix()?;
                        lhs = Expr::Infix {
                            lhs: Box::new(lhs),
                            op,
                            rhs: Box::new(rhs),
                        };
                    }
                }
                Some(Tok::Sym(op)) if op == "?:" => {
                    let op = op.clone();
                    self.pos += 1;
                    self.skip_newlines();
                    let rhs = self.expr()?;
                    lhs = Expr::Infix {
                        lhs: Box::new(lhs),
                        op,
                        rhs: Box::new(rhs),
                    };
                }
                Some(Tok::Sym(_) | Tok::Lt | Tok::Gt) => {
                    let rest = self.raw_rest_of_expr();
                    return Ok(Expr::Raw(format!("{lhs} {rest}")));
                }
                _ => return Ok(lhs),
            }
        }
    }

    /// Collect the remainder of an expression (to the end of the line at depth 0).
    fn raw_rest_of_expr(&mut self) -> String {
        let mut depth = 0usize;
        let mut parts = Vec::new();
        while let Some(tok) = self.peek_tok() {
            match tok {
                Tok::Newline | Tok::Semi | Tok::Comma if depth == 0 => break,
                Tok::RParen | Tok::RBracket | Tok::RBrace if depth == 0 => break,
                Tok::LParen | Tok::LBracket | Tok::LBrace => depth += 1,
                Tok::RParen | Tok::RBracket | Tok::RBrace => depth -= 1,
                _ => {}
            }
            parts.push(tok.to_string());
            self.pos += 1;
        }
        parts.join(" ")
    }

    fn postfix(&mut self) -> Result<Expr, SyntaxError> {
        let mut expr = self.primary()?;
        loop {
            match self.peek_tok() {
                Some(Tok::Dot | Tok::SafeDot) => {
                    self.pos += 1;
                    self.skip_newlines();
                    match self.bump() {
                        Some(Token {
                            tok: Tok::Ident(name),
                            ..
                        }) => {
                            expr = Expr::Member {
                                target: Box::new(expr),
                                name,
                            };
                        }
                        other => {
                            return Err(SyntaxError {
                                line: other.as_ref().map_or(self.line(), |t| t.line),
                                message: "expected a member name after `.`".to_owned(),
                            })
                        }
                    }
                }
                // Explicit type arguments: `register<Delete>("clean")`.
                Some(Tok::Lt) if self.looks_like_type_args() => self.type_ref_args(),
                Some(Tok::LParen) => {
                    let args = self.call_args()?;
                    let block = if self.peek_tok() == Some(&Tok::LBrace) {
                        Some(self.lambda_block()?)
                    } else {
                        None
                    };
                    expr = Expr::Call {
                        callee: Box::new(expr),
                        args,
                        block,
                    };
                }
                Some(Tok::LBrace) => {
                    let block = self.lambda_block()?;
                    expr = Expr::Call {
                        callee: Box::new(expr),
                        args: Vec::new(),
                        block: Some(block),
                    };
                }
                Some(Tok::LBracket) => {
                    self.pos += 1;
                    let index = self.expr()?;
                    self.expect(&Tok::RBracket)?;
                    expr = Expr::Index {
                        target: Box::new(expr),
                        index: Box::new(index),
                    };
                }
                Some(Tok::Sym(s)) if s == "!!" => self.pos += 1,
                _ => return Ok(expr),
            }
        }
    }

    fn looks_like_type_args(&self) -> bool {
        let mut offset = 1;
        loop {
            match self.peek_tok_at(offset) {
                Some(Tok::Ident(_) | Tok::Dot | Tok::Comma) => offset += 1,
                Some(Tok::Gt) => return offset > 1,
                _ => return false,
            }
        }
    }

    fn type_ref_args(&mut self) {
        while let Some(tok) = self.bump() {
            if tok.tok == Tok::Gt {
                return;
            }
        }
    }

    /// A lambda body: `{ it -> ... }` parameters are skipped.
    fn lambda_block(&mut self) -> Result<Vec<Stmt>, SyntaxError> {
        let arrow = (1..6).find(|&offset| match self.peek_tok_at(offset) {
            Some(Tok::Sym(s)) => s == "->",
            _ => false,
        });
        let params_only = arrow.is_some_and(|a| {
            (1..a).all(|o| matches!(self.peek_tok_at(o), Some(Tok::Ident(_) | Tok::Comma)))
        });
        if let (Some(arrow), true) = (arrow, params_only) {
            let open_line = self.line();
            self.pos += arrow + 1;
            let stmts = self.statements()?;
            if !self.eat(&Tok::RBrace) {
                return Err(SyntaxError {
                    line: open_line,
                    message: "unclosed `{`".to_owned(),
                });
            }
            return Ok(stmts);
        }
        self.block()
    }

    fn call_args(&mut self) -> Result<Vec<Expr>, SyntaxError> {
        let open_line = self.line();
        self.expect(&Tok::LParen)?;
        let mut args = Vec::new();
        loop {
            self.skip_newlines();
            match self.peek_tok() {
                Some(Tok::RParen) => {
                    self.pos += 1;
                    return Ok(args);
                }
                None => {
                    return Err(SyntaxError {
                        line: open_line,
                        message: "unclosed `(`".to_owned(),
                    })
                }
                _ => {}
            }
            // Named argument: `name = value`.
            if matches!(self.peek_tok(), Some(Tok::Ident(_)))
                && self.peek_tok_at(1) == Some(&Tok::Assign)
            {
                self.pos += 2;
            }
            args.push(self.expr()?);
            self.skip_newlines();
            if !self.eat(&Tok::Comma) && self.peek_tok() != Some(&Tok::RParen) {
                let found = self
                    .peek_tok()
                    .map_or_else(|| "end of file".to_owned(), |t| format!("`{t}`"));
                return Err(SyntaxError {
                    line: self.line(),
                    message: format!("expected `,` or `)` in argument list, found {found}"),
                });
            }
        }
    }

    fn primary(&mut self) -> Result<Expr, SyntaxError> {
        let line = self.line();
        let Some(token) = self.bump() else {
            return Err(SyntaxError {
                line,
                message: "unexpected end of file".to_owned(),
            });
        };
        match token.tok {
            Tok::Ident(name) => Ok(match name.as_str() {
                "true" => Expr::Bool(true),
                "false" => Expr::Bool(false),
                "null" => Expr::Null,
                _ => Expr::Ident(name),
            }),
            Tok::Str(value) => Ok(Expr::Str(value)),
            Tok::Int(value) => Ok(Expr::Int(value)),
            Tok::LParen => {
                self.skip_newlines();
                let inner = self.expr()?;
                self.skip_newlines();
                self.expect(&Tok::RParen)?;
                Ok(inner)
            }
            Tok::Sym(op) if op == "-" => match self.peek_tok() {
                Some(Tok::Int(value)) => {
                    let value = -*value;
                    self.pos += 1;
                    Ok(Expr::Int(value))
                }
                _ => Ok(Expr::Raw(format!("- {}", self.raw_rest_of_expr()))),
            },
            Tok::Sym(op) if op == "!" || op == "@" => {
                let rest = self.raw_rest_of_expr();
                Ok(Expr::Raw(format!("{op}{rest}")))
            }
            other => Err(SyntaxError {
                line: token.line,
                message: format!("unexpected `{other}`"),
            }),
        }
    }
}

fn is_infix_word(word: &str) -> bool {
    matches!(word, "as" | "is" | "version" | "apply" | "to" | "until" | "in")
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn single(src: &str) -> StmtKind {
        let stmts = parse(src).unwrap();
        assert_eq!(stmts.len(), 1, "expected one statement in {src:?}: {stmts:?}");
        stmts.into_iter().next().unwrap().kind
    }

    #[test]
    fn tokenizes_strings_with_escapes() {
        let tokens = tokenize(r#"file("C:\\Users\\dev\\keys")"#).unwrap();
        assert!(tokens
            .iter()
            .any(|t| t.tok == Tok::Str("C:\\Users\\dev\\keys".to_owned())));
    }

    #[test]
    fn comments_are_dropped_but_lines_counted() {
        let tokens = tokenize("// a comment\n/* block\n comment */ namespace").unwrap();
        let ident = tokens
            .iter()
            .find(|t| t.tok == Tok::Ident("namespace".to_owned()))
            .unwrap();
        assert_eq!(ident.line, 3);
    }

    #[test]
    fn unterminated_string_reports_line() {
        let err = tokenize("\n\nnamespace = \"com.example").unwrap_err();
        assert_eq!(err.line, 3);
        assert!(err.message.contains("unterminated"));
    }

    #[test]
    fn unterminated_comment() {
        let err = tokenize("/* never closed").unwrap_err();
        assert!(err.message.contains("block comment"));
    }

    #[test]
    fn parses_assignment() {
        match single("compileSdk = 36") {
            StmtKind::Assign { target, value } => {
                assert_eq!(target, Expr::Ident("compileSdk".to_owned()));
                assert_eq!(value, Expr::Int(36));
            }
            other => panic!("expected assignment, got {other:?}"),
        }
    }

    #[test]
    fn parses_member_chain() {
        match single("minSdk = flutter.minSdkVersion") {
            StmtKind::Assign { value, .. } => {
                assert_eq!(value.dotted().as_deref(), Some("flutter.minSdkVersion"));
            }
            other => panic!("expected assignment, got {other:?}"),
        }
    }

    #[test]
    fn parses_nested_blocks() {
        let src = "android {\n    defaultConfig {\n        minSdk = 21\n    }\n}\n";
        match single(src) {
            StmtKind::Expr(Expr::Call { callee, block, .. }) => {
                assert_eq!(*callee, Expr::Ident("android".to_owned()));
                let inner = block.unwrap();
                assert_eq!(inner.len(), 1);
                assert_eq!(inner.first().unwrap().line, 2);
            }
            other => panic!("expected block call, got {other:?}"),
        }
    }

    #[test]
    fn parses_call_with_trailing_block() {
        match single("create(\"release\") {\n  keyAlias = \"key0\"\n}") {
            StmtKind::Expr(expr) => {
                assert_eq!(expr.call_name(), Some("create"));
                assert_eq!(expr.first_str_arg(), Some("release"));
            }
            other => panic!("expected call, got {other:?}"),
        }
    }

    #[test]
    fn parses_infix_plugin_declaration() {
        match single("id(\"com.android.application\") version \"8.7.0\" apply false") {
            StmtKind::Expr(Expr::Infix { lhs, op, rhs }) => {
                assert_eq!(op, "apply");
                assert_eq!(*rhs, Expr::Bool(false));
                assert!(matches!(*lhs, Expr::Infix { ref op, .. } if op == "version"));
            }
            other => panic!("expected infix, got {other:?}"),
        }
    }

    #[test]
    fn parses_index_with_cast() {
        match single("keyAlias = keystoreProperties[\"keyAlias\"] as String") {
            StmtKind::Assign {
                value: Expr::Infix { lhs, op, rhs },
                ..
            } => {
                assert_eq!(op, "as");
                assert_eq!(*rhs, Expr::Ident("String".to_owned()));
                assert!(matches!(*lhs, Expr::Index { .. }));
            }
            other => panic!("expected cast, got {other:?}"),
        }
    }

    #[test]
    fn parses_safe_call_let_lambda() {
        match single("storeFile = keystoreProperties[\"storeFile\"]?.let { file(it) }") {
            StmtKind::Assign {
                value: Expr::Call { callee, block, .. },
                ..
            } => {
                assert!(matches!(*callee, Expr::Member { ref name, .. } if name == "let"));
                assert_eq!(block.unwrap().len(), 1);
            }
            other => panic!("expected let call, got {other:?}"),
        }
    }

    #[test]
    fn parses_val_declaration_with_type() {
        match single("val keystoreProperties: Properties = Properties()") {
            StmtKind::Decl { name, value } => {
                assert_eq!(name, "keystoreProperties");
                assert_eq!(value.call_name(), Some("Properties"));
            }
            other => panic!("expected decl, got {other:?}"),
        }
    }

    #[test]
    fn parses_if_else() {
        let src = "if (f.exists()) {\n  a = 1\n} else {\n  a = 2\n}\nb = 3\n";
        let stmts = parse(src).unwrap();
        assert_eq!(stmts.len(), 2);
        match &stmts.first().unwrap().kind {
            StmtKind::If {
                condition,
                then_branch,
                else_branch,
            } => {
                assert!(condition.contains("exists"));
                assert_eq!(then_branch.len(), 1);
                assert_eq!(else_branch.len(), 1);
            }
            other => panic!("expected if, got {other:?}"),
        }
    }

    #[test]
    fn keeps_unknown_operators_as_raw() {
        match single("versionCode = 1 + 2") {
            StmtKind::Assign {
                value: Expr::Raw(text),
                ..
            } => assert!(text.contains('+')),
            other => panic!("expected raw, got {other:?}"),
        }
    }

    #[test]
    fn skips_generic_type_arguments() {
        match single("tasks.register<Delete>(\"clean\") {\n  delete(rootProject.layout.buildDirectory)\n}") {
            StmtKind::Expr(Expr::Call { args, block, .. }) => {
                assert_eq!(args, vec![Expr::Str("clean".to_owned())]);
                assert!(block.is_some());
            }
            other => panic!("expected call, got {other:?}"),
        }
    }

    #[test]
    fn unclosed_block_is_an_error() {
        let err = parse("android {\n  namespace = \"x\"\n").unwrap_err();
        assert_eq!(err.line, 1);
        assert!(err.message.contains("unclosed"));
    }

    #[test]
    fn stray_closing_brace_is_an_error() {
        let err = parse("android {}\n}\n").unwrap_err();
        assert_eq!(err.line, 2);
    }

    #[test]
    fn backtick_identifiers() {
        match single("`kotlin-android`") {
            StmtKind::Expr(Expr::Ident(name)) => assert_eq!(name, "kotlin-android"),
            other => panic!("expected ident, got {other:?}"),
        }
    }

    #[test]
    fn deep_nesting_is_an_error() {
        let src = format!("android {{{}{}}}", "x {".repeat(3000), "}".repeat(3000));
        let err = parse(&src).unwrap_err();
        assert_eq!(err.line, 1);
        assert_eq!(err.message, "blocks nested too deeply");

        let err = parse(&format!("val x = {}1{}", "(".repeat(5000), ")".repeat(5000))).unwrap_err();
        assert_eq!(err.message, "blocks nested too deeply");
    }

    #[test]
    fn ordinary_nesting_parses() {
        let src = format!("android {{\n{}{}}}\n", "x {\n".repeat(20), "}\n".repeat(20));
        assert_eq!(parse(&src).unwrap().len(), 1);
    }
}
