//! Canonical-form reader for Prism source text.
//!
//! Prism programs are uniformly-shaped calls `name(args...) { body }`
//! with bracketed transforms in front, so the front end stays small: a
//! hand-rolled lexer plus a recursive-descent pass that produces the
//! canonical [`Expr`] tree the validator consumes. Operator precedence,
//! rich sugar and include resolution live outside this crate; the only
//! rewrites performed here are the documented ones (`expr[i]` → `at`,
//! `if`/`else` envelopes, bare-integer promotion under the
//! `implicit-i32` text filter).

use crate::ast::{Definition, Expr, ExprKind, Import, Program, SourceLocation, StringEncoding};
use std::path::PathBuf;

/// Optional pre-parse toggles selected with `--text-filters` (plus the
/// `--no-transforms` switch, which disables sugar-level rewrites).
#[derive(Debug, Clone, Default)]
pub struct TextFilters {
    /// Accept bare and hex integer literals as `i32`.
    pub implicit_i32: bool,
    /// Reject sugar rewrites: bracket indexing and argument labels.
    pub no_sugar: bool,
}

impl TextFilters {
    /// Parse a `--text-filters` CSV (`default`, `implicit-i32`, with a
    /// `no-` prefix to disable).
    pub fn from_csv(csv: &str) -> Result<TextFilters, String> {
        let mut filters = TextFilters::default();
        for token in csv.split(',').map(str::trim).filter(|t| !t.is_empty()) {
            match token {
                "default" => {}
                "implicit-i32" => filters.implicit_i32 = true,
                "no-implicit-i32" => filters.implicit_i32 = false,
                other => return Err(format!("unknown text filter: {}", other)),
            }
        }
        Ok(filters)
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Tok {
    Ident(String),
    Int { value: i64, width: u8, unsigned: bool },
    Float { value: f64, single: bool },
    Str { text: String, encoding: StringEncoding },
    Bool(bool),
    LParen,
    RParen,
    LBrace,
    RBrace,
    LBracket,
    RBracket,
    Lt,
    Gt,
    Comma,
    Dot,
    Slash,
    Star,
}

#[derive(Debug, Clone)]
struct Token {
    tok: Tok,
    line: usize,
}

pub struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    file: PathBuf,
    no_sugar: bool,
}

impl Parser {
    pub fn new(source: &str, file: impl Into<PathBuf>, filters: &TextFilters) -> Result<Self, String> {
        let tokens = lex(source, filters)?;
        Ok(Parser {
            tokens,
            pos: 0,
            file: file.into(),
            no_sugar: filters.no_sugar,
        })
    }

    /// Parse a whole compilation unit.
    pub fn parse(&mut self) -> Result<Program, String> {
        let mut program = Program::new();
        let mut prefix = String::new();
        self.parse_scope_items(&mut program, &mut prefix, true)?;
        Ok(program)
    }

    fn parse_scope_items(
        &mut self,
        program: &mut Program,
        prefix: &mut String,
        top_level: bool,
    ) -> Result<(), String> {
        loop {
            match self.peek() {
                None => {
                    if top_level {
                        return Ok(());
                    }
                    return Err(self.err_here("unexpected end of input in namespace"));
                }
                Some(Tok::RBrace) if !top_level => {
                    self.advance();
                    return Ok(());
                }
                Some(Tok::Ident(name)) if name == "import" => {
                    self.advance();
                    self.parse_imports(program)?;
                }
                Some(Tok::Ident(name)) if name == "namespace" => {
                    self.advance();
                    let segment = self.expect_ident("namespace name")?;
                    self.expect(Tok::LBrace, "'{' after namespace name")?;
                    let saved = prefix.clone();
                    prefix.push('/');
                    prefix.push_str(&segment);
                    self.parse_scope_items(program, prefix, false)?;
                    *prefix = saved;
                }
                _ => {
                    let definition = self.parse_definition(prefix)?;
                    program.definitions.push(definition);
                }
            }
        }
    }

    fn parse_imports(&mut self, program: &mut Program) -> Result<(), String> {
        loop {
            let line = self.line();
            let path = self.parse_import_path()?;
            program.imports.push(Import {
                path,
                source: Some(SourceLocation::new(self.file.clone(), line)),
            });
            if matches!(self.peek(), Some(Tok::Comma)) {
                self.advance();
                continue;
            }
            // Whitespace-separated lists: another leading slash continues
            // the same directive.
            if matches!(self.peek(), Some(Tok::Slash)) {
                continue;
            }
            return Ok(());
        }
    }

    fn parse_import_path(&mut self) -> Result<String, String> {
        self.expect(Tok::Slash, "'/' to start import path")?;
        let mut path = String::from("/");
        loop {
            match self.peek() {
                Some(Tok::Ident(_)) => {
                    let segment = self.expect_ident("import path segment")?;
                    path.push_str(&segment);
                }
                Some(Tok::Star) => {
                    self.advance();
                    path.push('*');
                    return Ok(path);
                }
                _ => return Err(self.err_here("expected import path segment")),
            }
            if matches!(self.peek(), Some(Tok::Slash)) {
                self.advance();
                path.push('/');
                continue;
            }
            return Ok(path);
        }
    }

    fn parse_definition(&mut self, prefix: &str) -> Result<Definition, String> {
        let line = self.line();
        let transforms = if matches!(self.peek(), Some(Tok::LBracket)) {
            self.parse_transforms()?
        } else {
            Vec::new()
        };
        let name = self.expect_ident("definition name")?;
        let mut params = Vec::new();
        if matches!(self.peek(), Some(Tok::LParen)) {
            self.advance();
            while !matches!(self.peek(), Some(Tok::RParen)) {
                params.push(self.parse_parameter()?);
                if matches!(self.peek(), Some(Tok::Comma)) {
                    self.advance();
                }
            }
            self.expect(Tok::RParen, "')' after parameters")?;
        }
        self.expect(Tok::LBrace, "'{' to open definition body")?;
        let body = self.parse_statement_list()?;
        Ok(Definition {
            full_path: format!("{}/{}", prefix, name),
            name,
            params,
            body,
            transforms,
            source: Some(SourceLocation::new(self.file.clone(), line)),
        })
    }

    /// Parameters look like bindings without initializers:
    /// `[i32] x` or `[i32] x{0i32}` with a default.
    fn parse_parameter(&mut self) -> Result<Expr, String> {
        let line = self.line();
        let transforms = if matches!(self.peek(), Some(Tok::LBracket)) {
            self.parse_transforms()?
        } else {
            Vec::new()
        };
        let name = self.expect_ident("parameter name")?;
        let mut param = Expr {
            kind: ExprKind::Call,
            name,
            transforms,
            is_binding: true,
            source: Some(SourceLocation::new(self.file.clone(), line)),
            ..Expr::default()
        };
        if matches!(self.peek(), Some(Tok::LBrace)) {
            self.advance();
            param.args.push(self.parse_expr()?);
            self.expect(Tok::RBrace, "'}' after parameter default")?;
        }
        Ok(param)
    }

    fn parse_transforms(&mut self) -> Result<Vec<Expr>, String> {
        self.expect(Tok::LBracket, "'['")?;
        let mut transforms = Vec::new();
        while !matches!(self.peek(), Some(Tok::RBracket)) {
            transforms.push(self.parse_transform()?);
            if matches!(self.peek(), Some(Tok::Comma)) {
                self.advance();
            }
        }
        self.expect(Tok::RBracket, "']' to close transforms")?;
        Ok(transforms)
    }

    /// One transform: an identifier with optional `<...>` template
    /// arguments and optional `(...)` arguments.
    fn parse_transform(&mut self) -> Result<Expr, String> {
        let line = self.line();
        let name = self.expect_ident("transform name")?;
        let mut transform = Expr {
            kind: ExprKind::Name,
            name,
            source: Some(SourceLocation::new(self.file.clone(), line)),
            ..Expr::default()
        };
        if matches!(self.peek(), Some(Tok::Lt)) {
            transform.template_args = self.parse_template_args()?;
        }
        if matches!(self.peek(), Some(Tok::LParen)) {
            self.advance();
            transform.kind = ExprKind::Call;
            while !matches!(self.peek(), Some(Tok::RParen)) {
                transform.args.push(self.parse_expr()?);
                if matches!(self.peek(), Some(Tok::Comma)) {
                    self.advance();
                }
            }
            self.expect(Tok::RParen, "')' to close transform arguments")?;
        }
        Ok(transform)
    }

    fn parse_template_args(&mut self) -> Result<Vec<String>, String> {
        self.expect(Tok::Lt, "'<'")?;
        let mut args = Vec::new();
        loop {
            let mut arg = self.expect_ident("template argument")?;
            // Nested template types (`array<i32>` as a map value type).
            if matches!(self.peek(), Some(Tok::Lt)) {
                let nested = self.parse_template_args()?;
                arg.push('<');
                arg.push_str(&nested.join(","));
                arg.push('>');
            }
            args.push(arg);
            match self.peek() {
                Some(Tok::Comma) => {
                    self.advance();
                }
                Some(Tok::Gt) => {
                    self.advance();
                    return Ok(args);
                }
                _ => return Err(self.err_here("expected ',' or '>' in template arguments")),
            }
        }
    }

    fn parse_statement_list(&mut self) -> Result<Vec<Expr>, String> {
        let mut statements = Vec::new();
        while !matches!(self.peek(), Some(Tok::RBrace)) {
            if self.peek().is_none() {
                return Err(self.err_here("unexpected end of input in body"));
            }
            statements.push(self.parse_statement()?);
        }
        self.advance(); // consume '}'
        Ok(statements)
    }

    /// A statement is either a binding (`[type mods] name{init}`) or an
    /// expression, possibly with an `[effects(...)]` transform in front.
    pub fn parse_statement(&mut self) -> Result<Expr, String> {
        if matches!(self.peek(), Some(Tok::LBracket)) {
            let line = self.line();
            let transforms = self.parse_transforms()?;
            let name = self.expect_ident("binding or call name")?;
            if matches!(self.peek(), Some(Tok::LBrace)) {
                // Binding: name{initializer}
                self.advance();
                let initializer = self.parse_expr()?;
                self.expect(Tok::RBrace, "'}' after binding initializer")?;
                return Ok(Expr {
                    kind: ExprKind::Call,
                    name,
                    args: vec![initializer],
                    transforms,
                    is_binding: true,
                    source: Some(SourceLocation::new(self.file.clone(), line)),
                    ..Expr::default()
                });
            }
            // Transformed statement (effect masking etc.).
            let mut stmt = self.parse_call_tail(name, line)?;
            stmt.transforms = transforms;
            return Ok(stmt);
        }
        self.parse_expr()
    }

    pub fn parse_expr(&mut self) -> Result<Expr, String> {
        let mut expr = self.parse_primary()?;
        loop {
            match self.peek() {
                Some(Tok::Dot) => {
                    self.advance();
                    let line = self.line();
                    let name = self.expect_ident("method name")?;
                    let mut call = self.parse_call_tail(name, line)?;
                    call.is_method_call = true;
                    call.args.insert(0, expr);
                    expr = call;
                }
                Some(Tok::LBracket) => {
                    // A '[' on a later line starts the next statement's
                    // binding, not an index into this expression.
                    if !self.bracket_on_same_line() {
                        return Ok(expr);
                    }
                    if self.no_sugar {
                        return Err(self.err_here("index sugar disabled by --no-transforms"));
                    }
                    self.advance();
                    let index = self.parse_expr()?;
                    self.expect(Tok::RBracket, "']' to close index")?;
                    let line = self.line();
                    expr = Expr {
                        kind: ExprKind::Call,
                        name: "at".to_string(),
                        args: vec![expr, index],
                        source: Some(SourceLocation::new(self.file.clone(), line)),
                        ..Expr::default()
                    };
                }
                _ => return Ok(expr),
            }
        }
    }

    fn parse_primary(&mut self) -> Result<Expr, String> {
        let line = self.line();
        let token = self
            .next()
            .ok_or_else(|| "unexpected end of input in expression".to_string())?;
        match token {
            Tok::Int { value, width, unsigned } => Ok(Expr {
                kind: ExprKind::Literal,
                int_value: value,
                int_width: width,
                is_unsigned: unsigned,
                source: Some(SourceLocation::new(self.file.clone(), line)),
                ..Expr::default()
            }),
            Tok::Float { value, single } => Ok(Expr {
                kind: ExprKind::FloatLiteral,
                float_value: value,
                float_is_single: single,
                source: Some(SourceLocation::new(self.file.clone(), line)),
                ..Expr::default()
            }),
            Tok::Str { text, encoding } => Ok(Expr {
                kind: ExprKind::StringLiteral,
                name: text,
                string_encoding: encoding,
                source: Some(SourceLocation::new(self.file.clone(), line)),
                ..Expr::default()
            }),
            Tok::Bool(value) => Ok(Expr {
                kind: ExprKind::BoolLiteral,
                bool_value: value,
                source: Some(SourceLocation::new(self.file.clone(), line)),
                ..Expr::default()
            }),
            Tok::Slash => {
                // Absolute path: /ns/…/name optionally called.
                let mut segments = Vec::new();
                loop {
                    segments.push(self.expect_ident("path segment")?);
                    if matches!(self.peek(), Some(Tok::Slash)) {
                        self.advance();
                        continue;
                    }
                    break;
                }
                let name = segments.pop().unwrap_or_default();
                let prefix = if segments.is_empty() {
                    "/".to_string()
                } else {
                    format!("/{}", segments.join("/"))
                };
                let mut expr = self.parse_call_tail(name, line)?;
                expr.namespace_prefix = Some(prefix);
                Ok(expr)
            }
            Tok::Ident(name) => self.parse_call_tail(name, line),
            other => Err(format!(
                "at line {}: unexpected token {:?} in expression",
                line + 1,
                other
            )),
        }
    }

    /// Shared tail after an identifier: template args, call parentheses,
    /// brace continuations and `if`/`else` envelope assembly.
    fn parse_call_tail(&mut self, name: String, line: usize) -> Result<Expr, String> {
        let mut expr = Expr {
            kind: ExprKind::Name,
            name,
            source: Some(SourceLocation::new(self.file.clone(), line)),
            ..Expr::default()
        };
        if matches!(self.peek(), Some(Tok::Lt)) {
            expr.template_args = self.parse_template_args()?;
        }
        if matches!(self.peek(), Some(Tok::LParen)) {
            self.advance();
            expr.kind = ExprKind::Call;
            if expr.name == "lambda" {
                expr.is_lambda = true;
            }
            let mut labels: Vec<Option<String>> = Vec::new();
            let mut saw_label = false;
            while !matches!(self.peek(), Some(Tok::RParen)) {
                let label = self.try_parse_arg_label()?;
                saw_label |= label.is_some();
                labels.push(label);
                expr.args.push(self.parse_expr()?);
                if matches!(self.peek(), Some(Tok::Comma)) {
                    self.advance();
                }
            }
            self.expect(Tok::RParen, "')' to close arguments")?;
            if saw_label {
                expr.arg_names = Some(labels);
            }
        } else if !expr.template_args.is_empty() {
            // `name<T>` without parens only occurs in type position;
            // treat it as a call-shaped type expression with no args.
            expr.kind = ExprKind::Call;
        }
        if matches!(self.peek(), Some(Tok::LBrace)) {
            self.advance();
            expr.kind = ExprKind::Call;
            expr.body_arguments = self.parse_statement_list()?;
            expr.has_body_arguments = true;
        }
        if expr.name == "if" && expr.kind == ExprKind::Call && expr.has_body_arguments {
            return self.assemble_if(expr, line);
        }
        Ok(expr)
    }

    /// Rewrite `if(c) { … } else { … }` into the canonical
    /// `if(c, then_envelope, else_envelope)` shape.
    fn assemble_if(&mut self, mut expr: Expr, line: usize) -> Result<Expr, String> {
        let then_body = std::mem::take(&mut expr.body_arguments);
        expr.has_body_arguments = false;
        let mut else_body = Vec::new();
        if matches!(self.peek(), Some(Tok::Ident(name)) if name == "else") {
            self.advance();
            self.expect(Tok::LBrace, "'{' after else")?;
            else_body = self.parse_statement_list()?;
        }
        let envelope = |body: Vec<Expr>| Expr {
            kind: ExprKind::Call,
            body_arguments: body,
            has_body_arguments: true,
            source: Some(SourceLocation::new(self.file.clone(), line)),
            ..Expr::default()
        };
        expr.args.push(envelope(then_body));
        expr.args.push(envelope(else_body));
        Ok(expr)
    }

    /// A `[name]` label immediately before an argument expression. Only
    /// taken when the bracket holds a single identifier followed by a
    /// value token, so binding-style brackets elsewhere are unaffected.
    fn try_parse_arg_label(&mut self) -> Result<Option<String>, String> {
        if !matches!(self.peek(), Some(Tok::LBracket)) {
            return Ok(None);
        }
        let is_label = matches!(self.peek_at(1), Some(Tok::Ident(_)))
            && matches!(self.peek_at(2), Some(Tok::RBracket));
        if !is_label {
            return Ok(None);
        }
        if self.no_sugar {
            return Err(self.err_here("argument labels disabled by --no-transforms"));
        }
        self.advance();
        let label = self.expect_ident("argument label")?;
        self.expect(Tok::RBracket, "']' to close argument label")?;
        Ok(Some(label))
    }

    fn peek(&self) -> Option<&Tok> {
        self.tokens.get(self.pos).map(|t| &t.tok)
    }

    /// True when the upcoming token sits on the same line as the one just
    /// consumed.
    fn bracket_on_same_line(&self) -> bool {
        if self.pos == 0 {
            return true;
        }
        match (self.tokens.get(self.pos - 1), self.tokens.get(self.pos)) {
            (Some(prev), Some(next)) => prev.line == next.line,
            _ => false,
        }
    }

    fn peek_at(&self, offset: usize) -> Option<&Tok> {
        self.tokens.get(self.pos + offset).map(|t| &t.tok)
    }

    fn next(&mut self) -> Option<Tok> {
        let token = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        token.map(|t| t.tok)
    }

    fn advance(&mut self) {
        self.pos += 1;
    }

    fn line(&self) -> usize {
        self.tokens
            .get(self.pos.min(self.tokens.len().saturating_sub(1)))
            .map(|t| t.line)
            .unwrap_or(0)
    }

    fn expect(&mut self, expected: Tok, what: &str) -> Result<(), String> {
        match self.next() {
            Some(tok) if tok == expected => Ok(()),
            Some(tok) => Err(format!(
                "at line {}: expected {}, found {:?}",
                self.line() + 1,
                what,
                tok
            )),
            None => Err(format!("unexpected end of input, expected {}", what)),
        }
    }

    fn expect_ident(&mut self, what: &str) -> Result<String, String> {
        match self.next() {
            Some(Tok::Ident(name)) => Ok(name),
            Some(tok) => Err(format!(
                "at line {}: expected {}, found {:?}",
                self.line() + 1,
                what,
                tok
            )),
            None => Err(format!("unexpected end of input, expected {}", what)),
        }
    }

    fn err_here(&self, message: &str) -> String {
        format!("at line {}: {}", self.line() + 1, message)
    }
}

fn lex(source: &str, filters: &TextFilters) -> Result<Vec<Token>, String> {
    let mut tokens = Vec::new();
    let chars: Vec<char> = source.chars().collect();
    let mut i = 0usize;
    let mut line = 0usize;
    while i < chars.len() {
        let c = chars[i];
        match c {
            '\n' => {
                line += 1;
                i += 1;
            }
            ' ' | '\t' | '\r' => i += 1,
            '/' if chars.get(i + 1) == Some(&'/') => {
                while i < chars.len() && chars[i] != '\n' {
                    i += 1;
                }
            }
            '(' => push_simple(&mut tokens, Tok::LParen, line, &mut i),
            ')' => push_simple(&mut tokens, Tok::RParen, line, &mut i),
            '{' => push_simple(&mut tokens, Tok::LBrace, line, &mut i),
            '}' => push_simple(&mut tokens, Tok::RBrace, line, &mut i),
            '[' => push_simple(&mut tokens, Tok::LBracket, line, &mut i),
            ']' => push_simple(&mut tokens, Tok::RBracket, line, &mut i),
            '<' => push_simple(&mut tokens, Tok::Lt, line, &mut i),
            '>' => push_simple(&mut tokens, Tok::Gt, line, &mut i),
            ',' => push_simple(&mut tokens, Tok::Comma, line, &mut i),
            '.' if !chars.get(i + 1).is_some_and(|c| c.is_ascii_digit()) => {
                push_simple(&mut tokens, Tok::Dot, line, &mut i)
            }
            '/' => push_simple(&mut tokens, Tok::Slash, line, &mut i),
            '*' => push_simple(&mut tokens, Tok::Star, line, &mut i),
            '"' | '\'' => {
                let tok = lex_string(&chars, &mut i, &mut line, c)?;
                tokens.push(Token { tok, line });
            }
            '-' if chars.get(i + 1).is_some_and(|c| c.is_ascii_digit()) => {
                let tok = lex_number(&chars, &mut i, line, filters, true)?;
                tokens.push(Token { tok, line });
            }
            c if c.is_ascii_digit() || c == '.' => {
                let tok = lex_number(&chars, &mut i, line, filters, false)?;
                tokens.push(Token { tok, line });
            }
            c if c.is_ascii_alphabetic() || c == '_' => {
                let start = i;
                while i < chars.len() && (chars[i].is_ascii_alphanumeric() || chars[i] == '_') {
                    i += 1;
                }
                let word: String = chars[start..i].iter().collect();
                let tok = match word.as_str() {
                    "true" => Tok::Bool(true),
                    "false" => Tok::Bool(false),
                    _ => Tok::Ident(word),
                };
                tokens.push(Token { tok, line });
            }
            other => {
                return Err(format!(
                    "at line {}: unexpected character '{}'",
                    line + 1,
                    other
                ));
            }
        }
    }
    Ok(tokens)
}

fn push_simple(tokens: &mut Vec<Token>, tok: Tok, line: usize, i: &mut usize) {
    tokens.push(Token { tok, line });
    *i += 1;
}

fn lex_string(
    chars: &[char],
    i: &mut usize,
    line: &mut usize,
    quote: char,
) -> Result<Tok, String> {
    let start_line = *line;
    *i += 1;
    let mut raw = String::new();
    loop {
        let Some(&c) = chars.get(*i) else {
            return Err(format!("at line {}: unterminated string", start_line + 1));
        };
        *i += 1;
        if c == quote {
            break;
        }
        if c == '\n' {
            *line += 1;
        }
        if c == '\\' {
            if let Some(&escaped) = chars.get(*i) {
                *i += 1;
                raw.push('\\');
                raw.push(escaped);
                continue;
            }
            return Err(format!("at line {}: unterminated escape", start_line + 1));
        }
        raw.push(c);
    }
    // Mandatory encoding suffix.
    let start = *i;
    while *i < chars.len() && (chars[*i].is_ascii_alphanumeric() || chars[*i] == '_') {
        *i += 1;
    }
    let suffix: String = chars[start..*i].iter().collect();
    let encoding = match suffix.as_str() {
        "utf8" => StringEncoding::Utf8,
        "ascii" => StringEncoding::Ascii,
        "raw_utf8" => StringEncoding::RawUtf8,
        "raw_ascii" => StringEncoding::RawAscii,
        "" => StringEncoding::Utf8, // implicit utf8 text-filter sugar
        other => {
            return Err(format!(
                "at line {}: unknown string suffix '{}'",
                start_line + 1,
                other
            ));
        }
    };
    let text = match encoding {
        StringEncoding::RawUtf8 | StringEncoding::RawAscii => raw,
        _ => unescape(&raw, start_line)?,
    };
    Ok(Tok::Str { text, encoding })
}

fn unescape(raw: &str, line: usize) -> Result<String, String> {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('r') => out.push('\r'),
            Some('0') => out.push('\0'),
            Some('\\') => out.push('\\'),
            Some('"') => out.push('"'),
            Some('\'') => out.push('\''),
            Some(other) => {
                return Err(format!(
                    "at line {}: unknown escape '\\{}'",
                    line + 1,
                    other
                ));
            }
            None => return Err(format!("at line {}: unterminated escape", line + 1)),
        }
    }
    Ok(out)
}

fn lex_number(
    chars: &[char],
    i: &mut usize,
    line: usize,
    filters: &TextFilters,
    negative: bool,
) -> Result<Tok, String> {
    if negative {
        *i += 1;
    }
    // Hex literals are an implicit-i32 text filter feature.
    if chars.get(*i) == Some(&'0') && matches!(chars.get(*i + 1), Some('x') | Some('X')) {
        if !filters.implicit_i32 {
            return Err(format!(
                "at line {}: hex literals require the implicit-i32 text filter",
                line + 1
            ));
        }
        *i += 2;
        let start = *i;
        while *i < chars.len() && chars[*i].is_ascii_hexdigit() {
            *i += 1;
        }
        let digits: String = chars[start..*i].iter().collect();
        let value = i64::from_str_radix(&digits, 16)
            .map_err(|_| format!("at line {}: invalid hex literal", line + 1))?;
        let value = if negative { -value } else { value };
        return Ok(Tok::Int { value, width: 32, unsigned: false });
    }

    let start = *i;
    while *i < chars.len() && chars[*i].is_ascii_digit() {
        *i += 1;
    }
    let mut is_float = false;
    if chars.get(*i) == Some(&'.') && chars.get(*i + 1).is_some_and(|c| c.is_ascii_digit()) {
        is_float = true;
        *i += 1;
        while *i < chars.len() && chars[*i].is_ascii_digit() {
            *i += 1;
        }
    }
    let digits: String = chars[start..*i].iter().collect();

    // Suffix.
    let suffix_start = *i;
    while *i < chars.len() && (chars[*i].is_ascii_alphanumeric() || chars[*i] == '_') {
        *i += 1;
    }
    let suffix: String = chars[suffix_start..*i].iter().collect();

    match suffix.as_str() {
        "i32" | "i64" => {
            if is_float {
                return Err(format!(
                    "at line {}: integer suffix on float literal",
                    line + 1
                ));
            }
            let value: i64 = digits
                .parse()
                .map_err(|_| format!("at line {}: invalid integer literal", line + 1))?;
            let value = if negative { -value } else { value };
            Ok(Tok::Int {
                value,
                width: if suffix == "i32" { 32 } else { 64 },
                unsigned: false,
            })
        }
        "u64" => {
            if is_float || negative {
                return Err(format!("at line {}: invalid u64 literal", line + 1));
            }
            let value: u64 = digits
                .parse()
                .map_err(|_| format!("at line {}: invalid integer literal", line + 1))?;
            Ok(Tok::Int {
                value: value as i64,
                width: 64,
                unsigned: true,
            })
        }
        "f" | "f64" | "f32" => {
            let value: f64 = digits
                .parse()
                .map_err(|_| format!("at line {}: invalid float literal", line + 1))?;
            let value = if negative { -value } else { value };
            Ok(Tok::Float {
                value,
                single: suffix == "f32",
            })
        }
        "" => {
            if is_float {
                return Err(format!(
                    "at line {}: float literal requires f/f32/f64 suffix",
                    line + 1
                ));
            }
            if !filters.implicit_i32 {
                return Err(format!(
                    "at line {}: integer literal requires i32/i64/u64 suffix",
                    line + 1
                ));
            }
            let value: i64 = digits
                .parse()
                .map_err(|_| format!("at line {}: invalid integer literal", line + 1))?;
            let value = if negative { -value } else { value };
            Ok(Tok::Int { value, width: 32, unsigned: false })
        }
        other => Err(format!(
            "at line {}: unknown numeric suffix '{}'",
            line + 1,
            other
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::ExprKind;

    fn parse(source: &str) -> Program {
        Parser::new(source, "test.prism", &TextFilters::default())
            .unwrap()
            .parse()
            .unwrap()
    }

    #[test]
    fn test_parses_simple_main() {
        let program = parse("[return<int>]\nmain() {\n  return(7i32)\n}\n");
        assert_eq!(program.definitions.len(), 1);
        let main = &program.definitions[0];
        assert_eq!(main.full_path, "/main");
        assert_eq!(main.declared_return_type(), Some("int"));
        assert_eq!(main.body.len(), 1);
        assert!(main.body[0].is_simple_call("return"));
        assert_eq!(main.body[0].args[0].int_value, 7);
        assert_eq!(main.body[0].args[0].int_width, 32);
    }

    #[test]
    fn test_parses_binding_and_index_sugar() {
        let program = parse(
            "[return<int>]\nmain() {\n  [array<i32>] v{array<i32>(4i32, 7i32)}\n  return(v[1i32])\n}\n",
        );
        let main = &program.definitions[0];
        let binding = &main.body[0];
        assert!(binding.is_binding);
        assert_eq!(binding.name, "v");
        assert_eq!(binding.transforms[0].name, "array");
        assert_eq!(binding.transforms[0].template_args, vec!["i32"]);
        let ret = &main.body[1];
        let index = &ret.args[0];
        assert!(index.is_simple_call("at"));
        assert_eq!(index.args[0].name, "v");
        assert_eq!(index.args[1].int_value, 1);
    }

    #[test]
    fn test_parses_if_else_envelopes() {
        let program = parse(
            "[return<int>]\nmain() {\n  if(true) {\n    return(1i32)\n  } else {\n    return(2i32)\n  }\n}\n",
        );
        let stmt = &program.definitions[0].body[0];
        assert!(stmt.is_simple_call("if"));
        assert_eq!(stmt.args.len(), 3);
        assert!(stmt.args[1].has_body_arguments);
        assert!(stmt.args[2].has_body_arguments);
        assert_eq!(stmt.args[1].body_arguments.len(), 1);
    }

    #[test]
    fn test_parses_if_without_else() {
        let program = parse("main() {\n  if(true) {\n    print(1i32)\n  }\n}\n");
        let stmt = &program.definitions[0].body[0];
        assert_eq!(stmt.args.len(), 3);
        assert!(stmt.args[2].body_arguments.is_empty());
    }

    #[test]
    fn test_parses_method_calls_and_strings() {
        let program = parse("[return<int>]\nmain() {\n  return(\"hey\"utf8.count())\n}\n");
        let call = &program.definitions[0].body[0].args[0];
        assert!(call.is_method_call);
        assert_eq!(call.name, "count");
        assert_eq!(call.args[0].kind, ExprKind::StringLiteral);
        assert_eq!(call.args[0].name, "hey");
    }

    #[test]
    fn test_parses_imports_and_namespaces() {
        let program = parse(
            "import /math/*\nimport /util, /extra\nnamespace util {\n[return<int>]\ndouble([i32] x) { return(multiply(x, 2i32)) }\n}\n",
        );
        assert_eq!(program.imports.len(), 3);
        assert_eq!(program.imports[0].path, "/math/*");
        assert_eq!(program.imports[1].path, "/util");
        assert_eq!(program.imports[2].path, "/extra");
        assert_eq!(program.definitions[0].full_path, "/util/double");
        assert_eq!(program.definitions[0].params.len(), 1);
    }

    #[test]
    fn test_parses_qualified_call() {
        let program = parse("[return<int>]\nmain() {\n  return(/util/double(3i32))\n}\n");
        let call = &program.definitions[0].body[0].args[0];
        assert_eq!(call.name, "double");
        assert_eq!(call.namespace_prefix.as_deref(), Some("/util"));
    }

    #[test]
    fn test_rejects_bare_integers_without_filter() {
        let err = Parser::new("main() { return(7) }", "t.prism", &TextFilters::default())
            .unwrap()
            .parse()
            .unwrap_err();
        assert!(err.contains("i32/i64/u64 suffix"), "got {err}");
    }

    #[test]
    fn test_implicit_i32_filter() {
        let filters = TextFilters {
            implicit_i32: true,
            ..TextFilters::default()
        };
        let program = Parser::new(
            "[return<int>] main() { return(0x10) }",
            "t.prism",
            &filters,
        )
        .unwrap()
        .parse()
        .unwrap();
        assert_eq!(program.definitions[0].body[0].args[0].int_value, 16);
    }

    #[test]
    fn test_parses_float_and_unsigned_literals() {
        let program = parse(
            "main() {\n  [f64] a{1.5f64}\n  [f32] b{2.0f32}\n  [u64] c{9u64}\n  [i64] d{-3i64}\n}\n",
        );
        let body = &program.definitions[0].body;
        assert_eq!(body[0].args[0].float_value, 1.5);
        assert!(!body[0].args[0].float_is_single);
        assert!(body[1].args[0].float_is_single);
        assert!(body[2].args[0].is_unsigned);
        assert_eq!(body[3].args[0].int_value, -3);
    }

    #[test]
    fn test_parses_effects_transform_on_statement() {
        let program = parse(
            "main() {\n  [effects(io_out)] print_line(\"x\"utf8)\n}\n",
        );
        let stmt = &program.definitions[0].body[0];
        assert_eq!(stmt.transforms.len(), 1);
        assert_eq!(stmt.transforms[0].name, "effects");
        assert_eq!(stmt.transforms[0].args[0].name, "io_out");
    }
}
