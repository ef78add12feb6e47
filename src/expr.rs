//! A small, closed expression language for guards and templates.
//!
//! Supported forms: attribute paths over selector results
//! (`diff.total`, `title.groups[0]`, `diff.files["src/lib.rs"].net`),
//! comparisons, short-circuiting `and`/`or`/`not`, literals, and calls to
//! named predicates resolved through a lexical scope chain. There is no host
//! code execution, I/O, or assignment.
//!
//! A bare selector name evaluates to whether that selector fired in the
//! current binding combination; accessing a *field* of an absent selector is
//! a hard `EvalError`. Definitions must guard mutually-exclusive selectors
//! with boolean logic before dereferencing them.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::error::EvalError;
use crate::selectors::SelectorResult;

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Bool(bool),
    Int(i64),
    Str(String),
    Seq(Vec<Value>),
    Map(BTreeMap<String, Value>),
}

impl Value {
    pub fn truthy(&self) -> bool {
        match self {
            Value::Bool(b) => *b,
            Value::Int(n) => *n != 0,
            Value::Str(s) => !s.is_empty(),
            Value::Seq(v) => !v.is_empty(),
            Value::Map(m) => !m.is_empty(),
        }
    }

    /// String form used when substituting template references.
    pub fn render(&self) -> String {
        match self {
            Value::Bool(b) => b.to_string(),
            Value::Int(n) => n.to_string(),
            Value::Str(s) => s.clone(),
            Value::Seq(v) => v
                .iter()
                .map(Value::render)
                .collect::<Vec<_>>()
                .join(", "),
            Value::Map(m) => m
                .iter()
                .map(|(k, v)| format!("{}={}", k, v.render()))
                .collect::<Vec<_>>()
                .join(", "),
        }
    }

    fn type_name(&self) -> &'static str {
        match self {
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Str(_) => "string",
            Value::Seq(_) => "sequence",
            Value::Map(_) => "map",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathSeg {
    Key(String),
    Index(usize),
}

pub fn path_to_string(segs: &[PathSeg]) -> String {
    let mut out = String::new();
    for (i, seg) in segs.iter().enumerate() {
        match seg {
            PathSeg::Key(k) => {
                if i > 0 {
                    out.push('.');
                }
                out.push_str(k);
            }
            PathSeg::Index(n) => {
                out.push('[');
                out.push_str(&n.to_string());
                out.push(']');
            }
        }
    }
    out
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Lit(Value),
    Path(Vec<PathSeg>),
    Not(Box<Expr>),
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
    Cmp(CmpOp, Box<Expr>, Box<Expr>),
    Call(String, Vec<Expr>),
}

// ---------------------------------------------------------------------------
// Lexer
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
enum Tok {
    Ident(String),
    Int(i64),
    Str(String),
    LParen,
    RParen,
    LBracket,
    RBracket,
    Dot,
    Comma,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl fmt::Display for Tok {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Tok::Ident(s) => write!(f, "{s}"),
            Tok::Int(n) => write!(f, "{n}"),
            Tok::Str(s) => write!(f, "{s:?}"),
            Tok::LParen => write!(f, "("),
            Tok::RParen => write!(f, ")"),
            Tok::LBracket => write!(f, "["),
            Tok::RBracket => write!(f, "]"),
            Tok::Dot => write!(f, "."),
            Tok::Comma => write!(f, ","),
            Tok::Eq => write!(f, "=="),
            Tok::Ne => write!(f, "!="),
            Tok::Lt => write!(f, "<"),
            Tok::Le => write!(f, "<="),
            Tok::Gt => write!(f, ">"),
            Tok::Ge => write!(f, ">="),
        }
    }
}

fn lex(src: &str) -> Result<Vec<Tok>, EvalError> {
    let mut toks = Vec::new();
    let mut chars = src.chars().peekable();
    while let Some(&c) = chars.peek() {
        match c {
            ' ' | '\t' | '\n' | '\r' => {
                chars.next();
            }
            '(' => {
                chars.next();
                toks.push(Tok::LParen);
            }
            ')' => {
                chars.next();
                toks.push(Tok::RParen);
            }
            '[' => {
                chars.next();
                toks.push(Tok::LBracket);
            }
            ']' => {
                chars.next();
                toks.push(Tok::RBracket);
            }
            '.' => {
                chars.next();
                toks.push(Tok::Dot);
            }
            ',' => {
                chars.next();
                toks.push(Tok::Comma);
            }
            '=' => {
                chars.next();
                if chars.peek() == Some(&'=') {
                    chars.next();
                    toks.push(Tok::Eq);
                } else {
                    return Err(EvalError::Syntax("single '=' is not an operator".into()));
                }
            }
            '!' => {
                chars.next();
                if chars.peek() == Some(&'=') {
                    chars.next();
                    toks.push(Tok::Ne);
                } else {
                    return Err(EvalError::Syntax("expected '=' after '!'".into()));
                }
            }
            '<' => {
                chars.next();
                if chars.peek() == Some(&'=') {
                    chars.next();
                    toks.push(Tok::Le);
                } else {
                    toks.push(Tok::Lt);
                }
            }
            '>' => {
                chars.next();
                if chars.peek() == Some(&'=') {
                    chars.next();
                    toks.push(Tok::Ge);
                } else {
                    toks.push(Tok::Gt);
                }
            }
            '\'' | '"' => {
                let quote = c;
                chars.next();
                let mut s = String::new();
                let mut closed = false;
                while let Some(c2) = chars.next() {
                    if c2 == quote {
                        closed = true;
                        break;
                    }
                    if c2 == '\\' {
                        match chars.next() {
                            Some(esc) => s.push(esc),
                            None => break,
                        }
                    } else {
                        s.push(c2);
                    }
                }
                if !closed {
                    return Err(EvalError::Syntax("unterminated string literal".into()));
                }
                toks.push(Tok::Str(s));
            }
            '-' | '0'..='9' => {
                let negative = c == '-';
                if negative {
                    chars.next();
                }
                let mut digits = String::new();
                while let Some(&d) = chars.peek() {
                    if d.is_ascii_digit() {
                        digits.push(d);
                        chars.next();
                    } else {
                        break;
                    }
                }
                if digits.is_empty() {
                    return Err(EvalError::Syntax("expected digits after '-'".into()));
                }
                let mut n: i64 = digits
                    .parse()
                    .map_err(|_| EvalError::Syntax(format!("invalid integer '{digits}'")))?;
                if negative {
                    n = -n;
                }
                toks.push(Tok::Int(n));
            }
            c if c.is_ascii_alphabetic() || c == '_' => {
                let mut ident = String::new();
                while let Some(&d) = chars.peek() {
                    if d.is_ascii_alphanumeric() || d == '_' {
                        ident.push(d);
                        chars.next();
                    } else {
                        break;
                    }
                }
                toks.push(Tok::Ident(ident));
            }
            other => {
                return Err(EvalError::Syntax(format!("unexpected character '{other}'")));
            }
        }
    }
    Ok(toks)
}

// ---------------------------------------------------------------------------
// Parser (recursive descent; or < and < not < comparison < primary)
// ---------------------------------------------------------------------------

struct Parser {
    toks: Vec<Tok>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Tok> {
        self.toks.get(self.pos)
    }

    fn next(&mut self) -> Option<Tok> {
        let t = self.toks.get(self.pos).cloned();
        if t.is_some() {
            self.pos += 1;
        }
        t
    }

    fn expect(&mut self, tok: &Tok) -> Result<(), EvalError> {
        match self.next() {
            Some(t) if &t == tok => Ok(()),
            Some(t) => Err(EvalError::Syntax(format!("expected '{tok}', got '{t}'"))),
            None => Err(EvalError::Syntax(format!(
                "expected '{tok}', got end of expression"
            ))),
        }
    }

    fn or_expr(&mut self) -> Result<Expr, EvalError> {
        let mut left = self.and_expr()?;
        while matches!(self.peek(), Some(Tok::Ident(k)) if k == "or") {
            self.next();
            let right = self.and_expr()?;
            left = Expr::Or(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn and_expr(&mut self) -> Result<Expr, EvalError> {
        let mut left = self.not_expr()?;
        while matches!(self.peek(), Some(Tok::Ident(k)) if k == "and") {
            self.next();
            let right = self.not_expr()?;
            left = Expr::And(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn not_expr(&mut self) -> Result<Expr, EvalError> {
        if matches!(self.peek(), Some(Tok::Ident(k)) if k == "not") {
            self.next();
            let inner = self.not_expr()?;
            return Ok(Expr::Not(Box::new(inner)));
        }
        self.comparison()
    }

    fn comparison(&mut self) -> Result<Expr, EvalError> {
        let left = self.primary()?;
        let op = match self.peek() {
            Some(Tok::Eq) => CmpOp::Eq,
            Some(Tok::Ne) => CmpOp::Ne,
            Some(Tok::Lt) => CmpOp::Lt,
            Some(Tok::Le) => CmpOp::Le,
            Some(Tok::Gt) => CmpOp::Gt,
            Some(Tok::Ge) => CmpOp::Ge,
            _ => return Ok(left),
        };
        self.next();
        let right = self.primary()?;
        Ok(Expr::Cmp(op, Box::new(left), Box::new(right)))
    }

    fn primary(&mut self) -> Result<Expr, EvalError> {
        match self.next() {
            Some(Tok::Int(n)) => Ok(Expr::Lit(Value::Int(n))),
            Some(Tok::Str(s)) => Ok(Expr::Lit(Value::Str(s))),
            Some(Tok::LParen) => {
                let inner = self.or_expr()?;
                self.expect(&Tok::RParen)?;
                Ok(inner)
            }
            Some(Tok::Ident(name)) => match name.as_str() {
                "true" => Ok(Expr::Lit(Value::Bool(true))),
                "false" => Ok(Expr::Lit(Value::Bool(false))),
                _ => {
                    if self.peek() == Some(&Tok::LParen) {
                        self.next();
                        let mut args = Vec::new();
                        if self.peek() != Some(&Tok::RParen) {
                            loop {
                                args.push(self.or_expr()?);
                                match self.peek() {
                                    Some(Tok::Comma) => {
                                        self.next();
                                    }
                                    _ => break,
                                }
                            }
                        }
                        self.expect(&Tok::RParen)?;
                        Ok(Expr::Call(name, args))
                    } else {
                        self.path(name)
                    }
                }
            },
            Some(t) => Err(EvalError::Syntax(format!("unexpected token '{t}'"))),
            None => Err(EvalError::Syntax("unexpected end of expression".into())),
        }
    }

    fn path(&mut self, root: String) -> Result<Expr, EvalError> {
        let mut segs = vec![PathSeg::Key(root)];
        loop {
            match self.peek() {
                Some(Tok::Dot) => {
                    self.next();
                    match self.next() {
                        Some(Tok::Ident(k)) => segs.push(PathSeg::Key(k)),
                        other => {
                            return Err(EvalError::Syntax(format!(
                                "expected field name after '.', got {other:?}"
                            )))
                        }
                    }
                }
                Some(Tok::LBracket) => {
                    self.next();
                    match self.next() {
                        Some(Tok::Int(n)) if n >= 0 => segs.push(PathSeg::Index(n as usize)),
                        Some(Tok::Str(s)) => segs.push(PathSeg::Key(s)),
                        other => {
                            return Err(EvalError::Syntax(format!(
                                "expected index or key inside '[]', got {other:?}"
                            )))
                        }
                    }
                    self.expect(&Tok::RBracket)?;
                }
                _ => break,
            }
        }
        Ok(Expr::Path(segs))
    }
}

/// Parse one expression. Guard and `__defs__` bodies are parsed at
/// compile time so syntax errors surface as configuration errors.
pub fn parse(src: &str) -> Result<Expr, EvalError> {
    let toks = lex(src)?;
    if toks.is_empty() {
        return Err(EvalError::Syntax("empty expression".into()));
    }
    let mut parser = Parser { toks, pos: 0 };
    let expr = parser.or_expr()?;
    if parser.pos != parser.toks.len() {
        return Err(EvalError::Syntax(format!(
            "trailing input after expression: '{}'",
            parser.toks[parser.pos..]
                .iter()
                .map(|t| t.to_string())
                .collect::<Vec<_>>()
                .join(" ")
        )));
    }
    Ok(expr)
}

// ---------------------------------------------------------------------------
// Predicate scopes
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
/// One named predicate: parameter names plus a parsed body.
pub struct Predicate {
    pub params: Vec<String>,
    pub body: Expr,
}

#[derive(Debug, Default)]
/// Lexical predicate scope. Each `__defs__` level in the configuration tree
/// becomes one link in the chain; lookups walk outward, so inner definitions
/// shadow outer ones. A predicate body resolves names starting at the level
/// where that predicate was defined, not the caller's level.
pub struct Scope {
    defs: BTreeMap<String, Predicate>,
    parent: Option<Arc<Scope>>,
}

impl Scope {
    pub fn root() -> Arc<Scope> {
        Arc::new(Scope::default())
    }

    pub fn child(parent: Arc<Scope>, defs: BTreeMap<String, Predicate>) -> Arc<Scope> {
        Arc::new(Scope {
            defs,
            parent: Some(parent),
        })
    }

    /// Resolve a predicate name, returning the definition and the scope
    /// level it was found at (the def-site scope for body evaluation).
    pub fn resolve(self: &Arc<Scope>, name: &str) -> Option<(Predicate, Arc<Scope>)> {
        let mut cur = self.clone();
        loop {
            if let Some(p) = cur.defs.get(name) {
                return Some((p.clone(), cur.clone()));
            }
            match cur.parent.clone() {
                Some(parent) => cur = parent,
                None => return None,
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Evaluation
// ---------------------------------------------------------------------------

/// Binding environment for one evaluation: the selector-result combination
/// currently being expanded, the predicate scope, and any predicate-call
/// parameter bindings.
pub struct Env<'a> {
    pub slots: &'a BTreeMap<String, Option<&'a SelectorResult>>,
    pub scope: &'a Arc<Scope>,
    locals: BTreeMap<String, Value>,
}

impl<'a> Env<'a> {
    pub fn new(
        slots: &'a BTreeMap<String, Option<&'a SelectorResult>>,
        scope: &'a Arc<Scope>,
    ) -> Self {
        Env {
            slots,
            scope,
            locals: BTreeMap::new(),
        }
    }
}

pub fn eval(expr: &Expr, env: &Env) -> Result<Value, EvalError> {
    match expr {
        Expr::Lit(v) => Ok(v.clone()),
        Expr::Path(segs) => eval_path(segs, env),
        Expr::Not(inner) => Ok(Value::Bool(!eval(inner, env)?.truthy())),
        Expr::And(l, r) => {
            if !eval(l, env)?.truthy() {
                return Ok(Value::Bool(false));
            }
            Ok(Value::Bool(eval(r, env)?.truthy()))
        }
        Expr::Or(l, r) => {
            if eval(l, env)?.truthy() {
                return Ok(Value::Bool(true));
            }
            Ok(Value::Bool(eval(r, env)?.truthy()))
        }
        Expr::Cmp(op, l, r) => compare(*op, &eval(l, env)?, &eval(r, env)?),
        Expr::Call(name, args) => {
            let mut vals = Vec::with_capacity(args.len());
            for arg in args {
                vals.push(eval(arg, env)?);
            }
            call(name, vals, env)
        }
    }
}

fn eval_path(segs: &[PathSeg], env: &Env) -> Result<Value, EvalError> {
    let full = path_to_string(segs);
    let root = match &segs[0] {
        PathSeg::Key(k) => k,
        PathSeg::Index(_) => {
            return Err(EvalError::Syntax("path cannot start with an index".into()))
        }
    };

    if let Some(local) = env.locals.get(root) {
        return traverse_value(local, &segs[1..], &full);
    }

    match env.slots.get(root) {
        Some(Some(result)) => {
            if segs.len() == 1 {
                return Ok(Value::Bool(result.matched));
            }
            result.lookup(&segs[1..], &full)
        }
        // Absent selector: bare reference is the documented guard hook and
        // reads false; any field access is a hard evaluation error.
        Some(None) => {
            if segs.len() == 1 {
                Ok(Value::Bool(false))
            } else {
                Err(EvalError::UnresolvedReference { path: full })
            }
        }
        None => Err(EvalError::UnresolvedReference { path: full }),
    }
}

/// Generic traversal used for predicate parameters bound to plain values.
fn traverse_value(value: &Value, segs: &[PathSeg], full: &str) -> Result<Value, EvalError> {
    let mut cur = value.clone();
    for seg in segs {
        cur = match (seg, &cur) {
            (PathSeg::Key(k), Value::Map(m)) => match m.get(k) {
                Some(v) => v.clone(),
                None => {
                    return Err(EvalError::UnresolvedReference {
                        path: full.to_string(),
                    })
                }
            },
            (PathSeg::Index(i), Value::Seq(v)) => match v.get(*i) {
                Some(item) => item.clone(),
                None => {
                    return Err(EvalError::IndexOutOfRange {
                        path: full.to_string(),
                        index: *i,
                    })
                }
            },
            _ => {
                return Err(EvalError::Type(format!(
                    "cannot traverse into {} at '{}'",
                    cur.type_name(),
                    full
                )))
            }
        };
    }
    Ok(cur)
}

fn compare(op: CmpOp, left: &Value, right: &Value) -> Result<Value, EvalError> {
    use std::cmp::Ordering;
    let ord = match (left, right) {
        (Value::Int(a), Value::Int(b)) => a.cmp(b),
        (Value::Str(a), Value::Str(b)) => a.cmp(b),
        (Value::Bool(a), Value::Bool(b)) => a.cmp(b),
        _ => {
            // Equality across mismatched types is well-defined (false);
            // ordering is not.
            return match op {
                CmpOp::Eq => Ok(Value::Bool(false)),
                CmpOp::Ne => Ok(Value::Bool(true)),
                _ => Err(EvalError::Type(format!(
                    "cannot order {} against {}",
                    left.type_name(),
                    right.type_name()
                ))),
            };
        }
    };
    let result = match op {
        CmpOp::Eq => ord == Ordering::Equal,
        CmpOp::Ne => ord != Ordering::Equal,
        CmpOp::Lt => ord == Ordering::Less,
        CmpOp::Le => ord != Ordering::Greater,
        CmpOp::Gt => ord == Ordering::Greater,
        CmpOp::Ge => ord != Ordering::Less,
    };
    Ok(Value::Bool(result))
}

fn call(name: &str, args: Vec<Value>, env: &Env) -> Result<Value, EvalError> {
    // User-registered predicates shadow builtins.
    if let Some((pred, def_scope)) = env.scope.resolve(name) {
        if pred.params.len() != args.len() {
            return Err(EvalError::ArityMismatch {
                name: name.to_string(),
                expected: pred.params.len(),
                got: args.len(),
            });
        }
        let locals: BTreeMap<String, Value> =
            pred.params.iter().cloned().zip(args).collect();
        let inner = Env {
            slots: env.slots,
            scope: &def_scope,
            locals,
        };
        return eval(&pred.body, &inner);
    }
    builtin(name, &args)
}

fn builtin(name: &str, args: &[Value]) -> Result<Value, EvalError> {
    fn want_str<'v>(name: &str, v: &'v Value) -> Result<&'v str, EvalError> {
        match v {
            Value::Str(s) => Ok(s),
            other => Err(EvalError::Type(format!(
                "{name}() expects a string, got {}",
                other.type_name()
            ))),
        }
    }
    fn arity(name: &str, args: &[Value], expected: usize) -> Result<(), EvalError> {
        if args.len() != expected {
            return Err(EvalError::ArityMismatch {
                name: name.to_string(),
                expected,
                got: args.len(),
            });
        }
        Ok(())
    }

    match name {
        "contains" => {
            arity(name, args, 2)?;
            match &args[0] {
                Value::Str(s) => Ok(Value::Bool(s.contains(want_str(name, &args[1])?))),
                Value::Seq(v) => Ok(Value::Bool(v.contains(&args[1]))),
                other => Err(EvalError::Type(format!(
                    "contains() expects a string or sequence, got {}",
                    other.type_name()
                ))),
            }
        }
        "starts_with" => {
            arity(name, args, 2)?;
            Ok(Value::Bool(
                want_str(name, &args[0])?.starts_with(want_str(name, &args[1])?),
            ))
        }
        "ends_with" => {
            arity(name, args, 2)?;
            Ok(Value::Bool(
                want_str(name, &args[0])?.ends_with(want_str(name, &args[1])?),
            ))
        }
        "matches" => {
            arity(name, args, 2)?;
            let text = want_str(name, &args[0])?;
            let pattern = want_str(name, &args[1])?;
            let re = regex::Regex::new(pattern)
                .map_err(|e| EvalError::Type(format!("matches(): invalid regex: {e}")))?;
            Ok(Value::Bool(re.is_match(text)))
        }
        "len" => {
            arity(name, args, 1)?;
            let n = match &args[0] {
                Value::Str(s) => s.chars().count(),
                Value::Seq(v) => v.len(),
                Value::Map(m) => m.len(),
                other => {
                    return Err(EvalError::Type(format!(
                        "len() expects a string, sequence or map, got {}",
                        other.type_name()
                    )))
                }
            };
            Ok(Value::Int(n as i64))
        }
        "empty" => {
            arity(name, args, 1)?;
            Ok(Value::Bool(!args[0].truthy()))
        }
        _ => Err(EvalError::UnknownPredicate {
            name: name.to_string(),
        }),
    }
}

// ---------------------------------------------------------------------------
// Templates
// ---------------------------------------------------------------------------

/// Whether a template string contains any unescaped reference tokens.
pub fn has_refs(tmpl: &str) -> bool {
    let mut chars = tmpl.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '{' {
            if chars.peek() == Some(&'{') {
                chars.next();
                continue;
            }
            return true;
        }
        if c == '}' && chars.peek() == Some(&'}') {
            chars.next();
        }
    }
    false
}

/// Render a template, substituting each `{reference}` with its evaluated
/// string form. `{{` and `}}` escape literal braces. An unresolved reference
/// is an evaluation error, never a silent empty string.
pub fn render_template(tmpl: &str, env: &Env) -> Result<String, EvalError> {
    let mut out = String::new();
    let mut chars = tmpl.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '{' if chars.peek() == Some(&'{') => {
                chars.next();
                out.push('{');
            }
            '}' if chars.peek() == Some(&'}') => {
                chars.next();
                out.push('}');
            }
            '{' => {
                let mut inner = String::new();
                let mut closed = false;
                for c2 in chars.by_ref() {
                    if c2 == '}' {
                        closed = true;
                        break;
                    }
                    inner.push(c2);
                }
                if !closed {
                    return Err(EvalError::Syntax(
                        "unterminated '{' reference in template".into(),
                    ));
                }
                let expr = parse(&inner)?;
                out.push_str(&eval(&expr, env)?.render());
            }
            '}' => {
                return Err(EvalError::Syntax("unmatched '}' in template".into()));
            }
            c => out.push(c),
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn slots_with(
        entries: Vec<(&str, Option<SelectorResult>)>,
    ) -> BTreeMap<String, Option<SelectorResult>> {
        entries
            .into_iter()
            .map(|(k, v)| (k.to_string(), v))
            .collect()
    }

    fn as_refs(
        owned: &BTreeMap<String, Option<SelectorResult>>,
    ) -> BTreeMap<String, Option<&SelectorResult>> {
        owned
            .iter()
            .map(|(k, v)| (k.clone(), v.as_ref()))
            .collect()
    }

    fn title_result() -> SelectorResult {
        SelectorResult {
            matched: true,
            full: Some("Fix login bug".into()),
            matched_text: Some("bug".into()),
            groups: vec!["bug".into()],
            ..Default::default()
        }
    }

    #[test]
    fn test_parse_precedence_and_roundtrip() {
        let e = parse("not a and b or c == 'x'").unwrap();
        // ((not a) and b) or (c == "x")
        match e {
            Expr::Or(l, r) => {
                assert!(matches!(*l, Expr::And(_, _)));
                assert!(matches!(*r, Expr::Cmp(CmpOp::Eq, _, _)));
            }
            other => panic!("unexpected parse: {other:?}"),
        }
    }

    #[test]
    fn test_parse_rejects_trailing_input() {
        assert!(matches!(parse("a b"), Err(EvalError::Syntax(_))));
        assert!(matches!(parse(""), Err(EvalError::Syntax(_))));
        assert!(matches!(parse("a ="), Err(EvalError::Syntax(_))));
    }

    #[test]
    fn test_eval_path_and_groups_index() {
        let owned = slots_with(vec![("title", Some(title_result()))]);
        let refs = as_refs(&owned);
        let scope = Scope::root();
        let env = Env::new(&refs, &scope);

        let v = eval(&parse("title.match").unwrap(), &env).unwrap();
        assert_eq!(v, Value::Str("bug".into()));
        let v = eval(&parse("title.groups[0]").unwrap(), &env).unwrap();
        assert_eq!(v, Value::Str("bug".into()));
        assert!(matches!(
            eval(&parse("title.groups[4]").unwrap(), &env),
            Err(EvalError::IndexOutOfRange { index: 4, .. })
        ));
    }

    #[test]
    fn test_bare_absent_selector_is_false_but_field_access_errors() {
        let owned = slots_with(vec![
            ("title", Some(title_result())),
            ("author", None),
        ]);
        let refs = as_refs(&owned);
        let scope = Scope::root();
        let env = Env::new(&refs, &scope);

        let v = eval(&parse("author").unwrap(), &env).unwrap();
        assert_eq!(v, Value::Bool(false));
        assert!(matches!(
            eval(&parse("author.match").unwrap(), &env),
            Err(EvalError::UnresolvedReference { .. })
        ));
        // Short-circuit guards make the access safe.
        let guarded = parse("author and author.match == 'x'").unwrap();
        assert_eq!(eval(&guarded, &env).unwrap(), Value::Bool(false));
    }

    #[test]
    fn test_comparisons_and_type_errors() {
        let owned = slots_with(vec![]);
        let refs = as_refs(&owned);
        let scope = Scope::root();
        let env = Env::new(&refs, &scope);

        assert_eq!(
            eval(&parse("3 < 5").unwrap(), &env).unwrap(),
            Value::Bool(true)
        );
        assert_eq!(
            eval(&parse("'a' != 'b'").unwrap(), &env).unwrap(),
            Value::Bool(true)
        );
        assert_eq!(
            eval(&parse("'a' == 1").unwrap(), &env).unwrap(),
            Value::Bool(false)
        );
        assert!(matches!(
            eval(&parse("'a' < 1").unwrap(), &env),
            Err(EvalError::Type(_))
        ));
    }

    #[test]
    fn test_builtins() {
        let owned = slots_with(vec![("title", Some(title_result()))]);
        let refs = as_refs(&owned);
        let scope = Scope::root();
        let env = Env::new(&refs, &scope);

        for (src, expected) in [
            ("contains(title.full, 'login')", true),
            ("starts_with(title.full, 'Fix')", true),
            ("ends_with(title.full, 'bug')", true),
            ("matches(title.full, '(bug|fix)')", true),
            ("len(title.groups) == 1", true),
            ("empty(title.match)", false),
        ] {
            assert_eq!(
                eval(&parse(src).unwrap(), &env).unwrap(),
                Value::Bool(expected),
                "{src}"
            );
        }
        assert!(matches!(
            eval(&parse("nonsense(1)").unwrap(), &env),
            Err(EvalError::UnknownPredicate { .. })
        ));
    }

    #[test]
    fn test_predicate_scope_shadowing_and_def_site_resolution() {
        // Outer defines is_hot via helper; inner shadows helper. A call to
        // the *outer* is_hot must still use the outer helper.
        let root = Scope::root();
        let outer = Scope::child(
            root,
            BTreeMap::from([
                (
                    "helper".to_string(),
                    Predicate {
                        params: vec!["x".into()],
                        body: parse("x == 'outer'").unwrap(),
                    },
                ),
                (
                    "is_hot".to_string(),
                    Predicate {
                        params: vec!["x".into()],
                        body: parse("helper(x)").unwrap(),
                    },
                ),
            ]),
        );
        let inner = Scope::child(
            outer,
            BTreeMap::from([(
                "helper".to_string(),
                Predicate {
                    params: vec!["x".into()],
                    body: parse("x == 'inner'").unwrap(),
                },
            )]),
        );

        let owned = slots_with(vec![]);
        let refs = as_refs(&owned);
        let env = Env::new(&refs, &inner);

        // Caller sits in the inner scope: direct helper() is shadowed...
        assert_eq!(
            eval(&parse("helper('inner')").unwrap(), &env).unwrap(),
            Value::Bool(true)
        );
        // ...but is_hot was defined in the outer scope and keeps resolving
        // helper against it.
        assert_eq!(
            eval(&parse("is_hot('outer')").unwrap(), &env).unwrap(),
            Value::Bool(true)
        );
        assert_eq!(
            eval(&parse("is_hot('inner')").unwrap(), &env).unwrap(),
            Value::Bool(false)
        );
    }

    #[test]
    fn test_render_template_and_escapes() {
        let owned = slots_with(vec![("title", Some(title_result()))]);
        let refs = as_refs(&owned);
        let scope = Scope::root();
        let env = Env::new(&refs, &scope);

        let out = render_template("kind/{title.match} {{literal}}", &env).unwrap();
        assert_eq!(out, "kind/bug {literal}");
        assert!(matches!(
            render_template("x/{title.bogus}", &env),
            Err(EvalError::UnresolvedReference { .. })
        ));
        assert!(matches!(
            render_template("x/{unclosed", &env),
            Err(EvalError::Syntax(_))
        ));
    }

    #[test]
    fn test_has_refs() {
        assert!(has_refs("size/{diff.total}"));
        assert!(!has_refs("static-name"));
        assert!(!has_refs("braces {{escaped}}"));
    }
}
