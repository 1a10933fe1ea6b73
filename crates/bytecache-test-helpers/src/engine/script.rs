//! A tiny module language for the mock engine.
//!
//! Enough ES module syntax to exercise linking and evaluation:
//!
//! ```text
//! import answer, { foo, bar as baz } from "cfg";
//! import * as ns from "./dep.jsc";
//! import "side-effect";
//! const local = { a: 1, b: [true, null, "s"] };
//! export const named = ns.value;
//! export { local as renamed };
//! export default answer;
//! throw "boom";
//! ```

use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Expr {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Array(Vec<Expr>),
    Object(Vec<(String, Expr)>),
    Ident(String),
    Member(Box<Expr>, String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ImportBinding {
    Default { local: String },
    Named { imported: String, local: String },
    Namespace { local: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportDecl {
    pub specifier: String,
    pub bindings: Vec<ImportBinding>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Stmt {
    Declare {
        name: String,
        init: Expr,
        exported: bool,
    },
    ExportDefault(Expr),
    ExportList(Vec<(String, String)>),
    Throw(Expr),
    Expr(Expr),
}

/// Parsed module: imports hoisted, body in source order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Script {
    pub imports: Vec<ImportDecl>,
    pub body: Vec<Stmt>,
}

impl Script {
    /// Import specifiers in first-appearance order, without repeats.
    pub fn specifiers(&self) -> Vec<String> {
        let mut out: Vec<String> = Vec::new();
        for import in &self.imports {
            if !out.contains(&import.specifier) {
                out.push(import.specifier.clone());
            }
        }
        out
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Ident(String),
    Str(String),
    Num(String),
    Punct(char),
    Eof,
}

fn tokenize(source: &str) -> Result<Vec<Token>, String> {
    let chars: Vec<char> = source.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        if c.is_whitespace() || c == '\u{200b}' || c == '\u{feff}' {
            i += 1;
        } else if c == '/' && chars.get(i + 1) == Some(&'/') {
            while i < chars.len() && chars[i] != '\n' {
                i += 1;
            }
        } else if c == '/' && chars.get(i + 1) == Some(&'*') {
            i += 2;
            while i < chars.len() && !(chars[i] == '*' && chars.get(i + 1) == Some(&'/')) {
                i += 1;
            }
            if i >= chars.len() {
                return Err("unterminated comment".to_string());
            }
            i += 2;
        } else if c == '"' || c == '\'' {
            let quote = c;
            let mut text = String::new();
            i += 1;
            loop {
                match chars.get(i) {
                    None | Some('\n') => return Err("unterminated string literal".to_string()),
                    Some(&ch) if ch == quote => {
                        i += 1;
                        break;
                    }
                    Some('\\') => {
                        let escaped = chars.get(i + 1).ok_or("unterminated string literal")?;
                        text.push(match escaped {
                            'n' => '\n',
                            't' => '\t',
                            other => *other,
                        });
                        i += 2;
                    }
                    Some(&ch) => {
                        text.push(ch);
                        i += 1;
                    }
                }
            }
            tokens.push(Token::Str(text));
        } else if c.is_ascii_digit() {
            let start = i;
            while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                i += 1;
            }
            tokens.push(Token::Num(chars[start..i].iter().collect()));
        } else if c.is_alphabetic() || c == '_' || c == '$' {
            let start = i;
            while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_' || chars[i] == '$')
            {
                i += 1;
            }
            tokens.push(Token::Ident(chars[start..i].iter().collect()));
        } else if "{}[](),;:=.*-".contains(c) {
            tokens.push(Token::Punct(c));
            i += 1;
        } else {
            return Err(format!("unexpected character '{}'", c));
        }
    }

    tokens.push(Token::Eof);
    Ok(tokens)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> &Token {
        &self.tokens[self.pos]
    }

    fn next(&mut self) -> Token {
        let token = self.tokens[self.pos].clone();
        if token != Token::Eof {
            self.pos += 1;
        }
        token
    }

    fn eat_punct(&mut self, c: char) -> bool {
        if self.peek() == &Token::Punct(c) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn eat_keyword(&mut self, word: &str) -> bool {
        if matches!(self.peek(), Token::Ident(w) if w == word) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect_punct(&mut self, c: char) -> Result<(), String> {
        if self.eat_punct(c) {
            Ok(())
        } else {
            Err(format!("expected '{}', found {:?}", c, self.peek()))
        }
    }

    fn expect_keyword(&mut self, word: &str) -> Result<(), String> {
        if self.eat_keyword(word) {
            Ok(())
        } else {
            Err(format!("expected '{}', found {:?}", word, self.peek()))
        }
    }

    fn ident(&mut self) -> Result<String, String> {
        match self.next() {
            Token::Ident(name) => Ok(name),
            other => Err(format!("expected identifier, found {:?}", other)),
        }
    }

    fn string(&mut self) -> Result<String, String> {
        match self.next() {
            Token::Str(text) => Ok(text),
            other => Err(format!("expected string literal, found {:?}", other)),
        }
    }

    fn script(&mut self) -> Result<Script, String> {
        let mut script = Script::default();
        while self.peek() != &Token::Eof {
            if self.eat_punct(';') {
                continue;
            }
            if self.eat_keyword("import") {
                script.imports.push(self.import()?);
            } else {
                script.body.push(self.statement()?);
            }
            self.eat_punct(';');
        }
        Ok(script)
    }

    fn import(&mut self) -> Result<ImportDecl, String> {
        if let Token::Str(_) = self.peek() {
            let specifier = self.string()?;
            return Ok(ImportDecl {
                specifier,
                bindings: Vec::new(),
            });
        }

        let mut bindings = Vec::new();
        if self.eat_punct('*') {
            self.expect_keyword("as")?;
            bindings.push(ImportBinding::Namespace {
                local: self.ident()?,
            });
        } else {
            if let Token::Ident(_) = self.peek() {
                bindings.push(ImportBinding::Default {
                    local: self.ident()?,
                });
                if !self.eat_punct(',') {
                    return self.import_from(bindings);
                }
            }
            if self.eat_punct('*') {
                self.expect_keyword("as")?;
                bindings.push(ImportBinding::Namespace {
                    local: self.ident()?,
                });
            } else {
                self.expect_punct('{')?;
                while !self.eat_punct('}') {
                    let imported = self.ident()?;
                    let local = if self.eat_keyword("as") {
                        self.ident()?
                    } else {
                        imported.clone()
                    };
                    bindings.push(ImportBinding::Named { imported, local });
                    if !self.eat_punct(',') {
                        self.expect_punct('}')?;
                        break;
                    }
                }
            }
        }
        self.import_from(bindings)
    }

    fn import_from(&mut self, bindings: Vec<ImportBinding>) -> Result<ImportDecl, String> {
        self.expect_keyword("from")?;
        Ok(ImportDecl {
            specifier: self.string()?,
            bindings,
        })
    }

    fn statement(&mut self) -> Result<Stmt, String> {
        if self.eat_keyword("export") {
            if self.eat_keyword("default") {
                return Ok(Stmt::ExportDefault(self.expr()?));
            }
            if self.eat_punct('{') {
                let mut list = Vec::new();
                while !self.eat_punct('}') {
                    let local = self.ident()?;
                    let exported = if self.eat_keyword("as") {
                        self.ident()?
                    } else {
                        local.clone()
                    };
                    list.push((local, exported));
                    if !self.eat_punct(',') {
                        self.expect_punct('}')?;
                        break;
                    }
                }
                return Ok(Stmt::ExportList(list));
            }
            return self.declaration(true);
        }
        if self.eat_keyword("throw") {
            return Ok(Stmt::Throw(self.expr()?));
        }
        if matches!(self.peek(), Token::Ident(w) if w == "const" || w == "let" || w == "var") {
            return self.declaration(false);
        }
        Ok(Stmt::Expr(self.expr()?))
    }

    fn declaration(&mut self, exported: bool) -> Result<Stmt, String> {
        if !(self.eat_keyword("const") || self.eat_keyword("let") || self.eat_keyword("var")) {
            return Err(format!("expected declaration, found {:?}", self.peek()));
        }
        let name = self.ident()?;
        self.expect_punct('=')?;
        Ok(Stmt::Declare {
            name,
            init: self.expr()?,
            exported,
        })
    }

    fn expr(&mut self) -> Result<Expr, String> {
        let mut expr = self.primary()?;
        while self.eat_punct('.') {
            expr = Expr::Member(Box::new(expr), self.ident()?);
        }
        Ok(expr)
    }

    fn primary(&mut self) -> Result<Expr, String> {
        match self.next() {
            Token::Num(text) => number(&text, false),
            Token::Punct('-') => match self.next() {
                Token::Num(text) => number(&text, true),
                other => Err(format!("expected number after '-', found {:?}", other)),
            },
            Token::Str(text) => Ok(Expr::Str(text)),
            Token::Ident(word) => Ok(match word.as_str() {
                "null" | "undefined" => Expr::Null,
                "true" => Expr::Bool(true),
                "false" => Expr::Bool(false),
                _ => Expr::Ident(word),
            }),
            Token::Punct('[') => {
                let mut items = Vec::new();
                while !self.eat_punct(']') {
                    items.push(self.expr()?);
                    if !self.eat_punct(',') {
                        self.expect_punct(']')?;
                        break;
                    }
                }
                Ok(Expr::Array(items))
            }
            Token::Punct('{') => {
                let mut props = Vec::new();
                while !self.eat_punct('}') {
                    let key = match self.next() {
                        Token::Ident(k) | Token::Str(k) => k,
                        other => return Err(format!("expected property key, found {:?}", other)),
                    };
                    let value = if self.eat_punct(':') {
                        self.expr()?
                    } else {
                        Expr::Ident(key.clone())
                    };
                    props.push((key, value));
                    if !self.eat_punct(',') {
                        self.expect_punct('}')?;
                        break;
                    }
                }
                Ok(Expr::Object(props))
            }
            other => Err(format!("unexpected token {:?}", other)),
        }
    }
}

fn number(text: &str, negative: bool) -> Result<Expr, String> {
    let signed = if negative {
        format!("-{}", text)
    } else {
        text.to_string()
    };
    if let Ok(int) = signed.parse::<i64>() {
        return Ok(Expr::Int(int));
    }
    signed
        .parse::<f64>()
        .map(Expr::Float)
        .map_err(|_| format!("invalid number '{}'", signed))
}

/// Parse module source.
pub fn parse(source: &str) -> Result<Script, String> {
    let tokens = tokenize(source)?;
    Parser { tokens, pos: 0 }.script()
}

/// Resolves identifiers during evaluation.
pub trait Scope {
    fn lookup(&self, name: &str) -> Option<Value>;
}

pub fn eval(expr: &Expr, scope: &dyn Scope) -> Result<Value, String> {
    Ok(match expr {
        Expr::Null => Value::Null,
        Expr::Bool(b) => Value::Bool(*b),
        Expr::Int(i) => Value::Number(Number::from(*i)),
        Expr::Float(f) => Number::from_f64(*f).map(Value::Number).unwrap_or(Value::Null),
        Expr::Str(s) => Value::String(s.clone()),
        Expr::Array(items) => Value::Array(
            items
                .iter()
                .map(|e| eval(e, scope))
                .collect::<Result<_, _>>()?,
        ),
        Expr::Object(props) => {
            let mut map = Map::new();
            for (key, value) in props {
                map.insert(key.clone(), eval(value, scope)?);
            }
            Value::Object(map)
        }
        Expr::Ident(name) => scope
            .lookup(name)
            .ok_or_else(|| format!("ReferenceError: {} is not defined", name))?,
        Expr::Member(target, key) => match eval(target, scope)? {
            Value::Object(map) => map.get(key).cloned().unwrap_or(Value::Null),
            Value::Null => {
                return Err(format!(
                    "TypeError: Cannot read properties of null (reading '{}')",
                    key
                ))
            }
            _ => Value::Null,
        },
    })
}
