//! Tokenizer and item tree shared by the schema and instance grammars
//!
//! Both file kinds are sequences of `keyword(arg, ...)` items with an
//! optional `{ ... }` body of nested items. `include "file"` (and the
//! other string-only directives) take a bare string instead of a list.

use std::fmt;

use crate::common::{Error, Result};

#[derive(Debug, Clone, PartialEq)]
enum Tok {
    Word(String),
    Str(String),
    Open,
    Close,
    LBrace,
    RBrace,
    Comma,
}

impl fmt::Display for Tok {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Tok::Word(w) => write!(f, "'{w}'"),
            Tok::Str(s) => write!(f, "\"{s}\""),
            Tok::Open => f.write_str("'('"),
            Tok::Close => f.write_str("')'"),
            Tok::LBrace => f.write_str("'{'"),
            Tok::RBrace => f.write_str("'}'"),
            Tok::Comma => f.write_str("','"),
        }
    }
}

#[derive(Debug)]
struct Token {
    tok: Tok,
    line: usize,
}

/// One `keyword(args) { body }` element
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Item {
    pub keyword: String,
    pub args: Vec<String>,
    pub body: Option<Vec<Item>>,
    pub line: usize,
}

impl Item {
    /// Fail unless the item has between `min` and `max` arguments
    pub fn expect_args(&self, file: &str, min: usize, max: usize) -> Result<()> {
        if self.args.len() < min || self.args.len() > max {
            let expected = if min == max {
                min.to_string()
            } else {
                format!("{min} to {max}")
            };
            return Err(Error::parse(
                file,
                self.line,
                format!(
                    "'{}' expects {} argument(s), found {}",
                    self.keyword,
                    expected,
                    self.args.len()
                ),
            ));
        }
        Ok(())
    }

    pub fn body(&self) -> &[Item] {
        self.body.as_deref().unwrap_or(&[])
    }
}

fn is_bare(c: char) -> bool {
    c.is_ascii_alphanumeric() || "_-+:.[]<>;".contains(c)
}

fn tokenize(file: &str, text: &str) -> Result<Vec<Token>> {
    let mut tokens = Vec::new();
    let mut chars = text.chars().peekable();
    let mut line = 1;

    while let Some(c) = chars.next() {
        match c {
            '\n' => line += 1,
            c if c.is_whitespace() => {}
            // Comments and C passthrough lines both run to end of line
            '#' | '%' => {
                while chars.peek().is_some_and(|&n| n != '\n') {
                    chars.next();
                }
            }
            '(' => tokens.push(Token { tok: Tok::Open, line }),
            ')' => tokens.push(Token { tok: Tok::Close, line }),
            '{' => tokens.push(Token { tok: Tok::LBrace, line }),
            '}' => tokens.push(Token { tok: Tok::RBrace, line }),
            ',' => tokens.push(Token { tok: Tok::Comma, line }),
            '"' => {
                let mut value = String::new();
                loop {
                    match chars.next() {
                        Some('"') => break,
                        Some('\\') => match chars.next() {
                            Some(esc @ ('"' | '\\')) => value.push(esc),
                            Some('\n') | None => {
                                return Err(Error::parse(file, line, "unterminated string"))
                            }
                            Some(other) => {
                                value.push('\\');
                                value.push(other);
                            }
                        },
                        Some('\n') | None => {
                            return Err(Error::parse(file, line, "unterminated string"))
                        }
                        Some(other) => value.push(other),
                    }
                }
                tokens.push(Token {
                    tok: Tok::Str(value),
                    line,
                });
            }
            c if is_bare(c) => {
                let mut word = String::from(c);
                while let Some(&n) = chars.peek() {
                    if !is_bare(n) {
                        break;
                    }
                    word.push(n);
                    chars.next();
                }
                tokens.push(Token {
                    tok: Tok::Word(word),
                    line,
                });
            }
            other => {
                return Err(Error::parse(
                    file,
                    line,
                    format!("unexpected character '{other}'"),
                ))
            }
        }
    }

    Ok(tokens)
}

struct Parser<'a> {
    file: &'a str,
    tokens: Vec<Token>,
    pos: usize,
    last_line: usize,
}

impl<'a> Parser<'a> {
    fn peek(&self) -> Option<&Tok> {
        self.tokens.get(self.pos).map(|t| &t.tok)
    }

    fn line(&self) -> usize {
        self.tokens
            .get(self.pos)
            .map(|t| t.line)
            .unwrap_or(self.last_line)
    }

    fn next(&mut self) -> Option<Tok> {
        let token = self.tokens.get(self.pos)?;
        self.pos += 1;
        Some(token.tok.clone())
    }

    fn error(&self, message: impl Into<String>) -> Error {
        Error::parse(self.file, self.line(), message)
    }

    fn expect(&mut self, expected: Tok) -> Result<()> {
        match self.next() {
            Some(tok) if tok == expected => Ok(()),
            Some(tok) => {
                self.pos -= 1;
                Err(self.error(format!("expected {expected}, found {tok}")))
            }
            None => Err(self.error(format!("expected {expected}, found end of file"))),
        }
    }

    fn block(&mut self, nested: bool) -> Result<Vec<Item>> {
        let mut items = Vec::new();
        loop {
            match self.peek() {
                None if nested => return Err(self.error("missing '}' before end of file")),
                None => return Ok(items),
                Some(Tok::RBrace) if nested => {
                    self.pos += 1;
                    return Ok(items);
                }
                Some(Tok::Word(_)) => items.push(self.item()?),
                Some(tok) => {
                    let message = format!("expected keyword, found {tok}");
                    return Err(self.error(message));
                }
            }
        }
    }

    fn item(&mut self) -> Result<Item> {
        let line = self.line();
        let keyword = match self.next() {
            Some(Tok::Word(word)) => word,
            _ => return Err(self.error("expected keyword")),
        };

        if let Some(Tok::Str(value)) = self.peek().cloned() {
            self.pos += 1;
            return Ok(Item {
                keyword,
                args: vec![value],
                body: None,
                line,
            });
        }

        self.expect(Tok::Open)?;
        let mut args = Vec::new();
        if self.peek() == Some(&Tok::Close) {
            self.pos += 1;
        } else {
            loop {
                match self.next() {
                    Some(Tok::Word(value)) | Some(Tok::Str(value)) => args.push(value),
                    Some(tok) => {
                        self.pos -= 1;
                        return Err(self.error(format!("expected value, found {tok}")));
                    }
                    None => return Err(self.error("expected value, found end of file")),
                }
                match self.next() {
                    Some(Tok::Comma) => continue,
                    Some(Tok::Close) => break,
                    Some(tok) => {
                        self.pos -= 1;
                        return Err(self.error(format!("expected ',' or ')', found {tok}")));
                    }
                    None => return Err(self.error("expected ')', found end of file")),
                }
            }
        }

        let body = if self.peek() == Some(&Tok::LBrace) {
            self.pos += 1;
            Some(self.block(true)?)
        } else {
            None
        };

        Ok(Item {
            keyword,
            args,
            body,
            line,
        })
    }
}

/// Parse a whole file into its top-level items
pub(crate) fn parse_items(file: &str, text: &str) -> Result<Vec<Item>> {
    let tokens = tokenize(file, text)?;
    let last_line = tokens.last().map(|t| t.line).unwrap_or(1);
    let mut parser = Parser {
        file,
        tokens,
        pos: 0,
        last_line,
    };
    parser.block(false)
}
