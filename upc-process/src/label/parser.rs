//! PVL-style label parser
//!
//! Grammar handled:
//! - `Object = Name … End_Object`, `Group = Name … End_Group` (case-insensitive,
//!   `Begin_` prefixes and `End_Object = Name` accepted)
//! - `Key = value` where value is a bare word, number, quoted string,
//!   `( … )` sequence or `{ … }` set, optionally followed by `<units>`
//! - `/* … */` comments, `;` statement terminators
//! - top-level `End` stops parsing

use super::{Label, LabelError, LabelNode, LabelValue};
use std::iter::Peekable;
use std::str::Chars;

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Word(String),
    Quoted(String),
    Units(String),
    Equals,
    Open(char),
    Close(char),
    Comma,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Block {
    Top,
    Object,
    Group,
}

struct Lexer<'a> {
    chars: Peekable<Chars<'a>>,
    line: usize,
    peeked: Option<Token>,
}

impl<'a> Lexer<'a> {
    fn new(text: &'a str) -> Self {
        Self {
            chars: text.chars().peekable(),
            line: 1,
            peeked: None,
        }
    }

    fn error(&self, message: impl Into<String>) -> LabelError {
        LabelError::Parse {
            line: self.line,
            message: message.into(),
        }
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.chars.next();
        if c == Some('\n') {
            self.line += 1;
        }
        c
    }

    fn peek(&mut self) -> Result<Option<&Token>, LabelError> {
        if self.peeked.is_none() {
            self.peeked = self.lex()?;
        }
        Ok(self.peeked.as_ref())
    }

    fn next(&mut self) -> Result<Option<Token>, LabelError> {
        match self.peeked.take() {
            Some(token) => Ok(Some(token)),
            None => self.lex(),
        }
    }

    fn skip_trivia(&mut self) -> Result<(), LabelError> {
        loop {
            match self.chars.peek() {
                Some(c) if c.is_whitespace() || *c == ';' => {
                    self.bump();
                }
                Some('/') => {
                    let mut lookahead = self.chars.clone();
                    lookahead.next();
                    if lookahead.peek() != Some(&'*') {
                        return Ok(());
                    }
                    self.bump();
                    self.bump();
                    let mut prev = '\0';
                    loop {
                        match self.bump() {
                            Some('/') if prev == '*' => break,
                            Some(c) => prev = c,
                            None => return Err(self.error("unterminated comment")),
                        }
                    }
                }
                _ => return Ok(()),
            }
        }
    }

    fn lex(&mut self) -> Result<Option<Token>, LabelError> {
        self.skip_trivia()?;

        let c = match self.chars.peek() {
            Some(c) => *c,
            None => return Ok(None),
        };

        let token = match c {
            '=' => {
                self.bump();
                Token::Equals
            }
            '(' | '{' => {
                self.bump();
                Token::Open(c)
            }
            ')' | '}' => {
                self.bump();
                Token::Close(c)
            }
            ',' => {
                self.bump();
                Token::Comma
            }
            '"' | '\'' => {
                self.bump();
                Token::Quoted(self.read_quoted(c)?)
            }
            '<' => {
                self.bump();
                let mut units = String::new();
                loop {
                    match self.bump() {
                        Some('>') => break,
                        Some(ch) => units.push(ch),
                        None => return Err(self.error("unterminated units")),
                    }
                }
                Token::Units(units.trim().to_string())
            }
            _ => {
                let mut word = String::new();
                while let Some(&ch) = self.chars.peek() {
                    if ch.is_whitespace() || "=(){},<\"';".contains(ch) {
                        break;
                    }
                    word.push(ch);
                    self.bump();
                }
                if word.is_empty() {
                    return Err(self.error(format!("unexpected character '{}'", c)));
                }
                Token::Word(word)
            }
        };

        Ok(Some(token))
    }

    /// Quoted text; line breaks and their indentation collapse to one space
    fn read_quoted(&mut self, quote: char) -> Result<String, LabelError> {
        let mut text = String::new();
        loop {
            match self.bump() {
                Some(c) if c == quote => break,
                Some('\n') | Some('\r') => {
                    while text.ends_with(' ') {
                        text.pop();
                    }
                    while matches!(self.chars.peek(), Some(c) if c.is_whitespace()) {
                        self.bump();
                    }
                    if !text.is_empty() {
                        text.push(' ');
                    }
                }
                Some(c) => text.push(c),
                None => return Err(self.error("unterminated quoted string")),
            }
        }
        Ok(text)
    }
}

pub(super) fn parse(text: &str) -> Result<Label, LabelError> {
    let mut lexer = Lexer::new(text);
    parse_block(&mut lexer, Block::Top)
}

fn parse_block(lexer: &mut Lexer<'_>, block: Block) -> Result<Label, LabelError> {
    let mut label = Label::new();

    loop {
        let token = match lexer.next()? {
            Some(token) => token,
            None if block == Block::Top => return Ok(label),
            None => return Err(lexer.error("unexpected end of label inside section")),
        };

        let key = match token {
            Token::Word(word) => word,
            other => return Err(lexer.error(format!("expected keyword, found {:?}", other))),
        };

        match key.to_ascii_lowercase().as_str() {
            "end" if block == Block::Top => return Ok(label),
            "end_object" | "endobject" | "end_group" | "endgroup" => {
                let closes = if key.to_ascii_lowercase().contains("object") {
                    Block::Object
                } else {
                    Block::Group
                };
                if closes != block {
                    return Err(lexer.error(format!("unexpected {}", key)));
                }
                // Optional `= Name` after the terminator
                if lexer.peek()? == Some(&Token::Equals) {
                    lexer.next()?;
                    lexer.next()?;
                }
                return Ok(label);
            }
            "object" | "begin_object" | "group" | "begin_group" => {
                let child = if key.to_ascii_lowercase().contains("object") {
                    Block::Object
                } else {
                    Block::Group
                };
                expect_equals(lexer)?;
                let name = match lexer.next()? {
                    Some(Token::Word(name)) | Some(Token::Quoted(name)) => name,
                    other => {
                        return Err(lexer.error(format!("expected section name, found {:?}", other)))
                    }
                };
                let section = parse_block(lexer, child)?;
                label.push(name, LabelNode::Section(section));
            }
            _ => {
                expect_equals(lexer)?;
                let value = parse_value(lexer)?;
                label.push(key, LabelNode::Value(value));
            }
        }
    }
}

fn expect_equals(lexer: &mut Lexer<'_>) -> Result<(), LabelError> {
    match lexer.next()? {
        Some(Token::Equals) => Ok(()),
        other => Err(lexer.error(format!("expected '=', found {:?}", other))),
    }
}

fn parse_value(lexer: &mut Lexer<'_>) -> Result<LabelValue, LabelError> {
    let value = match lexer.next()? {
        Some(Token::Open(open)) => {
            let close = if open == '(' { ')' } else { '}' };
            let mut items = Vec::new();
            if lexer.peek()? == Some(&Token::Close(close)) {
                lexer.next()?;
            } else {
                loop {
                    items.push(parse_value(lexer)?);
                    match lexer.next()? {
                        Some(Token::Comma) => continue,
                        Some(Token::Close(c)) if c == close => break,
                        other => {
                            return Err(lexer.error(format!(
                                "expected ',' or '{}', found {:?}",
                                close, other
                            )))
                        }
                    }
                }
            }
            LabelValue::Sequence(items)
        }
        Some(Token::Quoted(text)) => LabelValue::Text(text),
        Some(Token::Word(word)) => scalar(word),
        other => return Err(lexer.error(format!("expected value, found {:?}", other))),
    };

    if matches!(lexer.peek()?, Some(Token::Units(_))) {
        if let Some(Token::Units(units)) = lexer.next()? {
            return Ok(LabelValue::Units {
                value: Box::new(value),
                units,
            });
        }
    }

    Ok(value)
}

fn scalar(word: String) -> LabelValue {
    if let Ok(i) = word.parse::<i64>() {
        return LabelValue::Integer(i);
    }
    let numeric_shape = word.chars().any(|c| c.is_ascii_digit())
        && word
            .chars()
            .all(|c| c.is_ascii_digit() || matches!(c, '+' | '-' | '.' | 'e' | 'E'));
    if numeric_shape {
        if let Ok(r) = word.parse::<f64>() {
            return LabelValue::Real(r);
        }
    }
    LabelValue::Text(word)
}
