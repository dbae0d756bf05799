//! Recursive-descent grammar of DVE sources.
//!
//! The grammar only recognizes the syntax:
//! every construct is handed to the [`Driver`] as soon as it is complete.

use crate::{
    ParseError,
    driver::{Driver, Initializer, VariableDecl},
    lexer::{Lexeme, Token, tokenize},
};
use dve_core::{
    Acceptance, BinaryOp, Diagnostics, DveSystem, SourceSpan, Synchronicity, UnaryOp, Value,
    VarType,
};

pub(crate) fn parse(source: &str, diagnostics: &mut Diagnostics) -> Result<DveSystem, ParseError> {
    let (lexemes, end) = tokenize(source)?;
    Parser {
        lexemes,
        pos: 0,
        end,
        depth: 0,
        driver: Driver::new(diagnostics),
    }
    .model()
}

const MAX_NESTING: usize = 256;

fn binary_op(token: Token) -> Option<BinaryOp> {
    Some(match token {
        Token::Imply => BinaryOp::Imply,
        Token::Or => BinaryOp::Or,
        Token::And => BinaryOp::And,
        Token::Pipe => BinaryOp::BitOr,
        Token::Caret => BinaryOp::BitXor,
        Token::Ampersand => BinaryOp::BitAnd,
        Token::Eq => BinaryOp::Eq,
        Token::Neq => BinaryOp::Neq,
        Token::Lt => BinaryOp::Lt,
        Token::Leq => BinaryOp::Leq,
        Token::Gt => BinaryOp::Gt,
        Token::Geq => BinaryOp::Geq,
        Token::Shl => BinaryOp::Shl,
        Token::Shr => BinaryOp::Shr,
        Token::Plus => BinaryOp::Add,
        Token::Minus => BinaryOp::Sub,
        Token::Star => BinaryOp::Mul,
        Token::Slash => BinaryOp::Div,
        Token::Percent => BinaryOp::Mod,
        _ => return None,
    })
}

struct Parser<'s, 'd> {
    lexemes: Vec<Lexeme<'s>>,
    pos: usize,
    end: SourceSpan,
    // Nesting of the expression being parsed.
    depth: usize,
    driver: Driver<'d>,
}

impl<'s> Parser<'s, '_> {
    fn peek(&self) -> Option<Token> {
        self.peek_at(0)
    }

    fn peek_at(&self, offset: usize) -> Option<Token> {
        self.lexemes.get(self.pos + offset).map(|lexeme| lexeme.token)
    }

    fn span(&self) -> SourceSpan {
        self.lexemes
            .get(self.pos)
            .map(|lexeme| lexeme.span)
            .unwrap_or(self.end)
    }

    fn unexpected(&self, expected: &str) -> ParseError {
        let found = match self.lexemes.get(self.pos) {
            Some(lexeme) if matches!(lexeme.token, Token::Ident | Token::Number) => {
                format!("{} '{}'", lexeme.token.describe(), lexeme.text)
            }
            Some(lexeme) => lexeme.token.describe().to_owned(),
            None => "end of file".to_owned(),
        };
        ParseError::Syntax {
            span: self.span(),
            message: format!("expected {expected}, found {found}"),
        }
    }

    fn advance(&mut self) -> Option<Lexeme<'s>> {
        let lexeme = self.lexemes.get(self.pos).copied();
        if lexeme.is_some() {
            self.pos += 1;
        }
        lexeme
    }

    fn eat(&mut self, token: Token) -> Option<Lexeme<'s>> {
        if self.peek() == Some(token) {
            self.advance()
        } else {
            None
        }
    }

    fn expect(&mut self, token: Token) -> Result<Lexeme<'s>, ParseError> {
        self.eat(token)
            .ok_or_else(|| self.unexpected(token.describe()))
    }

    fn ident(&mut self) -> Result<(&'s str, SourceSpan), ParseError> {
        self.expect(Token::Ident)
            .map(|lexeme| (lexeme.text, lexeme.span))
    }

    /// An integer literal, possibly negative.
    fn number(&mut self) -> Result<(Value, SourceSpan), ParseError> {
        let minus = self.eat(Token::Minus);
        let lexeme = self.expect(Token::Number)?;
        let span = minus.map_or(lexeme.span, |minus| minus.span.to(lexeme.span));
        lexeme
            .text
            .parse::<i64>()
            .ok()
            .map(|value| if minus.is_some() { -value } else { value })
            .and_then(|value| Value::try_from(value).ok())
            .map(|value| (value, span))
            .ok_or_else(|| ParseError::Syntax {
                span,
                message: format!("integer literal {} is out of range", lexeme.text),
            })
    }

    fn model(mut self) -> Result<DveSystem, ParseError> {
        loop {
            match self.peek() {
                Some(Token::Const | Token::Byte | Token::Int) => self.variables()?,
                Some(Token::Channel) => self.channels()?,
                _ => break,
            }
        }
        while self.peek() == Some(Token::Process) {
            self.process()?;
        }
        if self.peek() != Some(Token::System) {
            return Err(self.unexpected("declaration, process or 'system'"));
        }
        self.advance();
        let synchronicity = if self.eat(Token::Async).is_some() {
            Synchronicity::Async
        } else if self.eat(Token::Sync).is_some() {
            Synchronicity::Sync
        } else {
            return Err(self.unexpected("'async' or 'sync'"));
        };
        let property = match self.eat(Token::Property) {
            Some(_) => Some(self.ident()?),
            None => None,
        };
        self.expect(Token::Semicolon)?;
        if self.pos < self.lexemes.len() {
            return Err(self.unexpected("end of file"));
        }
        self.driver.finish(synchronicity, property)
    }

    fn var_type(&mut self) -> Result<VarType, ParseError> {
        if self.eat(Token::Byte).is_some() {
            Ok(VarType::Byte)
        } else if self.eat(Token::Int).is_some() {
            Ok(VarType::Int)
        } else {
            Err(self.unexpected("'byte' or 'int'"))
        }
    }

    /// `[const] byte|int x [= e], a[N] [= {e, ...}], ...;`
    fn variables(&mut self) -> Result<(), ParseError> {
        let constant = self.eat(Token::Const).is_some();
        let var_type = self.var_type()?;
        loop {
            let (name, span) = self.ident()?;
            let array = match self.eat(Token::BracketOpen) {
                Some(_) => {
                    let len = self.number()?;
                    self.expect(Token::BracketClose)?;
                    Some(len)
                }
                None => None,
            };
            let init = match self.eat(Token::Assign) {
                Some(_) => match self.eat(Token::BraceOpen) {
                    Some(open) => {
                        let count = self.expression_list(Token::BraceClose)?;
                        let close = self.expect(Token::BraceClose)?;
                        Initializer::List(count, open.span.to(close.span))
                    }
                    None => Initializer::Scalar(self.expression()?),
                },
                None => Initializer::None,
            };
            self.driver.declare_variable(VariableDecl {
                name,
                span,
                var_type,
                constant,
                array,
                init,
            })?;
            if self.eat(Token::Comma).is_none() {
                break;
            }
        }
        self.expect(Token::Semicolon)?;
        Ok(())
    }

    /// `channel [{byte, int, ...}] c [[N]], ...;`
    fn channels(&mut self) -> Result<(), ParseError> {
        self.expect(Token::Channel)?;
        let close = if self.eat(Token::BraceOpen).is_some() {
            Some(Token::BraceClose)
        } else if self.eat(Token::ParenOpen).is_some() {
            Some(Token::ParenClose)
        } else {
            None
        };
        let item_types = match close {
            Some(close) => {
                let mut types = vec![self.var_type()?];
                while self.eat(Token::Comma).is_some() {
                    types.push(self.var_type()?);
                }
                self.expect(close)?;
                Some(types)
            }
            None => None,
        };
        loop {
            let (name, span) = self.ident()?;
            let capacity = match self.eat(Token::BracketOpen) {
                Some(_) => {
                    let capacity = self.number()?;
                    self.expect(Token::BracketClose)?;
                    Some(capacity)
                }
                None => None,
            };
            self.driver
                .declare_channel(name, span, item_types.clone(), capacity)?;
            if self.eat(Token::Comma).is_none() {
                break;
            }
        }
        self.expect(Token::Semicolon)?;
        Ok(())
    }

    fn process(&mut self) -> Result<(), ParseError> {
        self.expect(Token::Process)?;
        let (name, span) = self.ident()?;
        self.driver.begin_process(name, span)?;
        self.expect(Token::BraceOpen)?;
        while matches!(self.peek(), Some(Token::Const | Token::Byte | Token::Int)) {
            self.variables()?;
        }
        self.expect(Token::State)?;
        loop {
            let (state, span) = self.ident()?;
            self.driver.declare_state(state, span)?;
            if self.eat(Token::Comma).is_none() {
                break;
            }
        }
        self.expect(Token::Semicolon)?;
        if self.eat(Token::Init).is_some() {
            let (state, span) = self.ident()?;
            self.driver.set_initial_state(state, span)?;
            self.expect(Token::Semicolon)?;
        }
        loop {
            match self.peek() {
                Some(Token::Accept) => self.acceptance()?,
                Some(Token::Commit) => {
                    self.advance();
                    for (state, span) in self.state_names(&[Token::Semicolon])? {
                        self.driver.set_committed(state, span)?;
                    }
                    self.expect(Token::Semicolon)?;
                }
                Some(Token::Assert) => self.assertions()?,
                _ => break,
            }
        }
        if self.eat(Token::Trans).is_some() {
            loop {
                self.transition()?;
                if self.eat(Token::Comma).is_none() {
                    break;
                }
            }
            self.expect(Token::Semicolon)?;
        }
        if self.peek() != Some(Token::BraceClose) {
            return Err(self.unexpected("'accept', 'commit', 'assert', 'trans' or '}'"));
        }
        self.advance();
        self.driver.end_process();
        Ok(())
    }

    /// Comma-separated, possibly empty, list of state names ending before one of `terminators`.
    fn state_names(&mut self, terminators: &[Token]) -> Result<Vec<(&'s str, SourceSpan)>, ParseError> {
        let mut names = Vec::new();
        if self.peek().is_some_and(|token| terminators.contains(&token)) {
            return Ok(names);
        }
        loop {
            names.push(self.ident()?);
            if self.eat(Token::Comma).is_none() {
                return Ok(names);
            }
        }
    }

    fn state_set(&mut self, terminators: &[Token]) -> Result<Vec<usize>, ParseError> {
        self.state_names(terminators)?
            .into_iter()
            .map(|(state, span)| self.driver.state_lid(state, span))
            .collect()
    }

    /// `(a, b), (c), ...`
    fn state_sets(&mut self) -> Result<Vec<Vec<usize>>, ParseError> {
        let mut sets = Vec::new();
        loop {
            self.expect(Token::ParenOpen)?;
            sets.push(self.state_set(&[Token::ParenClose])?);
            self.expect(Token::ParenClose)?;
            if self.eat(Token::Comma).is_none() {
                return Ok(sets);
            }
        }
    }

    /// `(a, b; c), (d; e), ...`
    fn state_pairs(&mut self) -> Result<Vec<(Vec<usize>, Vec<usize>)>, ParseError> {
        let mut pairs = Vec::new();
        loop {
            self.expect(Token::ParenOpen)?;
            let left = self.state_set(&[Token::Semicolon])?;
            self.expect(Token::Semicolon)?;
            let right = self.state_set(&[Token::ParenClose])?;
            self.expect(Token::ParenClose)?;
            pairs.push((left, right));
            if self.eat(Token::Comma).is_none() {
                return Ok(pairs);
            }
        }
    }

    fn acceptance(&mut self) -> Result<(), ParseError> {
        let accept = self.expect(Token::Accept)?;
        let kind = match (self.lexemes.get(self.pos), self.peek_at(1)) {
            (Some(lexeme), Some(Token::ParenOpen)) if lexeme.token == Token::Ident => lexeme.text,
            (Some(lexeme), Some(Token::Ident)) if lexeme.text == "buchi" => lexeme.text,
            _ => "",
        };
        let acceptance = match kind {
            "genbuchi" | "muller" | "rabin" | "streett" | "buchi" => {
                self.advance();
                match kind {
                    "genbuchi" => Acceptance::GenBuchi(self.state_sets()?),
                    "muller" => Acceptance::Muller(self.state_sets()?),
                    "rabin" => Acceptance::Rabin(self.state_pairs()?),
                    "streett" => Acceptance::Streett(self.state_pairs()?),
                    _ => Acceptance::Buchi(self.state_set(&[Token::Semicolon])?),
                }
            }
            "" => Acceptance::Buchi(self.state_set(&[Token::Semicolon])?),
            other => {
                return Err(ParseError::Syntax {
                    span: self.span(),
                    message: format!("unknown acceptance condition '{other}'"),
                });
            }
        };
        self.driver.set_acceptance(acceptance, accept.span)?;
        self.expect(Token::Semicolon)?;
        Ok(())
    }

    /// `assert s: e, t: e, ...;`
    fn assertions(&mut self) -> Result<(), ParseError> {
        self.expect(Token::Assert)?;
        loop {
            let (state, span) = self.ident()?;
            self.expect(Token::Colon)?;
            let expr = self.expression()?;
            self.driver.add_assertion(state, span.to(expr))?;
            if self.eat(Token::Comma).is_none() {
                break;
            }
        }
        self.expect(Token::Semicolon)?;
        Ok(())
    }

    /// `[s] -> t { [guard e, ...;] [sync c!e;] [effect x = e, ...;] }`
    fn transition(&mut self) -> Result<(), ParseError> {
        let from = match self.peek() {
            Some(Token::Ident) => Some(self.ident()?),
            _ => None,
        };
        let arrow = self.expect(Token::Arrow)?;
        let to = self.ident()?;
        let span = from.map_or(arrow.span, |(_, span)| span).to(to.1);
        self.driver.begin_transition(from, to, span)?;
        self.expect(Token::BraceOpen)?;
        if let Some(guard) = self.eat(Token::Guard) {
            let count = self.expression_list(Token::Semicolon)?;
            self.driver.set_guard(count, guard.span)?;
            self.expect(Token::Semicolon)?;
        }
        if self.eat(Token::Sync).is_some() {
            self.sync()?;
            self.expect(Token::Semicolon)?;
        }
        if self.eat(Token::Effect).is_some() {
            loop {
                let target = self.lvalue()?;
                self.expect(Token::Assign)?;
                let value = self.expression()?;
                let span = target.to(value);
                self.driver.reduce_binary(BinaryOp::Assign, span)?;
                self.driver.add_effect(span)?;
                if self.eat(Token::Comma).is_none() {
                    break;
                }
            }
            self.expect(Token::Semicolon)?;
        }
        let close = self.span();
        if self.eat(Token::BraceClose).is_none() {
            return Err(self.unexpected("'guard', 'sync', 'effect' or '}'"));
        }
        self.driver.end_transition(close)
    }

    /// `c!`, `c!e`, `c!{e, ...}`, `c?`, `c?x`, `c?{x, a[i], ...}`
    fn sync(&mut self) -> Result<(), ParseError> {
        let (channel, span) = self.ident()?;
        let send = if self.eat(Token::Bang).is_some() {
            true
        } else if self.eat(Token::Question).is_some() {
            false
        } else {
            return Err(self.unexpected("'!' or '?'"));
        };
        let count = if self.eat(Token::BraceOpen).is_some() {
            let count = if send {
                self.expression_list(Token::BraceClose)?
            } else {
                self.lvalue_list()?
            };
            self.expect(Token::BraceClose)?;
            count
        } else if self.peek() == Some(Token::Semicolon) {
            0
        } else if send {
            self.expression()?;
            1
        } else {
            self.lvalue()?;
            1
        };
        self.driver.set_sync(channel, span, send, count)
    }

    /// Comma-separated, possibly empty, list of expressions ending before `terminator`.
    fn expression_list(&mut self, terminator: Token) -> Result<usize, ParseError> {
        if self.peek() == Some(terminator) {
            return Ok(0);
        }
        let mut count = 0;
        loop {
            self.expression()?;
            count += 1;
            if self.eat(Token::Comma).is_none() {
                return Ok(count);
            }
        }
    }

    fn lvalue_list(&mut self) -> Result<usize, ParseError> {
        let mut count = 0;
        loop {
            self.lvalue()?;
            count += 1;
            if self.eat(Token::Comma).is_none() {
                return Ok(count);
            }
        }
    }

    /// `x` or `a[e]`.
    fn lvalue(&mut self) -> Result<SourceSpan, ParseError> {
        let (name, span) = self.ident()?;
        match self.eat(Token::BracketOpen) {
            Some(_) => {
                self.expression()?;
                let close = self.expect(Token::BracketClose)?;
                let span = span.to(close.span);
                self.driver.push_lvalue(name, span, true)?;
                Ok(span)
            }
            None => {
                self.driver.push_lvalue(name, span, false)?;
                Ok(span)
            }
        }
    }

    fn expression(&mut self) -> Result<SourceSpan, ParseError> {
        self.binary(BinaryOp::Imply.precedence())
    }

    fn nested(
        &mut self,
        parse: impl FnOnce(&mut Self) -> Result<SourceSpan, ParseError>,
    ) -> Result<SourceSpan, ParseError> {
        if self.depth >= MAX_NESTING {
            return Err(ParseError::Syntax {
                span: self.span(),
                message: "expression is nested too deeply".to_owned(),
            });
        }
        self.depth += 1;
        let result = parse(self);
        self.depth -= 1;
        result
    }

    fn binary(&mut self, min: u8) -> Result<SourceSpan, ParseError> {
        self.nested(|parser| parser.climb(min))
    }

    /// Precedence climbing over operators binding at least as strongly as `min`.
    fn climb(&mut self, min: u8) -> Result<SourceSpan, ParseError> {
        let mut span = self.unary()?;
        while let Some(op) = self.peek().and_then(binary_op) {
            let precedence = op.precedence();
            if precedence < min {
                break;
            }
            self.advance();
            let next = if op.is_right_associative() {
                precedence
            } else {
                precedence + 1
            };
            let right = self.binary(next)?;
            span = span.to(right);
            self.driver.reduce_binary(op, span)?;
        }
        Ok(span)
    }

    fn unary(&mut self) -> Result<SourceSpan, ParseError> {
        self.nested(Self::prefix)
    }

    fn prefix(&mut self) -> Result<SourceSpan, ParseError> {
        let op = match self.peek() {
            Some(Token::Minus) if self.peek_at(1) == Some(Token::Number) => {
                let (value, span) = self.number()?;
                self.driver.push_value(value, span);
                return Ok(span);
            }
            Some(Token::Minus) => UnaryOp::Minus,
            Some(Token::Tilde) => UnaryOp::Tilde,
            Some(Token::Not) => UnaryOp::Not,
            _ => return self.primary(),
        };
        let start = self.span();
        self.advance();
        let span = start.to(self.unary()?);
        self.driver.reduce_unary(op, span)?;
        Ok(span)
    }

    fn primary(&mut self) -> Result<SourceSpan, ParseError> {
        let Some(lexeme) = self.lexemes.get(self.pos).copied() else {
            return Err(self.unexpected("expression"));
        };
        match lexeme.token {
            Token::Number => {
                let (value, span) = self.number()?;
                self.driver.push_value(value, span);
                Ok(span)
            }
            Token::True | Token::False => {
                self.advance();
                self.driver
                    .push_value(Value::from(lexeme.token == Token::True), lexeme.span);
                Ok(lexeme.span)
            }
            Token::ParenOpen => {
                self.advance();
                self.expression()?;
                let close = self.expect(Token::ParenClose)?;
                let span = lexeme.span.to(close.span);
                self.driver.reduce_unary(UnaryOp::Parenthesis, span)?;
                Ok(span)
            }
            Token::Ident => {
                self.advance();
                let name = (lexeme.text, lexeme.span);
                if self.eat(Token::Dot).is_some() {
                    let state = self.ident()?;
                    self.driver.push_in_state(name, state)?;
                    Ok(lexeme.span.to(state.1))
                } else if self.eat(Token::Arrow).is_some() {
                    let var = self.ident()?;
                    if self.eat(Token::BracketOpen).is_some() {
                        self.expression()?;
                        let close = self.expect(Token::BracketClose)?;
                        self.driver.push_foreign(name, (var.0, var.1.to(close.span)), true)?;
                        Ok(lexeme.span.to(close.span))
                    } else {
                        self.driver.push_foreign(name, var, false)?;
                        Ok(lexeme.span.to(var.1))
                    }
                } else if self.eat(Token::BracketOpen).is_some() {
                    self.expression()?;
                    let close = self.expect(Token::BracketClose)?;
                    let span = lexeme.span.to(close.span);
                    self.driver.reduce_index(lexeme.text, span)?;
                    Ok(span)
                } else {
                    self.driver.push_variable(lexeme.text, lexeme.span)?;
                    Ok(lexeme.span)
                }
            }
            _ => Err(self.unexpected("expression")),
        }
    }
}
