use crate::ParseError;
use dve_core::SourceSpan;
use logos::Logos;

#[derive(Logos, Debug, Clone, Copy, PartialEq, Eq)]
#[logos(skip r"[ \t\r\n\f]+")]
#[logos(skip r"//[^\n]*")]
#[logos(skip r"/\*([^*]|\*+[^*/])*\*+/")]
pub(crate) enum Token {
    #[token("byte")]
    Byte,
    #[token("int")]
    Int,
    #[token("const")]
    Const,
    #[token("channel")]
    Channel,
    #[token("process")]
    Process,
    #[token("state")]
    State,
    #[token("init")]
    Init,
    #[token("accept")]
    Accept,
    #[token("commit")]
    Commit,
    #[token("assert")]
    Assert,
    #[token("trans")]
    Trans,
    #[token("guard")]
    Guard,
    #[token("sync")]
    Sync,
    #[token("effect")]
    Effect,
    #[token("system")]
    System,
    #[token("async")]
    Async,
    #[token("property")]
    Property,
    #[token("true")]
    True,
    #[token("false")]
    False,
    #[token("imply")]
    #[token("=>")]
    Imply,
    #[token("or")]
    #[token("||")]
    Or,
    #[token("and")]
    #[token("&&")]
    And,
    #[token("not")]
    Not,
    #[regex(r"[A-Za-z_][A-Za-z0-9_]*")]
    Ident,
    #[regex(r"[0-9]+")]
    Number,
    #[token("->")]
    Arrow,
    #[token(".")]
    Dot,
    #[token("!")]
    Bang,
    #[token("?")]
    Question,
    #[token("{")]
    BraceOpen,
    #[token("}")]
    BraceClose,
    #[token("(")]
    ParenOpen,
    #[token(")")]
    ParenClose,
    #[token("[")]
    BracketOpen,
    #[token("]")]
    BracketClose,
    #[token(",")]
    Comma,
    #[token(";")]
    Semicolon,
    #[token(":")]
    Colon,
    #[token("=")]
    Assign,
    #[token("==")]
    Eq,
    #[token("!=")]
    Neq,
    #[token("<")]
    Lt,
    #[token("<=")]
    Leq,
    #[token(">")]
    Gt,
    #[token(">=")]
    Geq,
    #[token("<<")]
    Shl,
    #[token(">>")]
    Shr,
    #[token("+")]
    Plus,
    #[token("-")]
    Minus,
    #[token("*")]
    Star,
    #[token("/")]
    Slash,
    #[token("%")]
    Percent,
    #[token("|")]
    Pipe,
    #[token("^")]
    Caret,
    #[token("&")]
    Ampersand,
    #[token("~")]
    Tilde,
}

impl Token {
    /// How the token is shown in syntax errors.
    pub(crate) fn describe(self) -> &'static str {
        match self {
            Token::Byte => "'byte'",
            Token::Int => "'int'",
            Token::Const => "'const'",
            Token::Channel => "'channel'",
            Token::Process => "'process'",
            Token::State => "'state'",
            Token::Init => "'init'",
            Token::Accept => "'accept'",
            Token::Commit => "'commit'",
            Token::Assert => "'assert'",
            Token::Trans => "'trans'",
            Token::Guard => "'guard'",
            Token::Sync => "'sync'",
            Token::Effect => "'effect'",
            Token::System => "'system'",
            Token::Async => "'async'",
            Token::Property => "'property'",
            Token::True => "'true'",
            Token::False => "'false'",
            Token::Imply => "'imply'",
            Token::Or => "'or'",
            Token::And => "'and'",
            Token::Not => "'not'",
            Token::Ident => "identifier",
            Token::Number => "number",
            Token::Arrow => "'->'",
            Token::Dot => "'.'",
            Token::Bang => "'!'",
            Token::Question => "'?'",
            Token::BraceOpen => "'{'",
            Token::BraceClose => "'}'",
            Token::ParenOpen => "'('",
            Token::ParenClose => "')'",
            Token::BracketOpen => "'['",
            Token::BracketClose => "']'",
            Token::Comma => "','",
            Token::Semicolon => "';'",
            Token::Colon => "':'",
            Token::Assign => "'='",
            Token::Eq => "'=='",
            Token::Neq => "'!='",
            Token::Lt => "'<'",
            Token::Leq => "'<='",
            Token::Gt => "'>'",
            Token::Geq => "'>='",
            Token::Shl => "'<<'",
            Token::Shr => "'>>'",
            Token::Plus => "'+'",
            Token::Minus => "'-'",
            Token::Star => "'*'",
            Token::Slash => "'/'",
            Token::Percent => "'%'",
            Token::Pipe => "'|'",
            Token::Caret => "'^'",
            Token::Ampersand => "'&'",
            Token::Tilde => "'~'",
        }
    }
}

/// A token with its text and position.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Lexeme<'s> {
    pub(crate) token: Token,
    pub(crate) text: &'s str,
    pub(crate) span: SourceSpan,
}

/// Maps byte offsets of a source to 1-based lines and columns.
struct LineIndex<'s> {
    source: &'s str,
    starts: Vec<usize>,
}

impl<'s> LineIndex<'s> {
    fn new(source: &'s str) -> Self {
        let starts = std::iter::once(0)
            .chain(source.match_indices('\n').map(|(idx, _)| idx + 1))
            .collect();
        Self { source, starts }
    }

    fn position(&self, offset: usize) -> (u32, u32) {
        let line = self.starts.partition_point(|start| *start <= offset) - 1;
        let col = self.source[self.starts[line]..offset].chars().count() + 1;
        (line as u32 + 1, col as u32)
    }

    fn span(&self, range: std::ops::Range<usize>) -> SourceSpan {
        let (first_line, first_col) = self.position(range.start);
        let last = self.source[range.clone()]
            .char_indices()
            .last()
            .map(|(idx, _)| range.start + idx)
            .unwrap_or(range.start);
        let (last_line, last_col) = self.position(last);
        SourceSpan::new(first_line, first_col, last_line, last_col)
    }

    /// Span of the position right after the end of the source.
    fn end(&self) -> SourceSpan {
        let (line, col) = self.position(self.source.len());
        SourceSpan::new(line, col, line, col)
    }
}

/// Splits a source into tokens, also returning the span of its end.
pub(crate) fn tokenize(source: &str) -> Result<(Vec<Lexeme<'_>>, SourceSpan), ParseError> {
    let index = LineIndex::new(source);
    let mut lexer = Token::lexer(source);
    let mut lexemes = Vec::new();
    while let Some(token) = lexer.next() {
        let span = index.span(lexer.span());
        match token {
            Ok(token) => lexemes.push(Lexeme {
                token,
                text: lexer.slice(),
                span,
            }),
            Err(()) => {
                return Err(ParseError::Syntax {
                    span,
                    message: format!("unexpected character '{}'", lexer.slice()),
                });
            }
        }
    }
    Ok((lexemes, index.end()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokens(source: &str) -> Vec<Token> {
        tokenize(source)
            .unwrap()
            .0
            .into_iter()
            .map(|lexeme| lexeme.token)
            .collect()
    }

    #[test]
    fn keywords_and_operators() {
        assert_eq!(
            tokens("byte x_1 = 12; // comment\n a->b != c!"),
            vec![
                Token::Byte,
                Token::Ident,
                Token::Assign,
                Token::Number,
                Token::Semicolon,
                Token::Ident,
                Token::Arrow,
                Token::Ident,
                Token::Neq,
                Token::Ident,
                Token::Bang,
            ]
        );
        assert_eq!(
            tokens("a => /* x \n * y */ b imply c <= d << e"),
            vec![
                Token::Ident,
                Token::Imply,
                Token::Ident,
                Token::Imply,
                Token::Ident,
                Token::Leq,
                Token::Ident,
                Token::Shl,
                Token::Ident,
            ]
        );
        // Keywords are not prefixes of identifiers.
        assert_eq!(tokens("integer"), vec![Token::Ident]);
    }

    #[test]
    fn positions() {
        let (lexemes, end) = tokenize("process P {\n  state abc;\n}").unwrap();
        assert_eq!(lexemes[0].span, SourceSpan::new(1, 1, 1, 7));
        assert_eq!(lexemes[4].text, "abc");
        assert_eq!(lexemes[4].span, SourceSpan::new(2, 9, 2, 11));
        assert_eq!(end, SourceSpan::new(3, 2, 3, 2));
    }

    #[test]
    fn unexpected_character() {
        let err = tokenize("byte x;\n  $").unwrap_err();
        assert_eq!(err.to_string(), "2:3-2:3 unexpected character '$'");
    }
}
