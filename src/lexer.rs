use std::rc::Rc;

use crate::diagnostics::DiagnosticBag;
use crate::token::{Pos, Token, TokenKind};

/// Single-pass scanner over one source string. Lexing never fails: malformed
/// constructs produce an `Invalid` token plus a diagnostic and the scan
/// continues to end-of-file.
pub struct Lexer<'a> {
    input: &'a str,
    pos: usize,
    line: usize,
    column: usize,
    file: Option<Rc<str>>,
}

impl<'a> Lexer<'a> {
    pub fn new(input: &'a str) -> Self {
        Self {
            input,
            pos: 0,
            line: 1,
            column: 1,
            file: None,
        }
    }

    pub fn with_file(mut self, name: &str) -> Self {
        self.file = Some(Rc::from(name));
        self
    }

    pub fn tokenize(mut self, bag: &mut DiagnosticBag) -> Vec<Token> {
        let mut tokens = Vec::new();
        loop {
            let token = self.next_token(bag);
            let is_eof = token.kind == TokenKind::Eof;
            tokens.push(token);
            if is_eof {
                break;
            }
        }
        tokens
    }

    fn next_token(&mut self, bag: &mut DiagnosticBag) -> Token {
        self.skip_trivia(bag);

        let start = self.current_pos();
        let Some(ch) = self.peek_char() else {
            return self.finish(Token::eof(start));
        };

        let token = match ch {
            '"' => self.read_string(start, bag),
            '\'' => self.read_char(start, bag),
            c if c.is_ascii_digit() => self.read_number(start),
            c if c.is_ascii_alphabetic() || c == '_' => self.read_identifier(start),
            _ => self.read_operator(start, bag),
        };
        self.finish(token)
    }

    fn finish(&self, mut token: Token) -> Token {
        token.file = self.file.clone();
        token
    }

    fn skip_trivia(&mut self, bag: &mut DiagnosticBag) {
        loop {
            match self.peek_char() {
                Some(c) if c.is_whitespace() => {
                    self.consume_char();
                }
                Some('/') if self.peek_second() == Some('/') => {
                    while let Some(c) = self.peek_char() {
                        if c == '\n' {
                            break;
                        }
                        self.consume_char();
                    }
                }
                Some('/') if self.peek_second() == Some('*') => {
                    let start = self.current_pos();
                    self.consume_char();
                    self.consume_char();
                    let mut terminated = false;
                    while let Some(c) = self.consume_char() {
                        if c == '*' && self.peek_char() == Some('/') {
                            self.consume_char();
                            terminated = true;
                            break;
                        }
                    }
                    if !terminated {
                        bag.error("unterminated block comment", start);
                    }
                }
                _ => return,
            }
        }
    }

    fn read_identifier(&mut self, start: Pos) -> Token {
        let begin = self.pos;
        while let Some(c) = self.peek_char() {
            if c.is_ascii_alphanumeric() || c == '_' {
                self.consume_char();
            } else {
                break;
            }
        }
        let text = &self.input[begin..self.pos];
        match TokenKind::keyword(text) {
            Some(kind) => Token::new(kind, text, start),
            None => Token::new(TokenKind::Identifier, text, start),
        }
    }

    /// Digits plus underscores; a single embedded `.` promotes to a float
    /// literal, but only when a digit follows (`42.toString()` keeps the
    /// integer). `f`/`F`/`d`/`D` force the float kind and are dropped from
    /// the value; `l`/`L` keeps the integer kind and stays in the value.
    fn read_number(&mut self, start: Pos) -> Token {
        let mut value = String::new();
        let mut is_float = false;

        self.consume_digits(&mut value);
        if self.peek_char() == Some('.')
            && self.peek_second().is_some_and(|c| c.is_ascii_digit())
        {
            is_float = true;
            value.push('.');
            self.consume_char();
            self.consume_digits(&mut value);
        }

        match self.peek_char() {
            Some('f') | Some('F') | Some('d') | Some('D') => {
                self.consume_char();
                is_float = true;
            }
            Some('l') | Some('L') => {
                let suffix = self.consume_char().unwrap_or('L');
                value.push(suffix);
            }
            _ => {}
        }

        let kind = if is_float {
            TokenKind::FloatLiteral
        } else {
            TokenKind::IntLiteral
        };
        Token::new(kind, value, start)
    }

    fn consume_digits(&mut self, value: &mut String) {
        while let Some(c) = self.peek_char() {
            if c.is_ascii_digit() {
                value.push(c);
                self.consume_char();
            } else if c == '_' {
                self.consume_char();
            } else {
                break;
            }
        }
    }

    fn read_string(&mut self, start: Pos, bag: &mut DiagnosticBag) -> Token {
        self.consume_char(); // opening quote
        let mut value = String::new();
        loop {
            match self.consume_char() {
                Some('"') => return Token::new(TokenKind::StringLiteral, value, start),
                Some('\\') => match self.consume_char() {
                    Some(escaped) => value.push(unescape(escaped)),
                    None => break,
                },
                Some(c) => value.push(c),
                None => break,
            }
        }
        bag.error("unterminated string literal", start);
        Token::new(TokenKind::Invalid, value, start)
    }

    /// A char literal must contain exactly one logical character after
    /// escape processing.
    fn read_char(&mut self, start: Pos, bag: &mut DiagnosticBag) -> Token {
        self.consume_char(); // opening quote
        let mut chars = Vec::new();
        loop {
            match self.peek_char() {
                Some('\'') => {
                    self.consume_char();
                    break;
                }
                Some('\n') | None => {
                    bag.error("unterminated character literal", start);
                    return Token::new(TokenKind::Invalid, "", start);
                }
                Some('\\') => {
                    self.consume_char();
                    match self.consume_char() {
                        Some(escaped) => chars.push(unescape(escaped)),
                        None => {
                            bag.error("unterminated character literal", start);
                            return Token::new(TokenKind::Invalid, "", start);
                        }
                    }
                }
                Some(c) => {
                    self.consume_char();
                    chars.push(c);
                }
            }
        }

        match chars.len() {
            1 => Token::new(TokenKind::CharLiteral, chars[0].to_string(), start),
            0 => {
                bag.error("empty character literal", start);
                Token::new(TokenKind::Invalid, "", start)
            }
            _ => {
                let text: String = chars.iter().collect();
                bag.error(
                    format!(
                        "character literal '{text}' has too many characters; \
                         use double quotes for strings: \"{text}\""
                    ),
                    start,
                );
                Token::new(TokenKind::Invalid, text, start)
            }
        }
    }

    /// Longest-match operator and punctuation scan.
    fn read_operator(&mut self, start: Pos, bag: &mut DiagnosticBag) -> Token {
        let first = self.consume_char().unwrap_or('\0');
        let second = self.peek_char();

        let compound = match (first, second) {
            ('=', Some('=')) => Some((TokenKind::EqEq, "==")),
            ('=', Some('>')) => Some((TokenKind::Arrow, "=>")),
            ('!', Some('=')) => Some((TokenKind::NotEq, "!=")),
            ('<', Some('=')) => Some((TokenKind::LessEq, "<=")),
            ('<', Some('<')) => Some((TokenKind::Shl, "<<")),
            ('>', Some('=')) => Some((TokenKind::GreaterEq, ">=")),
            ('>', Some('>')) => Some((TokenKind::Shr, ">>")),
            ('&', Some('&')) => Some((TokenKind::AndAnd, "&&")),
            ('|', Some('|')) => Some((TokenKind::OrOr, "||")),
            ('+', Some('+')) => Some((TokenKind::PlusPlus, "++")),
            ('+', Some('=')) => Some((TokenKind::PlusAssign, "+=")),
            ('-', Some('-')) => Some((TokenKind::MinusMinus, "--")),
            ('-', Some('=')) => Some((TokenKind::MinusAssign, "-=")),
            ('*', Some('=')) => Some((TokenKind::StarAssign, "*=")),
            ('/', Some('=')) => Some((TokenKind::SlashAssign, "/=")),
            _ => None,
        };
        if let Some((kind, text)) = compound {
            self.consume_char();
            return Token::new(kind, text, start);
        }

        let kind = match first {
            '+' => TokenKind::Plus,
            '-' => TokenKind::Minus,
            '*' => TokenKind::Star,
            '/' => TokenKind::Slash,
            '%' => TokenKind::Percent,
            '=' => TokenKind::Assign,
            '<' => TokenKind::Less,
            '>' => TokenKind::Greater,
            '!' => TokenKind::Not,
            '&' => TokenKind::Amp,
            '|' => TokenKind::Pipe,
            '^' => TokenKind::Caret,
            '~' => TokenKind::Tilde,
            '?' => TokenKind::Question,
            '.' => TokenKind::Dot,
            ',' => TokenKind::Comma,
            ';' => TokenKind::Semicolon,
            ':' => TokenKind::Colon,
            '@' => TokenKind::At,
            '(' => TokenKind::LParen,
            ')' => TokenKind::RParen,
            '{' => TokenKind::LBrace,
            '}' => TokenKind::RBrace,
            '[' => TokenKind::LBracket,
            ']' => TokenKind::RBracket,
            _ => {
                bag.error(
                    format!("unexpected character '{}'", printable(first)),
                    start,
                );
                return Token::new(TokenKind::Invalid, first.to_string(), start);
            }
        };
        Token::new(kind, first.to_string(), start)
    }

    fn current_pos(&self) -> Pos {
        Pos::new(self.line, self.column)
    }

    fn peek_char(&self) -> Option<char> {
        self.input[self.pos..].chars().next()
    }

    fn peek_second(&self) -> Option<char> {
        let mut chars = self.input[self.pos..].chars();
        chars.next();
        chars.next()
    }

    fn consume_char(&mut self) -> Option<char> {
        let c = self.peek_char()?;
        self.pos += c.len_utf8();
        if c == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(c)
    }
}

fn unescape(c: char) -> char {
    match c {
        'n' => '\n',
        't' => '\t',
        'r' => '\r',
        '0' => '\0',
        // \\ \" \' and anything else pass through literally.
        other => other,
    }
}

/// Non-printables are named by Unicode code point so the message stays
/// readable in a terminal.
fn printable(c: char) -> String {
    if c.is_ascii_graphic() || c == ' ' {
        c.to_string()
    } else {
        format!("U+{:04X}", c as u32)
    }
}

pub fn tokenize(input: &str, bag: &mut DiagnosticBag) -> Vec<Token> {
    Lexer::new(input).tokenize(bag)
}

#[cfg(test)]
mod tests {
    use super::*;
    use indoc::indoc;

    fn kinds(input: &str) -> Vec<TokenKind> {
        let mut bag = DiagnosticBag::new();
        let tokens = tokenize(input, &mut bag);
        assert!(!bag.has_errors(), "unexpected errors: {:?}", bag.sorted());
        tokens.into_iter().map(|t| t.kind).collect()
    }

    #[test]
    fn always_terminates_with_eof() {
        for input in ["", "   ", "// comment only\n", "class A {}"] {
            let mut bag = DiagnosticBag::new();
            let tokens = tokenize(input, &mut bag);
            assert_eq!(tokens.last().map(|t| t.kind), Some(TokenKind::Eof));
        }
    }

    #[test]
    fn promotes_every_keyword() {
        let keywords = [
            ("int", TokenKind::Int),
            ("foreach", TokenKind::Foreach),
            ("class", TokenKind::Class),
            ("readonly", TokenKind::Readonly),
            ("match", TokenKind::Match),
            ("null", TokenKind::Null),
        ];
        for (word, expected) in keywords {
            let mut bag = DiagnosticBag::new();
            let tokens = tokenize(&format!("{word} "), &mut bag);
            assert_eq!(tokens[0].kind, expected, "keyword {word}");
            assert_eq!(tokens[0].pos, Pos::new(1, 1));
            assert_eq!(tokens[1].kind, TokenKind::Eof);
        }
    }

    #[test]
    fn tracks_line_and_column() {
        let mut bag = DiagnosticBag::new();
        let tokens = tokenize("class\n  Dog", &mut bag);
        assert_eq!(tokens[0].pos, Pos::new(1, 1));
        assert_eq!(tokens[1].pos, Pos::new(2, 3));
        assert_eq!(tokens[1].text, "Dog");
    }

    #[test]
    fn dot_after_integer_is_not_a_float() {
        let k = kinds("42.toString()");
        assert_eq!(
            k,
            vec![
                TokenKind::IntLiteral,
                TokenKind::Dot,
                TokenKind::Identifier,
                TokenKind::LParen,
                TokenKind::RParen,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn numeric_literals_cook_underscores_and_suffixes() {
        let mut bag = DiagnosticBag::new();
        let tokens = tokenize("1_000_000 3.14 2.5f 10d 42L", &mut bag);
        assert_eq!(tokens[0].kind, TokenKind::IntLiteral);
        assert_eq!(tokens[0].text, "1000000");
        assert_eq!(tokens[1].kind, TokenKind::FloatLiteral);
        assert_eq!(tokens[1].text, "3.14");
        assert_eq!(tokens[2].kind, TokenKind::FloatLiteral);
        assert_eq!(tokens[2].text, "2.5");
        assert_eq!(tokens[3].kind, TokenKind::FloatLiteral);
        assert_eq!(tokens[3].text, "10");
        assert_eq!(tokens[4].kind, TokenKind::IntLiteral);
        assert_eq!(tokens[4].text, "42L");
    }

    #[test]
    fn resolves_string_escapes() {
        let mut bag = DiagnosticBag::new();
        let tokens = tokenize(r#""a\tb\n" "q\"q" "pass\zthrough""#, &mut bag);
        assert_eq!(tokens[0].text, "a\tb\n");
        assert_eq!(tokens[1].text, "q\"q");
        assert_eq!(tokens[2].text, "passzthrough");
        assert!(!bag.has_errors());
    }

    #[test]
    fn newline_inside_string_advances_line_counter() {
        let mut bag = DiagnosticBag::new();
        let tokens = tokenize("\"a\nb\" x", &mut bag);
        assert_eq!(tokens[0].kind, TokenKind::StringLiteral);
        assert_eq!(tokens[1].pos.line, 2);
    }

    #[test]
    fn reports_unterminated_string() {
        let mut bag = DiagnosticBag::new();
        let tokens = tokenize("\"abc", &mut bag);
        assert_eq!(tokens[0].kind, TokenKind::Invalid);
        assert_eq!(bag.error_count(), 1);
        let rendered = bag.sorted()[0].to_string();
        assert!(rendered.contains("unterminated string literal"));
    }

    #[test]
    fn char_literal_holds_one_logical_character() {
        let mut bag = DiagnosticBag::new();
        let tokens = tokenize(r"'a' '\n' '\\'", &mut bag);
        assert!(!bag.has_errors());
        assert_eq!(tokens[0].text, "a");
        assert_eq!(tokens[1].text, "\n");
        assert_eq!(tokens[2].text, "\\");
    }

    #[test]
    fn empty_char_literal_is_an_error() {
        let mut bag = DiagnosticBag::new();
        tokenize("''", &mut bag);
        assert_eq!(bag.error_count(), 1);
        assert!(bag.sorted()[0].message.contains("empty character literal"));
    }

    #[test]
    fn multi_char_literal_suggests_double_quotes() {
        let mut bag = DiagnosticBag::new();
        tokenize("'teste'", &mut bag);
        assert_eq!(bag.error_count(), 1);
        let message = &bag.sorted()[0].message;
        assert!(message.contains("too many characters"));
        assert!(message.contains("\"teste\""));
    }

    #[test]
    fn compound_operators_win_longest_match() {
        let k = kinds("== != <= >= << >> && || ++ -- += -= *= /= =>");
        assert_eq!(
            k,
            vec![
                TokenKind::EqEq,
                TokenKind::NotEq,
                TokenKind::LessEq,
                TokenKind::GreaterEq,
                TokenKind::Shl,
                TokenKind::Shr,
                TokenKind::AndAnd,
                TokenKind::OrOr,
                TokenKind::PlusPlus,
                TokenKind::MinusMinus,
                TokenKind::PlusAssign,
                TokenKind::MinusAssign,
                TokenKind::StarAssign,
                TokenKind::SlashAssign,
                TokenKind::Arrow,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn skips_line_and_block_comments() {
        let k = kinds(indoc! {"
            // leading comment
            class /* inline */ Program { }
        "});
        assert_eq!(
            k,
            vec![
                TokenKind::Class,
                TokenKind::Identifier,
                TokenKind::LBrace,
                TokenKind::RBrace,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn names_nonprintable_characters_by_code_point() {
        let mut bag = DiagnosticBag::new();
        tokenize("\u{7}", &mut bag);
        assert_eq!(bag.error_count(), 1);
        assert!(bag.sorted()[0].message.contains("U+0007"));
    }

    #[test]
    fn recovers_after_unexpected_character() {
        let mut bag = DiagnosticBag::new();
        let tokens = tokenize("int x # = 1;", &mut bag);
        assert_eq!(bag.error_count(), 1);
        assert_eq!(tokens.last().map(|t| t.kind), Some(TokenKind::Eof));
        let identifiers = tokens
            .iter()
            .filter(|t| t.kind == TokenKind::Identifier)
            .count();
        assert_eq!(identifiers, 1);
    }
}
