use crate::js::loc::Loc;
use crate::js::token::Token;
use crate::js::token::TT;
use ahash::AHashMap;
use aho_corasick::AhoCorasick;
use aho_corasick::AhoCorasickBuilder;
use aho_corasick::AhoCorasickKind;
use aho_corasick::Anchored;
use aho_corasick::Input;
use aho_corasick::MatchKind;
use aho_corasick::StartKind;
use memchr::memchr;
use memchr::memchr3;
use memchr::memmem;
use once_cell::sync::Lazy;

#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum LexMode {
  SlashIsRegex,
  Standard,
  /// Resume a template literal after the `}` closing a substitution.
  TemplateStrContinue,
}

pub struct Lexer<'a> {
  source: &'a str,
  next: usize,
}

impl<'a> Lexer<'a> {
  pub fn new(source: &'a str) -> Lexer<'a> {
    Lexer { source, next: 0 }
  }

  /// Moves the lexer back to a token boundary it produced earlier.
  pub fn set_next(&mut self, next: usize) {
    self.next = next;
  }

  fn rest(&self) -> &'a str {
    &self.source[self.next..]
  }

  fn at_end(&self) -> bool {
    self.next >= self.source.len()
  }

  fn peek(&self) -> Option<char> {
    self.rest().chars().next()
  }

  fn peek_second(&self) -> Option<char> {
    self.rest().chars().nth(1)
  }

  fn bump(&mut self) -> Option<char> {
    let c = self.peek()?;
    self.next += c.len_utf8();
    Some(c)
  }

  fn bump_if(&mut self, c: char) -> bool {
    let matched = self.peek() == Some(c);
    if matched {
      self.next += c.len_utf8();
    }
    matched
  }

  /// Consumes characters while `pred` holds; returns how many bytes were consumed.
  fn bump_while(&mut self, pred: impl Fn(char) -> bool) -> usize {
    let len: usize = self
      .rest()
      .chars()
      .take_while(|c| pred(*c))
      .map(char::len_utf8)
      .sum();
    self.next += len;
    len
  }

  fn bump_to_end(&mut self) {
    self.next = self.source.len();
  }
}

pub fn is_id_start(c: char) -> bool {
  c == '$' || c == '_' || c.is_alphabetic()
}

pub fn is_id_continue(c: char) -> bool {
  c == '$' || c == '_' || c == '\u{200C}' || c == '\u{200D}' || c.is_alphanumeric()
}

fn is_line_terminator(c: char) -> bool {
  matches!(c, '\n' | '\r' | '\u{2028}' | '\u{2029}')
}

fn is_whitespace(c: char) -> bool {
  matches!(c, '\t' | '\x0b' | '\x0c' | ' ' | '\u{00A0}' | '\u{FEFF}')
}

#[rustfmt::skip]
const KEYWORDS: &[(&str, TT)] = &[
  ("async", TT::KeywordAsync), ("await", TT::KeywordAwait), ("break", TT::KeywordBreak),
  ("catch", TT::KeywordCatch), ("class", TT::KeywordClass), ("const", TT::KeywordConst),
  ("continue", TT::KeywordContinue), ("debugger", TT::KeywordDebugger),
  ("delete", TT::KeywordDelete), ("do", TT::KeywordDo), ("else", TT::KeywordElse),
  ("export", TT::KeywordExport), ("finally", TT::KeywordFinally), ("for", TT::KeywordFor),
  ("function", TT::KeywordFunction), ("if", TT::KeywordIf), ("import", TT::KeywordImport),
  ("in", TT::KeywordIn), ("instanceof", TT::KeywordInstanceof), ("let", TT::KeywordLet),
  ("new", TT::KeywordNew), ("return", TT::KeywordReturn), ("super", TT::KeywordSuper),
  ("switch", TT::KeywordSwitch), ("this", TT::KeywordThis), ("throw", TT::KeywordThrow),
  ("try", TT::KeywordTry), ("typeof", TT::KeywordTypeof), ("var", TT::KeywordVar),
  ("void", TT::KeywordVoid), ("while", TT::KeywordWhile), ("with", TT::KeywordWith),
  ("yield", TT::KeywordYield),
  ("case", TT::KeywordReserved), ("default", TT::KeywordReserved), ("enum", TT::KeywordReserved),
  ("extends", TT::KeywordReserved), ("implements", TT::KeywordReserved),
  ("interface", TT::KeywordReserved), ("package", TT::KeywordReserved),
  ("private", TT::KeywordReserved), ("protected", TT::KeywordReserved),
  ("public", TT::KeywordReserved), ("static", TT::KeywordReserved),
  ("false", TT::LiteralFalse), ("null", TT::LiteralNull), ("true", TT::LiteralTrue),
];

static KEYWORD_LOOKUP: Lazy<AHashMap<&'static str, TT>> =
  Lazy::new(|| KEYWORDS.iter().copied().collect());

/// Whether `name` is a reserved word that can never be used as a binding identifier.
pub fn is_reserved_word(name: &str) -> bool {
  KEYWORD_LOOKUP.contains_key(name)
}

#[rustfmt::skip]
const PUNCTUATORS: &[(&str, TT)] = &[
  ("&", TT::Ampersand), ("&&", TT::AmpersandAmpersand), ("&&=", TT::AmpersandAmpersandEquals),
  ("&=", TT::AmpersandEquals), ("*", TT::Asterisk), ("**", TT::AsteriskAsterisk),
  ("**=", TT::AsteriskAsteriskEquals), ("*=", TT::AsteriskEquals), ("|", TT::Bar),
  ("||", TT::BarBar), ("||=", TT::BarBarEquals), ("|=", TT::BarEquals), ("}", TT::BraceClose),
  ("{", TT::BraceOpen), ("]", TT::BracketClose), ("[", TT::BracketOpen), ("^", TT::Caret),
  ("^=", TT::CaretEquals), ("<", TT::ChevronLeft), ("<<", TT::ChevronLeftChevronLeft),
  ("<<=", TT::ChevronLeftChevronLeftEquals), ("<=", TT::ChevronLeftEquals),
  (">", TT::ChevronRight), (">>", TT::ChevronRightChevronRight),
  (">>>", TT::ChevronRightChevronRightChevronRight),
  (">>>=", TT::ChevronRightChevronRightChevronRightEquals),
  (">>=", TT::ChevronRightChevronRightEquals), (">=", TT::ChevronRightEquals),
  (":", TT::Colon), (",", TT::Comma), (".", TT::Dot), ("...", TT::DotDotDot), ("=", TT::Equals),
  ("=>", TT::EqualsChevronRight), ("==", TT::EqualsEquals), ("===", TT::EqualsEqualsEquals),
  ("!", TT::Exclamation), ("!=", TT::ExclamationEquals), ("!==", TT::ExclamationEqualsEquals),
  ("-", TT::Hyphen), ("-=", TT::HyphenEquals), ("--", TT::HyphenHyphen),
  (")", TT::ParenthesisClose), ("(", TT::ParenthesisOpen), ("%", TT::Percent),
  ("%=", TT::PercentEquals), ("+", TT::Plus), ("+=", TT::PlusEquals), ("++", TT::PlusPlus),
  ("?", TT::Question), ("?.", TT::QuestionDot), ("??", TT::QuestionQuestion),
  ("??=", TT::QuestionQuestionEquals), (";", TT::Semicolon), ("/", TT::Slash),
  ("/=", TT::SlashEquals), ("~", TT::Tilde),
];

static PUNCTUATOR_MATCHER: Lazy<AhoCorasick> = Lazy::new(|| {
  AhoCorasickBuilder::new()
    .start_kind(StartKind::Anchored)
    .kind(Some(AhoCorasickKind::DFA))
    .match_kind(MatchKind::LeftmostLongest)
    .build(PUNCTUATORS.iter().map(|(text, _)| text))
    .unwrap()
});

/// The longest punctuator at the start of `rest`, with its byte length.
fn punctuator(rest: &str) -> Option<(TT, usize)> {
  let m = PUNCTUATOR_MATCHER.find(Input::new(rest).anchored(Anchored::Yes))?;
  let typ = PUNCTUATORS[m.pattern().as_usize()].1;
  // `a?.5:b` is a conditional, not optional chaining.
  if typ == TT::QuestionDot && rest.as_bytes().get(2).is_some_and(u8::is_ascii_digit) {
    return Some((TT::Question, 1));
  }
  Some((typ, m.end()))
}

/// Skips whitespace and comments. Returns whether a line terminator was crossed.
fn skip_trivia(lexer: &mut Lexer<'_>) -> bool {
  let mut crossed = false;
  while let Some(c) = lexer.peek() {
    if is_line_terminator(c) {
      crossed = true;
      lexer.bump();
    } else if is_whitespace(c) {
      lexer.bump();
    } else if c == '/' && lexer.peek_second() == Some('/') {
      match memchr(b'\n', lexer.rest().as_bytes()) {
        Some(pos) => lexer.next += pos,
        None => lexer.bump_to_end(),
      }
    } else if c == '/' && lexer.peek_second() == Some('*') {
      let body = &lexer.rest()[2..];
      match memmem::find(body.as_bytes(), b"*/") {
        Some(pos) => {
          crossed |= body[..pos].chars().any(is_line_terminator);
          lexer.next += 2 + pos + 2;
        }
        None => {
          crossed |= body.chars().any(is_line_terminator);
          lexer.bump_to_end();
        }
      }
    } else {
      break;
    }
  }
  crossed
}

fn scan_word(lexer: &mut Lexer<'_>) -> TT {
  let start = lexer.next;
  lexer.bump_while(is_id_continue);
  let word = &lexer.source[start..lexer.next];
  KEYWORD_LOOKUP.get(word).copied().unwrap_or(TT::Identifier)
}

fn scan_number(lexer: &mut Lexer<'_>) -> TT {
  let radix = match (lexer.peek(), lexer.peek_second()) {
    (Some('0'), Some('x' | 'X')) => Some(16),
    (Some('0'), Some('o' | 'O')) => Some(8),
    (Some('0'), Some('b' | 'B')) => Some(2),
    _ => None,
  };
  if let Some(radix) = radix {
    lexer.next += 2;
    let digits = lexer.bump_while(|c| c.is_digit(radix));
    if lexer.bump_if('n') {
      return TT::LiteralBigInt;
    }
    return if digits == 0 { TT::Invalid } else { TT::LiteralNumber };
  }

  lexer.bump_while(|c| c.is_ascii_digit());
  if lexer.bump_if('n') {
    return TT::LiteralBigInt;
  }
  if lexer.bump_if('.') {
    lexer.bump_while(|c| c.is_ascii_digit());
  }
  if lexer.bump_if('e') || lexer.bump_if('E') {
    if !lexer.bump_if('+') {
      lexer.bump_if('-');
    }
    if lexer.bump_while(|c| c.is_ascii_digit()) == 0 {
      return TT::Invalid;
    }
  }
  if lexer.peek().is_some_and(is_id_start) {
    return TT::Invalid;
  }
  TT::LiteralNumber
}

fn scan_string(lexer: &mut Lexer<'_>, quote: char) -> TT {
  lexer.bump();
  loop {
    let Some(pos) = memchr3(b'\\', b'\n', quote as u8, lexer.rest().as_bytes()) else {
      lexer.bump_to_end();
      return TT::Invalid;
    };
    lexer.next += pos;
    match lexer.bump() {
      Some('\\') => {
        lexer.bump();
      }
      Some('\n') => return TT::Invalid,
      _ => return TT::LiteralString,
    }
  }
}

/// Scans template text up to and including the closing backtick or the next `${`.
fn scan_template_chunk(lexer: &mut Lexer<'_>) -> TT {
  loop {
    let Some(pos) = memchr3(b'\\', b'`', b'$', lexer.rest().as_bytes()) else {
      lexer.bump_to_end();
      return TT::Invalid;
    };
    lexer.next += pos;
    match lexer.bump() {
      Some('\\') => {
        lexer.bump();
      }
      Some('`') => return TT::LiteralTemplatePartStringEnd,
      _ => {
        if lexer.bump_if('{') {
          return TT::LiteralTemplatePartString;
        }
      }
    }
  }
}

fn scan_regex(lexer: &mut Lexer<'_>) -> TT {
  lexer.bump();
  let mut in_class = false;
  loop {
    match lexer.bump() {
      None | Some('\n') => return TT::Invalid,
      Some('\\') => match lexer.bump() {
        None | Some('\n') => return TT::Invalid,
        Some(_) => {}
      },
      Some('/') if !in_class => break,
      Some('[') => in_class = true,
      Some(']') => in_class = false,
      Some(_) => {}
    }
  }
  lexer.bump_while(is_id_continue);
  TT::LiteralRegex
}

fn scan_token(lexer: &mut Lexer<'_>, mode: LexMode, first: char) -> TT {
  match first {
    c if is_id_start(c) => scan_word(lexer),
    '0'..='9' => scan_number(lexer),
    '.' if lexer.peek_second().is_some_and(|c| c.is_ascii_digit()) => scan_number(lexer),
    '"' | '\'' => scan_string(lexer, first),
    '`' => {
      lexer.bump();
      scan_template_chunk(lexer)
    }
    '/' if mode == LexMode::SlashIsRegex => scan_regex(lexer),
    _ => match punctuator(lexer.rest()) {
      Some((typ, len)) => {
        lexer.next += len;
        typ
      }
      None => {
        lexer.bump();
        TT::Invalid
      }
    },
  }
}

pub fn lex_next(lexer: &mut Lexer<'_>, mode: LexMode) -> Token {
  if mode == LexMode::TemplateStrContinue {
    let start = lexer.next;
    let typ = scan_template_chunk(lexer);
    return Token {
      loc: Loc(start, lexer.next),
      typ,
      preceded_by_line_terminator: false,
    };
  }
  let preceded_by_line_terminator = skip_trivia(lexer);
  let start = lexer.next;
  let typ = match lexer.peek() {
    None => TT::EOF,
    Some(first) => scan_token(lexer, mode, first),
  };
  debug_assert!(typ != TT::EOF || lexer.at_end());
  Token {
    loc: Loc(start, lexer.next),
    typ,
    preceded_by_line_terminator,
  }
}

#[cfg(test)]
mod tests {
  use super::lex_next;
  use super::LexMode;
  use super::Lexer;
  use crate::js::loc::Loc;
  use crate::js::token::TT;

  fn lex_all(code: &str) -> Vec<TT> {
    let mut lexer = Lexer::new(code);
    let mut out = Vec::new();
    loop {
      let t = lex_next(&mut lexer, LexMode::Standard);
      if t.typ == TT::EOF {
        break;
      }
      out.push(t.typ);
    }
    out
  }

  #[test]
  fn keywords_do_not_swallow_identifiers() {
    assert_eq!(lex_all("if iffy"), vec![TT::KeywordIf, TT::Identifier]);
    assert_eq!(lex_all("returned"), vec![TT::Identifier]);
    assert_eq!(lex_all("case enumerate"), vec![TT::KeywordReserved, TT::Identifier]);
  }

  #[test]
  fn operators_match_longest() {
    assert_eq!(lex_all("a >>>= b"), vec![
      TT::Identifier,
      TT::ChevronRightChevronRightChevronRightEquals,
      TT::Identifier
    ]);
    assert_eq!(lex_all("a?.5:1"), vec![
      TT::Identifier,
      TT::Question,
      TT::LiteralNumber,
      TT::Colon,
      TT::LiteralNumber
    ]);
    assert_eq!(lex_all("a?.b"), vec![TT::Identifier, TT::QuestionDot, TT::Identifier]);
  }

  #[test]
  fn comments_mark_line_terminators() {
    let mut lexer = Lexer::new("a // c\nb /* \n */ c /* */ d");
    lex_next(&mut lexer, LexMode::Standard);
    let b = lex_next(&mut lexer, LexMode::Standard);
    assert_eq!(b.typ, TT::Identifier);
    assert!(b.preceded_by_line_terminator);
    let c = lex_next(&mut lexer, LexMode::Standard);
    assert!(c.preceded_by_line_terminator);
    let d = lex_next(&mut lexer, LexMode::Standard);
    assert_eq!(d.loc, Loc(25, 26));
    assert!(!d.preceded_by_line_terminator);
  }

  #[test]
  fn regex_only_in_regex_mode() {
    let mut lexer = Lexer::new("/a[/]b/gi");
    let t = lex_next(&mut lexer, LexMode::SlashIsRegex);
    assert_eq!(t.typ, TT::LiteralRegex);
    assert_eq!(t.loc, Loc(0, 9));
    assert_eq!(lex_all("/a/")[0], TT::Slash);
  }

  #[test]
  fn templates_split_at_substitutions() {
    let mut lexer = Lexer::new("`a${x}b`");
    assert_eq!(lex_next(&mut lexer, LexMode::Standard).typ, TT::LiteralTemplatePartString);
    assert_eq!(lex_next(&mut lexer, LexMode::Standard).typ, TT::Identifier);
    assert_eq!(lex_next(&mut lexer, LexMode::Standard).typ, TT::BraceClose);
    assert_eq!(
      lex_next(&mut lexer, LexMode::TemplateStrContinue).typ,
      TT::LiteralTemplatePartStringEnd
    );
  }

  #[test]
  fn numbers_in_every_radix() {
    assert_eq!(lex_all("0x1F 0o7 0b10 1.5e3 .5"), vec![TT::LiteralNumber; 5]);
    assert_eq!(lex_all("10n 0xFn"), vec![TT::LiteralBigInt; 2]);
    assert_eq!(lex_all("0x")[0], TT::Invalid);
    assert_eq!(lex_all("1e+")[0], TT::Invalid);
    assert_eq!(lex_all("3in")[0], TT::Invalid);
  }

  #[test]
  fn unterminated_string_is_invalid() {
    assert_eq!(lex_all("'abc\n'")[0], TT::Invalid);
    assert_eq!(lex_all("'abc")[0], TT::Invalid);
    assert_eq!(lex_all(r#""a\"b""#), vec![TT::LiteralString]);
  }
}
