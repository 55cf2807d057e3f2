use crate::js::loc::Loc;

#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug)]
pub enum TT {
  // End of the source code.
  EOF,
  // Anything the lexer could not make sense of. Peeking never fails; the parser reports these.
  Invalid,

  Ampersand,
  AmpersandAmpersand,
  AmpersandAmpersandEquals,
  AmpersandEquals,
  Asterisk,
  AsteriskAsterisk,
  AsteriskAsteriskEquals,
  AsteriskEquals,
  Bar,
  BarBar,
  BarBarEquals,
  BarEquals,
  BraceClose,
  BraceOpen,
  BracketClose,
  BracketOpen,
  Caret,
  CaretEquals,
  ChevronLeft,
  ChevronLeftChevronLeft,
  ChevronLeftChevronLeftEquals,
  ChevronLeftEquals,
  ChevronRight,
  ChevronRightChevronRight,
  ChevronRightChevronRightChevronRight,
  ChevronRightChevronRightChevronRightEquals,
  ChevronRightChevronRightEquals,
  ChevronRightEquals,
  Colon,
  Comma,
  Dot,
  DotDotDot,
  Equals,
  EqualsChevronRight,
  EqualsEquals,
  EqualsEqualsEquals,
  Exclamation,
  ExclamationEquals,
  ExclamationEqualsEquals,
  Hyphen,
  HyphenEquals,
  HyphenHyphen,
  Identifier,
  KeywordAsync,
  KeywordAwait,
  KeywordBreak,
  KeywordCatch,
  KeywordClass,
  KeywordConst,
  KeywordContinue,
  KeywordDebugger,
  KeywordDelete,
  KeywordDo,
  KeywordElse,
  KeywordExport,
  KeywordFinally,
  KeywordFor,
  KeywordFunction,
  KeywordIf,
  KeywordImport,
  KeywordIn,
  KeywordInstanceof,
  KeywordLet,
  KeywordNew,
  KeywordReturn,
  KeywordSuper,
  KeywordSwitch,
  KeywordThis,
  KeywordThrow,
  KeywordTry,
  KeywordTypeof,
  KeywordVar,
  KeywordVoid,
  KeywordWhile,
  KeywordWith,
  KeywordYield,
  // A reserved word no statement or expression of the dialect starts with (`case`, `enum`,
  // `public`, ...). Usable as a property name, never as a binding.
  KeywordReserved,
  LiteralBigInt,
  LiteralFalse,
  LiteralNull,
  LiteralNumber,
  LiteralRegex,
  LiteralString,
  LiteralTemplatePartString,
  LiteralTemplatePartStringEnd,
  LiteralTrue,
  ParenthesisClose,
  ParenthesisOpen,
  Percent,
  PercentEquals,
  Plus,
  PlusEquals,
  PlusPlus,
  Question,
  QuestionDot,
  QuestionQuestion,
  QuestionQuestionEquals,
  Semicolon,
  Slash,
  SlashEquals,
  Tilde,
}

impl TT {
  /// Words lexed as keywords, including `true`, `false` and `null`.
  pub fn is_keyword(self) -> bool {
    matches!(
      self,
      TT::KeywordAsync
        | TT::KeywordAwait
        | TT::KeywordBreak
        | TT::KeywordCatch
        | TT::KeywordClass
        | TT::KeywordConst
        | TT::KeywordContinue
        | TT::KeywordDebugger
        | TT::KeywordDelete
        | TT::KeywordDo
        | TT::KeywordElse
        | TT::KeywordExport
        | TT::KeywordFinally
        | TT::KeywordFor
        | TT::KeywordFunction
        | TT::KeywordIf
        | TT::KeywordImport
        | TT::KeywordIn
        | TT::KeywordInstanceof
        | TT::KeywordLet
        | TT::KeywordNew
        | TT::KeywordReturn
        | TT::KeywordSuper
        | TT::KeywordSwitch
        | TT::KeywordThis
        | TT::KeywordThrow
        | TT::KeywordTry
        | TT::KeywordTypeof
        | TT::KeywordVar
        | TT::KeywordVoid
        | TT::KeywordWhile
        | TT::KeywordWith
        | TT::KeywordYield
        | TT::KeywordReserved
        | TT::LiteralFalse
        | TT::LiteralNull
        | TT::LiteralTrue
    )
  }

  /// Keywords that may still be used as identifiers (`let`, `async`, ...) in the supported dialect.
  pub fn is_contextual_keyword(self) -> bool {
    matches!(self, TT::KeywordAsync | TT::KeywordLet)
  }
}

#[derive(Clone, Debug)]
pub struct Token {
  pub loc: Loc,
  pub typ: TT,
  pub preceded_by_line_terminator: bool,
}
