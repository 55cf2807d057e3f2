use crate::js::ast::*;
use crate::js::error::SyntaxError;
use crate::js::error::SyntaxErrorType;
use crate::js::error::SyntaxResult;
use crate::js::lex::lex_next;
use crate::js::lex::LexMode;
use crate::js::lex::Lexer;
use crate::js::loc::Loc;
use crate::js::token::Token;
use crate::js::token::TT;
use crate::value::parse_radix_digits;
use std::rc::Rc;

#[derive(Debug)]
#[must_use]
pub struct MaybeToken {
  typ: TT,
  loc: Loc,
  matched: bool,
}

impl MaybeToken {
  pub fn is_match(&self) -> bool {
    self.matched
  }

  pub fn error(&self, err: SyntaxErrorType) -> SyntaxError {
    debug_assert!(!self.matched);
    self.loc.error(err, Some(self.typ))
  }
}

pub struct ParserCheckpoint {
  next_tok_i: usize,
}

/// To get the lexer's `next` after this token was lexed, use `token.loc.1`.
struct BufferedToken {
  token: Token,
  lex_mode: LexMode,
}

pub struct Parser<'a> {
  lexer: Lexer<'a>,
  source: &'a str,
  buf: Vec<BufferedToken>,
  next_tok_i: usize,
  // Disallows the `in` operator while parsing the head of a `for` statement.
  no_in: bool,
  function_depth: usize,
  // Syntax nesting levels open around the current position; see `descend`.
  depth: usize,
}

/// How deeply statements and expressions may nest, counting each link of an operator or member
/// chain as one level. Bounds the recursion of parsing and of evaluating the resulting tree.
pub const MAX_NESTING_DEPTH: usize = 128;

/// Parses a whole script.
pub fn parse_program(source: &str) -> SyntaxResult<Program> {
  let mut parser = Parser::new(source);
  let mut body = Vec::new();
  while parser.peek().typ != TT::EOF {
    body.push(parser.parse_stmt()?);
  }
  Ok(Program { body })
}

/// Checks that `source` is exactly a formal parameter list, without the parentheses.
pub fn check_formal_parameters(source: &str) -> SyntaxResult<()> {
  let mut parser = Parser::new(source);
  parser.parse_params_until(TT::EOF)?;
  Ok(())
}

/// Checks that `source` is exactly a function body, without the braces.
pub fn check_function_body(source: &str) -> SyntaxResult<()> {
  let mut parser = Parser::new(source);
  parser.function_depth += 1;
  while parser.peek().typ != TT::EOF {
    parser.parse_stmt()?;
  }
  Ok(())
}

fn is_identifier_name(typ: TT) -> bool {
  typ == TT::Identifier || typ.is_keyword()
}

fn is_binding_identifier(typ: TT) -> bool {
  typ == TT::Identifier || typ.is_contextual_keyword()
}

impl<'a> Parser<'a> {
  pub fn new(source: &'a str) -> Parser<'a> {
    Parser {
      lexer: Lexer::new(source),
      source,
      buf: Vec::new(),
      next_tok_i: 0,
      no_in: false,
      function_depth: 0,
      depth: 0,
    }
  }

  pub fn str(&self, loc: Loc) -> &'a str {
    &self.source[loc.0..loc.1]
  }

  fn rc(&self, loc: Loc) -> Rc<str> {
    Rc::from(self.str(loc))
  }

  pub fn checkpoint(&self) -> ParserCheckpoint {
    ParserCheckpoint {
      next_tok_i: self.next_tok_i,
    }
  }

  pub fn restore_checkpoint(&mut self, checkpoint: ParserCheckpoint) {
    self.next_tok_i = checkpoint.next_tok_i;
  }

  fn reset_to(&mut self, n: usize) {
    self.next_tok_i = n;
    self.buf.truncate(n);
    match self.buf.last() {
      Some(t) => self.lexer.set_next(t.token.loc.1),
      None => self.lexer.set_next(0),
    };
  }

  fn forward<K: FnOnce(&Token) -> bool>(&mut self, mode: LexMode, keep: K) -> (bool, Token) {
    if self
      .buf
      .get(self.next_tok_i)
      .is_some_and(|t| t.lex_mode != mode)
    {
      self.reset_to(self.next_tok_i);
    }
    if self.buf.len() == self.next_tok_i {
      let token = lex_next(&mut self.lexer, mode);
      self.buf.push(BufferedToken {
        token,
        lex_mode: mode,
      });
    }
    let t = self.buf[self.next_tok_i].token.clone();
    let k = keep(&t);
    if k {
      self.next_tok_i += 1;
    };
    (k, t)
  }

  pub fn consume_with_mode(&mut self, mode: LexMode) -> Token {
    self.forward(mode, |_| true).1
  }

  pub fn consume(&mut self) -> Token {
    self.consume_with_mode(LexMode::Standard)
  }

  pub fn peek_with_mode(&mut self, mode: LexMode) -> Token {
    self.forward(mode, |_| false).1
  }

  pub fn peek(&mut self) -> Token {
    self.peek_with_mode(LexMode::Standard)
  }

  pub fn peek_2(&mut self) -> (Token, Token) {
    let cp = self.checkpoint();
    let a = self.forward(LexMode::Standard, |_| true);
    let b = self.forward(LexMode::Standard, |_| true);
    self.restore_checkpoint(cp);
    (a.1, b.1)
  }

  pub fn consume_if(&mut self, typ: TT) -> MaybeToken {
    let (matched, t) = self.forward(LexMode::Standard, |t| t.typ == typ);
    MaybeToken {
      typ,
      matched,
      loc: t.loc,
    }
  }

  pub fn require_with_mode(&mut self, typ: TT, mode: LexMode) -> SyntaxResult<Token> {
    let t = self.consume_with_mode(mode);
    if t.typ != typ {
      Err(t.loc.error(SyntaxErrorType::RequiredTokenNotFound(typ), Some(t.typ)))
    } else {
      Ok(t)
    }
  }

  pub fn require(&mut self, typ: TT) -> SyntaxResult<Token> {
    self.require_with_mode(typ, LexMode::Standard)
  }

  fn descend(&mut self, loc: Loc) -> SyntaxResult<()> {
    if self.depth >= MAX_NESTING_DEPTH {
      return Err(loc.error(SyntaxErrorType::NestingTooDeep, None));
    }
    self.depth += 1;
    Ok(())
  }

  /// Runs `f`, then closes every nesting level it opened, whether or not it succeeded.
  fn nested<T>(&mut self, f: impl FnOnce(&mut Self) -> SyntaxResult<T>) -> SyntaxResult<T> {
    let depth = self.depth;
    let result = f(self);
    self.depth = depth;
    result
  }

  fn unexpected(&self, t: &Token) -> SyntaxError {
    if t.typ == TT::EOF {
      t.loc.error(SyntaxErrorType::UnexpectedEnd, None)
    } else {
      t.loc.error(SyntaxErrorType::ExpectedSyntax("expression"), Some(t.typ))
    }
  }

  fn unsupported(&self, loc: Loc, what: &'static str) -> SyntaxError {
    loc.error(SyntaxErrorType::UnsupportedSyntax(what), None)
  }

  /// Automatic semicolon insertion for the restricted set of statement ends.
  fn require_semicolon(&mut self) -> SyntaxResult<()> {
    if self.consume_if(TT::Semicolon).is_match() {
      return Ok(());
    }
    let t = self.peek();
    if matches!(t.typ, TT::BraceClose | TT::EOF) || t.preceded_by_line_terminator {
      return Ok(());
    }
    Err(t.loc.error(SyntaxErrorType::RequiredTokenNotFound(TT::Semicolon), Some(t.typ)))
  }

  fn require_binding_identifier(&mut self) -> SyntaxResult<Rc<str>> {
    let t = self.consume();
    match t.typ {
      TT::BracketOpen | TT::BraceOpen => Err(self.unsupported(t.loc, "destructuring")),
      typ if is_binding_identifier(typ) => Ok(self.rc(t.loc)),
      _ => Err(t.loc.error(SyntaxErrorType::ExpectedSyntax("identifier"), Some(t.typ))),
    }
  }

  // Statements.

  pub fn parse_stmt(&mut self) -> SyntaxResult<Node<Stmt>> {
    let loc = self.peek().loc;
    self.nested(|p| {
      p.descend(loc)?;
      p.parse_stmt_unguarded()
    })
  }

  fn parse_stmt_unguarded(&mut self) -> SyntaxResult<Node<Stmt>> {
    let t = self.peek();
    let start = t.loc;
    let stmt = match t.typ {
      TT::BraceOpen => Stmt::Block(self.parse_block()?),
      TT::Semicolon => {
        self.consume();
        Stmt::Empty
      }
      TT::KeywordVar | TT::KeywordLet | TT::KeywordConst => {
        let decl = self.parse_var_decl()?;
        self.require_semicolon()?;
        Stmt::VarDecl(decl)
      }
      TT::KeywordFunction => {
        let func = self.parse_function(FuncKind::Normal, true)?;
        Stmt::FunctionDecl(func)
      }
      TT::KeywordIf => self.parse_if()?,
      TT::KeywordWhile => {
        self.consume();
        self.require(TT::ParenthesisOpen)?;
        let condition = self.parse_expr()?;
        self.require(TT::ParenthesisClose)?;
        let body = self.parse_stmt()?;
        Stmt::While { condition, body }
      }
      TT::KeywordDo => {
        self.consume();
        let body = self.parse_stmt()?;
        self.require(TT::KeywordWhile)?;
        self.require(TT::ParenthesisOpen)?;
        let condition = self.parse_expr()?;
        self.require(TT::ParenthesisClose)?;
        let _ = self.consume_if(TT::Semicolon);
        Stmt::DoWhile { body, condition }
      }
      TT::KeywordFor => self.parse_for()?,
      TT::KeywordReturn => {
        let kw = self.consume();
        if self.function_depth == 0 {
          return Err(kw.loc.error(SyntaxErrorType::ExpectedSyntax("return inside a function"), Some(kw.typ)));
        }
        let next = self.peek();
        let value = if matches!(next.typ, TT::Semicolon | TT::BraceClose | TT::EOF)
          || next.preceded_by_line_terminator
        {
          None
        } else {
          Some(self.parse_expr()?)
        };
        self.require_semicolon()?;
        Stmt::Return(value)
      }
      TT::KeywordBreak | TT::KeywordContinue => {
        let kw = self.consume();
        let next = self.peek();
        if next.typ == TT::Identifier && !next.preceded_by_line_terminator {
          return Err(self.unsupported(next.loc, "labels"));
        }
        self.require_semicolon()?;
        if kw.typ == TT::KeywordBreak {
          Stmt::Break
        } else {
          Stmt::Continue
        }
      }
      TT::KeywordThrow => {
        self.consume();
        let next = self.peek();
        if next.preceded_by_line_terminator {
          return Err(next.loc.error(SyntaxErrorType::LineTerminatorAfterThrow, Some(next.typ)));
        }
        let value = self.parse_expr()?;
        self.require_semicolon()?;
        Stmt::Throw(value)
      }
      TT::KeywordTry => self.parse_try()?,
      TT::KeywordDebugger => {
        self.consume();
        self.require_semicolon()?;
        Stmt::Debugger
      }
      TT::KeywordClass => return Err(self.unsupported(t.loc, "classes")),
      TT::KeywordSwitch => return Err(self.unsupported(t.loc, "switch statements")),
      TT::KeywordWith => return Err(self.unsupported(t.loc, "with statements")),
      TT::KeywordImport | TT::KeywordExport => return Err(self.unsupported(t.loc, "modules")),
      TT::KeywordAsync => return Err(self.unsupported(t.loc, "async functions")),
      TT::Identifier if self.peek_2().1.typ == TT::Colon => {
        return Err(self.unsupported(t.loc, "labels"))
      }
      _ => {
        let expr = self.parse_expr()?;
        self.require_semicolon()?;
        Stmt::Expr(expr)
      }
    };
    Ok(Node::new(start.to(self.last_loc()), stmt))
  }

  fn last_loc(&self) -> Loc {
    self
      .next_tok_i
      .checked_sub(1)
      .and_then(|i| self.buf.get(i))
      .map(|t| t.token.loc)
      .unwrap_or_default()
  }

  fn parse_block(&mut self) -> SyntaxResult<Vec<Node<Stmt>>> {
    self.require(TT::BraceOpen)?;
    let mut body = Vec::new();
    while self.peek().typ != TT::BraceClose {
      if self.peek().typ == TT::EOF {
        let t = self.peek();
        return Err(t.loc.error(SyntaxErrorType::UnexpectedEnd, None));
      }
      body.push(self.parse_stmt()?);
    }
    self.require(TT::BraceClose)?;
    Ok(body)
  }

  fn parse_var_decl(&mut self) -> SyntaxResult<VarDecl> {
    let t = self.consume();
    let mode = match t.typ {
      TT::KeywordVar => VarDeclMode::Var,
      TT::KeywordLet => VarDeclMode::Let,
      _ => VarDeclMode::Const,
    };
    let mut declarators = Vec::new();
    loop {
      let name = self.require_binding_identifier()?;
      let initializer = if self.consume_if(TT::Equals).is_match() {
        Some(self.parse_assign()?)
      } else {
        None
      };
      declarators.push(VarDeclarator { name, initializer });
      if !self.consume_if(TT::Comma).is_match() {
        break;
      }
    }
    Ok(VarDecl { mode, declarators })
  }

  fn parse_if(&mut self) -> SyntaxResult<Stmt> {
    self.require(TT::KeywordIf)?;
    self.require(TT::ParenthesisOpen)?;
    let test = self.parse_expr()?;
    self.require(TT::ParenthesisClose)?;
    let consequent = self.parse_stmt()?;
    let alternate = if self.consume_if(TT::KeywordElse).is_match() {
      Some(self.parse_stmt()?)
    } else {
      None
    };
    Ok(Stmt::If {
      test,
      consequent,
      alternate,
    })
  }

  fn parse_for(&mut self) -> SyntaxResult<Stmt> {
    self.require(TT::KeywordFor)?;
    let t = self.peek();
    if t.typ == TT::KeywordAwait {
      return Err(self.unsupported(t.loc, "for await"));
    }
    self.require(TT::ParenthesisOpen)?;

    let prev_no_in = self.no_in;
    self.no_in = true;
    let init = match self.peek().typ {
      TT::Semicolon => None,
      TT::KeywordVar | TT::KeywordLet | TT::KeywordConst => Some(ForInit::Decl(self.parse_var_decl()?)),
      _ => Some(ForInit::Expr(self.parse_expr()?)),
    };
    self.no_in = prev_no_in;

    let next = self.peek();
    let is_of = next.typ == TT::Identifier && self.str(next.loc) == "of";
    if next.typ == TT::KeywordIn || is_of {
      self.consume();
      let head = match init {
        Some(ForInit::Decl(mut decl)) => {
          if decl.declarators.len() != 1 || decl.declarators[0].initializer.is_some() {
            return Err(next.loc.error(
              SyntaxErrorType::ExpectedSyntax("a single binding without initializer"),
              Some(next.typ),
            ));
          }
          let declarator = decl.declarators.remove(0);
          ForHead::Decl(decl.mode, declarator.name)
        }
        Some(ForInit::Expr(expr)) if expr.stx.is_valid_assignment_target() => ForHead::Target(expr),
        _ => {
          return Err(next.loc.error(SyntaxErrorType::InvalidAssigmentTarget, Some(next.typ)));
        }
      };
      let right = if is_of { self.parse_assign()? } else { self.parse_expr()? };
      self.require(TT::ParenthesisClose)?;
      let body = self.parse_stmt()?;
      return Ok(if is_of {
        Stmt::ForOf {
          head,
          iterable: right,
          body,
        }
      } else {
        Stmt::ForIn {
          head,
          object: right,
          body,
        }
      });
    }

    self.require(TT::Semicolon)?;
    let condition = if self.peek().typ == TT::Semicolon {
      None
    } else {
      Some(self.parse_expr()?)
    };
    self.require(TT::Semicolon)?;
    let update = if self.peek().typ == TT::ParenthesisClose {
      None
    } else {
      Some(self.parse_expr()?)
    };
    self.require(TT::ParenthesisClose)?;
    let body = self.parse_stmt()?;
    Ok(Stmt::For {
      init,
      condition,
      update,
      body,
    })
  }

  fn parse_try(&mut self) -> SyntaxResult<Stmt> {
    let kw = self.require(TT::KeywordTry)?;
    let wrapped = self.parse_block()?;
    let catch = if self.consume_if(TT::KeywordCatch).is_match() {
      let param = if self.consume_if(TT::ParenthesisOpen).is_match() {
        let name = self.require_binding_identifier()?;
        self.require(TT::ParenthesisClose)?;
        Some(name)
      } else {
        None
      };
      let body = self.parse_block()?;
      Some(CatchClause { param, body })
    } else {
      None
    };
    let finally = if self.consume_if(TT::KeywordFinally).is_match() {
      Some(self.parse_block()?)
    } else {
      None
    };
    if catch.is_none() && finally.is_none() {
      return Err(kw.loc.error(SyntaxErrorType::TryStatementHasNoCatchOrFinally, None));
    }
    Ok(Stmt::Try {
      wrapped,
      catch,
      finally,
    })
  }

  // Functions.

  fn parse_params_until(&mut self, end: TT) -> SyntaxResult<Vec<Param>> {
    let mut params = Vec::new();
    while self.peek().typ != end {
      if self.consume_if(TT::DotDotDot).is_match() {
        let name = self.require_binding_identifier()?;
        params.push(Param {
          name,
          default_value: None,
          rest: true,
        });
        break;
      }
      let name = self.require_binding_identifier()?;
      let default_value = if self.consume_if(TT::Equals).is_match() {
        Some(self.parse_assign()?)
      } else {
        None
      };
      params.push(Param {
        name,
        default_value,
        rest: false,
      });
      if !self.consume_if(TT::Comma).is_match() {
        break;
      }
    }
    self.require(end)?;
    Ok(params)
  }

  fn parse_function_body(&mut self) -> SyntaxResult<Vec<Node<Stmt>>> {
    let prev_no_in = self.no_in;
    self.no_in = false;
    self.function_depth += 1;
    let body = self.parse_block();
    self.function_depth -= 1;
    self.no_in = prev_no_in;
    body
  }

  /// Parses `function name?(params) { body }`.
  fn parse_function(&mut self, kind: FuncKind, require_name: bool) -> SyntaxResult<Rc<Func>> {
    let start = self.require(TT::KeywordFunction)?.loc;
    if self.peek().typ == TT::Asterisk {
      let t = self.peek();
      return Err(self.unsupported(t.loc, "generators"));
    }
    let name = if is_binding_identifier(self.peek().typ) {
      Some(self.require_binding_identifier()?)
    } else if require_name {
      let t = self.peek();
      return Err(t.loc.error(SyntaxErrorType::ExpectedSyntax("function name"), Some(t.typ)));
    } else {
      None
    };
    self.require(TT::ParenthesisOpen)?;
    let params = self.parse_params_until(TT::ParenthesisClose)?;
    let body = self.parse_function_body()?;
    let loc = start.to(self.last_loc());
    Ok(Rc::new(Func {
      name,
      kind,
      params,
      body: FuncBody::Block(body),
      text: self.rc(loc),
      loc,
    }))
  }

  /// Parses `(params) { body }` after a method key.
  fn parse_method(&mut self, start: Loc, name: Option<Rc<str>>) -> SyntaxResult<Rc<Func>> {
    self.require(TT::ParenthesisOpen)?;
    let params = self.parse_params_until(TT::ParenthesisClose)?;
    let body = self.parse_function_body()?;
    let loc = start.to(self.last_loc());
    Ok(Rc::new(Func {
      name,
      kind: FuncKind::Method,
      params,
      body: FuncBody::Block(body),
      text: self.rc(loc),
      loc,
    }))
  }

  fn parse_arrow_body(&mut self, start: Loc, params: Vec<Param>) -> SyntaxResult<Node<Expr>> {
    let arrow = self.require(TT::EqualsChevronRight)?;
    if arrow.preceded_by_line_terminator {
      return Err(arrow.loc.error(
        SyntaxErrorType::LineTerminatorAfterArrowFunctionParameters,
        Some(arrow.typ),
      ));
    }
    let body = if self.peek().typ == TT::BraceOpen {
      FuncBody::Block(self.parse_function_body()?)
    } else {
      self.function_depth += 1;
      let expr = self.parse_assign();
      self.function_depth -= 1;
      FuncBody::Expression(expr?)
    };
    let loc = start.to(self.last_loc());
    let func = Rc::new(Func {
      name: None,
      kind: FuncKind::Arrow,
      params,
      body,
      text: self.rc(loc),
      loc,
    });
    Ok(Node::new(loc, Expr::Function(func)))
  }

  /// Attempts `(params) =>`; restores the position if this is not an arrow function head.
  fn try_parse_arrow_params(&mut self) -> Option<Vec<Param>> {
    let cp = self.checkpoint();
    let attempt = (|| -> SyntaxResult<Vec<Param>> {
      self.require(TT::ParenthesisOpen)?;
      self.parse_params_until(TT::ParenthesisClose)
    })();
    match attempt {
      Ok(params) if self.peek().typ == TT::EqualsChevronRight => Some(params),
      _ => {
        self.restore_checkpoint(cp);
        None
      }
    }
  }

  // Expressions.

  pub fn parse_expr(&mut self) -> SyntaxResult<Node<Expr>> {
    let first = self.parse_assign()?;
    if self.peek().typ != TT::Comma {
      return Ok(first);
    }
    let mut loc = first.loc;
    let mut exprs = vec![first];
    while self.consume_if(TT::Comma).is_match() {
      let next = self.parse_assign()?;
      loc.extend(next.loc);
      exprs.push(next);
    }
    Ok(Node::new(loc, Expr::Sequence(exprs)))
  }

  pub fn parse_assign(&mut self) -> SyntaxResult<Node<Expr>> {
    let loc = self.peek().loc;
    self.nested(|p| {
      p.descend(loc)?;
      p.parse_assign_unguarded()
    })
  }

  fn parse_assign_unguarded(&mut self) -> SyntaxResult<Node<Expr>> {
    let (t, next) = self.peek_2();
    if is_binding_identifier(t.typ) && next.typ == TT::EqualsChevronRight {
      self.consume();
      let params = vec![Param {
        name: self.rc(t.loc),
        default_value: None,
        rest: false,
      }];
      return self.parse_arrow_body(t.loc, params);
    }
    if t.typ == TT::KeywordAsync && matches!(next.typ, TT::KeywordFunction | TT::Identifier | TT::ParenthesisOpen) {
      return Err(self.unsupported(t.loc, "async functions"));
    }
    if t.typ == TT::ParenthesisOpen {
      if let Some(params) = self.try_parse_arrow_params() {
        return self.parse_arrow_body(t.loc, params);
      }
    }

    let target = self.parse_conditional()?;
    let op_token = self.peek();
    let op = match op_token.typ {
      TT::Equals => AssignOp::Assign,
      TT::PlusEquals => AssignOp::Binary(BinaryOp::Add),
      TT::HyphenEquals => AssignOp::Binary(BinaryOp::Subtract),
      TT::AsteriskEquals => AssignOp::Binary(BinaryOp::Multiply),
      TT::SlashEquals => AssignOp::Binary(BinaryOp::Divide),
      TT::PercentEquals => AssignOp::Binary(BinaryOp::Remainder),
      TT::AsteriskAsteriskEquals => AssignOp::Binary(BinaryOp::Exponentiate),
      TT::ChevronLeftChevronLeftEquals => AssignOp::Binary(BinaryOp::ShiftLeft),
      TT::ChevronRightChevronRightEquals => AssignOp::Binary(BinaryOp::ShiftRight),
      TT::ChevronRightChevronRightChevronRightEquals => AssignOp::Binary(BinaryOp::ShiftRightUnsigned),
      TT::AmpersandEquals => AssignOp::Binary(BinaryOp::BitwiseAnd),
      TT::BarEquals => AssignOp::Binary(BinaryOp::BitwiseOr),
      TT::CaretEquals => AssignOp::Binary(BinaryOp::BitwiseXor),
      TT::AmpersandAmpersandEquals => AssignOp::Logical(LogicalOp::And),
      TT::BarBarEquals => AssignOp::Logical(LogicalOp::Or),
      TT::QuestionQuestionEquals => AssignOp::Logical(LogicalOp::Coalesce),
      _ => return Ok(target),
    };
    if !target.stx.is_valid_assignment_target() {
      if matches!(*target.stx, Expr::Array(_) | Expr::Object(_)) {
        return Err(self.unsupported(target.loc, "destructuring"));
      }
      return Err(target.loc.error(SyntaxErrorType::InvalidAssigmentTarget, Some(op_token.typ)));
    }
    self.consume();
    let value = self.parse_assign()?;
    let loc = target.loc.to(value.loc);
    Ok(Node::new(loc, Expr::Assign { op, target, value }))
  }

  fn parse_conditional(&mut self) -> SyntaxResult<Node<Expr>> {
    let test = self.parse_binary(0)?;
    if !self.consume_if(TT::Question).is_match() {
      return Ok(test);
    }
    let prev_no_in = self.no_in;
    self.no_in = false;
    let consequent = self.parse_assign();
    self.no_in = prev_no_in;
    let consequent = consequent?;
    self.require(TT::Colon)?;
    let alternate = self.parse_assign()?;
    let loc = test.loc.to(alternate.loc);
    Ok(Node::new(loc, Expr::Conditional {
      test,
      consequent,
      alternate,
    }))
  }

  fn binary_operator(&self, typ: TT) -> Option<(u8, Result<BinaryOp, LogicalOp>)> {
    Some(match typ {
      TT::QuestionQuestion => (1, Err(LogicalOp::Coalesce)),
      TT::BarBar => (1, Err(LogicalOp::Or)),
      TT::AmpersandAmpersand => (2, Err(LogicalOp::And)),
      TT::Bar => (3, Ok(BinaryOp::BitwiseOr)),
      TT::Caret => (4, Ok(BinaryOp::BitwiseXor)),
      TT::Ampersand => (5, Ok(BinaryOp::BitwiseAnd)),
      TT::EqualsEquals => (6, Ok(BinaryOp::Equality)),
      TT::ExclamationEquals => (6, Ok(BinaryOp::Inequality)),
      TT::EqualsEqualsEquals => (6, Ok(BinaryOp::StrictEquality)),
      TT::ExclamationEqualsEquals => (6, Ok(BinaryOp::StrictInequality)),
      TT::ChevronLeft => (7, Ok(BinaryOp::LessThan)),
      TT::ChevronLeftEquals => (7, Ok(BinaryOp::LessThanOrEqual)),
      TT::ChevronRight => (7, Ok(BinaryOp::GreaterThan)),
      TT::ChevronRightEquals => (7, Ok(BinaryOp::GreaterThanOrEqual)),
      TT::KeywordInstanceof => (7, Ok(BinaryOp::Instanceof)),
      TT::KeywordIn if !self.no_in => (7, Ok(BinaryOp::In)),
      TT::ChevronLeftChevronLeft => (8, Ok(BinaryOp::ShiftLeft)),
      TT::ChevronRightChevronRight => (8, Ok(BinaryOp::ShiftRight)),
      TT::ChevronRightChevronRightChevronRight => (8, Ok(BinaryOp::ShiftRightUnsigned)),
      TT::Plus => (9, Ok(BinaryOp::Add)),
      TT::Hyphen => (9, Ok(BinaryOp::Subtract)),
      TT::Asterisk => (10, Ok(BinaryOp::Multiply)),
      TT::Slash => (10, Ok(BinaryOp::Divide)),
      TT::Percent => (10, Ok(BinaryOp::Remainder)),
      TT::AsteriskAsterisk => (11, Ok(BinaryOp::Exponentiate)),
      _ => return None,
    })
  }

  fn parse_binary(&mut self, min_prec: u8) -> SyntaxResult<Node<Expr>> {
    self.nested(|p| p.parse_binary_chain(min_prec))
  }

  fn parse_binary_chain(&mut self, min_prec: u8) -> SyntaxResult<Node<Expr>> {
    let mut left = self.parse_unary()?;
    loop {
      let t = self.peek();
      let Some((prec, op)) = self.binary_operator(t.typ) else {
        break;
      };
      if prec < min_prec {
        break;
      }
      self.descend(t.loc)?;
      self.consume();
      // Exponentiation is right-associative.
      let right = if t.typ == TT::AsteriskAsterisk {
        self.parse_binary(prec)?
      } else {
        self.parse_binary(prec + 1)?
      };
      let loc = left.loc.to(right.loc);
      left = Node::new(loc, match op {
        Ok(op) => Expr::Binary { op, left, right },
        Err(op) => Expr::Logical { op, left, right },
      });
    }
    Ok(left)
  }

  fn parse_unary(&mut self) -> SyntaxResult<Node<Expr>> {
    let loc = self.peek_with_mode(LexMode::SlashIsRegex).loc;
    self.nested(|p| {
      p.descend(loc)?;
      p.parse_unary_unguarded()
    })
  }

  fn parse_unary_unguarded(&mut self) -> SyntaxResult<Node<Expr>> {
    let t = self.peek_with_mode(LexMode::SlashIsRegex);
    let op = match t.typ {
      TT::Exclamation => UnaryOp::LogicalNot,
      TT::Tilde => UnaryOp::BitwiseNot,
      TT::Plus => UnaryOp::Plus,
      TT::Hyphen => UnaryOp::Minus,
      TT::KeywordTypeof => UnaryOp::Typeof,
      TT::KeywordVoid => UnaryOp::Void,
      TT::KeywordDelete => UnaryOp::Delete,
      TT::PlusPlus | TT::HyphenHyphen => {
        self.consume_with_mode(LexMode::SlashIsRegex);
        let argument = self.parse_unary()?;
        if !argument.stx.is_valid_assignment_target() {
          return Err(argument.loc.error(SyntaxErrorType::InvalidAssigmentTarget, None));
        }
        let loc = t.loc.to(argument.loc);
        return Ok(Node::new(loc, Expr::Update {
          op: if t.typ == TT::PlusPlus {
            UpdateOp::Increment
          } else {
            UpdateOp::Decrement
          },
          prefix: true,
          argument,
        }));
      }
      TT::KeywordAwait => return Err(self.unsupported(t.loc, "await")),
      _ => return self.parse_postfix(),
    };
    self.consume_with_mode(LexMode::SlashIsRegex);
    let argument = self.parse_unary()?;
    if self.peek().typ == TT::AsteriskAsterisk {
      let next = self.peek();
      return Err(next.loc.error(
        SyntaxErrorType::ExpectedSyntax("parenthesized unary expression before **"),
        Some(next.typ),
      ));
    }
    let loc = t.loc.to(argument.loc);
    Ok(Node::new(loc, Expr::Unary { op, argument }))
  }

  fn parse_postfix(&mut self) -> SyntaxResult<Node<Expr>> {
    let argument = self.parse_call_or_member()?;
    let t = self.peek();
    if matches!(t.typ, TT::PlusPlus | TT::HyphenHyphen) && !t.preceded_by_line_terminator {
      if !argument.stx.is_valid_assignment_target() {
        return Err(argument.loc.error(SyntaxErrorType::InvalidAssigmentTarget, Some(t.typ)));
      }
      self.consume();
      let loc = argument.loc.to(t.loc);
      return Ok(Node::new(loc, Expr::Update {
        op: if t.typ == TT::PlusPlus {
          UpdateOp::Increment
        } else {
          UpdateOp::Decrement
        },
        prefix: false,
        argument,
      }));
    }
    Ok(argument)
  }

  fn parse_args(&mut self) -> SyntaxResult<Vec<CallArg>> {
    self.require(TT::ParenthesisOpen)?;
    let prev_no_in = self.no_in;
    self.no_in = false;
    let mut args = Vec::new();
    let result = (|| {
      while self.peek().typ != TT::ParenthesisClose {
        let spread = self.consume_if(TT::DotDotDot).is_match();
        let value = self.parse_assign()?;
        args.push(CallArg { spread, value });
        if !self.consume_if(TT::Comma).is_match() {
          break;
        }
      }
      self.require(TT::ParenthesisClose).map(|_| ())
    })();
    self.no_in = prev_no_in;
    result.map(|_| args)
  }

  fn parse_member_name(&mut self) -> SyntaxResult<Rc<str>> {
    let t = self.consume();
    if !is_identifier_name(t.typ) {
      return Err(t.loc.error(SyntaxErrorType::ExpectedSyntax("property name"), Some(t.typ)));
    }
    Ok(self.rc(t.loc))
  }

  /// Member accesses and, unless parsing a `new` callee, calls.
  fn parse_member_suffixes(&mut self, expr: Node<Expr>, allow_call: bool) -> SyntaxResult<Node<Expr>> {
    self.nested(|p| p.parse_member_chain(expr, allow_call))
  }

  fn parse_member_chain(&mut self, mut expr: Node<Expr>, allow_call: bool) -> SyntaxResult<Node<Expr>> {
    loop {
      let t = self.peek();
      if matches!(t.typ, TT::Dot | TT::BracketOpen) || (allow_call && t.typ == TT::ParenthesisOpen) {
        self.descend(t.loc)?;
      }
      match t.typ {
        TT::Dot => {
          self.consume();
          let member = self.parse_member_name()?;
          let loc = expr.loc.to(self.last_loc());
          expr = Node::new(loc, Expr::Member {
            object: expr,
            member,
          });
        }
        TT::BracketOpen => {
          self.consume();
          let prev_no_in = self.no_in;
          self.no_in = false;
          let member = self.parse_expr();
          self.no_in = prev_no_in;
          let member = member?;
          let end = self.require(TT::BracketClose)?;
          let loc = expr.loc.to(end.loc);
          expr = Node::new(loc, Expr::ComputedMember {
            object: expr,
            member,
          });
        }
        TT::ParenthesisOpen if allow_call => {
          let args = self.parse_args()?;
          let loc = expr.loc.to(self.last_loc());
          expr = Node::new(loc, Expr::Call { callee: expr, args });
        }
        TT::QuestionDot => return Err(self.unsupported(t.loc, "optional chaining")),
        TT::LiteralTemplatePartString | TT::LiteralTemplatePartStringEnd => {
          return Err(self.unsupported(t.loc, "tagged templates"))
        }
        _ => return Ok(expr),
      }
    }
  }

  fn parse_call_or_member(&mut self) -> SyntaxResult<Node<Expr>> {
    let t = self.peek_with_mode(LexMode::SlashIsRegex);
    let expr = if t.typ == TT::KeywordNew {
      self.parse_new()?
    } else {
      self.parse_primary()?
    };
    self.parse_member_suffixes(expr, true)
  }

  fn parse_new(&mut self) -> SyntaxResult<Node<Expr>> {
    let loc = self.peek().loc;
    self.nested(|p| {
      p.descend(loc)?;
      p.parse_new_unguarded()
    })
  }

  fn parse_new_unguarded(&mut self) -> SyntaxResult<Node<Expr>> {
    let start = self.require(TT::KeywordNew)?.loc;
    if self.peek().typ == TT::Dot {
      let t = self.peek();
      return Err(self.unsupported(t.loc, "new.target"));
    }
    let callee = if self.peek_with_mode(LexMode::SlashIsRegex).typ == TT::KeywordNew {
      self.parse_new()?
    } else {
      self.parse_primary()?
    };
    let callee = self.parse_member_suffixes(callee, false)?;
    let args = if self.peek().typ == TT::ParenthesisOpen {
      self.parse_args()?
    } else {
      Vec::new()
    };
    let loc = start.to(self.last_loc());
    Ok(Node::new(loc, Expr::New { callee, args }))
  }

  fn parse_primary(&mut self) -> SyntaxResult<Node<Expr>> {
    let t = self.peek_with_mode(LexMode::SlashIsRegex);
    let expr = match t.typ {
      TT::Identifier | TT::KeywordAsync | TT::KeywordLet => {
        self.consume_with_mode(LexMode::SlashIsRegex);
        Expr::Id(self.rc(t.loc))
      }
      TT::KeywordThis => {
        self.consume_with_mode(LexMode::SlashIsRegex);
        Expr::This
      }
      TT::LiteralNull => {
        self.consume_with_mode(LexMode::SlashIsRegex);
        Expr::Null
      }
      TT::LiteralTrue | TT::LiteralFalse => {
        self.consume_with_mode(LexMode::SlashIsRegex);
        Expr::Bool(t.typ == TT::LiteralTrue)
      }
      TT::LiteralNumber => {
        self.consume_with_mode(LexMode::SlashIsRegex);
        Expr::Number(self.parse_number(t.loc)?)
      }
      TT::LiteralBigInt => return Err(self.unsupported(t.loc, "BigInt literals")),
      TT::LiteralString => {
        self.consume_with_mode(LexMode::SlashIsRegex);
        let raw = self.str(Loc(t.loc.0 + 1, t.loc.1 - 1));
        let cooked = decode_escapes(raw)
          .map_err(|_| t.loc.error(SyntaxErrorType::InvalidCharacterEscape, Some(t.typ)))?;
        Expr::String(Rc::from(cooked))
      }
      TT::LiteralRegex => {
        self.consume_with_mode(LexMode::SlashIsRegex);
        let raw = self.str(t.loc);
        let end = raw.rfind('/').unwrap_or(raw.len());
        Expr::Regex {
          pattern: Rc::from(&raw[1..end.max(1)]),
          flags: Rc::from(&raw[(end + 1).min(raw.len())..]),
        }
      }
      TT::LiteralTemplatePartString | TT::LiteralTemplatePartStringEnd => {
        return self.parse_template();
      }
      TT::ParenthesisOpen => {
        self.consume_with_mode(LexMode::SlashIsRegex);
        let prev_no_in = self.no_in;
        self.no_in = false;
        let inner = self.parse_expr();
        self.no_in = prev_no_in;
        let inner = inner?;
        self.require(TT::ParenthesisClose)?;
        return Ok(inner);
      }
      TT::BracketOpen => return self.parse_array(),
      TT::BraceOpen => return self.parse_object(),
      TT::KeywordFunction => {
        let func = self.parse_function(FuncKind::Normal, false)?;
        let loc = func.loc;
        return Ok(Node::new(loc, Expr::Function(func)));
      }
      TT::KeywordClass => return Err(self.unsupported(t.loc, "classes")),
      TT::KeywordSuper => return Err(self.unsupported(t.loc, "super")),
      TT::KeywordImport => return Err(self.unsupported(t.loc, "import expressions")),
      TT::KeywordYield => return Err(self.unsupported(t.loc, "generators")),
      _ => return Err(self.unexpected(&t)),
    };
    Ok(Node::new(t.loc, expr))
  }

  fn parse_number(&self, loc: Loc) -> SyntaxResult<f64> {
    let raw = self.str(loc);
    let radix = match raw.get(..2) {
      Some("0x") | Some("0X") => Some(16),
      Some("0o") | Some("0O") => Some(8),
      Some("0b") | Some("0B") => Some(2),
      _ => None,
    };
    let value = match radix {
      Some(radix) => parse_radix_digits(&raw[2..], radix),
      None => raw.parse::<f64>().ok(),
    };
    value.ok_or_else(|| loc.error(SyntaxErrorType::MalformedLiteralNumber, Some(TT::LiteralNumber)))
  }

  fn parse_template(&mut self) -> SyntaxResult<Node<Expr>> {
    let first = self.consume_with_mode(LexMode::SlashIsRegex);
    let start = first.loc;
    let mut quasis = Vec::new();
    let mut substitutions = Vec::new();
    let mut part = first;
    loop {
      let ended = part.typ == TT::LiteralTemplatePartStringEnd;
      if part.typ == TT::Invalid {
        return Err(part.loc.error(SyntaxErrorType::UnexpectedEnd, Some(part.typ)));
      }
      let raw = self.str(part.loc);
      // Strip the leading backtick (first part only) and the trailing "`" or "${".
      let inner_start = if quasis.is_empty() { 1 } else { 0 };
      let inner_end = raw.len() - if ended { 1 } else { 2 };
      let cooked = decode_escapes(&raw[inner_start..inner_end])
        .map_err(|_| part.loc.error(SyntaxErrorType::InvalidCharacterEscape, Some(part.typ)))?;
      quasis.push(Rc::from(cooked));
      if ended {
        break;
      }
      let prev_no_in = self.no_in;
      self.no_in = false;
      let expr = self.parse_expr();
      self.no_in = prev_no_in;
      substitutions.push(expr?);
      self.require(TT::BraceClose)?;
      part = self.consume_with_mode(LexMode::TemplateStrContinue);
    }
    let loc = start.to(self.last_loc());
    Ok(Node::new(loc, Expr::Template {
      quasis,
      substitutions,
    }))
  }

  fn parse_array(&mut self) -> SyntaxResult<Node<Expr>> {
    let start = self.require_with_mode(TT::BracketOpen, LexMode::SlashIsRegex)?.loc;
    let prev_no_in = self.no_in;
    self.no_in = false;
    let mut elements = Vec::new();
    let result = (|| {
      loop {
        if self.peek().typ == TT::BracketClose {
          break;
        }
        if self.consume_if(TT::Comma).is_match() {
          elements.push(ArrayElement::Hole);
          continue;
        }
        if self.consume_if(TT::DotDotDot).is_match() {
          elements.push(ArrayElement::Spread(self.parse_assign()?));
        } else {
          elements.push(ArrayElement::Single(self.parse_assign()?));
        }
        if !self.consume_if(TT::Comma).is_match() {
          break;
        }
      }
      self.require(TT::BracketClose).map(|_| ())
    })();
    self.no_in = prev_no_in;
    result?;
    let loc = start.to(self.last_loc());
    Ok(Node::new(loc, Expr::Array(elements)))
  }

  fn parse_prop_key(&mut self) -> SyntaxResult<PropKey> {
    let t = self.consume();
    Ok(match t.typ {
      TT::BracketOpen => {
        let key = self.parse_assign()?;
        self.require(TT::BracketClose)?;
        PropKey::Computed(key)
      }
      TT::LiteralString => {
        let raw = self.str(Loc(t.loc.0 + 1, t.loc.1 - 1));
        let cooked = decode_escapes(raw)
          .map_err(|_| t.loc.error(SyntaxErrorType::InvalidCharacterEscape, Some(t.typ)))?;
        PropKey::Static(Rc::from(cooked))
      }
      TT::LiteralNumber => {
        let n = self.parse_number(t.loc)?;
        PropKey::Static(Rc::from(crate::value::number_to_string(n)))
      }
      typ if is_identifier_name(typ) => PropKey::Static(self.rc(t.loc)),
      _ => {
        return Err(t.loc.error(SyntaxErrorType::ExpectedSyntax("property name"), Some(t.typ)));
      }
    })
  }

  fn parse_object(&mut self) -> SyntaxResult<Node<Expr>> {
    let start = self.require_with_mode(TT::BraceOpen, LexMode::SlashIsRegex)?.loc;
    let prev_no_in = self.no_in;
    self.no_in = false;
    let mut members = Vec::new();
    let result = (|| {
      while self.peek().typ != TT::BraceClose {
        members.push(self.parse_object_member()?);
        if !self.consume_if(TT::Comma).is_match() {
          break;
        }
      }
      self.require(TT::BraceClose).map(|_| ())
    })();
    self.no_in = prev_no_in;
    result?;
    let loc = start.to(self.last_loc());
    Ok(Node::new(loc, Expr::Object(members)))
  }

  fn parse_object_member(&mut self) -> SyntaxResult<ObjectMember> {
    let (t, next) = self.peek_2();
    if t.typ == TT::DotDotDot {
      self.consume();
      return Ok(ObjectMember::Spread(self.parse_assign()?));
    }
    if t.typ == TT::Asterisk {
      return Err(self.unsupported(t.loc, "generators"));
    }
    if t.typ == TT::KeywordAsync && !matches!(next.typ, TT::Colon | TT::ParenthesisOpen | TT::Comma | TT::BraceClose) {
      return Err(self.unsupported(t.loc, "async functions"));
    }
    let accessor = t.typ == TT::Identifier
      && matches!(self.str(t.loc), "get" | "set")
      && !matches!(
        next.typ,
        TT::Colon | TT::ParenthesisOpen | TT::Comma | TT::BraceClose | TT::Equals
      );
    if accessor {
      let is_get = self.str(t.loc) == "get";
      self.consume();
      let key = self.parse_prop_key()?;
      let name = match &key {
        PropKey::Static(name) => Some(Rc::from(format!("{} {}", if is_get { "get" } else { "set" }, name))),
        PropKey::Computed(_) => None,
      };
      let func = self.parse_method(t.loc, name)?;
      return Ok(if is_get {
        ObjectMember::Getter { key, func }
      } else {
        ObjectMember::Setter { key, func }
      });
    }
    let key = self.parse_prop_key()?;
    let after = self.peek();
    match after.typ {
      TT::Colon => {
        self.consume();
        let value = self.parse_assign()?;
        Ok(ObjectMember::Value { key, value })
      }
      TT::ParenthesisOpen => {
        let name = match &key {
          PropKey::Static(name) => Some(name.clone()),
          PropKey::Computed(_) => None,
        };
        let func = self.parse_method(t.loc, name)?;
        let loc = func.loc;
        Ok(ObjectMember::Value {
          key,
          value: Node::new(loc, Expr::Function(func)),
        })
      }
      _ => match key {
        PropKey::Static(name) if is_binding_identifier(t.typ) => {
          if after.typ == TT::Equals {
            return Err(self.unsupported(after.loc, "destructuring"));
          }
          Ok(ObjectMember::Shorthand(name))
        }
        _ => Err(after.loc.error(SyntaxErrorType::RequiredTokenNotFound(TT::Colon), Some(after.typ))),
      },
    }
  }
}

/// Cooks the escape sequences of a string literal or template part.
pub fn decode_escapes(raw: &str) -> Result<String, ()> {
  let mut out = String::with_capacity(raw.len());
  let mut chars = raw.chars().peekable();
  while let Some(c) = chars.next() {
    if c != '\\' {
      out.push(c);
      continue;
    }
    let Some(e) = chars.next() else {
      return Err(());
    };
    match e {
      'n' => out.push('\n'),
      't' => out.push('\t'),
      'r' => out.push('\r'),
      'b' => out.push('\u{8}'),
      'f' => out.push('\u{c}'),
      'v' => out.push('\u{b}'),
      '0' if !chars.peek().is_some_and(|c| c.is_ascii_digit()) => out.push('\0'),
      // Line continuation.
      '\n' | '\u{2028}' | '\u{2029}' => {}
      '\r' => {
        if chars.peek() == Some(&'\n') {
          chars.next();
        }
      }
      'x' => {
        let hex: String = chars.by_ref().take(2).collect();
        let code = u32::from_str_radix(&hex, 16).map_err(|_| ())?;
        out.push(char::from_u32(code).ok_or(())?);
      }
      'u' => {
        let code = if chars.peek() == Some(&'{') {
          chars.next();
          let hex: String = chars.by_ref().take_while(|c| *c != '}').collect();
          u32::from_str_radix(&hex, 16).map_err(|_| ())?
        } else {
          let hex: String = chars.by_ref().take(4).collect();
          if hex.len() != 4 {
            return Err(());
          }
          u32::from_str_radix(&hex, 16).map_err(|_| ())?
        };
        match char::from_u32(code) {
          Some(ch) => out.push(ch),
          // Lone surrogates cannot be represented in UTF-8.
          None => out.push('\u{FFFD}'),
        }
      }
      '1'..='9' => return Err(()),
      other => out.push(other),
    }
  }
  Ok(out)
}

#[cfg(test)]
mod tests {
  use super::*;

  fn parse_expr_str(src: &str) -> Node<Expr> {
    let mut parser = Parser::new(src);
    parser.parse_expr().unwrap()
  }

  #[test]
  fn binary_precedence_and_associativity() {
    let expr = parse_expr_str("1 + 2 * 3");
    match *expr.stx {
      Expr::Binary {
        op: BinaryOp::Add,
        ref right,
        ..
      } => assert!(matches!(*right.stx, Expr::Binary { op: BinaryOp::Multiply, .. })),
      ref other => panic!("unexpected {other:?}"),
    }
    let expr = parse_expr_str("2 ** 3 ** 2");
    match *expr.stx {
      Expr::Binary {
        op: BinaryOp::Exponentiate,
        ref right,
        ..
      } => assert!(matches!(*right.stx, Expr::Binary { op: BinaryOp::Exponentiate, .. })),
      ref other => panic!("unexpected {other:?}"),
    }
  }

  #[test]
  fn arrow_functions_keep_source_text() {
    let expr = parse_expr_str("(a, b) => a + b");
    let Expr::Function(func) = &*expr.stx else {
      panic!("expected arrow function");
    };
    assert_eq!(func.kind, FuncKind::Arrow);
    assert_eq!(func.params.len(), 2);
    assert_eq!(&*func.text, "(a, b) => a + b");
  }

  #[test]
  fn parenthesized_expression_is_not_an_arrow() {
    let expr = parse_expr_str("(a, b)");
    assert!(matches!(*expr.stx, Expr::Sequence(_)));
  }

  #[test]
  fn regex_literal_after_operator() {
    let program = parse_program("const r = /a\\/b/g;").unwrap();
    let Stmt::VarDecl(decl) = &*program.body[0].stx else {
      panic!("expected declaration");
    };
    let init = decl.declarators[0].initializer.as_ref().unwrap();
    match &*init.stx {
      Expr::Regex { pattern, flags } => {
        assert_eq!(&**pattern, "a\\/b");
        assert_eq!(&**flags, "g");
      }
      other => panic!("unexpected {other:?}"),
    }
  }

  #[test]
  fn asi_and_return_outside_function() {
    assert!(parse_program("let a = 1\nlet b = 2").is_ok());
    assert!(parse_program("let a = 1 let b = 2").is_err());
    let err = parse_program("return 1").unwrap_err();
    assert!(matches!(err.typ, SyntaxErrorType::ExpectedSyntax(_)));
  }

  #[test]
  fn unsupported_syntax_is_reported() {
    for src in ["class A {}", "with (a) {}", "import('x')", "let {a} = b;", "a: for(;;) {}"] {
      let err = parse_program(src).unwrap_err();
      assert!(
        matches!(err.typ, SyntaxErrorType::UnsupportedSyntax(_)),
        "{src} gave {err:?}"
      );
    }
  }

  #[test]
  fn templates_and_escapes() {
    let expr = parse_expr_str("`a\\n${x}b${y}`");
    match &*expr.stx {
      Expr::Template {
        quasis,
        substitutions,
      } => {
        assert_eq!(quasis.iter().map(|q| &**q).collect::<Vec<_>>(), vec!["a\n", "b", ""]);
        assert_eq!(substitutions.len(), 2);
      }
      other => panic!("unexpected {other:?}"),
    }
    assert_eq!(decode_escapes("\\u0041\\x42\\u{43}").unwrap(), "ABC");
  }

  #[test]
  fn function_constructor_pieces() {
    assert!(check_formal_parameters("a, b = 1, ...rest").is_ok());
    assert!(check_formal_parameters("a) { evil(); } (function(").is_err());
    assert!(check_function_body("return a + b;").is_ok());
    assert!(check_function_body("}); evil(); (function() {").is_err());
  }

  #[test]
  fn object_literal_members() {
    let expr = parse_expr_str("({ a: 1, b, get c() { return 1 }, set c(v) {}, [k]: 2, m() {}, ...o })");
    let Expr::Object(members) = &*expr.stx else {
      panic!("expected object literal");
    };
    assert_eq!(members.len(), 7);
    assert!(matches!(members[2], ObjectMember::Getter { .. }));
    assert!(matches!(members[3], ObjectMember::Setter { .. }));
    assert!(matches!(members[6], ObjectMember::Spread(_)));
  }

  #[test]
  fn nesting_is_bounded() {
    let fine = format!("{}x{}", "(".repeat(40), ")".repeat(40));
    assert!(parse_program(&fine).is_ok());
    for src in [
      format!("{}x{}", "(".repeat(1000), ")".repeat(1000)),
      format!("{}x", "- ".repeat(1000)),
      format!("{}f", "new ".repeat(1000)),
      format!("f{}", "()".repeat(1000)),
      vec!["x"; 1000].join(" * "),
    ] {
      let err = parse_program(&src).unwrap_err();
      assert_eq!(err.typ, SyntaxErrorType::NestingTooDeep);
    }
    // Abandoned arrow parameter lists give their levels back.
    let arrows = vec!["(a, b) => (a)"; 200].join(";\n");
    assert!(parse_program(&arrows).is_ok());
  }
}
