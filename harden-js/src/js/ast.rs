use crate::js::loc::Loc;
use std::rc::Rc;

#[derive(Clone, Debug)]
pub struct Node<S> {
  pub loc: Loc,
  pub stx: Box<S>,
}

impl<S> Node<S> {
  pub fn new(loc: Loc, stx: S) -> Node<S> {
    Node {
      loc,
      stx: Box::new(stx),
    }
  }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VarDeclMode {
  Const,
  Let,
  Var,
}

#[derive(Clone, Debug)]
pub struct VarDeclarator {
  pub name: Rc<str>,
  pub initializer: Option<Node<Expr>>,
}

#[derive(Clone, Debug)]
pub struct VarDecl {
  pub mode: VarDeclMode,
  pub declarators: Vec<VarDeclarator>,
}

#[derive(Clone, Debug)]
pub enum ForInit {
  Decl(VarDecl),
  Expr(Node<Expr>),
}

/// The left side of a `for-in`/`for-of` head.
#[derive(Clone, Debug)]
pub enum ForHead {
  Decl(VarDeclMode, Rc<str>),
  Target(Node<Expr>),
}

#[derive(Clone, Debug)]
pub struct CatchClause {
  pub param: Option<Rc<str>>,
  pub body: Vec<Node<Stmt>>,
}

#[derive(Clone, Debug)]
pub enum Stmt {
  Block(Vec<Node<Stmt>>),
  Break,
  Continue,
  Debugger,
  DoWhile {
    body: Node<Stmt>,
    condition: Node<Expr>,
  },
  Empty,
  Expr(Node<Expr>),
  For {
    init: Option<ForInit>,
    condition: Option<Node<Expr>>,
    update: Option<Node<Expr>>,
    body: Node<Stmt>,
  },
  ForIn {
    head: ForHead,
    object: Node<Expr>,
    body: Node<Stmt>,
  },
  ForOf {
    head: ForHead,
    iterable: Node<Expr>,
    body: Node<Stmt>,
  },
  FunctionDecl(Rc<Func>),
  If {
    test: Node<Expr>,
    consequent: Node<Stmt>,
    alternate: Option<Node<Stmt>>,
  },
  Return(Option<Node<Expr>>),
  Throw(Node<Expr>),
  Try {
    wrapped: Vec<Node<Stmt>>,
    catch: Option<CatchClause>,
    finally: Option<Vec<Node<Stmt>>>,
  },
  VarDecl(VarDecl),
  While {
    condition: Node<Expr>,
    body: Node<Stmt>,
  },
}

#[derive(Clone, Debug)]
pub struct Param {
  pub name: Rc<str>,
  pub default_value: Option<Node<Expr>>,
  pub rest: bool,
}

#[derive(Clone, Debug)]
pub enum FuncBody {
  Block(Vec<Node<Stmt>>),
  // Concise arrow function body.
  Expression(Node<Expr>),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FuncKind {
  Normal,
  Arrow,
  // Object literal methods, getters and setters: not constructable.
  Method,
}

#[derive(Clone, Debug)]
pub struct Func {
  pub name: Option<Rc<str>>,
  pub kind: FuncKind,
  pub params: Vec<Param>,
  pub body: FuncBody,
  /// Source text of the whole function, as returned by `Function.prototype.toString`.
  pub text: Rc<str>,
  pub loc: Loc,
}

impl Func {
  /// The `length` of the function: parameters before the first default or rest.
  pub fn expected_argument_count(&self) -> usize {
    self
      .params
      .iter()
      .take_while(|p| p.default_value.is_none() && !p.rest)
      .count()
  }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UnaryOp {
  BitwiseNot,
  Delete,
  LogicalNot,
  Minus,
  Plus,
  Typeof,
  Void,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UpdateOp {
  Increment,
  Decrement,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BinaryOp {
  Add,
  BitwiseAnd,
  BitwiseOr,
  BitwiseXor,
  Divide,
  Equality,
  Exponentiate,
  GreaterThan,
  GreaterThanOrEqual,
  In,
  Inequality,
  Instanceof,
  LessThan,
  LessThanOrEqual,
  Multiply,
  Remainder,
  ShiftLeft,
  ShiftRight,
  ShiftRightUnsigned,
  StrictEquality,
  StrictInequality,
  Subtract,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LogicalOp {
  And,
  Or,
  Coalesce,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AssignOp {
  Assign,
  Binary(BinaryOp),
  Logical(LogicalOp),
}

#[derive(Clone, Debug)]
pub enum PropKey {
  Static(Rc<str>),
  Computed(Node<Expr>),
}

#[derive(Clone, Debug)]
pub enum ObjectMember {
  Value { key: PropKey, value: Node<Expr> },
  Getter { key: PropKey, func: Rc<Func> },
  Setter { key: PropKey, func: Rc<Func> },
  Shorthand(Rc<str>),
  Spread(Node<Expr>),
}

#[derive(Clone, Debug)]
pub enum ArrayElement {
  Hole,
  Single(Node<Expr>),
  Spread(Node<Expr>),
}

#[derive(Clone, Debug)]
pub struct CallArg {
  pub spread: bool,
  pub value: Node<Expr>,
}

#[derive(Clone, Debug)]
pub enum Expr {
  Array(Vec<ArrayElement>),
  Assign {
    op: AssignOp,
    target: Node<Expr>,
    value: Node<Expr>,
  },
  Binary {
    op: BinaryOp,
    left: Node<Expr>,
    right: Node<Expr>,
  },
  Bool(bool),
  Call {
    callee: Node<Expr>,
    args: Vec<CallArg>,
  },
  ComputedMember {
    object: Node<Expr>,
    member: Node<Expr>,
  },
  Conditional {
    test: Node<Expr>,
    consequent: Node<Expr>,
    alternate: Node<Expr>,
  },
  Function(Rc<Func>),
  Id(Rc<str>),
  Logical {
    op: LogicalOp,
    left: Node<Expr>,
    right: Node<Expr>,
  },
  Member {
    object: Node<Expr>,
    member: Rc<str>,
  },
  New {
    callee: Node<Expr>,
    args: Vec<CallArg>,
  },
  Null,
  Number(f64),
  Object(Vec<ObjectMember>),
  Regex {
    pattern: Rc<str>,
    flags: Rc<str>,
  },
  Sequence(Vec<Node<Expr>>),
  String(Rc<str>),
  Template {
    quasis: Vec<Rc<str>>,
    substitutions: Vec<Node<Expr>>,
  },
  This,
  Unary {
    op: UnaryOp,
    argument: Node<Expr>,
  },
  Update {
    op: UpdateOp,
    prefix: bool,
    argument: Node<Expr>,
  },
}

impl Expr {
  pub fn is_valid_assignment_target(&self) -> bool {
    matches!(
      self,
      Expr::Id(_) | Expr::Member { .. } | Expr::ComputedMember { .. }
    )
  }
}

/// A parsed script.
#[derive(Clone, Debug)]
pub struct Program {
  pub body: Vec<Node<Stmt>>,
}
