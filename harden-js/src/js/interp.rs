use crate::compartment::scope;
use crate::compartment::scope::ScopeHandlerId;
use crate::heap::Closure;
use crate::js::ast::*;
use crate::js::env::BindingLookup;
use crate::js::env::EnvId;
use crate::js::env::EnvKind;
use crate::js::error::SyntaxErrorType;
use crate::js::loc::Loc;
use crate::js::parse::parse_program;
use crate::property::PropertyDescriptor;
use crate::property::PropertyDescriptorPatch;
use crate::property::PropertyKey;
use crate::property::PropertyKind;
use crate::realm::Activation;
use crate::realm::PrimitiveHint;
use crate::realm::Realm;
use crate::source::SourceText;
use crate::value::ObjectId;
use crate::value::Value;
use crate::VmError;
use ahash::AHashSet;
use std::cmp::Ordering;
use std::rc::Rc;

/// An ECMAScript completion record. Throw completions travel as `Err(VmError)`.
///
/// The "empty" completion value is `None` so statement lists can implement `UpdateEmpty`.
#[derive(Clone, Debug)]
pub(crate) enum Completion {
  Normal(Option<Value>),
  Return(Value),
  Break(Option<Value>),
  Continue(Option<Value>),
}

impl Completion {
  fn empty() -> Self {
    Completion::Normal(None)
  }

  fn is_abrupt(&self) -> bool {
    !matches!(self, Completion::Normal(_))
  }

  fn update_empty(self, value: Option<Value>) -> Self {
    match self {
      Completion::Normal(None) => Completion::Normal(value),
      Completion::Break(None) => Completion::Break(value),
      Completion::Continue(None) => Completion::Continue(value),
      other => other,
    }
  }
}

enum Reference {
  Binding(Rc<str>),
  Property { base: Value, key: PropertyKey },
}

enum Resolved {
  Declarative(EnvId),
  Global(ObjectId),
  Scope(ScopeHandlerId),
  Unresolvable,
}

enum LoopStep {
  Next,
  Exit,
  Abrupt(Completion),
}

fn loop_step(completion: Completion, last: &mut Option<Value>) -> LoopStep {
  match completion {
    Completion::Normal(v) => {
      if v.is_some() {
        *last = v;
      }
      LoopStep::Next
    }
    Completion::Continue(v) => {
      if v.is_some() {
        *last = v;
      }
      LoopStep::Next
    }
    Completion::Break(v) => {
      if v.is_some() {
        *last = v;
      }
      LoopStep::Exit
    }
    other => LoopStep::Abrupt(other),
  }
}

/// Runs a parsed script in `env`, which receives its `var` and lexical declarations.
pub(crate) fn run_program(
  realm: &mut Realm,
  source: Rc<SourceText>,
  program: &Program,
  env: EnvId,
) -> Result<Value, VmError> {
  realm.call_stack.push(Activation {
    function: None,
    source: source.clone(),
    offset: 0,
  });
  let mut evaluator = Evaluator { realm, source, env };
  let result = evaluator.run_body(&program.body);
  evaluator.realm.call_stack.pop();
  match result? {
    Completion::Normal(v) => Ok(v.unwrap_or(Value::Undefined)),
    Completion::Return(_) => Err(VmError::Unimplemented("return outside of function")),
    Completion::Break(_) => Err(VmError::Unimplemented("break outside of loop")),
    Completion::Continue(_) => Err(VmError::Unimplemented("continue outside of loop")),
  }
}

/// Direct `eval`: runs `source` in a fresh declarative scope nested in `outer`. Declarations stay
/// local to the evaluated code, as in strict mode.
pub(crate) fn direct_eval(
  realm: &mut Realm,
  outer: EnvId,
  source: Rc<SourceText>,
) -> Result<Value, VmError> {
  let program = parse_program(&source.text).map_err(VmError::Syntax)?;
  let env = realm.envs.alloc(Some(outer), EnvKind::Declarative);
  let result = run_program(realm, source, &program, env);
  realm.envs.release(env);
  result
}

pub(crate) fn call_closure(
  realm: &mut Realm,
  callee: ObjectId,
  closure: &Closure,
  this: Value,
  args: &[Value],
  _new_target: Option<ObjectId>,
) -> Result<Value, VmError> {
  let func = closure.func.clone();
  let kind = if func.kind == FuncKind::Arrow {
    EnvKind::Declarative
  } else {
    EnvKind::Function { this }
  };
  let env = realm.envs.alloc(Some(closure.env), kind);
  let name = match realm.heap.get_own_data_value(callee, &PropertyKey::from("name"))? {
    Some(Value::String(name)) if !name.is_empty() => Some(name),
    _ => None,
  };
  realm.call_stack.push(Activation {
    function: name,
    source: closure.source.clone(),
    offset: func.loc.0,
  });
  let mut evaluator = Evaluator {
    realm,
    source: closure.source.clone(),
    env,
  };
  let result = evaluator.run_function(&func, args);
  evaluator.realm.call_stack.pop();
  evaluator.realm.envs.release(env);
  result
}

struct Evaluator<'r> {
  realm: &'r mut Realm,
  source: Rc<SourceText>,
  env: EnvId,
}

impl<'r> Evaluator<'r> {
  fn mark(&mut self, loc: Loc) {
    if let Some(top) = self.realm.call_stack.last_mut() {
      top.offset = loc.0;
    }
  }

  fn text(&self, loc: Loc) -> &str {
    self.source.text.get(loc.0..loc.1).unwrap_or("expression")
  }

  fn run_body(&mut self, body: &[Node<Stmt>]) -> Result<Completion, VmError> {
    self.hoist_var_decls(body)?;
    self.instantiate_lexical(body)?;
    self.eval_stmt_list(body)
  }

  fn run_function(&mut self, func: &Rc<Func>, args: &[Value]) -> Result<Value, VmError> {
    if func.kind != FuncKind::Arrow {
      let arguments = self.realm.new_array(args.to_vec())?;
      self
        .realm
        .envs
        .put(self.env, Rc::from("arguments"), Value::Object(arguments))?;
    }
    for (i, param) in func.params.iter().enumerate() {
      let value = if param.rest {
        let rest = args.get(i..).map(<[Value]>::to_vec).unwrap_or_default();
        Value::Object(self.realm.new_array(rest)?)
      } else {
        match (args.get(i), &param.default_value) {
          (Some(v), _) if !v.is_undefined() => v.clone(),
          (_, Some(default)) => self.eval_named(default, &param.name)?,
          _ => Value::Undefined,
        }
      };
      self.realm.envs.put(self.env, param.name.clone(), value)?;
    }
    match &func.body {
      FuncBody::Expression(expr) => self.eval_expr(expr),
      FuncBody::Block(body) => match self.run_body(body)? {
        Completion::Return(v) => Ok(v),
        _ => Ok(Value::Undefined),
      },
    }
  }

  // Declaration instantiation.

  fn hoist_var_decls(&mut self, stmts: &[Node<Stmt>]) -> Result<(), VmError> {
    let mut names = Vec::new();
    for stmt in stmts {
      collect_var_names(&stmt.stx, &mut names);
    }
    for name in names {
      self.realm.envs.declare_var(self.env, name)?;
    }
    Ok(())
  }

  /// Creates the `let`/`const` bindings (uninitialized) and function declarations of one
  /// statement list in the current environment.
  fn instantiate_lexical(&mut self, stmts: &[Node<Stmt>]) -> Result<(), VmError> {
    let mut seen = AHashSet::new();
    for stmt in stmts {
      match &*stmt.stx {
        Stmt::VarDecl(decl) if decl.mode != VarDeclMode::Var => {
          for declarator in &decl.declarators {
            if !seen.insert(declarator.name.clone())
              || self.realm.envs.has_binding(self.env, &declarator.name)?
            {
              return Err(VmError::Syntax(
                stmt.loc.error(SyntaxErrorType::DuplicateDeclaration, None),
              ));
            }
            self.realm.envs.declare(
              self.env,
              declarator.name.clone(),
              decl.mode == VarDeclMode::Let,
              None,
            )?;
          }
        }
        Stmt::FunctionDecl(func) => {
          let closure =
            self
              .realm
              .create_closure(func.clone(), self.env, self.source.clone(), None)?;
          if let Some(name) = &func.name {
            if !seen.insert(name.clone()) {
              return Err(VmError::Syntax(
                stmt.loc.error(SyntaxErrorType::DuplicateDeclaration, None),
              ));
            }
            self.realm.envs.put(self.env, name.clone(), Value::Object(closure))?;
          }
        }
        _ => {}
      }
    }
    Ok(())
  }

  fn initialize_lexical(&mut self, name: &Rc<str>, mutable: bool, value: Value) -> Result<(), VmError> {
    if self.realm.envs.has_binding(self.env, name)? {
      self.realm.envs.initialize(self.env, name, value)
    } else {
      self.realm.envs.declare(self.env, name.clone(), mutable, Some(value))
    }
  }

  // Name resolution.

  fn resolve(&mut self, name: &str) -> Result<Resolved, VmError> {
    let mut cur = Some(self.env);
    while let Some(env) = cur {
      match self.realm.envs.kind(env)? {
        EnvKind::Global(obj) => {
          let obj = *obj;
          if self.realm.heap.has_property(obj, &PropertyKey::from(name))? {
            return Ok(Resolved::Global(obj));
          }
        }
        EnvKind::Scope(handler) => {
          let handler = *handler;
          if scope::has(self.realm, handler, name)? {
            return Ok(Resolved::Scope(handler));
          }
        }
        _ => {
          if self.realm.envs.has_binding(env, name)? {
            return Ok(Resolved::Declarative(env));
          }
        }
      }
      cur = self.realm.envs.outer(env)?;
    }
    Ok(Resolved::Unresolvable)
  }

  fn get_binding(&mut self, name: &str) -> Result<Value, VmError> {
    match self.resolve(name)? {
      Resolved::Declarative(env) => match self.realm.envs.lookup(env, name)? {
        BindingLookup::Found(v) => Ok(v),
        BindingLookup::Uninitialized => Err(VmError::ReferenceError(format!(
          "Cannot access '{name}' before initialization"
        ))),
        BindingLookup::Missing => Err(not_defined(name)),
      },
      Resolved::Global(obj) => self.realm.get(obj, &PropertyKey::from(name)),
      Resolved::Scope(handler) => scope::get(self.realm, handler, name),
      Resolved::Unresolvable => Err(not_defined(name)),
    }
  }

  fn set_binding(&mut self, name: &Rc<str>, value: Value) -> Result<(), VmError> {
    match self.resolve(name)? {
      Resolved::Declarative(env) => {
        self.realm.envs.assign(env, name, value)?;
        Ok(())
      }
      Resolved::Global(obj) => {
        self
          .realm
          .put(&Value::Object(obj), PropertyKey::String(name.clone()), value)
      }
      Resolved::Scope(handler) => scope::set(self.realm, handler, name, value),
      Resolved::Unresolvable => Err(not_defined(name)),
    }
  }

  fn this_value(&self) -> Result<Value, VmError> {
    let mut cur = Some(self.env);
    while let Some(env) = cur {
      match self.realm.envs.kind(env)? {
        EnvKind::Function { this } | EnvKind::Program { this } => return Ok(this.clone()),
        EnvKind::Global(obj) => return Ok(Value::Object(*obj)),
        EnvKind::Scope(_) => return Ok(Value::Undefined),
        EnvKind::Declarative => {}
      }
      cur = self.realm.envs.outer(env)?;
    }
    Ok(Value::Undefined)
  }

  // Statements.

  fn eval_stmt_list(&mut self, stmts: &[Node<Stmt>]) -> Result<Completion, VmError> {
    let mut last_value: Option<Value> = None;
    for stmt in stmts {
      let completion = self.eval_stmt(stmt)?.update_empty(last_value.clone());
      match completion {
        Completion::Normal(v) => {
          if v.is_some() {
            last_value = v;
          }
        }
        abrupt => return Ok(abrupt),
      }
    }
    Ok(Completion::Normal(last_value))
  }

  /// Runs `f` in `env`, a record allocated for this scope alone. Releases it on exit, along with
  /// the record `f` left current if it replaced `env`.
  fn in_scope<T>(
    &mut self,
    env: EnvId,
    f: impl FnOnce(&mut Self) -> Result<T, VmError>,
  ) -> Result<T, VmError> {
    let saved = self.env;
    self.env = env;
    let result = f(self);
    let last = self.env;
    self.env = saved;
    self.realm.envs.release(last);
    if last != env {
      self.realm.envs.release(env);
    }
    result
  }

  fn eval_block(&mut self, body: &[Node<Stmt>]) -> Result<Completion, VmError> {
    if !has_lexical_declarations(body) {
      return self.eval_stmt_list(body);
    }
    let env = self.realm.envs.alloc(Some(self.env), EnvKind::Declarative);
    self.in_scope(env, |ev| {
      ev.instantiate_lexical(body)?;
      ev.eval_stmt_list(body)
    })
  }

  fn eval_stmt(&mut self, stmt: &Node<Stmt>) -> Result<Completion, VmError> {
    self.realm.enter_eval()?;
    let result = self.eval_stmt_unguarded(stmt);
    self.realm.leave_eval();
    result
  }

  fn eval_stmt_unguarded(&mut self, stmt: &Node<Stmt>) -> Result<Completion, VmError> {
    self.mark(stmt.loc);
    match &*stmt.stx {
      Stmt::Block(body) => self.eval_block(body),
      Stmt::Break => Ok(Completion::Break(None)),
      Stmt::Continue => Ok(Completion::Continue(None)),
      Stmt::Debugger | Stmt::Empty | Stmt::FunctionDecl(_) => Ok(Completion::empty()),
      Stmt::Expr(expr) => Ok(Completion::Normal(Some(self.eval_expr(expr)?))),
      Stmt::VarDecl(decl) => {
        self.eval_var_decl(decl, stmt.loc)?;
        Ok(Completion::empty())
      }
      Stmt::If {
        test,
        consequent,
        alternate,
      } => {
        let completion = if self.eval_expr(test)?.truthy() {
          self.eval_stmt(consequent)?
        } else if let Some(alternate) = alternate {
          self.eval_stmt(alternate)?
        } else {
          Completion::empty()
        };
        Ok(completion.update_empty(Some(Value::Undefined)))
      }
      Stmt::Return(value) => {
        let value = match value {
          Some(expr) => self.eval_expr(expr)?,
          None => Value::Undefined,
        };
        Ok(Completion::Return(value))
      }
      Stmt::Throw(value) => {
        let value = self.eval_expr(value)?;
        self.mark(stmt.loc);
        Err(VmError::Throw(value))
      }
      Stmt::Try {
        wrapped,
        catch,
        finally,
      } => self.eval_try(wrapped, catch.as_ref(), finally.as_deref()),
      Stmt::While { condition, body } => {
        let mut last = None;
        while self.eval_expr(condition)?.truthy() {
          match loop_step(self.eval_stmt(body)?, &mut last) {
            LoopStep::Next => {}
            LoopStep::Exit => break,
            LoopStep::Abrupt(c) => return Ok(c),
          }
        }
        Ok(Completion::Normal(last))
      }
      Stmt::DoWhile { body, condition } => {
        let mut last = None;
        loop {
          match loop_step(self.eval_stmt(body)?, &mut last) {
            LoopStep::Next => {}
            LoopStep::Exit => break,
            LoopStep::Abrupt(c) => return Ok(c),
          }
          if !self.eval_expr(condition)?.truthy() {
            break;
          }
        }
        Ok(Completion::Normal(last))
      }
      Stmt::For {
        init,
        condition,
        update,
        body,
      } => self.eval_for(init.as_ref(), condition.as_ref(), update.as_ref(), body, stmt.loc),
      Stmt::ForIn { head, object, body } => {
        let object = self.eval_expr(object)?;
        if object.is_nullish() {
          return Ok(Completion::empty());
        }
        let obj = self.realm.to_object(&object)?;
        let keys = self.realm.for_in_keys(obj)?;
        let mut last = None;
        for key in keys {
          // Keys deleted during iteration are skipped.
          if !self.realm.heap.has_property(obj, &PropertyKey::String(key.clone()))? {
            continue;
          }
          match loop_step(self.eval_for_each_body(head, Value::String(key), body)?, &mut last) {
            LoopStep::Next => {}
            LoopStep::Exit => break,
            LoopStep::Abrupt(c) => return Ok(c),
          }
        }
        Ok(Completion::Normal(last))
      }
      Stmt::ForOf {
        head,
        iterable,
        body,
      } => {
        let iterable = self.eval_expr(iterable)?;
        let items = self.realm.iterate_to_vec(&iterable)?;
        let mut last = None;
        for item in items {
          match loop_step(self.eval_for_each_body(head, item, body)?, &mut last) {
            LoopStep::Next => {}
            LoopStep::Exit => break,
            LoopStep::Abrupt(c) => return Ok(c),
          }
        }
        Ok(Completion::Normal(last))
      }
    }
  }

  fn eval_var_decl(&mut self, decl: &VarDecl, loc: Loc) -> Result<(), VmError> {
    for declarator in &decl.declarators {
      match decl.mode {
        VarDeclMode::Var => {
          if let Some(init) = &declarator.initializer {
            let value = self.eval_named(init, &declarator.name)?;
            self.set_binding(&declarator.name, value)?;
          }
        }
        VarDeclMode::Let | VarDeclMode::Const => {
          let value = match &declarator.initializer {
            Some(init) => self.eval_named(init, &declarator.name)?,
            None if decl.mode == VarDeclMode::Const => {
              return Err(VmError::Syntax(loc.error(
                SyntaxErrorType::ExpectedSyntax("initializer in const declaration"),
                None,
              )));
            }
            None => Value::Undefined,
          };
          self.initialize_lexical(&declarator.name, decl.mode == VarDeclMode::Let, value)?;
        }
      }
    }
    Ok(())
  }

  fn eval_try(
    &mut self,
    wrapped: &[Node<Stmt>],
    catch: Option<&CatchClause>,
    finally: Option<&[Node<Stmt>]>,
  ) -> Result<Completion, VmError> {
    let mut result = self.eval_block(wrapped);
    if let Some(catch) = catch {
      if let Err(err) = result {
        result = if err.is_catchable() {
          let thrown = self.realm.materialize_error(err)?;
          let env = self.realm.envs.alloc(Some(self.env), EnvKind::Declarative);
          if let Some(param) = &catch.param {
            self.realm.envs.put(env, param.clone(), thrown)?;
          }
          self.in_scope(env, |ev| ev.eval_block(&catch.body))
        } else {
          Err(err)
        };
      }
    }
    if let Some(finally) = finally {
      let finally_result = self.eval_block(finally)?;
      if finally_result.is_abrupt() {
        return Ok(finally_result);
      }
    }
    Ok(result?.update_empty(Some(Value::Undefined)))
  }

  fn eval_for(
    &mut self,
    init: Option<&ForInit>,
    condition: Option<&Node<Expr>>,
    update: Option<&Node<Expr>>,
    body: &Node<Stmt>,
    loc: Loc,
  ) -> Result<Completion, VmError> {
    let per_iteration = matches!(init, Some(ForInit::Decl(d)) if d.mode == VarDeclMode::Let);
    let lexical = matches!(init, Some(ForInit::Decl(d)) if d.mode != VarDeclMode::Var);
    let run = |ev: &mut Self| -> Result<Completion, VmError> {
      let initial = ev.env;
      match init {
        Some(ForInit::Decl(decl)) => ev.eval_var_decl(decl, loc)?,
        Some(ForInit::Expr(expr)) => {
          ev.eval_expr(expr)?;
        }
        None => {}
      }
      if per_iteration {
        ev.next_iteration(initial)?;
      }
      let mut last = None;
      loop {
        if let Some(condition) = condition {
          if !ev.eval_expr(condition)?.truthy() {
            break;
          }
        }
        match loop_step(ev.eval_stmt(body)?, &mut last) {
          LoopStep::Next => {}
          LoopStep::Exit => break,
          LoopStep::Abrupt(c) => return Ok(c),
        }
        if per_iteration {
          ev.next_iteration(initial)?;
        }
        if let Some(update) = update {
          ev.eval_expr(update)?;
        }
      }
      Ok(Completion::Normal(last))
    };
    if lexical {
      let env = self.realm.envs.alloc(Some(self.env), EnvKind::Declarative);
      self.in_scope(env, run)
    } else {
      run(self)
    }
  }

  /// Moves a `for (let ...)` loop onto a fresh copy of its bindings. The loop's initial record
  /// stays alive until the loop exits; earlier copies are released as the loop moves on.
  fn next_iteration(&mut self, initial: EnvId) -> Result<(), VmError> {
    let previous = self.env;
    self.env = self.realm.envs.copy_for_iteration(previous)?;
    if previous != initial {
      self.realm.envs.release(previous);
    }
    Ok(())
  }

  fn eval_for_each_body(
    &mut self,
    head: &ForHead,
    value: Value,
    body: &Node<Stmt>,
  ) -> Result<Completion, VmError> {
    match head {
      ForHead::Decl(VarDeclMode::Var, name) => {
        self.set_binding(name, value)?;
        self.eval_stmt(body)
      }
      ForHead::Decl(mode, name) => {
        let env = self.realm.envs.alloc(Some(self.env), EnvKind::Declarative);
        self
          .realm
          .envs
          .declare(env, name.clone(), *mode == VarDeclMode::Let, Some(value))?;
        self.in_scope(env, |ev| ev.eval_stmt(body))
      }
      ForHead::Target(target) => {
        let reference = self.eval_reference(target)?;
        self.put_reference(&reference, value)?;
        self.eval_stmt(body)
      }
    }
  }

  // Expressions.

  /// Evaluates `expr`, naming it `name` if it is an anonymous function.
  fn eval_named(&mut self, expr: &Node<Expr>, name: &Rc<str>) -> Result<Value, VmError> {
    match &*expr.stx {
      Expr::Function(func) if func.name.is_none() => Ok(Value::Object(self.realm.create_closure(
        func.clone(),
        self.env,
        self.source.clone(),
        Some(name.clone()),
      )?)),
      _ => self.eval_expr(expr),
    }
  }

  fn eval_expr(&mut self, expr: &Node<Expr>) -> Result<Value, VmError> {
    self.realm.enter_eval()?;
    let result = self.eval_expr_unguarded(expr);
    self.realm.leave_eval();
    result
  }

  fn eval_expr_unguarded(&mut self, expr: &Node<Expr>) -> Result<Value, VmError> {
    match &*expr.stx {
      Expr::Bool(b) => Ok(Value::Bool(*b)),
      Expr::Null => Ok(Value::Null),
      Expr::Number(n) => Ok(Value::Number(*n)),
      Expr::String(s) => Ok(Value::String(s.clone())),
      Expr::This => self.this_value(),
      Expr::Id(name) => {
        if &**name == "undefined" {
          // `undefined` is an immutable global in every supported environment.
          if let Resolved::Unresolvable = self.resolve(name)? {
            return Ok(Value::Undefined);
          }
        }
        self.get_binding(name)
      }
      Expr::Template {
        quasis,
        substitutions,
      } => {
        let mut out = String::new();
        for (i, quasi) in quasis.iter().enumerate() {
          out.push_str(quasi);
          if let Some(sub) = substitutions.get(i) {
            let value = self.eval_expr(sub)?;
            out.push_str(&self.realm.to_string(&value)?);
          }
        }
        Ok(Value::from(out))
      }
      Expr::Regex { pattern, flags } => {
        self.mark(expr.loc);
        let id = crate::builtins::regexp::create_regexp(self.realm, pattern.clone(), flags.clone(), None)?;
        Ok(Value::Object(id))
      }
      Expr::Array(elements) => self.eval_array(elements),
      Expr::Object(members) => self.eval_object(members),
      Expr::Function(func) => self.eval_function_expr(func),
      Expr::Member { object, member } => {
        let base = self.eval_expr(object)?;
        self.mark(expr.loc);
        self
          .realm
          .get_value(&base, &PropertyKey::String(member.clone()))
      }
      Expr::ComputedMember { object, member } => {
        let base = self.eval_expr(object)?;
        let key = self.eval_expr(member)?;
        if base.is_nullish() {
          let key = self.realm.display(&key);
          return Err(VmError::type_error(format!(
            "Cannot read properties of {} (reading '{}')",
            self.realm.display(&base),
            key
          )));
        }
        let key = self.realm.to_property_key(&key)?;
        self.realm.get_value(&base, &key)
      }
      Expr::Call { callee, args } => self.eval_call(expr.loc, callee, args),
      Expr::New { callee, args } => {
        let ctor = self.eval_expr(callee)?;
        let args = self.eval_args(args)?;
        self.mark(expr.loc);
        if !self.realm.is_constructor(&ctor) {
          return Err(VmError::type_error(format!(
            "{} is not a constructor",
            self.text(callee.loc)
          )));
        }
        self.realm.construct(&ctor, &args, None)
      }
      Expr::Unary { op, argument } => self.eval_unary(*op, argument),
      Expr::Update {
        op,
        prefix,
        argument,
      } => {
        let reference = self.eval_reference(argument)?;
        let old = self.get_reference(&reference)?;
        let old = self.realm.to_number(&old)?;
        let new = match op {
          UpdateOp::Increment => old + 1.0,
          UpdateOp::Decrement => old - 1.0,
        };
        self.put_reference(&reference, Value::Number(new))?;
        Ok(Value::Number(if *prefix { new } else { old }))
      }
      Expr::Binary { op, left, right } => {
        let left = self.eval_expr(left)?;
        let right = self.eval_expr(right)?;
        self.apply_binary(*op, &left, &right)
      }
      Expr::Logical { op, left, right } => {
        let left = self.eval_expr(left)?;
        let short_circuit = match op {
          LogicalOp::And => !left.truthy(),
          LogicalOp::Or => left.truthy(),
          LogicalOp::Coalesce => !left.is_nullish(),
        };
        if short_circuit {
          Ok(left)
        } else {
          self.eval_expr(right)
        }
      }
      Expr::Conditional {
        test,
        consequent,
        alternate,
      } => {
        if self.eval_expr(test)?.truthy() {
          self.eval_expr(consequent)
        } else {
          self.eval_expr(alternate)
        }
      }
      Expr::Sequence(exprs) => {
        let mut last = Value::Undefined;
        for expr in exprs {
          last = self.eval_expr(expr)?;
        }
        Ok(last)
      }
      Expr::Assign { op, target, value } => self.eval_assign(*op, target, value),
    }
  }

  fn eval_function_expr(&mut self, func: &Rc<Func>) -> Result<Value, VmError> {
    let Some(name) = func.name.clone().filter(|_| func.kind == FuncKind::Normal) else {
      let id = self
        .realm
        .create_closure(func.clone(), self.env, self.source.clone(), None)?;
      return Ok(Value::Object(id));
    };
    // A named function expression can refer to itself by name.
    let env = self.realm.envs.alloc(Some(self.env), EnvKind::Declarative);
    let id = self
      .realm
      .create_closure(func.clone(), env, self.source.clone(), None)?;
    self.realm.envs.declare(env, name, false, Some(Value::Object(id)))?;
    Ok(Value::Object(id))
  }

  fn eval_array(&mut self, elements: &[ArrayElement]) -> Result<Value, VmError> {
    let array = self.realm.new_array(Vec::new())?;
    let mut index = 0usize;
    for element in elements {
      match element {
        ArrayElement::Hole => index += 1,
        ArrayElement::Single(expr) => {
          let value = self.eval_expr(expr)?;
          self
            .realm
            .heap
            .create_data_property_or_throw(array, index.to_string(), value)?;
          index += 1;
        }
        ArrayElement::Spread(expr) => {
          let iterable = self.eval_expr(expr)?;
          for value in self.realm.iterate_to_vec(&iterable)? {
            self
              .realm
              .heap
              .create_data_property_or_throw(array, index.to_string(), value)?;
            index += 1;
          }
        }
      }
    }
    self.realm.heap.define_own_property_or_throw(
      array,
      PropertyKey::from("length"),
      PropertyDescriptorPatch {
        value: Some(Value::Number(index as f64)),
        ..Default::default()
      },
    )?;
    Ok(Value::Object(array))
  }

  fn eval_prop_key(&mut self, key: &PropKey) -> Result<PropertyKey, VmError> {
    match key {
      PropKey::Static(name) => Ok(PropertyKey::String(name.clone())),
      PropKey::Computed(expr) => {
        let value = self.eval_expr(expr)?;
        self.realm.to_property_key(&value)
      }
    }
  }

  fn eval_object(&mut self, members: &[ObjectMember]) -> Result<Value, VmError> {
    let obj = self.realm.new_object();
    for member in members {
      match member {
        ObjectMember::Value { key, value } => {
          let is_proto_setter = matches!(key, PropKey::Static(name) if &**name == "__proto__");
          let key = self.eval_prop_key(key)?;
          let name: Rc<str> = Rc::from(key.to_string());
          let value = self.eval_named(value, &name)?;
          if is_proto_setter {
            match value {
              Value::Object(proto) => {
                self.realm.heap.object_set_prototype(obj, Some(proto))?;
              }
              Value::Null => {
                self.realm.heap.object_set_prototype(obj, None)?;
              }
              _ => {}
            }
            continue;
          }
          self.realm.heap.create_data_property_or_throw(obj, key, value)?;
        }
        ObjectMember::Getter { key, func } | ObjectMember::Setter { key, func } => {
          let is_getter = matches!(member, ObjectMember::Getter { .. });
          let key = self.eval_prop_key(key)?;
          let prefix = if is_getter { "get" } else { "set" };
          let closure = self.realm.create_closure(
            func.clone(),
            self.env,
            self.source.clone(),
            Some(Rc::from(format!("{prefix} {key}"))),
          )?;
          let (mut get, mut set) = match self.realm.heap.get_own_property(obj, &key)? {
            Some(PropertyDescriptor {
              kind: PropertyKind::Accessor { get, set },
              ..
            }) => (get, set),
            _ => (Value::Undefined, Value::Undefined),
          };
          if is_getter {
            get = Value::Object(closure);
          } else {
            set = Value::Object(closure);
          }
          self
            .realm
            .heap
            .define_property(obj, key, PropertyDescriptor::accessor(get, set, true, true))?;
        }
        ObjectMember::Shorthand(name) => {
          let value = self.get_binding(name)?;
          self
            .realm
            .heap
            .create_data_property_or_throw(obj, PropertyKey::String(name.clone()), value)?;
        }
        ObjectMember::Spread(expr) => {
          let source = self.eval_expr(expr)?;
          self.copy_data_properties(obj, &source)?;
        }
      }
    }
    Ok(Value::Object(obj))
  }

  fn copy_data_properties(&mut self, target: ObjectId, source: &Value) -> Result<(), VmError> {
    if source.is_nullish() {
      return Ok(());
    }
    let from = self.realm.to_object(source)?;
    for key in self.realm.heap.own_property_keys(from)? {
      let enumerable = self
        .realm
        .heap
        .get_own_property(from, &key)?
        .is_some_and(|d| d.enumerable);
      if enumerable {
        let value = self.realm.get(from, &key)?;
        self.realm.heap.create_data_property_or_throw(target, key, value)?;
      }
    }
    Ok(())
  }

  fn eval_args(&mut self, args: &[CallArg]) -> Result<Vec<Value>, VmError> {
    let mut out = Vec::with_capacity(args.len());
    for arg in args {
      let value = self.eval_expr(&arg.value)?;
      if arg.spread {
        out.extend(self.realm.iterate_to_vec(&value)?);
      } else {
        out.push(value);
      }
    }
    Ok(out)
  }

  fn eval_call(&mut self, loc: Loc, callee: &Node<Expr>, args: &[CallArg]) -> Result<Value, VmError> {
    let (func, this) = match &*callee.stx {
      Expr::Member { object, member } => {
        let base = self.eval_expr(object)?;
        let func = self
          .realm
          .get_value(&base, &PropertyKey::String(member.clone()))?;
        (func, base)
      }
      Expr::ComputedMember { object, member } => {
        let base = self.eval_expr(object)?;
        let key = self.eval_expr(member)?;
        if base.is_nullish() {
          return Err(VmError::type_error(format!(
            "Cannot read properties of {} (reading '{}')",
            self.realm.display(&base),
            self.realm.display(&key)
          )));
        }
        let key = self.realm.to_property_key(&key)?;
        let func = self.realm.get_value(&base, &key)?;
        (func, base)
      }
      Expr::Id(name) if &**name == "eval" => {
        let func = self.get_binding(name)?;
        if func.strict_equals(&Value::Object(self.realm.intrinsics.feral_eval)) {
          let args = self.eval_args(args)?;
          self.mark(loc);
          let text = match args.into_iter().next() {
            Some(Value::String(text)) => text,
            Some(other) => return Ok(other),
            None => return Ok(Value::Undefined),
          };
          let source = Rc::new(SourceText::new(self.source.name.clone(), text));
          return direct_eval(self.realm, self.env, source);
        }
        (func, Value::Undefined)
      }
      _ => (self.eval_expr(callee)?, Value::Undefined),
    };
    let args = self.eval_args(args)?;
    self.mark(loc);
    if !self.realm.heap.is_callable(&func) {
      return Err(VmError::type_error(format!(
        "{} is not a function",
        self.text(callee.loc)
      )));
    }
    self.realm.call(&func, this, &args)
  }

  fn eval_unary(&mut self, op: UnaryOp, argument: &Node<Expr>) -> Result<Value, VmError> {
    match op {
      UnaryOp::Typeof => {
        if let Expr::Id(name) = &*argument.stx {
          if let Resolved::Unresolvable = self.resolve(name)? {
            return Ok(Value::from("undefined"));
          }
        }
        let value = self.eval_expr(argument)?;
        Ok(Value::from(self.realm.typeof_value(&value)))
      }
      UnaryOp::Delete => match &*argument.stx {
        Expr::Member { .. } | Expr::ComputedMember { .. } => {
          let Reference::Property { base, key } = self.eval_reference(argument)? else {
            return Ok(Value::Bool(true));
          };
          let obj = self.realm.to_object(&base)?;
          Ok(Value::Bool(self.realm.delete(obj, &key)?))
        }
        Expr::Id(_) => Err(VmError::Syntax(argument.loc.error(
          SyntaxErrorType::ExpectedSyntax("property reference after delete in strict mode"),
          None,
        ))),
        _ => {
          self.eval_expr(argument)?;
          Ok(Value::Bool(true))
        }
      },
      UnaryOp::Void => {
        self.eval_expr(argument)?;
        Ok(Value::Undefined)
      }
      UnaryOp::LogicalNot => Ok(Value::Bool(!self.eval_expr(argument)?.truthy())),
      UnaryOp::Minus => {
        let value = self.eval_expr(argument)?;
        Ok(Value::Number(-self.realm.to_number(&value)?))
      }
      UnaryOp::Plus => {
        let value = self.eval_expr(argument)?;
        Ok(Value::Number(self.realm.to_number(&value)?))
      }
      UnaryOp::BitwiseNot => {
        let value = self.eval_expr(argument)?;
        let n = self.realm.to_number(&value)?;
        Ok(Value::Number(!to_int32(n) as f64))
      }
    }
  }

  fn eval_assign(&mut self, op: AssignOp, target: &Node<Expr>, value: &Node<Expr>) -> Result<Value, VmError> {
    let reference = self.eval_reference(target)?;
    let name = match &reference {
      Reference::Binding(name) => Some(name.clone()),
      Reference::Property { .. } => None,
    };
    let rhs = |ev: &mut Self| match &name {
      Some(name) => ev.eval_named(value, name),
      None => ev.eval_expr(value),
    };
    let result = match op {
      AssignOp::Assign => rhs(self)?,
      AssignOp::Binary(op) => {
        let old = self.get_reference(&reference)?;
        let right = self.eval_expr(value)?;
        self.apply_binary(op, &old, &right)?
      }
      AssignOp::Logical(op) => {
        let old = self.get_reference(&reference)?;
        let keep = match op {
          LogicalOp::And => !old.truthy(),
          LogicalOp::Or => old.truthy(),
          LogicalOp::Coalesce => !old.is_nullish(),
        };
        if keep {
          return Ok(old);
        }
        rhs(self)?
      }
    };
    self.put_reference(&reference, result.clone())?;
    Ok(result)
  }

  fn eval_reference(&mut self, target: &Node<Expr>) -> Result<Reference, VmError> {
    match &*target.stx {
      Expr::Id(name) => Ok(Reference::Binding(name.clone())),
      Expr::Member { object, member } => Ok(Reference::Property {
        base: self.eval_expr(object)?,
        key: PropertyKey::String(member.clone()),
      }),
      Expr::ComputedMember { object, member } => {
        let base = self.eval_expr(object)?;
        let key = self.eval_expr(member)?;
        let key = self.realm.to_property_key(&key)?;
        Ok(Reference::Property { base, key })
      }
      _ => Err(VmError::Syntax(
        target.loc.error(SyntaxErrorType::InvalidAssigmentTarget, None),
      )),
    }
  }

  fn get_reference(&mut self, reference: &Reference) -> Result<Value, VmError> {
    match reference {
      Reference::Binding(name) => self.get_binding(name),
      Reference::Property { base, key } => self.realm.get_value(base, key),
    }
  }

  fn put_reference(&mut self, reference: &Reference, value: Value) -> Result<(), VmError> {
    match reference {
      Reference::Binding(name) => self.set_binding(name, value),
      Reference::Property { base, key } => self.realm.put(base, key.clone(), value),
    }
  }

  fn apply_binary(&mut self, op: BinaryOp, left: &Value, right: &Value) -> Result<Value, VmError> {
    let realm = &mut *self.realm;
    Ok(match op {
      BinaryOp::Add => {
        let l = realm.to_primitive(left, PrimitiveHint::Default)?;
        let r = realm.to_primitive(right, PrimitiveHint::Default)?;
        if matches!(l, Value::String(_)) || matches!(r, Value::String(_)) {
          let l = realm.to_string(&l)?;
          let r = realm.to_string(&r)?;
          Value::from(format!("{l}{r}"))
        } else {
          Value::Number(realm.to_number(&l)? + realm.to_number(&r)?)
        }
      }
      BinaryOp::Subtract => Value::Number(realm.to_number(left)? - realm.to_number(right)?),
      BinaryOp::Multiply => Value::Number(realm.to_number(left)? * realm.to_number(right)?),
      BinaryOp::Divide => Value::Number(realm.to_number(left)? / realm.to_number(right)?),
      BinaryOp::Remainder => Value::Number(realm.to_number(left)? % realm.to_number(right)?),
      BinaryOp::Exponentiate => {
        let base = realm.to_number(left)?;
        let exponent = realm.to_number(right)?;
        Value::Number(js_pow(base, exponent))
      }
      BinaryOp::ShiftLeft => {
        let l = to_int32(realm.to_number(left)?);
        let r = to_uint32(realm.to_number(right)?) & 31;
        Value::Number(l.wrapping_shl(r) as f64)
      }
      BinaryOp::ShiftRight => {
        let l = to_int32(realm.to_number(left)?);
        let r = to_uint32(realm.to_number(right)?) & 31;
        Value::Number((l >> r) as f64)
      }
      BinaryOp::ShiftRightUnsigned => {
        let l = to_uint32(realm.to_number(left)?);
        let r = to_uint32(realm.to_number(right)?) & 31;
        Value::Number((l >> r) as f64)
      }
      BinaryOp::BitwiseAnd => {
        Value::Number((to_int32(realm.to_number(left)?) & to_int32(realm.to_number(right)?)) as f64)
      }
      BinaryOp::BitwiseOr => {
        Value::Number((to_int32(realm.to_number(left)?) | to_int32(realm.to_number(right)?)) as f64)
      }
      BinaryOp::BitwiseXor => {
        Value::Number((to_int32(realm.to_number(left)?) ^ to_int32(realm.to_number(right)?)) as f64)
      }
      BinaryOp::Equality => Value::Bool(realm.loose_equals(left, right)?),
      BinaryOp::Inequality => Value::Bool(!realm.loose_equals(left, right)?),
      BinaryOp::StrictEquality => Value::Bool(left.strict_equals(right)),
      BinaryOp::StrictInequality => Value::Bool(!left.strict_equals(right)),
      BinaryOp::LessThan => Value::Bool(compare(realm, left, right, true)? == Some(true)),
      BinaryOp::GreaterThan => Value::Bool(compare(realm, right, left, false)? == Some(true)),
      BinaryOp::LessThanOrEqual => Value::Bool(compare(realm, right, left, false)? == Some(false)),
      BinaryOp::GreaterThanOrEqual => Value::Bool(compare(realm, left, right, true)? == Some(false)),
      BinaryOp::In => {
        let Value::Object(obj) = right else {
          return Err(VmError::type_error(format!(
            "Cannot use 'in' operator to search for '{}' in {}",
            realm.display(left),
            realm.display(right)
          )));
        };
        let key = realm.to_property_key(left)?;
        Value::Bool(realm.heap.has_property(*obj, &key)?)
      }
      BinaryOp::Instanceof => Value::Bool(realm.instance_of(left, right)?),
    })
  }
}

fn not_defined(name: &str) -> VmError {
  VmError::ReferenceError(format!("{name} is not defined"))
}

fn has_lexical_declarations(stmts: &[Node<Stmt>]) -> bool {
  stmts.iter().any(|stmt| match &*stmt.stx {
    Stmt::VarDecl(decl) => decl.mode != VarDeclMode::Var,
    Stmt::FunctionDecl(_) => true,
    _ => false,
  })
}

fn collect_var_names(stmt: &Stmt, out: &mut Vec<Rc<str>>) {
  match stmt {
    Stmt::VarDecl(decl) if decl.mode == VarDeclMode::Var => {
      out.extend(decl.declarators.iter().map(|d| d.name.clone()));
    }
    Stmt::Block(body) => {
      for stmt in body {
        collect_var_names(&stmt.stx, out);
      }
    }
    Stmt::If {
      consequent,
      alternate,
      ..
    } => {
      collect_var_names(&consequent.stx, out);
      if let Some(alternate) = alternate {
        collect_var_names(&alternate.stx, out);
      }
    }
    Stmt::Try {
      wrapped,
      catch,
      finally,
    } => {
      for stmt in wrapped {
        collect_var_names(&stmt.stx, out);
      }
      if let Some(catch) = catch {
        for stmt in &catch.body {
          collect_var_names(&stmt.stx, out);
        }
      }
      for stmt in finally.iter().flatten() {
        collect_var_names(&stmt.stx, out);
      }
    }
    Stmt::While { body, .. } | Stmt::DoWhile { body, .. } => collect_var_names(&body.stx, out),
    Stmt::For { init, body, .. } => {
      if let Some(ForInit::Decl(decl)) = init {
        if decl.mode == VarDeclMode::Var {
          out.extend(decl.declarators.iter().map(|d| d.name.clone()));
        }
      }
      collect_var_names(&body.stx, out);
    }
    Stmt::ForIn { head, body, .. } | Stmt::ForOf { head, body, .. } => {
      if let ForHead::Decl(VarDeclMode::Var, name) = head {
        out.push(name.clone());
      }
      collect_var_names(&body.stx, out);
    }
    // Nested functions have their own var scope.
    _ => {}
  }
}

/// `IsLessThan(x, y)`; `None` stands for the undefined result (a NaN operand).
fn compare(realm: &mut Realm, x: &Value, y: &Value, left_first: bool) -> Result<Option<bool>, VmError> {
  let (px, py) = if left_first {
    let px = realm.to_primitive(x, PrimitiveHint::Number)?;
    let py = realm.to_primitive(y, PrimitiveHint::Number)?;
    (px, py)
  } else {
    let py = realm.to_primitive(y, PrimitiveHint::Number)?;
    let px = realm.to_primitive(x, PrimitiveHint::Number)?;
    (px, py)
  };
  if let (Value::String(a), Value::String(b)) = (&px, &py) {
    return Ok(Some(a.encode_utf16().cmp(b.encode_utf16()) == Ordering::Less));
  }
  let a = realm.to_number(&px)?;
  let b = realm.to_number(&py)?;
  if a.is_nan() || b.is_nan() {
    return Ok(None);
  }
  Ok(Some(a < b))
}

pub(crate) fn to_int32(n: f64) -> i32 {
  to_uint32(n) as i32
}

pub(crate) fn to_uint32(n: f64) -> u32 {
  if !n.is_finite() {
    return 0;
  }
  n.trunc().rem_euclid(4294967296.0) as u32
}

/// `Number::exponentiate`, which differs from `powf` for NaN exponents and `±1 ** ±Infinity`.
pub(crate) fn js_pow(base: f64, exponent: f64) -> f64 {
  if exponent.is_nan() || (base.abs() == 1.0 && exponent.is_infinite()) {
    return f64::NAN;
  }
  base.powf(exponent)
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn int32_conversions_wrap() {
    assert_eq!(to_int32(4294967296.0 + 5.0), 5);
    assert_eq!(to_int32(-1.0), -1);
    assert_eq!(to_uint32(-1.0), u32::MAX);
    assert_eq!(to_int32(f64::NAN), 0);
  }

  #[test]
  fn exponentiation_edge_cases() {
    assert!(js_pow(1.0, f64::INFINITY).is_nan());
    assert!(js_pow(2.0, f64::NAN).is_nan());
    assert_eq!(js_pow(2.0, 10.0), 1024.0);
  }
}
