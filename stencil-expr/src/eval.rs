use serde_json::{Map, Value};

use crate::ast::{AssignOp, BinaryOp, Expr, ForClause, ForKind, Interpolated, Program, Segment, Stmt, UnaryOp};
use crate::builtins::Functions;
use crate::value::{add, compare, loose_eq, number, strict_eq, to_display, to_number, truthy, type_name};

/// Name under which the whole scope object is reachable.
pub const SCOPE_NAME: &str = "scope";

#[derive(Debug, thiserror::Error, Clone, PartialEq)]
pub enum EvalError {
    #[error("{0} is not defined")]
    Undefined(String),
    #[error("cannot read property '{0}' of null")]
    ReadOfNull(String),
    #[error("cannot set property '{property}' of {kind}")]
    WriteOfNonObject { property: String, kind: &'static str },
    #[error("{0} is not a function")]
    NotAFunction(String),
    #[error("invalid assignment target")]
    InvalidTarget,
    #[error("{name}(): {message}")]
    Function { name: String, message: String },
    #[error("{0} is not iterable")]
    NotIterable(&'static str),
}

type Result<T> = std::result::Result<T, EvalError>;

/// Local bindings, innermost last.
pub type Locals = Vec<Local>;

#[derive(Debug, Clone, PartialEq)]
enum Root {
    Local(usize),
    Scope,
    ScopeKey(String),
}

#[derive(Debug, Clone, PartialEq)]
enum Step {
    Key(String),
    Index(usize),
}

/// A location inside the scope object.
#[derive(Debug, Clone, PartialEq)]
pub struct Origin {
    root: Root,
    steps: Vec<Step>,
}

impl Origin {
    fn join(&self, step: Step) -> Self {
        let mut steps = self.steps.clone();
        steps.push(step);
        Self {
            root: self.root.clone(),
            steps,
        }
    }
}

/// A named local binding.
///
/// Loop variables drawn from an array inside the scope keep its location:
/// reads see the scope's current element and member writes land in the scope.
#[derive(Debug, Clone, PartialEq)]
pub struct Local {
    pub name: String,
    pub value: Value,
    origin: Option<Origin>,
}

impl Local {
    pub fn new(name: impl Into<String>, value: Value) -> Self {
        Self {
            name: name.into(),
            value,
            origin: None,
        }
    }

    /// Whether this binding refers to an element of the scope.
    pub fn is_anchored(&self) -> bool {
        self.origin.is_some()
    }
}

impl Step {
    fn describe(&self) -> String {
        match self {
            Step::Key(k) => k.clone(),
            Step::Index(i) => i.to_string(),
        }
    }
}

/// Evaluation environment: the scope being rendered, local bindings from loops
/// and script declarations, and the callable allow-list.
pub struct Env<'a> {
    scope: &'a mut Value,
    functions: &'a Functions,
    locals: Locals,
}

impl<'a> Env<'a> {
    pub fn new(scope: &'a mut Value, functions: &'a Functions) -> Self {
        Self {
            scope,
            functions,
            locals: Vec::new(),
        }
    }

    pub fn with_locals(mut self, locals: Locals) -> Self {
        self.locals = locals;
        self
    }

    pub fn scope(&self) -> &Value {
        self.scope
    }

    pub fn locals(&self) -> &[Local] {
        &self.locals
    }

    pub fn push_local(&mut self, name: impl Into<String>, value: Value) {
        self.locals.push(Local::new(name, value));
    }

    pub fn bind(&mut self, local: Local) {
        self.locals.push(local);
    }

    /// Marker for [`Env::truncate_locals`].
    pub fn depth(&self) -> usize {
        self.locals.len()
    }

    pub fn truncate_locals(&mut self, depth: usize) {
        self.locals.truncate(depth);
    }

    fn local_index(&self, name: &str) -> Option<usize> {
        self.locals.iter().rposition(|l| l.name == name)
    }

    fn read_origin(&self, origin: &Origin) -> Option<&Value> {
        let mut cur = match &origin.root {
            Root::Scope => &*self.scope,
            Root::ScopeKey(key) => self.scope.get(key)?,
            Root::Local(_) => return None,
        };
        for step in &origin.steps {
            cur = child(cur, step)?;
        }
        Some(cur)
    }

    /// Rebase a path on a local onto the scope location that local came from.
    fn anchor(&self, root: Root, steps: Vec<Step>) -> Option<Origin> {
        match root {
            Root::Local(i) => {
                let base = self.locals[i].origin.as_ref()?;
                let mut full = base.steps.clone();
                full.extend(steps);
                Some(Origin {
                    root: base.root.clone(),
                    steps: full,
                })
            }
            root => Some(Origin { root, steps }),
        }
    }

    fn origin_of(&mut self, expr: &Expr) -> Result<Option<Origin>> {
        if !expr.is_assignable() {
            return Ok(None);
        }
        let (root, steps) = self.resolve_target(expr)?;
        Ok(self.anchor(root, steps))
    }

    pub fn lookup(&self, name: &str) -> Result<Value> {
        if let Some(i) = self.local_index(name) {
            let local = &self.locals[i];
            // an element removed from the scope since binding reads as its last value
            let live = local.origin.as_ref().and_then(|o| self.read_origin(o));
            return Ok(live.unwrap_or(&local.value).clone());
        }
        if name == SCOPE_NAME {
            return Ok(self.scope.clone());
        }
        match &*self.scope {
            Value::Object(map) if map.contains_key(name) => Ok(map[name].clone()),
            _ => Err(EvalError::Undefined(name.to_string())),
        }
    }

    /// Run statements in order; `let` declarations stay bound afterwards.
    /// Returns the value of the last expression statement.
    pub fn run(&mut self, program: &Program) -> Result<Value> {
        let mut last = Value::Null;
        for stmt in &program.stmts {
            match stmt {
                Stmt::Let(name, e) => {
                    let v = self.eval(e)?;
                    self.push_local(name.clone(), v);
                    last = Value::Null;
                }
                Stmt::Expr(e) => last = self.eval(e)?,
            }
        }
        Ok(last)
    }

    pub fn render(&mut self, text: &Interpolated) -> Result<String> {
        let mut out = String::new();
        for seg in &text.segments {
            match seg {
                Segment::Text(t) => out.push_str(t),
                Segment::Expr(e) => out.push_str(&to_display(&self.eval(e)?)),
            }
        }
        Ok(out)
    }

    /// Bindings for each pass of an iteration clause, in loop order.
    pub fn iterate(&mut self, clause: &ForClause) -> Result<Vec<Locals>> {
        let source = self.eval(&clause.iterable)?;
        let origin = match (clause.kind, &source) {
            (ForKind::Of, Value::Array(_)) => self.origin_of(&clause.iterable)?,
            _ => None,
        };
        let pairs: Vec<(Value, Value)> = match (clause.kind, source) {
            (ForKind::Of, Value::Array(items)) => items
                .into_iter()
                .enumerate()
                .map(|(i, v)| (v, Value::from(i)))
                .collect(),
            (ForKind::Of, Value::String(s)) => s
                .chars()
                .enumerate()
                .map(|(i, c)| (Value::String(c.to_string()), Value::from(i)))
                .collect(),
            (ForKind::Of, other) => return Err(EvalError::NotIterable(type_name(&other))),
            (ForKind::In, Value::Object(map)) => map
                .keys()
                .enumerate()
                .map(|(i, k)| (Value::String(k.clone()), Value::from(i)))
                .collect(),
            (ForKind::In, Value::Array(items)) => (0..items.len())
                .map(|i| (Value::String(i.to_string()), Value::from(i)))
                .collect(),
            (ForKind::In, Value::String(s)) => (0..s.chars().count())
                .map(|i| (Value::String(i.to_string()), Value::from(i)))
                .collect(),
            (ForKind::In, _) => Vec::new(),
        };
        Ok(pairs
            .into_iter()
            .enumerate()
            .map(|(i, (item, index))| {
                let mut b = vec![Local {
                    name: clause.item.clone(),
                    value: item,
                    origin: origin.as_ref().map(|o| o.join(Step::Index(i))),
                }];
                if let Some(name) = &clause.index {
                    b.push(Local::new(name.clone(), index));
                }
                b
            })
            .collect())
    }

    pub fn eval(&mut self, expr: &Expr) -> Result<Value> {
        match expr {
            Expr::Literal(v) => Ok(v.clone()),
            Expr::Array(items) => items
                .iter()
                .map(|e| self.eval(e))
                .collect::<Result<Vec<_>>>()
                .map(Value::Array),
            Expr::Object(fields) => {
                let mut map = Map::new();
                for (k, e) in fields {
                    let v = self.eval(e)?;
                    map.insert(k.clone(), v);
                }
                Ok(Value::Object(map))
            }
            Expr::Ident(name) => self.lookup(name),
            Expr::Member(obj, key) => {
                let obj = self.eval(obj)?;
                read_member(&obj, key)
            }
            Expr::Index(obj, idx) => {
                let obj = self.eval(obj)?;
                let idx = self.eval(idx)?;
                read_index(&obj, &idx)
            }
            Expr::Call(callee, args) => self.call(callee, args),
            Expr::Unary(op, e) => {
                let v = self.eval(e)?;
                Ok(match op {
                    UnaryOp::Not => Value::Bool(!truthy(&v)),
                    UnaryOp::Neg => number(-to_number(&v)),
                })
            }
            Expr::Binary(op, l, r) => self.binary(*op, l, r),
            Expr::Conditional(test, then, otherwise) => {
                if truthy(&self.eval(test)?) {
                    self.eval(then)
                } else {
                    self.eval(otherwise)
                }
            }
            Expr::Assign(op, target, value) => self.assign(*op, target, value),
        }
    }

    fn binary(&mut self, op: BinaryOp, l: &Expr, r: &Expr) -> Result<Value> {
        let lhs = self.eval(l)?;
        match op {
            BinaryOp::Or | BinaryOp::And if truthy(&lhs) == (op == BinaryOp::Or) => {
                return Ok(lhs);
            }
            _ => {}
        }
        let rhs = self.eval(r)?;
        let ord = || compare(&lhs, &rhs);
        Ok(match op {
            BinaryOp::StrictEq => Value::Bool(strict_eq(&lhs, &rhs)),
            BinaryOp::StrictNe => Value::Bool(!strict_eq(&lhs, &rhs)),
            BinaryOp::Eq => Value::Bool(loose_eq(&lhs, &rhs)),
            BinaryOp::Ne => Value::Bool(!loose_eq(&lhs, &rhs)),
            BinaryOp::Lt => Value::Bool(ord().is_some_and(|o| o.is_lt())),
            BinaryOp::Le => Value::Bool(ord().is_some_and(|o| o.is_le())),
            BinaryOp::Gt => Value::Bool(ord().is_some_and(|o| o.is_gt())),
            BinaryOp::Ge => Value::Bool(ord().is_some_and(|o| o.is_ge())),
            BinaryOp::Add => add(&lhs, &rhs),
            BinaryOp::Sub => number(to_number(&lhs) - to_number(&rhs)),
            BinaryOp::Mul => number(to_number(&lhs) * to_number(&rhs)),
            BinaryOp::Div => number(to_number(&lhs) / to_number(&rhs)),
            BinaryOp::Rem => number(to_number(&lhs) % to_number(&rhs)),
            BinaryOp::Or | BinaryOp::And => rhs,
        })
    }

    fn call(&mut self, callee: &Expr, args: &[Expr]) -> Result<Value> {
        let (name, mut values) = match callee {
            Expr::Ident(name) => (name.as_str(), Vec::with_capacity(args.len())),
            Expr::Member(recv, name) => {
                let recv = self.eval(recv)?;
                (name.as_str(), vec![recv])
            }
            _ => return Err(EvalError::NotAFunction("expression".to_string())),
        };
        for a in args {
            values.push(self.eval(a)?);
        }
        tracing::trace!(name, argc = values.len(), "call");
        match self.functions.call(name, &values) {
            Some(result) => result.map_err(|message| EvalError::Function {
                name: name.to_string(),
                message,
            }),
            None => Err(EvalError::NotAFunction(name.to_string())),
        }
    }

    fn assign(&mut self, op: AssignOp, target: &Expr, value: &Expr) -> Result<Value> {
        let (root, steps) = self.resolve_target(target)?;
        let rhs = self.eval(value)?;
        let new = match op {
            AssignOp::Set => rhs,
            _ => {
                let current = self.eval(target)?;
                match op {
                    AssignOp::Add => add(&current, &rhs),
                    AssignOp::Sub => number(to_number(&current) - to_number(&rhs)),
                    AssignOp::Mul => number(to_number(&current) * to_number(&rhs)),
                    _ => number(to_number(&current) / to_number(&rhs)),
                }
            }
        };
        self.write(root, &steps, new.clone())?;
        Ok(new)
    }

    fn resolve_target(&mut self, target: &Expr) -> Result<(Root, Vec<Step>)> {
        match target {
            Expr::Ident(name) => {
                let root = if let Some(i) = self.local_index(name) {
                    Root::Local(i)
                } else if name == SCOPE_NAME {
                    Root::Scope
                } else {
                    Root::ScopeKey(name.clone())
                };
                Ok((root, Vec::new()))
            }
            Expr::Member(obj, key) => {
                let (root, mut steps) = self.resolve_target(obj)?;
                steps.push(Step::Key(key.clone()));
                Ok((root, steps))
            }
            Expr::Index(obj, idx) => {
                let (root, mut steps) = self.resolve_target(obj)?;
                let idx = self.eval(idx)?;
                let step = match idx.as_u64() {
                    Some(i) => Step::Index(i as usize),
                    None => Step::Key(to_display(&idx)),
                };
                steps.push(step);
                Ok((root, steps))
            }
            _ => Err(EvalError::InvalidTarget),
        }
    }

    fn write(&mut self, root: Root, steps: &[Step], value: Value) -> Result<()> {
        if let Root::Local(i) = root {
            if steps.is_empty() {
                // rebinding the name detaches it from the scope
                let local = &mut self.locals[i];
                local.value = value;
                local.origin = None;
                return Ok(());
            }
            if let Some(target) = self.anchor(Root::Local(i), steps.to_vec()) {
                self.write(target.root, &target.steps, value)?;
                let fresh = self.locals[i]
                    .origin
                    .as_ref()
                    .and_then(|o| self.read_origin(o))
                    .cloned();
                if let Some(v) = fresh {
                    self.locals[i].value = v;
                }
                return Ok(());
            }
        }
        let mut cur = match root {
            Root::Local(i) => &mut self.locals[i].value,
            Root::Scope => &mut *self.scope,
            // a bare name writes (or creates) a key on the scope object
            Root::ScopeKey(name) if steps.is_empty() => {
                return set_step(self.scope, &Step::Key(name), value);
            }
            Root::ScopeKey(name) => match &mut *self.scope {
                Value::Object(map) if map.contains_key(&name) => map
                    .get_mut(&name)
                    .ok_or(EvalError::Undefined(name))?,
                _ => return Err(EvalError::Undefined(name)),
            },
        };
        let Some((last, init)) = steps.split_last() else {
            *cur = value;
            return Ok(());
        };
        for (i, step) in init.iter().enumerate() {
            let next = init.get(i + 1).unwrap_or(last);
            let is_null = cur.is_null();
            cur = match child_mut(cur, step) {
                Some(child) => child,
                None if is_null => return Err(EvalError::ReadOfNull(step.describe())),
                None => {
                    return Err(EvalError::WriteOfNonObject {
                        property: next.describe(),
                        kind: "null",
                    });
                }
            };
        }
        set_step(cur, last, value)
    }
}

fn child<'v>(cur: &'v Value, step: &Step) -> Option<&'v Value> {
    match (cur, step) {
        (Value::Object(map), Step::Key(k)) => map.get(k),
        (Value::Object(map), Step::Index(i)) => map.get(&i.to_string()),
        (Value::Array(items), Step::Index(i)) => items.get(*i),
        _ => None,
    }
}

fn child_mut<'v>(cur: &'v mut Value, step: &Step) -> Option<&'v mut Value> {
    match (cur, step) {
        (Value::Object(map), Step::Key(k)) => map.get_mut(k),
        (Value::Object(map), Step::Index(i)) => map.get_mut(&i.to_string()),
        (Value::Array(items), Step::Index(i)) => items.get_mut(*i),
        _ => None,
    }
}

fn set_step(target: &mut Value, step: &Step, value: Value) -> Result<()> {
    match (target, step) {
        (Value::Object(map), step) => {
            map.insert(step.describe(), value);
            Ok(())
        }
        (Value::Array(items), Step::Index(i)) => {
            if *i >= items.len() {
                items.resize(*i + 1, Value::Null);
            }
            items[*i] = value;
            Ok(())
        }
        (other, step) => Err(EvalError::WriteOfNonObject {
            property: step.describe(),
            kind: type_name(other),
        }),
    }
}

fn read_member(obj: &Value, key: &str) -> Result<Value> {
    match obj {
        Value::Null => Err(EvalError::ReadOfNull(key.to_string())),
        Value::Object(map) => Ok(map.get(key).cloned().unwrap_or(Value::Null)),
        Value::Array(items) if key == "length" => Ok(Value::from(items.len())),
        Value::Array(items) => Ok(key
            .parse::<usize>()
            .ok()
            .and_then(|i| items.get(i).cloned())
            .unwrap_or(Value::Null)),
        Value::String(s) if key == "length" => Ok(Value::from(s.chars().count())),
        _ => Ok(Value::Null),
    }
}

fn read_index(obj: &Value, idx: &Value) -> Result<Value> {
    match (obj, idx) {
        (Value::Array(items), Value::Number(n)) => Ok(n
            .as_u64()
            .and_then(|i| items.get(i as usize).cloned())
            .unwrap_or(Value::Null)),
        (Value::String(s), Value::Number(n)) => Ok(n
            .as_u64()
            .and_then(|i| s.chars().nth(i as usize))
            .map(|c| Value::String(c.to_string()))
            .unwrap_or(Value::Null)),
        _ => read_member(obj, &to_display(idx)),
    }
}
