use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use serde_json::Value;

use crate::value::{loose_eq, number, to_display, to_number, type_name};

pub type NativeFn = Rc<dyn Fn(&[Value]) -> Result<Value, String>>;

/// The functions an expression is allowed to call.
///
/// Nothing outside this table is reachable from template code. Method calls
/// `x.f(a)` are looked up here as `f(x, a)`.
#[derive(Clone, Default)]
pub struct Functions {
    table: HashMap<String, NativeFn>,
}

impl fmt::Debug for Functions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<_> = self.table.keys().collect();
        names.sort();
        f.debug_struct("Functions").field("names", &names).finish()
    }
}

impl Functions {
    /// An empty table: no calls allowed.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_builtins() -> Self {
        let mut f = Self::new();
        f.register("len", |a| match arg(a, 0) {
            Value::String(s) => Ok(Value::from(s.chars().count())),
            Value::Array(v) => Ok(Value::from(v.len())),
            Value::Object(m) => Ok(Value::from(m.len())),
            other => Err(format!("len() of {}", type_name(other))),
        });
        f.register("upper", |a| Ok(Value::String(to_display(arg(a, 0)).to_uppercase())));
        f.alias("toUpperCase", "upper");
        f.register("lower", |a| Ok(Value::String(to_display(arg(a, 0)).to_lowercase())));
        f.alias("toLowerCase", "lower");
        f.register("trim", |a| Ok(Value::String(to_display(arg(a, 0)).trim().to_string())));
        f.register("join", |a| {
            let sep = match a.get(1) {
                Some(Value::Null) | None => ",".to_string(),
                Some(s) => to_display(s),
            };
            match arg(a, 0) {
                Value::Array(items) => Ok(Value::String(
                    items.iter().map(to_display).collect::<Vec<_>>().join(&sep),
                )),
                other => Err(format!("join() of {}", type_name(other))),
            }
        });
        f.register("keys", |a| match arg(a, 0) {
            Value::Object(m) => Ok(Value::Array(m.keys().cloned().map(Value::String).collect())),
            Value::Array(v) => Ok(Value::Array(
                (0..v.len()).map(|i| Value::String(i.to_string())).collect(),
            )),
            other => Err(format!("keys() of {}", type_name(other))),
        });
        f.register("values", |a| match arg(a, 0) {
            Value::Object(m) => Ok(Value::Array(m.values().cloned().collect())),
            Value::Array(v) => Ok(Value::Array(v.clone())),
            other => Err(format!("values() of {}", type_name(other))),
        });
        f.register("str", |a| Ok(Value::String(to_display(arg(a, 0)))));
        f.alias("String", "str");
        f.register("num", |a| Ok(number(to_number(arg(a, 0)))));
        f.alias("Number", "num");
        f.register("json", |a| Ok(Value::String(arg(a, 0).to_string())));
        f.register("range", |a| {
            let (start, end) = match a.len() {
                0 | 1 => (0.0, to_number(arg(a, 0))),
                _ => (to_number(arg(a, 0)), to_number(arg(a, 1))),
            };
            if !start.is_finite() || !end.is_finite() {
                return Err("range() bounds must be numbers".to_string());
            }
            let (start, end) = (start as i64, end as i64);
            Ok(Value::Array((start..end).map(Value::from).collect()))
        });
        f.register("min", |a| Ok(fold_numbers(a, f64::INFINITY, f64::min)));
        f.register("max", |a| Ok(fold_numbers(a, f64::NEG_INFINITY, f64::max)));
        f.register("abs", |a| Ok(number(to_number(arg(a, 0)).abs())));
        f.register("floor", |a| Ok(number(to_number(arg(a, 0)).floor())));
        f.register("ceil", |a| Ok(number(to_number(arg(a, 0)).ceil())));
        f.register("round", |a| Ok(number((to_number(arg(a, 0)) + 0.5).floor())));
        f.register("includes", |a| match arg(a, 0) {
            Value::String(s) => Ok(Value::Bool(s.contains(&to_display(arg(a, 1))))),
            Value::Array(v) => Ok(Value::Bool(v.iter().any(|x| loose_eq(x, arg(a, 1))))),
            Value::Object(m) => Ok(Value::Bool(m.contains_key(&to_display(arg(a, 1))))),
            other => Err(format!("includes() on {}", type_name(other))),
        });
        f.register("slice", |a| {
            let bounds = |len: usize| {
                let clamp = |v: &Value, default: usize| match v {
                    Value::Null => default,
                    v => {
                        let n = to_number(v) as i64;
                        if n < 0 {
                            (len as i64 + n).max(0) as usize
                        } else {
                            (n as usize).min(len)
                        }
                    }
                };
                let start = clamp(arg(a, 1), 0);
                let end = clamp(arg(a, 2), len);
                (start, end.max(start))
            };
            match arg(a, 0) {
                Value::String(s) => {
                    let chars: Vec<char> = s.chars().collect();
                    let (start, end) = bounds(chars.len());
                    Ok(Value::String(chars[start..end].iter().collect()))
                }
                Value::Array(v) => {
                    let (start, end) = bounds(v.len());
                    Ok(Value::Array(v[start..end].to_vec()))
                }
                other => Err(format!("slice() of {}", type_name(other))),
            }
        });
        f
    }

    /// Add or replace a callable.
    pub fn register(
        &mut self,
        name: impl Into<String>,
        f: impl Fn(&[Value]) -> Result<Value, String> + 'static,
    ) -> &mut Self {
        self.table.insert(name.into(), Rc::new(f));
        self
    }

    fn alias(&mut self, name: &str, target: &str) {
        if let Some(f) = self.table.get(target).cloned() {
            self.table.insert(name.to_string(), f);
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.table.contains_key(name)
    }

    /// `None` when `name` is not registered.
    pub fn call(&self, name: &str, args: &[Value]) -> Option<Result<Value, String>> {
        self.table.get(name).map(|f| f(args))
    }
}

fn arg(args: &[Value], i: usize) -> &Value {
    static NULL: Value = Value::Null;
    args.get(i).unwrap_or(&NULL)
}

fn fold_numbers(args: &[Value], init: f64, f: fn(f64, f64) -> f64) -> Value {
    let items: Vec<&Value> = match args {
        [Value::Array(v)] => v.iter().collect(),
        _ => args.iter().collect(),
    };
    let mut acc = init;
    for v in items {
        let n = to_number(v);
        if n.is_nan() {
            return Value::Null;
        }
        acc = f(acc, n);
    }
    number(acc)
}
