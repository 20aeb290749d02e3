//! Tree-walking evaluator and the whitelisted function library.

use std::cmp::Ordering;
use std::collections::HashMap;

use serde_json::{Number, Value};

use super::builtin;
use super::parser::{BinaryOp, Expr, Stmt, UnaryOp};
use super::{TransformFunctionError, MAX_EVAL_STEPS};

/// Name of the binding that receives the input value.
pub const INPUT_BINDING: &str = "value";

/// Name of the binding read back as the function's output.
pub const RESULT_BINDING: &str = "result";

/// Argument count bounds for each callable function. `None` as the upper
/// bound means variadic.
pub(crate) fn function_arity(name: &str) -> Option<(usize, Option<usize>)> {
    let arity = match name {
        "upper" | "lower" | "trim" | "len" | "str" | "int" | "float" | "bool" | "is_null"
        | "abs" => (1, Some(1)),
        "split" | "join" | "contains" | "starts_with" | "ends_with" | "default" => (2, Some(2)),
        "replace" => (3, Some(3)),
        "substr" => (2, Some(3)),
        "round" => (1, Some(2)),
        "concat" | "coalesce" | "min" | "max" => (1, None),
        _ => return None,
    };
    Some(arity)
}

pub(crate) struct Evaluator {
    env: HashMap<String, Value>,
    steps: usize,
}

impl Evaluator {
    pub(crate) fn new(input: Value) -> Self {
        let mut env = HashMap::new();
        env.insert(INPUT_BINDING.to_string(), input);
        Self { env, steps: 0 }
    }

    /// Run all statements, then read back the `result` binding.
    pub(crate) fn run(mut self, stmts: &[Stmt]) -> Result<Value, TransformFunctionError> {
        for stmt in stmts {
            match stmt {
                Stmt::Bind(name, expr) => {
                    let v = self.eval(expr)?;
                    self.env.insert(name.clone(), v);
                }
                Stmt::Expr(expr) => {
                    self.eval(expr)?;
                }
            }
        }
        self.env
            .remove(RESULT_BINDING)
            .ok_or(TransformFunctionError::MissingResult)
    }

    fn eval(&mut self, expr: &Expr) -> Result<Value, TransformFunctionError> {
        self.steps += 1;
        if self.steps > MAX_EVAL_STEPS {
            return Err(TransformFunctionError::BudgetExceeded {
                limit: MAX_EVAL_STEPS,
            });
        }
        match expr {
            Expr::Literal(v) => Ok(v.clone()),
            Expr::Var(name) => self
                .env
                .get(name)
                .cloned()
                .ok_or_else(|| runtime(format!("undefined variable '{name}'"))),
            Expr::List(items) => {
                let mut out = Vec::with_capacity(items.len());
                for item in items {
                    out.push(self.eval(item)?);
                }
                Ok(Value::Array(out))
            }
            Expr::Unary(op, operand) => {
                let v = self.eval(operand)?;
                match op {
                    UnaryOp::Not => Ok(Value::Bool(!truthy(&v))),
                    UnaryOp::Neg => match num(&v) {
                        Some(Num::Int(i)) => i
                            .checked_neg()
                            .map(Value::from)
                            .ok_or_else(|| runtime("integer overflow".into())),
                        Some(Num::Float(f)) => float_value(-f),
                        None => Err(runtime(format!("cannot negate {}", type_name(&v)))),
                    },
                }
            }
            Expr::And(lhs, rhs) => {
                let l = self.eval(lhs)?;
                if !truthy(&l) {
                    return Ok(Value::Bool(false));
                }
                Ok(Value::Bool(truthy(&self.eval(rhs)?)))
            }
            Expr::Or(lhs, rhs) => {
                let l = self.eval(lhs)?;
                if truthy(&l) {
                    return Ok(Value::Bool(true));
                }
                Ok(Value::Bool(truthy(&self.eval(rhs)?)))
            }
            Expr::Binary(op, lhs, rhs) => {
                let l = self.eval(lhs)?;
                let r = self.eval(rhs)?;
                binary(*op, &l, &r)
            }
            Expr::Index(target, index) => {
                let t = self.eval(target)?;
                let i = self.eval(index)?;
                index_value(&t, &i)
            }
            Expr::If {
                cond,
                then,
                otherwise,
            } => {
                if truthy(&self.eval(cond)?) {
                    self.eval(then)
                } else if let Some(otherwise) = otherwise {
                    self.eval(otherwise)
                } else {
                    Ok(Value::Null)
                }
            }
            Expr::Call(name, args) => {
                let mut values = Vec::with_capacity(args.len());
                for arg in args {
                    values.push(self.eval(arg)?);
                }
                call(name, &values)
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Value helpers
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy)]
enum Num {
    Int(i64),
    Float(f64),
}

impl Num {
    fn as_f64(self) -> f64 {
        match self {
            Num::Int(i) => i as f64,
            Num::Float(f) => f,
        }
    }
}

fn num(v: &Value) -> Option<Num> {
    let Value::Number(n) = v else {
        return None;
    };
    n.as_i64()
        .map(Num::Int)
        .or_else(|| n.as_f64().map(Num::Float))
}

fn runtime(message: String) -> TransformFunctionError {
    TransformFunctionError::Runtime(message)
}

fn float_value(f: f64) -> Result<Value, TransformFunctionError> {
    Number::from_f64(f)
        .map(Value::Number)
        .ok_or_else(|| runtime("result is not a finite number".into()))
}

fn type_name(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn truthy(v: &Value) -> bool {
    match v {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}

/// Text form used by string concatenation and `str()`.
fn display(v: &Value) -> String {
    match v {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn text_arg<'a>(name: &str, v: &'a Value) -> Result<&'a str, TransformFunctionError> {
    v.as_str()
        .ok_or_else(|| runtime(format!("{name}() expects a string, got {}", type_name(v))))
}

fn int_arg(name: &str, v: &Value) -> Result<i64, TransformFunctionError> {
    v.as_i64()
        .ok_or_else(|| runtime(format!("{name}() expects an integer, got {}", type_name(v))))
}

fn values_equal(l: &Value, r: &Value) -> bool {
    match (num(l), num(r)) {
        (Some(a), Some(b)) => a.as_f64() == b.as_f64(),
        _ => l == r,
    }
}

fn compare(l: &Value, r: &Value) -> Result<Ordering, TransformFunctionError> {
    match (l, r) {
        (Value::String(a), Value::String(b)) => Ok(a.cmp(b)),
        _ => match (num(l), num(r)) {
            (Some(a), Some(b)) => a
                .as_f64()
                .partial_cmp(&b.as_f64())
                .ok_or_else(|| runtime("cannot compare NaN".into())),
            _ => Err(runtime(format!(
                "cannot compare {} with {}",
                type_name(l),
                type_name(r)
            ))),
        },
    }
}

fn binary(op: BinaryOp, l: &Value, r: &Value) -> Result<Value, TransformFunctionError> {
    match op {
        BinaryOp::Eq => return Ok(Value::Bool(values_equal(l, r))),
        BinaryOp::Ne => return Ok(Value::Bool(!values_equal(l, r))),
        BinaryOp::Lt => return Ok(Value::Bool(compare(l, r)? == Ordering::Less)),
        BinaryOp::Le => return Ok(Value::Bool(compare(l, r)? != Ordering::Greater)),
        BinaryOp::Gt => return Ok(Value::Bool(compare(l, r)? == Ordering::Greater)),
        BinaryOp::Ge => return Ok(Value::Bool(compare(l, r)? != Ordering::Less)),
        BinaryOp::Add => {
            if l.is_string() || r.is_string() {
                return Ok(Value::String(display(l) + &display(r)));
            }
            if let (Value::Array(a), Value::Array(b)) = (l, r) {
                return Ok(Value::Array(a.iter().chain(b).cloned().collect()));
            }
        }
        _ => {}
    }

    let (Some(a), Some(b)) = (num(l), num(r)) else {
        return Err(runtime(format!(
            "unsupported operand types {} and {}",
            type_name(l),
            type_name(r)
        )));
    };

    if let (Num::Int(x), Num::Int(y)) = (a, b) {
        let checked = match op {
            BinaryOp::Add => x.checked_add(y),
            BinaryOp::Sub => x.checked_sub(y),
            BinaryOp::Mul => x.checked_mul(y),
            BinaryOp::Rem => {
                if y == 0 {
                    return Err(runtime("modulo by zero".into()));
                }
                x.checked_rem(y)
            }
            BinaryOp::Div => {
                if y == 0 {
                    return Err(runtime("division by zero".into()));
                }
                match x.checked_rem(y) {
                    Some(0) => x.checked_div(y),
                    Some(_) => return float_value(x as f64 / y as f64),
                    None => None,
                }
            }
            _ => None,
        };
        return checked
            .map(Value::from)
            .ok_or_else(|| runtime("integer overflow".into()));
    }

    let (x, y) = (a.as_f64(), b.as_f64());
    let f = match op {
        BinaryOp::Add => x + y,
        BinaryOp::Sub => x - y,
        BinaryOp::Mul => x * y,
        BinaryOp::Div | BinaryOp::Rem if y == 0.0 => {
            return Err(runtime("division by zero".into()))
        }
        BinaryOp::Div => x / y,
        BinaryOp::Rem => x % y,
        _ => unreachable!("comparison operators return early"),
    };
    float_value(f)
}

fn index_value(target: &Value, index: &Value) -> Result<Value, TransformFunctionError> {
    match (target, index) {
        (Value::Null, _) => Ok(Value::Null),
        (Value::Object(map), Value::String(key)) => {
            Ok(map.get(key).cloned().unwrap_or(Value::Null))
        }
        (Value::Array(items), _) => {
            let i = int_arg("index", index)?;
            Ok(resolve_index(i, items.len())
                .and_then(|i| items.get(i))
                .cloned()
                .unwrap_or(Value::Null))
        }
        (Value::String(s), _) => {
            let i = int_arg("index", index)?;
            let chars: Vec<char> = s.chars().collect();
            Ok(resolve_index(i, chars.len())
                .map(|i| Value::String(chars[i].to_string()))
                .unwrap_or(Value::Null))
        }
        _ => Err(runtime(format!(
            "cannot index {} with {}",
            type_name(target),
            type_name(index)
        ))),
    }
}

/// Negative indexes count from the end.
fn resolve_index(i: i64, len: usize) -> Option<usize> {
    let len = i64::try_from(len).ok()?;
    let resolved = if i < 0 { len + i } else { i };
    (0..len).contains(&resolved).then_some(resolved as usize)
}

// ---------------------------------------------------------------------------
// Function library
// ---------------------------------------------------------------------------

fn call(name: &str, args: &[Value]) -> Result<Value, TransformFunctionError> {
    match name {
        "upper" | "lower" | "trim" => {
            if args[0].is_null() {
                return Ok(Value::Null);
            }
            let s = display(&args[0]);
            Ok(Value::String(match name {
                "upper" => s.to_uppercase(),
                "lower" => s.to_lowercase(),
                _ => s.trim().to_string(),
            }))
        }
        "len" => {
            let n = match &args[0] {
                Value::Null => 0,
                Value::String(s) => s.chars().count(),
                Value::Array(a) => a.len(),
                Value::Object(o) => o.len(),
                other => {
                    return Err(runtime(format!("len() not defined for {}", type_name(other))))
                }
            };
            Ok(Value::from(n as u64))
        }
        "str" => Ok(Value::String(display(&args[0]))),
        "int" => match &args[0] {
            Value::Number(n) => n
                .as_i64()
                .or_else(|| n.as_f64().map(|f| f.trunc() as i64))
                .map(Value::from)
                .ok_or_else(|| runtime("int() overflow".into())),
            Value::Bool(b) => Ok(Value::from(i64::from(*b))),
            Value::String(s) => s
                .trim()
                .parse::<i64>()
                .map(Value::from)
                .map_err(|_| runtime(format!("int() cannot parse '{s}'"))),
            other => Err(runtime(format!("int() not defined for {}", type_name(other)))),
        },
        "float" => match &args[0] {
            Value::Number(n) => float_value(n.as_f64().unwrap_or(0.0)),
            Value::String(s) => s
                .trim()
                .parse::<f64>()
                .map_err(|_| runtime(format!("float() cannot parse '{s}'")))
                .and_then(float_value),
            other => Err(runtime(format!(
                "float() not defined for {}",
                type_name(other)
            ))),
        },
        "bool" => Ok(Value::Bool(builtin::to_boolean(&args[0]))),
        "is_null" => Ok(Value::Bool(args[0].is_null())),
        "abs" => match num(&args[0]) {
            Some(Num::Int(i)) => i
                .checked_abs()
                .map(Value::from)
                .ok_or_else(|| runtime("integer overflow".into())),
            Some(Num::Float(f)) => float_value(f.abs()),
            None => Err(runtime(format!("abs() not defined for {}", type_name(&args[0])))),
        },
        "round" => {
            let x = num(&args[0])
                .ok_or_else(|| runtime(format!("round() not defined for {}", type_name(&args[0]))))?
                .as_f64();
            match args.get(1) {
                None => Ok(Value::from(x.round() as i64)),
                Some(d) => {
                    let digits = int_arg("round", d)?.clamp(0, 12) as i32;
                    let factor = 10f64.powi(digits);
                    float_value((x * factor).round() / factor)
                }
            }
        }
        "concat" => Ok(Value::String(args.iter().map(display).collect())),
        "replace" => {
            let s = display(&args[0]);
            let from = text_arg("replace", &args[1])?;
            let to = display(&args[2]);
            if from.is_empty() {
                return Ok(Value::String(s));
            }
            Ok(Value::String(s.replace(from, &to)))
        }
        "substr" => {
            let s = display(&args[0]);
            let start = int_arg("substr", &args[1])?.max(0) as usize;
            let taken: String = match args.get(2) {
                Some(len) => s
                    .chars()
                    .skip(start)
                    .take(int_arg("substr", len)?.max(0) as usize)
                    .collect(),
                None => s.chars().skip(start).collect(),
            };
            Ok(Value::String(taken))
        }
        "split" => {
            let s = display(&args[0]);
            let sep = text_arg("split", &args[1])?;
            if sep.is_empty() {
                return Err(runtime("split() separator cannot be empty".into()));
            }
            Ok(Value::Array(
                s.split(sep).map(|p| Value::String(p.to_string())).collect(),
            ))
        }
        "join" => {
            let Value::Array(items) = &args[0] else {
                return Err(runtime(format!(
                    "join() expects an array, got {}",
                    type_name(&args[0])
                )));
            };
            let sep = text_arg("join", &args[1])?;
            Ok(Value::String(
                items.iter().map(display).collect::<Vec<_>>().join(sep),
            ))
        }
        "contains" => match &args[0] {
            Value::Array(items) => Ok(Value::Bool(
                items.iter().any(|item| values_equal(item, &args[1])),
            )),
            Value::Null => Ok(Value::Bool(false)),
            hay => Ok(Value::Bool(display(hay).contains(&display(&args[1])))),
        },
        "starts_with" => Ok(Value::Bool(
            display(&args[0]).starts_with(text_arg("starts_with", &args[1])?),
        )),
        "ends_with" => Ok(Value::Bool(
            display(&args[0]).ends_with(text_arg("ends_with", &args[1])?),
        )),
        "coalesce" => Ok(args
            .iter()
            .find(|v| !crate::record::is_blank(v))
            .cloned()
            .unwrap_or(Value::Null)),
        "default" => Ok(if crate::record::is_blank(&args[0]) {
            args[1].clone()
        } else {
            args[0].clone()
        }),
        "min" | "max" => {
            let mut best = args[0].clone();
            for candidate in &args[1..] {
                let ord = compare(candidate, &best)?;
                let better = if name == "min" {
                    ord == Ordering::Less
                } else {
                    ord == Ordering::Greater
                };
                if better {
                    best = candidate.clone();
                }
            }
            Ok(best)
        }
        other => Err(runtime(format!("unknown function '{other}'"))),
    }
}
