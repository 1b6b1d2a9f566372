// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

//! Runtime values of the script language

use crate::compiler::FunctionProto;
use diskfs::OpenFileHandle;
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

#[derive(Clone, Default)]
pub enum Value {
    #[default]
    Null,
    Number(f64),
    Str(Rc<str>),
    List(Rc<Vec<Value>>),
    Function(Rc<FunctionProto>),
    /// Open file, owned by whichever script values still refer to it
    Handle(Rc<RefCell<OpenFileHandle>>),
}

impl Value {
    #[must_use]
    pub fn str(text: impl AsRef<str>) -> Self {
        Value::Str(Rc::from(text.as_ref()))
    }

    #[must_use]
    pub fn list(items: Vec<Value>) -> Self {
        Value::List(Rc::new(items))
    }

    #[must_use]
    pub fn bool(flag: bool) -> Self {
        Value::Number(if flag { 1.0 } else { 0.0 })
    }

    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    #[must_use]
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Null => false,
            Value::Number(n) => *n != 0.0,
            Value::Str(s) => !s.is_empty(),
            Value::List(items) => !items.is_empty(),
            Value::Function(_) | Value::Handle(_) => true,
        }
    }

    #[must_use]
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Number(_) => "number",
            Value::Str(_) => "string",
            Value::List(_) => "list",
            Value::Function(_) => "function",
            Value::Handle(_) => "file handle",
        }
    }

    pub fn as_number(&self) -> Result<f64, String> {
        match self {
            Value::Number(n) => Ok(*n),
            Value::Null => Ok(0.0),
            other => Err(format!("expected a number, got {}", other.type_name())),
        }
    }

    /// Source-like rendering, used inside lists
    #[must_use]
    pub fn repr(&self) -> String {
        match self {
            Value::Str(s) => format!("\"{}\"", s.replace('"', "\"\"")),
            other => other.to_string(),
        }
    }

    /// Element `index` of a list or string; negative counts from the end
    pub fn index(&self, index: &Value) -> Result<Value, String> {
        let raw = index.as_number()?;
        let pick = |len: usize| -> Result<usize, String> {
            let len = len as i64;
            let mut i = raw.floor() as i64;
            if i < 0 {
                i += len;
            }
            if i < 0 || i >= len {
                return Err(format!("index {raw} out of range"));
            }
            Ok(i as usize)
        };
        match self {
            Value::List(items) => Ok(items[pick(items.len())?].clone()),
            Value::Str(s) => {
                let idx = pick(s.chars().count())?;
                Ok(s.chars().nth(idx).map(|c| Value::str(c.to_string())).unwrap_or_default())
            }
            other => Err(format!("cannot index a {}", other.type_name())),
        }
    }

    /// Items visited by a `for` loop
    pub fn iter_len(&self) -> Result<usize, String> {
        match self {
            Value::List(items) => Ok(items.len()),
            Value::Str(s) => Ok(s.chars().count()),
            Value::Null => Ok(0),
            other => Err(format!("cannot iterate over a {}", other.type_name())),
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::List(a), Value::List(b)) => a == b,
            (Value::Function(a), Value::Function(b)) => Rc::ptr_eq(a, b),
            (Value::Handle(a), Value::Handle(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Number(n) => {
                if n.fract() == 0.0 && n.abs() < 1e15 {
                    write!(f, "{}", *n as i64)
                } else {
                    write!(f, "{n}")
                }
            }
            Value::Str(s) => f.write_str(s),
            Value::List(items) => {
                let parts: Vec<String> = items.iter().map(Value::repr).collect();
                write!(f, "[{}]", parts.join(", "))
            }
            Value::Function(proto) => write!(f, "FUNCTION({})", proto.params.join(", ")),
            Value::Handle(handle) => match handle.try_borrow() {
                Ok(h) => write!(f, "<file {}>", h.path()),
                Err(_) => write!(f, "<file>"),
            },
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.repr())
    }
}

/// Binary operators shared by the compiler and the machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Pow,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl BinOp {
    pub fn apply(self, lhs: &Value, rhs: &Value) -> Result<Value, String> {
        use std::cmp::Ordering;
        match self {
            BinOp::Eq => return Ok(Value::bool(lhs == rhs)),
            BinOp::Ne => return Ok(Value::bool(lhs != rhs)),
            BinOp::Lt | BinOp::Le | BinOp::Gt | BinOp::Ge => {
                let ord = match (lhs, rhs) {
                    (Value::Str(a), Value::Str(b)) => a.cmp(b),
                    _ => lhs
                        .as_number()?
                        .partial_cmp(&rhs.as_number()?)
                        .unwrap_or(Ordering::Equal),
                };
                let result = match self {
                    BinOp::Lt => ord == Ordering::Less,
                    BinOp::Le => ord != Ordering::Greater,
                    BinOp::Gt => ord == Ordering::Greater,
                    _ => ord != Ordering::Less,
                };
                return Ok(Value::bool(result));
            }
            _ => {}
        }

        match (self, lhs, rhs) {
            (BinOp::Add, Value::Str(_), _) | (BinOp::Add, _, Value::Str(_)) => {
                Ok(Value::str(format!("{lhs}{rhs}")))
            }
            (BinOp::Add, Value::List(a), Value::List(b)) => {
                let mut items = a.as_ref().clone();
                items.extend(b.iter().cloned());
                Ok(Value::list(items))
            }
            (BinOp::Mul, Value::Str(s), Value::Number(n)) => {
                Ok(Value::str(s.repeat(n.max(0.0) as usize)))
            }
            _ => {
                let a = lhs.as_number()?;
                let b = rhs.as_number()?;
                let n = match self {
                    BinOp::Add => a + b,
                    BinOp::Sub => a - b,
                    BinOp::Mul => a * b,
                    BinOp::Div | BinOp::Mod if b == 0.0 => {
                        return Err("division by zero".to_string());
                    }
                    BinOp::Div => a / b,
                    BinOp::Mod => a % b,
                    BinOp::Pow => a.powf(b),
                    _ => return Err("bad operator".to_string()),
                };
                Ok(Value::Number(n))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        assert_eq!(Value::Number(3.0).to_string(), "3");
        assert_eq!(Value::Number(0.5).to_string(), "0.5");
        assert_eq!(Value::Null.to_string(), "null");
        let list = Value::list(vec![Value::Number(1.0), Value::str("a\"b")]);
        assert_eq!(list.to_string(), "[1, \"a\"\"b\"]");
    }

    #[test]
    fn test_arithmetic_and_concat() {
        let two = Value::Number(2.0);
        assert_eq!(BinOp::Pow.apply(&two, &Value::Number(3.0)), Ok(Value::Number(8.0)));
        assert_eq!(
            BinOp::Add.apply(&Value::str("n="), &two),
            Ok(Value::str("n=2"))
        );
        assert_eq!(BinOp::Mul.apply(&Value::str("ab"), &two), Ok(Value::str("abab")));
        assert!(BinOp::Div.apply(&two, &Value::Number(0.0)).is_err());
        assert!(BinOp::Sub.apply(&Value::str("x"), &two).is_err());
    }

    #[test]
    fn test_comparisons() {
        let a = Value::str("apple");
        let b = Value::str("banana");
        assert_eq!(BinOp::Lt.apply(&a, &b), Ok(Value::bool(true)));
        assert_eq!(BinOp::Ge.apply(&Value::Number(2.0), &Value::Number(2.0)), Ok(Value::bool(true)));
        assert_eq!(BinOp::Eq.apply(&a, &Value::Number(1.0)), Ok(Value::bool(false)));
    }

    #[test]
    fn test_indexing() {
        let list = Value::list(vec![Value::Number(1.0), Value::Number(2.0)]);
        assert_eq!(list.index(&Value::Number(-1.0)), Ok(Value::Number(2.0)));
        assert!(list.index(&Value::Number(2.0)).is_err());
        assert_eq!(Value::str("héllo").index(&Value::Number(1.0)), Ok(Value::str("é")));
    }

    #[test]
    fn test_truthiness() {
        assert!(!Value::Null.is_truthy());
        assert!(!Value::str("").is_truthy());
        assert!(Value::Number(-1.0).is_truthy());
        assert!(!Value::list(vec![]).is_truthy());
    }
}
