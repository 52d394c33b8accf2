//! Runtime values of the script language.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use super::ast::FnDef;
use crate::widgets::WidgetValue;

/// A script value.
///
/// Values are plain data: publishing a value copies it into the namespace,
/// and every reader receives its own copy.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Unit,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    List(Vec<Value>),
    Tuple(Vec<Value>),
    Record {
        name: Option<String>,
        fields: BTreeMap<String, Value>,
    },
    Function(Arc<Closure>),
}

/// A function value together with the free names it captured.
#[derive(Debug, Clone, PartialEq)]
pub struct Closure {
    pub def: Arc<FnDef>,
    pub captures: BTreeMap<String, Value>,
}

impl Value {
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Unit => "unit",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Str(_) => "string",
            Value::List(_) => "list",
            Value::Tuple(_) => "tuple",
            Value::Record { .. } => "record",
            Value::Function(_) => "function",
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn truthy(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    fn fmt_debug(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Str(s) => write!(f, "{:?}", s),
            other => write!(f, "{}", other),
        }
    }
}

impl From<&WidgetValue> for Value {
    fn from(value: &WidgetValue) -> Self {
        match value {
            WidgetValue::Number(n) => Value::Float(*n),
            WidgetValue::Text(s) => Value::Str(s.clone()),
            WidgetValue::Index(i) => Value::Int(*i as i64),
            WidgetValue::Bool(b) => Value::Bool(*b),
        }
    }
}

/// Formats a value the way a cell displays it. Strings print bare at the top
/// level and quoted inside collections.
impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Unit => f.write_str("()"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int(i) => write!(f, "{}", i),
            Value::Float(x) => write!(f, "{:?}", x),
            Value::Str(s) => f.write_str(s),
            Value::List(items) => {
                f.write_str("[")?;
                write_items(f, items)?;
                f.write_str("]")
            }
            Value::Tuple(items) => {
                f.write_str("(")?;
                write_items(f, items)?;
                if items.len() == 1 {
                    f.write_str(",")?;
                }
                f.write_str(")")
            }
            Value::Record { name, fields } => {
                if let Some(name) = name {
                    write!(f, "{} ", name)?;
                }
                f.write_str("{")?;
                for (i, (key, value)) in fields.iter().enumerate() {
                    f.write_str(if i == 0 { " " } else { ", " })?;
                    write!(f, "{}: ", key)?;
                    value.fmt_debug(f)?;
                }
                f.write_str(if fields.is_empty() { "}" } else { " }" })
            }
            Value::Function(closure) => write!(f, "<fn {}>", closure.def.name),
        }
    }
}

fn write_items(f: &mut fmt::Formatter<'_>, items: &[Value]) -> fmt::Result {
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            f.write_str(", ")?;
        }
        item.fmt_debug(f)?;
    }
    Ok(())
}

/// Render a value for `{:?}` placeholders.
pub fn debug_string(value: &Value) -> String {
    struct Debug<'a>(&'a Value);
    impl fmt::Display for Debug<'_> {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            self.0.fmt_debug(f)
        }
    }
    Debug(value).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_scalars() {
        assert_eq!(Value::Int(4).to_string(), "4");
        assert_eq!(Value::Float(2.0).to_string(), "2.0");
        assert_eq!(Value::Str("hi".to_string()).to_string(), "hi");
        assert_eq!(Value::Unit.to_string(), "()");
    }

    #[test]
    fn test_display_collections_quote_strings() {
        let list = Value::List(vec![Value::Int(1), Value::Str("a".to_string())]);
        assert_eq!(list.to_string(), r#"[1, "a"]"#);

        let single = Value::Tuple(vec![Value::Int(1)]);
        assert_eq!(single.to_string(), "(1,)");
    }

    #[test]
    fn test_display_record() {
        let mut fields = BTreeMap::new();
        fields.insert("y".to_string(), Value::Int(2));
        fields.insert("x".to_string(), Value::Int(1));
        let record = Value::Record {
            name: Some("Point".to_string()),
            fields,
        };
        assert_eq!(record.to_string(), "Point { x: 1, y: 2 }");
    }

    #[test]
    fn test_debug_string_quotes() {
        assert_eq!(debug_string(&Value::Str("a".to_string())), r#""a""#);
        assert_eq!(debug_string(&Value::Int(3)), "3");
    }

    #[test]
    fn test_from_widget_value() {
        assert_eq!(Value::from(&WidgetValue::Number(1.5)), Value::Float(1.5));
        assert_eq!(Value::from(&WidgetValue::Bool(true)), Value::Bool(true));
    }
}
