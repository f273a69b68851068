use std::collections::BTreeMap;
use std::fmt;

/// A value returned by a presenter operation.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Nil,
    Bool(bool),
    Number(f64),
    Text(String),
    List(Vec<Value>),
    /// Named fields, e.g. one element of a collection.
    Record(BTreeMap<String, Value>),
}

impl Value {
    pub fn is_truthy(&self) -> bool {
        !self.is_falsy()
    }

    pub fn is_falsy(&self) -> bool {
        matches!(self, Value::Nil | Value::Bool(false))
    }

    /// The items a collection block iterates over: a list yields its
    /// elements, nil yields nothing, anything else is a single item.
    pub fn into_items(self) -> Vec<Value> {
        match self {
            Value::List(items) => items,
            Value::Nil => Vec::new(),
            other => vec![other],
        }
    }

    pub fn field(&self, name: &str) -> Option<&Value> {
        match self {
            Value::Record(fields) => fields.get(name),
            _ => None,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Nil => "Nil",
            Value::Bool(_) => "Bool",
            Value::Number(_) => "Number",
            Value::Text(_) => "Text",
            Value::List(_) => "List",
            Value::Record(_) => "Record",
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Nil => Ok(()),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Number(n) => {
                if n.is_finite() && *n == n.floor() && n.abs() < 1e15 {
                    write!(f, "{}", *n as i64)
                } else {
                    write!(f, "{}", n)
                }
            }
            Value::Text(s) => f.write_str(s),
            Value::List(items) => {
                for item in items {
                    write!(f, "{}", item)?;
                }
                Ok(())
            }
            Value::Record(fields) => {
                for (i, (name, value)) in fields.iter().enumerate() {
                    if i > 0 {
                        write!(f, " ")?;
                    }
                    write!(f, "{}={}", name, value)?;
                }
                Ok(())
            }
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Number(n as f64)
    }
}

impl From<usize> for Value {
    fn from(n: usize) -> Self {
        Value::Number(n as f64)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(items: Vec<T>) -> Self {
        Value::List(items.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(Value::Nil)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truthiness() {
        assert!(Value::Nil.is_falsy());
        assert!(Value::Bool(false).is_falsy());
        assert!(Value::Bool(true).is_truthy());
        assert!(Value::from("").is_truthy());
        assert!(Value::Number(0.0).is_truthy());
        assert!(Value::List(Vec::new()).is_truthy());
    }

    #[test]
    fn collection_coercion() {
        assert_eq!(Value::from(vec!["a", "b"]).into_items().len(), 2);
        assert!(Value::Nil.into_items().is_empty());
        assert_eq!(Value::from("solo").into_items(), vec![Value::from("solo")]);
    }

    #[test]
    fn display() {
        assert_eq!(Value::Nil.to_string(), "");
        assert_eq!(Value::Number(3.0).to_string(), "3");
        assert_eq!(Value::Number(2.5).to_string(), "2.5");
        assert_eq!(Value::from("<b>raw</b>").to_string(), "<b>raw</b>");
        assert_eq!(Value::from(vec![1i64, 2, 3]).to_string(), "123");
        let record = Value::Record(BTreeMap::from([
            ("b".to_string(), Value::from(2i64)),
            ("a".to_string(), Value::from("x")),
        ]));
        assert_eq!(record.to_string(), "a=x b=2");
        assert_eq!(record.field("a"), Some(&Value::from("x")));
    }
}
