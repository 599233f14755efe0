use std::{
    borrow::Cow,
    fmt::{self, Write as _},
};

use serde_json::{Map, Value};

/// The value of a user property, borrowed from the event that carries it.
#[derive(Clone)]
pub enum PropertyValue<'a> {
    Null,
    Bool(bool),
    I64(i64),
    U64(u64),
    F64(f64),
    Str(Cow<'a, str>),
    Json(&'a Value),
    Structured(&'a dyn Structured),
}

impl fmt::Debug for PropertyValue<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PropertyValue::Null => f.write_str("Null"),
            PropertyValue::Bool(value) => f.debug_tuple("Bool").field(value).finish(),
            PropertyValue::I64(value) => f.debug_tuple("I64").field(value).finish(),
            PropertyValue::U64(value) => f.debug_tuple("U64").field(value).finish(),
            PropertyValue::F64(value) => f.debug_tuple("F64").field(value).finish(),
            PropertyValue::Str(value) => f.debug_tuple("Str").field(value).finish(),
            PropertyValue::Json(value) => f.debug_tuple("Json").field(value).finish(),
            PropertyValue::Structured(_) => f.pad("Structured(..)"),
        }
    }
}

impl From<bool> for PropertyValue<'_> {
    fn from(value: bool) -> Self {
        PropertyValue::Bool(value)
    }
}

impl From<i64> for PropertyValue<'_> {
    fn from(value: i64) -> Self {
        PropertyValue::I64(value)
    }
}

impl From<u64> for PropertyValue<'_> {
    fn from(value: u64) -> Self {
        PropertyValue::U64(value)
    }
}

impl From<f64> for PropertyValue<'_> {
    fn from(value: f64) -> Self {
        PropertyValue::F64(value)
    }
}

impl<'a> From<&'a str> for PropertyValue<'a> {
    fn from(value: &'a str) -> Self {
        PropertyValue::Str(Cow::Borrowed(value))
    }
}

impl From<String> for PropertyValue<'_> {
    fn from(value: String) -> Self {
        PropertyValue::Str(Cow::Owned(value))
    }
}

impl<'a> From<&'a Value> for PropertyValue<'a> {
    fn from(value: &'a Value) -> Self {
        PropertyValue::Json(value)
    }
}

/// Receives the key/value pairs of a property set or of a [`Structured`] value.
pub trait Visit {
    fn record(&mut self, key: &str, value: PropertyValue<'_>);
}

impl<F> Visit for F
where
    F: FnMut(&str, PropertyValue<'_>),
{
    fn record(&mut self, key: &str, value: PropertyValue<'_>) {
        self(key, value)
    }
}

/// A host object that is serialized member by member.
///
/// Structured values may be arbitrarily deep or even refer back to themselves. The formatter
/// only expands them up to the configured depth and uses the [`Display`](fmt::Display) form
/// past that point, so `record` is never called recursively without bound.
pub trait Structured: fmt::Display {
    /// Records the members of this value. Keys are ignored for sequences.
    fn record(&self, visitor: &mut dyn Visit);

    /// Whether the members form a JSON array instead of an object.
    fn is_sequence(&self) -> bool {
        false
    }
}

/// Converts a property value to JSON. Structures nested more than `depth` levels below the
/// property itself are rendered as strings.
///
/// Fails only if a [`Display`](fmt::Display) implementation fails.
pub(crate) fn to_json(value: &PropertyValue<'_>, depth: usize) -> Result<Value, fmt::Error> {
    match value {
        PropertyValue::Null => Ok(Value::Null),
        PropertyValue::Bool(value) => Ok(Value::Bool(*value)),
        PropertyValue::I64(value) => Ok(Value::from(*value)),
        PropertyValue::U64(value) => Ok(Value::from(*value)),
        PropertyValue::F64(value) => Ok(Value::from(*value)),
        PropertyValue::Str(value) => Ok(Value::String(value.clone().into_owned())),
        PropertyValue::Json(value) => Ok(bounded_json(value, depth)),
        PropertyValue::Structured(value) => structured_to_json(*value, depth),
    }
}

/// The string form of a property value, used when a property is mapped onto a named output
/// field.
pub(crate) fn to_flat_string(value: &PropertyValue<'_>) -> Result<String, fmt::Error> {
    match value {
        PropertyValue::Null => Ok("null".to_owned()),
        PropertyValue::Bool(value) => Ok(value.to_string()),
        PropertyValue::I64(value) => Ok(value.to_string()),
        PropertyValue::U64(value) => Ok(value.to_string()),
        PropertyValue::F64(value) => Ok(value.to_string()),
        PropertyValue::Str(value) => Ok(value.clone().into_owned()),
        PropertyValue::Json(Value::String(value)) => Ok(value.clone()),
        PropertyValue::Json(value) => Ok(value.to_string()),
        PropertyValue::Structured(value) => display(*value),
    }
}

fn display(value: &dyn Structured) -> Result<String, fmt::Error> {
    let mut flat = String::new();
    write!(flat, "{value}")?;
    Ok(flat)
}

fn bounded_json(value: &Value, depth: usize) -> Value {
    match value {
        Value::Array(_) | Value::Object(_) if depth == 0 => Value::String(value.to_string()),
        Value::Array(items) => {
            Value::Array(
                items
                    .iter()
                    .map(|item| bounded_json(item, depth - 1))
                    .collect(),
            )
        },
        Value::Object(map) => {
            Value::Object(
                map.iter()
                    .map(|(key, value)| (key.clone(), bounded_json(value, depth - 1)))
                    .collect(),
            )
        },
        scalar => scalar.clone(),
    }
}

fn structured_to_json(value: &dyn Structured, depth: usize) -> Result<Value, fmt::Error> {
    if depth == 0 {
        return display(value).map(Value::String);
    }

    let mut collector = Collector {
        depth: depth - 1,
        members: if value.is_sequence() {
            Members::Sequence(Vec::new())
        } else {
            Members::Map(Map::new())
        },
        state: Ok(()),
    };
    value.record(&mut collector);
    collector.finish()
}

enum Members {
    Map(Map<String, Value>),
    Sequence(Vec<Value>),
}

struct Collector {
    depth: usize,
    members: Members,
    state: Result<(), fmt::Error>,
}

impl Collector {
    fn finish(self) -> Result<Value, fmt::Error> {
        self.state?;
        Ok(match self.members {
            Members::Map(map) => Value::Object(map),
            Members::Sequence(items) => Value::Array(items),
        })
    }
}

impl Visit for Collector {
    fn record(&mut self, key: &str, value: PropertyValue<'_>) {
        // A single failing member poisons the whole value.
        if self.state.is_err() {
            return;
        }

        match to_json(&value, self.depth) {
            Ok(value) => {
                match &mut self.members {
                    Members::Map(map) => {
                        map.insert(key.to_owned(), value);
                    },
                    Members::Sequence(items) => items.push(value),
                }
            },
            Err(error) => self.state = Err(error),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{cell::RefCell, fmt, rc::Rc};

    use serde_json::json;

    use super::{to_flat_string, to_json, PropertyValue, Structured, Visit};

    struct Person {
        name: &'static str,
        manager: Option<Rc<Person>>,
    }

    impl fmt::Display for Person {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str(self.name)
        }
    }

    impl Structured for Person {
        fn record(&self, visitor: &mut dyn Visit) {
            visitor.record("Name", self.name.into());
            match &self.manager {
                Some(manager) => visitor.record("Manager", PropertyValue::Structured(&**manager)),
                None => visitor.record("Manager", PropertyValue::Null),
            }
        }
    }

    fn chain() -> Person {
        let alice = Rc::new(Person {
            name: "Alice",
            manager: None,
        });
        let bob = Rc::new(Person {
            name: "Bob",
            manager: Some(alice),
        });
        Person {
            name: "Charlie",
            manager: Some(bob),
        }
    }

    #[test]
    fn structure_expanded_one_level_by_default() {
        let charlie = chain();
        let value = to_json(&PropertyValue::Structured(&charlie), 1).unwrap();
        assert_eq!(value, json!({"Name": "Charlie", "Manager": "Bob"}));
    }

    #[test]
    fn structure_expanded_to_requested_depth() {
        let charlie = chain();
        let value = to_json(&PropertyValue::Structured(&charlie), 3).unwrap();
        assert_eq!(
            value,
            json!({
                "Name": "Charlie",
                "Manager": {
                    "Name": "Bob",
                    "Manager": {
                        "Name": "Alice",
                        "Manager": null,
                    },
                },
            }),
        );
    }

    #[test]
    fn zero_depth_flattens_structure() {
        let charlie = chain();
        let value = to_json(&PropertyValue::Structured(&charlie), 0).unwrap();
        assert_eq!(value, json!("Charlie"));
    }

    struct Node {
        next: RefCell<Option<Rc<Node>>>,
    }

    impl fmt::Display for Node {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("node")
        }
    }

    impl Structured for Node {
        fn record(&self, visitor: &mut dyn Visit) {
            if let Some(next) = &*self.next.borrow() {
                visitor.record("next", PropertyValue::Structured(&**next));
            }
        }
    }

    #[test]
    fn cycle_is_cut_at_depth() {
        let node = Rc::new(Node {
            next: RefCell::new(None),
        });
        *node.next.borrow_mut() = Some(Rc::clone(&node));

        let value = to_json(&PropertyValue::Structured(&*node), 2).unwrap();
        assert_eq!(value, json!({"next": {"next": "node"}}));

        // Break the cycle so the test does not leak.
        node.next.borrow_mut().take();
    }

    struct Numbers;

    impl fmt::Display for Numbers {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("[1, 2]")
        }
    }

    impl Structured for Numbers {
        fn record(&self, visitor: &mut dyn Visit) {
            visitor.record("", 1u64.into());
            visitor.record("", 2u64.into());
        }

        fn is_sequence(&self) -> bool {
            true
        }
    }

    #[test]
    fn sequences_become_arrays() {
        assert_eq!(
            to_json(&PropertyValue::Structured(&Numbers), 1).unwrap(),
            json!([1, 2]),
        );
    }

    struct Broken;

    impl fmt::Display for Broken {
        fn fmt(&self, _f: &mut fmt::Formatter<'_>) -> fmt::Result {
            Err(fmt::Error)
        }
    }

    impl Structured for Broken {
        fn record(&self, visitor: &mut dyn Visit) {
            visitor.record("inner", PropertyValue::Structured(self));
        }
    }

    #[test]
    fn failing_display_is_reported() {
        assert!(to_json(&PropertyValue::Structured(&Broken), 0).is_err());
        assert!(to_json(&PropertyValue::Structured(&Broken), 1).is_err());
        assert!(to_flat_string(&PropertyValue::Structured(&Broken)).is_err());
    }

    #[test]
    fn json_values_are_bounded() {
        let nested = json!({"a": {"b": {"c": 1}}, "list": [[1, 2], 3]});
        assert_eq!(
            to_json(&PropertyValue::Json(&nested), 1).unwrap(),
            json!({"a": "{\"b\":{\"c\":1}}", "list": "[[1,2],3]"}),
        );
        assert_eq!(to_json(&PropertyValue::Json(&nested), 5).unwrap(), nested);
    }

    #[test]
    fn flat_strings() {
        let text = json!("text");
        assert_eq!(to_flat_string(&PropertyValue::Json(&text)).unwrap(), "text");
        assert_eq!(to_flat_string(&PropertyValue::I64(-3)).unwrap(), "-3");
        assert_eq!(to_flat_string(&PropertyValue::Null).unwrap(), "null");
        assert_eq!(to_flat_string(&PropertyValue::Structured(&chain())).unwrap(), "Charlie");
    }
}
