use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Text computed on demand at render time.
pub type Producer = Arc<dyn Fn() -> String + Send + Sync>;

#[derive(Clone)]
pub enum Value {
    Text(String),
    Bool(bool),
    List(Vec<View>),
    Lazy(Producer),
}

impl Value {
    pub fn lazy(producer: impl Fn() -> String + Send + Sync + 'static) -> Self {
        Value::Lazy(Arc::new(producer))
    }

    /// String form used by substitution: text as-is, lazy values invoked.
    /// Booleans and lists have no string form.
    pub fn resolve_text(&self) -> Option<String> {
        match self {
            Value::Text(text) => Some(text.clone()),
            Value::Lazy(producer) => Some(producer()),
            Value::Bool(_) | Value::List(_) => None,
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Text(text) => f.debug_tuple("Text").field(text).finish(),
            Value::Bool(flag) => f.debug_tuple("Bool").field(flag).finish(),
            Value::List(items) => f.debug_tuple("List").field(items).finish(),
            Value::Lazy(_) => f.write_str("Lazy(..)"),
        }
    }
}

impl From<&str> for Value {
    fn from(text: &str) -> Self {
        Value::Text(text.to_string())
    }
}

impl From<String> for Value {
    fn from(text: String) -> Self {
        Value::Text(text)
    }
}

impl From<bool> for Value {
    fn from(flag: bool) -> Self {
        Value::Bool(flag)
    }
}

impl From<Vec<View>> for Value {
    fn from(items: Vec<View>) -> Self {
        Value::List(items)
    }
}

/// Field name to value mapping handed to the template engine.
#[derive(Clone, Debug, Default)]
pub struct View {
    fields: BTreeMap<String, Value>,
}

impl View {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(name, value);
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.fields.insert(name.into(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.fields.contains_key(name)
    }

    /// Resolved string for `name`, see [`Value::resolve_text`].
    pub fn text(&self, name: &str) -> Option<String> {
        self.get(name).and_then(Value::resolve_text)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// New view holding both sets of fields; `over` wins on collisions.
    pub fn merge(&self, over: &View) -> View {
        let mut fields = self.fields.clone();
        fields.extend(over.fields.iter().map(|(k, v)| (k.clone(), v.clone())));
        View { fields }
    }

    /// Build a view from a JSON object. Strings, booleans and numbers become
    /// fields, arrays of objects become lists; anything else is left out.
    pub fn from_json(json: &serde_json::Value) -> View {
        let Some(object) = json.as_object() else {
            return View::new();
        };

        object
            .iter()
            .filter_map(|(name, value)| json_value(value).map(|v| (name.clone(), v)))
            .collect()
    }
}

fn json_value(value: &serde_json::Value) -> Option<Value> {
    use serde_json::Value as Json;

    match value {
        Json::String(text) => Some(Value::Text(text.clone())),
        Json::Bool(flag) => Some(Value::Bool(*flag)),
        Json::Number(number) => Some(Value::Text(number.to_string())),
        Json::Array(items) if items.iter().all(Json::is_object) => {
            Some(Value::List(items.iter().map(View::from_json).collect()))
        }
        _ => None,
    }
}

impl FromIterator<(String, Value)> for View {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        View {
            fields: iter.into_iter().collect(),
        }
    }
}
