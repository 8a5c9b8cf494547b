//! Cache Key Builder
//!
//! Derives a deterministic cache key from the method, the route template and
//! a configurable subset of params, query, body and header fields. Field sets
//! are sorted before serialization, so insertion order never changes a key.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use bytes::Bytes;
use serde_json::{Map, Value};

// == Key Request ==
/// The request facts a key can be derived from.
#[derive(Debug, Clone, Default)]
pub struct KeyRequest {
    /// HTTP method
    pub method: String,
    /// Route template, e.g. `/users/:id`
    pub route: String,
    /// Resolved path params
    pub params: Vec<(String, String)>,
    /// Decoded query string pairs
    pub query: Vec<(String, String)>,
    /// JSON request body, when buffered
    pub body: Option<Value>,
    /// Buffered request body that is not JSON
    pub raw_body: Option<Bytes>,
    /// Request headers
    pub headers: Vec<(String, String)>,
}

impl KeyRequest {
    pub fn new(method: impl Into<String>, route: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            route: route.into(),
            ..Self::default()
        }
    }

    pub fn param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.push((name.into(), value.into()));
        self
    }

    pub fn query(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((name.into(), value.into()));
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    pub fn raw_body(mut self, body: impl Into<Bytes>) -> Self {
        self.raw_body = Some(body.into());
        self
    }

    /// Value of the first header named `name`, compared case-insensitively.
    pub fn header_value(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

// == Field Selection ==
/// Which fields of one field set participate in the key.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum FieldSelection {
    /// The field set is left out of the key
    #[default]
    Exclude,
    /// Every field participates
    All,
    /// Only the named fields participate
    Only(Vec<String>),
}

impl FieldSelection {
    pub fn only<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Only(names.into_iter().map(Into::into).collect())
    }

    fn includes(&self, name: &str, case_insensitive: bool) -> bool {
        match self {
            Self::Exclude => false,
            Self::All => true,
            Self::Only(names) => names.iter().any(|n| {
                if case_insensitive {
                    n.eq_ignore_ascii_case(name)
                } else {
                    n == name
                }
            }),
        }
    }
}

// == Key Override ==
/// Request-derived key function.
pub type KeyFn = Arc<dyn Fn(&KeyRequest) -> String + Send + Sync>;

/// A per-route key that replaces the generated one entirely.
#[derive(Clone)]
pub enum KeyOverride {
    Literal(String),
    Derived(KeyFn),
}

impl KeyOverride {
    pub fn derived<F>(f: F) -> Self
    where
        F: Fn(&KeyRequest) -> String + Send + Sync + 'static,
    {
        Self::Derived(Arc::new(f))
    }

    fn resolve(&self, request: &KeyRequest) -> String {
        match self {
            Self::Literal(key) => key.clone(),
            Self::Derived(f) => f(request),
        }
    }
}

impl fmt::Debug for KeyOverride {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Literal(key) => f.debug_tuple("Literal").field(key).finish(),
            Self::Derived(_) => f.write_str("Derived(<fn>)"),
        }
    }
}

// == Key Options ==
/// Per-route key composition.
#[derive(Debug, Clone)]
pub struct KeyOptions {
    pub params: FieldSelection,
    pub query: FieldSelection,
    pub body: FieldSelection,
    pub headers: FieldSelection,
    pub key_override: Option<KeyOverride>,
}

impl Default for KeyOptions {
    fn default() -> Self {
        Self {
            params: FieldSelection::All,
            query: FieldSelection::Exclude,
            body: FieldSelection::Exclude,
            headers: FieldSelection::Exclude,
            key_override: None,
        }
    }
}

impl KeyOptions {
    /// Whether the request body must be buffered to build the key.
    pub fn needs_body(&self) -> bool {
        self.key_override.is_none() && self.body != FieldSelection::Exclude
    }

    /// Whether a key built for `request` covers every selected body field.
    ///
    /// A field subset cannot be read from a body that is not a JSON object;
    /// such a request must not be cached.
    pub fn can_key(&self, request: &KeyRequest) -> bool {
        if self.key_override.is_some() {
            return true;
        }
        match self.body {
            FieldSelection::Exclude | FieldSelection::All => true,
            FieldSelection::Only(_) => match (&request.body, &request.raw_body) {
                (Some(Value::Object(_)), _) => true,
                (Some(_), _) | (None, Some(_)) => false,
                (None, None) => true,
            },
        }
    }
}

// == Key Builder ==
#[derive(Debug, Clone)]
pub struct KeyBuilder {
    prefix: String,
}

impl KeyBuilder {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Builds the key for `request`.
    ///
    /// Form: `{prefix}:{METHOD}:{route}` followed by `:{section}={json}` for
    /// each non-empty selected section, in the order params, query, body,
    /// raw, headers. `raw` holds a non-JSON body when the whole body is
    /// selected. A name given more than once maps to the sorted list of its
    /// values.
    pub fn build(&self, request: &KeyRequest, options: &KeyOptions) -> String {
        if let Some(key_override) = &options.key_override {
            return key_override.resolve(request);
        }

        let mut key = format!(
            "{}:{}:{}",
            self.prefix,
            request.method.to_ascii_uppercase(),
            request.route
        );

        let sections = [
            ("params", select_pairs(&request.params, &options.params, false)),
            ("query", select_pairs(&request.query, &options.query, false)),
            ("body", select_body(request.body.as_ref(), &options.body)),
            ("raw", select_raw(request.raw_body.as_ref(), &options.body)),
            ("headers", select_pairs(&request.headers, &options.headers, true)),
        ];

        for (name, section) in sections {
            if let Some(section) = section {
                key.push(':');
                key.push_str(name);
                key.push('=');
                key.push_str(&section.to_string());
            }
        }

        key
    }
}

fn select_pairs(
    pairs: &[(String, String)],
    selection: &FieldSelection,
    case_insensitive: bool,
) -> Option<Value> {
    let mut selected: BTreeMap<String, Vec<&str>> = BTreeMap::new();
    for (name, value) in pairs {
        if !selection.includes(name, case_insensitive) {
            continue;
        }
        let name = if case_insensitive {
            name.to_ascii_lowercase()
        } else {
            name.clone()
        };
        selected.entry(name).or_default().push(value.as_str());
    }

    if selected.is_empty() {
        return None;
    }
    Some(Value::Object(
        selected
            .into_iter()
            .map(|(name, mut values)| {
                let value = if values.len() == 1 {
                    Value::String(values[0].to_string())
                } else {
                    values.sort_unstable();
                    Value::Array(values.into_iter().map(Value::from).collect())
                };
                (name, value)
            })
            .collect(),
    ))
}

fn select_body(body: Option<&Value>, selection: &FieldSelection) -> Option<Value> {
    let body = body?;
    let selected = match (selection, body) {
        (FieldSelection::Exclude, _) => return None,
        (FieldSelection::All, _) => body.clone(),
        (FieldSelection::Only(_), Value::Object(fields)) => Value::Object(
            fields
                .iter()
                .filter(|(name, _)| selection.includes(name, false))
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        ),
        (FieldSelection::Only(_), _) => return None,
    };

    let empty = match &selected {
        Value::Object(fields) => fields.is_empty(),
        Value::Null => true,
        _ => false,
    };
    if empty {
        None
    } else {
        Some(canonicalize(selected))
    }
}

fn select_raw(body: Option<&Bytes>, selection: &FieldSelection) -> Option<Value> {
    let body = body.filter(|body| !body.is_empty())?;
    if *selection != FieldSelection::All {
        return None;
    }
    Some(match std::str::from_utf8(body) {
        Ok(text) => Value::String(text.to_string()),
        Err(_) => Value::Array(body.iter().map(|b| Value::from(*b)).collect()),
    })
}

/// Rebuilds every object with lexicographically sorted keys.
pub fn canonicalize(value: Value) -> Value {
    match value {
        Value::Object(fields) => {
            let sorted: BTreeMap<String, Value> = fields
                .into_iter()
                .map(|(k, v)| (k, canonicalize(v)))
                .collect();
            Value::Object(sorted.into_iter().collect::<Map<String, Value>>())
        }
        Value::Array(items) => Value::Array(items.into_iter().map(canonicalize).collect()),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn builder() -> KeyBuilder {
        KeyBuilder::new("cache")
    }

    #[test]
    fn test_method_and_template() {
        let request = KeyRequest::new("get", "/profile");
        assert_eq!(
            builder().build(&request, &KeyOptions::default()),
            "cache:GET:/profile"
        );
    }

    #[test]
    fn test_params_distinguish_resolved_paths() {
        let options = KeyOptions::default();
        let one = KeyRequest::new("GET", "/users/:id").param("id", "1");
        let two = KeyRequest::new("GET", "/users/:id").param("id", "2");

        let key_one = builder().build(&one, &options);
        assert_eq!(key_one, r#"cache:GET:/users/:id:params={"id":"1"}"#);
        assert_ne!(key_one, builder().build(&two, &options));
    }

    #[test]
    fn test_field_order_does_not_matter() {
        let options = KeyOptions {
            query: FieldSelection::All,
            ..KeyOptions::default()
        };
        let ab = KeyRequest::new("GET", "/search").query("a", "1").query("b", "2");
        let ba = KeyRequest::new("GET", "/search").query("b", "2").query("a", "1");

        assert_eq!(builder().build(&ab, &options), builder().build(&ba, &options));
    }

    #[test]
    fn test_query_excluded_by_default() {
        let request = KeyRequest::new("GET", "/search").query("page", "2");
        assert_eq!(
            builder().build(&request, &KeyOptions::default()),
            "cache:GET:/search"
        );
    }

    #[test]
    fn test_subset_selection() {
        let options = KeyOptions {
            query: FieldSelection::only(["page"]),
            ..KeyOptions::default()
        };
        let with_tracking = KeyRequest::new("GET", "/list")
            .query("page", "3")
            .query("utm_source", "mail");
        let without = KeyRequest::new("GET", "/list").query("page", "3");

        let key = builder().build(&with_tracking, &options);
        assert_eq!(key, r#"cache:GET:/list:query={"page":"3"}"#);
        assert_eq!(key, builder().build(&without, &options));
    }

    #[test]
    fn test_headers_case_insensitive() {
        let options = KeyOptions {
            headers: FieldSelection::only(["Accept-Language"]),
            ..KeyOptions::default()
        };
        let request = KeyRequest::new("GET", "/home")
            .header("accept-language", "fr")
            .header("user-agent", "curl");

        assert_eq!(
            builder().build(&request, &options),
            r#"cache:GET:/home:headers={"accept-language":"fr"}"#
        );
    }

    #[test]
    fn test_nested_body_is_canonical() {
        let options = KeyOptions {
            body: FieldSelection::All,
            ..KeyOptions::default()
        };
        let first = KeyRequest::new("POST", "/query")
            .body(json!({"filter": {"b": 2, "a": 1}, "limit": 10}));
        let second = KeyRequest::new("POST", "/query")
            .body(json!({"limit": 10, "filter": {"a": 1, "b": 2}}));

        let key = builder().build(&first, &options);
        assert_eq!(key, builder().build(&second, &options));
        assert!(key.ends_with(r#"body={"filter":{"a":1,"b":2},"limit":10}"#));
    }

    #[test]
    fn test_body_subset() {
        let options = KeyOptions {
            body: FieldSelection::only(["q"]),
            ..KeyOptions::default()
        };
        let request =
            KeyRequest::new("POST", "/search").body(json!({"q": "rust", "nonce": "x1"}));

        assert_eq!(
            builder().build(&request, &options),
            r#"cache:POST:/search:body={"q":"rust"}"#
        );
        assert!(options.needs_body());
    }

    #[test]
    fn test_literal_override_replaces_key() {
        let options = KeyOptions {
            key_override: Some(KeyOverride::Literal("static-home".to_string())),
            ..KeyOptions::default()
        };
        let request = KeyRequest::new("GET", "/").param("ignored", "1");

        assert_eq!(builder().build(&request, &options), "static-home");
    }

    #[test]
    fn test_derived_override() {
        let options = KeyOptions {
            key_override: Some(KeyOverride::derived(|req| {
                format!("tenant:{}", req.header_value("x-tenant").unwrap_or("none"))
            })),
            body: FieldSelection::All,
            ..KeyOptions::default()
        };
        let request = KeyRequest::new("GET", "/dashboard").header("X-Tenant", "acme");

        assert_eq!(builder().build(&request, &options), "tenant:acme");
        assert!(!options.needs_body());
    }

    #[test]
    fn test_repeated_query_names_keep_every_value() {
        let options = KeyOptions {
            query: FieldSelection::All,
            ..KeyOptions::default()
        };
        let both = KeyRequest::new("GET", "/items").query("tag", "a").query("tag", "b");
        let swapped = KeyRequest::new("GET", "/items").query("tag", "b").query("tag", "a");
        let single = KeyRequest::new("GET", "/items").query("tag", "b");

        let key = builder().build(&both, &options);
        assert_eq!(key, r#"cache:GET:/items:query={"tag":["a","b"]}"#);
        assert_eq!(key, builder().build(&swapped, &options));
        assert_ne!(key, builder().build(&single, &options));
    }

    #[test]
    fn test_raw_body_participates_when_whole_body_selected() {
        let options = KeyOptions {
            body: FieldSelection::All,
            ..KeyOptions::default()
        };
        let rust = KeyRequest::new("POST", "/search").raw_body("q=rust");
        let go = KeyRequest::new("POST", "/search").raw_body("q=go");
        let json_string = KeyRequest::new("POST", "/search").body(json!("q=rust"));

        let key = builder().build(&rust, &options);
        assert_eq!(key, r#"cache:POST:/search:raw="q=rust""#);
        assert_ne!(key, builder().build(&go, &options));
        assert_ne!(key, builder().build(&json_string, &options));
        assert!(options.can_key(&rust));
    }

    #[test]
    fn test_body_subset_needs_json_object() {
        let options = KeyOptions {
            body: FieldSelection::only(["q"]),
            ..KeyOptions::default()
        };

        assert!(options.can_key(&KeyRequest::new("POST", "/s").body(json!({"q": 1}))));
        assert!(options.can_key(&KeyRequest::new("POST", "/s")));
        assert!(!options.can_key(&KeyRequest::new("POST", "/s").raw_body("q=rust")));
        assert!(!options.can_key(&KeyRequest::new("POST", "/s").body(json!([1, 2]))));
    }
}
