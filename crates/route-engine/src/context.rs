use serde_json::{Map, Value};

/// Query argument that marks a request issued by the proxy to itself.
pub const INTERNAL_ARG: &str = "internal";

/// Section holding request headers, named as in the njs request object.
const HEADERS_SECTION: &str = "headersIn";

/// Expression path (after the root segment) of the client's remote address.
pub(crate) const REMOTE_ADDR_PATH: [&str; 2] = ["variables", "remote_addr"];

/// Read-only facts about one inbound request.
///
/// Everything lives in a single JSON property tree so that rule expressions
/// such as `r.args.X-Emby-Client` or `r.variables.remote_addr` can address it:
///
/// ```text
/// {
///   "args":      { "<query arg>": "<value>", ... },
///   "headersIn": { "<header>": "<value>", ... },
///   "variables": { "remote_addr": "<ip>" },
///   ...          extra properties added with `with_property`
/// }
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct RequestContext {
    tree: Value,
}

impl Default for RequestContext {
    fn default() -> Self {
        Self::new()
    }
}

impl RequestContext {
    pub fn new() -> Self {
        let mut root = Map::new();
        root.insert("args".into(), Value::Object(Map::new()));
        root.insert(HEADERS_SECTION.into(), Value::Object(Map::new()));
        root.insert("variables".into(), Value::Object(Map::new()));
        Self {
            tree: Value::Object(root),
        }
    }

    /// Wrap an existing property tree. Non-object values are replaced by an
    /// empty context.
    pub fn from_tree(tree: Value) -> Self {
        match tree {
            Value::Object(_) => Self { tree },
            _ => Self::new(),
        }
    }

    pub fn with_remote_addr(mut self, addr: impl Into<String>) -> Self {
        self.section_mut("variables")
            .insert("remote_addr".into(), Value::String(addr.into()));
        self
    }

    pub fn with_arg(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.section_mut("args")
            .insert(name.into(), Value::String(value.into()));
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.section_mut(HEADERS_SECTION)
            .insert(name.into(), Value::String(value.into()));
        self
    }

    /// Attach an arbitrary top-level property.
    pub fn with_property(mut self, name: impl Into<String>, value: Value) -> Self {
        if let Value::Object(root) = &mut self.tree {
            root.insert(name.into(), value);
        }
        self
    }

    /// The whole property tree, as seen by expressions.
    pub fn tree(&self) -> &Value {
        &self.tree
    }

    pub fn arg(&self, name: &str) -> Option<&str> {
        self.tree.get("args")?.get(name)?.as_str()
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.tree.get(HEADERS_SECTION)?.get(name)?.as_str()
    }

    pub fn remote_addr(&self) -> Option<&str> {
        let [section, key] = REMOTE_ADDR_PATH;
        self.tree.get(section)?.get(key)?.as_str()
    }

    /// Requests the proxy issues to itself carry `internal=1`.
    pub fn is_internal(&self) -> bool {
        self.arg(INTERNAL_ARG) == Some("1")
    }

    fn section_mut(&mut self, name: &str) -> &mut Map<String, Value> {
        let Value::Object(root) = &mut self.tree else {
            unreachable!("request context tree is always an object");
        };
        let slot = root
            .entry(name.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
        if !slot.is_object() {
            *slot = Value::Object(Map::new());
        }
        match slot {
            Value::Object(map) => map,
            _ => unreachable!("slot was just made an object"),
        }
    }
}
