//! Namespace prefix scoping for the serializer.
//!
//! [`NamespaceMappings`] tracks which prefix is bound to which URI at every
//! point of the output. Each binding remembers the element depth it was
//! declared at, so that ending an element can drop exactly the bindings that
//! element introduced.
//!
//! Depth `-1` is the document itself; the pre-seeded bindings for the empty
//! prefix and for `xml` live there and can never be removed.

use std::collections::HashMap;

/// The namespace URI permanently bound to the `xml` prefix.
pub const XML_NAMESPACE: &str = "http://www.w3.org/XML/1998/namespace";

/// The namespace URI reserved for `xmlns` attributes.
pub const XMLNS_NAMESPACE: &str = "http://www.w3.org/2000/xmlns/";

const SEED_DEPTH: i32 = -1;

/// One prefix binding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MappingRecord {
    /// The bound prefix; empty for the default namespace.
    pub prefix: String,
    /// The namespace URI; empty undeclares the default namespace.
    pub uri: String,
    /// Depth of the element that declared the binding.
    pub declaration_depth: i32,
    id: u64,
}

/// A stack of prefix bindings keyed by element depth.
///
/// # Examples
///
/// ```
/// use xmlstream::serial::namespaces::NamespaceMappings;
///
/// let mut ns = NamespaceMappings::new();
/// assert!(ns.push_namespace("a", "urn:one", 0));
/// assert!(ns.push_namespace("a", "urn:two", 1));
/// assert_eq!(ns.lookup_namespace("a"), Some("urn:two"));
///
/// ns.pop_namespaces(1, |_| {});
/// assert_eq!(ns.lookup_namespace("a"), Some("urn:one"));
/// ```
#[derive(Debug, Clone)]
pub struct NamespaceMappings {
    /// Binding stacks, one per prefix ever declared.
    prefixes: HashMap<String, Vec<MappingRecord>>,
    /// Prefixes in first-declaration order.
    prefix_order: Vec<String>,
    /// Every live non-seed binding in declaration order.
    node_stack: Vec<MappingRecord>,
    next_id: u64,
    prefix_count: u32,
}

impl Default for NamespaceMappings {
    fn default() -> Self {
        Self::new()
    }
}

impl NamespaceMappings {
    /// Creates a scope holding only the two permanent bindings.
    #[must_use]
    pub fn new() -> Self {
        let mut mappings = Self {
            prefixes: HashMap::new(),
            prefix_order: Vec::new(),
            node_stack: Vec::new(),
            next_id: 0,
            prefix_count: 0,
        };
        mappings.seed();
        mappings
    }

    fn seed(&mut self) {
        for (prefix, uri) in [("", ""), ("xml", XML_NAMESPACE)] {
            let record = self.new_record(prefix, uri, SEED_DEPTH);
            self.prefix_order.push(prefix.to_string());
            self.prefixes.insert(prefix.to_string(), vec![record]);
        }
    }

    fn new_record(&mut self, prefix: &str, uri: &str, depth: i32) -> MappingRecord {
        let id = self.next_id;
        self.next_id += 1;
        MappingRecord {
            prefix: prefix.to_string(),
            uri: uri.to_string(),
            declaration_depth: depth,
            id,
        }
    }

    /// Drops every binding except the two permanent ones and restarts the
    /// generated-prefix counter.
    pub fn reset(&mut self) {
        self.prefixes.clear();
        self.prefix_order.clear();
        self.node_stack.clear();
        self.prefix_count = 0;
        self.seed();
    }

    /// The URI currently bound to `prefix`, if any.
    #[must_use]
    pub fn lookup_namespace(&self, prefix: &str) -> Option<&str> {
        self.mapping_from_prefix(prefix).map(|m| m.uri.as_str())
    }

    /// Like [`lookup_namespace`](Self::lookup_namespace), returning the empty
    /// string for an unbound prefix.
    #[must_use]
    pub fn lookup_uri(&self, prefix: &str) -> &str {
        self.lookup_namespace(prefix).unwrap_or("")
    }

    /// A prefix currently bound to `uri`. When several are, the one declared
    /// first wins.
    #[must_use]
    pub fn lookup_prefix(&self, uri: &str) -> Option<&str> {
        self.prefix_order
            .iter()
            .find(|prefix| self.lookup_namespace(prefix) == Some(uri))
            .map(String::as_str)
    }

    /// Like [`lookup_prefix`](Self::lookup_prefix) but never returns the
    /// empty prefix. Attributes cannot use the default namespace.
    #[must_use]
    pub fn lookup_declared_prefix(&self, uri: &str) -> Option<&str> {
        self.prefix_order
            .iter()
            .filter(|prefix| !prefix.is_empty())
            .find(|prefix| self.lookup_namespace(prefix) == Some(uri))
            .map(String::as_str)
    }

    /// The binding currently in effect for `prefix`.
    #[must_use]
    pub fn mapping_from_prefix(&self, prefix: &str) -> Option<&MappingRecord> {
        self.prefixes.get(prefix).and_then(|stack| stack.last())
    }

    /// Binds `prefix` to `uri` for elements at `depth` and below.
    ///
    /// Returns `false` (and changes nothing) when the prefix starts with
    /// `xml`, when the prefix is already bound to `uri`, or when the current
    /// binding was itself declared at `depth`.
    pub fn push_namespace(&mut self, prefix: &str, uri: &str, depth: i32) -> bool {
        if prefix.starts_with("xml") {
            return false;
        }
        if let Some(top) = self.mapping_from_prefix(prefix) {
            if top.uri == uri || top.declaration_depth == depth {
                return false;
            }
        }
        let record = self.new_record(prefix, uri, depth);
        if !self.prefixes.contains_key(prefix) {
            self.prefix_order.push(prefix.to_string());
        }
        self.prefixes
            .entry(prefix.to_string())
            .or_default()
            .push(record.clone());
        self.node_stack.push(record);
        true
    }

    /// Removes the current binding of `prefix`, exposing the one beneath it.
    ///
    /// The permanent bindings and any `xml`-prefixed name are refused.
    pub fn pop_namespace(&mut self, prefix: &str) -> bool {
        if prefix.starts_with("xml") {
            return false;
        }
        match self.prefixes.get_mut(prefix) {
            Some(stack) if stack.last().is_some_and(|m| m.declaration_depth > SEED_DEPTH) => {
                stack.pop();
                true
            }
            _ => false,
        }
    }

    /// Ends every binding declared at `depth` or deeper, most recent first.
    ///
    /// `on_end` is called once with the prefix of each binding that was
    /// still in effect when it was removed. A negative depth is a no-op.
    pub fn pop_namespaces<F: FnMut(&str)>(&mut self, depth: i32, mut on_end: F) {
        if depth < 0 {
            return;
        }
        while self
            .node_stack
            .last()
            .is_some_and(|m| m.declaration_depth >= depth)
        {
            let Some(record) = self.node_stack.pop() else {
                break;
            };
            if let Some(stack) = self.prefixes.get_mut(&record.prefix) {
                if stack.last().is_some_and(|top| top.id == record.id) {
                    stack.pop();
                    on_end(&record.prefix);
                }
            }
        }
    }

    /// Returns a fresh prefix of the form `ns0`, `ns1`, ...
    pub fn generate_next_prefix(&mut self) -> String {
        let prefix = format!("ns{}", self.prefix_count);
        self.prefix_count += 1;
        prefix
    }
}
