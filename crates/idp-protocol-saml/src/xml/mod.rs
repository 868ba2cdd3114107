//! Owned XML tree used for every SAML message the engine reads or writes.
//!
//! Parsing is deliberately strict: DOCTYPE declarations (and with them every
//! entity declaration) are refused, undefined entity references fail, prefixes
//! must be bound, and both document size and nesting depth are capped before
//! any tree is built. Comments and processing instructions are dropped.
//!
//! Serialization goes through `quick_xml::Writer` and declares any namespace
//! an element or attribute uses but which is not yet in scope, so builders can
//! construct elements without repeating `xmlns` attributes everywhere.

pub mod c14n;

use std::borrow::Cow;

use idp_core::SamlEnvironmentConfig;
use quick_xml::escape::unescape;
use quick_xml::events::attributes::Attribute as RawAttribute;
use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};
use quick_xml::name::QName;
use quick_xml::{Reader, Writer};
use thiserror::Error;

use self::c14n::{escape_attribute, escape_text};

/// Namespace bound to the reserved `xml` prefix.
pub const XML_NS: &str = "http://www.w3.org/XML/1998/namespace";

/// XML parsing and writing errors.
#[derive(Debug, Error)]
pub enum XmlError {
    /// Input is larger than the configured limit.
    #[error("document exceeds {limit} bytes")]
    TooLarge {
        /// The byte limit.
        limit: usize,
    },

    /// Elements are nested deeper than the configured limit.
    #[error("document nesting exceeds {limit} levels")]
    TooDeep {
        /// The depth limit.
        limit: usize,
    },

    /// The document carries a DOCTYPE declaration.
    #[error("DOCTYPE declarations are not allowed")]
    DocType,

    /// A prefix is used without a namespace declaration.
    #[error("undeclared namespace prefix: {0}")]
    UnboundPrefix(String),

    /// An entity or character reference could not be resolved.
    #[error("invalid reference: {0}")]
    Reference(String),

    /// No root element was found.
    #[error("document has no root element")]
    NoRoot,

    /// More than one root element was found.
    #[error("document has more than one root element")]
    MultipleRoots,

    /// Non-whitespace text outside the root element.
    #[error("text content outside the root element")]
    TextOutsideRoot,

    /// Syntax error reported by the reader.
    #[error("malformed XML: {0}")]
    Malformed(String),

    /// The document is well-formed but has the wrong element.
    #[error("unexpected element: expected {expected}, found {found}")]
    UnexpectedElement {
        /// The expected element name.
        expected: String,
        /// The element that was found.
        found: String,
    },

    /// A required attribute is absent.
    #[error("missing attribute: {0}")]
    MissingAttribute(&'static str),

    /// An attribute or element value has the wrong lexical form.
    #[error("invalid value for {name}: {value}")]
    InvalidValue {
        /// Name of the attribute or element.
        name: &'static str,
        /// The rejected value.
        value: String,
    },

    /// The writer failed.
    #[error("failed to write XML: {0}")]
    Write(String),
}

/// Resource limits applied while parsing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParseLimits {
    /// Largest accepted input, in bytes.
    pub max_bytes: usize,
    /// Deepest accepted element nesting.
    pub max_depth: usize,
}

impl Default for ParseLimits {
    fn default() -> Self {
        Self::from(&SamlEnvironmentConfig::default())
    }
}

impl From<&SamlEnvironmentConfig> for ParseLimits {
    fn from(config: &SamlEnvironmentConfig) -> Self {
        Self {
            max_bytes: config.max_document_bytes,
            max_depth: config.max_document_depth,
        }
    }
}

/// A namespace declaration. `prefix` is `None` for the default namespace and
/// an empty `uri` undeclares it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Namespace {
    /// Declared prefix.
    pub prefix: Option<String>,
    /// Namespace URI.
    pub uri: String,
}

/// An attribute with its resolved namespace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
    /// Prefix as written.
    pub prefix: Option<String>,
    /// Local name.
    pub name: String,
    /// Resolved namespace. Unprefixed attributes have none.
    pub namespace: Option<String>,
    /// Normalized, unescaped value.
    pub value: String,
}

impl Attribute {
    /// Returns the prefixed name.
    #[must_use]
    pub fn qualified_name(&self) -> Cow<'_, str> {
        qualify(self.prefix.as_deref(), &self.name)
    }
}

/// Element content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    /// A child element.
    Element(Element),
    /// Character data, unescaped.
    Text(String),
}

/// An element with its resolved namespace, declarations, attributes and children.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Element {
    /// Prefix as written.
    pub prefix: Option<String>,
    /// Local name.
    pub name: String,
    /// Resolved namespace URI.
    pub namespace: Option<String>,
    /// Namespace declarations made on this element.
    pub namespaces: Vec<Namespace>,
    /// Attributes other than namespace declarations, in document order.
    pub attributes: Vec<Attribute>,
    /// Child nodes in document order.
    pub children: Vec<Node>,
}

impl Element {
    /// Creates an element in `namespace` written with `prefix`.
    #[must_use]
    pub fn ns(prefix: &str, name: &str, namespace: &str) -> Self {
        Self {
            prefix: Some(prefix.to_string()),
            name: name.to_string(),
            namespace: Some(namespace.to_string()),
            namespaces: Vec::new(),
            attributes: Vec::new(),
            children: Vec::new(),
        }
    }

    /// Creates an element in no namespace.
    #[must_use]
    pub fn local(name: &str) -> Self {
        Self {
            prefix: None,
            name: name.to_string(),
            namespace: None,
            namespaces: Vec::new(),
            attributes: Vec::new(),
            children: Vec::new(),
        }
    }

    /// Adds a namespace declaration.
    #[must_use]
    pub fn with_namespace(mut self, prefix: &str, uri: &str) -> Self {
        self.namespaces.push(Namespace {
            prefix: Some(prefix.to_string()),
            uri: uri.to_string(),
        });
        self
    }

    /// Adds an unqualified attribute.
    #[must_use]
    pub fn with_attribute(mut self, name: &str, value: impl Into<String>) -> Self {
        self.set_attribute(name, value);
        self
    }

    /// Adds an attribute only when a value is present.
    #[must_use]
    pub fn with_optional_attribute(self, name: &str, value: Option<&str>) -> Self {
        match value {
            Some(value) => self.with_attribute(name, value),
            None => self,
        }
    }

    /// Adds a namespace-qualified attribute.
    #[must_use]
    pub fn with_ns_attribute(
        mut self,
        prefix: &str,
        name: &str,
        namespace: &str,
        value: impl Into<String>,
    ) -> Self {
        self.attributes.push(Attribute {
            prefix: Some(prefix.to_string()),
            name: name.to_string(),
            namespace: Some(namespace.to_string()),
            value: value.into(),
        });
        self
    }

    /// Appends a child element.
    #[must_use]
    pub fn with_child(mut self, child: Self) -> Self {
        self.children.push(Node::Element(child));
        self
    }

    /// Appends a child element when present.
    #[must_use]
    pub fn with_optional_child(self, child: Option<Self>) -> Self {
        match child {
            Some(child) => self.with_child(child),
            None => self,
        }
    }

    /// Appends character data.
    #[must_use]
    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.children.push(Node::Text(text.into()));
        self
    }

    /// Sets or replaces an unqualified attribute.
    pub fn set_attribute(&mut self, name: &str, value: impl Into<String>) {
        let value = value.into();
        if let Some(existing) = self
            .attributes
            .iter_mut()
            .find(|a| a.namespace.is_none() && a.name == name)
        {
            existing.value = value;
            return;
        }
        self.attributes.push(Attribute {
            prefix: None,
            name: name.to_string(),
            namespace: None,
            value,
        });
    }

    /// Returns the prefixed name.
    #[must_use]
    pub fn qualified_name(&self) -> Cow<'_, str> {
        qualify(self.prefix.as_deref(), &self.name)
    }

    /// Returns true if this element has the given namespace and local name.
    #[must_use]
    pub fn is(&self, namespace: &str, name: &str) -> bool {
        self.name == name && self.namespace.as_deref() == Some(namespace)
    }

    /// Returns the value of an unqualified attribute.
    #[must_use]
    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|a| a.namespace.is_none() && a.name == name)
            .map(|a| a.value.as_str())
    }

    /// Iterates over child elements, skipping text.
    pub fn child_elements(&self) -> impl Iterator<Item = &Element> {
        self.children.iter().filter_map(|node| match node {
            Node::Element(element) => Some(element),
            Node::Text(_) => None,
        })
    }

    /// Iterates over child elements with the given namespace and local name.
    pub fn children_named<'a>(
        &'a self,
        namespace: &'a str,
        name: &'a str,
    ) -> impl Iterator<Item = &'a Element> {
        self.child_elements().filter(move |e| e.is(namespace, name))
    }

    /// Returns the first child element with the given namespace and local name.
    #[must_use]
    pub fn child(&self, namespace: &str, name: &str) -> Option<&Element> {
        self.child_elements().find(|e| e.is(namespace, name))
    }

    /// Returns the concatenated character data of direct text children.
    #[must_use]
    pub fn text(&self) -> String {
        self.children
            .iter()
            .filter_map(|node| match node {
                Node::Text(text) => Some(text.as_str()),
                Node::Element(_) => None,
            })
            .collect()
    }

    /// Counts elements in this subtree whose `ID` attribute equals `id`.
    #[must_use]
    pub fn count_ids(&self, id: &str) -> usize {
        let own = usize::from(self.attribute("ID") == Some(id));
        own + self.child_elements().map(|c| c.count_ids(id)).sum::<usize>()
    }

    /// Inserts `child` right after the first child element named `after`
    /// (any namespace), or first when there is none.
    pub fn insert_after(&mut self, after: &str, child: Self) {
        let index = self
            .children
            .iter()
            .position(|node| matches!(node, Node::Element(e) if e.name == after))
            .map_or(0, |i| i + 1);
        self.children.insert(index, Node::Element(child));
    }

    /// Serializes this element as a standalone document fragment.
    ///
    /// # Errors
    ///
    /// Returns [`XmlError::Write`] if the writer fails.
    pub fn to_xml(&self) -> Result<String, XmlError> {
        let mut writer = Writer::new(Vec::new());
        write_element(&mut writer, self, &mut Vec::new())?;
        String::from_utf8(writer.into_inner()).map_err(|e| XmlError::Write(e.to_string()))
    }
}

fn qualify<'a>(prefix: Option<&str>, name: &'a str) -> Cow<'a, str> {
    match prefix {
        Some(prefix) => Cow::Owned(format!("{prefix}:{name}")),
        None => Cow::Borrowed(name),
    }
}

/// Looks up the namespace bound to `prefix` in a declaration stack.
pub(crate) fn lookup_namespace<'a>(scope: &'a [Namespace], prefix: Option<&str>) -> Option<&'a str> {
    scope
        .iter()
        .rev()
        .find(|ns| ns.prefix.as_deref() == prefix)
        .map(|ns| ns.uri.as_str())
}

/// Parses a document into its root element.
///
/// Leading whitespace before the XML declaration is tolerated.
///
/// # Errors
///
/// Returns an [`XmlError`] for malformed or disallowed input.
pub fn parse(input: &str, limits: ParseLimits) -> Result<Element, XmlError> {
    if input.len() > limits.max_bytes {
        return Err(XmlError::TooLarge {
            limit: limits.max_bytes,
        });
    }

    let mut reader = Reader::from_str(input.trim_start());
    let mut scopes: Vec<Namespace> = Vec::new();
    let mut scope_marks: Vec<usize> = Vec::new();
    let mut stack: Vec<Element> = Vec::new();
    let mut root: Option<Element> = None;

    loop {
        let event = reader
            .read_event()
            .map_err(|e| XmlError::Malformed(e.to_string()))?;
        match event {
            Event::Start(start) => {
                check_new_element(&stack, root.as_ref(), limits)?;
                let element = open_element(&start, &scopes)?;
                scope_marks.push(scopes.len());
                scopes.extend(element.namespaces.iter().cloned());
                stack.push(element);
            }
            Event::Empty(start) => {
                check_new_element(&stack, root.as_ref(), limits)?;
                let element = open_element(&start, &scopes)?;
                attach(element, &mut stack, &mut root);
            }
            Event::End(_) => {
                let element = stack
                    .pop()
                    .ok_or_else(|| XmlError::Malformed("unbalanced end tag".to_string()))?;
                if let Some(mark) = scope_marks.pop() {
                    scopes.truncate(mark);
                }
                attach(element, &mut stack, &mut root);
            }
            Event::Text(text) => {
                let raw = std::str::from_utf8(&text)
                    .map_err(|e| XmlError::Malformed(e.to_string()))?;
                let normalized = raw.replace("\r\n", "\n").replace('\r', "\n");
                let value = unescape(&normalized).map_err(|e| XmlError::Reference(e.to_string()))?;
                push_text(&mut stack, value.into_owned())?;
            }
            Event::CData(data) => {
                let raw = std::str::from_utf8(&data)
                    .map_err(|e| XmlError::Malformed(e.to_string()))?;
                push_text(&mut stack, raw.replace("\r\n", "\n"))?;
            }
            Event::DocType(_) => return Err(XmlError::DocType),
            Event::Decl(_) | Event::Comment(_) | Event::PI(_) => {}
            Event::Eof => break,
        }
    }

    if !stack.is_empty() {
        return Err(XmlError::Malformed("unclosed element".to_string()));
    }
    root.ok_or(XmlError::NoRoot)
}

fn check_new_element(
    stack: &[Element],
    root: Option<&Element>,
    limits: ParseLimits,
) -> Result<(), XmlError> {
    if stack.is_empty() && root.is_some() {
        return Err(XmlError::MultipleRoots);
    }
    if stack.len() >= limits.max_depth {
        return Err(XmlError::TooDeep {
            limit: limits.max_depth,
        });
    }
    Ok(())
}

fn attach(element: Element, stack: &mut [Element], root: &mut Option<Element>) {
    match stack.last_mut() {
        Some(parent) => parent.children.push(Node::Element(element)),
        None => *root = Some(element),
    }
}

fn push_text(stack: &mut [Element], text: String) -> Result<(), XmlError> {
    match stack.last_mut() {
        Some(parent) => {
            if let Some(Node::Text(previous)) = parent.children.last_mut() {
                previous.push_str(&text);
            } else {
                parent.children.push(Node::Text(text));
            }
            Ok(())
        }
        None if text.trim().is_empty() => Ok(()),
        None => Err(XmlError::TextOutsideRoot),
    }
}

fn split_qname(qname: &str) -> (Option<&str>, &str) {
    match qname.split_once(':') {
        Some((prefix, local)) => (Some(prefix), local),
        None => (None, qname),
    }
}

fn attribute_value(raw: &[u8]) -> Result<String, XmlError> {
    let raw = std::str::from_utf8(raw).map_err(|e| XmlError::Malformed(e.to_string()))?;
    let normalized = raw
        .replace("\r\n", "\n")
        .replace(['\t', '\n', '\r'], " ");
    unescape(&normalized)
        .map(Cow::into_owned)
        .map_err(|e| XmlError::Reference(e.to_string()))
}

fn open_element(start: &BytesStart<'_>, scope: &[Namespace]) -> Result<Element, XmlError> {
    let qname = std::str::from_utf8(start.name().as_ref())
        .map_err(|e| XmlError::Malformed(e.to_string()))?
        .to_string();

    let mut declared: Vec<Namespace> = Vec::new();
    let mut raw_attributes: Vec<(String, String)> = Vec::new();
    for attr in start.attributes() {
        let attr = attr.map_err(|e| XmlError::Malformed(e.to_string()))?;
        let key = std::str::from_utf8(attr.key.as_ref())
            .map_err(|e| XmlError::Malformed(e.to_string()))?
            .to_string();
        let value = attribute_value(&attr.value)?;
        if key == "xmlns" {
            declared.push(Namespace { prefix: None, uri: value });
        } else if let Some(prefix) = key.strip_prefix("xmlns:") {
            if value.is_empty() || prefix == "xmlns" || (prefix == "xml" && value != XML_NS) {
                return Err(XmlError::Malformed(format!("invalid declaration of {key}")));
            }
            declared.push(Namespace {
                prefix: Some(prefix.to_string()),
                uri: value,
            });
        } else {
            raw_attributes.push((key, value));
        }
    }

    let resolve = |prefix: Option<&str>| -> Option<String> {
        if prefix == Some("xml") {
            return Some(XML_NS.to_string());
        }
        lookup_namespace(&declared, prefix)
            .or_else(|| lookup_namespace(scope, prefix))
            .filter(|uri| !uri.is_empty())
            .map(str::to_string)
    };

    let (prefix, name) = split_qname(&qname);
    let namespace = match prefix {
        Some(p) => Some(resolve(Some(p)).ok_or_else(|| XmlError::UnboundPrefix(p.to_string()))?),
        None => resolve(None),
    };

    let mut attributes = Vec::with_capacity(raw_attributes.len());
    for (key, value) in raw_attributes {
        let (attr_prefix, attr_name) = split_qname(&key);
        let attr_namespace = match attr_prefix {
            Some(p) => Some(
                resolve(Some(p)).ok_or_else(|| XmlError::UnboundPrefix(p.to_string()))?,
            ),
            None => None,
        };
        attributes.push(Attribute {
            prefix: attr_prefix.map(str::to_string),
            name: attr_name.to_string(),
            namespace: attr_namespace,
            value,
        });
    }

    Ok(Element {
        prefix: prefix.map(str::to_string),
        name: name.to_string(),
        namespace,
        namespaces: declared,
        attributes,
        children: Vec::new(),
    })
}

fn declare_if_needed(
    prefix: Option<&str>,
    namespace: Option<&str>,
    scope: &mut Vec<Namespace>,
    declarations: &mut Vec<Namespace>,
) {
    if prefix == Some("xml") {
        return;
    }
    let wanted = namespace.unwrap_or("");
    let current = lookup_namespace(scope, prefix).unwrap_or("");
    if current == wanted || (prefix.is_some() && wanted.is_empty()) {
        return;
    }
    let ns = Namespace {
        prefix: prefix.map(str::to_string),
        uri: wanted.to_string(),
    };
    scope.push(ns.clone());
    declarations.push(ns);
}

fn write_element(
    writer: &mut Writer<Vec<u8>>,
    element: &Element,
    scope: &mut Vec<Namespace>,
) -> Result<(), XmlError> {
    let mark = scope.len();
    let mut declarations = element.namespaces.clone();
    scope.extend(element.namespaces.iter().cloned());
    declare_if_needed(
        element.prefix.as_deref(),
        element.namespace.as_deref(),
        scope,
        &mut declarations,
    );
    for attr in &element.attributes {
        if attr.prefix.is_some() {
            declare_if_needed(
                attr.prefix.as_deref(),
                attr.namespace.as_deref(),
                scope,
                &mut declarations,
            );
        }
    }

    let mut raw: Vec<(String, String)> = declarations
        .iter()
        .map(|ns| {
            let key = match &ns.prefix {
                Some(prefix) => format!("xmlns:{prefix}"),
                None => "xmlns".to_string(),
            };
            (key, escape_attribute(&ns.uri))
        })
        .collect();
    raw.extend(
        element
            .attributes
            .iter()
            .map(|a| (a.qualified_name().into_owned(), escape_attribute(&a.value))),
    );

    let qname = element.qualified_name().into_owned();
    let mut start = BytesStart::new(qname.clone());
    for (key, value) in &raw {
        start.push_attribute(RawAttribute {
            key: QName(key.as_bytes()),
            value: Cow::Borrowed(value.as_bytes()),
        });
    }

    if element.children.is_empty() {
        writer
            .write_event(Event::Empty(start))
            .map_err(|e| XmlError::Write(e.to_string()))?;
    } else {
        writer
            .write_event(Event::Start(start))
            .map_err(|e| XmlError::Write(e.to_string()))?;
        for child in &element.children {
            match child {
                Node::Element(child) => write_element(writer, child, scope)?,
                Node::Text(text) => writer
                    .write_event(Event::Text(BytesText::from_escaped(escape_text(text))))
                    .map_err(|e| XmlError::Write(e.to_string()))?,
            }
        }
        writer
            .write_event(Event::End(BytesEnd::new(qname)))
            .map_err(|e| XmlError::Write(e.to_string()))?;
    }

    scope.truncate(mark);
    Ok(())
}
