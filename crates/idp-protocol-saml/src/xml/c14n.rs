//! Exclusive XML Canonicalization 1.0, without comments.
//!
//! Only the subset SAML signatures need: an element subtree rendered with
//! visibly utilized namespace declarations, plus an optional inclusive prefix
//! list. Comments and processing instructions never reach the tree, so there
//! is nothing to strip here.

use super::{lookup_namespace, Element, Namespace, Node};

/// Canonicalizes `element` and its descendants.
///
/// `inherited` holds the namespace declarations in scope at `element` (those
/// made by its ancestors). They are only consulted for prefixes named in
/// `inclusive_prefixes`, where `#default` stands for the default namespace.
#[must_use]
pub fn canonicalize(element: &Element, inherited: &[Namespace], inclusive_prefixes: &[String]) -> String {
    let mut out = String::new();
    let mut in_scope = inherited.to_vec();
    write_element(&mut out, element, &mut in_scope, &[], inclusive_prefixes);
    out
}

/// Collects the declarations in scope for the element at the end of `path`,
/// excluding its own.
#[must_use]
pub fn inherited_namespaces(path: &[&Element]) -> Vec<Namespace> {
    let Some((_, ancestors)) = path.split_last() else {
        return Vec::new();
    };
    ancestors
        .iter()
        .flat_map(|e| e.namespaces.iter().cloned())
        .collect()
}

fn write_element(
    out: &mut String,
    element: &Element,
    in_scope: &mut Vec<Namespace>,
    rendered: &[Namespace],
    inclusive_prefixes: &[String],
) {
    let mark = in_scope.len();
    in_scope.extend(element.namespaces.iter().cloned());

    let mut utilized: Vec<Namespace> = Vec::new();
    utilize(
        &mut utilized,
        element.prefix.as_deref(),
        element.namespace.as_deref().unwrap_or(""),
    );
    for attr in &element.attributes {
        if let Some(prefix) = attr.prefix.as_deref() {
            if prefix != "xml" {
                utilize(
                    &mut utilized,
                    Some(prefix),
                    attr.namespace.as_deref().unwrap_or(""),
                );
            }
        }
    }
    for token in inclusive_prefixes {
        let prefix = (token != "#default").then_some(token.as_str());
        if let Some(uri) = lookup_namespace(in_scope, prefix) {
            let uri = uri.to_string();
            utilize(&mut utilized, prefix, &uri);
        }
    }

    let mut declarations: Vec<Namespace> = utilized
        .into_iter()
        .filter(|ns| {
            let current = lookup_namespace(rendered, ns.prefix.as_deref()).unwrap_or("");
            match ns.prefix {
                None => current != ns.uri,
                Some(_) => !ns.uri.is_empty() && current != ns.uri,
            }
        })
        .collect();
    declarations.sort_by(|a, b| a.prefix.cmp(&b.prefix));

    let mut attributes: Vec<_> = element.attributes.iter().collect();
    attributes.sort_by(|a, b| {
        (a.namespace.as_deref().unwrap_or(""), a.name.as_str())
            .cmp(&(b.namespace.as_deref().unwrap_or(""), b.name.as_str()))
    });

    let qname = element.qualified_name();
    out.push('<');
    out.push_str(&qname);
    for ns in &declarations {
        match &ns.prefix {
            Some(prefix) => {
                out.push_str(" xmlns:");
                out.push_str(prefix);
            }
            None => out.push_str(" xmlns"),
        }
        out.push_str("=\"");
        out.push_str(&escape_attribute(&ns.uri));
        out.push('"');
    }
    for attr in attributes {
        out.push(' ');
        out.push_str(&attr.qualified_name());
        out.push_str("=\"");
        out.push_str(&escape_attribute(&attr.value));
        out.push('"');
    }
    out.push('>');

    let mut child_rendered = rendered.to_vec();
    child_rendered.extend(declarations);
    for child in &element.children {
        match child {
            Node::Element(child) => {
                write_element(out, child, in_scope, &child_rendered, inclusive_prefixes);
            }
            Node::Text(text) => out.push_str(&escape_text(text)),
        }
    }

    out.push_str("</");
    out.push_str(&qname);
    out.push('>');
    in_scope.truncate(mark);
}

fn utilize(utilized: &mut Vec<Namespace>, prefix: Option<&str>, uri: &str) {
    if utilized.iter().all(|ns| ns.prefix.as_deref() != prefix) {
        utilized.push(Namespace {
            prefix: prefix.map(str::to_string),
            uri: uri.to_string(),
        });
    }
}

/// Escapes character data the canonical way.
#[must_use]
pub fn escape_text(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '\r' => out.push_str("&#xD;"),
            c => out.push(c),
        }
    }
    out
}

/// Escapes an attribute value the canonical way.
#[must_use]
pub fn escape_attribute(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '"' => out.push_str("&quot;"),
            '\t' => out.push_str("&#x9;"),
            '\n' => out.push_str("&#xA;"),
            '\r' => out.push_str("&#xD;"),
            c => out.push(c),
        }
    }
    out
}
