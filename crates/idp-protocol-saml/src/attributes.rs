//! User profile to SAML mapping: NameID values and released attributes.
//!
//! The user profile is the JSON document the host's user-info collaborator
//! returns (standard claims such as `sub` and `email` plus custom ones).

use serde_json::Value;

use crate::error::{SamlError, SamlErrorCode, SamlResult};
use crate::provider::{AttributeSource, ServiceProviderConfig};
use crate::types::{
    Attribute, AttributeNameFormat, AttributeValue, AttributeValueType, NameIdFormat,
};

/// Resolves the NameID value for `format` from the user profile.
///
/// # Errors
///
/// Returns [`SamlErrorCode::MissingNameId`] if the profile has no usable
/// value.
pub fn resolve_name_id(
    format: NameIdFormat,
    sp: &ServiceProviderConfig,
    user_info: &Value,
) -> Result<String, SamlErrorCode> {
    match format {
        NameIdFormat::Email => user_info
            .get("email")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| SamlErrorCode::MissingNameId {
                expected_nameid_format: format.uri().to_string(),
                nameid_attribute_pointer: None,
            }),
        NameIdFormat::Unspecified => {
            let pointer = sp.name_id_attribute_pointer.as_str();
            match user_info.pointer(pointer) {
                Some(Value::String(s)) => Ok(s.clone()),
                Some(v @ (Value::Number(_) | Value::Bool(_))) => Ok(v.to_string()),
                _ => Err(SamlErrorCode::MissingNameId {
                    expected_nameid_format: format.uri().to_string(),
                    nameid_attribute_pointer: Some(pointer.to_string()),
                }),
            }
        }
    }
}

/// Resolves the attributes released to `sp`.
///
/// `sub` always comes first, followed by one attribute per configured
/// mapping in configuration order.
///
/// # Errors
///
/// Returns [`SamlErrorCode::UnsupportedAttributeType`] when a pointer lands
/// on a JSON object, and [`SamlError::Config`] for mappings that target an
/// undefined attribute or use an unsupported template.
pub fn resolve_user_attributes(
    sp: &ServiceProviderConfig,
    user_info: &Value,
) -> SamlResult<Vec<Attribute>> {
    let mut attributes = vec![Attribute {
        name: "sub".to_string(),
        name_format: AttributeNameFormat::Basic,
        friendly_name: Some("User ID".to_string()),
        values: vec![AttributeValue::string(
            user_info.get("sub").and_then(Value::as_str).unwrap_or_default(),
        )],
    }];

    for mapping in &sp.attributes.mappings {
        let definition = sp
            .attributes
            .definitions
            .iter()
            .find(|d| d.name == mapping.to)
            .ok_or_else(|| {
                SamlError::Config(format!(
                    "attribute mapping targets undefined attribute {}",
                    mapping.to
                ))
            })?;

        let values = match &mapping.from {
            AttributeSource::UserProfile { pointer } => {
                profile_values(user_info.pointer(pointer)).ok_or_else(|| {
                    SamlErrorCode::UnsupportedAttributeType {
                        attribute_name: definition.name.clone(),
                        user_profile_pointer: pointer.clone(),
                    }
                })?
            }
            AttributeSource::TextTemplate { template } => {
                let rendered = render_template(template, user_info)
                    .map_err(|e| SamlError::Config(format!("attribute {}: {e}", definition.name)))?;
                if rendered.is_empty() {
                    Vec::new()
                } else {
                    vec![AttributeValue::string(rendered)]
                }
            }
        };

        attributes.push(Attribute {
            name: definition.name.clone(),
            name_format: definition.name_format,
            friendly_name: definition.friendly_name.clone(),
            values,
        });
    }

    Ok(attributes)
}

/// Converts a profile value to attribute values. `None` for objects.
fn profile_values(value: Option<&Value>) -> Option<Vec<AttributeValue>> {
    match value {
        None => Some(Vec::new()),
        Some(Value::Array(items)) => items.iter().map(scalar_value).collect(),
        Some(other) => scalar_value(other).map(|v| vec![v]),
    }
}

fn scalar_value(value: &Value) -> Option<AttributeValue> {
    match value {
        Value::Null => Some(AttributeValue::nil()),
        Value::String(s) => Some(AttributeValue::string(s.as_str())),
        Value::Bool(b) => Some(AttributeValue::typed(AttributeValueType::Boolean, b.to_string())),
        Value::Number(n) => Some(AttributeValue::typed(AttributeValueType::Decimal, n.to_string())),
        Value::Array(_) | Value::Object(_) => None,
    }
}

// ============================================================================
// Text templates
// ============================================================================

/// Template syntax: `{{.path}}` inserts a value, `{{if .path}}..{{else}}..{{end}}`
/// branches on its truthiness. Paths are dotted (`.address.country`).
#[derive(Debug, PartialEq, Eq)]
enum TemplateNode {
    Text(String),
    Field(String),
    If {
        field: String,
        then: Vec<TemplateNode>,
        otherwise: Vec<TemplateNode>,
    },
}

#[derive(Debug, PartialEq, Eq)]
enum Terminator {
    Eof,
    Else,
    End,
}

fn render_template(template: &str, data: &Value) -> Result<String, String> {
    let mut rest = template;
    let (nodes, terminator) = parse_nodes(&mut rest)?;
    if terminator != Terminator::Eof {
        return Err("unexpected {{else}} or {{end}}".to_string());
    }
    let mut out = String::new();
    render_nodes(&nodes, data, &mut out);
    Ok(out)
}

fn parse_nodes(rest: &mut &str) -> Result<(Vec<TemplateNode>, Terminator), String> {
    let mut nodes = Vec::new();
    loop {
        let current = *rest;
        let Some(start) = current.find("{{") else {
            if !current.is_empty() {
                nodes.push(TemplateNode::Text(current.to_string()));
            }
            *rest = "";
            return Ok((nodes, Terminator::Eof));
        };
        if start > 0 {
            nodes.push(TemplateNode::Text(current[..start].to_string()));
        }
        let after = &current[start + 2..];
        let end = after.find("}}").ok_or("unclosed action")?;
        let action = after[..end].trim();
        *rest = &after[end + 2..];

        match action {
            "end" => return Ok((nodes, Terminator::End)),
            "else" => return Ok((nodes, Terminator::Else)),
            _ => {}
        }
        if let Some(field) = action.strip_prefix("if ") {
            let field = field_path(field.trim())?;
            let (then, terminator) = parse_nodes(rest)?;
            let otherwise = match terminator {
                Terminator::End => Vec::new(),
                Terminator::Else => match parse_nodes(rest)? {
                    (otherwise, Terminator::End) => otherwise,
                    _ => return Err("missing {{end}}".to_string()),
                },
                Terminator::Eof => return Err("missing {{end}}".to_string()),
            };
            nodes.push(TemplateNode::If {
                field,
                then,
                otherwise,
            });
        } else {
            nodes.push(TemplateNode::Field(field_path(action)?));
        }
    }
}

/// Converts `.a.b` to the JSON pointer `/a/b`.
fn field_path(action: &str) -> Result<String, String> {
    let path = action
        .strip_prefix('.')
        .ok_or_else(|| format!("unsupported action {action:?}"))?;
    if path.is_empty() || path.contains(char::is_whitespace) {
        return Err(format!("unsupported action {action:?}"));
    }
    Ok(path
        .split('.')
        .map(|segment| format!("/{}", segment.replace('~', "~0").replace('/', "~1")))
        .collect())
}

fn render_nodes(nodes: &[TemplateNode], data: &Value, out: &mut String) {
    for node in nodes {
        match node {
            TemplateNode::Text(text) => out.push_str(text),
            TemplateNode::Field(pointer) => match data.pointer(pointer) {
                None | Some(Value::Null) => {}
                Some(Value::String(s)) => out.push_str(s),
                Some(other) => out.push_str(&other.to_string()),
            },
            TemplateNode::If {
                field,
                then,
                otherwise,
            } => {
                let branch = if is_truthy(data.pointer(field)) { then } else { otherwise };
                render_nodes(branch, data, out);
            }
        }
    }
}

fn is_truthy(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => false,
        Some(Value::Bool(b)) => *b,
        Some(Value::String(s)) => !s.is_empty(),
        Some(Value::Number(n)) => n.as_f64().is_some_and(|f| f != 0.0),
        Some(Value::Array(items)) => !items.is_empty(),
        Some(Value::Object(map)) => !map.is_empty(),
    }
}
