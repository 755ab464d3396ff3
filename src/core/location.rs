//! Location token grammar.
//!
//! A token is `well`, `alias:well`, or `alias:column`. The final segment is a
//! well when it is one non-digit followed by one to three digits (`A1`, `H12`);
//! anything else names a resource-table column. The bracketed form
//! `alias:[A1, B2, other:C3]` is a list shorthand and is split by
//! [`split_bracket_list`] before tokens are parsed.

use super::error::RecipeError;
use regex::Regex;
use std::fmt;
use std::sync::LazyLock;

const ALIAS_SEPARATOR: char = ':';

static WELL_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\D\d{1,3}$").expect("well identifier pattern is valid"));

/// True when `segment` is a well identifier rather than a column name.
pub fn is_well_id(segment: &str) -> bool {
    WELL_ID.is_match(segment)
}

/// A parsed location token.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LocationRef {
    /// Labware alias (or slot number); None for bare wells
    pub alias: Option<String>,
    /// Well identifier or column name
    pub target: String,
}

impl LocationRef {
    /// Parse `well` or `alias:well`.
    pub fn parse(token: &str) -> Result<Self, RecipeError> {
        let token = token.trim();
        let malformed = |reason: &str| RecipeError::MalformedLocation {
            token: token.to_string(),
            reason: reason.to_string(),
        };

        if token.is_empty() {
            return Err(malformed("empty location"));
        }
        if token.contains('[') || token.contains(']') {
            return Err(malformed("list syntax is not allowed here"));
        }

        let parts: Vec<&str> = token.split(ALIAS_SEPARATOR).map(str::trim).collect();
        match parts.as_slice() {
            [target] => Ok(Self {
                alias: None,
                target: target.to_string(),
            }),
            [alias, target] => {
                if alias.is_empty() {
                    return Err(malformed("empty alias"));
                }
                if target.is_empty() {
                    return Err(malformed("empty well"));
                }
                Ok(Self {
                    alias: Some(alias.to_string()),
                    target: target.to_string(),
                })
            }
            _ => Err(malformed("more than one alias separator")),
        }
    }

    /// True when the target is a well identifier.
    pub fn is_well(&self) -> bool {
        is_well_id(&self.target)
    }

    /// Same alias, different target.
    pub fn with_target(&self, target: impl Into<String>) -> Self {
        Self {
            alias: self.alias.clone(),
            target: target.into(),
        }
    }
}

impl fmt::Display for LocationRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.alias {
            Some(alias) => write!(f, "{}{}{}", alias, ALIAS_SEPARATOR, self.target),
            None => write!(f, "{}", self.target),
        }
    }
}

/// Split a bracketed list token into one token per element.
///
/// The outer alias is applied to elements without their own alias; an inner
/// alias wins. Empty elements (trailing commas) are dropped. Tokens without
/// brackets are returned unchanged.
pub fn split_bracket_list(token: &str) -> Result<Vec<String>, RecipeError> {
    let trimmed = token.trim();
    let Some(open) = trimmed.find('[') else {
        return Ok(vec![trimmed.to_string()]);
    };
    let malformed = |reason: &str| RecipeError::MalformedLocation {
        token: trimmed.to_string(),
        reason: reason.to_string(),
    };

    let prefix = trimmed[..open].trim();
    let outer_alias = if prefix.is_empty() {
        None
    } else if let Some(alias) = prefix.strip_suffix(ALIAS_SEPARATOR) {
        let alias = alias.trim();
        if alias.is_empty() || alias.contains(ALIAS_SEPARATOR) {
            return Err(malformed("invalid alias before '['"));
        }
        Some(alias)
    } else {
        return Err(malformed("expected ':' between alias and '['"));
    };

    let body = trimmed[open + 1..]
        .strip_suffix(']')
        .ok_or_else(|| malformed("unclosed '['"))?;
    if body.contains('[') || body.contains(']') {
        return Err(malformed("nested brackets"));
    }

    let mut tokens = Vec::new();
    for element in body.split(',').map(str::trim) {
        if element.is_empty() {
            continue;
        }
        match outer_alias {
            Some(alias) if !element.contains(ALIAS_SEPARATOR) => {
                tokens.push(format!("{}{}{}", alias, ALIAS_SEPARATOR, element));
            }
            _ => tokens.push(element.to_string()),
        }
    }
    Ok(tokens)
}
