//! Composite ledger keys for service records
use super::error::KeyError;

/// Namespace every service record lives under.
pub const SERVICE_NAMESPACE: &str = "service";

// separates the namespace and every attribute; never valid inside a segment
const SEPARATOR: char = '\u{0}';
const MAX_UNICODE_RUNE: char = '\u{10FFFF}';

/// Combines a namespace and an ordered list of attributes into one key.
///
/// Layout is `\0<namespace>\0<attr0>\0<attr1>\0...`, so a key built from a
/// prefix of the attributes is a byte prefix of the full key.
pub fn create_composite_key(namespace: &str, attributes: &[&str]) -> Result<String, KeyError> {
    validate_segment(namespace)?;

    let mut key = String::with_capacity(
        2 + namespace.len() + attributes.iter().map(|a| a.len() + 1).sum::<usize>(),
    );
    key.push(SEPARATOR);
    key.push_str(namespace);
    key.push(SEPARATOR);

    for attr in attributes {
        validate_segment(attr)?;
        key.push_str(attr);
        key.push(SEPARATOR);
    }

    Ok(key)
}

/// Derives the storage key of a service record from its natural identity.
pub fn derive_key(type_of_service: &str, phone: &str) -> Result<String, KeyError> {
    create_composite_key(SERVICE_NAMESPACE, &[type_of_service, phone])
}

/// Renders a composite key for logs and error messages.
pub fn display_key(key: &str) -> String {
    key.trim_matches(SEPARATOR).replace(SEPARATOR, "/")
}

fn validate_segment(segment: &str) -> Result<(), KeyError> {
    if let Some(ch) = segment
        .chars()
        .find(|c| *c == SEPARATOR || *c == MAX_UNICODE_RUNE)
    {
        return Err(KeyError::ReservedCharacter {
            segment: segment.to_string(),
            ch,
        });
    }
    Ok(())
}
