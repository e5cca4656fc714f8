use crate::errors::ImpersonatorError;

/// Derive the storage key for a recording label.
///
/// Lower-cases the label, turns whitespace and `( ) # :` into `-`, collapses
/// runs of `-` and trims them from both ends. Different labels can map to the
/// same key, in which case they share a stored recording.
pub fn label_to_key(label: &str) -> String {
    let mut key = String::with_capacity(label.len());
    for ch in label.chars().flat_map(char::to_lowercase) {
        let ch = if is_separator(ch) { '-' } else { ch };
        if ch == '-' && key.ends_with('-') {
            continue;
        }
        key.push(ch);
    }
    key.trim_matches('-').to_string()
}

/// Derive and validate the storage key for `label`.
pub fn key_for_label(label: &str) -> Result<String, ImpersonatorError> {
    let key = label_to_key(label);
    if key.is_empty() {
        return Err(ImpersonatorError::Configuration(format!(
            "recording label {label:?} does not produce a storage key"
        )));
    }
    validate_key(&key).map_err(|_| {
        ImpersonatorError::Configuration(format!(
            "recording label {label:?} produces the storage key `{key}`, which is not a plain file name"
        ))
    })?;
    Ok(key)
}

/// A key names exactly one entry directly under a storage root: no path
/// separators and no `.`/`..` components.
pub fn validate_key(key: &str) -> Result<(), ImpersonatorError> {
    let plain = !key.is_empty()
        && !key.contains(['/', '\\'])
        && key != "."
        && key != ".."
        && !key.contains('\0');
    if plain {
        Ok(())
    } else {
        Err(ImpersonatorError::Configuration(format!(
            "invalid storage key `{key}`: keys must be plain file names"
        )))
    }
}

fn is_separator(ch: char) -> bool {
    ch.is_whitespace() || matches!(ch, '(' | ')' | '#' | ':')
}
