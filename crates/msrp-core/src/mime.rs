//! Content-type matching for `accept-types` style lists

/// Whether `mime_type` is covered by `types`.
///
/// List entries may be exact types, `type/*` wildcards or a lone `*`.
/// Matching ignores case and any parameters on `mime_type`.
pub fn contains_mime_type<S: AsRef<str>>(types: &[S], mime_type: &str) -> bool {
    let mime_type = mime_type.split(';').next().unwrap_or("").trim().to_ascii_lowercase();
    types.iter().any(|entry| {
        let entry = entry.as_ref().trim().to_ascii_lowercase();
        if entry == "*" || entry == mime_type {
            return true;
        }
        match entry.strip_suffix("/*") {
            Some(major) => mime_type
                .split_once('/')
                .map_or(false, |(candidate, _)| candidate == major),
            None => false,
        }
    })
}

/// Split a space separated SDP type list
pub fn parse_type_list(value: &str) -> Vec<String> {
    value.split_whitespace().map(str::to_string).collect()
}
