//! County lookup from free text.
//!
//! Two passes: exact (case-sensitive) equality first, then substring
//! containment. A single exact hit wins outright.

/// Maximum number of candidates returned to the user.
pub const MAX_MATCHES: usize = 5;

/// Resolve `query` against the known county names.
///
/// Returns exact matches followed by substring matches, at most
/// [`MAX_MATCHES`] entries. An exact match also shows up again in the
/// substring pass; callers rely on the list order, not on uniqueness.
pub fn resolve<S: AsRef<str>>(query: &str, known: &[S]) -> Vec<String> {
    if query.is_empty() || known.is_empty() {
        return Vec::new();
    }

    let exact: Vec<&str> = known
        .iter()
        .map(AsRef::as_ref)
        .filter(|name| *name == query)
        .collect();
    if exact.len() == 1 {
        return vec![exact[0].to_string()];
    }

    let partial = known
        .iter()
        .map(AsRef::as_ref)
        .filter(|name| name.contains(query));

    exact
        .into_iter()
        .chain(partial)
        .take(MAX_MATCHES)
        .map(str::to_string)
        .collect()
}
