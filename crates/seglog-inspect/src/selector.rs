//! Stream selection.

use seglog_error::Result;
use seglog_types::StreamName;
use tracing::debug;

/// Drain the namespace enumeration, keeping names that start with `prefix`.
///
/// Enumeration order is preserved. The first enumeration error aborts the
/// selection.
pub fn select_streams<I>(names: I, prefix: Option<&str>) -> Result<Vec<StreamName>>
where
    I: IntoIterator<Item = Result<StreamName>>,
{
    let mut selected = Vec::new();
    let mut seen = 0usize;
    for name in names {
        let name = name?;
        seen += 1;
        if prefix.is_none_or(|prefix| name.has_prefix(prefix)) {
            selected.push(name);
        }
    }
    debug!(target: "seglog.inspect", seen, selected = selected.len(), prefix = ?prefix, "streams selected");
    Ok(selected)
}
