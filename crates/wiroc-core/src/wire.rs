//! Property channel message layout
//!
//! ```text
//! response:  name\tvalue|name\tvalue|...
//! snapshot:  all\tv1¤v2¤...¤vN
//! query:     name1|name2|...|
//! set:       name\tfield1[\tfield2...]
//! handshake: all\t<chunk size>|
//! ```

/// Separates property groups in a message
pub const GROUP_SEPARATOR: char = '|';

/// Separates a property name from its value(s)
pub const FIELD_SEPARATOR: char = '\t';

/// Separates positional values inside a bulk snapshot
pub const BULK_SEPARATOR: char = '¤';

/// Property name of the bulk snapshot
pub const BULK_PROPERTY: &str = "all";

/// Split a property-channel message into `(name, value)` groups
///
/// Empty groups are skipped and a group without a tab yields an empty value.
/// A single trailing pad space is stripped first.
pub fn parse_message(text: &str) -> Vec<(&str, &str)> {
    let text = text.strip_suffix(' ').unwrap_or(text);

    text.split(GROUP_SEPARATOR)
        .filter(|group| !group.is_empty())
        .map(|group| group.split_once(FIELD_SEPARATOR).unwrap_or((group, "")))
        .collect()
}

/// Build a query for one or more properties
pub fn query_command<S: AsRef<str>>(names: &[S]) -> String {
    let mut cmd = String::new();
    for name in names {
        cmd.push_str(name.as_ref());
        cmd.push(GROUP_SEPARATOR);
    }
    cmd
}

/// Build a write of `fields` to property `name`
pub fn set_command<S: AsRef<str>>(name: &str, fields: &[S]) -> String {
    let mut cmd = String::from(name);
    cmd.push(FIELD_SEPARATOR);
    for (i, field) in fields.iter().enumerate() {
        if i > 0 {
            cmd.push(FIELD_SEPARATOR);
        }
        cmd.push_str(field.as_ref());
    }
    cmd
}

/// Session handshake requesting the full snapshot at `chunk_size`
pub fn handshake_command(chunk_size: usize) -> String {
    format!("{}{}{}{}", BULK_PROPERTY, FIELD_SEPARATOR, chunk_size, GROUP_SEPARATOR)
}

/// Append a space when the command would end on a chunk boundary
///
/// The receiver only completes a message on a short chunk, so a payload of
/// exactly `n * max_chunk_size` bytes needs one extra byte.
pub fn pad_for_chunking(mut cmd: String, max_chunk_size: usize) -> String {
    if max_chunk_size > 0 && !cmd.is_empty() && cmd.len() % max_chunk_size == 0 {
        cmd.push(' ');
    }
    cmd
}
