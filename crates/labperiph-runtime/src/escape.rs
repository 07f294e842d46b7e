/// Backslash-escape the characters a double-quoted shell word treats
/// specially: `\`, `$`, `` ` `` and `"`. Everything else is left as is.
pub fn escape_special_chars(input: &str) -> String {
    let mut escaped = String::with_capacity(input.len());
    for c in input.chars() {
        if matches!(c, '\\' | '$' | '`' | '"') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

/// Wrap `input` in double quotes so a POSIX shell reads it as one word.
pub fn shell_quote(input: &str) -> String {
    format!("\"{}\"", escape_special_chars(input))
}
