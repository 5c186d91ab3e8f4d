/// Encodes user text for `adb shell input text`.
///
/// Spaces become `%s`, characters the remote shell would interpret become `_`,
/// line breaks are dropped and everything else passes through. This is a
/// sanitizer for that one command's argument grammar, not a general shell
/// escaper.
pub fn encode_input_text(text: &str) -> String {
    let mut encoded = String::with_capacity(text.len() * 2);
    for ch in text.chars() {
        match ch {
            ' ' => encoded.push_str("%s"),
            '&' | '|' | '<' | '>' | '(' | ')' | ';' | '"' | '\\' => encoded.push('_'),
            '\r' | '\n' => {}
            other => encoded.push(other),
        }
    }
    encoded
}
