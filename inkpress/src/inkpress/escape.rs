/// Replace the characters that matter inside HTML text and attribute values
/// with their entity form. Single pass: inserted entities are never rescanned.
pub fn escape_html(text: &str) -> String {
    let mut output = String::with_capacity(text.len() + text.len() / 8);
    for ch in text.chars() {
        match entity_for(ch) {
            Some(entity) => output.push_str(entity),
            None => output.push(ch),
        }
    }
    output
}

fn entity_for(ch: char) -> Option<&'static str> {
    let entity = match ch {
        '&' => "&amp;",
        '<' => "&lt;",
        '>' => "&gt;",
        '"' => "&quot;",
        '\'' => "&#39;",
        '/' => "&#x2F;",
        '`' => "&#x60;",
        '=' => "&#x3D;",
        _ => return None,
    };
    Some(entity)
}
