use std::collections::BTreeMap;

use once_cell::sync::Lazy;
use regex::Regex;

/// How far past the budget a trailing word may run before it gets clipped
/// instead of kept whole.
pub const OVERSHOOT_TOLERANCE: usize = 15;

/// Marker appended after the cut when a word had to be dropped or shortened.
pub const ELLIPSIS: &str = "&hellip;";

/// Elements that are never partially included: the scan stops in front of them.
const NON_SEVERABLE_TAGS: &[&str] = &["pre", "code", "img", "table", "style", "script", "h2", "h3"];

static OPEN_TAG_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^<(\w+)[^>]*>").expect("open tag regex"));

static ENTITY_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^#?[A-Za-z0-9]+;").expect("entity regex"));

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Truncated {
    pub html: String,
    pub was_truncated: bool,
}

/// A closing tag found ahead of the cursor for an element opened in the prefix.
#[derive(Debug)]
struct PendingClose {
    tag: String,
    /// Byte length of the closing tag as written in the source (`</B >` etc).
    span: usize,
}

/// Cut `text` down to roughly `budget` visible characters, keeping every
/// element opened in the kept prefix closed in the output.
pub fn truncate(text: &str, budget: usize) -> Truncated {
    truncate_with(text, budget, OVERSHOOT_TOLERANCE)
}

/// Same as [`truncate`] with an explicit overshoot tolerance.
pub fn truncate_with(text: &str, budget: usize, overshoot: usize) -> Truncated {
    let bytes = text.as_bytes();
    let mut pending: BTreeMap<usize, PendingClose> = BTreeMap::new();
    let mut ellipsis = false;
    let mut count = 0usize;
    let mut index = 0usize;

    while count < budget && index < text.len() {
        match bytes[index] {
            b'<' => {
                if let Some(close) = pending.remove(&index) {
                    index += close.span;
                    continue;
                }
                let Some(caps) = OPEN_TAG_RE.captures(&text[index..]) else {
                    // A bare `<` is ordinary text.
                    index += 1;
                    count += 1;
                    continue;
                };
                let tag = caps[1].to_ascii_lowercase();
                if NON_SEVERABLE_TAGS.contains(&tag.as_str()) {
                    break;
                }
                index += caps[0].len();
                if let Some((offset, span)) = find_close(&text[index..], &tag) {
                    pending.insert(index + offset, PendingClose { tag, span });
                }
            }
            b'&' => {
                index += 1;
                if let Some(entity) = ENTITY_RE.find(&text[index..]) {
                    index += entity.end();
                }
                count += 1;
            }
            _ => {
                if bytes[index] == b' ' {
                    index += 1;
                    count += 1;
                }
                let rest = &text[index..];
                let word_len = rest.find([' ', '<', '&']).unwrap_or(rest.len());
                let word = &rest[..word_len];
                let word_chars = word.chars().count();

                let mut take_bytes = word_len;
                let mut take_chars = word_chars;
                if count + word_chars > budget {
                    ellipsis = true;
                    if count + word_chars > budget + overshoot {
                        take_chars = budget - count;
                        take_bytes = word
                            .char_indices()
                            .nth(take_chars)
                            .map(|(i, _)| i)
                            .unwrap_or(word_len);
                    }
                }
                index += take_bytes;
                count += take_chars;
            }
        }
    }

    // Nothing was cut if all that remains are the closes we re-emit anyway.
    let mut rest = index;
    while let Some(close) = pending.get(&rest) {
        rest += close.span;
    }
    let was_truncated = rest < text.len();
    let mut html = String::with_capacity(index + ELLIPSIS.len() + pending.len() * 8);
    html.push_str(&text[..index]);
    if ellipsis && was_truncated {
        html.push_str(ELLIPSIS);
    }
    for close in pending.values() {
        html.push_str("</");
        html.push_str(&close.tag);
        html.push('>');
    }

    Truncated {
        html,
        was_truncated,
    }
}

/// Offset and length of the closing tag that matches an element whose
/// opening tag ends right before `rest`. Same-name elements nested inside
/// are skipped over.
fn find_close(rest: &str, tag: &str) -> Option<(usize, usize)> {
    let pattern = format!(r"(?i)<(/?){}\b[^>]*>", regex::escape(tag));
    let re = Regex::new(&pattern).ok()?;

    let mut depth = 1usize;
    for caps in re.captures_iter(rest) {
        let whole = caps.get(0)?;
        let closing = caps.get(1).is_some_and(|m| !m.as_str().is_empty());
        if !closing {
            if !whole.as_str().ends_with("/>") {
                depth += 1;
            }
            continue;
        }
        depth -= 1;
        if depth == 0 {
            return Some((whole.start(), whole.len()));
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Every opened non-void element is closed, in nesting order.
    fn is_balanced(html: &str) -> bool {
        let tag_re = Regex::new(r"<(/?)(\w+)[^>]*>").unwrap();
        let mut stack: Vec<String> = Vec::new();
        for caps in tag_re.captures_iter(html) {
            let name = caps[2].to_ascii_lowercase();
            if &caps[1] == "/" {
                if stack.pop().as_deref() != Some(name.as_str()) {
                    return false;
                }
            } else if !caps[0].ends_with("/>") && name != "br" {
                stack.push(name);
            }
        }
        stack.is_empty()
    }

    #[test]
    fn empty_input_is_not_truncated() {
        let out = truncate("", 10);
        assert_eq!(out.html, "");
        assert!(!out.was_truncated);
    }

    #[test]
    fn zero_budget_yields_nothing() {
        let out = truncate("<p>abc</p>", 0);
        assert_eq!(out.html, "");
        assert!(out.was_truncated);
    }

    #[test]
    fn text_within_budget_is_unchanged() {
        let inputs = [
            "plain words only",
            "<p>Hi &amp; bye</p>",
            "a < b",
            "<ul><li>one</li><li>two</li></ul>",
        ];
        for input in inputs {
            let out = truncate(input, 100);
            assert_eq!(out.html, input);
            assert!(!out.was_truncated, "{input}");
        }
    }

    #[test]
    fn closes_inline_element_cut_in_the_middle() {
        let out = truncate("<p>Hello <b>world</b> and more text here</p>", 8);
        assert_eq!(out.html, "<p>Hello <b>world&hellip;</b></p>");
        assert!(out.was_truncated);
        assert!(is_balanced(&out.html));
    }

    #[test]
    fn budget_equal_to_visible_length_is_not_a_cut() {
        let out = truncate("<p>abc</p>", 3);
        assert_eq!(out.html, "<p>abc</p>");
        assert!(!out.was_truncated);

        let out = truncate("<p><b>ab</b>c</p>", 3);
        assert_eq!(out.html, "<p><b>ab</b>c</p>");
        assert!(!out.was_truncated);

        let out = truncate("<p>abc</p>more", 3);
        assert_eq!(out.html, "<p>abc</p>");
        assert!(out.was_truncated);
    }

    #[test]
    fn stops_before_non_severable_elements() {
        let out = truncate("<pre>code block</pre> trailing", 5);
        assert_eq!(out.html, "");
        assert!(out.was_truncated);

        let out = truncate("Intro <pre>x</pre> more", 20);
        assert_eq!(out.html, "Intro ");

        let out = truncate("<PRE>x</PRE>", 3);
        assert_eq!(out.html, "");

        let out = truncate("<p>See <img src='a.png'> here</p>", 50);
        assert_eq!(out.html, "<p>See </p>");
    }

    #[test]
    fn long_word_is_clipped_to_the_budget() {
        let out = truncate("abcdefghijklmnopqrstuvwxyz0123456789", 10);
        assert_eq!(out.html, "abcdefghij&hellip;");
        assert!(out.was_truncated);
    }

    #[test]
    fn near_boundary_word_is_kept_whole() {
        let out = truncate("Hello wonderful world", 8);
        assert_eq!(out.html, "Hello wonderful&hellip;");
        assert!(out.was_truncated);
    }

    #[test]
    fn overshooting_final_word_is_not_a_cut() {
        let out = truncate("Hello wonderful", 8);
        assert_eq!(out.html, "Hello wonderful");
        assert!(!out.was_truncated);
    }

    #[test]
    fn overshoot_tolerance_is_configurable() {
        let out = truncate_with("Hello wonderful world", 8, 0);
        assert_eq!(out.html, "Hello wo&hellip;");
    }

    #[test]
    fn budget_counts_characters_not_bytes() {
        let text = "é".repeat(30);
        let out = truncate(&text, 4);
        assert_eq!(out.html, "éééé&hellip;");
    }

    #[test]
    fn entities_count_as_one_character() {
        let out = truncate("&amp;&amp;&amp;", 2);
        assert_eq!(out.html, "&amp;&amp;");
        assert!(out.was_truncated);
    }

    #[test]
    fn nested_same_name_elements_close_in_order() {
        let out = truncate("<b>a<b>b</b>c</b> tail text", 2);
        assert_eq!(out.html, "<b>a<b>b</b></b>");
        assert!(is_balanced(&out.html));
    }

    #[test]
    fn unclosed_element_is_treated_as_void() {
        let out = truncate("<span>text without close", 4);
        assert_eq!(out.html, "<span>text");
        assert!(out.was_truncated);
    }

    #[test]
    fn consumed_closing_tags_are_not_repeated() {
        let out = truncate("<p><i>short</i> and a much longer tail sentence</p>", 12);
        assert_eq!(out.html, "<p><i>short</i> and a much&hellip;</p>");
        assert!(is_balanced(&out.html));
    }

    #[test]
    fn output_is_balanced_for_well_formed_inputs() {
        let input = "<div><p>First <em>para</em> with <a href='x'>a <b>bold</b> link</a>.</p>\
                     <p>Second paragraph goes on for a while.</p></div>";
        for budget in 0..60 {
            let out = truncate(input, budget);
            assert!(is_balanced(&out.html), "budget {budget}: {}", out.html);
        }
    }
}
