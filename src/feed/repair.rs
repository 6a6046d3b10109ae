//! Pre-parse repair of element text that would otherwise break the XML reader.
//!
//! Some publishers paste raw HTML into `<content:encoded>` without escaping or
//! CDATA. The helpers here rewrite only the text between a known start/end tag
//! pair and leave everything else byte-for-byte intact.

use quick_xml::escape::escape;

pub const CONTENT_ENCODED_START: &str = "<content:encoded>";
pub const CONTENT_ENCODED_END: &str = "</content:encoded>";

/// Rewrites the interior of every `start_tag`..`end_tag` pair with `transform`.
///
/// Pairs are found left to right and never overlap; the transform sees the raw
/// text of one pair at a time. Input without `start_tag` is returned unchanged.
///
/// A `start_tag` with no `end_tag` after it means the document is malformed and
/// an empty string is returned instead of a partial result. An empty `end_tag`
/// can never close a pair and is treated the same way. An empty `start_tag`
/// matches nothing.
pub fn process_element_text<F>(
    input: &str,
    start_tag: &str,
    end_tag: &str,
    mut transform: F,
) -> String
where
    F: FnMut(&str) -> String,
{
    if start_tag.is_empty() || !input.contains(start_tag) {
        return input.to_string();
    }
    if end_tag.is_empty() {
        return String::new();
    }

    let mut output = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(start) = rest.find(start_tag) {
        let interior_start = start + start_tag.len();
        output.push_str(&rest[..interior_start]);

        let Some(len) = rest[interior_start..].find(end_tag) else {
            return String::new();
        };
        let interior_end = interior_start + len;

        output.push_str(&transform(&rest[interior_start..interior_end]));
        output.push_str(end_tag);
        rest = &rest[interior_end + end_tag.len()..];
    }

    output.push_str(rest);
    output
}

/// XML-escapes the interior of every tag pair so embedded markup becomes text.
pub fn escape_element_text(input: &str, start_tag: &str, end_tag: &str) -> String {
    process_element_text(input, start_tag, end_tag, |text| escape(text).into_owned())
}
