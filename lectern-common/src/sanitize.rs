//! Stripping markup from user supplied text.
//!
//! [`sanitize`] removes tags instead of escaping them, so `<b>hi</b>` becomes
//! `hi`. Text inside elements that never render as text (scripts, styles and
//! friends) is dropped along with the element.

/// Elements whose content is removed together with the tags.
const DROPPED_CONTENT_ELEMENTS: &[&str] = &["script", "style", "textarea", "option", "noscript"];

/// Returns `raw` with all markup removed.
///
/// A `<` only starts markup when followed by an ASCII letter, `/`, `!` or
/// `?`, so text like `a < b` is left alone. Once any markup was found, stray
/// `<` and `>` are removed as well, which makes the result free of markup
/// delimiters and `sanitize(sanitize(x)) == sanitize(x)`.
#[must_use]
pub fn sanitize(raw: &str) -> String {
    let mut text = String::with_capacity(raw.len());
    let mut found_markup = false;
    let mut rest = raw;

    while let Some(start) = rest.find('<') {
        let (before, from_bracket) = rest.split_at(start);
        text.push_str(before);

        let Some(markup) = Markup::parse(from_bracket) else {
            text.push('<');
            rest = &from_bracket[1..];
            continue;
        };
        found_markup = true;
        rest = &from_bracket[markup.len..];

        if let Some(element) = markup.opens_dropped_element() {
            rest = skip_past_closing_tag(rest, element);
        }
    }
    text.push_str(rest);

    if found_markup {
        text.retain(|c| c != '<' && c != '>');
    }
    text
}

#[derive(Copy, Clone, Eq, PartialEq, Debug)]
enum MarkupKind {
    StartTag,
    EndTag,
    Other,
}

/// A markup construct at the start of some input.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
struct Markup<'a> {
    kind: MarkupKind,
    name: &'a str,
    /// Byte length of the construct, including both delimiters.
    len: usize,
}

impl<'a> Markup<'a> {
    /// Parses markup at the start of `input`, which begins with `<`.
    fn parse(input: &'a str) -> Option<Self> {
        let after = &input[1..];
        let first = after.chars().next()?;

        if let Some(comment) = after.strip_prefix("!--") {
            let len = comment
                .find("-->")
                .map_or(input.len(), |end| 4 + end + 3);
            return Some(Self {
                kind: MarkupKind::Other,
                name: "",
                len,
            });
        }

        let (kind, name_start) = match first {
            '/' => (MarkupKind::EndTag, 2),
            '!' | '?' => (MarkupKind::Other, 2),
            c if c.is_ascii_alphabetic() => (MarkupKind::StartTag, 1),
            _ => return None,
        };

        let name_len = input[name_start..]
            .find(|c: char| !(c.is_ascii_alphanumeric() || c == '-' || c == ':'))
            .unwrap_or(input.len() - name_start);
        let name = &input[name_start..name_start + name_len];

        Some(Self {
            kind,
            name,
            len: name_start + name_len + tag_body_len(&input[name_start + name_len..]),
        })
    }

    fn opens_dropped_element(&self) -> Option<&'a str> {
        (self.kind == MarkupKind::StartTag
            && DROPPED_CONTENT_ELEMENTS
                .iter()
                .any(|element| element.eq_ignore_ascii_case(self.name)))
        .then_some(self.name)
    }
}

/// Length of the attribute section up to and including the closing `>`.
/// Quoted attribute values may contain `>`. An unterminated tag runs to the
/// end of the input.
fn tag_body_len(input: &str) -> usize {
    let mut quote = None;
    for (index, c) in input.char_indices() {
        match (quote, c) {
            (None, '"' | '\'') => quote = Some(c),
            (Some(open), _) if c == open => quote = None,
            (None, '>') => return index + 1,
            _ => {}
        }
    }
    input.len()
}

/// Skips everything up to and including `</element ...>`, or to the end of
/// the input when the element is never closed.
fn skip_past_closing_tag<'a>(input: &'a str, element: &str) -> &'a str {
    let mut offset = 0;
    while let Some(start) = input[offset..].find("</") {
        let candidate = &input[offset + start..];
        if let Some(markup) = Markup::parse(candidate)
            && markup.kind == MarkupKind::EndTag
            && markup.name.eq_ignore_ascii_case(element)
        {
            return &candidate[markup.len..];
        }
        offset += start + 2;
    }
    ""
}
