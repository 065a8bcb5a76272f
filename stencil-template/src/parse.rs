use stencil_dom::html::is_void;

use crate::markup::{Attr, MarkupNode};

#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum MarkupError {
    #[error("unexpected closing tag </{tag}> at byte {offset}")]
    UnexpectedClose { tag: String, offset: usize },
    #[error("closing tag </{found}> at byte {offset} does not match <{expected}>")]
    MismatchedClose {
        expected: String,
        found: String,
        offset: usize,
    },
    #[error("<{tag}> opened at byte {offset} is never closed")]
    Unclosed { tag: String, offset: usize },
    #[error("unterminated {what} starting at byte {offset}")]
    Unterminated { what: &'static str, offset: usize },
}

/// Elements whose body is raw text up to the matching close tag.
const RAW_TEXT: &[&str] = &["script", "style"];

struct Open {
    tag: String,
    attrs: Vec<Attr>,
    children: Vec<MarkupNode>,
    offset: usize,
}

/// Hand-rolled HTML-ish parser supporting:
/// - nested elements, void elements and self-closing tags (`<input/>`)
/// - quoted, unquoted and bare attributes with any name characters (`*if`, `onclick`)
/// - comments, doctype skipping, raw-text `script`/`style` bodies
/// - the common named entities and numeric character references
///
/// Tag and attribute names are lowercased. Whitespace-only text between root
/// nodes is dropped; inside elements it is kept.
pub fn parse_markup(input: &str) -> Result<Vec<MarkupNode>, MarkupError> {
    let bytes = input.as_bytes();
    let mut i = 0usize;
    let mut stack: Vec<Open> = Vec::new();
    let mut roots: Vec<MarkupNode> = Vec::new();

    fn push_child(stack: &mut [Open], roots: &mut Vec<MarkupNode>, node: MarkupNode) {
        match stack.last_mut() {
            Some(open) => open.children.push(node),
            None => roots.push(node),
        }
    }

    while i < bytes.len() {
        if bytes[i] != b'<' || !starts_markup(bytes, i) {
            let start = i;
            i += 1;
            while i < bytes.len() && !(bytes[i] == b'<' && starts_markup(bytes, i)) {
                i += 1;
            }
            let text = decode_entities(&input[start..i]);
            if stack.is_empty() && text.trim().is_empty() {
                continue;
            }
            push_child(&mut stack, &mut roots, MarkupNode::Text(text));
            continue;
        }

        let tag_start = i;
        if input[i..].starts_with("<!--") {
            let body = i + 4;
            let end = input[body..].find("-->").ok_or(MarkupError::Unterminated {
                what: "comment",
                offset: tag_start,
            })?;
            push_child(
                &mut stack,
                &mut roots,
                MarkupNode::Comment(input[body..body + end].to_string()),
            );
            i = body + end + 3;
            continue;
        }
        if bytes.get(i + 1) == Some(&b'!') {
            // doctype and other declarations
            let end = input[i..].find('>').ok_or(MarkupError::Unterminated {
                what: "declaration",
                offset: tag_start,
            })?;
            i += end + 1;
            continue;
        }

        if bytes.get(i + 1) == Some(&b'/') {
            i += 2;
            let tag = read_name(bytes, &mut i).to_ascii_lowercase();
            skip_ws(bytes, &mut i);
            if bytes.get(i) != Some(&b'>') {
                return Err(MarkupError::Unterminated {
                    what: "closing tag",
                    offset: tag_start,
                });
            }
            i += 1;
            let Some(open) = stack.pop() else {
                return Err(MarkupError::UnexpectedClose {
                    tag,
                    offset: tag_start,
                });
            };
            if open.tag != tag {
                return Err(MarkupError::MismatchedClose {
                    expected: open.tag,
                    found: tag,
                    offset: tag_start,
                });
            }
            let node = MarkupNode::Element {
                tag: open.tag,
                attrs: open.attrs,
                children: open.children,
            };
            push_child(&mut stack, &mut roots, node);
            continue;
        }

        // opening or self-closing tag
        i += 1;
        let tag = read_name(bytes, &mut i).to_ascii_lowercase();
        let mut attrs: Vec<Attr> = Vec::new();
        let mut self_closing = false;
        loop {
            skip_ws(bytes, &mut i);
            match bytes.get(i) {
                None => {
                    return Err(MarkupError::Unterminated {
                        what: "tag",
                        offset: tag_start,
                    });
                }
                Some(b'/') if bytes.get(i + 1) == Some(&b'>') => {
                    self_closing = true;
                    i += 2;
                    break;
                }
                Some(b'>') => {
                    i += 1;
                    break;
                }
                Some(_) => match read_attribute(input, &mut i) {
                    Some(attr) => attrs.push(attr),
                    // stray character such as a lone '/'
                    None => i += 1,
                },
            }
        }

        if self_closing || is_void(&tag) {
            push_child(
                &mut stack,
                &mut roots,
                MarkupNode::Element {
                    tag,
                    attrs,
                    children: Vec::new(),
                },
            );
            continue;
        }

        if RAW_TEXT.contains(&tag.as_str()) {
            let close = format!("</{tag}");
            let rest = &input[i..];
            let end = find_ascii_ci(rest, &close).ok_or(MarkupError::Unclosed {
                tag: tag.clone(),
                offset: tag_start,
            })?;
            let body = &rest[..end];
            let children = if body.is_empty() {
                Vec::new()
            } else {
                vec![MarkupNode::Text(body.to_string())]
            };
            i += end + close.len();
            skip_ws(bytes, &mut i);
            if bytes.get(i) == Some(&b'>') {
                i += 1;
            }
            push_child(
                &mut stack,
                &mut roots,
                MarkupNode::Element {
                    tag,
                    attrs,
                    children,
                },
            );
            continue;
        }

        stack.push(Open {
            tag,
            attrs,
            children: Vec::new(),
            offset: tag_start,
        });
    }

    if let Some(open) = stack.pop() {
        return Err(MarkupError::Unclosed {
            tag: open.tag,
            offset: open.offset,
        });
    }
    Ok(roots)
}

/// `<` only opens markup when followed by a name, `/` or `!`.
fn starts_markup(bytes: &[u8], i: usize) -> bool {
    matches!(bytes.get(i + 1), Some(c) if c.is_ascii_alphabetic() || *c == b'/' || *c == b'!')
}

fn skip_ws(bytes: &[u8], i: &mut usize) {
    while *i < bytes.len() && bytes[*i].is_ascii_whitespace() {
        *i += 1;
    }
}

fn read_name(bytes: &[u8], i: &mut usize) -> String {
    let start = *i;
    while *i < bytes.len() {
        let c = bytes[*i];
        if c.is_ascii_alphanumeric() || c == b'_' || c == b'-' || c == b':' {
            *i += 1;
        } else {
            break;
        }
    }
    String::from_utf8_lossy(&bytes[start..*i]).into_owned()
}

fn is_attr_name_byte(c: u8) -> bool {
    !(c.is_ascii_whitespace() || matches!(c, b'/' | b'>' | b'=' | b'"' | b'\''))
}

fn read_attribute(input: &str, i: &mut usize) -> Option<Attr> {
    let bytes = input.as_bytes();
    let name_start = *i;
    while *i < bytes.len() && is_attr_name_byte(bytes[*i]) {
        *i += 1;
    }
    if *i == name_start {
        return None;
    }
    let name = input[name_start..*i].to_ascii_lowercase();

    let mut j = *i;
    skip_ws(bytes, &mut j);
    if bytes.get(j) != Some(&b'=') {
        return Some(Attr::new(name, ""));
    }
    *i = j + 1;
    skip_ws(bytes, i);
    let value = match bytes.get(*i) {
        Some(&q) if q == b'"' || q == b'\'' => {
            *i += 1;
            let start = *i;
            while *i < bytes.len() && bytes[*i] != q {
                *i += 1;
            }
            let raw = &input[start..*i];
            if *i < bytes.len() {
                *i += 1;
            }
            raw
        }
        _ => {
            let start = *i;
            while *i < bytes.len() && !bytes[*i].is_ascii_whitespace() && bytes[*i] != b'>' {
                *i += 1;
            }
            &input[start..*i]
        }
    };
    Some(Attr::new(name, decode_entities(value)))
}

fn find_ascii_ci(haystack: &str, needle: &str) -> Option<usize> {
    let h = haystack.as_bytes();
    let n = needle.as_bytes();
    if n.len() > h.len() {
        return None;
    }
    (0..=h.len() - n.len()).find(|&start| h[start..start + n.len()].eq_ignore_ascii_case(n))
}

fn decode_entities(s: &str) -> String {
    if !s.contains('&') {
        return s.to_string();
    }
    let mut out = String::with_capacity(s.len());
    let mut rest = s;
    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        rest = &rest[amp..];
        let decoded = rest.find(';').filter(|&semi| semi <= 10).and_then(|semi| {
            let entity = &rest[1..semi];
            let ch = match entity {
                "amp" => Some('&'),
                "lt" => Some('<'),
                "gt" => Some('>'),
                "quot" => Some('"'),
                "apos" | "#39" => Some('\''),
                "nbsp" => Some('\u{a0}'),
                _ => entity
                    .strip_prefix("#x")
                    .or_else(|| entity.strip_prefix("#X"))
                    .and_then(|hex| u32::from_str_radix(hex, 16).ok())
                    .or_else(|| entity.strip_prefix('#').and_then(|d| d.parse().ok()))
                    .and_then(char::from_u32),
            };
            ch.map(|c| (c, semi))
        });
        match decoded {
            Some((c, semi)) => {
                out.push(c);
                rest = &rest[semi + 1..];
            }
            None => {
                out.push('&');
                rest = &rest[1..];
            }
        }
    }
    out.push_str(rest);
    out
}
