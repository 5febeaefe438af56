//! Conversion of a tiny subset of HTML into Telegraph's content format.
//! See <https://telegra.ph/api#Node>

use super::TelegraphError;
use serde::Serialize;

/// Tags that Telegraph accepts in the page content
const ALLOWED_TAGS: &[&str] = &[
    "a", "aside", "b", "blockquote", "br", "code", "em", "figcaption", "figure", "h3", "h4", "hr",
    "i", "iframe", "img", "li", "ol", "p", "pre", "s", "strong", "u", "ul", "video",
];

const VOID_TAGS: &[&str] = &["br", "hr", "img"];

#[derive(Debug, Serialize, PartialEq, Eq)]
#[serde(untagged)]
pub(crate) enum Node {
    Text(String),
    Element(Element),
}

#[derive(Debug, Serialize, PartialEq, Eq)]
pub(crate) struct Element {
    tag: String,

    #[serde(skip_serializing_if = "Attrs::is_empty")]
    attrs: Attrs,

    #[serde(skip_serializing_if = "Vec::is_empty")]
    children: Vec<Node>,
}

#[derive(Debug, Serialize, PartialEq, Eq, Default)]
struct Attrs {
    #[serde(skip_serializing_if = "Option::is_none")]
    href: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    src: Option<String>,
}

impl Attrs {
    fn is_empty(&self) -> bool {
        self.href.is_none() && self.src.is_none()
    }
}

#[derive(Default)]
struct TreeBuilder {
    root: Vec<Node>,
    open: Vec<Element>,
}

impl TreeBuilder {
    fn push(&mut self, node: Node) {
        match self.open.last_mut() {
            Some(parent) => parent.children.push(node),
            None => self.root.push(node),
        }
    }

    fn close(&mut self, tag: &str) {
        // Stray closing tags are ignored, unclosed inner tags are closed implicitly
        let Some(pos) = self.open.iter().rposition(|element| element.tag == tag) else {
            return;
        };
        while self.open.len() > pos {
            if let Some(element) = self.open.pop() {
                self.push(Node::Element(element));
            }
        }
    }

    fn finish(mut self) -> Vec<Node> {
        self.close_all();
        self.root
    }

    fn close_all(&mut self) {
        while let Some(element) = self.open.pop() {
            self.push(Node::Element(element));
        }
    }
}

pub(crate) fn html_to_nodes(html: &str) -> Result<Vec<Node>, TelegraphError> {
    let mut tree = TreeBuilder::default();
    let mut rest = html;

    while !rest.is_empty() {
        let Some(tag_start) = rest.find('<') else {
            push_text(&mut tree, rest);
            break;
        };

        push_text(&mut tree, &rest[..tag_start]);

        let Some(tag_len) = rest[tag_start..].find('>') else {
            // Unterminated tag, treat the remainder as text
            push_text(&mut tree, &rest[tag_start..]);
            break;
        };

        let tag = &rest[tag_start + 1..tag_start + tag_len];
        rest = &rest[tag_start + tag_len + 1..];

        if let Some(closing) = tag.strip_prefix('/') {
            tree.close(&closing.trim().to_ascii_lowercase());
            continue;
        }

        let self_closing = tag.ends_with('/');
        let tag = tag.trim_end_matches('/');
        let (name, attrs) = parse_tag(tag);

        if !ALLOWED_TAGS.contains(&name.as_str()) {
            return Err(TelegraphError::NotAllowedTag { tag: name });
        }

        let element = Element {
            tag: name,
            attrs,
            children: vec![],
        };

        if self_closing || VOID_TAGS.contains(&element.tag.as_str()) {
            tree.push(Node::Element(element));
        } else {
            tree.open.push(element);
        }
    }

    Ok(tree.finish())
}

fn push_text(tree: &mut TreeBuilder, text: &str) {
    if !text.is_empty() {
        tree.push(Node::Text(decode_entities(text)));
    }
}

fn parse_tag(tag: &str) -> (String, Attrs) {
    let tag = tag.trim();
    let name_end = tag.find(char::is_whitespace).unwrap_or(tag.len());
    let name = tag[..name_end].to_ascii_lowercase();

    let mut attrs = Attrs::default();
    let mut rest = tag[name_end..].trim_start();

    while let Some(eq) = rest.find('=') {
        let key = rest[..eq].trim().to_ascii_lowercase();
        let after_eq = rest[eq + 1..].trim_start();

        let (value, remainder) = match after_eq.chars().next() {
            Some(quote @ ('"' | '\'')) => {
                let body = &after_eq[1..];
                match body.find(quote) {
                    Some(end) => (&body[..end], &body[end + 1..]),
                    None => (body, ""),
                }
            }
            _ => {
                let end = after_eq.find(char::is_whitespace).unwrap_or(after_eq.len());
                (&after_eq[..end], &after_eq[end..])
            }
        };

        let value = decode_entities(value);
        match key.as_str() {
            "href" => attrs.href = Some(value),
            "src" => attrs.src = Some(value),
            _ => {}
        }

        rest = remainder.trim_start();
    }

    (name, attrs)
}

fn decode_entities(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;

    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        rest = &rest[amp..];

        let decoded = rest.find(';').and_then(|semi| {
            let entity = &rest[1..semi];
            let ch = match entity {
                "amp" => Some('&'),
                "lt" => Some('<'),
                "gt" => Some('>'),
                "quot" => Some('"'),
                "apos" | "#39" => Some('\''),
                "nbsp" => Some('\u{a0}'),
                _ => entity
                    .strip_prefix('#')
                    .and_then(|code| match code.strip_prefix(['x', 'X']) {
                        Some(hex) => u32::from_str_radix(hex, 16).ok(),
                        None => code.parse().ok(),
                    })
                    .and_then(char::from_u32),
            };
            ch.map(|ch| (ch, semi + 1))
        });

        match decoded {
            Some((ch, len)) => {
                out.push(ch);
                rest = &rest[len..];
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
