use cssparser::{ParseError, Parser, ParserInput, Token};

use crate::document::Document;
use crate::{Dom, DomError, NodeId};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttrMatch {
    pub name: String,
    pub value: Option<String>,
}

/// One compound selector, e.g. `input.big[type=text]`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Compound {
    pub tag: Option<String>,
    pub id: Option<String>,
    pub classes: Vec<String>,
    pub attrs: Vec<AttrMatch>,
    universal: bool,
}

impl Compound {
    fn is_empty(&self) -> bool {
        !self.universal
            && self.tag.is_none()
            && self.id.is_none()
            && self.classes.is_empty()
            && self.attrs.is_empty()
    }

    fn matches(&self, doc: &Document, node: NodeId) -> bool {
        let Some(tag) = doc.tag_name(node) else {
            return false;
        };
        if let Some(t) = &self.tag {
            if !t.eq_ignore_ascii_case(&tag) {
                return false;
            }
        }
        if let Some(id) = &self.id {
            if doc.get_attribute(node, "id").as_deref() != Some(id.as_str()) {
                return false;
            }
        }
        if !self.classes.is_empty() {
            let class_attr = doc.get_attribute(node, "class").unwrap_or_default();
            let has_all = self
                .classes
                .iter()
                .all(|c| class_attr.split_whitespace().any(|x| x == c));
            if !has_all {
                return false;
            }
        }
        self.attrs.iter().all(|a| match (doc.get_attribute(node, &a.name), &a.value) {
            (Some(_), None) => true,
            (Some(v), Some(want)) => v == *want,
            (None, _) => false,
        })
    }
}

/// Compound selectors joined by descendant combinators.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selector {
    pub parts: Vec<Compound>,
}

impl Selector {
    pub fn matches(&self, doc: &Document, node: NodeId) -> bool {
        let Some((last, ancestors)) = self.parts.split_last() else {
            return false;
        };
        if !last.matches(doc, node) {
            return false;
        }
        let mut cur = doc.parent(node);
        for part in ancestors.iter().rev() {
            loop {
                let Some(n) = cur else { return false };
                cur = doc.parent(n);
                if part.matches(doc, n) {
                    break;
                }
            }
        }
        true
    }
}

fn parse_attr<'i, 't>(p: &mut Parser<'i, 't>) -> Result<AttrMatch, ParseError<'i, ()>> {
    let name = p.expect_ident()?.to_ascii_lowercase();
    if p.is_exhausted() {
        return Ok(AttrMatch { name, value: None });
    }
    p.expect_delim('=')?;
    let value = p.expect_ident_or_string()?.to_string();
    Ok(AttrMatch {
        name,
        value: Some(value),
    })
}

/// Comma-separated selector alternatives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectorList {
    pub selectors: Vec<Selector>,
}

impl SelectorList {
    pub fn parse(src: &str) -> Result<Self, DomError> {
        let invalid = |reason: String| DomError::InvalidSelector {
            selector: src.to_string(),
            reason,
        };

        let mut input = ParserInput::new(src);
        let mut parser = Parser::new(&mut input);
        let mut selectors = Vec::new();
        let mut parts: Vec<Compound> = Vec::new();
        let mut current = Compound::default();

        loop {
            let token = match parser.next_including_whitespace() {
                Ok(t) => t.clone(),
                Err(_) => break,
            };
            match token {
                Token::WhiteSpace(_) => {
                    if !current.is_empty() {
                        parts.push(std::mem::take(&mut current));
                    }
                }
                Token::Comma => {
                    if !current.is_empty() {
                        parts.push(std::mem::take(&mut current));
                    }
                    if parts.is_empty() {
                        return Err(invalid("empty selector before ','".into()));
                    }
                    selectors.push(Selector {
                        parts: std::mem::take(&mut parts),
                    });
                }
                Token::Ident(name) => {
                    if !current.is_empty() {
                        return Err(invalid(format!("unexpected type selector '{}'", &*name)));
                    }
                    current.tag = Some(name.to_ascii_lowercase());
                }
                Token::Delim('*') => current.universal = true,
                Token::Delim('.') => match parser.next_including_whitespace() {
                    Ok(Token::Ident(class)) => current.classes.push(class.to_string()),
                    _ => return Err(invalid("expected class name after '.'".into())),
                },
                Token::IDHash(id) | Token::Hash(id) => current.id = Some(id.to_string()),
                Token::SquareBracketBlock => {
                    let attr = parser
                        .parse_nested_block(parse_attr)
                        .map_err(|e| invalid(format!("bad attribute selector: {:?}", e.kind)))?;
                    current.attrs.push(attr);
                }
                other => return Err(invalid(format!("unsupported token {other:?}"))),
            }
        }

        if !current.is_empty() {
            parts.push(current);
        }
        if parts.is_empty() {
            return Err(invalid("empty selector".into()));
        }
        selectors.push(Selector { parts });
        Ok(Self { selectors })
    }

    pub fn matches(&self, doc: &Document, node: NodeId) -> bool {
        self.selectors.iter().any(|s| s.matches(doc, node))
    }
}
