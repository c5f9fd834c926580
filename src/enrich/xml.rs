//! Minimal element tree over `quick-xml` events, with just enough path lookup
//! for the API responses: `find("statistics/ratings/average")` walks direct
//! children one tag at a time.

use anyhow::{anyhow, bail, Context, Result};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Element {
    pub tag: String,
    pub attrs: Vec<(String, String)>,
    /// Concatenated character data directly inside this element, trimmed.
    pub text: String,
    pub children: Vec<Element>,
}

impl Element {
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn has_attr(&self, name: &str) -> bool {
        self.attrs.iter().any(|(k, _)| k == name)
    }

    /// All elements reached by following `path` through direct children.
    pub fn find_all<'a>(&'a self, path: &str) -> Vec<&'a Element> {
        let mut current = vec![self];
        for step in path.split('/').filter(|s| !s.is_empty()) {
            current = current
                .into_iter()
                .flat_map(|el| el.children.iter().filter(move |c| c.tag == step))
                .collect();
        }
        current
    }

    pub fn find<'a>(&'a self, path: &str) -> Option<&'a Element> {
        self.find_all(path).into_iter().next()
    }
}

fn decode_start(e: &BytesStart<'_>) -> Result<Element> {
    let tag = String::from_utf8_lossy(e.name().as_ref()).into_owned();
    let mut attrs = Vec::new();
    for attr in e.attributes() {
        let attr = attr.with_context(|| format!("attribute of <{tag}>"))?;
        let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
        let value = match attr.unescape_value() {
            Ok(v) => v.into_owned(),
            Err(_) => String::from_utf8_lossy(&attr.value).into_owned(),
        };
        attrs.push((key, value));
    }
    Ok(Element {
        tag,
        attrs,
        ..Element::default()
    })
}

/// Parse a whole document and return its root element.
pub fn parse_document(xml: &[u8]) -> Result<Element> {
    let text = String::from_utf8_lossy(xml);
    let mut reader = Reader::from_str(&text);
    reader.config_mut().trim_text(true);

    let mut stack: Vec<Element> = Vec::new();
    let mut root: Option<Element> = None;

    let mut attach = |stack: &mut Vec<Element>, el: Element| -> Result<()> {
        match stack.last_mut() {
            Some(parent) => parent.children.push(el),
            None if root.is_none() => root = Some(el),
            None => bail!("second root element <{}>", el.tag),
        }
        Ok(())
    };

    loop {
        let pos = reader.buffer_position();
        match reader
            .read_event()
            .with_context(|| format!("malformed XML near byte {pos}"))?
        {
            Event::Start(e) => stack.push(decode_start(&e)?),
            Event::Empty(e) => {
                let el = decode_start(&e)?;
                attach(&mut stack, el)?;
            }
            Event::End(_) => {
                let el = stack
                    .pop()
                    .ok_or_else(|| anyhow!("unbalanced end tag near byte {pos}"))?;
                attach(&mut stack, el)?;
            }
            Event::Text(t) => {
                if let Some(el) = stack.last_mut() {
                    match t.unescape() {
                        Ok(s) => el.text.push_str(&s),
                        Err(_) => el.text.push_str(&String::from_utf8_lossy(&t)),
                    }
                }
            }
            Event::CData(c) => {
                if let Some(el) = stack.last_mut() {
                    el.text.push_str(&String::from_utf8_lossy(&c));
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if let Some(open) = stack.last() {
        bail!("unclosed element <{}>", open.tag);
    }
    root.ok_or_else(|| anyhow!("empty XML document"))
}

#[cfg(test)]
mod tests {
    use super::*;

    const DOC: &[u8] = br#"<?xml version="1.0" encoding="utf-8"?>
<boardgames termsofuse="https://boardgamegeek.com/xmlapi/termsofuse">
  <boardgame objectid="13">
    <name sortindex="1">Die Siedler von Catan</name>
    <name primary="true" sortindex="1">CATAN</name>
    <boardgamemechanic objectid="2072">Dice Rolling</boardgamemechanic>
    <boardgamemechanic objectid="2040">Hexagon Grid</boardgamemechanic>
    <statistics page="1">
      <ratings>
        <average>7.10</average>
        <owned>230000</owned>
      </ratings>
    </statistics>
    <description>Trade &amp; build</description>
    <note><![CDATA[<b>roads</b>]]></note>
    <thumbnail/>
  </boardgame>
</boardgames>"#;

    #[test]
    fn builds_tree_and_follows_paths() {
        let root = parse_document(DOC).unwrap();
        assert_eq!(root.tag, "boardgames");
        let game = root.find("boardgame").unwrap();
        assert_eq!(game.attr("objectid"), Some("13"));
        assert_eq!(
            game.find("statistics/ratings/average").map(|e| e.text.as_str()),
            Some("7.10")
        );
        let mechanics: Vec<&str> = game
            .find_all("boardgamemechanic")
            .iter()
            .map(|e| e.text.as_str())
            .collect();
        assert_eq!(mechanics, ["Dice Rolling", "Hexagon Grid"]);
        assert!(game.find_all("name")[1].has_attr("primary"));
        assert!(game.find("ratings").is_none());
        assert_eq!(game.find("thumbnail").map(|e| e.text.as_str()), Some(""));
    }

    #[test]
    fn unescapes_text_and_keeps_cdata() {
        let root = parse_document(DOC).unwrap();
        let game = root.find("boardgame").unwrap();
        assert_eq!(game.find("description").unwrap().text, "Trade & build");
        assert_eq!(game.find("note").unwrap().text, "<b>roads</b>");
    }

    #[test]
    fn rejects_truncated_documents() {
        assert!(parse_document(b"<boardgames><boardgame objectid=\"1\">").is_err());
        assert!(parse_document(b"").is_err());
    }
}
