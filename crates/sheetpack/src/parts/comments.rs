use super::xml::{
    expect_root, needs_space_preserve, parse_u32_attr, required_attr, write_attr, write_attrs,
    write_nodes, XmlElement, XmlError, XmlNode, SPREADSHEETML_NS, XML_HEADER,
};
use super::{PartCodec, PartKind};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Comment {
    pub reference: String,
    pub author_id: u32,
    /// The `<text>` element, runs included.
    pub text: XmlElement,
    /// Attributes other than `ref`/`authorId` (`shapeId`, `xr:uid`).
    attrs: Vec<(String, String)>,
    /// Children after `<text>` (`commentPr`).
    extra: Vec<XmlNode>,
}

impl Comment {
    pub fn plain_text(&self) -> String {
        self.text.text_content()
    }
}

/// `xl/commentsN.xml`.
///
/// Root attributes, per-comment attributes and unknown children (`extLst`) are carried through.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Comments {
    root_name: String,
    root_attrs: Vec<(String, String)>,
    prefix: String,
    pub authors: Vec<String>,
    pub comments: Vec<Comment>,
    trailing: Vec<XmlNode>,
}

impl Default for Comments {
    fn default() -> Self {
        Self {
            root_name: "comments".to_string(),
            root_attrs: vec![("xmlns".to_string(), SPREADSHEETML_NS.to_string())],
            prefix: String::new(),
            authors: Vec::new(),
            comments: Vec::new(),
            trailing: Vec::new(),
        }
    }
}

impl Comments {
    pub fn get(&self, reference: &str) -> Option<&Comment> {
        self.comments
            .iter()
            .find(|c| c.reference.eq_ignore_ascii_case(reference))
    }

    /// Add or replace the plain-text comment on `reference`.
    ///
    /// Replacing keeps the existing comment's attributes and extra children.
    pub fn set(&mut self, reference: &str, author: &str, text: &str) {
        let author_id = match self.authors.iter().position(|a| a == author) {
            Some(idx) => idx as u32,
            None => {
                self.authors.push(author.to_string());
                (self.authors.len() - 1) as u32
            }
        };

        let mut t = XmlElement::new(format!("{}t", self.prefix));
        if !text.is_empty() {
            t.children.push(XmlNode::Text(text.to_string()));
        }
        if needs_space_preserve(text) {
            t.set_attr("xml:space", "preserve");
        }
        let text = XmlElement::new(format!("{}text", self.prefix)).with_child(t);

        match self
            .comments
            .iter_mut()
            .find(|c| c.reference.eq_ignore_ascii_case(reference))
        {
            Some(existing) => {
                existing.reference = reference.to_string();
                existing.author_id = author_id;
                existing.text = text;
            }
            None => self.comments.push(Comment {
                reference: reference.to_string(),
                author_id,
                text,
                attrs: Vec::new(),
                extra: Vec::new(),
            }),
        }
    }

    pub fn remove(&mut self, reference: &str) -> Option<Comment> {
        let idx = self
            .comments
            .iter()
            .position(|c| c.reference.eq_ignore_ascii_case(reference))?;
        Some(self.comments.remove(idx))
    }

    fn open_tag(&self, xml: &mut String, local: &str) {
        xml.push('<');
        xml.push_str(&self.prefix);
        xml.push_str(local);
    }

    fn close_tag(&self, xml: &mut String, local: &str) {
        xml.push_str("</");
        xml.push_str(&self.prefix);
        xml.push_str(local);
        xml.push('>');
    }
}

fn parse_comment(c: &XmlElement) -> Result<Comment, XmlError> {
    let mut text = None;
    let mut extra = Vec::new();
    for node in &c.children {
        match node {
            XmlNode::Element(el) if text.is_none() && el.local_name() == "text" => {
                text = Some(el.clone());
            }
            XmlNode::Element(_) => extra.push(node.clone()),
            XmlNode::Text(_) => {}
        }
    }
    Ok(Comment {
        reference: required_attr(c, "comment", "ref")?.to_string(),
        author_id: parse_u32_attr("authorId", required_attr(c, "comment", "authorId")?)?,
        text: text.unwrap_or_else(|| XmlElement::new("text")),
        attrs: c
            .attrs
            .iter()
            .filter(|(k, _)| k != "ref" && k != "authorId")
            .cloned()
            .collect(),
        extra,
    })
}

impl PartCodec for Comments {
    const KIND: PartKind = PartKind::Comments;

    fn decode(bytes: &[u8]) -> Result<Self, XmlError> {
        let root = XmlElement::parse(bytes)?;
        expect_root(&root, "comments")?;

        let prefix = root
            .name
            .strip_suffix("comments")
            .unwrap_or_default()
            .to_string();
        let mut out = Self {
            root_name: root.name,
            root_attrs: root.attrs,
            prefix,
            ..Self::default()
        };
        for node in root.children {
            match node {
                XmlNode::Element(el) if el.local_name() == "authors" => {
                    out.authors
                        .extend(el.children_named("author").map(XmlElement::text_content));
                }
                XmlNode::Element(el) if el.local_name() == "commentList" => {
                    for c in el.children_named("comment") {
                        out.comments.push(parse_comment(c)?);
                    }
                }
                other => out.trailing.push(other),
            }
        }
        Ok(out)
    }

    fn encode(&self) -> Result<Vec<u8>, XmlError> {
        let mut xml = String::from(XML_HEADER);
        xml.push('\n');
        xml.push('<');
        xml.push_str(&self.root_name);
        write_attrs(&mut xml, &self.root_attrs);
        xml.push('>');

        self.open_tag(&mut xml, "authors");
        xml.push('>');
        for author in &self.authors {
            XmlElement::new(format!("{}author", self.prefix))
                .with_text(author.as_str())
                .write_xml(&mut xml);
        }
        self.close_tag(&mut xml, "authors");

        self.open_tag(&mut xml, "commentList");
        xml.push('>');
        for comment in &self.comments {
            if comment.author_id as usize >= self.authors.len() {
                return Err(XmlError::Invalid(format!(
                    "comment {} refers to missing author {}",
                    comment.reference, comment.author_id
                )));
            }
            self.open_tag(&mut xml, "comment");
            write_attr(&mut xml, "ref", &comment.reference);
            write_attr(&mut xml, "authorId", &comment.author_id.to_string());
            write_attrs(&mut xml, &comment.attrs);
            xml.push('>');
            comment.text.write_xml(&mut xml);
            write_nodes(&mut xml, &comment.extra);
            self.close_tag(&mut xml, "comment");
        }
        self.close_tag(&mut xml, "commentList");

        write_nodes(&mut xml, &self.trailing);
        xml.push_str("</");
        xml.push_str(&self.root_name);
        xml.push('>');
        Ok(xml.into_bytes())
    }

    fn is_omitted(&self) -> bool {
        self.comments.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const SAMPLE: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<comments xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main">
  <authors><author>Ann</author><author>Bo</author></authors>
  <commentList>
    <comment ref="B2" authorId="1"><text><r><rPr><b/></rPr><t>Bo:</t></r><r><t xml:space="preserve"> check this</t></r></text></comment>
  </commentList>
</comments>"#;

    #[test]
    fn decodes_authors_and_rich_text() {
        let comments = Comments::decode(SAMPLE.as_bytes()).unwrap();
        assert_eq!(comments.authors, vec!["Ann", "Bo"]);
        let c = comments.get("b2").unwrap();
        assert_eq!(c.author_id, 1);
        assert_eq!(c.plain_text(), "Bo: check this");
    }

    #[test]
    fn set_reuses_authors_and_replaces_existing() {
        let mut comments = Comments::decode(SAMPLE.as_bytes()).unwrap();
        comments.set("B2", "Ann", "replaced");
        comments.set("C3", "Cy", "new");
        assert_eq!(comments.authors, vec!["Ann", "Bo", "Cy"]);
        assert_eq!(comments.get("B2").unwrap().plain_text(), "replaced");
        assert_eq!(comments.get("C3").unwrap().author_id, 2);
    }

    #[test]
    fn encode_round_trips() {
        let mut comments = Comments::decode(SAMPLE.as_bytes()).unwrap();
        comments.set("A1", "Ann", " lead");
        let encoded = comments.encode().unwrap();
        assert_eq!(Comments::decode(&encoded).unwrap(), comments);
    }

    #[test]
    fn dangling_author_fails_to_encode() {
        let mut comments = Comments::default();
        comments.set("A1", "Ann", "x");
        comments.authors.clear();
        assert!(matches!(comments.encode(), Err(XmlError::Invalid(_))));
    }

    #[test]
    fn removing_last_comment_omits_the_part() {
        let mut comments = Comments::decode(SAMPLE.as_bytes()).unwrap();
        assert!(comments.remove("B2").is_some());
        assert!(comments.is_omitted());
    }

    const THREADED: &str = r#"<comments xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main" xmlns:mc="http://schemas.openxmlformats.org/markup-compatibility/2006" mc:Ignorable="xr" xmlns:xr="http://schemas.microsoft.com/office/spreadsheetml/2014/revision"><authors><author>tc={7A}</author></authors><commentList><comment ref="A1" authorId="0" shapeId="0" xr:uid="{7A}"><text><t>note</t></text><commentPr locked="0"/></comment></commentList><extLst><ext uri="{1}"/></extLst></comments>"#;

    #[test]
    fn keeps_attributes_and_extensions() {
        let mut comments = Comments::decode(THREADED.as_bytes()).unwrap();
        comments.set("A1", "tc={7A}", "edited");
        let encoded = String::from_utf8(comments.encode().unwrap()).unwrap();
        assert!(encoded.contains(r#"mc:Ignorable="xr""#), "{encoded}");
        assert!(
            encoded.contains(r#"<comment ref="A1" authorId="0" shapeId="0" xr:uid="{7A}"><text><t>edited</t></text><commentPr locked="0"/></comment>"#),
            "{encoded}"
        );
        assert!(encoded.contains(r#"</commentList><extLst><ext uri="{1}"/></extLst></comments>"#));
        assert_eq!(Comments::decode(encoded.as_bytes()).unwrap(), comments);
    }

    #[test]
    fn prefixed_comments_keep_their_prefix() {
        let xml = r#"<x:comments xmlns:x="http://schemas.openxmlformats.org/spreadsheetml/2006/main"><x:authors><x:author>Ann</x:author></x:authors><x:commentList><x:comment ref="A1" authorId="0"><x:text><x:t>hi</x:t></x:text></x:comment></x:commentList></x:comments>"#;
        let mut comments = Comments::decode(xml.as_bytes()).unwrap();
        assert_eq!(comments.get("A1").unwrap().plain_text(), "hi");
        comments.set("B1", "Ann", "new");
        let encoded = String::from_utf8(comments.encode().unwrap()).unwrap();
        assert!(encoded.contains("<x:authors><x:author>Ann</x:author></x:authors>"), "{encoded}");
        assert!(
            encoded.contains(r#"<x:comment ref="B1" authorId="0"><x:text><x:t>new</x:t></x:text></x:comment></x:commentList></x:comments>"#),
            "{encoded}"
        );
        assert!(!encoded.contains("<comment "));
    }
}
