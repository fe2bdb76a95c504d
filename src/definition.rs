//! Story definition parser.
//!
//! A story folder's `index.xml` names the story, describes it and lists its
//! pictures in reading order:
//!
//! ```xml
//! <story date="2019-08-14">
//!   <title>Iceland</title>
//!   <description><p>Ten days <em>around the ring road</em>.</p></description>
//!   <pic src="IMG_0412">Arriving at <strong>Keflavík</strong>.</pic>
//!   <note>The weather turned on day three.</note>
//!   <pic src="IMG_0413" indexpic="y"/>
//! </story>
//! ```
//!
//! Description, caption and note markup is kept byte-for-byte as written
//! (entities and all), so authors can use any inline HTML the templates
//! allow. Structure is checked here; whether the pictures exist is the
//! compiler's business.

use chrono::NaiveDate;
use roxmltree::{Document, Node};
use thiserror::Error;

const DATE_FORMAT: &str = "%Y-%m-%d";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DefinitionError {
    #[error("Story definition is not valid UTF-8")]
    Encoding,
    #[error("Story definition is not well-formed: {0}")]
    Xml(String),
    #[error("Date invalid: '{0}'")]
    InvalidDate(String),
    #[error("Expected exactly one title, found {0}")]
    TitleCount(usize),
    #[error("Unable to obtain title text")]
    EmptyTitle,
    #[error("Expected exactly one description, found {0}")]
    DescriptionCount(usize),
    #[error("Picture element without src attribute")]
    MissingPictureSource,
    #[error("More than one picture is marked as the index picture")]
    MultipleIndexPictures,
    #[error("Story has no pictures")]
    NoPictures,
}

/// A picture reference from the definition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PictureDecl {
    /// Filename stem; the file is `<src>.jpg` in the story folder.
    pub src: String,
    /// Marked with `indexpic="y"`.
    pub index: bool,
    pub caption: Option<String>,
}

/// One item of the story body, in document order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Block {
    Picture(PictureDecl),
    Note(String),
}

/// A parsed and structurally valid story definition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoryDefinition {
    pub date: Option<NaiveDate>,
    pub title: String,
    /// Description markup.
    pub description: String,
    pub body: Vec<Block>,
}

impl StoryDefinition {
    pub fn pictures(&self) -> impl Iterator<Item = &PictureDecl> {
        self.body.iter().filter_map(|b| match b {
            Block::Picture(p) => Some(p),
            Block::Note(_) => None,
        })
    }
}

/// Parse raw definition bytes.
pub fn parse(raw: &[u8]) -> Result<StoryDefinition, DefinitionError> {
    let text = std::str::from_utf8(raw).map_err(|_| DefinitionError::Encoding)?;
    let doc = Document::parse(text).map_err(|e| DefinitionError::Xml(e.to_string()))?;
    let root = doc.root_element();

    let date = match root.attribute("date") {
        Some(value) => Some(
            NaiveDate::parse_from_str(value, DATE_FORMAT)
                .map_err(|_| DefinitionError::InvalidDate(value.to_string()))?,
        ),
        None => None,
    };

    let titles = elements_named(&doc, "title");
    if titles.len() != 1 {
        return Err(DefinitionError::TitleCount(titles.len()));
    }
    let title = titles[0]
        .first_child()
        .filter(|n| n.is_text())
        .and_then(|n| n.text())
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or(DefinitionError::EmptyTitle)?
        .to_string();

    let descriptions = elements_named(&doc, "description");
    if descriptions.len() != 1 {
        return Err(DefinitionError::DescriptionCount(descriptions.len()));
    }
    let description = inner_markup(text, descriptions[0]);

    let mut body = Vec::new();
    for node in root.descendants().filter(Node::is_element) {
        match node.tag_name().name() {
            "pic" => {
                let src = node
                    .attribute("src")
                    .ok_or(DefinitionError::MissingPictureSource)?;
                let caption = inner_markup(text, node);
                body.push(Block::Picture(PictureDecl {
                    src: src.to_string(),
                    index: node.attribute("indexpic") == Some("y"),
                    caption: (!caption.is_empty()).then_some(caption),
                }));
            }
            "note" => body.push(Block::Note(inner_markup(text, node))),
            _ => {}
        }
    }

    let definition = StoryDefinition {
        date,
        title,
        description,
        body,
    };
    let index_count = definition.pictures().filter(|p| p.index).count();
    if index_count > 1 {
        return Err(DefinitionError::MultipleIndexPictures);
    }
    if definition.pictures().next().is_none() {
        return Err(DefinitionError::NoPictures);
    }
    Ok(definition)
}

fn elements_named<'a, 'input>(doc: &'a Document<'input>, name: &str) -> Vec<Node<'a, 'input>> {
    doc.descendants()
        .filter(|n| n.is_element() && n.tag_name().name() == name)
        .collect()
}

/// Source text between an element's start and end tags, trimmed.
fn inner_markup(text: &str, node: Node<'_, '_>) -> String {
    match (node.first_child(), node.last_child()) {
        (Some(first), Some(last)) => text[first.range().start..last.range().end]
            .trim()
            .to_string(),
        _ => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FULL: &str = r#"<story date="2019-08-14">
  <title>Iceland</title>
  <description><p>Ten days <em>around</em> &amp; about.</p></description>
  <pic src="IMG_0412">Arriving at <strong>Keflavik</strong>.</pic>
  <note>The weather turned.</note>
  <pic src="IMG_0413" indexpic="y"/>
</story>"#;

    fn story(inner: &str) -> String {
        format!("<story>{inner}</story>")
    }

    #[test]
    fn parses_full_definition() {
        let def = parse(FULL.as_bytes()).unwrap();
        assert_eq!(def.date, NaiveDate::from_ymd_opt(2019, 8, 14));
        assert_eq!(def.title, "Iceland");
        assert_eq!(
            def.description,
            "<p>Ten days <em>around</em> &amp; about.</p>"
        );
        assert_eq!(
            def.body,
            vec![
                Block::Picture(PictureDecl {
                    src: "IMG_0412".into(),
                    index: false,
                    caption: Some("Arriving at <strong>Keflavik</strong>.".into()),
                }),
                Block::Note("The weather turned.".into()),
                Block::Picture(PictureDecl {
                    src: "IMG_0413".into(),
                    index: true,
                    caption: None,
                }),
            ]
        );
    }

    #[test]
    fn date_is_optional() {
        let xml = story("<title>T</title><description/><pic src=\"a\"/>");
        let def = parse(xml.as_bytes()).unwrap();
        assert_eq!(def.date, None);
        assert_eq!(def.description, "");
    }

    #[test]
    fn invalid_date_rejected() {
        let xml = r#"<story date="14/08/2019"><title>T</title><description/><pic src="a"/></story>"#;
        assert_eq!(
            parse(xml.as_bytes()),
            Err(DefinitionError::InvalidDate("14/08/2019".into()))
        );
    }

    #[test]
    fn zero_titles_rejected() {
        let xml = story("<description/><pic src=\"a\"/>");
        assert_eq!(parse(xml.as_bytes()), Err(DefinitionError::TitleCount(0)));
    }

    #[test]
    fn two_titles_rejected() {
        let xml = story("<title>A</title><title>B</title><description/><pic src=\"a\"/>");
        assert_eq!(parse(xml.as_bytes()), Err(DefinitionError::TitleCount(2)));
    }

    #[test]
    fn empty_title_rejected() {
        let xml = story("<title>  </title><description/><pic src=\"a\"/>");
        assert_eq!(parse(xml.as_bytes()), Err(DefinitionError::EmptyTitle));

        let xml = story("<title><b>x</b></title><description/><pic src=\"a\"/>");
        assert_eq!(parse(xml.as_bytes()), Err(DefinitionError::EmptyTitle));
    }

    #[test]
    fn title_is_trimmed() {
        let xml = story("<title>\n  Iceland \n</title><description/><pic src=\"a\"/>");
        assert_eq!(parse(xml.as_bytes()).unwrap().title, "Iceland");
    }

    #[test]
    fn description_count_enforced() {
        let xml = story("<title>T</title><pic src=\"a\"/>");
        assert_eq!(
            parse(xml.as_bytes()),
            Err(DefinitionError::DescriptionCount(0))
        );
        let xml = story("<title>T</title><description/><description/><pic src=\"a\"/>");
        assert_eq!(
            parse(xml.as_bytes()),
            Err(DefinitionError::DescriptionCount(2))
        );
    }

    #[test]
    fn no_pictures_rejected() {
        let xml = story("<title>T</title><description/>");
        assert_eq!(parse(xml.as_bytes()), Err(DefinitionError::NoPictures));
    }

    #[test]
    fn multiple_index_pictures_rejected() {
        let xml = story(
            "<title>T</title><description/><pic src=\"a\" indexpic=\"y\"/><pic src=\"b\" indexpic=\"y\"/>",
        );
        assert_eq!(
            parse(xml.as_bytes()),
            Err(DefinitionError::MultipleIndexPictures)
        );
    }

    #[test]
    fn pic_without_src_rejected() {
        let xml = story("<title>T</title><description/><pic/>");
        assert_eq!(
            parse(xml.as_bytes()),
            Err(DefinitionError::MissingPictureSource)
        );
    }

    #[test]
    fn malformed_xml_rejected() {
        assert!(matches!(
            parse(b"<story><title>T</story>"),
            Err(DefinitionError::Xml(_))
        ));
        assert_eq!(parse(&[0xFF, 0xFE, 0x00]), Err(DefinitionError::Encoding));
    }
}
