//! Minimal XML element tree on top of quick-xml.
//!
//! Keeps qualified names and attribute order as written, resolves namespaces so
//! callers can match on `(namespace, local name)`, and serializes back out
//! deterministically (see [`Document::to_pretty_string`]).

use crate::error::FormatError;
use encoding_rs::{Encoding, UTF_8};
use once_cell::sync::Lazy;
use quick_xml::escape::{escape, partial_escape};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use regex::Regex;

const XML_NS: &str = "http://www.w3.org/XML/1998/namespace";
const INDENT: &str = "  ";

/// How far into the document to look for the XML declaration.
const DECL_WINDOW: usize = 256;

static DECL_ENCODING: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"^\s*<\?xml[^>]*?\sencoding\s*=\s*["']([A-Za-z0-9._:-]+)["']"#)
        .expect("static regex")
});

/// Decode raw document bytes to UTF-8 text. A byte order mark wins, then the
/// `encoding` pseudo-attribute of the XML declaration, then UTF-8.
pub fn decode_document(bytes: &[u8]) -> Result<String, FormatError> {
    let (encoding, body) = match Encoding::for_bom(bytes) {
        Some((enc, bom_len)) => (enc, &bytes[bom_len..]),
        None => (declared_encoding(bytes)?, bytes),
    };
    encoding
        .decode_without_bom_handling_and_without_replacement(body)
        .map(|text| text.into_owned())
        .ok_or(FormatError::Encoding)
}

fn declared_encoding(bytes: &[u8]) -> Result<&'static Encoding, FormatError> {
    let head = String::from_utf8_lossy(&bytes[..bytes.len().min(DECL_WINDOW)]);
    match DECL_ENCODING.captures(&head) {
        Some(caps) => Encoding::for_label(caps[1].as_bytes())
            .ok_or_else(|| FormatError::UnknownEncoding(caps[1].to_string())),
        None => Ok(UTF_8),
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    Element(Element),
    Text(String),
    CData(String),
    Comment(String),
}

impl Node {
    fn is_blank_text(&self) -> bool {
        matches!(self, Node::Text(t) if t.trim().is_empty())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Element {
    /// Qualified name as it appears in the source, e.g. `trk` or `gpx:trk`.
    pub name: String,
    pub namespace: Option<String>,
    pub attributes: Vec<(String, String)>,
    pub children: Vec<Node>,
}

impl Element {
    /// A new empty element in the same namespace and with the same prefix as `self`.
    pub fn new_child(&self, local: &str) -> Element {
        let name = match self.prefix() {
            Some(prefix) => format!("{}:{}", prefix, local),
            None => local.to_string(),
        };
        Element {
            name,
            namespace: self.namespace.clone(),
            attributes: Vec::new(),
            children: Vec::new(),
        }
    }

    pub fn prefix(&self) -> Option<&str> {
        self.name.split_once(':').map(|(p, _)| p)
    }

    pub fn local_name(&self) -> &str {
        self.name.split_once(':').map(|(_, l)| l).unwrap_or(&self.name)
    }

    pub fn is(&self, local: &str, namespace: Option<&str>) -> bool {
        self.local_name() == local && self.namespace.as_deref() == namespace
    }

    pub fn attr(&self, key: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn elements(&self) -> impl Iterator<Item = &Element> {
        self.children.iter().filter_map(|n| match n {
            Node::Element(e) => Some(e),
            _ => None,
        })
    }

    /// Index into `children` of the first child element matching `local` in `namespace`.
    pub fn position(&self, local: &str, namespace: Option<&str>) -> Option<usize> {
        self.children
            .iter()
            .position(|n| matches!(n, Node::Element(e) if e.is(local, namespace)))
    }

    pub fn find(&self, local: &str, namespace: Option<&str>) -> Option<&Element> {
        self.elements().find(|e| e.is(local, namespace))
    }

    pub fn find_mut(&mut self, local: &str, namespace: Option<&str>) -> Option<&mut Element> {
        self.children.iter_mut().find_map(|n| match n {
            Node::Element(e) if e.is(local, namespace) => Some(e),
            _ => None,
        })
    }

    /// Mutable access to the element at `children[index]`.
    pub fn child_at_mut(&mut self, index: usize) -> Option<&mut Element> {
        match self.children.get_mut(index) {
            Some(Node::Element(e)) => Some(e),
            _ => None,
        }
    }

    /// Concatenated text and CDATA content of direct children.
    pub fn text(&self) -> String {
        self.children
            .iter()
            .filter_map(|n| match n {
                Node::Text(t) | Node::CData(t) => Some(t.as_str()),
                _ => None,
            })
            .collect()
    }

    /// Text content as compared against a plain value: surrounding whitespace is
    /// dropped when the element also holds comments or child elements, since
    /// pretty output puts each of those on its own line.
    pub fn value(&self) -> String {
        let text = self.text();
        if self.has_structure() {
            text.trim().to_string()
        } else {
            text
        }
    }

    pub fn set_text(&mut self, text: &str) {
        self.children = vec![Node::Text(text.to_string())];
    }

    /// All descendant elements (not including `self`) in document order.
    pub fn descendants(&self) -> Vec<&Element> {
        let mut out = Vec::new();
        collect_descendants(self, &mut out);
        out
    }

    fn has_structure(&self) -> bool {
        self.children
            .iter()
            .any(|n| matches!(n, Node::Element(_) | Node::Comment(_)))
    }
}

fn collect_descendants<'a>(el: &'a Element, out: &mut Vec<&'a Element>) {
    for child in el.elements() {
        out.push(child);
        collect_descendants(child, out);
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub root: Element,
}

type Scope = Vec<(Option<String>, String)>;

impl Document {
    /// Parse a complete document. Prolog content (declaration, doctype, processing
    /// instructions, comments outside the root) is not retained.
    pub fn parse(xml: &str) -> Result<Self, FormatError> {
        let xml = xml.strip_prefix('\u{feff}').unwrap_or(xml);
        let mut reader = Reader::from_str(xml);

        let mut stack: Vec<Element> = Vec::new();
        let mut scopes: Vec<Scope> = Vec::new();
        let mut root: Option<Element> = None;

        loop {
            let position = reader.buffer_position();
            let event = reader
                .read_event()
                .map_err(|e| xml_error(position, e))?;
            match event {
                Event::Start(ref e) | Event::Empty(ref e) => {
                    if root.is_some() && stack.is_empty() {
                        return Err(FormatError::TrailingContent);
                    }
                    let el = open_element(e, &mut scopes, position)?;
                    if matches!(event, Event::Start(_)) {
                        stack.push(el);
                    } else {
                        scopes.pop();
                        attach(el, &mut stack, &mut root);
                    }
                }
                Event::End(_) => {
                    let el = stack.pop().ok_or_else(|| FormatError::Xml {
                        position,
                        message: "closing tag without matching opening tag".to_string(),
                    })?;
                    scopes.pop();
                    attach(el, &mut stack, &mut root);
                }
                Event::Text(t) => {
                    let text = t.unescape().map_err(|e| xml_error(position, e))?;
                    match stack.last_mut() {
                        Some(parent) => parent.children.push(Node::Text(text.into_owned())),
                        None if text.trim().is_empty() => {}
                        None if root.is_some() => return Err(FormatError::TrailingContent),
                        None => {
                            return Err(FormatError::Xml {
                                position,
                                message: "text before the root element".to_string(),
                            })
                        }
                    }
                }
                Event::CData(c) => {
                    let text = String::from_utf8(c.into_inner().into_owned())
                        .map_err(|_| FormatError::Encoding)?;
                    match stack.last_mut() {
                        Some(parent) => parent.children.push(Node::CData(text)),
                        None => return Err(FormatError::TrailingContent),
                    }
                }
                Event::Comment(c) => {
                    if let Some(parent) = stack.last_mut() {
                        let text =
                            std::str::from_utf8(&c).map_err(|_| FormatError::Encoding)?;
                        parent.children.push(Node::Comment(text.to_string()));
                    }
                }
                Event::Decl(_) | Event::PI(_) | Event::DocType(_) => {}
                Event::Eof => break,
            }
        }

        if let Some(open) = stack.last() {
            return Err(FormatError::Xml {
                position: xml.len(),
                message: format!("unexpected end of document, <{}> is not closed", open.name),
            });
        }
        root.map(|root| Document { root }).ok_or(FormatError::NoRoot)
    }

    /// Deterministic output: XML declaration, every element's children two spaces
    /// deeper than the element, no blank lines, text-only elements kept inline,
    /// trailing newline. Whitespace-only text between elements is not preserved,
    /// which makes the output a fixed point of parse-then-serialize.
    pub fn to_pretty_string(&self) -> String {
        let mut out = String::from("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n");
        write_pretty(&self.root, 0, &mut out);
        out.push('\n');
        out
    }

    /// Serialize without re-indenting; existing whitespace text is written back as-is.
    pub fn to_raw_string(&self) -> String {
        let mut out = String::from("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n");
        write_raw(&self.root, &mut out);
        out.push('\n');
        out
    }
}

fn attach(el: Element, stack: &mut [Element], root: &mut Option<Element>) {
    match stack.last_mut() {
        Some(parent) => parent.children.push(Node::Element(el)),
        None => *root = Some(el),
    }
}

fn xml_error(position: usize, err: impl std::fmt::Display) -> FormatError {
    FormatError::Xml {
        position,
        message: err.to_string(),
    }
}

fn open_element(
    e: &BytesStart<'_>,
    scopes: &mut Vec<Scope>,
    position: usize,
) -> Result<Element, FormatError> {
    let name = std::str::from_utf8(e.name().as_ref())
        .map_err(|_| FormatError::Encoding)?
        .to_string();

    let mut attributes = Vec::new();
    let mut scope: Scope = Vec::new();
    for attr in e.attributes() {
        let attr = attr.map_err(|err| xml_error(position, err))?;
        let key = std::str::from_utf8(attr.key.as_ref())
            .map_err(|_| FormatError::Encoding)?
            .to_string();
        let value = attr
            .unescape_value()
            .map_err(|err| xml_error(position, err))?
            .into_owned();
        if key == "xmlns" {
            scope.push((None, value.clone()));
        } else if let Some(prefix) = key.strip_prefix("xmlns:") {
            scope.push((Some(prefix.to_string()), value.clone()));
        }
        attributes.push((key, value));
    }
    scopes.push(scope);

    let prefix = name.split_once(':').map(|(p, _)| p);
    let namespace = resolve_namespace(prefix, scopes);
    if prefix.is_some() && prefix != Some("xml") && namespace.is_none() {
        return Err(FormatError::Xml {
            position,
            message: format!("undeclared namespace prefix in <{}>", name),
        });
    }

    Ok(Element {
        name,
        namespace,
        attributes,
        children: Vec::new(),
    })
}

fn resolve_namespace(prefix: Option<&str>, scopes: &[Scope]) -> Option<String> {
    if prefix == Some("xml") {
        return Some(XML_NS.to_string());
    }
    scopes
        .iter()
        .rev()
        .flat_map(|scope| scope.iter().rev())
        .find(|(p, _)| p.as_deref() == prefix)
        .and_then(|(_, uri)| (!uri.is_empty()).then(|| uri.clone()))
}

fn write_start(el: &Element, out: &mut String) {
    out.push('<');
    out.push_str(&el.name);
    for (key, value) in &el.attributes {
        out.push(' ');
        out.push_str(key);
        out.push_str("=\"");
        out.push_str(&escape(value.as_str()));
        out.push('"');
    }
}

fn write_leaf_node(node: &Node, out: &mut String) {
    match node {
        Node::Text(t) => out.push_str(&partial_escape(t.as_str())),
        Node::CData(t) => {
            out.push_str("<![CDATA[");
            out.push_str(t);
            out.push_str("]]>");
        }
        Node::Comment(t) => {
            out.push_str("<!--");
            out.push_str(t);
            out.push_str("-->");
        }
        Node::Element(e) => write_raw(e, out),
    }
}

fn write_pretty(el: &Element, depth: usize, out: &mut String) {
    let indent = INDENT.repeat(depth);
    out.push_str(&indent);
    write_start(el, out);

    if el.children.is_empty() {
        out.push_str("/>");
        return;
    }

    if !el.has_structure() {
        out.push('>');
        for child in &el.children {
            write_leaf_node(child, out);
        }
    } else {
        out.push('>');
        let child_indent = INDENT.repeat(depth + 1);
        for child in el.children.iter().filter(|n| !n.is_blank_text()) {
            out.push('\n');
            match child {
                Node::Element(e) => write_pretty(e, depth + 1, out),
                Node::Text(t) => {
                    out.push_str(&child_indent);
                    out.push_str(&partial_escape(t.trim()));
                }
                other => {
                    out.push_str(&child_indent);
                    write_leaf_node(other, out);
                }
            }
        }
        out.push('\n');
        out.push_str(&indent);
    }

    out.push_str("</");
    out.push_str(&el.name);
    out.push('>');
}

fn write_raw(el: &Element, out: &mut String) {
    write_start(el, out);
    if el.children.is_empty() {
        out.push_str("/>");
        return;
    }
    out.push('>');
    for child in &el.children {
        write_leaf_node(child, out);
    }
    out.push_str("</");
    out.push_str(&el.name);
    out.push('>');
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_resolves_default_and_prefixed_namespaces() {
        let doc = Document::parse(
            r#"<?xml version="1.0"?>
<a xmlns="urn:a" xmlns:x="urn:x"><x:b attr="1 &amp; 2"/><c>hi</c></a>"#,
        )
        .unwrap();
        assert_eq!(doc.root.namespace.as_deref(), Some("urn:a"));
        let b = doc.root.find("b", Some("urn:x")).unwrap();
        assert_eq!(b.name, "x:b");
        assert_eq!(b.attr("attr"), Some("1 & 2"));
        assert_eq!(doc.root.find("c", Some("urn:a")).unwrap().text(), "hi");
        assert!(doc.root.find("c", None).is_none());
    }

    #[test]
    fn test_pretty_output_is_a_fixed_point() {
        let src = "<a>\n\n\n<b>x &lt; y</b>   <c><d/></c><!-- note --><e></e></a>";
        let once = Document::parse(src).unwrap().to_pretty_string();
        assert_eq!(
            once,
            "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<a>\n  <b>x &lt; y</b>\n  <c>\n    <d/>\n  </c>\n  <!-- note -->\n  <e/>\n</a>\n"
        );
        let twice = Document::parse(&once).unwrap().to_pretty_string();
        assert_eq!(once, twice);
    }

    #[test]
    fn test_malformed_documents_are_rejected() {
        assert!(Document::parse("<a><b></a>").is_err());
        assert!(Document::parse("<a>").is_err());
        assert!(matches!(Document::parse(""), Err(FormatError::NoRoot)));
        assert!(matches!(
            Document::parse("<a/><b/>"),
            Err(FormatError::TrailingContent)
        ));
        assert!(Document::parse("<p:a/>").is_err());
    }

    #[test]
    fn test_value_ignores_layout_around_comments() {
        let doc = Document::parse("<r><t>\n  2026 <!-- c -->\n</t><u> x </u></r>").unwrap();
        assert_eq!(doc.root.find("t", None).unwrap().value(), "2026");
        assert_eq!(doc.root.find("u", None).unwrap().value(), " x ");
    }

    #[test]
    fn test_decode_follows_declared_encoding() {
        let latin1 = b"<?xml version=\"1.0\" encoding=\"ISO-8859-1\"?><a>Caf\xe9</a>";
        assert_eq!(
            decode_document(latin1).unwrap(),
            "<?xml version=\"1.0\" encoding=\"ISO-8859-1\"?><a>Caf\u{e9}</a>"
        );
        assert_eq!(decode_document("<a>é</a>".as_bytes()).unwrap(), "<a>é</a>");
        assert_eq!(decode_document(b"\xef\xbb\xbf<a/>").unwrap(), "<a/>");
    }

    #[test]
    fn test_decode_rejects_bad_bytes_and_unknown_labels() {
        assert!(matches!(
            decode_document(b"<a>\xe9</a>"),
            Err(FormatError::Encoding)
        ));
        assert!(matches!(
            decode_document(b"<?xml version='1.0' encoding='x-klingon'?><a/>"),
            Err(FormatError::UnknownEncoding(label)) if label == "x-klingon"
        ));
    }

    #[test]
    fn test_descendants_in_document_order() {
        let doc = Document::parse("<r><a><b/></a><c/></r>").unwrap();
        let names: Vec<&str> = doc.root.descendants().iter().map(|e| e.local_name()).collect();
        assert_eq!(names, vec!["a", "b", "c"]);
    }
}
