//! Node arena, parser and serializer.

use super::path::{NodeTest, Predicate, XmlPath};
use super::{XmlError, XmlResult};
use quick_xml::escape::{escape, partial_escape};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

/// Handle to one node inside an `XmlDocument`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

impl NodeId {
    /// Arena slot, stable for the lifetime of the document.
    pub fn index(self) -> usize {
        self.0
    }
}

/// One `name="value"` pair. Order inside an element is significant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
    pub name: String,
    pub value: String,
}

impl Attribute {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Element {
    /// Qualified name as written (`prefix:local` or `local`).
    pub name: String,
    pub attributes: Vec<Attribute>,
}

/// Node payload. Raw kinds keep their source text without delimiters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeKind {
    Document,
    Element(Element),
    /// Unescaped character data.
    Text(String),
    CData(String),
    Comment(String),
    ProcessingInstruction(String),
    Declaration(String),
    DocType(String),
}

#[derive(Debug, Clone)]
struct NodeData {
    kind: NodeKind,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
}

/// Mutable XML tree that round-trips untouched nodes.
#[derive(Debug, Clone)]
pub struct XmlDocument {
    nodes: Vec<NodeData>,
    root: NodeId,
}

impl Default for XmlDocument {
    fn default() -> Self {
        Self::new()
    }
}

impl XmlDocument {
    /// Creates an empty document (document node only).
    pub fn new() -> Self {
        Self {
            nodes: vec![NodeData {
                kind: NodeKind::Document,
                parent: None,
                children: Vec::new(),
            }],
            root: NodeId(0),
        }
    }

    /// Parses a complete document.
    ///
    /// # Errors
    /// - `Malformed` for syntax errors, mismatched or unclosed tags, invalid
    ///   UTF-8, text outside the root, or anything but exactly one root element.
    pub fn parse(input: &str) -> XmlResult<Self> {
        let mut reader = Reader::from_str(input);
        reader.config_mut().trim_text(false);

        let mut doc = Self::new();
        let mut stack = vec![doc.root];

        loop {
            let event = reader.read_event().map_err(|err| {
                XmlError::Malformed(format!("at byte {}: {err}", reader.buffer_position()))
            })?;
            let parent = *stack
                .last()
                .ok_or_else(|| XmlError::Malformed("unbalanced end tag".to_string()))?;

            match event {
                Event::Start(start) => {
                    let id = doc.element_from_start(&start)?;
                    doc.append_parsed(parent, id)?;
                    stack.push(id);
                }
                Event::Empty(start) => {
                    let id = doc.element_from_start(&start)?;
                    doc.append_parsed(parent, id)?;
                }
                Event::End(_) => {
                    if stack.len() <= 1 {
                        return Err(XmlError::Malformed("unbalanced end tag".to_string()));
                    }
                    stack.pop();
                }
                Event::Text(text) => {
                    let value = text
                        .unescape()
                        .map_err(|err| XmlError::Malformed(err.to_string()))?
                        .into_owned();
                    if parent == doc.root && !value.trim().is_empty() {
                        return Err(XmlError::Malformed(
                            "text content outside the root element".to_string(),
                        ));
                    }
                    let id = doc.push(NodeKind::Text(value));
                    doc.append_parsed(parent, id)?;
                }
                Event::CData(data) => {
                    let id = doc.push(NodeKind::CData(utf8(&data)?));
                    doc.append_parsed(parent, id)?;
                }
                Event::Comment(comment) => {
                    let id = doc.push(NodeKind::Comment(utf8(&comment)?));
                    doc.append_parsed(parent, id)?;
                }
                Event::Decl(decl) => {
                    let id = doc.push(NodeKind::Declaration(utf8(&decl)?));
                    doc.append_parsed(parent, id)?;
                }
                Event::PI(pi) => {
                    let id = doc.push(NodeKind::ProcessingInstruction(utf8(&pi)?));
                    doc.append_parsed(parent, id)?;
                }
                Event::DocType(doctype) => {
                    let id = doc.push(NodeKind::DocType(utf8(&doctype)?));
                    doc.append_parsed(parent, id)?;
                }
                Event::Eof => break,
            }
        }

        if stack.len() != 1 {
            return Err(XmlError::Malformed(
                "unexpected end of input inside an element".to_string(),
            ));
        }
        if doc.document_element().is_none() {
            return Err(XmlError::Malformed("document has no root element".to_string()));
        }
        Ok(doc)
    }

    /// Creates a document with a single empty root element.
    pub fn with_root_element(name: &str) -> Self {
        let mut doc = Self::new();
        let decl = doc.push(NodeKind::Declaration(
            "xml version=\"1.0\" encoding=\"utf-8\"".to_string(),
        ));
        doc.attach(doc.root, None, decl);
        let root = doc.create_element(name);
        doc.attach(doc.root, None, root);
        doc
    }

    /// The document node (parent of the root element).
    pub fn root(&self) -> NodeId {
        self.root
    }

    /// The single root element.
    pub fn document_element(&self) -> Option<NodeId> {
        self.child_elements(self.root).next()
    }

    pub fn kind(&self, id: NodeId) -> &NodeKind {
        &self.nodes[id.0].kind
    }

    pub fn element(&self, id: NodeId) -> Option<&Element> {
        match &self.nodes[id.0].kind {
            NodeKind::Element(element) => Some(element),
            _ => None,
        }
    }

    pub fn is_element(&self, id: NodeId) -> bool {
        self.element(id).is_some()
    }

    /// Element name, `None` for other node kinds.
    pub fn name(&self, id: NodeId) -> Option<&str> {
        self.element(id).map(|element| element.name.as_str())
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.nodes[id.0].parent
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        &self.nodes[id.0].children
    }

    pub fn child_elements(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        self.nodes[id.0]
            .children
            .iter()
            .copied()
            .filter(move |child| self.is_element(*child))
    }

    pub fn child_elements_named<'a>(
        &'a self,
        id: NodeId,
        name: &'a str,
    ) -> impl Iterator<Item = NodeId> + 'a {
        self.child_elements(id)
            .filter(move |child| self.name(*child) == Some(name))
    }

    pub fn attributes(&self, id: NodeId) -> &[Attribute] {
        match &self.nodes[id.0].kind {
            NodeKind::Element(element) => &element.attributes,
            _ => &[],
        }
    }

    pub fn attribute(&self, id: NodeId, name: &str) -> Option<&str> {
        self.attributes(id)
            .iter()
            .find(|attribute| attribute.name == name)
            .map(|attribute| attribute.value.as_str())
    }

    pub(crate) fn attributes_mut(&mut self, id: NodeId) -> XmlResult<&mut Vec<Attribute>> {
        match &mut self.nodes[id.0].kind {
            NodeKind::Element(element) => Ok(&mut element.attributes),
            _ => Err(XmlError::NotAnElement(id)),
        }
    }

    /// Concatenated text and CDATA of all descendants.
    pub fn text(&self, id: NodeId) -> String {
        let mut out = String::new();
        self.collect_text(id, &mut out);
        out
    }

    fn collect_text(&self, id: NodeId, out: &mut String) {
        match &self.nodes[id.0].kind {
            NodeKind::Text(text) | NodeKind::CData(text) => out.push_str(text),
            NodeKind::Element(_) | NodeKind::Document => {
                for child in &self.nodes[id.0].children {
                    self.collect_text(*child, out);
                }
            }
            _ => {}
        }
    }

    /// Replaces element content with one text node.
    ///
    /// Returns `false` when the content already equals `text`.
    pub fn set_text(&mut self, id: NodeId, text: &str) -> XmlResult<bool> {
        if !self.is_element(id) {
            return Err(XmlError::NotAnElement(id));
        }
        let unchanged = match self.nodes[id.0].children.as_slice() {
            [] => text.is_empty(),
            [only] => matches!(&self.nodes[only.0].kind, NodeKind::Text(current) if current == text),
            _ => false,
        };
        if unchanged {
            return Ok(false);
        }

        for child in std::mem::take(&mut self.nodes[id.0].children) {
            self.nodes[child.0].parent = None;
        }
        if !text.is_empty() {
            let node = self.push(NodeKind::Text(text.to_string()));
            self.attach(id, None, node);
        }
        Ok(true)
    }

    /// Creates a detached element.
    pub fn create_element(&mut self, name: &str) -> NodeId {
        self.push(NodeKind::Element(Element {
            name: name.to_string(),
            attributes: Vec::new(),
        }))
    }

    /// Creates a detached text node.
    pub fn create_text(&mut self, text: &str) -> NodeId {
        self.push(NodeKind::Text(text.to_string()))
    }

    /// Appends `child` as the last child of `parent`, detaching it first.
    pub fn append_child(&mut self, parent: NodeId, child: NodeId) -> XmlResult<()> {
        self.ensure_container(parent)?;
        self.detach(child);
        self.attach(parent, None, child);
        Ok(())
    }

    /// Inserts `child` at `index` among all children of `parent`.
    pub fn insert_child(&mut self, parent: NodeId, index: usize, child: NodeId) -> XmlResult<()> {
        self.ensure_container(parent)?;
        self.detach(child);
        self.attach(parent, Some(index), child);
        Ok(())
    }

    /// Unlinks a node from its parent. Returns whether it had one.
    pub fn detach(&mut self, id: NodeId) -> bool {
        let Some(parent) = self.nodes[id.0].parent.take() else {
            return false;
        };
        self.nodes[parent.0].children.retain(|child| *child != id);
        true
    }

    pub fn select_single(&self, context: NodeId, path: &XmlPath) -> Option<NodeId> {
        self.select_all(context, path).into_iter().next()
    }

    /// Evaluates `path` from `context` (or from the document node when the
    /// path is absolute). Results are in document order per step.
    pub fn select_all(&self, context: NodeId, path: &XmlPath) -> Vec<NodeId> {
        let mut current = vec![if path.is_absolute() { self.root } else { context }];
        for step in path.steps() {
            let mut next = Vec::new();
            for node in current {
                let mut candidates: Vec<NodeId> = match step.test() {
                    NodeTest::Context => vec![node],
                    NodeTest::Any => self.child_elements(node).collect(),
                    NodeTest::Name(name) => self.child_elements_named(node, name).collect(),
                };
                for predicate in step.predicates() {
                    candidates = match predicate {
                        Predicate::AttributeEquals { name, value } => candidates
                            .into_iter()
                            .filter(|candidate| {
                                self.attribute(*candidate, name) == Some(value.as_str())
                            })
                            .collect(),
                        Predicate::Position(position) => candidates
                            .get(position - 1)
                            .copied()
                            .into_iter()
                            .collect(),
                    };
                }
                next.extend(candidates);
            }
            current = next;
        }
        current
    }

    /// Serializes the whole document.
    pub fn to_xml_string(&self) -> String {
        let mut out = String::new();
        for child in &self.nodes[self.root.0].children {
            self.write_node(*child, &mut out);
        }
        out
    }

    /// Serializes one node and its subtree.
    pub fn node_to_string(&self, id: NodeId) -> String {
        let mut out = String::new();
        self.write_node(id, &mut out);
        out
    }

    fn write_node(&self, id: NodeId, out: &mut String) {
        let node = &self.nodes[id.0];
        match &node.kind {
            NodeKind::Document => {
                for child in &node.children {
                    self.write_node(*child, out);
                }
            }
            NodeKind::Element(element) => {
                out.push('<');
                out.push_str(&element.name);
                for attribute in &element.attributes {
                    out.push(' ');
                    out.push_str(&attribute.name);
                    out.push_str("=\"");
                    out.push_str(&escape(attribute.value.as_str()));
                    out.push('"');
                }
                if node.children.is_empty() {
                    out.push_str(" />");
                    return;
                }
                out.push('>');
                for child in &node.children {
                    self.write_node(*child, out);
                }
                out.push_str("</");
                out.push_str(&element.name);
                out.push('>');
            }
            NodeKind::Text(text) => out.push_str(&partial_escape(text.as_str())),
            NodeKind::CData(data) => {
                out.push_str("<![CDATA[");
                out.push_str(data);
                out.push_str("]]>");
            }
            NodeKind::Comment(comment) => {
                out.push_str("<!--");
                out.push_str(comment);
                out.push_str("-->");
            }
            NodeKind::ProcessingInstruction(content) | NodeKind::Declaration(content) => {
                out.push_str("<?");
                out.push_str(content);
                out.push_str("?>");
            }
            NodeKind::DocType(content) => {
                out.push_str("<!DOCTYPE ");
                out.push_str(content.trim_start());
                out.push('>');
            }
        }
    }

    fn element_from_start(&mut self, start: &BytesStart<'_>) -> XmlResult<NodeId> {
        let name = utf8(start.name().as_ref())?;
        let mut attributes = Vec::new();
        for attribute in start.attributes() {
            let attribute = attribute.map_err(|err| XmlError::Malformed(err.to_string()))?;
            let value = attribute
                .unescape_value()
                .map_err(|err| XmlError::Malformed(err.to_string()))?
                .into_owned();
            attributes.push(Attribute::new(utf8(attribute.key.as_ref())?, value));
        }
        Ok(self.push(NodeKind::Element(Element { name, attributes })))
    }

    fn append_parsed(&mut self, parent: NodeId, child: NodeId) -> XmlResult<()> {
        if parent == self.root && self.is_element(child) && self.document_element().is_some() {
            return Err(XmlError::Malformed(
                "document has more than one root element".to_string(),
            ));
        }
        self.attach(parent, None, child);
        Ok(())
    }

    fn ensure_container(&self, id: NodeId) -> XmlResult<()> {
        if self.is_element(id) {
            Ok(())
        } else {
            Err(XmlError::NotAnElement(id))
        }
    }

    fn push(&mut self, kind: NodeKind) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(NodeData {
            kind,
            parent: None,
            children: Vec::new(),
        });
        id
    }

    fn attach(&mut self, parent: NodeId, index: Option<usize>, child: NodeId) {
        let children = &mut self.nodes[parent.0].children;
        match index {
            Some(index) if index < children.len() => children.insert(index, child),
            _ => children.push(child),
        }
        self.nodes[child.0].parent = Some(parent);
    }
}

fn utf8(bytes: &[u8]) -> XmlResult<String> {
    std::str::from_utf8(bytes)
        .map(str::to_owned)
        .map_err(|err| XmlError::Malformed(format!("invalid utf-8: {err}")))
}
