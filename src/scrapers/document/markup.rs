//! Owned HTML node arena.
//!
//! `scraper::Html` is not `Send`, so parsed pages are copied into a flat
//! arena that can be shared across tasks. Node ids follow document order:
//! an element comes first, then its attributes, then its children.

use std::sync::LazyLock;

use regex::Regex;
use scraper::{Html, Node as HtmlNode};

use super::xpath;

pub type NodeId = usize;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeKind {
    Root,
    Element { name: String },
    Attribute { name: String, value: String },
    Text(String),
    Comment(String),
}

#[derive(Debug, Clone)]
pub struct Node {
    pub kind: NodeKind,
    pub parent: Option<NodeId>,
    pub children: Vec<NodeId>,
    pub attributes: Vec<NodeId>,
    /// Last id inside this node's subtree (itself when it has none).
    pub last_descendant: NodeId,
}

#[derive(Debug, Clone)]
pub struct MarkupDocument {
    nodes: Vec<Node>,
}

static MULTI_SPACE: LazyLock<Regex> = LazyLock::new(|| Regex::new("  +").unwrap());

impl MarkupDocument {
    pub fn parse(text: &str) -> Self {
        let html = Html::parse_document(text);
        let mut doc = MarkupDocument { nodes: Vec::new() };

        let mut stack = vec![(html.tree.root(), None)];
        while let Some((node, parent)) = stack.pop() {
            let id = match node.value() {
                HtmlNode::Document | HtmlNode::Fragment => doc.push(NodeKind::Root, parent),
                HtmlNode::Element(el) => {
                    let id = doc.push(
                        NodeKind::Element {
                            name: el.name().to_string(),
                        },
                        parent,
                    );
                    for (name, value) in el.attrs() {
                        let attr = doc.push_detached(
                            NodeKind::Attribute {
                                name: name.to_string(),
                                value: value.to_string(),
                            },
                            id,
                        );
                        doc.nodes[id].attributes.push(attr);
                    }
                    id
                }
                HtmlNode::Text(text) => doc.push(NodeKind::Text(String::from(&**text)), parent),
                HtmlNode::Comment(comment) => {
                    doc.push(NodeKind::Comment(String::from(&**comment)), parent)
                }
                _ => continue,
            };

            for child in node.children().rev() {
                stack.push((child, Some(id)));
            }
        }

        for id in (0..doc.nodes.len()).rev() {
            let last = doc.nodes[id]
                .children
                .last()
                .or(doc.nodes[id].attributes.last())
                .map(|c| doc.nodes[*c].last_descendant)
                .unwrap_or(id);
            doc.nodes[id].last_descendant = last;
        }

        doc
    }

    fn push_detached(&mut self, kind: NodeKind, parent: NodeId) -> NodeId {
        let id = self.nodes.len();
        self.nodes.push(Node {
            kind,
            parent: Some(parent),
            children: Vec::new(),
            attributes: Vec::new(),
            last_descendant: id,
        });
        id
    }

    fn push(&mut self, kind: NodeKind, parent: Option<NodeId>) -> NodeId {
        let id = self.nodes.len();
        self.nodes.push(Node {
            kind,
            parent,
            children: Vec::new(),
            attributes: Vec::new(),
            last_descendant: id,
        });
        if let Some(p) = parent {
            self.nodes[p].children.push(id);
        }
        id
    }

    pub fn root(&self) -> NodeId {
        0
    }

    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id]
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Local name of an element or attribute.
    pub fn name(&self, id: NodeId) -> &str {
        match &self.nodes[id].kind {
            NodeKind::Element { name } | NodeKind::Attribute { name, .. } => name,
            _ => "",
        }
    }

    /// XPath string-value of a node.
    pub fn string_value(&self, id: NodeId) -> String {
        match &self.nodes[id].kind {
            NodeKind::Attribute { value, .. } => value.clone(),
            NodeKind::Text(t) | NodeKind::Comment(t) => t.clone(),
            NodeKind::Root | NodeKind::Element { .. } => {
                let mut out = String::new();
                self.collect_text(id, &mut out);
                out
            }
        }
    }

    fn collect_text(&self, id: NodeId, out: &mut String) {
        for child in &self.nodes[id].children {
            match &self.nodes[*child].kind {
                NodeKind::Text(t) => out.push_str(t),
                NodeKind::Element { .. } => self.collect_text(*child, out),
                _ => {}
            }
        }
    }

    /// Text reported for a matched node: inner text, or the markup of a
    /// comment, with whitespace trimmed, space runs collapsed and newlines
    /// removed.
    pub fn node_text(&self, id: NodeId) -> String {
        let raw = match &self.nodes[id].kind {
            NodeKind::Comment(c) => format!("<!--{}-->", c),
            _ => self.string_value(id),
        };
        MULTI_SPACE.replace_all(raw.trim(), " ").replace('\n', "")
    }

    /// Evaluate an XPath expression, returning the text of every match.
    pub fn query(&self, selector: &str) -> Result<Vec<String>, String> {
        let expr = xpath::parse(selector)?;
        let value = xpath::evaluate(self, &expr)?;
        let texts = match value {
            xpath::Value::Nodes(nodes) => nodes.into_iter().map(|n| self.node_text(n)).collect(),
            other => vec![other.into_string(self)],
        };
        Ok(texts.into_iter().filter(|t| !t.is_empty()).collect())
    }

    /// Serialise back to markup, used when printing fetched documents.
    pub fn render(&self) -> String {
        let mut out = String::new();
        self.render_node(self.root(), &mut out);
        out
    }

    fn render_node(&self, id: NodeId, out: &mut String) {
        let node = &self.nodes[id];
        match &node.kind {
            NodeKind::Root => {
                for c in &node.children {
                    self.render_node(*c, out);
                }
            }
            NodeKind::Element { name } => {
                out.push('<');
                out.push_str(name);
                for a in &node.attributes {
                    if let NodeKind::Attribute { name, value } = &self.nodes[*a].kind {
                        out.push_str(&format!(" {}=\"{}\"", name, value.replace('"', "&quot;")));
                    }
                }
                out.push('>');
                for c in &node.children {
                    self.render_node(*c, out);
                }
                out.push_str(&format!("</{}>", name));
            }
            NodeKind::Text(t) => out.push_str(t),
            NodeKind::Comment(c) => out.push_str(&format!("<!--{}-->", c)),
            NodeKind::Attribute { .. } => {}
        }
    }
}
