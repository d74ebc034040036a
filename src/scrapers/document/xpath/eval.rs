//! XPath evaluation over a [`MarkupDocument`].

use super::parser::{Axis, BinaryOp, Expr, NodeTest, Step};
use crate::scrapers::document::markup::{MarkupDocument, NodeId, NodeKind};

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Nodes(Vec<NodeId>),
    String(String),
    Number(f64),
    Boolean(bool),
}

impl Value {
    pub fn into_string(self, doc: &MarkupDocument) -> String {
        match self {
            Value::Nodes(nodes) => nodes.first().map(|n| doc.string_value(*n)).unwrap_or_default(),
            Value::String(s) => s,
            Value::Number(n) => number_to_string(n),
            Value::Boolean(b) => b.to_string(),
        }
    }

    fn to_number(&self, doc: &MarkupDocument) -> f64 {
        match self {
            Value::Number(n) => *n,
            Value::Boolean(b) => f64::from(u8::from(*b)),
            Value::String(s) => string_to_number(s),
            Value::Nodes(_) => string_to_number(&self.clone().into_string(doc)),
        }
    }

    fn to_boolean(&self) -> bool {
        match self {
            Value::Nodes(nodes) => !nodes.is_empty(),
            Value::String(s) => !s.is_empty(),
            Value::Number(n) => *n != 0.0 && !n.is_nan(),
            Value::Boolean(b) => *b,
        }
    }
}

fn string_to_number(s: &str) -> f64 {
    s.trim().parse::<f64>().unwrap_or(f64::NAN)
}

fn number_to_string(n: f64) -> String {
    if n.is_nan() {
        "NaN".to_string()
    } else if n.is_infinite() {
        (if n > 0.0 { "Infinity" } else { "-Infinity" }).to_string()
    } else if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        n.to_string()
    }
}

#[derive(Clone, Copy)]
struct Context {
    node: NodeId,
    position: usize,
    size: usize,
}

pub struct Evaluator<'a> {
    doc: &'a MarkupDocument,
}

impl<'a> Evaluator<'a> {
    pub fn new(doc: &'a MarkupDocument) -> Self {
        Self { doc }
    }

    pub fn evaluate(&self, expr: &Expr) -> Result<Value, String> {
        let ctx = Context {
            node: self.doc.root(),
            position: 1,
            size: 1,
        };
        self.eval(expr, ctx)
    }

    fn eval(&self, expr: &Expr, ctx: Context) -> Result<Value, String> {
        match expr {
            Expr::Literal(s) => Ok(Value::String(s.clone())),
            Expr::Number(n) => Ok(Value::Number(*n)),
            Expr::Negate(inner) => Ok(Value::Number(-self.eval(inner, ctx)?.to_number(self.doc))),
            Expr::Path { absolute, steps } => {
                let start = if *absolute { self.doc.root() } else { ctx.node };
                Ok(Value::Nodes(self.apply_steps(vec![start], steps)?))
            }
            Expr::Filter {
                primary,
                predicates,
                steps,
            } => {
                let Value::Nodes(mut nodes) = self.eval(primary, ctx)? else {
                    return Err("predicates and paths require a node-set".to_string());
                };
                for predicate in predicates {
                    nodes = self.filter(nodes, predicate)?;
                }
                Ok(Value::Nodes(self.apply_steps(nodes, steps)?))
            }
            Expr::Function(name, args) => self.call(name, args, ctx),
            Expr::Binary(op, left, right) => self.binary(*op, left, right, ctx),
        }
    }

    fn binary(&self, op: BinaryOp, left: &Expr, right: &Expr, ctx: Context) -> Result<Value, String> {
        match op {
            BinaryOp::Or => {
                let l = self.eval(left, ctx)?.to_boolean();
                Ok(Value::Boolean(l || self.eval(right, ctx)?.to_boolean()))
            }
            BinaryOp::And => {
                let l = self.eval(left, ctx)?.to_boolean();
                Ok(Value::Boolean(l && self.eval(right, ctx)?.to_boolean()))
            }
            BinaryOp::Union => {
                let (Value::Nodes(mut l), Value::Nodes(r)) = (self.eval(left, ctx)?, self.eval(right, ctx)?) else {
                    return Err("union operands must be node-sets".to_string());
                };
                l.extend(r);
                l.sort_unstable();
                l.dedup();
                Ok(Value::Nodes(l))
            }
            BinaryOp::Add | BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div | BinaryOp::Mod => {
                let l = self.eval(left, ctx)?.to_number(self.doc);
                let r = self.eval(right, ctx)?.to_number(self.doc);
                Ok(Value::Number(match op {
                    BinaryOp::Add => l + r,
                    BinaryOp::Sub => l - r,
                    BinaryOp::Mul => l * r,
                    BinaryOp::Div => l / r,
                    _ => l % r,
                }))
            }
            _ => {
                let l = self.eval(left, ctx)?;
                let r = self.eval(right, ctx)?;
                Ok(Value::Boolean(self.compare(op, &l, &r)))
            }
        }
    }

    fn strings_of(&self, nodes: &[NodeId]) -> Vec<String> {
        nodes.iter().map(|n| self.doc.string_value(*n)).collect()
    }

    fn compare(&self, op: BinaryOp, l: &Value, r: &Value) -> bool {
        match (l, r) {
            (Value::Nodes(a), Value::Nodes(b)) => {
                let right = self.strings_of(b);
                self.strings_of(a)
                    .iter()
                    .any(|x| right.iter().any(|y| compare_atoms(op, &Value::String(x.clone()), &Value::String(y.clone()), self.doc)))
            }
            (Value::Nodes(a), other) => match other {
                Value::Boolean(_) => compare_atoms(op, &Value::Boolean(!a.is_empty()), other, self.doc),
                _ => self
                    .strings_of(a)
                    .into_iter()
                    .any(|x| compare_atoms(op, &Value::String(x), other, self.doc)),
            },
            (other, Value::Nodes(b)) => match other {
                Value::Boolean(_) => compare_atoms(op, other, &Value::Boolean(!b.is_empty()), self.doc),
                _ => self
                    .strings_of(b)
                    .into_iter()
                    .any(|y| compare_atoms(op, other, &Value::String(y), self.doc)),
            },
            _ => compare_atoms(op, l, r, self.doc),
        }
    }

    fn apply_steps(&self, mut nodes: Vec<NodeId>, steps: &[Step]) -> Result<Vec<NodeId>, String> {
        for step in steps {
            let mut next = Vec::new();
            for node in &nodes {
                let mut candidates: Vec<NodeId> = self
                    .axis(step.axis, *node)
                    .into_iter()
                    .filter(|n| self.matches(step.axis, &step.test, *n))
                    .collect();
                for predicate in &step.predicates {
                    candidates = self.filter(candidates, predicate)?;
                }
                next.extend(candidates);
            }
            next.sort_unstable();
            next.dedup();
            nodes = next;
        }
        Ok(nodes)
    }

    /// Keep nodes for which the predicate holds; a numeric predicate selects by position.
    fn filter(&self, nodes: Vec<NodeId>, predicate: &Expr) -> Result<Vec<NodeId>, String> {
        let size = nodes.len();
        let mut kept = Vec::new();
        for (i, node) in nodes.into_iter().enumerate() {
            let ctx = Context {
                node,
                position: i + 1,
                size,
            };
            let keep = match self.eval(predicate, ctx)? {
                Value::Number(n) => n == (i + 1) as f64,
                other => other.to_boolean(),
            };
            if keep {
                kept.push(node);
            }
        }
        Ok(kept)
    }

    /// Nodes on `axis` from `node`, in axis order.
    fn axis(&self, axis: Axis, node: NodeId) -> Vec<NodeId> {
        let doc = self.doc;
        let n = doc.node(node);
        let is_attribute = matches!(n.kind, NodeKind::Attribute { .. });
        match axis {
            Axis::SelfAxis => vec![node],
            Axis::Child => n.children.clone(),
            Axis::Attribute => n.attributes.clone(),
            Axis::Parent => n.parent.into_iter().collect(),
            Axis::Descendant | Axis::DescendantOrSelf => {
                let mut out = Vec::new();
                if axis == Axis::DescendantOrSelf {
                    out.push(node);
                }
                self.descendants(node, &mut out);
                out
            }
            Axis::Ancestor | Axis::AncestorOrSelf => {
                let mut out = Vec::new();
                if axis == Axis::AncestorOrSelf {
                    out.push(node);
                }
                let mut current = n.parent;
                while let Some(p) = current {
                    out.push(p);
                    current = doc.node(p).parent;
                }
                out
            }
            Axis::FollowingSibling | Axis::PrecedingSibling => {
                if is_attribute {
                    return Vec::new();
                }
                let Some(parent) = n.parent else {
                    return Vec::new();
                };
                let siblings = &doc.node(parent).children;
                let Some(idx) = siblings.iter().position(|s| *s == node) else {
                    return Vec::new();
                };
                if axis == Axis::FollowingSibling {
                    siblings[idx + 1..].to_vec()
                } else {
                    siblings[..idx].iter().rev().copied().collect()
                }
            }
            Axis::Following => {
                let start = if is_attribute { node + 1 } else { n.last_descendant + 1 };
                (start..doc.len()).filter(|id| !self.is_attribute(*id)).collect()
            }
            Axis::Preceding => {
                let ancestors = self.axis(Axis::Ancestor, node);
                (0..node)
                    .rev()
                    .filter(|id| !self.is_attribute(*id) && !ancestors.contains(id))
                    .collect()
            }
        }
    }

    fn descendants(&self, node: NodeId, out: &mut Vec<NodeId>) {
        for child in &self.doc.node(node).children {
            out.push(*child);
            self.descendants(*child, out);
        }
    }

    fn is_attribute(&self, id: NodeId) -> bool {
        matches!(self.doc.node(id).kind, NodeKind::Attribute { .. })
    }

    fn matches(&self, axis: Axis, test: &NodeTest, node: NodeId) -> bool {
        let kind = &self.doc.node(node).kind;
        match test {
            NodeTest::Node => true,
            NodeTest::Text => matches!(kind, NodeKind::Text(_)),
            NodeTest::Comment => matches!(kind, NodeKind::Comment(_)),
            NodeTest::ProcessingInstruction => false,
            NodeTest::Any | NodeTest::Name(_) => {
                let principal = if axis == Axis::Attribute {
                    matches!(kind, NodeKind::Attribute { .. })
                } else {
                    matches!(kind, NodeKind::Element { .. })
                };
                if !principal {
                    return false;
                }
                match test {
                    NodeTest::Name(name) => name_matches(name, self.doc.name(node)),
                    _ => true,
                }
            }
        }
    }

    fn arg(&self, args: &[Expr], i: usize, ctx: Context) -> Result<Value, String> {
        match args.get(i) {
            Some(expr) => self.eval(expr, ctx),
            None => Ok(Value::Nodes(vec![ctx.node])),
        }
    }

    fn arg_string(&self, args: &[Expr], i: usize, ctx: Context) -> Result<String, String> {
        Ok(self.arg(args, i, ctx)?.into_string(self.doc))
    }

    fn arg_number(&self, args: &[Expr], i: usize, ctx: Context) -> Result<f64, String> {
        Ok(self.arg(args, i, ctx)?.to_number(self.doc))
    }

    fn call(&self, name: &str, args: &[Expr], ctx: Context) -> Result<Value, String> {
        let arity = |min: usize, max: usize| -> Result<(), String> {
            if args.len() < min || args.len() > max {
                Err(format!("wrong number of arguments to {}()", name))
            } else {
                Ok(())
            }
        };

        let value = match name {
            "last" => {
                arity(0, 0)?;
                Value::Number(ctx.size as f64)
            }
            "position" => {
                arity(0, 0)?;
                Value::Number(ctx.position as f64)
            }
            "count" => {
                arity(1, 1)?;
                match self.eval(&args[0], ctx)? {
                    Value::Nodes(nodes) => Value::Number(nodes.len() as f64),
                    _ => return Err("count() requires a node-set".to_string()),
                }
            }
            "name" | "local-name" => {
                arity(0, 1)?;
                match self.arg(args, 0, ctx)? {
                    Value::Nodes(nodes) => Value::String(
                        nodes.first().map(|n| self.doc.name(*n).to_string()).unwrap_or_default(),
                    ),
                    _ => return Err(format!("{}() requires a node-set", name)),
                }
            }
            "string" => {
                arity(0, 1)?;
                Value::String(self.arg_string(args, 0, ctx)?)
            }
            "concat" => {
                if args.len() < 2 {
                    return Err("concat() requires at least two arguments".to_string());
                }
                let mut out = String::new();
                for i in 0..args.len() {
                    out.push_str(&self.arg_string(args, i, ctx)?);
                }
                Value::String(out)
            }
            "contains" | "starts-with" | "ends-with" | "substring-before" | "substring-after" => {
                arity(2, 2)?;
                let s = self.arg_string(args, 0, ctx)?;
                let t = self.arg_string(args, 1, ctx)?;
                match name {
                    "contains" => Value::Boolean(s.contains(&t)),
                    "starts-with" => Value::Boolean(s.starts_with(&t)),
                    "ends-with" => Value::Boolean(s.ends_with(&t)),
                    "substring-before" => {
                        Value::String(s.find(&t).map(|i| s[..i].to_string()).unwrap_or_default())
                    }
                    _ => Value::String(
                        s.find(&t)
                            .map(|i| s[i + t.len()..].to_string())
                            .unwrap_or_default(),
                    ),
                }
            }
            "substring" => {
                arity(2, 3)?;
                let s: Vec<char> = self.arg_string(args, 0, ctx)?.chars().collect();
                let start = self.arg_number(args, 1, ctx)?.round();
                let end = if args.len() == 3 {
                    start + self.arg_number(args, 2, ctx)?.round()
                } else {
                    f64::INFINITY
                };
                let out: String = s
                    .iter()
                    .enumerate()
                    .filter(|(i, _)| {
                        let pos = (*i + 1) as f64;
                        pos >= start && pos < end
                    })
                    .map(|(_, c)| *c)
                    .collect();
                Value::String(out)
            }
            "string-length" => {
                arity(0, 1)?;
                Value::Number(self.arg_string(args, 0, ctx)?.chars().count() as f64)
            }
            "normalize-space" => {
                arity(0, 1)?;
                let s = self.arg_string(args, 0, ctx)?;
                Value::String(s.split_whitespace().collect::<Vec<_>>().join(" "))
            }
            "translate" => {
                arity(3, 3)?;
                let s = self.arg_string(args, 0, ctx)?;
                let from: Vec<char> = self.arg_string(args, 1, ctx)?.chars().collect();
                let to: Vec<char> = self.arg_string(args, 2, ctx)?.chars().collect();
                let out: String = s
                    .chars()
                    .filter_map(|c| match from.iter().position(|f| *f == c) {
                        Some(i) => to.get(i).copied(),
                        None => Some(c),
                    })
                    .collect();
                Value::String(out)
            }
            "lower-case" => {
                arity(1, 1)?;
                Value::String(self.arg_string(args, 0, ctx)?.to_lowercase())
            }
            "upper-case" => {
                arity(1, 1)?;
                Value::String(self.arg_string(args, 0, ctx)?.to_uppercase())
            }
            "not" => {
                arity(1, 1)?;
                Value::Boolean(!self.eval(&args[0], ctx)?.to_boolean())
            }
            "boolean" => {
                arity(1, 1)?;
                Value::Boolean(self.eval(&args[0], ctx)?.to_boolean())
            }
            "true" => {
                arity(0, 0)?;
                Value::Boolean(true)
            }
            "false" => {
                arity(0, 0)?;
                Value::Boolean(false)
            }
            "number" => {
                arity(0, 1)?;
                Value::Number(self.arg_number(args, 0, ctx)?)
            }
            "sum" => {
                arity(1, 1)?;
                match self.eval(&args[0], ctx)? {
                    Value::Nodes(nodes) => Value::Number(
                        self.strings_of(&nodes).iter().map(|s| string_to_number(s)).sum(),
                    ),
                    _ => return Err("sum() requires a node-set".to_string()),
                }
            }
            "floor" => {
                arity(1, 1)?;
                Value::Number(self.arg_number(args, 0, ctx)?.floor())
            }
            "ceiling" => {
                arity(1, 1)?;
                Value::Number(self.arg_number(args, 0, ctx)?.ceil())
            }
            "round" => {
                arity(1, 1)?;
                Value::Number(self.arg_number(args, 0, ctx)?.round())
            }
            other => return Err(format!("unknown function {}()", other)),
        };

        Ok(value)
    }
}

fn name_matches(test: &str, name: &str) -> bool {
    let local = test.rsplit(':').next().unwrap_or(test);
    local == "*" || local == name
}

fn compare_atoms(op: BinaryOp, l: &Value, r: &Value, doc: &MarkupDocument) -> bool {
    match op {
        BinaryOp::Eq | BinaryOp::Neq => {
            let equal = match (l, r) {
                (Value::Boolean(_), _) | (_, Value::Boolean(_)) => l.to_boolean() == r.to_boolean(),
                (Value::Number(_), _) | (_, Value::Number(_)) => l.to_number(doc) == r.to_number(doc),
                _ => l.clone().into_string(doc) == r.clone().into_string(doc),
            };
            if op == BinaryOp::Eq {
                equal
            } else {
                !equal
            }
        }
        _ => {
            let (a, b) = (l.to_number(doc), r.to_number(doc));
            match op {
                BinaryOp::Lt => a < b,
                BinaryOp::Le => a <= b,
                BinaryOp::Gt => a > b,
                _ => a >= b,
            }
        }
    }
}
