//! Recursive-descent XPath 1.0 parser.

use super::lexer::Token;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Axis {
    Child,
    Descendant,
    DescendantOrSelf,
    SelfAxis,
    Parent,
    Ancestor,
    AncestorOrSelf,
    Following,
    FollowingSibling,
    Preceding,
    PrecedingSibling,
    Attribute,
}

impl Axis {
    fn from_name(name: &str) -> Option<Axis> {
        Some(match name {
            "child" => Axis::Child,
            "descendant" => Axis::Descendant,
            "descendant-or-self" => Axis::DescendantOrSelf,
            "self" => Axis::SelfAxis,
            "parent" => Axis::Parent,
            "ancestor" => Axis::Ancestor,
            "ancestor-or-self" => Axis::AncestorOrSelf,
            "following" => Axis::Following,
            "following-sibling" => Axis::FollowingSibling,
            "preceding" => Axis::Preceding,
            "preceding-sibling" => Axis::PrecedingSibling,
            "attribute" => Axis::Attribute,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum NodeTest {
    Name(String),
    Any,
    Text,
    Comment,
    Node,
    ProcessingInstruction,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Step {
    pub axis: Axis,
    pub test: NodeTest,
    pub predicates: Vec<Expr>,
}

impl Step {
    fn descendant_or_self() -> Self {
        Step {
            axis: Axis::DescendantOrSelf,
            test: NodeTest::Node,
            predicates: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Or,
    And,
    Eq,
    Neq,
    Lt,
    Le,
    Gt,
    Ge,
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Union,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Binary(BinaryOp, Box<Expr>, Box<Expr>),
    Negate(Box<Expr>),
    /// A location path; `absolute` paths start at the document root.
    Path { absolute: bool, steps: Vec<Step> },
    /// A primary expression with predicates, optionally followed by a path.
    Filter {
        primary: Box<Expr>,
        predicates: Vec<Expr>,
        steps: Vec<Step>,
    },
    Literal(String),
    Number(f64),
    Function(String, Vec<Expr>),
}

const NODE_TYPES: &[&str] = &["text", "comment", "node", "processing-instruction"];

pub struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    pub fn new(tokens: Vec<Token>) -> Self {
        Self { tokens, pos: 0 }
    }

    pub fn parse(mut self) -> Result<Expr, String> {
        if self.tokens.is_empty() {
            return Err("empty expression".to_string());
        }
        let expr = self.or_expr()?;
        if let Some(t) = self.peek() {
            return Err(format!("unexpected token {:?}", t));
        }
        Ok(expr)
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn peek_at(&self, offset: usize) -> Option<&Token> {
        self.tokens.get(self.pos + offset)
    }

    fn next(&mut self) -> Option<Token> {
        let t = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        t
    }

    fn eat(&mut self, token: &Token) -> bool {
        if self.peek() == Some(token) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, token: &Token) -> Result<(), String> {
        if self.eat(token) {
            Ok(())
        } else {
            Err(format!("expected {:?}, found {:?}", token, self.peek()))
        }
    }

    fn binary_level(
        &mut self,
        ops: &[(Token, BinaryOp)],
        operand: fn(&mut Self) -> Result<Expr, String>,
    ) -> Result<Expr, String> {
        let mut left = operand(self)?;
        'outer: loop {
            for (token, op) in ops {
                if self.eat(token) {
                    let right = operand(self)?;
                    left = Expr::Binary(*op, Box::new(left), Box::new(right));
                    continue 'outer;
                }
            }
            return Ok(left);
        }
    }

    fn or_expr(&mut self) -> Result<Expr, String> {
        self.binary_level(&[(Token::Or, BinaryOp::Or)], Self::and_expr)
    }

    fn and_expr(&mut self) -> Result<Expr, String> {
        self.binary_level(&[(Token::And, BinaryOp::And)], Self::equality_expr)
    }

    fn equality_expr(&mut self) -> Result<Expr, String> {
        self.binary_level(
            &[(Token::Eq, BinaryOp::Eq), (Token::Neq, BinaryOp::Neq)],
            Self::relational_expr,
        )
    }

    fn relational_expr(&mut self) -> Result<Expr, String> {
        self.binary_level(
            &[
                (Token::Lt, BinaryOp::Lt),
                (Token::Le, BinaryOp::Le),
                (Token::Gt, BinaryOp::Gt),
                (Token::Ge, BinaryOp::Ge),
            ],
            Self::additive_expr,
        )
    }

    fn additive_expr(&mut self) -> Result<Expr, String> {
        self.binary_level(
            &[(Token::Plus, BinaryOp::Add), (Token::Minus, BinaryOp::Sub)],
            Self::multiplicative_expr,
        )
    }

    fn multiplicative_expr(&mut self) -> Result<Expr, String> {
        self.binary_level(
            &[
                (Token::Multiply, BinaryOp::Mul),
                (Token::Div, BinaryOp::Div),
                (Token::Mod, BinaryOp::Mod),
            ],
            Self::unary_expr,
        )
    }

    fn unary_expr(&mut self) -> Result<Expr, String> {
        if self.eat(&Token::Minus) {
            return Ok(Expr::Negate(Box::new(self.unary_expr()?)));
        }
        self.union_expr()
    }

    fn union_expr(&mut self) -> Result<Expr, String> {
        self.binary_level(&[(Token::Pipe, BinaryOp::Union)], Self::path_expr)
    }

    fn starts_filter(&self) -> bool {
        match self.peek() {
            Some(Token::Literal(_)) | Some(Token::Number(_)) | Some(Token::LParen) | Some(Token::Variable(_)) => true,
            Some(Token::Name(name)) => {
                self.peek_at(1) == Some(&Token::LParen) && !NODE_TYPES.contains(&name.as_str())
            }
            _ => false,
        }
    }

    fn path_expr(&mut self) -> Result<Expr, String> {
        if !self.starts_filter() {
            return self.location_path();
        }

        let primary = self.primary_expr()?;
        let predicates = self.predicates()?;
        let mut steps = Vec::new();
        loop {
            if self.eat(&Token::Slash) {
                steps.push(self.step()?);
            } else if self.eat(&Token::DoubleSlash) {
                steps.push(Step::descendant_or_self());
                steps.push(self.step()?);
            } else {
                break;
            }
        }

        if predicates.is_empty() && steps.is_empty() {
            return Ok(primary);
        }
        Ok(Expr::Filter {
            primary: Box::new(primary),
            predicates,
            steps,
        })
    }

    fn primary_expr(&mut self) -> Result<Expr, String> {
        match self.next() {
            Some(Token::Literal(s)) => Ok(Expr::Literal(s)),
            Some(Token::Number(n)) => Ok(Expr::Number(n)),
            Some(Token::LParen) => {
                let expr = self.or_expr()?;
                self.expect(&Token::RParen)?;
                Ok(expr)
            }
            Some(Token::Variable(name)) => Err(format!("variables are not supported: ${}", name)),
            Some(Token::Name(name)) => {
                self.expect(&Token::LParen)?;
                let mut args = Vec::new();
                if !self.eat(&Token::RParen) {
                    loop {
                        args.push(self.or_expr()?);
                        if self.eat(&Token::Comma) {
                            continue;
                        }
                        self.expect(&Token::RParen)?;
                        break;
                    }
                }
                Ok(Expr::Function(name, args))
            }
            other => Err(format!("unexpected token {:?}", other)),
        }
    }

    fn starts_step(&self) -> bool {
        matches!(
            self.peek(),
            Some(Token::Name(_)) | Some(Token::Star) | Some(Token::At) | Some(Token::Dot) | Some(Token::DotDot)
        )
    }

    fn location_path(&mut self) -> Result<Expr, String> {
        let mut steps = Vec::new();
        let absolute = if self.eat(&Token::Slash) {
            if !self.starts_step() {
                return Ok(Expr::Path {
                    absolute: true,
                    steps,
                });
            }
            true
        } else if self.eat(&Token::DoubleSlash) {
            steps.push(Step::descendant_or_self());
            true
        } else {
            false
        };

        steps.push(self.step()?);
        loop {
            if self.eat(&Token::Slash) {
                steps.push(self.step()?);
            } else if self.eat(&Token::DoubleSlash) {
                steps.push(Step::descendant_or_self());
                steps.push(self.step()?);
            } else {
                break;
            }
        }

        Ok(Expr::Path { absolute, steps })
    }

    fn predicates(&mut self) -> Result<Vec<Expr>, String> {
        let mut predicates = Vec::new();
        while self.eat(&Token::LBracket) {
            predicates.push(self.or_expr()?);
            self.expect(&Token::RBracket)?;
        }
        Ok(predicates)
    }

    fn step(&mut self) -> Result<Step, String> {
        if self.eat(&Token::Dot) {
            return Ok(Step {
                axis: Axis::SelfAxis,
                test: NodeTest::Node,
                predicates: Vec::new(),
            });
        }
        if self.eat(&Token::DotDot) {
            return Ok(Step {
                axis: Axis::Parent,
                test: NodeTest::Node,
                predicates: Vec::new(),
            });
        }

        let axis = if self.eat(&Token::At) {
            Axis::Attribute
        } else if let (Some(Token::Name(name)), Some(Token::DoubleColon)) = (self.peek(), self.peek_at(1)) {
            let axis = Axis::from_name(name).ok_or_else(|| format!("unknown axis '{}'", name))?;
            self.pos += 2;
            axis
        } else {
            Axis::Child
        };

        let test = match self.next() {
            Some(Token::Star) => NodeTest::Any,
            Some(Token::Name(name)) => {
                if self.peek() == Some(&Token::LParen) && NODE_TYPES.contains(&name.as_str()) {
                    self.pos += 1;
                    // processing-instruction('target') takes an optional literal
                    if let Some(Token::Literal(_)) = self.peek() {
                        self.pos += 1;
                    }
                    self.expect(&Token::RParen)?;
                    match name.as_str() {
                        "text" => NodeTest::Text,
                        "comment" => NodeTest::Comment,
                        "node" => NodeTest::Node,
                        _ => NodeTest::ProcessingInstruction,
                    }
                } else {
                    NodeTest::Name(name)
                }
            }
            other => return Err(format!("expected a node test, found {:?}", other)),
        };

        let predicates = self.predicates()?;
        Ok(Step {
            axis,
            test,
            predicates,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::super::lexer::tokenize;
    use super::*;

    fn parse(s: &str) -> Result<Expr, String> {
        Parser::new(tokenize(s)?).parse()
    }

    #[test]
    fn test_abbreviated_descendant_path() {
        let expr = parse("//div/a").unwrap();
        match expr {
            Expr::Path { absolute, steps } => {
                assert!(absolute);
                assert_eq!(steps.len(), 3);
                assert_eq!(steps[0].axis, Axis::DescendantOrSelf);
                assert_eq!(steps[1].test, NodeTest::Name("div".to_string()));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_function_call_with_path_argument() {
        let expr = parse("normalize-space(//h1/text())").unwrap();
        assert!(matches!(expr, Expr::Function(ref name, ref args) if name == "normalize-space" && args.len() == 1));
    }

    #[test]
    fn test_filter_expression_with_trailing_path() {
        let expr = parse("(//li)[2]/a/@href").unwrap();
        match expr {
            Expr::Filter { predicates, steps, .. } => {
                assert_eq!(predicates.len(), 1);
                assert_eq!(steps.len(), 2);
                assert_eq!(steps[1].axis, Axis::Attribute);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_malformed_expressions() {
        assert!(parse("//div[").is_err());
        assert!(parse("//div]").is_err());
        assert!(parse("bogus-axis::a").is_err());
        assert!(parse("").is_err());
    }
}
