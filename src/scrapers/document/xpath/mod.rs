//! XPath 1.0 subset used by markup scrapers.

mod eval;
mod lexer;
mod parser;

pub use eval::Value;
pub use parser::Expr;

use super::markup::MarkupDocument;

pub fn parse(selector: &str) -> Result<Expr, String> {
    let tokens = lexer::tokenize(selector)?;
    parser::Parser::new(tokens).parse()
}

pub fn evaluate(doc: &MarkupDocument, expr: &Expr) -> Result<Value, String> {
    eval::Evaluator::new(doc).evaluate(expr)
}
