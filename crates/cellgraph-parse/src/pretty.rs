use cellgraph_common::{CellValue, ErrorKind, SimpleCellAddress};

use crate::parser::{ASTNode, binary_precedence};
use crate::reference::SheetLookup;
use crate::tokenizer::Associativity;

const UNARY_PRECEDENCE: u8 = 7;
const POSTFIX_PRECEDENCE: u8 = 6;

/// Render `ast` back to formula text for the cell at `base`.
///
/// Parentheses are emitted only where precedence requires them, so the
/// output is canonical rather than a copy of what the user typed.
pub fn unparse(ast: &ASTNode, base: SimpleCellAddress, sheets: &dyn SheetLookup) -> String {
    if let ASTNode::Invalid { raw, .. } = ast {
        return raw.clone();
    }
    format!("={}", render(ast, base, sheets))
}

fn precedence(node: &ASTNode) -> u8 {
    match node {
        ASTNode::BinaryOp { op, .. } => binary_precedence(op).map_or(0, |(p, _)| p),
        ASTNode::UnaryOp { op, .. } if op == "%" => POSTFIX_PRECEDENCE,
        ASTNode::UnaryOp { .. } => UNARY_PRECEDENCE,
        _ => u8::MAX,
    }
}

fn render(node: &ASTNode, base: SimpleCellAddress, sheets: &dyn SheetLookup) -> String {
    match node {
        ASTNode::Literal(value) => render_literal(value),
        ASTNode::Reference(r) => r
            .render(base, sheets)
            .unwrap_or_else(|| ErrorKind::Ref.literal().to_string()),
        ASTNode::UnaryOp { op, expr } => {
            let inner = match expr.as_ref() {
                ASTNode::BinaryOp { .. } => format!("({})", render(expr, base, sheets)),
                _ => render(expr, base, sheets),
            };
            if op == "%" {
                format!("{inner}%")
            } else {
                format!("{op}{inner}")
            }
        }
        ASTNode::BinaryOp { op, left, right } => {
            let (p, assoc) = binary_precedence(op).unwrap_or((0, Associativity::Left));
            let l = wrap(left, p, assoc == Associativity::Right, base, sheets);
            let r = wrap(right, p, assoc == Associativity::Left, base, sheets);
            format!("{l}{op}{r}")
        }
        ASTNode::Function { name, args } => {
            let args: Vec<String> = args.iter().map(|a| render(a, base, sheets)).collect();
            format!("{}({})", name, args.join(","))
        }
        ASTNode::Invalid { raw, .. } => raw.trim_start_matches('=').to_string(),
    }
}

/// Render a child, parenthesised when it binds looser than its parent (or
/// equally, on the side where associativity would regroup it).
fn wrap(
    child: &ASTNode,
    parent: u8,
    strict_side: bool,
    base: SimpleCellAddress,
    sheets: &dyn SheetLookup,
) -> String {
    let p = precedence(child);
    let text = render(child, base, sheets);
    if p < parent || (strict_side && p == parent) {
        format!("({text})")
    } else {
        text
    }
}

fn render_literal(value: &CellValue) -> String {
    match value {
        CellValue::Text(s) => format!("\"{}\"", s.replace('"', "\"\"")),
        CellValue::Error(e) => e.kind.literal().to_string(),
        other => other.to_string(),
    }
}
