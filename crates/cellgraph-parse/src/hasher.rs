use cellgraph_common::SimpleCellAddress;

use crate::reference::{SheetLookup, parse_reference};
use crate::tokenizer::{Token, TokenType};

/// Address-independent cache key for a tokenized formula.
///
/// Token images are concatenated, except that references are replaced by
/// their relative encoding and function names are upper-cased. String
/// literals arrive as single tokens, so their contents are never read as
/// references.
pub(crate) fn structural_hash(
    tokens: &[Token],
    base: SimpleCellAddress,
    sheets: &dyn SheetLookup,
) -> String {
    let mut hash = String::from("=");
    for token in tokens {
        if token.is_reference_like() {
            match parse_reference(&token.value, base, sheets) {
                Ok(reference) => hash.push_str(&reference.hash_key()),
                Err(_) => hash.push_str(&token.value),
            }
        } else if let Some(name) = token.function_name() {
            hash.push_str(&name);
            hash.push('(');
        } else if token.token_type == TokenType::Whitespace {
            hash.push(' ');
        } else {
            hash.push_str(&token.value);
        }
    }
    hash
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tokenizer::Tokenizer;

    fn hash(formula: &str, col: u32, row: u32) -> String {
        let t = Tokenizer::new(formula).unwrap();
        structural_hash(&t.items, SimpleCellAddress::new(0, col, row), &vec!["Sheet1"])
    }

    #[test]
    fn shifted_relative_references_collide() {
        assert_eq!(hash("=A1+1", 1, 0), hash("=A2+1", 1, 1));
        assert_eq!(hash("=sum(A1:A3)", 1, 0), hash("=SUM(B1:B3)", 2, 0));
        assert_ne!(hash("=A1+1", 1, 0), hash("=A1+2", 1, 0));
        assert_ne!(hash("=$A$1", 1, 0), hash("=$A$2", 1, 1));
    }

    #[test]
    fn strings_are_opaque() {
        assert_ne!(hash("=\"A1\"", 0, 0), hash("=\"A2\"", 0, 1));
        assert_ne!(hash("=A1", 0, 1), hash("=Sheet1!A1", 0, 1));
    }
}
