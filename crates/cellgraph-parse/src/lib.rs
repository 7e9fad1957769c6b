mod hasher;

pub mod cache;
pub mod dependencies;
pub mod parser;
pub mod pretty;
pub mod reference;
pub mod tokenizer;

pub use cache::{CacheEntry, ParserWithCaching};
pub use dependencies::{
    CellDependency, FunctionFlags, StaticFunctionFlags, absolutize, collect_dependencies,
};
pub use parser::{ASTNode, Parser, ParserError, parse};
pub use pretty::unparse;
pub use reference::{
    AxisRef, ReferenceError, ReferenceType, RelativeCell, SheetLookup, parse_reference,
    quote_sheet_name,
};
pub use tokenizer::{Token, TokenSubType, TokenType, Tokenizer, TokenizerError};

// Re-export common types
pub use cellgraph_common::{CellError, CellValue, ErrorKind};
