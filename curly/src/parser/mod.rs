pub mod attributes;
pub mod reference;
pub mod scanner;

pub use attributes::{Attributes, parse_attributes};
pub use reference::{ParsedReference, parse_reference};
pub use scanner::{Scanner, Token, TokenKind, tokenize};
