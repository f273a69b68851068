pub mod component;

use std::ops::Range;
use std::sync::Arc;

use facet_singularize::singularize;
use log::debug;

use crate::contract::{Contract, ContractResolver};
use crate::error::CompileError;
use crate::parser::{ParsedReference, Scanner, Token, TokenKind, parse_reference};
use crate::template::{Block, BlockKind, Call, CollectionScope, Node, Template, Tree};

pub use component::{compile_collection, compile_component, compile_conditional};

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Deepest block nesting a template may use. Deeper templates fail with a
/// `Syntax` error at the first block past the limit.
pub const MAX_NESTING_DEPTH: usize = 128;

/// Compile template source into a render plan for presenters described by
/// `contract`. Collection blocks validate their children against the
/// contract `resolver` supplies for the item.
pub fn compile(
    source: &str,
    contract: &Contract,
    resolver: &dyn ContractResolver,
) -> Result<Template, CompileError> {
    let template = Template::from(compile_tree(source, contract, resolver)?);
    debug!(
        "compiled template for presenter `{}` ({} ops)",
        contract.name(),
        template.ops().len()
    );
    Ok(template)
}

/// Like [`compile`], but stops at the block-node tree.
pub fn compile_tree(
    source: &str,
    contract: &Contract,
    resolver: &dyn ContractResolver,
) -> Result<Tree, CompileError> {
    let mut state = CompileState::new(contract, resolver);
    for token in Scanner::new(source) {
        state.process(token?)?;
    }
    state.finalize()
}

// ---------------------------------------------------------------------------
// Compile state
// ---------------------------------------------------------------------------

struct CompileState<'a> {
    root: &'a Contract,
    resolver: &'a dyn ContractResolver,
    /// Children of the implicit outermost block.
    nodes: Vec<Node>,
    /// Open blocks. Innermost = current scope.
    stack: Vec<Frame>,
}

struct Frame {
    kind: BlockKind,
    reference: ParsedReference,
    call: Call,
    scope: Option<CollectionScope>,
    /// Contract for the children; `None` means the root contract.
    contract: Option<Arc<Contract>>,
    nodes: Vec<Node>,
    span_start: usize,
}

impl<'a> CompileState<'a> {
    fn new(root: &'a Contract, resolver: &'a dyn ContractResolver) -> Self {
        CompileState {
            root,
            resolver,
            nodes: Vec::new(),
            stack: Vec::new(),
        }
    }

    /// The contract references are currently validated against.
    fn contract(&self) -> &Contract {
        self.stack
            .last()
            .and_then(|frame| frame.contract.as_deref())
            .unwrap_or(self.root)
    }

    fn push_node(&mut self, node: Node) {
        let nodes = match self.stack.last_mut() {
            Some(frame) => &mut frame.nodes,
            None => &mut self.nodes,
        };
        if let (Node::Literal(text), Some(Node::Literal(prev))) = (&node, nodes.last_mut()) {
            prev.push_str(text);
            return;
        }
        nodes.push(node);
    }

    fn process(&mut self, token: Token) -> Result<(), CompileError> {
        let span = token.span;
        match token.kind {
            TokenKind::Text(text) => self.push_node(Node::Literal(text)),
            TokenKind::Comment(_) => {}
            TokenKind::Reference(raw) => {
                let reference = parse_reference(&raw, span.clone())?;
                let call = compile_component(self.contract(), &reference, span)?;
                self.push_node(Node::Component(call));
            }
            TokenKind::BlockStart { kind, raw } => self.open_block(kind, &raw, span)?,
            TokenKind::BlockEnd(raw) => self.close_block(&raw, span)?,
        }
        Ok(())
    }

    fn open_block(
        &mut self,
        kind: BlockKind,
        raw: &str,
        span: Range<usize>,
    ) -> Result<(), CompileError> {
        if self.stack.len() == MAX_NESTING_DEPTH {
            return Err(CompileError::syntax(
                format!("blocks may not be nested more than {} deep", MAX_NESTING_DEPTH),
                span,
            ));
        }
        let reference = parse_reference(raw, span.clone())?;
        let contract = self.contract();

        let (call, scope, nested) = match kind {
            BlockKind::Conditional | BlockKind::NegatedConditional => {
                if !reference.method.ends_with('?') {
                    return Err(CompileError::invalid_component(
                        reference.name(),
                        "conditional components must end with `?`",
                        span,
                    ));
                }
                (compile_conditional(contract, &reference, span.clone())?, None, None)
            }
            BlockKind::Collection => {
                let call = compile_collection(contract, &reference, span.clone())?;
                let item = singularize(&reference.method);
                let Some(nested) = self.resolver.nested_contract(contract, &item) else {
                    return Err(CompileError::invalid_component(
                        reference.name(),
                        format!(
                            "no presenter for `{}` items inside presenter `{}`",
                            item,
                            contract.name()
                        ),
                        span,
                    ));
                };
                let scope = CollectionScope {
                    counter: format!("{}_counter", item),
                    item,
                    presenter: nested.name().to_string(),
                };
                (call, Some(scope), Some(nested))
            }
        };

        let contract = nested.or_else(|| self.stack.last().and_then(|frame| frame.contract.clone()));
        self.stack.push(Frame {
            kind,
            reference,
            call,
            scope,
            contract,
            nodes: Vec::new(),
            span_start: span.start,
        });
        Ok(())
    }

    fn close_block(&mut self, raw: &str, span: Range<usize>) -> Result<(), CompileError> {
        let reference = parse_reference(raw, span.clone())?;
        let Some(frame) = self.stack.pop() else {
            return Err(CompileError::IncorrectEnding {
                expected: None,
                found: reference.name(),
                span,
            });
        };
        if !frame.reference.same_name(&reference) {
            return Err(CompileError::IncorrectEnding {
                expected: Some(frame.reference.name()),
                found: reference.name(),
                span,
            });
        }

        self.push_node(Node::Block(Block {
            kind: frame.kind,
            call: frame.call,
            scope: frame.scope,
            children: frame.nodes,
            span: frame.span_start..span.end,
        }));
        Ok(())
    }

    fn finalize(mut self) -> Result<Tree, CompileError> {
        if let Some(frame) = self.stack.pop() {
            return Err(CompileError::IncompleteBlock {
                reference: frame.reference.name(),
                span: frame.call.span,
            });
        }
        Ok(Tree {
            presenter: self.root.name().to_string(),
            nodes: self.nodes,
        })
    }
}
