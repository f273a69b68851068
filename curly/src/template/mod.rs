use std::ops::Range;

use crate::parser::Attributes;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockKind {
    /// `{{#name?}}`: children render when the call is truthy.
    Conditional,
    /// `{{^name?}}`: children render when the call is falsy.
    NegatedConditional,
    /// `{{*name}}`: children render once per item of the call's result.
    Collection,
}

/// A reference that has been validated against a contract.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Call {
    pub method: String,
    pub identifier: Option<String>,
    pub attributes: Attributes,
    /// Span of the tag the call was written in.
    pub span: Range<usize>,
}

/// How the children of a collection block are evaluated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionScope {
    /// Binding name for the current item (the singular of the block name).
    pub item: String,
    /// Binding name for the 1-based position of the current item.
    pub counter: String,
    /// Presenter type the children were validated against.
    pub presenter: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    Literal(String),
    /// Always unescaped: `{{{…}}` escapes become `Literal` text instead.
    Component(Call),
    Block(Block),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block {
    pub kind: BlockKind,
    /// The call from the opening tag.
    pub call: Call,
    /// Present exactly when `kind` is `Collection`.
    pub scope: Option<CollectionScope>,
    pub children: Vec<Node>,
    /// From the opening tag to the end of the closing tag.
    pub span: Range<usize>,
}

/// The implicit outermost block of a compiled template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tree {
    pub presenter: String,
    pub nodes: Vec<Node>,
}

/// One step of a render plan.
///
/// Block ops own the ops that follow them up to (not including) `end`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Op {
    Text(String),
    Emit(Call),
    Conditional {
        call: Call,
        negated: bool,
        end: usize,
    },
    Collection {
        call: Call,
        scope: CollectionScope,
        end: usize,
    },
}

/// A compiled render plan, ready to be evaluated against presenters of
/// the type it was compiled for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Template {
    presenter: String,
    ops: Vec<Op>,
}

impl Template {
    /// The presenter type the template was validated against.
    pub fn presenter(&self) -> &str {
        &self.presenter
    }

    pub fn ops(&self) -> &[Op] {
        &self.ops
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }
}

impl From<Tree> for Template {
    fn from(tree: Tree) -> Self {
        let mut ops = Vec::new();
        lower(tree.nodes, &mut ops);
        Template {
            presenter: tree.presenter,
            ops,
        }
    }
}

enum Lowering {
    Node(Node),
    /// Close the block op at this index: its body ends at the current op count.
    Close(usize),
}

/// Flatten `nodes` into `ops` with an explicit work stack, so nesting depth
/// never grows the call stack.
fn lower(nodes: Vec<Node>, ops: &mut Vec<Op>) {
    let mut work: Vec<Lowering> = nodes.into_iter().rev().map(Lowering::Node).collect();
    while let Some(item) = work.pop() {
        match item {
            Lowering::Node(Node::Literal(text)) => ops.push(Op::Text(text)),
            Lowering::Node(Node::Component(call)) => ops.push(Op::Emit(call)),
            Lowering::Node(Node::Block(block)) => {
                let at = ops.len();
                ops.push(match (block.kind, block.scope) {
                    (BlockKind::Collection, Some(scope)) => Op::Collection {
                        call: block.call,
                        scope,
                        end: at,
                    },
                    (kind, _) => Op::Conditional {
                        call: block.call,
                        negated: kind == BlockKind::NegatedConditional,
                        end: at,
                    },
                });
                work.push(Lowering::Close(at));
                work.extend(block.children.into_iter().rev().map(Lowering::Node));
            }
            Lowering::Close(at) => {
                let block_end = ops.len();
                if let Op::Conditional { end, .. } | Op::Collection { end, .. } = &mut ops[at] {
                    *end = block_end;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn call(method: &str) -> Call {
        Call {
            method: method.to_string(),
            identifier: None,
            attributes: Attributes::new(),
            span: 0..0,
        }
    }

    #[test]
    fn blocks_record_where_their_body_ends() {
        let tree = Tree {
            presenter: "page".to_string(),
            nodes: vec![
                Node::Literal("a".to_string()),
                Node::Block(Block {
                    kind: BlockKind::NegatedConditional,
                    call: call("empty?"),
                    scope: None,
                    children: vec![
                        Node::Component(call("title")),
                        Node::Literal("b".to_string()),
                    ],
                    span: 0..0,
                }),
                Node::Literal("c".to_string()),
            ],
        };
        let template = Template::from(tree);
        assert_eq!(template.presenter(), "page");
        assert_eq!(template.ops().len(), 5);
        match &template.ops()[1] {
            Op::Conditional { negated, end, .. } => {
                assert!(*negated);
                assert_eq!(*end, 4);
            }
            other => panic!("expected conditional, got {:?}", other),
        }
        assert_eq!(template.ops()[4], Op::Text("c".to_string()));
    }

    #[test]
    fn nested_blocks_close_inside_out() {
        let scope = CollectionScope {
            item: "item".to_string(),
            counter: "item_counter".to_string(),
            presenter: "item".to_string(),
        };
        let tree = Tree {
            presenter: "list".to_string(),
            nodes: vec![Node::Block(Block {
                kind: BlockKind::Collection,
                call: call("items"),
                scope: Some(scope),
                children: vec![Node::Block(Block {
                    kind: BlockKind::Conditional,
                    call: call("odd?"),
                    scope: None,
                    children: vec![Node::Component(call("name"))],
                    span: 0..0,
                })],
                span: 0..0,
            })],
        };
        let template = Template::from(tree);
        let ends: Vec<Option<usize>> = template
            .ops()
            .iter()
            .map(|op| match op {
                Op::Conditional { end, .. } | Op::Collection { end, .. } => Some(*end),
                _ => None,
            })
            .collect();
        assert_eq!(ends, vec![Some(3), Some(3), None]);
    }

    #[test]
    fn deep_nesting_lowers_iteratively() {
        let depth = 10_000;
        let mut nodes = vec![Node::Literal("x".to_string())];
        for _ in 0..depth {
            nodes = vec![Node::Block(Block {
                kind: BlockKind::Conditional,
                call: call("deep?"),
                scope: None,
                children: nodes,
                span: 0..0,
            })];
        }
        let template = Template::from(Tree {
            presenter: "page".to_string(),
            nodes,
        });
        assert_eq!(template.ops().len(), depth + 1);
        assert!(matches!(template.ops()[0], Op::Conditional { end, .. } if end == depth + 1));
        assert!(matches!(template.ops()[depth - 1], Op::Conditional { end, .. } if end == depth + 1));
        assert_eq!(template.ops()[depth], Op::Text("x".to_string()));
    }
}
