//! Arena-backed syntax tree with explicit parent back-references.

use kiln_common::{arena_id, Arena};
use serde::{Deserialize, Serialize};

arena_id! {
    /// Opaque handle to one syntax-tree node.
    pub struct SyntaxNodeId
}

/// The kind of a syntax node, with its statement-local payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SyntaxKind {
    /// The unit root. Children are the unit's top-level statements.
    Unit,
    /// A brace-delimited statement list (branch arm or loop body).
    Block,
    /// `let <name> = <expr>`.
    Let {
        /// Bound name.
        name: String,
        /// Right-hand side, kept as raw text at this layer.
        expr: String,
    },
    /// `ret` — returns from the unit; nothing after it falls through.
    Ret,
    /// `if <cond> { ... } else { ... }`. Children: then-block, optional else-block.
    If {
        /// Condition, kept as raw text.
        cond: String,
    },
    /// `loop <label> { ... }`. The label lives on the loop node itself, so
    /// deleting the loop removes its label with it.
    Loop {
        /// The loop's label, targeted by `break`.
        label: String,
    },
    /// `break <label>` — exits the named enclosing loop.
    Break {
        /// Label of the loop being exited.
        label: String,
    },
}

impl SyntaxKind {
    /// Returns `true` for node kinds that are statements (deletable as a
    /// whole), as opposed to structural wrappers.
    pub fn is_statement(&self) -> bool {
        !matches!(self, SyntaxKind::Unit | SyntaxKind::Block)
    }
}

/// One node of the syntax tree.
///
/// Invariant: every live node except the unit root has a non-null parent.
/// A node whose parent is `None` and which is not the root has been
/// detached by the deletion protocol.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyntaxNode {
    /// What this node is.
    pub kind: SyntaxKind,
    /// Structural parent, `None` only for the root and detached nodes.
    pub parent: Option<SyntaxNodeId>,
    /// Children in source order.
    pub children: Vec<SyntaxNodeId>,
    /// 1-based source line, for diagnostics.
    pub line: u32,
}

/// A `gen <rule> <Query>` directive extracted at parse time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RebindDirective {
    /// Name of the generation rule to invoke.
    pub rule: String,
    /// The query type the rule is invoked for.
    pub query_type: String,
}

/// The syntax tree of one compiled unit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyntaxTree {
    nodes: Arena<SyntaxNodeId, SyntaxNode>,
    root: SyntaxNodeId,
    unit_name: String,
    references: Vec<String>,
    rebinds: Vec<RebindDirective>,
}

impl SyntaxTree {
    /// Creates a tree containing only the unit root.
    pub fn new(unit_name: impl Into<String>) -> Self {
        let mut nodes = Arena::new();
        let root = nodes.alloc(SyntaxNode {
            kind: SyntaxKind::Unit,
            parent: None,
            children: Vec::new(),
            line: 1,
        });
        Self {
            nodes,
            root,
            unit_name: unit_name.into(),
            references: Vec::new(),
            rebinds: Vec::new(),
        }
    }

    /// The unit root node.
    pub fn root(&self) -> SyntaxNodeId {
        self.root
    }

    /// The unit's declared name.
    pub fn unit_name(&self) -> &str {
        &self.unit_name
    }

    /// Names of units this unit references via `use`.
    pub fn references(&self) -> &[String] {
        &self.references
    }

    /// Rebind directives declared in this unit.
    pub fn rebinds(&self) -> &[RebindDirective] {
        &self.rebinds
    }

    /// Records a `use` reference. Duplicates are kept out.
    pub fn add_reference(&mut self, unit: impl Into<String>) {
        let unit = unit.into();
        if !self.references.contains(&unit) {
            self.references.push(unit);
        }
    }

    /// Records a rebind directive.
    pub fn add_rebind(&mut self, directive: RebindDirective) {
        self.rebinds.push(directive);
    }

    /// Returns the node with the given ID.
    pub fn node(&self, id: SyntaxNodeId) -> &SyntaxNode {
        self.nodes.get(id)
    }

    /// Returns the node with the given ID, mutably.
    pub fn node_mut(&mut self, id: SyntaxNodeId) -> &mut SyntaxNode {
        self.nodes.get_mut(id)
    }

    /// Allocates a new node and links it as the last child of `parent`.
    pub fn add_node(&mut self, kind: SyntaxKind, parent: SyntaxNodeId, line: u32) -> SyntaxNodeId {
        let id = self.nodes.alloc(SyntaxNode {
            kind,
            parent: Some(parent),
            children: Vec::new(),
            line,
        });
        self.nodes.get_mut(parent).children.push(id);
        id
    }

    /// Returns `true` if `id` is still linked into the tree (its parent
    /// chain terminates at the root). Detached subtrees keep their internal
    /// structure but are no longer attached.
    pub fn is_attached(&self, id: SyntaxNodeId) -> bool {
        let mut current = id;
        loop {
            if current == self.root {
                return true;
            }
            match self.nodes.get(current).parent {
                Some(parent) => current = parent,
                None => return false,
            }
        }
    }

    /// Number of edges between `id` and the root. Detached nodes report the
    /// depth of their detached fragment.
    pub fn depth(&self, id: SyntaxNodeId) -> usize {
        let mut depth = 0;
        let mut current = id;
        while let Some(parent) = self.nodes.get(current).parent {
            depth += 1;
            current = parent;
        }
        depth
    }

    /// Iterates over all allocated node IDs, attached or not.
    pub fn node_ids(&self) -> impl Iterator<Item = SyntaxNodeId> + '_ {
        self.nodes.ids()
    }
}
