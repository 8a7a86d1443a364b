use std::fmt;
use std::sync::Arc;

use compact_str::CompactString;
use smallvec::SmallVec;

use crate::arena::ArenaId;
use crate::eval::builtin::BuiltinFunction;
use crate::eval::value::Value;
use crate::host::Accessor;
use crate::lexer::token::Token;
use crate::ops::{BinaryOp, UnaryOp};

pub type TokenId = ArenaId<Token>;
pub type NodeRef = Arc<Node>;
pub type Args = SmallVec<[NodeRef; 4]>;

/// One tree node: the expression form plus the token it is anchored to, so
/// any error raised on this node can be positioned in the source.
///
/// Nodes are immutable once the optimizer pipeline completes; the whole tree
/// is shared behind `Arc` and safe to walk from multiple threads.
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub token_id: TokenId,
    pub expr: Arc<Expr>,
}

impl Node {
    pub fn new(token_id: TokenId, expr: Expr) -> NodeRef {
        Arc::new(Node {
            token_id,
            expr: Arc::new(expr),
        })
    }
}

/// The closed expression forms.
///
/// `checked` on operator and call nodes is the runtime-assertion flag: the
/// check-elimination pass clears it on nodes whose static judgment was
/// exactly valid.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Constant(Value),
    /// Slot index into the innermost variable frame: bound variables first in
    /// declaration order, then free variables in first-reference order. The
    /// parser and the evaluator share this numbering.
    Variable(usize),
    Lambda(LambdaExpr),
    Property(PropertyExpr),
    /// Postfix `(args)`: collection indexing or lambda application, decided
    /// by the runtime kind of the target.
    Index {
        target: NodeRef,
        args: Args,
    },
    Array(Vec<NodeRef>),
    Unary {
        op: UnaryOp,
        operand: NodeRef,
        checked: bool,
    },
    Binary {
        op: BinaryOp,
        lhs: NodeRef,
        rhs: NodeRef,
        checked: bool,
    },
    Conditional {
        cond: NodeRef,
        then_branch: NodeRef,
        else_branch: NodeRef,
    },
    Call(CallExpr),
}

#[derive(Debug, Clone, PartialEq)]
pub struct LambdaExpr {
    pub arity: usize,
    /// Slots in the *enclosing* frame to snapshot when the literal is
    /// evaluated, in the free variables' first-reference order.
    pub captures: Vec<usize>,
    pub body: NodeRef,
}

/// Property access with its accessor resolved once at parse time: either
/// pre-bound to a literal target entity, or a late-bound accessor that
/// re-resolves against whatever entity the target evaluates to.
#[derive(Clone)]
pub struct PropertyExpr {
    pub target: NodeRef,
    pub name: CompactString,
    pub accessor: Arc<dyn Accessor>,
}

impl fmt::Debug for PropertyExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PropertyExpr")
            .field("target", &self.target)
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

impl PartialEq for PropertyExpr {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name && self.target == other.target
    }
}

/// A builtin function call, resolved to its registry entry at parse time.
#[derive(Clone)]
pub struct CallExpr {
    pub name: CompactString,
    pub func: &'static BuiltinFunction,
    pub args: Args,
    pub checked: bool,
}

impl fmt::Debug for CallExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallExpr")
            .field("name", &self.name)
            .field("args", &self.args)
            .field("checked", &self.checked)
            .finish_non_exhaustive()
    }
}

impl PartialEq for CallExpr {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name && self.args == other.args && self.checked == other.checked
    }
}
