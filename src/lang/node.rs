use std::fmt;

/// A numeric literal as written in source.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Number {
    /// 64-bit signed integer.
    Int(i64),

    /// 64-bit floating-point number.
    Float(f64),
}

impl fmt::Display for Number {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Number::Int(n) => write!(f, "{}", n),
            Number::Float(n) => write!(f, "{:?}", n),
        }
    }
}

/// Binary operators recognised by the front end.
///
/// Only `Add` has a code-generation rule; the others exist so the parser can
/// represent them and the compiler can reject them with a precise error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
}

impl BinOp {
    pub fn symbol(self) -> &'static str {
        match self {
            BinOp::Add => "+",
            BinOp::Sub => "-",
            BinOp::Mul => "*",
            BinOp::Div => "/",
            BinOp::Mod => "%",
        }
    }
}

impl fmt::Display for BinOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

/// Left-hand side of an assignment.
#[derive(Debug, Clone, PartialEq)]
pub enum Target {
    /// A plain identifier: `a = ...`.
    Name(String),

    /// A destructuring target: `a, b = ...`.
    Tuple(Vec<Target>),

    /// Any other expression in target position, e.g. `f() = ...`.
    Expr(Box<Node>),
}

impl Target {
    /// Converts a parsed expression into an assignment target.
    pub fn from_node(mut node: Node) -> Self {
        if let Node::Name(name) = &mut node {
            return Target::Name(std::mem::take(name));
        }
        Target::Expr(Box::new(node))
    }
}

/// Abstract Syntax Tree node.
///
/// Statements and expressions share one closed type; the code generator
/// matches on it exhaustively.
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    // ───────────────────────────── Statements ───────────────────────────
    /// A whole compilation unit: an ordered list of statements.
    Module(Vec<Node>),

    /// An expression evaluated for its side effects.
    ///
    /// Stack effect: `( -- x )`, the value is discarded by the sequencer.
    Expr(Box<Node>),

    /// `target = value`, possibly chained (`a = b = value`).
    ///
    /// Stack effect: `( -- value )`
    Assign { targets: Vec<Target>, value: Box<Node> },

    // ───────────────────────────── Expressions ──────────────────────────
    /// Global name lookup.
    ///
    /// Stack effect: `( -- x )`
    Name(String),

    /// Numeric literal.
    ///
    /// Stack effect: `( -- n )`
    Num(Number),

    /// `left op right`.
    ///
    /// Stack effect: `( -- left op right )`
    BinOp {
        left: Box<Node>,
        op: BinOp,
        right: Box<Node>,
    },

    /// `func(args...)`.
    ///
    /// Stack effect: `( -- result )`
    Call { func: Box<Node>, args: Vec<Node> },
}

impl Node {
    pub fn module(body: Vec<Node>) -> Self {
        Node::Module(body)
    }

    pub fn expr(value: Node) -> Self {
        Node::Expr(Box::new(value))
    }

    pub fn assign(name: impl Into<String>, value: Node) -> Self {
        Node::Assign {
            targets: vec![Target::Name(name.into())],
            value: Box::new(value),
        }
    }

    pub fn name(name: impl Into<String>) -> Self {
        Node::Name(name.into())
    }

    pub fn int(n: i64) -> Self {
        Node::Num(Number::Int(n))
    }

    pub fn float(n: f64) -> Self {
        Node::Num(Number::Float(n))
    }

    pub fn binop(left: Node, op: BinOp, right: Node) -> Self {
        Node::BinOp {
            left: Box::new(left),
            op,
            right: Box::new(right),
        }
    }

    pub fn call(func: Node, args: Vec<Node>) -> Self {
        Node::Call {
            func: Box::new(func),
            args,
        }
    }

    /// Human-readable name of the node kind, used in diagnostics.
    pub fn kind(&self) -> &'static str {
        match self {
            Node::Module(_) => "module",
            Node::Expr(_) => "expression statement",
            Node::Assign { .. } => "assignment",
            Node::Name(_) => "name",
            Node::Num(Number::Int(_)) => "integer literal",
            Node::Num(Number::Float(_)) => "float literal",
            Node::BinOp { .. } => "binary operation",
            Node::Call { .. } => "call",
        }
    }
}

// Trees from the parser can be arbitrarily deep along their left spine
// (`1 + 1 + ... + 1`), so children are released from a worklist instead of
// recursively.
impl Drop for Node {
    fn drop(&mut self) {
        let mut pending = Vec::new();
        self.detach_children(&mut pending);
        while let Some(mut node) = pending.pop() {
            node.detach_children(&mut pending);
        }
    }
}

impl Node {
    /// Moves every child of `self` into `out`, leaving `self` a leaf.
    fn detach_children(&mut self, out: &mut Vec<Node>) {
        match self {
            Node::Module(body) => out.append(body),
            Node::Expr(value) => out.push(take_boxed(value)),
            Node::Assign { targets, value } => {
                out.push(take_boxed(value));
                let mut lists = vec![std::mem::take(targets)];
                while let Some(list) = lists.pop() {
                    for target in list {
                        match target {
                            Target::Name(_) => {}
                            Target::Tuple(inner) => lists.push(inner),
                            Target::Expr(node) => out.push(*node),
                        }
                    }
                }
            }
            Node::BinOp { left, right, .. } => {
                out.push(take_boxed(left));
                out.push(take_boxed(right));
            }
            Node::Call { func, args } => {
                out.push(take_boxed(func));
                out.append(args);
            }
            Node::Name(_) | Node::Num(_) => {}
        }
    }
}

fn take_boxed(slot: &mut Box<Node>) -> Node {
    std::mem::replace(slot.as_mut(), Node::Module(Vec::new()))
}
