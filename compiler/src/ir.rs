//! Loop IR – statement/expression tree for generated table-filling code.
//!
//! Every node exclusively owns its children. `Clone` is the one deep copy,
//! used when a single inner block is instantiated under several traversal
//! regions. Node kinds form closed enums; consumers match exhaustively.

// ── Types ──────────────────────────────────────────────────────────────────

/// Scalar type of a declared variable in the generated C++.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CType {
    /// `unsigned int`
    Size,
    /// `int` (OpenMP < 3 only work-shares signed loops)
    Int,
}

// ── Expressions ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expr {
    Const(i64),
    Var(String),
    /// Length of an input sequence: `seq.size()`.
    SeqLen(String),
    Add(Box<Expr>, Box<Expr>),
    Sub(Box<Expr>, Box<Expr>),
    Mul(Box<Expr>, Box<Expr>),
    Div(Box<Expr>, Box<Expr>),
    Less(Box<Expr>, Box<Expr>),
    Greater(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
    Not(Box<Expr>),
    /// `name++`, evaluating to the value before the increment.
    PostInc(String),
    Cond(Box<Expr>, Box<Expr>, Box<Expr>),
}

impl Expr {
    pub fn var(name: impl Into<String>) -> Self {
        Expr::Var(name.into())
    }

    pub fn seq_len(seq: impl Into<String>) -> Self {
        Expr::SeqLen(seq.into())
    }

    pub fn post_inc(name: impl Into<String>) -> Self {
        Expr::PostInc(name.into())
    }

    pub fn plus(self, rhs: Expr) -> Self {
        Expr::Add(Box::new(self), Box::new(rhs))
    }

    pub fn minus(self, rhs: Expr) -> Self {
        Expr::Sub(Box::new(self), Box::new(rhs))
    }

    pub fn times(self, rhs: Expr) -> Self {
        Expr::Mul(Box::new(self), Box::new(rhs))
    }

    pub fn div(self, rhs: Expr) -> Self {
        Expr::Div(Box::new(self), Box::new(rhs))
    }

    pub fn less(self, rhs: Expr) -> Self {
        Expr::Less(Box::new(self), Box::new(rhs))
    }

    pub fn greater(self, rhs: Expr) -> Self {
        Expr::Greater(Box::new(self), Box::new(rhs))
    }

    pub fn or(self, rhs: Expr) -> Self {
        Expr::Or(Box::new(self), Box::new(rhs))
    }

    pub fn not(self) -> Self {
        Expr::Not(Box::new(self))
    }

    pub fn cond(test: Expr, then: Expr, otherwise: Expr) -> Self {
        Expr::Cond(Box::new(test), Box::new(then), Box::new(otherwise))
    }
}

// ── Loop variable binding ──────────────────────────────────────────────────

/// How a statement introduces its variable.
///
/// `Reuse` assigns to a variable declared elsewhere (the persisted
/// checkpoint globals); `Declare` introduces a fresh local.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Binding {
    Declare { ty: CType, name: String, value: Expr },
    Reuse { name: String, value: Expr },
}

impl Binding {
    pub fn name(&self) -> &str {
        match self {
            Binding::Declare { name, .. } | Binding::Reuse { name, .. } => name,
        }
    }

    pub fn value(&self) -> &Expr {
        match self {
            Binding::Declare { value, .. } | Binding::Reuse { value, .. } => value,
        }
    }

    /// Same variable and binding form, different value.
    pub fn rebound(&self, value: Expr) -> Binding {
        match self {
            Binding::Declare { ty, name, .. } => Binding::Declare {
                ty: *ty,
                name: name.clone(),
                value,
            },
            Binding::Reuse { name, .. } => Binding::Reuse {
                name: name.clone(),
                value,
            },
        }
    }

    pub fn into_stmt(self) -> Stmt {
        match self {
            Binding::Declare { ty, name, value } => Stmt::Decl { ty, name, value },
            Binding::Reuse { name, value } => Stmt::Assign {
                name,
                op: AssignOp::Set,
                value,
            },
        }
    }
}

// ── Loops ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    /// `++var`
    Increment,
    /// `var--`
    Decrement,
    /// `var += expr`
    By(Expr),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForLoop {
    pub init: Binding,
    pub cond: Expr,
    pub step: Step,
    pub body: Vec<Stmt>,
}

impl ForLoop {
    pub fn new(init: Binding, cond: Expr, step: Step) -> Self {
        ForLoop {
            init,
            cond,
            step,
            body: Vec::new(),
        }
    }

    pub fn var_name(&self) -> &str {
        self.init.name()
    }

    /// Nonterminal calls placed directly in this loop's body.
    pub fn direct_call_count(&self) -> usize {
        self.body
            .iter()
            .filter(|s| matches!(s, Stmt::NtCall(_)))
            .count()
    }

    /// Loops placed directly in this loop's body.
    pub fn direct_loop_count(&self) -> usize {
        self.body.iter().filter(|s| s.is_loop()).count()
    }

    /// A loop with neither calls nor child loops does no work.
    pub fn is_live(&self) -> bool {
        self.direct_call_count() + self.direct_loop_count() > 0
    }
}

// ── Statements ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssignOp {
    /// `=`
    Set,
    /// `+=`
    Add,
}

/// A call to a nonterminal's tabulating evaluation function.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Call {
    pub callee: String,
    pub args: Vec<Expr>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockOp {
    AcquireShared,
    ReleaseShared,
    /// Exclusive lock held until the end of the enclosing scope.
    Scoped,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Lock {
    pub op: LockOp,
    pub mutex: String,
    pub mutex_type: String,
}

/// Build-time switch: `#ifdef symbol` (or `#ifndef` when negated).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CfgBlock {
    pub symbol: String,
    pub negated: bool,
    pub then: Vec<Stmt>,
    pub otherwise: Vec<Stmt>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Stmt {
    Decl {
        ty: CType,
        name: String,
        value: Expr,
    },
    Assign {
        name: String,
        op: AssignOp,
        value: Expr,
    },
    For(ForLoop),
    NtCall(Call),
    Assert(Expr),
    Lock(Lock),
    Cfg(CfgBlock),
    Block(Vec<Stmt>),
    /// Pass-through fragment (pragma, comment), emitted verbatim.
    Raw(String),
}

impl Stmt {
    pub fn raw(text: impl Into<String>) -> Self {
        Stmt::Raw(text.into())
    }

    pub fn is_loop(&self) -> bool {
        matches!(self, Stmt::For(_))
    }
}

/// A generated function without parameters or return value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FnDef {
    pub name: String,
    pub body: Vec<Stmt>,
}

// ── Visitation ─────────────────────────────────────────────────────────────

/// Visit every loop in `stmts` (pre-order), descending through blocks and
/// both branches of build-time switches.
pub fn for_each_loop<'a>(stmts: &'a [Stmt], f: &mut impl FnMut(&'a ForLoop)) {
    for stmt in stmts {
        match stmt {
            Stmt::For(l) => {
                f(l);
                for_each_loop(&l.body, f);
            }
            Stmt::Block(inner) => for_each_loop(inner, f),
            Stmt::Cfg(cfg) => {
                for_each_loop(&cfg.then, f);
                for_each_loop(&cfg.otherwise, f);
            }
            Stmt::Decl { .. }
            | Stmt::Assign { .. }
            | Stmt::NtCall(_)
            | Stmt::Assert(_)
            | Stmt::Lock(_)
            | Stmt::Raw(_) => {}
        }
    }
}

/// Callee names of every nonterminal call in `stmts`, in tree order.
pub fn collect_callees(stmts: &[Stmt]) -> Vec<&str> {
    let mut out = Vec::new();
    collect_callees_into(stmts, &mut out);
    out
}

fn collect_callees_into<'a>(stmts: &'a [Stmt], out: &mut Vec<&'a str>) {
    for stmt in stmts {
        match stmt {
            Stmt::NtCall(call) => out.push(&call.callee),
            Stmt::For(l) => collect_callees_into(&l.body, out),
            Stmt::Block(inner) => collect_callees_into(inner, out),
            Stmt::Cfg(cfg) => {
                collect_callees_into(&cfg.then, out);
                collect_callees_into(&cfg.otherwise, out);
            }
            Stmt::Decl { .. }
            | Stmt::Assign { .. }
            | Stmt::Assert(_)
            | Stmt::Lock(_)
            | Stmt::Raw(_) => {}
        }
    }
}
