// render.rs — C++ emission for the loop IR
//
// Turns an `FnDef` into C++ source text. Statements are indented four
// spaces per nesting level; preprocessor switches start at column 0.
//
// Preconditions: none (any IR tree renders).
// Postconditions: returns the function definition, newline-terminated.
// Failure modes: none (pure string formatting).
// Side effects: none.

use std::fmt::{self, Write as _};

use crate::ir::*;

const INDENT: &str = "    ";

/// Render a generated function as C++ source.
pub fn render_function(f: &FnDef) -> String {
    let mut r = Renderer::default();
    let _ = writeln!(r.out, "void {}() {{", f.name);
    r.depth = 1;
    r.stmts(&f.body);
    r.out.push_str("}\n");
    r.out
}

/// Render a statement list at nesting depth 0.
pub fn render_stmts(stmts: &[Stmt]) -> String {
    let mut r = Renderer::default();
    r.stmts(stmts);
    r.out
}

pub fn render_expr(e: &Expr) -> String {
    let mut out = String::new();
    write_expr(&mut out, e);
    out
}

pub fn ctype_name(ty: CType) -> &'static str {
    match ty {
        CType::Size => "unsigned int",
        CType::Int => "int",
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&render_expr(self))
    }
}

impl fmt::Display for FnDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&render_function(self))
    }
}

// ── Statements ──────────────────────────────────────────────────────────────

#[derive(Default)]
struct Renderer {
    out: String,
    depth: usize,
}

impl Renderer {
    fn line(&mut self, text: &str) {
        for _ in 0..self.depth {
            self.out.push_str(INDENT);
        }
        self.out.push_str(text);
        self.out.push('\n');
    }

    fn directive(&mut self, text: &str) {
        self.out.push_str(text);
        self.out.push('\n');
    }

    fn nested(&mut self, stmts: &[Stmt]) {
        self.depth += 1;
        self.stmts(stmts);
        self.depth -= 1;
    }

    fn stmts(&mut self, stmts: &[Stmt]) {
        for stmt in stmts {
            self.stmt(stmt);
        }
    }

    fn stmt(&mut self, stmt: &Stmt) {
        match stmt {
            Stmt::Decl { ty, name, value } => {
                let text = format!("{} {} = {};", ctype_name(*ty), name, render_expr(value));
                self.line(&text);
            }
            Stmt::Assign { name, op, value } => {
                let op = match op {
                    AssignOp::Set => "=",
                    AssignOp::Add => "+=",
                };
                let text = format!("{} {} {};", name, op, render_expr(value));
                self.line(&text);
            }
            Stmt::For(l) => {
                let header = format!(
                    "for ({}; {}; {}) {{",
                    binding_text(&l.init),
                    render_expr(&l.cond),
                    step_text(l.var_name(), &l.step)
                );
                self.line(&header);
                self.nested(&l.body);
                self.line("}");
            }
            Stmt::NtCall(call) => {
                let args: Vec<String> = call.args.iter().map(render_expr).collect();
                let text = format!("{}({});", call.callee, args.join(", "));
                self.line(&text);
            }
            Stmt::Assert(e) => {
                let text = format!("assert({});", render_expr(e));
                self.line(&text);
            }
            Stmt::Lock(lock) => {
                let text = match lock.op {
                    LockOp::AcquireShared => format!("{}.lock_shared();", lock.mutex),
                    LockOp::ReleaseShared => format!("{}.unlock_shared();", lock.mutex),
                    LockOp::Scoped => format!(
                        "std::lock_guard<{}> lock({});",
                        lock.mutex_type, lock.mutex
                    ),
                };
                self.line(&text);
            }
            Stmt::Cfg(cfg) => {
                let open = if cfg.negated { "#ifndef" } else { "#ifdef" };
                self.directive(&format!("{} {}", open, cfg.symbol));
                self.stmts(&cfg.then);
                if !cfg.otherwise.is_empty() {
                    self.directive("#else");
                    self.stmts(&cfg.otherwise);
                }
                self.directive("#endif");
            }
            Stmt::Block(inner) => {
                self.line("{");
                self.nested(inner);
                self.line("}");
            }
            Stmt::Raw(text) => self.line(text),
        }
    }
}

fn binding_text(b: &Binding) -> String {
    match b {
        Binding::Declare { ty, name, value } => {
            format!("{} {} = {}", ctype_name(*ty), name, render_expr(value))
        }
        Binding::Reuse { name, value } => format!("{} = {}", name, render_expr(value)),
    }
}

fn step_text(var: &str, step: &Step) -> String {
    match step {
        Step::Increment => format!("++{}", var),
        Step::Decrement => format!("{}--", var),
        Step::By(e) => format!("{} += {}", var, render_expr(e)),
    }
}

// ── Expressions ─────────────────────────────────────────────────────────────

// Binding strength, loosest first.
const PREC_COND: u8 = 1;
const PREC_OR: u8 = 2;
const PREC_CMP: u8 = 3;
const PREC_ADD: u8 = 4;
const PREC_MUL: u8 = 5;
const PREC_UNARY: u8 = 6;
const PREC_ATOM: u8 = 8;

fn precedence(e: &Expr) -> u8 {
    match e {
        Expr::Cond(..) => PREC_COND,
        Expr::Or(..) => PREC_OR,
        Expr::Less(..) | Expr::Greater(..) => PREC_CMP,
        Expr::Add(..) | Expr::Sub(..) => PREC_ADD,
        Expr::Mul(..) | Expr::Div(..) => PREC_MUL,
        Expr::Not(_) => PREC_UNARY,
        Expr::PostInc(_) | Expr::Const(_) | Expr::Var(_) | Expr::SeqLen(_) => PREC_ATOM,
    }
}

fn write_expr(out: &mut String, e: &Expr) {
    match e {
        Expr::Const(v) => {
            let _ = write!(out, "{}", v);
        }
        Expr::Var(name) => out.push_str(name),
        Expr::SeqLen(seq) => {
            let _ = write!(out, "{}.size()", seq);
        }
        Expr::Add(l, r) => write_binary(out, l, "+", r, PREC_ADD),
        Expr::Sub(l, r) => write_binary(out, l, "-", r, PREC_ADD),
        Expr::Mul(l, r) => write_binary(out, l, "*", r, PREC_MUL),
        Expr::Div(l, r) => write_binary(out, l, "/", r, PREC_MUL),
        Expr::Less(l, r) => write_binary(out, l, "<", r, PREC_CMP),
        Expr::Greater(l, r) => write_binary(out, l, ">", r, PREC_CMP),
        Expr::Or(l, r) => write_binary(out, l, "||", r, PREC_OR),
        Expr::Not(inner) => {
            out.push('!');
            write_operand(out, inner, precedence(inner) < PREC_UNARY);
        }
        Expr::PostInc(name) => {
            let _ = write!(out, "{}++", name);
        }
        Expr::Cond(test, then, otherwise) => {
            out.push('(');
            write_expr(out, test);
            out.push_str(") ? ");
            write_operand(out, then, precedence(then) <= PREC_COND);
            out.push_str(" : ");
            write_operand(out, otherwise, precedence(otherwise) <= PREC_COND);
        }
    }
}

// Operators are left-associative: the right operand needs parentheses
// already at equal precedence (`a - (b - c)`).
fn write_binary(out: &mut String, l: &Expr, op: &str, r: &Expr, prec: u8) {
    write_operand(out, l, precedence(l) < prec);
    let _ = write!(out, " {} ", op);
    write_operand(out, r, precedence(r) <= prec);
}

fn write_operand(out: &mut String, e: &Expr, parenthesize: bool) {
    if parenthesize {
        out.push('(');
        write_expr(out, e);
        out.push(')');
    } else {
        write_expr(out, e);
    }
}
