// simulate.rs — Reference interpreter for generated functions
//
// Executes an `FnDef` against concrete sequence lengths and records the
// nonterminal calls and lock operations it performs. Build-time switches
// resolve from the configured symbols; pass-through fragments (pragmas,
// comments) have no effect, so a parallel region runs as one serialization
// of its iterations.
//
// Preconditions: every variable read is declared by the function or
//                configured as a global.
// Postconditions: the trace lists events in execution order.
// Failure modes: undefined names, failed asserts, division by zero, step
//                limit exceeded.
// Side effects: none.

use std::collections::{HashMap, HashSet};
use std::fmt;

use thiserror::Error;

use crate::checkpoint::{CheckpointOptions, INNER_LOOP_2, OUTER_LOOP_1, OUTER_LOOP_2};
use crate::grammar::Grammar;
use crate::ir::{AssignOp, Binding, Expr, FnDef, ForLoop, LockOp, Step, Stmt};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SimError {
    #[error("undefined variable `{0}`")]
    UndefinedVariable(String),
    #[error("unknown sequence `{0}`")]
    UnknownSequence(String),
    #[error("assertion failed: {0}")]
    AssertionFailed(String),
    #[error("division by zero in `{0}`")]
    DivisionByZero(String),
    #[error("step limit of {0} exceeded")]
    StepLimit(u64),
}

// ── Configuration ───────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct SimConfig {
    sequences: HashMap<String, i64>,
    defines: HashSet<String>,
    globals: HashMap<String, i64>,
    step_limit: u64,
}

impl Default for SimConfig {
    fn default() -> Self {
        SimConfig {
            sequences: HashMap::new(),
            defines: HashSet::new(),
            globals: HashMap::new(),
            step_limit: 10_000_000,
        }
    }
}

impl SimConfig {
    /// Sequence lengths for the grammar's tracks, in track order.
    pub fn for_grammar(grammar: &Grammar, lengths: &[usize]) -> Self {
        grammar
            .tracks
            .iter()
            .zip(lengths)
            .fold(SimConfig::default(), |cfg, (t, &n)| cfg.sequence(&t.seq, n))
    }

    pub fn sequence(mut self, seq: &str, len: usize) -> Self {
        self.sequences.insert(seq.into(), len as i64);
        self
    }

    /// Define a build-time symbol without a value (`-D_OPENMP`).
    pub fn define(mut self, symbol: &str) -> Self {
        self.defines.insert(symbol.into());
        self
    }

    /// Define a build-time constant (`-DTILE_SIZE=4`).
    pub fn define_value(mut self, symbol: &str, value: i64) -> Self {
        self.defines.insert(symbol.into());
        self.globals.insert(symbol.into(), value);
        self
    }

    pub fn global(mut self, name: &str, value: i64) -> Self {
        self.globals.insert(name.into(), value);
        self
    }

    pub fn step_limit(mut self, limit: u64) -> Self {
        self.step_limit = limit;
        self
    }

    /// Persisted checkpoint state: the load flag plus every running index
    /// and tile counter. Values set earlier with `global` are kept.
    pub fn checkpoint_state(mut self, grammar: &Grammar, opts: &CheckpointOptions, load: bool) -> Self {
        self.globals.insert(opts.load_flag.clone(), i64::from(load));
        let indices = grammar.tracks.iter().flat_map(|t| [&t.left, &t.right]);
        let counters = [OUTER_LOOP_1, OUTER_LOOP_2, INNER_LOOP_2];
        for name in indices.map(String::as_str).chain(counters) {
            self.globals.entry(name.into()).or_insert(0);
        }
        self
    }
}

// ── Trace ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Call { callee: String, args: Vec<i64> },
    AcquireShared(String),
    ReleaseShared(String),
    ScopedLock(String),
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Event::Call { callee, args } => {
                let args: Vec<String> = args.iter().map(i64::to_string).collect();
                write!(f, "{}({})", callee, args.join(", "))
            }
            Event::AcquireShared(m) => write!(f, "{m}.lock_shared()"),
            Event::ReleaseShared(m) => write!(f, "{m}.unlock_shared()"),
            Event::ScopedLock(m) => write!(f, "lock({m})"),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Trace {
    pub events: Vec<Event>,
}

impl Trace {
    /// Calls in execution order.
    pub fn calls(&self) -> impl Iterator<Item = (&str, &[i64])> {
        self.events.iter().filter_map(|e| match e {
            Event::Call { callee, args } => Some((callee.as_str(), args.as_slice())),
            _ => None,
        })
    }

    /// Argument lists of every call to `callee`, in execution order.
    pub fn cells(&self, callee: &str) -> Vec<Vec<i64>> {
        self.calls()
            .filter(|(c, _)| *c == callee)
            .map(|(_, args)| args.to_vec())
            .collect()
    }

    /// The trace without lock events.
    pub fn call_events(&self) -> Vec<Event> {
        self.events
            .iter()
            .filter(|e| matches!(e, Event::Call { .. }))
            .cloned()
            .collect()
    }
}

// ── Interpreter ─────────────────────────────────────────────────────────────

/// Execute `f` and return its trace.
pub fn simulate(f: &FnDef, config: &SimConfig) -> Result<Trace, SimError> {
    let mut m = Machine {
        config,
        scopes: vec![config.globals.clone(), HashMap::new()],
        trace: Trace::default(),
        steps: 0,
    };
    m.block(&f.body)?;
    Ok(m.trace)
}

struct Machine<'a> {
    config: &'a SimConfig,
    scopes: Vec<HashMap<String, i64>>,
    trace: Trace,
    steps: u64,
}

impl Machine<'_> {
    fn lookup(&self, name: &str) -> Result<i64, SimError> {
        self.scopes
            .iter()
            .rev()
            .find_map(|s| s.get(name).copied())
            .ok_or_else(|| SimError::UndefinedVariable(name.into()))
    }

    fn slot(&mut self, name: &str) -> Result<&mut i64, SimError> {
        self.scopes
            .iter_mut()
            .rev()
            .find_map(|s| s.get_mut(name))
            .ok_or_else(|| SimError::UndefinedVariable(name.into()))
    }

    fn declare(&mut self, name: &str, value: i64) {
        if let Some(scope) = self.scopes.last_mut() {
            scope.insert(name.into(), value);
        }
    }

    fn tick(&mut self) -> Result<(), SimError> {
        self.steps += 1;
        if self.steps > self.config.step_limit {
            return Err(SimError::StepLimit(self.config.step_limit));
        }
        Ok(())
    }

    fn scoped<T>(&mut self, f: impl FnOnce(&mut Self) -> Result<T, SimError>) -> Result<T, SimError> {
        self.scopes.push(HashMap::new());
        let result = f(self);
        self.scopes.pop();
        result
    }

    fn block(&mut self, stmts: &[Stmt]) -> Result<(), SimError> {
        stmts.iter().try_for_each(|s| self.stmt(s))
    }

    fn stmt(&mut self, stmt: &Stmt) -> Result<(), SimError> {
        self.tick()?;
        match stmt {
            Stmt::Decl { name, value, .. } => {
                let v = self.eval(value)?;
                self.declare(name, v);
            }
            Stmt::Assign { name, op, value } => {
                let v = self.eval(value)?;
                let slot = self.slot(name)?;
                match op {
                    AssignOp::Set => *slot = v,
                    AssignOp::Add => *slot += v,
                }
            }
            Stmt::For(l) => self.scoped(|m| m.run_loop(l))?,
            Stmt::NtCall(call) => {
                let args = call
                    .args
                    .iter()
                    .map(|a| self.eval(a))
                    .collect::<Result<Vec<_>, _>>()?;
                self.trace.events.push(Event::Call {
                    callee: call.callee.clone(),
                    args,
                });
            }
            Stmt::Assert(e) => {
                if self.eval(e)? == 0 {
                    return Err(SimError::AssertionFailed(e.to_string()));
                }
            }
            Stmt::Lock(lock) => {
                let m = lock.mutex.clone();
                self.trace.events.push(match lock.op {
                    LockOp::AcquireShared => Event::AcquireShared(m),
                    LockOp::ReleaseShared => Event::ReleaseShared(m),
                    LockOp::Scoped => Event::ScopedLock(m),
                });
            }
            Stmt::Cfg(cfg) => {
                let active = self.config.defines.contains(&cfg.symbol) != cfg.negated;
                let branch = if active { &cfg.then } else { &cfg.otherwise };
                self.block(branch)?;
            }
            Stmt::Block(inner) => self.scoped(|m| m.block(inner))?,
            Stmt::Raw(_) => {}
        }
        Ok(())
    }

    fn run_loop(&mut self, l: &ForLoop) -> Result<(), SimError> {
        match &l.init {
            Binding::Declare { name, value, .. } => {
                let v = self.eval(value)?;
                self.declare(name, v);
            }
            Binding::Reuse { name, value } => {
                let v = self.eval(value)?;
                *self.slot(name)? = v;
            }
        }
        let var = l.var_name();
        while self.eval(&l.cond)? != 0 {
            self.tick()?;
            self.scoped(|m| m.block(&l.body))?;
            let delta = match &l.step {
                Step::Increment => 1,
                Step::Decrement => -1,
                Step::By(e) => self.eval(e)?,
            };
            *self.slot(var)? += delta;
        }
        Ok(())
    }

    fn eval(&mut self, e: &Expr) -> Result<i64, SimError> {
        Ok(match e {
            Expr::Const(v) => *v,
            Expr::Var(name) => self.lookup(name)?,
            Expr::SeqLen(seq) => *self
                .config
                .sequences
                .get(seq)
                .ok_or_else(|| SimError::UnknownSequence(seq.clone()))?,
            Expr::Add(l, r) => self.eval(l)? + self.eval(r)?,
            Expr::Sub(l, r) => self.eval(l)? - self.eval(r)?,
            Expr::Mul(l, r) => self.eval(l)? * self.eval(r)?,
            Expr::Div(l, r) => {
                let (a, b) = (self.eval(l)?, self.eval(r)?);
                if b == 0 {
                    return Err(SimError::DivisionByZero(e.to_string()));
                }
                a / b
            }
            Expr::Less(l, r) => i64::from(self.eval(l)? < self.eval(r)?),
            Expr::Greater(l, r) => i64::from(self.eval(l)? > self.eval(r)?),
            Expr::Or(l, r) => i64::from(self.eval(l)? != 0 || self.eval(r)? != 0),
            Expr::Not(inner) => i64::from(self.eval(inner)? == 0),
            Expr::PostInc(name) => {
                let slot = self.slot(name)?;
                let old = *slot;
                *slot += 1;
                old
            }
            Expr::Cond(test, then, otherwise) => {
                if self.eval(test)? != 0 {
                    self.eval(then)?
                } else {
                    self.eval(otherwise)?
                }
            }
        })
    }
}
