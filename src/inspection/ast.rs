//! Campaign condition AST.
//!
//! A plain recursive tree walked by [`crate::inspection::evaluator`], with
//! no interning and no explicit evaluation stack. An explicit stack would
//! help for very deep nesting but isn't required for the depths these
//! conditions actually reach.

use crate::types::SignalId;

/// Stable identity of one textual custom-function call site within a
/// campaign's AST, assigned once at parse/build time and held for the
/// campaign's lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct InvocationId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArithOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Ne,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogicalOp {
    And,
    Or,
}

/// A rolling-window sizing: either the last N samples or the last Δt
/// milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowSpec {
    Count(usize),
    TimeMs(u64),
}

/// The window query a [`Expr::Window`] node performs over a signal's
/// history.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowFn {
    Latest,
    Previous,
    Min(WindowSpec),
    Max(WindowSpec),
    Sum(WindowSpec),
    Count(WindowSpec),
    Avg(WindowSpec),
    /// "has received since t": `t` expressed as a window, relative to the
    /// evaluation round's timestamp.
    Presence(WindowSpec),
}

/// A campaign condition expression node.
#[derive(Debug, Clone)]
pub enum Expr {
    NumberLit(f64),
    StringLit(String),
    BoolLit(bool),
    SignalRef(SignalId),
    Not(Box<Expr>),
    Arith {
        op: ArithOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    Compare {
        op: CmpOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    Logical {
        op: LogicalOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    Conditional {
        cond: Box<Expr>,
        then_branch: Box<Expr>,
        else_branch: Box<Expr>,
    },
    Window {
        kind: WindowFn,
        signal: SignalId,
    },
    CustomCall {
        name: String,
        args: Vec<Expr>,
        invocation_id: InvocationId,
    },
}

/// Assigns stable, sequential invocation identities to every
/// [`Expr::CustomCall`] node in a freshly built tree, in a single
/// depth-first left-to-right pass, giving each textual call site a stable
/// identity for the campaign's lifetime.
pub fn assign_invocation_ids(expr: &mut Expr) {
    let mut next = 0u32;
    assign_rec(expr, &mut next);
}

fn assign_rec(expr: &mut Expr, next: &mut u32) {
    match expr {
        Expr::NumberLit(_) | Expr::StringLit(_) | Expr::BoolLit(_) | Expr::SignalRef(_) => {}
        Expr::Not(inner) => assign_rec(inner, next),
        Expr::Arith { lhs, rhs, .. }
        | Expr::Compare { lhs, rhs, .. }
        | Expr::Logical { lhs, rhs, .. } => {
            assign_rec(lhs, next);
            assign_rec(rhs, next);
        }
        Expr::Conditional {
            cond,
            then_branch,
            else_branch,
        } => {
            assign_rec(cond, next);
            assign_rec(then_branch, next);
            assign_rec(else_branch, next);
        }
        Expr::Window { .. } => {}
        Expr::CustomCall {
            args,
            invocation_id,
            ..
        } => {
            for arg in args.iter_mut() {
                assign_rec(arg, next);
            }
            *invocation_id = InvocationId(*next);
            *next += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invocation_ids_assigned_left_to_right() {
        let mut expr = Expr::Logical {
            op: LogicalOp::And,
            lhs: Box::new(Expr::CustomCall {
                name: "abs".into(),
                args: vec![Expr::NumberLit(-1.0)],
                invocation_id: InvocationId(0),
            }),
            rhs: Box::new(Expr::CustomCall {
                name: "pow".into(),
                args: vec![Expr::NumberLit(2.0), Expr::NumberLit(3.0)],
                invocation_id: InvocationId(0),
            }),
        };
        assign_invocation_ids(&mut expr);
        if let Expr::Logical { lhs, rhs, .. } = &expr {
            let Expr::CustomCall { invocation_id: left_id, .. } = lhs.as_ref() else {
                panic!()
            };
            let Expr::CustomCall { invocation_id: right_id, .. } = rhs.as_ref() else {
                panic!()
            };
            assert_eq!(*left_id, InvocationId(0));
            assert_eq!(*right_id, InvocationId(1));
        } else {
            panic!("expected logical node");
        }
    }
}
