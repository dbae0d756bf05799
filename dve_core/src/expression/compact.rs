//! Flat, pointer-free encoding of expression trees.
//!
//! Every node is encoded as a 10-byte header followed by its payload:
//!
//! | bytes  | content                                                     |
//! |--------|-------------------------------------------------------------|
//! | 0      | operator tag                                                |
//! | 1      | arity (0, 1 or 2)                                           |
//! | 2..6   | size in bytes of the whole node, children included (u32 LE) |
//! | 6..10  | offset of the right child from the node start (u32 LE)      |
//!
//! Leaves (arity 0) carry a 4-byte little-endian payload: the literal value, the variable id or the state id.
//! Inner nodes carry their children: the left (or only) child starts right after the header,
//! the right child at the recorded offset.
//! Array accesses are encoded as binary nodes whose left child is a literal holding the id of the array,
//! so that every inner node has the same shape.

use super::{BinaryOp, Expression, Node, UnaryOp};
use crate::{
    StateGid, Value, VarGid,
    eval::{ErrorSink, EvalContext, Evaluated},
};

const HEADER: usize = 10;
const PAYLOAD: usize = 4;

const TAG_NAT: u8 = 0;
const TAG_VAR: u8 = 1;
const TAG_FOREIGN_VAR: u8 = 2;
const TAG_DOT: u8 = 3;
const TAG_INDEX: u8 = 4;
const TAG_FOREIGN_INDEX: u8 = 5;
const TAG_UNARY: u8 = 16;
const TAG_BINARY: u8 = 32;

/// The compacted encoding of an [`Expression`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompactExpression(Box<[u8]>);

impl CompactExpression {
    /// Encodes `expr`, reusing the encodings of its children.
    ///
    /// Children without an encoding are encoded on the fly.
    pub(super) fn build(expr: &Expression) -> Self {
        let mut buf = Vec::new();
        encode(expr, &mut buf);
        Self(buf.into_boxed_slice())
    }

    /// Size of the encoding in bytes.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the encoding is empty (never true for a well-formed expression).
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// The raw bytes of the encoding.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Evaluates the encoded expression.
    ///
    /// Semantics match [`Expression::eval_tree`].
    pub fn eval<C: EvalContext>(&self, ctx: &C) -> Evaluated {
        let mut errors = ErrorSink::default();
        let value = eval_at(&self.0, 0, ctx, &mut errors);
        Evaluated {
            value,
            error: errors.0,
        }
    }
}

fn header(buf: &mut Vec<u8>, tag: u8, arity: u8) -> usize {
    let start = buf.len();
    buf.push(tag);
    buf.push(arity);
    buf.extend_from_slice(&[0; 8]);
    start
}

fn finish(buf: &mut [u8], start: usize, right: usize) {
    let size = (buf.len() - start) as u32;
    buf[start + 2..start + 6].copy_from_slice(&size.to_le_bytes());
    buf[start + 6..start + 10].copy_from_slice(&(right as u32).to_le_bytes());
}

fn leaf(buf: &mut Vec<u8>, tag: u8, payload: i32) {
    let start = header(buf, tag, 0);
    buf.extend_from_slice(&payload.to_le_bytes());
    finish(buf, start, 0);
}

fn child(expr: &Expression, buf: &mut Vec<u8>) {
    match &expr.compacted {
        Some(compacted) => buf.extend_from_slice(&compacted.0),
        None => encode(expr, buf),
    }
}

fn encode(expr: &Expression, buf: &mut Vec<u8>) {
    match &expr.node {
        Node::Nat(value) => leaf(buf, TAG_NAT, *value),
        Node::Var { var, foreign } => leaf(
            buf,
            if *foreign { TAG_FOREIGN_VAR } else { TAG_VAR },
            var.0 as i32,
        ),
        Node::Dot(state) => leaf(buf, TAG_DOT, state.0 as i32),
        Node::Index {
            var,
            foreign,
            index,
        } => {
            let tag = if *foreign {
                TAG_FOREIGN_INDEX
            } else {
                TAG_INDEX
            };
            let start = header(buf, tag, 2);
            leaf(buf, TAG_NAT, var.0 as i32);
            let right = buf.len() - start;
            child(index, buf);
            finish(buf, start, right);
        }
        Node::Unary(op, arg) => {
            let tag = TAG_UNARY + UnaryOp::ALL.iter().position(|o| o == op).unwrap_or_default() as u8;
            let start = header(buf, tag, 1);
            child(arg, buf);
            finish(buf, start, 0);
        }
        Node::Binary(op, left, right) => {
            let tag = TAG_BINARY + BinaryOp::ALL.iter().position(|o| o == op).unwrap_or_default() as u8;
            let start = header(buf, tag, 2);
            child(left, buf);
            let right_offset = buf.len() - start;
            child(right, buf);
            finish(buf, start, right_offset);
        }
    }
}

#[inline(always)]
fn read_u32(buf: &[u8], at: usize) -> u32 {
    u32::from_le_bytes([buf[at], buf[at + 1], buf[at + 2], buf[at + 3]])
}

#[inline(always)]
fn payload(buf: &[u8], at: usize) -> i32 {
    read_u32(buf, at + HEADER) as i32
}

#[inline(always)]
fn right_child(buf: &[u8], at: usize) -> usize {
    at + read_u32(buf, at + 6) as usize
}

fn eval_at<C: EvalContext>(buf: &[u8], at: usize, ctx: &C, errors: &mut ErrorSink) -> Value {
    match buf[at] {
        TAG_NAT => payload(buf, at),
        TAG_VAR | TAG_FOREIGN_VAR => errors.take(ctx.variable(VarGid(payload(buf, at) as u32))),
        TAG_DOT => errors.take(
            ctx.in_state(StateGid(payload(buf, at) as u32))
                .map(Value::from),
        ),
        TAG_INDEX | TAG_FOREIGN_INDEX => {
            // The id of the array is the payload of the synthetic left child.
            let var = VarGid(payload(buf, at + HEADER) as u32);
            let index = eval_at(buf, right_child(buf, at), ctx, errors);
            errors.take(ctx.element(var, index))
        }
        tag if (TAG_UNARY..TAG_BINARY).contains(&tag) => {
            let value = eval_at(buf, at + HEADER, ctx, errors);
            UnaryOp::ALL[(tag - TAG_UNARY) as usize].apply(value)
        }
        tag => {
            let op = BinaryOp::ALL[(tag - TAG_BINARY) as usize];
            let left = eval_at(buf, at + HEADER, ctx, errors);
            let right_at = right_child(buf, at);
            if op.is_lazy() {
                return op.short_circuit(left).unwrap_or_else(|| {
                    Value::from(eval_at(buf, right_at, ctx, errors) != 0)
                });
            }
            if op == BinaryOp::Eq && buf[right_at] == TAG_NAT {
                // Comparison with a literal, the most frequent guard.
                return Value::from(left == payload(buf, right_at));
            }
            let right = eval_at(buf, right_at, ctx, errors);
            errors.take(op.apply(left, right))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout() {
        let e = Expression::binary(BinaryOp::Add, 1.into(), 2.into(), None);
        let c = CompactExpression::build(&e);
        assert_eq!(c.len(), 3 * HEADER + 2 * PAYLOAD);
        let bytes = c.as_bytes();
        assert_eq!(bytes[0], TAG_BINARY + 15);
        assert_eq!(bytes[1], 2);
        assert_eq!(read_u32(bytes, 2) as usize, c.len());
        assert_eq!(read_u32(bytes, 6) as usize, 2 * HEADER + PAYLOAD);
        assert_eq!(payload(bytes, HEADER), 1);
        assert_eq!(payload(bytes, right_child(bytes, 0)), 2);
    }

    #[test]
    fn index_layout() {
        let e = Expression::index(VarGid(7), 3.into(), None);
        let c = CompactExpression::build(&e);
        let bytes = c.as_bytes();
        assert_eq!(bytes[0], TAG_INDEX);
        assert_eq!(bytes[1], 2);
        assert_eq!(bytes[HEADER], TAG_NAT);
        assert_eq!(payload(bytes, HEADER), 7);
        assert_eq!(payload(bytes, right_child(bytes, 0)), 3);
    }
}
