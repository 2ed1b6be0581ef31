//! Huffman-coded field-path operations.
//!
//! Modern entity updates address their fields with a stream of path
//! mutations. Each mutation is one of a fixed table of operations, prefix
//! coded with a Huffman tree built from protocol-fixed weights. Operations
//! may read operands of their own right after their code.

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::fmt;
use std::sync::OnceLock;

use bitstream::{BitError, BitReader, BitResult, BitWriter};
use schema::{FieldPath, FieldPathError};

use crate::error::{EntityError, EntityResult, LimitKind};

/// Number of field-path operations.
pub const OP_COUNT: usize = 40;

macro_rules! field_path_ops {
    ($($op:ident = $weight:literal,)*) => {
        /// A field-path mutation.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum FieldPathOp {
            $($op,)*
        }

        impl FieldPathOp {
            /// Every operation in table order.
            pub const ALL: [Self; OP_COUNT] = [$(Self::$op,)*];

            /// Frequency weight the code tree is built from.
            #[must_use]
            pub const fn weight(self) -> u32 {
                match self {
                    $(Self::$op => $weight,)*
                }
            }

            /// Operation name.
            #[must_use]
            pub const fn name(self) -> &'static str {
                match self {
                    $(Self::$op => stringify!($op),)*
                }
            }
        }
    };
}

field_path_ops! {
    PlusOne = 36271,
    PlusTwo = 10334,
    PlusThree = 1375,
    PlusFour = 646,
    PlusN = 4128,
    PushOneLeftDeltaZeroRightZero = 35,
    PushOneLeftDeltaZeroRightNonZero = 3,
    PushOneLeftDeltaOneRightZero = 521,
    PushOneLeftDeltaOneRightNonZero = 2942,
    PushOneLeftDeltaNRightZero = 560,
    PushOneLeftDeltaNRightNonZero = 471,
    PushOneLeftDeltaNRightNonZeroPack6Bits = 10530,
    PushOneLeftDeltaNRightNonZeroPack8Bits = 251,
    PushTwoLeftDeltaZero = 0,
    PushTwoPack5LeftDeltaZero = 0,
    PushThreeLeftDeltaZero = 0,
    PushThreePack5LeftDeltaZero = 0,
    PushTwoLeftDeltaOne = 0,
    PushTwoPack5LeftDeltaOne = 0,
    PushThreeLeftDeltaOne = 0,
    PushThreePack5LeftDeltaOne = 0,
    PushTwoLeftDeltaN = 0,
    PushTwoPack5LeftDeltaN = 0,
    PushThreeLeftDeltaN = 0,
    PushThreePack5LeftDeltaN = 0,
    PushN = 0,
    PushNAndNonTopological = 310,
    PopOnePlusOne = 2,
    PopOnePlusN = 0,
    PopAllButOnePlusOne = 1837,
    PopAllButOnePlusN = 149,
    PopAllButOnePlusNPack3Bits = 300,
    PopAllButOnePlusNPack6Bits = 634,
    PopNPlusOne = 0,
    PopNPlusN = 0,
    PopNAndNonTopographical = 1,
    NonTopoComplex = 76,
    NonTopoPenultimatePlusOne = 271,
    NonTopoComplexPack4Bits = 99,
    FieldPathEncodeFinish = 25474,
}

impl fmt::Display for FieldPathOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[allow(clippy::cast_possible_wrap)]
fn read_fp(r: &mut BitReader<'_>) -> BitResult<i32> {
    Ok(r.read_ubitvar_fp()? as i32)
}

#[allow(clippy::cast_possible_wrap)]
fn read_ubitvar(r: &mut BitReader<'_>) -> BitResult<i32> {
    Ok(r.read_ubitvar()? as i32)
}

#[allow(clippy::cast_possible_truncation)]
fn read_small(r: &mut BitReader<'_>, bits: u8) -> BitResult<i32> {
    Ok(r.read_bits(bits)? as i32)
}

impl FieldPathOp {
    /// Applies the operation to `path`, reading its operands from `reader`.
    ///
    /// Returns `true` for the terminating operation.
    pub fn apply(self, reader: &mut BitReader<'_>, path: &mut FieldPath) -> EntityResult<bool> {
        let invalid = |source: FieldPathError| EntityError::FieldPath { op: self, source };
        let r = reader;
        let fp = path;
        match self {
            Self::PlusOne => fp.add_last(1),
            Self::PlusTwo => fp.add_last(2),
            Self::PlusThree => fp.add_last(3),
            Self::PlusFour => fp.add_last(4),
            Self::PlusN => fp.add_last(read_fp(r)?.wrapping_add(5)),
            Self::PushOneLeftDeltaZeroRightZero => fp.push(0).map_err(invalid)?,
            Self::PushOneLeftDeltaZeroRightNonZero => fp.push(read_fp(r)?).map_err(invalid)?,
            Self::PushOneLeftDeltaOneRightZero => {
                fp.add_last(1);
                fp.push(0).map_err(invalid)?;
            }
            Self::PushOneLeftDeltaOneRightNonZero => {
                fp.add_last(1);
                fp.push(read_fp(r)?).map_err(invalid)?;
            }
            Self::PushOneLeftDeltaNRightZero => {
                fp.add_last(read_fp(r)?);
                fp.push(0).map_err(invalid)?;
            }
            Self::PushOneLeftDeltaNRightNonZero => {
                fp.add_last(read_fp(r)?.wrapping_add(2));
                fp.push(read_fp(r)?.wrapping_add(1)).map_err(invalid)?;
            }
            Self::PushOneLeftDeltaNRightNonZeroPack6Bits => {
                fp.add_last(read_small(r, 3)? + 2);
                fp.push(read_small(r, 3)? + 1).map_err(invalid)?;
            }
            Self::PushOneLeftDeltaNRightNonZeroPack8Bits => {
                fp.add_last(read_small(r, 4)? + 2);
                fp.push(read_small(r, 4)? + 1).map_err(invalid)?;
            }
            Self::PushTwoLeftDeltaZero => push_fps(r, fp, 2).map_err(|e| e.with_op(self))?,
            Self::PushTwoPack5LeftDeltaZero => push_pack5(r, fp, 2).map_err(|e| e.with_op(self))?,
            Self::PushThreeLeftDeltaZero => push_fps(r, fp, 3).map_err(|e| e.with_op(self))?,
            Self::PushThreePack5LeftDeltaZero => push_pack5(r, fp, 3).map_err(|e| e.with_op(self))?,
            Self::PushTwoLeftDeltaOne => {
                fp.add_last(1);
                push_fps(r, fp, 2).map_err(|e| e.with_op(self))?;
            }
            Self::PushTwoPack5LeftDeltaOne => {
                fp.add_last(1);
                push_pack5(r, fp, 2).map_err(|e| e.with_op(self))?;
            }
            Self::PushThreeLeftDeltaOne => {
                fp.add_last(1);
                push_fps(r, fp, 3).map_err(|e| e.with_op(self))?;
            }
            Self::PushThreePack5LeftDeltaOne => {
                fp.add_last(1);
                push_pack5(r, fp, 3).map_err(|e| e.with_op(self))?;
            }
            Self::PushTwoLeftDeltaN => {
                fp.add_last(read_ubitvar(r)?.wrapping_add(2));
                push_fps(r, fp, 2).map_err(|e| e.with_op(self))?;
            }
            Self::PushTwoPack5LeftDeltaN => {
                fp.add_last(read_ubitvar(r)?.wrapping_add(2));
                push_pack5(r, fp, 2).map_err(|e| e.with_op(self))?;
            }
            Self::PushThreeLeftDeltaN => {
                fp.add_last(read_ubitvar(r)?.wrapping_add(2));
                push_fps(r, fp, 3).map_err(|e| e.with_op(self))?;
            }
            Self::PushThreePack5LeftDeltaN => {
                fp.add_last(read_ubitvar(r)?.wrapping_add(2));
                push_pack5(r, fp, 3).map_err(|e| e.with_op(self))?;
            }
            Self::PushN => {
                let count = r.read_ubitvar()? as usize;
                fp.add_last(read_ubitvar(r)?);
                push_fps(r, fp, count).map_err(|e| e.with_op(self))?;
            }
            Self::PushNAndNonTopological => {
                for level in 0..fp.len() {
                    if r.read_bool()? {
                        let delta = r.read_vars32()?.wrapping_add(1);
                        fp.add_at(level, delta).map_err(invalid)?;
                    }
                }
                let count = r.read_ubitvar()? as usize;
                push_fps(r, fp, count).map_err(|e| e.with_op(self))?;
            }
            Self::PopOnePlusOne => {
                fp.pop(1).map_err(invalid)?;
                fp.add_last(1);
            }
            Self::PopOnePlusN => {
                fp.pop(1).map_err(invalid)?;
                fp.add_last(read_fp(r)?.wrapping_add(1));
            }
            Self::PopAllButOnePlusOne => {
                fp.pop(fp.last()).map_err(invalid)?;
                fp.add_last(1);
            }
            Self::PopAllButOnePlusN => {
                fp.pop(fp.last()).map_err(invalid)?;
                fp.add_last(read_fp(r)?.wrapping_add(1));
            }
            Self::PopAllButOnePlusNPack3Bits => {
                fp.pop(fp.last()).map_err(invalid)?;
                fp.add_last(read_small(r, 3)? + 1);
            }
            Self::PopAllButOnePlusNPack6Bits => {
                fp.pop(fp.last()).map_err(invalid)?;
                fp.add_last(read_small(r, 6)? + 1);
            }
            Self::PopNPlusOne => {
                fp.pop(r.read_ubitvar_fp()? as usize).map_err(invalid)?;
                fp.add_last(1);
            }
            Self::PopNPlusN => {
                fp.pop(r.read_ubitvar_fp()? as usize).map_err(invalid)?;
                fp.add_last(r.read_vars32()?);
            }
            Self::PopNAndNonTopographical => {
                fp.pop(r.read_ubitvar_fp()? as usize).map_err(invalid)?;
                for level in 0..fp.len() {
                    if r.read_bool()? {
                        fp.add_at(level, r.read_vars32()?).map_err(invalid)?;
                    }
                }
            }
            Self::NonTopoComplex => {
                for level in 0..fp.len() {
                    if r.read_bool()? {
                        fp.add_at(level, r.read_vars32()?).map_err(invalid)?;
                    }
                }
            }
            Self::NonTopoPenultimatePlusOne => {
                let level = fp.last().checked_sub(1).ok_or(invalid(FieldPathError::NoParent))?;
                fp.add_at(level, 1).map_err(invalid)?;
            }
            Self::NonTopoComplexPack4Bits => {
                for level in 0..fp.len() {
                    if r.read_bool()? {
                        fp.add_at(level, read_small(r, 4)? - 7).map_err(invalid)?;
                    }
                }
            }
            Self::FieldPathEncodeFinish => return Ok(true),
        }
        Ok(false)
    }

    /// Length of this operation's code in bits.
    #[must_use]
    pub fn code_len(self) -> u8 {
        FieldPathTree::get().codes[self as usize].len
    }
}

/// Failure inside a multi-push helper, before the operation is known.
enum PushError {
    Bit(BitError),
    Path(FieldPathError),
}

impl From<BitError> for PushError {
    fn from(err: BitError) -> Self {
        Self::Bit(err)
    }
}

impl PushError {
    fn with_op(self, op: FieldPathOp) -> EntityError {
        match self {
            Self::Bit(err) => EntityError::Bit(err),
            Self::Path(source) => EntityError::FieldPath { op, source },
        }
    }
}

fn push_fps(r: &mut BitReader<'_>, fp: &mut FieldPath, count: usize) -> Result<(), PushError> {
    for _ in 0..count {
        fp.push(read_fp(r)?).map_err(PushError::Path)?;
    }
    Ok(())
}

fn push_pack5(r: &mut BitReader<'_>, fp: &mut FieldPath, count: usize) -> Result<(), PushError> {
    for _ in 0..count {
        fp.push(read_small(r, 5)?).map_err(PushError::Path)?;
    }
    Ok(())
}

#[derive(Debug, Clone, Copy)]
enum Node {
    Leaf(FieldPathOp),
    Branch { left: usize, right: usize },
}

/// Prefix code of one operation; bit 0 is read first.
#[derive(Debug, Clone, Copy, Default)]
struct Code {
    bits: u64,
    len: u8,
}

#[derive(Debug, PartialEq, Eq)]
struct HeapEntry {
    weight: u32,
    value: u32,
    node: usize,
}

impl Ord for HeapEntry {
    // BinaryHeap pops the greatest entry: the lightest weight, and among
    // equal weights the highest value.
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .weight
            .cmp(&self.weight)
            .then(self.value.cmp(&other.value))
    }
}

impl PartialOrd for HeapEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// The compiled operation code tree.
#[derive(Debug)]
struct FieldPathTree {
    nodes: Vec<Node>,
    root: usize,
    codes: [Code; OP_COUNT],
}

impl FieldPathTree {
    fn get() -> &'static Self {
        static TREE: OnceLock<FieldPathTree> = OnceLock::new();
        TREE.get_or_init(Self::build)
    }

    fn build() -> Self {
        let mut nodes = Vec::with_capacity(2 * OP_COUNT - 1);
        let mut heap = BinaryHeap::with_capacity(OP_COUNT);
        for (value, op) in FieldPathOp::ALL.into_iter().enumerate() {
            nodes.push(Node::Leaf(op));
            heap.push(HeapEntry {
                weight: op.weight().max(1),
                value: value as u32,
                node: value,
            });
        }

        let mut next_value = OP_COUNT as u32;
        while let (Some(left), Some(right)) = (heap.pop(), heap.pop()) {
            nodes.push(Node::Branch {
                left: left.node,
                right: right.node,
            });
            heap.push(HeapEntry {
                weight: left.weight + right.weight,
                value: next_value,
                node: nodes.len() - 1,
            });
            next_value += 1;
        }
        let root = nodes.len() - 1;

        let mut codes = [Code::default(); OP_COUNT];
        let mut stack = vec![(root, Code::default())];
        while let Some((index, code)) = stack.pop() {
            match nodes[index] {
                Node::Leaf(op) => codes[op as usize] = code,
                Node::Branch { left, right } => {
                    let len = code.len + 1;
                    stack.push((left, Code { bits: code.bits, len }));
                    stack.push((
                        right,
                        Code {
                            bits: code.bits | (1 << code.len),
                            len,
                        },
                    ));
                }
            }
        }

        Self { nodes, root, codes }
    }
}

/// Reads one update's field paths into `out`.
///
/// `out` is cleared first. Decoding stops at the terminating operation; more
/// than `limit` paths is an error.
pub fn read_field_paths(reader: &mut BitReader<'_>, out: &mut Vec<FieldPath>, limit: usize) -> EntityResult<usize> {
    out.clear();
    let tree = FieldPathTree::get();
    let mut path = FieldPath::new();
    let mut node = tree.root;
    loop {
        let next = match tree.nodes[node] {
            Node::Branch { left, right } => {
                if reader.read_bool()? {
                    right
                } else {
                    left
                }
            }
            Node::Leaf(_) => tree.root,
        };
        match tree.nodes[next] {
            Node::Leaf(op) => {
                node = tree.root;
                if op.apply(reader, &mut path)? {
                    break;
                }
                if out.len() >= limit {
                    return Err(EntityError::LimitExceeded {
                        kind: LimitKind::FieldPathsPerUpdate,
                        limit,
                        actual: out.len() + 1,
                    });
                }
                out.push(path);
            }
            Node::Branch { .. } => node = next,
        }
    }
    Ok(out.len())
}

/// Writes the code of `op`; its operands follow separately.
pub fn write_op(writer: &mut BitWriter, op: FieldPathOp) -> BitResult<()> {
    let code = FieldPathTree::get().codes[op as usize];
    writer.write_bits(code.bits, usize::from(code.len))
}

fn index_operand(value: i32) -> BitResult<u32> {
    u32::try_from(value).map_err(|_| BitError::ValueOutOfRange {
        value: u64::from(value.unsigned_abs()),
        bits: 31,
    })
}

/// Encodes `paths` as one update's field-path stream, terminator included.
///
/// Each path is reached from the previous one with a short common operation
/// when one fits, otherwise with a non-topological operation. Paths must hold
/// non-negative indices.
pub fn write_field_paths(writer: &mut BitWriter, paths: &[FieldPath]) -> BitResult<()> {
    let mut current = FieldPath::new();
    for target in paths {
        write_transition(writer, current.as_slice(), target.as_slice())?;
        current = *target;
    }
    write_op(writer, FieldPathOp::FieldPathEncodeFinish)
}

fn write_transition(w: &mut BitWriter, from: &[i32], to: &[i32]) -> BitResult<()> {
    let last = from.len() - 1;
    let shared_parent = to.len() >= from.len() && from[..last] == to[..last];
    let delta = to[last.min(to.len() - 1)].wrapping_sub(from[last.min(to.len() - 1)]);

    if shared_parent && to.len() == from.len() && delta >= 1 {
        let op = match delta {
            1 => FieldPathOp::PlusOne,
            2 => FieldPathOp::PlusTwo,
            3 => FieldPathOp::PlusThree,
            4 => FieldPathOp::PlusFour,
            _ => {
                write_op(w, FieldPathOp::PlusN)?;
                return w.write_ubitvar_fp(index_operand(delta - 5)?);
            }
        };
        return write_op(w, op);
    }

    if shared_parent && to.len() == from.len() + 1 && delta >= 0 {
        let right = index_operand(to[last + 1])?;
        match (delta, right) {
            (0, 0) => return write_op(w, FieldPathOp::PushOneLeftDeltaZeroRightZero),
            (0, _) => {
                write_op(w, FieldPathOp::PushOneLeftDeltaZeroRightNonZero)?;
                return w.write_ubitvar_fp(right);
            }
            (1, 0) => return write_op(w, FieldPathOp::PushOneLeftDeltaOneRightZero),
            (1, _) => {
                write_op(w, FieldPathOp::PushOneLeftDeltaOneRightNonZero)?;
                return w.write_ubitvar_fp(right);
            }
            (_, 0) => {
                write_op(w, FieldPathOp::PushOneLeftDeltaNRightZero)?;
                return w.write_ubitvar_fp(index_operand(delta)?);
            }
            (_, _) => {
                write_op(w, FieldPathOp::PushOneLeftDeltaNRightNonZero)?;
                w.write_ubitvar_fp(index_operand(delta - 2)?)?;
                return w.write_ubitvar_fp(right - 1);
            }
        }
    }

    if to.len() == 1 && from.len() > 1 && to[0] > from[0] {
        let delta = to[0] - from[0];
        if delta == 1 {
            return write_op(w, FieldPathOp::PopAllButOnePlusOne);
        }
        write_op(w, FieldPathOp::PopAllButOnePlusN)?;
        return w.write_ubitvar_fp(index_operand(delta - 1)?);
    }

    if to.len() < from.len() {
        write_op(w, FieldPathOp::PopNAndNonTopographical)?;
        w.write_ubitvar_fp((from.len() - to.len()) as u32)?;
        for (a, b) in from.iter().zip(to) {
            let delta = b.wrapping_sub(*a);
            w.write_bool(delta != 0);
            if delta != 0 {
                w.write_vars32(delta);
            }
        }
        return Ok(());
    }

    write_op(w, FieldPathOp::PushNAndNonTopological)?;
    for (a, b) in from.iter().zip(to) {
        let delta = b.wrapping_sub(*a);
        w.write_bool(delta != 0);
        if delta != 0 {
            w.write_vars32(delta - 1);
        }
    }
    w.write_ubitvar((to.len() - from.len()) as u32);
    for &index in &to[from.len()..] {
        w.write_ubitvar_fp(index_operand(index)?)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn path(indices: &[i32]) -> FieldPath {
        FieldPath::from_slice(indices).unwrap()
    }

    fn decode(bytes: &[u8]) -> Vec<FieldPath> {
        let mut reader = BitReader::new(bytes);
        let mut out = Vec::new();
        read_field_paths(&mut reader, &mut out, usize::MAX).unwrap();
        out
    }

    #[test]
    fn table_has_forty_distinct_ops() {
        assert_eq!(FieldPathOp::ALL.len(), OP_COUNT);
        for (i, op) in FieldPathOp::ALL.iter().enumerate() {
            assert_eq!(*op as usize, i);
        }
        assert_eq!(FieldPathOp::FieldPathEncodeFinish.weight(), 25474);
        assert_eq!(FieldPathOp::PlusOne.to_string(), "PlusOne");
    }

    #[test]
    fn frequent_ops_get_short_codes() {
        assert_eq!(FieldPathOp::PlusOne.code_len(), 1);
        assert_eq!(FieldPathOp::FieldPathEncodeFinish.code_len(), 2);
        assert!(FieldPathOp::PlusOne.code_len() < FieldPathOp::PopOnePlusOne.code_len());
        assert!(FieldPathOp::PushOneLeftDeltaNRightNonZeroPack6Bits.code_len()
            <= FieldPathOp::PushNAndNonTopological.code_len());
    }

    /// Codes in stream order, first bit read leftmost.
    const CANONICAL_CODES: [(FieldPathOp, &str); OP_COUNT] = [
        (FieldPathOp::PlusOne, "0"),
        (FieldPathOp::PlusTwo, "1110"),
        (FieldPathOp::PlusThree, "110010"),
        (FieldPathOp::PlusFour, "11011111"),
        (FieldPathOp::PlusN, "11010"),
        (FieldPathOp::PushOneLeftDeltaZeroRightZero, "110110001101"),
        (FieldPathOp::PushOneLeftDeltaZeroRightNonZero, "110110001100101"),
        (FieldPathOp::PushOneLeftDeltaOneRightZero, "11011010"),
        (FieldPathOp::PushOneLeftDeltaOneRightNonZero, "11000"),
        (FieldPathOp::PushOneLeftDeltaNRightZero, "11011100"),
        (FieldPathOp::PushOneLeftDeltaNRightNonZero, "11011001"),
        (FieldPathOp::PushOneLeftDeltaNRightNonZeroPack6Bits, "1111"),
        (FieldPathOp::PushOneLeftDeltaNRightNonZeroPack8Bits, "110110110"),
        (FieldPathOp::PushTwoLeftDeltaZero, "1101100011001000"),
        (FieldPathOp::PushTwoPack5LeftDeltaZero, "11011000110010011"),
        (FieldPathOp::PushThreeLeftDeltaZero, "11011000110010010"),
        (FieldPathOp::PushThreePack5LeftDeltaZero, "11011000110011101"),
        (FieldPathOp::PushTwoLeftDeltaOne, "11011000110011100"),
        (FieldPathOp::PushTwoPack5LeftDeltaOne, "11011000110011111"),
        (FieldPathOp::PushThreeLeftDeltaOne, "11011000110011110"),
        (FieldPathOp::PushThreePack5LeftDeltaOne, "11011000110011001"),
        (FieldPathOp::PushTwoLeftDeltaN, "11011000110011000"),
        (FieldPathOp::PushTwoPack5LeftDeltaN, "11011000110011011"),
        (FieldPathOp::PushThreeLeftDeltaN, "11011000110011010"),
        (FieldPathOp::PushThreePack5LeftDeltaN, "1101100011000101"),
        (FieldPathOp::PushN, "1101100011000100"),
        (FieldPathOp::PushNAndNonTopological, "110111011"),
        (FieldPathOp::PopOnePlusOne, "110110001100001"),
        (FieldPathOp::PopOnePlusN, "1101100011000111"),
        (FieldPathOp::PopAllButOnePlusOne, "110011"),
        (FieldPathOp::PopAllButOnePlusN, "110110000"),
        (FieldPathOp::PopAllButOnePlusNPack3Bits, "110111010"),
        (FieldPathOp::PopAllButOnePlusNPack6Bits, "11011110"),
        (FieldPathOp::PopNPlusOne, "1101100011000110"),
        (FieldPathOp::PopNPlusN, "1101100011000001"),
        (FieldPathOp::PopNAndNonTopographical, "1101100011000000"),
        (FieldPathOp::NonTopoComplex, "11011000111"),
        (FieldPathOp::NonTopoPenultimatePlusOne, "110110111"),
        (FieldPathOp::NonTopoComplexPack4Bits, "1101100010"),
        (FieldPathOp::FieldPathEncodeFinish, "10"),
    ];

    fn code_string(op: FieldPathOp) -> String {
        let code = FieldPathTree::get().codes[op as usize];
        (0..code.len)
            .map(|i| if (code.bits >> i) & 1 == 1 { '1' } else { '0' })
            .collect()
    }

    #[test]
    fn every_op_has_its_canonical_code() {
        for (op, expected) in CANONICAL_CODES {
            assert_eq!(code_string(op), expected, "{op}");
        }
    }

    #[test]
    fn canonical_bytes_decode_to_nested_paths() {
        // 1111 110 010        push-one pack6: left +3+2, right 2+1 -> [4, 3]
        // 110110001101        push-one delta zero, right zero     -> [4, 3, 0]
        // 0                   plus one                            -> [4, 3, 1]
        // 10                  finish
        let bytes = [0x3f, 0x6d, 0xac, 0x00];
        assert_eq!(
            decode(&bytes),
            [path(&[4, 3]), path(&[4, 3, 0]), path(&[4, 3, 1])]
        );
    }

    #[test]
    fn codes_are_prefix_free() {
        let codes = FieldPathTree::get().codes;
        for (i, a) in codes.iter().enumerate() {
            assert!(a.len > 0);
            for (j, b) in codes.iter().enumerate() {
                if i == j || a.len > b.len {
                    continue;
                }
                let mask = (1u64 << a.len) - 1;
                assert_ne!(a.bits, b.bits & mask, "code {i} prefixes code {j}");
            }
        }
    }

    #[test]
    fn finish_alone_yields_no_paths() {
        let mut w = BitWriter::new();
        write_op(&mut w, FieldPathOp::FieldPathEncodeFinish).unwrap();
        assert!(decode(&w.finish()).is_empty());
    }

    #[test]
    fn plus_ops_walk_the_root_level() {
        let mut w = BitWriter::new();
        write_op(&mut w, FieldPathOp::PlusOne).unwrap();
        write_op(&mut w, FieldPathOp::PlusTwo).unwrap();
        write_op(&mut w, FieldPathOp::PlusN).unwrap();
        w.write_ubitvar_fp(3).unwrap();
        write_op(&mut w, FieldPathOp::FieldPathEncodeFinish).unwrap();
        assert_eq!(decode(&w.finish()), [path(&[0]), path(&[2]), path(&[10])]);
    }

    #[test]
    fn packed_pushes_and_pops() {
        let mut w = BitWriter::new();
        // [-1] -> [4, 3]
        write_op(&mut w, FieldPathOp::PushOneLeftDeltaNRightNonZeroPack6Bits).unwrap();
        w.write_bits(3, 3).unwrap();
        w.write_bits(2, 3).unwrap();
        // [4, 3] -> [4, 3, 7, 1]
        write_op(&mut w, FieldPathOp::PushTwoPack5LeftDeltaZero).unwrap();
        w.write_bits(7, 5).unwrap();
        w.write_bits(1, 5).unwrap();
        // [4, 3, 7, 1] -> [4, 4]
        write_op(&mut w, FieldPathOp::PopNPlusOne).unwrap();
        w.write_ubitvar_fp(2).unwrap();
        // [4, 4] -> [9]
        write_op(&mut w, FieldPathOp::PopAllButOnePlusNPack3Bits).unwrap();
        w.write_bits(4, 3).unwrap();
        write_op(&mut w, FieldPathOp::FieldPathEncodeFinish).unwrap();

        assert_eq!(
            decode(&w.finish()),
            [path(&[4, 3]), path(&[4, 3, 7, 1]), path(&[4, 4]), path(&[9])]
        );
    }

    #[test]
    fn non_topological_ops_adjust_every_level() {
        let mut w = BitWriter::new();
        write_op(&mut w, FieldPathOp::PushThreeLeftDeltaOne).unwrap();
        for v in [2, 0, 5] {
            w.write_ubitvar_fp(v).unwrap();
        }
        // [0, 2, 0, 5]: +1 on level 1, -7+9 on level 3
        write_op(&mut w, FieldPathOp::NonTopoComplexPack4Bits).unwrap();
        w.write_bool(false);
        w.write_bool(true);
        w.write_bits(8, 4).unwrap();
        w.write_bool(false);
        w.write_bool(true);
        w.write_bits(9, 4).unwrap();
        write_op(&mut w, FieldPathOp::NonTopoPenultimatePlusOne).unwrap();
        write_op(&mut w, FieldPathOp::FieldPathEncodeFinish).unwrap();

        assert_eq!(
            decode(&w.finish()),
            [path(&[0, 2, 0, 5]), path(&[0, 3, 0, 7]), path(&[0, 3, 1, 7])]
        );
    }

    #[test]
    fn push_n_reads_count_then_levels() {
        let mut w = BitWriter::new();
        write_op(&mut w, FieldPathOp::PushN).unwrap();
        w.write_ubitvar(3);
        w.write_ubitvar(2);
        for v in [6, 0, 11] {
            w.write_ubitvar_fp(v).unwrap();
        }
        write_op(&mut w, FieldPathOp::FieldPathEncodeFinish).unwrap();
        assert_eq!(decode(&w.finish()), [path(&[1, 6, 0, 11])]);
    }

    #[test]
    fn penultimate_on_root_is_rejected() {
        let mut w = BitWriter::new();
        write_op(&mut w, FieldPathOp::NonTopoPenultimatePlusOne).unwrap();
        let bytes = w.finish();
        let mut reader = BitReader::new(&bytes);
        let err = read_field_paths(&mut reader, &mut Vec::new(), 8).unwrap_err();
        assert!(matches!(
            err,
            EntityError::FieldPath {
                op: FieldPathOp::NonTopoPenultimatePlusOne,
                source: FieldPathError::NoParent,
            }
        ));
    }

    #[test]
    fn pushing_past_max_depth_fails() {
        let mut w = BitWriter::new();
        for _ in 0..3 {
            write_op(&mut w, FieldPathOp::PushThreePack5LeftDeltaZero).unwrap();
            w.write_bits(0, 15).unwrap();
        }
        let bytes = w.finish();
        let mut reader = BitReader::new(&bytes);
        let err = read_field_paths(&mut reader, &mut Vec::new(), 8).unwrap_err();
        assert!(matches!(err, EntityError::FieldPath { source: FieldPathError::TooDeep { .. }, .. }));
    }

    #[test]
    fn limit_is_enforced() {
        let paths: Vec<_> = (0..4).map(|i| path(&[i])).collect();
        let mut w = BitWriter::new();
        write_field_paths(&mut w, &paths).unwrap();
        let bytes = w.finish();
        let mut reader = BitReader::new(&bytes);
        let err = read_field_paths(&mut reader, &mut Vec::new(), 3).unwrap_err();
        assert!(matches!(
            err,
            EntityError::LimitExceeded {
                kind: LimitKind::FieldPathsPerUpdate,
                limit: 3,
                actual: 4,
            }
        ));
    }

    #[test]
    fn truncated_stream_is_unexpected_end() {
        let mut w = BitWriter::new();
        write_op(&mut w, FieldPathOp::PlusOne).unwrap();
        let bytes = w.finish();
        let mut reader = BitReader::new(&bytes);
        let err = read_field_paths(&mut reader, &mut Vec::new(), 8).unwrap_err();
        assert!(err.is_unexpected_end());
    }

    #[test]
    fn encoder_round_trips_mixed_depths() {
        let paths = [
            path(&[0]),
            path(&[1]),
            path(&[1, 0]),
            path(&[1, 0, 2]),
            path(&[1, 0, 2, 5]),
            path(&[1, 1]),
            path(&[3, 0, 0]),
            path(&[40]),
            path(&[41, 17]),
            path(&[44, 2, 9, 9, 1]),
            path(&[44, 2, 9]),
            path(&[45]),
        ];
        let mut w = BitWriter::new();
        write_field_paths(&mut w, &paths).unwrap();
        assert_eq!(decode(&w.finish()), paths);
    }
}
