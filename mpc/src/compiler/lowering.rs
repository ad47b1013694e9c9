use itertools::Itertools;

use super::{
    program::{Constant, InputBinding, Instruction, OutputBinding, Program, Reg},
    CompileError, CompileOptions,
};
use crate::{
    circuit::{Circuit, Literal, NodeId, Op, Visibility},
    dealer::MaterialManifest,
};

/// Single element or pair of elements of the same type.
enum SingleOrPair<T> {
    Single(T),
    Pair(T, T),
}

/// Batch iterator into pairs and maybe a leftover single element.
fn batch_pairs<T>(it: impl IntoIterator<Item = T>) -> impl Iterator<Item = SingleOrPair<T>> {
    it.into_iter().batching(|it| {
        it.next().map(|first| match it.next() {
            Some(second) => SingleOrPair::Pair(first, second),
            None => SingleOrPair::Single(first),
        })
    })
}

/// Pair whose multiplications are emitted but not yet combined.
enum Staged<T, M> {
    Done(T),
    Pending(T, T, M),
}

/// Result of comparing two bit strings: `cmp` is the sign of `lhs - rhs`, `neq` is `[lhs != rhs]`.
#[derive(Copy, Clone)]
struct Comparison {
    cmp: Reg,
    neq: Reg,
}

pub(super) struct Lowering<'a> {
    circuit: &'a Circuit,
    options: &'a CompileOptions,
    instructions: Vec<Instruction>,
    /// Visibility of every allocated register.
    secret: Vec<bool>,
    manifest: MaterialManifest,
    /// Registers holding the leaves of each lowered node.
    nodes: Vec<Option<Vec<Reg>>>,
}

impl<'a> Lowering<'a> {
    pub fn new(circuit: &'a Circuit, options: &'a CompileOptions) -> Self {
        Self {
            circuit,
            options,
            instructions: Vec::new(),
            secret: Vec::new(),
            manifest: MaterialManifest::default(),
            nodes: vec![None; circuit.nodes.len()],
        }
    }

    pub fn run(mut self) -> Result<Program, CompileError> {
        let circuit = self.circuit;
        let reachable = self.reachable()?;

        // All inputs are lowered first so that they are distributed in a single round.
        for (index, input) in circuit.inputs.iter().enumerate() {
            let node = circuit
                .node(input.node)
                .filter(|node| node.op == Op::Input(index) && node.ty == input.ty)
                .ok_or(CompileError::MalformedNode(input.node.index()))?;
            if input.party.index() >= circuit.parties.len() {
                return Err(CompileError::MalformedNode(input.node.index()));
            }

            let mut regs = Vec::with_capacity(node.ty.num_leaves());
            for (element, leaf) in node.ty.leaves().into_iter().enumerate() {
                regs.push(match leaf.visibility {
                    Visibility::Secret => self.push(true, |dst| Instruction::ShareInput {
                        dst,
                        input: index,
                        element,
                    }),
                    Visibility::Public => self.push(false, |dst| Instruction::PublicInput {
                        dst,
                        input: index,
                        element,
                    }),
                });
            }
            self.nodes[input.node.index()] = Some(regs);
        }

        for (id, node) in circuit.nodes.iter().enumerate() {
            if !reachable[id] {
                continue;
            }
            if let Op::Input(_) = node.op {
                if self.nodes[id].is_none() {
                    return Err(CompileError::MalformedNode(id));
                }
                continue;
            }
            let regs = self.lower_node(id, &node.op)?;
            if regs.len() != node.ty.num_leaves() {
                return Err(CompileError::MalformedNode(id));
            }
            self.nodes[id] = Some(regs);
        }

        for (index, output) in circuit.outputs.iter().enumerate() {
            if output.party.index() >= circuit.parties.len() {
                return Err(CompileError::UnreachableOutput(output.name.clone()));
            }
            for (element, src) in self.regs(output.node)?.into_iter().enumerate() {
                self.instructions.push(Instruction::Output {
                    src,
                    output: index,
                    element,
                });
            }
        }

        Ok(Program {
            parties: circuit.parties.iter().map(|x| x.name.clone()).collect(),
            inputs: circuit
                .inputs
                .iter()
                .map(|input| InputBinding {
                    name: input.name.clone(),
                    party: input.party.index(),
                    ty: input.ty.clone(),
                })
                .collect(),
            outputs: circuit
                .outputs
                .iter()
                .map(|output| OutputBinding {
                    name: output.name.clone(),
                    party: output.party.index(),
                    ty: circuit.nodes[output.node.index()].ty.clone(),
                })
                .collect(),
            instructions: self.instructions,
            manifest: self.manifest,
            num_registers: self.secret.len() as u32,
            mask_bits: self.options.mask_bits,
        })
    }

    /// Mark nodes the outputs depend on. Also checks that operands precede their users.
    fn reachable(&self) -> Result<Vec<bool>, CompileError> {
        let nodes = &self.circuit.nodes;
        let mut reachable = vec![false; nodes.len()];
        for output in &self.circuit.outputs {
            match reachable.get_mut(output.node.index()) {
                Some(flag) => *flag = true,
                None => return Err(CompileError::UnreachableOutput(output.name.clone())),
            }
        }

        for id in (0..nodes.len()).rev() {
            if !reachable[id] {
                continue;
            }
            for operand in nodes[id].op.operands() {
                if operand.index() >= id {
                    return Err(CompileError::MalformedNode(id));
                }
                reachable[operand.index()] = true;
            }
        }
        Ok(reachable)
    }

    fn lower_node(&mut self, id: usize, op: &Op) -> Result<Vec<Reg>, CompileError> {
        let regs = match op {
            Op::Input(_) => return Err(CompileError::MalformedNode(id)),
            Op::Constant(literal) => {
                let value = match *literal {
                    Literal::Integer(value) => value,
                    Literal::Boolean(value) => value as i64,
                };
                vec![self.constant(Constant::Int(value))]
            }
            Op::Add(a, b) => {
                let (a, b) = (self.scalar(*a)?, self.scalar(*b)?);
                vec![self.add(a, b)]
            }
            Op::Sub(a, b) => {
                let (a, b) = (self.scalar(*a)?, self.scalar(*b)?);
                vec![self.sub(a, b)]
            }
            Op::Mul(a, b) | Op::And(a, b) => {
                let (a, b) = (self.scalar(*a)?, self.scalar(*b)?);
                vec![self.mul(a, b)]
            }
            Op::Or(a, b) => {
                let (a, b) = (self.scalar(*a)?, self.scalar(*b)?);
                vec![self.or(a, b)]
            }
            Op::Not(a) => {
                let a = self.scalar(*a)?;
                vec![self.one_minus(a)]
            }
            Op::Equals(a, b) => {
                let bits = self.bits(*a)?;
                let diff = self.difference(*a, *b)?;
                vec![self.equals_zero(diff, bits)?]
            }
            Op::PublicEquals(a, b) => {
                let diff = self.difference(*a, *b)?;
                vec![self.public_equals_zero(diff)]
            }
            Op::LessThan(a, b) => {
                let bits = self.bits(*a)?;
                let (lhs, rhs) = (self.scalar(*a)?, self.scalar(*b)?);
                if self.is_secret(lhs) || self.is_secret(rhs) {
                    let diff = self.sub(lhs, rhs);
                    vec![self.less_than_zero(diff, bits)?]
                } else {
                    vec![self.push(false, |dst| Instruction::PublicLess {
                        dst,
                        lhs,
                        rhs,
                        bits,
                    })]
                }
            }
            Op::Select {
                cond,
                if_true,
                if_false,
            } => {
                let cond = self.scalar(*cond)?;
                let if_true = self.regs(*if_true)?;
                let if_false = self.regs(*if_false)?;
                if if_true.len() != if_false.len() {
                    return Err(CompileError::MalformedNode(id));
                }
                self.select(cond, &if_true, &if_false)
            }
            Op::Array(items) | Op::Tuple(items) => {
                let mut regs = Vec::new();
                for item in items {
                    regs.extend(self.regs(*item)?);
                }
                regs
            }
            Op::Index { src, index } => {
                let (elem, offset) = self
                    .circuit
                    .node(*src)
                    .and_then(|node| node.ty.element(*index))
                    .ok_or(CompileError::MalformedNode(id))?;
                self.regs(*src)?
                    .get(offset..offset + elem.num_leaves())
                    .ok_or(CompileError::MalformedNode(id))?
                    .to_vec()
            }
        };
        Ok(regs)
    }

    fn regs(&self, id: NodeId) -> Result<Vec<Reg>, CompileError> {
        self.nodes
            .get(id.index())
            .and_then(Option::clone)
            .ok_or(CompileError::MalformedNode(id.index()))
    }

    fn scalar(&self, id: NodeId) -> Result<Reg, CompileError> {
        match self.regs(id)?.as_slice() {
            [reg] => Ok(*reg),
            _ => Err(CompileError::MalformedNode(id.index())),
        }
    }

    /// Width of a scalar operand in bits.
    fn bits(&self, id: NodeId) -> Result<u32, CompileError> {
        self.circuit
            .node(id)
            .and_then(|node| node.ty.as_scalar())
            .map(|scalar| scalar.kind.bits())
            .ok_or(CompileError::MalformedNode(id.index()))
    }

    fn difference(&mut self, a: NodeId, b: NodeId) -> Result<Reg, CompileError> {
        let (a, b) = (self.scalar(a)?, self.scalar(b)?);
        Ok(self.sub(a, b))
    }

    fn is_secret(&self, reg: Reg) -> bool {
        self.secret[reg.index()]
    }

    fn push(&mut self, secret: bool, make: impl FnOnce(Reg) -> Instruction) -> Reg {
        let dst = Reg(self.secret.len() as u32);
        self.secret.push(secret);
        self.instructions.push(make(dst));
        dst
    }

    fn constant(&mut self, value: Constant) -> Reg {
        self.push(false, |dst| Instruction::Const { dst, value })
    }

    fn add(&mut self, lhs: Reg, rhs: Reg) -> Reg {
        let secret = self.is_secret(lhs) || self.is_secret(rhs);
        self.push(secret, |dst| Instruction::Add { dst, lhs, rhs })
    }

    fn sub(&mut self, lhs: Reg, rhs: Reg) -> Reg {
        let secret = self.is_secret(lhs) || self.is_secret(rhs);
        self.push(secret, |dst| Instruction::Sub { dst, lhs, rhs })
    }

    /// Product. Costs a triple and a round only if both factors are secret.
    fn mul(&mut self, lhs: Reg, rhs: Reg) -> Reg {
        if self.is_secret(lhs) && self.is_secret(rhs) {
            let triple = self.manifest.triples;
            self.manifest.triples += 1;
            self.push(true, |dst| Instruction::Mul {
                dst,
                lhs,
                rhs,
                triple,
            })
        } else {
            let secret = self.is_secret(lhs) || self.is_secret(rhs);
            self.push(secret, |dst| Instruction::Scale { dst, lhs, rhs })
        }
    }

    fn scale_const(&mut self, src: Reg, value: Constant) -> Reg {
        let secret = self.is_secret(src);
        self.push(secret, |dst| Instruction::ScaleConst { dst, src, value })
    }

    fn one_minus(&mut self, src: Reg) -> Reg {
        let one = self.constant(Constant::Int(1));
        self.sub(one, src)
    }

    fn or(&mut self, lhs: Reg, rhs: Reg) -> Reg {
        let product = self.mul(lhs, rhs);
        let sum = self.add(lhs, rhs);
        self.sub(sum, product)
    }

    fn open(&mut self, src: Reg) -> Reg {
        if self.is_secret(src) {
            self.push(false, |dst| Instruction::Open { dst, src })
        } else {
            src
        }
    }

    fn random_bit(&mut self) -> Reg {
        let bit = self.manifest.random_bits;
        self.manifest.random_bits += 1;
        self.push(true, |dst| Instruction::RandomBit { dst, bit })
    }

    fn random_uint(&mut self, bits: u32) -> Reg {
        let first_bit = self.manifest.random_bits;
        self.manifest.random_bits += bits as usize;
        self.push(true, |dst| Instruction::RandomUint {
            dst,
            bits,
            first_bit,
        })
    }

    fn random_element(&mut self) -> Reg {
        let element = self.manifest.random_elements;
        self.manifest.random_elements += 1;
        self.push(true, |dst| Instruction::RandomElement { dst, element })
    }

    /// Element-wise `cond * (if_true - if_false) + if_false`.
    fn select(&mut self, cond: Reg, if_true: &[Reg], if_false: &[Reg]) -> Vec<Reg> {
        let diffs: Vec<_> = if_true
            .iter()
            .zip(if_false)
            .map(|(t, f)| self.sub(*t, *f))
            .collect();
        let products: Vec<_> = diffs.into_iter().map(|d| self.mul(cond, d)).collect();
        products
            .into_iter()
            .zip(if_false)
            .map(|(p, f)| self.add(p, *f))
            .collect()
    }

    /// Combine elements pairwise in log_2(n) levels. All multiplications of a level are
    /// emitted before its combinations, so every level takes a single round.
    fn fold_tree<T, M>(
        &mut self,
        mut elems: Vec<T>,
        multiply: impl Fn(&mut Self, &T, &T) -> M,
        combine: impl Fn(&mut Self, T, T, M) -> T,
    ) -> Option<T> {
        while elems.len() > 1 {
            let mut staged = Vec::with_capacity(elems.len() / 2 + 1);
            for pair in batch_pairs(elems) {
                staged.push(match pair {
                    SingleOrPair::Single(value) => Staged::Done(value),
                    SingleOrPair::Pair(lhs, rhs) => {
                        let product = multiply(self, &lhs, &rhs);
                        Staged::Pending(lhs, rhs, product)
                    }
                });
            }
            elems = Vec::with_capacity(staged.len());
            for stage in staged {
                elems.push(match stage {
                    Staged::Done(value) => value,
                    Staged::Pending(lhs, rhs, product) => combine(self, lhs, rhs, product),
                });
            }
        }
        elems.into_iter().next()
    }

    /// Open `value + 2^m + mask` where the low `m` bits of the mask are individually shared.
    /// `value` must lie in `[-2^m, 2^m)`. Returns the opened value, the low part of the mask
    /// and its bits, least significant first.
    fn masked_open(&mut self, value: Reg, m: u32) -> Result<(Reg, Reg, Vec<Reg>), CompileError> {
        let mask_bits = self.options.mask_bits;
        let required = m + 1 + self.options.statistical_security;
        if required > mask_bits {
            return Err(CompileError::FieldTooSmall {
                required,
                available: mask_bits,
            });
        }

        let bits: Vec<_> = (0..m).map(|_| self.random_bit()).collect();
        let low = self.push(true, |dst| Instruction::BitCompose {
            dst,
            bits: bits.clone(),
        });
        let high = self.random_uint(mask_bits - m);
        let high = self.scale_const(high, Constant::PowerOfTwo(m));
        let mask = self.add(high, low);

        let offset = self.constant(Constant::PowerOfTwo(m));
        let shifted = self.add(value, offset);
        let masked = self.add(shifted, mask);
        Ok((self.open(masked), low, bits))
    }

    fn public_bit(&mut self, src: Reg, index: u32) -> Reg {
        self.push(false, |dst| Instruction::Bit { dst, src, index })
    }

    fn bit_xor(&mut self, lhs: Reg, rhs: Reg) -> Reg {
        let secret = self.is_secret(lhs) || self.is_secret(rhs);
        self.push(secret, |dst| Instruction::BitXor { dst, lhs, rhs })
    }

    /// `[value == 0]` for `value` in `(-2^bits, 2^bits)`, secret unless `value` is public.
    fn equals_zero(&mut self, value: Reg, bits: u32) -> Result<Reg, CompileError> {
        if !self.is_secret(value) {
            return Ok(self.push(false, |dst| Instruction::IsZero { dst, src: value }));
        }

        // value == 0 iff the low bits of the opened value equal the low bits of the mask.
        let (opened, _, mask) = self.masked_open(value, bits)?;
        let mut diffs = Vec::with_capacity(mask.len());
        for (i, r) in mask.into_iter().enumerate() {
            let c = self.public_bit(opened, i as u32);
            diffs.push(self.bit_xor(c, r));
        }

        let any = self.fold_tree(diffs, |l, a, b| l.mul(*a, *b), |l, a, b, ab| {
            let sum = l.add(a, b);
            l.sub(sum, ab)
        });
        Ok(match any {
            Some(any) => self.one_minus(any),
            None => self.constant(Constant::Int(1)),
        })
    }

    /// `[value == 0]` revealed to all computing parties. Only the result leaks.
    fn public_equals_zero(&mut self, value: Reg) -> Reg {
        let value = if self.is_secret(value) {
            let r = self.random_element();
            let blinded = self.mul(r, value);
            self.open(blinded)
        } else {
            value
        };
        self.push(false, |dst| Instruction::IsZero { dst, src: value })
    }

    /// `[value < 0]` for secret `value` in `(-2^bits, 2^bits)`.
    fn less_than_zero(&mut self, value: Reg, bits: u32) -> Result<Reg, CompileError> {
        let m = bits;
        let (opened, low, mask) = self.masked_open(value, m)?;
        let opened_low = self.push(false, |dst| Instruction::LowBits {
            dst,
            src: opened,
            bits: m,
        });

        // Compare the low bits of the opened value with the mask bits.
        let mut leaves = Vec::with_capacity(mask.len());
        for (i, r) in mask.into_iter().enumerate() {
            let c = self.public_bit(opened, i as u32);
            let cmp = self.sub(c, r);
            let neq = self.bit_xor(c, r);
            leaves.push(Comparison { cmp, neq });
        }
        let total = self.fold_tree(
            leaves,
            |l, lower, higher| (l.mul(lower.cmp, higher.neq), l.mul(lower.neq, higher.neq)),
            |l, lower, higher, (a, b)| {
                let cmp = l.add(lower.cmp, higher.cmp);
                let neq = l.add(lower.neq, higher.neq);
                Comparison {
                    cmp: l.sub(cmp, a),
                    neq: l.sub(neq, b),
                }
            },
        );
        let below = match total {
            Some(total) => {
                let diff = self.sub(total.neq, total.cmp);
                self.scale_const(diff, Constant::InvPowerOfTwo(1))
            }
            None => self.constant(Constant::Int(0)),
        };

        // value mod 2^m, then the borrow of the division by 2^m.
        let correction = self.scale_const(below, Constant::PowerOfTwo(m));
        let remainder = self.sub(opened_low, low);
        let remainder = self.add(remainder, correction);
        let diff = self.sub(remainder, value);
        Ok(self.scale_const(diff, Constant::InvPowerOfTwo(m)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        circuit::{BuildContext, ValueType},
        compiler::{compile, RoundKind, Step},
        dealer::MaterialKind,
        fields::Mersenne61,
    };

    fn options() -> CompileOptions {
        CompileOptions::default()
    }

    #[test]
    fn test_public_arithmetic_needs_no_material() {
        let mut ctx = BuildContext::new();
        let alice = ctx.party("Alice").unwrap();
        let x = ctx.public_integer("x", alice).unwrap();
        let y = ctx.integer(5).unwrap();
        let prod = ctx.multiply(x, y).unwrap();
        let lt = ctx.less_than(prod, y).unwrap();
        let eq = ctx.equals(prod, x).unwrap();
        ctx.output(lt, "lt", alice).unwrap();
        ctx.output(eq, "eq", alice).unwrap();

        let program = compile(&ctx.finish(), &options()).unwrap();
        assert_eq!(program.manifest, MaterialManifest::default());
        assert!(program
            .instructions
            .iter()
            .all(|instr| !matches!(instr, Instruction::Open { .. } | Instruction::Mul { .. })));
    }

    #[test]
    fn test_secret_times_public_is_local() {
        let mut ctx = BuildContext::new();
        let alice = ctx.party("Alice").unwrap();
        let x = ctx.secret_integer("x", alice).unwrap();
        let y = ctx.integer(5).unwrap();
        let prod = ctx.multiply(x, y).unwrap();
        ctx.output(prod, "out", alice).unwrap();

        let program = compile(&ctx.finish(), &options()).unwrap();
        assert_eq!(program.manifest.triples, 0);
        assert!(program
            .instructions
            .iter()
            .any(|instr| matches!(instr, Instruction::Scale { .. })));
    }

    #[test]
    fn test_select_costs_one_triple_per_leaf() {
        let mut ctx = BuildContext::new();
        let alice = ctx.party("Alice").unwrap();
        let cond = ctx.secret_boolean("c", alice).unwrap();
        let a = ctx.secret_integer("a", alice).unwrap();
        let b = ctx.secret_integer("b", alice).unwrap();
        let pair_ab = ctx.array(&[a, b]).unwrap();
        let pair_ba = ctx.array(&[b, a]).unwrap();
        let chosen = ctx.if_else(cond, pair_ab, pair_ba).unwrap();
        ctx.output(chosen, "out", alice).unwrap();

        let program = compile(&ctx.finish(), &options()).unwrap();
        assert_eq!(program.manifest.triples, 2);
        // inputs, both multiplications together, outputs
        assert_eq!(program.num_rounds(), 3);
    }

    #[test]
    fn test_equality_costs() {
        let mut ctx = BuildContext::new();
        let alice = ctx.party("Alice").unwrap();
        let bob = ctx.party("Bob").unwrap();
        let x = ctx.input("x", alice, ValueType::integer(8, Visibility::Secret)).unwrap();
        let y = ctx.input("y", bob, ValueType::integer(8, Visibility::Secret)).unwrap();
        let eq = ctx.equals(x, y).unwrap();
        ctx.output(eq, "eq", alice).unwrap();

        let opts = options();
        let program = compile(&ctx.finish(), &opts).unwrap();
        assert_eq!(program.manifest.triples, 7);
        assert_eq!(program.manifest.random_bits, opts.mask_bits as usize);
        assert_eq!(program.manifest.random_elements, 0);
        // inputs, masked opening, 3 tree levels, outputs
        assert_eq!(program.num_rounds(), 6);
    }

    #[test]
    fn test_public_equality_costs() {
        let mut ctx = BuildContext::new();
        let alice = ctx.party("Alice").unwrap();
        let bob = ctx.party("Bob").unwrap();
        let x = ctx.secret_integer("x", alice).unwrap();
        let y = ctx.secret_integer("y", bob).unwrap();
        let eq = ctx.public_equals(x, y).unwrap();
        ctx.output(eq, "eq", alice).unwrap();

        let program = compile(&ctx.finish(), &options()).unwrap();
        assert_eq!(
            program.manifest,
            MaterialManifest {
                triples: 1,
                random_bits: 0,
                random_elements: 1,
            }
        );
        let steps = program.steps();
        assert!(matches!(steps[0], Step::Round(RoundKind::Inputs, _)));
        assert!(matches!(steps.last(), Some(Step::Round(RoundKind::Outputs, _))));
    }

    #[test]
    fn test_less_than_costs() {
        let mut ctx = BuildContext::new();
        let alice = ctx.party("Alice").unwrap();
        let x = ctx.input("x", alice, ValueType::integer(16, Visibility::Secret)).unwrap();
        let y = ctx.input("y", alice, ValueType::integer(16, Visibility::Secret)).unwrap();
        let lt = ctx.less_than(x, y).unwrap();
        ctx.output(lt, "lt", alice).unwrap();

        let program = compile(&ctx.finish(), &options()).unwrap();
        assert_eq!(program.manifest.triples, 2 * 15);
        // inputs, masked opening, 4 tree levels, outputs
        assert_eq!(program.num_rounds(), 7);
    }

    #[test]
    fn test_unreachable_nodes_are_skipped() {
        let mut ctx = BuildContext::new();
        let alice = ctx.party("Alice").unwrap();
        let x = ctx.secret_integer("x", alice).unwrap();
        let y = ctx.secret_integer("y", alice).unwrap();
        ctx.multiply(x, y).unwrap();
        ctx.output(x, "x", alice).unwrap();

        let program = compile(&ctx.finish(), &options()).unwrap();
        assert_eq!(program.manifest.triples, 0);
    }

    #[test]
    fn test_unreachable_output() {
        let mut ctx = BuildContext::new();
        let alice = ctx.party("Alice").unwrap();
        let x = ctx.secret_integer("x", alice).unwrap();
        ctx.output(x, "x", alice).unwrap();
        let mut circuit = ctx.finish();
        circuit.outputs[0].node = NodeId(42);

        assert_eq!(
            compile(&circuit, &options()),
            Err(CompileError::UnreachableOutput("x".into()))
        );
    }

    #[test]
    fn test_cyclic_reference_rejected() {
        let mut ctx = BuildContext::new();
        let alice = ctx.party("Alice").unwrap();
        let x = ctx.secret_integer("x", alice).unwrap();
        let y = ctx.add(x, x).unwrap();
        ctx.output(y, "y", alice).unwrap();
        let mut circuit = ctx.finish();
        circuit.nodes[1].op = Op::Add(x, y);

        assert_eq!(
            compile(&circuit, &options()),
            Err(CompileError::MalformedNode(1))
        );
    }

    #[test]
    fn test_material_budget() {
        let mut ctx = BuildContext::new();
        let alice = ctx.party("Alice").unwrap();
        let x = ctx.secret_integer("x", alice).unwrap();
        let sq = ctx.multiply(x, x).unwrap();
        let cube = ctx.multiply(sq, x).unwrap();
        ctx.output(cube, "cube", alice).unwrap();
        let circuit = ctx.finish();

        let opts = CompileOptions {
            max_triples: Some(1),
            ..options()
        };
        assert_eq!(
            compile(&circuit, &opts),
            Err(CompileError::MaterialBudgetExceeded {
                kind: MaterialKind::BeaverTriple,
                required: 2,
                budget: 1,
            })
        );
        let opts = CompileOptions {
            max_triples: Some(2),
            ..options()
        };
        assert!(compile(&circuit, &opts).is_ok());
    }

    #[test]
    fn test_field_too_small() {
        let mut ctx = BuildContext::new();
        let alice = ctx.party("Alice").unwrap();
        let x = ctx.secret_integer("x", alice).unwrap();
        let zero = ctx.integer(0).unwrap();
        let lt = ctx.less_than(x, zero).unwrap();
        ctx.output(lt, "lt", alice).unwrap();

        let opts = CompileOptions::for_field::<Mersenne61>();
        assert_eq!(
            compile(&ctx.finish(), &opts),
            Err(CompileError::FieldTooSmall {
                required: 32 + 1 + 40,
                available: 59,
            })
        );
    }

    #[test]
    fn test_deterministic_bytes() {
        let build = || {
            let mut ctx = BuildContext::new();
            let alice = ctx.party("Alice").unwrap();
            let bob = ctx.party("Bob").unwrap();
            let x = ctx.secret_integer("x", alice).unwrap();
            let y = ctx.secret_integer("y", bob).unwrap();
            let lt = ctx.less_than(x, y).unwrap();
            let eq = ctx.equals(x, y).unwrap();
            let either = ctx.or(lt, eq).unwrap();
            let max = ctx.if_else(either, y, x).unwrap();
            ctx.output(max, "max", bob).unwrap();
            ctx.finish()
        };

        let first = compile(&build(), &options()).unwrap();
        let second = compile(&build(), &options()).unwrap();
        assert_eq!(first.to_bytes().unwrap(), second.to_bytes().unwrap());
    }
}
