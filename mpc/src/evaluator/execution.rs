use std::{collections::BTreeMap, ops::Range};

use ff::Field;

use super::{
    ExecutionState, ExecutionStats, MpcMessage, PartyAssignment, RuntimeError,
};
use crate::{
    circuit::{InputValue, OutputValue, PlainScalar, PlainValue, ScalarKind},
    compiler::{Instruction, Program, Reg, RoundKind, Step},
    dealer::{BeaverTriple, MpcDealer},
    fields::{decode_bool, decode_int, encode_int, MpcField},
    sharing::{Share, SharingScheme},
    transport::Transport,
    MpcContext,
};

/// Content of a register.
#[derive(Copy, Clone, Debug)]
enum Value<T> {
    Public(T),
    Secret(Share<T>),
}

/// Opening request waiting for its round to complete.
enum PendingOpen<T> {
    Open { dst: Reg },
    Mul { dst: Reg, triple: BeaverTriple<T> },
}

/// One computing party's run of a compiled program.
///
/// Every party creates its own execution over the same program, binds the inputs of the
/// program parties it plays, and runs. Values and material are never shared between executions.
pub struct Execution<'a, D: MpcDealer, Tr> {
    program: &'a Program,
    assignment: PartyAssignment,
    scheme: SharingScheme,
    dealer: D,
    transport: Option<Tr>,
    state: ExecutionState,
    stats: ExecutionStats,
    party_id: usize,
    /// Encoded leaves of inputs supplied by this node, by input index.
    own_inputs: Vec<Option<Vec<D::Field>>>,
    registers: Vec<Option<Value<D::Field>>>,
    remaining_uses: Vec<usize>,
    /// Revealed leaves of outputs addressed to this node, by output index.
    output_leaves: Vec<Vec<Option<D::Field>>>,
    sharing_started: bool,
}

impl<'a, F, D, Tr> Execution<'a, D, Tr>
where
    F: MpcField,
    D: MpcDealer<Field = F>,
    Tr: Transport<MpcMessage<F>>,
{
    pub fn new(
        program: &'a Program,
        assignment: PartyAssignment,
        scheme: SharingScheme,
        dealer: D,
        transport: Tr,
    ) -> Result<Self, RuntimeError> {
        let num_parties = scheme.num_parties();
        let party_id = transport.party_id();
        if transport.num_parties() != num_parties || dealer.num_parties() != num_parties {
            return Err(RuntimeError::InvalidConfiguration(format!(
                "scheme has {} parties, transport {}, dealer {}",
                num_parties,
                transport.num_parties(),
                dealer.num_parties()
            )));
        }
        if dealer.party_id() != party_id {
            return Err(RuntimeError::InvalidConfiguration(format!(
                "dealer serves party {}, transport belongs to party {}",
                dealer.party_id(),
                party_id
            )));
        }
        if program.mask_bits > F::SAFE_BITS {
            return Err(RuntimeError::InvalidConfiguration(format!(
                "program uses {}-bit masks, field allows {}",
                program.mask_bits,
                F::SAFE_BITS
            )));
        }
        assignment.validate(program, num_parties)?;

        let mut remaining_uses = vec![0; program.num_registers as usize];
        for instr in &program.instructions {
            for src in instr.sources() {
                if let Some(uses) = remaining_uses.get_mut(src.index()) {
                    *uses += 1;
                }
            }
        }

        Ok(Self {
            program,
            assignment,
            scheme,
            dealer,
            transport: Some(transport),
            state: ExecutionState::Idle,
            stats: ExecutionStats::default(),
            party_id,
            own_inputs: vec![None; program.inputs.len()],
            registers: vec![None; program.num_registers as usize],
            remaining_uses,
            output_leaves: program
                .outputs
                .iter()
                .map(|output| vec![None; output.ty.num_leaves()])
                .collect(),
            sharing_started: false,
        })
    }

    pub fn state(&self) -> ExecutionState {
        self.state
    }

    pub fn stats(&self) -> ExecutionStats {
        self.stats
    }

    pub fn dealer(&self) -> &D {
        &self.dealer
    }

    /// Supply the inputs of every program party played by this node.
    pub fn bind_inputs(
        &mut self,
        inputs: BTreeMap<String, InputValue>,
    ) -> Result<(), RuntimeError> {
        self.expect_state(ExecutionState::Idle)?;
        let result = self.encode_inputs(inputs);
        match result {
            Ok(()) => {
                self.state = ExecutionState::InputsBound;
                Ok(())
            }
            Err(err) => Err(self.fail(err)),
        }
    }

    /// Run the program to completion. Returns the outputs addressed to this node.
    pub async fn run(&mut self) -> Result<BTreeMap<String, OutputValue>, RuntimeError> {
        self.expect_state(ExecutionState::InputsBound)?;
        self.state = ExecutionState::Running;

        let mut transport = match self.transport.take() {
            Some(transport) => transport,
            None => {
                let err = RuntimeError::InvalidConfiguration("transport is closed".into());
                return Err(self.fail(err));
            }
        };
        let result = match self.execute(&mut transport).await {
            Ok(()) => self.collect_outputs(),
            Err(err) => Err(err),
        };

        match result {
            Ok(outputs) => {
                self.transport = Some(transport);
                self.state = ExecutionState::Completed;
                tracing::info!(
                    party_id = self.party_id,
                    rounds = self.stats.rounds,
                    outputs = outputs.len(),
                    "Execution completed"
                );
                Ok(outputs)
            }
            Err(err) => {
                // Peers blocked on us observe the closed channels and fail as well.
                drop(transport);
                Err(self.fail(err))
            }
        }
    }

    fn expect_state(&self, expected: ExecutionState) -> Result<(), RuntimeError> {
        if self.state == expected {
            Ok(())
        } else {
            Err(RuntimeError::InvalidState {
                expected,
                actual: self.state,
            })
        }
    }

    fn fail(&mut self, err: RuntimeError) -> RuntimeError {
        self.state = ExecutionState::Failed;
        self.transport = None;
        self.registers.iter_mut().for_each(|reg| *reg = None);
        if self.sharing_started {
            tracing::error!(
                party_id = self.party_id,
                potential_leak = true,
                %err,
                "Execution aborted after input sharing began"
            );
        } else {
            tracing::warn!(party_id = self.party_id, %err, "Execution aborted");
        }
        err
    }

    fn owns_party(&self, party: usize) -> bool {
        self.assignment.node(party) == Some(self.party_id)
    }

    fn encode_inputs(&mut self, mut inputs: BTreeMap<String, InputValue>) -> Result<(), RuntimeError> {
        for name in inputs.keys() {
            match self.program.inputs.iter().find(|input| &input.name == name) {
                None => return Err(RuntimeError::UnknownInput(name.clone())),
                Some(input) if !self.owns_party(input.party) => {
                    return Err(RuntimeError::ForeignInput(name.clone()))
                }
                Some(_) => {}
            }
        }

        let program = self.program;
        for (index, input) in program.inputs.iter().enumerate() {
            if !self.owns_party(input.party) {
                continue;
            }
            let value = inputs
                .remove(&input.name)
                .ok_or_else(|| RuntimeError::MissingInput(input.name.clone()))?;
            let leaves = value
                .flatten(&input.ty)
                .map_err(|reason| RuntimeError::InvalidInput {
                    name: input.name.clone(),
                    reason,
                })?;
            self.own_inputs[index] = Some(
                leaves
                    .into_iter()
                    .map(|leaf| match leaf {
                        PlainScalar::Integer(value) => encode_int(value),
                        PlainScalar::Boolean(value) => encode_int(value as i64),
                    })
                    .collect(),
            );
        }
        Ok(())
    }

    async fn execute(&mut self, transport: &mut Tr) -> Result<(), RuntimeError> {
        if let Some(remaining) = self.dealer.remaining() {
            let required = &self.program.manifest;
            if let Some(kind) = remaining.first_shortage(required) {
                return Err(RuntimeError::MaterialExhausted {
                    kind,
                    required: required.get(kind),
                    available: remaining.get(kind),
                });
            }
        }

        let program = self.program;
        for step in program.steps() {
            match step {
                Step::Local(range) => {
                    for i in range.clone() {
                        self.execute_local(&program.instructions[i])?;
                    }
                    self.release(range);
                }
                Step::Round(kind, range) => {
                    tracing::debug!(
                        party_id = self.party_id,
                        round = self.stats.rounds,
                        ?kind,
                        size = range.len(),
                        "Communication round"
                    );
                    match kind {
                        RoundKind::Inputs => self.input_round(transport, range.clone()).await?,
                        RoundKind::Openings => {
                            self.opening_round(transport, range.clone()).await?
                        }
                        RoundKind::Outputs => self.output_round(transport, range.clone()).await?,
                    }
                    self.stats.rounds += 1;
                    self.release(range);
                }
            }
        }
        Ok(())
    }

    /// Drop registers that no later instruction reads.
    fn release(&mut self, range: Range<usize>) {
        let program = self.program;
        for instr in &program.instructions[range] {
            for src in instr.sources() {
                let uses = &mut self.remaining_uses[src.index()];
                *uses = uses.saturating_sub(1);
                if *uses == 0 {
                    self.registers[src.index()] = None;
                }
            }
        }
    }

    fn get(&self, reg: Reg) -> Result<Value<F>, RuntimeError> {
        self.registers
            .get(reg.index())
            .copied()
            .flatten()
            .ok_or_else(|| RuntimeError::InvalidProgram(format!("register {} is not set", reg.0)))
    }

    fn secret(&self, reg: Reg) -> Result<Share<F>, RuntimeError> {
        match self.get(reg)? {
            Value::Secret(share) => Ok(share),
            Value::Public(_) => Err(RuntimeError::InvalidProgram(format!(
                "register {} is not secret",
                reg.0
            ))),
        }
    }

    fn public(&self, reg: Reg) -> Result<F, RuntimeError> {
        match self.get(reg)? {
            Value::Public(value) => Ok(value),
            Value::Secret(_) => Err(RuntimeError::InvalidProgram(format!(
                "register {} is not public",
                reg.0
            ))),
        }
    }

    fn set(&mut self, reg: Reg, value: Value<F>) -> Result<(), RuntimeError> {
        match self.registers.get_mut(reg.index()) {
            Some(slot) => {
                *slot = Some(value);
                Ok(())
            }
            None => Err(RuntimeError::InvalidProgram(format!(
                "register {} out of range",
                reg.0
            ))),
        }
    }

    fn public_share(&self, value: F) -> Share<F> {
        self.scheme.share_of_public(self.party_id, value)
    }

    fn add(&self, lhs: Value<F>, rhs: Value<F>) -> Value<F> {
        match (lhs, rhs) {
            (Value::Public(a), Value::Public(b)) => Value::Public(a + b),
            (Value::Secret(a), Value::Secret(b)) => Value::Secret(a + b),
            (Value::Secret(a), Value::Public(b)) => Value::Secret(a + self.public_share(b)),
            (Value::Public(a), Value::Secret(b)) => Value::Secret(self.public_share(a) + b),
        }
    }

    fn scale(&self, value: Value<F>, factor: F) -> Value<F> {
        match value {
            Value::Public(a) => Value::Public(a * factor),
            Value::Secret(a) => Value::Secret(a * factor),
        }
    }

    fn negate(&self, value: Value<F>) -> Value<F> {
        match value {
            Value::Public(a) => Value::Public(-a),
            Value::Secret(a) => Value::Secret(-a),
        }
    }

    fn check_material(&self, kind: &str, index: usize, used: usize) -> Result<(), RuntimeError> {
        if index != used {
            return Err(RuntimeError::InvalidProgram(format!(
                "{} {} requested out of order, next is {}",
                kind, index, used
            )));
        }
        Ok(())
    }

    fn execute_local(&mut self, instr: &Instruction) -> Result<(), RuntimeError> {
        use Instruction::*;
        let value = match *instr {
            Const { value, .. } => Value::Public(value.to_field()),
            Add { lhs, rhs, .. } => self.add(self.get(lhs)?, self.get(rhs)?),
            Sub { lhs, rhs, .. } => {
                let rhs = self.negate(self.get(rhs)?);
                self.add(self.get(lhs)?, rhs)
            }
            Scale { lhs, rhs, .. } => match (self.get(lhs)?, self.get(rhs)?) {
                (value, Value::Public(factor)) | (Value::Public(factor), value) => {
                    self.scale(value, factor)
                }
                _ => {
                    return Err(RuntimeError::InvalidProgram(
                        "scaling by a secret factor".into(),
                    ))
                }
            },
            ScaleConst { src, value, .. } => self.scale(self.get(src)?, value.to_field()),
            BitXor { lhs, rhs, .. } => match (self.get(lhs)?, self.get(rhs)?) {
                (Value::Public(a), Value::Public(b)) => {
                    Value::Public(a + b - (a * b).double())
                }
                (bit, Value::Public(b)) | (Value::Public(b), bit) => {
                    // bit * (1 - 2b) + b
                    let flipped = self.scale(bit, F::one() - b.double());
                    self.add(flipped, Value::Public(b))
                }
                _ => return Err(RuntimeError::InvalidProgram("XOR of two secrets".into())),
            },
            BitCompose { ref bits, .. } => {
                let mut acc = Value::Public(F::zero());
                for bit in bits.iter().rev() {
                    let doubled = self.scale(acc, F::from(2));
                    acc = self.add(doubled, self.get(*bit)?);
                }
                acc
            }
            RandomBit { bit, .. } => {
                self.check_material("random bit", bit, self.stats.random_bits)?;
                let share = self.dealer.next_bit()?;
                self.stats.random_bits += 1;
                Value::Secret(share)
            }
            RandomUint {
                bits, first_bit, ..
            } => {
                self.check_material("random bit", first_bit, self.stats.random_bits)?;
                let share = self.dealer.next_uint(bits)?;
                self.stats.random_bits += bits as usize;
                Value::Secret(share)
            }
            RandomElement { element, .. } => {
                self.check_material("random element", element, self.stats.random_elements)?;
                let share = self.dealer.next_random_element()?;
                self.stats.random_elements += 1;
                Value::Secret(share)
            }
            Bit { src, index, .. } => {
                let bit = self
                    .public(src)?
                    .truncated()
                    .checked_shr(index)
                    .unwrap_or(0)
                    & 1;
                Value::Public(F::from(bit))
            }
            LowBits { src, bits, .. } => {
                let mask = 1u64.checked_shl(bits).map_or(u64::MAX, |x| x - 1);
                Value::Public(F::from(self.public(src)?.truncated() & mask))
            }
            IsZero { src, .. } => {
                let is_zero = bool::from(self.public(src)?.is_zero());
                Value::Public(if is_zero {
                    F::one()
                } else {
                    F::zero()
                })
            }
            PublicLess { lhs, rhs, bits, .. } => {
                let lhs = decode_int(self.public(lhs)?, bits + 1);
                let rhs = decode_int(self.public(rhs)?, bits + 1);
                Value::Public(if lhs < rhs {
                    F::one()
                } else {
                    F::zero()
                })
            }
            ShareInput { .. } | PublicInput { .. } | Mul { .. } | Open { .. } | Output { .. } => {
                return Err(RuntimeError::InvalidProgram(format!(
                    "{:?} outside of a communication round",
                    instr
                )))
            }
        };

        match instr.dst() {
            Some(dst) => self.set(dst, value),
            None => Ok(()),
        }
    }

    fn owner_of_input(&self, input: usize) -> Result<usize, RuntimeError> {
        self.program
            .inputs
            .get(input)
            .and_then(|binding| self.assignment.node(binding.party))
            .ok_or_else(|| RuntimeError::InvalidProgram(format!("unknown input {}", input)))
    }

    fn own_input(&self, input: usize, element: usize) -> Result<F, RuntimeError> {
        self.own_inputs
            .get(input)
            .and_then(Option::as_ref)
            .and_then(|leaves| leaves.get(element))
            .copied()
            .ok_or_else(|| {
                RuntimeError::InvalidProgram(format!("input {} has no element {}", input, element))
            })
    }

    async fn input_round(
        &mut self,
        transport: &mut Tr,
        range: Range<usize>,
    ) -> Result<(), RuntimeError> {
        let num_parties = self.scheme.num_parties();
        let mut outgoing = vec![Vec::new(); num_parties];
        // (dst, owner, secret) of every instruction, in order.
        let mut slots = Vec::with_capacity(range.len());

        {
            let program = self.program;
            let mut rng = rand::thread_rng();
            for instr in &program.instructions[range] {
                let (dst, input, element, secret) = match *instr {
                    Instruction::ShareInput {
                        dst,
                        input,
                        element,
                    } => (dst, input, element, true),
                    Instruction::PublicInput {
                        dst,
                        input,
                        element,
                    } => (dst, input, element, false),
                    _ => return Err(RuntimeError::InvalidProgram("expected input".into())),
                };
                let owner = self.owner_of_input(input)?;
                slots.push((dst, owner, secret));
                if owner != self.party_id {
                    continue;
                }

                let value = self.own_input(input, element)?;
                if secret {
                    let shares = self.scheme.share(value, &mut rng);
                    for (peer, share) in shares.iter().enumerate() {
                        if peer != self.party_id {
                            outgoing[peer].push(share.raw());
                        }
                    }
                    self.set(dst, Value::Secret(shares[self.party_id]))?;
                } else {
                    for (peer, msgs) in outgoing.iter_mut().enumerate() {
                        if peer != self.party_id {
                            msgs.push(value);
                        }
                    }
                    self.set(dst, Value::Public(value))?;
                }
            }
        }

        self.sharing_started = true;
        let outgoing = outgoing.into_iter().map(MpcMessage::Inputs).collect();
        let received = transport.exchange_with_each(outgoing).await?;
        self.stats.messages_sent += received.len();

        for (peer, msg) in received {
            let expected: Vec<_> = slots.iter().filter(|slot| slot.1 == peer).collect();
            let values = match msg {
                MpcMessage::Inputs(values) if values.len() == expected.len() => values,
                _ => return Err(RuntimeError::MalformedMessage { peer }),
            };
            for (&(dst, _, secret), value) in expected.into_iter().zip(values) {
                let value = if secret {
                    Value::Secret(Share(value))
                } else {
                    Value::Public(value)
                };
                self.set(dst, value)?;
            }
        }
        Ok(())
    }

    async fn opening_round(
        &mut self,
        transport: &mut Tr,
        range: Range<usize>,
    ) -> Result<(), RuntimeError> {
        let mut to_open = Vec::with_capacity(2 * range.len());
        let mut pending = Vec::with_capacity(range.len());

        // Pull all material of the round before anything is sent.
        let program = self.program;
        for instr in &program.instructions[range] {
            match *instr {
                Instruction::Mul {
                    dst,
                    lhs,
                    rhs,
                    triple,
                } => {
                    self.check_material("triple", triple, self.stats.triples)?;
                    let beaver = self.dealer.next_beaver_triple()?;
                    self.stats.triples += 1;
                    let (e, d) = beaver.prepare_multiplication(self.secret(lhs)?, self.secret(rhs)?);
                    to_open.push(e);
                    to_open.push(d);
                    pending.push(PendingOpen::Mul {
                        dst,
                        triple: beaver,
                    });
                }
                Instruction::Open { dst, src } => {
                    to_open.push(self.secret(src)?);
                    pending.push(PendingOpen::Open { dst });
                }
                _ => return Err(RuntimeError::InvalidProgram("expected opening".into())),
            }
        }

        let msg = MpcMessage::Openings(to_open.iter().map(|share| share.raw()).collect());
        let received = transport.exchange_with_all(msg).await?;
        self.stats.messages_sent += received.len();

        let mut peer_shares = Vec::with_capacity(received.len());
        for (peer, msg) in received {
            match msg {
                MpcMessage::Openings(values) if values.len() == to_open.len() => {
                    peer_shares.push((peer, values))
                }
                _ => return Err(RuntimeError::MalformedMessage { peer }),
            }
        }

        let mut opened = Vec::with_capacity(to_open.len());
        for (k, own) in to_open.into_iter().enumerate() {
            let mut shares = Vec::with_capacity(peer_shares.len() + 1);
            shares.push((self.party_id, own));
            shares.extend(
                peer_shares
                    .iter()
                    .map(|(peer, values)| (*peer, Share(values[k]))),
            );
            opened.push(self.scheme.reconstruct(&shares)?);
        }

        let mut opened = opened.into_iter();
        for request in pending {
            match request {
                PendingOpen::Open { dst } => {
                    let value = next_opened(&mut opened)?;
                    self.set(dst, Value::Public(value))?;
                }
                PendingOpen::Mul { dst, triple } => {
                    let e = next_opened(&mut opened)?;
                    let d = next_opened(&mut opened)?;
                    let product =
                        triple.finalize_multiplication(e, d, &self.scheme, self.party_id);
                    self.set(dst, Value::Secret(product))?;
                }
            }
        }
        Ok(())
    }

    async fn output_round(
        &mut self,
        transport: &mut Tr,
        range: Range<usize>,
    ) -> Result<(), RuntimeError> {
        let num_parties = self.scheme.num_parties();
        let mut outgoing = vec![Vec::new(); num_parties];
        // Secret output leaves addressed to this node with this node's share.
        let mut incoming = Vec::new();

        let program = self.program;
        for instr in &program.instructions[range] {
            let (src, output, element) = match *instr {
                Instruction::Output {
                    src,
                    output,
                    element,
                } => (src, output, element),
                _ => return Err(RuntimeError::InvalidProgram("expected output".into())),
            };
            let recipient = program
                .outputs
                .get(output)
                .and_then(|binding| self.assignment.node(binding.party))
                .ok_or_else(|| RuntimeError::InvalidProgram(format!("unknown output {}", output)))?;

            match self.get(src)? {
                Value::Public(value) if recipient == self.party_id => {
                    self.store_output(output, element, value)?
                }
                Value::Public(_) => {}
                Value::Secret(share) if recipient == self.party_id => {
                    incoming.push((output, element, share))
                }
                Value::Secret(share) => outgoing[recipient].push(share.raw()),
            }
        }

        let outgoing = outgoing.into_iter().map(MpcMessage::OutputShares).collect();
        let received = transport.exchange_with_each(outgoing).await?;
        self.stats.messages_sent += received.len();

        let mut peer_shares = Vec::with_capacity(received.len());
        for (peer, msg) in received {
            match msg {
                MpcMessage::OutputShares(values) if values.len() == incoming.len() => {
                    peer_shares.push((peer, values))
                }
                _ => return Err(RuntimeError::MalformedMessage { peer }),
            }
        }

        for (k, (output, element, own)) in incoming.into_iter().enumerate() {
            let mut shares = Vec::with_capacity(num_parties);
            shares.push((self.party_id, own));
            shares.extend(
                peer_shares
                    .iter()
                    .map(|(peer, values)| (*peer, Share(values[k]))),
            );
            let value = self.scheme.reconstruct(&shares)?;
            self.store_output(output, element, value)?;
        }
        Ok(())
    }

    fn store_output(
        &mut self,
        output: usize,
        element: usize,
        value: F,
    ) -> Result<(), RuntimeError> {
        let slot = self
            .output_leaves
            .get_mut(output)
            .and_then(|leaves| leaves.get_mut(element))
            .ok_or_else(|| RuntimeError::InvalidProgram(format!("unknown output {}", output)))?;
        *slot = Some(value);
        Ok(())
    }

    /// Decode outputs addressed to this node.
    fn collect_outputs(&self) -> Result<BTreeMap<String, OutputValue>, RuntimeError> {
        let mut outputs = BTreeMap::new();
        for (binding, leaves) in self.program.outputs.iter().zip(&self.output_leaves) {
            if !self.owns_party(binding.party) {
                continue;
            }
            let scalars = binding
                .ty
                .leaves()
                .into_iter()
                .zip(leaves.iter().copied())
                .map(|(leaf, value)| {
                    let value = value.ok_or_else(|| {
                        RuntimeError::InvalidProgram(format!(
                            "output {:?} was not revealed",
                            binding.name
                        ))
                    })?;
                    Ok(match leaf.kind {
                        ScalarKind::Integer { bits } => PlainScalar::Integer(decode_int(value, bits)),
                        ScalarKind::Boolean => PlainScalar::Boolean(decode_bool(value)),
                    })
                })
                .collect::<Result<Vec<_>, RuntimeError>>()?;
            let value = PlainValue::unflatten(&binding.ty, &mut scalars.into_iter()).ok_or_else(
                || RuntimeError::InvalidProgram(format!("output {:?} is truncated", binding.name)),
            )?;
            outputs.insert(binding.name.clone(), value);
        }
        Ok(outputs)
    }
}

fn next_opened<T>(opened: &mut impl Iterator<Item = T>) -> Result<T, RuntimeError> {
    opened
        .next()
        .ok_or_else(|| RuntimeError::InvalidProgram("opening count mismatch".into()))
}
