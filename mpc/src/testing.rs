//! Helpers for running every computing party of a program in one process.

use std::collections::BTreeMap;

use async_trait::async_trait;
use tracing_subscriber::{util::SubscriberInitExt, EnvFilter};

use crate::{
    circuit::{Circuit, InputValue, OutputValue},
    compiler::{compile, CompileOptions, Program},
    dealer::{FakeDealer, MpcDealer},
    evaluator::{
        Execution, ExecutionState, ExecutionStats, MpcMessage, PartyAssignment, RuntimeError,
    },
    fields::Mersenne127,
    sharing::SharingScheme,
    transport::{
        mock_multiparty_channels, BincodeDuplex, MultipartyTransport, Transport, TransportError,
    },
    MpcContext,
};

pub type Fp = Mersenne127;

pub type MockTransport = MultipartyTransport<MpcMessage<Fp>, BincodeDuplex<MpcMessage<Fp>>>;

pub const SEED: u64 = 0x5eed;

/// Log to the test writer while the guard is alive. Filtered by `RUST_LOG`.
pub fn trace_guard() -> tracing::subscriber::DefaultGuard {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .set_default()
}

/// What a single computing party ended with.
#[derive(Debug)]
pub struct Outcome {
    pub result: Result<BTreeMap<String, OutputValue>, RuntimeError>,
    pub state: ExecutionState,
    pub stats: ExecutionStats,
}

impl Outcome {
    pub fn outputs(&self) -> &BTreeMap<String, OutputValue> {
        match &self.result {
            Ok(outputs) => outputs,
            Err(err) => panic!("execution failed: {}", err),
        }
    }
}

pub fn compile_circuit(circuit: &Circuit) -> Program {
    compile(circuit, &CompileOptions::for_field::<Fp>()).unwrap()
}

pub fn inputs<'n>(
    values: impl IntoIterator<Item = (&'n str, InputValue)>,
) -> BTreeMap<String, InputValue> {
    values
        .into_iter()
        .map(|(name, value)| (name.to_string(), value))
        .collect()
}

/// Keep only the inputs supplied by program parties played by `node`.
pub fn inputs_of_node(
    program: &Program,
    assignment: &PartyAssignment,
    node: usize,
    all: &BTreeMap<String, InputValue>,
) -> BTreeMap<String, InputValue> {
    program
        .inputs
        .iter()
        .filter(|input| assignment.node(input.party) == Some(node))
        .filter_map(|input| {
            all.get(&input.name)
                .map(|value| (input.name.clone(), value.clone()))
        })
        .collect()
}

/// Run one execution per entry of `parties` concurrently.
pub async fn run_parties<D, Tr>(
    program: &Program,
    assignment: &PartyAssignment,
    scheme: SharingScheme,
    parties: Vec<(D, Tr, BTreeMap<String, InputValue>)>,
) -> Vec<Outcome>
where
    D: MpcDealer,
    Tr: Transport<MpcMessage<D::Field>>,
{
    futures::future::join_all(parties.into_iter().map(
        |(dealer, transport, inputs)| async move {
            let mut execution =
                match Execution::new(program, assignment.clone(), scheme, dealer, transport) {
                    Ok(execution) => execution,
                    Err(err) => {
                        return Outcome {
                            result: Err(err),
                            state: ExecutionState::Failed,
                            stats: ExecutionStats::default(),
                        }
                    }
                };
            let result = match execution.bind_inputs(inputs) {
                Ok(()) => execution.run().await,
                Err(err) => Err(err),
            };
            Outcome {
                result,
                state: execution.state(),
                stats: execution.stats(),
            }
        },
    ))
    .await
}

/// Run `program` with fake dealers over in-process channels.
pub async fn run_with_fake_dealer(
    program: &Program,
    assignment: &PartyAssignment,
    scheme: SharingScheme,
    all_inputs: &BTreeMap<String, InputValue>,
) -> Vec<Outcome> {
    let parties = mock_multiparty_channels::<MpcMessage<Fp>>(scheme.num_parties(), 1 << 20)
        .into_iter()
        .enumerate()
        .map(|(node, transport)| {
            (
                FakeDealer::<Fp>::new(scheme, node, SEED),
                transport,
                inputs_of_node(program, assignment, node, all_inputs),
            )
        })
        .collect();
    run_parties(program, assignment, scheme, parties).await
}

/// Transport that goes away after a given number of `exchange_with_all` calls.
pub struct DisconnectingTransport<Tr> {
    inner: Option<Tr>,
    party_id: usize,
    num_parties: usize,
    exchanges_left: usize,
}

impl<Tr: MpcContext> DisconnectingTransport<Tr> {
    pub fn new(inner: Tr, exchanges: usize) -> Self {
        Self {
            party_id: inner.party_id(),
            num_parties: inner.num_parties(),
            inner: Some(inner),
            exchanges_left: exchanges,
        }
    }

    pub fn reliable(inner: Tr) -> Self {
        Self::new(inner, usize::MAX)
    }
}

impl<Tr> MpcContext for DisconnectingTransport<Tr> {
    fn num_parties(&self) -> usize {
        self.num_parties
    }

    fn party_id(&self) -> usize {
        self.party_id
    }
}

#[async_trait(?Send)]
impl<T: 'static, Tr: Transport<T>> Transport<T> for DisconnectingTransport<Tr> {
    async fn send_to(&mut self, other_id: usize, msg: T) -> Result<(), TransportError> {
        match self.inner.as_mut() {
            Some(inner) => inner.send_to(other_id, msg).await,
            None => Err(TransportError::Send(other_id)),
        }
    }

    async fn receive_from(&mut self, other_id: usize) -> Result<T, TransportError> {
        match self.inner.as_mut() {
            Some(inner) => inner.receive_from(other_id).await,
            None => Err(TransportError::Recv(other_id)),
        }
    }

    async fn exchange_with_all(&mut self, msg: T) -> Result<Vec<(usize, T)>, TransportError> {
        if self.exchanges_left == 0 {
            self.inner = None;
        }
        match self.inner.as_mut() {
            Some(inner) => {
                self.exchanges_left -= 1;
                inner.exchange_with_all(msg).await
            }
            None => Err(TransportError::Send((self.party_id + 1) % self.num_parties)),
        }
    }

    async fn exchange_with_each(
        &mut self,
        msgs: Vec<T>,
    ) -> Result<Vec<(usize, T)>, TransportError> {
        match self.inner.as_mut() {
            Some(inner) => inner.exchange_with_each(msgs).await,
            None => Err(TransportError::Send((self.party_id + 1) % self.num_parties)),
        }
    }
}
