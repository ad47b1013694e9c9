use std::{collections::BTreeMap, error::Error, path::PathBuf, thread};

use argh::FromArgs;
use mpc::{
    circuit::{InputValue, OutputValue},
    compiler::{compile, CompileOptions, Program},
    config::NodeConfig,
    dealer::{FakeDealer, MpcDealer, PrecomputedDealer},
    evaluator::{Execution, ExecutionStats, MpcMessage, PartyAssignment},
    fields::Mersenne127,
    programs::{self, color_name, COLORS},
    sharing::SharingScheme,
    transport::{self, Transport},
    MpcContext,
};
use rand::Rng;
use tracing_subscriber::EnvFilter;

type Fp = Mersenne127;

type BoxError = Box<dyn Error + Send + Sync>;

/// Computing party that plays `Player`.
const PLAYER_NODE: usize = 0;
/// Computing party that plays `Computer`.
const COMPUTER_NODE: usize = 1;

#[derive(FromArgs)]
/// Play guess-the-color with the computer's color kept secret.
struct Options {
    /// color guessed by the player, 1 to 6
    #[argh(option)]
    guess: i64,

    /// color picked by the computer (random if omitted)
    #[argh(option)]
    secret: Option<i64>,

    /// number of computing parties when running locally
    #[argh(option, default = "3")]
    parties: usize,

    /// use shamir sharing with given threshold instead of additive sharing
    #[argh(option)]
    threshold: Option<usize>,

    /// node configuration; runs a single party over TCP
    #[argh(option)]
    config: Option<PathBuf>,

    /// ID of this party when running over TCP
    #[argh(option, default = "0")]
    party_id: usize,

    /// preprocessing file pattern ('#' is replaced with party ID); a fake dealer is used if omitted
    #[argh(option)]
    material: Option<String>,

    /// fake dealer seed shared by all parties (random when running locally)
    #[argh(option)]
    seed: Option<u64>,
}

/// What every computing party needs besides its transport.
#[derive(Clone)]
struct NodeSetup {
    program: Program,
    scheme: SharingScheme,
    material: Option<String>,
    seed: u64,
    guess: i64,
    secret: i64,
}

impl NodeSetup {
    fn inputs(&self, party_id: usize) -> BTreeMap<String, InputValue> {
        let mut inputs = BTreeMap::new();
        if party_id == PLAYER_NODE {
            inputs.insert("guess".into(), InputValue::Integer(self.guess));
        }
        if party_id == COMPUTER_NODE {
            inputs.insert("secret_color".into(), InputValue::Integer(self.secret));
        }
        inputs
    }

    async fn run<Tr>(
        &self,
        transport: Tr,
    ) -> Result<(BTreeMap<String, OutputValue>, ExecutionStats), BoxError>
    where
        Tr: Transport<MpcMessage<Fp>>,
    {
        let party_id = transport.party_id();
        match &self.material {
            Some(pattern) => {
                let path = pattern.replace('#', &format!("{party_id}"));
                let dealer = PrecomputedDealer::<Fp>::from_file(&path)?;
                self.execute(dealer, transport).await
            }
            None => {
                let dealer = FakeDealer::<Fp>::new(self.scheme, party_id, self.seed);
                self.execute(dealer, transport).await
            }
        }
    }

    async fn execute<D, Tr>(
        &self,
        dealer: D,
        transport: Tr,
    ) -> Result<(BTreeMap<String, OutputValue>, ExecutionStats), BoxError>
    where
        D: MpcDealer<Field = Fp>,
        Tr: Transport<MpcMessage<Fp>>,
    {
        let party_id = transport.party_id();
        let assignment = PartyAssignment::from_names(
            &self.program,
            [("Player", PLAYER_NODE), ("Computer", COMPUTER_NODE)],
        )?;
        let mut execution =
            Execution::new(&self.program, assignment, self.scheme, dealer, transport)?;
        execution.bind_inputs(self.inputs(party_id))?;
        let outputs = execution.run().await?;
        Ok((outputs, execution.stats()))
    }
}

fn report(party_id: usize, outputs: &BTreeMap<String, OutputValue>, stats: &ExecutionStats) {
    tracing::info!(
        party_id,
        rounds = stats.rounds,
        triples = stats.triples,
        messages = stats.messages_sent,
        "Party finished"
    );
    match outputs.get("guess_result") {
        Some(OutputValue::Integer(1)) => println!("Party {party_id}: Correct guess!"),
        Some(OutputValue::Integer(0)) => println!("Party {party_id}: Incorrect guess. Try again!"),
        Some(other) => println!("Party {party_id}: Invalid result {other:?}"),
        None => println!("Party {party_id}: no output"),
    }
}

/// One thread with its own runtime per computing party, connected by in-process channels.
fn run_local(setup: NodeSetup, num_parties: usize) -> Result<(), BoxError> {
    let transports = transport::mock_multiparty_channels::<MpcMessage<Fp>>(num_parties, 1 << 20);
    let handles: Vec<_> = transports
        .into_iter()
        .map(|transport| {
            let setup = setup.clone();
            thread::spawn(move || -> Result<_, BoxError> {
                let runtime = tokio::runtime::Builder::new_current_thread()
                    .enable_all()
                    .build()?;
                runtime.block_on(setup.run(transport))
            })
        })
        .collect();

    let mut failed = false;
    for (party_id, handle) in handles.into_iter().enumerate() {
        match handle.join() {
            Ok(Ok((outputs, stats))) => report(party_id, &outputs, &stats),
            Ok(Err(err)) => {
                tracing::error!(party_id, %err, "Party failed");
                failed = true;
            }
            Err(_) => {
                tracing::error!(party_id, "Party panicked");
                failed = true;
            }
        }
    }
    if failed {
        return Err("computation failed".into());
    }
    Ok(())
}

/// Single party talking to its peers over TCP.
fn run_networked(setup: NodeSetup, config: &NodeConfig, party_id: usize) -> Result<(), BoxError> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    let (outputs, stats) = runtime.block_on(connect_and_run(&setup, config, party_id))?;
    report(party_id, &outputs, &stats);
    Ok(())
}

async fn connect_and_run(
    setup: &NodeSetup,
    config: &NodeConfig,
    party_id: usize,
) -> Result<(BTreeMap<String, OutputValue>, ExecutionStats), BoxError> {
    let transport =
        transport::networking::connect_multiparty::<MpcMessage<Fp>>(&config.parties, party_id)
            .await?;
    setup.run(transport).await
}

/// Parties on different hosts must agree on the fake dealer's seed, so it is drawn at random
/// only when every party runs in this process. Unused when material files are given.
fn fake_dealer_seed(
    seed: Option<u64>,
    material: &Option<String>,
    local: bool,
) -> Result<u64, BoxError> {
    match (seed, material) {
        (Some(seed), _) => Ok(seed),
        (None, Some(_)) => Ok(0),
        (None, None) if local => Ok(rand::random()),
        (None, None) => Err("--seed is required over TCP without --material".into()),
    }
}

fn run(options: Options) -> Result<(), BoxError> {
    if color_name(options.guess).is_none() {
        return Err(format!("guess must be between 1 and {}", COLORS.len()).into());
    }
    let secret = match options.secret {
        Some(secret) => secret,
        None => rand::thread_rng().gen_range(1..=COLORS.len() as i64),
    };
    let circuit = programs::guess_the_color()?;

    match &options.config {
        Some(path) => {
            let config = NodeConfig::load(path)?;
            let seed = fake_dealer_seed(options.seed, &options.material, false)?;
            let setup = NodeSetup {
                program: compile(&circuit, &config.compile)?,
                scheme: config.scheme()?,
                material: options.material,
                seed,
                guess: options.guess,
                secret,
            };
            run_networked(setup, &config, options.party_id)
        }
        None => {
            let scheme = match options.threshold {
                Some(threshold) => SharingScheme::shamir(options.parties, threshold)?,
                None => SharingScheme::additive(options.parties)?,
            };
            let setup = NodeSetup {
                program: compile(&circuit, &CompileOptions::for_field::<Fp>())?,
                scheme,
                seed: fake_dealer_seed(options.seed, &options.material, true)?,
                material: options.material,
                guess: options.guess,
                secret,
            };
            tracing::info!(
                guess = ?color_name(options.guess),
                parties = options.parties,
                "Playing locally"
            );
            run_local(setup, options.parties)
        }
    }
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let options: Options = argh::from_env();
    if let Err(err) = run(options) {
        tracing::error!(%err, "Guess the color failed");
        std::process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fake_dealer_seed() {
        assert_eq!(fake_dealer_seed(Some(7), &None, false).unwrap(), 7);
        assert_eq!(fake_dealer_seed(Some(7), &None, true).unwrap(), 7);
        assert!(fake_dealer_seed(None, &None, false).is_err());
        assert!(fake_dealer_seed(None, &Some("material-#.bin".into()), false).is_ok());

        let seeds: Vec<_> = (0..4)
            .map(|_| fake_dealer_seed(None, &None, true).unwrap())
            .collect();
        assert!(seeds.iter().any(|&seed| seed != seeds[0]));
    }
}
