use std::{error::Error, str::FromStr};

use argh::FromArgs;
use mpc::{
    compiler::{compile, CompileOptions},
    dealer::{generate_material, MaterialManifest},
    fields::{Mersenne127, Mersenne61},
    programs,
    sharing::SharingScheme,
    MpcField,
};
use rand::{prelude::StdRng, SeedableRng};
use tracing_subscriber::EnvFilter;

/// Field type for preprocessing.
enum FieldType {
    Mersenne61,
    Mersenne127,
}

impl FromStr for FieldType {
    type Err = &'static str;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "61" => Ok(FieldType::Mersenne61),
            "127" => Ok(FieldType::Mersenne127),
            _ => Err("Unsupported field type. Available options: 61, 127"),
        }
    }
}

/// Sharing scheme kind; the party count comes from `--parties`.
enum SchemeKind {
    Additive,
    Shamir,
}

impl FromStr for SchemeKind {
    type Err = &'static str;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "additive" => Ok(SchemeKind::Additive),
            "shamir" => Ok(SchemeKind::Shamir),
            _ => Err("Unsupported sharing scheme. Available options: additive, shamir"),
        }
    }
}

#[derive(FromArgs)]
/// Trusted-dealer preprocessing tool.
struct Options {
    /// number of parties participating in protocol
    #[argh(option)]
    parties: usize,

    /// output path pattern ('#' is replaced with party ID)
    #[argh(option)]
    output: String,

    /// target field
    #[argh(option, default = "FieldType::Mersenne127")]
    field: FieldType,

    /// sharing scheme: additive or shamir
    #[argh(option, default = "SchemeKind::Additive")]
    scheme: SchemeKind,

    /// corruption threshold of the shamir scheme
    #[argh(option, default = "1")]
    threshold: usize,

    /// bundled program whose requirements are generated; overrides the counts below
    #[argh(option)]
    program: Option<String>,

    /// number of beaver triples to be generated
    #[argh(option, default = "0")]
    triples: usize,

    /// number of random bits to be generated
    #[argh(option, default = "0")]
    random_bits: usize,

    /// number of random field elements to be generated
    #[argh(option, default = "0")]
    random_elements: usize,
}

impl Options {
    fn scheme(&self) -> Result<SharingScheme, Box<dyn Error>> {
        Ok(match self.scheme {
            SchemeKind::Additive => SharingScheme::additive(self.parties)?,
            SchemeKind::Shamir => SharingScheme::shamir(self.parties, self.threshold)?,
        })
    }

    fn manifest<T: MpcField>(&self) -> Result<MaterialManifest, Box<dyn Error>> {
        let name = match &self.program {
            Some(name) => name,
            None => {
                return Ok(MaterialManifest {
                    triples: self.triples,
                    random_bits: self.random_bits,
                    random_elements: self.random_elements,
                })
            }
        };
        let circuit = programs::by_name(name)
            .ok_or_else(|| format!("Unknown program {:?}", name))??;
        let program = compile(&circuit, &CompileOptions::for_field::<T>())?;
        Ok(program.manifest)
    }
}

fn run<T: MpcField>(options: Options) -> Result<(), Box<dyn Error>> {
    let scheme = options.scheme()?;
    let manifest = options.manifest::<T>()?;
    tracing::info!(
        parties = options.parties,
        triples = manifest.triples,
        random_bits = manifest.random_bits,
        random_elements = manifest.random_elements,
        "Generating material"
    );

    let mut rng = StdRng::from_entropy();
    let data = generate_material::<T, _>(scheme, &manifest, &mut rng);

    for (id, party_data) in data.into_iter().enumerate() {
        let output_path = options.output.replace('#', &format!("{id}"));
        party_data.save_file(&output_path)?;
        tracing::info!(party_id = id, path = %output_path, "Saved");
    }
    Ok(())
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let options: Options = argh::from_env();
    let result = match options.field {
        FieldType::Mersenne61 => run::<Mersenne61>(options),
        FieldType::Mersenne127 => run::<Mersenne127>(options),
    };
    if let Err(err) = result {
        tracing::error!(%err, "Preprocessing failed");
        std::process::exit(1);
    }
}
