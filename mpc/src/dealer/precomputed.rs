use std::{
    fs::File,
    io::{self, BufReader, BufWriter},
    path::Path,
};

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::{
    fields::{random_nonzero, MpcField},
    sharing::{Share, SharingScheme},
    MpcContext,
};

use super::{BeaverTriple, DealerError, MaterialKind, MaterialManifest, MpcDealer};

/// Preprocessing material of a single party.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct PrecomputedData<T> {
    pub scheme: SharingScheme,
    pub party_id: usize,
    pub beaver_triples: Vec<BeaverTriple<T>>,
    pub random_bits: Vec<Share<T>>,
    pub random_elements: Vec<Share<T>>,
}

impl<T> PrecomputedData<T>
where
    T: Serialize + for<'a> Deserialize<'a>,
{
    /// Load precomputed data from file.
    pub fn load_file(path: impl AsRef<Path>) -> io::Result<Self> {
        let file = File::open(path)?;
        let reader = BufReader::new(file);
        bincode::deserialize_from(reader).map_err(|err| io::Error::new(io::ErrorKind::Other, err))
    }

    /// Save precomputed data to file.
    pub fn save_file(&self, path: impl AsRef<Path>) -> io::Result<()> {
        let file = File::create(path)?;
        let writer = BufWriter::new(file);
        bincode::serialize_into(writer, self)
            .map_err(|err| io::Error::new(io::ErrorKind::Other, err))
    }
}

impl<T> PrecomputedData<T> {
    /// Amount of material stored.
    pub fn manifest(&self) -> MaterialManifest {
        MaterialManifest {
            triples: self.beaver_triples.len(),
            random_bits: self.random_bits.len(),
            random_elements: self.random_elements.len(),
        }
    }
}

/// Dealer that serves precomputed data in the order it was generated.
pub struct PrecomputedDealer<T> {
    data: PrecomputedData<T>,
    used: MaterialManifest,
}

impl<T> PrecomputedDealer<T>
where
    T: Serialize + for<'a> Deserialize<'a>,
{
    /// Create new dealer given precomputed data.
    pub fn new(data: PrecomputedData<T>) -> Self {
        Self {
            data,
            used: MaterialManifest::default(),
        }
    }

    /// Create new dealer from file with precomputed data.
    pub fn from_file(path: impl AsRef<Path>) -> io::Result<Self> {
        Ok(Self::new(PrecomputedData::load_file(path)?))
    }
}

/// Take next element of `items` and advance the cursor.
fn take_next<X: Copy>(items: &[X], cursor: &mut usize, kind: MaterialKind) -> Result<X, DealerError> {
    let item = items.get(*cursor).copied().ok_or(DealerError::Exhausted(kind))?;
    *cursor += 1;
    Ok(item)
}

impl<T: MpcField> MpcContext for PrecomputedDealer<T> {
    fn num_parties(&self) -> usize {
        self.data.scheme.num_parties()
    }

    fn party_id(&self) -> usize {
        self.data.party_id
    }
}

impl<T: MpcField> MpcDealer for PrecomputedDealer<T> {
    type Field = T;

    fn next_beaver_triple(&mut self) -> Result<BeaverTriple<T>, DealerError> {
        take_next(
            &self.data.beaver_triples,
            &mut self.used.triples,
            MaterialKind::BeaverTriple,
        )
    }

    fn next_bit(&mut self) -> Result<Share<T>, DealerError> {
        take_next(
            &self.data.random_bits,
            &mut self.used.random_bits,
            MaterialKind::RandomBit,
        )
    }

    fn next_random_element(&mut self) -> Result<Share<T>, DealerError> {
        take_next(
            &self.data.random_elements,
            &mut self.used.random_elements,
            MaterialKind::RandomElement,
        )
    }

    fn remaining(&self) -> Option<MaterialManifest> {
        let total = self.data.manifest();
        Some(MaterialManifest {
            triples: total.triples - self.used.triples,
            random_bits: total.random_bits - self.used.random_bits,
            random_elements: total.random_elements - self.used.random_elements,
        })
    }
}

/// Trusted dealer: generate material described by `manifest` for every party of `scheme`.
pub fn generate_material<T, R>(
    scheme: SharingScheme,
    manifest: &MaterialManifest,
    rng: &mut R,
) -> Vec<PrecomputedData<T>>
where
    T: MpcField,
    R: Rng,
{
    let mut data: Vec<_> = (0..scheme.num_parties())
        .map(|party_id| PrecomputedData {
            scheme,
            party_id,
            beaver_triples: Vec::with_capacity(manifest.triples),
            random_bits: Vec::with_capacity(manifest.random_bits),
            random_elements: Vec::with_capacity(manifest.random_elements),
        })
        .collect();

    for _ in 0..manifest.triples {
        let a = T::random(&mut *rng);
        let b = T::random(&mut *rng);
        let shares_a = scheme.share(a, rng);
        let shares_b = scheme.share(b, rng);
        let shares_c = scheme.share(a * b, rng);
        for (i, party_data) in data.iter_mut().enumerate() {
            party_data.beaver_triples.push(BeaverTriple {
                a: shares_a[i],
                b: shares_b[i],
                c: shares_c[i],
            });
        }
    }

    for _ in 0..manifest.random_bits {
        let bit = T::from(rng.gen_range(0..=1u64));
        for (party_data, share) in data.iter_mut().zip(scheme.share(bit, rng)) {
            party_data.random_bits.push(share);
        }
    }

    for _ in 0..manifest.random_elements {
        let element = random_nonzero(&mut *rng);
        for (party_data, share) in data.iter_mut().zip(scheme.share(element, rng)) {
            party_data.random_elements.push(share);
        }
    }

    data
}
