use parking_lot::Mutex;
use rand::rngs::OsRng;
use rand::{CryptoRng, RngCore, TryRngCore};
use serde::{Deserialize, Serialize};
use std::fmt::{self, Display};
use std::str::FromStr;

use crate::store::Error;

const ID_LEN: usize = 16;

/// A 128-bit session identifier.
///
/// Rendered as 32 lowercase hex characters, which is also the only form
/// accepted by [`FromStr`].
#[derive(Copy, Clone, Debug, Deserialize, Serialize, Eq, Hash, PartialEq)]
pub struct Id([u8; ID_LEN]);

impl Id {
    pub fn from_bytes(bytes: [u8; ID_LEN]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; ID_LEN] {
        &self.0
    }
}

impl Display for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl FromStr for Id {
    type Err = hex::FromHexError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.len() != ID_LEN * 2 {
            return Err(hex::FromHexError::InvalidStringLength);
        }

        // `hex` accepts both cases; only the canonical lowercase form is a valid id.
        if let Some((index, c)) = s.char_indices().find(|(_, c)| c.is_ascii_uppercase()) {
            return Err(hex::FromHexError::InvalidHexCharacter { c, index });
        }

        let mut decoded = [0u8; ID_LEN];
        hex::decode_to_slice(s, &mut decoded)?;
        Ok(Self(decoded))
    }
}

/// Source of fresh session ids.
///
/// Stores receive their generator at construction, so tests can swap the
/// operating system's CSPRNG for a seeded one.
pub trait IdGenerator: Send + Sync + 'static {
    fn generate(&self) -> Result<Id, Error>;
}

/// Draws ids from the operating system's random source.
#[derive(Clone, Copy, Debug, Default)]
pub struct OsIdGenerator;

impl IdGenerator for OsIdGenerator {
    fn generate(&self) -> Result<Id, Error> {
        let mut bytes = [0u8; ID_LEN];
        OsRng
            .try_fill_bytes(&mut bytes)
            .map_err(|err| Error::IdGeneration(err.to_string()))?;
        Ok(Id(bytes))
    }
}

/// Draws ids from any cryptographically secure [`rand`] generator.
///
/// ```rust
/// use rand::SeedableRng;
/// use rand::rngs::StdRng;
/// use sesh::{IdGenerator, RngIdGenerator};
///
/// let generator = RngIdGenerator::new(StdRng::seed_from_u64(7));
/// let id = generator.generate().unwrap();
/// assert_eq!(id.to_string().len(), 32);
/// ```
#[derive(Debug)]
pub struct RngIdGenerator<R> {
    rng: Mutex<R>,
}

impl<R> RngIdGenerator<R>
where
    R: CryptoRng + Send + 'static,
{
    pub fn new(rng: R) -> Self {
        Self {
            rng: Mutex::new(rng),
        }
    }
}

impl<R> IdGenerator for RngIdGenerator<R>
where
    R: CryptoRng + Send + 'static,
{
    fn generate(&self) -> Result<Id, Error> {
        let mut bytes = [0u8; ID_LEN];
        self.rng.lock().fill_bytes(&mut bytes);
        Ok(Id(bytes))
    }
}
