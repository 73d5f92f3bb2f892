use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt::{Display, Formatter};
use std::str::FromStr;
use std::sync::{Mutex, OnceLock, PoisonError};

fn generator() -> &'static Mutex<ulid::Generator> {
    static GENERATOR: OnceLock<Mutex<ulid::Generator>> = OnceLock::new();
    GENERATOR.get_or_init(|| Mutex::new(ulid::Generator::new()))
}

/// Strongly typed session identifier backed by ULID.
///
/// Identifiers are minted when a context is first registered, so they never depend on
/// memory addresses. ULIDs sort by creation time, which gives the status page a
/// stable registration order for free.
#[derive(Clone, Copy, Eq, PartialEq, Ord, PartialOrd, Hash, Debug)]
pub struct SessionId(pub ulid::Ulid);

impl SessionId {
    /// Mint a new identifier. Identifiers minted in the same millisecond still sort in
    /// minting order.
    pub fn new() -> Self {
        let next = generator()
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .generate();
        Self(next.unwrap_or_else(|_| ulid::Ulid::new()))
    }

    pub fn from_ulid(id: ulid::Ulid) -> Self {
        Self(id)
    }

    /// Parse a path segment; anything that is not a ULID is simply not a session.
    ///
    /// Only the canonical spelling counts. ULID decoding ignores case, but a session
    /// matches its prefix byte for byte, so a lowercased segment would reach an app
    /// that cannot place the path.
    pub fn from_segment(segment: &str) -> Option<Self> {
        let id: Self = segment.parse().ok()?;
        (id.to_string() == segment).then_some(id)
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl Display for SessionId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for SessionId {
    type Err = ulid::DecodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let id = ulid::Ulid::from_string(s)?;
        Ok(SessionId(id))
    }
}

impl Serialize for SessionId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for SessionId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse::<SessionId>()
            .map_err(|_| serde::de::Error::custom("invalid session id"))
    }
}
