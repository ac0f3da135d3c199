use std::sync::Arc;

use pbkdf2::password_hash::{rand_core::OsRng, PasswordHasher, SaltString};
use pbkdf2::{Params, Pbkdf2};
use rand::RngCore;
use tokio::sync::Semaphore;

use crate::api::errors::FlagError;
use crate::config::Config;
use crate::flags::flag_models::{ClientPropMapping, ClientPropValue};

/// DJB2-style rolling hash over the string's UTF-16 code units, wrapping in
/// signed 32-bit two's-complement arithmetic at every step:
///
/// ```text
/// hash = (hash << 5) - hash + code
/// ```
///
/// The wrap-around overflow is intentional and must stay bit-exact: bucket
/// assignments derived from this hash are client-visible, so any change to
/// the arithmetic reshuffles the entire population.
pub fn hash_string_djb2(input: &str) -> i32 {
    let mut hash: i32 = 0;
    for code in input.encode_utf16() {
        hash = hash
            .wrapping_shl(5)
            .wrapping_sub(hash)
            .wrapping_add(i32::from(code));
    }
    hash
}

/// Hashes a set of `(name, value)` identifier pairs into one stable i32.
///
/// Pairs are sorted (by name, then rendered value) before concatenation, so
/// the same identifier set hashes identically regardless of the order the
/// caller supplies it in. Callers depend on this for reproducible bucketing.
pub fn combine_and_hash<'a, I>(identifiers: I) -> i32
where
    I: IntoIterator<Item = (&'a str, &'a ClientPropValue)>,
{
    let mut pairs: Vec<(&str, String)> = identifiers
        .into_iter()
        .map(|(name, value)| (name, value.to_string()))
        .collect();
    pairs.sort();

    let mut combined = String::new();
    for (name, value) in pairs {
        combined.push_str(name);
        combined.push_str(&value);
    }
    hash_string_djb2(&combined)
}

/// Sorts and joins a flat string set, then hashes it. Used to fold a set of
/// entity ids (experiment + group + treatment) into one reproducible token.
pub fn hash_string_set<S: AsRef<str>>(strings: &[S]) -> i32 {
    let mut sorted: Vec<&str> = strings.iter().map(AsRef::as_ref).collect();
    sorted.sort_unstable();
    hash_string_djb2(&sorted.concat())
}

/// Deterministically buckets the identifiers into one of `options`.
///
/// Options are sorted ascending first so the result does not depend on the
/// order they are stored in. An empty options list is a caller bug.
pub fn assign<'a, 'b, I>(identifiers: I, options: &'b [String]) -> Result<&'b str, FlagError>
where
    I: IntoIterator<Item = (&'a str, &'a ClientPropValue)>,
{
    if options.is_empty() {
        return Err(FlagError::InvalidArgument(
            "cannot assign from an empty options list".to_string(),
        ));
    }
    let mut sorted: Vec<&str> = options.iter().map(String::as_str).collect();
    sorted.sort_unstable();

    let hash = combine_and_hash(identifiers);
    // i32::MIN has no absolute value in i32; unsigned_abs maps it to
    // i32::MAX + 1 so the index stays in range.
    let index = hash.unsigned_abs() as usize % sorted.len();
    Ok(sorted[index])
}

/// Tests the hashed identifiers against an enrollment proportion.
///
/// A proportion of 0 matches nobody and short-circuits before hashing. For
/// anything else the proportion's fraction of the full signed 32-bit range is
/// mapped to a threshold and compared against the raw hash, avoiding
/// floating-point division of the hash itself so the boolean is identical
/// across platforms. The `- 1` offset is historical; it is kept bit-for-bit
/// because client-visible bucketing must stay stable (see DESIGN.md).
pub fn compare_to_proportion<'a, I>(identifiers: I, proportion: f64) -> Result<bool, FlagError>
where
    I: IntoIterator<Item = (&'a str, &'a ClientPropValue)>,
{
    if !(0.0..=1.0).contains(&proportion) {
        return Err(FlagError::InvalidArgument(format!(
            "enrollment proportion {} is outside [0, 1]",
            proportion
        )));
    }
    if proportion == 0.0 {
        return Ok(false);
    }
    let hash = combine_and_hash(identifiers);
    let threshold = proportion * 2f64.powi(32) - 2f64.powi(31) - 1.0;
    Ok(f64::from(hash) < threshold)
}

/// Restricts the client props to the attribute names an enrollment lists,
/// in a shape `combine_and_hash` accepts. Attributes the client did not send
/// are simply absent from the result.
pub fn filter_identifiers<'a>(
    client_props: &'a ClientPropMapping,
    attributes: &'a [String],
) -> impl Iterator<Item = (&'a str, &'a ClientPropValue)> {
    attributes.iter().filter_map(|name| {
        client_props
            .get_key_value(name.as_str())
            .map(|(key, value)| (key.as_str(), value))
    })
}

/// Per-request random token for the forced-value and default paths. Has no
/// reproducibility requirement; it only keeps the response shape uniform so
/// clients can always treat `hash` as a cache key.
pub fn random_opaque_hash() -> String {
    let mut bytes = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// Computes the experiment-path assignment hash: the entity ids are folded
/// with [`hash_string_set`], then stretched with PBKDF2 over a fresh random
/// salt so the token is reproducibly tied to the assignment without being
/// guessable from the ids.
///
/// The stretch is CPU-bound on purpose, so it runs on the blocking pool and
/// a semaphore caps how many run at once. Cost and cap both come from
/// [`Config`].
pub struct AssignmentHasher {
    rounds: u32,
    hash_permits: Arc<Semaphore>,
}

impl AssignmentHasher {
    pub fn new(config: &Config) -> Self {
        Self {
            rounds: config.assignment_hash_rounds,
            hash_permits: Arc::new(Semaphore::new(config.max_concurrent_hashes)),
        }
    }

    pub async fn hash(&self, parts: &[&str]) -> Result<String, FlagError> {
        let combined = hash_string_set(parts).to_string();
        let rounds = self.rounds;

        let _permit = self
            .hash_permits
            .clone()
            .acquire_owned()
            .await
            .map_err(|e| FlagError::Internal(format!("hash semaphore closed: {}", e)))?;

        tokio::task::spawn_blocking(move || {
            let salt = SaltString::generate(&mut OsRng);
            let params = Params {
                rounds,
                output_length: 32,
            };
            Pbkdf2
                .hash_password_customized(combined.as_bytes(), None, None, params, &salt)
                .map(|hash| hash.to_string())
                .map_err(|e| FlagError::HashingError(e.to_string()))
        })
        .await
        .map_err(|e| FlagError::Internal(format!("hashing task failed: {}", e)))?
    }
}
