use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// The value a flag resolves to. Untagged so records and responses carry the
/// bare JSON scalar, matching what clients persist and echo back.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(untagged)]
pub enum FlagValue {
    Boolean(bool),
    String(String),
    Number(f64),
}

/// One resolved flag: the computed value plus an opaque hash the client can
/// use as a cache/analytics key. Only experiment-path hashes are reproducible;
/// forced-value and default paths get a fresh random token per request.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct FlagResolution {
    pub value: FlagValue,
    pub hash: String,
}

#[derive(Debug, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FlagsResponse {
    pub errors_while_computing_flags: bool,
    pub flags: HashMap<String, FlagResolution>,
    /// Per-flag report of anything that kept a flag from resolving as
    /// configured (missing experiment, data-integrity failure). Flags that
    /// fell back to their default still appear in `flags`.
    pub errors: HashMap<String, String>,
}
