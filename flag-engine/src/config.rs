use envconfig::Envconfig;

#[derive(Envconfig, Clone, Debug)]
pub struct Config {
    /// PBKDF2 round count for the experiment-path assignment hash. Raising it
    /// makes the opaque token harder to guess and each resolution slower;
    /// this is the main throughput knob of the engine.
    #[envconfig(default = "600")]
    pub assignment_hash_rounds: u32,

    /// Upper bound on assignment hashes computed at once. The hash is
    /// CPU-bound, so this should track available cores, not request
    /// concurrency.
    #[envconfig(default = "4")]
    pub max_concurrent_hashes: usize,
}

impl Config {
    pub fn default_test_config() -> Self {
        Self {
            assignment_hash_rounds: 10,
            max_concurrent_hashes: 4,
        }
    }
}
