use envconfig::Envconfig;

use aggregator::config::EnvMsDuration;

#[derive(Envconfig, Clone)]
pub struct Config {
    #[envconfig(default = "http://localhost:8080/publish")]
    pub target_url: String,

    #[envconfig(from = "TICK_INTERVAL_MS", default = "500")]
    pub tick_interval: EnvMsDuration,

    /// Probability of replaying an already sent event instead of generating a new one.
    #[envconfig(default = "0.3")]
    pub duplicate_rate: f64,

    /// How many sent events are kept around for replays.
    #[envconfig(default = "50")]
    pub history_size: usize,

    #[envconfig(default = "5000")]
    pub request_timeout: EnvMsDuration,
}
