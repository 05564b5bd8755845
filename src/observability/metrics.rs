use prometheus::{
    Encoder, HistogramVec, IntCounter, IntCounterVec, Opts, Registry, TextEncoder,
};

#[derive(Clone)]
pub struct Metrics {
    registry: Registry,
    pub horses_generated_total: IntCounter,
    pub range_queries_total: IntCounterVec,
    pub presence_sweeps_total: IntCounterVec,
    pub presence_demotions_total: IntCounterVec,
    pub sweep_latency_seconds: HistogramVec,
}

impl Metrics {
    pub fn new() -> Self {
        let registry = Registry::new();

        let horses_generated_total = IntCounter::new(
            "horses_generated_total",
            "Synthetic horses generated and persisted to top up a pool",
        )
        .expect("valid horses_generated_total metric");

        let range_queries_total = IntCounterVec::new(
            Opts::new("range_queries_total", "Range queries by collection and outcome"),
            &["collection", "outcome"],
        )
        .expect("valid range_queries_total metric");

        let presence_sweeps_total = IntCounterVec::new(
            Opts::new("presence_sweeps_total", "Liveness sweeps by collection and outcome"),
            &["collection", "outcome"],
        )
        .expect("valid presence_sweeps_total metric");

        let presence_demotions_total = IntCounterVec::new(
            Opts::new(
                "presence_demotions_total",
                "Records demoted to logged out by the liveness sweeper",
            ),
            &["collection"],
        )
        .expect("valid presence_demotions_total metric");

        let sweep_latency_seconds = HistogramVec::new(
            prometheus::HistogramOpts::new(
                "sweep_latency_seconds",
                "Latency of one liveness sweep in seconds",
            ),
            &["collection"],
        )
        .expect("valid sweep_latency_seconds metric");

        registry
            .register(Box::new(horses_generated_total.clone()))
            .expect("register horses_generated_total");
        registry
            .register(Box::new(range_queries_total.clone()))
            .expect("register range_queries_total");
        registry
            .register(Box::new(presence_sweeps_total.clone()))
            .expect("register presence_sweeps_total");
        registry
            .register(Box::new(presence_demotions_total.clone()))
            .expect("register presence_demotions_total");
        registry
            .register(Box::new(sweep_latency_seconds.clone()))
            .expect("register sweep_latency_seconds");

        Self {
            registry,
            horses_generated_total,
            range_queries_total,
            presence_sweeps_total,
            presence_demotions_total,
            sweep_latency_seconds,
        }
    }

    pub fn encode(&self) -> Result<String, String> {
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();

        TextEncoder::new()
            .encode(&metric_families, &mut buffer)
            .map_err(|err| format!("failed to encode metrics: {err}"))?;

        String::from_utf8(buffer).map_err(|err| format!("metrics are not valid utf8: {err}"))
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}
