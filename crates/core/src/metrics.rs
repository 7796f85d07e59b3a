//! Prometheus collectors shared by every client in the process.

use prometheus::{
    Encoder, Gauge, Histogram, HistogramOpts, HistogramVec, IntGauge, Opts, Registry, TextEncoder,
};
use std::{sync::LazyLock, time::Duration};

static METRICS: LazyLock<ClientMetrics> = LazyLock::new(ClientMetrics::new);

#[derive(Clone, Debug)]
pub struct ClientMetrics {
    registry: Registry,
    pub request_duration: HistogramVec,
    pub time_to_mine: Histogram,
    pub block_number: IntGauge,
    pub block_gas_used: IntGauge,
    pub block_tx_count: IntGauge,
    pub tps: Gauge,
    pub block_time: Histogram,
}

impl ClientMetrics {
    fn new() -> Self {
        let registry = Registry::new_custom(Some("ethload".to_owned()), None)
            .expect("static registry prefix is valid");
        let request_duration = HistogramVec::new(
            HistogramOpts::new(
                "rpc_request_duration_seconds",
                "Latency of JSON-RPC requests by method",
            ),
            &["method"],
        )
        .expect("static histogram opts are valid");
        let time_to_mine = Histogram::with_opts(
            HistogramOpts::new(
                "time_to_mine_seconds",
                "Time from starting to wait on a receipt until it was found",
            )
            .buckets(vec![0.1, 0.25, 0.5, 1.0, 2.0, 4.0, 8.0, 12.0, 30.0, 60.0]),
        )
        .expect("static histogram opts are valid");
        let block_number = IntGauge::with_opts(Opts::new("block", "Latest observed block number"))
            .expect("static gauge opts are valid");
        let block_gas_used =
            IntGauge::with_opts(Opts::new("block_gas_used", "Gas used by the latest block"))
                .expect("static gauge opts are valid");
        let block_tx_count = IntGauge::with_opts(Opts::new(
            "block_transactions",
            "Transactions in the latest block",
        ))
        .expect("static gauge opts are valid");
        let tps = Gauge::with_opts(Opts::new(
            "tps",
            "Transactions per second between the two latest blocks",
        ))
        .expect("static gauge opts are valid");
        let block_time = Histogram::with_opts(HistogramOpts::new(
            "block_time_seconds",
            "Header timestamp delta between consecutive blocks",
        ))
        .expect("static histogram opts are valid");

        for collector in [
            Box::new(request_duration.clone()) as Box<dyn prometheus::core::Collector>,
            Box::new(time_to_mine.clone()),
            Box::new(block_number.clone()),
            Box::new(block_gas_used.clone()),
            Box::new(block_tx_count.clone()),
            Box::new(tps.clone()),
            Box::new(block_time.clone()),
        ] {
            registry
                .register(collector)
                .expect("collectors are registered once");
        }

        Self {
            registry,
            request_duration,
            time_to_mine,
            block_number,
            block_gas_used,
            block_tx_count,
            tps,
            block_time,
        }
    }

    pub fn global() -> &'static ClientMetrics {
        &METRICS
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn observe_request(&self, method: &str, elapsed: Duration) {
        self.request_duration
            .with_label_values(&[method])
            .observe(elapsed.as_secs_f64());
    }

    pub fn observe_time_to_mine(&self, elapsed: Duration) {
        self.time_to_mine.observe(elapsed.as_secs_f64());
    }
}

/// Renders all client metrics in the prometheus text exposition format.
pub fn gather_text() -> String {
    let mut buf = vec![];
    let encoder = TextEncoder::new();
    if encoder
        .encode(&ClientMetrics::global().registry().gather(), &mut buf)
        .is_err()
    {
        return String::new();
    }
    String::from_utf8(buf).unwrap_or_default()
}
