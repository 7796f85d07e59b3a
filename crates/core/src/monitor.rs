//! Background block watcher that feeds the block gauges in [`crate::metrics`].

use crate::{client::ChainClient, metrics::ClientMetrics, Result};
use alloy::rpc::types::Block;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// The fields of a block the monitor cares about.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ObservedBlock {
    pub number: u64,
    pub timestamp: u64,
    pub gas_used: u64,
    pub tx_count: usize,
}

impl From<&Block> for ObservedBlock {
    fn from(block: &Block) -> Self {
        Self {
            number: block.header.number,
            timestamp: block.header.timestamp,
            gas_used: block.header.gas_used,
            tx_count: block.transactions.len(),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BlockStats {
    pub number: u64,
    pub gas_used: u64,
    pub tx_count: usize,
    /// Header timestamp delta to the previous block. `None` for the first block seen.
    pub block_time: Option<u64>,
    /// `None` for the first block seen, or when timestamps did not advance.
    pub tps: Option<f64>,
}

impl BlockStats {
    pub fn compute(prev: Option<&ObservedBlock>, block: &ObservedBlock) -> Self {
        let block_time = prev.map(|p| block.timestamp.saturating_sub(p.timestamp));
        let tps = block_time
            .filter(|delta| *delta > 0)
            .map(|delta| block.tx_count as f64 / delta as f64);
        Self {
            number: block.number,
            gas_used: block.gas_used,
            tx_count: block.tx_count,
            block_time,
            tps,
        }
    }

    fn publish(&self, metrics: &ClientMetrics) {
        metrics.block_number.set(self.number as i64);
        metrics.block_gas_used.set(self.gas_used as i64);
        metrics.block_tx_count.set(self.tx_count as i64);
        if let Some(tps) = self.tps {
            metrics.tps.set(tps);
        }
        if let Some(block_time) = self.block_time {
            metrics.block_time.observe(block_time as f64);
        }
    }
}

/// Polls `eth_blockNumber` and publishes stats for every new block.
///
/// Run one monitor per endpoint; two monitors on the same endpoint would publish the
/// same blocks twice.
pub struct BlockMonitor {
    client: ChainClient,
    interval: Duration,
}

impl BlockMonitor {
    pub fn new(client: ChainClient) -> Self {
        Self {
            client,
            interval: DEFAULT_POLL_INTERVAL,
        }
    }

    pub fn with_interval(self, interval: Duration) -> Self {
        Self { interval, ..self }
    }

    /// Runs until `cancel` fires.
    pub fn spawn(self, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::task::spawn(async move {
            info!("monitoring blocks every {}ms", self.interval.as_millis());
            let mut last: Option<ObservedBlock> = None;
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        debug!("block monitor stopped");
                        break;
                    }
                    _ = tokio::time::sleep(self.interval) => {}
                }
                match self.poll(last.as_ref()).await {
                    Ok(blocks) => {
                        for block in blocks {
                            let stats = BlockStats::compute(last.as_ref(), &block);
                            stats.publish(ClientMetrics::global());
                            info!(
                                "block {}: {} txs, {} gas used",
                                stats.number, stats.tx_count, stats.gas_used
                            );
                            last = Some(block);
                        }
                    }
                    Err(e) => warn!("block monitor poll failed: {e}"),
                }
            }
        })
    }

    /// Fetches every block after `last`, oldest first. The first poll only returns the head.
    async fn poll(&self, last: Option<&ObservedBlock>) -> Result<Vec<ObservedBlock>> {
        let head = self.client.block_number().await?;
        let first = match last {
            Some(b) if b.number >= head => return Ok(vec![]),
            Some(b) => b.number + 1,
            None => head,
        };
        let mut blocks = Vec::with_capacity((head - first + 1) as usize);
        for number in first..=head {
            let block = self.client.get_block_by_number(number).await?;
            blocks.push(ObservedBlock::from(&block));
        }
        Ok(blocks)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{config::ClientOptions, test_utils::spawn_anvil};

    fn block(number: u64, timestamp: u64, tx_count: usize) -> ObservedBlock {
        ObservedBlock {
            number,
            timestamp,
            gas_used: 21_000 * tx_count as u64,
            tx_count,
        }
    }

    #[test]
    fn tps_needs_a_previous_block() {
        let stats = BlockStats::compute(None, &block(1, 100, 4));
        assert_eq!(stats.tps, None);
        assert_eq!(stats.block_time, None);
        assert_eq!(stats.gas_used, 84_000);
    }

    #[test]
    fn tps_is_txs_over_timestamp_delta() {
        let stats = BlockStats::compute(Some(&block(1, 100, 0)), &block(2, 102, 10));
        assert_eq!(stats.tps, Some(5.0));
        let same_second = BlockStats::compute(Some(&block(2, 102, 0)), &block(3, 102, 3));
        assert_eq!(same_second.tps, None);
        assert_eq!(same_second.block_time, Some(0));
    }

    #[test]
    fn block_time_follows_header_timestamps_when_catching_up() {
        // three blocks fetched in one poll
        let blocks = [block(10, 1_000, 1), block(11, 1_012, 2), block(12, 1_024, 3)];
        let times = blocks
            .windows(2)
            .map(|w| BlockStats::compute(Some(&w[0]), &w[1]).block_time)
            .collect::<Vec<_>>();
        assert_eq!(times, vec![Some(12), Some(12)]);
    }

    #[tokio::test]
    async fn publishes_block_number_until_cancelled() {
        let anvil = spawn_anvil();
        let client = ChainClient::connect(ClientOptions::new(anvil.endpoint()))
            .await
            .unwrap();
        let cancel = CancellationToken::new();
        let handle = BlockMonitor::new(client)
            .with_interval(Duration::from_millis(100))
            .spawn(cancel.clone());
        tokio::time::sleep(Duration::from_millis(2500)).await;
        cancel.cancel();
        handle.await.unwrap();
        assert!(ClientMetrics::global().block_number.get() >= 1);
    }
}
