use std::ops::RangeInclusive;
use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;

use leadflow::correlator::LeadProcessor;
use leadflow::lead_lists::LeadListCreatedMsg;

/// Stand-in unit of work: sleeps a few seconds and sometimes fails, so
/// the surrounding correlation machinery can be exercised end to end.
/// Swap in a real `LeadProcessor` to do actual ingestion.
pub struct SimulatedProcessor {
    delay_ms: RangeInclusive<u64>,
    failure_pct: u32,
    processed_range: RangeInclusive<i32>,
}

impl Default for SimulatedProcessor {
    fn default() -> Self {
        Self {
            delay_ms: 2_000..=5_000,
            failure_pct: 20,
            processed_range: 10..=500,
        }
    }
}

impl SimulatedProcessor {
    pub fn new(
        delay_ms: RangeInclusive<u64>,
        failure_pct: u32,
        processed_range: RangeInclusive<i32>,
    ) -> Self {
        Self {
            delay_ms,
            failure_pct,
            processed_range,
        }
    }
}

#[async_trait]
impl LeadProcessor for SimulatedProcessor {
    async fn process(&self, msg: &LeadListCreatedMsg) -> anyhow::Result<i32> {
        let (delay_ms, fails, processed_count) = {
            let mut rng = rand::thread_rng();
            (
                rng.gen_range(self.delay_ms.clone()),
                rng.gen_range(1..=100) <= self.failure_pct,
                rng.gen_range(self.processed_range.clone()),
            )
        };

        tracing::info!(
            lead_list_id = %msg.lead_list_id,
            source_url = %msg.source_url,
            delay_ms,
            "simulating lead list processing"
        );
        tokio::time::sleep(Duration::from_millis(delay_ms)).await;

        if fails {
            anyhow::bail!("simulated processing failure");
        }

        tracing::info!(processed_count, "processed leads");
        Ok(processed_count)
    }
}
