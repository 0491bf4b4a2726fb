use async_trait::async_trait;

/// Publish target seam (§4.D). Production wiring is `async-nats`; tests use
/// an in-memory fake so the router's retry/backoff logic can be exercised
/// without a live broker.
#[async_trait]
pub trait Bus: Send + Sync {
    async fn publish(&self, routing_key: &str, payload: &[u8]) -> anyhow::Result<()>;
}

pub struct NatsBus {
    client: async_nats::Client,
}

impl NatsBus {
    pub async fn connect(url: &str) -> anyhow::Result<Self> {
        let client = async_nats::connect(url).await?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Bus for NatsBus {
    async fn publish(&self, routing_key: &str, payload: &[u8]) -> anyhow::Result<()> {
        self.client
            .publish(routing_key.to_string(), payload.to_vec().into())
            .await?;
        self.client.flush().await?;
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    pub struct MemBus {
        pub published: Mutex<Vec<(String, Vec<u8>)>>,
        pub fail_routing_keys: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl Bus for MemBus {
        async fn publish(&self, routing_key: &str, payload: &[u8]) -> anyhow::Result<()> {
            if self.fail_routing_keys.lock().unwrap().iter().any(|k| k == routing_key) {
                anyhow::bail!("simulated publish failure for {routing_key}");
            }
            self.published
                .lock()
                .unwrap()
                .push((routing_key.to_string(), payload.to_vec()));
            Ok(())
        }
    }
}
