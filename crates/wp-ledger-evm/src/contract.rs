use async_trait::async_trait;
use futures::StreamExt;
use futures::stream::{self, LocalBoxStream};
use serde_json::{Value, json};
use std::collections::VecDeque;
use std::rc::Rc;
use std::time::Duration;
use tracing::{debug, info, warn};
use wp_api_types::{NewWaveEvent, TxHash, WaveRecord};
use wp_ledger_client::{PendingWave, ProviderError, WaveEventSource, WaveLedger};

use crate::abi;
use crate::{Transport, expect_str};

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(4);

/// Wave Portal contract deployed at `address`, reached through `transport`.
pub struct WavePortalContract<T> {
    transport: Rc<T>,
    address: String,
    poll_interval: Duration,
}

impl<T> Clone for WavePortalContract<T> {
    fn clone(&self) -> Self {
        Self {
            transport: self.transport.clone(),
            address: self.address.clone(),
            poll_interval: self.poll_interval,
        }
    }
}

impl<T: Transport + 'static> WavePortalContract<T> {
    pub fn new(transport: Rc<T>, address: impl Into<String>) -> Self {
        Self {
            transport,
            address: address.into(),
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    async fn call(&self, signature: &str) -> Result<String, ProviderError> {
        let params = json!([{ "to": self.address, "data": abi::encode_call(signature) }, "latest"]);
        let result = self.transport.request("eth_call", params).await?;
        expect_str(&result, signature)
    }

    async fn sender(&self) -> Result<String, ProviderError> {
        let accounts = self.transport.request("eth_accounts", json!([])).await?;
        accounts
            .get(0)
            .map(|first| expect_str(first, "eth_accounts"))
            .transpose()?
            .ok_or_else(|| ProviderError::rpc(4100, "no authorized account to send from"))
    }
}

#[async_trait(?Send)]
impl<T: Transport + 'static> WaveLedger for WavePortalContract<T> {
    async fn get_total_waves(&self) -> Result<u64, ProviderError> {
        let raw = self.call(abi::GET_TOTAL_WAVES).await?;
        abi::decode_uint(&raw)
    }

    async fn get_all_waves(&self) -> Result<Vec<WaveRecord>, ProviderError> {
        let raw = self.call(abi::GET_ALL_WAVES).await?;
        abi::decode_wave_records(&raw)
    }

    async fn wave(&self, message: &str, gas_limit: u64) -> Result<Box<dyn PendingWave>, ProviderError> {
        let from = self.sender().await?;
        let params = json!([{
            "from": from,
            "to": self.address,
            "gas": format!("0x{gas_limit:x}"),
            "data": abi::encode_string_call(abi::WAVE, message),
        }]);
        let result = self.transport.request("eth_sendTransaction", params).await?;
        let hash = TxHash(expect_str(&result, "eth_sendTransaction")?);
        info!(tx_hash = %hash, gas_limit, "wave transaction submitted");

        Ok(Box::new(EvmPendingWave {
            transport: self.transport.clone(),
            hash,
            poll_interval: self.poll_interval,
        }))
    }
}

/// Transaction handle whose `wait` polls for the receipt.
pub struct EvmPendingWave<T> {
    transport: Rc<T>,
    hash: TxHash,
    poll_interval: Duration,
}

#[async_trait(?Send)]
impl<T: Transport> PendingWave for EvmPendingWave<T> {
    fn hash(&self) -> &TxHash {
        &self.hash
    }

    async fn wait(&self) -> Result<(), ProviderError> {
        loop {
            let receipt = self
                .transport
                .request("eth_getTransactionReceipt", json!([self.hash.0]))
                .await?;
            if receipt.is_null() {
                self.transport.delay(self.poll_interval).await;
                continue;
            }

            return match receipt.get("status").and_then(Value::as_str) {
                Some("0x1") => {
                    debug!(tx_hash = %self.hash, "transaction mined");
                    Ok(())
                }
                Some("0x0") => Err(ProviderError::Reverted(self.hash.clone())),
                other => Err(ProviderError::Decode(format!(
                    "receipt for {} has status {other:?}",
                    self.hash
                ))),
            };
        }
    }
}

/// A log filter installed on the provider; uninstalled when dropped.
struct InstalledFilter<T: Transport> {
    transport: Rc<T>,
    id: String,
}

impl<T: Transport> Drop for InstalledFilter<T> {
    fn drop(&mut self) {
        debug!(filter_id = %self.id, "uninstalling NewWave filter");
        self.transport.notify("eth_uninstallFilter", json!([self.id]));
    }
}

enum FilterState<T: Transport> {
    Install,
    Polling {
        filter: InstalledFilter<T>,
        buffered: VecDeque<NewWaveEvent>,
    },
}

impl<T: Transport + 'static> WaveEventSource for WavePortalContract<T> {
    fn new_wave_events(&self) -> Result<LocalBoxStream<'static, NewWaveEvent>, ProviderError> {
        let contract = self.clone();
        let events = stream::unfold(FilterState::Install, move |state| {
            let contract = contract.clone();
            async move { contract.next_event(state).await }
        });
        Ok(events.boxed_local())
    }
}

impl<T: Transport + 'static> WavePortalContract<T> {
    async fn next_event(&self, mut state: FilterState<T>) -> Option<(NewWaveEvent, FilterState<T>)> {
        loop {
            state = match state {
                FilterState::Install => match self.install_filter().await {
                    Ok(id) => {
                        debug!(filter_id = %id, "NewWave filter installed");
                        FilterState::Polling {
                            filter: InstalledFilter {
                                transport: self.transport.clone(),
                                id,
                            },
                            buffered: VecDeque::new(),
                        }
                    }
                    Err(err) => {
                        warn!(error = %err, "could not install NewWave filter");
                        return None;
                    }
                },
                FilterState::Polling { filter, mut buffered } => {
                    if let Some(event) = buffered.pop_front() {
                        return Some((event, FilterState::Polling { filter, buffered }));
                    }
                    self.transport.delay(self.poll_interval).await;
                    match self.filter_changes(&filter.id).await {
                        Ok(events) => buffered.extend(events),
                        Err(err) => warn!(error = %err, filter_id = %filter.id, "NewWave poll failed"),
                    }
                    FilterState::Polling { filter, buffered }
                }
            };
        }
    }

    async fn install_filter(&self) -> Result<String, ProviderError> {
        let params = json!([{
            "address": self.address,
            "topics": [abi::event_topic(abi::NEW_WAVE_EVENT)],
        }]);
        let result = self.transport.request("eth_newFilter", params).await?;
        expect_str(&result, "eth_newFilter")
    }

    /// Logs that fail to decode are skipped; the rest of the batch is kept.
    async fn filter_changes(&self, filter_id: &str) -> Result<Vec<NewWaveEvent>, ProviderError> {
        let result = self
            .transport
            .request("eth_getFilterChanges", json!([filter_id]))
            .await?;
        let Some(logs) = result.as_array() else {
            return Err(ProviderError::Decode(format!(
                "eth_getFilterChanges: expected array, got {result}"
            )));
        };

        let mut events = Vec::with_capacity(logs.len());
        for log in logs {
            match decode_log(log) {
                Ok(event) => events.push(event),
                Err(err) => warn!(error = %err, filter_id, "skipping undecodable NewWave log"),
            }
        }
        Ok(events)
    }
}

fn decode_log(log: &Value) -> Result<NewWaveEvent, ProviderError> {
    let from_topic = log
        .get("topics")
        .and_then(|topics| topics.get(1))
        .and_then(Value::as_str)
        .ok_or_else(|| ProviderError::Decode("NewWave log without from topic".to_owned()))?;
    let data = log.get("data").and_then(Value::as_str).unwrap_or("0x");
    abi::decode_new_wave(from_topic, data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::abi::tests::{address_word_hex, new_wave_data_hex, word_hex};
    use crate::testing::ScriptedTransport;

    const CONTRACT: &str = "0x5fbdb2315678afecb367f032d93f642f64180aa3";

    fn contract() -> (Rc<ScriptedTransport>, WavePortalContract<ScriptedTransport>) {
        let transport = Rc::new(ScriptedTransport::default());
        let contract = WavePortalContract::new(transport.clone(), CONTRACT)
            .with_poll_interval(Duration::from_millis(10));
        (transport, contract)
    }

    #[tokio::test]
    async fn total_waves_is_an_eth_call() -> anyhow::Result<()> {
        let (transport, contract) = contract();
        transport.respond("eth_call", Ok(json!(format!("0x{}", word_hex(7)))));

        assert_eq!(contract.get_total_waves().await?, 7);
        let requests = transport.requests.borrow();
        assert_eq!(requests[0].1[0]["to"], CONTRACT);
        assert_eq!(requests[0].1[0]["data"], abi::encode_call(abi::GET_TOTAL_WAVES));
        assert_eq!(requests[0].1[1], "latest");
        Ok(())
    }

    #[tokio::test]
    async fn wave_sends_from_first_account_with_gas_ceiling() -> anyhow::Result<()> {
        let (transport, contract) = contract();
        transport.respond("eth_accounts", Ok(json!(["0xabc"])));
        transport.respond("eth_sendTransaction", Ok(json!("0xfeed")));

        let pending = contract.wave("hello", 300_000).await?;
        assert_eq!(pending.hash(), &TxHash("0xfeed".to_owned()));

        let requests = transport.requests.borrow();
        let tx = &requests[1].1[0];
        assert_eq!(tx["from"], "0xabc");
        assert_eq!(tx["to"], CONTRACT);
        assert_eq!(tx["gas"], "0x493e0");
        assert_eq!(tx["data"], abi::encode_string_call(abi::WAVE, "hello"));
        Ok(())
    }

    #[tokio::test]
    async fn wave_without_account_fails_before_sending() {
        let (transport, contract) = contract();
        transport.respond("eth_accounts", Ok(json!([])));

        assert!(matches!(
            contract.wave("hello", 300_000).await,
            Err(ProviderError::Rpc { code: 4100, .. })
        ));
        assert_eq!(transport.requests.borrow().len(), 1);
    }

    #[tokio::test]
    async fn wait_polls_until_receipt_appears() -> anyhow::Result<()> {
        let (transport, contract) = contract();
        transport.respond("eth_accounts", Ok(json!(["0xabc"])));
        transport.respond("eth_sendTransaction", Ok(json!("0xfeed")));
        transport.respond("eth_getTransactionReceipt", Ok(Value::Null));
        transport.respond("eth_getTransactionReceipt", Ok(Value::Null));
        transport.respond("eth_getTransactionReceipt", Ok(json!({ "status": "0x1" })));

        let pending = contract.wave("hello", 300_000).await?;
        pending.wait().await?;

        assert_eq!(transport.delays.borrow().len(), 2);
        Ok(())
    }

    #[tokio::test]
    async fn failed_receipt_reports_revert() -> anyhow::Result<()> {
        let (transport, contract) = contract();
        transport.respond("eth_accounts", Ok(json!(["0xabc"])));
        transport.respond("eth_sendTransaction", Ok(json!("0xfeed")));
        transport.respond("eth_getTransactionReceipt", Ok(json!({ "status": "0x0" })));

        let pending = contract.wave("hello", 300_000).await?;
        assert_eq!(
            pending.wait().await,
            Err(ProviderError::Reverted(TxHash("0xfeed".to_owned())))
        );
        Ok(())
    }

    #[tokio::test]
    async fn event_stream_polls_filter_changes() -> anyhow::Result<()> {
        let (transport, contract) = contract();
        let from_topic = format!("0x{}", address_word_hex("0x00000000000000000000000000000000000000cc"));
        transport.respond("eth_newFilter", Ok(json!("0x1")));
        transport.respond("eth_getFilterChanges", Ok(json!([])));
        transport.respond(
            "eth_getFilterChanges",
            Ok(json!([
                {
                    "topics": [abi::event_topic(abi::NEW_WAVE_EVENT), from_topic],
                    "data": new_wave_data_hex(1_700_000_001, "first"),
                },
                {
                    "topics": [abi::event_topic(abi::NEW_WAVE_EVENT), from_topic],
                    "data": new_wave_data_hex(1_700_000_002, "second"),
                }
            ])),
        );

        let mut events = contract.new_wave_events()?;
        let first = events.next().await.expect("first event");
        let second = events.next().await.expect("second event");

        assert_eq!(first.message, "first");
        assert_eq!(second.message, "second");
        assert_eq!(second.timestamp, 1_700_000_002);

        let requests = transport.requests.borrow();
        assert_eq!(requests[0].1[0]["address"], CONTRACT);
        assert_eq!(requests[0].1[0]["topics"][0], abi::event_topic(abi::NEW_WAVE_EVENT));
        Ok(())
    }

    #[tokio::test]
    async fn malformed_logs_do_not_cost_the_rest_of_the_batch() -> anyhow::Result<()> {
        let (transport, contract) = contract();
        let from_topic = format!("0x{}", address_word_hex("0x00000000000000000000000000000000000000cc"));
        transport.respond(
            "eth_getFilterChanges",
            Ok(json!([
                {
                    "topics": [abi::event_topic(abi::NEW_WAVE_EVENT)],
                    "data": new_wave_data_hex(1_700_000_001, "no sender"),
                },
                {
                    "topics": [abi::event_topic(abi::NEW_WAVE_EVENT), from_topic],
                    "data": new_wave_data_hex(1_700_000_002, "good"),
                },
                {
                    "topics": [abi::event_topic(abi::NEW_WAVE_EVENT), from_topic],
                    "data": "0xzz",
                }
            ])),
        );

        let events = contract.filter_changes("0x1").await?;
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].message, "good");
        assert_eq!(events[0].timestamp, 1_700_000_002);
        Ok(())
    }

    #[tokio::test]
    async fn dropping_the_stream_uninstalls_the_filter() -> anyhow::Result<()> {
        let (transport, contract) = contract();
        let from_topic = format!("0x{}", address_word_hex("0x00000000000000000000000000000000000000cc"));
        transport.respond("eth_newFilter", Ok(json!("0x7")));
        transport.respond(
            "eth_getFilterChanges",
            Ok(json!([{
                "topics": [abi::event_topic(abi::NEW_WAVE_EVENT), from_topic],
                "data": new_wave_data_hex(1_700_000_001, "only"),
            }])),
        );

        let mut events = contract.new_wave_events()?;
        let only = events.next().await.expect("event");
        assert_eq!(only.message, "only");
        assert!(!transport.methods().contains(&"eth_uninstallFilter".to_owned()));

        drop(events);
        let requests = transport.requests.borrow();
        let (method, params) = requests.last().expect("uninstall request");
        assert_eq!(method, "eth_uninstallFilter");
        assert_eq!(params, &json!(["0x7"]));
        Ok(())
    }

    #[tokio::test]
    async fn stream_without_a_filter_uninstalls_nothing() -> anyhow::Result<()> {
        let (transport, contract) = contract();
        transport.respond("eth_newFilter", Err(ProviderError::Transport("refused".to_owned())));

        let mut events = contract.new_wave_events()?;
        assert!(events.next().await.is_none());
        drop(events);
        assert_eq!(transport.methods(), vec!["eth_newFilter".to_owned()]);
        Ok(())
    }

    #[tokio::test]
    async fn event_stream_ends_when_filter_cannot_be_installed() -> anyhow::Result<()> {
        let (transport, contract) = contract();
        transport.respond("eth_newFilter", Err(ProviderError::Transport("refused".to_owned())));

        let mut events = contract.new_wave_events()?;
        assert!(events.next().await.is_none());
        Ok(())
    }
}
