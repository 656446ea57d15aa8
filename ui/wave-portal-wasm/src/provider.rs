//! The wallet injected into the page as `window.ethereum` (EIP-1193).
//!
//! `InjectedTransport` plugs into the `wp-ledger-evm` adapters, so the page
//! talks to the contract through whatever node the wallet is pointed at.

use async_trait::async_trait;
use futures::FutureExt;
use futures::future::LocalBoxFuture;
use serde::Deserialize;
use serde_json::{Value, json};
use std::rc::Rc;
use std::time::Duration;
use tracing::{info, warn};
use wasm_bindgen::JsCast;
use wasm_bindgen::prelude::*;
use wasm_bindgen_futures::JsFuture;
use wp_ledger_client::{ProviderError, Timer};
use wp_ledger_evm::{Eip1193Wallet, Transport, WavePortalContract};
use wp_sync_core::{Bindings, Spawner};

const INJECTION_KEY: &str = "ethereum";

pub struct InjectedTransport {
    ethereum: JsValue,
}

impl InjectedTransport {
    /// `None` when the page has no injected wallet.
    pub fn detect() -> Option<Self> {
        let window = web_sys::window()?;
        let ethereum = js_sys::Reflect::get(&window, &JsValue::from_str(INJECTION_KEY)).ok()?;
        if ethereum.is_undefined() || ethereum.is_null() {
            return None;
        }
        Some(Self { ethereum })
    }
}

fn request_args(method: &str, params: Value) -> Result<JsValue, ProviderError> {
    let serializer = serde_wasm_bindgen::Serializer::json_compatible();
    serde::Serialize::serialize(&json!({ "method": method, "params": params }), &serializer)
        .map_err(|err| ProviderError::Transport(format!("{method}: {err}")))
}

async fn call(ethereum: &JsValue, args: JsValue) -> Result<JsValue, JsValue> {
    let request = js_sys::Reflect::get(ethereum, &JsValue::from_str("request"))?;
    let request = request.dyn_into::<js_sys::Function>()?;
    let promise = request.call1(ethereum, &args)?;
    JsFuture::from(js_sys::Promise::resolve(&promise)).await
}

/// Shape of the errors EIP-1193 providers reject with.
#[derive(Debug, Default, Deserialize)]
struct RpcErrorObject {
    #[serde(default)]
    code: Option<i64>,
    #[serde(default)]
    message: Option<String>,
}

fn provider_error(method: &str, rejection: RpcErrorObject) -> ProviderError {
    match rejection.code {
        Some(code) => ProviderError::rpc(code, rejection.message.unwrap_or_default()),
        None => ProviderError::Transport(format!(
            "{method}: {}",
            rejection.message.unwrap_or_else(|| "request failed".to_owned())
        )),
    }
}

impl Timer for InjectedTransport {
    fn delay(&self, duration: Duration) -> LocalBoxFuture<'static, ()> {
        gloo_timers::future::sleep(duration).boxed_local()
    }
}

#[async_trait(?Send)]
impl Transport for InjectedTransport {
    async fn request(&self, method: &str, params: Value) -> Result<Value, ProviderError> {
        let args = request_args(method, params)?;

        match call(&self.ethereum, args).await {
            Ok(result) if result.is_undefined() => Ok(Value::Null),
            Ok(result) => serde_wasm_bindgen::from_value(result)
                .map_err(|err| ProviderError::Decode(format!("{method}: {err}"))),
            Err(rejection) => {
                let rejection = serde_wasm_bindgen::from_value(rejection).unwrap_or_default();
                Err(provider_error(method, rejection))
            }
        }
    }

    fn notify(&self, method: &'static str, params: Value) {
        let args = match request_args(method, params) {
            Ok(args) => args,
            Err(err) => {
                warn!(error = %err, "notification dropped");
                return;
            }
        };
        let ethereum = self.ethereum.clone();
        wasm_bindgen_futures::spawn_local(async move {
            if let Err(err) = call(&ethereum, args).await {
                warn!(method, error = ?err, "notification failed");
            }
        });
    }
}

pub struct WasmSpawner;

impl Spawner for WasmSpawner {
    fn spawn_local(&self, task: LocalBoxFuture<'static, ()>) {
        wasm_bindgen_futures::spawn_local(task);
    }
}

/// Wires the session to the injected wallet, or leaves every ledger-facing
/// binding absent when there is none. Without a contract address only the
/// wallet is bound.
pub fn bindings(contract: Option<String>) -> Bindings {
    let spawner: Rc<dyn Spawner> = Rc::new(WasmSpawner);
    let Some(transport) = InjectedTransport::detect().map(Rc::new) else {
        info!("no injected wallet found");
        return Bindings::detached(spawner);
    };

    let wallet = Rc::new(Eip1193Wallet::new(transport.clone()));
    let Some(address) = contract else {
        warn!("no wave-portal-contract meta tag; ledger unavailable");
        return Bindings {
            wallet: Some(wallet),
            ..Bindings::detached(spawner)
        };
    };

    let contract = Rc::new(WavePortalContract::new(transport.clone(), address));
    Bindings {
        wallet: Some(wallet),
        ledger: Some(contract.clone()),
        events: Some(contract),
        timer: Some(transport),
        spawner,
    }
}
