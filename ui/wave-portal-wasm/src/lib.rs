//! Wave Portal browser frontend.
//!
//! Binds the page to a `Session` driven by the injected wallet. Each concern
//! lives in its own module: `dom` (element lookup), `provider` (EIP-1193
//! transport), `render` (state to DOM), `events` (buttons and teardown).

pub mod dom;
pub mod events;
pub mod provider;
pub mod render;

use std::rc::Rc;
use tracing::warn;
use wasm_bindgen::prelude::*;
use wp_sync_core::{Session, SessionOptions};

pub const CONTRACT_META: &str = "wave-portal-contract";

/// WASM entry point, called when the module is instantiated.
#[wasm_bindgen(start)]
pub async fn start() -> Result<(), JsValue> {
    console_error_panic_hook::set_once();
    tracing_wasm::set_as_global_default();

    init().await
}

async fn init() -> Result<(), JsValue> {
    let els = dom::Elements::bind()?;

    let bindings = provider::bindings(dom::meta_content(CONTRACT_META));
    let session = Rc::new(Session::new(bindings, SessionOptions::default()));

    render::bind(&els, &session);
    events::bind_events(&els, &session);
    if let Err(err) = events::bind_teardown(&session) {
        warn!(error = ?err, "could not bind pagehide teardown");
    }

    session.mount().await;
    Ok(())
}
