//! Event binding.
//!
//! Button handlers run the session's async commands via
//! `wasm_bindgen_futures::spawn_local`.

use std::rc::Rc;
use tracing::{info, warn};
use wasm_bindgen::JsCast;
use wasm_bindgen::prelude::*;
use wp_ledger_client::SyncError;
use wp_sync_core::Session;

use crate::dom::{self, Elements};

pub const GET_WALLET_ALERT: &str = "Get MetaMask!";
pub const EMPTY_MESSAGE_PROMPT: &str = "Please enter a message before waving.";

/// Attaches an async click handler to an element.
macro_rules! on_click_async {
    ($el:expr, $els:expr, $session:expr, $handler:expr) => {{
        let els = $els.clone();
        let session = Rc::clone($session);
        let cb = Closure::wrap(Box::new(move |_: web_sys::MouseEvent| {
            let els2 = els.clone();
            let session2 = Rc::clone(&session);
            wasm_bindgen_futures::spawn_local(async move {
                $handler(&els2, &session2).await;
            });
        }) as Box<dyn FnMut(_)>);
        if let Err(err) = $el.add_event_listener_with_callback("click", cb.as_ref().unchecked_ref()) {
            warn!(error = ?err, "could not bind click handler");
        }
        cb.forget();
    }};
}

/// Text shown to the user for errors that warrant it; the rest are only logged.
pub fn user_notice(err: &SyncError) -> Option<&'static str> {
    match err {
        SyncError::ProviderMissing => Some(GET_WALLET_ALERT),
        SyncError::EmptyMessage => Some(EMPTY_MESSAGE_PROMPT),
        SyncError::MessageTooLong { .. } => Some("Keep your message to 100 characters or fewer."),
        _ => None,
    }
}

fn report(err: &SyncError) {
    match user_notice(err) {
        Some(notice) => dom::alert(notice),
        None => warn!(error = %err, "request failed"),
    }
}

async fn on_connect(_els: &Elements, session: &Session) {
    match session.connect().await {
        Ok(account) => info!(account = %account, "connected"),
        Err(err) => report(&err),
    }
}

async fn on_wave(els: &Elements, session: &Session) {
    // Re-entry while a round-trip is pending is ignored.
    if session.snapshot().busy {
        return;
    }
    let message = dom::get_input_value(&els.message_input);
    match session.submit(&message).await {
        Ok(hash) => {
            info!(tx_hash = %hash, "wave mined");
            els.message_input.set_value("");
        }
        Err(err) => report(&err),
    }
}

/// Bind all UI event listeners. Call once after init.
pub fn bind_events(els: &Elements, session: &Rc<Session>) {
    on_click_async!(els.connect_btn, els, session, on_connect);
    on_click_async!(els.wave_btn, els, session, on_wave);
}

/// Releases the live subscription when the page goes away.
pub fn bind_teardown(session: &Rc<Session>) -> Result<(), JsValue> {
    let session = Rc::clone(session);
    let cb = Closure::wrap(Box::new(move |_: web_sys::Event| {
        session.teardown();
    }) as Box<dyn FnMut(_)>);
    dom::window()?.add_event_listener_with_callback("pagehide", cb.as_ref().unchecked_ref())?;
    cb.forget();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use wp_api_types::TxHash;

    #[test]
    fn only_user_facing_errors_produce_a_notice() {
        assert_eq!(user_notice(&SyncError::ProviderMissing), Some(GET_WALLET_ALERT));
        assert_eq!(user_notice(&SyncError::EmptyMessage), Some(EMPTY_MESSAGE_PROMPT));
        assert!(user_notice(&SyncError::MessageTooLong { len: 101, max: 100 }).is_some());
        assert_eq!(user_notice(&SyncError::UserRejected), None);
        assert_eq!(user_notice(&SyncError::LedgerUnavailable("offline".to_owned())), None);
        assert_eq!(
            user_notice(&SyncError::TransactionFailed(TxHash("0x1".to_owned()).to_string())),
            None
        );
    }

    #[test]
    fn notices_agree_with_the_error_taxonomy() {
        for err in [
            SyncError::ProviderMissing,
            SyncError::UserRejected,
            SyncError::LedgerUnavailable(String::new()),
            SyncError::TransactionFailed(String::new()),
            SyncError::EmptyMessage,
            SyncError::MessageTooLong { len: 101, max: 100 },
        ] {
            assert_eq!(user_notice(&err).is_some(), err.is_user_facing(), "{err:?}");
        }
    }
}
