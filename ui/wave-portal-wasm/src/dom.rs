//! DOM element bindings.
//!
//! All fields are resolved once at startup by `Elements::bind()`.

use wasm_bindgen::prelude::*;
use web_sys::{Document, Element, HtmlButtonElement, HtmlInputElement, Window};

// ── Helpers ──

pub fn window() -> Result<Window, JsValue> {
    web_sys::window().ok_or_else(|| JsValue::from_str("no window"))
}

pub fn document() -> Result<Document, JsValue> {
    window()?
        .document()
        .ok_or_else(|| JsValue::from_str("no document"))
}

pub fn by_id_typed<T: JsCast>(doc: &Document, id: &str) -> Option<T> {
    doc.get_element_by_id(id).and_then(|e| e.dyn_into::<T>().ok())
}

pub fn set_text(el: &Element, text: &str) {
    el.set_text_content(Some(text));
}

pub fn toggle_class(el: &Element, cls: &str, force: bool) {
    let _ = el.class_list().toggle_with_force(cls, force);
}

pub fn get_input_value(el: &HtmlInputElement) -> String {
    el.value().trim().to_string()
}

/// `content` of `<meta name="{name}">`, if present and non-empty.
pub fn meta_content(name: &str) -> Option<String> {
    let doc = document().ok()?;
    let meta = doc
        .query_selector(&format!("meta[name=\"{name}\"]"))
        .ok()??;
    let content = meta.get_attribute("content")?;
    let content = content.trim();
    (!content.is_empty()).then(|| content.to_owned())
}

pub fn alert(message: &str) {
    if let Ok(window) = window() {
        let _ = window.alert_with_message(message);
    }
}

// ── Elements struct ──

/// DOM references used by the portal. Clone-friendly (JS handles).
#[derive(Clone)]
pub struct Elements {
    pub document: Document,

    // Landing
    pub wave_btn: HtmlButtonElement,
    pub connect_btn: HtmlButtonElement,
    pub message_input: HtmlInputElement,

    // Status
    pub account_label: Element,
    pub wave_count: Element,
    pub loading: Element,

    // History
    pub wave_list: Element,
}

macro_rules! get_el {
    ($doc:expr, $id:expr) => {
        $doc.get_element_by_id($id)
            .ok_or_else(|| JsValue::from_str(&format!("missing element #{}", $id)))?
    };
}

macro_rules! get_typed {
    ($doc:expr, $ty:ty, $id:expr) => {
        by_id_typed::<$ty>(&$doc, $id)
            .ok_or_else(|| JsValue::from_str(&format!("missing {} #{}", stringify!($ty), $id)))?
    };
}

impl Elements {
    /// Resolve all DOM references. Call once after the page has loaded.
    pub fn bind() -> Result<Elements, JsValue> {
        let doc = document()?;
        Ok(Elements {
            wave_btn: get_typed!(doc, HtmlButtonElement, "waveButton"),
            connect_btn: get_typed!(doc, HtmlButtonElement, "connectButton"),
            message_input: get_typed!(doc, HtmlInputElement, "messageInput"),

            account_label: get_el!(doc, "accountLabel"),
            wave_count: get_el!(doc, "waveCount"),
            loading: get_el!(doc, "loading"),

            wave_list: get_el!(doc, "waveList"),
            document: doc,
        })
    }
}
