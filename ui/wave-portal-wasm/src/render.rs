//! Renders `ViewSnapshot`s into the page.

use std::cell::Cell;
use std::rc::Rc;
use wasm_bindgen::prelude::*;
use wp_api_types::{ViewSnapshot, Wave};
use wp_sync_core::Session;

use crate::dom::{self, Elements};

/// Label/value pairs shown for one wave, in display order.
pub fn wave_fields(wave: &Wave) -> [(&'static str, String); 3] {
    [
        ("Address", wave.address.to_string()),
        ("Time", wave.timestamp.format("%a %b %d %Y %H:%M:%S UTC").to_string()),
        ("Message", wave.message.clone()),
    ]
}

pub fn account_text(snapshot: &ViewSnapshot) -> String {
    match &snapshot.account {
        Some(account) => format!("Connected: {account}"),
        None => "Not connected".to_owned(),
    }
}

pub struct Renderer {
    els: Elements,
    /// Number of list entries already in the DOM; the list only grows.
    rendered: Cell<usize>,
}

impl Renderer {
    pub fn new(els: Elements) -> Self {
        Self {
            els,
            rendered: Cell::new(0),
        }
    }

    pub fn render(&self, snapshot: &ViewSnapshot) {
        let els = &self.els;
        dom::set_text(&els.account_label, &account_text(snapshot));
        dom::toggle_class(&els.connect_btn, "hidden", snapshot.account.is_some());
        dom::set_text(&els.wave_count, &snapshot.wave_count.to_string());
        dom::toggle_class(&els.loading, "hidden", !snapshot.busy);
        els.wave_btn.set_disabled(snapshot.busy);

        for wave in snapshot.waves.iter().skip(self.rendered.get()) {
            if let Err(err) = self.append(wave) {
                tracing::warn!(error = ?err, "could not render wave");
                return;
            }
            self.rendered.set(self.rendered.get() + 1);
        }
    }

    fn append(&self, wave: &Wave) -> Result<(), JsValue> {
        let doc = &self.els.document;
        let item = doc.create_element("div")?;
        item.set_class_name("wave");
        for (label, value) in wave_fields(wave) {
            let line = doc.create_element("div")?;
            dom::set_text(&line, &format!("{label}: {value}"));
            item.append_child(&line)?;
        }
        self.els.wave_list.append_child(&item)?;
        Ok(())
    }
}

/// Renders the current state once, then after every store transition.
pub fn bind(els: &Elements, session: &Session) {
    let renderer = Rc::new(Renderer::new(els.clone()));
    renderer.render(&session.snapshot());
    session.store().observe(move |snapshot| renderer.render(snapshot));
}
