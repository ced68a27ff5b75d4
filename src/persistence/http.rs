//! Fire-and-forget upload of records with `fetch`
//!
//! Requests small enough for `keepalive` survive a page navigation. The
//! rest are tracked by `InFlight` so the completion redirect can wait.

use wasm_bindgen::JsCast;
use wasm_bindgen::JsValue;
use wasm_bindgen_futures::JsFuture;
use web_sys::{Request, RequestInit, RequestMode, Response};

use super::{InFlight, RecordSink, encode};
use crate::error::{ExperimentError, Result};
use crate::sim::Outbound;

/// Largest body the browser accepts for a keepalive request
const KEEPALIVE_MAX_BYTES: usize = 64 * 1024;

/// POSTs each record as JSON to `endpoint`
pub struct HttpSink {
    endpoint: String,
    uploads: InFlight,
}

impl HttpSink {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            uploads: InFlight::new(),
        }
    }

    /// Shared count of requests that have not settled
    pub fn in_flight(&self) -> InFlight {
        self.uploads.clone()
    }
}

impl RecordSink for HttpSink {
    fn submit(&mut self, record: &Outbound) {
        let body = match encode(record) {
            Ok(body) => body,
            Err(e) => {
                log::error!("Dropping record: {}", e);
                return;
            }
        };
        let endpoint = self.endpoint.clone();
        let participant = record.participant_id().to_string();
        let pending = self.uploads.start();

        // The frame loop never waits on this
        wasm_bindgen_futures::spawn_local(async move {
            if let Err(e) = post_json(&endpoint, &body).await {
                log::error!("Saving record for {} failed: {}", participant, e);
            }
            drop(pending);
        });
    }
}

async fn post_json(endpoint: &str, body: &str) -> Result<()> {
    let js_err = |e: JsValue| ExperimentError::Persistence(format!("{e:?}"));

    let opts = RequestInit::new();
    opts.set_method("POST");
    opts.set_mode(RequestMode::SameOrigin);
    opts.set_body(&JsValue::from_str(body));
    // Lets the request outlive the page; small bodies only
    opts.set_keepalive(body.len() <= KEEPALIVE_MAX_BYTES);

    let request = Request::new_with_str_and_init(endpoint, &opts).map_err(js_err)?;
    request
        .headers()
        .set("Content-Type", "application/json")
        .map_err(js_err)?;

    let window = web_sys::window()
        .ok_or_else(|| ExperimentError::Persistence("no window".to_string()))?;
    let response = JsFuture::from(window.fetch_with_request(&request))
        .await
        .map_err(js_err)?;
    let response: Response = response.dyn_into().map_err(js_err)?;

    if !response.ok() {
        return Err(ExperimentError::Persistence(format!(
            "HTTP {} from {}",
            response.status(),
            endpoint
        )));
    }
    Ok(())
}
