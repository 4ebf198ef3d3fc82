//! Minimal W3C WebDriver wire client over blocking HTTP.

use std::time::Duration;

use reqwest::blocking::{Client, RequestBuilder};
use serde_json::{json, Value};
use tracing::trace;

use crate::error::DriverError;

/// Key under which the protocol returns element references.
pub const ELEMENT_KEY: &str = "element-6066-11e4-a52e-4f735466cecf";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Locator {
    Css,
    XPath,
}

impl Locator {
    fn strategy(self) -> &'static str {
        match self {
            Locator::Css => "css selector",
            Locator::XPath => "xpath",
        }
    }
}

#[derive(Clone, Debug)]
pub struct WireClient {
    http: Client,
    base: String,
}

impl WireClient {
    pub fn new(endpoint: &str, timeout: Duration) -> Result<Self, DriverError> {
        let http = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            base: endpoint.trim_end_matches('/').to_string(),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.base
    }

    /// `POST /session`; returns the new session id.
    pub fn new_session(&self, capabilities: &Value) -> Result<String, DriverError> {
        let value = self.send(self.http.post(format!("{}/session", self.base)).json(capabilities))?;
        value
            .get("sessionId")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| DriverError::Protocol("new session response without sessionId".into()))
    }

    pub fn delete_session(&self, session: &str) -> Result<(), DriverError> {
        self.send(self.http.delete(self.session_url(session, "")))
            .map(|_| ())
    }

    pub fn current_url(&self, session: &str) -> Result<String, DriverError> {
        let value = self.send(self.http.get(self.session_url(session, "/url")))?;
        Ok(value.as_str().unwrap_or_default().to_string())
    }

    pub fn navigate(&self, session: &str, url: &str) -> Result<(), DriverError> {
        self.post(session, "/url", json!({ "url": url })).map(|_| ())
    }

    pub fn execute(&self, session: &str, script: &str, args: Vec<Value>) -> Result<Value, DriverError> {
        self.post(
            session,
            "/execute/sync",
            json!({ "script": script, "args": args }),
        )
    }

    /// Chromium DevTools passthrough; only chromedriver implements it.
    pub fn cdp(&self, session: &str, cmd: &str, params: Value) -> Result<Value, DriverError> {
        self.post(
            session,
            "/goog/cdp/execute",
            json!({ "cmd": cmd, "params": params }),
        )
    }

    pub fn find_elements(
        &self,
        session: &str,
        locator: Locator,
        selector: &str,
    ) -> Result<Vec<String>, DriverError> {
        let value = self.post(
            session,
            "/elements",
            json!({ "using": locator.strategy(), "value": selector }),
        )?;
        let items = value
            .as_array()
            .ok_or_else(|| DriverError::Protocol("elements response is not an array".into()))?;
        Ok(items
            .iter()
            .filter_map(|item| item.get(ELEMENT_KEY).and_then(Value::as_str))
            .map(str::to_string)
            .collect())
    }

    pub fn is_displayed(&self, session: &str, element: &str) -> Result<bool, DriverError> {
        let value = self.send(
            self.http
                .get(self.session_url(session, &format!("/element/{element}/displayed"))),
        )?;
        Ok(value.as_bool().unwrap_or(false))
    }

    pub fn click(&self, session: &str, element: &str) -> Result<(), DriverError> {
        self.post(session, &format!("/element/{element}/click"), json!({}))
            .map(|_| ())
    }

    fn post(&self, session: &str, path: &str, body: Value) -> Result<Value, DriverError> {
        self.send(self.http.post(self.session_url(session, path)).json(&body))
    }

    fn session_url(&self, session: &str, path: &str) -> String {
        format!("{}/session/{session}{path}", self.base)
    }

    /// Send a command and unwrap the protocol's `{"value": ...}` envelope.
    fn send(&self, request: RequestBuilder) -> Result<Value, DriverError> {
        let resp = request.send()?;
        let status = resp.status();
        let body: Value = resp
            .json()
            .map_err(|err| DriverError::Protocol(format!("status {status}: {err}")))?;
        let value = body.get("value").cloned().unwrap_or(Value::Null);
        if let Some(error) = value.get("error").and_then(Value::as_str) {
            let message = value
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();
            trace!(target: "autofetch::webdriver", %status, error, %message, "driver command failed");
            return Err(DriverError::Command {
                error: error.to_string(),
                message,
            });
        }
        if !status.is_success() {
            return Err(DriverError::Protocol(format!("status {status} without error payload")));
        }
        Ok(value)
    }
}

/// Element reference argument for `execute/sync`.
pub fn element_arg(element: &str) -> Value {
    json!({ ELEMENT_KEY: element })
}
