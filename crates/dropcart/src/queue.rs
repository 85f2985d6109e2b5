//! Checkout queue ("throttle") polling state.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// GraphQL document sent to `/queue/poll`.
pub const POLL_QUERY: &str = "
      {
        poll(token: $token) {
          token
          pollAfter
          queueEtaSeconds
          productVariantAvailability {
            id
            available
          }
        }
      }
    ";

/// Name of the cookie carrying the queue token.
pub const QUEUE_TOKEN_COOKIE: &str = "_checkout_queue_token";

/// JSON body for a queue poll request.
pub fn poll_request_body(token: &str) -> Value {
    json!({
        "query": POLL_QUERY,
        "variables": { "token": token },
    })
}

/// Top-level `/queue/poll` response.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PollResponse {
    #[serde(default)]
    pub data: Option<PollData>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PollData {
    #[serde(default)]
    pub poll: Option<QueuePoll>,
}

impl PollResponse {
    pub fn into_poll(self) -> Option<QueuePoll> {
        self.data.and_then(|d| d.poll)
    }
}

/// Kind of queue poll result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollTypename {
    Continue,
    Complete,
    Unknown,
}

/// One queue poll result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueuePoll {
    #[serde(rename = "__typename", default)]
    pub typename: String,
    #[serde(default)]
    pub queue_eta_seconds: Option<u64>,
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default)]
    pub poll_after: Option<DateTime<Utc>>,
}

impl QueuePoll {
    pub fn kind(&self) -> PollTypename {
        match self.typename.as_str() {
            "PollContinue" => PollTypename::Continue,
            "PollComplete" => PollTypename::Complete,
            _ => PollTypename::Unknown,
        }
    }
}

/// The last poll result of a session, gating when the next poll may run.
#[derive(Debug, Clone, Default)]
pub struct QueueState {
    last: Option<QueuePoll>,
}

impl QueueState {
    pub fn record(&mut self, poll: QueuePoll) {
        self.last = Some(poll);
    }

    pub fn clear(&mut self) {
        self.last = None;
    }

    pub fn last(&self) -> Option<&QueuePoll> {
        self.last.as_ref()
    }

    /// How long to wait before polling again, or `None` if polling is allowed now.
    pub fn wait_time(&self, now: DateTime<Utc>) -> Option<Duration> {
        let after = self.last.as_ref()?.poll_after?;
        (after - now).to_std().ok().filter(|d| !d.is_zero())
    }

    pub fn may_poll(&self, now: DateTime<Utc>) -> bool {
        self.wait_time(now).is_none()
    }
}
