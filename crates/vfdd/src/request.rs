//! Request and reply messages.
//!
//! Requests arrive as one JSON object per line:
//!
//! ```json
//! {"action": "add", "params": {"filename": "vm1.json", "r_fifo": "/tmp/vfd_reply.42"}}
//! {"action": "verbose", "params": {"loglevel": 2, "r_fifo": "/tmp/vfd_reply.42"}}
//! ```
//!
//! Replies are a single JSON object written to the pipe named by `r_fifo`.

use crate::error::{VfdError, VfdResult};
use serde::{Deserialize, Serialize};
use std::fmt;

/// The operations a requester can ask for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestKind {
    Add,
    Delete,
    Show,
    Ping,
    #[serde(rename = "verbose")]
    SetVerbosity,
    Dump,
}

impl RequestKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestKind::Add => "add",
            RequestKind::Delete => "delete",
            RequestKind::Show => "show",
            RequestKind::Ping => "ping",
            RequestKind::SetVerbosity => "verbose",
            RequestKind::Dump => "dump",
        }
    }
}

impl fmt::Display for RequestKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A decoded request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub kind: RequestKind,
    /// VF config resource for add/delete, selector for show.
    pub resource: Option<String>,
    pub log_level: Option<u8>,
    /// Name of the pipe the reply goes to.
    pub reply_to: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct WireRequest {
    action: RequestKind,
    #[serde(default)]
    params: WireParams,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct WireParams {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    filename: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    r_fifo: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    loglevel: Option<u8>,
}

impl Request {
    /// Creates a new request of `kind` replying to `reply_to`.
    pub fn new(kind: RequestKind, reply_to: impl Into<String>) -> Self {
        Self {
            kind,
            resource: None,
            log_level: None,
            reply_to: reply_to.into(),
        }
    }

    pub fn with_resource(mut self, resource: impl Into<String>) -> Self {
        self.resource = Some(resource.into());
        self
    }

    pub fn with_log_level(mut self, level: u8) -> Self {
        self.log_level = Some(level);
        self
    }

    /// Decodes one wire line.
    pub fn decode(line: &str) -> VfdResult<Self> {
        let wire: WireRequest = serde_json::from_str(line.trim())?;
        let reply_to = wire
            .params
            .r_fifo
            .filter(|r| !r.is_empty())
            .ok_or_else(|| {
                VfdError::validation(format!("{} request has no reply pipe", wire.action))
            })?;

        Ok(Self {
            kind: wire.action,
            resource: wire.params.filename.filter(|f| !f.is_empty()),
            log_level: wire.params.loglevel,
            reply_to,
        })
    }

    /// Encodes the request as one wire line, without the trailing newline.
    pub fn encode(&self) -> VfdResult<String> {
        let wire = WireRequest {
            action: self.kind,
            params: WireParams {
                filename: self.resource.clone(),
                r_fifo: Some(self.reply_to.clone()),
                loglevel: self.log_level,
            },
        };
        Ok(serde_json::to_string(&wire)?)
    }
}

/// Overall outcome of a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ReplyState {
    Ok,
    Error,
}

/// Reply sent back to the requester.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reply {
    pub state: ReplyState,
    /// Machine-readable status: "ok" or an error status.
    pub status: String,
    pub msg: String,
}

impl Reply {
    pub fn ok(msg: impl Into<String>) -> Self {
        Self {
            state: ReplyState::Ok,
            status: "ok".to_string(),
            msg: msg.into(),
        }
    }

    pub fn error(err: &VfdError) -> Self {
        Self {
            state: ReplyState::Error,
            status: err.status().to_string(),
            msg: err.to_string(),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.state == ReplyState::Ok
    }

    pub fn encode(&self) -> VfdResult<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn decode(text: &str) -> VfdResult<Self> {
        Ok(serde_json::from_str(text.trim())?)
    }
}
