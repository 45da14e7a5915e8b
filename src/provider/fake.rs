//! Scripted provider for tests: replays canned replies in order and records
//! every request it receives.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::Notify;

use super::{DynProvider, Provider};
use crate::wire::{GenerationReply, GenerationRequest};

#[derive(Default)]
struct Inner {
    replies: Mutex<VecDeque<Result<String, String>>>,
    requests: Mutex<Vec<GenerationRequest>>,
    gate: Option<Arc<Notify>>,
    entered: Notify,
}

#[derive(Clone)]
pub(crate) struct Scripted(Arc<Inner>);

impl Scripted {
    /// `Ok(text)` is a successful reply, `Err(msg)` a transport failure.
    pub(crate) fn new(replies: Vec<Result<String, String>>) -> Self {
        Self(Arc::new(Inner { replies: Mutex::new(replies.into()), ..Default::default() }))
    }

    /// Like `new`, but every call waits for the returned gate to be notified.
    pub(crate) fn gated(replies: Vec<Result<String, String>>) -> (Self, Arc<Notify>) {
        let gate = Arc::new(Notify::new());
        let inner = Inner {
            replies: Mutex::new(replies.into()),
            gate: Some(gate.clone()),
            ..Default::default()
        };
        (Self(Arc::new(inner)), gate)
    }

    pub(crate) fn boxed(&self) -> DynProvider {
        Box::new(self.clone())
    }

    pub(crate) fn requests(&self) -> Vec<GenerationRequest> {
        self.0.requests.lock().clone()
    }

    /// Resolves once a call has reached the provider.
    pub(crate) async fn wait_entered(&self) {
        self.0.entered.notified().await
    }
}

#[async_trait]
impl Provider for Scripted {
    async fn send(&self, req: &GenerationRequest) -> Result<GenerationReply> {
        self.0.requests.lock().push(req.clone());
        self.0.entered.notify_one();
        if let Some(gate) = &self.0.gate {
            gate.notified().await;
        }
        let next = self.0.replies.lock().pop_front();
        match next {
            Some(Ok(text)) => Ok(GenerationReply {
                text: if text.is_empty() { None } else { Some(text) },
                structured: req.schema.is_some(),
            }),
            Some(Err(msg)) => Err(anyhow!(msg)),
            None => Err(anyhow!("no scripted reply left for {}", req.stage.as_str())),
        }
    }
}
