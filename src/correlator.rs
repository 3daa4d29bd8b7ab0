//! Request/response correlator (C5): suspends a caller on a session key and
//! wakes it when the matching RESPONSE/ERROR arrives, or when its deadline
//! elapses first. Exactly one of "delivered" or "timed out" is ever observed
//! by a given waiter.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Instant;

use tokio::sync::oneshot;
use tokio::time::Instant as TokioInstant;
use tracing::{debug, warn};

use crate::error::Error;
use crate::wire::ReturnCode;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PendingKey {
    pub service_id: u16,
    pub method_id: u16,
    pub session_id: u16,
}

/// What an inbound reply carries to the waiting caller.
#[derive(Debug, Clone)]
pub enum Reply {
    Response(Vec<u8>),
    Error(ReturnCode),
}

/// Suspends and wakes callers of `send_request(wait_for_response = true)`.
#[derive(Default)]
pub struct Correlator {
    pending: Mutex<HashMap<PendingKey, oneshot::Sender<Reply>>>,
}

impl Correlator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a waiter for `key` before the request is sent, so a very
    /// fast reply can never race ahead of the registration.
    fn register(&self, key: PendingKey) -> oneshot::Receiver<Reply> {
        let (tx, rx) = oneshot::channel();
        self.pending.lock().unwrap().insert(key, tx);
        rx
    }

    /// Delivers an inbound RESPONSE or ERROR to its waiter, if one exists.
    /// Returns `false` (and logs) when no caller is waiting — e.g. a
    /// response for a request this node never sent, or one that already
    /// timed out.
    pub fn complete(&self, key: PendingKey, reply: Reply) -> bool {
        let waiter = self.pending.lock().unwrap().remove(&key);
        match waiter {
            Some(sender) => {
                debug!(
                    service_id = key.service_id,
                    method_id = key.method_id,
                    session_id = key.session_id,
                    "delivering reply to waiting caller"
                );
                sender.send(reply).is_ok()
            }
            None => {
                warn!(
                    service_id = key.service_id,
                    method_id = key.method_id,
                    session_id = key.session_id,
                    "reply arrived with no matching waiter"
                );
                false
            }
        }
    }

    /// Registers a waiter, sends `send`, and waits until either a reply
    /// arrives or `deadline` elapses. `send` runs after registration so the
    /// response can never beat the correlator to the punch.
    pub async fn wait_for<F, Fut>(&self, key: PendingKey, deadline: Instant, send: F) -> Result<Vec<u8>, Error>
    where
        F: FnOnce(PendingKey) -> Fut,
        Fut: std::future::Future<Output = Result<(), Error>>,
    {
        let receiver = self.register(key);
        if let Err(err) = send(key).await {
            self.pending.lock().unwrap().remove(&key);
            return Err(err);
        }

        let tokio_deadline = TokioInstant::now() + deadline.saturating_duration_since(Instant::now());
        match tokio::time::timeout_at(tokio_deadline, receiver).await {
            Ok(Ok(Reply::Response(payload))) => Ok(payload),
            Ok(Ok(Reply::Error(return_code))) => Err(Error::RequestFailed {
                service_id: key.service_id,
                method_id: key.method_id,
                return_code,
            }),
            Ok(Err(_canceled)) => Err(Error::Cancelled),
            Err(_elapsed) => {
                self.pending.lock().unwrap().remove(&key);
                Err(Error::Timeout {
                    service_id: key.service_id,
                    method_id: key.method_id,
                })
            }
        }
    }

    /// Trips every outstanding waiter with `Cancelled`, used by `stop()`.
    pub fn cancel_all(&self) {
        let waiters: Vec<_> = self.pending.lock().unwrap().drain().collect();
        for (_, sender) in waiters {
            // Dropping the sender without a value wakes the receiver with
            // `RecvError`, which `wait_for` maps to `Error::Cancelled`.
            drop(sender);
        }
    }

    #[cfg(test)]
    pub fn pending_count(&self) -> usize {
        self.pending.lock().unwrap().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn key() -> PendingKey {
        PendingKey {
            service_id: 0x1001,
            method_id: 0x0001,
            session_id: 1,
        }
    }

    #[tokio::test]
    async fn delivers_a_response_to_the_waiting_caller() {
        let correlator = std::sync::Arc::new(Correlator::new());
        let deadline = Instant::now() + Duration::from_millis(500);
        let c = correlator.clone();
        let handle = tokio::spawn(async move { c.wait_for(key(), deadline, |_k| async move { Ok(()) }).await });

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(correlator.complete(key(), Reply::Response(vec![1, 2, 3])));

        let result = handle.await.unwrap();
        assert_eq!(result.unwrap(), vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn times_out_when_no_reply_arrives() {
        let correlator = Correlator::new();
        let deadline = Instant::now() + Duration::from_millis(20);
        let result = correlator
            .wait_for(key(), deadline, |_| async { Ok(()) })
            .await;
        assert!(matches!(result, Err(Error::Timeout { .. })));
        assert_eq!(correlator.pending_count(), 0);
    }

    #[test]
    fn complete_with_no_waiter_returns_false() {
        let correlator = Correlator::new();
        assert!(!correlator.complete(key(), Reply::Response(vec![])));
    }

    #[tokio::test]
    async fn cancel_all_wakes_every_waiter_with_cancelled() {
        let correlator = std::sync::Arc::new(Correlator::new());
        let c = correlator.clone();
        let handle = tokio::spawn(async move {
            let deadline = Instant::now() + Duration::from_secs(5);
            c.wait_for(key(), deadline, |_| async { Ok(()) }).await
        });
        tokio::time::sleep(Duration::from_millis(10)).await;
        correlator.cancel_all();
        let result = handle.await.unwrap();
        assert!(matches!(result, Err(Error::Cancelled)));
    }
}
