use anyhow::anyhow;
use tokio::sync::{Mutex, mpsc, oneshot};

/// Rendezvous hand-off channel backing one template's warm pool.
///
/// Consumers register a waiter; a producer completes only by
/// delivering into a live waiter. A pool slot therefore never
/// buffers more than the single container its producer is holding,
/// and a consumer that gives up before the hand-off leases nothing.
#[derive(Debug)]
pub struct Handoff<T> {
  waiters: mpsc::UnboundedSender<oneshot::Sender<T>>,
  queue: Mutex<mpsc::UnboundedReceiver<oneshot::Sender<T>>>,
}

impl<T> Default for Handoff<T> {
  fn default() -> Self {
    let (waiters, queue) = mpsc::unbounded_channel();
    Handoff {
      waiters,
      queue: Mutex::new(queue),
    }
  }
}

impl<T> Handoff<T> {
  /// Consumer side: registers a waiter and returns its receiving
  /// end. Waiters are served in registration order.
  pub fn waiter(&self) -> anyhow::Result<oneshot::Receiver<T>> {
    let (sender, receiver) = oneshot::channel();
    self
      .waiters
      .send(sender)
      .map_err(|_| anyhow!("hand-off channel closed"))?;
    Ok(receiver)
  }

  /// Producer side: takes the next registered waiter, suspending
  /// until one arrives. The returned sender may already be dead if
  /// the consumer gave up; callers keep the value and try the next
  /// waiter.
  pub async fn next_waiter(
    &self,
  ) -> Option<oneshot::Sender<T>> {
    let mut queue = self.queue.lock().await;
    queue.recv().await
  }
}

#[cfg(test)]
mod tests {
  use std::{sync::Arc, time::Duration};

  use tokio::time::timeout;

  use super::*;

  #[tokio::test]
  async fn handoff_delivers_to_a_live_waiter() {
    let handoff: Arc<Handoff<u32>> = Default::default();
    let waiter = handoff.waiter().unwrap();

    let producer = {
      let handoff = handoff.clone();
      tokio::spawn(async move {
        let slot = handoff.next_waiter().await.unwrap();
        slot.send(7).unwrap();
      })
    };

    assert_eq!(waiter.await.unwrap(), 7);
    producer.await.unwrap();
  }

  #[tokio::test]
  async fn waiters_are_served_in_registration_order() {
    let handoff: Arc<Handoff<u32>> = Default::default();
    let first = handoff.waiter().unwrap();
    let second = handoff.waiter().unwrap();

    handoff.next_waiter().await.unwrap().send(1).unwrap();
    handoff.next_waiter().await.unwrap().send(2).unwrap();

    assert_eq!(first.await.unwrap(), 1);
    assert_eq!(second.await.unwrap(), 2);
  }

  #[tokio::test]
  async fn dead_waiter_returns_the_value_to_the_producer() {
    let handoff: Arc<Handoff<u32>> = Default::default();
    drop(handoff.waiter().unwrap());
    let survivor = handoff.waiter().unwrap();

    let slot = handoff.next_waiter().await.unwrap();
    let returned = slot.send(9).unwrap_err();
    assert_eq!(returned, 9);

    let slot = handoff.next_waiter().await.unwrap();
    slot.send(returned).unwrap();
    assert_eq!(survivor.await.unwrap(), 9);
  }

  #[tokio::test]
  async fn producer_suspends_without_a_waiter() {
    let handoff: Arc<Handoff<u32>> = Default::default();
    let blocked =
      timeout(Duration::from_millis(50), handoff.next_waiter())
        .await;
    assert!(blocked.is_err());
  }
}
