use futures_util::stream::StreamExt;
use judge_core::{
    dispatch::{check_id, DirQueue, DirStore, ResultSink},
    error::Result,
    JudgeResult,
};
use lapin::{
    options::{BasicAckOptions, BasicConsumeOptions, BasicPublishOptions, QueueDeclareOptions},
    types::FieldTable,
    BasicProperties, Channel,
};
use log::{error, info, warn};
use serde::Serialize;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};

/// Moves deliveries of `queue_name` into the durable directory queue. A
/// delivery is acked once it is on disk or its rejection is published.
pub async fn ingest(
    channel: Channel,
    queue_name: String,
    queue: DirQueue,
    mut rejections: PublishingSink,
) -> lapin::Result<()> {
    let task_queue = channel
        .queue_declare(
            &queue_name,
            QueueDeclareOptions::default(),
            FieldTable::default(),
        )
        .await?;
    info!("declare queue {:?}", task_queue);

    let mut consumer = channel
        .basic_consume(
            &queue_name,
            "judge_server",
            BasicConsumeOptions::default(),
            FieldTable::default(),
        )
        .await?;

    while let Some(delivery) = consumer.next().await {
        let (_, delivery) = delivery?;
        admit(&queue, &mut rejections, &delivery.data);
        delivery.ack(BasicAckOptions::default()).await?;
    }
    Ok(())
}

/// Publishes result documents handed over by the dispatcher.
pub async fn publish(
    channel: Channel,
    queue_name: String,
    mut outbox: UnboundedReceiver<Vec<u8>>,
) -> lapin::Result<()> {
    channel
        .queue_declare(
            &queue_name,
            QueueDeclareOptions::default(),
            FieldTable::default(),
        )
        .await?;

    while let Some(body) = outbox.recv().await {
        channel
            .basic_publish(
                "",
                &queue_name,
                BasicPublishOptions::default(),
                body,
                BasicProperties::default(),
            )
            .await?
            .await?;
    }
    Ok(())
}

/// Queues one job and returns the id it was queued under. A job that cannot
/// be queued gets its terminal result right away.
fn admit(queue: &DirQueue, rejections: &mut PublishingSink, payload: &[u8]) -> String {
    let id = job_id(payload, queue);
    match queue.enqueue(&id, payload) {
        Ok(_) => info!("job {} received", id),
        Err(e) => {
            error!("rejecting job {}: {}", id, e);
            let stop = JudgeResult::aborted(format!("rejected job: {}", e));
            if let Err(e) = rejections.publish(&id, &[stop]) {
                error!("cannot publish rejection of job {}: {}", id, e);
            }
        }
    }
    id
}

/// The `id` field of the job when it is usable as a file name and not
/// already queued, or a fresh one.
fn job_id(payload: &[u8], queue: &DirQueue) -> String {
    let requested = serde_json::from_slice::<serde_json::Value>(payload)
        .ok()
        .and_then(|f| f.get("id").and_then(|id| id.as_str()).map(String::from))
        .filter(|id| check_id(id).is_ok());

    match requested {
        Some(id) if !queue.is_pending(&id) => id,
        Some(id) => {
            warn!("job {} is already queued, renaming", id);
            uuid::Uuid::new_v4().to_string()
        }
        None => uuid::Uuid::new_v4().to_string(),
    }
}

#[derive(Serialize)]
struct ResultMessage<'a> {
    id: &'a str,
    results: &'a [JudgeResult],
}

/// Stores results on disk and forwards them to the broker when one is
/// configured.
#[derive(Clone)]
pub struct PublishingSink {
    pub store: DirStore,
    pub outbox: Option<UnboundedSender<Vec<u8>>>,
}

impl ResultSink for PublishingSink {
    fn publish(&mut self, id: &str, results: &[JudgeResult]) -> Result<()> {
        self.store.publish(id, results)?;

        if let Some(outbox) = &self.outbox {
            let body = serde_json::to_vec(&ResultMessage { id, results })?;
            if outbox.send(body).is_err() {
                warn!("result publisher is gone, results of {} only stored", id);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn scratch() -> PathBuf {
        std::env::temp_dir().join(format!("judge-server-{}", uuid::Uuid::new_v4()))
    }

    #[test]
    fn job_id_from_payload() -> Result<()> {
        let dir = scratch();
        let queue = DirQueue::new(&dir)?;
        assert_eq!(job_id(br#"{"id":"abc","language":"python"}"#, &queue), "abc");
        std::fs::remove_dir_all(&dir)?;
        Ok(())
    }

    #[test]
    fn job_id_generated_when_missing_or_unusable() -> Result<()> {
        let dir = scratch();
        let queue = DirQueue::new(&dir)?;
        let payloads: [&[u8]; 4] = [
            b"not json",
            br#"{"id":"../etc"}"#,
            br#"{"id":"a b"}"#,
            br#"{"id":"x:y"}"#,
        ];
        for payload in payloads.iter() {
            let id = job_id(payload, &queue);
            assert_eq!(id.len(), 36);
            assert!(check_id(&id).is_ok());
        }
        std::fs::remove_dir_all(&dir)?;
        Ok(())
    }

    #[test]
    fn repeated_id_does_not_replace_queued_job() -> Result<()> {
        let dir = scratch();
        let queue = DirQueue::new(&dir.join("queue"))?;
        let mut sink = PublishingSink {
            store: DirStore::new(&dir.join("results"))?,
            outbox: None,
        };

        let first = admit(&queue, &mut sink, br#"{"id":"abc","source":"print(1)"}"#);
        let second = admit(&queue, &mut sink, br#"{"id":"abc","source":"print(2)"}"#);

        assert_eq!(first, "abc");
        assert_ne!(second, "abc");
        assert!(queue.is_pending("abc"));
        assert!(queue.is_pending(&second));
        let kept = std::fs::read_to_string(dir.join("queue").join("abc.json"))?;
        assert!(kept.contains("print(1)"));
        std::fs::remove_dir_all(&dir)?;
        Ok(())
    }

    #[test]
    fn unqueueable_job_gets_terminal_result() -> Result<()> {
        let dir = scratch();
        let queue = DirQueue::new(&dir.join("queue"))?;
        std::fs::remove_dir_all(dir.join("queue"))?;
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let mut sink = PublishingSink {
            store: DirStore::new(&dir.join("results"))?,
            outbox: Some(tx),
        };

        let id = admit(&queue, &mut sink, br#"{"id":"lost"}"#);

        assert_eq!(id, "lost");
        let body = rx.try_recv().unwrap();
        let message: serde_json::Value = serde_json::from_slice(&body)?;
        assert_eq!(message["id"], "lost");
        assert_eq!(message["results"][0]["key"], "stop");
        assert!(message["results"][0]["stdout"]
            .as_str()
            .unwrap()
            .contains("rejected job"));
        assert!(sink.store.document_path("lost").exists());
        std::fs::remove_dir_all(&dir)?;
        Ok(())
    }

    #[test]
    fn sink_forwards_to_outbox() -> Result<()> {
        let dir = scratch();
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let mut sink = PublishingSink {
            store: DirStore::new(&dir)?,
            outbox: Some(tx),
        };
        sink.publish("job", &[JudgeResult::sentinel()])?;

        let body = rx.try_recv().unwrap();
        let message: serde_json::Value = serde_json::from_slice(&body)?;
        assert_eq!(message["id"], "job");
        assert_eq!(message["results"][0]["key"], "stop");
        std::fs::remove_dir_all(&dir)?;
        Ok(())
    }
}
