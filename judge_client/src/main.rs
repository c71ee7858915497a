use anyhow::{anyhow, Context, Result};
use futures_util::stream::StreamExt;
use lapin::{
    options::{
        BasicAckOptions, BasicConsumeOptions, BasicNackOptions, BasicPublishOptions,
        QueueDeclareOptions,
    },
    types::FieldTable,
    BasicProperties, Connection, ConnectionProperties,
};
use log::{debug, info};
use tokio_amqp::*;

const TASK_QUEUE: &str = "judge_tasks";
const RESULT_QUEUE: &str = "judge_results";

/// Submits one job record and waits for its results.
#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();

    let path = std::env::args()
        .nth(1)
        .ok_or_else(|| anyhow!("usage: judge_client <submission.json>"))?;
    let raw = std::fs::read(&path).with_context(|| format!("reading `{}`", path))?;
    let mut job: serde_json::Value = serde_json::from_slice(&raw)?;
    let id = uuid::Uuid::new_v4().to_string();
    job.as_object_mut()
        .ok_or_else(|| anyhow!("`{}` is not a json object", path))?
        .insert("id".into(), id.clone().into());

    let addr = std::env::var("AMQP_ADDR").unwrap_or_else(|_| "amqp://127.0.0.1:5672/%2f".into());
    let conn = Connection::connect(&addr, ConnectionProperties::default().with_tokio()).await?;
    let channel_task = conn.create_channel().await?;
    let channel_result = conn.create_channel().await?;

    for (channel, queue) in [(&channel_task, TASK_QUEUE), (&channel_result, RESULT_QUEUE)].iter() {
        channel
            .queue_declare(queue, QueueDeclareOptions::default(), FieldTable::default())
            .await?;
    }

    let mut consumer = channel_result
        .basic_consume(
            RESULT_QUEUE,
            "judge_client",
            BasicConsumeOptions::default(),
            FieldTable::default(),
        )
        .await?;

    channel_task
        .basic_publish(
            "",
            TASK_QUEUE,
            BasicPublishOptions::default(),
            serde_json::to_vec(&job)?,
            BasicProperties::default(),
        )
        .await?
        .await?;
    info!("submitted job {}", id);

    while let Some(delivery) = consumer.next().await {
        let (_, delivery) = delivery?;
        match reply_for(&delivery.data, &id) {
            Some(results) => {
                delivery.ack(BasicAckOptions::default()).await?;
                println!("{}", serde_json::to_string_pretty(&results)?);
                return Ok(());
            }
            None => {
                // someone else's result
                delivery
                    .nack(BasicNackOptions {
                        requeue: true,
                        ..BasicNackOptions::default()
                    })
                    .await?;
            }
        }
    }

    Err(anyhow!("result queue closed before job {} finished", id))
}

/// The results carried by `body` when it answers job `id`.
fn reply_for(body: &[u8], id: &str) -> Option<serde_json::Value> {
    let mut message: serde_json::Value = match serde_json::from_slice(body) {
        Ok(message) => message,
        Err(e) => {
            debug!("unreadable result: {}", e);
            return None;
        }
    };
    if message["id"] == id {
        Some(message["results"].take())
    } else {
        None
    }
}
