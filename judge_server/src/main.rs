use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use anyhow::Result;
use judge_core::{
    dispatch::{DirQueue, DirStore, Dispatcher},
    judge::{JudgeSettings, Pipeline},
    sandbox::docker::DockerProvider,
};
use lapin::{Connection, ConnectionProperties};
use log::{error, info};
use tokio_amqp::*;

mod amqp;
mod config;

use amqp::PublishingSink;
use config::ServerConfig;

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();

    let config = ServerConfig::load()?;
    let judge = &config.judge;

    let pipeline = Pipeline::new(
        Box::new(DockerProvider::new(judge.docker.clone())),
        JudgeSettings::from(judge),
    )?;
    let queue = DirQueue::new(&judge.queue_dir)?;
    let mut sink = PublishingSink {
        store: DirStore::new(&judge.results_dir)?,
        outbox: None,
    };

    // kept alive for the lifetime of the broker tasks
    let _connection = match &config.amqp {
        Some(amqp) => {
            let conn =
                Connection::connect(&amqp.addr, ConnectionProperties::default().with_tokio())
                    .await?;
            info!("connected to {}", amqp.addr);

            let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
            sink.outbox = Some(tx);

            let ingest_channel = conn.create_channel().await?;
            let ingest_queue = DirQueue::new(&judge.queue_dir)?;
            let rejections = sink.clone();
            let task_queue = amqp.task_queue.clone();
            tokio::spawn(async move {
                if let Err(e) =
                    amqp::ingest(ingest_channel, task_queue, ingest_queue, rejections).await
                {
                    error!("job ingestion stopped: {}", e);
                }
            });

            let publish_channel = conn.create_channel().await?;
            let result_queue = amqp.result_queue.clone();
            tokio::spawn(async move {
                if let Err(e) = amqp::publish(publish_channel, result_queue, rx).await {
                    error!("result publishing stopped: {}", e);
                }
            });

            Some(conn)
        }
        None => None,
    };

    let shutdown = Arc::new(AtomicBool::new(false));
    let flag = shutdown.clone();
    let poll_interval = judge.poll_interval();
    let worker = tokio::task::spawn_blocking(move || {
        let mut dispatcher = Dispatcher::new(queue, sink, pipeline, poll_interval);
        dispatcher.run(&flag);
    });

    tokio::signal::ctrl_c().await?;
    info!("shutting down after the current job");
    shutdown.store(true, Ordering::SeqCst);
    worker.await?;

    Ok(())
}
