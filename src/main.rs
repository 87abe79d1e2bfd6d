use std::sync::Arc;

use anyhow::Result;
use log::info;

use cam_quality::amqp;
use cam_quality::sink::MySqlSink;
use cam_quality::{Config, Detector};

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();

    let config = Config::from_env()?;

    let sink = Arc::new(MySqlSink::connect_lazy(&config.db)?);
    let detector = Arc::new(Detector::new(sink));

    tokio::select! {
        result = amqp::run(&config.amqp, Arc::clone(&detector)) => {
            result?;
        }
        _ = tokio::signal::ctrl_c() => {
            info!("interrupt received, shutting down");
        }
    }

    Ok(())
}
