//! AMQP subscriber feeding the detector.
//!
//! Thin transport glue: consume the configured topic, pull the required
//! `dataFlowId` property off each delivery, decode the payload, and hand
//! the reading to the pipeline. Malformed deliveries are dropped with a log
//! line; the loop itself only ends when the connection does.

use std::sync::Arc;

use futures::StreamExt;
use lapin::message::Delivery;
use lapin::options::{BasicAckOptions, BasicConsumeOptions, QueueDeclareOptions};
use lapin::types::{AMQPValue, FieldTable};
use lapin::{Connection, ConnectionProperties};
use log::{error, info, warn};

use crate::cam;
use crate::config::AmqpConfig;
use crate::detector::Detector;
use crate::station::StationReading;

const CONSUMER_TAG: &str = "cam-quality";

/// Subscribe and dispatch until the connection closes.
pub async fn run(config: &AmqpConfig, detector: Arc<Detector>) -> anyhow::Result<()> {
    let connection = Connection::connect(&config.uri(), ConnectionProperties::default()).await?;
    let channel = connection.create_channel().await?;

    channel
        .queue_declare(
            &config.topic,
            QueueDeclareOptions::default(),
            FieldTable::default(),
        )
        .await?;

    let mut consumer = channel
        .basic_consume(
            &config.topic,
            CONSUMER_TAG,
            BasicConsumeOptions::default(),
            FieldTable::default(),
        )
        .await?;

    info!("listening for CAM messages on {}", config.topic);

    while let Some(delivery) = consumer.next().await {
        let delivery = match delivery {
            Ok(delivery) => delivery,
            Err(e) => {
                error!("consumer error: {e}");
                continue;
            }
        };
        if let Err(e) = delivery.ack(BasicAckOptions::default()).await {
            warn!("failed to acknowledge delivery: {e}");
        }
        handle_delivery(&detector, &delivery).await;
    }

    Ok(())
}

async fn handle_delivery(detector: &Detector, delivery: &Delivery) {
    let Some(data_flow_id) = data_flow_id(delivery.properties.headers().as_ref()) else {
        warn!("dropping CAM without a dataFlowId property");
        return;
    };

    let message = match cam::decode(&delivery.data) {
        Ok(message) => message,
        Err(e) => {
            warn!("dropping CAM: {e}");
            return;
        }
    };

    detector
        .process(StationReading::from(&message), data_flow_id)
        .await;
}

/// The correlation id threaded from the inbound property to the outbound
/// persistence row. Brokers disagree on the integer width, so any integer
/// header that fits an u32 is accepted.
fn data_flow_id(headers: Option<&FieldTable>) -> Option<u32> {
    match headers?.inner().get("dataFlowId")? {
        AMQPValue::ShortShortInt(v) => u32::try_from(*v).ok(),
        AMQPValue::ShortShortUInt(v) => Some(u32::from(*v)),
        AMQPValue::ShortInt(v) => u32::try_from(*v).ok(),
        AMQPValue::ShortUInt(v) => Some(u32::from(*v)),
        AMQPValue::LongInt(v) => u32::try_from(*v).ok(),
        AMQPValue::LongUInt(v) => Some(*v),
        AMQPValue::LongLongInt(v) => u32::try_from(*v).ok(),
        _ => None,
    }
}
