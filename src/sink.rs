//! Outbound persistence of batch quality scores.

use futures::future::BoxFuture;
use log::debug;
use sqlx::mysql::{MySqlPool, MySqlPoolOptions};

use crate::config::DbConfig;
use crate::error::QualityError;

/// Receiver of `(dataFlowId, quality)` updates. Object-safe so the detector
/// can hold any sink behind an `Arc`.
pub trait ScoreSink: Send + Sync {
    fn publish(&self, data_flow_id: u32, quality: i32) -> BoxFuture<'_, Result<(), QualityError>>;
}

const UPDATE_QUALITY: &str = "UPDATE dataflows SET quality = ? WHERE dataflowId = ?";

/// Production sink writing into the `dataflowdb` schema.
pub struct MySqlSink {
    pool: MySqlPool,
}

impl MySqlSink {
    /// Build the sink on a lazily connecting pool; the first publish opens
    /// the connection.
    pub fn connect_lazy(config: &DbConfig) -> Result<Self, QualityError> {
        let pool = MySqlPoolOptions::new()
            .max_connections(4)
            .connect_lazy(&config.url())
            .map_err(|e| QualityError::Persistence(e.to_string()))?;
        Ok(Self { pool })
    }
}

impl ScoreSink for MySqlSink {
    fn publish(&self, data_flow_id: u32, quality: i32) -> BoxFuture<'_, Result<(), QualityError>> {
        Box::pin(async move {
            sqlx::query(UPDATE_QUALITY)
                .bind(quality)
                .bind(data_flow_id)
                .execute(&self.pool)
                .await
                .map_err(|e| QualityError::Persistence(e.to_string()))?;
            debug!("flow {data_flow_id}: quality {quality} stored");
            Ok(())
        })
    }
}
