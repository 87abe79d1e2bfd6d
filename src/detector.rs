//! Detector orchestration and batched score aggregation.
//!
//! One coarse mutex guards the station registry and the batch metrics. Each
//! incoming CAM is scored by fanning out to every configured detector kind
//! on its own task; the results are combined with a weighted mean. Batch
//! results leave the process through a [`ScoreSink`], called while holding
//! no locks.

use std::collections::HashMap;
use std::sync::Arc;

use log::{debug, error, info, warn};
use tokio::sync::Mutex;

use crate::predictors::PredictorKind;
use crate::sink::ScoreSink;
use crate::station::{StationReading, StationState};
use crate::QualityError;

/// Readings per station between two publications.
pub const BATCH_SIZE: u32 = 4;

/// Scores at or above this value commit the incoming reading into the
/// history; anything below substitutes the prediction. At zero every
/// reading is accepted, but the substitution path stays reachable for
/// reconfiguration.
pub const VALIDITY_THRESHOLD: i32 = 0;

/// Highest (most plausible) score.
pub const MAX_SCORE: i32 = 7;

#[derive(Clone, Copy, Debug)]
enum DetectorKind {
    PositionConsistency,
}

const DETECTORS: [DetectorKind; 1] = [DetectorKind::PositionConsistency];
const DETECTOR_WEIGHTS: [i32; 1] = [1];

/// Piecewise-constant mapping from prediction distance (meters) to the
/// 1..=7 plausibility score.
pub fn position_consistency_score(distance: f64) -> i32 {
    if distance < 0.5 {
        7
    } else if distance < 1.0 {
        6
    } else if distance < 2.0 {
        5
    } else if distance < 5.0 {
        4
    } else if distance < 10.0 {
        3
    } else if distance < 20.0 {
        2
    } else {
        1
    }
}

fn weighted_mean(results: &[i32], weights: &[i32]) -> i32 {
    let weighted: i32 = results.iter().zip(weights).map(|(r, w)| r * w).sum();
    let total: i32 = weights.iter().sum();
    (f64::from(weighted) / f64::from(total)) as i32
}

/// Per-station score accumulator.
#[derive(Clone, Debug)]
pub struct BatchMetric {
    data_flow_id: u32,
    sum: i64,
    count: u32,
}

impl BatchMetric {
    pub fn new(data_flow_id: u32) -> Self {
        Self {
            data_flow_id,
            sum: 0,
            count: 0,
        }
    }

    pub fn update(&mut self, score: i32) {
        self.sum += i64::from(score);
        self.count += 1;
    }

    /// When a full batch has accumulated, return `(dataFlowId, mean)` and
    /// reset the counters.
    pub fn take_batch(&mut self) -> Option<(u32, i32)> {
        if self.count < BATCH_SIZE {
            return None;
        }
        let mean = (self.sum / i64::from(self.count)) as i32;
        self.sum = 0;
        self.count = 0;
        Some((self.data_flow_id, mean))
    }

    pub fn data_flow_id(&self) -> u32 {
        self.data_flow_id
    }

    pub fn count(&self) -> u32 {
        self.count
    }
}

#[derive(Default)]
struct Stores {
    stations: HashMap<u32, StationState>,
    metrics: HashMap<u32, BatchMetric>,
}

/// The station registry plus detector and batch orchestration.
pub struct Detector {
    stores: Arc<Mutex<Stores>>,
    sink: Arc<dyn ScoreSink>,
    predictor_kind: PredictorKind,
}

impl Detector {
    pub fn new(sink: Arc<dyn ScoreSink>) -> Self {
        Self::with_predictor(sink, PredictorKind::default())
    }

    pub fn with_predictor(sink: Arc<dyn ScoreSink>, predictor_kind: PredictorKind) -> Self {
        Self {
            stores: Arc::new(Mutex::new(Stores::default())),
            sink,
            predictor_kind,
        }
    }

    pub async fn contains(&self, station_id: u32) -> bool {
        self.stores.lock().await.stations.contains_key(&station_id)
    }

    /// Register a station from its first reading together with the data
    /// flow its scores will be attributed to. Re-registration is a no-op.
    pub async fn add_new_station(
        &self,
        station_id: u32,
        data_flow_id: u32,
        reading: &StationReading,
    ) {
        let mut stores = self.stores.lock().await;
        if stores.stations.contains_key(&station_id) {
            warn!("station {station_id} is already registered");
            return;
        }
        stores.stations.insert(
            station_id,
            StationState::with_predictor(reading, self.predictor_kind),
        );
        stores
            .metrics
            .insert(station_id, BatchMetric::new(data_flow_id));
    }

    /// Commit an accepted reading into the station's history.
    pub async fn update_station(
        &self,
        station_id: u32,
        reading: &StationReading,
    ) -> Result<(), QualityError> {
        let mut stores = self.stores.lock().await;
        let Some(station) = stores.stations.get_mut(&station_id) else {
            warn!("update for unregistered station {station_id}");
            return Err(QualityError::UnknownStation(station_id));
        };
        station.update(reading)
    }

    /// Commit the last prediction instead of a rejected reading.
    pub async fn update_station_with_last_prediction(
        &self,
        station_id: u32,
    ) -> Result<(), QualityError> {
        let mut stores = self.stores.lock().await;
        let Some(station) = stores.stations.get_mut(&station_id) else {
            warn!("update for unregistered station {station_id}");
            return Err(QualityError::UnknownStation(station_id));
        };
        station.update_with_prediction();
        Ok(())
    }

    /// Fan the reading out to every detector kind, each on its own task,
    /// and combine the scores with a weighted mean.
    pub async fn detect(&self, reading: &StationReading) -> i32 {
        let mut handles = Vec::with_capacity(DETECTORS.len());
        for kind in DETECTORS {
            let stores = Arc::clone(&self.stores);
            let reading = reading.clone();
            handles.push(tokio::spawn(async move {
                match kind {
                    DetectorKind::PositionConsistency => {
                        detect_position_consistency(&stores, &reading).await
                    }
                }
            }));
        }

        let mut results = Vec::with_capacity(handles.len());
        for handle in handles {
            match handle.await {
                Ok(score) => results.push(score),
                Err(e) => {
                    error!("detector worker failed: {e}");
                    results.push(0);
                }
            }
        }

        weighted_mean(&results, &DETECTOR_WEIGHTS)
    }

    /// Accumulate a score; every `BATCH_SIZE` readings publish the batch
    /// mean to the sink. The store lock is released before the sink call.
    pub async fn update_batch_metrics(&self, station_id: u32, score: i32) {
        let ready = {
            let mut stores = self.stores.lock().await;
            let metric = stores
                .metrics
                .entry(station_id)
                .or_insert_with(|| BatchMetric::new(0));
            metric.update(score);
            metric.take_batch()
        };

        if let Some((data_flow_id, mean)) = ready {
            info!("station {station_id}, flow {data_flow_id}: batch quality {mean}");
            if let Err(e) = self.sink.publish(data_flow_id, mean).await {
                error!("dropping batch result for flow {data_flow_id}: {e}");
            }
        }
    }

    /// The per-CAM control flow: register unknown stations, otherwise
    /// score, commit, and accumulate.
    pub async fn process(&self, reading: StationReading, data_flow_id: u32) {
        let station_id = reading.station_id;

        if !self.contains(station_id).await {
            self.add_new_station(station_id, data_flow_id, &reading).await;
            info!("first CAM from station {station_id}, detectors armed");
            return;
        }

        let score = self.detect(&reading).await;
        debug!("station {station_id}: plausibility {score}");

        let committed = if score >= VALIDITY_THRESHOLD {
            self.update_station(station_id, &reading).await
        } else {
            self.update_station_with_last_prediction(station_id).await
        };
        if let Err(e) = committed {
            warn!("commit failed for station {station_id}: {e}");
        }

        self.update_batch_metrics(station_id, score).await;
    }
}

/// Compare the incoming position with the station's predicted next
/// position. Unregistered stations score 0; a history shorter than two
/// samples cannot be disputed and scores the maximum.
async fn detect_position_consistency(
    stores: &Mutex<Stores>,
    reading: &StationReading,
) -> i32 {
    let mut stores = stores.lock().await;
    let Some(station) = stores.stations.get_mut(&reading.station_id) else {
        warn!(
            "position consistency requested for unregistered station {}",
            reading.station_id
        );
        return 0;
    };

    if station.size_positions() < 2 {
        return MAX_SCORE;
    }

    let prediction = station.predict_next_position();
    let distance = prediction.distance(&reading.position);
    debug!(
        "station {}: prediction ({:.7}, {:.7}), observed ({:.7}, {:.7}), distance {:.3} m",
        reading.station_id,
        prediction.latitude(),
        prediction.longitude(),
        reading.position.latitude(),
        reading.position.longitude(),
        distance
    );

    position_consistency_score(distance)
}

#[cfg(test)]
impl Detector {
    async fn batch_state(&self, station_id: u32) -> Option<(u32, u32)> {
        let stores = self.stores.lock().await;
        stores
            .metrics
            .get(&station_id)
            .map(|m| (m.data_flow_id(), m.count()))
    }

    async fn history_len(&self, station_id: u32) -> Option<usize> {
        let stores = self.stores.lock().await;
        stores.stations.get(&station_id).map(|s| s.size_positions())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Heading, Kinematics, Position, Speed, StationType};
    use futures::future::BoxFuture;
    use std::sync::Mutex as StdMutex;

    #[derive(Default)]
    struct MemorySink {
        published: StdMutex<Vec<(u32, i32)>>,
        fail: bool,
    }

    impl MemorySink {
        fn failing() -> Self {
            Self {
                published: StdMutex::new(Vec::new()),
                fail: true,
            }
        }

        fn published(&self) -> Vec<(u32, i32)> {
            self.published.lock().unwrap().clone()
        }
    }

    impl ScoreSink for MemorySink {
        fn publish(
            &self,
            data_flow_id: u32,
            quality: i32,
        ) -> BoxFuture<'_, Result<(), QualityError>> {
            Box::pin(async move {
                if self.fail {
                    return Err(QualityError::Persistence("injected failure".into()));
                }
                self.published.lock().unwrap().push((data_flow_id, quality));
                Ok(())
            })
        }
    }

    fn reading(station_id: u32, delta_time: u16, lat_raw: i32, speed_cms: i32) -> StationReading {
        StationReading {
            station_id,
            station_type: StationType::PassengerCar,
            position: Position::from_raw(
                delta_time,
                lat_raw,
                70_000_000,
                Heading::new(0, 0),
                Default::default(),
                Default::default(),
            ),
            kinematics: Kinematics {
                speed: Speed::new(speed_cms, 0),
                ..Kinematics::default()
            },
            drive_direction: "forward".into(),
            curvature_calculation_mode: "yawRateUsed".into(),
        }
    }

    fn detector_with_sink() -> (Detector, Arc<MemorySink>) {
        let sink = Arc::new(MemorySink::default());
        (Detector::new(Arc::clone(&sink) as Arc<dyn ScoreSink>), sink)
    }

    #[test]
    fn score_mapping_is_monotone_and_total() {
        let table = [
            (0.0, 7),
            (0.49, 7),
            (0.5, 6),
            (0.99, 6),
            (1.0, 5),
            (1.99, 5),
            (2.0, 4),
            (4.99, 4),
            (5.0, 3),
            (9.99, 3),
            (10.0, 2),
            (19.99, 2),
            (20.0, 1),
            (1e9, 1),
        ];
        let mut previous = i32::MAX;
        for (distance, expected) in table {
            let score = position_consistency_score(distance);
            assert_eq!(score, expected, "distance {distance}");
            assert!(score <= previous);
            previous = score;
        }
    }

    #[test]
    fn batch_metric_fires_once_per_batch() {
        let mut metric = BatchMetric::new(42);
        for score in [7, 6, 7] {
            metric.update(score);
            assert_eq!(metric.take_batch(), None);
        }
        metric.update(6);
        assert_eq!(metric.take_batch(), Some((42, 6)));
        assert_eq!(metric.count(), 0);
        assert_eq!(metric.take_batch(), None);
    }

    #[test]
    fn weighted_mean_truncates() {
        assert_eq!(weighted_mean(&[7], &[1]), 7);
        assert_eq!(weighted_mean(&[0], &[1]), 0);
    }

    #[tokio::test]
    async fn detect_scores_zero_for_unknown_station() {
        let (detector, _) = detector_with_sink();
        let score = detector.detect(&reading(9, 0, 450_000_000, 500)).await;
        assert_eq!(score, 0);
    }

    #[tokio::test]
    async fn single_sample_history_scores_maximum() {
        let (detector, _) = detector_with_sink();
        let first = reading(1, 0, 450_000_000, 500);
        detector.add_new_station(1, 11, &first).await;

        // Wildly distant reading, but one sample cannot be disputed.
        let score = detector.detect(&reading(1, 200, 459_000_000, 500)).await;
        assert_eq!(score, MAX_SCORE);
    }

    #[tokio::test]
    async fn straight_line_reading_scores_high() {
        let (detector, _) = detector_with_sink();
        // 5 m/s, one meter of northward motion per 200 ms tick.
        detector
            .add_new_station(2, 12, &reading(2, 0, 450_000_000, 500))
            .await;
        detector
            .update_station(2, &reading(2, 200, 450_000_090, 500))
            .await
            .unwrap();

        let incoming = reading(2, 400, 450_000_180, 500);
        let score = detector.detect(&incoming).await;
        assert!(
            score == 5 || score == 6,
            "on-track reading scored {score}"
        );
    }

    #[tokio::test]
    async fn implausible_jump_scores_minimum() {
        let (detector, _) = detector_with_sink();
        // 10 m/s, two meters per tick.
        detector
            .add_new_station(3, 13, &reading(3, 0, 450_000_000, 1000))
            .await;
        for i in 1..4u16 {
            detector
                .update_station(3, &reading(3, i * 200, 450_000_000 + i as i32 * 180, 1000))
                .await
                .unwrap();
        }

        // The next reading claims a point roughly 500 m up the road.
        let incoming = reading(3, 800, 450_045_000, 1000);
        let score = detector.detect(&incoming).await;
        assert_eq!(score, 1);
    }

    #[tokio::test]
    async fn rejected_reading_substitutes_the_prediction() {
        let (detector, _) = detector_with_sink();
        detector
            .add_new_station(4, 14, &reading(4, 0, 450_000_000, 500))
            .await;
        detector
            .update_station(4, &reading(4, 200, 450_000_090, 500))
            .await
            .unwrap();

        let _ = detector.detect(&reading(4, 400, 450_045_000, 500)).await;
        detector.update_station_with_last_prediction(4).await.unwrap();

        // The history advanced with the prediction, not the distant claim.
        assert_eq!(detector.history_len(4).await, Some(3));
    }

    #[tokio::test]
    async fn unknown_station_updates_fail() {
        let (detector, _) = detector_with_sink();
        let err = detector
            .update_station(99, &reading(99, 0, 450_000_000, 500))
            .await
            .unwrap_err();
        assert!(matches!(err, QualityError::UnknownStation(99)));

        let err = detector
            .update_station_with_last_prediction(99)
            .await
            .unwrap_err();
        assert!(matches!(err, QualityError::UnknownStation(99)));
    }

    #[tokio::test]
    async fn duplicate_registration_is_ignored() {
        let (detector, _) = detector_with_sink();
        let first = reading(5, 0, 450_000_000, 500);
        detector.add_new_station(5, 15, &first).await;
        detector.add_new_station(5, 99, &first).await;
        assert_eq!(detector.batch_state(5).await, Some((15, 0)));
    }

    #[tokio::test]
    async fn batch_of_four_publishes_the_integer_mean() {
        let (detector, sink) = detector_with_sink();
        detector
            .add_new_station(6, 42, &reading(6, 0, 450_000_000, 500))
            .await;

        for score in [7, 6, 7] {
            detector.update_batch_metrics(6, score).await;
            assert!(sink.published().is_empty());
        }
        detector.update_batch_metrics(6, 6).await;

        assert_eq!(sink.published(), vec![(42, 6)]);
        assert_eq!(detector.batch_state(6).await, Some((42, 0)));
    }

    #[tokio::test]
    async fn persistence_failure_still_resets_the_batch() {
        let sink = Arc::new(MemorySink::failing());
        let detector = Detector::new(Arc::clone(&sink) as Arc<dyn ScoreSink>);
        detector
            .add_new_station(7, 77, &reading(7, 0, 450_000_000, 500))
            .await;

        for score in [7, 7, 7, 7] {
            detector.update_batch_metrics(7, score).await;
        }
        assert!(sink.published().is_empty());
        assert_eq!(detector.batch_state(7).await, Some((77, 0)));
    }

    #[tokio::test]
    async fn process_drives_the_full_pipeline() {
        let (detector, sink) = detector_with_sink();

        // First CAM registers; the next four are scored and batched.
        detector.process(reading(8, 0, 450_000_000, 500), 42).await;
        assert!(detector.contains(8).await);

        for i in 1..=4u16 {
            detector
                .process(reading(8, i * 200, 450_000_000 + i as i32 * 90, 500), 0)
                .await;
        }

        let published = sink.published();
        assert_eq!(published.len(), 1, "exactly one batch publish");
        let (flow, quality) = published[0];
        assert_eq!(flow, 42, "dataFlowId carried from the first CAM");
        assert!((1..=7).contains(&quality), "quality was {quality}");
        assert_eq!(detector.history_len(8).await, Some(5));
    }
}
