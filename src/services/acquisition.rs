use chrono::{DateTime, Utc};
use log::{debug, error, info, warn};
use serde::Serialize;
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::config::settings::MeterParameterDefinition;
use crate::modbus::decoder::RegisterDecoder;
use crate::protocol::frame::FrameCodec;
use crate::protocol::payload::decode_readings;
use crate::storage::models::MeterReading;
use crate::storage::sink::PersistenceSink;
use crate::transport::{Batch, TransportClient};
use crate::utils::error::AcquisitionError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SchedulerState {
    Idle,
    Running,
    Stopped,
}

#[derive(Debug, Clone, Serialize)]
pub struct AcquisitionStats {
    pub state: SchedulerState,
    pub cycles_completed: u64,
    pub cycles_failed: u64,
    pub readings_persisted: u64,
    pub last_success: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
}

impl Default for AcquisitionStats {
    fn default() -> Self {
        Self {
            state: SchedulerState::Idle,
            cycles_completed: 0,
            cycles_failed: 0,
            readings_persisted: 0,
            last_success: None,
            last_error: None,
        }
    }
}

pub type SharedStats = Arc<RwLock<AcquisitionStats>>;

fn update_stats(stats: &SharedStats, f: impl FnOnce(&mut AcquisitionStats)) {
    match stats.write() {
        Ok(mut guard) => f(&mut guard),
        Err(poisoned) => f(&mut poisoned.into_inner()),
    }
}

pub fn read_stats(stats: &SharedStats) -> AcquisitionStats {
    match stats.read() {
        Ok(guard) => guard.clone(),
        Err(poisoned) => poisoned.into_inner().clone(),
    }
}

/// One fetch, decode and persist pass.
pub struct AcquisitionCycle {
    transport: Arc<dyn TransportClient>,
    sink: Arc<dyn PersistenceSink>,
    device_id: String,
    parameters: Arc<[MeterParameterDefinition]>,
    decoder: Option<RegisterDecoder>,
}

impl AcquisitionCycle {
    /// `decoder` is only needed for register batches; framed responses carry
    /// already decoded values.
    pub fn new(
        transport: Arc<dyn TransportClient>,
        sink: Arc<dyn PersistenceSink>,
        device_id: impl Into<String>,
        parameters: Arc<[MeterParameterDefinition]>,
        decoder: Option<RegisterDecoder>,
    ) -> Self {
        Self {
            transport,
            sink,
            device_id: device_id.into(),
            parameters,
            decoder,
        }
    }

    pub fn transport(&self) -> &dyn TransportClient {
        self.transport.as_ref()
    }

    pub fn sink(&self) -> &dyn PersistenceSink {
        self.sink.as_ref()
    }

    pub fn device_id(&self) -> &str {
        &self.device_id
    }

    /// Turn a fetched batch into readings in parameter-table order.
    /// Undecodable or non-finite register samples are logged and left out.
    pub fn decode_batch(&self, batch: Batch) -> Result<Vec<MeterReading>, AcquisitionError> {
        match batch {
            Batch::Registers(samples) => {
                let decoder = self.decoder.ok_or_else(|| {
                    AcquisitionError::ConfigError("No byte order configured for register decoding".to_string())
                })?;

                let mut readings = Vec::with_capacity(samples.len());
                for sample in samples {
                    let Some(parameter) = self.parameters.get(sample.index) else {
                        warn!("⚠️  Sample for unknown parameter index {} dropped", sample.index);
                        continue;
                    };
                    match decoder.decode(&sample.raw, parameter.format) {
                        // FF FF FF FF and friends mark "not available"
                        Ok(value) if !value.is_finite() => warn!(
                            "⚠️  '{}' (register 0x{:04X}) is not a finite number (raw {}), skipped",
                            parameter.name,
                            parameter.address,
                            hex::encode_upper(&sample.raw)
                        ),
                        Ok(value) => {
                            debug!(
                                "🔢 {} = {} {} (raw {})",
                                parameter.name,
                                value,
                                parameter.unit,
                                hex::encode_upper(&sample.raw)
                            );
                            readings.push(MeterReading::new(
                                sample.index,
                                parameter.name.clone(),
                                value,
                                parameter.unit.clone(),
                            ));
                        }
                        Err(e) => warn!(
                            "⚠️  Cannot decode '{}' (register 0x{:04X}): {}",
                            parameter.name, parameter.address, e
                        ),
                    }
                }
                Ok(readings)
            }
            Batch::Frame(raw) => {
                let payload = FrameCodec::decode(&raw)?;
                decode_readings(payload)
            }
        }
    }

    /// Fetch and decode without persisting.
    pub async fn read(&self) -> Result<Vec<MeterReading>, AcquisitionError> {
        let batch = self.transport.fetch_batch().await?;
        if batch.is_empty() {
            return Err(AcquisitionError::NoReadings);
        }
        debug!("📦 Fetched {} items from {}", batch.len(), self.transport.endpoint());
        let readings = self.decode_batch(batch)?;
        if readings.is_empty() {
            return Err(AcquisitionError::NoReadings);
        }
        Ok(readings)
    }

    /// Run one full cycle. Returns the number of readings persisted.
    pub async fn run(&self) -> Result<usize, AcquisitionError> {
        let readings = self.read().await?;
        self.sink.save(&readings, &self.device_id).await?;
        Ok(readings.len())
    }
}

struct AcquisitionSession {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

/// Fixed-interval, non-overlapping acquisition loop.
///
/// The first cycle starts one interval after `start()`. Ticks that fall due
/// while a cycle is still running are dropped.
pub struct AcquisitionScheduler {
    cycle: Arc<AcquisitionCycle>,
    interval: Duration,
    stats: SharedStats,
    session: Option<AcquisitionSession>,
}

impl AcquisitionScheduler {
    pub fn new(cycle: AcquisitionCycle, interval: Duration) -> Self {
        Self {
            cycle: Arc::new(cycle),
            interval,
            stats: Arc::new(RwLock::new(AcquisitionStats::default())),
            session: None,
        }
    }

    pub fn state(&self) -> SchedulerState {
        read_stats(&self.stats).state
    }

    pub fn stats(&self) -> SharedStats {
        self.stats.clone()
    }

    pub fn start(&mut self) {
        if self.session.is_some() {
            debug!("Scheduler already running, start ignored");
            return;
        }

        let cancel = CancellationToken::new();
        update_stats(&self.stats, |s| s.state = SchedulerState::Running);

        let handle = tokio::spawn(run_loop(
            self.cycle.clone(),
            self.interval,
            self.stats.clone(),
            cancel.clone(),
        ));

        info!(
            "▶️  Acquisition started: every {:?} via {} ({})",
            self.interval,
            self.cycle.transport().transport_type(),
            self.cycle.transport().endpoint()
        );
        self.session = Some(AcquisitionSession { cancel, handle });
    }

    /// Stop ticking. A cycle already in flight runs to completion first.
    pub async fn stop(&mut self) {
        if let Some(session) = self.session.take() {
            session.cancel.cancel();
            if let Err(e) = session.handle.await {
                error!("❌ Acquisition task ended abnormally: {}", e);
            }
            info!("⏹️  Acquisition stopped");
        }
        update_stats(&self.stats, |s| s.state = SchedulerState::Stopped);
    }
}

async fn run_loop(
    cycle: Arc<AcquisitionCycle>,
    period: Duration,
    stats: SharedStats,
    cancel: CancellationToken,
) {
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {}
        }

        let started = Instant::now();
        match cycle.run().await {
            Ok(count) => {
                info!("✅ Persisted {} readings to {}", count, cycle.sink().sink_type());
                update_stats(&stats, |s| {
                    s.cycles_completed += 1;
                    s.readings_persisted += count as u64;
                    s.last_success = Some(Utc::now());
                });
            }
            Err(e) => {
                error!("❌ Acquisition cycle failed: {}", e);
                update_stats(&stats, |s| {
                    s.cycles_failed += 1;
                    s.last_error = Some(e.to_string());
                });
            }
        }

        let elapsed = started.elapsed();
        if elapsed >= period {
            warn!("🐢 Cycle took {:?}, longer than the {:?} interval; dropping missed ticks", elapsed, period);
            ticker.reset();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modbus::decoder::ByteOrder;
    use crate::storage::sink::MemorySink;
    use crate::transport::fieldbus::testing::MockMeter;
    use crate::transport::{FieldbusTransport, RegisterSample};
    use async_trait::async_trait;
    use bytes::Bytes;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const PAYLOAD: &str = r#"[{"index":0,"name":"V_avg","value":"230.5","unit":"V"}]"#;

    #[derive(Default)]
    struct ScriptedTransport {
        delay: Duration,
        fail_even_calls: bool,
        calls: AtomicUsize,
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
    }

    impl ScriptedTransport {
        fn with_delay(delay: Duration) -> Self {
            Self {
                delay,
                ..Self::default()
            }
        }
    }

    #[async_trait]
    impl TransportClient for ScriptedTransport {
        async fn fetch_batch(&self) -> Result<Batch, AcquisitionError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            if self.fail_even_calls && call % 2 == 0 {
                return Err(AcquisitionError::ConnectionError("connection refused".to_string()));
            }
            Ok(Batch::Frame(Bytes::from(FrameCodec::encode(PAYLOAD).unwrap())))
        }

        fn transport_type(&self) -> &str {
            "scripted"
        }

        fn endpoint(&self) -> String {
            "test".to_string()
        }
    }

    fn scheduler(transport: Arc<ScriptedTransport>, sink: Arc<MemorySink>) -> AcquisitionScheduler {
        let cycle = AcquisitionCycle::new(transport, sink, "DPMC530E", Arc::from(Vec::new()), None);
        AcquisitionScheduler::new(cycle, Duration::from_secs(5))
    }

    fn table() -> Arc<[MeterParameterDefinition]> {
        Arc::from(vec![MeterParameterDefinition::new("V_avg", 0x0106, "V")])
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_cycle_after_one_interval() {
        let transport = Arc::new(ScriptedTransport::default());
        let sink = Arc::new(MemorySink::new());
        let mut scheduler = scheduler(transport.clone(), sink.clone());
        assert_eq!(scheduler.state(), SchedulerState::Idle);

        scheduler.start();
        assert_eq!(scheduler.state(), SchedulerState::Running);

        tokio::time::sleep(Duration::from_millis(4900)).await;
        assert_eq!(transport.calls.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(sink.len(), 1);

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(sink.len(), 2);

        scheduler.stop().await;
        let stats = read_stats(&scheduler.stats());
        assert_eq!(stats.cycles_completed, 2);
        assert_eq!(stats.readings_persisted, 2);
        assert!(stats.last_success.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_cycles_never_overlap() {
        let transport = Arc::new(ScriptedTransport::with_delay(Duration::from_secs(12)));
        let sink = Arc::new(MemorySink::new());
        let mut scheduler = scheduler(transport.clone(), sink.clone());

        scheduler.start();
        tokio::time::sleep(Duration::from_secs(60)).await;

        assert_eq!(transport.max_in_flight.load(Ordering::SeqCst), 1);
        // Cycles run 5-17s, 22-34s and 39-51s; the one started at 56s is
        // still in flight.
        let completed = read_stats(&scheduler.stats()).cycles_completed;
        assert_eq!(completed, 3);
        assert_eq!(sink.len(), 3);
        assert_eq!(transport.calls.load(Ordering::SeqCst), 4);

        scheduler.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_lets_in_flight_cycle_finish() {
        let transport = Arc::new(ScriptedTransport::with_delay(Duration::from_secs(3)));
        let sink = Arc::new(MemorySink::new());
        let mut scheduler = scheduler(transport.clone(), sink.clone());

        scheduler.start();
        // First cycle runs from 5s to 8s
        tokio::time::sleep(Duration::from_secs(6)).await;
        assert_eq!(transport.in_flight.load(Ordering::SeqCst), 1);
        assert!(sink.is_empty());

        scheduler.stop().await;
        assert_eq!(scheduler.state(), SchedulerState::Stopped);
        assert_eq!(sink.len(), 1);

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(transport.calls.load(Ordering::SeqCst), 1);
        assert_eq!(sink.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_twice_is_noop() {
        let transport = Arc::new(ScriptedTransport::default());
        let sink = Arc::new(MemorySink::new());
        let mut scheduler = scheduler(transport.clone(), sink.clone());

        scheduler.start();
        scheduler.start();
        tokio::time::sleep(Duration::from_millis(5500)).await;

        assert_eq!(transport.calls.load(Ordering::SeqCst), 1);
        scheduler.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_failures_do_not_stop_the_loop() {
        let transport = Arc::new(ScriptedTransport {
            fail_even_calls: true,
            ..ScriptedTransport::default()
        });
        let sink = Arc::new(MemorySink::new());
        let mut scheduler = scheduler(transport.clone(), sink.clone());

        scheduler.start();
        tokio::time::sleep(Duration::from_millis(20500)).await;
        scheduler.stop().await;

        let stats = read_stats(&scheduler.stats());
        assert_eq!(transport.calls.load(Ordering::SeqCst), 4);
        assert_eq!(stats.cycles_failed, 2);
        assert_eq!(stats.cycles_completed, 2);
        assert_eq!(sink.len(), 2);
        assert!(stats.last_error.unwrap().contains("connection refused"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_restart_after_stop() {
        let transport = Arc::new(ScriptedTransport::default());
        let sink = Arc::new(MemorySink::new());
        let mut scheduler = scheduler(transport.clone(), sink.clone());

        scheduler.start();
        scheduler.stop().await;
        assert_eq!(scheduler.state(), SchedulerState::Stopped);
        assert_eq!(transport.calls.load(Ordering::SeqCst), 0);

        scheduler.start();
        assert_eq!(scheduler.state(), SchedulerState::Running);
        tokio::time::sleep(Duration::from_millis(5100)).await;
        assert_eq!(sink.len(), 1);
        scheduler.stop().await;
    }

    async fn read_v_avg(order: ByteOrder) -> f64 {
        let meter = MockMeter::new(&[(0x0106, [0x3F80, 0x0000])]);
        let transport = Arc::new(FieldbusTransport::new(Arc::new(meter), table(), 60_000));
        let sink = Arc::new(MemorySink::new());
        let cycle = AcquisitionCycle::new(
            transport,
            sink.clone(),
            "DPMC530E",
            table(),
            Some(RegisterDecoder::new(order)),
        );

        assert_eq!(cycle.run().await.unwrap(), 1);
        let (device_id, json) = sink.batches().pop().unwrap();
        assert_eq!(device_id, "DPMC530E");
        let readings: Vec<MeterReading> = serde_json::from_str(&json).unwrap();
        assert_eq!(readings.len(), 1);
        assert_eq!(readings[0].name, "V_avg");
        assert_eq!(readings[0].unit, "V");
        assert_eq!(readings[0].index, 0);
        readings[0].value
    }

    #[tokio::test]
    async fn test_end_to_end_register_decoding() {
        assert_eq!(read_v_avg(ByteOrder::Straight).await, 1.0);
        // 3F 80 00 00 word-swapped is 00 00 3F 80
        assert_eq!(
            read_v_avg(ByteOrder::WordSwapped).await,
            f64::from(f32::from_bits(0x0000_3F80))
        );
    }

    #[tokio::test]
    async fn test_empty_register_batch_is_not_persisted() {
        let meter = MockMeter::new(&[]);
        let transport = Arc::new(FieldbusTransport::new(Arc::new(meter), table(), 60_000));
        let sink = Arc::new(MemorySink::new());
        let cycle = AcquisitionCycle::new(
            transport,
            sink.clone(),
            "DPMC530E",
            table(),
            Some(RegisterDecoder::new(ByteOrder::Straight)),
        );

        assert!(matches!(cycle.run().await, Err(AcquisitionError::NoReadings)));
        assert!(sink.is_empty());
    }

    #[test]
    fn test_decode_batch_rules() {
        let transport = Arc::new(ScriptedTransport::default());
        let sink = Arc::new(MemorySink::new());
        let params: Arc<[MeterParameterDefinition]> = Arc::from(vec![
            MeterParameterDefinition::new("V_avg", 0x0106, "V"),
            MeterParameterDefinition::new("I_avg", 0x0126, "A"),
        ]);

        let without_decoder = AcquisitionCycle::new(transport.clone(), sink.clone(), "m", params.clone(), None);
        let registers = Batch::Registers(vec![RegisterSample {
            index: 0,
            raw: Bytes::from_static(&[0x3F, 0x80, 0x00, 0x00]),
        }]);
        assert!(matches!(
            without_decoder.decode_batch(registers.clone()),
            Err(AcquisitionError::ConfigError(_))
        ));

        let cycle = AcquisitionCycle::new(
            transport,
            sink,
            "m",
            params,
            Some(RegisterDecoder::new(ByteOrder::Straight)),
        );
        let mixed = Batch::Registers(vec![
            RegisterSample {
                index: 0,
                raw: Bytes::from_static(&[0x3F, 0x80]),
            },
            RegisterSample {
                index: 1,
                raw: Bytes::from_static(&[0x40, 0x00, 0x00, 0x00]),
            },
            RegisterSample {
                index: 7,
                raw: Bytes::from_static(&[0x3F, 0x80, 0x00, 0x00]),
            },
        ]);
        let readings = cycle.decode_batch(mixed).unwrap();
        assert_eq!(readings, vec![MeterReading::new(1, "I_avg", 2.0, "A")]);

        let not_available = Batch::Registers(vec![
            RegisterSample {
                index: 0,
                raw: Bytes::from_static(&[0xFF, 0xFF, 0xFF, 0xFF]),
            },
            RegisterSample {
                index: 1,
                raw: Bytes::from_static(&[0x7F, 0x80, 0x00, 0x00]),
            },
        ]);
        assert!(cycle.decode_batch(not_available).unwrap().is_empty());

        let tampered = Batch::Frame(Bytes::from_static(b"000004[]B9"));
        assert!(matches!(
            cycle.decode_batch(tampered),
            Err(AcquisitionError::ChecksumMismatch { .. })
        ));

        let frame = Batch::Frame(Bytes::from(FrameCodec::encode(PAYLOAD).unwrap()));
        assert_eq!(
            cycle.decode_batch(frame).unwrap(),
            vec![MeterReading::new(0, "V_avg", 230.5, "V")]
        );
    }
}
