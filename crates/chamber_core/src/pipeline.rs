//! Loop de aquisição: linha → parser → {histórico, gravação, alertas}.
//!
//! Só uma falha atravessa a fronteira do loop: a serial parar de responder
//! ([`LoopError`]). Frames inválidos, falhas de gravação e de notificação são
//! contados em [`LoopStats`], logados e o monitoramento continua.

use crate::alerts::{AlertEngine, AlertEvent};
use crate::config::AppConfig;
use crate::history::SharedHistory;
use crate::protocol::{FrameSchema, parse_frame};
use crate::recorder::Recorder;
use crate::types::Metric;
use chrono::Local;
use std::io::{self, BufRead};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;
use tracing::{debug, error, info, warn};

// ──────────────────────────────────────────────
// Fonte de linhas
// ──────────────────────────────────────────────

/// Tamanho máximo padrão de uma linha antes de ser descartada.
pub const DEFAULT_MAX_LINE_BYTES: usize = 4096;

/// Resultado de uma tentativa de leitura.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceEvent {
    /// Linha completa, sem o terminador
    Line(Vec<u8>),
    /// Timeout sem linha completa – não é erro
    Idle,
    /// Linha passou do limite sem `\n`; bytes descartados até o próximo terminador
    Overflow { discarded: usize },
}

/// Origem das linhas de telemetria (porta serial, arquivo, teste).
///
/// `Err` com `UnexpectedEof` significa que a fonte acabou.
pub trait LineSource {
    fn next_line(&mut self) -> io::Result<SourceEvent>;
}

/// [`LineSource`] sobre qualquer `BufRead`.
///
/// Bytes lidos antes de um timeout ficam guardados e a linha é completada na
/// próxima chamada, então frames partidos entre leituras não se perdem. O
/// acúmulo é limitado a `max_line` bytes: passando disso a linha vira
/// [`SourceEvent::Overflow`] e o resto dela é pulado.
pub struct BufReadSource<R> {
    reader: R,
    pending: Vec<u8>,
    max_line: usize,
    discarding: bool,
}

impl<R: BufRead> BufReadSource<R> {
    pub fn new(reader: R) -> Self {
        Self::with_max_line(reader, DEFAULT_MAX_LINE_BYTES)
    }

    pub fn with_max_line(reader: R, max_line: usize) -> Self {
        Self {
            reader,
            pending: Vec::with_capacity(64),
            max_line: max_line.max(1),
            discarding: false,
        }
    }

    /// Bytes de uma linha incompleta guardados no momento.
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }
}

impl<R: BufRead> LineSource for BufReadSource<R> {
    fn next_line(&mut self) -> io::Result<SourceEvent> {
        loop {
            let chunk = match self.reader.fill_buf() {
                Ok(chunk) => chunk,
                Err(e) if is_timeout(&e) => return Ok(SourceEvent::Idle),
                Err(e) => return Err(e),
            };

            if chunk.is_empty() {
                self.discarding = false;
                if self.pending.is_empty() {
                    return Err(io::Error::new(
                        io::ErrorKind::UnexpectedEof,
                        "fonte de dados encerrada",
                    ));
                }
                return Ok(SourceEvent::Line(std::mem::take(&mut self.pending)));
            }

            let newline = chunk.iter().position(|&b| b == b'\n');
            let end = newline.unwrap_or(chunk.len());
            if !self.discarding {
                self.pending.extend_from_slice(&chunk[..end]);
            }
            self.reader.consume(newline.map_or(end, |i| i + 1));

            if self.discarding {
                match newline {
                    Some(_) => self.discarding = false,
                    // Devolve o controle ao loop (checagem de encerramento)
                    None => return Ok(SourceEvent::Idle),
                }
                continue;
            }

            if self.pending.len() > self.max_line {
                let discarded = self.pending.len();
                self.pending.clear();
                self.discarding = newline.is_none();
                return Ok(SourceEvent::Overflow { discarded });
            }

            if newline.is_some() {
                return Ok(SourceEvent::Line(std::mem::take(&mut self.pending)));
            }
        }
    }
}

fn is_timeout(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted
    )
}

// ──────────────────────────────────────────────
// Notificação
// ──────────────────────────────────────────────

/// Falha ao entregar um alerta. Nunca é fatal.
#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("Fila de notificação cheia, alerta descartado")]
    Saturated,

    #[error("Canal de notificação encerrado")]
    Closed,

    #[error("Falha na entrega: {0}")]
    Delivery(String),
}

/// Colaborador que entrega alertas. Deve retornar rápido: o loop chama de
/// forma síncrona e não faz retry.
pub trait Notifier {
    fn notify(&self, event: &AlertEvent) -> Result<(), NotifyError>;
}

impl<N: Notifier + ?Sized> Notifier for Arc<N> {
    fn notify(&self, event: &AlertEvent) -> Result<(), NotifyError> {
        (**self).notify(event)
    }
}

// ──────────────────────────────────────────────
// Estatísticas
// ──────────────────────────────────────────────

/// Contadores do loop, compartilhados com o display.
#[derive(Debug, Default)]
pub struct LoopStats {
    frames_parsed: AtomicU64,
    malformed_frames: AtomicU64,
    idle_ticks: AtomicU64,
    write_failures: AtomicU64,
    alerts_raised: AtomicU64,
    notify_failures: AtomicU64,
}

/// Cópia dos contadores num instante.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub frames_parsed: u64,
    pub malformed_frames: u64,
    pub idle_ticks: u64,
    pub write_failures: u64,
    pub alerts_raised: u64,
    pub notify_failures: u64,
}

impl LoopStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Falha reportada pelo worker de notificação.
    pub fn record_notify_failure(&self) {
        self.notify_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            frames_parsed: self.frames_parsed.load(Ordering::Relaxed),
            malformed_frames: self.malformed_frames.load(Ordering::Relaxed),
            idle_ticks: self.idle_ticks.load(Ordering::Relaxed),
            write_failures: self.write_failures.load(Ordering::Relaxed),
            alerts_raised: self.alerts_raised.load(Ordering::Relaxed),
            notify_failures: self.notify_failures.load(Ordering::Relaxed),
        }
    }

    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

// ──────────────────────────────────────────────
// Loop
// ──────────────────────────────────────────────

/// Falha terminal do loop.
#[derive(Debug, thiserror::Error)]
pub enum LoopError {
    #[error("Leitura serial falhou {attempts} vezes seguidas: {source}")]
    SerialReadFatal {
        attempts: u32,
        #[source]
        source: io::Error,
    },

    #[error("Fonte serial encerrada (dispositivo desconectado?)")]
    SourceClosed,
}

/// Resumo devolvido num encerramento limpo.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoopSummary {
    pub stats: StatsSnapshot,
    /// Próxima sequência que seria atribuída
    pub next_sequence: u64,
}

/// Política de leitura da fonte.
#[derive(Debug, Clone, Copy)]
pub struct ReadPolicy {
    pub error_limit: u32,
    pub retry_delay: Duration,
}

impl Default for ReadPolicy {
    fn default() -> Self {
        Self {
            error_limit: 5,
            retry_delay: Duration::from_millis(500),
        }
    }
}

/// Estado do loop de aquisição. Dono exclusivo da fonte e do gravador.
pub struct AcquisitionLoop<S, N> {
    source: S,
    notifier: N,
    schema: FrameSchema,
    history: SharedHistory,
    recorder: Recorder,
    alerts: AlertEngine,
    stats: Arc<LoopStats>,
    policy: ReadPolicy,
    /// Métricas com regra de alerta, fixadas na construção
    monitored: Vec<Metric>,
    next_sequence: u64,
}

impl<S: LineSource, N: Notifier> AcquisitionLoop<S, N> {
    pub fn new(source: S, notifier: N, config: &AppConfig) -> Self {
        Self::with_stats(source, notifier, config, Arc::new(LoopStats::new()))
    }

    /// Como [`new`](Self::new), mas reaproveita contadores já compartilhados
    /// (ex: com a thread de notificação).
    pub fn with_stats(source: S, notifier: N, config: &AppConfig, stats: Arc<LoopStats>) -> Self {
        let alerts = AlertEngine::new(&config.alerts.rules);
        let monitored = alerts.monitored().collect();
        Self {
            source,
            notifier,
            schema: config.frame.schema.clone(),
            history: SharedHistory::new(config.history.window),
            recorder: Recorder::new(&config.storage),
            alerts,
            stats,
            policy: ReadPolicy {
                error_limit: config.serial.read_error_limit.max(1),
                retry_delay: config.serial.retry_delay(),
            },
            monitored,
            next_sequence: 0,
        }
    }

    /// Handle de leitura para a visualização.
    pub fn history(&self) -> SharedHistory {
        self.history.clone()
    }

    pub fn stats(&self) -> Arc<LoopStats> {
        Arc::clone(&self.stats)
    }

    /// Roda até `shutdown` ser sinalizado (retorna `Ok`) ou a fonte falhar de
    /// vez (retorna `Err`). Em ambos os casos o log diário é fechado antes.
    pub fn run(&mut self, shutdown: &AtomicBool) -> Result<LoopSummary, LoopError> {
        info!("Loop de aquisição iniciado");
        let mut consecutive_errors = 0u32;

        let outcome = loop {
            if shutdown.load(Ordering::SeqCst) {
                info!("Encerramento solicitado");
                break Ok(());
            }

            match self.source.next_line() {
                Ok(SourceEvent::Line(raw)) => {
                    consecutive_errors = 0;
                    self.ingest(&raw);
                }
                Ok(SourceEvent::Idle) => {
                    consecutive_errors = 0;
                    LoopStats::bump(&self.stats.idle_ticks);
                    debug!("Sem dados neste tick");
                }
                Ok(SourceEvent::Overflow { discarded }) => {
                    consecutive_errors = 0;
                    LoopStats::bump(&self.stats.malformed_frames);
                    warn!("Linha sem terminador descartada ({discarded} bytes)");
                }
                Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => {
                    break Err(LoopError::SourceClosed);
                }
                Err(e) => {
                    consecutive_errors += 1;
                    if consecutive_errors >= self.policy.error_limit {
                        break Err(LoopError::SerialReadFatal {
                            attempts: consecutive_errors,
                            source: e,
                        });
                    }
                    warn!(
                        "Erro de leitura serial ({consecutive_errors}/{}): {e}",
                        self.policy.error_limit
                    );
                    std::thread::sleep(self.policy.retry_delay);
                }
            }
        };

        if let Err(e) = self.recorder.close() {
            LoopStats::bump(&self.stats.write_failures);
            error!("Falha ao fechar log diário: {e}");
        }

        match outcome {
            Ok(()) => {
                let summary = LoopSummary {
                    stats: self.stats.snapshot(),
                    next_sequence: self.next_sequence,
                };
                info!(
                    "Loop encerrado: {} leituras, {} frames inválidos",
                    summary.stats.frames_parsed, summary.stats.malformed_frames
                );
                Ok(summary)
            }
            Err(e) => {
                error!("{e}");
                Err(e)
            }
        }
    }

    /// Processa uma linha crua. Nunca falha: erros viram contadores.
    pub fn ingest(&mut self, raw: &[u8]) {
        let measurement = match parse_frame(raw, &self.schema) {
            Ok(m) => m,
            Err(e) => {
                LoopStats::bump(&self.stats.malformed_frames);
                warn!("{e}");
                return;
            }
        };

        let reading = measurement.into_reading(self.next_sequence, Local::now());
        self.next_sequence += 1;
        LoopStats::bump(&self.stats.frames_parsed);

        match reading.material_temperature_f() {
            Some(material) => info!(
                "#{} Temperatura: {} F | Material: {} F | Umidade rel.: {}%",
                reading.sequence(),
                reading.air_temperature_f(),
                material,
                reading.relative_humidity_pct()
            ),
            None => info!(
                "#{} Temperatura: {} F | Umidade rel.: {}%",
                reading.sequence(),
                reading.air_temperature_f(),
                reading.relative_humidity_pct()
            ),
        }

        self.history.append_reading(&reading);

        if let Err(e) = self.recorder.record(&reading) {
            LoopStats::bump(&self.stats.write_failures);
            warn!("Leitura #{} não gravada: {e}", reading.sequence());
        }

        for &metric in &self.monitored {
            let Some(value) = reading.value(metric) else {
                continue;
            };
            if let Some(event) = self.alerts.evaluate(metric, value, reading.sequence()) {
                LoopStats::bump(&self.stats.alerts_raised);
                if let Err(e) = self.notifier.notify(&event) {
                    self.stats.record_notify_failure();
                    warn!("Alerta #{} não notificado: {e}", event.sequence);
                }
            }
        }
    }
}

// ──────────────────────────────────────────────
// Testes
// ──────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alerts::{AlertRule, Side};
    use crate::config::StorageConfig;
    use crate::types::Metric;
    use std::collections::VecDeque;
    use std::io::Cursor;
    use std::path::Path;
    use std::sync::Mutex;

    /// Fonte roteirizada: entrega os itens e sinaliza encerramento ao esvaziar.
    struct ScriptedSource {
        items: VecDeque<io::Result<SourceEvent>>,
        shutdown: Arc<AtomicBool>,
    }

    impl ScriptedSource {
        fn lines(lines: &[&str], shutdown: Arc<AtomicBool>) -> Self {
            Self {
                items: lines
                    .iter()
                    .map(|l| Ok(SourceEvent::Line(l.as_bytes().to_vec())))
                    .collect(),
                shutdown,
            }
        }
    }

    impl LineSource for ScriptedSource {
        fn next_line(&mut self) -> io::Result<SourceEvent> {
            match self.items.pop_front() {
                Some(item) => item,
                None => {
                    self.shutdown.store(true, Ordering::SeqCst);
                    Ok(SourceEvent::Idle)
                }
            }
        }
    }

    #[derive(Default)]
    struct RecordingNotifier {
        events: Mutex<Vec<AlertEvent>>,
        fail: bool,
    }

    impl Notifier for RecordingNotifier {
        fn notify(&self, event: &AlertEvent) -> Result<(), NotifyError> {
            self.events.lock().unwrap().push(*event);
            if self.fail {
                Err(NotifyError::Delivery("smtp fora do ar".into()))
            } else {
                Ok(())
            }
        }
    }

    fn config(dir: &Path) -> AppConfig {
        let mut config = AppConfig::default();
        config.storage = StorageConfig {
            directory: dir.to_path_buf(),
            ..StorageConfig::default()
        };
        config.serial.retry_delay_ms = 0;
        config
    }

    fn recorded_rows(dir: &Path) -> usize {
        std::fs::read_dir(dir)
            .unwrap()
            .map(|entry| {
                let content = std::fs::read_to_string(entry.unwrap().path()).unwrap();
                content.lines().count().saturating_sub(1)
            })
            .sum()
    }

    #[test]
    fn end_to_end_pipeline() {
        let dir = tempfile::tempdir().unwrap();
        let shutdown = Arc::new(AtomicBool::new(false));
        let source = ScriptedSource::lines(&["70,0,40", "garbage", "405,0,41"], shutdown.clone());
        let notifier = Arc::new(RecordingNotifier::default());

        let mut acq = AcquisitionLoop::new(source, notifier.clone(), &config(dir.path()));
        let history = acq.history();
        let summary = acq.run(&shutdown).unwrap();

        assert_eq!(summary.stats.frames_parsed, 2);
        assert_eq!(summary.stats.malformed_frames, 1);
        assert_eq!(summary.stats.alerts_raised, 1);
        assert_eq!(summary.next_sequence, 2);
        assert_eq!(recorded_rows(dir.path()), 2);

        let events = notifier.events.lock().unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].side, Side::High);
        assert_eq!(events[0].sequence, 1);

        assert_eq!(history.window(Metric::AirTemperature), vec![(0, 70.0), (1, 405.0)]);
        assert_eq!(history.window(Metric::Humidity).len(), 2);
    }

    #[test]
    fn every_ruled_metric_is_checked_on_each_frame() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = config(dir.path());
        config.alerts.rules.push(AlertRule {
            metric: Metric::Humidity,
            high: 90.0,
            low: 5.0,
        });
        let shutdown = Arc::new(AtomicBool::new(false));
        let source = ScriptedSource::lines(
            &["405,0,40", "70,0,40", "70,0,-5", "405,0,95"],
            shutdown.clone(),
        );
        let notifier = Arc::new(RecordingNotifier::default());
        let mut acq = AcquisitionLoop::new(source, notifier.clone(), &config);
        acq.run(&shutdown).unwrap();

        let events: Vec<(Metric, Side, u64)> = notifier
            .events
            .lock()
            .unwrap()
            .iter()
            .map(|e| (e.metric, e.side, e.sequence))
            .collect();
        assert_eq!(
            events,
            vec![
                (Metric::AirTemperature, Side::High, 0),
                (Metric::Humidity, Side::Low, 2),
                (Metric::AirTemperature, Side::High, 3),
                (Metric::Humidity, Side::High, 3),
            ]
        );
    }

    #[test]
    fn sequence_only_advances_on_parsed_frames() {
        let dir = tempfile::tempdir().unwrap();
        let shutdown = Arc::new(AtomicBool::new(false));
        let source = ScriptedSource::lines(&["x", "1,0,2", "", "3,0,4"], shutdown.clone());
        let mut acq = AcquisitionLoop::new(source, RecordingNotifier::default(), &config(dir.path()));
        let history = acq.history();
        acq.run(&shutdown).unwrap();

        let seqs: Vec<u64> = history
            .window(Metric::AirTemperature)
            .into_iter()
            .map(|p| p.0)
            .collect();
        assert_eq!(seqs, vec![0, 1]);
    }

    #[test]
    fn notification_failure_is_not_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let shutdown = Arc::new(AtomicBool::new(false));
        let source = ScriptedSource::lines(&["401,0,40", "-200,0,40", "70,0,40"], shutdown.clone());
        let notifier = RecordingNotifier {
            fail: true,
            ..Default::default()
        };
        let mut acq = AcquisitionLoop::new(source, notifier, &config(dir.path()));
        let summary = acq.run(&shutdown).unwrap();

        assert_eq!(summary.stats.frames_parsed, 3);
        assert_eq!(summary.stats.alerts_raised, 2);
        assert_eq!(summary.stats.notify_failures, 2);
        assert_eq!(recorded_rows(dir.path()), 3);
    }

    #[test]
    fn storage_failure_keeps_alerting() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("bloqueio");
        std::fs::write(&blocker, b"x").unwrap();

        let shutdown = Arc::new(AtomicBool::new(false));
        let source = ScriptedSource::lines(&["70,0,40", "410,0,40"], shutdown.clone());
        let notifier = Arc::new(RecordingNotifier::default());
        let mut acq = AcquisitionLoop::new(source, notifier.clone(), &config(&blocker.join("sub")));
        let history = acq.history();
        let summary = acq.run(&shutdown).unwrap();

        assert_eq!(summary.stats.write_failures, 2);
        assert_eq!(summary.stats.alerts_raised, 1);
        assert_eq!(notifier.events.lock().unwrap().len(), 1);
        assert_eq!(history.window(Metric::AirTemperature).len(), 2);
    }

    #[test]
    fn persistent_read_errors_are_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let shutdown = Arc::new(AtomicBool::new(false));
        let mut items: VecDeque<io::Result<SourceEvent>> = VecDeque::new();
        items.push_back(Ok(SourceEvent::Line(b"70,0,40".to_vec())));
        for _ in 0..10 {
            items.push_back(Err(io::Error::new(io::ErrorKind::BrokenPipe, "desconectado")));
        }
        let source = ScriptedSource {
            items,
            shutdown: shutdown.clone(),
        };
        let mut acq = AcquisitionLoop::new(source, RecordingNotifier::default(), &config(dir.path()));
        let stats = acq.stats();

        let err = acq.run(&shutdown).unwrap_err();
        assert!(matches!(err, LoopError::SerialReadFatal { attempts: 5, .. }));
        assert_eq!(stats.snapshot().frames_parsed, 1);
        // Log fechado e descarregado antes de retornar
        assert_eq!(recorded_rows(dir.path()), 1);
    }

    #[test]
    fn transient_read_error_recovers() {
        let dir = tempfile::tempdir().unwrap();
        let shutdown = Arc::new(AtomicBool::new(false));
        let items: VecDeque<io::Result<SourceEvent>> = VecDeque::from(vec![
            Err(io::Error::other("ruído")),
            Ok(SourceEvent::Idle),
            Ok(SourceEvent::Line(b"70,0,40".to_vec())),
        ]);
        let source = ScriptedSource {
            items,
            shutdown: shutdown.clone(),
        };
        let mut acq = AcquisitionLoop::new(source, RecordingNotifier::default(), &config(dir.path()));
        let summary = acq.run(&shutdown).unwrap();
        assert_eq!(summary.stats.frames_parsed, 1);
        assert!(summary.stats.idle_ticks >= 1);
    }

    #[test]
    fn closed_source_ends_loop() {
        let dir = tempfile::tempdir().unwrap();
        let shutdown = AtomicBool::new(false);
        let source = BufReadSource::new(Cursor::new(b"70,0,40\n71,0,41\n".to_vec()));
        let mut acq = AcquisitionLoop::new(source, RecordingNotifier::default(), &config(dir.path()));
        let stats = acq.stats();

        assert!(matches!(acq.run(&shutdown), Err(LoopError::SourceClosed)));
        assert_eq!(stats.snapshot().frames_parsed, 2);
        assert_eq!(recorded_rows(dir.path()), 2);
    }

    #[test]
    fn shutdown_before_start_reads_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let shutdown = Arc::new(AtomicBool::new(true));
        let source = ScriptedSource::lines(&["70,0,40"], shutdown.clone());
        let mut acq = AcquisitionLoop::new(source, RecordingNotifier::default(), &config(dir.path()));
        let summary = acq.run(&shutdown).unwrap();
        assert_eq!(summary.stats.frames_parsed, 0);
    }

    /// Reader que devolve um pedaço e depois um timeout, como a serial.
    struct ChunkedReader {
        chunks: VecDeque<io::Result<Vec<u8>>>,
    }

    impl io::Read for ChunkedReader {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            match self.chunks.pop_front() {
                Some(Ok(bytes)) => {
                    let n = bytes.len().min(buf.len());
                    buf[..n].copy_from_slice(&bytes[..n]);
                    Ok(n)
                }
                Some(Err(e)) => Err(e),
                None => Ok(0),
            }
        }
    }

    #[test]
    fn partial_frame_survives_timeout() {
        let reader = ChunkedReader {
            chunks: VecDeque::from(vec![
                Ok(b"72.".to_vec()),
                Err(io::Error::new(io::ErrorKind::TimedOut, "timeout")),
                Ok(b"5,0,45.0\n".to_vec()),
            ]),
        };
        let mut source = BufReadSource::new(io::BufReader::new(reader));

        assert_eq!(source.next_line().unwrap(), SourceEvent::Idle);
        assert_eq!(
            source.next_line().unwrap(),
            SourceEvent::Line(b"72.5,0,45.0".to_vec())
        );
        assert_eq!(
            source.next_line().unwrap_err().kind(),
            io::ErrorKind::UnexpectedEof
        );
    }

    #[test]
    fn endless_line_stays_bounded() {
        let mut chunks = VecDeque::new();
        for _ in 0..200 {
            chunks.push_back(Ok(vec![b'7'; 8192]));
            chunks.push_back(Err(io::Error::new(io::ErrorKind::TimedOut, "timeout")));
        }
        let reader = ChunkedReader { chunks };
        let mut source = BufReadSource::with_max_line(io::BufReader::new(reader), 1024);

        let mut overflows = 0;
        for _ in 0..400 {
            if let SourceEvent::Overflow { discarded } = source.next_line().unwrap() {
                assert!(discarded > 1024);
                overflows += 1;
            }
            assert!(source.pending_len() <= 1024);
        }
        // Uma linha sem fim conta uma única vez
        assert_eq!(overflows, 1);
    }

    #[test]
    fn stream_recovers_after_oversized_line() {
        let mut data = vec![b'x'; 100];
        data.extend_from_slice(b"\n70,0,40\n");
        let mut source = BufReadSource::with_max_line(Cursor::new(data), 16);

        assert!(matches!(source.next_line().unwrap(), SourceEvent::Overflow { .. }));
        let mut next = source.next_line().unwrap();
        while next == SourceEvent::Idle {
            next = source.next_line().unwrap();
        }
        assert_eq!(next, SourceEvent::Line(b"70,0,40".to_vec()));
    }

    #[test]
    fn overflow_counts_as_malformed() {
        let dir = tempfile::tempdir().unwrap();
        let shutdown = Arc::new(AtomicBool::new(false));
        let items: VecDeque<io::Result<SourceEvent>> = VecDeque::from(vec![
            Ok(SourceEvent::Overflow { discarded: 5000 }),
            Ok(SourceEvent::Line(b"70,0,40".to_vec())),
        ]);
        let source = ScriptedSource {
            items,
            shutdown: shutdown.clone(),
        };
        let mut acq = AcquisitionLoop::new(source, RecordingNotifier::default(), &config(dir.path()));
        let summary = acq.run(&shutdown).unwrap();
        assert_eq!(summary.stats.malformed_frames, 1);
        assert_eq!(summary.stats.frames_parsed, 1);
        assert_eq!(summary.next_sequence, 1);
    }

    #[test]
    fn unterminated_last_line_is_delivered() {
        let mut source = BufReadSource::new(Cursor::new(b"70,0,40".to_vec()));
        assert_eq!(
            source.next_line().unwrap(),
            SourceEvent::Line(b"70,0,40".to_vec())
        );
        assert!(source.next_line().is_err());
    }
}
