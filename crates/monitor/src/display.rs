//! Atualização periódica do display.
//!
//! Roda numa thread própria, independente do ritmo da serial: a cada tick pega
//! um snapshot completo do histórico e redesenha o readout do zero.

use chamber_core::history::{HistorySnapshot, SharedHistory};
use chamber_core::pipeline::{LoopStats, StatsSnapshot};
use chamber_core::types::Metric;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tracing::info;

/// Passo máximo de espera, para reagir rápido ao encerramento.
const SHUTDOWN_POLL: Duration = Duration::from_millis(100);

/// Inicia a thread de display.
pub fn spawn_display_thread(
    history: SharedHistory,
    stats: Arc<LoopStats>,
    interval: Duration,
    shutdown: Arc<AtomicBool>,
) -> std::io::Result<JoinHandle<()>> {
    std::thread::Builder::new()
        .name("display-refresh".into())
        .spawn(move || {
            let mut next_tick = Instant::now() + interval;
            while !shutdown.load(Ordering::SeqCst) {
                let now = Instant::now();
                if now < next_tick {
                    std::thread::sleep((next_tick - now).min(SHUTDOWN_POLL));
                    continue;
                }
                next_tick += interval;
                info!("{}", render_status(&history.snapshot(), &stats.snapshot()));
            }
        })
}

/// Monta o readout de uma linha a partir dos snapshots.
pub fn render_status(history: &HistorySnapshot, stats: &StatsSnapshot) -> String {
    let mut parts = Vec::new();

    match history.x_domain() {
        Some((first, last)) => parts.push(format!("amostras #{first}–#{last}")),
        None => parts.push("aguardando dados".to_string()),
    }

    for metric in Metric::ALL {
        let window = history.window(metric);
        let Some(&(_, last)) = window.last() else {
            continue;
        };
        let (min, max) = window
            .iter()
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &(_, v)| {
                (lo.min(v), hi.max(v))
            });
        let unit = metric.unit();
        parts.push(format!(
            "{} {last:.1}{unit} [{min:.1}–{max:.1}]",
            metric.label()
        ));
    }

    parts.push(format!("inválidos {}", stats.malformed_frames));
    parts.push(format!("falhas de gravação {}", stats.write_failures));
    if stats.notify_failures > 0 {
        parts.push(format!("falhas de notificação {}", stats.notify_failures));
    }

    parts.join(" | ")
}
