//! # Chamber Monitor
//!
//! Lê a telemetria da câmara climática pela serial, grava um CSV por dia,
//! envia e-mail na entrada de uma excursão de temperatura e mostra a janela ao
//! vivo no console.
//!
//! ## Uso
//! ```bash
//! chamber_monitor                          # config.toml ao lado do executável
//! chamber_monitor --config /etc/camara.toml
//! ```
//!
//! A senha SMTP vem da variável indicada em `notify.password_env`
//! (padrão `CHAMBER_SMTP_PASSWORD`).

mod display;
mod email;
mod notify_thread;
mod serial_source;

use chamber_core::config::AppConfig;
use chamber_core::pipeline::{AcquisitionLoop, LoopStats};
use notify_thread::{AlertSink, LogSink};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;
use tracing::{error, info, warn};

fn main() -> ExitCode {
    // ── Logging ──
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    // ── Carregar config ──
    let config_path = config_path_from_args().unwrap_or_else(AppConfig::default_path);
    let config = AppConfig::load(&config_path);

    // Salva config padrão se não existir
    if !config_path.exists() {
        if let Err(e) = config.save(&config_path) {
            warn!("Não foi possível salvar config padrão: {e}");
        }
    }

    let errors = config.validate();
    if !errors.is_empty() {
        for e in &errors {
            error!("Config inválida: {e}");
        }
        return ExitCode::FAILURE;
    }

    // ── Serial (dono exclusivo: o loop) ──
    let source = match serial_source::open(&config.serial) {
        Ok(source) => source,
        Err(e) => {
            error!("Falha ao abrir {}: {e}", config.serial.device);
            return ExitCode::FAILURE;
        }
    };

    // ── Encerramento ──
    let shutdown = Arc::new(AtomicBool::new(false));
    {
        let shutdown = Arc::clone(&shutdown);
        if let Err(e) = ctrlc::set_handler(move || shutdown.store(true, Ordering::SeqCst)) {
            warn!("Handler de Ctrl-C indisponível: {e}");
        }
    }

    // ── Notificação ──
    let stats = Arc::new(LoopStats::new());
    let sink: Box<dyn AlertSink> = if config.notify.enabled {
        match email::Mailer::from_config(&config.notify) {
            Ok(mailer) => {
                info!("Alertas por e-mail → {}", config.notify.recipient);
                Box::new(mailer)
            }
            Err(e) => {
                error!("E-mail desativado: {e}");
                Box::new(LogSink)
            }
        }
    } else {
        info!("Notificação por e-mail desativada, alertas só no log");
        Box::new(LogSink)
    };

    let (notifier, notifier_thread) = match notify_thread::spawn_notifier_thread(
        sink,
        config.notify.location.clone(),
        config.notify.queue_capacity,
        Arc::clone(&stats),
    ) {
        Ok(pair) => pair,
        Err(e) => {
            error!("Falha ao criar thread de notificação: {e}");
            return ExitCode::FAILURE;
        }
    };

    // ── Loop + display ──
    let mut acquisition = AcquisitionLoop::with_stats(source, notifier, &config, stats);

    let display = display::spawn_display_thread(
        acquisition.history(),
        acquisition.stats(),
        config.history.refresh_interval(),
        Arc::clone(&shutdown),
    );
    if let Err(e) = &display {
        warn!("Display indisponível: {e}");
    }

    // ── Banner ──
    println!();
    println!("══════════════════════════════════════════════");
    println!("   🌡 MONITOR DA CÂMARA – ATIVO");
    println!("══════════════════════════════════════════════");
    println!("  Serial:  {} @ {}", config.serial.device, config.serial.baud_rate);
    println!("  Schema:  {:?}", config.frame.schema.fields());
    println!("  Logs:    {}", config.storage.directory.display());
    println!("  Janela:  {} amostras", config.history.window);
    println!("══════════════════════════════════════════════");
    println!();

    let result = acquisition.run(&shutdown);

    // Libera o NotifierHandle para a thread drenar a fila e sair
    shutdown.store(true, Ordering::SeqCst);
    drop(acquisition);
    join_worker(notifier_thread, "notificação");
    if let Ok(handle) = display {
        join_worker(handle, "display");
    }

    match result {
        Ok(summary) => {
            info!(
                "Encerrado: {} leituras, {} inválidos, {} alertas",
                summary.stats.frames_parsed,
                summary.stats.malformed_frames,
                summary.stats.alerts_raised
            );
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("Monitoramento interrompido: {e}. Verifique a conexão da câmara.");
            ExitCode::FAILURE
        }
    }
}

/// `--config <caminho>` ou `--config=<caminho>`.
fn config_path_from_args() -> Option<PathBuf> {
    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        if arg == "--config" {
            return args.next().map(PathBuf::from);
        }
        if let Some(path) = arg.strip_prefix("--config=") {
            return Some(PathBuf::from(path));
        }
    }
    None
}

/// Espera a thread terminar; pânico vira aviso no log em vez de sumir.
fn join_worker(handle: JoinHandle<()>, name: &str) -> bool {
    if handle.join().is_err() {
        warn!("Thread de {name} terminou com pânico");
        return false;
    }
    true
}

// ──────────────────────────────────────────────
// Testes
// ──────────────────────────────────────────────
