//! Thread de notificação: recebe alertas do loop via channel e entrega.
//!
//! O loop só faz `try_send`; se a fila estiver cheia o alerta é descartado e
//! contado. Falhas de entrega são logadas sem retry.

use crate::email::Mailer;
use chamber_core::alerts::{AlertEvent, AlertMessage};
use chamber_core::pipeline::{LoopStats, Notifier, NotifyError};
use crossbeam_channel::{Receiver, Sender, TrySendError, bounded};
use std::sync::Arc;
use std::thread::JoinHandle;
use tracing::{error, info, warn};

/// Destino final das mensagens de alerta.
pub trait AlertSink: Send {
    fn deliver(&self, message: &AlertMessage) -> Result<(), NotifyError>;
}

impl AlertSink for Mailer {
    fn deliver(&self, message: &AlertMessage) -> Result<(), NotifyError> {
        self.send(message)
            .map_err(|e| NotifyError::Delivery(e.to_string()))
    }
}

/// Usado quando e-mail está desativado: o alerta fica só no log.
pub struct LogSink;

impl AlertSink for LogSink {
    fn deliver(&self, message: &AlertMessage) -> Result<(), NotifyError> {
        warn!("{}: {}", message.subject, message.body);
        Ok(())
    }
}

/// Lado do loop: enfileira sem bloquear.
#[derive(Clone)]
pub struct NotifierHandle {
    tx: Sender<AlertEvent>,
}

impl Notifier for NotifierHandle {
    fn notify(&self, event: &AlertEvent) -> Result<(), NotifyError> {
        self.tx.try_send(*event).map_err(|e| match e {
            TrySendError::Full(_) => NotifyError::Saturated,
            TrySendError::Disconnected(_) => NotifyError::Closed,
        })
    }
}

/// Inicia a thread de notificação. A thread termina quando todos os
/// [`NotifierHandle`] são descartados.
pub fn spawn_notifier_thread(
    sink: Box<dyn AlertSink>,
    location: String,
    capacity: usize,
    stats: Arc<LoopStats>,
) -> std::io::Result<(NotifierHandle, JoinHandle<()>)> {
    let (tx, rx) = bounded::<AlertEvent>(capacity.max(1));

    let handle = std::thread::Builder::new()
        .name("alert-notifier".into())
        .spawn(move || {
            notifier_loop(&rx, sink.as_ref(), &location, &stats);
        })?;

    Ok((NotifierHandle { tx }, handle))
}

fn notifier_loop(rx: &Receiver<AlertEvent>, sink: &dyn AlertSink, location: &str, stats: &LoopStats) {
    info!("Thread de notificação ativa");
    for event in rx.iter() {
        let message = event.message(location);
        if let Err(e) = sink.deliver(&message) {
            stats.record_notify_failure();
            error!("Alerta #{} não entregue: {e}", event.sequence);
        }
    }
    info!("Thread de notificação encerrada");
}
