//! Motor de alertas – máquina de estados por métrica com disparo por borda.
//!
//! Um alerta só é emitido na entrada em excursão (ou na troca de lado). Enquanto
//! a métrica continuar fora da faixa do mesmo lado, nada é reenviado; a volta ao
//! normal é silenciosa (apenas logada).

use crate::types::Metric;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use tracing::{info, warn};

/// Lado da excursão.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Side {
    High,
    Low,
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Side::High => "alta",
            Side::Low => "baixa",
        })
    }
}

/// Estado de uma métrica monitorada.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlertState {
    Normal,
    Excursion { side: Side, since: u64 },
}

/// Limites de uma métrica.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AlertRule {
    pub metric: Metric,
    pub high: f64,
    pub low: f64,
}

impl AlertRule {
    fn classify(&self, value: f64) -> Option<Side> {
        if value > self.high {
            Some(Side::High)
        } else if value < self.low {
            Some(Side::Low)
        } else {
            None
        }
    }

    fn threshold(&self, side: Side) -> f64 {
        match side {
            Side::High => self.high,
            Side::Low => self.low,
        }
    }
}

/// Evento emitido na entrada de uma excursão.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AlertEvent {
    pub metric: Metric,
    pub side: Side,
    pub sequence: u64,
    pub value: f64,
    /// Limite cruzado
    pub threshold: f64,
}

/// Mensagem pronta para o canal de notificação.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlertMessage {
    pub subject: String,
    pub body: String,
}

/// Assunto fixo de todos os alertas.
pub const ALERT_SUBJECT: &str = "ALERTA DA CÂMARA";

impl AlertEvent {
    /// Monta a mensagem para o operador. `location` identifica onde fica a câmara.
    pub fn message(&self, location: &str) -> AlertMessage {
        let what = match self.side {
            Side::High => "ultrapassou o limite máximo",
            Side::Low => "ficou abaixo do limite mínimo",
        };
        let unit = self.metric.unit();
        let place = if location.is_empty() {
            String::new()
        } else {
            format!(" Ela está localizada em {location}.")
        };
        let body = format!(
            "{metric} da câmara {what} de {threshold}{unit} (leitura {value}{unit}, amostra #{seq}).\n\
             Verifique se a câmara foi desligada.{place} Para desligar, remova o cabo USB \
             ou abaixe a alavanca da fonte de alimentação.",
            metric = self.metric.label(),
            threshold = self.threshold,
            value = self.value,
            seq = self.sequence,
        );
        AlertMessage {
            subject: ALERT_SUBJECT.into(),
            body,
        }
    }
}

/// Motor de alertas. Estado nasce `Normal` para cada regra.
#[derive(Debug, Clone)]
pub struct AlertEngine {
    rules: BTreeMap<Metric, AlertRule>,
    states: BTreeMap<Metric, AlertState>,
}

impl AlertEngine {
    pub fn new(rules: &[AlertRule]) -> Self {
        let rules: BTreeMap<Metric, AlertRule> = rules.iter().map(|r| (r.metric, *r)).collect();
        let states = rules.keys().map(|m| (*m, AlertState::Normal)).collect();
        Self { rules, states }
    }

    /// Métricas com regra configurada.
    pub fn monitored(&self) -> impl Iterator<Item = Metric> + '_ {
        self.rules.keys().copied()
    }

    /// Estado atual; `None` para métricas sem regra.
    pub fn state(&self, metric: Metric) -> Option<AlertState> {
        self.states.get(&metric).copied()
    }

    /// Avalia um valor e retorna o evento se houve entrada em excursão.
    pub fn evaluate(&mut self, metric: Metric, value: f64, sequence: u64) -> Option<AlertEvent> {
        let rule = self.rules.get(&metric)?;
        let state = self.states.entry(metric).or_insert(AlertState::Normal);

        match (*state, rule.classify(value)) {
            (AlertState::Normal, None) => None,
            (AlertState::Excursion { side: current, .. }, Some(side)) if current == side => None,
            (AlertState::Excursion { side, since }, None) => {
                info!(
                    "{metric} normalizada em {value}{} (excursão {side} desde #{since})",
                    metric.unit()
                );
                *state = AlertState::Normal;
                None
            }
            (_, Some(side)) => {
                *state = AlertState::Excursion {
                    side,
                    since: sequence,
                };
                let event = AlertEvent {
                    metric,
                    side,
                    sequence,
                    value,
                    threshold: rule.threshold(side),
                };
                warn!(
                    "⚠ {metric} em excursão {side}: {value}{} (limite {}{})",
                    metric.unit(),
                    event.threshold,
                    metric.unit()
                );
                Some(event)
            }
        }
    }
}

// ──────────────────────────────────────────────
// Testes
// ──────────────────────────────────────────────
