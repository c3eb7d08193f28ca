//! Histórico limitado para os gráficos ao vivo.
//!
//! Cada métrica mantém as últimas `W` amostras `(sequência, valor)`; a mais
//! antiga é descartada ao inserir além da capacidade. A visualização nunca
//! lê o buffer diretamente: pega um [`HistorySnapshot`] completo a cada tick.

use crate::types::{Metric, Reading};
use std::collections::{BTreeMap, VecDeque};
use std::sync::{Arc, RwLock};

/// Ponto do gráfico: (sequência, valor).
pub type Point = (u64, f64);

/// Buffer FIFO por métrica.
#[derive(Debug, Clone)]
pub struct HistoryBuffer {
    capacity: usize,
    series: BTreeMap<Metric, VecDeque<Point>>,
}

impl HistoryBuffer {
    /// Cria um buffer com janela `capacity` (mínimo 1).
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            series: BTreeMap::new(),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn append(&mut self, metric: Metric, sequence: u64, value: f64) {
        let capacity = self.capacity;
        let deque = self
            .series
            .entry(metric)
            .or_insert_with(|| VecDeque::with_capacity(capacity));
        if deque.len() >= capacity {
            deque.pop_front();
        }
        deque.push_back((sequence, value));
    }

    /// Cópia da janela atual em ordem de chegada.
    pub fn window(&self, metric: Metric) -> Vec<Point> {
        self.series
            .get(&metric)
            .map(|d| d.iter().copied().collect())
            .unwrap_or_default()
    }

    pub fn snapshot(&self) -> HistorySnapshot {
        HistorySnapshot {
            capacity: self.capacity,
            series: self
                .series
                .iter()
                .map(|(m, d)| (*m, d.iter().copied().collect()))
                .collect(),
        }
    }
}

/// Cópia somente-leitura de todas as janelas.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HistorySnapshot {
    pub capacity: usize,
    pub series: BTreeMap<Metric, Vec<Point>>,
}

impl HistorySnapshot {
    pub fn window(&self, metric: Metric) -> &[Point] {
        self.series.get(&metric).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Domínio X comum a todas as métricas (primeira e última sequência).
    pub fn x_domain(&self) -> Option<(u64, u64)> {
        let first = self.series.values().filter_map(|s| s.first()).map(|p| p.0).min()?;
        let last = self.series.values().filter_map(|s| s.last()).map(|p| p.0).max()?;
        Some((first, last))
    }
}

/// Handle compartilhado entre o loop de aquisição (escritor) e a
/// visualização (leitores). Escrita e snapshot ficam sob o mesmo lock, então
/// o leitor nunca vê uma janela pela metade.
#[derive(Debug, Clone)]
pub struct SharedHistory {
    inner: Arc<RwLock<HistoryBuffer>>,
}

impl SharedHistory {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Arc::new(RwLock::new(HistoryBuffer::new(capacity))),
        }
    }

    /// Anexa todas as métricas presentes na leitura numa única seção crítica.
    pub fn append_reading(&self, reading: &Reading) {
        let mut buffer = self.inner.write().unwrap_or_else(|e| e.into_inner());
        for (metric, value) in reading.present_values() {
            buffer.append(metric, reading.sequence(), value);
        }
    }

    pub fn window(&self, metric: Metric) -> Vec<Point> {
        self.inner
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .window(metric)
    }

    pub fn snapshot(&self) -> HistorySnapshot {
        self.inner
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .snapshot()
    }
}

// ──────────────────────────────────────────────
// Testes
// ──────────────────────────────────────────────
