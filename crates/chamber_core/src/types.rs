//! Tipos de telemetria da câmara climática.
//!
//! Um [`Measurement`] é o que sai do parser (só valores); o loop de aquisição
//! carimba sequência e horário e produz o [`Reading`] imutável.

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::fmt;

// ──────────────────────────────────────────────
// Métricas
// ──────────────────────────────────────────────

/// Métrica monitorada.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    AirTemperature,
    MaterialTemperature,
    Humidity,
}

impl Metric {
    pub const ALL: [Metric; 3] = [
        Metric::AirTemperature,
        Metric::MaterialTemperature,
        Metric::Humidity,
    ];

    /// Rótulo curto para logs e readout.
    pub fn label(self) -> &'static str {
        match self {
            Metric::AirTemperature => "Temp. Ar",
            Metric::MaterialTemperature => "Temp. Material",
            Metric::Humidity => "Umidade",
        }
    }

    pub fn unit(self) -> &'static str {
        match self {
            Metric::AirTemperature | Metric::MaterialTemperature => "°F",
            Metric::Humidity => "%",
        }
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

// ──────────────────────────────────────────────
// Measurement / Reading
// ──────────────────────────────────────────────

/// Valores decodificados de um frame, ainda sem sequência.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Measurement {
    /// Temperatura do ar (°F)
    pub air_temperature_f: f64,
    /// Temperatura do material (°F) – ausente quando o schema ignora o campo
    pub material_temperature_f: Option<f64>,
    /// Umidade relativa (%)
    pub relative_humidity_pct: f64,
}

impl Measurement {
    /// Carimba sequência e horário de ingestão.
    pub fn into_reading(self, sequence: u64, timestamp: DateTime<Local>) -> Reading {
        Reading {
            sequence,
            timestamp,
            air_temperature_f: self.air_temperature_f,
            material_temperature_f: self.material_temperature_f,
            relative_humidity_pct: self.relative_humidity_pct,
        }
    }
}

/// Amostra de telemetria completa e imutável.
///
/// Só é construída via [`Measurement::into_reading`]; não há setters.
#[derive(Debug, Clone, PartialEq)]
pub struct Reading {
    sequence: u64,
    timestamp: DateTime<Local>,
    air_temperature_f: f64,
    material_temperature_f: Option<f64>,
    relative_humidity_pct: f64,
}

impl Reading {
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    pub fn timestamp(&self) -> DateTime<Local> {
        self.timestamp
    }

    pub fn air_temperature_f(&self) -> f64 {
        self.air_temperature_f
    }

    pub fn material_temperature_f(&self) -> Option<f64> {
        self.material_temperature_f
    }

    pub fn relative_humidity_pct(&self) -> f64 {
        self.relative_humidity_pct
    }

    /// Valor de uma métrica, se presente neste frame.
    pub fn value(&self, metric: Metric) -> Option<f64> {
        match metric {
            Metric::AirTemperature => Some(self.air_temperature_f),
            Metric::MaterialTemperature => self.material_temperature_f,
            Metric::Humidity => Some(self.relative_humidity_pct),
        }
    }

    /// Pares (métrica, valor) presentes, na ordem de [`Metric::ALL`].
    pub fn present_values(&self) -> impl Iterator<Item = (Metric, f64)> + '_ {
        Metric::ALL
            .into_iter()
            .filter_map(|m| self.value(m).map(|v| (m, v)))
    }
}

// ──────────────────────────────────────────────
// Testes
// ──────────────────────────────────────────────
