//! Parser de frames seriais.
//!
//! O controlador envia uma linha ASCII por amostra, campos separados por
//! vírgula em ordem fixa:
//!
//! ```text
//! ┌───────────┬────────────────┬──────────┐
//! │ Temp. ar  │ Temp. material │ Umidade  │   "72.5,68.1,45.0\n"
//! └───────────┴────────────────┴──────────┘
//! ```
//!
//! A ordem e a quantidade de campos vêm do [`FrameSchema`] configurado, nunca
//! são inferidas. A instalação de referência usa `[ar, ignorado, umidade]`.

use crate::types::Measurement;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Separador de campos do frame.
pub const FIELD_SEPARATOR: char = ',';

/// Papel de uma posição do frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldRole {
    AirTemperature,
    MaterialTemperature,
    Humidity,
    /// Posição presente no frame mas descartada (não é validada)
    Ignored,
}

impl fmt::Display for FieldRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            FieldRole::AirTemperature => "air_temperature",
            FieldRole::MaterialTemperature => "material_temperature",
            FieldRole::Humidity => "humidity",
            FieldRole::Ignored => "ignored",
        })
    }
}

/// Erros de configuração do schema.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SchemaError {
    #[error("Schema precisa de exatamente um campo {role} (encontrados {found})")]
    RequiredField { role: FieldRole, found: usize },

    #[error("Schema aceita no máximo um campo material_temperature (encontrados {0})")]
    DuplicateMaterial(usize),
}

/// Schema posicional do frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<FieldRole>", into = "Vec<FieldRole>")]
pub struct FrameSchema {
    fields: Vec<FieldRole>,
}

impl FrameSchema {
    /// Valida e cria um schema.
    pub fn new(fields: Vec<FieldRole>) -> Result<Self, SchemaError> {
        let count = |role: FieldRole| fields.iter().filter(|f| **f == role).count();

        for role in [FieldRole::AirTemperature, FieldRole::Humidity] {
            let found = count(role);
            if found != 1 {
                return Err(SchemaError::RequiredField { role, found });
            }
        }
        let material = count(FieldRole::MaterialTemperature);
        if material > 1 {
            return Err(SchemaError::DuplicateMaterial(material));
        }

        Ok(Self { fields })
    }

    /// `[ar, material, umidade]` – frame completo.
    pub fn full() -> Self {
        Self {
            fields: vec![
                FieldRole::AirTemperature,
                FieldRole::MaterialTemperature,
                FieldRole::Humidity,
            ],
        }
    }

    /// `[ar, _, umidade]` – instalação de referência, material ignorado.
    pub fn reference() -> Self {
        Self {
            fields: vec![
                FieldRole::AirTemperature,
                FieldRole::Ignored,
                FieldRole::Humidity,
            ],
        }
    }

    pub fn fields(&self) -> &[FieldRole] {
        &self.fields
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl Default for FrameSchema {
    fn default() -> Self {
        Self::reference()
    }
}

impl TryFrom<Vec<FieldRole>> for FrameSchema {
    type Error = SchemaError;

    fn try_from(fields: Vec<FieldRole>) -> Result<Self, Self::Error> {
        Self::new(fields)
    }
}

impl From<FrameSchema> for Vec<FieldRole> {
    fn from(schema: FrameSchema) -> Self {
        schema.fields
    }
}

/// Falha ao decodificar um frame. Sempre carrega a linha crua.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ParseError {
    #[error("Frame malformado: {raw:?}")]
    MalformedFrame { raw: String },

    #[error("Frame com {found} campos (esperado {expected}): {raw:?}")]
    FieldCountMismatch {
        expected: usize,
        found: usize,
        raw: String,
    },

    #[error("Campo {field} não é um decimal finito: {raw:?}")]
    NumericConversionFailure { field: FieldRole, raw: String },
}

impl ParseError {
    /// Linha crua que originou o erro.
    pub fn raw(&self) -> &str {
        match self {
            ParseError::MalformedFrame { raw }
            | ParseError::FieldCountMismatch { raw, .. }
            | ParseError::NumericConversionFailure { raw, .. } => raw,
        }
    }
}

/// Decodifica uma linha crua da serial em [`Measurement`].
///
/// Espaços e caracteres de controle só são removidos nas pontas da linha e de
/// cada campo; um byte de controle no meio de um número invalida o campo.
/// Função pura: nenhum caminho de erro passa de `Err`.
pub fn parse_frame(raw: &[u8], schema: &FrameSchema) -> Result<Measurement, ParseError> {
    let raw_text = || String::from_utf8_lossy(raw).trim_end().to_string();

    let text = match std::str::from_utf8(raw) {
        Ok(t) if t.is_ascii() => t,
        _ => return Err(ParseError::MalformedFrame { raw: raw_text() }),
    };
    let line = trim_noise(text);
    if line.is_empty() {
        return Err(ParseError::MalformedFrame { raw: raw_text() });
    }

    let parts: Vec<&str> = line.split(FIELD_SEPARATOR).map(trim_noise).collect();
    if parts.len() != schema.len() {
        return Err(ParseError::FieldCountMismatch {
            expected: schema.len(),
            found: parts.len(),
            raw: raw_text(),
        });
    }

    let mut air = None;
    let mut material = None;
    let mut humidity = None;

    for (role, text) in schema.fields().iter().zip(parts) {
        let slot = match role {
            FieldRole::AirTemperature => &mut air,
            FieldRole::MaterialTemperature => &mut material,
            FieldRole::Humidity => &mut humidity,
            FieldRole::Ignored => continue,
        };
        let value = text
            .parse::<f64>()
            .ok()
            .filter(|v| v.is_finite())
            .ok_or_else(|| ParseError::NumericConversionFailure {
                field: *role,
                raw: raw_text(),
            })?;
        *slot = Some(value);
    }

    match (air, humidity) {
        (Some(air_temperature_f), Some(relative_humidity_pct)) => Ok(Measurement {
            air_temperature_f,
            material_temperature_f: material,
            relative_humidity_pct,
        }),
        // Inalcançável com schema validado
        _ => Err(ParseError::MalformedFrame { raw: raw_text() }),
    }
}

fn trim_noise(text: &str) -> &str {
    text.trim_matches(|c: char| c.is_whitespace() || c.is_control())
}

// ──────────────────────────────────────────────
// Testes
// ──────────────────────────────────────────────
