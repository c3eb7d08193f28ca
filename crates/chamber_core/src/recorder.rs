//! Gravação durável: um CSV append-only por dia.
//!
//! O arquivo do dia se chama `<prefixo><AAAA-MM-DD>.<ext>` (ex:
//! `ChamberData2026-10-19.csv`). A data vem do horário de ingestão da leitura,
//! no fuso local. Virada de dia fecha o arquivo anterior e abre um novo; nada
//! é reescrito no lugar.

use crate::config::StorageConfig;
use crate::types::Reading;
use chrono::NaiveDate;
use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Cabeçalho escrito em arquivos novos.
pub const CSV_HEADER: &str =
    "sequence,timestamp,air_temperature_f,material_temperature_f,relative_humidity_pct";

/// Falha de gravação. Recuperável: o loop registra e segue.
#[derive(Debug, thiserror::Error)]
pub enum RecorderError {
    #[error("Erro ao abrir {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Erro ao gravar em {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Arquivo do dia aberto.
#[derive(Debug)]
pub struct DailyLog {
    date: NaiveDate,
    path: PathBuf,
    writer: BufWriter<File>,
}

impl DailyLog {
    fn open(path: PathBuf, date: NaiveDate) -> Result<Self, RecorderError> {
        let open_err = |source| RecorderError::Open {
            path: path.clone(),
            source,
        };

        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir).map_err(open_err)?;
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(open_err)?;
        let is_new = file.metadata().map_err(open_err)?.len() == 0;

        let mut log = Self {
            date,
            path,
            writer: BufWriter::new(file),
        };
        if is_new {
            log.write_line(CSV_HEADER)?;
        }
        info!("Log diário aberto: {}", log.path.display());
        Ok(log)
    }

    fn write_line(&mut self, line: &str) -> Result<(), RecorderError> {
        writeln!(self.writer, "{line}")
            .and_then(|_| self.writer.flush())
            .map_err(|source| RecorderError::Write {
                path: self.path.clone(),
                source,
            })
    }

    fn close(mut self) -> Result<(), RecorderError> {
        self.writer.flush().map_err(|source| RecorderError::Write {
            path: self.path.clone(),
            source,
        })?;
        debug!("Log diário fechado: {}", self.path.display());
        Ok(())
    }

    pub fn date(&self) -> NaiveDate {
        self.date
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Gravador de leituras com rotação diária.
#[derive(Debug)]
pub struct Recorder {
    directory: PathBuf,
    file_prefix: String,
    extension: String,
    current: Option<DailyLog>,
}

impl Recorder {
    pub fn new(config: &StorageConfig) -> Self {
        Self {
            directory: config.directory.clone(),
            file_prefix: config.file_prefix.clone(),
            extension: config.extension.clone(),
            current: None,
        }
    }

    /// Caminho determinístico do arquivo de um dia.
    pub fn path_for(&self, date: NaiveDate) -> PathBuf {
        self.directory.join(format!(
            "{}{}.{}",
            self.file_prefix,
            date.format("%Y-%m-%d"),
            self.extension
        ))
    }

    /// Arquivo aberto no momento, se houver.
    pub fn current_path(&self) -> Option<&Path> {
        self.current.as_ref().map(DailyLog::path)
    }

    /// Anexa a leitura ao arquivo do seu dia, abrindo um novo se o dia mudou.
    pub fn record(&mut self, reading: &Reading) -> Result<(), RecorderError> {
        let date = reading.timestamp().date_naive();

        let log = match self.current.take() {
            Some(log) if log.date == date => log,
            previous => {
                if let Some(old) = previous {
                    info!("Virada de dia: {} → {}", old.date, date);
                    if let Err(e) = old.close() {
                        warn!("{e}");
                    }
                }
                DailyLog::open(self.path_for(date), date)?
            }
        };

        let log = self.current.insert(log);
        log.write_line(&csv_row(reading))
    }

    /// Descarrega e fecha o arquivo aberto (encerramento).
    pub fn close(&mut self) -> Result<(), RecorderError> {
        match self.current.take() {
            Some(log) => log.close(),
            None => Ok(()),
        }
    }
}

fn csv_row(reading: &Reading) -> String {
    let material = reading
        .material_temperature_f()
        .map(|v| v.to_string())
        .unwrap_or_default();
    format!(
        "{},{},{},{},{}",
        reading.sequence(),
        reading.timestamp().to_rfc3339(),
        reading.air_temperature_f(),
        material,
        reading.relative_humidity_pct()
    )
}

// ──────────────────────────────────────────────
// Testes
// ──────────────────────────────────────────────
