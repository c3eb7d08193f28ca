//! # Chamber Core
//!
//! Núcleo do monitor da câmara climática: decodificação dos frames seriais,
//! histórico limitado para os gráficos, gravação diária em CSV, motor de
//! alertas com disparo por borda e o loop de aquisição que liga tudo.
//!
//! ## Módulos
//! - [`types`] – `Reading`, `Measurement` e métricas
//! - [`protocol`] – Parser de frames e schema posicional
//! - [`history`] – Janela FIFO por métrica com snapshot seguro entre threads
//! - [`recorder`] – Log append-only, um arquivo por dia
//! - [`alerts`] – Máquina de estados Normal/Excursão e mensagens
//! - [`pipeline`] – Loop de aquisição, fonte de linhas e notificador
//! - [`config`] – Configuração unificada via TOML

pub mod types;
pub mod protocol;
pub mod history;
pub mod recorder;
pub mod alerts;
pub mod pipeline;
pub mod config;

// Re-exports convenientes
pub use types::{Measurement, Metric, Reading};
pub use protocol::{FieldRole, FrameSchema, ParseError, parse_frame};
pub use alerts::{AlertEngine, AlertEvent, AlertMessage, Side};
pub use pipeline::{AcquisitionLoop, LineSource, LoopError, Notifier, NotifyError};
pub use config::AppConfig;
