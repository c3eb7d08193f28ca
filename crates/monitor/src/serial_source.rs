//! Porta serial do controlador como [`LineSource`].
//!
//! No Unix o `serialport` abre o TTY em modo exclusivo (`TIOCEXCL`): um
//! segundo leitor na mesma porta falha na abertura em vez de dividir o fluxo.

use chamber_core::config::SerialConfig;
use chamber_core::pipeline::BufReadSource;
use serialport::{ClearBuffer, SerialPort};
use std::io::BufReader;
use tracing::{debug, info};

/// Fonte de linhas sobre a porta serial aberta.
pub type SerialSource = BufReadSource<BufReader<Box<dyn SerialPort>>>;

/// Abre a porta configurada e descarta lixo acumulado no buffer de entrada.
pub fn open(config: &SerialConfig) -> Result<SerialSource, serialport::Error> {
    let port = serialport::new(&config.device, config.baud_rate)
        .timeout(config.read_timeout())
        .open()?;

    info!(
        "Serial aberta: {} @ {} baud (timeout {} ms)",
        config.device, config.baud_rate, config.read_timeout_ms
    );

    if let Err(e) = port.clear(ClearBuffer::Input) {
        debug!("Não foi possível limpar buffer de entrada: {e}");
    }

    Ok(BufReadSource::with_max_line(
        BufReader::new(port),
        config.max_line_bytes,
    ))
}
