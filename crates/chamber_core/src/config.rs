//! Configuração unificada via TOML.
//!
//! Tudo o que antes era constante no código (porta, baud, limites, destinatário)
//! vem de um único `config.toml`. A senha SMTP nunca fica no arquivo: só o nome
//! da variável de ambiente que a contém.

use crate::alerts::AlertRule;
use crate::pipeline::DEFAULT_MAX_LINE_BYTES;
use crate::protocol::{FieldRole, FrameSchema};
use crate::types::Metric;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

/// Erros ao persistir a configuração.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Erro ao serializar configuração: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Erro ao gravar {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Porta serial do controlador.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SerialConfig {
    /// Dispositivo (ex: "/dev/ttyUSB0", "COM3")
    pub device: String,
    pub baud_rate: u32,
    /// Timeout de leitura; expirar não é erro, só "sem dados neste tick"
    pub read_timeout_ms: u64,
    /// Falhas de leitura consecutivas antes de desistir
    pub read_error_limit: u32,
    /// Pausa entre tentativas após falha de leitura
    pub retry_delay_ms: u64,
    /// Linha sem `\n` maior que isto é descartada como frame inválido
    pub max_line_bytes: usize,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            device: if cfg!(windows) { "COM3" } else { "/dev/ttyUSB0" }.into(),
            baud_rate: 115_200,
            read_timeout_ms: 1000,
            read_error_limit: 5,
            retry_delay_ms: 500,
            max_line_bytes: DEFAULT_MAX_LINE_BYTES,
        }
    }
}

impl SerialConfig {
    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }
}

/// Layout do frame.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FrameConfig {
    /// Ordem dos campos, ex: `["air_temperature", "ignored", "humidity"]`
    pub schema: FrameSchema,
}

/// Janela ao vivo.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HistoryConfig {
    /// Amostras mantidas por métrica (W)
    pub window: usize,
    /// Intervalo de atualização do display
    pub refresh_interval_ms: u64,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            window: 60,
            refresh_interval_ms: 1000,
        }
    }
}

impl HistoryConfig {
    pub fn refresh_interval(&self) -> Duration {
        Duration::from_millis(self.refresh_interval_ms)
    }
}

/// Onde gravar os CSVs diários.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub directory: PathBuf,
    pub file_prefix: String,
    pub extension: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            directory: PathBuf::from("."),
            file_prefix: "ChamberData".into(),
            extension: "csv".into(),
        }
    }
}

/// Regras de alerta.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AlertsConfig {
    pub rules: Vec<AlertRule>,
}

impl Default for AlertsConfig {
    fn default() -> Self {
        Self {
            rules: vec![AlertRule {
                metric: Metric::AirTemperature,
                high: 400.0,
                low: -150.0,
            }],
        }
    }
}

/// Notificação por e-mail (SMTP com STARTTLS).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NotifyConfig {
    pub enabled: bool,
    pub smtp_server: String,
    pub smtp_port: u16,
    /// Remetente (From)
    pub sender: String,
    /// Destinatário dos alertas
    pub recipient: String,
    /// Usuário SMTP (vazio = usa o remetente)
    pub username: String,
    /// Variável de ambiente com a senha SMTP
    pub password_env: String,
    /// Localização da câmara, citada no corpo do alerta
    pub location: String,
    pub timeout_secs: u64,
    /// Alertas pendentes antes de descartar novos
    pub queue_capacity: usize,
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            smtp_server: String::new(),
            smtp_port: 587,
            sender: String::new(),
            recipient: String::new(),
            username: String::new(),
            password_env: "CHAMBER_SMTP_PASSWORD".into(),
            location: String::new(),
            timeout_secs: 10,
            queue_capacity: 16,
        }
    }
}

impl NotifyConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Usuário efetivo do login SMTP.
    pub fn login(&self) -> &str {
        if self.username.is_empty() {
            &self.sender
        } else {
            &self.username
        }
    }

    /// Senha lida do ambiente no momento da chamada.
    pub fn password(&self) -> Option<String> {
        std::env::var(&self.password_env)
            .ok()
            .filter(|p| !p.is_empty())
    }
}

/// Configuração raiz.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub serial: SerialConfig,
    pub frame: FrameConfig,
    pub history: HistoryConfig,
    pub storage: StorageConfig,
    pub alerts: AlertsConfig,
    pub notify: NotifyConfig,
}

impl AppConfig {
    /// Carrega configuração de um arquivo TOML.
    ///
    /// Arquivo ausente ou inválido cai nos padrões; o log diz qual caminho
    /// foi tentado (útil com `--config`).
    pub fn load(path: &Path) -> Self {
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!("{} não encontrado, usando configuração padrão", path.display());
                return AppConfig::default();
            }
            Err(e) => {
                warn!("Erro ao ler {}: {e}; usando configuração padrão", path.display());
                return AppConfig::default();
            }
        };

        match toml::from_str::<AppConfig>(&content) {
            Ok(config) => {
                info!("Configuração carregada de {}", path.display());
                config
            }
            Err(e) => {
                warn!("Erro ao parsear {}: {e}; usando configuração padrão", path.display());
                AppConfig::default()
            }
        }
    }

    /// Salva configuração em arquivo TOML.
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        info!("Configuração salva em {}", path.display());
        Ok(())
    }

    /// Retorna o caminho padrão do config.toml.
    pub fn default_path() -> PathBuf {
        let exe_dir = std::env::current_exe()
            .map(|p| p.parent().unwrap_or(Path::new(".")).to_path_buf())
            .unwrap_or_else(|_| PathBuf::from("."));
        exe_dir.join("config.toml")
    }

    /// Valida a configuração e retorna lista de erros.
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.serial.device.trim().is_empty() {
            errors.push("Dispositivo serial não configurado".into());
        }
        if self.serial.baud_rate == 0 {
            errors.push("Baud rate não pode ser 0".into());
        }
        if self.serial.read_timeout_ms == 0 {
            errors.push("Timeout de leitura não pode ser 0".into());
        }
        if self.serial.max_line_bytes < 16 {
            errors.push(format!(
                "serial.max_line_bytes muito pequeno: {} (mínimo 16)",
                self.serial.max_line_bytes
            ));
        }
        if self.serial.read_error_limit == 0 {
            errors.push("Limite de falhas de leitura não pode ser 0".into());
        }
        if self.history.window == 0 {
            errors.push("Janela do histórico não pode ser 0".into());
        }
        if self.history.refresh_interval_ms < 50 {
            errors.push(format!(
                "Intervalo de atualização inválido: {} ms (mínimo 50)",
                self.history.refresh_interval_ms
            ));
        }
        if self.storage.file_prefix.is_empty() && self.storage.extension.is_empty() {
            errors.push("Prefixo e extensão do log não podem ser ambos vazios".into());
        }

        let mut seen = Vec::new();
        for rule in &self.alerts.rules {
            if !(rule.low < rule.high) {
                errors.push(format!(
                    "Regra de {}: limite baixo ({}) deve ser menor que o alto ({})",
                    rule.metric, rule.low, rule.high
                ));
            }
            if seen.contains(&rule.metric) {
                errors.push(format!("Regra duplicada para {}", rule.metric));
            }
            seen.push(rule.metric);

            if rule.metric == Metric::MaterialTemperature
                && !self.frame.schema.fields().contains(&FieldRole::MaterialTemperature)
            {
                errors.push(format!(
                    "Regra para {} nunca dispara: frame.schema não tem material_temperature",
                    rule.metric
                ));
            }
        }

        if self.notify.enabled {
            for (value, name) in [
                (&self.notify.smtp_server, "smtp_server"),
                (&self.notify.sender, "sender"),
                (&self.notify.recipient, "recipient"),
            ] {
                if value.trim().is_empty() {
                    errors.push(format!("notify.{name} obrigatório com notificação ativa"));
                }
            }
            if self.notify.queue_capacity == 0 {
                errors.push("notify.queue_capacity não pode ser 0".into());
            }
        }

        errors
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = AppConfig::default();
        let errors = config.validate();
        assert!(errors.is_empty(), "Erros: {:?}", errors);
    }

    #[test]
    fn roundtrip_toml() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        let parsed: AppConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(config.serial.baud_rate, parsed.serial.baud_rate);
        assert_eq!(config.frame.schema, parsed.frame.schema);
        assert_eq!(config.alerts.rules, parsed.alerts.rules);
    }

    #[test]
    fn partial_toml_uses_defaults() {
        let partial = r#"
[serial]
device = "/dev/ttyACM0"

[frame]
schema = ["air_temperature", "material_temperature", "humidity"]
"#;
        let config: AppConfig = toml::from_str(partial).unwrap();
        assert_eq!(config.serial.device, "/dev/ttyACM0");
        // Outros campos devem ter valor padrão
        assert_eq!(config.serial.baud_rate, 115_200);
        assert_eq!(config.history.window, 60);
        assert_eq!(config.frame.schema.fields()[1], FieldRole::MaterialTemperature);
        assert_eq!(config.alerts.rules[0].high, 400.0);
    }

    #[test]
    fn alert_rules_from_toml() {
        let text = r#"
[[alerts.rules]]
metric = "air_temperature"
high = 350.0
low = -100.0

[[alerts.rules]]
metric = "humidity"
high = 95.0
low = 5.0
"#;
        let config: AppConfig = toml::from_str(text).unwrap();
        assert_eq!(config.alerts.rules.len(), 2);
        assert_eq!(config.alerts.rules[1].metric, Metric::Humidity);
        assert!(config.validate().is_empty());
    }

    #[test]
    fn inverted_thresholds_and_missing_smtp_are_reported() {
        let mut config = AppConfig::default();
        config.alerts.rules[0].low = 500.0;
        config.notify.enabled = true;
        let errors = config.validate();
        assert!(errors.iter().any(|e| e.contains("limite baixo")));
        assert!(errors.iter().any(|e| e.contains("notify.smtp_server")));
        assert!(errors.iter().any(|e| e.contains("notify.recipient")));
    }

    #[test]
    fn material_rule_requires_material_field() {
        let mut config = AppConfig::default();
        config.alerts.rules.push(AlertRule {
            metric: Metric::MaterialTemperature,
            high: 300.0,
            low: -100.0,
        });
        let errors = config.validate();
        assert!(errors.iter().any(|e| e.contains("nunca dispara")), "Erros: {:?}", errors);

        config.frame.schema = FrameSchema::full();
        assert!(config.validate().is_empty());
    }

    #[test]
    fn missing_or_broken_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nao_existe.toml");
        assert_eq!(AppConfig::load(&missing).history.window, 60);

        let broken = dir.path().join("quebrado.toml");
        std::fs::write(&broken, "[history\nwindow = ").unwrap();
        assert_eq!(AppConfig::load(&broken).serial.baud_rate, 115_200);
    }

    #[test]
    fn password_never_serialized() {
        let text = toml::to_string_pretty(&AppConfig::default()).unwrap();
        assert!(text.contains("password_env = \"CHAMBER_SMTP_PASSWORD\""));
        assert!(!text.contains("password ="));
    }

    #[test]
    fn login_falls_back_to_sender() {
        let mut notify = NotifyConfig {
            sender: "camara@exemplo.org".into(),
            ..NotifyConfig::default()
        };
        assert_eq!(notify.login(), "camara@exemplo.org");
        notify.username = "operador".into();
        assert_eq!(notify.login(), "operador");
    }

    #[test]
    fn save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let mut config = AppConfig::default();
        config.history.window = 120;
        config.save(&path).unwrap();
        assert_eq!(AppConfig::load(&path).history.window, 120);
    }
}
