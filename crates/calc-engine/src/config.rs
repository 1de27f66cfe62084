// Archivo: config.rs
// Propósito: configuracion del motor (servicio de computo, secreto del
// callback y parametros de la cola de envio).
use calc_domain::CalcError;
use serde::{Deserialize, Serialize};
use std::time::Duration;

fn default_compute_url() -> String {
    "http://localhost:8000/calculate".to_string()
}

fn default_queue_capacity() -> usize {
    64
}

fn default_timeout_secs() -> u64 {
    10
}

/// Configuracion del motor de calculos.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Endpoint del servicio de computo externo.
    #[serde(default = "default_compute_url")]
    pub compute_url: String,
    /// Secreto compartido con el servicio de computo. Vacio rechaza todo.
    #[serde(default)]
    pub callback_token: String,
    #[serde(default = "default_queue_capacity")]
    pub dispatch_queue_capacity: usize,
    #[serde(default = "default_timeout_secs")]
    pub dispatch_timeout_secs: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self { compute_url: default_compute_url(),
               callback_token: String::new(),
               dispatch_queue_capacity: default_queue_capacity(),
               dispatch_timeout_secs: default_timeout_secs() }
    }
}

impl EngineConfig {
    pub fn dispatch_timeout(&self) -> Duration {
        Duration::from_secs(self.dispatch_timeout_secs)
    }

    /// Lee la configuracion del entorno (carga `.env` si existe).
    ///
    /// Variables: `COMPUTE_SERVICE_URL`, `COMPUTE_CALLBACK_TOKEN` (obligatoria),
    /// `DISPATCH_QUEUE_CAPACITY`, `DISPATCH_TIMEOUT_SECS`.
    pub fn from_env() -> Result<Self, CalcError> {
        dotenvy::dotenv().ok();
        let cfg = Self::from_lookup(|k| std::env::var(k).ok())?;
        if cfg.callback_token.is_empty() {
            return Err(CalcError::InvalidArgument("COMPUTE_CALLBACK_TOKEN not set".into()));
        }
        Ok(cfg)
    }

    /// Construye la configuracion a partir de una funcion de busqueda de
    /// variables. Los valores ausentes toman el valor por defecto.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, CalcError>
        where F: Fn(&str) -> Option<String>
    {
        let mut cfg = Self::default();
        if let Some(url) = lookup("COMPUTE_SERVICE_URL") {
            cfg.compute_url = url;
        }
        if let Some(token) = lookup("COMPUTE_CALLBACK_TOKEN") {
            cfg.callback_token = token.trim().to_string();
        }
        if let Some(raw) = lookup("DISPATCH_QUEUE_CAPACITY") {
            cfg.dispatch_queue_capacity =
                raw.trim()
                   .parse()
                   .map_err(|_| CalcError::InvalidArgument(format!("DISPATCH_QUEUE_CAPACITY invalido: {}", raw)))?;
        }
        if let Some(raw) = lookup("DISPATCH_TIMEOUT_SECS") {
            cfg.dispatch_timeout_secs =
                raw.trim()
                   .parse()
                   .map_err(|_| CalcError::InvalidArgument(format!("DISPATCH_TIMEOUT_SECS invalido: {}", raw)))?;
        }
        // tokio::sync::mpsc no admite capacidad cero
        if cfg.dispatch_queue_capacity == 0 {
            return Err(CalcError::InvalidArgument("DISPATCH_QUEUE_CAPACITY debe ser > 0".into()));
        }
        Ok(cfg)
    }
}
