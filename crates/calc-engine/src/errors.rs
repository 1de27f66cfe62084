// Archivo: errors.rs
// Propósito: errores del envio al servicio de computo. Nunca salen de
// `moderate`; el worker los registra y los cuenta.
use thiserror::Error;
/// Errores de un `DispatchSink`.
///
/// - `Http`: fallo de transporte (conexion, DNS, TLS).
/// - `Status`: el servicio respondio con un codigo no exitoso.
/// - `Timeout`: el envio supero `dispatch_timeout`.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DispatchError {
  #[error("Error HTTP: {0}")]
  Http(String),
  #[error("Respuesta no exitosa del servicio de computo: {0}")]
  Status(u16),
  #[error("Tiempo de espera agotado")]
  Timeout,
}
impl From<reqwest::Error> for DispatchError {
  fn from(e: reqwest::Error) -> Self {
    if e.is_timeout() {
      DispatchError::Timeout
    } else if let Some(status) = e.status() {
      DispatchError::Status(status.as_u16())
    } else {
      DispatchError::Http(e.to_string())
    }
  }
}
