// errors.rs
use thiserror::Error;

/// Errores del dominio de calculos de masa.
///
/// Cada variante es un tipo estable: los clientes deben poder distinguir
/// "no existe" de "estado incorrecto" y de "entrada invalida".
#[derive(Debug, Error, Clone, PartialEq)]
pub enum CalcError {
  /// Entidad ausente o eliminada logicamente.
  #[error("No encontrado: {0}")]
  NotFound(String),
  /// Entrada numerica mal formada o valor de estado desconocido.
  #[error("Argumento invalido: {0}")]
  InvalidArgument(String),
  /// Transicion no permitida desde el estado actual.
  #[error("Estado invalido: {0}")]
  InvalidState(String),
  /// Fallo de control de acceso o de token de callback.
  #[error("Prohibido: {0}")]
  Forbidden(String),
  /// Fallo de almacenamiento o de red.
  #[error("Error interno: {0}")]
  Internal(String),
}

/// Clase estable del error, util para mapear a codigos de respuesta.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
  NotFound,
  InvalidArgument,
  InvalidState,
  Forbidden,
  Internal,
}

impl CalcError {
  pub fn kind(&self) -> ErrorKind {
    match self {
      CalcError::NotFound(_) => ErrorKind::NotFound,
      CalcError::InvalidArgument(_) => ErrorKind::InvalidArgument,
      CalcError::InvalidState(_) => ErrorKind::InvalidState,
      CalcError::Forbidden(_) => ErrorKind::Forbidden,
      CalcError::Internal(_) => ErrorKind::Internal,
    }
  }
}

impl From<serde_json::Error> for CalcError {
  fn from(e: serde_json::Error) -> Self {
    Self::Internal(format!("serializacion: {}", e))
  }
}

impl From<uuid::Error> for CalcError {
  fn from(e: uuid::Error) -> Self {
    Self::Internal(format!("uuid invalido: {}", e))
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn every_variant_maps_to_its_kind() {
    let cases = [(CalcError::NotFound("x".into()), ErrorKind::NotFound),
                 (CalcError::InvalidArgument("x".into()), ErrorKind::InvalidArgument),
                 (CalcError::InvalidState("x".into()), ErrorKind::InvalidState),
                 (CalcError::Forbidden("x".into()), ErrorKind::Forbidden),
                 (CalcError::Internal("x".into()), ErrorKind::Internal)];
    for (err, kind) in cases {
      assert_eq!(err.kind(), kind, "{}", err);
    }
    let parsed: Result<uuid::Uuid, CalcError> = uuid::Uuid::parse_str("no-uuid").map_err(CalcError::from);
    assert_eq!(parsed.map_err(|e| e.kind()), Err(ErrorKind::Internal));
  }
}
