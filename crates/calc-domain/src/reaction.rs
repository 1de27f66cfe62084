// reaction.rs
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Masa de salida asignada a una reaccion recien agregada al carrito.
pub const DEFAULT_OUTPUT_MASS: f64 = 1.0;

/// Reaccion del catalogo (externa, de solo lectura para este nucleo).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reaction {
  pub id: i64,
  pub title: String,
  pub formula: String,
  /// Relacion masa de reactivo / masa de producto.
  pub conversion_factor: f64,
  pub is_delete: bool,
}

impl Reaction {
  pub fn new(id: i64, title: &str, formula: &str, conversion_factor: f64) -> Self {
    Self { id, title: title.to_string(), formula: formula.to_string(), conversion_factor, is_delete: false }
  }
}

/// Usuario conocido por el directorio externo. Solo se usa para mostrar
/// logins en las vistas.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
  pub id: Uuid,
  pub login: String,
  pub is_moderator: bool,
}

/// Fila de asociacion reaccion-calculo.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReactionCalculation {
  pub id: Uuid,
  pub reaction_id: i64,
  pub calculation_id: Uuid,
  pub output_mass: f64,
  /// `None` hasta que el servicio externo reporte el resultado.
  pub input_mass: Option<f64>,
}

impl ReactionCalculation {
  pub fn new(calculation_id: Uuid, reaction_id: i64) -> Self {
    Self { id: Uuid::new_v4(), reaction_id, calculation_id, output_mass: DEFAULT_OUTPUT_MASS, input_mass: None }
  }

  /// Tiene resultado reportado y distinto de cero.
  pub fn is_completed(&self) -> bool {
    matches!(self.input_mass, Some(m) if m != 0.0)
  }
}

/// Campos mutables de una asociacion.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AssociationPatch {
  pub output_mass: Option<f64>,
}
