// calculation.rs
use crate::mass::validate_output_koef;
use crate::CalcError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Estado de un calculo de masa. `Deleted` es una variante mas (borrado
/// logico), no un flag aparte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CalculationStatus {
  Draft,
  Formed,
  Completed,
  Rejected,
  Deleted,
}

impl CalculationStatus {
  pub fn as_str(&self) -> &'static str {
    match self {
      CalculationStatus::Draft => "draft",
      CalculationStatus::Formed => "formed",
      CalculationStatus::Completed => "completed",
      CalculationStatus::Rejected => "rejected",
      CalculationStatus::Deleted => "deleted",
    }
  }

  /// Aristas permitidas de la maquina de estados.
  pub fn can_transition_to(self, next: CalculationStatus) -> bool {
    use CalculationStatus::*;
    match self {
      Draft => matches!(next, Formed | Deleted),
      Formed => matches!(next, Completed | Rejected | Deleted),
      Completed | Rejected | Deleted => false,
    }
  }

  /// Un calculo "enviado" es visible en listados: ni borrador ni eliminado.
  pub fn is_submitted(self) -> bool {
    use CalculationStatus::*;
    match self {
      Formed | Completed | Rejected => true,
      Draft | Deleted => false,
    }
  }
}

impl fmt::Display for CalculationStatus {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.as_str())
  }
}

impl FromStr for CalculationStatus {
  type Err = CalcError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.trim().to_lowercase().as_str() {
      "draft" => Ok(CalculationStatus::Draft),
      "formed" => Ok(CalculationStatus::Formed),
      "completed" => Ok(CalculationStatus::Completed),
      "rejected" => Ok(CalculationStatus::Rejected),
      "deleted" => Ok(CalculationStatus::Deleted),
      other => Err(CalcError::InvalidArgument(format!("estado desconocido: {}", other))),
    }
  }
}

/// Campos editables de un borrador.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CalculationPatch {
  pub output_koef: Option<f64>,
}

/// Representacion plana usada por las capas de persistencia.
#[derive(Debug, Clone, PartialEq)]
pub struct CalculationParts {
  pub id: Uuid,
  pub status: CalculationStatus,
  pub output_koef: Option<f64>,
  pub date_create: DateTime<Utc>,
  pub date_form: Option<DateTime<Utc>>,
  pub date_finish: Option<DateTime<Utc>>,
  pub creator_id: Uuid,
  pub moderator_id: Option<Uuid>,
}

/// Calculo de masa (el "carrito"). Las transiciones devuelven una copia
/// nueva; si fallan, el valor original queda intacto.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Calculation {
  id: Uuid,
  status: CalculationStatus,
  output_koef: Option<f64>,
  date_create: DateTime<Utc>,
  date_form: Option<DateTime<Utc>>,
  date_finish: Option<DateTime<Utc>>,
  creator_id: Uuid,
  moderator_id: Option<Uuid>,
}

impl Calculation {
  pub fn new_draft(creator_id: Uuid, now: DateTime<Utc>) -> Self {
    Self { id: Uuid::new_v4(),
           status: CalculationStatus::Draft,
           output_koef: None,
           date_create: now,
           date_form: None,
           date_finish: None,
           creator_id,
           moderator_id: None }
  }

  pub fn from_parts(parts: CalculationParts) -> Self {
    Self { id: parts.id,
           status: parts.status,
           output_koef: parts.output_koef,
           date_create: parts.date_create,
           date_form: parts.date_form,
           date_finish: parts.date_finish,
           creator_id: parts.creator_id,
           moderator_id: parts.moderator_id }
  }

  pub fn to_parts(&self) -> CalculationParts {
    CalculationParts { id: self.id,
                       status: self.status,
                       output_koef: self.output_koef,
                       date_create: self.date_create,
                       date_form: self.date_form,
                       date_finish: self.date_finish,
                       creator_id: self.creator_id,
                       moderator_id: self.moderator_id }
  }

  pub fn id(&self) -> Uuid {
    self.id
  }

  pub fn status(&self) -> CalculationStatus {
    self.status
  }

  pub fn output_koef(&self) -> Option<f64> {
    self.output_koef
  }

  pub fn date_create(&self) -> DateTime<Utc> {
    self.date_create
  }

  pub fn date_form(&self) -> Option<DateTime<Utc>> {
    self.date_form
  }

  pub fn date_finish(&self) -> Option<DateTime<Utc>> {
    self.date_finish
  }

  pub fn creator_id(&self) -> Uuid {
    self.creator_id
  }

  pub fn moderator_id(&self) -> Option<Uuid> {
    self.moderator_id
  }

  pub fn is_draft(&self) -> bool {
    self.status == CalculationStatus::Draft
  }

  fn check_transition(&self, next: CalculationStatus) -> Result<(), CalcError> {
    if self.status.can_transition_to(next) {
      Ok(())
    } else {
      Err(CalcError::InvalidState(format!("calculo {}: transicion {} -> {} no permitida", self.id, self.status, next)))
    }
  }

  /// Asegura que el calculo siga siendo un borrador editable.
  pub fn ensure_draft(&self) -> Result<(), CalcError> {
    if self.is_draft() {
      Ok(())
    } else {
      Err(CalcError::InvalidState(format!("calculo {} no es un borrador (estado {})", self.id, self.status)))
    }
  }

  pub fn with_patch(&self, patch: &CalculationPatch) -> Result<Self, CalcError> {
    self.ensure_draft()?;
    let mut next = self.clone();
    if let Some(koef) = patch.output_koef {
      next.output_koef = Some(validate_output_koef(koef)?);
    }
    Ok(next)
  }

  /// `draft -> formed`. Requiere `output_koef` fijado.
  pub fn formed(&self, now: DateTime<Utc>) -> Result<Self, CalcError> {
    self.check_transition(CalculationStatus::Formed)?;
    if self.output_koef.is_none() {
      return Err(CalcError::InvalidArgument(format!("calculo {}: output_koef requerido antes de formar", self.id)));
    }
    let mut next = self.clone();
    next.status = CalculationStatus::Formed;
    next.date_form = Some(now);
    Ok(next)
  }

  /// `formed -> completed | rejected`.
  pub fn moderated(&self, decision: CalculationStatus, moderator_id: Uuid, now: DateTime<Utc>) -> Result<Self, CalcError> {
    match decision {
      CalculationStatus::Completed | CalculationStatus::Rejected => {}
      other => {
        return Err(CalcError::InvalidArgument(format!("decision de moderacion invalida: {}", other)));
      }
    }
    self.check_transition(decision)?;
    let mut next = self.clone();
    next.status = decision;
    next.moderator_id = Some(moderator_id);
    next.date_finish = Some(now);
    Ok(next)
  }

  /// Borrado logico. No toca `date_finish`.
  pub fn deleted(&self) -> Result<Self, CalcError> {
    self.check_transition(CalculationStatus::Deleted)?;
    let mut next = self.clone();
    next.status = CalculationStatus::Deleted;
    Ok(next)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use CalculationStatus::*;

  const ALL: [CalculationStatus; 5] = [Draft, Formed, Completed, Rejected, Deleted];

  #[test]
  fn only_listed_edges_are_allowed() {
    let allowed = [(Draft, Formed), (Draft, Deleted), (Formed, Completed), (Formed, Rejected), (Formed, Deleted)];
    for from in ALL {
      for to in ALL {
        assert_eq!(from.can_transition_to(to), allowed.contains(&(from, to)), "{} -> {}", from, to);
      }
    }
  }

  #[test]
  fn status_parsing_rejects_unknown_values() {
    assert_eq!("Completed".parse::<CalculationStatus>(), Ok(Completed));
    assert!(matches!("approved".parse::<CalculationStatus>(), Err(CalcError::InvalidArgument(_))));
  }

  #[test]
  fn form_requires_koef_and_stamps_date() -> Result<(), CalcError> {
    let draft = Calculation::new_draft(Uuid::new_v4(), Utc::now());
    assert!(matches!(draft.formed(Utc::now()), Err(CalcError::InvalidArgument(_))));
    let patched = draft.with_patch(&CalculationPatch { output_koef: Some(0.8) })?;
    let formed = patched.formed(Utc::now())?;
    assert_eq!(formed.status(), Formed);
    assert!(formed.date_form().is_some());
    assert!(formed.date_finish().is_none());
    // el original no cambia
    assert_eq!(patched.status(), Draft);
    Ok(())
  }

  #[test]
  fn moderation_rejects_non_decisions_and_wrong_state() -> Result<(), CalcError> {
    let moderator = Uuid::new_v4();
    let draft = Calculation::new_draft(Uuid::new_v4(), Utc::now()).with_patch(&CalculationPatch { output_koef: Some(1.0) })?;
    assert!(matches!(draft.moderated(Completed, moderator, Utc::now()), Err(CalcError::InvalidState(_))));
    let formed = draft.formed(Utc::now())?;
    assert!(matches!(formed.moderated(Deleted, moderator, Utc::now()), Err(CalcError::InvalidArgument(_))));
    let done = formed.moderated(Rejected, moderator, Utc::now())?;
    assert_eq!(done.moderator_id(), Some(moderator));
    assert!(done.date_finish().is_some());
    assert!(matches!(done.with_patch(&CalculationPatch { output_koef: Some(0.5) }), Err(CalcError::InvalidState(_))));
    Ok(())
  }

  #[test]
  fn deleting_twice_fails_without_touching_finish_date() -> Result<(), CalcError> {
    let draft = Calculation::new_draft(Uuid::new_v4(), Utc::now());
    let deleted = draft.deleted()?;
    assert_eq!(deleted.status(), Deleted);
    assert!(matches!(deleted.deleted(), Err(CalcError::InvalidState(_))));
    assert!(deleted.date_finish().is_none());
    Ok(())
  }
}
