#![allow(dead_code)]
//! Repositorio en memoria con demoras y fallos configurables, para abrir
//! ventanas entre lectura y escritura en las pruebas.
use calc_domain::{CalcError, Calculation, CalculationFilter, CalculationRepository, CalculationStatus, DomainStubs,
                  InMemoryCalcRepository, ReactionCalculation};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use uuid::Uuid;

pub struct ScriptedRepo {
  pub inner: Arc<InMemoryCalcRepository>,
  read_delay: Option<Duration>,
  count_delay: Option<Duration>,
  failing_counts: bool,
}

impl ScriptedRepo {
  pub fn sample() -> Self {
    Self { inner: Arc::new(DomainStubs::sample_repo().expect("sample repo")),
           read_delay: None,
           count_delay: None,
           failing_counts: false }
  }

  /// Cada lectura de calculo espera `d` antes de consultar.
  pub fn with_read_delay(mut self, d: Duration) -> Self {
    self.read_delay = Some(d);
    self
  }

  pub fn with_count_delay(mut self, d: Duration) -> Self {
    self.count_delay = Some(d);
    self
  }

  /// `count_completed` siempre devuelve `Internal`.
  pub fn failing_counts(mut self) -> Self {
    self.failing_counts = true;
    self
  }

  fn pause(d: Option<Duration>) {
    if let Some(d) = d {
      thread::sleep(d);
    }
  }
}

impl CalculationRepository for ScriptedRepo {
  fn get_or_create_draft(&self, creator_id: &Uuid, now: DateTime<Utc>) -> Result<(Calculation, bool), CalcError> {
    Self::pause(self.read_delay);
    self.inner.get_or_create_draft(creator_id, now)
  }

  fn find_draft(&self, creator_id: &Uuid) -> Result<Option<Calculation>, CalcError> {
    self.inner.find_draft(creator_id)
  }

  fn get_calculation(&self, id: &Uuid) -> Result<Option<Calculation>, CalcError> {
    let found = self.inner.get_calculation(id);
    Self::pause(self.read_delay);
    found
  }

  fn update_calculation(&self, calculation: &Calculation, expected: CalculationStatus) -> Result<(), CalcError> {
    self.inner.update_calculation(calculation, expected)
  }

  fn discard_draft(&self, deleted: &Calculation) -> Result<usize, CalcError> {
    self.inner.discard_draft(deleted)
  }

  fn list_calculations(&self, filter: &CalculationFilter) -> Result<Vec<Calculation>, CalcError> {
    self.inner.list_calculations(filter)
  }

  fn add_association(&self, calculation_id: &Uuid, reaction_id: i64) -> Result<bool, CalcError> {
    self.inner.add_association(calculation_id, reaction_id)
  }

  fn get_association(&self, calculation_id: &Uuid, reaction_id: i64) -> Result<Option<ReactionCalculation>, CalcError> {
    self.inner.get_association(calculation_id, reaction_id)
  }

  fn list_associations(&self, calculation_id: &Uuid) -> Result<Vec<ReactionCalculation>, CalcError> {
    self.inner.list_associations(calculation_id)
  }

  fn remove_association(&self, calculation_id: &Uuid, reaction_id: i64) -> Result<bool, CalcError> {
    self.inner.remove_association(calculation_id, reaction_id)
  }

  fn update_output_mass(&self,
                        calculation_id: &Uuid,
                        reaction_id: i64,
                        output_mass: f64)
                        -> Result<Option<ReactionCalculation>, CalcError> {
    self.inner.update_output_mass(calculation_id, reaction_id, output_mass)
  }

  fn set_input_mass(&self, calculation_id: &Uuid, reaction_id: i64, input_mass: f64) -> Result<bool, CalcError> {
    self.inner.set_input_mass(calculation_id, reaction_id, input_mass)
  }

  fn count_associations(&self, calculation_id: &Uuid) -> Result<i64, CalcError> {
    self.inner.count_associations(calculation_id)
  }

  fn count_completed(&self, calculation_id: &Uuid) -> Result<i64, CalcError> {
    Self::pause(self.count_delay);
    if self.failing_counts {
      return Err(CalcError::Internal("conteo no disponible".to_string()));
    }
    self.inner.count_completed(calculation_id)
  }
}
