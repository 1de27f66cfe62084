// Archivo: service.rs
// Propósito: `CalculationService`, la capa que invocan los handlers (HTTP o
// CLI). Resuelve la credencial con el proveedor de identidad, interpreta
// los argumentos en texto y devuelve las vistas JSON.
use crate::callback::{CallbackReport, ComputeCallback};
use crate::engine::{ListFilter, MassCalcEngine};
use crate::views::{CalculationDetailJson, CalculationJson, CartSummary};
use calc_domain::{AssociationPatch, CalcError, Calculation, CalculationPatch, CalculationRepository, CalculationStatus,
                  Caller, IdentityProvider, Reaction, ReactionCalculation, UserDirectory};
use chrono::NaiveDate;
use std::sync::Arc;
use uuid::Uuid;

/// Servicio de alto nivel sobre el motor de calculos.
pub struct CalculationService<R> where R: CalculationRepository
{
    engine: Arc<MassCalcEngine<R>>,
    identity: Arc<dyn IdentityProvider>,
    users: Arc<dyn UserDirectory>,
}

/// Interpreta un id de calculo recibido como texto.
pub fn parse_id(raw: &str) -> Result<Uuid, CalcError> {
    Uuid::parse_str(raw.trim()).map_err(|_| CalcError::InvalidArgument(format!("id de calculo invalido: {}", raw)))
}

/// Fechas `AAAA-MM-DD`; vacio equivale a ausente.
fn parse_date(raw: Option<&str>) -> Result<Option<NaiveDate>, CalcError> {
    match raw.map(str::trim) {
        None | Some("") => Ok(None),
        Some(s) => NaiveDate::parse_from_str(s, "%Y-%m-%d").map(Some)
                                                          .map_err(|_| CalcError::InvalidArgument(format!("fecha invalida: {}", s))),
    }
}

impl<R> CalculationService<R> where R: CalculationRepository
{
    pub fn new(engine: Arc<MassCalcEngine<R>>, identity: Arc<dyn IdentityProvider>, users: Arc<dyn UserDirectory>) -> Self {
        Self { engine, identity, users }
    }

    fn caller(&self, credential: Option<&str>) -> Caller {
        self.identity.resolve(credential)
    }

    fn view(&self, c: &Calculation) -> Result<CalculationJson, CalcError> {
        CalculationJson::from_calculation(c, self.users.as_ref())
    }

    /// Catalogo de reacciones (sin autenticacion).
    pub fn reactions(&self) -> Result<Vec<Reaction>, CalcError> {
        self.engine.reactions()
    }

    pub fn draft(&self, credential: Option<&str>) -> Result<CalculationJson, CalcError> {
        let (calc, _) = self.engine.get_or_create_draft(&self.caller(credential))?;
        self.view(&calc)
    }

    pub fn cart(&self, credential: Option<&str>) -> Result<CartSummary, CalcError> {
        self.engine.cart_summary(&self.caller(credential))
    }

    pub fn add_to_cart(&self, credential: Option<&str>, reaction_id: i64) -> Result<CalculationJson, CalcError> {
        let (calc, _) = self.engine.add_to_cart(&self.caller(credential), reaction_id)?;
        self.view(&calc)
    }

    pub fn add_reaction(&self, credential: Option<&str>, calculation_id: &Uuid, reaction_id: i64) -> Result<bool, CalcError> {
        self.engine.add_reaction(&self.caller(credential), calculation_id, reaction_id)
    }

    pub fn remove_reaction(&self,
                           credential: Option<&str>,
                           calculation_id: &Uuid,
                           reaction_id: i64)
                           -> Result<CalculationJson, CalcError> {
        let calc = self.engine.remove_reaction(&self.caller(credential), calculation_id, reaction_id)?;
        self.view(&calc)
    }

    pub fn update_association(&self,
                              credential: Option<&str>,
                              calculation_id: &Uuid,
                              reaction_id: i64,
                              patch: &AssociationPatch)
                              -> Result<ReactionCalculation, CalcError> {
        self.engine.update_association(&self.caller(credential), calculation_id, reaction_id, patch)
    }

    pub fn change(&self, credential: Option<&str>, id: &Uuid, patch: &CalculationPatch) -> Result<CalculationJson, CalcError> {
        let calc = self.engine.change(&self.caller(credential), id, patch)?;
        self.view(&calc)
    }

    pub fn form(&self, credential: Option<&str>, id: &Uuid) -> Result<CalculationJson, CalcError> {
        let calc = self.engine.form(&self.caller(credential), id)?;
        self.view(&calc)
    }

    pub fn delete(&self, credential: Option<&str>, id: &Uuid) -> Result<CalculationJson, CalcError> {
        let calc = self.engine.delete(&self.caller(credential), id)?;
        self.view(&calc)
    }

    /// `decision` en texto (`completed` / `rejected`).
    pub fn moderate(&self, credential: Option<&str>, id: &Uuid, decision: &str) -> Result<CalculationJson, CalcError> {
        let decision: CalculationStatus = decision.parse()?;
        let calc = self.engine.moderate(&self.caller(credential), id, decision)?;
        self.view(&calc)
    }

    pub fn list(&self,
                credential: Option<&str>,
                from: Option<&str>,
                to: Option<&str>,
                status: Option<&str>)
                -> Result<Vec<CalculationJson>, CalcError> {
        let status = match status.map(str::trim) {
            None | Some("") => None,
            Some(s) => Some(s.parse::<CalculationStatus>()?),
        };
        let filter = ListFilter { from: parse_date(from)?, to: parse_date(to)?, status };
        let rows = self.engine.list(&self.caller(credential), &filter)?;
        rows.iter().map(|c| self.view(c)).collect()
    }

    pub fn get_calculation(&self, credential: Option<&str>, id: &Uuid) -> Result<CalculationDetailJson, CalcError> {
        let detail = self.engine.get_calculation(&self.caller(credential), id)?;
        Ok(CalculationDetailJson { calculation: self.view(&detail.calculation)?, reactions: detail.reactions })
    }

    /// Endpoint del callback. Se autentica con el secreto compartido, no con
    /// el proveedor de identidad.
    pub fn ingest_callback(&self, callback: &ComputeCallback) -> Result<CallbackReport, CalcError> {
        self.engine.ingest_callback(callback)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dates_and_ids_are_validated() {
        assert_eq!(parse_date(None), Ok(None));
        assert_eq!(parse_date(Some(" ")), Ok(None));
        assert_eq!(parse_date(Some("2024-02-29")), Ok(NaiveDate::from_ymd_opt(2024, 2, 29)));
        assert!(matches!(parse_date(Some("29/02/2024")), Err(CalcError::InvalidArgument(_))));
        assert!(matches!(parse_id("no-es-uuid"), Err(CalcError::InvalidArgument(_))));
    }
}
