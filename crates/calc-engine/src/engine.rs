// Archivo: engine.rs
// Propósito: motor del ciclo de vida de calculos de masa. Orquesta el
// carrito (borrador), las asociaciones reaccion-calculo, la maquina de
// estados, el envio al servicio de computo y la ingesta de su callback.
//
// Todo el estado pasa por `CalculationRepository` en cada operacion. El
// unico estado propio del motor son los locks por usuario que serializan
// la creacion del borrador.
use crate::access;
use crate::callback::{CallbackReport, CallbackVerifier, ComputeCallback};
use crate::dispatch::{DispatchPayload, DispatchQueue, DispatchReaction, DispatchStatsSnapshot};
use crate::views::{CalculationDetail, CartSummary, ReactionInfo};
use calc_domain::{AssociationPatch, CalcError, Calculation, CalculationFilter, CalculationPatch, CalculationRepository,
                  CalculationStatus, Caller, Reaction, ReactionCalculation, ReactionCatalog};
use chrono::{DateTime, NaiveDate, NaiveTime, TimeZone, Utc};
use dashmap::DashMap;
use log::{debug, error, info, warn};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};
use uuid::Uuid;

/// Filtro de listado expuesto a los clientes. Rango de fechas inclusivo
/// sobre `date_create`; `to` cubre el dia completo.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ListFilter {
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
    pub status: Option<CalculationStatus>,
}

/// Motor de calculos de masa.
///
/// Cada operacion recibe el `Caller` explicito; no hay usuario implicito.
/// Los errores de envio al servicio de computo nunca salen de `moderate`.
pub struct MassCalcEngine<R>
    where R: CalculationRepository
{
    repo: Arc<R>,
    catalog: Arc<dyn ReactionCatalog>,
    dispatcher: DispatchQueue,
    verifier: CallbackVerifier,
    /// Un lock por creador para la creacion del borrador.
    draft_locks: DashMap<Uuid, Arc<Mutex<()>>>,
}

impl<R> MassCalcEngine<R> where R: CalculationRepository
{
    pub fn new(repo: Arc<R>,
               catalog: Arc<dyn ReactionCatalog>,
               dispatcher: DispatchQueue,
               verifier: CallbackVerifier)
               -> Self {
        Self { repo,
               catalog,
               dispatcher,
               verifier,
               draft_locks: DashMap::new() }
    }

    pub fn dispatch_stats(&self) -> DispatchStatsSnapshot {
        self.dispatcher.stats()
    }

    /// Lectura del catalogo. No requiere autenticacion.
    pub fn reactions(&self) -> Result<Vec<Reaction>, CalcError> {
        self.catalog.list_reactions()
    }

    fn load(&self, id: &Uuid) -> Result<Calculation, CalcError> {
        self.repo
            .get_calculation(id)?
            .ok_or_else(|| CalcError::NotFound(format!("calculo {}", id)))
    }

    fn draft_for(&self, user_id: Uuid) -> Result<(Calculation, bool), CalcError> {
        let lock = self.draft_locks
                       .entry(user_id)
                       .or_insert_with(|| Arc::new(Mutex::new(())))
                       .value()
                       .clone();
        let res = match lock.lock() {
            Ok(_guard) => self.repo.get_or_create_draft(&user_id, Utc::now()),
            Err(e) => Err(CalcError::Internal(format!("lock de borrador envenenado: {}", e))),
        };
        drop(lock);
        // Sin otros interesados la entrada sobra
        self.draft_locks.remove_if(&user_id, |_, l| Arc::strong_count(l) == 1);
        let (calc, created) = res?;
        if created {
            info!("nuevo borrador {} para {}", calc.id(), user_id);
        }
        Ok((calc, created))
    }

    // --- Carrito -------------------------------------------------------

    /// Devuelve el borrador del llamador, creandolo si no existe.
    pub fn get_or_create_draft(&self, caller: &Caller) -> Result<(Calculation, bool), CalcError> {
        let p = access::authenticated(caller)?;
        self.draft_for(p.user_id)
    }

    /// Numero de reacciones en el carrito; 0 si no hay borrador.
    pub fn cart_count(&self, caller: &Caller) -> Result<i64, CalcError> {
        Ok(self.cart_summary(caller)?.count)
    }

    pub fn cart_summary(&self, caller: &Caller) -> Result<CartSummary, CalcError> {
        let p = access::authenticated(caller)?;
        match self.repo.find_draft(&p.user_id)? {
            Some(draft) => Ok(CartSummary { draft_id: Some(draft.id()),
                                            count: self.repo.count_associations(&draft.id())? }),
            None => Ok(CartSummary { draft_id: None, count: 0 }),
        }
    }

    /// Agrega una reaccion a un borrador. Idempotente: devuelve `false` si la
    /// asociacion ya existia.
    pub fn add_reaction(&self, caller: &Caller, calculation_id: &Uuid, reaction_id: i64) -> Result<bool, CalcError> {
        let calc = self.load(calculation_id)?;
        access::require_owner_or_moderator(caller, &calc)?;
        self.catalog.get_reaction(reaction_id)?;
        calc.ensure_draft()?;
        let added = self.repo.add_association(calculation_id, reaction_id)?;
        debug!("reaccion {} en calculo {} (nueva: {})", reaction_id, calculation_id, added);
        Ok(added)
    }

    /// Agrega una reaccion al carrito del llamador. La reaccion se verifica
    /// antes de crear el borrador.
    pub fn add_to_cart(&self, caller: &Caller, reaction_id: i64) -> Result<(Calculation, bool), CalcError> {
        let p = access::authenticated(caller)?;
        self.catalog.get_reaction(reaction_id)?;
        let (draft, created) = self.draft_for(p.user_id)?;
        self.repo.add_association(&draft.id(), reaction_id)?;
        Ok((draft, created))
    }

    pub fn remove_reaction(&self, caller: &Caller, calculation_id: &Uuid, reaction_id: i64) -> Result<Calculation, CalcError> {
        let calc = self.load(calculation_id)?;
        access::require_owner_or_moderator(caller, &calc)?;
        calc.ensure_draft()?;
        if !self.repo.remove_association(calculation_id, reaction_id)? {
            return Err(CalcError::NotFound(format!("reaccion {} en calculo {}", reaction_id, calculation_id)));
        }
        Ok(calc)
    }

    /// Modifica la masa de salida de una asociacion del borrador.
    pub fn update_association(&self,
                              caller: &Caller,
                              calculation_id: &Uuid,
                              reaction_id: i64,
                              patch: &AssociationPatch)
                              -> Result<ReactionCalculation, CalcError> {
        let calc = self.load(calculation_id)?;
        access::require_owner_or_moderator(caller, &calc)?;
        calc.ensure_draft()?;
        let missing = || CalcError::NotFound(format!("reaccion {} en calculo {}", reaction_id, calculation_id));
        match patch.output_mass {
            Some(mass) => {
                if !mass.is_finite() || mass <= 0.0 {
                    return Err(CalcError::InvalidArgument(format!("output_mass debe ser > 0, recibido {}", mass)));
                }
                self.repo.update_output_mass(calculation_id, reaction_id, mass)?.ok_or_else(missing)
            }
            None => self.repo.get_association(calculation_id, reaction_id)?.ok_or_else(missing),
        }
    }

    /// Fija la masa de entrada calculada. Solo la usa la ingesta del callback.
    pub fn set_input_mass(&self, calculation_id: &Uuid, reaction_id: i64, input_mass: f64) -> Result<(), CalcError> {
        if !input_mass.is_finite() {
            return Err(CalcError::InvalidArgument(format!("input_mass no finito: {}", input_mass)));
        }
        if !self.repo.set_input_mass(calculation_id, reaction_id, input_mass)? {
            return Err(CalcError::NotFound(format!("reaccion {} en calculo {}", reaction_id, calculation_id)));
        }
        Ok(())
    }

    pub fn completed_count(&self, calculation_id: &Uuid) -> Result<i64, CalcError> {
        self.repo.count_completed(calculation_id)
    }

    // --- Maquina de estados --------------------------------------------

    pub fn change(&self, caller: &Caller, id: &Uuid, patch: &CalculationPatch) -> Result<Calculation, CalcError> {
        let calc = self.load(id)?;
        access::require_owner_or_moderator(caller, &calc)?;
        let next = calc.with_patch(patch)?;
        self.repo.update_calculation(&next, calc.status())?;
        Ok(next)
    }

    /// `draft -> formed`.
    pub fn form(&self, caller: &Caller, id: &Uuid) -> Result<Calculation, CalcError> {
        let calc = self.load(id)?;
        access::require_owner_or_moderator(caller, &calc)?;
        let next = calc.formed(Utc::now())?;
        self.repo.update_calculation(&next, calc.status())?;
        info!("calculo {} formado", id);
        Ok(next)
    }

    /// Borrado logico desde `draft` o `formed`. Un borrador eliminado vacia
    /// su carrito; un calculo formado conserva sus reacciones.
    pub fn delete(&self, caller: &Caller, id: &Uuid) -> Result<Calculation, CalcError> {
        let calc = self.load(id)?;
        access::require_owner_or_moderator(caller, &calc)?;
        let next = calc.deleted()?;
        if calc.is_draft() {
            let removed = self.repo.discard_draft(&next)?;
            debug!("borrador {} eliminado; {} reacciones quitadas", id, removed);
        } else {
            self.repo.update_calculation(&next, calc.status())?;
        }
        info!("calculo {} eliminado (desde {})", id, calc.status());
        Ok(next)
    }

    /// `formed -> completed | rejected`. Al completar, el payload se encola
    /// despues de persistir el estado.
    pub fn moderate(&self, caller: &Caller, id: &Uuid, decision: CalculationStatus) -> Result<Calculation, CalcError> {
        let p = access::require_moderator(caller)?;
        let calc = self.load(id)?;
        let next = calc.moderated(decision, p.user_id, Utc::now())?;
        // Solo el escritor que encuentra `formed` en el almacenamiento gana
        self.repo.update_calculation(&next, calc.status())?;
        info!("calculo {} moderado: {} por {}", id, decision, p.user_id);
        if decision == CalculationStatus::Completed {
            self.dispatch_completed(&next);
        }
        Ok(next)
    }

    fn dispatch_completed(&self, calc: &Calculation) {
        match self.build_payload(calc) {
            Ok(payload) => {
                self.dispatcher.enqueue(payload);
            }
            Err(e) => error!("no se pudo armar el payload del calculo {}: {}", calc.id(), e),
        }
    }

    fn build_payload(&self, calc: &Calculation) -> Result<DispatchPayload, CalcError> {
        let output_koef = calc.output_koef()
                              .ok_or_else(|| CalcError::InvalidState(format!("calculo {} sin output_koef", calc.id())))?;
        let mut reactions = Vec::new();
        for assoc in self.repo.list_associations(&calc.id())? {
            match self.catalog.get_reaction(assoc.reaction_id) {
                Ok(r) => reactions.push(DispatchReaction { id: r.id,
                                                           conversion_factor: r.conversion_factor,
                                                           output_mass: assoc.output_mass,
                                                           output_koef }),
                Err(e) => warn!("reaccion {} omitida del envio de {}: {}", assoc.reaction_id, calc.id(), e),
            }
        }
        Ok(DispatchPayload { calculation_id: calc.id(), reactions })
    }

    // --- Consultas -----------------------------------------------------

    /// Lista calculos segun el filtro y la politica de acceso. Sin filtro de
    /// estado se excluyen borradores y eliminados para todos.
    pub fn list(&self, caller: &Caller, filter: &ListFilter) -> Result<Vec<Calculation>, CalcError> {
        let p = access::authenticated(caller)?;
        if let (Some(from), Some(to)) = (filter.from, filter.to) {
            if from > to {
                return Err(CalcError::InvalidArgument(format!("rango de fechas invertido: {} > {}", from, to)));
            }
        }
        let store_filter = CalculationFilter { created_from: filter.from.map(start_of_day),
                                               created_to: filter.to.and_then(|d| d.succ_opt()).map(start_of_day),
                                               status: filter.status,
                                               creator_id: if p.is_moderator { None } else { Some(p.user_id) } };
        let rows = self.repo.list_calculations(&store_filter)?;
        Ok(rows.into_iter()
               .filter(|c| filter.status.is_some() || c.status().is_submitted())
               .filter(|c| access::visible_in_listing(p, c))
               .collect())
    }

    /// Calculo con sus reacciones. Los eliminados no se encuentran.
    pub fn get_calculation(&self, caller: &Caller, id: &Uuid) -> Result<CalculationDetail, CalcError> {
        let calc = self.load(id)?;
        if calc.status() == CalculationStatus::Deleted {
            return Err(CalcError::NotFound(format!("calculo {}", id)));
        }
        access::require_owner_or_moderator(caller, &calc)?;
        let mut reactions = Vec::new();
        for assoc in self.repo.list_associations(id)? {
            match self.catalog.get_reaction(assoc.reaction_id) {
                Ok(r) => reactions.push(ReactionInfo { reaction_id: r.id,
                                                       title: r.title,
                                                       formula: r.formula,
                                                       conversion_factor: r.conversion_factor,
                                                       output_mass: assoc.output_mass,
                                                       input_mass: assoc.input_mass }),
                Err(CalcError::NotFound(_)) => debug!("reaccion {} ya no esta en el catalogo", assoc.reaction_id),
                Err(e) => return Err(e),
            }
        }
        Ok(CalculationDetail { calculation: calc, reactions })
    }

    // --- Callback ------------------------------------------------------

    /// Ingresa los resultados del servicio de computo. Un token invalido se
    /// rechaza sin escribir nada; los resultados invalidos se omiten.
    pub fn ingest_callback(&self, callback: &ComputeCallback) -> Result<CallbackReport, CalcError> {
        if !self.verifier.verify(&callback.token) {
            warn!("callback rechazado para {}: token invalido", callback.calculation_id);
            return Err(CalcError::Forbidden("token de callback invalido".to_string()));
        }
        let mut updated = 0;
        let mut skipped = 0;
        for result in &callback.results {
            match self.set_input_mass(&callback.calculation_id, result.reaction_id, result.input_mass) {
                Ok(()) => updated += 1,
                Err(e) => {
                    skipped += 1;
                    warn!("resultado omitido (calculo {}, reaccion {}): {}",
                          callback.calculation_id, result.reaction_id, e);
                }
            }
        }
        // El lote ya quedo escrito: un fallo al contar no invalida la respuesta
        let completed_count = match self.repo.count_completed(&callback.calculation_id) {
            Ok(n) => Some(n),
            Err(e) => {
                error!("no se pudo contar resultados de {}: {}", callback.calculation_id, e);
                None
            }
        };
        info!("callback de {}: {} actualizados, {} omitidos", callback.calculation_id, updated, skipped);
        Ok(CallbackReport { calculation_id: callback.calculation_id,
                            updated,
                            skipped,
                            completed_count })
    }
}

fn start_of_day(d: NaiveDate) -> DateTime<Utc> {
    Utc.from_utc_datetime(&d.and_time(NaiveTime::default()))
}
