use crate::{CalcError, Calculation, CalculationStatus, Reaction, ReactionCalculation, User};
use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use uuid::Uuid;

/// Filtro de listado a nivel de almacenamiento. `created_to` es exclusivo.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CalculationFilter {
    pub created_from: Option<DateTime<Utc>>,
    pub created_to: Option<DateTime<Utc>>,
    pub status: Option<CalculationStatus>,
    pub creator_id: Option<Uuid>,
}

impl CalculationFilter {
    pub fn matches(&self, c: &Calculation) -> bool {
        self.created_from.map_or(true, |from| c.date_create() >= from)
        && self.created_to.map_or(true, |to| c.date_create() < to)
        && self.status.map_or(true, |s| c.status() == s)
        && self.creator_id.map_or(true, |id| c.creator_id() == id)
    }
}

/// Operaciones de persistencia de calculos y asociaciones.
///
/// Todo el estado pasa por el almacenamiento en cada operacion; la
/// aislacion de transacciones del almacenamiento es la unica frontera de
/// concurrencia. Las escrituras de estado son compare-and-set sobre el
/// estado leido y las ediciones de asociaciones exigen que el calculo siga
/// en borrador en el mismo paso atomico.
pub trait CalculationRepository: Send + Sync {
    /// Busca el borrador unico del creador o lo crea. Devuelve `true` si se
    /// creo. Debe ser atomico respecto del propio almacenamiento.
    fn get_or_create_draft(&self, creator_id: &Uuid, now: DateTime<Utc>) -> Result<(Calculation, bool), CalcError>;

    /// Borrador actual del creador, si existe.
    fn find_draft(&self, creator_id: &Uuid) -> Result<Option<Calculation>, CalcError>;

    fn get_calculation(&self, id: &Uuid) -> Result<Option<Calculation>, CalcError>;

    /// Reemplaza la fila del calculo solo si su estado actual es
    /// `expected`. `NotFound` si no existe, `InvalidState` si el estado
    /// cambio desde la lectura.
    fn update_calculation(&self, calculation: &Calculation, expected: CalculationStatus) -> Result<(), CalcError>;

    /// Guarda el borrador ya marcado como eliminado y borra sus asociaciones
    /// en una sola operacion. Devuelve cuantas habia. `InvalidState` si la
    /// fila ya no es un borrador.
    fn discard_draft(&self, deleted: &Calculation) -> Result<usize, CalcError>;

    fn list_calculations(&self, filter: &CalculationFilter) -> Result<Vec<Calculation>, CalcError>;

    /// Inserta la asociacion si no existe. Devuelve `false` si ya estaba.
    /// `NotFound` si el calculo no existe, `InvalidState` si no es borrador.
    fn add_association(&self, calculation_id: &Uuid, reaction_id: i64) -> Result<bool, CalcError>;

    fn get_association(&self, calculation_id: &Uuid, reaction_id: i64) -> Result<Option<ReactionCalculation>, CalcError>;

    fn list_associations(&self, calculation_id: &Uuid) -> Result<Vec<ReactionCalculation>, CalcError>;

    /// Devuelve `false` si no habia fila. Solo sobre borradores.
    fn remove_association(&self, calculation_id: &Uuid, reaction_id: i64) -> Result<bool, CalcError>;

    /// Devuelve la fila actualizada o `None` si no existe. Solo sobre
    /// borradores.
    fn update_output_mass(&self,
                          calculation_id: &Uuid,
                          reaction_id: i64,
                          output_mass: f64)
                          -> Result<Option<ReactionCalculation>, CalcError>;

    /// Devuelve `false` si no hay fila.
    fn set_input_mass(&self, calculation_id: &Uuid, reaction_id: i64, input_mass: f64) -> Result<bool, CalcError>;

    fn count_associations(&self, calculation_id: &Uuid) -> Result<i64, CalcError>;

    /// Asociaciones con `input_mass` fijado y distinto de cero.
    fn count_completed(&self, calculation_id: &Uuid) -> Result<i64, CalcError>;
}

/// Catalogo de reacciones (colaborador externo, solo lectura).
pub trait ReactionCatalog: Send + Sync {
    /// `NotFound` si no existe o esta eliminada.
    fn get_reaction(&self, id: i64) -> Result<Reaction, CalcError>;

    fn list_reactions(&self) -> Result<Vec<Reaction>, CalcError>;
}

/// Directorio de usuarios (colaborador externo, solo lectura).
pub trait UserDirectory: Send + Sync {
    fn get_user(&self, id: &Uuid) -> Result<Option<User>, CalcError>;
}

/// Implementacion en memoria para tests y desarrollo.
pub struct InMemoryCalcRepository {
    calculations: Arc<Mutex<IndexMap<Uuid, Calculation>>>,
    associations: Arc<Mutex<IndexMap<(Uuid, i64), ReactionCalculation>>>,
    reactions: Arc<Mutex<IndexMap<i64, Reaction>>>,
    users: Arc<Mutex<HashMap<Uuid, User>>>,
}

impl InMemoryCalcRepository {
    pub fn new() -> Self {
        Self { calculations: Arc::new(Mutex::new(IndexMap::new())),
               associations: Arc::new(Mutex::new(IndexMap::new())),
               reactions: Arc::new(Mutex::new(IndexMap::new())),
               users: Arc::new(Mutex::new(HashMap::new())) }
    }

    // Mapea mutex envenenados a CalcError::Internal
    fn lock_map<'a, T>(&'a self, m: &'a Mutex<T>, name: &str) -> Result<std::sync::MutexGuard<'a, T>, CalcError> {
        m.lock()
         .map_err(|e| CalcError::Internal(format!("Mutex '{}' poisoned: {}", name, e)))
    }

    pub fn insert_reaction(&self, reaction: Reaction) -> Result<i64, CalcError> {
        let id = reaction.id;
        self.lock_map(&self.reactions, "reactions")?.insert(id, reaction);
        Ok(id)
    }

    pub fn insert_user(&self, user: User) -> Result<Uuid, CalcError> {
        let id = user.id;
        self.lock_map(&self.users, "users")?.insert(id, user);
        Ok(id)
    }
}

/// `NotFound` o `InvalidState` salvo que `id` sea un borrador. Se llama con
/// el lock de `calculations` tomado.
fn require_draft(calcs: &IndexMap<Uuid, Calculation>, id: &Uuid) -> Result<(), CalcError> {
    match calcs.get(id) {
        Some(c) => c.ensure_draft(),
        None => Err(CalcError::NotFound(format!("calculo {}", id))),
    }
}

impl Default for InMemoryCalcRepository {
    fn default() -> Self {
        Self::new()
    }
}

impl CalculationRepository for InMemoryCalcRepository {
    fn get_or_create_draft(&self, creator_id: &Uuid, now: DateTime<Utc>) -> Result<(Calculation, bool), CalcError> {
        // Busqueda e insercion bajo el mismo lock: como mucho un borrador
        let mut calcs = self.lock_map(&self.calculations, "calculations")?;
        if let Some(existing) = calcs.values().find(|c| c.creator_id() == *creator_id && c.is_draft()) {
            return Ok((existing.clone(), false));
        }
        let draft = Calculation::new_draft(*creator_id, now);
        calcs.insert(draft.id(), draft.clone());
        Ok((draft, true))
    }

    fn find_draft(&self, creator_id: &Uuid) -> Result<Option<Calculation>, CalcError> {
        let calcs = self.lock_map(&self.calculations, "calculations")?;
        Ok(calcs.values().find(|c| c.creator_id() == *creator_id && c.is_draft()).cloned())
    }

    fn get_calculation(&self, id: &Uuid) -> Result<Option<Calculation>, CalcError> {
        let calcs = self.lock_map(&self.calculations, "calculations")?;
        Ok(calcs.get(id).cloned())
    }

    fn update_calculation(&self, calculation: &Calculation, expected: CalculationStatus) -> Result<(), CalcError> {
        let mut calcs = self.lock_map(&self.calculations, "calculations")?;
        match calcs.get_mut(&calculation.id()) {
            Some(slot) if slot.status() == expected => {
                *slot = calculation.clone();
                Ok(())
            }
            Some(slot) => Err(CalcError::InvalidState(format!("calculo {}: estado actual {}, se esperaba {}",
                                                              calculation.id(),
                                                              slot.status(),
                                                              expected))),
            None => Err(CalcError::NotFound(format!("calculo {}", calculation.id()))),
        }
    }

    fn discard_draft(&self, deleted: &Calculation) -> Result<usize, CalcError> {
        // Orden de locks: calculations antes que associations
        let mut calcs = self.lock_map(&self.calculations, "calculations")?;
        require_draft(&calcs, &deleted.id())?;
        let mut assoc = self.lock_map(&self.associations, "associations")?;
        calcs.insert(deleted.id(), deleted.clone());
        let before = assoc.len();
        assoc.retain(|(c, _), _| *c != deleted.id());
        Ok(before - assoc.len())
    }

    fn list_calculations(&self, filter: &CalculationFilter) -> Result<Vec<Calculation>, CalcError> {
        let calcs = self.lock_map(&self.calculations, "calculations")?;
        Ok(calcs.values().filter(|c| filter.matches(c)).cloned().collect())
    }

    fn add_association(&self, calculation_id: &Uuid, reaction_id: i64) -> Result<bool, CalcError> {
        let calcs = self.lock_map(&self.calculations, "calculations")?;
        require_draft(&calcs, calculation_id)?;
        let mut assoc = self.lock_map(&self.associations, "associations")?;
        let key = (*calculation_id, reaction_id);
        if assoc.contains_key(&key) {
            return Ok(false);
        }
        assoc.insert(key, ReactionCalculation::new(*calculation_id, reaction_id));
        Ok(true)
    }

    fn get_association(&self, calculation_id: &Uuid, reaction_id: i64) -> Result<Option<ReactionCalculation>, CalcError> {
        let assoc = self.lock_map(&self.associations, "associations")?;
        Ok(assoc.get(&(*calculation_id, reaction_id)).cloned())
    }

    fn list_associations(&self, calculation_id: &Uuid) -> Result<Vec<ReactionCalculation>, CalcError> {
        let assoc = self.lock_map(&self.associations, "associations")?;
        Ok(assoc.values().filter(|a| &a.calculation_id == calculation_id).cloned().collect())
    }

    fn remove_association(&self, calculation_id: &Uuid, reaction_id: i64) -> Result<bool, CalcError> {
        let calcs = self.lock_map(&self.calculations, "calculations")?;
        require_draft(&calcs, calculation_id)?;
        let mut assoc = self.lock_map(&self.associations, "associations")?;
        Ok(assoc.shift_remove(&(*calculation_id, reaction_id)).is_some())
    }

    fn update_output_mass(&self,
                          calculation_id: &Uuid,
                          reaction_id: i64,
                          output_mass: f64)
                          -> Result<Option<ReactionCalculation>, CalcError> {
        let calcs = self.lock_map(&self.calculations, "calculations")?;
        require_draft(&calcs, calculation_id)?;
        let mut assoc = self.lock_map(&self.associations, "associations")?;
        Ok(assoc.get_mut(&(*calculation_id, reaction_id)).map(|row| {
                                                              row.output_mass = output_mass;
                                                              row.clone()
                                                          }))
    }

    fn set_input_mass(&self, calculation_id: &Uuid, reaction_id: i64, input_mass: f64) -> Result<bool, CalcError> {
        let mut assoc = self.lock_map(&self.associations, "associations")?;
        match assoc.get_mut(&(*calculation_id, reaction_id)) {
            Some(row) => {
                row.input_mass = Some(input_mass);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn count_associations(&self, calculation_id: &Uuid) -> Result<i64, CalcError> {
        let assoc = self.lock_map(&self.associations, "associations")?;
        Ok(assoc.values().filter(|a| &a.calculation_id == calculation_id).count() as i64)
    }

    fn count_completed(&self, calculation_id: &Uuid) -> Result<i64, CalcError> {
        let assoc = self.lock_map(&self.associations, "associations")?;
        Ok(assoc.values()
                .filter(|a| &a.calculation_id == calculation_id && a.is_completed())
                .count() as i64)
    }
}

impl ReactionCatalog for InMemoryCalcRepository {
    fn get_reaction(&self, id: i64) -> Result<Reaction, CalcError> {
        let reactions = self.lock_map(&self.reactions, "reactions")?;
        reactions.get(&id)
                 .filter(|r| !r.is_delete)
                 .cloned()
                 .ok_or(CalcError::NotFound(format!("reaccion {}", id)))
    }

    fn list_reactions(&self) -> Result<Vec<Reaction>, CalcError> {
        let reactions = self.lock_map(&self.reactions, "reactions")?;
        Ok(reactions.values().filter(|r| !r.is_delete).cloned().collect())
    }
}

impl UserDirectory for InMemoryCalcRepository {
    fn get_user(&self, id: &Uuid) -> Result<Option<User>, CalcError> {
        let users = self.lock_map(&self.users, "users")?;
        Ok(users.get(id).cloned())
    }
}
