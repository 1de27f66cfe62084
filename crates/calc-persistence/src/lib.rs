//! Persistencia Diesel para calculos de masa.
//! Expone el modulo `schema` y el repositorio que implementa los traits de
//! almacenamiento, catalogo de reacciones y directorio de usuarios del
//! dominio. La implementacion esta en `domain_persistence.rs`.

mod domain_persistence;
pub mod schema;

pub use domain_persistence::{new_from_env, DieselCalcRepository, MIGRATIONS};
