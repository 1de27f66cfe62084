mod calculation;
mod domain_repository;
mod domain_stubs;
mod errors;
mod mass;
mod principal;
mod reaction;

pub use calculation::{Calculation, CalculationParts, CalculationPatch, CalculationStatus};
pub use domain_repository::{CalculationFilter, CalculationRepository, InMemoryCalcRepository, ReactionCatalog, UserDirectory};
pub use errors::{CalcError, ErrorKind};
pub use mass::{calculate_mass, validate_output_koef};
pub use principal::{Caller, IdentityProvider, Principal, StaticIdentityProvider};
pub use reaction::{AssociationPatch, Reaction, ReactionCalculation, User, DEFAULT_OUTPUT_MASS};
// Identificadores fijos de los datos de ejemplo (demo y pruebas)
pub use domain_stubs::{DomainStubs, SAMPLE_CREATOR_ID, SAMPLE_MODERATOR_ID, SAMPLE_OTHER_ID};
