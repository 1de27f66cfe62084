use crate::domain_repository::InMemoryCalcRepository;
use crate::{CalcError, Reaction, User};
use uuid::Uuid;

/// Usuario creador de ejemplo.
pub const SAMPLE_CREATOR_ID: Uuid = Uuid::from_u128(0x6f1d_2c3a_0000_4000_8000_0000_0000_0001);
/// Segundo creador, para probar aislamiento entre usuarios.
pub const SAMPLE_OTHER_ID: Uuid = Uuid::from_u128(0x6f1d_2c3a_0000_4000_8000_0000_0000_0002);
/// Moderador de ejemplo.
pub const SAMPLE_MODERATOR_ID: Uuid = Uuid::from_u128(0x6f1d_2c3a_0000_4000_8000_0000_0000_0003);

pub struct DomainStubs;

impl DomainStubs {
    /// Cadena de produccion de acido sulfurico y sintesis de amoniaco.
    pub fn sample_reactions() -> Vec<Reaction> {
        vec![Reaction::new(1, "Tostacion de pirita (SO2)", "4FeS2+11O2=2Fe2O3+8SO2", 1.067),
             Reaction::new(2, "Oxidacion de SO2 (SO3)", "2SO2+O2=2SO3", 1.25),
             Reaction::new(3, "Absorcion de SO3 (H2SO4)", "SO3+H2O=H2SO4", 1.225),
             Reaction::new(4, "Sintesis de amoniaco (NH3)", "N2+3H2=2NH3", 1.214),]
    }

    pub fn sample_users() -> Vec<User> {
        vec![User { id: SAMPLE_CREATOR_ID, login: "ivanov".to_string(), is_moderator: false },
             User { id: SAMPLE_OTHER_ID, login: "petrova".to_string(), is_moderator: false },
             User { id: SAMPLE_MODERATOR_ID, login: "moderador".to_string(), is_moderator: true },]
    }

    /// Crea un repositorio en memoria pre-poblado con el catalogo y los
    /// usuarios de ejemplo.
    pub fn sample_repo() -> Result<InMemoryCalcRepository, CalcError> {
        let repo = InMemoryCalcRepository::new();
        for r in Self::sample_reactions() {
            repo.insert_reaction(r)?;
        }
        for u in Self::sample_users() {
            repo.insert_user(u)?;
        }
        Ok(repo)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ReactionCatalog, UserDirectory};

    #[test]
    fn sample_repo_is_populated() -> Result<(), CalcError> {
        let repo = DomainStubs::sample_repo()?;
        assert_eq!(repo.list_reactions()?.len(), 4);
        assert_eq!(repo.get_reaction(2)?.conversion_factor, 1.25);
        let moderator = repo.get_user(&SAMPLE_MODERATOR_ID)?.expect("moderador");
        assert!(moderator.is_moderator);
        Ok(())
    }
}
