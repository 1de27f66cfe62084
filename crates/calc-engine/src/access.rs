// Archivo: access.rs
// Propósito: politica de acceso sobre calculos. Todas las operaciones del
// motor pasan por aqui antes de tocar el almacenamiento.
use calc_domain::{CalcError, Calculation, Caller, Principal};

/// Exige un llamador autenticado.
pub fn authenticated(caller: &Caller) -> Result<&Principal, CalcError> {
    caller.principal()
}

/// Creador o moderador.
pub fn require_owner_or_moderator<'a>(caller: &'a Caller, calculation: &Calculation) -> Result<&'a Principal, CalcError> {
    let p = caller.principal()?;
    if p.is_moderator || p.user_id == calculation.creator_id() {
        Ok(p)
    } else {
        Err(CalcError::Forbidden(format!("calculo {}: solo el creador o un moderador", calculation.id())))
    }
}

pub fn require_moderator(caller: &Caller) -> Result<&Principal, CalcError> {
    let p = caller.principal()?;
    if p.is_moderator {
        Ok(p)
    } else {
        Err(CalcError::Forbidden("se requiere rol de moderador".to_string()))
    }
}

/// Visibilidad en listados: los moderadores ven todo lo que pasa el filtro;
/// el resto solo sus calculos enviados.
pub fn visible_in_listing(principal: &Principal, calculation: &Calculation) -> bool {
    if principal.is_moderator {
        return true;
    }
    calculation.creator_id() == principal.user_id && calculation.status().is_submitted()
}
