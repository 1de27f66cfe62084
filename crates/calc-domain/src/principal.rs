// principal.rs
use crate::CalcError;
use std::collections::HashMap;
use uuid::Uuid;

/// Usuario autenticado, tal como lo entrega el proveedor de identidad.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Principal {
  pub user_id: Uuid,
  pub is_moderator: bool,
}

impl Principal {
  pub fn user(user_id: Uuid) -> Self {
    Self { user_id, is_moderator: false }
  }

  pub fn moderator(user_id: Uuid) -> Self {
    Self { user_id, is_moderator: true }
  }
}

/// Quien invoca una operacion. No resolver la identidad equivale a anonimo.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Caller {
  Anonymous,
  Authenticated(Principal),
}

impl Caller {
  /// Devuelve el principal o `Forbidden` para llamadas anonimas.
  pub fn principal(&self) -> Result<&Principal, CalcError> {
    match self {
      Caller::Authenticated(p) => Ok(p),
      Caller::Anonymous => Err(CalcError::Forbidden("se requiere autenticacion".to_string())),
    }
  }
}

impl From<Principal> for Caller {
  fn from(p: Principal) -> Self {
    Caller::Authenticated(p)
  }
}

/// Contrato del proveedor de identidad. El nucleo nunca interpreta
/// credenciales por su cuenta.
pub trait IdentityProvider: Send + Sync {
  fn resolve(&self, credential: Option<&str>) -> Caller;
}

/// Proveedor en memoria: mapea tokens opacos a principales. Util para
/// demos y pruebas.
#[derive(Debug, Default)]
pub struct StaticIdentityProvider {
  tokens: HashMap<String, Principal>,
}

impl StaticIdentityProvider {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn with_token(mut self, token: &str, principal: Principal) -> Self {
    self.tokens.insert(token.to_string(), principal);
    self
  }
}

impl IdentityProvider for StaticIdentityProvider {
  fn resolve(&self, credential: Option<&str>) -> Caller {
    credential.and_then(|c| self.tokens.get(c.trim()))
              .map(|p| Caller::Authenticated(*p))
              .unwrap_or(Caller::Anonymous)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn unknown_or_missing_tokens_are_anonymous() {
    let alice = Principal::user(Uuid::new_v4());
    let provider = StaticIdentityProvider::new().with_token("alice", alice);
    assert_eq!(provider.resolve(Some("alice")), Caller::Authenticated(alice));
    assert_eq!(provider.resolve(Some("mallory")), Caller::Anonymous);
    assert_eq!(provider.resolve(None), Caller::Anonymous);
    assert!(matches!(Caller::Anonymous.principal(), Err(CalcError::Forbidden(_))));
  }
}
