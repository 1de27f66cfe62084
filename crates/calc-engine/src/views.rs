// Archivo: views.rs
// Propósito: representaciones expuestas a los clientes (JSON).
use calc_domain::{CalcError, Calculation, CalculationStatus, UserDirectory};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Vista JSON de un calculo. Los campos opcionales se omiten hasta que la
/// transicion correspondiente ocurre.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalculationJson {
    pub id: Uuid,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_koef: Option<f64>,
    pub status: CalculationStatus,
    pub date_create: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date_form: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date_finish: Option<DateTime<Utc>>,
    pub creator_login: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub moderator_login: Option<String>,
}

impl CalculationJson {
    /// Resuelve los logins en el directorio. Un usuario desconocido se
    /// muestra por su id.
    pub fn from_calculation(c: &Calculation, users: &dyn UserDirectory) -> Result<Self, CalcError> {
        let creator_login = login_or_id(users, &c.creator_id())?;
        let moderator_login = match c.moderator_id() {
            Some(m) => Some(login_or_id(users, &m)?),
            None => None,
        };
        Ok(Self { id: c.id(),
                  output_koef: c.output_koef(),
                  status: c.status(),
                  date_create: c.date_create(),
                  date_form: c.date_form(),
                  date_finish: c.date_finish(),
                  creator_login,
                  moderator_login })
    }
}

fn login_or_id(users: &dyn UserDirectory, id: &Uuid) -> Result<String, CalcError> {
    Ok(users.get_user(id)?.map(|u| u.login).unwrap_or_else(|| id.to_string()))
}

/// Reaccion de un calculo unida a los datos del catalogo.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReactionInfo {
    pub reaction_id: i64,
    pub title: String,
    pub formula: String,
    pub conversion_factor: f64,
    pub output_mass: f64,
    pub input_mass: Option<f64>,
}

/// Calculo con sus reacciones.
#[derive(Debug, Clone, PartialEq)]
pub struct CalculationDetail {
    pub calculation: Calculation,
    pub reactions: Vec<ReactionInfo>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalculationDetailJson {
    pub calculation: CalculationJson,
    pub reactions: Vec<ReactionInfo>,
}

/// Estado del carrito: borrador actual (si existe) y numero de reacciones.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartSummary {
    pub draft_id: Option<Uuid>,
    pub count: i64,
}
