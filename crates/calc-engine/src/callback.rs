// Archivo: callback.rs
// Propósito: contrato del callback del servicio de computo y verificacion
// de su secreto compartido. Esta frontera no pasa por el proveedor de
// identidad.
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

/// Resultado de una reaccion reportado por el servicio de computo.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallbackResult {
    pub reaction_id: i64,
    pub input_mass: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComputeCallback {
    pub calculation_id: Uuid,
    pub results: Vec<CallbackResult>,
    pub token: String,
}

/// Resumen de la ingesta de un callback.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallbackReport {
    pub calculation_id: Uuid,
    pub updated: usize,
    pub skipped: usize,
    /// `None` si el conteo fallo despues de escribir el lote.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_count: Option<i64>,
}

/// Verificador del secreto compartido. Compara digests SHA-256 para no
/// depender de la longitud del token recibido.
#[derive(Clone)]
pub struct CallbackVerifier {
    expected: Option<[u8; 32]>,
}

impl CallbackVerifier {
    /// Un secreto vacio rechaza todos los callbacks.
    pub fn new(secret: &str) -> Self {
        let secret = secret.trim();
        let expected = if secret.is_empty() { None } else { Some(digest(secret)) };
        Self { expected }
    }

    pub fn verify(&self, token: &str) -> bool {
        match &self.expected {
            Some(expected) => {
                let got = digest(token.trim());
                // sin cortocircuito
                got.iter().zip(expected.iter()).fold(0u8, |acc, (a, b)| acc | (a ^ b)) == 0
            }
            None => false,
        }
    }
}

impl std::fmt::Debug for CallbackVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallbackVerifier").field("configured", &self.expected.is_some()).finish()
    }
}

fn digest(s: &str) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(s.as_bytes());
    let mut out = [0u8; 32];
    out.copy_from_slice(&hasher.finalize());
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verifies_only_the_configured_secret() {
        let v = CallbackVerifier::new("s3cr3t");
        assert!(v.verify("s3cr3t"));
        assert!(!v.verify("s3cr3"));
        assert!(!v.verify(""));
        assert!(!CallbackVerifier::new("  ").verify(""));
    }

    #[test]
    fn callback_json_shape() {
        let raw = r#"{"calculation_id":"6f1d2c3a-0000-4000-8000-000000000001",
                      "results":[{"reaction_id":2,"input_mass":1000.0}],
                      "token":"t"}"#;
        let cb: ComputeCallback = serde_json::from_str(raw).expect("json");
        assert_eq!(cb.results.len(), 1);
        assert_eq!(cb.results[0].reaction_id, 2);
    }
}
