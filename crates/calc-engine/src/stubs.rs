// Archivo: stubs.rs
// Propósito: sinks de envio para pruebas, demos y wiring rapido.
//
// `RecordingDispatchSink` guarda los payloads en memoria,
// `FailingDispatchSink` siempre falla y `LocalComputeSink` aplica la
// formula de masa localmente y devuelve el resultado por el callback.
use crate::callback::{CallbackResult, ComputeCallback};
use crate::dispatch::{DispatchPayload, DispatchSink};
use crate::engine::MassCalcEngine;
use crate::errors::DispatchError;
use async_trait::async_trait;
use calc_domain::{calculate_mass, CalculationRepository};
use log::warn;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Sink que guarda en memoria cada payload recibido.
///
/// Con `with_delay` cada envio espera antes de registrarse (util para
/// probar timeouts y el vaciado en el apagado).
#[derive(Debug, Default)]
pub struct RecordingDispatchSink {
    received: Mutex<Vec<DispatchPayload>>,
    delay: Option<Duration>,
}

impl RecordingDispatchSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_delay(delay: Duration) -> Self {
        Self { received: Mutex::new(Vec::new()), delay: Some(delay) }
    }

    /// Copia de los payloads recibidos, en orden de llegada.
    pub fn received(&self) -> Vec<DispatchPayload> {
        self.received.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

#[async_trait]
impl DispatchSink for RecordingDispatchSink {
    async fn submit(&self, payload: &DispatchPayload) -> Result<(), DispatchError> {
        if let Some(d) = self.delay {
            tokio::time::sleep(d).await;
        }
        self.received
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(payload.clone());
        Ok(())
    }
}

/// Sink que siempre responde con el error configurado.
#[derive(Debug, Clone)]
pub struct FailingDispatchSink {
    error: DispatchError,
}

impl FailingDispatchSink {
    pub fn new(error: DispatchError) -> Self {
        Self { error }
    }
}

#[async_trait]
impl DispatchSink for FailingDispatchSink {
    async fn submit(&self, _payload: &DispatchPayload) -> Result<(), DispatchError> {
        Err(self.error.clone())
    }
}

/// Servicio de computo local: calcula `input_mass` para cada reaccion del
/// payload y lo entrega al motor por el mismo camino que un callback HTTP.
pub struct LocalComputeSink<R>
    where R: CalculationRepository
{
    engine: Arc<MassCalcEngine<R>>,
    token: String,
}

impl<R> LocalComputeSink<R> where R: CalculationRepository
{
    pub fn new(engine: Arc<MassCalcEngine<R>>, token: &str) -> Self {
        Self { engine, token: token.to_string() }
    }

    /// Aplica la formula a cada reaccion; las que fallan se omiten.
    pub fn compute(payload: &DispatchPayload) -> Vec<CallbackResult> {
        let mut results = Vec::with_capacity(payload.reactions.len());
        for r in &payload.reactions {
            match calculate_mass(r.output_mass, r.conversion_factor, r.output_koef) {
                Ok(input_mass) => results.push(CallbackResult { reaction_id: r.id, input_mass }),
                Err(e) => warn!("computo local: reaccion {} omitida: {}", r.id, e),
            }
        }
        results
    }
}

#[async_trait]
impl<R> DispatchSink for LocalComputeSink<R> where R: CalculationRepository + 'static
{
    async fn submit(&self, payload: &DispatchPayload) -> Result<(), DispatchError> {
        let callback = ComputeCallback { calculation_id: payload.calculation_id,
                                         results: Self::compute(payload),
                                         token: self.token.clone() };
        // La ingesta escribe en el repositorio de forma sincrona
        let engine = self.engine.clone();
        tokio::task::spawn_blocking(move || engine.ingest_callback(&callback))
            .await
            .map_err(|e| DispatchError::Http(format!("callback local interrumpido: {}", e)))?
            .map(|_| ())
            .map_err(|e| DispatchError::Http(format!("callback local: {}", e)))
    }
}
