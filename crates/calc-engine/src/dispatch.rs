// Archivo: dispatch.rs
// Propósito: entrega asincrona de calculos completados al servicio de
// computo externo. `moderate` deja el payload en una cola acotada y un
// worker en segundo plano lo envia al `DispatchSink` con un timeout fijo.
//
// El envio es "at-most-once": no hay reintentos. Los fallos se registran y
// se cuentan en `DispatchStats`.
use crate::errors::DispatchError;
use async_trait::async_trait;
use log::{error, info, warn};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use uuid::Uuid;

/// Reaccion dentro del payload enviado al servicio de computo.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DispatchReaction {
    pub id: i64,
    pub conversion_factor: f64,
    pub output_mass: f64,
    pub output_koef: f64,
}

/// Payload de un calculo completado.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DispatchPayload {
    pub calculation_id: Uuid,
    pub reactions: Vec<DispatchReaction>,
}

/// Destino de los payloads. Implementaciones: HTTP, grabadora en memoria
/// y computo local.
#[async_trait]
pub trait DispatchSink: Send + Sync {
    async fn submit(&self, payload: &DispatchPayload) -> Result<(), DispatchError>;
}

/// Contadores compartidos entre la cola y el worker.
#[derive(Debug, Default)]
pub struct DispatchStats {
    enqueued: AtomicU64,
    dropped: AtomicU64,
    submitted: AtomicU64,
    failed: AtomicU64,
}

/// Copia puntual de `DispatchStats`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchStatsSnapshot {
    pub enqueued: u64,
    pub dropped: u64,
    pub submitted: u64,
    pub failed: u64,
}

impl DispatchStats {
    pub fn snapshot(&self) -> DispatchStatsSnapshot {
        DispatchStatsSnapshot { enqueued: self.enqueued.load(Ordering::Relaxed),
                                dropped: self.dropped.load(Ordering::Relaxed),
                                submitted: self.submitted.load(Ordering::Relaxed),
                                failed: self.failed.load(Ordering::Relaxed) }
    }
}

/// Extremo productor de la cola. Clonable; nunca bloquea.
#[derive(Clone)]
pub struct DispatchQueue {
    tx: mpsc::Sender<DispatchPayload>,
    stats: Arc<DispatchStats>,
}

/// Extremo consumidor; se entrega a `DispatchWorker::spawn`.
pub struct DispatchReceiver {
    rx: mpsc::Receiver<DispatchPayload>,
    stats: Arc<DispatchStats>,
}

/// Crea la cola acotada. `capacity` debe ser mayor que cero.
pub fn channel(capacity: usize) -> (DispatchQueue, DispatchReceiver) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    let stats = Arc::new(DispatchStats::default());
    (DispatchQueue { tx, stats: stats.clone() }, DispatchReceiver { rx, stats })
}

impl DispatchQueue {
    /// Intenta encolar el payload. Devuelve `false` si la cola esta llena o
    /// cerrada; el payload se descarta y se registra.
    pub fn enqueue(&self, payload: DispatchPayload) -> bool {
        match self.tx.try_send(payload) {
            Ok(()) => {
                self.stats.enqueued.fetch_add(1, Ordering::Relaxed);
                true
            }
            Err(TrySendError::Full(p)) => {
                self.stats.dropped.fetch_add(1, Ordering::Relaxed);
                warn!("cola de envio llena; se descarta el calculo {}", p.calculation_id);
                false
            }
            Err(TrySendError::Closed(p)) => {
                self.stats.dropped.fetch_add(1, Ordering::Relaxed);
                warn!("cola de envio cerrada; se descarta el calculo {}", p.calculation_id);
                false
            }
        }
    }

    pub fn stats(&self) -> DispatchStatsSnapshot {
        self.stats.snapshot()
    }
}

pub struct DispatchWorker;

impl DispatchWorker {
    /// Lanza el worker en el runtime tokio actual.
    pub fn spawn(receiver: DispatchReceiver, sink: Arc<dyn DispatchSink>, timeout: Duration) -> DispatchHandle {
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let stats = receiver.stats.clone();
        let join = tokio::spawn(run(receiver, sink, timeout, shutdown_rx));
        DispatchHandle { shutdown: Some(shutdown_tx), join, stats }
    }
}

async fn run(receiver: DispatchReceiver,
             sink: Arc<dyn DispatchSink>,
             timeout: Duration,
             mut shutdown: oneshot::Receiver<()>) {
    let DispatchReceiver { mut rx, stats } = receiver;
    info!("worker de envio iniciado (timeout {:?})", timeout);
    loop {
        tokio::select! {
            biased;
            maybe = rx.recv() => {
                match maybe {
                    Some(payload) => submit_one(sink.as_ref(), payload, timeout, &stats).await,
                    None => break,
                }
            }
            // Senal explicita o handle descartado
            _ = &mut shutdown => {
                rx.close();
                while let Some(payload) = rx.recv().await {
                    submit_one(sink.as_ref(), payload, timeout, &stats).await;
                }
                break;
            }
        }
    }
    info!("worker de envio detenido: {:?}", stats.snapshot());
}

async fn submit_one(sink: &dyn DispatchSink, payload: DispatchPayload, timeout: Duration, stats: &DispatchStats) {
    match tokio::time::timeout(timeout, sink.submit(&payload)).await {
        Ok(Ok(())) => {
            stats.submitted.fetch_add(1, Ordering::Relaxed);
            info!("calculo {} enviado ({} reacciones)", payload.calculation_id, payload.reactions.len());
        }
        Ok(Err(e)) => {
            stats.failed.fetch_add(1, Ordering::Relaxed);
            error!("fallo el envio del calculo {}: {}", payload.calculation_id, e);
        }
        Err(_) => {
            stats.failed.fetch_add(1, Ordering::Relaxed);
            error!("fallo el envio del calculo {}: {}", payload.calculation_id, DispatchError::Timeout);
        }
    }
}

/// Control del worker lanzado.
pub struct DispatchHandle {
    shutdown: Option<oneshot::Sender<()>>,
    join: JoinHandle<()>,
    stats: Arc<DispatchStats>,
}

impl DispatchHandle {
    pub fn stats(&self) -> DispatchStatsSnapshot {
        self.stats.snapshot()
    }

    /// Cierra la cola, espera a que el worker vacie lo pendiente y devuelve
    /// los contadores finales.
    pub async fn shutdown(mut self) -> DispatchStatsSnapshot {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        if let Err(e) = self.join.await {
            error!("el worker de envio termino con error: {}", e);
        }
        self.stats.snapshot()
    }
}

/// Sink HTTP: POST JSON al endpoint del servicio de computo.
pub struct HttpDispatchSink {
    client: reqwest::Client,
    url: String,
}

impl HttpDispatchSink {
    pub fn new(url: &str, timeout: Duration) -> Result<Self, DispatchError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client, url: url.to_string() })
    }
}

#[async_trait]
impl DispatchSink for HttpDispatchSink {
    async fn submit(&self, payload: &DispatchPayload) -> Result<(), DispatchError> {
        let resp = self.client.post(&self.url).json(payload).send().await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(DispatchError::Status(status.as_u16()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payload() -> DispatchPayload {
        DispatchPayload { calculation_id: Uuid::new_v4(),
                          reactions: vec![DispatchReaction { id: 2,
                                                             conversion_factor: 1.25,
                                                             output_mass: 1000.0,
                                                             output_koef: 0.8 }] }
    }

    #[test]
    fn full_queue_drops_without_blocking() {
        let (queue, _rx) = channel(1);
        assert!(queue.enqueue(payload()));
        assert!(!queue.enqueue(payload()));
        let stats = queue.stats();
        assert_eq!(stats.enqueued, 1);
        assert_eq!(stats.dropped, 1);
    }

    #[test]
    fn closed_queue_drops() {
        let (queue, rx) = channel(4);
        drop(rx);
        assert!(!queue.enqueue(payload()));
        assert_eq!(queue.stats().dropped, 1);
    }

    #[test]
    fn payload_is_snake_case_json() {
        let json = serde_json::to_value(payload()).expect("json");
        assert_eq!(json["reactions"][0]["conversion_factor"], 1.25);
        assert_eq!(json["reactions"][0]["output_koef"], 0.8);
        assert!(json.get("calculation_id").is_some());
    }
}
