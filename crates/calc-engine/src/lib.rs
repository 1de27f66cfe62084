//! Crate `calc-engine`: motor del ciclo de vida de calculos de masa
//!
//! Expone `MassCalcEngine` (carrito, asociaciones, maquina de estados,
//! listados y callback), la cola de envio al servicio de computo externo
//! (`dispatch`) y `CalculationService`, la capa que resuelve credenciales y
//! devuelve vistas JSON.
//!
//! Diseño resumido:
//! - Sin estado en memoria: todo pasa por `CalculationRepository`.
//! - Envio "fire-and-forget" explicito: cola acotada + worker con timeout,
//!   contadores observables y vaciado al apagar.
//! - El callback se autentica con un secreto compartido propio
//!   (`CallbackVerifier`), no con el proveedor de identidad.
//!
//! Ejemplo rápido:
//! ```rust
//! use calc_domain::{Caller, DomainStubs, Principal, SAMPLE_CREATOR_ID};
//! use calc_engine::{dispatch, CallbackVerifier, MassCalcEngine};
//! use std::sync::Arc;
//! let repo = Arc::new(DomainStubs::sample_repo().unwrap());
//! let (queue, _rx) = dispatch::channel(8);
//! let engine = MassCalcEngine::new(repo.clone(), repo, queue, CallbackVerifier::new("secreto"));
//! let caller = Caller::from(Principal::user(SAMPLE_CREATOR_ID));
//! let (draft, created) = engine.add_to_cart(&caller, 2).unwrap();
//! assert!(created);
//! assert_eq!(engine.cart_count(&caller).unwrap(), 1);
//! # let _ = draft;
//! ```
pub mod access;
pub mod callback;
pub mod config;
pub mod dispatch;
pub mod engine;
pub mod errors;
pub mod service;
pub mod stubs;
pub mod views;

pub use callback::{CallbackReport, CallbackResult, CallbackVerifier, ComputeCallback};
pub use config::EngineConfig;
pub use dispatch::{DispatchHandle, DispatchPayload, DispatchQueue, DispatchReaction, DispatchSink, DispatchStatsSnapshot,
                   DispatchWorker, HttpDispatchSink};
pub use engine::{ListFilter, MassCalcEngine};
pub use errors::DispatchError;
pub use service::{parse_id, CalculationService};
pub use stubs::{FailingDispatchSink, LocalComputeSink, RecordingDispatchSink};
pub use views::{CalculationDetail, CalculationDetailJson, CalculationJson, CartSummary, ReactionInfo};
