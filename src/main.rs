use std::error::Error;
use std::io::{self, Write};
use std::sync::Arc;

use calc_domain::{CalculationPatch, DomainStubs, Principal, StaticIdentityProvider, User};
use calc_engine::dispatch;
use calc_engine::{parse_id, CalculationService, CallbackVerifier, DispatchSink, DispatchWorker, EngineConfig,
                  HttpDispatchSink, LocalComputeSink, MassCalcEngine};
use log::{info, LevelFilter};
use simplelog::{ColorChoice, Config, TermLogger, TerminalMode};

/// Menú interactivo para calculos de masa usando el repositorio de
/// `calc-persistence`.
///
/// Opciones soportadas:
/// 1) Ver catalogo de reacciones
/// 2) Agregar reaccion al carrito
/// 3) Ver carrito
/// 4) Cambiar output_koef
/// 5) Formar
/// 6) Eliminar
/// 7) Moderar
/// 8) Listar calculos
/// 9) Ver detalle
/// 10) Cambiar de usuario
/// 0) Salir
fn main() -> Result<(), Box<dyn Error>> {
    dotenvy::dotenv().ok();
    init_logger();

    let cfg = EngineConfig::from_env()?;
    // Inicializar repo (aplica migraciones embebidas) y datos de ejemplo
    let repo = Arc::new(calc_persistence::new_from_env()?);
    for r in DomainStubs::sample_reactions() {
        repo.seed_reaction(&r)?;
    }
    let users = DomainStubs::sample_users();
    for u in &users {
        repo.seed_user(u)?;
    }

    let runtime = tokio::runtime::Runtime::new()?;
    let (queue, rx) = dispatch::channel(cfg.dispatch_queue_capacity);
    let engine = Arc::new(MassCalcEngine::new(repo.clone(), repo.clone(), queue, CallbackVerifier::new(&cfg.callback_token)));
    let local = std::env::var("MASSCALC_LOCAL_COMPUTE").map(|v| v.trim() == "1").unwrap_or(false);
    let sink: Arc<dyn DispatchSink> = if local {
        info!("computo local habilitado");
        Arc::new(LocalComputeSink::new(engine.clone(), &cfg.callback_token))
    } else {
        info!("envios a {}", cfg.compute_url);
        Arc::new(HttpDispatchSink::new(&cfg.compute_url, cfg.dispatch_timeout())?)
    };
    let handle = {
        let _guard = runtime.enter();
        DispatchWorker::spawn(rx, sink, cfg.dispatch_timeout())
    };

    let service = CalculationService::new(engine, Arc::new(identity_for(&users)), repo.clone());
    let mut credential = login(&users)?;

    loop {
        println!("\n== Mass calc menu ({}) ==", credential.as_deref().unwrap_or("anonimo"));
        println!("1) Ver catalogo de reacciones");
        println!("2) Agregar reaccion al carrito");
        println!("3) Ver carrito");
        println!("4) Cambiar output_koef");
        println!("5) Formar calculo");
        println!("6) Eliminar calculo");
        println!("7) Moderar calculo");
        println!("8) Listar calculos");
        println!("9) Ver detalle de un calculo");
        println!("10) Cambiar de usuario");
        println!("0) Salir");
        let choice = prompt("Elige una opción: ")?;
        let cred = credential.as_deref();
        match choice.trim() {
            "1" => match service.reactions() {
                Ok(list) => {
                    println!("\nID | FACTOR | FORMULA | TITULO");
                    println!("-----------------------------------------------------------");
                    for r in list {
                        println!("{} | {} | {} | {}", r.id, r.conversion_factor, r.formula, r.title);
                    }
                }
                Err(e) => eprintln!("Error listando reacciones: {}", e),
            },
            "2" => {
                let id_s = prompt("Id de reaccion: ")?;
                let reaction_id: i64 = match id_s.trim().parse() {
                    Ok(n) => n,
                    Err(_) => {
                        eprintln!("Id inválido");
                        continue;
                    }
                };
                match service.add_to_cart(cred, reaction_id) {
                    Ok(c) => println!("Reaccion agregada al borrador {}", c.id),
                    Err(e) => eprintln!("Error agregando reaccion: {}", e),
                }
            }
            "3" => match service.cart(cred) {
                Ok(summary) => match summary.draft_id {
                    Some(id) => {
                        println!("Borrador {} con {} reacciones", id, summary.count);
                        show(service.get_calculation(cred, &id));
                    }
                    None => println!("Carrito vacío"),
                },
                Err(e) => eprintln!("Error leyendo carrito: {}", e),
            },
            "4" => {
                let Some(id) = ask_id()? else { continue };
                let koef_s = prompt("output_koef (0, 1]: ")?;
                let koef: f64 = match koef_s.trim().parse() {
                    Ok(k) => k,
                    Err(_) => {
                        eprintln!("Número inválido");
                        continue;
                    }
                };
                show(service.change(cred, &id, &CalculationPatch { output_koef: Some(koef) }));
            }
            "5" => {
                let Some(id) = ask_id()? else { continue };
                show(service.form(cred, &id));
            }
            "6" => {
                let Some(id) = ask_id()? else { continue };
                let confirm = prompt(&format!("Confirma borrado de {}? escribir 'yes' para confirmar: ", id))?;
                if confirm.trim().to_lowercase() == "yes" {
                    show(service.delete(cred, &id));
                } else {
                    println!("Borrado cancelado");
                }
            }
            "7" => {
                let Some(id) = ask_id()? else { continue };
                let decision = prompt("Decision (completed/rejected): ")?;
                show(service.moderate(cred, &id, &decision));
            }
            "8" => {
                let from = prompt("Desde (AAAA-MM-DD, enter para ninguno): ")?;
                let to = prompt("Hasta (AAAA-MM-DD, enter para ninguno): ")?;
                let status = prompt("Estado (enter para todos): ")?;
                show(service.list(cred, Some(&from), Some(&to), Some(&status)));
            }
            "9" => {
                let Some(id) = ask_id()? else { continue };
                show(service.get_calculation(cred, &id));
            }
            "10" => {
                credential = login(&users)?;
            }
            "0" => {
                println!("Saliendo...");
                break;
            }
            other => {
                println!("Opción inválida: {}", other);
            }
        }
    }

    let stats = runtime.block_on(handle.shutdown());
    println!("Envios: {} encolados, {} enviados, {} fallidos, {} descartados",
             stats.enqueued, stats.submitted, stats.failed, stats.dropped);
    Ok(())
}

/// Nivel desde `MASSCALC_LOG` (por defecto `info`).
fn init_logger() {
    let level = std::env::var("MASSCALC_LOG").ok()
                                             .and_then(|l| l.trim().parse::<LevelFilter>().ok())
                                             .unwrap_or(LevelFilter::Info);
    if TermLogger::init(level, Config::default(), TerminalMode::Mixed, ColorChoice::Auto).is_err() {
        eprintln!("logger ya inicializado");
    }
}

/// Cada usuario de ejemplo entra con su login como token.
fn identity_for(users: &[User]) -> StaticIdentityProvider {
    users.iter().fold(StaticIdentityProvider::new(), |p, u| {
                    let principal = if u.is_moderator { Principal::moderator(u.id) } else { Principal::user(u.id) };
                    p.with_token(&u.login, principal)
                })
}

fn login(users: &[User]) -> io::Result<Option<String>> {
    let logins: Vec<&str> = users.iter().map(|u| u.login.as_str()).collect();
    let token = prompt(&format!("Token de acceso ({}; enter para anonimo): ", logins.join(", ")))?;
    let token = token.trim();
    Ok(if token.is_empty() { None } else { Some(token.to_string()) })
}

fn ask_id() -> io::Result<Option<uuid::Uuid>> {
    let raw = prompt("Id de calculo (UUID): ")?;
    match parse_id(&raw) {
        Ok(id) => Ok(Some(id)),
        Err(e) => {
            eprintln!("{}", e);
            Ok(None)
        }
    }
}

fn show<T: serde::Serialize, E: std::fmt::Display>(res: Result<T, E>) {
    match res {
        Ok(v) => match serde_json::to_string_pretty(&v) {
            Ok(s) => println!("{}", s),
            Err(e) => eprintln!("Error serializando: {}", e),
        },
        Err(e) => eprintln!("Error: {}", e),
    }
}

fn prompt(msg: &str) -> io::Result<String> {
    print!("{}", msg);
    io::stdout().flush()?;
    let mut s = String::new();
    io::stdin().read_line(&mut s)?;
    Ok(s)
}
