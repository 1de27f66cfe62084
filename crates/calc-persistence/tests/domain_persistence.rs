use calc_domain::{CalcError, CalculationFilter, CalculationPatch, CalculationRepository, CalculationStatus, DomainStubs,
                  ReactionCatalog, UserDirectory, SAMPLE_CREATOR_ID, SAMPLE_MODERATOR_ID};
use calc_persistence::new_from_env;
use chrono::{Duration, Utc};
use uuid::Uuid;
#[test]
fn diesel_calculation_lifecycle() {
  // Base SQLite temporal en archivo para no depender de URIs en memoria.
  let tmp_path = std::env::temp_dir().join(format!("masscalc_test_{}.db", Uuid::new_v4()));
  let db_url = tmp_path.to_str().unwrap().to_string();
  std::env::set_var("MASSCALC_DB_URL", &db_url);
  // Con la feature `pg` este test (solo SQLite) se omite en tiempo de ejecucion.
  if cfg!(feature = "pg") {
    eprintln!("skipping sqlite-only persistence test because 'pg' feature is enabled");
    return;
  }
  let repo = new_from_env().expect("failed to create repo");
  for r in DomainStubs::sample_reactions() {
    repo.seed_reaction(&r).expect("seed reaction");
  }
  for u in DomainStubs::sample_users() {
    repo.seed_user(&u).expect("seed user");
  }
  assert_eq!(repo.get_user(&SAMPLE_MODERATOR_ID).expect("get user").map(|u| u.login), Some("moderador".to_string()));

  let (draft, created) = repo.get_or_create_draft(&SAMPLE_CREATOR_ID, Utc::now()).expect("draft");
  assert!(created);
  assert!(repo.add_association(&draft.id(), 1).expect("add 1"));
  assert!(repo.add_association(&draft.id(), 2).expect("add 2"));
  assert!(!repo.add_association(&draft.id(), 2).expect("add 2 again"));
  assert_eq!(repo.count_associations(&draft.id()).expect("count"), 2);

  let updated = repo.update_output_mass(&draft.id(), 2, 1000.0).expect("update mass").expect("row");
  assert_eq!(updated.output_mass, 1000.0);
  assert!(repo.update_output_mass(&draft.id(), 4, 5.0).expect("update missing").is_none());
  assert!(repo.add_association(&draft.id(), 3).expect("add 3"));
  assert!(repo.remove_association(&draft.id(), 3).expect("remove"));
  assert!(!repo.remove_association(&draft.id(), 3).expect("remove again"));

  let formed = draft.with_patch(&CalculationPatch { output_koef: Some(0.8) })
                    .and_then(|c| c.formed(Utc::now()))
                    .expect("form");
  repo.update_calculation(&formed, CalculationStatus::Draft).expect("persist formed");
  // un calculo formado ya no admite cambios en su carrito
  assert!(matches!(repo.add_association(&draft.id(), 4), Err(CalcError::InvalidState(_))));
  let stored = repo.get_calculation(&draft.id()).expect("get").expect("exists");
  assert_eq!(stored.status(), CalculationStatus::Formed);
  assert_eq!(stored.output_koef(), Some(0.8));
  assert!(stored.date_form().is_some());

  // Resultados: uno real y uno en cero (no cuenta como completado)
  assert!(repo.set_input_mass(&draft.id(), 2, 1000.0).expect("set input"));
  assert!(repo.set_input_mass(&draft.id(), 1, 0.0).expect("set zero"));
  assert!(!repo.set_input_mass(&draft.id(), 3, 1.0).expect("set missing"));
  assert_eq!(repo.count_completed(&draft.id()).expect("completed"), 1);

  let filter = CalculationFilter { created_from: Some(Utc::now() - Duration::days(1)),
                                   created_to: Some(Utc::now() + Duration::days(1)),
                                   status: Some(CalculationStatus::Formed),
                                   creator_id: None };
  let listed = repo.list_calculations(&filter).expect("list");
  assert_eq!(listed.len(), 1);
  let none = repo.list_calculations(&CalculationFilter { status: Some(CalculationStatus::Draft),
                                                         ..CalculationFilter::default() })
                 .expect("list drafts");
  assert!(none.is_empty());

  // Un nuevo borrador es posible una vez formado el anterior
  let (next, created) = repo.get_or_create_draft(&SAMPLE_CREATOR_ID, Utc::now()).expect("next draft");
  assert!(created);
  assert_ne!(next.id(), draft.id());

  assert!(repo.add_association(&next.id(), 1).expect("add to next"));
  assert_eq!(repo.discard_draft(&next.deleted().expect("deleted")).expect("discard"), 1);
  assert_eq!(repo.count_associations(&next.id()).expect("count next"), 0);
  // el calculo formado conserva sus reacciones
  assert_eq!(repo.count_associations(&draft.id()).expect("count formed"), 2);

  match repo.get_reaction(42) {
    Err(CalcError::NotFound(_)) => {}
    other => panic!("expected NotFound for unknown reaction, got: {:?}", other),
  }
  let _ = std::fs::remove_file(tmp_path);
}
