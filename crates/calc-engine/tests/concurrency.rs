mod common;

use calc_domain::{CalcError, CalculationFilter, CalculationPatch, CalculationRepository, CalculationStatus, Caller,
                  Principal, SAMPLE_CREATOR_ID, SAMPLE_MODERATOR_ID};
use calc_engine::dispatch::{self, DispatchReceiver};
use calc_engine::{CallbackVerifier, MassCalcEngine};
use common::ScriptedRepo;
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;
use uuid::Uuid;

fn build(repo: ScriptedRepo) -> (Arc<ScriptedRepo>, MassCalcEngine<ScriptedRepo>, DispatchReceiver) {
  let repo = Arc::new(repo);
  let (queue, rx) = dispatch::channel(16);
  let engine = MassCalcEngine::new(repo.clone(), repo.inner.clone(), queue, CallbackVerifier::new("secreto"));
  (repo, engine, rx)
}

fn alice() -> Caller {
  Caller::from(Principal::user(SAMPLE_CREATOR_ID))
}

fn moderator() -> Caller {
  Caller::from(Principal::moderator(SAMPLE_MODERATOR_ID))
}

fn formed(engine: &MassCalcEngine<ScriptedRepo>) -> Result<Uuid, CalcError> {
  let (draft, _) = engine.add_to_cart(&alice(), 1)?;
  engine.change(&alice(), &draft.id(), &CalculationPatch { output_koef: Some(0.8) })?;
  engine.form(&alice(), &draft.id())?;
  Ok(draft.id())
}

#[test]
fn moderation_and_deletion_race_has_one_winner() -> Result<(), CalcError> {
  // la demora tras cada lectura deja a ambos hilos con `formed` en mano
  let (repo, engine, _rx) = build(ScriptedRepo::sample().with_read_delay(Duration::from_millis(5)));
  for round in 0..4 {
    let id = formed(&engine)?;
    let before = engine.dispatch_stats().enqueued;
    let barrier = Barrier::new(2);
    let (moderated, deleted) = thread::scope(|s| {
      let m = s.spawn(|| {
        barrier.wait();
        engine.moderate(&moderator(), &id, CalculationStatus::Completed)
      });
      let d = s.spawn(|| {
        barrier.wait();
        engine.delete(&alice(), &id)
      });
      (m.join().expect("moderate"), d.join().expect("delete"))
    });

    assert!(moderated.is_ok() != deleted.is_ok(), "ronda {}: {:?} / {:?}", round, moderated, deleted);
    let stored = repo.inner.get_calculation(&id)?.map(|c| c.status());
    let enqueued = engine.dispatch_stats().enqueued - before;
    match (moderated, deleted) {
      (Ok(done), Err(e)) => {
        assert!(matches!(e, CalcError::InvalidState(_)), "ronda {}: {:?}", round, e);
        assert_eq!(done.status(), CalculationStatus::Completed);
        assert_eq!(stored, Some(CalculationStatus::Completed));
        assert_eq!(enqueued, 1);
      }
      (Err(e), Ok(gone)) => {
        assert!(matches!(e, CalcError::InvalidState(_)), "ronda {}: {:?}", round, e);
        assert_eq!(gone.status(), CalculationStatus::Deleted);
        assert_eq!(stored, Some(CalculationStatus::Deleted));
        assert_eq!(enqueued, 0);
      }
      other => panic!("ronda {}: resultado inesperado {:?}", round, other),
    }
  }
  Ok(())
}

#[test]
fn concurrent_first_adds_share_one_draft() -> Result<(), CalcError> {
  let (repo, engine, _rx) = build(ScriptedRepo::sample().with_read_delay(Duration::from_millis(2)));
  let barrier = Barrier::new(8);
  let results: Vec<_> = thread::scope(|s| {
    let handles: Vec<_> = (0..8i64).map(|i| {
                                      let (engine, barrier) = (&engine, &barrier);
                                      s.spawn(move || {
                                        barrier.wait();
                                        engine.add_to_cart(&alice(), i % 4 + 1)
                                      })
                                    })
                                    .collect();
    handles.into_iter().map(|h| h.join().expect("add_to_cart")).collect()
  });

  let mut drafts = Vec::new();
  for r in results {
    drafts.push(r?);
  }
  assert_eq!(drafts.iter().filter(|(_, created)| *created).count(), 1);
  let id = drafts[0].0.id();
  assert!(drafts.iter().all(|(d, _)| d.id() == id));

  let filter = CalculationFilter { status: Some(CalculationStatus::Draft),
                                   creator_id: Some(SAMPLE_CREATOR_ID),
                                   ..CalculationFilter::default() };
  assert_eq!(repo.inner.list_calculations(&filter)?.len(), 1);
  assert_eq!(engine.cart_count(&alice())?, 4);
  Ok(())
}

#[test]
fn association_edits_lose_to_a_concurrent_form() -> Result<(), CalcError> {
  let (repo, engine, _rx) = build(ScriptedRepo::sample().with_read_delay(Duration::from_millis(5)));
  let (draft, _) = engine.add_to_cart(&alice(), 1)?;
  engine.change(&alice(), &draft.id(), &CalculationPatch { output_koef: Some(0.8) })?;
  let barrier = Barrier::new(2);
  let (added, formed) = thread::scope(|s| {
    let a = s.spawn(|| {
      barrier.wait();
      engine.add_reaction(&alice(), &draft.id(), 2)
    });
    let f = s.spawn(|| {
      barrier.wait();
      engine.form(&alice(), &draft.id())
    });
    (a.join().expect("add_reaction"), f.join().expect("form"))
  });

  formed?;
  // la reaccion entra antes de formar o se rechaza
  let rows = repo.inner.count_associations(&draft.id())?;
  match added {
    Ok(true) => assert_eq!(rows, 2),
    Err(CalcError::InvalidState(_)) => assert_eq!(rows, 1),
    other => panic!("resultado inesperado {:?}", other),
  }
  Ok(())
}
