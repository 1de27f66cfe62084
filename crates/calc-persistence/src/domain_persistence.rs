use crate::schema;
use crate::schema::calculations::dsl as calc_dsl;
use crate::schema::reaction_calculations::dsl as rc_dsl;
use crate::schema::reactions::dsl as reactions_dsl;
use crate::schema::users::dsl as users_dsl;
use calc_domain::{CalcError, Calculation, CalculationFilter, CalculationParts, CalculationRepository, CalculationStatus,
                  Reaction, ReactionCalculation, ReactionCatalog, User, UserDirectory};
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use diesel::r2d2::{ConnectionManager, Pool, PooledConnection};
use diesel::result::{DatabaseErrorKind, Error as DieselError};
use diesel_migrations::{embed_migrations, EmbeddedMigrations, MigrationHarness};
use log::{debug, warn};
use std::sync::Arc;
use uuid::Uuid;
pub const MIGRATIONS: EmbeddedMigrations = embed_migrations!("./migrations");
#[cfg(all(feature = "pg", not(test)))]
type DbConn = PgConnection;
#[cfg(any(test, not(feature = "pg")))]
type DbConn = SqliteConnection;
#[cfg(all(feature = "pg", not(test)))]
type DbBackend = diesel::pg::Pg;
#[cfg(any(test, not(feature = "pg")))]
type DbBackend = diesel::sqlite::Sqlite;
type DbPool = Pool<ConnectionManager<DbConn>>;
type PooledDb = PooledConnection<ConnectionManager<DbConn>>;
const DRAFT: &str = "draft";
/// `busy_timeout` es por conexion: se fija en cada conexion del pool.
#[cfg(any(test, not(feature = "pg")))]
#[derive(Debug)]
struct SqlitePragmas;
#[cfg(any(test, not(feature = "pg")))]
impl diesel::r2d2::CustomizeConnection<SqliteConnection, diesel::r2d2::Error> for SqlitePragmas {
  fn on_acquire(&self, conn: &mut SqliteConnection) -> Result<(), diesel::r2d2::Error> {
    diesel::sql_query("PRAGMA busy_timeout = 5000;").execute(conn)
                                                    .map_err(diesel::r2d2::Error::QueryError)?;
    Ok(())
  }
}
/// Resultado de una escritura condicionada a que el calculo sea borrador.
enum Guarded<T> {
  NotDraft,
  Done(T),
}
/// Repo Diesel que implementa `CalculationRepository`, `ReactionCatalog` y
/// `UserDirectory`.
pub struct DieselCalcRepository {
  pool: Arc<DbPool>,
}
impl DieselCalcRepository {
  pub fn new(database_url: &str) -> Result<Self, CalcError> {
    let manager = ConnectionManager::<DbConn>::new(database_url);
    let builder = DbPool::builder().max_size(4);
    #[cfg(any(test, not(feature = "pg")))]
    let builder = builder.connection_customizer(Box::new(SqlitePragmas));
    let pool = builder.build(manager)
                      .map_err(|e| CalcError::Internal(format!("no se pudo crear el pool de conexiones: {}", e)))?;
    let repo = DieselCalcRepository { pool: Arc::new(pool) };
    let mut c = repo.conn()?;
    #[cfg(any(test, not(feature = "pg")))]
    {
      let _ = diesel::sql_query("PRAGMA journal_mode = WAL;").execute(&mut c);
    }
    let applied = c.run_pending_migrations(MIGRATIONS)
                   .map_err(|e| CalcError::Internal(format!("migraciones: {}", e)))?;
    debug!("migraciones aplicadas: {}", applied.len());
    drop(c);
    Ok(repo)
  }
  fn conn(&self) -> Result<PooledDb, CalcError> {
    self.pool.get().map_err(|e| CalcError::Internal(format!("pool: {}", e)))
  }
  fn load_draft(conn: &mut PooledDb, creator: &str) -> Result<Option<CalculationRow>, CalcError> {
    map_db_err(calc_dsl::calculations.filter(calc_dsl::creator_id.eq(creator))
                                     .filter(calc_dsl::status.eq(CalculationStatus::Draft.as_str()))
                                     .first::<CalculationRow>(conn)
                                     .optional())
  }
  fn find_association(conn: &mut PooledDb, calc: &str, reaction: i64) -> QueryResult<Option<AssociationRow>> {
    rc_dsl::reaction_calculations.filter(rc_dsl::calculation_id.eq(calc))
                                 .filter(rc_dsl::reaction_id.eq(reaction))
                                 .first::<AssociationRow>(conn)
                                 .optional()
  }
  fn load_association(conn: &mut PooledDb, calc: &str, reaction: i64) -> Result<Option<AssociationRow>, CalcError> {
    map_db_err(Self::find_association(conn, calc, reaction))
  }
  /// Toma el lock de escritura de la fila si sigue en borrador (UPDATE
  /// sin cambios). Devuelve las filas afectadas: 0 si no es borrador.
  fn lock_draft(conn: &mut PooledDb, calc: &str) -> QueryResult<usize> {
    diesel::update(calc_dsl::calculations.filter(calc_dsl::id.eq(calc)).filter(calc_dsl::status.eq(DRAFT)))
      .set(calc_dsl::status.eq(DRAFT))
      .execute(conn)
  }
  /// Explica por que una escritura condicionada no afecto filas.
  fn status_mismatch(conn: &mut PooledDb, calc: &str, expected: CalculationStatus) -> CalcError {
    match calc_dsl::calculations.filter(calc_dsl::id.eq(calc))
                                .select(calc_dsl::status)
                                .first::<String>(conn)
                                .optional()
    {
      Ok(Some(current)) => {
        CalcError::InvalidState(format!("calculo {}: estado actual {}, se esperaba {}", calc, current, expected))
      }
      Ok(None) => CalcError::NotFound(format!("calculo {}", calc)),
      Err(e) => CalcError::Internal(format!("db: {}", e)),
    }
  }
  /// Inserta el borrador; si otra peticion gano la carrera (indice unico
  /// `one_draft_per_creator`), relee el ganador.
  fn insert_or_reload_draft(conn: &mut PooledDb, creator_id: &Uuid, now: DateTime<Utc>) -> Result<(Calculation, bool), CalcError> {
    let creator_s = creator_id.to_string();
    let draft = Calculation::new_draft(*creator_id, now);
    let row = CalculationRow::from_domain(&draft);
    match diesel::insert_into(calc_dsl::calculations).values(&row).execute(conn) {
      Ok(_) => Ok((draft, true)),
      Err(e) if is_unique_violation(&e) => {
        warn!("carrera al crear borrador para {}; se relee", creator_s);
        let row = Self::load_draft(conn, &creator_s)?
          .ok_or_else(|| CalcError::Internal(format!("borrador de {} no encontrado tras conflicto", creator_s)))?;
        Ok((row.into_domain()?, false))
      }
      Err(e) => Err(CalcError::Internal(format!("db: {}", e))),
    }
  }
  /// Inserta o reemplaza una reaccion del catalogo (datos de ejemplo).
  pub fn seed_reaction(&self, reaction: &Reaction) -> Result<(), CalcError> {
    let mut conn = self.conn()?;
    let row = ReactionRow { id: reaction.id,
                            title: reaction.title.clone(),
                            formula: reaction.formula.clone(),
                            conversion_factor: reaction.conversion_factor,
                            is_delete: reaction.is_delete };
    map_db_err(conn.transaction::<_, DieselError, _>(|c| {
                     diesel::delete(reactions_dsl::reactions.filter(reactions_dsl::id.eq(row.id))).execute(c)?;
                     diesel::insert_into(reactions_dsl::reactions).values(&row).execute(c)
                   }))?;
    Ok(())
  }
  /// Inserta o reemplaza un usuario del directorio (datos de ejemplo).
  pub fn seed_user(&self, user: &User) -> Result<(), CalcError> {
    let mut conn = self.conn()?;
    let row = UserRow { id: user.id.to_string(), login: user.login.clone(), is_moderator: user.is_moderator };
    map_db_err(conn.transaction::<_, DieselError, _>(|c| {
                     diesel::delete(users_dsl::users.filter(users_dsl::id.eq(&row.id))).execute(c)?;
                     diesel::insert_into(users_dsl::users).values(&row).execute(c)
                   }))?;
    Ok(())
  }
}
// Filas Diesel. Fechas en segundos epoch, ids como texto.
#[derive(Debug, Queryable, Insertable, AsChangeset)]
#[diesel(table_name = schema::calculations)]
#[diesel(treat_none_as_null = true)]
struct CalculationRow {
  pub id: String,
  pub status: String,
  pub output_koef: Option<f64>,
  pub date_create_ts: i64,
  pub date_form_ts: Option<i64>,
  pub date_finish_ts: Option<i64>,
  pub creator_id: String,
  pub moderator_id: Option<String>,
}
impl CalculationRow {
  fn from_domain(c: &Calculation) -> Self {
    let p = c.to_parts();
    Self { id: p.id.to_string(),
           status: p.status.as_str().to_string(),
           output_koef: p.output_koef,
           date_create_ts: p.date_create.timestamp(),
           date_form_ts: p.date_form.map(|d| d.timestamp()),
           date_finish_ts: p.date_finish.map(|d| d.timestamp()),
           creator_id: p.creator_id.to_string(),
           moderator_id: p.moderator_id.map(|m| m.to_string()) }
  }
  fn into_domain(self) -> Result<Calculation, CalcError> {
    let moderator_id = match self.moderator_id {
      Some(m) => Some(Uuid::parse_str(&m)?),
      None => None,
    };
    Ok(Calculation::from_parts(CalculationParts { id: Uuid::parse_str(&self.id)?,
                                                  status: self.status.parse()?,
                                                  output_koef: self.output_koef,
                                                  date_create: from_ts(self.date_create_ts)?,
                                                  date_form: self.date_form_ts.map(from_ts).transpose()?,
                                                  date_finish: self.date_finish_ts.map(from_ts).transpose()?,
                                                  creator_id: Uuid::parse_str(&self.creator_id)?,
                                                  moderator_id }))
  }
}
#[derive(Debug, Queryable, Insertable)]
#[diesel(table_name = schema::reaction_calculations)]
struct AssociationRow {
  pub id: String,
  pub reaction_id: i64,
  pub calculation_id: String,
  pub output_mass: f64,
  pub input_mass: Option<f64>,
}
impl AssociationRow {
  fn into_domain(self) -> Result<ReactionCalculation, CalcError> {
    Ok(ReactionCalculation { id: Uuid::parse_str(&self.id)?,
                             reaction_id: self.reaction_id,
                             calculation_id: Uuid::parse_str(&self.calculation_id)?,
                             output_mass: self.output_mass,
                             input_mass: self.input_mass })
  }
}
#[derive(Debug, Queryable, Insertable)]
#[diesel(table_name = schema::reactions)]
struct ReactionRow {
  pub id: i64,
  pub title: String,
  pub formula: String,
  pub conversion_factor: f64,
  pub is_delete: bool,
}
impl From<ReactionRow> for Reaction {
  fn from(r: ReactionRow) -> Self {
    Reaction { id: r.id, title: r.title, formula: r.formula, conversion_factor: r.conversion_factor, is_delete: r.is_delete }
  }
}
#[derive(Debug, Queryable, Insertable)]
#[diesel(table_name = schema::users)]
struct UserRow {
  pub id: String,
  pub login: String,
  pub is_moderator: bool,
}
fn from_ts(secs: i64) -> Result<DateTime<Utc>, CalcError> {
  DateTime::<Utc>::from_timestamp(secs, 0).ok_or_else(|| CalcError::Internal(format!("timestamp fuera de rango: {}", secs)))
}
fn map_db_err<T>(res: std::result::Result<T, DieselError>) -> Result<T, CalcError> {
  res.map_err(|e| CalcError::Internal(format!("db: {}", e)))
}
fn is_unique_violation(e: &DieselError) -> bool {
  matches!(e, DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, _))
}
impl CalculationRepository for DieselCalcRepository {
  fn get_or_create_draft(&self, creator_id: &Uuid, now: DateTime<Utc>) -> Result<(Calculation, bool), CalcError> {
    let mut conn = self.conn()?;
    let creator_s = creator_id.to_string();
    if let Some(row) = Self::load_draft(&mut conn, &creator_s)? {
      return Ok((row.into_domain()?, false));
    }
    Self::insert_or_reload_draft(&mut conn, creator_id, now)
  }
  fn find_draft(&self, creator_id: &Uuid) -> Result<Option<Calculation>, CalcError> {
    let mut conn = self.conn()?;
    Self::load_draft(&mut conn, &creator_id.to_string())?.map(CalculationRow::into_domain).transpose()
  }
  fn get_calculation(&self, id: &Uuid) -> Result<Option<Calculation>, CalcError> {
    let mut conn = self.conn()?;
    let opt = map_db_err(calc_dsl::calculations.filter(calc_dsl::id.eq(id.to_string()))
                                               .first::<CalculationRow>(&mut conn)
                                               .optional())?;
    opt.map(CalculationRow::into_domain).transpose()
  }
  fn update_calculation(&self, calculation: &Calculation, expected: CalculationStatus) -> Result<(), CalcError> {
    let mut conn = self.conn()?;
    let row = CalculationRow::from_domain(calculation);
    // UPDATE ... WHERE id = ? AND status = ?
    let n = map_db_err(diesel::update(calc_dsl::calculations.filter(calc_dsl::id.eq(&row.id))
                                                            .filter(calc_dsl::status.eq(expected.as_str())))
                       .set(&row)
                       .execute(&mut conn))?;
    if n == 0 {
      return Err(Self::status_mismatch(&mut conn, &row.id, expected));
    }
    Ok(())
  }
  fn discard_draft(&self, deleted: &Calculation) -> Result<usize, CalcError> {
    let mut conn = self.conn()?;
    let row = CalculationRow::from_domain(deleted);
    let res = conn.transaction::<_, DieselError, _>(|c| {
                    let n = diesel::update(calc_dsl::calculations.filter(calc_dsl::id.eq(&row.id))
                                                                 .filter(calc_dsl::status.eq(DRAFT)))
                            .set(&row)
                            .execute(c)?;
                    if n == 0 {
                      return Ok(Guarded::NotDraft);
                    }
                    let removed =
                      diesel::delete(rc_dsl::reaction_calculations.filter(rc_dsl::calculation_id.eq(&row.id))).execute(c)?;
                    Ok(Guarded::Done(removed))
                  });
    match map_db_err(res)? {
      Guarded::Done(removed) => Ok(removed),
      Guarded::NotDraft => Err(Self::status_mismatch(&mut conn, &row.id, CalculationStatus::Draft)),
    }
  }
  fn list_calculations(&self, filter: &CalculationFilter) -> Result<Vec<Calculation>, CalcError> {
    let mut conn = self.conn()?;
    let mut q = calc_dsl::calculations.into_boxed::<DbBackend>();
    if let Some(from) = filter.created_from {
      q = q.filter(calc_dsl::date_create_ts.ge(from.timestamp()));
    }
    if let Some(to) = filter.created_to {
      q = q.filter(calc_dsl::date_create_ts.lt(to.timestamp()));
    }
    if let Some(s) = filter.status {
      q = q.filter(calc_dsl::status.eq(s.as_str()));
    }
    if let Some(c) = filter.creator_id {
      q = q.filter(calc_dsl::creator_id.eq(c.to_string()));
    }
    let rows = map_db_err(q.order(calc_dsl::date_create_ts.asc()).load::<CalculationRow>(&mut conn))?;
    rows.into_iter().map(CalculationRow::into_domain).collect()
  }
  fn add_association(&self, calculation_id: &Uuid, reaction_id: i64) -> Result<bool, CalcError> {
    let mut conn = self.conn()?;
    let calc_s = calculation_id.to_string();
    let fresh = ReactionCalculation::new(*calculation_id, reaction_id);
    let row = AssociationRow { id: fresh.id.to_string(),
                               reaction_id,
                               calculation_id: calc_s.clone(),
                               output_mass: fresh.output_mass,
                               input_mass: None };
    // El lock de la fila del borrador serializa la insercion con `form`
    let res = conn.transaction::<_, DieselError, _>(|c| {
                    if Self::lock_draft(c, &calc_s)? == 0 {
                      return Ok(Guarded::NotDraft);
                    }
                    if Self::find_association(c, &calc_s, reaction_id)?.is_some() {
                      return Ok(Guarded::Done(false));
                    }
                    diesel::insert_into(rc_dsl::reaction_calculations).values(&row).execute(c)?;
                    Ok(Guarded::Done(true))
                  });
    match res {
      Ok(Guarded::Done(added)) => Ok(added),
      Ok(Guarded::NotDraft) => Err(Self::status_mismatch(&mut conn, &calc_s, CalculationStatus::Draft)),
      Err(e) if is_unique_violation(&e) => Ok(false),
      Err(e) => Err(CalcError::Internal(format!("db: {}", e))),
    }
  }
  fn get_association(&self, calculation_id: &Uuid, reaction_id: i64) -> Result<Option<ReactionCalculation>, CalcError> {
    let mut conn = self.conn()?;
    Self::load_association(&mut conn, &calculation_id.to_string(), reaction_id)?.map(AssociationRow::into_domain)
                                                                                 .transpose()
  }
  fn list_associations(&self, calculation_id: &Uuid) -> Result<Vec<ReactionCalculation>, CalcError> {
    let mut conn = self.conn()?;
    let rows = map_db_err(rc_dsl::reaction_calculations.filter(rc_dsl::calculation_id.eq(calculation_id.to_string()))
                                                       .order(rc_dsl::reaction_id.asc())
                                                       .load::<AssociationRow>(&mut conn))?;
    rows.into_iter().map(AssociationRow::into_domain).collect()
  }
  fn remove_association(&self, calculation_id: &Uuid, reaction_id: i64) -> Result<bool, CalcError> {
    let mut conn = self.conn()?;
    let calc_s = calculation_id.to_string();
    let res = conn.transaction::<_, DieselError, _>(|c| {
                    if Self::lock_draft(c, &calc_s)? == 0 {
                      return Ok(Guarded::NotDraft);
                    }
                    let n = diesel::delete(rc_dsl::reaction_calculations.filter(rc_dsl::calculation_id.eq(&calc_s))
                                                                        .filter(rc_dsl::reaction_id.eq(reaction_id)))
                            .execute(c)?;
                    Ok(Guarded::Done(n > 0))
                  });
    match map_db_err(res)? {
      Guarded::Done(removed) => Ok(removed),
      Guarded::NotDraft => Err(Self::status_mismatch(&mut conn, &calc_s, CalculationStatus::Draft)),
    }
  }
  fn update_output_mass(&self,
                        calculation_id: &Uuid,
                        reaction_id: i64,
                        output_mass: f64)
                        -> Result<Option<ReactionCalculation>, CalcError> {
    let mut conn = self.conn()?;
    let calc_s = calculation_id.to_string();
    // Actualizacion y relectura en la misma transaccion
    let res = conn.transaction::<_, DieselError, _>(|c| {
                               if Self::lock_draft(c, &calc_s)? == 0 {
                                 return Ok(Guarded::NotDraft);
                               }
                               let n = diesel::update(rc_dsl::reaction_calculations.filter(rc_dsl::calculation_id.eq(&calc_s))
                                                                                   .filter(rc_dsl::reaction_id.eq(reaction_id)))
                                       .set(rc_dsl::output_mass.eq(output_mass))
                                       .execute(c)?;
                               if n == 0 {
                                 return Ok(Guarded::Done(None));
                               }
                               Ok(Guarded::Done(Self::find_association(c, &calc_s, reaction_id)?))
                             });
    match map_db_err(res)? {
      Guarded::Done(row) => row.map(AssociationRow::into_domain).transpose(),
      Guarded::NotDraft => Err(Self::status_mismatch(&mut conn, &calc_s, CalculationStatus::Draft)),
    }
  }
  fn set_input_mass(&self, calculation_id: &Uuid, reaction_id: i64, input_mass: f64) -> Result<bool, CalcError> {
    let mut conn = self.conn()?;
    let n = map_db_err(diesel::update(rc_dsl::reaction_calculations.filter(rc_dsl::calculation_id.eq(calculation_id.to_string()))
                                                                   .filter(rc_dsl::reaction_id.eq(reaction_id)))
                       .set(rc_dsl::input_mass.eq(Some(input_mass)))
                       .execute(&mut conn))?;
    Ok(n > 0)
  }
  fn count_associations(&self, calculation_id: &Uuid) -> Result<i64, CalcError> {
    let mut conn = self.conn()?;
    map_db_err(rc_dsl::reaction_calculations.filter(rc_dsl::calculation_id.eq(calculation_id.to_string()))
                                            .count()
                                            .get_result::<i64>(&mut conn))
  }
  fn count_completed(&self, calculation_id: &Uuid) -> Result<i64, CalcError> {
    let mut conn = self.conn()?;
    map_db_err(rc_dsl::reaction_calculations.filter(rc_dsl::calculation_id.eq(calculation_id.to_string()))
                                            .filter(rc_dsl::input_mass.is_not_null())
                                            .filter(rc_dsl::input_mass.ne(0.0))
                                            .count()
                                            .get_result::<i64>(&mut conn))
  }
}
impl ReactionCatalog for DieselCalcRepository {
  fn get_reaction(&self, id: i64) -> Result<Reaction, CalcError> {
    let mut conn = self.conn()?;
    let opt = map_db_err(reactions_dsl::reactions.filter(reactions_dsl::id.eq(id))
                                                 .filter(reactions_dsl::is_delete.eq(false))
                                                 .first::<ReactionRow>(&mut conn)
                                                 .optional())?;
    opt.map(Reaction::from).ok_or(CalcError::NotFound(format!("reaccion {}", id)))
  }
  fn list_reactions(&self) -> Result<Vec<Reaction>, CalcError> {
    let mut conn = self.conn()?;
    let rows = map_db_err(reactions_dsl::reactions.filter(reactions_dsl::is_delete.eq(false))
                                                  .order(reactions_dsl::id.asc())
                                                  .load::<ReactionRow>(&mut conn))?;
    Ok(rows.into_iter().map(Reaction::from).collect())
  }
}
impl UserDirectory for DieselCalcRepository {
  fn get_user(&self, id: &Uuid) -> Result<Option<User>, CalcError> {
    let mut conn = self.conn()?;
    let opt = map_db_err(users_dsl::users.filter(users_dsl::id.eq(id.to_string()))
                                         .first::<UserRow>(&mut conn)
                                         .optional())?;
    match opt {
      Some(r) => Ok(Some(User { id: Uuid::parse_str(&r.id)?, login: r.login, is_moderator: r.is_moderator })),
      None => Ok(None),
    }
  }
}
/// Crea el repo desde el entorno. Lee `MASSCALC_DB_URL` con `DATABASE_URL`
/// como alternativa.
#[cfg(all(feature = "pg", not(test)))]
pub fn new_from_env() -> Result<DieselCalcRepository, CalcError> {
  dotenvy::dotenv().ok();
  let url = std::env::var("MASSCALC_DB_URL").or_else(|_| std::env::var("DATABASE_URL"))
                                            .map_err(|_| CalcError::Internal("MASSCALC_DB_URL / DATABASE_URL not set".into()))?;
  if !(url.starts_with("postgres") || url.starts_with("postgresql://") || url.contains("@")) {
    return Err(CalcError::Internal("calc-persistence: MASSCALC_DB_URL does not look like Postgres URL".into()));
  }
  DieselCalcRepository::new(&url)
}
#[cfg(test)]
pub fn new_from_env() -> Result<DieselCalcRepository, CalcError> {
  dotenvy::dotenv().ok();
  let url = std::env::var("MASSCALC_DB_URL").unwrap_or_else(|_| "file:masscalc_mem?mode=memory&cache=shared".into());
  DieselCalcRepository::new(&url)
}
#[cfg(all(not(feature = "pg"), not(test)))]
pub fn new_from_env() -> Result<DieselCalcRepository, CalcError> {
  dotenvy::dotenv().ok();
  let url = std::env::var("MASSCALC_DB_URL").or_else(|_| std::env::var("DATABASE_URL"))
                                            .map_err(|_| CalcError::Internal("MASSCALC_DB_URL / DATABASE_URL not set".into()))?;
  let url_l = url.to_lowercase();
  if url_l.starts_with("file:") || url_l.contains("mode=memory") || url_l.contains("sqlite") || url_l.ends_with(".db") {
    return DieselCalcRepository::new(&url);
  }
  Err(CalcError::Internal("calc-persistence was compiled without 'pg' feature; enable the 'pg' feature to use Postgres \
                           in production"
                                         .into()))
}

#[cfg(test)]
mod tests {
  use super::*;
  use calc_domain::DomainStubs;

  fn temp_repo() -> Result<(DieselCalcRepository, std::path::PathBuf), CalcError> {
    let path = std::env::temp_dir().join(format!("masscalc_unit_{}.db", Uuid::new_v4()));
    let repo = DieselCalcRepository::new(path.to_str().expect("ruta utf-8"))?;
    Ok((repo, path))
  }

  #[test]
  fn draft_row_roundtrip_and_unique_draft() -> Result<(), CalcError> {
    let (repo, path) = temp_repo()?;
    let creator = Uuid::new_v4();
    let (draft, created) = repo.get_or_create_draft(&creator, Utc::now())?;
    assert!(created);
    let (again, created) = repo.get_or_create_draft(&creator, Utc::now())?;
    assert!(!created);
    assert_eq!(draft.id(), again.id());
    assert_eq!(repo.find_draft(&creator)?.map(|c| c.id()), Some(draft.id()));

    repo.update_calculation(&draft.deleted()?, CalculationStatus::Draft)?;
    assert!(repo.find_draft(&creator)?.is_none());
    let stored = repo.get_calculation(&draft.id())?.expect("calculo guardado");
    assert_eq!(stored.status(), CalculationStatus::Deleted);
    let _ = std::fs::remove_file(path);
    Ok(())
  }

  #[test]
  fn catalog_hides_soft_deleted_reactions() -> Result<(), CalcError> {
    let (repo, path) = temp_repo()?;
    for r in DomainStubs::sample_reactions() {
      repo.seed_reaction(&r)?;
    }
    let mut gone = Reaction::new(9, "Obsoleta", "A=B", 2.0);
    gone.is_delete = true;
    repo.seed_reaction(&gone)?;
    assert_eq!(repo.list_reactions()?.len(), 4);
    assert!(matches!(repo.get_reaction(9), Err(CalcError::NotFound(_))));
    assert_eq!(repo.get_reaction(3)?.formula, "SO3+H2O=H2SO4");
    let _ = std::fs::remove_file(path);
    Ok(())
  }

  #[test]
  fn lost_insert_rereads_the_winning_draft() -> Result<(), CalcError> {
    let (repo, path) = temp_repo()?;
    let creator = Uuid::new_v4();
    let (winner, _) = repo.get_or_create_draft(&creator, Utc::now())?;
    // Segunda insercion como si la lectura previa no hubiera visto al ganador
    let mut conn = repo.conn()?;
    let (reread, created) = DieselCalcRepository::insert_or_reload_draft(&mut conn, &creator, Utc::now())?;
    assert!(!created);
    assert_eq!(reread.id(), winner.id());
    let drafts = repo.list_calculations(&CalculationFilter { creator_id: Some(creator),
                                                             status: Some(CalculationStatus::Draft),
                                                             ..CalculationFilter::default() })?;
    assert_eq!(drafts.len(), 1);
    let _ = std::fs::remove_file(path);
    Ok(())
  }

  #[test]
  fn two_repos_on_one_file_agree_on_the_draft() -> Result<(), CalcError> {
    let (first, path) = temp_repo()?;
    let second = DieselCalcRepository::new(path.to_str().expect("ruta utf-8"))?;
    let creator = Uuid::new_v4();
    let barrier = std::sync::Barrier::new(6);
    let results: Vec<Result<(Calculation, bool), CalcError>> = std::thread::scope(|s| {
      let handles: Vec<_> = (0..6).map(|i| {
                                    let repo = if i % 2 == 0 { &first } else { &second };
                                    let barrier = &barrier;
                                    s.spawn(move || {
                                       barrier.wait();
                                       repo.get_or_create_draft(&creator, Utc::now())
                                     })
                                  })
                                  .collect();
      handles.into_iter().map(|h| h.join().expect("hilo")).collect()
    });
    let drafts: Vec<(Calculation, bool)> = results.into_iter().collect::<Result<_, _>>()?;
    assert_eq!(drafts.iter().filter(|(_, created)| *created).count(), 1);
    assert!(drafts.iter().all(|(c, _)| c.id() == drafts[0].0.id()));
    let _ = std::fs::remove_file(path);
    Ok(())
  }

  #[test]
  fn guarded_writes_follow_the_stored_status() -> Result<(), CalcError> {
    let (repo, path) = temp_repo()?;
    let (draft, _) = repo.get_or_create_draft(&Uuid::new_v4(), Utc::now())?;
    assert!(repo.add_association(&draft.id(), 1)?);
    assert!(repo.add_association(&draft.id(), 2)?);
    let formed = draft.with_patch(&calc_domain::CalculationPatch { output_koef: Some(0.8) })?
                      .formed(Utc::now())?;
    repo.update_calculation(&formed, CalculationStatus::Draft)?;

    // escritor tardio que leyo `draft`
    assert!(matches!(repo.update_calculation(&draft.deleted()?, CalculationStatus::Draft),
                     Err(CalcError::InvalidState(_))));
    assert!(matches!(repo.add_association(&draft.id(), 3), Err(CalcError::InvalidState(_))));
    assert!(matches!(repo.remove_association(&draft.id(), 1), Err(CalcError::InvalidState(_))));
    assert!(matches!(repo.update_output_mass(&draft.id(), 1, 9.0), Err(CalcError::InvalidState(_))));
    assert!(matches!(repo.discard_draft(&draft.deleted()?), Err(CalcError::InvalidState(_))));
    assert_eq!(repo.count_associations(&draft.id())?, 2);
    assert_eq!(repo.get_calculation(&draft.id())?.map(|c| c.status()), Some(CalculationStatus::Formed));

    let ghost = Calculation::new_draft(Uuid::new_v4(), Utc::now());
    assert!(matches!(repo.update_calculation(&ghost, CalculationStatus::Draft), Err(CalcError::NotFound(_))));
    assert!(matches!(repo.add_association(&ghost.id(), 1), Err(CalcError::NotFound(_))));

    // un borrador descartado pierde sus asociaciones en la misma operacion
    let (other, _) = repo.get_or_create_draft(&Uuid::new_v4(), Utc::now())?;
    repo.add_association(&other.id(), 4)?;
    assert_eq!(repo.discard_draft(&other.deleted()?)?, 1);
    assert_eq!(repo.count_associations(&other.id())?, 0);
    assert_eq!(repo.get_calculation(&other.id())?.map(|c| c.status()), Some(CalculationStatus::Deleted));
    let _ = std::fs::remove_file(path);
    Ok(())
  }
}
