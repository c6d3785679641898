//! Pools pinned to a scratch PostgreSQL schema, for database-backed tests.

use std::env;

use anyhow::{Context, Result};
use log::*;
use postgres::Client;
use r2d2::Pool;

use crate::pool::{PgPool, PostgresConfig};

#[derive(Debug)]
pub struct UseTempSchema(String);

impl r2d2::CustomizeConnection<Client, postgres::Error> for UseTempSchema {
    fn on_acquire(&self, conn: &mut Client) -> Result<(), postgres::Error> {
        loop {
            let mut t = conn.transaction()?;
            let nschemas: i64 = t
                .query_one(
                    "SELECT count(*) from pg_catalog.pg_namespace n where n.nspname = $1",
                    &[&self.0],
                )?
                .get(0);
            debug!("Number of {} schemas:{}", self.0, nschemas);
            if nschemas == 0 {
                match t.batch_execute(&format!("CREATE SCHEMA \"{}\"", self.0)) {
                    Ok(()) => {
                        t.commit()?;
                        break;
                    }
                    Err(e) => warn!("Error creating schema:{:?}: {:?}", self.0, e),
                }
            } else {
                break;
            }
        }
        conn.batch_execute(&format!("SET search_path TO \"{}\"", self.0))?;
        Ok(())
    }
}

/// Builds a small pool against `$POSTGRES_URL` whose connections all use
/// `schema`, dropping any tables left behind by a previous run.
pub fn pool(schema: &str) -> Result<PgPool> {
    debug!("Build pool for {}", schema);
    let url = env::var("POSTGRES_URL").context("$POSTGRES_URL")?;
    debug!("Use schema name: {}", schema);
    let manager = PostgresConfig::new(&url).manager()?;

    let pool = Pool::builder()
        .max_size(2)
        .connection_customizer(Box::new(UseTempSchema(schema.to_string())))
        .build(manager)?;

    let mut conn = pool.get()?;
    cleanup(&mut conn, schema)?;

    Ok(pool)
}

fn cleanup(conn: &mut Client, schema: &str) -> Result<()> {
    let mut t = conn.transaction()?;
    debug!("Clean old tables in {}", schema);
    let rows = t.query(
        "SELECT n.nspname, c.relname \
         FROM pg_catalog.pg_class c \
         LEFT JOIN pg_catalog.pg_namespace n ON n.oid = c.relnamespace \
         WHERE n.nspname = $1 and c.relkind = 'r'",
        &[&schema],
    )?;
    for row in rows {
        let schema = row.get::<_, String>(0);
        let table = row.get::<_, String>(1);
        t.batch_execute(&format!("DROP TABLE \"{}\".\"{}\"", schema, table))?;
    }
    t.commit()?;
    Ok(())
}
