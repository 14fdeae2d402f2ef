use rusqlite::{params, Connection, Result, Transaction};

const SCHEMA_VERSION: i32 = 2;

pub struct Migrator<'a> {
    conn: &'a mut Connection,
}

impl<'a> Migrator<'a> {
    pub fn new(conn: &'a mut Connection) -> Self {
        Self { conn }
    }

    pub fn run_migrations(&mut self) -> Result<()> {
        self.conn.execute(
            "CREATE TABLE IF NOT EXISTS schema_version (
                version INTEGER PRIMARY KEY,
                applied_at DATETIME DEFAULT CURRENT_TIMESTAMP
            )",
            [],
        )?;

        let current_version = self.current_version()?;
        log::debug!("Current database schema version: {}", current_version);

        if current_version < SCHEMA_VERSION {
            log::info!("Migrating database from version {} to {}", current_version, SCHEMA_VERSION);
            self.migrate_from(current_version)?;
        }

        Ok(())
    }

    pub fn current_version(&self) -> Result<i32> {
        let version: Option<i32> = self.conn.query_row(
            "SELECT MAX(version) FROM schema_version",
            [],
            |row| row.get(0),
        )?;
        Ok(version.unwrap_or(0))
    }

    fn migrate_from(&mut self, from_version: i32) -> Result<()> {
        let tx = self.conn.transaction()?;

        for version in (from_version + 1)..=SCHEMA_VERSION {
            log::info!("Applying migration to version {}", version);
            match version {
                1 => Self::migrate_to_v1(&tx)?,
                2 => Self::migrate_to_v2(&tx)?,
                _ => return Err(rusqlite::Error::InvalidQuery),
            }

            tx.execute(
                "INSERT INTO schema_version (version) VALUES (?1)",
                params![version],
            )?;
        }

        tx.commit()
    }

    fn migrate_to_v1(tx: &Transaction) -> Result<()> {
        tx.execute(
            "CREATE TABLE IF NOT EXISTS kv (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            )",
            [],
        )?;
        Ok(())
    }

    fn migrate_to_v2(tx: &Transaction) -> Result<()> {
        // SQLite rejects non-constant defaults in ALTER TABLE, so existing rows stay NULL
        tx.execute("ALTER TABLE kv ADD COLUMN updated_at DATETIME", [])?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fresh_database_reaches_latest_version() {
        let mut conn = Connection::open_in_memory().unwrap();
        let mut migrator = Migrator::new(&mut conn);
        migrator.run_migrations().unwrap();
        assert_eq!(migrator.current_version().unwrap(), SCHEMA_VERSION);

        // second run is a no-op
        migrator.run_migrations().unwrap();
        assert_eq!(migrator.current_version().unwrap(), SCHEMA_VERSION);
    }

    #[test]
    fn test_v1_database_is_upgraded() {
        let mut conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(
            "CREATE TABLE schema_version (version INTEGER PRIMARY KEY, applied_at DATETIME);
             INSERT INTO schema_version (version) VALUES (1);
             CREATE TABLE kv (key TEXT PRIMARY KEY, value TEXT NOT NULL);
             INSERT INTO kv (key, value) VALUES ('api-key', '\"abc\"');",
        )
        .unwrap();

        Migrator::new(&mut conn).run_migrations().unwrap();

        let (value, updated): (String, Option<String>) = conn
            .query_row("SELECT value, updated_at FROM kv WHERE key = 'api-key'", [], |row| {
                Ok((row.get(0)?, row.get(1)?))
            })
            .unwrap();
        assert_eq!(value, "\"abc\"");
        assert_eq!(updated, None);
    }
}
