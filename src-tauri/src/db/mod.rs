pub mod models;

use models::{DailyUsage, SiteInfo};
use rusqlite::{params, Connection, OptionalExtension, Result};
use std::sync::{Mutex, MutexGuard, PoisonError};

const KEY_SITE_TITLE: &str = "antique_site_title";
const KEY_SITE_SLOGAN: &str = "antique_site_slogan";
const KEY_SITE_OWNER: &str = "antique_site_owner";
const KEY_SITE_DOMAIN: &str = "antique_site_domain";
const KEY_SITE_PHONE: &str = "antique_site_phone";

pub const SITE_INFO_KEYS: &[&str] = &[
    KEY_SITE_TITLE,
    KEY_SITE_SLOGAN,
    KEY_SITE_OWNER,
    KEY_SITE_DOMAIN,
    KEY_SITE_PHONE,
];

const KEY_USAGE_DATE: &str = "last_appraisal_date";
const KEY_USAGE_COUNT: &str = "appraisal_count";

pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    pub fn new(app_dir: &std::path::Path) -> Result<Self> {
        if let Err(e) = std::fs::create_dir_all(app_dir) {
            log::warn!("Could not create {}: {}", app_dir.display(), e);
        }
        let db_path = app_dir.join("appraiser.db");
        let conn = Connection::open(db_path)?;
        Self::with_connection(conn)
    }

    pub fn in_memory() -> Result<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        let db = Self {
            conn: Mutex::new(conn),
        };
        db.migrate()?;
        Ok(db)
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn migrate(&self) -> Result<()> {
        let conn = self.conn();
        conn.execute_batch(
            "
            PRAGMA journal_mode=WAL;

            CREATE TABLE IF NOT EXISTS settings (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );
            ",
        )?;
        Ok(())
    }

    // ── Settings ──

    pub fn get_setting(&self, key: &str) -> Result<Option<String>> {
        read_setting(&self.conn(), key)
    }

    pub fn set_setting(&self, key: &str, value: &str) -> Result<()> {
        write_setting(&self.conn(), key, value)
    }

    // ── Site info ──

    /// Stored site info; keys never written, or stored empty, fall back to
    /// the defaults.
    pub fn load_site_info(&self) -> Result<SiteInfo> {
        let defaults = SiteInfo::default();
        let read = |key: &str, default: String| -> Result<String> {
            Ok(self
                .get_setting(key)?
                .filter(|v| !v.is_empty())
                .unwrap_or(default))
        };
        Ok(SiteInfo {
            title: read(KEY_SITE_TITLE, defaults.title)?,
            slogan: read(KEY_SITE_SLOGAN, defaults.slogan)?,
            owner: read(KEY_SITE_OWNER, defaults.owner)?,
            domain: read(KEY_SITE_DOMAIN, defaults.domain)?,
            phone: read(KEY_SITE_PHONE, defaults.phone)?,
        })
    }

    /// Rewrites all five site keys in one transaction.
    pub fn save_site_info(&self, info: &SiteInfo) -> Result<()> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;
        for (key, value) in [
            (KEY_SITE_TITLE, &info.title),
            (KEY_SITE_SLOGAN, &info.slogan),
            (KEY_SITE_OWNER, &info.owner),
            (KEY_SITE_DOMAIN, &info.domain),
            (KEY_SITE_PHONE, &info.phone),
        ] {
            tx.execute(
                "INSERT OR REPLACE INTO settings (key, value) VALUES (?1, ?2)",
                params![key, value],
            )?;
        }
        tx.commit()
    }

    // ── Daily usage ──

    /// Usage for `today`. A stored date other than `today` resets the
    /// counter to zero and persists the reset.
    pub fn load_daily_usage(&self, today: &str) -> Result<DailyUsage> {
        let conn = self.conn();
        let count = current_usage(&conn, today)?;
        Ok(DailyUsage {
            date: today.to_string(),
            count,
        })
    }

    /// Claims one of today's `limit` slots. Returns the new count, or `None`
    /// when the allowance is already used up. Check and increment happen
    /// under one connection lock, so concurrent callers never overshoot.
    pub fn try_reserve_usage(&self, today: &str, limit: u32) -> Result<Option<u32>> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;
        let count = current_usage(&tx, today)?;
        if count >= limit {
            return Ok(None);
        }
        write_usage(&tx, today, count + 1)?;
        tx.commit()?;
        Ok(Some(count + 1))
    }

    /// Gives back a slot taken by `try_reserve_usage`. A no-op once the day
    /// has rolled over.
    pub fn release_usage(&self, today: &str) -> Result<()> {
        let conn = self.conn();
        if read_setting(&conn, KEY_USAGE_DATE)?.as_deref() != Some(today) {
            return Ok(());
        }
        let count = current_usage(&conn, today)?;
        write_usage(&conn, today, count.saturating_sub(1))
    }
}

fn read_setting(conn: &Connection, key: &str) -> Result<Option<String>> {
    conn.query_row(
        "SELECT value FROM settings WHERE key = ?1",
        params![key],
        |row| row.get(0),
    )
    .optional()
}

fn write_setting(conn: &Connection, key: &str, value: &str) -> Result<()> {
    conn.execute(
        "INSERT OR REPLACE INTO settings (key, value) VALUES (?1, ?2)",
        params![key, value],
    )?;
    Ok(())
}

fn write_usage(conn: &Connection, today: &str, count: u32) -> Result<()> {
    write_setting(conn, KEY_USAGE_DATE, today)?;
    write_setting(conn, KEY_USAGE_COUNT, &count.to_string())
}

/// Today's count, resetting a counter left over from an earlier date.
fn current_usage(conn: &Connection, today: &str) -> Result<u32> {
    if read_setting(conn, KEY_USAGE_DATE)?.as_deref() != Some(today) {
        write_usage(conn, today, 0)?;
        return Ok(0);
    }
    Ok(read_setting(conn, KEY_USAGE_COUNT)?
        .and_then(|v| v.parse::<u32>().ok())
        .unwrap_or(0))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_setting_is_none() {
        let db = Database::in_memory().unwrap();
        assert_eq!(db.get_setting("nope").unwrap(), None);
        db.set_setting("nope", "yes").unwrap();
        assert_eq!(db.get_setting("nope").unwrap().as_deref(), Some("yes"));
    }

    #[test]
    fn empty_stored_field_falls_back_to_default() {
        let db = Database::in_memory().unwrap();
        db.set_setting(KEY_SITE_OWNER, "").unwrap();
        db.set_setting(KEY_SITE_PHONE, "02-123-4567").unwrap();

        let info = db.load_site_info().unwrap();
        assert_eq!(info.owner, SiteInfo::default().owner);
        assert_eq!(info.phone, "02-123-4567");
    }

    #[test]
    fn reservations_stop_at_the_limit() {
        let db = Database::in_memory().unwrap();
        assert_eq!(db.try_reserve_usage("2026-10-16", 2).unwrap(), Some(1));
        assert_eq!(db.try_reserve_usage("2026-10-16", 2).unwrap(), Some(2));
        assert_eq!(db.try_reserve_usage("2026-10-16", 2).unwrap(), None);

        db.release_usage("2026-10-16").unwrap();
        assert_eq!(db.load_daily_usage("2026-10-16").unwrap().count, 1);
        assert_eq!(db.try_reserve_usage("2026-10-17", 2).unwrap(), Some(1));
    }

    #[test]
    fn release_after_rollover_leaves_new_day_alone() {
        let db = Database::in_memory().unwrap();
        db.try_reserve_usage("2026-10-16", 5).unwrap();
        db.try_reserve_usage("2026-10-17", 5).unwrap();

        db.release_usage("2026-10-16").unwrap();
        assert_eq!(db.load_daily_usage("2026-10-17").unwrap().count, 1);
    }

    #[test]
    fn site_info_defaults_when_empty() {
        let db = Database::in_memory().unwrap();
        assert_eq!(db.load_site_info().unwrap(), SiteInfo::default());
    }

    #[test]
    fn updating_one_field_keeps_other_defaults() {
        let db = Database::in_memory().unwrap();
        db.set_setting(KEY_SITE_DOMAIN, "gosan-antiques.kr").unwrap();

        let info = db.load_site_info().unwrap();
        let defaults = SiteInfo::default();
        assert_eq!(info.domain, "gosan-antiques.kr");
        assert_eq!(info.title, defaults.title);
        assert_eq!(info.slogan, defaults.slogan);
        assert_eq!(info.owner, defaults.owner);
        assert_eq!(info.phone, defaults.phone);
    }

    #[test]
    fn saved_site_info_round_trips() {
        let db = Database::in_memory().unwrap();
        let info = SiteInfo {
            title: "Gosan Lab".into(),
            ..SiteInfo::default()
        };
        db.save_site_info(&info).unwrap();
        assert_eq!(db.load_site_info().unwrap(), info);
        assert_eq!(
            db.get_setting(KEY_SITE_PHONE).unwrap().as_deref(),
            Some("010-0000-0000")
        );
    }

    #[test]
    fn usage_counts_within_a_day() {
        let db = Database::in_memory().unwrap();
        assert_eq!(db.load_daily_usage("2026-10-16").unwrap().count, 0);
        write_usage(&db.conn(), "2026-10-16", 3).unwrap();
        assert_eq!(db.load_daily_usage("2026-10-16").unwrap().count, 3);
    }

    #[test]
    fn usage_resets_on_a_new_date() {
        let db = Database::in_memory().unwrap();
        write_usage(&db.conn(), "2026-10-16", 5).unwrap();

        let usage = db.load_daily_usage("2026-10-17").unwrap();
        assert_eq!(usage.count, 0);
        assert_eq!(usage.date, "2026-10-17");
        assert_eq!(
            db.get_setting(KEY_USAGE_COUNT).unwrap().as_deref(),
            Some("0")
        );
    }
}
