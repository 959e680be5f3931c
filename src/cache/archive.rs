// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Durable tile cache in the MBTiles layout.
//!
//! The archive runs in one of two modes:
//! - Snapshot: tiles live in an in-memory SQLite database; [`ArchiveCache::snapshot_if_dirty`]
//!   exports the whole database with SQLite's online backup into a new
//!   timestamped file and prunes files older than the retention window.
//! - File: tiles are written straight to an MBTiles file on disk.
//!
//! Rows are stored with TMS tile rows (`2^z - 1 - y`); callers always pass
//! XYZ coordinates.
//!
//! Besides the standard `metadata` and `tiles` tables the archive keeps a
//! `tile_versions` side table so freshness tokens survive restarts. MBTiles
//! readers ignore it.

use crate::cache::{CacheError, TileCache};
use crate::models::{CachedTile, TileCoord};
use crate::services::tiles::{xyz_to_tms, MAX_LATITUDE};
use crate::time_utils::{format_utc_rfc3339, parse_snapshot_file_name, snapshot_file_name};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, DatabaseName, OptionalExtension};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

/// Value of the `name` metadata key.
pub const TILESET_NAME: &str = "trails";

/// MBTiles archive.
pub struct ArchiveCache {
    conn: Mutex<Connection>,
    min_zoom: u8,
    max_zoom: u8,
    /// Set by every write, cleared when a snapshot starts.
    dirty: AtomicBool,
    in_memory: bool,
}

impl ArchiveCache {
    /// In-memory archive for snapshot mode.
    pub fn in_memory(min_zoom: u8, max_zoom: u8) -> Result<Self, CacheError> {
        Self::from_connection(Connection::open_in_memory()?, min_zoom, max_zoom, true)
    }

    /// Archive written directly to an MBTiles file.
    pub fn open_file(path: &Path, min_zoom: u8, max_zoom: u8) -> Result<Self, CacheError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let archive = Self::from_connection(Connection::open(path)?, min_zoom, max_zoom, false)?;
        tracing::info!(path = %path.display(), "Opened tile archive file");
        Ok(archive)
    }

    fn from_connection(
        conn: Connection,
        min_zoom: u8,
        max_zoom: u8,
        in_memory: bool,
    ) -> Result<Self, CacheError> {
        init_schema(&conn)?;
        write_metadata(&conn, min_zoom, max_zoom)?;
        Ok(Self {
            conn: Mutex::new(conn),
            min_zoom,
            max_zoom,
            dirty: AtomicBool::new(false),
            in_memory,
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, CacheError> {
        self.conn.lock().map_err(|_| CacheError::Poisoned("archive"))
    }

    fn mark_dirty(&self) {
        self.dirty.store(true, Ordering::Release);
    }

    /// Whether the archive changed since the last snapshot.
    pub fn is_dirty(&self) -> bool {
        self.dirty.load(Ordering::Acquire)
    }

    pub fn is_in_memory(&self) -> bool {
        self.in_memory
    }

    pub fn tile_count(&self) -> Result<usize, CacheError> {
        let count: i64 = self
            .conn()?
            .query_row("SELECT COUNT(*) FROM tiles", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    /// Highest stored tile version, used to seed the version clock.
    pub fn max_version(&self) -> Result<u64, CacheError> {
        let max: Option<i64> = self
            .conn()?
            .query_row("SELECT MAX(version) FROM tile_versions", [], |row| {
                row.get(0)
            })?;
        Ok(max.unwrap_or(0).max(0) as u64)
    }

    /// Value of a metadata key.
    pub fn metadata(&self, name: &str) -> Result<Option<String>, CacheError> {
        Ok(self
            .conn()?
            .query_row(
                "SELECT value FROM metadata WHERE name = ?1",
                [name],
                |row| row.get(0),
            )
            .optional()?)
    }

    // ─── Snapshots ───────────────────────────────────────────────

    /// Load the newest snapshot in `dir` into this in-memory archive.
    ///
    /// Returns the restored file, or `None` if the directory holds no
    /// snapshot. Does nothing for file-backed archives.
    pub fn restore_latest(&self, dir: &Path) -> Result<Option<PathBuf>, CacheError> {
        if !self.in_memory {
            return Ok(None);
        }
        let Some((_, path)) = list_snapshots(dir)?.pop() else {
            return Ok(None);
        };

        let mut conn = self.conn()?;
        conn.restore(
            DatabaseName::Main,
            &path,
            None::<fn(rusqlite::backup::Progress)>,
        )?;
        init_schema(&conn)?;
        write_metadata(&conn, self.min_zoom, self.max_zoom)?;
        drop(conn);

        self.dirty.store(false, Ordering::Release);
        tracing::info!(path = %path.display(), "Restored tile archive from snapshot");
        Ok(Some(path))
    }

    /// Export the archive to a new snapshot file if anything changed.
    ///
    /// The export goes to `<name>.tmp` and is renamed into place once
    /// complete, so a crash never leaves a partial `.mbtiles` file. After a
    /// successful export, snapshots older than `retention` are deleted.
    pub fn snapshot_if_dirty(
        &self,
        dir: &Path,
        retention: Duration,
    ) -> Result<Option<PathBuf>, CacheError> {
        if !self.in_memory || !self.dirty.swap(false, Ordering::AcqRel) {
            return Ok(None);
        }

        match self.export_snapshot(dir) {
            Ok(path) => {
                let pruned = prune_snapshots(dir, retention, Utc::now())?;
                tracing::info!(
                    path = %path.display(),
                    pruned,
                    "Tile archive snapshot written"
                );
                Ok(Some(path))
            }
            Err(e) => {
                self.mark_dirty();
                Err(e)
            }
        }
    }

    fn export_snapshot(&self, dir: &Path) -> Result<PathBuf, CacheError> {
        std::fs::create_dir_all(dir)?;
        let final_path = dir.join(snapshot_file_name(Utc::now()));
        let tmp_path = final_path.with_extension("mbtiles.tmp");

        let copied = self.conn()?.backup(DatabaseName::Main, &tmp_path, None);
        // The stamp goes into the copy only; the live archive stays untouched.
        let stamped = copied.and_then(|()| {
            Connection::open(&tmp_path)?.execute(
                "INSERT OR REPLACE INTO metadata (name, value) VALUES ('snapshot_at', ?1)",
                [format_utc_rfc3339(Utc::now())],
            )
        });
        if let Err(e) = stamped {
            let _ = std::fs::remove_file(&tmp_path);
            return Err(e.into());
        }

        std::fs::rename(&tmp_path, &final_path)?;
        Ok(final_path)
    }
}

impl TileCache for ArchiveCache {
    fn name(&self) -> &'static str {
        "archive"
    }

    fn min_zoom(&self) -> u8 {
        self.min_zoom
    }

    fn max_zoom(&self) -> u8 {
        self.max_zoom
    }

    fn get_tile(&self, coord: TileCoord) -> Result<Option<CachedTile>, CacheError> {
        if !coord.is_valid() {
            return Ok(None);
        }
        let row = xyz_to_tms(coord.z, coord.y);
        let found: Option<(Vec<u8>, Option<i64>)> = self
            .conn()?
            .query_row(
                "SELECT t.tile_data, v.version FROM tiles t \
                 LEFT JOIN tile_versions v \
                   ON v.zoom_level = t.zoom_level \
                  AND v.tile_column = t.tile_column \
                  AND v.tile_row = t.tile_row \
                 WHERE t.zoom_level = ?1 AND t.tile_column = ?2 AND t.tile_row = ?3",
                params![coord.z, coord.x, row],
                |r| Ok((r.get(0)?, r.get(1)?)),
            )
            .optional()?;

        Ok(found.map(|(data, version)| CachedTile {
            coord,
            data,
            version: version.unwrap_or(0).max(0) as u64,
        }))
    }

    fn store_tile(&self, tile: &CachedTile) -> Result<(), CacheError> {
        let coord = tile.coord;
        if !self.supports(coord.z) || !coord.is_valid() {
            return Ok(());
        }
        let row = xyz_to_tms(coord.z, coord.y);

        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        tx.execute(
            "INSERT OR REPLACE INTO tiles (zoom_level, tile_column, tile_row, tile_data) \
             VALUES (?1, ?2, ?3, ?4)",
            params![coord.z, coord.x, row, tile.data],
        )?;
        tx.execute(
            "INSERT OR REPLACE INTO tile_versions (zoom_level, tile_column, tile_row, version) \
             VALUES (?1, ?2, ?3, ?4)",
            params![coord.z, coord.x, row, tile.version as i64],
        )?;
        tx.commit()?;
        drop(conn);

        self.mark_dirty();
        Ok(())
    }

    fn clear_tile(&self, coord: TileCoord) -> Result<(), CacheError> {
        if !coord.is_valid() {
            return Ok(());
        }
        let row = xyz_to_tms(coord.z, coord.y);
        let conn = self.conn()?;
        let removed = conn.execute(
            "DELETE FROM tiles WHERE zoom_level = ?1 AND tile_column = ?2 AND tile_row = ?3",
            params![coord.z, coord.x, row],
        )?;
        conn.execute(
            "DELETE FROM tile_versions WHERE zoom_level = ?1 AND tile_column = ?2 AND tile_row = ?3",
            params![coord.z, coord.x, row],
        )?;
        drop(conn);

        if removed > 0 {
            self.mark_dirty();
        }
        Ok(())
    }

    fn clear_all(&self) -> Result<(), CacheError> {
        self.conn()?
            .execute_batch("DELETE FROM tiles; DELETE FROM tile_versions;")?;
        self.mark_dirty();
        tracing::debug!("Tile archive cleared");
        Ok(())
    }
}

fn init_schema(conn: &Connection) -> Result<(), CacheError> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS metadata (name TEXT, value TEXT);
        CREATE UNIQUE INDEX IF NOT EXISTS metadata_name ON metadata (name);

        CREATE TABLE IF NOT EXISTS tiles (
            zoom_level INTEGER,
            tile_column INTEGER,
            tile_row INTEGER,
            tile_data BLOB
        );
        CREATE UNIQUE INDEX IF NOT EXISTS tile_index
            ON tiles (zoom_level, tile_column, tile_row);

        CREATE TABLE IF NOT EXISTS tile_versions (
            zoom_level INTEGER,
            tile_column INTEGER,
            tile_row INTEGER,
            version INTEGER NOT NULL,
            PRIMARY KEY (zoom_level, tile_column, tile_row)
        );
        "#,
    )?;
    Ok(())
}

fn write_metadata(conn: &Connection, min_zoom: u8, max_zoom: u8) -> Result<(), CacheError> {
    let bounds = format!("-180.0,{:.4},180.0,{:.4}", -MAX_LATITUDE, MAX_LATITUDE);
    let center = format!("0.0,0.0,{}", min_zoom);
    let entries = [
        ("name", TILESET_NAME.to_string()),
        ("format", "pbf".to_string()),
        ("minzoom", min_zoom.to_string()),
        ("maxzoom", max_zoom.to_string()),
        ("type", "overlay".to_string()),
        ("description", "Trail line features".to_string()),
        ("bounds", bounds),
        ("center", center),
    ];
    for (name, value) in entries {
        conn.execute(
            "INSERT OR REPLACE INTO metadata (name, value) VALUES (?1, ?2)",
            params![name, value],
        )?;
    }
    Ok(())
}

/// Snapshot files in `dir`, oldest first. A missing directory has none.
fn list_snapshots(dir: &Path) -> Result<Vec<(DateTime<Utc>, PathBuf)>, CacheError> {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };

    let mut snapshots = Vec::new();
    for entry in entries {
        let entry = entry?;
        let name = entry.file_name();
        if let Some(taken) = name.to_str().and_then(parse_snapshot_file_name) {
            snapshots.push((taken, entry.path()));
        }
    }
    snapshots.sort();
    Ok(snapshots)
}

/// Delete snapshots taken before `now - retention`. The newest snapshot is
/// always kept. Returns the number of files removed.
pub fn prune_snapshots(dir: &Path, retention: Duration, now: DateTime<Utc>) -> Result<usize, CacheError> {
    let mut snapshots = list_snapshots(dir)?;
    snapshots.pop();

    let retention = chrono::Duration::from_std(retention).unwrap_or(chrono::Duration::MAX);
    let cutoff = now.checked_sub_signed(retention).unwrap_or(DateTime::<Utc>::MIN_UTC);

    let mut removed = 0;
    for (taken, path) in snapshots {
        if taken < cutoff {
            match std::fs::remove_file(&path) {
                Ok(()) => removed += 1,
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "Failed to delete old snapshot")
                }
            }
        }
    }
    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn tile(z: u8, x: u32, y: u32, version: u64) -> CachedTile {
        CachedTile {
            coord: TileCoord::new(z, x, y),
            data: vec![0x1a, z, x as u8, y as u8],
            version,
        }
    }

    #[test]
    fn test_rows_are_stored_in_tms() {
        let archive = ArchiveCache::in_memory(6, 18).unwrap();
        archive.store_tile(&tile(10, 5, 3, 7)).unwrap();

        let stored_row: i64 = archive
            .conn()
            .unwrap()
            .query_row(
                "SELECT tile_row FROM tiles WHERE zoom_level = 10 AND tile_column = 5",
                [],
                |r| r.get(0),
            )
            .unwrap();
        assert_eq!(stored_row, 1020);

        let read = archive.get_tile(TileCoord::new(10, 5, 3)).unwrap().unwrap();
        assert_eq!(read, tile(10, 5, 3, 7));
        assert!(archive.get_tile(TileCoord::new(10, 5, 1020)).unwrap().is_none());
    }

    #[test]
    fn test_required_metadata_present() {
        let archive = ArchiveCache::in_memory(6, 18).unwrap();
        assert_eq!(archive.metadata("name").unwrap().as_deref(), Some("trails"));
        assert_eq!(archive.metadata("format").unwrap().as_deref(), Some("pbf"));
        assert_eq!(archive.metadata("minzoom").unwrap().as_deref(), Some("6"));
        assert_eq!(archive.metadata("maxzoom").unwrap().as_deref(), Some("18"));
        assert_eq!(archive.metadata("type").unwrap().as_deref(), Some("overlay"));
    }

    #[test]
    fn test_clear_tile_and_clear_all() {
        let archive = ArchiveCache::in_memory(6, 18).unwrap();
        archive.store_tile(&tile(8, 1, 1, 1)).unwrap();
        archive.store_tile(&tile(8, 1, 2, 1)).unwrap();
        archive.clear_tile(TileCoord::new(8, 1, 1)).unwrap();
        assert_eq!(archive.tile_count().unwrap(), 1);
        archive.clear_all().unwrap();
        assert_eq!(archive.tile_count().unwrap(), 0);
        assert_eq!(archive.max_version().unwrap(), 0);
    }

    #[test]
    fn test_snapshot_only_when_dirty_and_restores() {
        let dir = tempfile::tempdir().unwrap();
        let retention = Duration::from_secs(15 * 60);
        let archive = ArchiveCache::in_memory(6, 18).unwrap();

        assert!(archive.snapshot_if_dirty(dir.path(), retention).unwrap().is_none());

        archive.store_tile(&tile(12, 100, 200, 42)).unwrap();
        assert!(archive.is_dirty());
        let path = archive
            .snapshot_if_dirty(dir.path(), retention)
            .unwrap()
            .expect("dirty archive should snapshot");
        assert!(path.exists());
        assert!(!archive.is_dirty());
        assert!(archive.snapshot_if_dirty(dir.path(), retention).unwrap().is_none());

        let restored = ArchiveCache::in_memory(6, 18).unwrap();
        assert_eq!(restored.restore_latest(dir.path()).unwrap(), Some(path));
        let t = restored.get_tile(TileCoord::new(12, 100, 200)).unwrap().unwrap();
        assert_eq!(t.version, 42);
        assert_eq!(restored.max_version().unwrap(), 42);
    }

    #[test]
    fn test_snapshot_file_is_plain_mbtiles() {
        let dir = tempfile::tempdir().unwrap();
        let archive = ArchiveCache::in_memory(6, 18).unwrap();
        archive.store_tile(&tile(10, 5, 3, 1)).unwrap();
        let path = archive
            .snapshot_if_dirty(dir.path(), Duration::from_secs(60))
            .unwrap()
            .unwrap();

        let conn = Connection::open(&path).unwrap();
        let row: i64 = conn
            .query_row("SELECT tile_row FROM tiles", [], |r| r.get(0))
            .unwrap();
        assert_eq!(row, 1020);
        let format: String = conn
            .query_row("SELECT value FROM metadata WHERE name = 'format'", [], |r| {
                r.get(0)
            })
            .unwrap();
        assert_eq!(format, "pbf");
    }

    #[test]
    fn test_snapshot_stamp_lands_in_file_only() {
        let dir = tempfile::tempdir().unwrap();
        let archive = ArchiveCache::in_memory(6, 18).unwrap();
        archive.store_tile(&tile(10, 5, 3, 1)).unwrap();
        let path = archive
            .snapshot_if_dirty(dir.path(), Duration::from_secs(60))
            .unwrap()
            .unwrap();

        assert_eq!(archive.metadata("snapshot_at").unwrap(), None);
        assert!(!archive.is_dirty());

        let stamped: String = Connection::open(&path)
            .unwrap()
            .query_row(
                "SELECT value FROM metadata WHERE name = 'snapshot_at'",
                [],
                |r| r.get(0),
            )
            .unwrap();
        assert!(DateTime::parse_from_rfc3339(&stamped).is_ok());
    }

    #[test]
    fn test_restore_from_empty_dir_is_noop() {
        let dir = tempfile::tempdir().unwrap();
        let archive = ArchiveCache::in_memory(6, 18).unwrap();
        assert_eq!(archive.restore_latest(dir.path()).unwrap(), None);
        assert_eq!(
            archive.restore_latest(&dir.path().join("missing")).unwrap(),
            None
        );
    }

    #[test]
    fn test_prune_keeps_recent_and_newest() {
        let dir = tempfile::tempdir().unwrap();
        let now = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap();
        let ages_minutes = [60, 30, 20, 10, 1];
        for minutes in ages_minutes {
            let at = now - chrono::Duration::minutes(minutes);
            std::fs::write(dir.path().join(snapshot_file_name(at)), b"x").unwrap();
        }
        std::fs::write(dir.path().join("unrelated.txt"), b"x").unwrap();

        let removed = prune_snapshots(dir.path(), Duration::from_secs(15 * 60), now).unwrap();
        assert_eq!(removed, 3);
        let left = list_snapshots(dir.path()).unwrap();
        assert_eq!(left.len(), 2);
        assert!(dir.path().join("unrelated.txt").exists());
    }

    #[test]
    fn test_prune_never_removes_only_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let now = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap();
        let old = now - chrono::Duration::days(3);
        std::fs::write(dir.path().join(snapshot_file_name(old)), b"x").unwrap();

        assert_eq!(
            prune_snapshots(dir.path(), Duration::from_secs(60), now).unwrap(),
            0
        );
        assert_eq!(list_snapshots(dir.path()).unwrap().len(), 1);
    }

    #[test]
    fn test_file_mode_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tiles.mbtiles");
        {
            let archive = ArchiveCache::open_file(&path, 6, 18).unwrap();
            archive.store_tile(&tile(9, 3, 4, 5)).unwrap();
            assert!(archive.snapshot_if_dirty(dir.path(), Duration::from_secs(60)).unwrap().is_none());
        }
        let archive = ArchiveCache::open_file(&path, 6, 18).unwrap();
        assert_eq!(archive.get_tile(TileCoord::new(9, 3, 4)).unwrap().unwrap().version, 5);
    }

    #[test]
    fn test_out_of_range_zoom_is_ignored() {
        let archive = ArchiveCache::in_memory(6, 18).unwrap();
        archive.store_tile(&tile(2, 1, 1, 1)).unwrap();
        assert_eq!(archive.tile_count().unwrap(), 0);
        assert!(!archive.is_dirty());
    }
}
