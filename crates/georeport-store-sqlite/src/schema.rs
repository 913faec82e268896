//! SQL schema for the GeoReport SQLite store.
//!
//! The five record tables share one layout: the entity payload is stored as
//! JSON next to the envelope columns.

/// Full schema DDL; idempotent thanks to `CREATE TABLE IF NOT EXISTS`.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;

CREATE TABLE IF NOT EXISTS categories (
    id          TEXT PRIMARY KEY,
    fields_json TEXT NOT NULL,
    activo      INTEGER NOT NULL DEFAULT 1,
    created_at  TEXT NOT NULL,
    updated_at  TEXT NOT NULL,
    deleted_at  TEXT
);

CREATE TABLE IF NOT EXISTS estados (
    id          TEXT PRIMARY KEY,
    fields_json TEXT NOT NULL,
    activo      INTEGER NOT NULL DEFAULT 1,
    created_at  TEXT NOT NULL,
    updated_at  TEXT NOT NULL,
    deleted_at  TEXT
);

CREATE TABLE IF NOT EXISTS roles (
    id          TEXT PRIMARY KEY,
    fields_json TEXT NOT NULL,
    activo      INTEGER NOT NULL DEFAULT 1,
    created_at  TEXT NOT NULL,
    updated_at  TEXT NOT NULL,
    deleted_at  TEXT
);

CREATE TABLE IF NOT EXISTS users (
    id          TEXT PRIMARY KEY,
    fields_json TEXT NOT NULL,
    activo      INTEGER NOT NULL DEFAULT 1,
    created_at  TEXT NOT NULL,
    updated_at  TEXT NOT NULL,
    deleted_at  TEXT
);

CREATE TABLE IF NOT EXISTS reportes (
    id          TEXT PRIMARY KEY,
    fields_json TEXT NOT NULL,
    activo      INTEGER NOT NULL DEFAULT 1,
    created_at  TEXT NOT NULL,
    updated_at  TEXT NOT NULL,
    deleted_at  TEXT
);

-- Kept apart from users so hashes never travel with a user record.
CREATE TABLE IF NOT EXISTS credentials (
    user_id       TEXT PRIMARY KEY REFERENCES users(id),
    password_hash TEXT NOT NULL,
    updated_at    TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS notifications (
    id         TEXT PRIMARY KEY,
    user_id    TEXT NOT NULL,
    type       TEXT NOT NULL,
    title      TEXT NOT NULL,
    message    TEXT NOT NULL,
    data_json  TEXT NOT NULL DEFAULT '{}',
    read       INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL
);

-- Audit tables are append-only.
CREATE TABLE IF NOT EXISTS activities (
    id            TEXT PRIMARY KEY,
    user_id       TEXT,
    activity_type TEXT NOT NULL,
    tabla_nombre  TEXT,
    registro_id   TEXT,
    descripcion   TEXT NOT NULL,
    metadatos     TEXT NOT NULL DEFAULT '{}',
    ip_address    TEXT,
    created_at    TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS change_history (
    id                 TEXT PRIMARY KEY,
    tabla_nombre       TEXT NOT NULL,
    registro_id        TEXT NOT NULL,
    operation_type     TEXT NOT NULL,   -- 'INSERT' | 'UPDATE' | 'DELETE'
    user_id            TEXT,
    valores_anteriores TEXT,
    valores_nuevos     TEXT,
    campos_modificados TEXT NOT NULL DEFAULT '[]',
    created_at         TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS users_email_idx
    ON users(lower(json_extract(fields_json, '$.email')));
CREATE INDEX IF NOT EXISTS notifications_user_idx   ON notifications(user_id);
CREATE INDEX IF NOT EXISTS activities_user_idx      ON activities(user_id);
CREATE INDEX IF NOT EXISTS activities_created_idx   ON activities(created_at);
CREATE INDEX IF NOT EXISTS changes_record_idx
    ON change_history(tabla_nombre, registro_id);
CREATE INDEX IF NOT EXISTS changes_created_idx      ON change_history(created_at);

PRAGMA user_version = 1;
";
