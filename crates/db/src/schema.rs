//! Table definitions for development and test databases.
//!
//! Production schemas are owned by migrations; these statements mirror them
//! so a fresh SQLite file or an empty dev database can serve requests.

use sea_orm::DbBackend;

const POSTGRES: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS users (
        id BIGSERIAL PRIMARY KEY,
        email TEXT NOT NULL UNIQUE,
        password_hash TEXT NOT NULL,
        created_at TIMESTAMPTZ NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS vaults (
        id BIGSERIAL PRIMARY KEY,
        owner_id BIGINT NOT NULL REFERENCES users (id),
        name TEXT NOT NULL,
        content BYTEA NOT NULL,
        version UUID NOT NULL,
        file_id TEXT,
        created_at TIMESTAMPTZ NOT NULL,
        updated_at TIMESTAMPTZ NOT NULL,
        CONSTRAINT vaults_owner_name_key UNIQUE (owner_id, name)
    )",
];

// utf8mb4_bin keeps email and name comparisons case-sensitive
const MYSQL: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS users (
        id BIGINT NOT NULL AUTO_INCREMENT PRIMARY KEY,
        email VARCHAR(254) CHARACTER SET utf8mb4 COLLATE utf8mb4_bin NOT NULL,
        password_hash VARCHAR(255) NOT NULL,
        created_at TIMESTAMP NOT NULL,
        UNIQUE KEY users_email_key (email)
    )",
    "CREATE TABLE IF NOT EXISTS vaults (
        id BIGINT NOT NULL AUTO_INCREMENT PRIMARY KEY,
        owner_id BIGINT NOT NULL,
        name VARCHAR(256) CHARACTER SET utf8mb4 COLLATE utf8mb4_bin NOT NULL,
        content LONGBLOB NOT NULL,
        version BINARY(16) NOT NULL,
        file_id VARCHAR(255) NULL,
        created_at TIMESTAMP NOT NULL,
        updated_at TIMESTAMP NOT NULL,
        UNIQUE KEY vaults_owner_name_key (owner_id, name),
        CONSTRAINT vaults_owner_fk FOREIGN KEY (owner_id) REFERENCES users (id)
    )",
];

const SQLITE: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS users (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        email TEXT NOT NULL UNIQUE,
        password_hash TEXT NOT NULL,
        created_at TEXT NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS vaults (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        owner_id INTEGER NOT NULL REFERENCES users (id),
        name TEXT NOT NULL,
        content BLOB NOT NULL,
        version BLOB NOT NULL,
        file_id TEXT,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL,
        UNIQUE (owner_id, name)
    )",
];

pub fn statements(backend: DbBackend) -> &'static [&'static str] {
    match backend {
        DbBackend::Postgres => POSTGRES,
        DbBackend::MySql => MYSQL,
        DbBackend::Sqlite => SQLITE,
    }
}
