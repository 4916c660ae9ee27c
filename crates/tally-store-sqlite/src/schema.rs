//! SQL schema for the Tally SQLite store.
//!
//! Executed once at connection startup. Future migrations will be gated on
//! `PRAGMA user_version`.

/// Full schema DDL; idempotent thanks to `CREATE ... IF NOT EXISTS`.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;

-- Rows are never deleted; `deleted_at` marks logical deletion.
CREATE TABLE IF NOT EXISTS contacts (
    contact_id      TEXT PRIMARY KEY,
    email           TEXT,
    phone_number    TEXT,
    linked_id       TEXT,            -- cluster root; NULL for a root
    link_precedence TEXT NOT NULL DEFAULT 'primary'
                    CHECK (link_precedence IN ('primary', 'secondary')),
    created_at      TEXT NOT NULL,   -- RFC 3339 UTC; server-assigned
    updated_at      TEXT NOT NULL,
    deleted_at      TEXT,
    CHECK (linked_id IS NULL OR linked_id != contact_id)
);

CREATE INDEX IF NOT EXISTS contacts_email_idx   ON contacts(email);
CREATE INDEX IF NOT EXISTS contacts_phone_idx   ON contacts(phone_number);
CREATE INDEX IF NOT EXISTS contacts_linked_idx  ON contacts(linked_id);
CREATE INDEX IF NOT EXISTS contacts_created_idx ON contacts(created_at);

PRAGMA user_version = 1;
";
